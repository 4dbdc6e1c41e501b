//! GPU compute backends and the pieces they share.
//!
//! Both backends run the same algorithm as the host path tracer, one work item
//! per ray, in single precision:
//!
//! - [`kernel::KernelRenderer`] - wgpu, WGSL kernel (feature `wgpu-backend`)
//! - [`vulkan::VulkanRenderer`] - vulkano, SPIR-V kernel (feature `vulkan-backend`)
//!
//! This module holds what does not need a device: kernel file loading, the
//! grow-only buffer capacity policy and workgroup sizing.

pub mod layout;

#[cfg(feature = "wgpu-backend")]
pub mod kernel;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::path::Path;

use tracing::debug;

use crate::util::{Error, Result};

/// Default location of the WGSL kernel, relative to the working directory.
pub const KERNEL_WGSL_PATH: &str = "kernels/render.wgsl";

/// Default location of the compiled SPIR-V kernel.
pub const KERNEL_SPIRV_PATH: &str = "kernels/render.spv";

/// Work items per workgroup. Must match both kernels.
pub const WORKGROUP_SIZE: u32 = 64;

/// Largest workgroup count along one dispatch dimension.
pub const MAX_WORKGROUPS_PER_DIM: u32 = 65535;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Read a text kernel. Unreadable files are `KernelMissing`, blank ones `KernelMalformed`.
pub fn load_kernel_source(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|source| Error::KernelMissing {
        path: path.to_path_buf(),
        source,
    })?;
    if source.trim().is_empty() {
        return Err(Error::malformed(path, "file is empty"));
    }
    debug!("loaded kernel {} ({} bytes)", path.display(), source.len());
    Ok(source)
}

/// Read a SPIR-V binary as 32-bit words.
///
/// The byte length must be a non-zero multiple of 4 and the first word must be
/// the SPIR-V magic number in either byte order.
pub fn load_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| Error::KernelMissing {
        path: path.to_path_buf(),
        source,
    })?;
    let words = spirv_words(&bytes).map_err(|reason| Error::malformed(path, reason))?;
    debug!("loaded kernel {} ({} words)", path.display(), words.len());
    Ok(words)
}

fn spirv_words(bytes: &[u8]) -> std::result::Result<Vec<u32>, String> {
    if bytes.is_empty() {
        return Err("file is empty".into());
    }
    if bytes.len() % 4 != 0 {
        return Err(format!("size {} is not a multiple of 4 bytes", bytes.len()));
    }

    let mut words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect();

    match words[0] {
        SPIRV_MAGIC => {}
        m if m.swap_bytes() == SPIRV_MAGIC => {
            for w in words.iter_mut() {
                *w = w.swap_bytes();
            }
        }
        m => return Err(format!("bad magic number {:#010x}", m)),
    }
    Ok(words)
}

/// New element capacity for a grow-only buffer, or `None` if `current` suffices.
///
/// Buffers never shrink and always hold at least one element, so an empty
/// scene still binds something.
pub fn grown_capacity(current: usize, required: usize) -> Option<usize> {
    let required = required.max(1);
    if required > current {
        Some(required)
    } else {
        None
    }
}

/// Workgroup counts `(x, y)` covering `n_items` work items.
///
/// Counts above [`MAX_WORKGROUPS_PER_DIM`] spill into a second dimension; the
/// kernels rebuild the linear index from `num_workgroups` and skip the excess.
pub fn workgroup_counts(n_items: usize) -> (u32, u32) {
    let groups = n_items.div_ceil(WORKGROUP_SIZE as usize) as u64;
    let max = MAX_WORKGROUPS_PER_DIM as u64;
    if groups <= max {
        (groups as u32, 1)
    } else {
        (MAX_WORKGROUPS_PER_DIM, groups.div_ceil(max) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_grown_capacity() {
        assert_eq!(grown_capacity(0, 0), Some(1));
        assert_eq!(grown_capacity(1, 0), None);
        assert_eq!(grown_capacity(10, 4), None);
        assert_eq!(grown_capacity(10, 10), None);
        assert_eq!(grown_capacity(10, 11), Some(11));

        // Grow, then a smaller request keeps the larger buffer
        let mut cap = 0;
        for req in [7, 3, 12, 12, 1] {
            if let Some(c) = grown_capacity(cap, req) {
                assert!(c > cap);
                cap = c;
            }
            assert!(cap >= req.max(1));
        }
        assert_eq!(cap, 12);
    }

    #[test]
    fn test_workgroup_counts() {
        assert_eq!(workgroup_counts(0), (0, 1));
        assert_eq!(workgroup_counts(1), (1, 1));
        assert_eq!(workgroup_counts(64), (1, 1));
        assert_eq!(workgroup_counts(65), (2, 1));

        let n = 65535 * 64;
        assert_eq!(workgroup_counts(n), (65535, 1));
        assert_eq!(workgroup_counts(n + 1), (65535, 2));

        // Enough invocations for every item
        for n in [1usize, 1000, 4_194_305, 10_000_000] {
            let (x, y) = workgroup_counts(n);
            assert!(x as usize * y as usize * WORKGROUP_SIZE as usize >= n);
        }
    }

    #[test]
    fn test_load_kernel_source() {
        let mut f = NamedTempFile::new().expect("temp file");
        writeln!(f, "@compute @workgroup_size(64) fn render() {{}}").expect("write");
        let src = load_kernel_source(f.path()).expect("load");
        assert!(src.contains("workgroup_size"));
    }

    #[test]
    fn test_load_kernel_missing() {
        let err = load_kernel_source("no/such/kernel.wgsl").unwrap_err();
        assert!(matches!(err, Error::KernelMissing { .. }));
        assert!(err.is_construction_failure());

        let err = load_spirv("no/such/kernel.spv").unwrap_err();
        assert!(matches!(err, Error::KernelMissing { .. }));
    }

    #[test]
    fn test_load_kernel_empty() {
        let f = NamedTempFile::new().expect("temp file");
        assert!(matches!(
            load_kernel_source(f.path()),
            Err(Error::KernelMalformed { .. })
        ));
        assert!(matches!(load_spirv(f.path()), Err(Error::KernelMalformed { .. })));
    }

    #[test]
    fn test_load_spirv_bad_size() {
        let mut f = NamedTempFile::new().expect("temp file");
        f.write_all(&[0x03, 0x02, 0x23, 0x07, 0x00, 0x00]).expect("write");
        let err = load_spirv(f.path()).unwrap_err();
        assert!(matches!(err, Error::KernelMalformed { .. }));
        assert!(err.to_string().contains("multiple of 4"));
    }

    #[test]
    fn test_load_spirv_byte_order() {
        let mut le = NamedTempFile::new().expect("temp file");
        le.write_all(&SPIRV_MAGIC.to_le_bytes()).expect("write");
        le.write_all(&0x0001_0000u32.to_le_bytes()).expect("write");
        assert_eq!(load_spirv(le.path()).expect("load"), vec![SPIRV_MAGIC, 0x0001_0000]);

        let mut be = NamedTempFile::new().expect("temp file");
        be.write_all(&SPIRV_MAGIC.to_be_bytes()).expect("write");
        be.write_all(&0x0001_0000u32.to_be_bytes()).expect("write");
        assert_eq!(load_spirv(be.path()).expect("load"), vec![SPIRV_MAGIC, 0x0001_0000]);

        let mut bad = NamedTempFile::new().expect("temp file");
        bad.write_all(&[0u8; 8]).expect("write");
        assert!(matches!(load_spirv(bad.path()), Err(Error::KernelMalformed { .. })));
    }
}
