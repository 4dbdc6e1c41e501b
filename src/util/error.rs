//! Error types for the renderer.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for spath operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No adapter / physical device exposes a compute-capable queue
    #[error("No compatible compute device found: {0}")]
    NoDevice(String),

    /// Kernel file does not exist or cannot be read
    #[error("Can't load kernel '{path}': {source}")]
    KernelMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Kernel file exists but its content is unusable
    #[error("Invalid kernel '{path}': {reason}")]
    KernelMalformed { path: PathBuf, reason: String },

    /// Kernel failed to compile or link into a pipeline
    #[error("Kernel build failed: {0}")]
    KernelCompile(String),

    /// No suitable device memory for a buffer
    #[error("Can't allocate device memory: {0}")]
    DeviceMemory(String),

    /// Any other device API failure
    #[error("Device error: {0}")]
    Device(String),

    /// Triangle and material arrays differ in length
    #[error("Scene mismatch: {triangles} triangles but {materials} materials")]
    SceneMismatch { triangles: usize, materials: usize },

    /// Viewport ray count disagrees with its resolution
    #[error("Viewport mismatch: {rays} rays for {res_x}x{res_y}")]
    ViewportMismatch { rays: usize, res_x: usize, res_y: usize },

    /// Settings file could not be parsed or written
    #[error("Invalid settings: {0}")]
    Settings(String),

    /// Image encoding failed
    #[error("Image error: {0}")]
    Image(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a generic device error.
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    /// Create a kernel-malformed error.
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::KernelMalformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error belongs to the construction-failure class
    /// (a backend that reports one of these never becomes usable).
    pub fn is_construction_failure(&self) -> bool {
        matches!(
            self,
            Self::NoDevice(_)
                | Self::KernelMissing { .. }
                | Self::KernelMalformed { .. }
                | Self::KernelCompile(_)
                | Self::DeviceMemory(_)
                | Self::Device(_)
        )
    }
}

/// Result type alias for spath operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::SceneMismatch { triangles: 7, materials: 6 };
        assert!(e.to_string().contains("7"));
        assert!(e.to_string().contains("6"));

        let e = Error::malformed("comp.spv", "size is not a multiple of 4 bytes");
        assert!(e.to_string().contains("comp.spv"));
        assert!(e.to_string().contains("multiple of 4"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_construction_failure());
    }

    #[test]
    fn test_construction_class() {
        assert!(Error::NoDevice("none".into()).is_construction_failure());
        assert!(Error::KernelCompile("bad".into()).is_construction_failure());
        assert!(Error::DeviceMemory("oom".into()).is_construction_failure());
        assert!(!Error::Settings("x".into()).is_construction_failure());
    }
}
