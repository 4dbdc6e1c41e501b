//! Persistent render settings (JSON).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::gpu::{KERNEL_SPIRV_PATH, KERNEL_WGSL_PATH};
use crate::render::DEFAULT_SAMPLES;
use crate::util::{Error, Result};

/// Renderer families the driver can instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Host path tracer on a thread pool
    Cpu,
    /// Host albedo-only renderer
    CpuFlat,
    /// wgpu compute kernel
    Wgpu,
    /// Vulkan compute via vulkano
    Vulkan,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [Self::Cpu, Self::CpuFlat, Self::Wgpu, Self::Vulkan];

    pub fn name(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::CpuFlat => "cpu-flat",
            Self::Wgpu => "wgpu",
            Self::Vulkan => "vulkan",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Settings(format!("unknown backend '{s}'")))
    }
}

/// Settings for a render session. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Output
    pub width: usize,
    pub height: usize,
    pub output: PathBuf,

    // Sampling
    pub samples: u32,
    pub path_tracing: bool,

    // Backends, cycled in this order
    pub backends: Vec<BackendKind>,

    // Kernel files
    pub wgsl_kernel: PathBuf,
    pub spirv_kernel: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            output: PathBuf::from("render.png"),
            samples: DEFAULT_SAMPLES,
            path_tracing: true,
            backends: vec![BackendKind::Cpu],
            wgsl_kernel: PathBuf::from(KERNEL_WGSL_PATH),
            spirv_kernel: PathBuf::from(KERNEL_SPIRV_PATH),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut settings: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Settings(format!("{}: {e}", path.display())))?;
        settings.validate();
        Ok(settings)
    }

    /// Write settings as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| Error::Settings(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn validate(&mut self) {
        if self.samples == 0 {
            self.samples = 1;
        }
        if self.backends.is_empty() {
            self.backends = vec![BackendKind::Cpu];
        }
    }
}
