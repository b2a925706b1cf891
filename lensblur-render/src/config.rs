//! Session configuration: backend choice, kernel source location, build options.

use std::path::PathBuf;

/// Environment variable naming a directory to load kernel sources from.
pub const KERNEL_DIR_ENV: &str = "LENSBLUR_KERNEL_DIR";
/// Environment variable that, when `1` or `true`, accepts CPU-type adapters.
pub const ALLOW_SOFTWARE_ENV: &str = "LENSBLUR_ALLOW_SOFTWARE";

/// Options applied to every program at compile time.
///
/// WGSL has no compiler flags, so options become module-scope constants
/// prepended to each program source (see [`BuildOptions::prelude`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Trade exact division for reciprocal multiplication in the blur kernel.
    pub fast_relaxed_math: bool,
}

impl BuildOptions {
    /// The fixed option set every program is built with.
    pub const FAST_RELAXED_MATH: Self = Self { fast_relaxed_math: true };

    /// Declarations prepended to a program before compilation.
    pub fn prelude(&self) -> String {
        format!("const RELAXED_MATH: bool = {};\n", self.fast_relaxed_math)
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::FAST_RELAXED_MATH
    }
}

/// Where the three kernel sources come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelSource {
    /// Sources compiled into `lensblur-gpu-shared`.
    Embedded,
    /// `lens_blur.wgsl`, `transpose_int.wgsl` and `transpose_float.wgsl` in a directory.
    Directory(PathBuf),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
    pub kernels: KernelSource,
    pub build_options: BuildOptions,
    /// Accept llvmpipe/WARP-style adapters. Off by default: the effect must
    /// not silently degrade to software execution.
    pub allow_software_adapter: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::PRIMARY,
            power_preference: wgpu::PowerPreference::HighPerformance,
            kernels: KernelSource::Embedded,
            build_options: BuildOptions::default(),
            allow_software_adapter: false,
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by `LENSBLUR_KERNEL_DIR`, `LENSBLUR_ALLOW_SOFTWARE`
    /// and `WGPU_BACKEND`.
    pub fn from_env() -> Self {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok());
        if let Some(backends) = wgpu::util::backend_bits_from_env() {
            config.backends = backends;
        }
        config
    }

    /// Same as [`SessionConfig::from_env`] for the crate's own variables,
    /// reading them through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup(KERNEL_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            config.kernels = KernelSource::Directory(PathBuf::from(dir));
        }
        if let Some(flag) = lookup(ALLOW_SOFTWARE_ENV) {
            config.allow_software_adapter = parse_flag(&flag);
        }
        config
    }

    pub fn with_kernel_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.kernels = KernelSource::Directory(dir.into());
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.kernels, KernelSource::Embedded);
        assert_eq!(config.build_options, BuildOptions::FAST_RELAXED_MATH);
        assert!(!config.allow_software_adapter);
    }

    #[test]
    fn test_prelude() {
        assert_eq!(
            BuildOptions::FAST_RELAXED_MATH.prelude(),
            "const RELAXED_MATH: bool = true;\n"
        );
        let exact = BuildOptions { fast_relaxed_math: false };
        assert_eq!(exact.prelude(), "const RELAXED_MATH: bool = false;\n");
    }

    #[test]
    fn test_lookup_kernel_dir_and_software_flag() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            (KERNEL_DIR_ENV, "/opt/lensblur/kernels"),
            (ALLOW_SOFTWARE_ENV, "TRUE"),
        ]));
        assert_eq!(
            config.kernels,
            KernelSource::Directory(PathBuf::from("/opt/lensblur/kernels"))
        );
        assert!(config.allow_software_adapter);
    }

    #[test]
    fn test_lookup_ignores_blank_dir() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            (KERNEL_DIR_ENV, "  "),
            (ALLOW_SOFTWARE_ENV, "0"),
        ]));
        assert_eq!(config.kernels, KernelSource::Embedded);
        assert!(!config.allow_software_adapter);
    }
}
