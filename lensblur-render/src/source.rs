//! Kernel source loading.

use std::path::Path;

use lensblur_gpu_shared::shaders;

use crate::config::KernelSource;
use crate::error::{LensBlurError, Result};
use crate::programs::KernelId;

/// Read a whole program source. A missing or unreadable file is `FileNotFound`.
pub fn load_program(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| LensBlurError::FileNotFound {
        path: path.to_path_buf(),
        source,
    })
}

/// Source text of the three programs, not yet specialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSources {
    pub lens_blur: String,
    pub transpose_int: String,
    pub transpose_float: String,
}

impl ProgramSources {
    pub fn embedded() -> Self {
        Self {
            lens_blur: shaders::LENS_BLUR.to_owned(),
            transpose_int: shaders::TRANSPOSE_INT.to_owned(),
            transpose_float: shaders::TRANSPOSE_FLOAT.to_owned(),
        }
    }

    /// Load all three programs from `dir`. Fails on the first missing file.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        Ok(Self {
            lens_blur: load_program(&dir.join(KernelId::LensBlur.file_name()))?,
            transpose_int: load_program(&dir.join(KernelId::TransposeInt.file_name()))?,
            transpose_float: load_program(&dir.join(KernelId::TransposeFloat.file_name()))?,
        })
    }

    pub fn resolve(kernels: &KernelSource) -> Result<Self> {
        match kernels {
            KernelSource::Embedded => Ok(Self::embedded()),
            KernelSource::Directory(dir) => {
                log::info!("Loading kernel sources from {}", dir.display());
                Self::from_dir(dir)
            }
        }
    }

    pub fn get(&self, kernel: KernelId) -> &str {
        match kernel {
            KernelId::LensBlur => &self.lens_blur,
            KernelId::TransposeInt => &self.transpose_int,
            KernelId::TransposeFloat => &self.transpose_float,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lensblur-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_file_is_file_not_found() {
        let path = Path::new("/definitely/not/here/lens_blur.wgsl");
        match load_program(path) {
            Err(LensBlurError::FileNotFound { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected FileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_from_dir_reads_all_three() {
        let dir = scratch_dir("sources-ok");
        std::fs::write(dir.join("lens_blur.wgsl"), "// blur").unwrap();
        std::fs::write(dir.join("transpose_int.wgsl"), "// int").unwrap();
        std::fs::write(dir.join("transpose_float.wgsl"), "// float").unwrap();

        let sources = ProgramSources::from_dir(&dir).unwrap();
        assert_eq!(sources.get(KernelId::LensBlur), "// blur");
        assert_eq!(sources.get(KernelId::TransposeInt), "// int");
        assert_eq!(sources.get(KernelId::TransposeFloat), "// float");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_from_dir_reports_the_missing_file() {
        let dir = scratch_dir("sources-partial");
        std::fs::write(dir.join("lens_blur.wgsl"), "// blur").unwrap();

        match ProgramSources::from_dir(&dir) {
            Err(LensBlurError::FileNotFound { path, .. }) => {
                assert_eq!(path, dir.join("transpose_int.wgsl"));
            }
            other => panic!("expected FileNotFound, got {other:?}"),
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_embedded_sources() {
        let sources = ProgramSources::resolve(&KernelSource::Embedded).unwrap();
        assert!(sources.lens_blur.contains("fn lensBlur("));
        assert!(sources.transpose_float.contains("array<f32>"));
    }
}
