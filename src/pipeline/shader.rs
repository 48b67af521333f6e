//! Loading SPIR-V shader code for pass pipelines.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Resolves the shader file names of a [`PassDescriptor`](crate::PassDescriptor) to SPIR-V code.
pub trait ShaderLoader {
    /// Read the SPIR-V words of the shader called `name`.
    fn read_shader_file(&self, name: &str) -> Result<Vec<u32>>;
}

/// Loads compiled SPIR-V binaries from a directory on disk.
///
/// # Example
/// ```
/// # use whisper_graph::prelude::*;
/// let shaders = ShaderDirectory::new("assets/shaders");
/// // `forward.vert.spv` resolves to `assets/shaders/forward.vert.spv`
/// assert!(shaders.read_shader_file("forward.vert.spv").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ShaderDirectory {
    root: PathBuf,
}

impl ShaderDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ShaderLoader for ShaderDirectory {
    fn read_shader_file(&self, name: &str) -> Result<Vec<u32>> {
        let path = self.root.join(name);
        let mut file = File::open(&path).with_context(|| format!("Failed to open shader file {}", path.display()))?;
        let code = ash::util::read_spv(&mut file).with_context(|| format!("Invalid SPIR-V in {}", path.display()))?;
        Ok(code)
    }
}
