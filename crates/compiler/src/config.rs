//! Compiler configuration
//!
//! Options the CLI (or an embedding project) hands to the pipeline: the
//! pack namespace, the description stamped into `pack.mcmeta`, and where
//! the build tree and archive land.

use std::path::{Path, PathBuf};

/// Pack format understood by the game versions the generated commands target
pub const DEFAULT_PACK_FORMAT: u32 = 1;

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Pack namespace; defaults to the input file stem
    pub pack_name: Option<String>,

    /// Description written into `pack.mcmeta`
    pub description: String,

    /// `pack_format` written into `pack.mcmeta`
    pub pack_format: u32,

    /// Directory receiving `build/` and `dist/`; defaults to the input's
    /// parent directory
    pub out_dir: Option<PathBuf>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            pack_name: None,
            description: "Generated using MineScript".to_string(),
            pack_format: DEFAULT_PACK_FORMAT,
            out_dir: None,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Set the pack namespace (builder pattern)
    pub fn with_pack_name(mut self, name: impl Into<String>) -> Self {
        self.pack_name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_pack_format(mut self, pack_format: u32) -> Self {
        self.pack_format = pack_format;
        self
    }

    pub fn with_out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = Some(dir.into());
        self
    }

    /// The pack namespace for `input`: the configured name, or the file
    /// stem squeezed into the characters a namespace allows
    pub fn resolve_pack_name(&self, input: &Path) -> String {
        if let Some(name) = &self.pack_name {
            return name.clone();
        }
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pack".to_string());
        sanitize_namespace(&stem)
    }
}

/// Namespaces allow `[a-z0-9_.-]`; everything else becomes `_`
fn sanitize_namespace(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "pack".to_string()
    } else {
        cleaned
    }
}
