//! Configuration loading from disk.
//!
//! # Pipeline
//! ```text
//! <config>/<app>.<env>.yml
//!     → read text
//!     → preprocess (`@import:` → `_import:`)
//!     → parse YAML
//!     → merge `_import` files depth-first (importer wins)
//!     → strip `_import`
//!     → interpolate `${…}` parameters
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::params::Params;
use crate::layout::{Directories, Root};
use crate::tree::{self, Mapping, Value};

/// Reserved key listing files to merge beneath a document.
pub const IMPORT_KEY: &str = "_import";

/// Alternate spelling rewritten to [`IMPORT_KEY`] before parsing.
pub const IMPORT_MARKER: &str = "@import:";

/// App name whose configuration lives at `<root>/_config.yml`.
pub const TEST_APP: &str = "tests";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {}", .path.display(), .source)]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Import cycle: {}", format_chain(.chain))]
    ImportCycle { chain: Vec<PathBuf> },

    #[error("Invalid _import in {}: expected a file name or a list of file names", .path.display())]
    InvalidImport { path: PathBuf },

    #[error("Param \"${{{param}}}\" found with no value. At \"{property}\".")]
    MissingParameter { param: String, property: String },

    #[error("Invalid settings: {0}")]
    Settings(#[source] serde_yaml::Error),
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Rewrite alternate import markers to the reserved key.
pub fn preprocess(source: &str) -> String {
    source.replace(IMPORT_MARKER, &format!("{}:", IMPORT_KEY))
}

/// Loads an application's configuration tree.
pub struct ConfigLoader<'a> {
    dirs: &'a Directories,
    env: String,
    params: Params,
}

impl<'a> ConfigLoader<'a> {
    pub fn new(dirs: &'a Directories, env: impl Into<String>, params: Params) -> Self {
        Self {
            dirs,
            env: env.into(),
            params,
        }
    }

    /// Conventional path of the base file for `app_name`.
    pub fn base_file(&self, app_name: &str) -> PathBuf {
        if app_name == TEST_APP {
            self.dirs.root().join("_config.yml")
        } else {
            self.dirs
                .join(Root::Config, format!("{}.{}.yml", app_name, self.env))
        }
    }

    /// Load, merge and interpolate the configuration for `app_name`.
    pub fn load(&self, app_name: &str) -> Result<Value, ConfigError> {
        let file = self.base_file(app_name);
        let merged = self.load_file(&file)?;
        let config = self.params.interpolate(merged)?;

        tracing::debug!(
            app = %app_name,
            env = %self.env,
            file = %file.display(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Read `file` and merge its imports, without interpolation.
    pub fn load_file(&self, file: &Path) -> Result<Value, ConfigError> {
        let mut chain = Vec::new();
        self.read(file, &mut chain)
    }

    fn read(&self, file: &Path, chain: &mut Vec<PathBuf>) -> Result<Value, ConfigError> {
        let file = normalize(file);
        if chain.contains(&file) {
            let mut cycle = chain.clone();
            cycle.push(file);
            return Err(ConfigError::ImportCycle { chain: cycle });
        }

        let raw = fs::read_to_string(&file).map_err(|source| ConfigError::Read {
            path: file.clone(),
            source,
        })?;
        let text = preprocess(&raw);
        let document: Value = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: file.clone(),
            source,
        })?;
        let document = match document {
            Value::Null => Value::Mapping(Mapping::new()),
            other => other,
        };

        chain.push(file.clone());
        let merged = self.merge_imports(&file, document, chain);
        chain.pop();
        merged
    }

    fn merge_imports(
        &self,
        file: &Path,
        mut document: Value,
        chain: &mut Vec<PathBuf>,
    ) -> Result<Value, ConfigError> {
        let imports = match document.as_mapping_mut() {
            Some(map) => map.remove(IMPORT_KEY),
            None => None,
        };
        let Some(imports) = imports else {
            return Ok(document);
        };

        let names: Vec<String> = match imports {
            Value::String(name) => vec![name],
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(name) => Ok(name),
                    _ => Err(ConfigError::InvalidImport {
                        path: file.to_path_buf(),
                    }),
                })
                .collect::<Result<_, _>>()?,
            Value::Null => Vec::new(),
            _ => {
                return Err(ConfigError::InvalidImport {
                    path: file.to_path_buf(),
                })
            }
        };

        let mut base = Value::Mapping(Mapping::new());
        for name in names {
            let child = self.read(&self.dirs.join(Root::Config, &name), chain)?;
            tracing::trace!(file = %file.display(), import = %name, "Merging import");
            tree::deep_merge(&mut base, child);
        }
        tree::deep_merge(&mut base, document);
        Ok(base)
    }
}

/// Collapse `.` and `..` components so cycle detection compares like paths.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
