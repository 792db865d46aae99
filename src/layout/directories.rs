//! Conventional application directory layout.
//!
//! ```text
//! <root>/
//!   config/            logs/
//!   apps/<app>/
//!     public/ views/ tasks/ models/ http/ socket/
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::tree::{Mapping, Value};

/// Logical directory roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Root {
    Public,
    Views,
    Tasks,
    Models,
    Http,
    Socket,
    Logs,
    Config,
}

impl Root {
    pub const ALL: [Root; 8] = [
        Root::Public,
        Root::Views,
        Root::Tasks,
        Root::Models,
        Root::Http,
        Root::Socket,
        Root::Logs,
        Root::Config,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Root::Public => "public",
            Root::Views => "views",
            Root::Tasks => "tasks",
            Root::Models => "models",
            Root::Http => "http",
            Root::Socket => "socket",
            Root::Logs => "logs",
            Root::Config => "config",
        }
    }

    /// Whether the root lives under the application directory.
    pub fn is_app_scoped(&self) -> bool {
        !matches!(self, Root::Logs | Root::Config)
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Directories: Invalid root directory \"{0}\".")]
pub struct UnknownRoot(pub String);

impl FromStr for Root {
    type Err = UnknownRoot;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Root::ALL
            .into_iter()
            .find(|root| root.as_str() == s)
            .ok_or_else(|| UnknownRoot(s.to_string()))
    }
}

/// Resolves logical roots to absolute paths for one application.
#[derive(Debug, Clone)]
pub struct Directories {
    root: PathBuf,
    app_root: PathBuf,
    paths: BTreeMap<Root, PathBuf>,
}

impl Directories {
    pub fn new(root: impl Into<PathBuf>, app_name: &str) -> Self {
        let root = root.into();
        let app_root = root.join("apps").join(app_name);
        let paths = Root::ALL
            .into_iter()
            .map(|r| {
                let base = if r.is_app_scoped() { &app_root } else { &root };
                (r, base.join(r.as_str()))
            })
            .collect();

        Self {
            root,
            app_root,
            paths,
        }
    }

    /// Project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/apps/<app>`.
    pub fn app(&self) -> &Path {
        &self.app_root
    }

    pub fn get(&self, root: Root) -> &Path {
        // Every root is populated in `new`.
        self.paths.get(&root).map(PathBuf::as_path).unwrap_or(&self.root)
    }

    pub fn join(&self, root: Root, file: impl AsRef<Path>) -> PathBuf {
        self.get(root).join(file)
    }

    /// Non-hidden regular files directly under `root`, ordered by name.
    ///
    /// A missing directory yields no files.
    pub fn files(&self, root: Root) -> io::Result<Vec<PathBuf>> {
        let dir = self.get(root);
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn has_files(&self, root: Root) -> io::Result<bool> {
        Ok(!self.files(root)?.is_empty())
    }

    /// Root name → path mapping, the base of the parameter dictionary.
    pub fn to_value(&self) -> Value {
        let mut map = Mapping::new();
        for (root, path) in &self.paths {
            map.insert(
                Value::from(root.as_str()),
                Value::from(path.to_string_lossy().into_owned()),
            );
        }
        Value::Mapping(map)
    }
}

/// File stem used as the module / task identifier.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
