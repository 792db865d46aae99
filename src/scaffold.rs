//! Application scaffolding for `hearth-cli new`.
//!
//! Creates the conventional tree and starter configuration under a project
//! root. Existing directories and files are left untouched, so running it
//! twice is harmless.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::layout::{Directories, Root};

const DEFAULT_CONFIG: &str = "\
http:
  bind_address: \"0.0.0.0:3000\"
  request_timeout_secs: 30
  serve_static: true
log:
  level: info
socket:
  path: /socket
tasks:
  files: []
";

const DEVELOPMENT_CONFIG: &str = "\
@import: default.yml
log:
  level: debug
";

const PRODUCTION_CONFIG: &str = "\
@import: default.yml
log:
  level: info
  json: true
  file: ${env}.log
";

/// What a scaffolding run created.
#[derive(Debug, Default)]
pub struct Scaffold {
    pub directories: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
}

impl Scaffold {
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.files.is_empty()
    }
}

/// Create the tree for application `app` under `root`.
pub fn new_app(root: &Path, app: &str) -> io::Result<Scaffold> {
    let dirs = Directories::new(root, app);
    let mut scaffold = Scaffold::default();

    let mut wanted = vec![
        dirs.get(Root::Config).to_path_buf(),
        dirs.get(Root::Logs).to_path_buf(),
    ];
    wanted.extend(
        [Root::Http, Root::Socket, Root::Models, Root::Views, Root::Tasks, Root::Public]
            .into_iter()
            .map(|r| dirs.get(r).to_path_buf()),
    );
    for dir in wanted {
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            tracing::info!(path = %dir.display(), "Created directory");
            scaffold.directories.push(dir);
        }
    }

    let files = [
        (dirs.join(Root::Config, "default.yml"), DEFAULT_CONFIG),
        (
            dirs.join(Root::Config, format!("{}.development.yml", app)),
            DEVELOPMENT_CONFIG,
        ),
        (
            dirs.join(Root::Config, format!("{}.production.yml", app)),
            PRODUCTION_CONFIG,
        ),
    ];
    for (path, contents) in files {
        if path.exists() {
            tracing::debug!(path = %path.display(), "File exists, skipped");
            continue;
        }
        fs::write(&path, contents)?;
        tracing::info!(path = %path.display(), "Created file");
        scaffold.files.push(path);
    }

    Ok(scaffold)
}
