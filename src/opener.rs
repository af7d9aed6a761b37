//! Source intake.
//!
//! The compiler never touches the filesystem directly; it asks an
//! [`Opener`] for the bytes behind a canonicalized import path. Adapters
//! cover the common cases: an in-memory map for tests and tooling, a
//! filesystem search path, and a chain that tries several in turn.

use std::fmt;
use std::io;
use std::path::PathBuf;

use bytes::Bytes;
use rustc_hash::FxHashMap;

/// A successfully opened source file.
#[derive(Clone, Debug)]
pub struct Opened {
    /// The path the file is known by, usually the import path itself.
    pub path: String,
    pub bytes: Bytes,
}

#[derive(Debug)]
pub enum OpenError {
    NotFound,
    Io(io::Error),
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenError::NotFound => f.write_str("file not found"),
            OpenError::Io(error) => write!(f, "i/o error: {error}"),
        }
    }
}

impl std::error::Error for OpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OpenError::NotFound => None,
            OpenError::Io(error) => Some(error),
        }
    }
}

/// Resolves import paths to source bytes.
pub trait Opener: Send + Sync {
    fn open(&self, path: &str) -> Result<Opened, OpenError>;
}

/// Cleans an import path: forward slashes, no `.` segments, `..`
/// collapsed where possible.
pub fn clean_import_path(path: &str) -> String {
    let cleaned = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for part in cleaned.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }
    parts.join("/")
}

/// In-memory sources, for tests and embedded schemas.
#[derive(Default)]
pub struct MapOpener {
    files: FxHashMap<String, Bytes>,
}

impl MapOpener {
    pub fn new() -> MapOpener {
        MapOpener::default()
    }

    pub fn add(mut self, path: impl Into<String>, text: impl Into<Bytes>) -> MapOpener {
        self.insert(path, text);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, text: impl Into<Bytes>) {
        self.files.insert(clean_import_path(&path.into()), text.into());
    }
}

impl Opener for MapOpener {
    fn open(&self, path: &str) -> Result<Opened, OpenError> {
        match self.files.get(path) {
            Some(bytes) => Ok(Opened {
                path: path.to_string(),
                bytes: bytes.clone(),
            }),
            None => Err(OpenError::NotFound),
        }
    }
}

/// Searches a list of root directories, first hit wins.
pub struct FsOpener {
    roots: Vec<PathBuf>,
}

impl FsOpener {
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> FsOpener {
        FsOpener {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }
}

impl Opener for FsOpener {
    fn open(&self, path: &str) -> Result<Opened, OpenError> {
        for root in &self.roots {
            let candidate = root.join(path);
            match std::fs::read(&candidate) {
                Ok(bytes) => {
                    return Ok(Opened {
                        path: path.to_string(),
                        bytes: Bytes::from(bytes),
                    })
                }
                Err(error) if error.kind() == io::ErrorKind::NotFound => continue,
                Err(error) => return Err(OpenError::Io(error)),
            }
        }
        Err(OpenError::NotFound)
    }
}

/// Tries each opener in turn; the first non-`NotFound` answer wins.
pub struct ChainOpener {
    openers: Vec<Box<dyn Opener>>,
}

impl ChainOpener {
    pub fn new(openers: Vec<Box<dyn Opener>>) -> ChainOpener {
        ChainOpener { openers }
    }
}

impl Opener for ChainOpener {
    fn open(&self, path: &str) -> Result<Opened, OpenError> {
        for opener in &self.openers {
            match opener.open(path) {
                Err(OpenError::NotFound) => continue,
                other => return other,
            }
        }
        Err(OpenError::NotFound)
    }
}
