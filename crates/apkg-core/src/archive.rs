//! Archive extraction
//!
//! Unpacks a deck package into a working directory and locates the
//! collection database inside it.
//!
//! The working directory is either supplied by the caller (kept after the
//! session) or a fresh temporary directory owned by the session (removed
//! when it is dropped or closed).

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{ApkgError, ApkgResult};

/// Database filenames probed after extraction, in priority order
pub const DATABASE_NAMES: [&str; 2] = ["collection.anki21", "collection.anki2"];

/// Directory an archive was extracted into
#[derive(Debug)]
pub enum ExtractDir {
    /// Created for this session; deleted on drop
    Ephemeral(TempDir),
    /// Supplied by the caller; left in place
    Provided(PathBuf),
}

impl ExtractDir {
    /// Create the extraction directory
    ///
    /// With no path, a uniquely named temporary directory is created.
    pub fn create(path: Option<&Path>) -> ApkgResult<Self> {
        match path {
            Some(dir) => {
                fs::create_dir_all(dir).map_err(|source| ApkgError::Extract {
                    path: dir.to_path_buf(),
                    source,
                })?;
                Ok(ExtractDir::Provided(dir.to_path_buf()))
            }
            None => {
                let temp = tempfile::Builder::new()
                    .prefix("apkg-")
                    .tempdir()
                    .map_err(|source| ApkgError::Extract {
                        path: std::env::temp_dir(),
                        source,
                    })?;
                Ok(ExtractDir::Ephemeral(temp))
            }
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ExtractDir::Ephemeral(temp) => temp.path(),
            ExtractDir::Provided(path) => path,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, ExtractDir::Ephemeral(_))
    }

    /// Remove the directory if this session created it
    ///
    /// Unlike dropping, this reports a failed removal.
    pub fn close(self) -> ApkgResult<()> {
        match self {
            ExtractDir::Ephemeral(temp) => {
                let path = temp.path().to_path_buf();
                temp.close()
                    .map_err(|source| ApkgError::Extract { path, source })
            }
            ExtractDir::Provided(_) => Ok(()),
        }
    }
}

/// Decompress the whole archive into `dest`
pub fn extract(archive_path: &Path, dest: &Path) -> ApkgResult<()> {
    let file =
        File::open(archive_path).map_err(|e| ApkgError::from_io(e, archive_path.to_path_buf()))?;

    let mut archive = ZipArchive::new(file).map_err(|source| ApkgError::ArchiveCorrupt {
        path: archive_path.to_path_buf(),
        source,
    })?;

    debug!(
        "Extracting {} entries from {:?} into {:?}",
        archive.len(),
        archive_path,
        dest
    );

    remove_stale_databases(dest)?;

    archive.extract(dest).map_err(|err| match err {
        ZipError::Io(source) => ApkgError::Extract {
            path: dest.to_path_buf(),
            source,
        },
        source => ApkgError::ArchiveCorrupt {
            path: archive_path.to_path_buf(),
            source,
        },
    })
}

/// Remove databases left in `dir` by an earlier extraction
///
/// A reused directory must only ever expose the database of the archive
/// just extracted.
fn remove_stale_databases(dir: &Path) -> ApkgResult<()> {
    for name in DATABASE_NAMES {
        let path = dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(ApkgError::Extract { path, source }),
        }
    }
    Ok(())
}

/// Find the collection database in an extraction directory
pub fn locate_database(dir: &Path) -> ApkgResult<PathBuf> {
    DATABASE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| ApkgError::DatabaseNotFound {
            dir: dir.to_path_buf(),
        })
}

/// Move the database to `target`
///
/// Falls back to copy and remove when a rename is not possible (for
/// example across filesystems).
pub fn relocate_database(from: &Path, target: &Path) -> ApkgResult<PathBuf> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ApkgError::Extract {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    if fs::rename(from, target).is_err() {
        fs::copy(from, target).map_err(|source| ApkgError::Extract {
            path: target.to_path_buf(),
            source,
        })?;
        fs::remove_file(from).map_err(|source| ApkgError::Extract {
            path: from.to_path_buf(),
            source,
        })?;
    }

    debug!("Moved collection database to {:?}", target);
    Ok(target.to_path_buf())
}
