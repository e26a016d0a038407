//! Upload registry
//!
//! Tracks uploaded archives (and workbooks rendered from them) by filename,
//! each with a fixed expiry counted from upload. Expired entries are
//! invisible to lookups and are deleted from disk by `sweep`.
//!
//! A client that fetches a file close to its expiry can lose the race with
//! the sweeper; the request then sees 404 (or a read error if the sweep
//! lands mid-read). Uploads are not meant to be kept.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// A tracked upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// The uploaded archive
    pub path: PathBuf,
    /// Workbook rendered from it, if any
    pub rendered: Option<PathBuf>,
    pub expires_at: Instant,
}

impl Upload {
    fn files(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.path.as_path()).chain(self.rendered.as_deref())
    }
}

/// Filename-keyed uploads with a time-to-live
pub struct UploadRegistry {
    dir: PathBuf,
    ttl: Duration,
    entries: Mutex<HashMap<String, Upload>>,
}

impl UploadRegistry {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Where an upload with this name is stored
    pub fn upload_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Where the workbook rendered from this upload is stored
    pub fn rendered_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.xlsx", name))
    }

    /// Register an upload, replacing any earlier one with the same name
    ///
    /// A workbook rendered from the replaced upload is deleted.
    pub fn insert(&self, name: &str, path: PathBuf) -> Upload {
        self.insert_at(name, path, Instant::now())
    }

    fn insert_at(&self, name: &str, path: PathBuf, now: Instant) -> Upload {
        let upload = Upload {
            path,
            rendered: None,
            expires_at: now + self.ttl,
        };
        let replaced = self.lock().insert(name.to_string(), upload.clone());
        if let Some(rendered) = replaced.and_then(|old| old.rendered) {
            remove_file(&rendered);
        }
        debug!("Registered upload '{}' for {:?}", name, self.ttl);
        upload
    }

    /// Look up a live upload
    pub fn get(&self, name: &str) -> Option<Upload> {
        self.get_at(name, Instant::now())
    }

    fn get_at(&self, name: &str, now: Instant) -> Option<Upload> {
        self.lock()
            .get(name)
            .filter(|upload| upload.expires_at > now)
            .cloned()
    }

    /// Record the rendered workbook for an upload
    ///
    /// Returns false if the upload is unknown (e.g. already swept).
    pub fn set_rendered(&self, name: &str, rendered: PathBuf) -> bool {
        match self.lock().get_mut(name) {
            Some(upload) => {
                upload.rendered = Some(rendered);
                true
            }
            None => false,
        }
    }

    /// Number of tracked uploads, expired or not
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Remove expired uploads and delete their files
    ///
    /// Returns the names removed.
    pub fn sweep(&self) -> Vec<String> {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> Vec<String> {
        let expired: Vec<(String, Upload)> = {
            let mut entries = self.lock();
            let names: Vec<String> = entries
                .iter()
                .filter(|(_, upload)| upload.expires_at <= now)
                .map(|(name, _)| name.clone())
                .collect();
            names
                .into_iter()
                .filter_map(|name| entries.remove(&name).map(|upload| (name, upload)))
                .collect()
        };

        for (name, upload) in &expired {
            remove_files(upload);
            debug!("Swept expired upload '{}'", name);
        }

        expired.into_iter().map(|(name, _)| name).collect()
    }

    /// Remove every upload and its files
    pub fn clear(&self) {
        let drained: Vec<Upload> = self.lock().drain().map(|(_, upload)| upload).collect();
        for upload in &drained {
            remove_files(upload);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Upload>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn remove_files(upload: &Upload) {
    for path in upload.files() {
        remove_file(path);
    }
}

/// Best-effort removal; a file already gone is fine
pub fn remove_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}

/// Reduce a client-supplied filename to a bare file name
///
/// Rejects names that would escape the upload directory.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let base = Path::new(name.trim()).file_name()?.to_str()?;
    if base.is_empty() || base.starts_with('.') {
        return None;
    }
    Some(base.to_string())
}
