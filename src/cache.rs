//! On-disk cache of downloaded Space audio, keyed by a title-derived name.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Weak},
};

use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::humanize::{DEFAULT_FILENAME, strip_forbidden};

const CACHED_EXT: &str = "mp3";
const STEM_CHARS: usize = 30;
const HASH_HEX_CHARS: usize = 8;
/// Extensions the extractor may leave behind when transcoding is skipped.
const ALTERNATE_EXTS: [&str; 4] = ["mp3", "m4a", "webm", "mp4"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
}

pub struct DownloadCache {
    dir: PathBuf,
    claims: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl DownloadCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            claims: Mutex::new(HashMap::new()),
        }
    }

    pub async fn prepare(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// yt-dlp output template that lands next to `filename` with whatever
    /// extension the extractor produces.
    pub fn output_template(&self, filename: &str) -> String {
        let stem = Path::new(filename)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(filename);
        format!("{}.%(ext)s", self.dir.join(stem).to_string_lossy())
    }

    /// Serializes work on one cache entry. Holders of the same filename run
    /// one at a time; the claim is released when the guard drops.
    pub async fn claim(&self, filename: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut claims = self.claims.lock().await;
            claims.retain(|_, claim| claim.strong_count() > 0);

            match claims.get(filename).and_then(Weak::upgrade) {
                Some(entry) => entry,
                None => {
                    let entry = Arc::new(Mutex::new(()));
                    claims.insert(filename.to_string(), Arc::downgrade(&entry));
                    entry
                }
            }
        };

        entry.lock_owned().await
    }

    pub async fn lookup(&self, filename: &str) -> std::io::Result<Option<CachedFile>> {
        let path = self.path_for(filename);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(CachedFile {
                filename: filename.to_string(),
                path,
                size: metadata.len(),
            })),
            Ok(_) => Ok(None),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Locates a freshly downloaded file. When the extractor wrote a sibling
    /// with another extension, the first match is renamed to `filename`.
    pub async fn settle(&self, filename: &str) -> std::io::Result<Option<CachedFile>> {
        if let Some(found) = self.lookup(filename).await? {
            return Ok(Some(found));
        }

        let stem = Path::new(filename)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(filename);

        for ext in ALTERNATE_EXTS {
            let candidate = format!("{stem}.{ext}");
            if self.lookup(&candidate).await?.is_none() {
                continue;
            }

            debug!("Renaming {candidate} to {filename}");
            tokio::fs::rename(self.path_for(&candidate), self.path_for(filename)).await?;
            return self.lookup(filename).await;
        }

        Ok(None)
    }

    /// Resolves a client-supplied name to a cached file. Only the final path
    /// component is honoured.
    pub async fn resolve_served(&self, requested: &str) -> std::io::Result<Option<CachedFile>> {
        let Some(basename) = Path::new(requested)
            .file_name()
            .and_then(|name| name.to_str())
        else {
            return Ok(None);
        };

        let found = self.lookup(basename).await?;
        if found.is_some() {
            info!("Serving cached file {basename}");
        }
        Ok(found)
    }
}

/// `<sanitized title, 30 chars>_<8 hex of SHA-256(title)>.mp3`
pub fn cached_filename(title: &str) -> String {
    let title = if title.is_empty() {
        DEFAULT_FILENAME
    } else {
        title
    };

    let stem: String = strip_forbidden(title).chars().take(STEM_CHARS).collect();
    let digest = format!("{:x}", Sha256::digest(title.as_bytes()));

    format!("{stem}_{}.{CACHED_EXT}", &digest[..HASH_HEX_CHARS])
}
