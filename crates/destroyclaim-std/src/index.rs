//! SHA-256 index over the files below a directory.

use crate::connector::DataConnector;
use dashmap::DashMap;
use destroyclaim_core::{Error, Result};
use globset::{GlobBuilder, GlobMatcher};
use ring::digest::{digest, Context, SHA256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const WIPE_CHUNK: usize = 64 * 1024;
const HASH_CHUNK: usize = 64 * 1024;

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex(digest(&SHA256, bytes).as_ref())
}

/// Lowercase hex SHA-256 of everything `reader` yields, read in chunks.
pub fn sha256_hex_reader(mut reader: impl Read) -> io::Result<String> {
    let mut context = Context::new(&SHA256);
    let mut buffer = vec![0u8; HASH_CHUNK];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => context.update(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(hex(context.finish().as_ref()))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Maps content hashes to files under `root` whose relative path matches `pattern`.
///
/// When two files share a hash the first in walk order (sorted by name) wins.
pub struct FileHashIndex {
    root: PathBuf,
    matcher: GlobMatcher,
    entries: DashMap<String, PathBuf>,
}

impl FileHashIndex {
    /// Scan `root` and return a populated index.
    pub async fn build(root: impl AsRef<Path>, pattern: &str) -> Result<Self> {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(false)
            .build()
            .map_err(|e| Error::invalid_argument(format!("invalid glob pattern: {}", e)))?
            .compile_matcher();
        let index = Self {
            root: root.as_ref().to_path_buf(),
            matcher,
            entries: DashMap::new(),
        };
        index.refresh().await?;
        Ok(index)
    }

    /// Rescan the directory, dropping entries whose files are gone.
    pub async fn refresh(&self) -> Result<usize> {
        let root = self.root.clone();
        let matcher = self.matcher.clone();
        let scanned = tokio::task::spawn_blocking(move || scan(&root, &matcher))
            .await
            .map_err(io::Error::other)??;

        self.entries.clear();
        for (hash, path) in scanned {
            self.entries.entry(hash).or_insert(path);
        }
        info!(root = %self.root.display(), files = self.entries.len(), "file hash index built");
        Ok(self.entries.len())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path_of(&self, hash: &str) -> Option<PathBuf> {
        self.entries
            .get(&hash.to_ascii_lowercase())
            .map(|entry| entry.value().clone())
    }

    fn locate(&self, hash: &str) -> Result<PathBuf> {
        self.path_of(hash).ok_or_else(|| {
            Error::IoError(io::Error::new(
                io::ErrorKind::NotFound,
                format!("data could not be destroyed: no file with sha256 {}", hash),
            ))
        })
    }

    fn forget(&self, hash: &str) {
        self.entries.remove(&hash.to_ascii_lowercase());
    }
}

fn scan(root: &Path, matcher: &GlobMatcher) -> io::Result<Vec<(String, PathBuf)>> {
    let mut scanned = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(path = ?err.path(), error = %err, "skipped while indexing");
                None
            }
        })
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel_path = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if !matcher.is_match(rel_path) {
            continue;
        }
        let hash = sha256_hex_reader(File::open(entry.path())?)?;
        debug!(path = %entry.path().display(), %hash, "indexed");
        scanned.push((hash, entry.path().to_path_buf()));
    }
    Ok(scanned)
}

#[async_trait::async_trait]
impl DataConnector for FileHashIndex {
    async fn exists(&self, hash: &str) -> bool {
        self.entries.contains_key(&hash.to_ascii_lowercase())
    }

    async fn destroy(&self, hash: &str) -> Result<PathBuf> {
        let path = self.locate(hash)?;
        tokio::fs::remove_file(&path).await?;
        self.forget(hash);
        info!(path = %path.display(), "destroyed");
        Ok(path)
    }

    async fn wipe(&self, hash: &str) -> Result<PathBuf> {
        let path = self.locate(hash)?;
        let len = tokio::fs::metadata(&path).await?.len();
        let mut file = tokio::fs::OpenOptions::new().write(true).open(&path).await?;
        let zeros = vec![0u8; WIPE_CHUNK];
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(WIPE_CHUNK as u64) as usize;
            file.write_all(&zeros[..n]).await?;
            remaining -= n as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::remove_file(&path).await?;
        self.forget(hash);
        info!(path = %path.display(), bytes = len, "wiped");
        Ok(path)
    }

    async fn simulate_destroy(&self, hash: &str) -> Result<PathBuf> {
        let path = self.locate(hash)?;
        info!(path = %path.display(), "simulated destroy");
        Ok(path)
    }
}
