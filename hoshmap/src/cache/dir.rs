//! # Directory Cache
//!
//! One JSON document per identity.
//!
//! ## Cache Structure
//!
//! ```text
//! ~/.hoshmap/cache/
//! └── v1/                    # Version prefix for format changes
//!     └── objects/           # Content by id prefix
//!         ├── 0b/
//!         │   └── 1f4c6a2d93e07f....json
//!         └── ...
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::{CacheError, CacheTier};
use crate::content::Content;

/// Cache format version. Increment when changing the layout.
pub const CACHE_VERSION: u32 = 1;

/// Cache tier backed by a directory tree.
#[derive(Debug, Clone)]
pub struct DirCache {
    root: PathBuf,
    name: String,
}

impl DirCache {
    /// Opens (creating if needed) a cache rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        let cache = Self {
            name: format!("dir:{}", root.display()),
            root,
        };
        fs::create_dir_all(cache.objects_dir())?;
        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join(format!("v{}", CACHE_VERSION)).join("objects")
    }

    fn object_path(&self, id: &str) -> Result<PathBuf, CacheError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CacheError::InvalidKey(id.to_string()));
        }
        let (prefix, rest) = if id.len() > 2 { id.split_at(2) } else { ("_", id) };
        Ok(self.objects_dir().join(prefix).join(format!("{}.json", rest)))
    }
}

impl CacheTier for DirCache {
    fn contains(&self, id: &str) -> Result<bool, CacheError> {
        Ok(self.object_path(id)?.is_file())
    }

    fn get(&self, id: &str) -> Result<Option<Content>, CacheError> {
        let path = self.object_path(id)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let content = serde_json::from_str(&text)
            .map_err(|e| CacheError::Corrupted(format!("{}: {}", path.display(), e)))?;
        Ok(Some(content))
    }

    fn set(&self, id: &str, content: &Content) -> Result<(), CacheError> {
        let path = self.object_path(id)?;
        let dir = path.parent().map_or_else(|| self.objects_dir(), Path::to_path_buf);
        fs::create_dir_all(&dir)?;
        // Each writer gets its own temporary file; readers never see partial documents.
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&serde_json::to_vec(content)?)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
