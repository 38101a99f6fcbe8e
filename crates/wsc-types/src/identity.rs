use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Stable identity for a watched repository.
///
/// A `RepositoryId` is built from the path of the repository's metadata
/// directory (e.g. `/work/project/.git`). When the directory exists the path
/// is canonicalized so that two spellings of the same location map to the
/// same key; otherwise the path is used as given. Equality, ordering and
/// hashing all follow the path.
///
/// The BLAKE3 digest of the path is kept alongside for compact log fields.
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "PathBuf", into = "PathBuf")]
pub struct RepositoryId {
    path: PathBuf,
    digest: [u8; 32],
}

impl RepositoryId {
    /// Create an identity from a metadata directory path.
    ///
    /// The path is canonicalized if it exists on disk.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Self::from(path)
    }

    /// Create an identity from a path that must exist on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TypeError> {
        let path = path.as_ref();
        let canonical = path
            .canonicalize()
            .map_err(|e| TypeError::InvalidRepositoryPath(format!("{}: {e}", path.display())))?;
        Ok(Self::from(canonical))
    }

    /// The metadata directory path this identity was built from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The raw 32-byte digest of the path.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.digest
    }

    /// Full hex-encoded digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.digest)
    }

    /// Short identifier (first 8 hex characters of the digest).
    pub fn short_id(&self) -> String {
        format!("repo:{}", hex::encode(&self.digest[..4]))
    }

    fn digest_of(path: &Path) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"wsc-repository-v1:");
        hasher.update(path.as_os_str().as_encoded_bytes());
        *hasher.finalize().as_bytes()
    }
}

impl From<PathBuf> for RepositoryId {
    fn from(path: PathBuf) -> Self {
        let digest = Self::digest_of(&path);
        Self { path, digest }
    }
}

impl From<RepositoryId> for PathBuf {
    fn from(id: RepositoryId) -> Self {
        id.path
    }
}

impl PartialEq for RepositoryId {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for RepositoryId {}

impl Hash for RepositoryId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl PartialOrd for RepositoryId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RepositoryId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.path.cmp(&other.path)
    }
}

impl fmt::Debug for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepositoryId({})", self.path.display())
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
