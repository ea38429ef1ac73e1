//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for the values the engine
//! passes around. Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// RemotePath
// ============================================================================

/// A path in the remote account (must start with /)
///
/// Represents paths as the delta feed reports them, e.g. "/Docs/a.txt".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemotePath(String);

impl RemotePath {
    /// Create a new RemotePath
    ///
    /// # Errors
    /// Returns error if the path is not absolute, contains empty segments
    /// (including a trailing slash), or contains a `.` or `..` segment
    pub fn new(path: String) -> Result<Self, DomainError> {
        if !path.starts_with('/') {
            return Err(DomainError::InvalidRemotePath(format!(
                "Remote path must start with '/': {path}"
            )));
        }

        if path.len() == 1 {
            return Ok(Self(path));
        }

        for segment in path[1..].split('/') {
            match segment {
                "" => {
                    return Err(DomainError::InvalidRemotePath(format!(
                        "Remote path contains an empty segment: {path}"
                    )))
                }
                "." | ".." => {
                    return Err(DomainError::InvalidRemotePath(format!(
                        "Remote path contains invalid traversal: {path}"
                    )))
                }
                _ => {}
            }
        }

        Ok(Self(path))
    }

    /// Create the root path "/"
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the account root
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// The path without its leading separator ("" for the root)
    #[must_use]
    pub fn relative(&self) -> &str {
        self.0.trim_start_matches('/')
    }
}

impl Display for RemotePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemotePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RemotePath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemotePath> for String {
    fn from(path: RemotePath) -> Self {
        path.0
    }
}

// ============================================================================
// WatchPath
// ============================================================================

/// A normalized subscription path: absolute, lower-cased, no trailing slash
///
/// Watch paths are compared against delta entries by plain string prefix:
/// an entry at `/a/b/c` belongs to `/a/b` because `/a/b` is a prefix of it.
/// The root `/` contains every entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WatchPath(String);

impl WatchPath {
    /// Normalize a user-supplied path into a WatchPath
    ///
    /// `None`, an empty string and `"/"` all mean the account root. A missing
    /// leading separator is added and trailing separators are dropped.
    ///
    /// # Errors
    /// Returns error if the normalized path is not a valid [`RemotePath`]
    pub fn parse(path: Option<&str>) -> Result<Self, DomainError> {
        let raw = path.map(str::trim).unwrap_or_default();
        let trimmed = raw.trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let absolute = if trimmed.starts_with('/') {
            trimmed.to_lowercase()
        } else {
            format!("/{}", trimmed.to_lowercase())
        };

        RemotePath::new(absolute.clone())
            .map_err(|e| DomainError::InvalidWatchPath(format!("{raw}: {e}")))?;

        Ok(Self(absolute))
    }

    /// The account root watch path
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this watch path is the account root
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Whether a remote entry path falls under this watch path
    #[must_use]
    pub fn contains(&self, remote_path: &str) -> bool {
        self.is_root() || remote_path.to_lowercase().starts_with(&self.0)
    }

    /// Whether either path falls under the other
    ///
    /// Commits for overlapping paths touch the same part of the mirror.
    #[must_use]
    pub fn overlaps(&self, other: &WatchPath) -> bool {
        self.contains(&other.0) || other.contains(&self.0)
    }

    /// This watch path as a remote path
    #[must_use]
    pub fn to_remote(&self) -> RemotePath {
        RemotePath(self.0.clone())
    }
}

impl Display for WatchPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WatchPath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(Some(s))
    }
}

impl TryFrom<String> for WatchPath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(Some(&s))
    }
}

impl From<WatchPath> for String {
    fn from(path: WatchPath) -> Self {
        path.0
    }
}

// ============================================================================
// Cursor
// ============================================================================

/// Delta feed position token (opaque string)
///
/// The token is opaque - we don't validate its contents, only that it's non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cursor(String);

impl Cursor {
    /// Create a new Cursor
    ///
    /// # Errors
    /// Returns error if the token is empty
    pub fn new(token: String) -> Result<Self, DomainError> {
        if token.is_empty() {
            return Err(DomainError::InvalidCursor(
                "Cursor cannot be empty".to_string(),
            ));
        }

        Ok(Self(token))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cursor {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Cursor {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Cursor> for String {
    fn from(cursor: Cursor) -> Self {
        cursor.0
    }
}

// ============================================================================
// AccountIdentity
// ============================================================================

/// Identity of one synchronized account: remote account uid + local root
///
/// At most one live engine exists per identity. The root is stored in
/// normalized absolute form so `/home/u/box/` and `/home/u/./box` are the
/// same identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountIdentity {
    uid: String,
    root: PathBuf,
}

impl AccountIdentity {
    /// Create a new AccountIdentity
    ///
    /// # Errors
    /// Returns error if the uid is empty or the root is not absolute
    pub fn new(uid: impl Into<String>, root: impl Into<PathBuf>) -> Result<Self, DomainError> {
        let uid = uid.into();
        let root = root.into();

        if uid.trim().is_empty() {
            return Err(DomainError::InvalidAccount(
                "Account uid cannot be empty".to_string(),
            ));
        }

        if !root.is_absolute() {
            return Err(DomainError::InvalidAccount(format!(
                "Local root must be absolute: {}",
                root.display()
            )));
        }

        let root = Self::normalize_root(&root)?;
        Ok(Self { uid, root })
    }

    /// Remote account uid
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Local mirror root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a remote path onto the local mirror
    ///
    /// Strips the leading separator and joins the rest onto the root. The
    /// mapping is a structural join, so distinct remote paths never collide.
    #[must_use]
    pub fn to_local_path(&self, remote: &RemotePath) -> PathBuf {
        if remote.is_root() {
            self.root.clone()
        } else {
            self.root.join(remote.relative())
        }
    }

    /// Normalize a path by resolving . and .. components
    fn normalize_root(path: &Path) -> Result<PathBuf, DomainError> {
        let mut normalized = PathBuf::new();

        for component in path.components() {
            match component {
                Component::Prefix(p) => normalized.push(p.as_os_str()),
                Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(DomainError::InvalidAccount(
                            "Local root escapes filesystem root via ..".to_string(),
                        ));
                    }
                }
                Component::Normal(c) => normalized.push(c),
            }
        }

        Ok(normalized)
    }
}

impl Display for AccountIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.uid, self.root.display())
    }
}
