//! Token store for the session's credential pair and cached user profile
//!
//! `TokenStore` is the seam every HTTP client reads credentials through.
//! Two implementations ship: `MemoryTokenStore` (no persistence, used as the
//! test fake) and `FileTokenStore`, which keeps one JSON document keyed by
//! `access_token`, `refresh_token` and `user` and rewrites it atomically
//! (temp file + rename) on every mutation.
//!
//! Reads and writes never fail from the caller's point of view. A missing or
//! unparseable session file reads as logged out; persistence failures are
//! logged and the in-memory state stays authoritative for the process.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use common::Secret;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY};
use crate::error::{Error, Result};

/// Access/refresh bearer pair identifying a session.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access: Secret<String>,
    pub refresh: Option<Secret<String>>,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: Option<String>) -> Self {
        Self {
            access: Secret::new(access.into()),
            refresh: refresh.map(Secret::new),
        }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access", &self.access)
            .field("has_refresh", &self.refresh.is_some())
            .finish()
    }
}

/// Denormalized snapshot of the authenticated identity, for display only.
///
/// Unknown fields the backend sends are kept in `extra` so a round trip
/// through the store loses nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    /// Name to show in a header or greeting: full name, then first + last,
    /// then the email address.
    pub fn display_name(&self) -> String {
        if let Some(full) = self.full_name.as_deref().filter(|s| !s.trim().is_empty()) {
            return full.trim().to_string();
        }
        let joined = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if joined.is_empty() {
            self.email.clone()
        } else {
            joined
        }
    }
}

/// Backends disagree on whether user ids are integers or UUID strings.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Holder of the credential pair and cached profile.
///
/// Implementations must make `clear` observable as a single step: no read
/// after `clear` returns may see part of the old session.
pub trait TokenStore: Send + Sync {
    fn access_token(&self) -> Option<String>;

    fn refresh_token(&self) -> Option<String>;

    /// Overwrite the access token; overwrite the refresh token only when one
    /// is supplied (rotation is optional per call site).
    fn set_tokens(&self, access: &str, refresh: Option<&str>);

    fn set_user(&self, user: &UserProfile);

    /// Cached profile. A stored value that no longer decodes reads as `None`.
    fn user(&self) -> Option<UserProfile>;

    fn clear(&self);

    /// Both tokens as a pair, if an access token is stored.
    fn credentials(&self) -> Option<CredentialPair> {
        self.access_token()
            .map(|access| CredentialPair::new(access, self.refresh_token()))
    }
}

/// Serialized shape of the session key space.
#[derive(Default, Clone, Serialize, Deserialize)]
struct SessionState {
    #[serde(rename = "access_token", default, skip_serializing_if = "Option::is_none")]
    access: Option<String>,
    #[serde(rename = "refresh_token", default, skip_serializing_if = "Option::is_none")]
    refresh: Option<String>,
    #[serde(rename = "user", default, skip_serializing_if = "Option::is_none")]
    user: Option<serde_json::Value>,
}

impl SessionState {
    fn apply_tokens(&mut self, access: &str, refresh: Option<&str>) {
        self.access = Some(access.to_string());
        if let Some(refresh) = refresh {
            self.refresh = Some(refresh.to_string());
        }
    }

    fn decode_user(&self) -> Option<UserProfile> {
        let value = self.user.clone()?;
        match serde_json::from_value(value) {
            Ok(user) => Some(user),
            Err(e) => {
                debug!(error = %e, key = USER_KEY, "stored user profile unreadable, treating as absent");
                None
            }
        }
    }
}

/// Non-persistent token store.
#[derive(Default)]
pub struct MemoryTokenStore {
    state: RwLock<SessionState>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with an existing pair.
    pub fn with_tokens(access: &str, refresh: Option<&str>) -> Self {
        let store = Self::new();
        store.set_tokens(access, refresh);
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        read(&self.state).access.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        read(&self.state).refresh.clone()
    }

    fn set_tokens(&self, access: &str, refresh: Option<&str>) {
        write(&self.state).apply_tokens(access, refresh);
    }

    fn set_user(&self, user: &UserProfile) {
        write(&self.state).user = serde_json::to_value(user).ok();
    }

    fn user(&self) -> Option<UserProfile> {
        read(&self.state).decode_user()
    }

    fn clear(&self) {
        *write(&self.state) = SessionState::default();
    }
}

impl fmt::Debug for MemoryTokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTokenStore")
            .field("authenticated", &read(&self.state).access.is_some())
            .finish()
    }
}

/// Token store backed by a JSON file.
///
/// The write lock is held across the disk write so concurrent mutations
/// persist in the order they were applied in memory.
pub struct FileTokenStore {
    path: PathBuf,
    state: RwLock<SessionState>,
}

impl FileTokenStore {
    /// Open the session file at `path`.
    ///
    /// A missing file is an empty (logged out) session. So is a file that
    /// fails to parse; the next mutation overwrites it.
    pub fn open(path: PathBuf) -> Self {
        let state = match load(&path) {
            Ok(Some(state)) => {
                info!(
                    path = %path.display(),
                    authenticated = state.access.is_some(),
                    "loaded session"
                );
                state
            }
            Ok(None) => {
                debug!(path = %path.display(), "session file not found, starting logged out");
                SessionState::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "session file unreadable, starting logged out");
                SessionState::default()
            }
        };

        Self {
            path,
            state: RwLock::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate(&self, f: impl FnOnce(&mut SessionState)) {
        let mut state = write(&self.state);
        f(&mut state);
        if let Err(e) = write_atomic(&self.path, &state) {
            warn!(path = %self.path.display(), error = %e, "failed to persist session");
        }
    }
}

impl TokenStore for FileTokenStore {
    fn access_token(&self) -> Option<String> {
        read(&self.state).access.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        read(&self.state).refresh.clone()
    }

    fn set_tokens(&self, access: &str, refresh: Option<&str>) {
        self.mutate(|state| state.apply_tokens(access, refresh));
        debug!(key = ACCESS_TOKEN_KEY, rotated = refresh.is_some(), "stored tokens");
    }

    fn set_user(&self, user: &UserProfile) {
        let value = serde_json::to_value(user).ok();
        self.mutate(|state| state.user = value);
    }

    fn user(&self) -> Option<UserProfile> {
        read(&self.state).decode_user()
    }

    fn clear(&self) {
        self.mutate(|state| *state = SessionState::default());
        debug!(
            keys = %format!("{ACCESS_TOKEN_KEY},{REFRESH_TOKEN_KEY},{USER_KEY}"),
            "cleared session"
        );
    }
}

impl fmt::Debug for FileTokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTokenStore")
            .field("path", &self.path)
            .field("authenticated", &read(&self.state).access.is_some())
            .finish()
    }
}

fn read(lock: &RwLock<SessionState>) -> std::sync::RwLockReadGuard<'_, SessionState> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(lock: &RwLock<SessionState>) -> std::sync::RwLockWriteGuard<'_, SessionState> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn load(path: &Path) -> Result<Option<SessionState>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(format!("reading session file: {e}"))),
    };
    if contents.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| Error::SessionParse(format!("parsing session file: {e}")))
}

/// Write the session atomically with 0600 permissions, creating the parent
/// directory if needed.
fn write_atomic(path: &Path, state: &SessionState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| Error::SessionParse(format!("serializing session: {e}")))?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .map_err(|e| Error::Io(format!("creating session directory: {e}")))?;

    let tmp_path = temp_path(dir, path);
    std::fs::write(&tmp_path, json.as_bytes())
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(Error::Io(format!("renaming temp session file: {e}")));
    }

    debug!(path = %path.display(), "persisted session");
    Ok(())
}

/// Sibling temp file unique to this target, process and write.
fn temp_path(dir: &Path, target: &Path) -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "session".to_string());
    let seq = NEXT.fetch_add(1, Ordering::Relaxed);
    dir.join(format!(".{name}.tmp.{}.{seq}", std::process::id()))
}
