//! Authentication session and bearer-token persistence.
//!
//! # Design
//! The session is an explicit object created at application start and handed
//! to `ApiClient::new`; nothing reads credentials from ambient globals. The
//! token lives in two places: the observable `SessionState` (what the facade
//! reads on every request) and a `TokenStore` (what survives a restart).
//! Every write goes through `Session`, which keeps them in step.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::types::{ProfileUpdate, UserSummary};

/// Fixed key under which the bearer token is persisted.
pub const TOKEN_KEY: &str = "prominis_token";

/// Persistent home of the bearer token.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str) -> io::Result<()>;
    fn clear(&self) -> io::Result<()>;
}

/// Process-local store; the token is lost on exit.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn save(&self, token: &str) -> io::Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}

/// Stores the token in a file named [`TOKEN_KEY`] inside a directory.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(TOKEN_KEY),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let token = raw.trim();
        (!token.is_empty()).then(|| token.to_string())
    }

    fn save(&self, token: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, token)
    }

    fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Observable authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<UserSummary>,
    pub token: Option<String>,
    pub loading: bool,
    pub error: Option<String>,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

struct SessionInner {
    store: Box<dyn TokenStore>,
    state: watch::Sender<SessionState>,
}

/// Shared handle to the single authentication session. Cloning is cheap and
/// every clone observes the same state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Session")
            .field("authenticated", &state.is_authenticated())
            .field("has_token", &state.token.is_some())
            .field("loading", &state.loading)
            .finish()
    }
}

impl Session {
    /// Open a session over `store`. A persisted token is picked up and the
    /// session starts in the loading state until it is verified.
    pub fn new(store: impl TokenStore + 'static) -> Self {
        let token = store.load();
        let state = SessionState {
            user: None,
            loading: token.is_some(),
            token,
            error: None,
        };
        let (sender, _) = watch::channel(state);
        Self {
            inner: Arc::new(SessionInner {
                store: Box::new(store),
                state: sender,
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryTokenStore::default())
    }

    pub fn token(&self) -> Option<String> {
        self.inner.state.borrow().token.clone()
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// An authentication attempt started.
    pub fn begin(&self) {
        self.inner.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });
    }

    /// Persist `token` and mark `user` as signed in.
    pub fn establish(&self, user: UserSummary, token: String) {
        if let Err(e) = self.inner.store.save(&token) {
            tracing::warn!(error = %e, "failed to persist bearer token");
        }
        self.inner.state.send_modify(|state| {
            state.user = Some(user);
            state.token = Some(token);
            state.loading = false;
            state.error = None;
        });
    }

    /// An authentication attempt failed with `message`.
    pub fn fail(&self, message: String) {
        self.inner.state.send_modify(|state| {
            state.user = None;
            state.token = None;
            state.loading = false;
            state.error = Some(message);
        });
    }

    /// Drop credentials and return to the signed-out state.
    pub fn logout(&self) {
        self.clear_store();
        self.inner.state.send_modify(|state| {
            *state = SessionState::default();
        });
    }

    /// Clear credentials after a 401 for a request that carried `sent`.
    /// Returns `true` only for the call that actually removed that token;
    /// a token established since the request went out is left alone.
    pub fn invalidate(&self, sent: Option<&str>) -> bool {
        let Some(sent) = sent else {
            return false;
        };
        let cleared = self.inner.state.send_if_modified(|state| {
            if state.token.as_deref() != Some(sent) {
                return false;
            }
            *state = SessionState::default();
            true
        });
        if cleared {
            self.clear_store();
            tracing::info!("session invalidated");
        }
        cleared
    }

    /// Merge profile changes into the signed-in user.
    pub fn update_user(&self, update: &ProfileUpdate) {
        self.inner.state.send_if_modified(|state| match state.user.as_mut() {
            Some(user) => {
                user.apply(update);
                true
            }
            None => false,
        });
    }

    fn clear_store(&self) {
        if let Err(e) = self.inner.store.clear() {
            tracing::warn!(error = %e, "failed to clear persisted bearer token");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn user() -> UserSummary {
        UserSummary {
            id: 11,
            first_name: "Rae".to_string(),
            last_name: "Quinn".to_string(),
            email: "requester@promin.com".to_string(),
            role: Role::Requester,
            phone: None,
            location: None,
            bio: None,
            avatar: None,
        }
    }

    #[test]
    fn new_session_without_token_is_signed_out() {
        let session = Session::in_memory();
        let state = session.state();
        assert!(!state.loading);
        assert!(state.token.is_none());
    }

    #[test]
    fn persisted_token_is_loaded_pending_verification() {
        let session = Session::new(MemoryTokenStore::with_token("abc"));
        assert_eq!(session.token().as_deref(), Some("abc"));
        assert!(session.state().loading);
    }

    #[test]
    fn establish_persists_and_logout_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path());
        let session = Session::new(store.clone());

        session.establish(user(), "tok-1".to_string());
        assert_eq!(store.load().as_deref(), Some("tok-1"));
        assert!(session.state().is_authenticated());

        session.logout();
        assert!(store.load().is_none());
        assert_eq!(session.state(), SessionState::default());
    }

    #[test]
    fn invalidate_clears_exactly_once() {
        let session = Session::new(MemoryTokenStore::with_token("abc"));
        assert!(session.invalidate(Some("abc")));
        assert!(!session.invalidate(Some("abc")));
        assert!(session.token().is_none());
    }

    #[test]
    fn invalidate_ignores_superseded_token() {
        let session = Session::new(MemoryTokenStore::with_token("old"));
        session.establish(user(), "fresh".to_string());

        assert!(!session.invalidate(Some("old")));
        assert!(!session.invalidate(None));
        assert_eq!(session.token().as_deref(), Some("fresh"));
        assert!(session.state().is_authenticated());
    }

    #[test]
    fn fail_records_message() {
        let session = Session::in_memory();
        session.begin();
        assert!(session.state().loading);
        session.fail("Invalid credentials".to_string());
        let state = session.state();
        assert!(!state.loading);
        assert_eq!(state.error.as_deref(), Some("Invalid credentials"));
    }

    #[test]
    fn update_user_merges_fields() {
        let session = Session::in_memory();
        session.establish(user(), "t".to_string());
        session.update_user(&ProfileUpdate {
            location: Some("Oslo".to_string()),
            ..ProfileUpdate::default()
        });
        let user = session.state().user.unwrap();
        assert_eq!(user.location.as_deref(), Some("Oslo"));
        assert_eq!(user.first_name, "Rae");
    }

    #[test]
    fn file_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested"));
        assert!(store.clear().is_ok());
        store.save("x").unwrap();
        assert_eq!(store.path().file_name().unwrap(), TOKEN_KEY);
        assert!(store.clear().is_ok());
        assert!(store.load().is_none());
    }
}
