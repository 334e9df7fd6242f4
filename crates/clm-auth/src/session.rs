//! Injectable session context
//!
//! A `Session` pairs the token store with a broadcast channel of
//! `SessionEvent`s. Anything that builds an HTTP client takes a `Session`
//! rather than reaching for ambient storage, and UI components subscribe to
//! the channel to resynchronize after sign-in, sign-out, or expiry.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::credentials::{CredentialPair, MemoryTokenStore, TokenStore, UserProfile};
use crate::token::AuthTokens;

const EVENT_CAPACITY: usize = 16;

/// Authentication state changes published to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A login, registration, OTP or Google sign-in stored a new pair.
    SignedIn,
    /// The access token was replaced by a refresh.
    Refreshed,
    /// The user signed out.
    SignedOut,
    /// The session could not be recovered (refresh missing or rejected).
    /// The UI is expected to route to its sign-in flow.
    Expired,
}

/// Shared handle on the token store and its event channel. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn TokenStore>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { store, events }
    }

    /// Session over a fresh `MemoryTokenStore`.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryTokenStore::new()))
    }

    pub fn store(&self) -> &dyn TokenStore {
        self.store.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn credentials(&self) -> Option<CredentialPair> {
        self.store.credentials()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.store.user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.access_token().is_some()
    }

    /// Store a freshly issued pair (and profile, when present).
    pub fn sign_in(&self, tokens: &AuthTokens) {
        self.store.set_tokens(&tokens.access, tokens.refresh.as_deref());
        if let Some(user) = &tokens.user {
            self.store.set_user(user);
        }
        info!(
            user = tokens.user.as_ref().map(|u| u.email.as_str()).unwrap_or(""),
            "signed in"
        );
        self.publish(SessionEvent::SignedIn);
    }

    /// Store a refreshed pair. The refresh token is only replaced when the
    /// backend rotated it.
    pub fn refreshed(&self, tokens: &AuthTokens) {
        self.store.set_tokens(&tokens.access, tokens.refresh.as_deref());
        self.publish(SessionEvent::Refreshed);
    }

    pub fn sign_out(&self) {
        self.store.clear();
        info!("signed out");
        self.publish(SessionEvent::SignedOut);
    }

    /// Drop an unrecoverable session.
    pub fn expire(&self) {
        self.store.clear();
        info!("session expired, credentials cleared");
        self.publish(SessionEvent::Expired);
    }

    fn publish(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!(?event, "no session subscribers");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("subscribers", &self.events.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(access: &str, refresh: Option<&str>) -> AuthTokens {
        AuthTokens {
            access: access.into(),
            refresh: refresh.map(Into::into),
            user: Some(UserProfile {
                id: Some("1".into()),
                email: "ada@example.com".into(),
                first_name: None,
                last_name: None,
                full_name: Some("Ada Lovelace".into()),
                extra: Default::default(),
            }),
        }
    }

    #[tokio::test]
    async fn sign_in_stores_pair_and_user_and_notifies() {
        let session = Session::in_memory();
        let mut events = session.subscribe();

        session.sign_in(&tokens("at_1", Some("rt_1")));

        assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedIn);
        assert!(session.is_authenticated());
        let pair = session.credentials().unwrap();
        assert_eq!(pair.access.expose(), "at_1");
        assert_eq!(pair.refresh.unwrap().expose(), "rt_1");
        assert_eq!(session.user().unwrap().display_name(), "Ada Lovelace");
    }

    #[tokio::test]
    async fn refreshed_without_rotation_keeps_refresh_token() {
        let session = Session::in_memory();
        session.sign_in(&tokens("at_1", Some("rt_1")));
        let mut events = session.subscribe();

        session.refreshed(&AuthTokens {
            access: "at_2".into(),
            refresh: None,
            user: None,
        });

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Refreshed);
        assert_eq!(session.store().access_token().as_deref(), Some("at_2"));
        assert_eq!(session.store().refresh_token().as_deref(), Some("rt_1"));
    }

    #[tokio::test]
    async fn expire_clears_and_notifies() {
        let session = Session::in_memory();
        session.sign_in(&tokens("at_1", Some("rt_1")));
        let mut events = session.subscribe();

        session.expire();

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Expired);
        assert!(!session.is_authenticated());
        assert!(session.user().is_none());
    }

    #[tokio::test]
    async fn clones_share_store_and_channel() {
        let session = Session::in_memory();
        let other = session.clone();
        let mut events = other.subscribe();

        session.sign_out();

        assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedOut);
        assert!(!other.is_authenticated());
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let session = Session::in_memory();
        session.sign_out();
        assert!(!session.is_authenticated());
    }
}
