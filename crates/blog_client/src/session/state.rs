use blog_core::User;
use log::debug;
use tokio::sync::{broadcast, watch};

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// A stored token is being checked against the profile endpoint.
    Initializing,
    Ready,
}

/// Point-in-time view of the session. Writers always replace it whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub phase: SessionPhase,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.phase == SessionPhase::Initializing
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn(User),
    LoggedOut,
    /// Credentials are gone or no longer accepted; send the user to login.
    LoginRequired,
}

/// Shared session state: the current snapshot plus an event feed.
#[derive(Debug)]
pub struct SessionState {
    snapshot: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot {
            user: None,
            phase: SessionPhase::Ready,
        });
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { snapshot, events }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.snapshot.borrow().user.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn begin_initialize(&self) {
        let user = self.user();
        self.snapshot.send_replace(SessionSnapshot {
            user,
            phase: SessionPhase::Initializing,
        });
    }

    pub(crate) fn set_user(&self, user: Option<User>) {
        self.snapshot.send_replace(SessionSnapshot {
            user,
            phase: SessionPhase::Ready,
        });
    }

    /// Drop the user and tell listeners a login is required.
    pub(crate) fn invalidate(&self) {
        self.set_user(None);
        self.publish(SessionEvent::LoginRequired);
    }

    pub(crate) fn publish(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("No session event listeners");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user() -> User {
        User {
            id: 1,
            email: "a@b.com".to_string(),
            username: "alice".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            date_joined: Utc::now(),
        }
    }

    #[test]
    fn starts_ready_and_anonymous() {
        let state = SessionState::new();
        let snapshot = state.snapshot();
        assert!(!snapshot.is_authenticated());
        assert!(!snapshot.is_loading());
    }

    #[tokio::test]
    async fn invalidate_clears_user_and_notifies() {
        let state = SessionState::new();
        let mut events = state.events();
        let mut changes = state.subscribe();

        state.set_user(Some(user()));
        assert!(state.snapshot().is_authenticated());

        state.invalidate();
        assert_eq!(state.user(), None);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::LoginRequired);

        changes.changed().await.unwrap();
        assert!(!changes.borrow().is_authenticated());
    }

    #[test]
    fn publishing_without_listeners_is_fine() {
        let state = SessionState::new();
        state.publish(SessionEvent::LoggedOut);
    }
}
