//! Session context: who is logged in, and the transitions that change it.

mod state;

pub use state::{SessionEvent, SessionPhase, SessionSnapshot, SessionState};

use std::sync::Arc;

use blog_core::{AuthResponse, Blog, LoginCredentials, RegisterData, User};
use log::{info, warn};
use tokio::sync::{broadcast, watch};

use crate::api::BlogApi;
use crate::error::{ApiError, ApiResult};

/// Outcome of checking a protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted(User),
    /// The stored session is still being checked; render nothing yet.
    Pending,
    RedirectToLogin,
}

/// Explicitly constructed session, shared between consumers by cloning.
///
/// The session shares its token store and state with the `BlogApi` it wraps,
/// so a refresh failure inside any call is visible here immediately.
#[derive(Debug, Clone)]
pub struct Session {
    api: BlogApi,
    state: Arc<SessionState>,
}

impl Session {
    /// Wrap `api`. With a stored token and no user yet, the session starts
    /// out pending until [`Session::initialize`] settles it.
    pub async fn new(api: BlogApi) -> ApiResult<Self> {
        let state = Arc::clone(api.session_state());
        if state.user().is_none() && api.tokens().has_any().await? {
            state.begin_initialize();
        }
        Ok(Self { api, state })
    }

    pub fn api(&self) -> &BlogApi {
        &self.api
    }

    /// Restore the user for a stored token.
    ///
    /// Without any token the session is simply ready and anonymous. A lone
    /// refresh token still goes through the profile check, which refreshes
    /// first. When the profile fetch fails the user is cleared and the error
    /// returned; stored tokens are only dropped if the failure came from a
    /// rejected refresh.
    pub async fn initialize(&self) -> ApiResult<Option<User>> {
        let stored = match self.api.tokens().has_any().await {
            Ok(stored) => stored,
            Err(err) => {
                self.state.set_user(None);
                return Err(err.into());
            }
        };
        if !stored {
            self.state.set_user(None);
            return Ok(None);
        }

        self.state.begin_initialize();
        match self.api.profile().await {
            Ok(user) => {
                info!("Restored session for {}", user.email);
                self.state.set_user(Some(user.clone()));
                Ok(Some(user))
            }
            Err(err) => {
                warn!("Could not restore session: {}", err);
                self.state.set_user(None);
                Err(err)
            }
        }
    }

    /// On failure nothing is stored and the session is left as it was.
    pub async fn login(&self, credentials: &LoginCredentials) -> ApiResult<User> {
        let auth = self.api.login(credentials).await?;
        self.establish(auth).await
    }

    pub async fn register(&self, data: &RegisterData) -> ApiResult<User> {
        let auth = self.api.register(data).await?;
        self.establish(auth).await
    }

    async fn establish(&self, auth: AuthResponse) -> ApiResult<User> {
        self.api.tokens().save(&auth.tokens).await?;
        info!("Logged in as {}", auth.user.email);
        self.state.set_user(Some(auth.user.clone()));
        self.state.publish(SessionEvent::LoggedIn(auth.user.clone()));
        Ok(auth.user)
    }

    /// Forget tokens and user. Local only; safe to call repeatedly.
    pub async fn logout(&self) -> ApiResult<()> {
        self.api.tokens().clear().await?;
        if let Some(user) = self.state.user() {
            info!("Logged out {}", user.email);
        }
        self.state.set_user(None);
        self.state.publish(SessionEvent::LoggedOut);
        Ok(())
    }

    pub fn user(&self) -> Option<User> {
        self.state.user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.snapshot().is_authenticated()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.state.events()
    }

    pub fn guard(&self) -> Access {
        let snapshot = self.state.snapshot();
        match (snapshot.user, snapshot.phase) {
            (Some(user), _) => Access::Granted(user),
            (None, SessionPhase::Initializing) => Access::Pending,
            (None, SessionPhase::Ready) => Access::RedirectToLogin,
        }
    }

    pub fn require_user(&self) -> ApiResult<User> {
        self.state.user().ok_or(ApiError::LoginRequired)
    }

    /// Whether the logged-in user wrote `blog`.
    pub fn owns(&self, blog: &Blog) -> bool {
        self.state
            .user()
            .is_some_and(|user| user.id == blog.author.id)
    }
}
