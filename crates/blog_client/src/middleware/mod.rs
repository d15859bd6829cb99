//! Request pipeline stages.
//!
//! Stages run in registration order: the refresh stage wraps the bearer stage,
//! so a replayed request passes through the bearer stage again and picks up
//! whatever access token is current at that moment.

mod bearer;
mod refresh;

pub use bearer::BearerAuthMiddleware;
pub use refresh::{RefreshMiddleware, TokenRefresher};

use http::Extensions;

/// Whether a request is sent with the stored access token.
///
/// Attached to each request as an extension. Requests without one are
/// treated as `Bearer`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthPolicy {
    #[default]
    Bearer,
    /// No `Authorization` header and no refresh on 401.
    Anonymous,
}

impl AuthPolicy {
    pub fn of(extensions: &Extensions) -> Self {
        extensions.get::<AuthPolicy>().copied().unwrap_or_default()
    }
}

/// Access token the bearer stage attached to the most recent dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttachedToken(pub(crate) String);

fn middleware_error<E>(err: E) -> reqwest_middleware::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    reqwest_middleware::Error::Middleware(anyhow::Error::new(err))
}
