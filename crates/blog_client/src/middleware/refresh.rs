use std::sync::Arc;

use blog_core::TokenPair;
use futures::future::{BoxFuture, FutureExt, Shared};
use http::{Extensions, StatusCode};
use log::{debug, error, info, warn};
use reqwest::{Client, Request, Response};
use reqwest_middleware::{Middleware, Next, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{middleware_error, AttachedToken, AuthPolicy};
use crate::error::RefreshFailure;
use crate::session::SessionState;
use crate::storage::{StorageError, TokenStore};

type RefreshFuture = Shared<BoxFuture<'static, std::result::Result<String, RefreshFailure>>>;

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
    /// Present when the server rotates refresh tokens.
    #[serde(default)]
    refresh: Option<String>,
}

/// Exchanges the stored refresh token for a new access token.
///
/// Concurrent callers share one in-flight exchange. Failures are settled
/// inside that exchange, so the store and the session are cleaned up once no
/// matter how many requests were waiting on it.
#[derive(Clone)]
pub struct TokenRefresher {
    inner: Arc<RefresherInner>,
}

struct RefresherInner {
    client: Client,
    refresh_url: String,
    tokens: TokenStore,
    session: Arc<SessionState>,
    in_flight: Mutex<Option<RefreshFuture>>,
}

impl std::fmt::Debug for TokenRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefresher")
            .field("refresh_url", &self.inner.refresh_url)
            .finish_non_exhaustive()
    }
}

impl TokenRefresher {
    /// `client` must be a plain client: the refresh call never goes through
    /// the request pipeline.
    pub fn new(
        client: Client,
        refresh_url: impl Into<String>,
        tokens: TokenStore,
        session: Arc<SessionState>,
    ) -> Self {
        Self {
            inner: Arc::new(RefresherInner {
                client,
                refresh_url: refresh_url.into(),
                tokens,
                session,
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    /// Refresh the access token, joining an exchange already in flight.
    ///
    /// The exchange runs as its own task: dropping every waiter does not stop
    /// it, and it frees the in-flight slot itself when it ends.
    pub async fn refresh(&self) -> std::result::Result<String, RefreshFailure> {
        let shared = {
            let mut slot = self.inner.in_flight.lock().await;
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!("Joining in-flight token refresh");
                    in_flight.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let task = tokio::spawn(async move {
                        let result = inner.run().await;
                        inner.in_flight.lock().await.take();
                        result
                    });
                    let exchange = task
                        .map(|joined| {
                            joined.unwrap_or_else(|err| Err(RefreshFailure::Aborted(err.to_string())))
                        })
                        .boxed()
                        .shared();
                    *slot = Some(exchange.clone());
                    exchange
                }
            }
        };

        let result = shared.clone().await;
        if matches!(result, Err(RefreshFailure::Aborted(_))) {
            // The task never reached its own cleanup.
            let mut slot = self.inner.in_flight.lock().await;
            if slot
                .as_ref()
                .is_some_and(|current| Shared::ptr_eq(current, &shared))
            {
                *slot = None;
            }
        }
        result
    }
}

fn storage_failure(err: StorageError) -> RefreshFailure {
    RefreshFailure::Storage(err.to_string())
}

impl RefresherInner {
    /// Exchange the stored refresh token and settle the outcome.
    ///
    /// The store is only written while it still holds the refresh token that
    /// was exchanged. If a login or logout replaced it meanwhile, the newer
    /// state is left alone and its access token (if any) is handed back.
    async fn run(&self) -> std::result::Result<String, RefreshFailure> {
        let Some(refresh) = self.tokens.refresh().await.map_err(storage_failure)? else {
            warn!("Got 401 with no refresh token stored, login required");
            self.session.invalidate();
            return Err(RefreshFailure::MissingRefreshToken);
        };

        let failure = match self.exchange(&refresh).await {
            Ok(pair) => match self.tokens.save_if_current(&refresh, &pair).await {
                Ok(true) => {
                    info!("Access token refreshed");
                    debug!(
                        "Stored refreshed token pair (refresh token rotated: {})",
                        pair.refresh != refresh
                    );
                    return Ok(pair.access);
                }
                Ok(false) => return self.superseded().await,
                Err(err) => storage_failure(err),
            },
            Err(failure) => failure,
        };

        match self.tokens.clear_if_current(&refresh).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Token refresh failed after the tokens were replaced: {}", failure);
                return self.superseded().await;
            }
            Err(err) => error!("Failed to clear tokens after refresh failure: {}", err),
        }
        error!("Token refresh failed: {}", failure);
        self.session.invalidate();
        Err(failure)
    }

    async fn superseded(&self) -> std::result::Result<String, RefreshFailure> {
        debug!("Tokens were replaced during the refresh, keeping the newer ones");
        self.tokens
            .access()
            .await
            .map_err(storage_failure)?
            .ok_or(RefreshFailure::MissingRefreshToken)
    }

    async fn exchange(&self, refresh: &str) -> std::result::Result<TokenPair, RefreshFailure> {
        info!("Refreshing access token via {}", self.refresh_url);
        let response = self
            .client
            .post(&self.refresh_url)
            .json(&RefreshRequest { refresh })
            .send()
            .await
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshFailure::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;
        let refreshed: RefreshResponse = serde_json::from_slice(&body)
            .map_err(|e| RefreshFailure::InvalidResponse(e.to_string()))?;

        Ok(TokenPair::new(
            refreshed.access,
            refreshed.refresh.unwrap_or_else(|| refresh.to_string()),
        ))
    }
}

/// Recovers `Bearer` requests that fail with 401.
///
/// The failed request is replayed at most once: either after a successful
/// refresh, or straight away when the token it carried has already been
/// replaced in the store. A 401 on the replay is returned as is.
#[derive(Debug, Clone)]
pub struct RefreshMiddleware {
    refresher: TokenRefresher,
}

impl RefreshMiddleware {
    pub fn new(refresher: TokenRefresher) -> Self {
        Self { refresher }
    }
}

#[async_trait::async_trait]
impl Middleware for RefreshMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if AuthPolicy::of(extensions) == AuthPolicy::Anonymous {
            return next.run(req, extensions).await;
        }

        let replay = req.try_clone();
        let response = next.clone().run(req, extensions).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(replay) = replay else {
            warn!("Request body cannot be replayed, returning 401 as is");
            return Ok(response);
        };

        let sent = extensions.remove::<AttachedToken>().map(|token| token.0);
        let current = self.refresher.tokens().access().await.map_err(middleware_error)?;
        let replaced = current.is_some() && current != sent;

        if replaced {
            debug!("Access token changed while {} was in flight, replaying", replay.url());
        } else {
            match self.refresher.refresh().await {
                Ok(_) => {}
                Err(RefreshFailure::MissingRefreshToken) => return Ok(response),
                Err(failure) => return Err(middleware_error(failure)),
            }
        }

        debug!("Replaying {} {}", replay.method(), replay.url());
        next.run(replay, extensions).await
    }
}
