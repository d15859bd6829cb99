use http::header::AUTHORIZATION;
use http::{Extensions, HeaderValue};
use log::debug;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result};

use super::{middleware_error, AttachedToken, AuthPolicy};
use crate::storage::TokenStore;

/// Attaches `Authorization: Bearer <access>` to `Bearer` requests when an
/// access token is stored. Strips the header from everything else.
#[derive(Debug, Clone)]
pub struct BearerAuthMiddleware {
    tokens: TokenStore,
}

impl BearerAuthMiddleware {
    pub fn new(tokens: TokenStore) -> Self {
        Self { tokens }
    }
}

#[async_trait::async_trait]
impl Middleware for BearerAuthMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        extensions.remove::<AttachedToken>();
        req.headers_mut().remove(AUTHORIZATION);

        if AuthPolicy::of(extensions) == AuthPolicy::Bearer {
            match self.tokens.access().await.map_err(middleware_error)? {
                Some(access) => {
                    let mut value = HeaderValue::from_str(&format!("Bearer {access}"))
                        .map_err(middleware_error)?;
                    value.set_sensitive(true);
                    req.headers_mut().insert(AUTHORIZATION, value);
                    extensions.insert(AttachedToken(access));
                }
                None => debug!("No access token stored, sending {} unauthenticated", req.url()),
            }
        }

        next.run(req, extensions).await
    }
}
