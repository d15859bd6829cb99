//! Typed call sites for the blog API.

mod client;
mod response;

pub use client::BlogApi;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ApiResult};

/// Endpoint paths, relative to the configured API base.
pub mod endpoints {
    pub const LOGIN: &str = "/auth/login/";
    pub const REGISTER: &str = "/auth/register/";
    pub const PROFILE: &str = "/auth/profile/";
    pub const TOKEN_REFRESH: &str = "/auth/token/refresh/";
    pub const BLOGS: &str = "/blogs/";
    pub const BLOG_CREATE: &str = "/blogs/create/";
    pub const MY_BLOGS: &str = "/blogs/my-blogs/";

    pub fn blog(id: i64) -> String {
        format!("/blogs/{id}/")
    }

    pub fn blog_update(id: i64) -> String {
        format!("/blogs/{id}/update/")
    }

    pub fn blog_delete(id: i64) -> String {
        format!("/blogs/{id}/delete/")
    }
}

/// Run `call` until it finishes or `token` is cancelled.
///
/// A cancelled call is dropped mid-flight; nothing is written to the session
/// for it afterwards.
pub async fn cancellable<T, F>(token: &CancellationToken, call: F) -> ApiResult<T>
where
    F: Future<Output = ApiResult<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ApiError::Cancelled),
        result = call => result,
    }
}
