//! blog_client - Client for the blog REST API
//!
//! - `storage` - key-value persistence and the token store
//! - `middleware` - bearer and refresh stages of the request pipeline
//! - `api` - typed call sites (`BlogApi`) and cancellation
//! - `session` - session context, route guard and session events
//! - `error` - `ApiError` and field-level validation errors

pub mod api;
pub mod error;
pub mod middleware;
pub mod session;
pub mod storage;

pub use api::{cancellable, BlogApi};
pub use error::{ApiError, ApiResult, FieldErrors, RefreshFailure};
pub use middleware::AuthPolicy;
pub use session::{Access, Session, SessionEvent, SessionPhase, SessionSnapshot, SessionState};
pub use storage::{
    FileStore, KeyValueStore, MemoryStore, StorageError, TokenStore, ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
};

pub use tokio_util::sync::CancellationToken;
