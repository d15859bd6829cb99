//! blog_core - Core types shared by the blog client crates
//!
//! - `models` - User, Blog, pagination envelopes and request payloads
//! - `config` - ClientConfig loaded from file and environment
//! - `paths` - Application directories

pub mod config;
pub mod models;
pub mod paths;

pub use config::ClientConfig;
pub use models::{
    AuthResponse, Blog, BlogForm, BlogPatch, LoginCredentials, Paginated, RegisterData,
    SavedBlog, TokenPair, User, PAGE_SIZE,
};
