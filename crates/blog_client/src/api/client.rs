use std::sync::Arc;

use anyhow::anyhow;
use blog_core::{
    AuthResponse, Blog, BlogForm, BlogPatch, ClientConfig, LoginCredentials, Paginated,
    RegisterData, SavedBlog, User,
};
use http::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use log::{debug, info, warn};
use reqwest::{Client, Method, Proxy};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use serde::de::DeserializeOwned;

use super::endpoints;
use super::response;
use crate::error::{ApiError, ApiResult, RefreshFailure};
use crate::middleware::{AuthPolicy, BearerAuthMiddleware, RefreshMiddleware, TokenRefresher};
use crate::session::SessionState;
use crate::storage::TokenStore;

/// HTTP client core: one call site per remote resource, all going through the
/// refresh and bearer stages.
///
/// Clones share the connection pool, the token store and the session state.
#[derive(Clone)]
pub struct BlogApi {
    client: ClientWithMiddleware,
    config: Arc<ClientConfig>,
    tokens: TokenStore,
    session: Arc<SessionState>,
    refresher: TokenRefresher,
}

impl std::fmt::Debug for BlogApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlogApi")
            .field("api_base", &self.config.api_base)
            .finish_non_exhaustive()
    }
}

impl BlogApi {
    pub fn new(config: ClientConfig, tokens: TokenStore) -> anyhow::Result<Self> {
        let http = Self::build_http_client(&config)?;
        let session = Arc::new(SessionState::new());
        let refresher = TokenRefresher::new(
            http.clone(),
            config.api_url(endpoints::TOKEN_REFRESH),
            tokens.clone(),
            Arc::clone(&session),
        );

        let client = ClientBuilder::new(http)
            .with(RefreshMiddleware::new(refresher.clone()))
            .with(BearerAuthMiddleware::new(tokens.clone()))
            .build();

        info!("Blog API client ready for {}", config.api_base);
        Ok(Self {
            client,
            config: Arc::new(config),
            tokens,
            session,
            refresher,
        })
    }

    fn build_http_client(config: &ClientConfig) -> anyhow::Result<Client> {
        let mut builder = Client::builder().default_headers(Self::default_headers(config));
        if !config.http_proxy.is_empty() {
            builder = builder.proxy(Proxy::http(&config.http_proxy)?);
        }
        if !config.https_proxy.is_empty() {
            builder = builder.proxy(Proxy::https(&config.https_proxy)?);
        }
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {e}"))
    }

    fn default_headers(config: &ClientConfig) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        match HeaderValue::from_str(&config.app_name) {
            Ok(agent) => {
                headers.insert(USER_AGENT, agent);
            }
            Err(_) => warn!("App name {:?} is not a valid User-Agent", config.app_name),
        }
        headers
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn session_state(&self) -> &Arc<SessionState> {
        &self.session
    }

    fn request(&self, method: Method, endpoint: &str, policy: AuthPolicy) -> RequestBuilder {
        let url = self.config.api_url(endpoint);
        debug!("{} {} ({:?})", method, url, policy);
        self.client.request(method, url).with_extension(policy)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = request.send().await?;
        response::decode(response).await
    }

    fn page_query(page: u32) -> Vec<(&'static str, String)> {
        vec![("page", page.to_string())]
    }

    // Auth

    pub async fn login(&self, credentials: &LoginCredentials) -> ApiResult<AuthResponse> {
        let request = self
            .request(Method::POST, endpoints::LOGIN, AuthPolicy::Anonymous)
            .json(credentials);
        self.fetch(request).await
    }

    pub async fn register(&self, data: &RegisterData) -> ApiResult<AuthResponse> {
        let request = self
            .request(Method::POST, endpoints::REGISTER, AuthPolicy::Anonymous)
            .json(data);
        self.fetch(request).await
    }

    pub async fn profile(&self) -> ApiResult<User> {
        self.fetch(self.request(Method::GET, endpoints::PROFILE, AuthPolicy::Bearer))
            .await
    }

    /// Force a refresh of the access token. Shares any refresh already in flight.
    pub async fn refresh_access(&self) -> ApiResult<String> {
        match self.refresher.refresh().await {
            Ok(access) => Ok(access),
            Err(RefreshFailure::MissingRefreshToken) => Err(ApiError::LoginRequired),
            Err(failure) => Err(ApiError::SessionExpired(failure)),
        }
    }

    // Blogs

    /// Published posts. `page` is sent as given; an empty search is omitted.
    pub async fn list_blogs(&self, page: u32, search: Option<&str>) -> ApiResult<Paginated<Blog>> {
        let mut query = Self::page_query(page);
        if let Some(search) = search.filter(|s| !s.is_empty()) {
            query.push(("search", search.to_string()));
        }
        let request = self
            .request(Method::GET, endpoints::BLOGS, AuthPolicy::Anonymous)
            .query(&query);
        self.fetch(request).await
    }

    pub async fn get_blog(&self, id: i64) -> ApiResult<Blog> {
        self.fetch(self.request(Method::GET, &endpoints::blog(id), AuthPolicy::Anonymous))
            .await
    }

    pub async fn create_blog(&self, form: &BlogForm) -> ApiResult<Blog> {
        let request = self
            .request(Method::POST, endpoints::BLOG_CREATE, AuthPolicy::Bearer)
            .json(form);
        self.fetch(request).await
    }

    pub async fn update_blog(&self, id: i64, patch: &BlogPatch) -> ApiResult<SavedBlog> {
        let request = self
            .request(Method::PATCH, &endpoints::blog_update(id), AuthPolicy::Bearer)
            .json(patch);
        self.fetch(request).await
    }

    pub async fn delete_blog(&self, id: i64) -> ApiResult<()> {
        let response = self
            .request(Method::DELETE, &endpoints::blog_delete(id), AuthPolicy::Bearer)
            .send()
            .await?;
        response::expect_empty(response).await
    }

    /// The caller's own posts, drafts included.
    pub async fn my_blogs(&self, page: u32) -> ApiResult<Paginated<Blog>> {
        let request = self
            .request(Method::GET, endpoints::MY_BLOGS, AuthPolicy::Bearer)
            .query(&Self::page_query(page));
        self.fetch(request).await
    }
}
