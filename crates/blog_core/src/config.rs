use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::paths;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api";
const CONFIG_FILE_PATH: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub http_proxy: String,
    #[serde(default)]
    pub https_proxy: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    /// Where the token file lives. Defaults to `~/.blogapp`.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_app_name() -> String {
    "Blog App".to_string()
}

fn default_app_env() -> String {
    "development".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            http_proxy: String::new(),
            https_proxy: String::new(),
            timeout_secs: None,
            app_name: default_app_name(),
            app_env: default_app_env(),
            data_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load `~/.blogapp/config.json`, falling back to `./config.toml`, then apply
    /// environment overrides.
    pub fn new() -> Self {
        let mut config = Self::load_file(&paths::config_json_path(), Path::new(CONFIG_FILE_PATH))
            .unwrap_or_default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Config pointing at an explicit API base, everything else defaulted.
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            ..Self::default()
        }
    }

    fn load_file(json_path: &Path, toml_path: &Path) -> Option<Self> {
        if json_path.exists() {
            match std::fs::read_to_string(json_path)
                .map_err(|e| e.to_string())
                .and_then(|content| serde_json::from_str::<Self>(&content).map_err(|e| e.to_string()))
            {
                Ok(config) => return Some(config),
                Err(err) => log::warn!("Ignoring {}: {}", json_path.display(), err),
            }
        }

        if toml_path.exists() {
            match std::fs::read_to_string(toml_path)
                .map_err(|e| e.to_string())
                .and_then(|content| toml::from_str::<Self>(&content).map_err(|e| e.to_string()))
            {
                Ok(config) => return Some(config),
                Err(err) => log::warn!("Ignoring {}: {}", toml_path.display(), err),
            }
        }

        None
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_base) = lookup("BLOG_API_BASE_URL") {
            self.api_base = api_base;
        }
        if let Some(http_proxy) = lookup("HTTP_PROXY") {
            self.http_proxy = http_proxy;
        }
        if let Some(https_proxy) = lookup("HTTPS_PROXY") {
            self.https_proxy = https_proxy;
        }
        if let Some(app_env) = lookup("BLOG_APP_ENV") {
            self.app_env = app_env;
        }
        if let Some(app_name) = lookup("BLOG_APP_NAME") {
            self.app_name = app_name;
        }
        if let Some(data_dir) = lookup("BLOG_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(data_dir));
        }
        if let Some(timeout) = lookup("BLOG_TIMEOUT_SECS") {
            match timeout.trim().parse::<u64>() {
                Ok(secs) => self.timeout_secs = Some(secs),
                Err(_) => log::warn!("BLOG_TIMEOUT_SECS={timeout:?} is not a number, ignoring"),
            }
        }
    }

    /// Join an endpoint path onto the API base.
    pub fn api_url(&self, endpoint: &str) -> String {
        let base = self.api_base.trim_end_matches('/');
        if endpoint.is_empty() {
            base.to_string()
        } else if endpoint.starts_with('/') {
            format!("{base}{endpoint}")
        } else {
            format!("{base}/{endpoint}")
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(paths::app_dir)
    }

    pub fn is_development(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("development")
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }
}
