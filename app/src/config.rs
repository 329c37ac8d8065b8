use auth::{Authenticator, FallbackStore, FileStore, KeyringStore, MemoryStore, OAuthConfig, TokenStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_REDIRECT_URI: &str = "http://localhost:8765/callback";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub log_level: String,
    pub page_size: u32,
    pub thumbnails_preload: usize,
    pub cache_path: PathBuf,
    pub use_file_store: bool,
    pub graph_url: String,
    pub oauth_url: String,
}

#[derive(Debug, Default)]
pub struct AppConfigOverrides {
    pub log_level: Option<String>,
    pub page_size: Option<u32>,
    pub thumbnails_preload: Option<usize>,
    pub use_file_store: bool,
}

fn base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".instagram-picker")
}

impl AppConfig {
    pub fn default_path() -> PathBuf {
        base_dir().join("config")
    }

    /// Read the TOML file at `path` (or the default location) and the
    /// `INSTAGRAM_*` environment. Missing keys fall back to defaults.
    pub fn load_from(path: Option<PathBuf>) -> Self {
        let path = path.unwrap_or_else(Self::default_path);
        let cfg = config::Config::builder()
            .add_source(
                config::File::from(path.as_path())
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix("INSTAGRAM"))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {}: {}", path.display(), e);
                config::Config::default()
            });

        let string = |key: &str, default: &str| cfg.get_string(key).unwrap_or_else(|_| default.to_string());

        Self {
            client_id: string("client_id", ""),
            client_secret: string("client_secret", ""),
            redirect_uri: string("redirect_uri", DEFAULT_REDIRECT_URI),
            log_level: string("log_level", "info"),
            page_size: cfg.get_int("page_size").map(|v| v.clamp(1, 100) as u32).unwrap_or(picker::DEFAULT_PAGE_SIZE),
            thumbnails_preload: cfg.get_int("thumbnails_preload").map(|v| v.max(1) as usize).unwrap_or(8),
            cache_path: cfg.get_string("cache_path").map(PathBuf::from).unwrap_or_else(|_| base_dir()),
            use_file_store: cfg.get_bool("use_file_store").unwrap_or(false),
            graph_url: string("graph_url", auth::DEFAULT_GRAPH_URL),
            oauth_url: string("oauth_url", auth::DEFAULT_OAUTH_URL),
        }
    }

    pub fn apply_overrides(mut self, ov: &AppConfigOverrides) -> Self {
        if let Some(l) = &ov.log_level {
            self.log_level = l.clone();
        }
        if let Some(p) = ov.page_size {
            self.page_size = p.clamp(1, 100);
        }
        if let Some(t) = ov.thumbnails_preload {
            self.thumbnails_preload = t.max(1);
        }
        if ov.use_file_store {
            self.use_file_store = true;
        }
        self
    }

    pub fn save_to(&self, path: Option<PathBuf>) -> std::io::Result<()> {
        let path = path.unwrap_or_else(Self::default_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = toml::to_string(self).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, data)
    }

    pub fn has_client_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    pub fn oauth_config(&self) -> OAuthConfig {
        OAuthConfig::new(&self.client_id, &self.client_secret, &self.redirect_uri)
            .with_oauth_url(&self.oauth_url)
            .with_graph_url(&self.graph_url)
    }

    pub fn token_path(&self) -> PathBuf {
        self.cache_path.join("tokens.json")
    }

    /// The file store when asked for, otherwise the keyring with a
    /// session-only fallback.
    pub fn token_store(&self) -> Arc<dyn TokenStore> {
        if self.use_file_store {
            Arc::new(FileStore::new(self.token_path()))
        } else {
            Arc::new(FallbackStore::new(Box::new(KeyringStore::new()), Box::new(MemoryStore::new())))
        }
    }

    pub fn authenticator(&self) -> Authenticator {
        Authenticator::new(self.oauth_config(), self.token_store())
    }
}
