use config::{Config, ConfigError, Environment, File, Map};
use serde::Deserialize;

/// Prefix for `COMPASS__<SECTION>__<KEY>` environment overrides.
const ENV_PREFIX: &str = "COMPASS";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CompassConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub advice: AdviceConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: compose_database_url(|_| None),
            max_connections: 10,
            acquire_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// `onnx` (default) or `hashing`.
    pub backend: String,
    /// Path to the ONNX model; empty means the default model directory.
    pub model_path: String,
    pub dimensions: u32,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: "onnx".to_string(),
            model_path: String::new(),
            dimensions: 384,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// IVFFlat cluster count used when the index is built.
    pub ivfflat_lists: u32,
    /// Clusters visited per query; equal to `ivfflat_lists` means exact search.
    pub ivfflat_probes: u32,
    pub query_timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ivfflat_lists: 100,
            ivfflat_probes: 10,
            query_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub default_k: u32,
    pub max_k: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            max_k: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AdviceConfig {
    pub neighbors: u32,
    pub max_skills: u32,
}

impl Default for AdviceConfig {
    fn default() -> Self {
        Self {
            neighbors: 10,
            max_skills: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    /// Answer CORS preflights for any origin, for a browser front end served elsewhere.
    pub cors_permissive: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_upload_bytes: 5 * 1024 * 1024,
            cors_permissive: true,
        }
    }
}

impl CompassConfig {
    /// Load `path` (optional file) layered under the process environment.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let env: Map<String, String> = std::env::vars().collect();
        Self::load_with_env(path, &env)
    }

    /// Same as [`CompassConfig::load`] with an explicit environment snapshot.
    ///
    /// Precedence, lowest first: built-in defaults (including the discrete
    /// `POSTGRES_*` keys), the TOML file, `POSTGRES_URL`, `DATABASE_URL`,
    /// then `COMPASS__<SECTION>__<KEY>`.
    pub fn load_with_env(path: &str, env: &Map<String, String>) -> Result<Self, ConfigError> {
        let lookup = |key: &str| env.get(key).cloned();
        // Overrides outrank every source, so the prefixed key has to be folded in here.
        let url_override = lookup("COMPASS__DATABASE__URL")
            .or_else(|| lookup("DATABASE_URL"))
            .or_else(|| lookup("POSTGRES_URL"));

        let mut builder = Config::builder()
            .set_default("database.url", compose_database_url(lookup))?
            .add_source(File::with_name(path).required(false))
            .set_override_option("database.url", url_override)?;

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone())),
        );

        let config: CompassConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later, deep inside a request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.database.url;
        if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
            return Err(ConfigError::Message(format!(
                "database.url must be a postgres:// connection string, got '{url}'"
            )));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Message(
                "embedding.dimensions must be positive".to_string(),
            ));
        }
        if self.store.ivfflat_lists == 0 || self.store.ivfflat_probes == 0 {
            return Err(ConfigError::Message(
                "store.ivfflat_lists and store.ivfflat_probes must be positive".to_string(),
            ));
        }
        if self.search.default_k == 0 || self.search.max_k < self.search.default_k {
            return Err(ConfigError::Message(format!(
                "search.default_k ({}) must be in 1..=search.max_k ({})",
                self.search.default_k, self.search.max_k
            )));
        }
        Ok(())
    }
}

/// Build a connection string from the discrete `POSTGRES_*` keys.
pub fn compose_database_url(lookup: impl Fn(&str) -> Option<String>) -> String {
    let host = lookup("POSTGRES_HOST").unwrap_or_else(|| "localhost".to_string());
    let port = lookup("POSTGRES_PORT").unwrap_or_else(|| "5432".to_string());
    let user = lookup("POSTGRES_USER").unwrap_or_else(|| "postgres".to_string());
    let password = lookup("POSTGRES_PASSWORD").unwrap_or_else(|| "postgres".to_string());
    let database = lookup("POSTGRES_DB").unwrap_or_else(|| "career_compass_ai".to_string());
    format!("postgresql://{user}:{password}@{host}:{port}/{database}")
}
