use crate::fetch::{HttpFetcher, RemoteFetcher};
use crate::logic::{JoinerOptions, DEFAULT_MAX_DEPTH};
use crate::registry::ServiceRegistry;
use crate::seed;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub joiner: JoinerConfig,
    /// Path to a JSON file holding the service topology
    pub topology: Option<String>,
    /// Service name -> URL the HTTP fetcher posts sub-queries to
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinerConfig {
    pub max_depth: usize,
    pub fetch_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3002,
        }
    }
}

impl Default for JoinerConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            fetch_timeout_ms: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional `config` file and `JOINER_*` variables
    ///
    /// Nested keys use a double underscore, e.g. `JOINER_SERVER__PORT=8080` or
    /// `JOINER_ENDPOINTS__ORDERS=http://orders.internal/query`.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        config = config.add_source(config::File::with_name("config").required(false));

        config = config.add_source(
            config::Environment::with_prefix("JOINER")
                .separator("__")
                .prefix_separator("_"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn joiner_options(&self) -> JoinerOptions {
        JoinerOptions {
            max_depth: self.joiner.max_depth,
            fetch_timeout: self.joiner.fetch_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Registry from the topology file, or the built-in demo topology when none is set
    pub fn load_registry(&self) -> anyhow::Result<ServiceRegistry> {
        match &self.topology {
            Some(path) => ServiceRegistry::from_json_file(path),
            None => Ok(seed::demo_registry()?),
        }
    }

    /// HTTP fetcher when endpoints are configured, the in-memory demo fetcher otherwise
    pub fn build_fetcher(&self) -> Arc<dyn RemoteFetcher> {
        if self.endpoints.is_empty() {
            Arc::new(seed::demo_fetcher())
        } else {
            Arc::new(HttpFetcher::new(self.endpoints.clone()))
        }
    }
}
