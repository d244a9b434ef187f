use agentrag_client::HttpClientConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Base URL of the RAG backend
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Fail a session when the stream stays silent this long
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Print each step's data payload under the step line
    #[serde(default = "default_false")]
    pub show_step_data: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            pool_max_idle_per_host: default_pool_max_idle(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            show_step_data: false,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML or TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)?
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents)?
        };

        Ok(config)
    }

    /// Override settings from environment variables
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("AGENTRAG_BASE_URL") {
            self.server.base_url = val;
        }

        if let Ok(val) = std::env::var("AGENTRAG_IDLE_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(0) => self.session.idle_timeout_secs = None,
                Ok(secs) => self.session.idle_timeout_secs = Some(secs),
                Err(_) => eprintln!(
                    "Warning: Invalid AGENTRAG_IDLE_TIMEOUT_SECS '{}', ignoring",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("AGENTRAG_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Ok(val) = std::env::var("AGENTRAG_SHOW_STEP_DATA")
            && let Ok(enabled) = val.parse::<bool>()
        {
            self.logging.show_step_data = enabled;
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            request_timeout_secs: self.http.request_timeout_secs,
            connect_timeout_secs: self.http.connect_timeout_secs,
            pool_max_idle_per_host: self.http.pool_max_idle_per_host,
            user_agent: self.http.user_agent.clone(),
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.session
            .idle_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_pool_max_idle() -> usize {
    8
}

fn default_user_agent() -> String {
    format!("AgentRAG/{}", env!("CARGO_PKG_VERSION"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_false() -> bool {
    false
}
