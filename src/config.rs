use crate::ingestor::config::UpstreamConfig;
use serde;
use toml;

pub const DEFAULT_PERIOD_SECONDS: u64 = 30;
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5000";
pub const DEFAULT_INDEX_PATH: &str = "index.html";

#[derive(serde::Deserialize, Debug)]
pub struct ApplicationConfig {
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl ApplicationConfig {
    pub fn construct_from_path(
        path: &std::path::PathBuf,
    ) -> Result<ApplicationConfig, errors::ApplicationConfigError> {
        let string =
            std::fs::read_to_string(path).map_err(|error| errors::ApplicationConfigError::Io {
                source: error,
                path: path.clone(),
            })?;

        let config: ApplicationConfig =
            toml::from_str(&string).map_err(|error| errors::ApplicationConfigError::Parse {
                source: error,
                path: path.clone(),
            })?;

        if config.refresh.period_seconds == 0 {
            return Err(errors::ApplicationConfigError::Invalid {
                reason: String::from("refresh.period_seconds must be at least 1"),
                path: path.clone(),
            });
        }
        Ok(config)
    }
}

#[derive(serde::Deserialize, Debug)]
pub struct RefreshConfig {
    #[serde(default = "default_period_seconds")]
    pub period_seconds: u64,
}

impl RefreshConfig {
    #[must_use]
    pub fn period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.period_seconds)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            period_seconds: DEFAULT_PERIOD_SECONDS,
        }
    }
}

#[derive(serde::Deserialize, Debug)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: std::net::SocketAddr,
    #[serde(default = "default_index_path")]
    pub index_path: std::path::PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: default_bind_address(),
            index_path: default_index_path(),
        }
    }
}

fn default_period_seconds() -> u64 {
    DEFAULT_PERIOD_SECONDS
}

fn default_bind_address() -> std::net::SocketAddr {
    std::net::SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn default_index_path() -> std::path::PathBuf {
    std::path::PathBuf::from(DEFAULT_INDEX_PATH)
}

pub mod errors {

    #[derive(Debug)]
    pub enum ApplicationConfigError {
        Parse {
            source: toml::de::Error,
            path: std::path::PathBuf,
        },
        Io {
            source: std::io::Error,
            path: std::path::PathBuf,
        },
        Invalid {
            reason: String,
            path: std::path::PathBuf,
        },
    }
    impl std::fmt::Display for ApplicationConfigError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                ApplicationConfigError::Io {
                    source: error,
                    path,
                } => {
                    write!(
                        f,
                        "Failed to read config file '{}': {}",
                        path.display(),
                        error
                    )
                }
                ApplicationConfigError::Parse {
                    source: error,
                    path,
                } => {
                    write!(
                        f,
                        "Failed to parse config file '{}': {}",
                        path.display(),
                        error
                    )
                }
                ApplicationConfigError::Invalid { reason, path } => {
                    write!(f, "Invalid config file '{}': {}", path.display(), reason)
                }
            }
        }
    }
    impl std::error::Error for ApplicationConfigError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            match self {
                ApplicationConfigError::Io { source: error, .. } => Some(error),
                ApplicationConfigError::Parse { source: error, .. } => Some(error),
                ApplicationConfigError::Invalid { .. } => None,
            }
        }
    }
}
