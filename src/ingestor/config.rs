pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// Where and how to reach the upstream aircraft-tracking provider.
#[derive(serde::Deserialize, Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub path: String,
    /// Sent as the `x-rapidapi-host` header.
    pub host: String,
    /// Sent as the `x-rapidapi-key` header.
    pub api_key: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl UpstreamConfig {
    #[must_use]
    pub fn url(&self) -> String {
        format!("{0}{1}", self.base_url.trim_end_matches('/'), self.path)
    }

    #[must_use]
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}
