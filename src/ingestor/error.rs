const MAX_BODY_EXCERPT: usize = 200;

/// Why one upstream round-trip produced no records.
///
/// `Status` and `Transport` mean the provider is unavailable, `Malformed`
/// means it answered with something that is not a JSON object.
#[derive(Debug)]
pub enum FetchError {
    Status { status: u16, body: String },
    Transport(reqwest::Error),
    Malformed(serde_json::Error),
}

impl FetchError {
    #[must_use]
    pub fn status(status: u16, body: &str) -> Self {
        let body = body.chars().take(MAX_BODY_EXCERPT).collect();
        FetchError::Status { status, body }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Status { status, body } => {
                write!(f, "Upstream returned status {status}: {body}")
            }
            FetchError::Transport(error) => write!(f, "Upstream request failed: {error}"),
            FetchError::Malformed(error) => write!(f, "Upstream payload malformed: {error}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Status { .. } => None,
            FetchError::Transport(error) => Some(error),
            FetchError::Malformed(error) => Some(error),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        FetchError::Transport(error)
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(error: serde_json::Error) -> Self {
        FetchError::Malformed(error)
    }
}
