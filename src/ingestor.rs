pub mod config;
pub mod error;

use crate::ingestor::config::UpstreamConfig;
use crate::ingestor::error::FetchError;
use crate::observer::{RefreshEvent, RefreshObserver};
use crate::parser::parse_payload;
use crate::types::{PositionRecord, Snapshot};

const HOST_HEADER: &str = "x-rapidapi-host";
const KEY_HEADER: &str = "x-rapidapi-key";

/// Anything that can produce a fresh [`Snapshot`] in one round-trip.
///
/// Implementations never fail: an unreachable or misbehaving source yields
/// an empty snapshot.
pub trait PositionSource: Send + Sync + 'static {
    fn fetch(&self) -> Snapshot;
}

/// Pulls aircraft positions from the RapidAPI-hosted ADS-B Exchange endpoint.
pub struct Ingestor {
    client: reqwest::blocking::Client,
    url: String,
    host: String,
    api_key: String,
    observer: std::sync::Arc<dyn RefreshObserver>,
}

impl Ingestor {
    /// Builds the HTTP client. Must not be called from inside an async runtime.
    pub fn new(
        config: &UpstreamConfig,
        observer: std::sync::Arc<dyn RefreshObserver>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .build()?;
        log::info!("Ingestor: upstream endpoint is {}", config.url());
        Ok(Ingestor {
            client,
            url: config.url(),
            host: config.host.clone(),
            api_key: config.api_key.clone(),
            observer,
        })
    }

    /// One request with no retry. Retrying is the scheduler's next cycle.
    pub fn try_fetch(&self) -> Result<Vec<PositionRecord>, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .header(HOST_HEADER, &self.host)
            .header(KEY_HEADER, &self.api_key)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(FetchError::status(status.as_u16(), &body));
        }

        let body = response.text()?;
        Ok(parse_payload(&body)?)
    }
}

impl PositionSource for Ingestor {
    fn fetch(&self) -> Snapshot {
        self.observer.record(RefreshEvent::FetchAttempted);
        match self.try_fetch() {
            Ok(records) => {
                self.observer.record(RefreshEvent::FetchSucceeded {
                    records: records.len(),
                });
                Snapshot::new(records, chrono::Utc::now())
            }
            Err(err) => {
                self.observer.record(RefreshEvent::FetchFailed {
                    reason: err.to_string(),
                });
                // Stamped with the attempt time so a failing upstream is not retried
                // faster than the refresh period.
                Snapshot::new(Vec::new(), chrono::Utc::now())
            }
        }
    }
}
