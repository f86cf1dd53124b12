mod constants;

use crate::types::PositionRecord;
use serde::Deserialize;
use constants::{ALTITUDE_ON_GROUND, COLLECTION_FIELD};

/// One element of the upstream collection. Every field is optional here;
/// required ones are checked in [`build_position_record`].
#[derive(Debug, serde::Deserialize)]
struct UpstreamAircraft {
    hex: Option<String>,
    flight: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    track: Option<f64>,
    alt_baro: Option<serde_json::Value>,
    gs: Option<f64>,
}

#[derive(Debug, PartialEq)]
pub enum PositionBuildError {
    InvalidShape(String),
    MissingIdentifier,
    MissingLatitude,
    MissingLongitude,
}

impl std::fmt::Display for PositionBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionBuildError::InvalidShape(reason) => write!(f, "Invalid element: {reason}"),
            PositionBuildError::MissingIdentifier => write!(f, "Element has no identifier"),
            PositionBuildError::MissingLatitude => write!(f, "Element has no latitude"),
            PositionBuildError::MissingLongitude => write!(f, "Element has no longitude"),
        }
    }
}

/// Parses an upstream response body into position records.
///
/// A body that is not a JSON object is an error. An absent or `null`
/// collection field yields no records, and elements that cannot be turned
/// into a record are dropped individually.
pub fn parse_payload(body: &str) -> Result<Vec<PositionRecord>, serde_json::Error> {
    let payload: serde_json::Map<String, serde_json::Value> = serde_json::from_str(body)?;

    let Some(serde_json::Value::Array(elements)) = payload.get(COLLECTION_FIELD) else {
        log::debug!("Payload has no '{COLLECTION_FIELD}' collection, treating as empty");
        return Ok(Vec::new());
    };

    let records = elements
        .iter()
        .filter_map(|element| match build_position_record(element) {
            Ok(record) => Some(record),
            Err(err) => {
                log::debug!("Discarding upstream element: {err}");
                None
            }
        })
        .collect();
    Ok(records)
}

pub fn build_position_record(
    element: &serde_json::Value,
) -> Result<PositionRecord, PositionBuildError> {
    let aircraft = UpstreamAircraft::deserialize(element)
        .map_err(|e| PositionBuildError::InvalidShape(e.to_string()))?;

    let identifier = aircraft
        .hex
        .filter(|hex| !hex.trim().is_empty())
        .ok_or(PositionBuildError::MissingIdentifier)?;
    let latitude = aircraft.lat.ok_or(PositionBuildError::MissingLatitude)?;
    let longitude = aircraft.lon.ok_or(PositionBuildError::MissingLongitude)?;

    Ok(PositionRecord::new(
        identifier,
        aircraft.flight.as_deref(),
        latitude,
        longitude,
        aircraft.track,
        aircraft.alt_baro.as_ref().map(altitude_in_feet),
        aircraft.gs,
    ))
}

// Barometric altitude is either a number of feet or the literal "ground".
fn altitude_in_feet(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::Number(number) => number.as_f64().unwrap_or(0.0),
        serde_json::Value::String(string) if string == ALTITUDE_ON_GROUND => 0.0,
        other => {
            log::debug!("Unrecognised altitude {other}, using 0");
            0.0
        }
    }
}
