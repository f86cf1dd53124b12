pub const UNKNOWN_CALLSIGN: &str = "unknown";

/// Latest known state of one aircraft, as served to clients.
#[derive(Debug, PartialEq, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    pub identifier: String,
    pub callsign: String,
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
    pub altitude: f64,
    pub ground_speed: f64,
}

impl PositionRecord {
    /// Builds a record, substituting defaults for absent optional fields.
    ///
    /// Blank callsigns become [`UNKNOWN_CALLSIGN`] and the heading is wrapped into `[0, 360)`.
    #[must_use]
    pub fn new(
        identifier: String,
        callsign: Option<&str>,
        latitude: f64,
        longitude: f64,
        heading: Option<f64>,
        altitude: Option<f64>,
        ground_speed: Option<f64>,
    ) -> Self {
        let callsign = callsign
            .map(str::trim)
            .filter(|callsign| !callsign.is_empty())
            .unwrap_or(UNKNOWN_CALLSIGN)
            .to_string();
        PositionRecord {
            identifier,
            callsign,
            latitude,
            longitude,
            heading: normalize_heading(heading.unwrap_or(0.0)),
            altitude: altitude.unwrap_or(0.0),
            ground_speed: ground_speed.unwrap_or(0.0),
        }
    }
}

fn normalize_heading(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// One refresh cycle's worth of records plus the time they were captured.
#[derive(Debug, PartialEq, Clone)]
pub struct Snapshot {
    pub records: Vec<PositionRecord>,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl Snapshot {
    #[must_use]
    pub fn new(records: Vec<PositionRecord>, captured_at: chrono::DateTime<chrono::Utc>) -> Self {
        Snapshot {
            records,
            captured_at,
        }
    }

    /// The state before any successful fetch: no records, epoch timestamp.
    #[must_use]
    pub fn empty() -> Self {
        Snapshot {
            records: Vec::new(),
            captured_at: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Snapshot::empty()
    }
}

/// Rectangular lat/lon region. Bounds are inclusive and taken as given;
/// an inverted box is not normalized and matches nothing.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    #[must_use]
    pub fn new(min_latitude: f64, max_latitude: f64, min_longitude: f64, max_longitude: f64) -> Self {
        BoundingBox {
            min_latitude,
            max_latitude,
            min_longitude,
            max_longitude,
        }
    }

    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&latitude)
            && (self.min_longitude..=self.max_longitude).contains(&longitude)
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lat [{}, {}] lon [{}, {}]",
            self.min_latitude, self.max_latitude, self.min_longitude, self.max_longitude
        )
    }
}
