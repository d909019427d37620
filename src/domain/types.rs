//! Shared types for the telemetry pipeline

use serde::{Deserialize, Deserializer, Serialize};

/// Identity of a batched telemetry session: one device/driver pairing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub device_id: String,
    pub driver_id: String,
}

impl SessionKey {
    pub fn new(device_id: impl Into<String>, driver_id: impl Into<String>) -> Self {
        Self { device_id: device_id.into(), driver_id: driver_id.into() }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.device_id, self.driver_id)
    }
}

/// A single validated telemetry fix, immutable once appended to a session
#[derive(Debug, Clone, PartialEq)]
pub struct GpsPoint {
    /// Raw timestamp as received from the device
    pub timestamp: String,
    pub lat: f64,
    pub lon: f64,
    /// Speed over ground in km/h
    pub speed: f64,
}

/// Road classification used to select an applicable speed limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoadCategory {
    Motorway,
    Expressways,
    #[serde(rename = "National Highways")]
    NationalHighways,
    #[serde(rename = "Other Roads")]
    OtherRoads,
}

impl RoadCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoadCategory::Motorway => "Motorway",
            RoadCategory::Expressways => "Expressways",
            RoadCategory::NationalHighways => "National Highways",
            RoadCategory::OtherRoads => "Other Roads",
        }
    }
}

impl std::fmt::Display for RoadCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a derived driving event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveEventKind {
    HarshBrake,
    HarshAcceleration,
    Overspeeding,
}

impl DriveEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriveEventKind::HarshBrake => "harsh_brake",
            DriveEventKind::HarshAcceleration => "harsh_acceleration",
            DriveEventKind::Overspeeding => "overspeeding",
        }
    }
}

/// A validated inbound message, ready for the ingestor
#[derive(Debug, Clone)]
pub enum TelemetryMessage {
    /// Open a fresh session for the key (replacing any existing one)
    Start(SessionKey),
    /// Append a point to the open session for the key
    Point(SessionKey, GpsPoint),
    /// Close the session for the key and run the derivation pipeline
    End(SessionKey),
    /// Device boot announcement; triggers a driver roster publish
    Boot { device_id: String },
}

/// Raw inbound telemetry payload, before validation.
///
/// Numeric fields are accepted as JSON numbers or numeric strings since
/// device firmware is inconsistent about quoting.
#[derive(Debug, Deserialize)]
pub struct RawTelemetry {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_flexible_f64")]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_flexible_f64")]
    pub speed: Option<f64>,
}

fn deserialize_flexible_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct FlexibleF64Visitor;

    impl<'de> Visitor<'de> for FlexibleF64Visitor {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a number or numeric string")
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            value
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("invalid numeric value: {value:?}")))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(FlexibleF64Visitor)
}

/// Result of a session close attempt, mapped onto the confirmation payload
#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    /// Session existed but held no points; derivation skipped entirely
    EmptySession,
    /// END arrived with no session for the key
    NoSession,
    /// Batch persisted; at least one point stored
    Saved { points: usize, distance_km: f64 },
    InvalidDevice,
    InvalidDriver,
    NoValidPoints,
    StoreFailure,
}

impl CloseOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            CloseOutcome::EmptySession | CloseOutcome::NoSession | CloseOutcome::Saved { .. } => {
                "success"
            }
            _ => "error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            CloseOutcome::EmptySession => "empty_session_confirmed".to_string(),
            CloseOutcome::NoSession => "no_session_but_confirmed".to_string(),
            CloseOutcome::Saved { points, distance_km } => {
                format!("success_saved_{points}_points_distance_{distance_km:.2}km")
            }
            CloseOutcome::InvalidDevice => "error_invalid_device".to_string(),
            CloseOutcome::InvalidDriver => "error_invalid_driver".to_string(),
            CloseOutcome::NoValidPoints => "error_no_valid_points".to_string(),
            CloseOutcome::StoreFailure => "error_database".to_string(),
        }
    }
}
