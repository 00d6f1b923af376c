//! Artifact records and their on-disk representation.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// All records keyed by id, in id order.
pub type RecordMap = BTreeMap<String, ArtifactRecord>;

/// Metadata for one uploaded image and its QR code.
///
/// Serialized as the value of a JSON object keyed by id, so `id` itself is
/// not part of the document; [`MetadataStore`](crate::MetadataStore) fills it
/// in from the key on load. Every field tolerates being absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Opaque unique identifier
    #[serde(skip)]
    pub id: String,

    /// Sanitized client filename
    #[serde(default)]
    pub original_name: String,

    /// Stored optimized image
    #[serde(default)]
    pub image_path: PathBuf,

    /// Stored QR code PNG
    #[serde(default)]
    pub qr_path: PathBuf,

    /// Creation time
    #[serde(
        default = "default_upload_time",
        serialize_with = "serialize_time",
        deserialize_with = "deserialize_time"
    )]
    pub upload_time: DateTime<Utc>,

    /// Externally reachable view URL
    #[serde(default)]
    pub view_url: String,

    /// Byte length of the stored image
    #[serde(default)]
    pub file_size: u64,
}

impl ArtifactRecord {
    /// Age of the record at `now`; zero for records stamped in the future.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.upload_time)
            .to_std()
            .unwrap_or_default()
    }

    /// Whether the record is strictly older than `max_age` at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now) > max_age
    }
}

/// Timestamp assumed for records written without one.
pub fn default_upload_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Parse an ISO-8601 timestamp, with or without an offset.
///
/// Naive timestamps (`2024-05-01T10:00:00.123456`) are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn serialize_time<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true))
}

fn deserialize_time<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid upload_time '{raw}'")))
}
