use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

/// A single GPS fix as returned by the source API.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord {
	#[serde(deserialize_with = "device_id")]
	pub id_collar: String,
	#[serde(deserialize_with = "acquisition_time")]
	pub acquisition_time: DateTime<Utc>,
	pub latitude: f64,
	pub longitude: f64,
	#[serde(default)]
	pub origin_code: Option<String>,
	#[serde(default)]
	pub ecef_x: Option<i64>,
	#[serde(default)]
	pub ecef_y: Option<i64>,
	#[serde(default)]
	pub ecef_z: Option<i64>,
	#[serde(default)]
	pub height: Option<f64>,
	#[serde(default)]
	pub dop: Option<f64>,
	#[serde(default)]
	pub main_voltage: Option<f64>,
	#[serde(default)]
	pub backup_voltage: Option<f64>,
	#[serde(default)]
	pub temperature: Option<f64>,
}

impl SourceRecord {
	/// A record with only the identifying fields set.
	#[must_use]
	pub fn new(
		id_collar: impl Into<String>,
		acquisition_time: DateTime<Utc>,
		latitude: f64,
		longitude: f64,
	) -> Self {
		Self {
			id_collar: id_collar.into(),
			acquisition_time,
			latitude,
			longitude,
			origin_code: None,
			ecef_x: None,
			ecef_y: None,
			ecef_z: None,
			height: None,
			dop: None,
			main_voltage: None,
			backup_voltage: None,
			temperature: None,
		}
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
	Number(i64),
	String(String),
}

fn device_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
	Ok(match NumberOrString::deserialize(deserializer)? {
		NumberOrString::Number(n) => n.to_string(),
		NumberOrString::String(s) => s,
	})
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses a timestamp, assuming UTC when the source omits the offset.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
	if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
		return Some(dt.with_timezone(&Utc));
	}

	NAIVE_FORMATS
		.iter()
		.find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
		.map(|naive| naive.and_utc())
}

fn acquisition_time<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
	let raw = String::deserialize(deserializer)?;

	parse_timestamp(&raw)
		.ok_or_else(|| serde::de::Error::custom(format!("invalid acquisition time: '{raw}'")))
}
