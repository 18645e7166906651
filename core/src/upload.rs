//! Turns uploaded device lists into [`CredentialSet`]s.
//!
//! Each uploaded file is a JSON list of `{"parsedData": {...}}` entries, sent either as plain
//! JSON or base64 encoded. Extraction is all or nothing: one bad file or entry rejects the
//! whole upload.

use crate::{
	credentials::{CredentialSet, DeviceMetadata, ValidationError},
	Error,
};

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(thiserror::Error, Debug)]
pub enum UploadError {
	#[error("uploaded file <index={index}> is neither JSON nor base64 encoded JSON: {source}")]
	Decode {
		index: usize,
		#[source]
		source: serde_json::Error,
	},
}

#[derive(Deserialize, Debug)]
struct UploadEntry {
	#[serde(rename = "parsedData")]
	parsed_data: RawCredential,
}

/// A descriptor as found in the upload, before validation.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawCredential {
	#[serde(rename = "collarID", default)]
	pub collar_id: Option<Value>,
	#[serde(rename = "collarType", default)]
	pub collar_type: Option<String>,
	#[serde(rename = "comID", default)]
	pub com_id: Option<String>,
	#[serde(rename = "comType", default)]
	pub com_type: Option<String>,
	#[serde(default)]
	pub key: Option<String>,
}

impl RawCredential {
	pub fn validate(self) -> Result<CredentialSet, ValidationError> {
		let collar_id = match self.collar_id {
			Some(Value::String(s)) => s,
			Some(Value::Number(n)) => n.to_string(),
			_ => String::new(),
		};

		if collar_id.trim().is_empty() {
			return Err(ValidationError::missing("collarID"));
		}

		let key = self.key.unwrap_or_default();
		if key.trim().is_empty() {
			return Err(ValidationError::missing("key"));
		}

		CredentialSet::new(
			collar_id,
			key,
			DeviceMetadata {
				device_kind: self.collar_type,
				com_id: self.com_id,
				com_type: self.com_type,
			},
		)
	}
}

fn decode_file(index: usize, contents: &str) -> Result<Vec<UploadEntry>, UploadError> {
	let trimmed = contents.trim();

	match serde_json::from_str(trimmed) {
		Ok(entries) => Ok(entries),
		Err(json_err) => STANDARD
			.decode(trimmed)
			.ok()
			.and_then(|bytes| serde_json::from_slice(&bytes).ok())
			.ok_or(UploadError::Decode {
				index,
				source: json_err,
			}),
	}
}

/// Decodes every uploaded file, in order, into one validated credential batch.
pub fn extract_credentials<I, S>(files: I) -> Result<Vec<CredentialSet>, Error>
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	let mut raw = Vec::new();

	for (index, contents) in files.into_iter().enumerate() {
		let entries = decode_file(index, contents.as_ref())?;
		debug!(file_index = index, entries = entries.len(), "Decoded uploaded file");
		raw.extend(entries.into_iter().map(|entry| entry.parsed_data));
	}

	raw.into_iter()
		.enumerate()
		.map(|(index, raw)| raw.validate().map_err(|e| e.at(index)))
		.collect::<Result<Vec<_>, _>>()
		.map_err(Into::into)
}

#[cfg(test)]
mod tests {
	use super::*;

	use serde_json::json;

	fn entry(collar_id: Value, key: &str) -> Value {
		json!({
			"parsedData": {
				"collarID": collar_id,
				"collarType": "A",
				"comID": "X",
				"comType": "Y",
				"key": key,
			}
		})
	}

	#[test]
	fn extracts_plain_json() {
		let file = json!([entry(json!("1"), "K"), entry(json!(2), "L")]).to_string();

		let creds = extract_credentials([file]).unwrap();

		assert_eq!(creds.len(), 2);
		assert_eq!(creds[0].device_id(), "1");
		assert_eq!(creds[0].device_secret(), "K");
		assert_eq!(creds[0].metadata().com_type.as_deref(), Some("Y"));
		assert_eq!(creds[1].device_id(), "2");
	}

	#[test]
	fn extracts_base64_json_across_files() {
		let first = STANDARD.encode(json!([entry(json!("1"), "K")]).to_string());
		let second = json!([entry(json!("2"), "L")]).to_string();

		let ids = extract_credentials([first, second])
			.unwrap()
			.iter()
			.map(|c| c.device_id().to_string())
			.collect::<Vec<_>>();

		assert_eq!(ids, ["1", "2"]);
	}

	#[test]
	fn empty_list_is_valid() {
		assert!(extract_credentials(["[]"]).unwrap().is_empty());
		assert!(extract_credentials(Vec::<String>::new()).unwrap().is_empty());
	}

	#[test]
	fn garbage_is_rejected() {
		assert!(matches!(
			extract_credentials(["[]", "not a json"]),
			Err(Error::Upload(UploadError::Decode { index: 1, .. }))
		));
	}

	#[test]
	fn one_missing_id_rejects_the_batch() {
		let file = json!([
			entry(json!("1"), "K"),
			{ "parsedData": { "collarType": "A", "comID": "X", "comType": "Y", "key": "K" } },
		])
		.to_string();

		let err = extract_credentials([file]).unwrap_err();

		assert!(err.is_batch_fatal());
		assert!(matches!(
			err,
			Error::Validation(ValidationError {
				index: Some(1),
				field: "collarID"
			})
		));
	}

	#[test]
	fn empty_key_rejects_the_batch() {
		let file = json!([entry(json!("1"), "")]).to_string();

		assert!(matches!(
			extract_credentials([file]),
			Err(Error::Validation(ValidationError { field: "key", .. }))
		));
	}
}
