//! data structures for deserializing incoming alerts
use std::{collections::HashMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// label carrying the identity of an alert
pub const ALERT_NAME_LABEL: &str = "alertname";
/// annotation carrying the human readable text of an alert
pub const SUMMARY_ANNOTATION: &str = "summary";

#[derive(Debug, Error)]
#[error("failed to decode alertmanager payload: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Status of a batch or a single alert.
///
/// Parsed case-insensitively. Everything that isn't `resolved` counts as
/// firing, alertmanager only ever sends those two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
	Firing,
	Resolved,
}

impl AlertStatus {
	pub fn parse(status: &str) -> Self {
		if status.trim().eq_ignore_ascii_case("resolved") {
			Self::Resolved
		} else {
			Self::Firing
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Firing => "firing",
			Self::Resolved => "resolved",
		}
	}
}

impl fmt::Display for AlertStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for AlertStatus {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let status = String::deserialize(deserializer)?;
		Ok(Self::parse(&status))
	}
}

impl Serialize for AlertStatus {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(self.as_str())
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
/// data from prometheus received by the alertmanager webhook receiver
///
/// only `status` and `alerts` are required, the rest is kept for logging
#[allow(clippy::missing_docs_in_private_items)]
pub struct Data {
	#[serde(default)]
	pub version: String,
	#[serde(default)]
	pub group_key: String,
	#[serde(default)]
	pub receiver: String,

	pub status: AlertStatus,
	pub alerts: Vec<Alert>,

	#[serde(default)]
	pub group_labels: HashMap<String, String>,
	#[serde(default)]
	pub common_labels: HashMap<String, String>,
	#[serde(default)]
	pub common_annotations: HashMap<String, String>,
	#[serde(rename = "externalURL", default)]
	pub external_url: String,
}

impl Data {
	/// decode a webhook body, independent of the request's content type
	pub fn from_slice(body: &[u8]) -> Result<Self, DecodeError> {
		Ok(serde_json::from_slice(body)?)
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::missing_docs_in_private_items)]
pub struct Alert {
	pub status: AlertStatus,
	#[serde(default)]
	pub labels: HashMap<String, String>,
	#[serde(default)]
	pub annotations: HashMap<String, String>,
	#[serde(default)]
	pub starts_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub ends_at: Option<DateTime<Utc>>,
	#[serde(rename = "generatorURL", default)]
	pub generator_url: String,
	#[serde(default)]
	pub fingerprint: String,
}

impl Alert {
	/// the dedup key of the alert, empty if the label is missing
	pub fn name(&self) -> &str {
		self.labels.get(ALERT_NAME_LABEL).map_or("", String::as_str)
	}

	pub fn summary(&self) -> &str {
		self.annotations.get(SUMMARY_ANNOTATION).map_or("", String::as_str)
	}
}
