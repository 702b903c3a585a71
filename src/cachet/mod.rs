//! cachet status page gateway
//!
//! [StatusPage] is the capability set the reconciler needs from the status
//! page, [client::Client] implements it against the cachet v1 http api.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::{client::Client, settings::CachetSettings};

pub mod client;
pub mod settings;

mod metrics;

#[cfg(test)]
pub mod fake;

/// body of a successful `GET /api/v1/ping`
pub const PING_ACK: &str = "Pong!";

/// id assigned to an incident by cachet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct IncidentId(pub u64);

impl fmt::Display for IncidentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

#[derive(Debug, Error)]
#[error("unknown incident status {0}")]
pub struct UnknownIncidentStatus(u8);

/// incident states, sent as integers over the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum IncidentStatus {
	Scheduled,
	Investigating,
	Identified,
	Watching,
	Fixed,
}

impl TryFrom<u8> for IncidentStatus {
	type Error = UnknownIncidentStatus;

	fn try_from(value: u8) -> Result<Self, Self::Error> {
		Ok(match value {
			0 => Self::Scheduled,
			1 => Self::Investigating,
			2 => Self::Identified,
			3 => Self::Watching,
			4 => Self::Fixed,
			other => return Err(UnknownIncidentStatus(other)),
		})
	}
}

impl From<IncidentStatus> for u8 {
	fn from(status: IncidentStatus) -> Self {
		match status {
			IncidentStatus::Scheduled => 0,
			IncidentStatus::Investigating => 1,
			IncidentStatus::Identified => 2,
			IncidentStatus::Watching => 3,
			IncidentStatus::Fixed => 4,
		}
	}
}

/// request body for creating an incident
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIncident {
	pub name: String,
	pub message: String,
	pub status: IncidentStatus,
	pub visible: u8,
}

impl NewIncident {
	/// publicly visible incident in the investigating state
	pub fn investigating(name: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			message: message.into(),
			status: IncidentStatus::Investigating,
			visible: 1,
		}
	}
}

/// request body for posting an update to an incident
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIncidentUpdate {
	pub message: String,
	pub status: IncidentStatus,
}

impl NewIncidentUpdate {
	pub fn fixed(message: impl Into<String>) -> Self {
		Self { message: message.into(), status: IncidentStatus::Fixed }
	}
}

/// incident as returned by cachet
///
/// only `id` is required, the incident exists on the status page as soon as
/// cachet hands one out
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Incident {
	pub id: IncidentId,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub status: Option<IncidentStatus>,
}

/// incident update as returned by cachet
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IncidentUpdate {
	#[serde(default)]
	pub id: Option<u64>,
	pub incident_id: IncidentId,
	#[serde(default)]
	pub status: Option<IncidentStatus>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
	#[error("invalid cachet endpoint url: {0}")]
	Url(#[from] url::ParseError),

	#[error("cachet request failed: {0}")]
	Http(#[from] reqwest::Error),

	#[error("cachet responded with {status}: {body}")]
	Status { status: reqwest::StatusCode, body: String },
}

/// What the reconciler and the health check need from the status page.
#[async_trait]
pub trait StatusPage: Send + Sync {
	async fn create_incident(&self, incident: &NewIncident) -> Result<Incident, GatewayError>;

	async fn update_incident(
		&self,
		id: IncidentId,
		update: &NewIncidentUpdate,
	) -> Result<IncidentUpdate, GatewayError>;

	/// returns the acknowledgement sent by the status page, [PING_ACK] if it's healthy
	async fn ping(&self) -> Result<String, GatewayError>;
}
