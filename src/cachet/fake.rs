//! in-memory [StatusPage] recording every call, for tests
use std::sync::{
	atomic::{AtomicBool, AtomicU64, Ordering},
	Mutex,
};

use async_trait::async_trait;

use super::{
	GatewayError, Incident, IncidentId, IncidentUpdate, NewIncident, NewIncidentUpdate, StatusPage,
	PING_ACK,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
	Create(NewIncident),
	Update(IncidentId, NewIncidentUpdate),
	Ping,
}

fn unavailable() -> GatewayError {
	GatewayError::Status {
		status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
		body: String::from("down for maintenance"),
	}
}

#[derive(Debug)]
pub struct FakeStatusPage {
	calls: Mutex<Vec<Call>>,
	next_id: AtomicU64,
	pub fail_create: AtomicBool,
	pub fail_update: AtomicBool,
	pub fail_ping: AtomicBool,
	pub ping_ack: Mutex<String>,
}

impl Default for FakeStatusPage {
	fn default() -> Self {
		Self {
			calls: Mutex::new(Vec::new()),
			next_id: AtomicU64::new(1),
			fail_create: AtomicBool::new(false),
			fail_update: AtomicBool::new(false),
			fail_ping: AtomicBool::new(false),
			ping_ack: Mutex::new(String::from(PING_ACK)),
		}
	}
}

impl FakeStatusPage {
	pub fn calls(&self) -> Vec<Call> {
		self.calls.lock().unwrap().clone()
	}

	pub fn creates(&self) -> Vec<NewIncident> {
		self.calls()
			.into_iter()
			.filter_map(|call| match call {
				Call::Create(incident) => Some(incident),
				_ => None,
			})
			.collect()
	}

	pub fn updates(&self) -> Vec<(IncidentId, NewIncidentUpdate)> {
		self.calls()
			.into_iter()
			.filter_map(|call| match call {
				Call::Update(id, update) => Some((id, update)),
				_ => None,
			})
			.collect()
	}

	fn record(&self, call: Call) {
		self.calls.lock().unwrap().push(call);
	}
}

#[async_trait]
impl StatusPage for FakeStatusPage {
	async fn create_incident(&self, incident: &NewIncident) -> Result<Incident, GatewayError> {
		self.record(Call::Create(incident.clone()));
		tokio::task::yield_now().await;

		if self.fail_create.load(Ordering::SeqCst) {
			return Err(unavailable());
		}

		Ok(Incident {
			id: IncidentId(self.next_id.fetch_add(1, Ordering::SeqCst)),
			name: incident.name.clone(),
			status: Some(incident.status),
		})
	}

	async fn update_incident(
		&self,
		id: IncidentId,
		update: &NewIncidentUpdate,
	) -> Result<IncidentUpdate, GatewayError> {
		self.record(Call::Update(id, update.clone()));
		tokio::task::yield_now().await;

		if self.fail_update.load(Ordering::SeqCst) {
			return Err(unavailable());
		}

		Ok(IncidentUpdate {
			id: Some(self.next_id.fetch_add(1, Ordering::SeqCst)),
			incident_id: id,
			status: Some(update.status),
		})
	}

	async fn ping(&self) -> Result<String, GatewayError> {
		self.record(Call::Ping);

		if self.fail_ping.load(Ordering::SeqCst) {
			return Err(unavailable());
		}

		Ok(self.ping_ack.lock().unwrap().clone())
	}
}
