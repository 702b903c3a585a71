//! Mirrors alerts into incidents on the status page.
//!
//! Every alert is looked up by name in the [IncidentRegistry]:
//! - firing and unknown: open an investigating incident and remember its id
//! - firing and known: already reported, nothing to do
//! - resolved and known: mark the incident as fixed and forget it
//! - resolved and unknown: see [ResolvedWithoutIncident]
//!
//! The registry lock is never held across a status page request. Two requests
//! racing on the same new alert name can therefore both open an incident, the
//! later insert wins.

use std::sync::Arc;

use prometheus::{IntCounterVec, IntGauge, Registry};
use serde::Deserialize;

use crate::{
	alert::{self, AlertStatus},
	cachet::{IncidentId, NewIncident, NewIncidentUpdate, StatusPage},
	registry::IncidentRegistry,
};

/// what to do with a resolved alert that has no open incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedWithoutIncident {
	/// nothing to resolve, drop the notification
	#[default]
	Ignore,
	/// open an investigating incident anyway, the legacy behavior
	Open,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconcilerSettings {
	#[serde(default)]
	pub resolved_without_incident: ResolvedWithoutIncident,
}

/// result of reconciling a single alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	Opened(IncidentId),
	Duplicate(IncidentId),
	Resolved(IncidentId),
	Ignored,
	CreateFailed,
	UpdateFailed(IncidentId),
}

impl Outcome {
	fn label(&self) -> &'static str {
		match self {
			Self::Opened(_) => "opened",
			Self::Duplicate(_) => "duplicate",
			Self::Resolved(_) => "resolved",
			Self::Ignored => "ignored",
			Self::CreateFailed => "create_failed",
			Self::UpdateFailed(_) => "update_failed",
		}
	}
}

#[derive(Debug, Clone)]
struct ReconcilerMetrics {
	/// reconciled alerts by outcome
	transitions: IntCounterVec,
	/// incidents currently in the registry
	open_incidents: IntGauge,
}

impl ReconcilerMetrics {
	fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
		use prometheus::{opts, register_int_counter_vec_with_registry, register_int_gauge_with_registry};

		let transitions = register_int_counter_vec_with_registry!(
			opts!("transitions_total", "reconciled alerts by outcome")
				.namespace("prometheus_cachet")
				.subsystem("reconciler"),
			&["outcome"],
			registry
		)?;

		let open_incidents = register_int_gauge_with_registry!(
			opts!("open_incidents", "incidents opened by this process and not yet resolved")
				.namespace("prometheus_cachet")
				.subsystem("reconciler"),
			registry
		)?;

		Ok(Self { transitions, open_incidents })
	}
}

pub struct Reconciler {
	status_page: Arc<dyn StatusPage>,
	registry: Arc<IncidentRegistry>,
	/// message of the update closing an incident
	resolution_message: String,
	resolved_without_incident: ResolvedWithoutIncident,
	metrics: ReconcilerMetrics,
}

impl Reconciler {
	pub fn new(
		status_page: Arc<dyn StatusPage>,
		registry: Arc<IncidentRegistry>,
		resolution_message: String,
		settings: &ReconcilerSettings,
		metrics_registry: &Registry,
	) -> Result<Self, prometheus::Error> {
		Ok(Self {
			status_page,
			registry,
			resolution_message,
			resolved_without_incident: settings.resolved_without_incident,
			metrics: ReconcilerMetrics::new(metrics_registry)?,
		})
	}

	#[cfg(test)]
	pub fn registry(&self) -> &Arc<IncidentRegistry> {
		&self.registry
	}

	/// Reconcile every alert of a batch against the batch status, in order.
	///
	/// A failing alert doesn't stop the ones after it.
	pub async fn reconcile_batch(&self, data: &alert::Data) -> Vec<Outcome> {
		let mut outcomes = Vec::with_capacity(data.alerts.len());

		for alert in data.alerts.iter() {
			tracing::debug!(
				"alert: status={}, labels={:?}, annotations={:?}",
				alert.status,
				alert.labels,
				alert.annotations
			);

			outcomes.push(self.reconcile(data.status, alert.name(), alert.summary()).await);
		}

		outcomes
	}

	/// Reconcile a single alert.
	///
	/// # Arguments
	///
	/// * `status` - overall status of the batch the alert arrived in
	///
	/// * `name` - dedup key, empty names are used as is
	///
	/// * `summary` - message of the incident if one gets opened
	pub async fn reconcile(&self, status: AlertStatus, name: &str, summary: &str) -> Outcome {
		let outcome = match (self.registry.lookup(name).await, status) {
			(Some(id), AlertStatus::Resolved) => self.resolve(name, id).await,
			(Some(id), AlertStatus::Firing) => {
				tracing::info!("alert \"{name}\" already reported as incident {id}");
				Outcome::Duplicate(id)
			}
			(None, AlertStatus::Firing) => self.open(name, summary).await,
			(None, AlertStatus::Resolved) => match self.resolved_without_incident {
				ResolvedWithoutIncident::Ignore => {
					tracing::info!("alert \"{name}\" resolved without an open incident, ignoring");
					Outcome::Ignored
				}
				ResolvedWithoutIncident::Open => self.open(name, summary).await,
			},
		};

		self.metrics.transitions.with_label_values(&[outcome.label()]).inc();
		self.metrics.open_incidents.set(self.registry.len().await as i64);

		outcome
	}

	async fn open(&self, name: &str, summary: &str) -> Outcome {
		let incident = NewIncident::investigating(name, summary);

		match self.status_page.create_incident(&incident).await {
			Ok(created) => {
				tracing::info!("incident reported: {name}");
				tracing::debug!(
					"incident {:?} created with id {} as {:?}",
					created.name,
					created.id,
					created.status
				);

				if let Some(previous) = self.registry.insert(name.to_owned(), created.id).await {
					tracing::warn!(
						"alert \"{name}\" was opened concurrently, incident {previous} is no longer tracked"
					);
				}

				Outcome::Opened(created.id)
			}
			Err(err) => {
				// not registered, the next firing notification tries again
				tracing::error!("failed to report incident for alert \"{name}\": {err}");
				Outcome::CreateFailed
			}
		}
	}

	async fn resolve(&self, name: &str, id: IncidentId) -> Outcome {
		tracing::info!("resolving alert \"{name}\"");

		let update = NewIncidentUpdate::fixed(self.resolution_message.as_str());

		match self.status_page.update_incident(id, &update).await {
			Ok(update) => {
				tracing::debug!(
					"posted update {:?} to incident {} as {:?}",
					update.id,
					update.incident_id,
					update.status
				);
				self.registry.remove(name).await;
				Outcome::Resolved(id)
			}
			Err(err) => {
				// still open on the status page, keep it so a later resolve can retry
				tracing::error!("failed to resolve incident {id} for alert \"{name}\": {err}");
				Outcome::UpdateFailed(id)
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::Ordering;

	use super::*;
	use crate::cachet::{
		fake::{Call, FakeStatusPage},
		IncidentStatus,
	};

	const RESOLUTION: &str = "resolved, sorry";

	fn reconciler_with(
		policy: ResolvedWithoutIncident,
	) -> (Arc<FakeStatusPage>, Arc<Reconciler>) {
		let status_page = Arc::new(FakeStatusPage::default());
		let reconciler = Reconciler::new(
			status_page.clone(),
			Arc::new(IncidentRegistry::new()),
			RESOLUTION.to_owned(),
			&ReconcilerSettings { resolved_without_incident: policy },
			&Registry::new(),
		)
		.unwrap();

		(status_page, Arc::new(reconciler))
	}

	fn reconciler() -> (Arc<FakeStatusPage>, Arc<Reconciler>) {
		reconciler_with(ResolvedWithoutIncident::Ignore)
	}

	#[tokio::test]
	async fn firing_opens_incident() {
		let (status_page, reconciler) = reconciler();

		let outcome = reconciler.reconcile(AlertStatus::Firing, "DiskFull", "disk at 95%").await;

		let Outcome::Opened(id) = outcome else { panic!("unexpected outcome {outcome:?}") };
		assert_eq!(
			status_page.calls(),
			vec![Call::Create(NewIncident::investigating("DiskFull", "disk at 95%"))]
		);
		assert_eq!(reconciler.registry().lookup("DiskFull").await, Some(id));
	}

	#[tokio::test]
	async fn repeated_firing_is_deduplicated() {
		let (status_page, reconciler) = reconciler();

		let first = reconciler.reconcile(AlertStatus::Firing, "DiskFull", "disk at 95%").await;
		let second = reconciler.reconcile(AlertStatus::Firing, "DiskFull", "disk at 97%").await;

		let Outcome::Opened(id) = first else { panic!("unexpected outcome {first:?}") };
		assert_eq!(second, Outcome::Duplicate(id));
		assert_eq!(status_page.creates().len(), 1);
		assert_eq!(reconciler.registry().len().await, 1);
	}

	#[tokio::test]
	async fn resolved_fixes_and_forgets_incident() {
		let (status_page, reconciler) = reconciler();

		let Outcome::Opened(id) =
			reconciler.reconcile(AlertStatus::Firing, "DiskFull", "disk at 95%").await
		else {
			panic!("incident not opened")
		};
		let outcome = reconciler.reconcile(AlertStatus::Resolved, "DiskFull", "").await;

		assert_eq!(outcome, Outcome::Resolved(id));
		assert_eq!(status_page.creates().len(), 1);
		assert_eq!(
			status_page.updates(),
			vec![(id, NewIncidentUpdate { message: RESOLUTION.to_owned(), status: IncidentStatus::Fixed })]
		);
		assert!(reconciler.registry().is_empty().await);
	}

	#[tokio::test]
	async fn incident_can_reopen_after_resolution() {
		let (status_page, reconciler) = reconciler();

		reconciler.reconcile(AlertStatus::Firing, "DiskFull", "").await;
		reconciler.reconcile(AlertStatus::Resolved, "DiskFull", "").await;
		let outcome = reconciler.reconcile(AlertStatus::Firing, "DiskFull", "").await;

		assert!(matches!(outcome, Outcome::Opened(_)));
		assert_eq!(status_page.creates().len(), 2);
	}

	#[tokio::test]
	async fn resolved_without_incident_is_ignored() {
		let (status_page, reconciler) = reconciler();

		let outcome = reconciler.reconcile(AlertStatus::Resolved, "DiskFull", "").await;

		assert_eq!(outcome, Outcome::Ignored);
		assert!(status_page.calls().is_empty());
		assert!(reconciler.registry().is_empty().await);
	}

	#[tokio::test]
	async fn resolved_without_incident_opens_with_legacy_policy() {
		let (status_page, reconciler) = reconciler_with(ResolvedWithoutIncident::Open);

		let outcome = reconciler.reconcile(AlertStatus::Resolved, "DiskFull", "gone").await;

		assert!(matches!(outcome, Outcome::Opened(_)));
		assert!(status_page.updates().is_empty());
		assert_eq!(status_page.creates(), vec![NewIncident::investigating("DiskFull", "gone")]);
	}

	#[tokio::test]
	async fn failed_create_is_not_registered() {
		let (status_page, reconciler) = reconciler();
		status_page.fail_create.store(true, Ordering::SeqCst);

		let outcome = reconciler.reconcile(AlertStatus::Firing, "DiskFull", "").await;

		assert_eq!(outcome, Outcome::CreateFailed);
		assert!(reconciler.registry().is_empty().await);

		// the next notification retries
		status_page.fail_create.store(false, Ordering::SeqCst);
		let outcome = reconciler.reconcile(AlertStatus::Firing, "DiskFull", "").await;

		assert!(matches!(outcome, Outcome::Opened(_)));
		assert_eq!(status_page.creates().len(), 2);
	}

	#[tokio::test]
	async fn failed_update_keeps_incident_open() {
		let (status_page, reconciler) = reconciler();

		let Outcome::Opened(id) = reconciler.reconcile(AlertStatus::Firing, "DiskFull", "").await
		else {
			panic!("incident not opened")
		};
		status_page.fail_update.store(true, Ordering::SeqCst);

		let outcome = reconciler.reconcile(AlertStatus::Resolved, "DiskFull", "").await;

		assert_eq!(outcome, Outcome::UpdateFailed(id));
		assert_eq!(reconciler.registry().lookup("DiskFull").await, Some(id));
	}

	#[tokio::test]
	async fn batch_continues_after_failure() {
		let (status_page, reconciler) = reconciler();
		reconciler.registry().insert("Known".into(), IncidentId(99)).await;
		status_page.fail_update.store(true, Ordering::SeqCst);

		let data = alert::Data::from_slice(
			br#"{"status":"resolved","alerts":[
				{"status":"resolved","labels":{"alertname":"Known"}},
				{"status":"resolved","labels":{"alertname":"Unknown"}}
			]}"#,
		)
		.unwrap();
		let outcomes = reconciler.reconcile_batch(&data).await;

		assert_eq!(outcomes, vec![Outcome::UpdateFailed(IncidentId(99)), Outcome::Ignored]);
	}

	#[tokio::test]
	async fn batch_status_overrides_alert_status() {
		let (status_page, reconciler) = reconciler();

		let data = alert::Data::from_slice(
			br#"{"status":"firing","alerts":[
				{"status":"resolved","labels":{"alertname":"A"}},
				{"status":"firing","labels":{"alertname":"B"}}
			]}"#,
		)
		.unwrap();
		let outcomes = reconciler.reconcile_batch(&data).await;

		assert!(outcomes.iter().all(|outcome| matches!(outcome, Outcome::Opened(_))));
		let names: Vec<_> = status_page.creates().into_iter().map(|incident| incident.name).collect();
		assert_eq!(names, vec!["A", "B"]);
	}

	#[tokio::test]
	async fn empty_name_is_tracked_literally() {
		let (status_page, reconciler) = reconciler();

		reconciler.reconcile(AlertStatus::Firing, "", "no name").await;
		let outcome = reconciler.reconcile(AlertStatus::Firing, "", "no name").await;

		assert!(matches!(outcome, Outcome::Duplicate(_)));
		assert_eq!(status_page.creates().len(), 1);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_distinct_alerts_are_all_registered() {
		let (status_page, reconciler) = reconciler();

		let tasks: Vec<_> = (0..64)
			.map(|i| {
				let reconciler = Arc::clone(&reconciler);
				tokio::spawn(async move {
					reconciler.reconcile(AlertStatus::Firing, &format!("alert-{i}"), "").await
				})
			})
			.collect();

		for outcome in futures::future::join_all(tasks).await {
			assert!(matches!(outcome.unwrap(), Outcome::Opened(_)));
		}

		let snapshot = reconciler.registry().snapshot().await;
		assert_eq!(snapshot.len(), 64);

		let mut ids: Vec<_> = snapshot.values().copied().collect();
		ids.sort();
		ids.dedup();
		assert_eq!(ids.len(), 64);
		assert_eq!(status_page.creates().len(), 64);
	}

	#[tokio::test]
	async fn meters_follow_incident_lifecycle() {
		let (_, reconciler) = reconciler();
		let transitions = |outcome: &str| reconciler.metrics.transitions.with_label_values(&[outcome]).get();

		reconciler.reconcile(AlertStatus::Firing, "DiskFull", "").await;
		assert_eq!(reconciler.metrics.open_incidents.get(), 1);
		assert_eq!(transitions("opened"), 1);

		reconciler.reconcile(AlertStatus::Firing, "DiskFull", "").await;
		assert_eq!(reconciler.metrics.open_incidents.get(), 1);
		assert_eq!(transitions("duplicate"), 1);

		reconciler.reconcile(AlertStatus::Resolved, "DiskFull", "").await;
		assert_eq!(reconciler.metrics.open_incidents.get(), 0);
		assert_eq!(transitions("resolved"), 1);

		reconciler.reconcile(AlertStatus::Resolved, "DiskFull", "").await;
		assert_eq!(transitions("ignored"), 1);
	}

	#[tokio::test]
	async fn failures_are_counted() {
		let (status_page, reconciler) = reconciler();
		let transitions = |outcome: &str| reconciler.metrics.transitions.with_label_values(&[outcome]).get();

		status_page.fail_create.store(true, Ordering::SeqCst);
		reconciler.reconcile(AlertStatus::Firing, "DiskFull", "").await;
		assert_eq!(transitions("create_failed"), 1);
		assert_eq!(reconciler.metrics.open_incidents.get(), 0);

		status_page.fail_create.store(false, Ordering::SeqCst);
		status_page.fail_update.store(true, Ordering::SeqCst);
		reconciler.reconcile(AlertStatus::Firing, "DiskFull", "").await;
		reconciler.reconcile(AlertStatus::Resolved, "DiskFull", "").await;
		assert_eq!(transitions("update_failed"), 1);
		assert_eq!(reconciler.metrics.open_incidents.get(), 1);
	}

	#[tokio::test]
	async fn sparse_cachet_reply_is_tracked() {
		use std::time::Duration;

		use wiremock::{
			matchers::{method, path},
			Mock, MockServer, ResponseTemplate,
		};

		use crate::cachet::{CachetSettings, Client};

		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/v1/incidents"))
			.respond_with(
				ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {"id": 42}})),
			)
			.expect(1)
			.mount(&server)
			.await;

		let metrics = Registry::new();
		let settings = CachetSettings {
			url: server.uri().parse().unwrap(),
			key: String::from("token"),
			timeout: Duration::from_secs(2),
			resolution_message: RESOLUTION.to_owned(),
		};
		let reconciler = Reconciler::new(
			Arc::new(Client::new(&settings, &metrics).unwrap()),
			Arc::new(IncidentRegistry::new()),
			RESOLUTION.to_owned(),
			&ReconcilerSettings::default(),
			&metrics,
		)
		.unwrap();

		let first = reconciler.reconcile(AlertStatus::Firing, "DiskFull", "disk at 95%").await;
		let second = reconciler.reconcile(AlertStatus::Firing, "DiskFull", "disk at 95%").await;

		assert_eq!(first, Outcome::Opened(IncidentId(42)));
		assert_eq!(second, Outcome::Duplicate(IncidentId(42)));
		assert_eq!(reconciler.registry().lookup("DiskFull").await, Some(IncidentId(42)));
	}
}
