//! prometheus alertmanager receiver that mirrors alerts as incidents on a cachet status page
//!
//! Features:
//! - opens an investigating incident the first time an alert fires
//! - repeated notifications for an open incident are ignored
//! - resolved alerts mark their incident as fixed
//! - `/health` checks that cachet is reachable

use std::sync::Arc;

use alertmanager_webhook_receiver::ReceiverState;
use anyhow::{Context, Result};
use cachet::StatusPage;
use reconciler::Reconciler;
use registry::IncidentRegistry;
use settings::Settings;

mod alert;
mod alertmanager_webhook_receiver;
mod cachet;
mod log;
mod reconciler;
mod registry;
mod settings;
mod telemetry_endpoint;

/// exit the complete program if one thread panics
fn setup_panic_handler() {
	let default_panic = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		default_panic(info);
		std::process::exit(1);
	}));
}

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
	setup_panic_handler();

	let settings = Settings::global()?;

	log::setup_logging(&settings.log).context("could not setup logging")?;

	let metrics = prometheus::Registry::new();

	let status_page: Arc<dyn StatusPage> = Arc::new(
		cachet::Client::new(&settings.cachet, &metrics)
			.context("failed to initialize cachet client")?,
	);

	let reconciler = Reconciler::new(
		Arc::clone(&status_page),
		Arc::new(IncidentRegistry::new()),
		settings.cachet.resolution_message.clone(),
		&settings.reconciler,
		&metrics,
	)
	.context("failed to construct reconciler")?;

	let state = ReceiverState::new(Arc::new(reconciler), status_page, &settings.listen, &metrics)
		.context("failed to construct webhook receiver")?;

	let receiver =
		alertmanager_webhook_receiver::run_prometheus_receiver(&settings.listen, Arc::new(state));

	if settings.telemetry_endpoint.enabled {
		let telemetry =
			telemetry_endpoint::run_telemetry_endpoint(&settings.telemetry_endpoint, metrics);

		futures::try_join!(receiver, telemetry)?;
	} else {
		receiver.await?;
	}

	Ok(())
}
