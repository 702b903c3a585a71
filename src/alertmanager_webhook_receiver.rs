use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use prometheus::{IntCounter, IntCounterVec, Registry};
use serde::Deserialize;

use crate::{
    alert,
    cachet::{StatusPage, PING_ACK},
    reconciler::Reconciler,
};

const LANDING_PAGE: &str = concat!(
    r#"<html>
	<head>
		<title>Prometheus Cachet</title>
		<style>
			body { color: #ffffff; background-color: #26282b; font-family: monospace; padding: 1% }
			a:-webkit-any-link { color: #ffffff; text-decoration: underline }
			a:hover { color: #ff5959 }
			.footer { position: fixed; bottom: 0; text-align: center }
		</style>
	</head>
	<body>
		<h2>Prometheus Cachet <small>Integration</small></h2>
		<p>Receives Prometheus Alertmanager webhooks and mirrors the alerts as incidents in Cachet.</p>
		<p class="footer">Source: "#,
    env!("CARGO_PKG_REPOSITORY"),
    r#"</p>
	</body>
</html>"#
);

#[derive(Debug, Deserialize, Clone)]
pub struct AlertReceiverSettings {
    pub bind_address: IpAddr,
    pub port: u16,
    /// answer malformed webhooks with 200 instead of 400
    #[serde(default)]
    pub legacy_status: bool,
}

impl AlertReceiverSettings {
    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

pub struct ReceiverState {
    reconciler: Arc<Reconciler>,
    status_page: Arc<dyn StatusPage>,
    legacy_status: bool,
    batches: IntCounterVec,
    alerts: IntCounter,
}

impl ReceiverState {
    pub fn new(
        reconciler: Arc<Reconciler>,
        status_page: Arc<dyn StatusPage>,
        settings: &AlertReceiverSettings,
        registry: &Registry,
    ) -> Result<Self> {
        use prometheus::{opts, register_int_counter_vec_with_registry, register_int_counter_with_registry};

        let batches = register_int_counter_vec_with_registry!(
            opts!("received_batches_total", "total number of received webhook requests")
                .namespace("prometheus_cachet")
                .subsystem("alertmanager_webhook"),
            &["result"],
            registry
        )?;

        let alerts = register_int_counter_with_registry!(
            opts!("received_alerts_total", "total number of deserialized alerts")
                .namespace("prometheus_cachet")
                .subsystem("alertmanager_webhook"),
            registry
        )?;

        Ok(Self {
            reconciler,
            status_page,
            legacy_status: settings.legacy_status,
            batches,
            alerts,
        })
    }
}

async fn landing() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

async fn health(State(state): State<Arc<ReceiverState>>) -> (StatusCode, &'static str) {
    match state.status_page.ping().await {
        Ok(ack) if ack == PING_ACK => (StatusCode::OK, "Healthy."),
        Ok(ack) => {
            tracing::error!("cachet api issue, unexpected response: {ack:?}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Unhealthy.")
        }
        Err(err) => {
            tracing::error!("cachet api issue: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Unhealthy.")
        }
    }
}

async fn prometheus_receiver(State(state): State<Arc<ReceiverState>>, body: Bytes) -> StatusCode {
    tracing::info!("receiving incoming alert");

    match alert::Data::from_slice(&body) {
        Ok(data) => {
            state.batches.with_label_values(&["ok"]).inc();
            state.alerts.inc_by(data.alerts.len() as u64);

            state.reconciler.reconcile_batch(&data).await;

            StatusCode::OK
        }
        Err(err) => {
            state.batches.with_label_values(&["malformed"]).inc();
            tracing::error!("{err}");
            tracing::debug!("body: {}", String::from_utf8_lossy(&body));

            if state.legacy_status {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

pub fn router(state: Arc<ReceiverState>) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/health", get(health))
        .route("/webhook", post(prometheus_receiver))
        .fallback(landing)
        .with_state(state)
}

pub async fn run_prometheus_receiver(settings: &AlertReceiverSettings, state: Arc<ReceiverState>) -> Result<()> {
    let addr = settings.to_socket_addr();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind webhook endpoint to {addr}"))?;

    tracing::info!("listening for requests on {addr}");

    axum::serve(listener, router(state))
        .await
        .context("prometheus endpoint crashed")?;

    Ok(())
}
