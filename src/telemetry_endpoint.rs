//! Here we expose prometheus metrics about the webhook receiver, reconciler and cachet client
use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryEndpointSettings {
    #[serde(default)]
    pub enabled: bool,
    pub bind_address: IpAddr,
    pub port: u16,
}

impl TelemetryEndpointSettings {
    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

async fn metrics_handler(State(registry): State<Registry>) -> Response {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    ([(CONTENT_TYPE, encoder.format_type().to_owned())], buffer).into_response()
}

pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry)
}

pub async fn run_telemetry_endpoint(settings: &TelemetryEndpointSettings, registry: Registry) -> Result<()> {
    let addr = settings.to_socket_addr();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind telemetry endpoint to {addr}"))?;

    tracing::info!("serving metrics on {addr}");

    axum::serve(listener, router(registry))
        .await
        .context("telemetry endpoint crashed")?;

    Ok(())
}
