//! http client for the cachet v1 api
use anyhow::{Context, Result};
use async_trait::async_trait;
use prometheus::Registry;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{de::DeserializeOwned, Deserialize};
use url::Url;

use super::{
	metrics::GatewayMetrics, CachetSettings, GatewayError, Incident, IncidentId, IncidentUpdate,
	NewIncident, NewIncidentUpdate, StatusPage,
};

/// header cachet reads the api token from
const TOKEN_HEADER: &str = "X-Cachet-Token";

/// every cachet response wraps its payload in `data`
#[derive(Deserialize)]
struct Envelope<T> {
	data: T,
}

#[derive(Debug, Clone)]
/// Cachet api client. Doesn't retry, failed requests are reported to the
/// caller and counted.
pub struct Client {
	/// http client, carries the token header and request timeout
	client: reqwest::Client,
	/// base url, always ending in a slash so endpoints can be joined onto it
	base: Url,
	/// prometheus meters for requests
	metrics: GatewayMetrics,
}

impl Client {
	/// construct client and register its meters on `registry`
	pub fn new(settings: &CachetSettings, registry: &Registry) -> Result<Self> {
		let mut token =
			HeaderValue::from_str(&settings.key).context("cachet api key is not a valid header value")?;
		token.set_sensitive(true);

		let mut headers = HeaderMap::new();
		headers.insert(TOKEN_HEADER, token);

		let client = reqwest::Client::builder()
			.timeout(settings.timeout)
			.default_headers(headers)
			.user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
			.build()
			.context("failed to build reqwest client")?;

		let mut base = settings.url.clone();
		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());
			base.set_path(&path);
		}

		Ok(Self {
			client,
			base,
			metrics: GatewayMetrics::new(registry).context("failed to register prometheus meters")?,
		})
	}

	fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
		Ok(self.base.join(path)?)
	}

	/// send request, unwrap the response envelope and record meters for `call`
	async fn send<T: DeserializeOwned>(
		&self,
		call: &'static str,
		request: reqwest::RequestBuilder,
	) -> Result<T, GatewayError> {
		let _timer = self.metrics.request_duration.with_label_values(&[call]).start_timer();
		self.metrics.requests.with_label_values(&[call]).inc();

		let result = Self::execute(request).await;

		if let Err(err) = &result {
			tracing::debug!("cachet {call} failed: {err}");
			self.metrics.requests_failed.with_label_values(&[call]).inc();
		}

		result
	}

	async fn execute<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, GatewayError> {
		let response = request.send().await?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(GatewayError::Status { status, body });
		}

		let Envelope { data } = response.json::<Envelope<T>>().await?;
		Ok(data)
	}
}

#[async_trait]
impl StatusPage for Client {
	async fn create_incident(&self, incident: &NewIncident) -> Result<Incident, GatewayError> {
		let url = self.endpoint("api/v1/incidents")?;
		self.send("create_incident", self.client.post(url).json(incident)).await
	}

	async fn update_incident(
		&self,
		id: IncidentId,
		update: &NewIncidentUpdate,
	) -> Result<IncidentUpdate, GatewayError> {
		let url = self.endpoint(&format!("api/v1/incidents/{id}/updates"))?;
		self.send("update_incident", self.client.post(url).json(update)).await
	}

	async fn ping(&self) -> Result<String, GatewayError> {
		let url = self.endpoint("api/v1/ping")?;
		self.send("ping", self.client.get(url)).await
	}
}
