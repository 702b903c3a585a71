//! prometheus meters for the cachet client

use prometheus::{HistogramVec, IntCounterVec, Registry};

#[derive(Debug, Clone)]
/// meters for requests made to cachet, labeled by api call
pub(crate) struct GatewayMetrics {
	/// total number of requests
	pub(crate) requests: IntCounterVec,
	/// requests that failed in transport or with a non success status
	pub(crate) requests_failed: IntCounterVec,
	/// time spent per request
	pub(crate) request_duration: HistogramVec,
}

impl GatewayMetrics {
	/// construct and register prometheus meters
	pub(crate) fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
		use prometheus::{
			exponential_buckets, histogram_opts, opts, register_histogram_vec_with_registry,
			register_int_counter_vec_with_registry,
		};

		let requests = register_int_counter_vec_with_registry!(
			opts!("requests_total", "total number of requests made to cachet")
				.namespace("prometheus_cachet")
				.subsystem("gateway"),
			&["call"],
			registry
		)?;

		let requests_failed = register_int_counter_vec_with_registry!(
			opts!("requests_failed", "number of failed requests made to cachet")
				.namespace("prometheus_cachet")
				.subsystem("gateway"),
			&["call"],
			registry
		)?;

		let request_duration = register_histogram_vec_with_registry!(
			histogram_opts!(
				"request_duration_seconds",
				"total time of a cachet request in seconds",
				exponential_buckets(0.01, 2., 12)?
			)
			.namespace("prometheus_cachet")
			.subsystem("gateway"),
			&["call"],
			registry
		)?;

		Ok(Self { requests, requests_failed, request_duration })
	}
}
