//! config options for the cachet client

use std::{fmt, time::Duration};

use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use url::Url;

fn default_resolution_message() -> String {
	String::from("This incident has been resolved, we apologise for any inconvenience caused.")
}

#[serde_as]
#[derive(Deserialize, Clone)]
pub struct CachetSettings {
	/// base url of the cachet instance
	pub url: Url,
	/// api token, sent as `X-Cachet-Token`
	pub key: String,
	/// upper bound for every request to cachet
	#[serde_as(as = "DurationSeconds<u64>")]
	pub timeout: Duration,
	/// message of the update that marks an incident as fixed
	#[serde(default = "default_resolution_message")]
	pub resolution_message: String,
}

impl fmt::Debug for CachetSettings {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CachetSettings")
			.field("url", &self.url.as_str())
			.field("key", &"<redacted>")
			.field("timeout", &self.timeout)
			.field("resolution_message", &self.resolution_message)
			.finish()
	}
}
