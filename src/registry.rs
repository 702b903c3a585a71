//! incidents this process opened on the status page and hasn't resolved yet
use hashbrown::HashMap;
use tokio::sync::RwLock;

use crate::cachet::IncidentId;

/// Maps alert names to the id of their open incident.
///
/// Lives for the lifetime of the process and is shared between all webhook
/// requests. The lock is only held for the map operation itself, never while
/// talking to the status page.
#[derive(Debug, Default)]
pub struct IncidentRegistry {
	open: RwLock<HashMap<String, IncidentId>>,
}

impl IncidentRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// id of the open incident for `name`
	pub async fn lookup(&self, name: &str) -> Option<IncidentId> {
		self.open.read().await.get(name).copied()
	}

	/// register an open incident, returns the id it replaced
	pub async fn insert(&self, name: String, id: IncidentId) -> Option<IncidentId> {
		self.open.write().await.insert(name, id)
	}

	/// forget the incident for `name`, no-op if there is none
	pub async fn remove(&self, name: &str) -> Option<IncidentId> {
		self.open.write().await.remove(name)
	}

	/// number of open incidents
	pub(crate) async fn len(&self) -> usize {
		self.open.read().await.len()
	}

	#[cfg(test)]
	pub(crate) async fn is_empty(&self) -> bool {
		self.open.read().await.is_empty()
	}

	/// copy of the current mapping
	#[cfg(test)]
	pub async fn snapshot(&self) -> HashMap<String, IncidentId> {
		self.open.read().await.clone()
	}
}
