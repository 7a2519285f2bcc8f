use serde::{Deserialize, Serialize};

use crate::types::ListingReference;

/// Row count of one backend collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbStatusCollection {
    /// Collection name.
    pub name: String,
    /// Number of records.
    pub count: u64,
}

/// Health report of the assistant backend's data store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStatus {
    /// Whether the backend reached its database.
    pub connected: bool,
    /// Database name.
    #[serde(default)]
    pub database: String,
    /// Collections and their sizes.
    #[serde(default)]
    pub collections: Vec<DbStatusCollection>,
    /// A few listings, for a quick sanity check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_sample: Option<Vec<ListingReference>>,
    /// Why the status could not be determined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DbStatus {
    /// A status describing a failed probe.
    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            connected: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}
