use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What happened to the entity a live update describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveUpdateAction {
    /// The entity was created.
    Created,
    /// The entity changed.
    Updated,
    /// The entity was removed.
    Deleted,
}

/// Server-pushed notice that a backend record changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveUpdate {
    /// Kind of record, e.g. `"listing"`.
    pub entity: String,
    /// Record identifier.
    pub id: String,
    /// What happened.
    pub action: LiveUpdateAction,
    /// Optional new state of the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn live_update_deserialization() {
        let update: LiveUpdate = serde_json::from_value(json!({
            "entity": "listing",
            "id": "42",
            "action": "updated",
            "data": {"price": 12000}
        }))
        .unwrap();
        assert_eq!(update.action, LiveUpdateAction::Updated);
        assert_eq!(update.data, Some(json!({"price": 12000})));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let result = serde_json::from_value::<LiveUpdate>(json!({
            "entity": "listing",
            "id": "42",
            "action": "archived"
        }));
        assert!(result.is_err());
    }
}
