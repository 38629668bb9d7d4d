use serde::{Deserialize, Serialize};

/// Fire-and-forget lifecycle events published to the event collaborator.
///
/// `Disable` fires before a river is deleted, `Enable` after a successful
/// lifetime extension, `Save` on creation and settings updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RiverEvent {
    #[serde(rename = "river.save")]
    Save { river_id: i64, name: String },
    #[serde(rename = "river.disable")]
    Disable { river_id: i64, name: String },
    #[serde(rename = "river.enable")]
    Enable { river_id: i64, name: String },
}

impl RiverEvent {
    pub fn river_id(&self) -> i64 {
        match self {
            RiverEvent::Save { river_id, .. }
            | RiverEvent::Disable { river_id, .. }
            | RiverEvent::Enable { river_id, .. } => *river_id,
        }
    }
}
