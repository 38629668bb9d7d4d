use serde::{Deserialize, Serialize};

use crate::models::RiverLayout;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRiverRequest {
    pub name: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRiverRequest {
    pub name: Option<String>,
    pub public: Option<bool>,
    pub default_layout: Option<String>,
}

/// River as presented to a visiting viewer, with that viewer's
/// subscription and collaboration status resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiverSummary {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub account_id: i64,
    pub user_id: i64,
    pub account_path: String,
    pub subscriber_count: u64,
    pub is_owner: bool,
    pub collaborator: bool,
    /// A collaborator is also counted as subscribed.
    pub subscribed: bool,
    pub public: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub account_path: String,
}

/// Collaborator entry with user details, as listed to river owners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorInfo {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub account_path: String,
    pub collaborator_active: bool,
    pub read_only: bool,
}

/// Channel filter joined with its registry descriptor and options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelView {
    pub id: i64,
    pub channel: String,
    pub name: String,
    pub enabled: bool,
    pub options: Vec<ChannelOptionView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelOptionView {
    pub id: i64,
    pub key: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddChannelOptionRequest {
    pub key: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendResponse {
    pub date_expiry: String,
    pub extension_count: u32,
    pub days_to_expiry: i64,
}
