use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::models::domain::Profile;

/// Frame pushed to a participant over the signaling socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Paired; carries the partner's profile
    Matched { profile: Profile },

    PartnerDisconnected,

    NegotiationOffer {
        payload: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        profile: Option<Profile>,
    },

    NegotiationAnswer { payload: Value },

    NetworkCandidate { payload: Value },

    ChatMessage { text: String },
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Live broker statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub connections: usize,
    pub idle: usize,
    pub waiting: usize,
    pub paired: usize,
    pub oldest_connection_secs: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
