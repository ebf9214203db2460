use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tracker {
    pub id: String,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
}

/// A tracker together with its total number of recorded visits
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TrackerSummary {
    pub id: String,
    pub created_at: i64,
    pub visits: i64,
}

/// JSON body carrying only the shared secret (`POST /new-tracker`)
#[derive(Debug, Default, Deserialize)]
pub struct SecretBody {
    #[serde(rename = "api-secret")]
    pub api_secret: Option<String>,
}

/// JSON body for `POST /delete-tracker`
#[derive(Debug, Default, Deserialize)]
pub struct DeleteTrackerRequest {
    #[serde(flatten)]
    pub secret: SecretBody,
    #[serde(alias = "trackerId")]
    pub id: Option<String>,
}
