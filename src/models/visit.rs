use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A visit event about to be recorded
#[derive(Debug, Clone)]
pub struct NewVisit {
    pub tracker_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

/// One stored visit as listed by the stats endpoints
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VisitRow {
    pub id: i64,
    pub tracker_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

/// Visit count for one (tracker, referer) pair
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefererCount {
    pub tracker_id: String,
    pub referer: Option<String>,
    pub count: i64,
}
