use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row of the `profiles` table, keyed by the auth identity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}
