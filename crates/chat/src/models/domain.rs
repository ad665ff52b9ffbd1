//! Domain ownership verification record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

/// A claimed domain and its verification token
///
/// `verified_at` stays `None` until the backend confirms ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainVerification {
    pub id: String,
    pub user_id: UserId,
    pub domain: String,
    pub verification_token: String,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DomainVerification {
    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }
}
