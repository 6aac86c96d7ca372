use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TouristAccount {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("invalid contact identity: {0}")]
    InvalidIdentity(String),

    #[error("account lookup failed: {0}")]
    Lookup(String),
}

/// Resolves a tourist account by contact identity, creating one if none
/// exists. A failure here is a hard stop; no payment step may proceed
/// without an account reference.
#[async_trait]
pub trait AccountResolver: Send + Sync {
    async fn resolve_or_create(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        phone: Option<&str>,
    ) -> Result<Uuid, AccountError>;
}
