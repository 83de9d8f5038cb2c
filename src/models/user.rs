use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// End-user identity record.
///
/// Created on registration, mutated by profile updates, never deleted
/// silently. `email` is unique across the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email_verified: bool,
    /// Optional profile picture URL, surfaced by the `profile` scope.
    pub picture: Option<String>,
    pub preferred_username: Option<String>,
    pub phone_number: Option<String>,
    pub phone_number_verified: bool,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, name: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            name,
            password_hash,
            email_verified: false,
            picture: None,
            preferred_username: None,
            phone_number: None,
            phone_number_verified: false,
            address: None,
            created_at: now,
            updated_at: now,
        }
    }
}
