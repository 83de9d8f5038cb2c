//! End-user registration and credential verification.

use std::sync::Arc;

use crate::config::AppState;
use crate::error::AuthError;
use crate::models::User;
use crate::repositories::UserRepository;
use crate::utils::password::{hash_password, verify_password};

const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
}

impl AuthService {
    pub fn new(state: &AppState) -> Self {
        Self {
            users: state.repos.users.clone(),
        }
    }

    pub fn with_repository(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Create a new user with an Argon2id password hash. Email must be
    /// unique; the address stays unverified until confirmed.
    pub async fn register(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        if !email.contains('@') || email.len() < 3 {
            return Err(AuthError::InvalidEmailFormat);
        }
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword);
        }

        if self
            .users
            .find_by_email(email)
            .await
            .map_err(|e| AuthError::InternalError(anyhow::anyhow!(e.to_string())))?
            .is_some()
        {
            return Err(AuthError::EmailAlreadyExists);
        }

        let password_hash = hash_password(password)?;
        let user = User::new(email.to_string(), name.to_string(), password_hash);

        self.users
            .create(user)
            .await
            .map_err(|e| AuthError::InternalError(anyhow::anyhow!(e.to_string())))
    }

    /// Verify credentials. The error does not reveal whether the email or
    /// the password was wrong.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let user = self
            .users
            .find_by_email(email)
            .await
            .map_err(|e| AuthError::InternalError(anyhow::anyhow!(e.to_string())))?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }
}
