//! Account creation, authentication and profile updates.

use chrono::Utc;
use tracing::info;

use tandem_shared::api::{LogInRequest, SignUpRequest, UpdateProfileRequest};
use tandem_shared::models::UserProfile;
use tandem_shared::types::UserId;
use tandem_store::{ProfileUpdate, StoreError, UserRecord};

use crate::auth::{self, TokenKeys};
use crate::db::SharedDb;
use crate::error::{ServiceError, ServiceResult};

#[derive(Clone)]
pub struct AccountService {
    db: SharedDb,
    keys: TokenKeys,
}

impl AccountService {
    pub fn new(db: SharedDb, keys: TokenKeys) -> Self {
        Self { db, keys }
    }

    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    /// Create an account and return it with a fresh bearer token.
    pub async fn sign_up(&self, req: SignUpRequest) -> ServiceResult<(UserProfile, String)> {
        let full_name = required(&req.full_name, "fullName")?;
        let email = normalize_email(required(&req.email, "email")?);
        let bio = required(&req.bio, "bio")?;
        if req.password.is_empty() {
            return Err(ServiceError::MissingField("password"));
        }

        if self.db.lock().await.find_user_by_email(&email)?.is_some() {
            return Err(ServiceError::AccountExists);
        }

        let password = req.password;
        let password_hash = tokio::task::spawn_blocking(move || auth::hash_password(&password))
            .await
            .map_err(|e| ServiceError::Internal(format!("Hashing task failed: {e}")))??;

        let profile = UserProfile {
            id: UserId::new(),
            full_name: full_name.to_string(),
            email,
            bio: bio.to_string(),
            avatar: None,
            created_at: Utc::now(),
        };
        let record = UserRecord {
            profile: profile.clone(),
            password_hash,
        };

        // A concurrent sign-up with the same email loses here.
        self.db
            .lock()
            .await
            .insert_user(&record)
            .map_err(|e| match e {
                StoreError::Conflict(_) => ServiceError::AccountExists,
                other => other.into(),
            })?;

        info!(user = %profile.id, "Account created");
        let token = self.keys.issue(profile.id)?;
        Ok((profile, token))
    }

    pub async fn log_in(&self, req: LogInRequest) -> ServiceResult<(UserProfile, String)> {
        let email = normalize_email(required(&req.email, "email")?);
        if req.password.is_empty() {
            return Err(ServiceError::MissingField("password"));
        }

        let record = self
            .db
            .lock()
            .await
            .find_user_by_email(&email)?
            .ok_or(ServiceError::UnknownUser)?;

        let password = req.password;
        let hash = record.password_hash.clone();
        tokio::task::spawn_blocking(move || auth::verify_password(&password, &hash))
            .await
            .map_err(|e| ServiceError::Internal(format!("Verification task failed: {e}")))??;

        info!(user = %record.profile.id, "User logged in");
        let token = self.keys.issue(record.profile.id)?;
        Ok((record.profile, token))
    }

    /// Profile of an authenticated caller. A token for a deleted account
    /// is treated as unauthorized.
    pub async fn current_user(&self, user: UserId) -> ServiceResult<UserProfile> {
        match self.db.lock().await.get_profile(user) {
            Ok(profile) => Ok(profile),
            Err(StoreError::NotFound) => Err(ServiceError::Unauthorized),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update_profile(
        &self,
        user: UserId,
        req: UpdateProfileRequest,
    ) -> ServiceResult<UserProfile> {
        let full_name = match req.full_name {
            Some(name) => Some(required(&name, "fullName")?.to_string()),
            None => None,
        };
        let update = ProfileUpdate {
            full_name,
            bio: req.bio,
            avatar: req.avatar.filter(|a| !a.trim().is_empty()),
        };

        let profile = self
            .db
            .lock()
            .await
            .update_profile(user, &update)
            .map_err(|e| match e {
                StoreError::NotFound => ServiceError::Unauthorized,
                other => other.into(),
            })?;
        info!(user = %user, "Profile updated");
        Ok(profile)
    }
}

fn required<'a>(value: &'a str, field: &'static str) -> ServiceResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ServiceError::MissingField(field))
    } else {
        Ok(trimmed)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
