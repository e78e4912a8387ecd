//! Identity and session gate.
//!
//! The session is a pointer `{currentUserId}` in flat storage. It is only
//! trusted while the user it points at exists and is active: reading the
//! current user clears a stale pointer on the spot and announces the logout.
//! Passwords are compared in the clear; this is a demo store.

use crate::core::coordinator::PersistenceCoordinator;
use crate::core::dataset::{DatasetPatch, NewActivity};
use crate::core::events::{AuthChangeReason, Signal};
use crate::core::validation::{ProfileForm, RegistrationForm};
use crate::entities::{UserModel, UserRole, UserStatus};
use crate::errors::{AuthError, Error, Result};
use crate::storage::flat::{self, AUTH_KEY, KeyValueStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, info, instrument, warn};

/// Last millisecond used for a registered user id, shared process-wide.
static LAST_USER_MILLIS: AtomicI64 = AtomicI64::new(0);

/// `u-<millis>`, bumped past the last id issued here and past any id already
/// present in `existing`.
fn next_user_id(now: DateTime<Utc>, existing: &[UserModel]) -> String {
    let wanted = now.timestamp_millis();
    loop {
        let last = LAST_USER_MILLIS
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
                Some(wanted.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        let id = format!("u-{}", wanted.max(last + 1));
        if !existing.iter().any(|u| u.id == id) {
            return id;
        }
    }
}

/// Stored session pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthState {
    pub current_user_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionGate {
    coordinator: Arc<PersistenceCoordinator>,
    storage: Arc<dyn KeyValueStore>,
}

impl SessionGate {
    /// Uses the coordinator's flat storage for the session pointer.
    #[must_use]
    pub fn new(coordinator: Arc<PersistenceCoordinator>) -> Self {
        let storage = coordinator.flat_storage();
        Self {
            coordinator,
            storage,
        }
    }

    fn load_state(&self) -> Result<AuthState> {
        Ok(flat::load_json_or_reset(self.storage.as_ref(), AUTH_KEY)?.unwrap_or_default())
    }

    fn save_state(&self, state: &AuthState) -> Result<()> {
        flat::save_json(self.storage.as_ref(), AUTH_KEY, state)
    }

    fn end_session(&self, reason: AuthChangeReason) -> Result<()> {
        self.save_state(&AuthState::default())?;
        self.coordinator
            .events()
            .emit(Signal::AuthChanged { user: None, reason });
        Ok(())
    }

    /// The signed-in user, if the session still points at an active one.
    ///
    /// A session whose user vanished or was deactivated is cleared as a side
    /// effect and `None` is returned. Before the coordinator is initialised
    /// the answer is `None` and the stored pointer is kept.
    pub async fn current_user(&self) -> Result<Option<UserModel>> {
        if !self.coordinator.is_ready() {
            debug!("Data layer not loaded yet, session left untouched");
            return Ok(None);
        }
        let Some(user_id) = self.load_state()?.current_user_id else {
            return Ok(None);
        };

        match self.coordinator.user_by_id(&user_id).await {
            None => {
                warn!(%user_id, "Session user no longer exists, signing out");
                self.end_session(AuthChangeReason::UserMissing)?;
                Ok(None)
            }
            Some(user) if !user.is_active() => {
                warn!(%user_id, "Session user is inactive, signing out");
                self.end_session(AuthChangeReason::UserInactive)?;
                Ok(None)
            }
            Some(user) => Ok(Some(user)),
        }
    }

    /// Checks credentials in order: known email, active account, password.
    ///
    /// # Errors
    /// `AuthError::InvalidCredentials` for an unknown email or wrong password,
    /// `AuthError::AccountInactive` for a deactivated account.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<UserModel> {
        let user = self
            .coordinator
            .user_by_email(email)
            .await
            .ok_or(AuthError::InvalidCredentials)?;
        if !user.is_active() {
            return Err(AuthError::AccountInactive.into());
        }
        if user.password != password {
            return Err(AuthError::InvalidCredentials.into());
        }

        self.save_state(&AuthState {
            current_user_id: Some(user.id.clone()),
        })?;
        info!(user_id = %user.id, "Signed in");
        self.coordinator.events().emit(Signal::AuthChanged {
            user: Some(user.clone()),
            reason: AuthChangeReason::Login,
        });
        Ok(user)
    }

    pub fn logout(&self) -> Result<()> {
        self.end_session(AuthChangeReason::ManualLogout)
    }

    /// Creates an active `user` account. Does not sign it in.
    ///
    /// # Errors
    /// `Error::Validation` for missing fields, `AuthError::DuplicateEmail`
    /// when the email is taken (case-insensitive).
    #[instrument(skip_all, fields(email = %form.email))]
    pub async fn register(&self, form: &RegistrationForm) -> Result<UserModel> {
        if !self.coordinator.is_ready() {
            return Err(Error::NotInitialized);
        }
        let form = form.validated()?;

        let snapshot = self.coordinator.snapshot().await;
        if snapshot.user_by_email(&form.email).is_some() {
            return Err(AuthError::DuplicateEmail { email: form.email }.into());
        }

        let now = Utc::now();
        let user = UserModel {
            id: next_user_id(now, &snapshot.users),
            name: form.name,
            email: form.email,
            password: form.password,
            role: UserRole::User,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let mut users = snapshot.users.clone();
        users.push(user.clone());
        let activity = snapshot.activity_with(
            NewActivity {
                entity_type: "user",
                action: "register",
                entity_id: user.id.clone(),
                message: format!("New account {}", user.email),
            },
            now,
        );
        self.coordinator
            .save(DatasetPatch::users(users).with_activity(activity))
            .await?;

        info!(user_id = %user.id, "Account registered");
        Ok(user)
    }

    /// Updates name, email and optionally the password of the signed-in user.
    ///
    /// # Errors
    /// `AuthError::NotAuthenticated` without a live session, `Error::Validation`
    /// for bad input or an email used by another account.
    pub async fn update_profile(&self, form: &ProfileForm) -> Result<UserModel> {
        let current = self
            .current_user()
            .await?
            .ok_or(AuthError::NotAuthenticated)?;

        let mut errors = form.check();
        let snapshot = self.coordinator.snapshot().await;
        let taken = snapshot
            .users
            .iter()
            .any(|u| u.id != current.id && u.has_email(&form.email));
        if taken {
            errors.add("email", "This email is already used by another account.");
        }
        errors.into_result()?;

        let mut updated = current;
        updated.name = form.name.trim().to_string();
        updated.email = form.email.trim().to_string();
        if let Some(password) = form.new_password() {
            updated.password = password;
        }
        updated.updated_at = Utc::now();

        let users = snapshot.users.iter().map(|u| {
            if u.id == updated.id {
                updated.clone()
            } else {
                u.clone()
            }
        });
        self.coordinator.save(DatasetPatch::users(users)).await?;

        info!(user_id = %updated.id, "Profile updated");
        self.coordinator.events().emit(Signal::AuthChanged {
            user: Some(updated.clone()),
            reason: AuthChangeReason::ProfileUpdated,
        });
        Ok(updated)
    }
}
