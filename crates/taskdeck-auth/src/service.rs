use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use tokio::sync::watch;
use tracing::{info, warn};

use taskdeck_core::{AuthError, AuthProvider, Identity, SessionEvents, UserId};
use taskdeck_store::Database;

use crate::credentials;
use crate::users::UserRepo;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_LOCKOUT: Duration = Duration::from_secs(15 * 60);

/// Credential-backed auth provider with process-wide session state.
///
/// Session changes are published on a watch channel: every subscriber
/// sees the current state at subscribe time, then each sign-in and
/// sign-out. Repeated sign-in failures lock the account for the
/// lockout window.
pub struct AuthService {
    users: UserRepo,
    session_tx: watch::Sender<Option<Identity>>,
    max_attempts: u32,
    lockout: Duration,
}

impl AuthService {
    pub fn new(db: Database) -> Self {
        let (session_tx, _) = watch::channel(None);
        Self {
            users: UserRepo::new(db),
            session_tx,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout: DEFAULT_LOCKOUT,
        }
    }

    /// Override the throttling window (tests, stricter deployments).
    pub fn with_limits(mut self, max_attempts: u32, lockout: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.lockout = lockout;
        self
    }

    /// Create an account. The email starts unverified.
    pub fn register(&self, email: &str, password: &SecretString) -> Result<Identity, AuthError> {
        validate_email(email)?;
        let user = self
            .users
            .register(email, password)
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        info!(user_id = %user.id, "account registered");
        Ok(Identity {
            user_id: user.id,
            email: user.email,
            email_verified: false,
        })
    }

    /// Flag an account's email as verified.
    pub fn mark_verified(&self, user_id: &UserId) -> Result<(), AuthError> {
        self.users
            .mark_verified(user_id)
            .map_err(|e| AuthError::Provider(e.to_string()))
    }

    /// The identity currently signed in, if any.
    pub fn current_identity(&self) -> Option<Identity> {
        self.session_tx.borrow().clone()
    }
}

#[async_trait]
impl AuthProvider for AuthService {
    fn subscribe_session(&self) -> SessionEvents {
        self.session_tx.subscribe()
    }

    async fn sign_in(&self, email: &str, password: SecretString) -> Result<Identity, AuthError> {
        validate_email(email)?;

        let user = self
            .users
            .find_by_email(email)
            .map_err(|e| AuthError::Provider(e.to_string()))?
            .ok_or_else(|| AuthError::UnknownIdentity(email.trim().to_lowercase()))?;

        let now = Utc::now();
        if let Some(until) = user.locked_until {
            if until > now {
                let retry_after = (until - now).to_std().ok();
                warn!(user_id = %user.id, "sign-in throttled");
                return Err(AuthError::Throttled { retry_after });
            }
        }

        if !credentials::verify_password(&password, &user.password_salt, &user.password_hash) {
            let attempts = user.failed_attempts + 1;
            if attempts >= self.max_attempts {
                let until = now
                    + chrono::Duration::from_std(self.lockout)
                        .unwrap_or_else(|_| chrono::Duration::minutes(15));
                self.users
                    .record_failure(&user.id, Some(until))
                    .map_err(|e| AuthError::Provider(e.to_string()))?;
                warn!(user_id = %user.id, attempts, "account locked");
                return Err(AuthError::Throttled {
                    retry_after: Some(self.lockout),
                });
            }
            self.users
                .record_failure(&user.id, None)
                .map_err(|e| AuthError::Provider(e.to_string()))?;
            return Err(AuthError::InvalidCredential);
        }

        self.users
            .clear_failures(&user.id)
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let identity = Identity {
            user_id: user.id,
            email: user.email,
            email_verified: user.email_verified,
        };
        info!(user_id = %identity.user_id, verified = identity.email_verified, "signed in");
        // send_replace: the new session must stick even before the
        // first subscriber shows up.
        self.session_tx.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) {
        info!("signed out");
        self.session_tx.send_replace(None);
    }
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::InvalidEmail(email.to_string()));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(AuthError::InvalidEmail(email.to_string()));
    }
    Ok(())
}
