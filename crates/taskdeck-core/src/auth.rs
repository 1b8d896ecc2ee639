use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::errors::AuthError;
use crate::ids::UserId;

/// The authenticated user's reference. Scopes which tasks are visible
/// and owned.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub email: String,
    pub email_verified: bool,
}

/// Session-change notifications. The receiver's current value is the
/// present session state; a change fires for every sign-in/sign-out.
/// A dropped sender (provider disconnect) is read as signed out.
pub type SessionEvents = watch::Receiver<Option<Identity>>;

/// The auth provider boundary: session-change events plus credential
/// sign-in and sign-out commands.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Subscribe to session changes. Each call yields an independent
    /// receiver seeded with the current session state.
    fn subscribe_session(&self) -> SessionEvents;

    async fn sign_in(&self, email: &str, password: SecretString) -> Result<Identity, AuthError>;

    async fn sign_out(&self);
}
