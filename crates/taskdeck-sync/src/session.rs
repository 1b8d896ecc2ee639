use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use taskdeck_core::{AuthProvider, Identity};

/// Current session as seen by views. `loading` is true until the auth
/// provider has delivered its first state notification.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            identity: None,
            loading: true,
        }
    }
}

/// Process-scoped session observable.
///
/// Subscribes to the auth provider exactly once and republishes every
/// session change on a watch channel. Views subscribe here instead of
/// reaching for the provider directly. Dropping the provider's side of
/// the channel (provider disconnect) is surfaced as signed out.
pub struct SessionProvider {
    state_rx: watch::Receiver<SessionState>,
    cancel: CancellationToken,
}

impl SessionProvider {
    pub fn start(auth: Arc<dyn AuthProvider>) -> Self {
        // The single subscription for this provider's lifetime.
        let mut events = auth.subscribe_session();
        let (state_tx, state_rx) = watch::channel(SessionState::default());
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        tokio::spawn(async move {
            // First notification: the provider's current state.
            let current = events.borrow_and_update().clone();
            let _ = state_tx.send(SessionState {
                identity: current,
                loading: false,
            });

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("session provider torn down");
                        return;
                    }
                    changed = events.changed() => {
                        if changed.is_err() {
                            // Provider disconnect reads as signed out.
                            let _ = state_tx.send(SessionState {
                                identity: None,
                                loading: false,
                            });
                            return;
                        }
                        let identity = events.borrow_and_update().clone();
                        let _ = state_tx.send(SessionState {
                            identity,
                            loading: false,
                        });
                    }
                }
            }
        });

        Self { state_rx, cancel }
    }

    /// A receiver over session state. Cheap; every view gets its own.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Release the provider subscription.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SessionProvider {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use taskdeck_core::{AuthError, SessionEvents, UserId};

    /// Hand-driven auth provider for session tests.
    struct ScriptedAuth {
        tx: watch::Sender<Option<Identity>>,
    }

    impl ScriptedAuth {
        fn new(initial: Option<Identity>) -> Arc<Self> {
            let (tx, _) = watch::channel(initial);
            Arc::new(Self { tx })
        }

        fn set(&self, identity: Option<Identity>) {
            let _ = self.tx.send(identity);
        }
    }

    #[async_trait]
    impl AuthProvider for ScriptedAuth {
        fn subscribe_session(&self) -> SessionEvents {
            self.tx.subscribe()
        }

        async fn sign_in(&self, _: &str, _: SecretString) -> Result<Identity, AuthError> {
            unreachable!("not used in session tests")
        }

        async fn sign_out(&self) {
            self.set(None);
        }
    }

    fn identity(email: &str) -> Identity {
        Identity {
            user_id: UserId::new(),
            email: email.into(),
            email_verified: true,
        }
    }

    #[tokio::test]
    async fn loading_settles_after_first_notification() {
        let auth = ScriptedAuth::new(None);
        let provider = SessionProvider::start(auth);
        let mut rx = provider.subscribe();

        // Either we catch the initial loading state or the settled one;
        // after one change it must be settled and signed out.
        if rx.borrow().loading {
            rx.changed().await.unwrap();
        }
        let state = rx.borrow().clone();
        assert!(!state.loading);
        assert!(state.identity.is_none());
    }

    #[tokio::test]
    async fn publishes_sign_in_and_sign_out() {
        let handle = ScriptedAuth::new(None);
        let provider = SessionProvider::start(Arc::clone(&handle) as Arc<dyn AuthProvider>);
        let mut rx = provider.subscribe();

        while rx.borrow().loading {
            rx.changed().await.unwrap();
        }

        handle.set(Some(identity("ana@example.com")));
        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow().identity.as_ref().map(|i| i.email.as_str()),
            Some("ana@example.com")
        );

        handle.set(None);
        rx.changed().await.unwrap();
        assert!(rx.borrow().identity.is_none());
        assert!(!rx.borrow().loading);
    }

    #[tokio::test]
    async fn provider_disconnect_reads_as_signed_out() {
        let handle = ScriptedAuth::new(Some(identity("ana@example.com")));
        let provider = SessionProvider::start(Arc::clone(&handle) as Arc<dyn AuthProvider>);
        let mut rx = provider.subscribe();

        while rx.borrow().loading || rx.borrow().identity.is_none() {
            rx.changed().await.unwrap();
        }

        drop(handle); // last sender gone
        rx.changed().await.unwrap();
        let state = rx.borrow().clone();
        assert!(state.identity.is_none());
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn shutdown_stops_republishing() {
        let handle = ScriptedAuth::new(None);
        let provider = SessionProvider::start(Arc::clone(&handle) as Arc<dyn AuthProvider>);
        let mut rx = provider.subscribe();

        while rx.borrow().loading {
            rx.changed().await.unwrap();
        }

        provider.shutdown();
        tokio::task::yield_now().await;

        handle.set(Some(identity("late@example.com")));
        let outcome =
            tokio::time::timeout(std::time::Duration::from_millis(20), rx.changed()).await;
        // Either the channel is already closed or nothing arrives.
        assert!(outcome.is_err() || outcome.unwrap().is_err());
    }
}
