use cloudsec_tutor_model::SessionHandle;
use tokio::sync::OnceCell;

use crate::chat_client::ChatClient;
use crate::config::TutorConfig;

/// Owns the one conversation session of a tutor widget.
///
/// The session is created lazily by [`ensure_session`], the first time the
/// widget is activated, and reused until the manager is dropped.
///
/// [`ensure_session`]: SessionManager::ensure_session
pub struct SessionManager {
    client: ChatClient,
    config: TutorConfig,
    session: OnceCell<SessionHandle>,
}

impl SessionManager {
    /// Creates a manager that opens sessions through `client`.
    #[inline]
    pub fn new(client: ChatClient, config: TutorConfig) -> Self {
        Self {
            client,
            config,
            session: OnceCell::new(),
        }
    }

    /// Returns whether the tutor is enabled by configuration.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Returns the session, creating it first if needed.
    ///
    /// Returns `None` when the tutor is disabled, in which case the service
    /// is never contacted, or when the service fails to create a session.
    /// A failed creation is not remembered, so a later call tries again.
    /// Concurrent callers share a single creation request.
    pub async fn ensure_session(&self) -> Option<SessionHandle> {
        if !self.is_enabled() {
            debug!("no credential configured, tutor is unavailable");
            return None;
        }

        let result = self
            .session
            .get_or_try_init(|| async {
                debug!("creating session with model {}", self.config.session().model);
                self.client.create_session(self.config.session()).await
            })
            .await;
        match result {
            Ok(session) => Some(session.clone()),
            Err(err) => {
                warn!("session unavailable: {err}");
                None
            }
        }
    }

    /// Returns the session if it has been created.
    #[inline]
    pub fn current(&self) -> Option<SessionHandle> {
        self.session.get().cloned()
    }

    #[inline]
    pub(crate) fn client(&self) -> &ChatClient {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use cloudsec_tutor_model::SessionConfig;
    use cloudsec_tutor_test_model::TestChatProvider;

    use super::*;
    use crate::config::TutorConfigBuilder;

    fn manager(provider: &TestChatProvider, credential: &str) -> SessionManager {
        let config = TutorConfigBuilder::with_session(SessionConfig::new(
            "test-model",
            "You are an AWS security tutor.",
        ))
        .with_credential(credential)
        .build();
        SessionManager::new(ChatClient::new(provider.clone()), config)
    }

    #[tokio::test]
    async fn test_idempotent_session() {
        let provider = TestChatProvider::default();
        let manager = manager(&provider, "test-key");
        assert_eq!(manager.current(), None);

        let first = manager.ensure_session().await.unwrap();
        let second = manager.ensure_session().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(manager.current(), Some(first));
        assert_eq!(provider.session_creations(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_activation() {
        let provider = TestChatProvider::default();
        let manager = manager(&provider, "test-key");
        let (first, second) =
            tokio::join!(manager.ensure_session(), manager.ensure_session());
        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(provider.session_creations(), 1);
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let provider = TestChatProvider::default();
        let manager = manager(&provider, "");
        assert!(!manager.is_enabled());
        assert_eq!(manager.ensure_session().await, None);
        assert_eq!(manager.current(), None);
        assert_eq!(provider.session_creations(), 0);
    }

    #[tokio::test]
    async fn test_creation_failure_is_retried() {
        let mut provider = TestChatProvider::default();
        provider.fail_session_creation();
        let manager = manager(&provider, "test-key");
        assert_eq!(manager.ensure_session().await, None);
        assert_eq!(manager.ensure_session().await, None);
        assert_eq!(manager.current(), None);
        assert_eq!(provider.session_creations(), 2);
    }
}
