use std::fmt::{self, Debug, Formatter};

use cloudsec_tutor_model::SessionConfig;

/// Builder for [`TutorConfig`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TutorConfigBuilder {
    session: SessionConfig,
    credential: Option<String>,
}

impl TutorConfigBuilder {
    /// Creates a builder with the configuration every session is opened
    /// with.
    #[inline]
    pub fn with_session(session: SessionConfig) -> Self {
        Self {
            session,
            credential: None,
        }
    }

    /// Sets the credential for the chat service.
    ///
    /// Without a credential the tutor is disabled. Blank values count as
    /// missing.
    #[inline]
    pub fn with_credential<S: Into<String>>(mut self, credential: S) -> Self {
        let credential = credential.into();
        self.credential = if credential.trim().is_empty() {
            None
        } else {
            Some(credential)
        };
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> TutorConfig {
        TutorConfig {
            session: self.session,
            credential: self.credential,
        }
    }
}

impl Debug for TutorConfigBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TutorConfigBuilder")
            .field("session", &self.session)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Process-wide tutor configuration, read once at startup and injected
/// into the [`SessionManager`](crate::SessionManager).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TutorConfig {
    session: SessionConfig,
    credential: Option<String>,
}

impl TutorConfig {
    /// Returns whether the tutor feature is enabled at all.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.credential.is_some()
    }

    /// Returns the configuration sessions are created with.
    #[inline]
    pub fn session(&self) -> &SessionConfig {
        &self.session
    }
}

impl Debug for TutorConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TutorConfig")
            .field("session", &self.session)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionConfig {
        SessionConfig::new("gemini-2.5-flash", "You are a tutor.")
    }

    #[test]
    fn test_enabled_by_credential() {
        let config = TutorConfigBuilder::with_session(session()).build();
        assert!(!config.is_enabled());

        let config = TutorConfigBuilder::with_session(session())
            .with_credential("   ")
            .build();
        assert!(!config.is_enabled());

        let config = TutorConfigBuilder::with_session(session())
            .with_credential("AIza-test")
            .build();
        assert!(config.is_enabled());
        assert_eq!(config.session().model, "gemini-2.5-flash");
    }

    #[test]
    fn test_debug_redacts_credential() {
        let config = TutorConfigBuilder::with_session(session())
            .with_credential("AIza-test")
            .build();
        let printed = format!("{config:?}");
        assert!(!printed.contains("AIza-test"));
        assert!(printed.contains("<redacted>"));
    }
}
