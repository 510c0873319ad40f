use std::sync::{Arc, Mutex, PoisonError};

use cloudsec_tutor_model::SessionConfig;

use crate::proto::{self, Content, GenerateContentRequest};

/// Client-side state of one Gemini chat.
///
/// The service itself is stateless, so the session keeps the history and
/// replays it with every message.
#[derive(Clone, Debug)]
pub(crate) struct GeminiSession {
    inner: Arc<SessionState>,
}

#[derive(Debug)]
struct SessionState {
    config: SessionConfig,
    history: Mutex<Vec<Content>>,
}

impl GeminiSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(SessionState {
                config,
                history: Mutex::new(Vec::new()),
            }),
        }
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.inner.config.model
    }

    pub fn create_request(&self, text: &str) -> GenerateContentRequest {
        let history = self.history();
        proto::create_request(
            &history,
            &self.inner.config.system_instruction,
            text,
        )
    }

    /// Records a completed exchange.
    pub fn commit(&self, prompt: Content, reply: &str) {
        let mut history = self
            .inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        history.push(prompt);
        history.push(Content::model(reply));
    }

    pub fn history(&self) -> Vec<Content> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
