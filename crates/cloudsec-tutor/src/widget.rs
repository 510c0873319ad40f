use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cloudsec_tutor_core::pump::{PumpEvent, PumpSnapshot};
use cloudsec_tutor_core::{
    ChatClient, MessagePump, MessagePumpBuilder, SessionManager,
    TutorConfigBuilder,
};
use cloudsec_tutor_gemini_model::{GeminiConfigBuilder, GeminiProvider};
use cloudsec_tutor_model::{ChatProvider, SessionConfig};

/// The model used unless `TUTOR_MODEL` says otherwise.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// The persona the tutor answers in.
pub const SYSTEM_INSTRUCTION: &str = "You are an expert AWS Security Architect and Educator. \
Your goal is to help users understand complex AWS security concepts, from IAM policies to automated incident response. \
Be concise, technical, and practical. \
Use analogies where helpful (e.g., comparing Security Groups to firewalls at a door). \
If asked about code, provide secure examples in Terraform, Python (Boto3), or JSON (IAM Policies).";

/// The assistant message a fresh transcript starts with.
pub const GREETING: &str = "Hello! I am your AWS Security Architect assistant. Ask me anything about IAM, encryption, or security automation.";

/// Title of the chat panel.
pub const TITLE: &str = "AWS Security Tutor";

/// Label of the button that opens the chat panel.
pub const LAUNCHER_LABEL: &str = "Ask Expert";

/// Placeholder of the input box.
pub const INPUT_PLACEHOLDER: &str = "Ask about IAM, KMS, or WAF...";

type EventFn = Box<dyn Fn(PumpEvent) + Send + Sync>;

/// A tutor widget builder.
///
/// See [`TutorWidget`].
pub struct TutorWidgetBuilder {
    client: ChatClient,
    credential: Option<String>,
    model: String,
    system_instruction: String,
    greeting: Option<String>,
    on_event: Option<EventFn>,
}

impl TutorWidgetBuilder {
    /// Creates a builder that talks to the service through `provider`.
    ///
    /// No credential is set, so the widget stays hidden until
    /// [`with_credential`] is called.
    ///
    /// [`with_credential`]: TutorWidgetBuilder::with_credential
    pub fn with_chat_provider<P: ChatProvider + 'static>(provider: P) -> Self {
        Self {
            client: ChatClient::new(provider),
            credential: None,
            model: DEFAULT_MODEL.to_owned(),
            system_instruction: SYSTEM_INSTRUCTION.to_owned(),
            greeting: Some(GREETING.to_owned()),
            on_event: None,
        }
    }

    /// Creates a builder backed by Gemini, configured from the environment.
    ///
    /// The credential is read from `API_KEY`, falling back to
    /// `GEMINI_API_KEY`. `TUTOR_MODEL` and `GEMINI_BASE_URL` override the
    /// model and the endpoint.
    #[inline]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_key = ["API_KEY", "GEMINI_API_KEY"]
            .into_iter()
            .filter_map(&lookup)
            .find(|key| !key.trim().is_empty())
            .unwrap_or_default();

        let mut gemini_config = GeminiConfigBuilder::with_api_key(&api_key);
        if let Some(base_url) = lookup("GEMINI_BASE_URL") {
            gemini_config = gemini_config.with_base_url(base_url);
        }
        let mut builder = Self::with_chat_provider(GeminiProvider::new(
            gemini_config.build(),
        ))
        .with_credential(api_key);
        if let Some(model) = lookup("TUTOR_MODEL") {
            builder = builder.with_model(model);
        }
        builder
    }

    /// Sets the credential that gates the widget.
    #[inline]
    pub fn with_credential<S: Into<String>>(mut self, credential: S) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Sets the model to chat with.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }

    /// Replaces the persona.
    #[inline]
    pub fn with_system_instruction<S: Into<String>>(
        mut self,
        system_instruction: S,
    ) -> Self {
        self.system_instruction = system_instruction.into();
        self
    }

    /// Replaces the greeting. An empty greeting leaves the transcript empty.
    #[inline]
    pub fn with_greeting<S: Into<String>>(mut self, greeting: S) -> Self {
        let greeting = greeting.into();
        self.greeting = (!greeting.is_empty()).then_some(greeting);
        self
    }

    /// Attaches a callback to be invoked on every change the view should
    /// render.
    #[inline]
    pub fn on_event(
        mut self,
        on_event: impl Fn(PumpEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_event = Some(Box::new(on_event));
        self
    }

    /// Builds a new widget.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn build(self) -> TutorWidget {
        let mut config = TutorConfigBuilder::with_session(SessionConfig::new(
            self.model,
            self.system_instruction,
        ));
        if let Some(credential) = self.credential {
            config = config.with_credential(credential);
        }
        let sessions =
            Arc::new(SessionManager::new(self.client, config.build()));

        let mut pump_builder =
            MessagePumpBuilder::with_session_manager(Arc::clone(&sessions));
        if let Some(greeting) = self.greeting {
            pump_builder = pump_builder.with_greeting(greeting);
        }
        if let Some(on_event) = self.on_event {
            pump_builder = pump_builder.on_event(on_event);
        }

        TutorWidget {
            sessions,
            pump: pump_builder.build(),
            open: AtomicBool::new(false),
        }
    }
}

/// A floating chat panel with a launcher button, a transcript and an input
/// box.
///
/// The widget is hidden entirely when no credential is configured. The
/// session with the service is created the first time the panel is opened.
pub struct TutorWidget {
    sessions: Arc<SessionManager>,
    pump: MessagePump,
    open: AtomicBool,
}

impl TutorWidget {
    /// Returns whether the launcher button should be shown.
    #[inline]
    pub fn is_launcher_visible(&self) -> bool {
        self.sessions.is_enabled()
    }

    /// Returns whether the chat panel is shown.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Opens the chat panel and makes sure a session exists.
    ///
    /// Returns `false` without doing anything if the launcher is hidden.
    /// The panel opens even if the session can't be created; input is
    /// ignored until a later open succeeds.
    pub async fn open(&self) -> bool {
        if !self.is_launcher_visible() {
            debug!("launcher is hidden, ignoring open");
            return false;
        }
        self.open.store(true, Ordering::Release);
        if self.sessions.ensure_session().await.is_none() {
            warn!("panel opened without a session");
        }
        true
    }

    /// Hides the chat panel. A reply that is streaming keeps streaming.
    #[inline]
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Submits the text in the input box.
    #[inline]
    pub fn submit<S: Into<String>>(&self, text: S) {
        self.pump.submit(text);
    }

    /// Returns the current stage and a copy of the transcript.
    #[inline]
    pub async fn snapshot(&self) -> Option<PumpSnapshot> {
        self.pump.snapshot().await
    }
}

impl Drop for TutorWidget {
    fn drop(&mut self) {
        self.pump.shutdown();
    }
}
