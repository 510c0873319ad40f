//! A chat provider for the Google Gemini API.
//!
//! Sessions are kept on the client side: each one remembers its model,
//! its system instruction and the finished exchanges, which are replayed
//! to `streamGenerateContent` with every new message.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;
mod session;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cloudsec_tutor_model::{
    ChatProvider, ChatProviderError, ErrorKind, SessionConfig, SessionHandle,
};
use mime::Mime;
use reqwest::{Client, RequestBuilder, StatusCode, header};

pub use config::{DEFAULT_BASE_URL, GeminiConfig, GeminiConfigBuilder};
use io::{Chunks, Sse};
use proto::{Content, ErrorDetail, ErrorResponse, GenerateContentRequest};
pub use response::GeminiResponse;
use session::GeminiSession;

/// Error type for [`GeminiProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    fn from_status(status: StatusCode, body: &str) -> Self {
        let message = match serde_json::from_str::<ErrorResponse>(body) {
            Ok(resp) => format!("{status}: {}", resp.error.describe()),
            Err(_) if body.trim().is_empty() => format!("{status}"),
            Err(_) => format!("{status}: {}", body.trim()),
        };
        Self::new(message, kind_of_status(status))
    }

    /// Converts an error object delivered inside the event stream.
    pub(crate) fn from_detail(detail: &ErrorDetail) -> Self {
        let status = detail.code.and_then(|code| StatusCode::from_u16(code).ok());
        match status {
            Some(status) => Self::new(
                format!("{status}: {}", detail.describe()),
                kind_of_status(status),
            ),
            None => Self::new(detail.describe(), ErrorKind::Other),
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

fn kind_of_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ErrorKind::Unauthenticated
        }
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimitExceeded,
        _ => ErrorKind::Other,
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ChatProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Gemini chat provider.
#[derive(Clone, Debug)]
pub struct GeminiProvider {
    client: Client,
    config: Arc<GeminiConfig>,
    next_session_id: Arc<AtomicU64>,
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider` with the given configuration.
    #[inline]
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
            next_session_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl ChatProvider for GeminiProvider {
    type Error = Error;
    type Response = GeminiResponse;

    fn create_session(
        &self,
        config: &SessionConfig,
    ) -> impl Future<Output = Result<SessionHandle, Self::Error>> + Send + 'static
    {
        let result = if self.config.api_key.trim().is_empty() {
            Err(Error::new("missing API key", ErrorKind::Unauthenticated))
        } else {
            let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
            debug!("created session {id} for model {}", config.model);
            Ok(SessionHandle::new(
                format!("gemini:{id}"),
                GeminiSession::new(config.clone()),
            ))
        };
        std::future::ready(result)
    }

    fn send_message_stream(
        &self,
        session: &SessionHandle,
        text: &str,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let session = session.to_raw::<GeminiSession>().cloned();
        let client = self.client.clone();
        let config = Arc::clone(&self.config);
        let text = text.to_owned();

        async move {
            let Some(session) = session else {
                return Err(Error::new(
                    "session was not created by this provider",
                    ErrorKind::Other,
                ));
            };

            let request = session.create_request(&text);
            let resp = build_request(&client, &config, session.model(), &request)
                .send()
                .await
                .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                let err = Error::from_status(status, &body);
                warn!("request rejected: {err}");
                return Err(err);
            }

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            check_event_stream(content_type)?;

            // Here we got a successful response.
            let sse = Sse::new(Chunks::from_response(resp));
            Ok(GeminiResponse::new(sse, session, Content::user(&text)))
        }
    }
}

fn build_request(
    client: &Client,
    config: &GeminiConfig,
    model: &str,
    request: &GenerateContentRequest,
) -> RequestBuilder {
    client
        .post(config.stream_url(model))
        .header("x-goog-api-key", &config.api_key)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, "text/event-stream")
        .json(request)
}

fn check_event_stream(content_type: Option<&str>) -> Result<(), Error> {
    let is_event_stream = content_type
        .and_then(|v| v.parse().ok())
        .map(|m: Mime| m.subtype().as_str() == "event-stream")
        .unwrap_or(false);
    if !is_event_stream {
        return Err(Error::new(
            format!("Unexpected content type: {content_type:?}"),
            ErrorKind::Other,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_status() {
        let err = Error::from_status(
            StatusCode::FORBIDDEN,
            r#"{"error":{"code":403,"message":"API key not valid.","status":"PERMISSION_DENIED"}}"#,
        );
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        assert_eq!(
            err.message(),
            "403 Forbidden: API key not valid. (PERMISSION_DENIED)"
        );

        let err = Error::from_status(StatusCode::TOO_MANY_REQUESTS, "");
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert_eq!(err.message(), "429 Too Many Requests");

        let err = Error::from_status(StatusCode::BAD_GATEWAY, "upstream down\n");
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(err.message(), "502 Bad Gateway: upstream down");
    }

    #[test]
    fn test_error_from_detail() {
        let detail = ErrorDetail {
            code: Some(503),
            message: "The model is overloaded.".to_owned(),
            status: Some("UNAVAILABLE".to_owned()),
        };
        let err = Error::from_detail(&detail);
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(
            err.message(),
            "503 Service Unavailable: The model is overloaded. (UNAVAILABLE)"
        );

        let detail = ErrorDetail {
            code: Some(429),
            message: "Quota exceeded.".to_owned(),
            status: None,
        };
        assert_eq!(
            Error::from_detail(&detail).kind(),
            ErrorKind::RateLimitExceeded
        );
    }

    #[test]
    fn test_content_type_check() {
        assert!(check_event_stream(Some("text/event-stream")).is_ok());
        assert!(
            check_event_stream(Some("text/event-stream; charset=utf-8"))
                .is_ok()
        );

        let err = check_event_stream(Some("application/json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert!(err.message().contains("application/json"));
        assert!(check_event_stream(Some("not a mime")).is_err());
        assert!(check_event_stream(None).is_err());
    }

    #[test]
    fn test_build_request() {
        let config = GeminiConfigBuilder::with_api_key("secret-key")
            .with_base_url("http://localhost:8080/v1beta/")
            .build();
        let request = proto::create_request(
            &[],
            "You are an AWS tutor.",
            "What is IAM?",
        );
        let req = build_request(
            &Client::new(),
            &config,
            "gemini-2.5-flash",
            &request,
        )
        .build()
        .unwrap();

        assert_eq!(req.method(), reqwest::Method::POST);
        assert_eq!(
            req.url().as_str(),
            "http://localhost:8080/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
        assert_eq!(req.headers()["x-goog-api-key"], "secret-key");
        assert_eq!(req.headers()[header::ACCEPT], "text/event-stream");

        let body = req.body().and_then(|body| body.as_bytes()).unwrap();
        let body: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "What is IAM?" }] }
                ],
                "systemInstruction": {
                    "parts": [{ "text": "You are an AWS tutor." }]
                }
            })
        );
    }

    #[tokio::test]
    async fn test_create_session() {
        let provider =
            GeminiProvider::new(GeminiConfigBuilder::with_api_key("key").build());
        let config = SessionConfig::new("gemini-2.5-flash", "Tutor");
        let first = provider.create_session(&config).await.unwrap();
        let second = provider.create_session(&config).await.unwrap();
        assert_ne!(first, second);
        let raw = first.to_raw::<GeminiSession>().unwrap();
        assert_eq!(raw.model(), "gemini-2.5-flash");
        assert!(raw.history().is_empty());
    }

    #[tokio::test]
    async fn test_missing_key() {
        let provider =
            GeminiProvider::new(GeminiConfigBuilder::with_api_key("").build());
        let config = SessionConfig::new("gemini-2.5-flash", "Tutor");
        let err = provider.create_session(&config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn test_foreign_session() {
        let provider =
            GeminiProvider::new(GeminiConfigBuilder::with_api_key("key").build());
        let foreign = SessionHandle::new("test-session:0", ());
        let err = provider
            .send_message_stream(&foreign, "Hi")
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}
