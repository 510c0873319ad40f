/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The prompt or the reply is blocked by the service.
    Moderated,
    /// The service is rate limited.
    RateLimitExceeded,
    /// The credential is missing or rejected by the service.
    Unauthenticated,
    /// Any other errors.
    Other,
}
