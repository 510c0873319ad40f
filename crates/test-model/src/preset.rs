use serde::{Deserialize, Serialize};

/// The events in a preset reply.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    /// Delivers a text fragment.
    #[serde(rename = "fragment")]
    Fragment(String),
    /// Fails the stream with the given message. Events after it are never
    /// delivered.
    #[serde(rename = "fail")]
    Fail(String),
}

/// The preset reply for one exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetReply {
    /// Events in this reply.
    pub events: Vec<PresetEvent>,
    /// If set, the request is refused before any event is streamed.
    #[serde(default)]
    pub rejected: bool,
}

impl PresetReply {
    /// Creates a `PresetReply` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            rejected: false,
        }
    }

    /// Creates a `PresetReply` that streams the fragments and completes.
    pub fn with_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let events = fragments
            .into_iter()
            .map(|s| PresetEvent::Fragment(s.into()))
            .collect::<Vec<_>>();
        Self::with_events(events)
    }

    /// Marks the request to be refused by the service.
    #[inline]
    pub fn rejected(mut self) -> Self {
        self.rejected = true;
        self
    }
}
