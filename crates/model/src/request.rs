use serde::{Deserialize, Serialize};

/// The fixed configuration a session is created with.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Identifier of the model that generates the replies.
    pub model: String,
    /// The instruction fixing the assistant's persona and response style.
    pub system_instruction: String,
}

impl SessionConfig {
    /// Creates a session configuration.
    #[inline]
    pub fn new<M: Into<String>, S: Into<String>>(
        model: M,
        system_instruction: S,
    ) -> Self {
        Self {
            model: model.into(),
            system_instruction: system_instruction.into(),
        }
    }
}
