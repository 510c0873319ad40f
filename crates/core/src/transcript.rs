//! Transcript-related types.

/// Who wrote a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The person using the tutor.
    User,
    /// The generative-text service.
    Assistant,
}

/// A message in the transcript.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Message {
    role: Role,
    text: String,
}

impl Message {
    /// Creates a user message.
    #[inline]
    pub fn user<S: Into<String>>(text: S) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Creates an assistant message.
    #[inline]
    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }

    /// Returns the author of this message.
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the text of this message.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// The ordered list of exchanged messages.
///
/// Messages can only be appended, and only the last message can be
/// changed afterwards (while its reply is streaming in).
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct Transcript {
    items: Vec<Message>,
}

impl Transcript {
    /// Returns all messages, oldest first.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.items
    }

    /// Returns the number of messages.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if there are no messages.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the newest message.
    #[inline]
    pub fn last(&self) -> Option<&Message> {
        self.items.last()
    }

    /// Appends a message and returns its index.
    pub(crate) fn push(&mut self, message: Message) -> usize {
        self.items.push(message);
        self.items.len() - 1
    }

    /// Appends a fragment to the text of the newest message.
    pub(crate) fn append_to_last(&mut self, fragment: &str) -> Option<usize> {
        let last = self.items.last_mut()?;
        last.text.push_str(fragment);
        Some(self.items.len() - 1)
    }

    /// Replaces the text of the newest message.
    pub(crate) fn replace_last(&mut self, text: &str) -> Option<usize> {
        let last = self.items.last_mut()?;
        last.text.clear();
        last.text.push_str(text);
        Some(self.items.len() - 1)
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
