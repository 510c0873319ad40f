use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An opaque handle to a conversation held by a chat provider.
///
/// Only the provider that created the handle knows what is inside. It
/// stores whatever it needs to continue the conversation (history, remote
/// identifiers, etc.) and gets it back with [`SessionHandle::to_raw`].
///
/// Handles are cheap to clone, and comparing them is just trivially
/// comparing the `id`.
pub struct SessionHandle(Arc<dyn SessionObject>);

impl SessionHandle {
    /// Creates a new `SessionHandle`.
    ///
    /// The `id` should be unique across all sessions of the provider.
    #[inline]
    pub fn new<ID: Into<String>, T: Send + Sync + 'static>(
        id: ID,
        value: T,
    ) -> Self {
        let id = id.into();
        Self(Arc::new(SessionInner { id, value }))
    }

    /// Returns the identifier of this session.
    #[inline]
    pub fn id(&self) -> &str {
        self.0.id()
    }

    /// Converts the handle into the provider's raw session type.
    ///
    /// Returns `None` if the handle was created with another type, which
    /// usually means it belongs to another provider.
    #[inline]
    pub fn to_raw<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref()
    }
}

impl Clone for SessionHandle {
    #[inline]
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl Debug for SessionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.0.id())
            .finish()
    }
}

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.id() == other.0.id()
    }
}

impl Eq for SessionHandle {}

impl Hash for SessionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id().hash(state);
    }
}

trait SessionObject: Send + Sync {
    fn id(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
}

struct SessionInner<T> {
    id: String,
    value: T,
}

impl<T: Send + Sync + 'static> SessionObject for SessionInner<T> {
    fn id(&self) -> &str {
        &self.id
    }

    fn as_any(&self) -> &dyn Any {
        &self.value
    }
}
