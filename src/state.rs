//! States and state identity.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Unique identity of a registered state.
///
/// Ids are non-zero 32-bit values drawn uniformly at random when a state is
/// constructed; the reserved raw value 0 is unrepresentable. Construction
/// never consults the engine, and the collision probability over realistic
/// state counts is negligible. Nothing may assume ids are sequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(NonZeroU32);

impl StateId {
    /// Draws a fresh random id.
    pub fn random() -> Self {
        loop {
            if let Some(id) = NonZeroU32::new(rand::random::<u32>()) {
                return Self(id);
            }
        }
    }

    /// Wraps an explicit raw id. Returns `None` for the reserved value 0.
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// The raw integral value, as packed into transition table keys.
    pub fn to_raw(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conversion applied to a state handler's return value.
///
/// Handlers may return `bool`, reported verbatim, or nothing, reported as
/// success. A failing handler drops the engine into its error state.
pub trait HandlerOutcome {
    /// Collapses the return value into a success flag.
    fn into_outcome(self) -> bool;
}

impl HandlerOutcome for bool {
    fn into_outcome(self) -> bool {
        self
    }
}

impl HandlerOutcome for () {
    fn into_outcome(self) -> bool {
        true
    }
}

/// Type-erased state handler.
pub type StateHandler<A> = Arc<dyn Fn(&A) -> bool + Send + Sync>;

/// A state of the automaton: an identity, an optional parent and an
/// optional handler invoked when the state is entered.
///
/// A state with a parent defers to the parent's transition rows for any
/// symbol it has no direct row for.
pub struct State<A> {
    id: StateId,
    parent: Option<StateId>,
    handler: Option<StateHandler<A>>,
}

impl<A> State<A> {
    /// Creates a state with a fresh random id and no parent.
    pub fn new() -> Self {
        Self {
            id: StateId::random(),
            parent: None,
            handler: None,
        }
    }

    /// Creates a state with a fresh random id, parented to `parent`.
    pub fn with_parent(parent: StateId) -> Self {
        Self {
            id: StateId::random(),
            parent: Some(parent),
            handler: None,
        }
    }

    /// Installs `handler`, consuming and returning the state.
    pub fn handler<F, R>(mut self, handler: F) -> Self
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
        R: HandlerOutcome,
    {
        self.set_handler(handler);
        self
    }

    /// Installs `handler`.
    pub fn set_handler<F, R>(&mut self, handler: F)
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
        R: HandlerOutcome,
    {
        self.handler = Some(Arc::new(move |args| handler(args).into_outcome()));
    }

    /// Replaces the generated id.
    pub fn set_id(&mut self, id: StateId) {
        self.id = id;
    }

    /// Sets the parent state.
    pub fn set_parent(&mut self, parent: StateId) {
        self.parent = Some(parent);
    }

    /// The state's id.
    pub fn id(&self) -> StateId {
        self.id
    }

    /// The parent state's id, if any.
    pub fn parent(&self) -> Option<StateId> {
        self.parent
    }

    /// Whether a parent is set.
    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// Whether a handler is installed.
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Runs the handler. A state without a handler reports failure, which
    /// the engine treats as a drop to the error state.
    pub fn invoke(&self, args: &A) -> bool {
        match &self.handler {
            Some(handler) => handler(args),
            None => false,
        }
    }
}

impl<A> Default for State<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for State<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            parent: self.parent,
            handler: self.handler.clone(),
        }
    }
}

impl<A> fmt::Debug for State<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}
