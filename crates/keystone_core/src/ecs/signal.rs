//! # Construction / Destruction Signals
//!
//! Every pool carries two handler lists. The registry fires `on_construct`
//! after a component is attached and `on_destroy` before it is detached, while
//! the value can still be read.
//!
//! Handlers receive `&mut Registry` and may call back into it. The registry
//! snapshots the list before invoking it, so a handler connecting or
//! disconnecting handlers only affects later emissions.

use std::fmt;
use std::sync::Arc;

use super::entity::Entity;
use super::registry::Registry;

/// Callback attached to a signal.
pub type Handler = Arc<dyn Fn(&mut Registry, Entity) + Send + Sync>;

/// Token returned on connection, used to disconnect the handler later.
///
/// Unique across every pool of one registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) const fn new(serial: u64) -> Self {
        Self(serial)
    }
}

/// Which of the two pool signals a handler listens to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// Fired after a component was attached.
    Construct,
    /// Fired before a component is detached.
    Destroy,
}

/// The signal pair of one pool.
#[derive(Default)]
pub struct Signals {
    on_construct: Vec<(ConnectionId, Handler)>,
    on_destroy: Vec<(ConnectionId, Handler)>,
}

impl Signals {
    /// Creates a pair with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self, kind: SignalKind) -> &Vec<(ConnectionId, Handler)> {
        match kind {
            SignalKind::Construct => &self.on_construct,
            SignalKind::Destroy => &self.on_destroy,
        }
    }

    /// Appends `handler` to the `kind` list under `id`.
    pub fn connect(&mut self, kind: SignalKind, id: ConnectionId, handler: Handler) {
        match kind {
            SignalKind::Construct => self.on_construct.push((id, handler)),
            SignalKind::Destroy => self.on_destroy.push((id, handler)),
        }
    }

    /// Removes the handler behind `id`. Returns `false` if it was not connected.
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        for list in [&mut self.on_construct, &mut self.on_destroy] {
            if let Some(pos) = list.iter().position(|(conn, _)| *conn == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of handlers on the `kind` list.
    #[must_use]
    pub fn len(&self, kind: SignalKind) -> usize {
        self.list(kind).len()
    }

    /// Checks if neither list has handlers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.on_construct.is_empty() && self.on_destroy.is_empty()
    }

    /// Copies the `kind` list for emission. Empty lists do not allocate.
    #[must_use]
    pub fn snapshot(&self, kind: SignalKind) -> Vec<Handler> {
        self.list(kind).iter().map(|(_, handler)| Arc::clone(handler)).collect()
    }
}

impl fmt::Debug for Signals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signals")
            .field("on_construct", &self.on_construct.len())
            .field("on_destroy", &self.on_destroy.len())
            .finish()
    }
}
