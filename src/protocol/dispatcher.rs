//! Object dispatcher with uuid-keyed routing.
//!
//! Decoded objects come off the wire as `(uuid, values[])`; the dispatcher
//! maps each known class uuid to a typed handler producing the session
//! event for it. One dispatcher belongs to one session, so no locking is
//! involved; the registry of handlers is fixed after construction.

use std::collections::HashMap;

use uuid::Uuid;

use crate::core::value::NetObject;
use crate::error::{ProtocolError, Result};
use crate::protocol::session::SessionEvent;

type HandlerFn = dyn Fn(&NetObject) -> Result<SessionEvent> + Send + Sync + 'static;

pub struct Dispatcher {
    handlers: HashMap<Uuid, Box<HandlerFn>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, uuid: Uuid, handler: F)
    where
        F: Fn(&NetObject) -> Result<SessionEvent> + Send + Sync + 'static,
    {
        self.handlers.insert(uuid, Box::new(handler));
    }

    /// Route a decoded object to its handler.
    pub fn dispatch(&self, object: &NetObject) -> Result<SessionEvent> {
        self.handlers
            .get(&object.class_uuid)
            .ok_or(ProtocolError::UnexpectedMessage(object.class_uuid))
            .and_then(|handler| handler(object))
    }

    pub fn handles(&self, uuid: &Uuid) -> bool {
        self.handlers.contains_key(uuid)
    }
}
