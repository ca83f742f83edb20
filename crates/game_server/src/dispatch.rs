//! Packet routing.
//!
//! The [`HandlerRegistry`] is built once at startup and is immutable
//! afterwards. The [`Dispatcher`] looks up the handler for each decoded
//! packet, runs it with panic capture, and applies the failure policy for
//! whatever it returns. No handler outcome ends the connection loop except a
//! security violation, which closes the offending session on purpose.

use crate::context::ServerContext;
use crate::error::{HandlerError, RegistryError};
use crate::notify::{spawn_notify, Notification};
use crate::protocol;
use crate::session::Session;
use async_trait::async_trait;
use futures::FutureExt;
use packet_codec::Packet;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Handles exactly one packet type.
#[async_trait]
pub trait PacketHandler: Send + Sync {
    fn packet_type(&self) -> u16;

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    async fn handle(
        &self,
        ctx: &ServerContext,
        session: &Arc<Session>,
        packet: &Packet,
    ) -> Result<(), HandlerError>;
}

/// Immutable packet type to handler table.
pub struct HandlerRegistry {
    handlers: HashMap<u16, Arc<dyn PacketHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    pub fn get(&self, packet_type: u16) -> Option<&Arc<dyn PacketHandler>> {
        self.handlers.get(&packet_type)
    }

    pub fn contains(&self, packet_type: u16) -> bool {
        self.handlers.contains_key(&packet_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<u16, Arc<dyn PacketHandler>>,
}

impl HandlerRegistryBuilder {
    /// Adds a handler. A second handler for the same packet type is a
    /// configuration error.
    pub fn register(mut self, handler: impl PacketHandler + 'static) -> Result<Self, RegistryError> {
        let packet_type = handler.packet_type();
        if self.handlers.contains_key(&packet_type) {
            return Err(RegistryError::DuplicateHandler(packet_type));
        }
        self.handlers.insert(packet_type, Arc::new(handler));
        Ok(self)
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

/// Which failure policy was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Protocol,
    Validation,
    Security,
    Persistence,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    /// No handler is registered for the packet type; the packet was dropped.
    Unhandled,
    Failed(FailureKind),
}

pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    context: Arc<ServerContext>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, context: Arc<ServerContext>) -> Self {
        Self { registry, context }
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub async fn dispatch(&self, session: &Arc<Session>, packet: &Packet) -> DispatchOutcome {
        let Some(handler) = self.registry.get(packet.type_id()) else {
            warn!(
                packet_type = packet.type_id(),
                character_id = session.character_id(),
                "dropping packet with no registered handler"
            );
            return DispatchOutcome::Unhandled;
        };

        debug!(
            packet_type = packet.type_id(),
            handler = handler.name(),
            character_id = session.character_id(),
            "dispatching"
        );

        let result = AssertUnwindSafe(handler.handle(&self.context, session, packet))
            .catch_unwind()
            .await;
        let error = match result {
            Ok(Ok(())) => return DispatchOutcome::Handled,
            Ok(Err(e)) => e,
            Err(panic_info) => panic_to_error(panic_info),
        };
        DispatchOutcome::Failed(self.apply_policy(session, packet.type_id(), error))
    }

    fn apply_policy(&self, session: &Session, packet_type: u16, error: HandlerError) -> FailureKind {
        let character_id = session.character_id();
        match error {
            HandlerError::Protocol(e) => {
                warn!(packet_type, character_id, "dropping malformed packet: {}", e);
                FailureKind::Protocol
            }
            HandlerError::Validation(message) => {
                debug!(packet_type, character_id, "rejected: {}", message);
                match protocol::system_message(&message) {
                    Ok(frame) => {
                        session.send(frame);
                    }
                    Err(e) => warn!(packet_type, "could not encode system message: {}", e),
                }
                FailureKind::Validation
            }
            HandlerError::Security(reason) => {
                error!(
                    packet_type,
                    character_id,
                    connection = %session.id(),
                    "🚨 security violation, terminating session: {}",
                    reason
                );
                session.disconnect();
                spawn_notify(
                    self.context.notifier.clone(),
                    Notification::moderation(
                        session.name(),
                        format!("character {character_id} terminated: {reason}"),
                        session.channel(),
                    ),
                );
                FailureKind::Security
            }
            HandlerError::Persistence(e) => {
                error!(packet_type, character_id, "persistence failed, in-memory state kept: {}", e);
                FailureKind::Persistence
            }
            HandlerError::Internal(message) => {
                error!(
                    packet_type,
                    character_id,
                    connection = %session.id(),
                    "handler fault: {}",
                    message
                );
                FailureKind::Internal
            }
        }
    }
}

fn panic_to_error(panic_info: Box<dyn std::any::Any + Send>) -> HandlerError {
    let message = if let Some(s) = panic_info.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    };
    HandlerError::Internal(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(u16);

    #[async_trait]
    impl PacketHandler for Noop {
        fn packet_type(&self) -> u16 {
            self.0
        }

        async fn handle(
            &self,
            _ctx: &ServerContext,
            _session: &Arc<Session>,
            _packet: &Packet,
        ) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let result = HandlerRegistry::builder()
            .register(Noop(1))
            .and_then(|b| b.register(Noop(2)))
            .and_then(|b| b.register(Noop(1)));

        assert!(matches!(result, Err(RegistryError::DuplicateHandler(1))));
    }

    #[test]
    fn built_registry_holds_each_type_once() {
        let registry = HandlerRegistry::builder()
            .register(Noop(5))
            .and_then(|b| b.register(Noop(6)))
            .unwrap()
            .build();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(5) && registry.contains(6));
        assert!(!registry.contains(7));
    }
}
