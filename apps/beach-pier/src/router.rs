use metrics::{counter, decrement_gauge, increment_gauge};
use tracing::{debug, info, warn};

use crate::error::DeliveryError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, EndpointId};

/// What happened to a single inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Registered {
        endpoint: EndpointId,
        /// The identifier had no binding before this registration.
        new_endpoint: bool,
        superseded: Option<ConnectionId>,
    },
    Delivered {
        to: EndpointId,
    },
    /// The offer target was unreachable and the caller was told so.
    SenderNotified {
        target: EndpointId,
    },
    Dropped {
        target: EndpointId,
        reason: DropReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Unreachable,
    Delivery(DeliveryError),
}

impl DropReason {
    fn as_label(&self) -> &'static str {
        match self {
            DropReason::Unreachable => "unreachable",
            DropReason::Delivery(DeliveryError::QueueFull) => "queue_full",
            DropReason::Delivery(DeliveryError::Closed) => "closed",
        }
    }
}

/// Routes signaling events between registered endpoints.
///
/// Every event is handled on its own: resolve the destination, enqueue at
/// most one message, return. Only offers report failure to the sender.
#[derive(Clone, Default)]
pub struct RelayRouter {
    registry: ConnectionRegistry,
}

impl RelayRouter {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn dispatch(&self, origin: &ConnectionHandle, message: ClientMessage) -> RelayOutcome {
        let kind = message.kind();
        counter!("beach_pier_events_total", 1, "kind" => kind);

        match message {
            ClientMessage::Register { user_id } => self.register(origin, user_id),
            ClientMessage::Offer {
                target_user_id,
                caller_id,
                sdp,
            } => {
                let offer = ServerMessage::Offer {
                    caller_id: caller_id.clone(),
                    sdp,
                };
                match self.forward(&target_user_id, offer) {
                    Ok(()) => {
                        debug!(from = %caller_id, to = %target_user_id, "forwarded offer");
                        self.delivered(kind, target_user_id)
                    }
                    Err(reason) => self.notify_offline(origin, caller_id, target_user_id, reason),
                }
            }
            // Answers travel back to whoever placed the call.
            ClientMessage::Answer {
                caller_id,
                target_user_id,
                sdp,
            } => self.forward_or_drop(
                kind,
                &target_user_id,
                caller_id,
                ServerMessage::Answer {
                    target_user_id: target_user_id.clone(),
                    sdp,
                },
            ),
            ClientMessage::IceCandidate {
                target_user_id,
                sender_id,
                candidate,
            } => self.forward_or_drop(
                kind,
                &sender_id,
                target_user_id,
                ServerMessage::IceCandidate {
                    sender_id: sender_id.clone(),
                    candidate,
                },
            ),
            ClientMessage::EndCall {
                target_user_id,
                sender_id,
            } => self.forward_or_drop(
                kind,
                &sender_id,
                target_user_id,
                ServerMessage::EndCall {
                    sender_id: sender_id.clone(),
                },
            ),
        }
    }

    /// Forget every identifier bound to `origin`. Safe to call more than once.
    pub fn disconnect(&self, origin: &ConnectionHandle) -> Vec<EndpointId> {
        let removed = self.registry.remove_by_connection(origin);
        for endpoint in &removed {
            info!(
                connection_id = %origin.id(),
                endpoint = %endpoint,
                "removed endpoint from registry"
            );
        }
        if !removed.is_empty() {
            decrement_gauge!("beach_pier_registered_endpoints", removed.len() as f64);
        }
        removed
    }

    fn register(&self, origin: &ConnectionHandle, endpoint: EndpointId) -> RelayOutcome {
        let previous = self.registry.register(endpoint.clone(), origin.clone());
        let new_endpoint = previous.is_none();
        let superseded = previous
            .filter(|previous| previous != origin)
            .map(|previous| previous.id());
        match superseded {
            Some(previous) => info!(
                connection_id = %origin.id(),
                endpoint = %endpoint,
                superseded = %previous,
                "registered endpoint, replacing earlier connection"
            ),
            None => info!(
                connection_id = %origin.id(),
                endpoint = %endpoint,
                "registered endpoint"
            ),
        }
        // Adjusted by delta so concurrent changes never leave a stale total;
        // `/stats` reads the table itself.
        if new_endpoint {
            increment_gauge!("beach_pier_registered_endpoints", 1.0);
        }
        RelayOutcome::Registered {
            endpoint,
            new_endpoint,
            superseded,
        }
    }

    fn forward(&self, target: &EndpointId, message: ServerMessage) -> Result<(), DropReason> {
        let connection = self
            .registry
            .resolve(target)
            .ok_or(DropReason::Unreachable)?;
        connection.deliver(message).map_err(DropReason::Delivery)
    }

    fn forward_or_drop(
        &self,
        kind: &'static str,
        from: &EndpointId,
        target: EndpointId,
        message: ServerMessage,
    ) -> RelayOutcome {
        match self.forward(&target, message) {
            Ok(()) => {
                debug!(kind, from = %from, to = %target, "forwarded signal");
                self.delivered(kind, target)
            }
            Err(reason) => {
                debug!(
                    kind,
                    from = %from,
                    target = %target,
                    reason = reason.as_label(),
                    "dropping signal for unreachable target"
                );
                counter!(
                    "beach_pier_dropped_total",
                    1,
                    "kind" => kind,
                    "reason" => reason.as_label()
                );
                RelayOutcome::Dropped { target, reason }
            }
        }
    }

    fn notify_offline(
        &self,
        origin: &ConnectionHandle,
        caller: EndpointId,
        target: EndpointId,
        reason: DropReason,
    ) -> RelayOutcome {
        info!(
            caller = %caller,
            target = %target,
            reason = reason.as_label(),
            "offer target not reachable"
        );
        counter!("beach_pier_offline_notices_total", 1);
        match origin.deliver(ServerMessage::user_offline()) {
            Ok(()) => RelayOutcome::SenderNotified { target },
            Err(err) => {
                warn!(
                    connection_id = %origin.id(),
                    error = %err,
                    "could not notify caller that target is offline"
                );
                RelayOutcome::Dropped {
                    target,
                    reason: DropReason::Delivery(err),
                }
            }
        }
    }

    fn delivered(&self, kind: &'static str, to: EndpointId) -> RelayOutcome {
        counter!("beach_pier_relayed_total", 1, "kind" => kind);
        RelayOutcome::Delivered { to }
    }
}
