use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use scanmux_model::{ClientEvent, ClientId, ClientIdentity, FailureReason};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, ScanError};

use super::message::Message;

/// Keeps a liveness watch alive; dropping it stops the watch.
pub struct LivenessGuard {
    handle: AbortHandle,
}

impl LivenessGuard {
    pub fn new(handle: AbortHandle) -> Self {
        Self { handle }
    }
}

impl Drop for LivenessGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl fmt::Debug for LivenessGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LivenessGuard")
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

/// Arms a watch that posts [`Message::ClientDied`] once `channel` closes.
pub trait LivenessWatcher: Send {
    fn watch(
        &mut self,
        client: ClientId,
        channel: &UnboundedSender<ClientEvent>,
    ) -> Option<LivenessGuard>;
}

/// Watcher for cores driven without a runtime. Death is detected only when
/// a delivery fails.
#[derive(Debug, Default)]
pub struct NoopLiveness;

impl LivenessWatcher for NoopLiveness {
    fn watch(
        &mut self,
        _client: ClientId,
        _channel: &UnboundedSender<ClientEvent>,
    ) -> Option<LivenessGuard> {
        None
    }
}

enum ClientKind {
    External {
        channel: UnboundedSender<ClientEvent>,
        _liveness: Option<LivenessGuard>,
    },
    /// Proxy owned by the PNO scheduler. Its events are routed back into the
    /// message stream instead of a channel, and it has no liveness watch.
    Internal,
}

/// One registered caller.
pub struct ClientRecord {
    pub id: ClientId,
    pub identity: ClientIdentity,
    pub registered_at: DateTime<Utc>,
    kind: ClientKind,
    dead: bool,
}

impl ClientRecord {
    pub fn is_internal(&self) -> bool {
        matches!(self.kind, ClientKind::Internal)
    }
}

impl fmt::Debug for ClientRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRecord")
            .field("id", &self.id)
            .field("uid", &self.identity.uid)
            .field("package_name", &self.identity.package_name)
            .field("internal", &self.is_internal())
            .field("dead", &self.dead)
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

/// Connected callers keyed by the handle issued at registration.
pub struct Registry {
    clients: BTreeMap<ClientId, ClientRecord>,
    inbox: UnboundedSender<Message>,
    liveness: Box<dyn LivenessWatcher>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("client_count", &self.clients.len())
            .finish()
    }
}

impl Registry {
    pub fn new(
        inbox: UnboundedSender<Message>,
        liveness: Box<dyn LivenessWatcher>,
    ) -> Self {
        Self {
            clients: BTreeMap::new(),
            inbox,
            liveness,
        }
    }

    /// Registers an external caller. Fails when `channel` already backs a
    /// live registration.
    pub fn register(
        &mut self,
        identity: ClientIdentity,
        channel: UnboundedSender<ClientEvent>,
    ) -> Result<ClientId> {
        let duplicate = self.clients.values().any(|record| match &record.kind {
            ClientKind::External { channel: existing, .. } => {
                !record.dead && existing.same_channel(&channel)
            }
            ClientKind::Internal => false,
        });
        if duplicate {
            warn!(uid = identity.uid, package = %identity.package_name, "duplicate client registration");
            return Err(ScanError::DuplicateClient);
        }
        if channel.is_closed() {
            return Err(ScanError::InvalidRequest(
                "result channel already closed".to_string(),
            ));
        }

        let id = ClientId::new();
        let liveness = self.liveness.watch(id, &channel);
        info!(client = %id, uid = identity.uid, package = %identity.package_name, "client registered");
        self.clients.insert(
            id,
            ClientRecord {
                id,
                identity,
                registered_at: Utc::now(),
                kind: ClientKind::External {
                    channel,
                    _liveness: liveness,
                },
                dead: false,
            },
        );
        Ok(id)
    }

    /// Registers an internal proxy acting on behalf of `identity`.
    pub fn register_internal(&mut self, identity: ClientIdentity) -> ClientId {
        let id = ClientId::new();
        debug!(client = %id, "internal client registered");
        self.clients.insert(
            id,
            ClientRecord {
                id,
                identity,
                registered_at: Utc::now(),
                kind: ClientKind::Internal,
                dead: false,
            },
        );
        id
    }

    /// Drops the record and its liveness watch. Scheduler cleanup is the
    /// caller's job.
    pub fn remove(&mut self, id: ClientId) -> Option<ClientRecord> {
        let record = self.clients.remove(&id);
        if record.is_some() {
            debug!(client = %id, "client released");
        }
        record
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn get(&self, id: ClientId) -> Option<&ClientRecord> {
        self.clients.get(&id)
    }

    pub fn is_internal(&self, id: ClientId) -> bool {
        self.clients.get(&id).is_some_and(ClientRecord::is_internal)
    }

    pub fn records(&self) -> impl Iterator<Item = &ClientRecord> {
        self.clients.values()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Sends `event` to a client. A closed channel marks the client dead and
    /// posts a single [`Message::ClientDied`].
    pub fn deliver(&mut self, id: ClientId, event: ClientEvent) -> bool {
        let Some(record) = self.clients.get_mut(&id) else {
            debug!(client = %id, "dropping event for unknown client");
            return false;
        };
        match &record.kind {
            ClientKind::External { channel, .. } => {
                if channel.send(event).is_ok() {
                    return true;
                }
                if !record.dead {
                    record.dead = true;
                    warn!(client = %id, "result channel closed; treating client as dead");
                    let _ = self.inbox.send(Message::ClientDied(id));
                }
                false
            }
            ClientKind::Internal => self
                .inbox
                .send(Message::InternalClient { client: id, event })
                .is_ok(),
        }
    }

    pub fn fail(
        &mut self,
        id: ClientId,
        reason: FailureReason,
        description: &str,
    ) -> bool {
        self.deliver(id, ClientEvent::failure(reason, description))
    }

    /// Terminates a request refused at admission.
    pub fn reject(&mut self, id: ClientId, err: &ScanError) -> bool {
        debug!(client = %id, error = %err, "request rejected");
        self.fail(id, err.failure_reason(), &err.client_description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn identity() -> ClientIdentity {
        ClientIdentity::new(1000, "com.example.scanner")
    }

    #[test]
    fn rejects_second_registration_of_same_channel() {
        let (inbox, _rx) = mpsc::unbounded_channel();
        let mut registry = Registry::new(inbox, Box::new(NoopLiveness));
        let (tx, _events) = mpsc::unbounded_channel();

        registry.register(identity(), tx.clone()).unwrap();
        let err = registry.register(identity(), tx).unwrap_err();
        assert!(matches!(err, ScanError::DuplicateClient));

        let (other, _other_events) = mpsc::unbounded_channel();
        assert!(registry.register(identity(), other).is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn closed_channel_posts_death_once() {
        let (inbox, mut rx) = mpsc::unbounded_channel();
        let mut registry = Registry::new(inbox, Box::new(NoopLiveness));
        let (tx, events) = mpsc::unbounded_channel();
        let id = registry.register(identity(), tx).unwrap();
        drop(events);

        assert!(!registry.deliver(id, ClientEvent::Success));
        assert!(!registry.deliver(id, ClientEvent::Success));
        assert_eq!(rx.try_recv().unwrap(), Message::ClientDied(id));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn internal_events_loop_back_into_inbox() {
        let (inbox, mut rx) = mpsc::unbounded_channel();
        let mut registry = Registry::new(inbox, Box::new(NoopLiveness));
        let id = registry.register_internal(identity());

        assert!(registry.is_internal(id));
        assert!(registry.deliver(id, ClientEvent::SingleScanCompleted));
        assert_eq!(
            rx.try_recv().unwrap(),
            Message::InternalClient {
                client: id,
                event: ClientEvent::SingleScanCompleted,
            }
        );
    }

    #[test]
    fn remove_is_idempotent() {
        let (inbox, _rx) = mpsc::unbounded_channel();
        let mut registry = Registry::new(inbox, Box::new(NoopLiveness));
        let (tx, _events) = mpsc::unbounded_channel();
        let id = registry.register(identity(), tx).unwrap();

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(!registry.deliver(id, ClientEvent::Success));
    }
}
