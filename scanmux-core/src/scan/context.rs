use std::fmt;
use std::sync::Arc;

use scanmux_model::IfaceName;
use tokio::sync::mpsc::UnboundedSender;

use super::channels::ChannelPlan;
use super::clock::Clock;
use super::config::ScanCoreConfig;
use super::engine::{EngineEventSink, EngineSet, EngineSource, OperationId};
use super::events::{ScanActivityEvent, ScanActivityPublisher};
use super::message::Message;
use super::registry::Registry;
use super::timers::Timers;

/// State shared by the three schedulers. Owned by the core and lent to one
/// scheduler at a time while a message is processed.
pub struct CoreContext {
    pub engines: EngineSet,
    pub registry: Registry,
    pub timers: Timers,
    pub clock: Arc<dyn Clock>,
    pub config: ScanCoreConfig,
    activity: Arc<dyn ScanActivityPublisher>,
    inbox: UnboundedSender<Message>,
    next_operation: u64,
}

impl fmt::Debug for CoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreContext")
            .field("engines", &self.engines)
            .field("registry", &self.registry)
            .field("timers", &self.timers)
            .field("next_operation", &self.next_operation)
            .finish()
    }
}

impl CoreContext {
    pub fn new(
        registry: Registry,
        timers: Timers,
        clock: Arc<dyn Clock>,
        config: ScanCoreConfig,
        activity: Arc<dyn ScanActivityPublisher>,
        inbox: UnboundedSender<Message>,
    ) -> Self {
        Self {
            engines: EngineSet::default(),
            registry,
            timers,
            clock,
            config,
            activity,
            inbox,
            next_operation: 0,
        }
    }

    pub fn plan(&self) -> &ChannelPlan {
        &self.config.channel_plan
    }

    pub fn next_operation(&mut self) -> OperationId {
        self.next_operation += 1;
        OperationId(self.next_operation)
    }

    pub fn sink(
        &self,
        iface: &IfaceName,
        source: EngineSource,
        operation: OperationId,
    ) -> EngineEventSink {
        EngineEventSink::new(iface.clone(), source, operation, self.inbox.clone())
    }

    /// Queues a message behind everything already pending.
    pub fn post(&self, message: Message) {
        let _ = self.inbox.send(message);
    }

    pub fn publish(&self, event: ScanActivityEvent) {
        self.activity.publish(event);
    }
}
