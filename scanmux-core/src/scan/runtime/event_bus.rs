use std::fmt;

use tokio::sync::broadcast;

use crate::scan::events::{ScanActivityEvent, ScanActivityPublisher};

/// Lightweight in-process event bus that fans scanner activity out to
/// observers. Slow subscribers lag and lose the oldest events.
pub struct InProcScanEventBus {
    sender: broadcast::Sender<ScanActivityEvent>,
    capacity: usize,
}

impl fmt::Debug for InProcScanEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcScanEventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl InProcScanEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanActivityEvent> {
        self.sender.subscribe()
    }
}

impl ScanActivityPublisher for InProcScanEventBus {
    fn publish(&self, event: ScanActivityEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}
