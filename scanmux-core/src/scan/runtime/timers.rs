use std::collections::HashMap;

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use tokio::time::sleep;

use crate::scan::message::Message;
use crate::scan::timers::{AlarmSpec, TimerBackend, TimerFired, TimerKey};

/// Timer backend built on tokio sleeps. Each armed key owns one task that
/// posts [`Message::Timer`] when its delay elapses.
///
/// Inexact alarms fire at the start of their window; the window only widens
/// what the schedulers are prepared to accept.
#[derive(Debug)]
pub struct TokioTimerBackend {
    runtime: Handle,
    inbox: UnboundedSender<Message>,
    tasks: HashMap<TimerKey, AbortHandle>,
}

impl TokioTimerBackend {
    pub fn new(runtime: Handle, inbox: UnboundedSender<Message>) -> Self {
        Self {
            runtime,
            inbox,
            tasks: HashMap::new(),
        }
    }
}

impl TimerBackend for TokioTimerBackend {
    fn arm(&mut self, fired: TimerFired, spec: AlarmSpec) {
        let inbox = self.inbox.clone();
        let task = self.runtime.spawn(async move {
            sleep(spec.delay).await;
            let _ = inbox.send(Message::Timer(fired));
        });
        if let Some(previous) = self.tasks.insert(fired.key, task.abort_handle()) {
            previous.abort();
        }
    }

    fn disarm(&mut self, key: TimerKey) {
        if let Some(task) = self.tasks.remove(&key) {
            task.abort();
        }
    }
}

impl Drop for TokioTimerBackend {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.abort();
        }
    }
}
