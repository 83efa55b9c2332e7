use scanmux_model::{ClientEvent, ClientId};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::scan::message::Message;
use crate::scan::registry::{LivenessGuard, LivenessWatcher};

/// Watches each client's result channel from a background task and posts
/// [`Message::ClientDied`] once the receiving side is dropped.
#[derive(Debug, Clone)]
pub struct TokioLivenessWatch {
    runtime: Handle,
    inbox: UnboundedSender<Message>,
}

impl TokioLivenessWatch {
    pub fn new(runtime: Handle, inbox: UnboundedSender<Message>) -> Self {
        Self { runtime, inbox }
    }
}

impl LivenessWatcher for TokioLivenessWatch {
    fn watch(
        &mut self,
        client: ClientId,
        channel: &UnboundedSender<ClientEvent>,
    ) -> Option<LivenessGuard> {
        let channel = channel.clone();
        let inbox = self.inbox.clone();
        let task = self.runtime.spawn(async move {
            channel.closed().await;
            debug!(client = %client, "result channel closed");
            let _ = inbox.send(Message::ClientDied(client));
        });
        Some(LivenessGuard::new(task.abort_handle()))
    }
}
