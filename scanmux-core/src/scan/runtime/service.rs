use std::fmt;
use std::sync::Arc;

use scanmux_model::{
    ClientEvent, ClientId, ClientIdentity, PnoSettings, ScanResult, ScanSettings,
    WorkSource,
};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, ScanError};
use crate::scan::clock::{Clock, MonotonicClock};
use crate::scan::config::ScanCoreConfig;
use crate::scan::core::{CoreBackends, ScanCore};
use crate::scan::engine::ScannerEngineFactory;
use crate::scan::events::ScanActivityEvent;
use crate::scan::message::Message;
use crate::scan::snapshot::ServiceSnapshot;

use super::event_bus::InProcScanEventBus;
use super::liveness::TokioLivenessWatch;
use super::timers::TokioTimerBackend;

/// Runtime knobs that are not part of the scheduling policy.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOptions {
    /// Buffered activity events per subscriber before it starts lagging.
    pub event_bus_capacity: usize,
    /// Bind engines and enable scanning as soon as the service starts.
    pub scanning_enabled_on_start: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            event_bus_capacity: 64,
            scanning_enabled_on_start: false,
        }
    }
}

enum Request {
    Register {
        identity: ClientIdentity,
        channel: UnboundedSender<ClientEvent>,
        reply: oneshot::Sender<Result<ClientId>>,
    },
    Unregister(ClientId),
    AddListener(ClientId),
    RemoveListener(ClientId),
    SetScanningEnabled(bool),
    StartSingle {
        client: ClientId,
        settings: ScanSettings,
        work_source: WorkSource,
    },
    StopSingle(ClientId),
    StartBackground {
        client: ClientId,
        settings: ScanSettings,
        work_source: WorkSource,
    },
    StopBackground(ClientId),
    GetBatchedResults(ClientId),
    StartPno {
        client: ClientId,
        settings: ScanSettings,
        pno: PnoSettings,
    },
    StopPno(ClientId),
    CachedResults(oneshot::Sender<Vec<ScanResult>>),
    Snapshot(oneshot::Sender<ServiceSnapshot>),
}

/// Handle to a [`ScanCore`] running on its own tokio task.
///
/// Requests that only change scheduler state are fire-and-forget; their
/// outcome reaches the client through its result channel. Queries answer
/// through a oneshot reply.
pub struct ScanService {
    requests: UnboundedSender<Request>,
    events: Arc<InProcScanEventBus>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl fmt::Debug for ScanService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanService")
            .field("events", &self.events)
            .field("shutdown_cancelled", &self.shutdown.is_cancelled())
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl ScanService {
    /// Starts the core on the current tokio runtime.
    pub fn spawn(
        config: ScanCoreConfig,
        options: ServiceOptions,
        engines: impl ScannerEngineFactory + 'static,
    ) -> Self {
        Self::spawn_with_clock(config, options, engines, Arc::new(MonotonicClock::default()))
    }

    pub fn spawn_with_clock(
        config: ScanCoreConfig,
        options: ServiceOptions,
        engines: impl ScannerEngineFactory + 'static,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let runtime = Handle::current();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let events = Arc::new(InProcScanEventBus::new(options.event_bus_capacity));
        let shutdown = CancellationToken::new();

        let backends = CoreBackends {
            engines: Box::new(engines),
            liveness: Box::new(TokioLivenessWatch::new(runtime.clone(), inbox_tx.clone())),
            timers: Box::new(TokioTimerBackend::new(runtime.clone(), inbox_tx.clone())),
            clock,
            activity: events.clone(),
        };
        let mut core = ScanCore::new(config, inbox_tx, backends);
        if options.scanning_enabled_on_start {
            core.set_scanning_enabled(true);
        }

        let task = runtime.spawn(run(core, inbox_rx, requests_rx, shutdown.clone()));
        info!("scan service started");
        Self {
            requests: requests_tx,
            events,
            shutdown,
            task,
        }
    }

    fn send(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| ScanError::ServiceStopped)
    }

    /// Registers a caller and returns its handle together with the receiving
    /// side of its result channel. Dropping the receiver counts as death.
    pub async fn register_client(
        &self,
        identity: ClientIdentity,
    ) -> Result<(ClientId, UnboundedReceiver<ClientEvent>)> {
        let (channel, events) = mpsc::unbounded_channel();
        let (reply, answer) = oneshot::channel();
        self.send(Request::Register {
            identity,
            channel,
            reply,
        })?;
        let client = answer.await.map_err(|_| ScanError::ServiceStopped)??;
        Ok((client, events))
    }

    pub fn unregister_client(&self, client: ClientId) -> Result<()> {
        self.send(Request::Unregister(client))
    }

    pub fn add_scan_listener(&self, client: ClientId) -> Result<()> {
        self.send(Request::AddListener(client))
    }

    pub fn remove_scan_listener(&self, client: ClientId) -> Result<()> {
        self.send(Request::RemoveListener(client))
    }

    pub fn set_scanning_enabled(&self, enabled: bool) -> Result<()> {
        self.send(Request::SetScanningEnabled(enabled))
    }

    pub fn start_single_scan(
        &self,
        client: ClientId,
        settings: ScanSettings,
        work_source: WorkSource,
    ) -> Result<()> {
        self.send(Request::StartSingle {
            client,
            settings,
            work_source,
        })
    }

    pub fn stop_single_scan(&self, client: ClientId) -> Result<()> {
        self.send(Request::StopSingle(client))
    }

    pub fn start_background_scan(
        &self,
        client: ClientId,
        settings: ScanSettings,
        work_source: WorkSource,
    ) -> Result<()> {
        self.send(Request::StartBackground {
            client,
            settings,
            work_source,
        })
    }

    pub fn stop_background_scan(&self, client: ClientId) -> Result<()> {
        self.send(Request::StopBackground(client))
    }

    pub fn get_batched_results(&self, client: ClientId) -> Result<()> {
        self.send(Request::GetBatchedResults(client))
    }

    pub fn start_pno_scan(
        &self,
        client: ClientId,
        settings: ScanSettings,
        pno: PnoSettings,
    ) -> Result<()> {
        self.send(Request::StartPno {
            client,
            settings,
            pno,
        })
    }

    pub fn stop_pno_scan(&self, client: ClientId) -> Result<()> {
        self.send(Request::StopPno(client))
    }

    pub async fn cached_scan_results(&self) -> Result<Vec<ScanResult>> {
        let (reply, answer) = oneshot::channel();
        self.send(Request::CachedResults(reply))?;
        answer.await.map_err(|_| ScanError::ServiceStopped)
    }

    pub async fn snapshot(&self) -> Result<ServiceSnapshot> {
        let (reply, answer) = oneshot::channel();
        self.send(Request::Snapshot(reply))?;
        answer.await.map_err(|_| ScanError::ServiceStopped)
    }

    pub fn subscribe_activity(&self) -> broadcast::Receiver<ScanActivityEvent> {
        self.events.subscribe()
    }

    /// Stops the core task and waits for it to finish. Outstanding requests
    /// are dropped without callbacks.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.cancel();
        self.task
            .await
            .map_err(|err| ScanError::Internal(format!("scan service task failed: {err}")))
    }
}

async fn run(
    mut core: ScanCore,
    mut inbox: UnboundedReceiver<Message>,
    mut requests: UnboundedReceiver<Request>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("scan service shutting down");
                break;
            }
            Some(message) = inbox.recv() => core.dispatch(message),
            request = requests.recv() => match request {
                Some(request) => handle_request(&mut core, request),
                None => {
                    debug!("every service handle dropped");
                    break;
                }
            },
        }
    }
}

fn handle_request(core: &mut ScanCore, request: Request) {
    match request {
        Request::Register {
            identity,
            channel,
            reply,
        } => {
            let _ = reply.send(core.register_client(identity, channel));
        }
        Request::Unregister(client) => core.unregister_client(client),
        Request::AddListener(client) => core.add_scan_listener(client),
        Request::RemoveListener(client) => core.remove_scan_listener(client),
        Request::SetScanningEnabled(enabled) => core.set_scanning_enabled(enabled),
        Request::StartSingle {
            client,
            settings,
            work_source,
        } => core.start_single_scan(client, settings, work_source),
        Request::StopSingle(client) => core.stop_single_scan(client),
        Request::StartBackground {
            client,
            settings,
            work_source,
        } => core.start_background_scan(client, settings, work_source),
        Request::StopBackground(client) => core.stop_background_scan(client),
        Request::GetBatchedResults(client) => core.get_batched_results(client),
        Request::StartPno {
            client,
            settings,
            pno,
        } => core.start_pno_scan(client, settings, pno),
        Request::StopPno(client) => core.stop_pno_scan(client),
        Request::CachedResults(reply) => {
            let _ = reply.send(core.cached_scan_results());
        }
        Request::Snapshot(reply) => {
            let _ = reply.send(core.snapshot());
        }
    }
}
