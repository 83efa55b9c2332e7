use scanmux_model::{ClientEvent, ClientId, IfaceName, ScanSettings, WorkSource};

use super::engine::{EngineEvent, EngineSource, OperationId};
use super::timers::TimerFired;

/// Event posted by an engine for one of its operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineMessage {
    pub iface: IfaceName,
    pub source: EngineSource,
    pub operation: OperationId,
    pub event: EngineEvent,
}

/// Asynchronous input to the core. Everything that is not a direct caller
/// request is funnelled through this one serialized stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Engine(EngineMessage),
    Timer(TimerFired),
    /// A client's result channel went away.
    ClientDied(ClientId),
    /// Event addressed to an internal client owned by the PNO scheduler.
    InternalClient {
        client: ClientId,
        event: ClientEvent,
    },
    /// Single scan requested on behalf of an internal client.
    InternalSingleScan {
        client: ClientId,
        settings: ScanSettings,
        work_source: WorkSource,
    },
    /// Software PNO ran out of schedule for the given session.
    StopSoftwarePno { session: u64 },
}
