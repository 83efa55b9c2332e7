use chrono::{DateTime, Utc};
use scanmux_model::ClientId;
use serde::Serialize;

use crate::error::Result;

use super::background::BackgroundScanSnapshot;
use super::pno::PnoScanSnapshot;
use super::registry::ClientRecord;
use super::single::SingleScanSnapshot;

/// One registered caller as shown in diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ClientSnapshot {
    pub id: ClientId,
    pub uid: u32,
    pub package_name: String,
    pub internal: bool,
    pub registered_at: DateTime<Utc>,
}

impl From<&ClientRecord> for ClientSnapshot {
    fn from(record: &ClientRecord) -> Self {
        Self {
            id: record.id,
            uid: record.identity.uid,
            package_name: record.identity.package_name.clone(),
            internal: record.is_internal(),
            registered_at: record.registered_at,
        }
    }
}

/// Point-in-time view of the whole core, for dumps and debugging.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSnapshot {
    pub taken_at: DateTime<Utc>,
    pub scanning_enabled: bool,
    pub engines: Vec<String>,
    pub clients: Vec<ClientSnapshot>,
    pub single: SingleScanSnapshot,
    pub background: BackgroundScanSnapshot,
    pub pno: PnoScanSnapshot,
}

impl ServiceSnapshot {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
