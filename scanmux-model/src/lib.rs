//! Core data model definitions shared across scanmux crates.
#![allow(missing_docs)]

pub mod band;
pub mod error;
pub mod events;
pub mod ids;
pub mod native;
pub mod results;
pub mod settings;

// Intentionally curated re-exports for downstream consumers.
pub use band::WifiBand;
pub use error::{ModelError, Result as ModelResult};
pub use events::{ClientEvent, FailureReason};
pub use ids::{ClientId, IfaceName};
pub use native::{
    BucketSettings, NativePnoSettings, NativeScanSettings, ScanCapabilities,
};
pub use results::{InformationElement, ScanData, ScanResult};
pub use settings::{
    ClientIdentity, PnoNetwork, PnoSettings, ReportEvents, ScanSettings,
    ScanType, WorkSource,
};
