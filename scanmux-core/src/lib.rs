//! Scan request scheduling core.
//!
//! Accepts single, background and preferred-network (PNO) scan requests from
//! many registered clients, folds compatible requests into shared radio
//! operations, and routes results back to the right subset of requesters.
//! [`scan::ScanCore`] is the synchronous, deterministic state machine;
//! [`scan::runtime::ScanService`] drives it from a tokio task.

pub mod error;
pub mod scan;

pub use error::{Result, ScanError};
pub use scan::ScanCore;
pub use scanmux_model as model;
