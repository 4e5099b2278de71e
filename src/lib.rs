//! Sampling loop and data pipeline for shunt-resistor power rail measurement.
//!
//! Paired analog-input voltage taps are sampled in batches by a [`driver::Driver`],
//! converted to per-rail current and power from the tap differential and a
//! known shunt resistance, and appended as text by the data pipeline.

pub mod acquisition;
pub mod batch;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod logging;

pub use acquisition::{Acquisition, AcquisitionCtx, RailSpec, RunOutcome, TimestampMode};
pub use batch::{BatchBuffer, RailSample, Slot};
pub use dispatcher::{Dispatcher, TextDispatcher};
pub use driver::{Driver, SimDriver};
pub use error::Error;
