//! Information about the current acquisition run
//! that may be used by the run loop's appendages.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One physical power-supply line being monitored: a pair of voltage taps
/// across a series shunt resistor of known value.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RailSpec {
    pub name: String,
    /// Series shunt resistance, Ohm
    pub shunt_ohms: f64,
}

impl RailSpec {
    pub fn new(name: &str, shunt_ohms: f64) -> Self {
        Self {
            name: name.to_owned(),
            shunt_ohms,
        }
    }
}

/// Choice of timestamp base for each batch.
///
/// The observed vendor example resets the slot timestamp to the batch-local
/// index on every batch, losing global ordering across batches. Whether that
/// is intentional is unclear, so both behaviors are available.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub enum TimestampMode {
    /// Restart at 0 for every batch
    #[default]
    BatchLocal,
    /// Accumulate a running sample index across the run
    Monotonic,
}

/// Run context for the acquisition loop and its dispatchers.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[non_exhaustive]
pub struct AcquisitionCtx {
    /// A name for this run, used as the base name of each dispatcher's
    /// file/table/etc and must be compatible with that use
    pub op_name: String,

    /// A directory to place outputs and logs
    pub op_dir: PathBuf,

    /// Comma-separated physical channel list, ordered as consecutive
    /// (supply, sense) tap pairs per rail
    pub physical_channels: String,

    /// Input range lower bound, V
    pub min_volts: f64,

    /// Input range upper bound, V
    pub max_volts: f64,

    /// Per-channel sample clock rate, Hz
    pub sample_rate_hz: f64,

    /// Samples per channel per batch
    pub batch_size: usize,

    /// Monitored rails, in tap-pair order
    pub rails: Vec<RailSpec>,

    /// Number of leading rails written by the text sink.
    /// Independent of the configured rail count; the observed vendor example
    /// defines three rails but only ever writes two.
    pub persist_rails: usize,

    /// Timestamp base behavior for each batch
    pub timestamp_mode: TimestampMode,

    /// Wall-clock run duration limit
    pub run_duration: Duration,

    /// Timeout for a single buffered batch read
    pub read_timeout: Duration,
}

impl Default for AcquisitionCtx {
    fn default() -> Self {
        // Use current time with seconds as op name and the working directory
        // as op dir, replacing characters that would be invalid on Windows.
        let op_name = DateTime::<Utc>::from(SystemTime::now())
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            .replace(":", "");
        Self {
            op_name,
            op_dir: std::fs::canonicalize("./").unwrap_or_default(),
            physical_channels: "dev1/ai15,dev1/ai31,dev1/ai21,dev1/ai4".to_owned(),
            min_volts: -2.0,
            max_volts: 2.0,
            sample_rate_hz: 5000.0,
            batch_size: 5000,
            rails: vec![
                RailSpec::new("cortex_a15", 0.05),
                RailSpec::new("cortex_a7", 0.3),
                RailSpec::new("mem", 0.0025),
            ],
            persist_rails: 2,
            timestamp_mode: TimestampMode::default(),
            run_duration: Duration::from_secs(6),
            read_timeout: Duration::from_secs(10),
        }
    }
}

impl AcquisitionCtx {
    /// Number of physical channels in the configured channel list
    pub fn channel_count(&self) -> usize {
        self.physical_channels
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .count()
    }

    /// Number of rails whose tap pairs are actually wired to channels
    pub fn wired_rails(&self) -> usize {
        self.channel_count() / 2
    }

    /// Shunt resistances in rail order
    pub fn shunt_ohms(&self) -> Vec<f64> {
        self.rails.iter().map(|r| r.shunt_ohms).collect()
    }

    /// Check the context for semantic validity before any driver interaction.
    pub fn validate(&self) -> Result<()> {
        let n_channels = self.channel_count();
        if n_channels == 0 {
            return Err(Error::Config("no physical channels configured".into()));
        }
        if n_channels % 2 != 0 {
            return Err(Error::Config(format!(
                "{n_channels} physical channels cannot form (supply, sense) tap pairs"
            )));
        }
        if self.rails.is_empty() {
            return Err(Error::Config("no rails configured".into()));
        }
        if self.wired_rails() > self.rails.len() {
            return Err(Error::Config(format!(
                "{} wired tap pairs but only {} rails configured",
                self.wired_rails(),
                self.rails.len()
            )));
        }
        if self.persist_rails > self.rails.len() {
            return Err(Error::Config(format!(
                "persist_rails {} exceeds {} configured rails",
                self.persist_rails,
                self.rails.len()
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be nonzero".into()));
        }
        if !(self.sample_rate_hz > 0.0) {
            return Err(Error::Config("sample rate must be positive".into()));
        }
        if self.run_duration.is_zero() {
            return Err(Error::Config("run duration must be nonzero".into()));
        }
        if !(self.min_volts < self.max_volts) {
            return Err(Error::Config(format!(
                "voltage range [{}, {}] is empty",
                self.min_volts, self.max_volts
            )));
        }
        Ok(())
    }
}
