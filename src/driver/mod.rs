//! Trait seam for the vendor DAQ interface that owns the physical device,
//! clocking, and buffered sample delivery.

use std::time::Duration;

use crossbeam::channel::Receiver;

use crate::error::Result;

pub mod sim;
pub use sim::SimDriver;

/// Opaque handle to a driver task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskHandle(pub(crate) u32);

/// Sample clock acquisition mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleMode {
    /// Acquire a fixed number of samples per channel and stop
    Finite,
    /// Acquire until the task is stopped
    Continuous,
}

/// Analog input channel configuration for one task.
#[derive(Clone, Debug)]
pub struct ChannelSpec {
    /// Comma-separated physical channel list
    pub physical_channels: String,
    /// Input range lower bound, V
    pub min_volts: f64,
    /// Input range upper bound, V
    pub max_volts: f64,
}

impl ChannelSpec {
    /// Number of channels in the list
    pub fn channel_count(&self) -> usize {
        self.physical_channels
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .count()
    }
}

/// Asynchronous event delivered by the driver to its subscriber.
///
/// These replace the vendor-style every-N-samples and done callbacks with a
/// channel-fed consumer loop: the driver pushes, the run loop drains.
#[derive(Clone, Debug)]
pub enum Notification {
    /// A batch of `samples` per-channel samples is ready to read
    BatchReady { samples: usize },
    /// The acquisition finished on its own, cleanly or otherwise
    Done { result: std::result::Result<(), String> },
}

/// Object-safe driver seam from the perspective of the run loop.
///
/// Calls mirror the vendor surface the loop consumes: task lifecycle, channel
/// and clock configuration, batch subscription, and buffered reads. The
/// delivering side may run on its own thread; the contract is that only one
/// notification is acted on at a time by the single consumer of the
/// subscription channel.
pub trait Driver: Send {
    /// Create a named acquisition task
    fn create_task(&mut self, name: &str) -> Result<TaskHandle>;

    /// Configure the analog input channels for a task
    fn configure_channels(&mut self, task: TaskHandle, spec: &ChannelSpec) -> Result<()>;

    /// Configure the sample clock rate, acquisition mode, and per-channel
    /// buffer depth
    fn configure_clock(
        &mut self,
        task: TaskHandle,
        rate_hz: f64,
        mode: SampleMode,
        samples_per_channel: usize,
    ) -> Result<()>;

    /// Subscribe to batch-ready and done events, delivered every
    /// `batch_size` per-channel samples
    fn subscribe(&mut self, task: TaskHandle, batch_size: usize) -> Result<Receiver<Notification>>;

    /// Start the acquisition
    fn start(&mut self, task: TaskHandle) -> Result<()>;

    /// Stop the acquisition; safe to call on a task that never started
    fn stop(&mut self, task: TaskHandle);

    /// Release the task and its resources
    fn clear(&mut self, task: TaskHandle);

    /// Read `samples_per_channel` buffered samples for every channel into
    /// `out`, interleaved by scan number, blocking up to `timeout`.
    /// Returns the per-channel sample count actually read.
    fn read_batch(
        &mut self,
        task: TaskHandle,
        samples_per_channel: usize,
        timeout: Duration,
        out: &mut [f64],
    ) -> Result<usize>;

    /// Extended text for the most recent driver error
    fn last_error_text(&self) -> String;
}
