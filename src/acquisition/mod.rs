//! Acquisition run loop: drives the DAQ task lifecycle and feeds each
//! delivered batch through reshape, compute, and the data pipeline.

pub mod context;
pub use context::{AcquisitionCtx, RailSpec, TimestampMode};

use std::time::Instant;

use crossbeam::channel::RecvTimeoutError;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::batch::BatchBuffer;
use crate::dispatcher::Dispatcher;
use crate::driver::{ChannelSpec, Driver, Notification, SampleMode, TaskHandle};
use crate::error::{Error, Result};

/// How a run ended when it did not fail outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The wall-clock run duration elapsed
    TimeLimit,
    /// The driver reported the acquisition done, or hung up, before the
    /// time limit
    DriverStopped,
}

/// An acquisition run: context plus data pipeline, applied to a driver.
///
/// The batch buffer and the subscription channel are owned by the loop for
/// the duration of [`Acquisition::run`]; notifications are drained one at a
/// time by this single consumer, so no locking is needed around the buffer.
#[derive(Serialize, Deserialize, Default)]
pub struct Acquisition {
    ctx: AcquisitionCtx,
    dispatchers: Vec<Box<dyn Dispatcher>>,
}

impl Acquisition {
    /// Set up a run with no dispatchers attached yet.
    pub fn new(ctx: AcquisitionCtx) -> Self {
        Self {
            ctx,
            dispatchers: Vec::new(),
        }
    }

    pub fn ctx(&self) -> &AcquisitionCtx {
        &self.ctx
    }

    /// Register a data pipeline dispatcher
    pub fn add_dispatcher(&mut self, dispatcher: Box<dyn Dispatcher>) {
        self.dispatchers.push(dispatcher);
    }

    /// Run the acquisition to completion against the given driver.
    ///
    /// Dispatchers are initialized before any driver interaction so that
    /// file-open failures surface without a task to unwind. Driver failures
    /// at any point stop and clear the task, log the driver's extended error
    /// text, and end the run; there is no partial-batch recovery.
    pub fn run(&mut self, driver: &mut dyn Driver) -> Result<RunOutcome> {
        self.ctx.validate()?;

        info!("Initializing dispatchers");
        for dispatcher in self.dispatchers.iter_mut() {
            dispatcher.init(&self.ctx)?;
        }

        let task = match driver.create_task(&self.ctx.op_name) {
            Ok(task) => task,
            Err(e) => {
                error!("Driver error: {}", driver.last_error_text());
                self.terminate_dispatchers();
                return Err(e);
            }
        };

        let result = self.run_task(driver, task);

        // Single unwind path; stop and clear are safe on a task in any state
        driver.stop(task);
        driver.clear(task);
        self.terminate_dispatchers();

        if let Err(Error::Driver(_)) = &result {
            error!("Driver error: {}", driver.last_error_text());
        }
        result
    }

    fn run_task(&mut self, driver: &mut dyn Driver, task: TaskHandle) -> Result<RunOutcome> {
        let ctx = self.ctx.clone();
        let n_channels = ctx.channel_count();
        let wired_rails = ctx.wired_rails();
        let shunt_ohms = ctx.shunt_ohms();

        driver.configure_channels(
            task,
            &ChannelSpec {
                physical_channels: ctx.physical_channels.clone(),
                min_volts: ctx.min_volts,
                max_volts: ctx.max_volts,
            },
        )?;
        driver.configure_clock(
            task,
            ctx.sample_rate_hz,
            SampleMode::Continuous,
            ctx.batch_size,
        )?;
        let rx = driver.subscribe(task, ctx.batch_size)?;
        driver.start(task)?;
        info!(
            "Acquiring {} channels at {} Hz for {:?}",
            n_channels, ctx.sample_rate_hz, ctx.run_duration
        );

        // Working buffers sized exactly to one batch, allocated once
        let mut raw = vec![0.0_f64; ctx.batch_size * n_channels];
        let mut buffer = BatchBuffer::new(ctx.batch_size, ctx.rails.len());

        let mut sample_index: u64 = 0;
        let mut total_values: u64 = 0;

        let deadline = Instant::now() + ctx.run_duration;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                info!("Reached time limit with {total_values} values acquired");
                return Ok(RunOutcome::TimeLimit);
            }

            match rx.recv_timeout(remaining) {
                Err(RecvTimeoutError::Timeout) => {
                    info!("Reached time limit with {total_values} values acquired");
                    return Ok(RunOutcome::TimeLimit);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Driver hung up without a done event");
                    return Ok(RunOutcome::DriverStopped);
                }
                Ok(Notification::Done { result }) => {
                    return match result {
                        Ok(()) => {
                            info!("Acquisition finished before the time limit");
                            Ok(RunOutcome::DriverStopped)
                        }
                        Err(msg) => Err(Error::Driver(msg)),
                    };
                }
                Ok(Notification::BatchReady { samples }) => {
                    let read = driver.read_batch(task, ctx.batch_size, ctx.read_timeout, &mut raw)?;

                    buffer.reshape(&raw, wired_rails)?;
                    let t0 = match ctx.timestamp_mode {
                        TimestampMode::BatchLocal => 0,
                        TimestampMode::Monotonic => sample_index as i32,
                    };
                    buffer.compute(&shunt_ohms, t0)?;

                    for dispatcher in self.dispatchers.iter_mut() {
                        dispatcher.consume(&buffer)?;
                    }

                    sample_index += read as u64;
                    if read > 0 {
                        total_values += (read * n_channels) as u64;
                        info!(
                            "Acquired {read} of {samples} ready samples per channel, \
                             {total_values} values total"
                        );
                    }
                }
            }
        }
    }

    fn terminate_dispatchers(&mut self) {
        for dispatcher in self.dispatchers.iter_mut() {
            if let Err(e) = dispatcher.terminate() {
                warn!("Dispatcher shutdown failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dispatcher::TextDispatcher;
    use crate::driver::SimDriver;
    use std::time::Duration;

    fn fast_ctx(dir: &std::path::Path, name: &str) -> AcquisitionCtx {
        let mut ctx = AcquisitionCtx::default();
        ctx.op_name = name.to_owned();
        ctx.op_dir = dir.to_owned();
        ctx.physical_channels = "sim/ai0,sim/ai1,sim/ai2,sim/ai3".into();
        ctx.sample_rate_hz = 500.0;
        ctx.batch_size = 50;
        ctx.run_duration = Duration::from_millis(350);
        ctx.read_timeout = Duration::from_secs(2);
        ctx
    }

    #[test]
    fn run_ends_at_time_limit_and_persists_batches() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fast_ctx(dir.path(), "e2e");
        let batch_size = ctx.batch_size;

        let mut acquisition = Acquisition::new(ctx);
        acquisition.add_dispatcher(Box::new(TextDispatcher::new()));

        let mut driver = SimDriver::new();
        let outcome = acquisition.run(&mut driver).unwrap();
        assert_eq!(outcome, RunOutcome::TimeLimit);

        let contents = std::fs::read_to_string(dir.path().join("e2e.txt")).unwrap();
        let n_lines = contents.lines().count();
        assert!(n_lines > 0);
        assert_eq!(n_lines % batch_size, 0);

        // Both wired rails carry a positive differential in the simulator,
        // so every persisted current field is nonzero
        let first = contents.lines().next().unwrap();
        assert_eq!(first.matches(',').count(), 4);
    }

    #[test]
    fn read_fault_cancels_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fast_ctx(dir.path(), "fault");

        let mut acquisition = Acquisition::new(ctx);
        acquisition.add_dispatcher(Box::new(TextDispatcher::new()));

        let mut driver = SimDriver::new().with_fail_after(0);
        let result = acquisition.run(&mut driver);
        assert!(matches!(result, Err(Error::Driver(_))));
        assert!(!driver.last_error_text().is_empty());
    }

    #[test]
    fn invalid_ctx_is_rejected_before_driver_interaction() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = fast_ctx(dir.path(), "invalid");
        ctx.batch_size = 0;

        let mut acquisition = Acquisition::new(ctx);
        let mut driver = SimDriver::new();
        assert!(matches!(
            acquisition.run(&mut driver),
            Err(Error::Config(_))
        ));
        // The driver was never touched
        assert!(driver.last_error_text().is_empty());
    }

    #[test]
    fn test_ser_roundtrip() {
        let mut acquisition = Acquisition::new(AcquisitionCtx::default());
        acquisition.add_dispatcher(Box::new(TextDispatcher::new()));

        let serialized = serde_json::to_string(&acquisition).unwrap();
        let deserialized = serde_json::from_str::<Acquisition>(&serialized).unwrap();
        let reserialized = serde_json::to_string(&deserialized).unwrap();

        assert_eq!(serialized, reserialized);
    }
}
