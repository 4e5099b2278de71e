//! Software-defined driver that generates deterministic voltage waveforms,
//! for running the acquisition loop with hardware out of the loop.

use std::collections::VecDeque;
use std::f64::consts::TAU;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Sender, unbounded};
use tracing::debug;

use crate::error::{Error, Result};

use super::{ChannelSpec, Driver, Notification, SampleMode, TaskHandle};

/// State shared between the driver front end and its generator thread.
struct SimShared {
    running: AtomicBool,
    faulted: AtomicBool,
    queue: Mutex<VecDeque<f64>>,
}

impl SimShared {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            faulted: AtomicBool::new(false),
            queue: Mutex::new(VecDeque::new()),
        }
    }
}

/// Simulated DAQ driver.
///
/// A generator thread produces interleaved per-channel samples at the
/// configured clock rate and pushes a [`Notification::BatchReady`] for every
/// `batch_size` per-channel samples, which the subscriber then collects with
/// [`Driver::read_batch`]. Even channels model supply taps and odd channels
/// sense taps, with a small positive differential so derived rail currents
/// are nonzero.
///
/// Supports a single task at a time, like the vendor example it stands in for.
pub struct SimDriver {
    handle: Option<TaskHandle>,
    next_handle: u32,

    // Task configuration, populated by the configure calls
    channels: usize,
    rate_hz: f64,
    batch_size: usize,
    notify_tx: Option<Sender<Notification>>,

    shared: Arc<SimShared>,
    worker: Option<JoinHandle<()>>,

    /// Inject a fault after this many batches, for exercising the
    /// read-failure path
    fail_after: Option<u64>,

    last_error: String,
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDriver {
    pub fn new() -> Self {
        Self {
            handle: None,
            next_handle: 1,
            channels: 0,
            rate_hz: 0.0,
            batch_size: 0,
            notify_tx: None,
            shared: Arc::new(SimShared::new()),
            worker: None,
            fail_after: None,
            last_error: String::new(),
        }
    }

    /// Inject an acquisition fault after `batches` delivered batches.
    pub fn with_fail_after(mut self, batches: u64) -> Self {
        self.fail_after = Some(batches);
        self
    }

    /// Record and return a driver error, mirroring the vendor pattern of a
    /// retrievable extended error text.
    fn fail(&mut self, msg: impl Into<String>) -> Error {
        let msg = msg.into();
        self.last_error = msg.clone();
        Error::Driver(msg)
    }

    fn ensure(&mut self, task: TaskHandle) -> Result<()> {
        if self.handle == Some(task) {
            Ok(())
        } else {
            Err(self.fail(format!("unknown task handle {}", task.0)))
        }
    }

    /// Deterministic waveform for one channel at per-channel sample index `n`.
    ///
    /// Supply taps (even channels) sit above their paired sense taps
    /// (odd channels) by 30 mV plus a 10 mV ripple, so `v0 - v1 > 0` always.
    fn sample_value(channel: usize, n: u64, rate_hz: f64) -> f64 {
        let t = n as f64 / rate_hz;
        let pair = (channel / 2) as f64;
        let carrier = (TAU * 50.0 * t).sin();
        if channel % 2 == 0 {
            1.5 + 0.2 * pair + 0.05 * carrier
        } else {
            1.47 + 0.2 * pair + 0.04 * carrier
        }
    }
}

impl Driver for SimDriver {
    fn create_task(&mut self, name: &str) -> Result<TaskHandle> {
        if self.handle.is_some() {
            return Err(self.fail("a task already exists on this driver"));
        }
        let handle = TaskHandle(self.next_handle);
        self.next_handle += 1;
        self.handle = Some(handle);
        debug!("Created simulated task `{name}`");
        Ok(handle)
    }

    fn configure_channels(&mut self, task: TaskHandle, spec: &ChannelSpec) -> Result<()> {
        self.ensure(task)?;
        let n = spec.channel_count();
        if n == 0 {
            return Err(self.fail("channel list is empty"));
        }
        if !(spec.min_volts < spec.max_volts) {
            return Err(self.fail(format!(
                "voltage range [{}, {}] is empty",
                spec.min_volts, spec.max_volts
            )));
        }
        self.channels = n;
        Ok(())
    }

    fn configure_clock(
        &mut self,
        task: TaskHandle,
        rate_hz: f64,
        mode: SampleMode,
        _samples_per_channel: usize,
    ) -> Result<()> {
        self.ensure(task)?;
        if !(rate_hz > 0.0) {
            return Err(self.fail(format!("sample rate {rate_hz} is not positive")));
        }
        if mode != SampleMode::Continuous {
            return Err(self.fail("only continuous sampling is simulated"));
        }
        self.rate_hz = rate_hz;
        Ok(())
    }

    fn subscribe(&mut self, task: TaskHandle, batch_size: usize) -> Result<Receiver<Notification>> {
        self.ensure(task)?;
        if batch_size == 0 {
            return Err(self.fail("batch size must be nonzero"));
        }
        let (tx, rx) = unbounded();
        self.batch_size = batch_size;
        self.notify_tx = Some(tx);
        Ok(rx)
    }

    fn start(&mut self, task: TaskHandle) -> Result<()> {
        self.ensure(task)?;
        if self.channels == 0 || self.rate_hz == 0.0 {
            return Err(self.fail("task is not fully configured"));
        }
        let Some(tx) = self.notify_tx.clone() else {
            return Err(self.fail("no batch subscription registered"));
        };
        if self.worker.is_some() {
            return Err(self.fail("task is already started"));
        }

        let shared = self.shared.clone();
        let channels = self.channels;
        let rate_hz = self.rate_hz;
        let batch = self.batch_size;
        let fail_after = self.fail_after;

        shared.running.store(true, Ordering::Release);
        shared.faulted.store(false, Ordering::Release);

        self.worker = Some(thread::spawn(move || {
            let batch_period = Duration::from_secs_f64(batch as f64 / rate_hz);
            let mut n: u64 = 0;
            let mut batches: u64 = 0;

            while shared.running.load(Ordering::Acquire) {
                // Sleep out the batch period in slices so stop() is prompt
                let wake = Instant::now() + batch_period;
                while shared.running.load(Ordering::Acquire) && Instant::now() < wake {
                    thread::sleep(Duration::from_millis(1));
                }
                if !shared.running.load(Ordering::Acquire) {
                    break;
                }

                if fail_after == Some(batches) {
                    shared.faulted.store(true, Ordering::Release);
                    let _ = tx.send(Notification::BatchReady { samples: batch });
                    let _ = tx.send(Notification::Done {
                        result: Err("simulated acquisition fault".to_owned()),
                    });
                    break;
                }

                if let Ok(mut queue) = shared.queue.lock() {
                    for i in 0..batch as u64 {
                        for c in 0..channels {
                            queue.push_back(Self::sample_value(c, n + i, rate_hz));
                        }
                    }
                }
                n += batch as u64;
                batches += 1;

                if tx.send(Notification::BatchReady { samples: batch }).is_err() {
                    // Subscriber hung up
                    break;
                }
            }
        }));

        Ok(())
    }

    fn stop(&mut self, task: TaskHandle) {
        if self.handle == Some(task) {
            self.shared.running.store(false, Ordering::Release);
        }
    }

    fn clear(&mut self, task: TaskHandle) {
        if self.handle != Some(task) {
            return;
        }
        self.shared.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        if let Ok(mut queue) = self.shared.queue.lock() {
            queue.clear();
        }
        self.notify_tx = None;
        self.handle = None;
        self.channels = 0;
        self.rate_hz = 0.0;
        self.batch_size = 0;
    }

    fn read_batch(
        &mut self,
        task: TaskHandle,
        samples_per_channel: usize,
        timeout: Duration,
        out: &mut [f64],
    ) -> Result<usize> {
        self.ensure(task)?;
        let needed = samples_per_channel * self.channels;
        if out.len() < needed {
            return Err(self.fail(format!(
                "read buffer holds {} values but {needed} are required",
                out.len()
            )));
        }

        let deadline = Instant::now() + timeout;
        loop {
            if self.shared.faulted.load(Ordering::Acquire) {
                return Err(self.fail("simulated acquisition fault"));
            }
            {
                let mut queue = self
                    .shared
                    .queue
                    .lock()
                    .map_err(|_| Error::Driver("sample queue lock poisoned".to_owned()))?;
                if queue.len() >= needed {
                    for slot in out[..needed].iter_mut() {
                        // Length checked above
                        if let Some(v) = queue.pop_front() {
                            *slot = v;
                        }
                    }
                    return Ok(samples_per_channel);
                }
            }
            if Instant::now() >= deadline {
                return Err(self.fail(format!(
                    "read of {samples_per_channel} samples per channel timed out after {timeout:?}"
                )));
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn last_error_text(&self) -> String {
        self.last_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(batch: usize, rate_hz: f64) -> (SimDriver, TaskHandle, Receiver<Notification>) {
        let mut driver = SimDriver::new();
        let task = driver.create_task("test").unwrap();
        driver
            .configure_channels(
                task,
                &ChannelSpec {
                    physical_channels: "sim/ai0,sim/ai1,sim/ai2,sim/ai3".into(),
                    min_volts: -2.0,
                    max_volts: 2.0,
                },
            )
            .unwrap();
        driver
            .configure_clock(task, rate_hz, SampleMode::Continuous, batch)
            .unwrap();
        let rx = driver.subscribe(task, batch).unwrap();
        (driver, task, rx)
    }

    #[test]
    fn delivers_interleaved_batches() {
        let (mut driver, task, rx) = configured(10, 1000.0);
        driver.start(task).unwrap();

        let notification = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(notification, Notification::BatchReady { samples: 10 }));

        let mut raw = vec![0.0; 10 * 4];
        let read = driver
            .read_batch(task, 10, Duration::from_secs(5), &mut raw)
            .unwrap();
        assert_eq!(read, 10);

        // Supply tap sits above its paired sense tap in every scan
        for scan in raw.chunks(4) {
            assert!(scan[0] > scan[1]);
            assert!(scan[2] > scan[3]);
        }

        driver.stop(task);
        driver.clear(task);
    }

    #[test]
    fn injected_fault_poisons_reads() {
        let (mut driver, task, rx) = configured(5, 1000.0);
        driver = driver.with_fail_after(0);
        driver.start(task).unwrap();

        // Fault is announced as a batch-ready followed by a done event
        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(first, Notification::BatchReady { .. }));

        let mut raw = vec![0.0; 5 * 4];
        let err = driver
            .read_batch(task, 5, Duration::from_secs(5), &mut raw)
            .unwrap_err();
        assert!(matches!(err, Error::Driver(_)));
        assert!(!driver.last_error_text().is_empty());

        driver.clear(task);
    }

    #[test]
    fn rejects_unknown_handle() {
        let mut driver = SimDriver::new();
        let _task = driver.create_task("test").unwrap();
        let bogus = TaskHandle(99);
        assert!(matches!(
            driver.configure_clock(bogus, 1000.0, SampleMode::Continuous, 10),
            Err(Error::Driver(_))
        ));
    }

    #[test]
    fn single_task_per_driver() {
        let mut driver = SimDriver::new();
        let task = driver.create_task("first").unwrap();
        assert!(driver.create_task("second").is_err());
        driver.clear(task);
        assert!(driver.create_task("third").is_ok());
    }
}
