//! Append-only plain-text data target in the vendor example's row format.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::thread::{JoinHandle, spawn};

use crossbeam::channel::{Sender, unbounded};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::acquisition::context::AcquisitionCtx;
use crate::batch::BatchBuffer;
use crate::error::{Error, Result};

use super::{Dispatcher, batch_text};

/// Suffix appended to the run name to form the output file name
const FILE_SUFFIX: &str = ".txt";

/// A plain-text data target that appends one line per slot to
/// `op_dir/op_name.txt`, creating the file if absent and never truncating
/// or rewriting it, within a run or across repeated runs against the same
/// name.
///
/// Writes to disk on a separate thread so the acquisition loop is never
/// blocked on file I/O; the single worker also serializes all file access,
/// so batches land in the file in consume order.
#[derive(Serialize, Deserialize, Default)]
pub struct TextDispatcher {
    #[serde(skip)]
    persist_rails: usize,

    #[serde(skip)]
    worker: Option<WorkerHandle>,
}

impl TextDispatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[typetag::serde]
impl Dispatcher for TextDispatcher {
    fn init(&mut self, ctx: &AcquisitionCtx) -> Result<()> {
        // Shut down any existing worker by dropping its tx handle
        self.worker = None;
        self.persist_rails = ctx.persist_rails;

        let path = ctx.op_dir.join(format!("{}{FILE_SUFFIX}", ctx.op_name));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| Error::FileOpen {
                path: path.clone(),
                source,
            })?;

        info!("Appending rail data to {path:?}");

        let (tx, rx) = unbounded::<String>();
        let mut writer = BufWriter::new(file);
        let thread = spawn(move || {
            for chunk in rx.iter() {
                if let Err(e) = writer.write_all(chunk.as_bytes()) {
                    error!("Text sink write failed: {e}");
                    return;
                }
            }
            // Channel disconnected; flush what we have
            if let Err(e) = writer.flush() {
                error!("Text sink flush failed: {e}");
            }
        });

        self.worker = Some(WorkerHandle { tx, thread });
        Ok(())
    }

    fn consume(&mut self, batch: &BatchBuffer) -> Result<()> {
        let Some(worker) = &self.worker else {
            return Err(Error::Config(
                "text dispatcher must be initialized before consuming data".into(),
            ));
        };

        worker
            .tx
            .send(batch_text(batch, self.persist_rails))
            .map_err(|_| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "text sink worker exited",
                ))
            })
    }

    fn terminate(&mut self) -> Result<()> {
        if let Some(WorkerHandle { tx, thread }) = self.worker.take() {
            // Dropping the sender disconnects the worker, which flushes and exits
            drop(tx);
            thread
                .join()
                .map_err(|_| Error::Config("text sink worker panicked".into()))?;
        }
        Ok(())
    }
}

struct WorkerHandle {
    tx: Sender<String>,
    thread: JoinHandle<()>,
}
