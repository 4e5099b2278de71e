//! Dispatchers send acquired rail data to an outside consumer,
//! usually a file or display.

mod text;
pub use text::TextDispatcher;

use crate::acquisition::context::AcquisitionCtx;
use crate::batch::{BatchBuffer, Slot};
use crate::error::Result;

/// A data pipeline plugin that receives computed rail data from the
/// acquisition loop one batch at a time.
#[typetag::serde(tag = "type")]
pub trait Dispatcher: Send + Sync {
    /// Set up the dispatcher at the start of a run
    fn init(&mut self, ctx: &AcquisitionCtx) -> Result<()>;

    /// Ingest one batch of computed slots
    fn consume(&mut self, batch: &BatchBuffer) -> Result<()>;

    /// Shut down the dispatcher, flushing any buffered output,
    /// and reset internal state for the next run
    fn terminate(&mut self) -> Result<()>;
}

/// Format one slot as a text line: for each of the first `persist_rails`
/// rails, supply voltage, current, and power as six-decimal fields with the
/// vendor example's space padding, comma-separated within a rail and
/// concatenated across rails, newline-terminated.
pub fn slot_row(stringbuf: &mut String, slot: &Slot, persist_rails: usize) {
    stringbuf.clear();
    for rail in slot.rails.iter().take(persist_rails) {
        stringbuf.push_str(&format!(
            "  {:.6},   {:.6},   {:.6}",
            rail.v0, rail.current, rail.power
        ));
    }
    stringbuf.push('\n');
}

/// Format a whole batch as one append-ready text chunk, one line per slot.
pub fn batch_text(batch: &BatchBuffer, persist_rails: usize) -> String {
    // A rail field group is ~40 bytes; reserve enough to avoid regrowth
    let mut out = String::with_capacity(batch.batch_size() * (persist_rails * 44 + 1));
    let mut row = String::new();
    for slot in batch.slots() {
        slot_row(&mut row, slot, persist_rails);
        out.push_str(&row);
    }
    out
}
