//! Fixed-size batch buffer and the voltage-to-power conversion
//! applied to each batch of interleaved samples.

use crate::error::{Error, Result};

/// One rail's measurement at one time slot.
///
/// `current` and `power` are derived values; they are overwritten by
/// [`BatchBuffer::compute`] on every batch and must not be read before it runs.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RailSample {
    /// Supply-side voltage tap
    pub v0: f64,
    /// Sense-side voltage tap
    pub v1: f64,
    /// Shunt current, A
    pub current: f64,
    /// Rail power, W
    pub power: f64,
}

/// One discrete time step of acquisition, holding one reading per monitored rail.
#[derive(Clone, Debug, Default)]
pub struct Slot {
    /// Sequence index; either batch-local or monotonic across the run
    /// depending on the base passed to [`BatchBuffer::compute`]
    pub timestamp: i32,
    pub rails: Vec<RailSample>,
}

/// A bounded, ordered sequence of [`Slot`] sized to one driver batch.
///
/// Allocated once for the life of the run and mutated in place on each batch
/// arrival; the rail count per slot is fixed at construction. The run loop
/// holds exclusive ownership, so no locking is needed around reshape/compute.
#[derive(Clone, Debug)]
pub struct BatchBuffer {
    slots: Vec<Slot>,
    rails_per_slot: usize,
}

impl BatchBuffer {
    /// Allocate a buffer of `batch_size` slots with `rails_per_slot` rails each,
    /// all fields zeroed.
    pub fn new(batch_size: usize, rails_per_slot: usize) -> Self {
        let slot = Slot {
            timestamp: 0,
            rails: vec![RailSample::default(); rails_per_slot],
        };
        Self {
            slots: vec![slot; batch_size],
            rails_per_slot,
        }
    }

    /// Number of slots per batch
    pub fn batch_size(&self) -> usize {
        self.slots.len()
    }

    /// Number of rails per slot
    pub fn rails_per_slot(&self) -> usize {
        self.rails_per_slot
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Copy a flat buffer of interleaved voltage readings into per-slot,
    /// per-rail tap pairs.
    ///
    /// `raw` is ordered as consecutive (v0, v1) pairs per rail, rails
    /// consecutive, slots consecutive: `index = slot*wired_rails*2 + rail*2 + tap`.
    /// Only the first `wired_rails` rails of each slot are populated; any
    /// remaining rails keep their prior tap values. Derived fields are left
    /// untouched and must be recomputed with [`Self::compute`].
    pub fn reshape(&mut self, raw: &[f64], wired_rails: usize) -> Result<()> {
        if wired_rails > self.rails_per_slot {
            return Err(Error::InvalidInput(format!(
                "{wired_rails} wired rails exceeds {} rails per slot",
                self.rails_per_slot
            )));
        }

        let needed = self.slots.len() * wired_rails * 2;
        if raw.len() < needed {
            return Err(Error::InvalidInput(format!(
                "raw sample buffer holds {} values but {needed} are required",
                raw.len()
            )));
        }

        let stride = wired_rails * 2;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            for (j, rail) in slot.rails.iter_mut().take(wired_rails).enumerate() {
                rail.v0 = raw[i * stride + j * 2];
                rail.v1 = raw[i * stride + j * 2 + 1];
            }
        }

        Ok(())
    }

    /// Derive current and power for every slot from the tap voltage differential.
    ///
    /// For each rail `j`: `delta = v0 - v1`. A non-positive delta forces both
    /// derived fields to exactly 0 (no measurable current, not a rounding
    /// artifact); otherwise `current = delta / shunt_ohms[j]` and
    /// `power = v0 * current`. Each slot's timestamp is set to `t0 + index`.
    ///
    /// Pure in-place transform over the buffer; idempotent for unchanged taps.
    pub fn compute(&mut self, shunt_ohms: &[f64], t0: i32) -> Result<()> {
        if shunt_ohms.len() < self.rails_per_slot {
            return Err(Error::InvalidInput(format!(
                "{} shunt resistances provided for {} rails",
                shunt_ohms.len(),
                self.rails_per_slot
            )));
        }

        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.timestamp = t0.wrapping_add(i as i32);
            for (rail, ohms) in slot.rails.iter_mut().zip(shunt_ohms) {
                let delta = rail.v0 - rail.v1;
                if delta <= 0.0 {
                    rail.current = 0.0;
                    rail.power = 0.0;
                } else {
                    rail.current = delta / ohms;
                    rail.power = rail.v0 * rail.current;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(batch_size: usize, rails: usize) -> (BatchBuffer, Vec<f64>) {
        let buf = BatchBuffer::new(batch_size, rails);
        // Distinct values per position so mapping errors are visible
        let raw: Vec<f64> = (0..batch_size * rails * 2).map(|i| i as f64 * 0.5).collect();
        (buf, raw)
    }

    #[test]
    fn reshape_maps_interleaved_pairs() {
        let (mut buf, raw) = filled(3, 2);
        buf.reshape(&raw, 2).unwrap();

        // index = slot*4 + rail*2 + tap, scaled by 0.5
        assert_eq!(buf.slots()[0].rails[0].v0, 0.0);
        assert_eq!(buf.slots()[0].rails[0].v1, 0.5);
        assert_eq!(buf.slots()[0].rails[1].v0, 1.0);
        assert_eq!(buf.slots()[0].rails[1].v1, 1.5);
        assert_eq!(buf.slots()[2].rails[1].v0, 5.0);
        assert_eq!(buf.slots()[2].rails[1].v1, 5.5);

        // Exactly batch_size slots regardless of input length
        assert_eq!(buf.slots().len(), 3);
    }

    #[test]
    fn reshape_rejects_short_input() {
        let mut buf = BatchBuffer::new(5, 2);
        let raw = vec![0.0; 5 * 2 * 2 - 1];
        assert!(matches!(
            buf.reshape(&raw, 2),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn reshape_rejects_excess_wired_rails() {
        let mut buf = BatchBuffer::new(1, 2);
        let raw = vec![0.0; 6];
        assert!(matches!(
            buf.reshape(&raw, 3),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn reshape_leaves_unwired_rails_untouched() {
        let mut buf = BatchBuffer::new(2, 3);
        let raw = vec![1.0; 2 * 2 * 2];
        buf.reshape(&raw, 2).unwrap();
        for slot in buf.slots() {
            assert_eq!(slot.rails[2], RailSample::default());
        }
    }

    #[test]
    fn nonpositive_delta_forces_exact_zero() {
        let mut buf = BatchBuffer::new(1, 3);
        // Equal taps, inverted taps, and a large inverted pair
        let raw = vec![1.0, 1.0, 0.4, 2.0, -1e9, 1e9];
        buf.reshape(&raw, 3).unwrap();
        buf.compute(&[0.05, 0.3, 0.0025], 0).unwrap();

        for rail in &buf.slots()[0].rails {
            assert_eq!(rail.current, 0.0);
            assert_eq!(rail.power, 0.0);
        }
    }

    #[test]
    fn positive_delta_derives_current_and_power() {
        let mut buf = BatchBuffer::new(1, 2);
        let raw = vec![1.0, 0.4, 2.0, 2.5];
        buf.reshape(&raw, 2).unwrap();
        buf.compute(&[0.05, 0.3], 0).unwrap();

        let r0 = buf.slots()[0].rails[0];
        assert_eq!(r0.current, 12.0); // (1.0 - 0.4) / 0.05
        assert_eq!(r0.power, 12.0); // 1.0 * 12.0

        let r1 = buf.slots()[0].rails[1];
        assert_eq!(r1.current, 0.0);
        assert_eq!(r1.power, 0.0);
    }

    #[test]
    fn compute_is_idempotent() {
        let (mut buf, raw) = filled(4, 2);
        buf.reshape(&raw, 2).unwrap();
        buf.compute(&[0.05, 0.3], 0).unwrap();
        let first: Vec<Slot> = buf.slots().to_vec();

        buf.compute(&[0.05, 0.3], 0).unwrap();
        for (a, b) in first.iter().zip(buf.slots()) {
            assert_eq!(a.timestamp, b.timestamp);
            assert_eq!(a.rails, b.rails);
        }
    }

    #[test]
    fn compute_timestamps_follow_base() {
        let (mut buf, raw) = filled(3, 2);
        buf.reshape(&raw, 2).unwrap();

        buf.compute(&[0.05, 0.3], 0).unwrap();
        let local: Vec<i32> = buf.slots().iter().map(|s| s.timestamp).collect();
        assert_eq!(local, vec![0, 1, 2]);

        buf.compute(&[0.05, 0.3], 3).unwrap();
        let global: Vec<i32> = buf.slots().iter().map(|s| s.timestamp).collect();
        assert_eq!(global, vec![3, 4, 5]);
    }

    #[test]
    fn compute_rejects_missing_resistances() {
        let mut buf = BatchBuffer::new(1, 3);
        assert!(matches!(
            buf.compute(&[0.05, 0.3], 0),
            Err(Error::InvalidInput(_))
        ));
    }
}
