//! Deferred instrument retirement

use std::sync::Arc;

use tracing::debug;

use tambour_core::Instrument;

/// Holds instruments scheduled for deletion until nothing references them.
///
/// An instrument's `queued` counter tracks outstanding events and live
/// voices; freeing it while either exists would pull sample data out from
/// under the audio thread. A non-RT thread owns the reaper and calls
/// [`sweep`](Self::sweep) periodically; the last `Arc` drops only once the
/// counter reads zero.
#[derive(Default)]
pub struct InstrumentReaper {
    pending: Vec<Arc<Instrument>>,
}

impl InstrumentReaper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an instrument for deletion once it is no longer referenced.
    pub fn schedule(&mut self, instrument: Arc<Instrument>) {
        self.pending.push(instrument);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Free every ripe instrument. Returns how many were reclaimed.
    pub fn sweep(&mut self) -> usize {
        let before = self.pending.len();
        self.pending.retain(|instrument| {
            if instrument.is_queued() {
                return true;
            }
            debug!(instrument = instrument.name(), "reclaiming retired instrument");
            false
        });
        before - self.pending.len()
    }
}
