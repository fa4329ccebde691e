//! Instruments: shared, read-mostly voice sources

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use crate::adsr::Adsr;
use crate::error::{CoreError, Result};
use crate::sample::Sample;

/// Maximum number of velocity layers per instrument.
pub const MAX_LAYERS: usize = 16;

pub type InstrumentId = u32;

/// An `f32` cell writable from the UI thread while the audio thread reads.
///
/// Loads and stores are relaxed; a reader may observe a value one cycle
/// stale, which the engine tolerates for all instrument parameters.
#[derive(Debug, Default)]
pub struct AtomicF32(std::sync::atomic::AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(std::sync::atomic::AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Store `value` if it exceeds the current contents. Racing writers
    /// may lose an update; the peak meters this serves tolerate that.
    pub fn store_max(&self, value: f32) {
        if value > self.load() {
            self.store(value);
        }
    }
}

/// One velocity-ranged sample layer.
///
/// A layer sounds for notes whose velocity falls inside
/// `[start_velocity, end_velocity]`.
#[derive(Debug)]
pub struct InstrumentLayer {
    sample: Sample,
    start_velocity: f32,
    end_velocity: f32,
    gain: AtomicF32,
    pitch: AtomicF32,
}

impl InstrumentLayer {
    /// A layer covering the full velocity range.
    pub fn new(sample: Sample) -> Self {
        Self {
            sample,
            start_velocity: 0.0,
            end_velocity: 1.0,
            gain: AtomicF32::new(1.0),
            pitch: AtomicF32::new(0.0),
        }
    }

    pub fn with_velocity_range(sample: Sample, start: f32, end: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&start) || !(0.0..=1.0).contains(&end) || start > end {
            return Err(CoreError::InvalidVelocityRange(start, end));
        }
        let mut layer = Self::new(sample);
        layer.start_velocity = start;
        layer.end_velocity = end;
        Ok(layer)
    }

    pub fn matches(&self, velocity: f32) -> bool {
        velocity >= self.start_velocity && velocity <= self.end_velocity
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn gain(&self) -> f32 {
        self.gain.load()
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.max(0.0));
    }

    pub fn pitch(&self) -> f32 {
        self.pitch.load()
    }

    pub fn set_pitch(&self, pitch: f32) {
        self.pitch.store(pitch);
    }
}

/// A drum instrument: parameters plus up to [`MAX_LAYERS`] sample layers.
///
/// Instruments are owned by the song and shared read-only with every voice
/// and queued event that references them. Scalar parameters live in atomic
/// cells so the UI can adjust them while the audio thread renders. The
/// `queued` counter tracks outstanding events and live voices; an
/// instrument may only be destroyed once it reaches zero (see the engine's
/// reaper).
#[derive(Debug)]
pub struct Instrument {
    id: InstrumentId,
    name: String,
    layers: [Option<InstrumentLayer>; MAX_LAYERS],

    gain: AtomicF32,
    volume: AtomicF32,
    pan_l: AtomicF32,
    pan_r: AtomicF32,
    muted: AtomicBool,

    filter_active: AtomicBool,
    filter_cutoff: AtomicF32,
    filter_resonance: AtomicF32,

    random_pitch_factor: AtomicF32,
    mute_group: AtomicI32,
    stop_notes: AtomicBool,

    adsr_attack: AtomicF32,
    adsr_decay: AtomicF32,
    adsr_sustain: AtomicF32,
    adsr_release: AtomicF32,

    queued: AtomicI32,
    peak_l: AtomicF32,
    peak_r: AtomicF32,
}

impl Instrument {
    pub fn new(id: InstrumentId, name: impl Into<String>, adsr: Adsr) -> Self {
        Self {
            id,
            name: name.into(),
            layers: Default::default(),
            gain: AtomicF32::new(1.0),
            volume: AtomicF32::new(1.0),
            pan_l: AtomicF32::new(1.0),
            pan_r: AtomicF32::new(1.0),
            muted: AtomicBool::new(false),
            filter_active: AtomicBool::new(false),
            filter_cutoff: AtomicF32::new(1.0),
            filter_resonance: AtomicF32::new(0.0),
            random_pitch_factor: AtomicF32::new(0.0),
            mute_group: AtomicI32::new(-1),
            stop_notes: AtomicBool::new(false),
            adsr_attack: AtomicF32::new(adsr.attack),
            adsr_decay: AtomicF32::new(adsr.decay),
            adsr_sustain: AtomicF32::new(adsr.sustain),
            adsr_release: AtomicF32::new(adsr.release),
            queued: AtomicI32::new(0),
            peak_l: AtomicF32::new(0.0),
            peak_r: AtomicF32::new(0.0),
        }
    }

    pub fn id(&self) -> InstrumentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ------------------------------------------------------------------
    // Layers
    // ------------------------------------------------------------------

    /// Install a layer. Only callable while the instrument is still
    /// exclusively owned (during kit assembly); the layer table is fixed
    /// once the instrument is shared.
    pub fn set_layer(&mut self, slot: usize, layer: InstrumentLayer) -> Result<()> {
        if slot >= MAX_LAYERS {
            return Err(CoreError::LayerOutOfRange(slot));
        }
        self.layers[slot] = Some(layer);
        Ok(())
    }

    pub fn layer(&self, slot: usize) -> Option<&InstrumentLayer> {
        self.layers.get(slot)?.as_ref()
    }

    /// First layer whose velocity range contains `velocity`, with its slot.
    pub fn layer_for_velocity(&self, velocity: f32) -> Option<(usize, &InstrumentLayer)> {
        self.layers
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.as_ref().map(|l| (i, l)))
            .find(|(_, l)| l.matches(velocity))
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    pub fn gain(&self) -> f32 {
        self.gain.load()
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.max(0.0));
    }

    pub fn volume(&self) -> f32 {
        self.volume.load()
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume.max(0.0));
    }

    pub fn pan_l(&self) -> f32 {
        self.pan_l.load()
    }

    pub fn pan_r(&self) -> f32 {
        self.pan_r.load()
    }

    /// Instrument pan halves range over `[0, 1]`; both at 1 is center.
    /// (Note pan uses the 0.5-max convention; the sampler's x2 makeup gain
    /// compensates for that one.)
    pub fn set_pan(&self, pan_l: f32, pan_r: f32) {
        self.pan_l.store(pan_l.clamp(0.0, 1.0));
        self.pan_r.store(pan_r.clamp(0.0, 1.0));
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn is_filter_active(&self) -> bool {
        self.filter_active.load(Ordering::Relaxed)
    }

    pub fn set_filter_active(&self, active: bool) {
        self.filter_active.store(active, Ordering::Relaxed);
    }

    pub fn filter_cutoff(&self) -> f32 {
        self.filter_cutoff.load()
    }

    pub fn set_filter_cutoff(&self, cutoff: f32) {
        self.filter_cutoff.store(cutoff.clamp(0.0, 1.0));
    }

    pub fn filter_resonance(&self) -> f32 {
        self.filter_resonance.load()
    }

    pub fn set_filter_resonance(&self, resonance: f32) {
        self.filter_resonance.store(resonance.clamp(0.0, 1.0));
    }

    pub fn random_pitch_factor(&self) -> f32 {
        self.random_pitch_factor.load()
    }

    pub fn set_random_pitch_factor(&self, factor: f32) {
        self.random_pitch_factor.store(factor.max(0.0));
    }

    /// Mute group id, or -1 for none.
    pub fn mute_group(&self) -> i32 {
        self.mute_group.load(Ordering::Relaxed)
    }

    pub fn set_mute_group(&self, group: i32) {
        self.mute_group.store(group, Ordering::Relaxed);
    }

    /// When set, a new note on this instrument releases its own still
    /// sounding voices first.
    pub fn stops_notes(&self) -> bool {
        self.stop_notes.load(Ordering::Relaxed)
    }

    pub fn set_stop_notes(&self, stop: bool) {
        self.stop_notes.store(stop, Ordering::Relaxed);
    }

    /// Fresh envelope instance from the instrument's template.
    pub fn adsr(&self) -> Adsr {
        Adsr::new(
            self.adsr_attack.load(),
            self.adsr_decay.load(),
            self.adsr_sustain.load(),
            self.adsr_release.load(),
        )
    }

    pub fn set_adsr(&self, adsr: &Adsr) {
        self.adsr_attack.store(adsr.attack);
        self.adsr_decay.store(adsr.decay);
        self.adsr_sustain.store(adsr.sustain);
        self.adsr_release.store(adsr.release);
    }

    // ------------------------------------------------------------------
    // Queued-reference counter
    // ------------------------------------------------------------------

    /// Count one more outstanding reference (a queued event or live voice).
    pub fn enqueue(&self) {
        self.queued.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one outstanding reference.
    pub fn dequeue(&self) {
        let prev = self.queued.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "queued counter underflow");
    }

    pub fn queued(&self) -> i32 {
        self.queued.load(Ordering::Acquire)
    }

    /// True while any queued event or voice still references this
    /// instrument; the reaper must not free it.
    pub fn is_queued(&self) -> bool {
        self.queued() > 0
    }

    // ------------------------------------------------------------------
    // Peak meters
    // ------------------------------------------------------------------

    pub fn update_peaks(&self, peak_l: f32, peak_r: f32) {
        self.peak_l.store_max(peak_l);
        self.peak_r.store_max(peak_r);
    }

    pub fn peaks(&self) -> (f32, f32) {
        (self.peak_l.load(), self.peak_r.load())
    }

    /// The mixer reads and zeroes the meters once per UI frame.
    pub fn reset_peaks(&self) {
        self.peak_l.store(0.0);
        self.peak_r.store(0.0);
    }
}

/// Ordered instrument collection; the position in the list is the
/// instrument index used for events and per-track outputs.
#[derive(Debug, Default, Clone)]
pub struct InstrumentList {
    instruments: Vec<Arc<Instrument>>,
}

impl InstrumentList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, instrument: Arc<Instrument>) -> usize {
        self.instruments.push(instrument);
        self.instruments.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Instrument>> {
        self.instruments.get(index)
    }

    pub fn index_of(&self, id: InstrumentId) -> Option<usize> {
        self.instruments.iter().position(|i| i.id() == id)
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Instrument>> {
        self.instruments.iter()
    }
}
