//! Backend contracts: what the core expects from audio and MIDI drivers

use crossbeam_channel::Sender;

use crate::seq::MidiMessage;

/// Per-cycle output buffers lent by the audio backend for the duration of
/// one `process` call.
pub struct OutputBuffers<'a> {
    pub main_l: &'a mut [f32],
    pub main_r: &'a mut [f32],
}

impl<'a> OutputBuffers<'a> {
    pub fn new(main_l: &'a mut [f32], main_r: &'a mut [f32]) -> Self {
        debug_assert_eq!(main_l.len(), main_r.len());
        Self { main_l, main_r }
    }

    pub fn nframes(&self) -> u32 {
        self.main_l.len() as u32
    }
}

/// The audio driver seam. Concrete drivers (JACK, ALSA, ...) live outside
/// the core; the engine only relies on this contract.
///
/// The callback runs on the driver's realtime thread. `nframes` passed per
/// call is authoritative; `buffer_size` is only an upper bound for
/// preallocation.
pub trait AudioBackend: Send {
    fn sample_rate(&self) -> u32;
    fn buffer_size(&self) -> u32;
    fn set_process_callback(&mut self, callback: Box<dyn FnMut(OutputBuffers<'_>, u32) + Send>);
}

/// The MIDI driver seam: a backend pushes timestamped messages into the
/// engine's ingress queue; the audio thread drains it each cycle.
pub trait MidiBackend: Send {
    fn connect(&mut self, sink: Sender<MidiMessage>);
    fn disconnect(&mut self);
}

/// A driverless [`AudioBackend`] that renders on demand.
///
/// Useful for tests and offline bounce: each [`run`](Self::run) call plays
/// the role of the hardware interrupt, invoking the process callback once
/// per cycle and returning the interleaved result.
pub struct OfflineBackend {
    sample_rate: u32,
    buffer_size: u32,
    callback: Option<Box<dyn FnMut(OutputBuffers<'_>, u32) + Send>>,
}

impl OfflineBackend {
    pub fn new(sample_rate: u32, buffer_size: u32) -> Self {
        Self { sample_rate, buffer_size, callback: None }
    }

    /// Drive `cycles` process cycles, returning the planar output.
    pub fn run(&mut self, cycles: usize) -> (Vec<f32>, Vec<f32>) {
        let n = self.buffer_size as usize;
        let mut out_l = Vec::with_capacity(cycles * n);
        let mut out_r = Vec::with_capacity(cycles * n);
        let mut cycle_l = vec![0.0f32; n];
        let mut cycle_r = vec![0.0f32; n];
        for _ in 0..cycles {
            if let Some(callback) = self.callback.as_mut() {
                cycle_l.fill(0.0);
                cycle_r.fill(0.0);
                let buffers = OutputBuffers::new(&mut cycle_l, &mut cycle_r);
                callback(buffers, self.buffer_size);
            }
            out_l.extend_from_slice(&cycle_l);
            out_r.extend_from_slice(&cycle_r);
        }
        (out_l, out_r)
    }
}

impl AudioBackend for OfflineBackend {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    fn set_process_callback(&mut self, callback: Box<dyn FnMut(OutputBuffers<'_>, u32) + Send>) {
        self.callback = Some(callback);
    }
}

/// Pre-allocated stereo mix storage owned by the sampler.
///
/// Split channel layout so each channel hands out a plain `&[f32]` for the
/// backend copy-out.
#[derive(Debug)]
pub struct MixBuffer {
    left: Vec<f32>,
    right: Vec<f32>,
}

impl MixBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            left: vec![0.0; capacity],
            right: vec![0.0; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.left.len()
    }

    /// Zero the first `n` frames.
    pub fn clear(&mut self, n: usize) {
        let n = n.min(self.left.len());
        self.left[..n].fill(0.0);
        self.right[..n].fill(0.0);
    }

    /// Accumulate a stereo pair at frame `i`.
    #[inline(always)]
    pub fn add(&mut self, i: usize, l: f32, r: f32) {
        self.left[i] += l;
        self.right[i] += r;
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }

    /// Both channels, mutable, without a double borrow.
    pub fn channels_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut self.left, &mut self.right)
    }
}
