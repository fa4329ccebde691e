//! One live sample playback instance

use std::sync::Arc;

use tambour_core::{Adsr, Instrument, InstrumentLayer, Note, Sample};

use crate::backend::MixBuffer;

#[inline(always)]
fn lerp(a: f32, b: f32, f: f32) -> f32 {
    a * (1.0 - f) + b * f
}

/// A sounding note: playhead, envelope and filter state plus the note's
/// frozen parameters.
///
/// Voices are allocated by the sampler on note-on and retired when the
/// envelope goes idle or the sample runs out. The referenced instrument's
/// `queued` counter keeps the instrument alive for the voice's lifetime.
#[derive(Debug)]
pub struct Voice {
    note: Note,
    instrument: Arc<Instrument>,
    instrument_index: u32,
    layer_index: usize,
    sample: Sample,
    layer_gain: f32,
    layer_pitch: f32,
    adsr: Adsr,
    /// Playhead in sample frames, fractional when resampling.
    sample_position: f64,
    /// Frames into the current cycle before the voice starts sounding.
    silence_offset: u32,
    /// Frame within the current cycle at which to release, if scheduled.
    release_offset: Option<u32>,
    // Resonant low-pass state, one band-pass and one low-pass accumulator
    // per channel.
    bp_l: f32,
    bp_r: f32,
    lp_l: f32,
    lp_r: f32,
}

impl Voice {
    /// Spawn a voice for `note` using the given layer, starting `frame`
    /// frames into the current cycle.
    pub fn start(
        note: Note,
        instrument_index: u32,
        layer_index: usize,
        layer: &InstrumentLayer,
        frame: u32,
    ) -> Self {
        let instrument = note.instrument().clone();
        let adsr = instrument.adsr();
        Self {
            instrument,
            instrument_index,
            layer_index,
            sample: layer.sample().clone(),
            layer_gain: layer.gain(),
            layer_pitch: layer.pitch(),
            adsr,
            note,
            sample_position: 0.0,
            silence_offset: frame,
            release_offset: None,
            bp_l: 0.0,
            bp_r: 0.0,
            lp_l: 0.0,
            lp_r: 0.0,
        }
    }

    pub fn instrument(&self) -> &Arc<Instrument> {
        &self.instrument
    }

    pub fn instrument_index(&self) -> u32 {
        self.instrument_index
    }

    /// Which velocity layer this voice plays.
    pub fn layer_index(&self) -> usize {
        self.layer_index
    }

    pub fn note(&self) -> &Note {
        &self.note
    }

    pub fn adsr(&self) -> &Adsr {
        &self.adsr
    }

    /// Schedule a release at `frame`, keeping an earlier one if already set.
    pub fn schedule_release(&mut self, frame: u32) {
        self.release_offset = Some(self.release_offset.map_or(frame, |f| f.min(frame)));
    }

    pub fn release_offset(&self) -> Option<u32> {
        self.release_offset
    }

    fn gains(&self) -> (f32, f32) {
        if self.instrument.is_muted() {
            return (0.0, 0.0);
        }
        let common = self.note.velocity()
            * self.layer_gain
            * self.instrument.gain()
            * self.instrument.volume()
            * 2.0; // makeup for the note's 0.5 max-pan convention
        (
            common * self.note.pan_l() * self.instrument.pan_l(),
            common * self.note.pan_r() * self.instrument.pan_r(),
        )
    }

    /// Render into the mix buffers for one cycle. Returns true when the
    /// voice is finished and should be retired.
    pub fn render(
        &mut self,
        nframes: u32,
        frame_rate: u32,
        main: &mut MixBuffer,
        mut track: Option<&mut MixBuffer>,
    ) -> bool {
        let len = self.sample.len();
        if len == 0 || self.sample_position >= len as f64 {
            return true;
        }
        if self.silence_offset >= nframes {
            // Events are cycle-relative, so this shouldn't happen; a stale
            // offset must not index past the buffers regardless.
            self.silence_offset = 0;
            return false;
        }

        let total_pitch = self.note.total_pitch() + self.layer_pitch;
        let (gain_l, gain_r) = self.gains();
        let use_filter = self.instrument.is_filter_active();
        let cutoff = self.instrument.filter_cutoff();
        let resonance = self.instrument.filter_resonance();
        let sample = self.sample.clone();
        let data_l = sample.data_l();
        let data_r = sample.data_r();

        let span = (nframes - self.silence_offset) as usize;
        let start = self.silence_offset as usize;
        let mut peak_l = 0.0f32;
        let mut peak_r = 0.0f32;
        let mut finished;

        if total_pitch == 0.0 && sample.sample_rate() == frame_rate {
            // Integer-step fast path.
            let remaining = len - self.sample_position as usize;
            finished = remaining <= span;
            let count = remaining.min(span);
            let mut pos = self.sample_position as usize;

            for i in start..start + count {
                if self.check_release(i as u32) {
                    finished = true;
                }
                let mut v_l = data_l[pos];
                let mut v_r = data_r[pos];
                let env = self.adsr.step(1.0);
                v_l *= env;
                v_r *= env;
                if use_filter {
                    (v_l, v_r) = self.filter(v_l, v_r, cutoff, resonance);
                }
                if let Some(track) = track.as_deref_mut() {
                    track.add(i, v_l * gain_l, v_r * gain_r);
                }
                let out_l = v_l * gain_l;
                let out_r = v_r * gain_r;
                peak_l = peak_l.max(out_l.abs());
                peak_r = peak_r.max(out_r.abs());
                main.add(i, out_l, out_r);
                pos += 1;
            }
            self.sample_position += count as f64;
        } else {
            // Resample with linear interpolation.
            let step = 2f64.powf(total_pitch as f64 / 12.0)
                * (sample.sample_rate() as f64 / frame_rate as f64);
            let remaining = ((len as f64 - self.sample_position) / step) as usize;
            finished = remaining <= span;
            let count = remaining.min(span);
            let mut pos = self.sample_position;

            for i in start..start + count {
                if self.check_release(i as u32) {
                    finished = true;
                }
                let ipos = pos as usize;
                let frac = (pos - ipos as f64) as f32;
                let (mut v_l, mut v_r) = if ipos + 1 >= len {
                    // The last sample interpolates toward silence.
                    (lerp(data_l[len - 1], 0.0, frac), lerp(data_r[len - 1], 0.0, frac))
                } else {
                    (
                        lerp(data_l[ipos], data_l[ipos + 1], frac),
                        lerp(data_r[ipos], data_r[ipos + 1], frac),
                    )
                };
                let env = self.adsr.step(step as f32);
                v_l *= env;
                v_r *= env;
                if use_filter {
                    (v_l, v_r) = self.filter(v_l, v_r, cutoff, resonance);
                }
                if let Some(track) = track.as_deref_mut() {
                    track.add(i, v_l * gain_l, v_r * gain_r);
                }
                let out_l = v_l * gain_l;
                let out_r = v_r * gain_r;
                peak_l = peak_l.max(out_l.abs());
                peak_r = peak_r.max(out_r.abs());
                main.add(i, out_l, out_r);
                pos += step;
            }
            self.sample_position = pos;
        }

        self.silence_offset = 0;
        self.instrument.update_peaks(peak_l, peak_r);
        if self.adsr.is_idle() {
            finished = true;
        }
        finished
    }

    /// Trigger the scheduled release once the render reaches its frame.
    /// True when the envelope reports idle.
    fn check_release(&mut self, frame: u32) -> bool {
        match self.release_offset {
            Some(release) if frame >= release => self.adsr.release() == 0.0,
            _ => false,
        }
    }

    #[inline(always)]
    fn filter(&mut self, v_l: f32, v_r: f32, cutoff: f32, resonance: f32) -> (f32, f32) {
        self.bp_l = resonance * self.bp_l + cutoff * (v_l - self.lp_l);
        self.lp_l += cutoff * self.bp_l;
        self.bp_r = resonance * self.bp_r + cutoff * (v_r - self.lp_r);
        self.lp_r += cutoff * self.bp_r;
        (self.lp_l, self.lp_r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tambour_core::{Adsr, Instrument, InstrumentLayer};

    fn voice_for(sample: Sample, frame: u32) -> Voice {
        let mut instr = Instrument::new(0, "test", Adsr::default());
        instr.set_layer(0, InstrumentLayer::new(sample)).unwrap();
        let instr = Arc::new(instr);
        let note = Note::new(instr.clone());
        let (slot, layer) = instr.layer_for_velocity(1.0).unwrap();
        Voice::start(note, 0, slot, layer, frame)
    }

    #[test]
    fn unity_chain_reproduces_the_sample() {
        let data = vec![0.5, 0.25, -0.25, -0.5];
        let mut voice = voice_for(Sample::mono(data.clone(), 48_000), 0);
        let mut main = MixBuffer::new(16);
        let finished = voice.render(16, 48_000, &mut main, None);
        assert!(finished);
        assert_eq!(&main.left()[..4], &data[..]);
        assert_eq!(&main.right()[..4], &data[..]);
        assert_eq!(&main.left()[4..], &[0.0; 12]);
    }

    #[test]
    fn silence_offset_delays_the_start() {
        let mut voice = voice_for(Sample::mono(vec![1.0, 1.0], 48_000), 3);
        let mut main = MixBuffer::new(8);
        let finished = voice.render(8, 48_000, &mut main, None);
        assert!(finished);
        assert_eq!(main.left(), &[0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn one_frame_sample_renders_once_and_retires() {
        let mut voice = voice_for(Sample::mono(vec![0.7], 48_000), 0);
        let mut main = MixBuffer::new(4);
        assert!(voice.render(4, 48_000, &mut main, None));
        assert_eq!(main.left()[0], 0.7);
        assert_eq!(main.left()[1], 0.0);
    }

    #[test]
    fn voice_spans_cycles_until_sample_ends() {
        let mut voice = voice_for(Sample::mono(vec![0.5; 300], 48_000), 100);
        let mut main = MixBuffer::new(256);
        // Cycle A: frames 100..256 play sample frames 0..156.
        assert!(!voice.render(256, 48_000, &mut main, None));
        assert_eq!(main.left()[99], 0.0);
        assert_eq!(main.left()[100], 0.5);
        assert_eq!(main.left()[255], 0.5);
        // Cycle B: remaining 144 frames finish the sample.
        main.clear(256);
        assert!(voice.render(256, 48_000, &mut main, None));
        assert_eq!(main.left()[0], 0.5);
        assert_eq!(main.left()[143], 0.5);
        assert_eq!(main.left()[144], 0.0);
    }

    #[test]
    fn octave_up_reads_every_other_frame() {
        let data: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let mut instr = Instrument::new(0, "test", Adsr::default());
        instr
            .set_layer(0, InstrumentLayer::new(Sample::mono(data, 48_000)))
            .unwrap();
        let instr = Arc::new(instr);
        let mut note = Note::new(instr.clone());
        note.set_key_octave(tambour_core::NoteKey::C, 1); // +12 semitones
        let (slot, layer) = instr.layer_for_velocity(1.0).unwrap();
        let mut voice = Voice::start(note, 0, slot, layer, 0);

        let mut main = MixBuffer::new(8);
        voice.render(8, 48_000, &mut main, None);
        // Step 2.0: samples 0, 2, 4 at full interpolation accuracy.
        assert_eq!(main.left()[0], 0.0);
        assert_eq!(main.left()[1], 2.0);
        assert_eq!(main.left()[2], 4.0);
    }

    #[test]
    fn release_at_frame_enters_release_state() {
        let mut instr = Instrument::new(0, "test", Adsr::default());
        instr.set_adsr(&Adsr::new(0.0, 0.0, 1.0, 4.0));
        instr
            .set_layer(0, InstrumentLayer::new(Sample::mono(vec![1.0; 64], 48_000)))
            .unwrap();
        let instr = Arc::new(instr);
        let note = Note::new(instr.clone());
        let (slot, layer) = instr.layer_for_velocity(1.0).unwrap();
        let mut voice = Voice::start(note, 0, slot, layer, 0);
        voice.schedule_release(4);

        let mut main = MixBuffer::new(16);
        let finished = voice.render(16, 48_000, &mut main, None);
        // Full level before the release frame, ramp after, retired once the
        // envelope empties.
        assert_eq!(main.left()[3], 1.0);
        assert!(main.left()[5] < 1.0);
        assert_eq!(main.left()[9], 0.0);
        assert!(finished);
    }

    #[test]
    fn earlier_release_wins() {
        let mut voice = voice_for(Sample::mono(vec![1.0; 8], 48_000), 0);
        voice.schedule_release(6);
        voice.schedule_release(2);
        assert_eq!(voice.release_offset(), Some(2));
        voice.schedule_release(4);
        assert_eq!(voice.release_offset(), Some(2));
    }

    #[test]
    fn muted_instrument_renders_silence_but_advances() {
        let mut voice = voice_for(Sample::mono(vec![1.0; 4], 48_000), 0);
        voice.instrument().set_muted(true);
        let mut main = MixBuffer::new(8);
        let finished = voice.render(8, 48_000, &mut main, None);
        assert!(finished);
        assert_eq!(main.left(), &[0.0; 8]);
    }

    #[test]
    fn track_buffer_receives_the_voice() {
        let mut voice = voice_for(Sample::mono(vec![0.5; 2], 48_000), 0);
        let mut main = MixBuffer::new(4);
        let mut track = MixBuffer::new(4);
        voice.render(4, 48_000, &mut main, Some(&mut track));
        assert_eq!(track.left()[0], 0.5);
        assert_eq!(main.left()[0], 0.5);
    }
}
