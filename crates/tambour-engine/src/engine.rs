//! The engine: RT core plus its non-RT control surface

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::info;

use tambour_core::{Instrument, Note, Pattern, Song, SongMode, TransportPosition};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineStats, Result};
use crate::sampler::Sampler;
use crate::seq::{
    GuiInput, MidiInput, MidiMessage, MidiNoteMap, SeqEvent, SeqInput, SeqOutput, SongInput,
};
use crate::sequencer::{InputStage, OutputStage, Sequencer};
use crate::transport::{Transport, TransportMaster};

/// Mix buffers are sized for cycles up to this many frames.
pub const MAX_BUFFER_FRAMES: usize = 8192;

/// Per-instrument track buffers allocated when track outputs are enabled.
pub const MAX_TRACK_OUTPUTS: usize = 64;

const SONG_INPUT_SEED: u64 = 0x7a6d_b01d_5eed_0001;

/// Control messages shipped from the handle to the RT thread, applied at
/// the next cycle boundary.
enum Command {
    Start,
    Stop,
    LocateFrame(u64),
    LocateBbt { bar: u32, beat: u32, tick: u32 },
    SetSong(Option<Arc<Song>>),
    SetActivePattern(Option<Arc<Pattern>>),
    SetMetronome { instrument: Option<Arc<Instrument>>, enabled: bool, volume: f32 },
    SetNoteMap(MidiNoteMap),
    SetChannelFilter(Option<u8>),
    SetQuantizeGrid(u32),
    SetMaxNotes(usize),
    SetFrameRate(u32),
    AddInput(Box<dyn SeqInput>),
    RemoveInput(usize),
    AddOutput(Box<dyn SeqOutput>),
    RemoveOutput(usize),
    SetMaster(Box<dyn TransportMaster>),
}

/// Atomic snapshot of the playhead for UI consumption.
#[derive(Debug, Default)]
pub struct PositionMirror {
    frame: AtomicU64,
    bar: AtomicU32,
    beat: AtomicU32,
    tick: AtomicU32,
    rolling: AtomicBool,
}

impl PositionMirror {
    fn update(&self, pos: &TransportPosition) {
        self.frame.store(pos.frame, Ordering::Relaxed);
        self.bar.store(pos.bar, Ordering::Relaxed);
        self.beat.store(pos.beat, Ordering::Relaxed);
        self.tick.store(pos.tick, Ordering::Relaxed);
        self.rolling
            .store(pos.state == tambour_core::TransportState::Rolling, Ordering::Relaxed);
    }

    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Relaxed)
    }

    /// (bar, beat, tick) as of the last completed cycle.
    pub fn bbt(&self) -> (u32, u32, u32) {
        (
            self.bar.load(Ordering::Relaxed),
            self.beat.load(Ordering::Relaxed),
            self.tick.load(Ordering::Relaxed),
        )
    }

    pub fn is_rolling(&self) -> bool {
        self.rolling.load(Ordering::Relaxed)
    }
}

/// The realtime core. Owned by the host and driven from the audio
/// backend's callback; nothing here is a singleton. All control flows in
/// through the paired [`EngineHandle`].
pub struct Engine {
    transport: Transport,
    sequencer: Sequencer,
    commands: Receiver<Command>,
    stats: Arc<EngineStats>,
    mirror: Arc<PositionMirror>,
}

impl Engine {
    /// Build an engine and its control handle.
    pub fn new(config: EngineConfig) -> Result<(Engine, EngineHandle)> {
        config.validate()?;

        let stats = Arc::new(EngineStats::new());
        let mirror = Arc::new(PositionMirror::default());

        let (command_tx, command_rx) = bounded(config.command_queue_depth);
        let (midi_tx, midi_rx) = bounded(config.midi_queue_depth);
        let (gui_tx, gui_input) = GuiInput::new(config.gui_queue_depth, stats.clone());

        let mut sequencer = Sequencer::new(config.queue_capacity);
        let mut song_input = SongInput::new(stats.clone(), SONG_INPUT_SEED);
        song_input.set_metronome_enabled(config.metronome_enabled, config.metronome_volume);
        sequencer.add_input(InputStage::Song(song_input));
        sequencer.add_input(InputStage::Midi(MidiInput::new(midi_rx, stats.clone())));
        sequencer.add_input(InputStage::Gui(gui_input));

        let track_count = if config.track_outputs { MAX_TRACK_OUTPUTS } else { 0 };
        sequencer.add_output(OutputStage::Sampler(Sampler::new(
            config.max_notes,
            MAX_BUFFER_FRAMES,
            track_count,
            stats.clone(),
        )));

        let engine = Engine {
            transport: Transport::new(config.frame_rate),
            sequencer,
            commands: command_rx,
            stats: stats.clone(),
            mirror: mirror.clone(),
        };
        let handle = EngineHandle {
            commands: command_tx,
            gui_tx,
            midi_tx,
            stats,
            mirror,
            song: Mutex::new(None),
            frame_rate: AtomicU32::new(config.frame_rate),
        };
        Ok((engine, handle))
    }

    /// Run one audio cycle into the given output slices. Called from the
    /// backend's realtime callback; never blocks, never fails.
    pub fn process(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        debug_assert_eq!(out_l.len(), out_r.len());
        let nframes = (out_l.len().min(MAX_BUFFER_FRAMES)) as u32;

        self.apply_commands();

        let pos = self.transport.position();
        self.sequencer.process(&pos, nframes);
        self.transport.processed_frames(nframes);

        if let Some(sampler) = self.sequencer.sampler() {
            let (l, r) = sampler.main_out();
            let n = nframes as usize;
            out_l[..n].copy_from_slice(&l[..n]);
            out_r[..n].copy_from_slice(&r[..n]);
        }

        self.mirror.update(&self.transport.position());
        self.stats.record_cycle();
    }

    /// Per-instrument output of the last cycle, when track outputs are on.
    pub fn track_out(&self, index: usize) -> Option<(&[f32], &[f32])> {
        self.sequencer.sampler().and_then(|s| s.track_out(index))
    }

    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    pub fn position(&self) -> TransportPosition {
        self.transport.position()
    }

    fn apply_commands(&mut self) {
        loop {
            let command = match self.commands.try_recv() {
                Ok(command) => command,
                Err(_) => break,
            };
            self.apply(command);
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Start => self.transport.start(),
            Command::Stop => {
                self.transport.stop();
                self.sequencer.queue_mut().clear();
                if let Some(sampler) = self.sequencer.sampler_mut() {
                    sampler.reset();
                }
            }
            Command::LocateFrame(frame) => {
                self.sequencer.queue_mut().clear();
                self.transport.locate_frame(frame);
            }
            Command::LocateBbt { bar, beat, tick } => {
                self.sequencer.queue_mut().clear();
                self.transport.locate_bbt(bar, beat, tick);
            }
            Command::SetSong(song) => {
                self.sequencer.queue_mut().clear();
                if let Some(sampler) = self.sequencer.sampler_mut() {
                    sampler.reset();
                }
                self.transport.set_song(song.clone());
                if let Some(input) = self.sequencer.song_input_mut() {
                    input.set_song(song.clone());
                }
                if let Some(input) = self.sequencer.midi_input_mut() {
                    input.set_song(song);
                }
            }
            Command::SetActivePattern(pattern) => {
                if let Some(input) = self.sequencer.song_input_mut() {
                    input.set_active_pattern(pattern);
                }
            }
            Command::SetMetronome { instrument, enabled, volume } => {
                if let Some(input) = self.sequencer.song_input_mut() {
                    input.set_metronome(instrument);
                    input.set_metronome_enabled(enabled, volume);
                }
            }
            Command::SetNoteMap(map) => {
                if let Some(input) = self.sequencer.midi_input_mut() {
                    input.set_note_map(map);
                }
            }
            Command::SetChannelFilter(channel) => {
                if let Some(input) = self.sequencer.midi_input_mut() {
                    input.set_channel_filter(channel);
                }
            }
            Command::SetQuantizeGrid(ticks) => {
                if let Some(input) = self.sequencer.gui_input_mut() {
                    input.set_grid_ticks(ticks);
                }
            }
            Command::SetMaxNotes(max_notes) => {
                if let Some(sampler) = self.sequencer.sampler_mut() {
                    sampler.set_max_notes(max_notes);
                }
            }
            Command::SetFrameRate(frame_rate) => self.transport.set_frame_rate(frame_rate),
            Command::AddInput(input) => {
                self.sequencer.add_input(InputStage::Custom(input));
            }
            Command::RemoveInput(index) => {
                self.sequencer.remove_input(index);
            }
            Command::AddOutput(output) => {
                self.sequencer.add_output(OutputStage::Custom(output));
            }
            Command::RemoveOutput(index) => {
                self.sequencer.remove_output(index);
            }
            Command::SetMaster(master) => self.transport.set_master(master),
        }
    }
}

/// Non-RT control surface. Clone-free by design: one handle per host,
/// though the ingress senders it exposes may be cloned freely.
///
/// Every mutation is validated here synchronously, then shipped over the
/// bounded command channel and applied by the RT thread between cycles.
pub struct EngineHandle {
    commands: Sender<Command>,
    gui_tx: Sender<SeqEvent>,
    midi_tx: Sender<MidiMessage>,
    stats: Arc<EngineStats>,
    mirror: Arc<PositionMirror>,
    /// Control-plane copy of the loaded song, for validation.
    song: Mutex<Option<Arc<Song>>>,
    frame_rate: AtomicU32,
}

impl EngineHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .try_send(command)
            .map_err(|_| EngineError::CommandQueueFull)
    }

    fn current_song(&self) -> Option<Arc<Song>> {
        self.song.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn start(&self) -> Result<()> {
        info!("transport start");
        self.send(Command::Start)
    }

    pub fn stop(&self) -> Result<()> {
        info!("transport stop");
        self.send(Command::Stop)
    }

    /// Locate to an absolute frame. Rejected past the song end unless the
    /// song loops.
    pub fn locate_frame(&self, frame: u64) -> Result<()> {
        if let Some(song) = self.current_song() {
            if !song.is_loop_enabled() {
                let frame_rate = self.frame_rate.load(Ordering::Relaxed) as f64;
                let fpt = frame_rate * 60.0 / (song.bpm() * song.resolution() as f64);
                let end = (song.tick_count() as f64 * fpt) as u64;
                if frame > end {
                    return Err(EngineError::LocatePastEnd(frame));
                }
            }
        }
        self.send(Command::LocateFrame(frame))
    }

    /// Locate to a bar:beat.tick position.
    pub fn locate_bbt(&self, bar: u32, beat: u32, tick: u32) -> Result<()> {
        if bar == 0 || beat == 0 {
            return Err(EngineError::InvalidBbt { bar, beat, tick });
        }
        if let Some(song) = self.current_song() {
            if tick >= song.resolution() {
                return Err(EngineError::InvalidBbt { bar, beat, tick });
            }
            let beats = (song.ticks_in_bar(bar) / song.resolution()).max(1);
            if beat > beats {
                return Err(EngineError::InvalidBbt { bar, beat, tick });
            }
            if !song.is_loop_enabled() && bar > song.bar_count().max(1) {
                return Err(EngineError::LocatePastEnd(bar as u64));
            }
        }
        self.send(Command::LocateBbt { bar, beat, tick })
    }

    /// Change the tempo of the loaded song. Takes effect next cycle.
    pub fn set_bpm(&self, bpm: f64) -> Result<()> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(EngineError::InvalidBpm(bpm));
        }
        let song = self.current_song().ok_or(EngineError::NoSong)?;
        song.set_bpm(bpm);
        Ok(())
    }

    pub fn set_song(&self, song: Arc<Song>) -> Result<()> {
        info!(song = song.name(), "loading song");
        if let Ok(mut guard) = self.song.lock() {
            *guard = Some(song.clone());
        }
        self.send(Command::SetSong(Some(song)))
    }

    pub fn clear_song(&self) -> Result<()> {
        if let Ok(mut guard) = self.song.lock() {
            *guard = None;
        }
        self.send(Command::SetSong(None))
    }

    /// Select the pattern looped in pattern mode, by index into the song's
    /// pattern list.
    pub fn set_active_pattern(&self, index: usize) -> Result<()> {
        let song = self.current_song().ok_or(EngineError::NoSong)?;
        let pattern = song
            .pattern(index)
            .cloned()
            .ok_or(EngineError::NoSuchPattern(index))?;
        self.send(Command::SetActivePattern(Some(pattern)))
    }

    /// Switch between song-arrangement playback and single-pattern looping.
    pub fn set_song_mode(&self, mode: SongMode) -> Result<()> {
        let song = self.current_song().ok_or(EngineError::NoSong)?;
        song.set_mode(mode);
        Ok(())
    }

    pub fn set_metronome(
        &self,
        instrument: Option<Arc<Instrument>>,
        enabled: bool,
        volume: f32,
    ) -> Result<()> {
        self.send(Command::SetMetronome { instrument, enabled, volume })
    }

    pub fn set_note_map(&self, map: MidiNoteMap) -> Result<()> {
        self.send(Command::SetNoteMap(map))
    }

    /// Restrict triggering to one MIDI channel; `None` accepts all.
    pub fn set_midi_channel_filter(&self, channel: Option<u8>) -> Result<()> {
        if channel.is_some_and(|ch| ch > 15) {
            return Err(EngineError::InvalidConfig(format!(
                "MIDI channel {} outside 0..=15",
                channel.unwrap()
            )));
        }
        self.send(Command::SetChannelFilter(channel))
    }

    /// Quantization grid for GUI-injected events, in ticks; 0 disables.
    pub fn set_quantize_grid(&self, ticks: u32) -> Result<()> {
        self.send(Command::SetQuantizeGrid(ticks))
    }

    pub fn set_max_notes(&self, max_notes: usize) -> Result<()> {
        if max_notes == 0 {
            return Err(EngineError::InvalidConfig("max_notes must be nonzero".into()));
        }
        self.send(Command::SetMaxNotes(max_notes))
    }

    /// Adopt the audio backend's sample rate.
    pub fn set_frame_rate(&self, frame_rate: u32) -> Result<()> {
        if frame_rate == 0 {
            return Err(EngineError::InvalidConfig("frame_rate must be nonzero".into()));
        }
        self.frame_rate.store(frame_rate, Ordering::Relaxed);
        self.send(Command::SetFrameRate(frame_rate))
    }

    pub fn add_input(&self, input: Box<dyn SeqInput>) -> Result<()> {
        self.send(Command::AddInput(input))
    }

    pub fn remove_input(&self, index: usize) -> Result<()> {
        self.send(Command::RemoveInput(index))
    }

    pub fn add_output(&self, output: Box<dyn SeqOutput>) -> Result<()> {
        self.send(Command::AddOutput(output))
    }

    pub fn remove_output(&self, index: usize) -> Result<()> {
        self.send(Command::RemoveOutput(index))
    }

    /// Hand the transport to an external clock master.
    pub fn set_master(&self, master: Box<dyn TransportMaster>) -> Result<()> {
        info!("installing external transport master");
        self.send(Command::SetMaster(master))
    }

    /// Audition an instrument outside the song (sound library preview).
    pub fn note_on_preview(&self, instrument: Arc<Instrument>, velocity: f32) -> Result<()> {
        let mut note = Note::new(instrument);
        note.set_velocity(velocity);
        self.gui_tx
            .try_send(SeqEvent::note_on(0, 0, note))
            .map_err(|_| EngineError::CommandQueueFull)
    }

    pub fn note_off_preview(&self, instrument: Arc<Instrument>) -> Result<()> {
        let note = Note::new(instrument);
        self.gui_tx
            .try_send(SeqEvent::note_off(0, 0, note))
            .map_err(|_| EngineError::CommandQueueFull)
    }

    /// Release everything at the start of the next cycle.
    pub fn panic(&self) -> Result<()> {
        self.gui_tx
            .try_send(SeqEvent::all_off(0))
            .map_err(|_| EngineError::CommandQueueFull)
    }

    /// Sender for UI threads injecting events directly.
    pub fn gui_sender(&self) -> Sender<SeqEvent> {
        self.gui_tx.clone()
    }

    /// Sender a MIDI backend delivers messages into.
    pub fn midi_sender(&self) -> Sender<MidiMessage> {
        self.midi_tx.clone()
    }

    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    /// The backend reports deadline misses here.
    pub fn record_xrun(&self) {
        self.stats.record_xrun();
    }

    /// Playhead snapshot of the last completed cycle.
    pub fn position(&self) -> &Arc<PositionMirror> {
        &self.mirror
    }
}
