//! The per-cycle orchestrator: inputs, then sinks, then consume

use tambour_core::TransportPosition;

use crate::sampler::Sampler;
use crate::seq::{EventQueue, GuiInput, MidiInput, SeqInput, SeqOutput, SongInput};

/// One registered event source. The built-in inputs keep their concrete
/// types so the engine can drive them (song swaps, grid changes) without
/// downcasting; anything else plugs in as `Custom`.
pub enum InputStage {
    Song(SongInput),
    Midi(MidiInput),
    Gui(GuiInput),
    Custom(Box<dyn SeqInput>),
}

impl InputStage {
    fn process(&mut self, queue: &mut EventQueue, pos: &TransportPosition, nframes: u32) {
        match self {
            Self::Song(input) => input.process(queue, pos, nframes),
            Self::Midi(input) => input.process(queue, pos, nframes),
            Self::Gui(input) => input.process(queue, pos, nframes),
            Self::Custom(input) => input.process(queue, pos, nframes),
        }
    }
}

/// One registered event sink.
pub enum OutputStage {
    Sampler(Sampler),
    Custom(Box<dyn SeqOutput>),
}

impl OutputStage {
    fn process(&mut self, queue: &EventQueue, pos: &TransportPosition, nframes: u32) {
        match self {
            Self::Sampler(output) => output.process(queue, pos, nframes),
            Self::Custom(output) => output.process(queue, pos, nframes),
        }
    }
}

/// Runs one audio cycle: every input writes its events (registration
/// order), every sink reads the `frame < nframes` view, then the played
/// prefix is consumed. Registration changes happen only between cycles,
/// applied by the engine's command pump.
pub struct Sequencer {
    queue: EventQueue,
    inputs: Vec<InputStage>,
    outputs: Vec<OutputStage>,
}

impl Sequencer {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue: EventQueue::new(queue_capacity),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn process(&mut self, pos: &TransportPosition, nframes: u32) {
        for input in &mut self.inputs {
            input.process(&mut self.queue, pos, nframes);
        }
        for output in &mut self.outputs {
            output.process(&self.queue, pos, nframes);
        }
        self.queue.consume(nframes);
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut EventQueue {
        &mut self.queue
    }

    /// Register an input; inputs run in registration order.
    pub fn add_input(&mut self, stage: InputStage) -> usize {
        self.inputs.push(stage);
        self.inputs.len() - 1
    }

    pub fn remove_input(&mut self, index: usize) -> Option<InputStage> {
        if index < self.inputs.len() {
            return Some(self.inputs.remove(index));
        }
        None
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn add_output(&mut self, stage: OutputStage) -> usize {
        self.outputs.push(stage);
        self.outputs.len() - 1
    }

    pub fn remove_output(&mut self, index: usize) -> Option<OutputStage> {
        if index < self.outputs.len() {
            return Some(self.outputs.remove(index));
        }
        None
    }

    pub fn song_input_mut(&mut self) -> Option<&mut SongInput> {
        self.inputs.iter_mut().find_map(|stage| match stage {
            InputStage::Song(input) => Some(input),
            _ => None,
        })
    }

    pub fn midi_input_mut(&mut self) -> Option<&mut MidiInput> {
        self.inputs.iter_mut().find_map(|stage| match stage {
            InputStage::Midi(input) => Some(input),
            _ => None,
        })
    }

    pub fn gui_input_mut(&mut self) -> Option<&mut GuiInput> {
        self.inputs.iter_mut().find_map(|stage| match stage {
            InputStage::Gui(input) => Some(input),
            _ => None,
        })
    }

    pub fn sampler(&self) -> Option<&Sampler> {
        self.outputs.iter().find_map(|stage| match stage {
            OutputStage::Sampler(sampler) => Some(sampler),
            _ => None,
        })
    }

    pub fn sampler_mut(&mut self) -> Option<&mut Sampler> {
        self.outputs.iter_mut().find_map(|stage| match stage {
            OutputStage::Sampler(sampler) => Some(sampler),
            _ => None,
        })
    }
}
