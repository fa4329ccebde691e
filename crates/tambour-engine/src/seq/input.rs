//! Sequencer input and output capabilities

use tambour_core::TransportPosition;

use super::queue::EventQueue;

/// A source of sequence events.
///
/// Anything that can write events for the coming cycle: the song walker,
/// MIDI ingress, UI injection. Inputs may insert into the queue; they must
/// not read back other inputs' events.
pub trait SeqInput: Send {
    fn process(&mut self, queue: &mut EventQueue, pos: &TransportPosition, nframes: u32);
}

/// A sink of sequence events.
///
/// Sinks see the read-only view of the queue and should handle exactly the
/// events with `frame < nframes` (via [`EventQueue::events_before`]).
pub trait SeqOutput: Send {
    fn process(&mut self, queue: &EventQueue, pos: &TransportPosition, nframes: u32);
}
