//! The bounded, sorted, frame-indexed event queue

use std::sync::Arc;

use tambour_core::Instrument;

use super::event::{EventKind, SeqEvent};

/// Insertion failed: the queue is at capacity. The event is dropped; the
/// caller records it out of band and the cycle continues.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("event queue full")]
pub struct QueueFull;

const NIL: u32 = u32::MAX;

#[derive(Debug)]
struct Slot {
    event: Option<SeqEvent>,
    next: u32,
}

/// A bounded FIFO of [`SeqEvent`]s, sorted by frame, stable on ties.
///
/// Storage is a pre-allocated slot arena threaded by two index lists: the
/// sorted event list and the free list. Nothing allocates after
/// construction, so every operation is safe inside the audio callback.
///
/// The queue carries the instrument `queued` discipline: a successful
/// insert counts one reference on the event's instrument, and the queue
/// releases it when the event is consumed, removed or cleared.
#[derive(Debug)]
pub struct EventQueue {
    slots: Vec<Slot>,
    head: u32,
    free_head: u32,
    len: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0 && capacity < NIL as usize);
        let mut slots = Vec::with_capacity(capacity);
        for i in 0..capacity {
            let next = if i + 1 < capacity { (i + 1) as u32 } else { NIL };
            slots.push(Slot { event: None, next });
        }
        Self {
            slots,
            head: NIL,
            free_head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of events with `frame < before_frame`.
    pub fn len_before(&self, before_frame: u32) -> usize {
        self.iter().take_while(|ev| ev.frame < before_frame).count()
    }

    fn alloc(&mut self) -> Option<u32> {
        if self.free_head == NIL {
            return None;
        }
        let slot = self.free_head;
        self.free_head = self.slots[slot as usize].next;
        Some(slot)
    }

    fn release(&mut self, slot: u32) {
        let s = &mut self.slots[slot as usize];
        if let Some(ev) = s.event.take() {
            if let Some(instr) = ev.instrument() {
                instr.dequeue();
            }
        }
        s.next = self.free_head;
        self.free_head = slot;
        self.len -= 1;
    }

    /// Insert an event, keeping the list sorted by frame with insertion
    /// order as the tie-breaker. Counts a reference on the event's
    /// instrument.
    pub fn insert(&mut self, event: SeqEvent) -> Result<(), QueueFull> {
        let Some(slot) = self.alloc() else {
            return Err(QueueFull);
        };
        if let Some(instr) = event.instrument() {
            instr.enqueue();
        }
        let frame = event.frame;
        self.slots[slot as usize].event = Some(event);

        // Insert after every queued event with frame <= ours.
        if self.head == NIL || frame < self.frame_at(self.head) {
            self.slots[slot as usize].next = self.head;
            self.head = slot;
        } else {
            let mut cur = self.head;
            loop {
                let next = self.slots[cur as usize].next;
                if next == NIL || frame < self.frame_at(next) {
                    self.slots[slot as usize].next = next;
                    self.slots[cur as usize].next = slot;
                    break;
                }
                cur = next;
            }
        }
        self.len += 1;
        Ok(())
    }

    fn frame_at(&self, slot: u32) -> u32 {
        self.slots[slot as usize]
            .event
            .as_ref()
            .expect("linked slot holds an event")
            .frame
    }

    /// Insert a note-on and, when a length is given, its paired note-off at
    /// `event.frame + length`.
    ///
    /// Note-offs for the same instrument already queued between the pair
    /// are canceled, unless a queued note-on for that instrument follows
    /// them before the new note-off time (that note-off then belongs to the
    /// interrupting note). A note-off at exactly the new off frame is
    /// replaced.
    pub fn insert_note(
        &mut self,
        event: SeqEvent,
        length_frames: Option<u32>,
    ) -> Result<(), QueueFull> {
        debug_assert_eq!(event.kind, EventKind::NoteOn);
        let Some(length) = length_frames else {
            return self.insert(event);
        };
        let on_frame = event.frame;
        let off_frame = on_frame.saturating_add(length);
        let instrument = event.instrument().cloned();

        if let Some(ref instr) = instrument {
            self.cancel_note_offs(instr, on_frame, off_frame);
        }

        let instrument_index = event.instrument_index;
        let off_note = event.note.clone();
        self.insert(event)?;
        if let Some(note) = off_note {
            self.insert(SeqEvent::note_off(off_frame, instrument_index, note))?;
        }
        Ok(())
    }

    /// Drop note-offs for `instrument` in `[on_frame, off_frame]` that are
    /// not claimed by a following queued note-on before `off_frame`.
    fn cancel_note_offs(&mut self, instrument: &Arc<Instrument>, on_frame: u32, off_frame: u32) {
        let mut prev = NIL;
        let mut cur = self.head;
        while cur != NIL {
            let next = self.slots[cur as usize].next;
            let frame = self.frame_at(cur);
            if frame > off_frame {
                break;
            }
            let is_target = {
                let ev = self.slots[cur as usize].event.as_ref().unwrap();
                ev.kind == EventKind::NoteOff
                    && frame >= on_frame
                    && ev.instrument().is_some_and(|i| Arc::ptr_eq(i, instrument))
            };
            if is_target && !self.has_note_on_between(instrument, frame, off_frame) {
                if prev == NIL {
                    self.head = next;
                } else {
                    self.slots[prev as usize].next = next;
                }
                self.release(cur);
            } else {
                prev = cur;
            }
            cur = next;
        }
    }

    fn has_note_on_between(&self, instrument: &Arc<Instrument>, after: u32, before: u32) -> bool {
        self.iter().any(|ev| {
            ev.kind == EventKind::NoteOn
                && ev.frame > after
                && ev.frame < before
                && ev.instrument().is_some_and(|i| Arc::ptr_eq(i, instrument))
        })
    }

    /// Remove the first queued event matching `event` (see
    /// [`SeqEvent::matches`]). Returns whether one was removed.
    pub fn remove(&mut self, event: &SeqEvent) -> bool {
        let mut prev = NIL;
        let mut cur = self.head;
        while cur != NIL {
            let next = self.slots[cur as usize].next;
            let found = self.slots[cur as usize]
                .event
                .as_ref()
                .is_some_and(|ev| ev.matches(event));
            if found {
                if prev == NIL {
                    self.head = next;
                } else {
                    self.slots[prev as usize].next = next;
                }
                self.release(cur);
                return true;
            }
            prev = cur;
            cur = next;
        }
        false
    }

    /// Drop every event with `frame < nframes` (the cycle has played them)
    /// and rebase the survivors by `-nframes`.
    pub fn consume(&mut self, nframes: u32) {
        while self.head != NIL && self.frame_at(self.head) < nframes {
            let head = self.head;
            self.head = self.slots[head as usize].next;
            self.release(head);
        }
        let mut cur = self.head;
        while cur != NIL {
            let slot = &mut self.slots[cur as usize];
            if let Some(ev) = slot.event.as_mut() {
                ev.frame -= nframes;
            }
            cur = slot.next;
        }
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        while self.head != NIL {
            let head = self.head;
            self.head = self.slots[head as usize].next;
            self.release(head);
        }
    }

    /// All queued events in frame order.
    pub fn iter(&self) -> EventIter<'_> {
        EventIter { queue: self, cur: self.head }
    }

    /// Read-only view of the events a sink should handle this cycle:
    /// exactly those with `frame < nframes`, in order.
    pub fn events_before(&self, nframes: u32) -> impl Iterator<Item = &SeqEvent> {
        self.iter().take_while(move |ev| ev.frame < nframes)
    }
}

pub struct EventIter<'a> {
    queue: &'a EventQueue,
    cur: u32,
}

impl<'a> Iterator for EventIter<'a> {
    type Item = &'a SeqEvent;

    fn next(&mut self) -> Option<&'a SeqEvent> {
        if self.cur == NIL {
            return None;
        }
        let slot = &self.queue.slots[self.cur as usize];
        self.cur = slot.next;
        slot.event.as_ref()
    }
}
