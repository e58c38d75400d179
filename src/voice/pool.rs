//! Fixed-capacity voice slots with allocation, stealing and bulk note control.
//!
//! The pool holds twice as many slots as the polyphony limit, so every sounding
//! voice can leave a release tail behind when it is replaced. Only `Playing` and
//! `Sustained` voices count towards the limit. Allocation, in order:
//!
//! 1. If the limit is reached, release the oldest active voice, preferring
//!    sustained voices and never choosing a voice of the note being started.
//! 2. Take the lowest numbered free slot.
//! 3. Otherwise kill the quietest releasing voice (ties go to the oldest note,
//!    then the lowest slot).
//! 4. Otherwise drop the voice.

use super::{ModSource, Modulation, NoteContext, NoteId, Voice, VoiceInfo, VoiceStatus};
use crate::{error::SynthError, soundfont::Zone};
use std::cmp::Ordering;

struct VoiceSlot<V> {
    voice: V,
    status: VoiceStatus,
    note_id: NoteId,
    channel: usize,
    key: u8,
    velocity: u8,
    exclusive_class: u8,
}

impl<V: Voice> VoiceSlot<V> {
    fn release(&mut self) {
        self.voice.release();
        self.status = VoiceStatus::Releasing;
    }

    fn kill(&mut self) {
        self.voice.kill();
        self.status = VoiceStatus::Free;
    }

    /// Sort key for release under polyphony pressure, smallest first.
    fn release_priority(&self) -> (bool, NoteId) {
        (self.status != VoiceStatus::Sustained, self.note_id)
    }

    fn info(&self) -> VoiceInfo {
        VoiceInfo {
            note_id: self.note_id,
            channel: self.channel,
            key: self.key,
            velocity: self.velocity,
            status: self.status,
            exclusive_class: self.exclusive_class,
            level: self.voice.level(),
        }
    }
}

pub struct VoicePool<V> {
    slots: Vec<VoiceSlot<V>>,
    polyphony: usize,
    sample_rate: f32,
}

impl<V: Voice + Default> VoicePool<V> {
    pub fn new(polyphony: usize, sample_rate: f32) -> Self {
        let mut pool = Self {
            slots: Vec::new(),
            polyphony,
            sample_rate,
        };
        pool.grow(2 * polyphony);
        pool
    }

    fn grow(&mut self, capacity: usize) {
        while self.slots.len() < capacity {
            let mut voice = V::default();
            voice.set_sample_rate(self.sample_rate);
            self.slots.push(VoiceSlot {
                voice,
                status: VoiceStatus::Free,
                note_id: NoteId::default(),
                channel: 0,
                key: 0,
                velocity: 0,
                exclusive_class: 0,
            });
        }
    }

    /// Changes the polyphony limit. Slots are added when the limit grows; when it
    /// shrinks below the number of active voices, the oldest are released.
    pub fn set_polyphony(&mut self, polyphony: usize) {
        self.grow(2 * polyphony);
        self.limit_polyphony(polyphony);
    }
}

impl<V: Voice> VoicePool<V> {
    pub fn polyphony(&self) -> usize {
        self.polyphony
    }

    /// Number of pre-allocated slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Largest polyphony the existing slots can hold without allocating.
    pub fn max_polyphony(&self) -> usize {
        self.slots.len() / 2
    }

    /// Changes the polyphony limit within the existing slots, releasing the oldest
    /// excess voices. Never allocates.
    pub fn limit_polyphony(&mut self, polyphony: usize) {
        self.polyphony = polyphony.min(self.max_polyphony());
        let excess = self.active_count().saturating_sub(self.polyphony);
        for _ in 0..excess {
            if let Some(idx) = self.oldest_active(None) {
                self.slots[idx].release();
            }
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        for slot in &mut self.slots {
            slot.voice.set_sample_rate(sample_rate);
        }
    }

    /// Number of voices counted against the polyphony limit.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.status.is_active()).count()
    }

    /// Number of slots holding a voice, including release tails.
    pub fn in_use_count(&self) -> usize {
        self.slots.iter().filter(|s| s.status.is_in_use()).count()
    }

    pub fn voices(&self) -> impl Iterator<Item = VoiceInfo> + '_ {
        self.slots
            .iter()
            .filter(|s| s.status.is_in_use())
            .map(VoiceSlot::info)
    }

    fn oldest_active(&self, exclude: Option<NoteId>) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status.is_active() && Some(s.note_id) != exclude)
            .min_by_key(|(_, s)| s.release_priority())
            .map(|(idx, _)| idx)
    }

    fn quietest_releasing(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status == VoiceStatus::Releasing)
            .min_by(|(a_idx, a), (b_idx, b)| {
                a.voice
                    .level()
                    .partial_cmp(&b.voice.level())
                    .unwrap_or(Ordering::Equal)
                    .then(a.note_id.cmp(&b.note_id))
                    .then(a_idx.cmp(b_idx))
            })
            .map(|(idx, _)| idx)
    }

    /// Finds a slot for a new voice of note `note_id`, stealing if necessary.
    pub fn allocate(&mut self, note_id: NoteId) -> Result<usize, SynthError> {
        if self.active_count() >= self.polyphony {
            match self.oldest_active(Some(note_id)) {
                Some(idx) => {
                    log::trace!("Releasing voice {idx} to stay within polyphony");
                    self.slots[idx].release();
                }
                // Only the new note itself is sounding, and it has used up the limit
                None => return Err(SynthError::VoicesExhausted),
            }
        }

        if let Some(idx) = self.slots.iter().position(|s| s.status == VoiceStatus::Free) {
            return Ok(idx);
        }

        if let Some(idx) = self.quietest_releasing() {
            log::trace!("Stealing releasing voice {idx}");
            self.slots[idx].kill();
            return Ok(idx);
        }

        Err(SynthError::VoicesExhausted)
    }

    /// Starts a voice in a slot returned by [`allocate`](Self::allocate).
    pub fn start(&mut self, idx: usize, zone: &Zone, note: &NoteContext, modulation: &Modulation) {
        let slot = &mut self.slots[idx];
        slot.voice.start(zone, note, modulation);
        slot.status = VoiceStatus::Playing;
        slot.note_id = note.note_id;
        slot.channel = note.channel;
        slot.key = note.key;
        slot.velocity = note.velocity;
        slot.exclusive_class = zone.exclusive_class;
    }

    /// Releases the active voices for `key` on `channel`, ahead of a retrigger.
    pub fn release_voice_on_same_note(&mut self, channel: usize, key: u8) {
        for slot in &mut self.slots {
            if slot.status.is_active() && slot.channel == channel && slot.key == key {
                slot.release();
            }
        }
    }

    /// Kills voices on `channel` in exclusive class `class` that belong to other notes.
    pub fn kill_by_exclusive_class(&mut self, channel: usize, class: u8, note_id: NoteId) {
        if class == 0 {
            return;
        }
        for slot in &mut self.slots {
            if slot.status.is_sounding()
                && slot.channel == channel
                && slot.exclusive_class == class
                && slot.note_id != note_id
            {
                slot.kill();
            }
        }
    }

    pub fn kill_voice(&mut self, idx: usize) {
        if let Some(slot) = self.slots.get_mut(idx) {
            if slot.status.is_in_use() {
                slot.kill();
            }
        }
    }

    /// Handles a key release. Held voices become sustained while the pedal is down.
    /// Returns the number of voices affected.
    pub fn note_off(&mut self, channel: usize, key: u8, sustain: bool) -> usize {
        self.release_where(sustain, |s| s.channel == channel && s.key == key)
    }

    /// Handles a key release for one specific note.
    pub fn note_off_id(&mut self, note_id: NoteId, sustain: bool) -> usize {
        self.release_where(sustain, |s| s.note_id == note_id)
    }

    fn release_where(&mut self, sustain: bool, f: impl Fn(&VoiceSlot<V>) -> bool) -> usize {
        let mut count = 0;
        for slot in &mut self.slots {
            if slot.status == VoiceStatus::Playing && f(slot) {
                if sustain {
                    slot.status = VoiceStatus::Sustained;
                } else {
                    slot.release();
                }
                count += 1;
            }
        }
        count
    }

    /// Releases every active voice on `channel`, ignoring the sustain pedal.
    pub fn all_notes_off(&mut self, channel: usize) {
        for slot in &mut self.slots {
            if slot.status.is_active() && slot.channel == channel {
                slot.release();
            }
        }
    }

    /// Kills every voice on `channel`.
    pub fn all_sounds_off(&mut self, channel: usize) {
        for slot in &mut self.slots {
            if slot.status.is_in_use() && slot.channel == channel {
                slot.kill();
            }
        }
    }

    /// Kills every voice.
    pub fn kill_all(&mut self) {
        for slot in &mut self.slots {
            if slot.status.is_in_use() {
                slot.kill();
            }
        }
    }

    /// Releases the voices on `channel` that were held by the sustain pedal.
    pub fn damp_voices(&mut self, channel: usize) {
        for slot in &mut self.slots {
            if slot.status == VoiceStatus::Sustained && slot.channel == channel {
                slot.release();
            }
        }
    }

    pub fn modulate_voices(&mut self, channel: usize, modulation: &Modulation, source: ModSource) {
        for slot in &mut self.slots {
            if slot.status.is_sounding() && slot.channel == channel {
                slot.voice.modulate(modulation, source);
            }
        }
    }

    pub fn modulate_voices_all(&mut self, channel: usize, modulation: &Modulation) {
        self.modulate_voices(channel, modulation, ModSource::All);
    }

    /// Renders every sounding voice through `f`, which is given the voice's channel.
    /// Voices that stop are marked finished but keep their slot until
    /// [`reclaim_finished`](Self::reclaim_finished).
    pub fn process(&mut self, mut f: impl FnMut(usize, &mut V) -> bool) {
        for slot in &mut self.slots {
            if slot.status.is_sounding() && !f(slot.channel, &mut slot.voice) {
                slot.status = VoiceStatus::Finished;
            }
        }
    }

    /// The voices in use, in slot order.
    #[cfg(test)]
    pub(crate) fn voice_states(&self) -> impl Iterator<Item = &V> + '_ {
        self.slots
            .iter()
            .filter(|s| s.status.is_in_use())
            .map(|s| &s.voice)
    }

    /// Frees the slots of voices that finished during the last block.
    pub fn reclaim_finished(&mut self) -> usize {
        let mut count = 0;
        for slot in &mut self.slots {
            if slot.status == VoiceStatus::Finished {
                slot.status = VoiceStatus::Free;
                count += 1;
            }
        }
        count
    }
}
