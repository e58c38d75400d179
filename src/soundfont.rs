//! Parsed soundfont data as consumed by the engine.
//!
//! File parsing lives elsewhere; a loader hands the engine objects implementing
//! [`SoundFont`] and [`Preset`], wrapped in a [`basedrop::Shared`] so the last
//! reference can be released from the audio thread without freeing there.

use crate::{audio::sample::AudioSample, voice::envelope::EnvelopeParams};
use basedrop::Shared;
use std::ops::RangeInclusive;

pub use memory::{MemoryPreset, MemorySoundFont};
pub use resolver::{PresetRef, PresetResolver, SoundFontId};

mod memory;
mod resolver;

/// High bit of a bank number, set for drum kit presets.
pub const DRUM_INST_MASK: u32 = 0x8000_0000;

/// Returns the bank number with the drum flag set.
pub const fn drum_bank(bank: u32) -> u32 {
    bank | DRUM_INST_MASK
}

/// Returns `true` if the bank number is flagged as a drum kit bank.
pub const fn is_drum_bank(bank: u32) -> bool {
    bank & DRUM_INST_MASK != 0
}

/// A soundfont as shared between the engine, its channels and its voices.
pub type SharedSoundFont = Shared<Box<dyn SoundFont>>;

pub trait SoundFont: Send + Sync {
    fn name(&self) -> &str;

    /// Looks up a preset by its soundfont-local bank and program.
    fn preset(&self, bank: u32, program: u8) -> Option<&dyn Preset>;
}

pub trait Preset: Send + Sync {
    fn name(&self) -> &str;

    fn bank(&self) -> u32;

    fn program(&self) -> u8;

    /// Calls `f` with every zone that should sound for the given key and velocity.
    fn zones(&self, key: u8, velocity: u8, f: &mut dyn FnMut(&Zone));
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoopMode {
    /// Play the sample once to its end.
    NoLoop,
    /// Loop between the loop points for as long as the voice sounds.
    Continuous,
    /// Loop until released, then play on to the end of the sample.
    UntilRelease,
}

/// One layer of an instrument: a sample plus the parameters to play it with.
#[derive(Clone)]
pub struct Zone {
    pub key_range: RangeInclusive<u8>,
    pub velocity_range: RangeInclusive<u8>,
    pub sample: Shared<AudioSample>,
    /// The key at which the sample plays at its recorded pitch.
    pub root_key: u8,
    /// Additional tuning in cents.
    pub fine_tune: f32,
    pub loop_mode: LoopMode,
    /// Loop start, in samples.
    pub loop_start: usize,
    /// Loop end (exclusive), in samples.
    pub loop_end: usize,
    pub envelope: EnvelopeParams,
    /// Attenuation in dB, where positive values are quieter.
    pub attenuation: f32,
    /// Pan from -1.0 (left) to 1.0 (right).
    pub pan: f32,
    /// Send level into the reverb unit, between 0 and 1.
    pub reverb_send: f32,
    /// Send level into the chorus unit, between 0 and 1.
    pub chorus_send: f32,
    /// Voices on the same channel sharing a non-zero class cut each other off.
    pub exclusive_class: u8,
}

impl Zone {
    /// Creates a zone covering every key and velocity, playing `sample` without looping.
    pub fn new(sample: Shared<AudioSample>, root_key: u8) -> Self {
        let len = sample.len();
        Self {
            key_range: 0..=127,
            velocity_range: 0..=127,
            sample,
            root_key,
            fine_tune: 0.0,
            loop_mode: LoopMode::NoLoop,
            loop_start: 0,
            loop_end: len,
            envelope: EnvelopeParams::default(),
            attenuation: 0.0,
            pan: 0.0,
            reverb_send: 0.0,
            chorus_send: 0.0,
            exclusive_class: 0,
        }
    }

    pub fn matches(&self, key: u8, velocity: u8) -> bool {
        self.key_range.contains(&key) && self.velocity_range.contains(&velocity)
    }

    pub fn with_keys(mut self, keys: RangeInclusive<u8>) -> Self {
        self.key_range = keys;
        self
    }

    pub fn with_velocities(mut self, velocities: RangeInclusive<u8>) -> Self {
        self.velocity_range = velocities;
        self
    }

    pub fn with_loop(mut self, mode: LoopMode, start: usize, end: usize) -> Self {
        self.loop_mode = mode;
        self.loop_start = start.min(self.sample.len());
        self.loop_end = end.clamp(self.loop_start, self.sample.len());
        self
    }

    pub fn with_envelope(mut self, envelope: EnvelopeParams) -> Self {
        self.envelope = envelope;
        self
    }

    pub fn with_exclusive_class(mut self, class: u8) -> Self {
        self.exclusive_class = class;
        self
    }

    pub fn with_pan(mut self, pan: f32) -> Self {
        self.pan = pan.clamp(-1.0, 1.0);
        self
    }

    pub fn with_sends(mut self, reverb: f32, chorus: f32) -> Self {
        self.reverb_send = reverb.clamp(0.0, 1.0);
        self.chorus_send = chorus.clamp(0.0, 1.0);
        self
    }

    pub fn with_attenuation(mut self, db: f32) -> Self {
        self.attenuation = db.max(0.0);
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_drum_bank_flag() {
        assert!(!is_drum_bank(0));
        assert!(is_drum_bank(drum_bank(0)));
        assert_eq!(drum_bank(3) & !DRUM_INST_MASK, 3);
    }
}
