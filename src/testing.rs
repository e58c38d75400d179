//! Deterministic voices, effects and soundfonts for unit tests.

use crate::{
    audio::{buffer::StereoBufferMut, sample::AudioSample},
    effects::{ChorusParams, ChorusUnit, EffectUnit, ReverbParams, ReverbUnit},
    soundfont::{drum_bank, MemoryPreset, MemorySoundFont, SharedSoundFont, Zone},
    voice::{ModSource, Modulation, NoteContext, Voice, VoiceOutput},
};
use basedrop::{Handle, Shared};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// A voice that outputs its `level` as a constant signal, and finishes one block
/// after being released.
#[derive(Default)]
pub struct ScriptedVoice {
    pub level: f32,
    pub note: Option<NoteContext>,
    pub modulation: Modulation,
    pub last_source: Option<ModSource>,
    pub released: bool,
    reverb_send: f32,
    chorus_send: f32,
}

impl Voice for ScriptedVoice {
    fn set_sample_rate(&mut self, _sample_rate: f32) {}

    fn start(&mut self, zone: &Zone, note: &NoteContext, modulation: &Modulation) {
        self.level = 1.0;
        self.note = Some(*note);
        self.modulation = *modulation;
        self.last_source = None;
        self.released = false;
        self.reverb_send = zone.reverb_send;
        self.chorus_send = zone.chorus_send;
    }

    fn release(&mut self) {
        self.released = true;
    }

    fn kill(&mut self) {
        self.level = 0.0;
        self.note = None;
    }

    fn modulate(&mut self, modulation: &Modulation, source: ModSource) {
        self.modulation = *modulation;
        self.last_source = Some(source);
    }

    fn level(&self) -> f32 {
        self.level
    }

    fn process(&mut self, out: VoiceOutput) -> bool {
        if self.note.is_none() {
            return false;
        }
        let VoiceOutput { dry, reverb, chorus } = out;
        let StereoBufferMut { left, right } = dry;
        for sample in left.iter_mut().chain(right.iter_mut()) {
            *sample += self.level;
        }
        for sample in reverb.iter_mut() {
            *sample += self.level * self.reverb_send;
        }
        for sample in chorus.iter_mut() {
            *sample += self.level * self.chorus_send;
        }
        !self.released
    }
}

/// An effect unit which adds its input unchanged to both output channels.
#[derive(Default)]
pub struct PassThrough {
    pub calls: Arc<AtomicUsize>,
    pub resets: Arc<AtomicUsize>,
}

impl EffectUnit for PassThrough {
    fn set_sample_rate(&mut self, _sample_rate: f32) {}

    fn process_mix(&mut self, input: &[f32], output: StereoBufferMut) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        for (&x, left, right) in itertools::izip!(input, output.left, output.right) {
            *left += x;
            *right += x;
        }
    }

    fn reset(&mut self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }
}

impl ReverbUnit for PassThrough {
    fn set_params(&mut self, _params: &ReverbParams) {}
}

impl ChorusUnit for PassThrough {
    fn set_params(&mut self, _params: &ChorusParams) {}
}

fn silent_sample(handle: &Handle) -> Shared<AudioSample> {
    Shared::new(handle, AudioSample::new(44100, &[0.0; 16]))
}

/// A zone over every key and velocity, with a silent sample rooted at middle C.
pub fn scripted_zone(handle: &Handle) -> Zone {
    Zone::new(silent_sample(handle), 60)
}

/// A soundfont with the presets used across the engine tests:
///
/// * bank 0, program 0: one zone
/// * bank 0, program 1: two layered zones
/// * bank 1, program 0: one zone, only keys 0 to 59
/// * drum bank 0, program 0: a hi-hat group in exclusive class 1 (keys 42, 44 and 46)
pub fn test_font(handle: &Handle, name: &str) -> SharedSoundFont {
    let zone = || scripted_zone(handle);
    let hi_hat = |key: u8| zone().with_keys(key..=key).with_exclusive_class(1);
    MemorySoundFont::new(name)
        .with_preset(MemoryPreset::new(&format!("{name} piano"), 0, 0).with_zone(zone()))
        .with_preset(
            MemoryPreset::new(&format!("{name} layers"), 0, 1)
                .with_zone(zone())
                .with_zone(zone()),
        )
        .with_preset(
            MemoryPreset::new(&format!("{name} bass"), 1, 0)
                .with_zone(zone().with_keys(0..=59)),
        )
        .with_preset(
            MemoryPreset::new(&format!("{name} kit"), drum_bank(0), 0)
                .with_zone(hi_hat(42))
                .with_zone(hi_hat(44))
                .with_zone(hi_hat(46))
                .with_zone(zone().with_keys(36..=36)),
        )
        .into_shared(handle)
}
