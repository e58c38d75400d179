use crate::{audio::buffer::StereoBufferMut, soundfont::Zone};

pub mod envelope;
pub mod pool;
mod sample;

pub use sample::SampleVoice;

/// Identifies every voice started by a single note-on.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NoteId(pub u64);

/// Lifecycle of a voice slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VoiceStatus {
    /// The slot holds no note.
    Free,
    /// The key is held down.
    Playing,
    /// The key was released while the sustain pedal was down.
    Sustained,
    /// In the release phase of its envelope.
    Releasing,
    /// Stopped producing sound during the current block, awaiting reclamation.
    Finished,
}

impl VoiceStatus {
    /// Whether the voice counts towards the polyphony limit.
    pub fn is_active(self) -> bool {
        matches!(self, VoiceStatus::Playing | VoiceStatus::Sustained)
    }

    pub fn is_in_use(self) -> bool {
        self != VoiceStatus::Free
    }

    /// Whether the voice still needs to be rendered.
    pub fn is_sounding(self) -> bool {
        matches!(
            self,
            VoiceStatus::Playing | VoiceStatus::Sustained | VoiceStatus::Releasing
        )
    }
}

/// The note a voice is started for.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NoteContext {
    pub note_id: NoteId,
    pub channel: usize,
    pub key: u8,
    pub velocity: u8,
    /// Pitch of the key in cents, after applying the channel's tuning.
    pub pitch: f64,
}

/// Channel-level parameters applied on top of a voice's zone.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Modulation {
    /// Linear gain from channel volume and expression.
    pub gain: f32,
    /// Pan offset from -1.0 (left) to 1.0 (right).
    pub pan: f32,
    /// Pitch bend in cents.
    pub pitch_bend: f32,
    /// Amount added to the zone's reverb send.
    pub reverb_send: f32,
    /// Amount added to the zone's chorus send.
    pub chorus_send: f32,
    /// Channel pressure between 0 and 1.
    pub pressure: f32,
}

impl Default for Modulation {
    fn default() -> Self {
        Self {
            gain: 1.0,
            pan: 0.0,
            pitch_bend: 0.0,
            reverb_send: 0.0,
            chorus_send: 0.0,
            pressure: 0.0,
        }
    }
}

/// What caused a modulation update.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ModSource {
    Controller(u8),
    PitchBend,
    ChannelPressure,
    /// Every parameter may have changed.
    All,
}

/// Buffers a voice mixes its output into for one block.
pub struct VoiceOutput<'a> {
    pub dry: StereoBufferMut<'a>,
    pub reverb: &'a mut [f32],
    pub chorus: &'a mut [f32],
}

/// A sound generator for one zone of one note.
pub trait Voice: Send {
    /// Sets the sample rate.
    fn set_sample_rate(&mut self, sample_rate: f32);

    /// Starts playing `zone` for the given note.
    fn start(&mut self, zone: &Zone, note: &NoteContext, modulation: &Modulation);

    /// Moves the voice into its release phase.
    fn release(&mut self);

    /// Silences the voice immediately.
    fn kill(&mut self);

    /// Applies updated channel parameters without restarting the voice.
    fn modulate(&mut self, modulation: &Modulation, source: ModSource);

    /// Current output amplitude, used to pick stealing victims.
    fn level(&self) -> f32;

    /// Adds one block of audio to the output buffers.
    /// A return value of `false` indicates that the voice has finished
    /// and will not produce any more sound until it is started again.
    fn process(&mut self, out: VoiceOutput) -> bool;
}

/// A snapshot of one voice slot that is in use.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VoiceInfo {
    pub note_id: NoteId,
    pub channel: usize,
    pub key: u8,
    pub velocity: u8,
    pub status: VoiceStatus,
    pub exclusive_class: u8,
    pub level: f32,
}
