use crate::error::SynthError;

/// Fixed configuration of a synth engine, chosen at construction.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SynthSettings {
    /// Output sample rate in Hz.
    pub sample_rate: f32,
    /// Number of MIDI channels, a multiple of 16.
    pub midi_channels: usize,
    /// Number of stereo output pairs.
    pub audio_channels: usize,
    /// Number of stereo mixing groups that MIDI channels are routed into.
    pub audio_groups: usize,
    /// Number of effect send buffers (reverb and chorus).
    pub effects_channels: usize,
    /// Maximum number of sounding voices.
    pub polyphony: usize,
    /// Master gain applied to every block.
    pub gain: f32,
    /// Number of samples produced by each call to `one_block`.
    pub block_size: usize,
    /// Whether the reverb unit is mixed in.
    pub reverb_active: bool,
    /// Whether the chorus unit is mixed in.
    pub chorus_active: bool,
}

impl Default for SynthSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            midi_channels: 16,
            audio_channels: 1,
            audio_groups: 1,
            effects_channels: 2,
            polyphony: 256,
            gain: 0.2,
            block_size: 64,
            reverb_active: true,
            chorus_active: true,
        }
    }
}

pub const MIN_SAMPLE_RATE: f32 = 8000.0;
pub const MAX_SAMPLE_RATE: f32 = 96000.0;
pub const MAX_GAIN: f32 = 10.0;
pub const MAX_POLYPHONY: usize = 65535;

impl SynthSettings {
    pub fn validate(&self) -> Result<(), SynthError> {
        use SynthError::Configuration;

        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(Configuration("sample rate must be between 8000 and 96000 Hz"));
        }
        if self.midi_channels < 16 || self.midi_channels % 16 != 0 {
            return Err(Configuration("MIDI channel count must be a positive multiple of 16"));
        }
        if self.audio_channels == 0 {
            return Err(Configuration("at least one audio channel is required"));
        }
        if self.audio_groups == 0 {
            return Err(Configuration("at least one audio group is required"));
        }
        if self.effects_channels != 2 {
            return Err(Configuration("exactly two effects channels are supported"));
        }
        if self.polyphony == 0 || self.polyphony > MAX_POLYPHONY {
            return Err(Configuration("polyphony must be between 1 and 65535"));
        }
        if self.block_size == 0 {
            return Err(Configuration("block size must be positive"));
        }
        if !(0.0..=MAX_GAIN).contains(&self.gain) {
            return Err(Configuration("gain must be between 0 and 10"));
        }
        Ok(())
    }

    /// Number of stereo mixing buffers, large enough for every output channel and group.
    pub fn buffer_count(&self) -> usize {
        self.audio_channels.max(self.audio_groups)
    }
}
