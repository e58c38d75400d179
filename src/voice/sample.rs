use super::{envelope::AdsrEnvelope, ModSource, Modulation, NoteContext, Voice, VoiceOutput};
use crate::{
    audio::{
        buffer::StereoBufferMut,
        interpolate::{window4, CubicInterpolator, Interpolator},
        sample::AudioSample,
    },
    soundfont::{LoopMode, Zone},
    util::{pan_gains, ratio_from_cents, scale_from_gain, scale_from_velocity},
};
use basedrop::Shared;
use itertools::izip;

/// Plays a zone's sample with cubic interpolation, looping and a volume envelope.
pub struct SampleVoice {
    /// The sample rate of the audio output.
    sample_rate: f32,
    /// Released once the voice finishes, so the sample can be collected.
    sample: Option<Shared<AudioSample>>,
    envelope: AdsrEnvelope,
    /// Current play position of the sample, in samples.
    position: f64,
    /// Pitch of the note relative to the zone's root key, in cents.
    pitch: f64,
    /// Amount the position advances per output sample.
    step: f64,
    loop_mode: LoopMode,
    loop_start: usize,
    loop_end: usize,
    released: bool,
    /// Scaling from velocity and zone attenuation.
    amp: f32,
    zone_pan: f32,
    zone_reverb: f32,
    zone_chorus: f32,
    /// Left and right output gains.
    gains: (f32, f32),
    reverb: f32,
    chorus: f32,
    modulation: Modulation,
}

impl Default for SampleVoice {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleVoice {
    pub fn new() -> Self {
        Self {
            sample_rate: 44100.0,
            sample: None,
            envelope: AdsrEnvelope::default(),
            position: 0.0,
            pitch: 0.0,
            step: 1.0,
            loop_mode: LoopMode::NoLoop,
            loop_start: 0,
            loop_end: 0,
            released: false,
            amp: 0.0,
            zone_pan: 0.0,
            zone_reverb: 0.0,
            zone_chorus: 0.0,
            gains: (0.0, 0.0),
            reverb: 0.0,
            chorus: 0.0,
            modulation: Modulation::default(),
        }
    }

    fn update_step(&mut self) {
        let Some(sample) = &self.sample else {
            return;
        };
        let rate = sample.sample_rate() as f64 / self.sample_rate as f64;
        self.step = ratio_from_cents(self.pitch + self.modulation.pitch_bend as f64) * rate;
    }

    fn update_gains(&mut self) {
        let (left, right) = pan_gains(self.zone_pan + self.modulation.pan);
        self.gains = (left * self.modulation.gain, right * self.modulation.gain);
        self.reverb = (self.zone_reverb + self.modulation.reverb_send).clamp(0.0, 1.0)
            * self.modulation.gain;
        self.chorus = (self.zone_chorus + self.modulation.chorus_send).clamp(0.0, 1.0)
            * self.modulation.gain;
    }
}

impl Voice for SampleVoice {
    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.envelope.set_sample_rate(sample_rate);
        self.update_step();
    }

    fn start(&mut self, zone: &Zone, note: &NoteContext, modulation: &Modulation) {
        self.sample = Some(zone.sample.clone());
        self.envelope.set_params(zone.envelope);
        self.envelope.trigger();
        self.position = 0.0;
        self.pitch = note.pitch - 100.0 * zone.root_key as f64 + zone.fine_tune as f64;
        self.loop_mode = zone.loop_mode;
        self.loop_start = zone.loop_start;
        self.loop_end = zone.loop_end;
        self.released = false;
        self.amp = scale_from_velocity(note.velocity) * scale_from_gain(-zone.attenuation);
        self.zone_pan = zone.pan;
        self.zone_reverb = zone.reverb_send;
        self.zone_chorus = zone.chorus_send;
        self.modulation = *modulation;
        self.update_gains();
        self.update_step();
    }

    fn release(&mut self) {
        self.released = true;
        self.envelope.release();
    }

    fn kill(&mut self) {
        self.envelope.kill();
        self.sample = None;
    }

    fn modulate(&mut self, modulation: &Modulation, source: ModSource) {
        self.modulation = *modulation;
        match source {
            ModSource::PitchBend => self.update_step(),
            ModSource::ChannelPressure => {}
            ModSource::Controller(_) | ModSource::All => {
                self.update_gains();
                self.update_step();
            }
        }
    }

    fn level(&self) -> f32 {
        self.envelope.level() * self.amp
    }

    fn process(&mut self, out: VoiceOutput) -> bool {
        let Some(sample) = &self.sample else {
            return false;
        };
        let data = sample.data();
        let looping = match self.loop_mode {
            LoopMode::NoLoop => false,
            LoopMode::Continuous => true,
            LoopMode::UntilRelease => !self.released,
        } && self.loop_end > self.loop_start;
        let wrap = looping.then_some((self.loop_start, self.loop_end));
        let loop_len = self.loop_end.saturating_sub(self.loop_start) as f64;

        let VoiceOutput { dry, reverb, chorus } = out;
        let StereoBufferMut { left, right } = dry;
        let mut finished = false;
        for (left, right, reverb, chorus) in izip!(left, right, reverb, chorus) {
            if !looping && self.position >= data.len() as f64 {
                finished = true;
                break;
            }
            let idx = self.position as usize;
            let t = (self.position - idx as f64) as f32;
            let value = CubicInterpolator::interpolate(t, &window4(data, idx, wrap));
            let value = value * self.envelope.process() * self.amp;
            *left += value * self.gains.0;
            *right += value * self.gains.1;
            *reverb += value * self.reverb;
            *chorus += value * self.chorus;

            self.position += self.step;
            if looping && self.position >= self.loop_end as f64 {
                self.position -= loop_len;
            }
            if !self.envelope.active() {
                finished = true;
                break;
            }
        }

        if finished {
            self.sample = None;
        }
        !finished
    }
}
