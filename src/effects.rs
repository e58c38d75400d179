//! Lifecycle of the reverb and chorus units.
//!
//! The engine does not implement any effect algorithm itself. Units are supplied
//! through [`ReverbUnit`] and [`ChorusUnit`], fed from mono send buffers, and their
//! stereo returns are mixed into the first output group.

use crate::{audio::buffer::StereoBufferMut, error::SynthError};

pub trait EffectUnit: Send {
    fn set_sample_rate(&mut self, sample_rate: f32);

    /// Processes one block of `input` and adds the result into `output`.
    fn process_mix(&mut self, input: &[f32], output: StereoBufferMut);

    /// Clears any internal state such as delay lines.
    fn reset(&mut self);
}

pub trait ReverbUnit: EffectUnit {
    fn set_params(&mut self, params: &ReverbParams);
}

pub trait ChorusUnit: EffectUnit {
    fn set_params(&mut self, params: &ChorusParams);
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReverbParams {
    /// Room size between 0 and 1.
    pub room_size: f32,
    /// High frequency damping between 0 and 1.
    pub damping: f32,
    /// Stereo width between 0 and 100.
    pub width: f32,
    /// Output level between 0 and 1.
    pub level: f32,
}

pub const REVERB_PRESETS: [ReverbParams; 5] = [
    ReverbParams::new(0.2, 0.0, 0.5, 0.9),
    ReverbParams::new(0.4, 0.2, 0.5, 0.8),
    ReverbParams::new(0.6, 0.4, 0.5, 0.7),
    ReverbParams::new(0.8, 0.7, 0.5, 0.6),
    ReverbParams::new(0.8, 1.0, 0.5, 0.5),
];

impl ReverbParams {
    pub const fn new(room_size: f32, damping: f32, width: f32, level: f32) -> Self {
        Self {
            room_size,
            damping,
            width,
            level,
        }
    }

    pub fn validate(&self) -> Result<(), SynthError> {
        check("reverb room size", self.room_size, 0.0, 1.0)?;
        check("reverb damping", self.damping, 0.0, 1.0)?;
        check("reverb width", self.width, 0.0, 100.0)?;
        check("reverb level", self.level, 0.0, 1.0)
    }
}

impl Default for ReverbParams {
    fn default() -> Self {
        REVERB_PRESETS[0]
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChorusWaveform {
    Sine,
    Triangle,
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChorusParams {
    /// Number of delay lines, up to 99.
    pub voices: u32,
    /// Output level between 0 and 10.
    pub level: f32,
    /// Modulation speed in Hz.
    pub speed: f32,
    /// Modulation depth in milliseconds.
    pub depth: f32,
    pub waveform: ChorusWaveform,
}

impl Default for ChorusParams {
    fn default() -> Self {
        Self {
            voices: 3,
            level: 2.0,
            speed: 0.3,
            depth: 8.0,
            waveform: ChorusWaveform::Sine,
        }
    }
}

impl ChorusParams {
    pub fn validate(&self) -> Result<(), SynthError> {
        check("chorus voices", self.voices as f32, 0.0, 99.0)?;
        check("chorus level", self.level, 0.0, 10.0)?;
        check("chorus speed", self.speed, 0.1, 5.0)?;
        check("chorus depth", self.depth, 0.0, 256.0)
    }
}

fn check(name: &'static str, value: f32, min: f32, max: f32) -> Result<(), SynthError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(SynthError::InvalidParameter {
            name,
            value: value as f64,
        })
    }
}

/// The engine's effect units with their on/off state and parameters.
pub struct Effects {
    reverb: Option<Box<dyn ReverbUnit>>,
    chorus: Option<Box<dyn ChorusUnit>>,
    reverb_active: bool,
    chorus_active: bool,
    reverb_params: ReverbParams,
    chorus_params: ChorusParams,
    sample_rate: f32,
}

impl Effects {
    pub fn new(sample_rate: f32, reverb_active: bool, chorus_active: bool) -> Self {
        Self {
            reverb: None,
            chorus: None,
            reverb_active,
            chorus_active,
            reverb_params: ReverbParams::default(),
            chorus_params: ChorusParams::default(),
            sample_rate,
        }
    }

    /// Installs a reverb unit, configured with the current parameters.
    pub fn set_reverb_unit(&mut self, mut unit: Box<dyn ReverbUnit>) {
        unit.set_sample_rate(self.sample_rate);
        unit.set_params(&self.reverb_params);
        self.reverb = Some(unit);
    }

    pub fn set_chorus_unit(&mut self, mut unit: Box<dyn ChorusUnit>) {
        unit.set_sample_rate(self.sample_rate);
        unit.set_params(&self.chorus_params);
        self.chorus = Some(unit);
    }

    pub fn take_reverb_unit(&mut self) -> Option<Box<dyn ReverbUnit>> {
        self.reverb.take()
    }

    pub fn take_chorus_unit(&mut self) -> Option<Box<dyn ChorusUnit>> {
        self.chorus.take()
    }

    pub fn reverb_active(&self) -> bool {
        self.reverb_active
    }

    pub fn chorus_active(&self) -> bool {
        self.chorus_active
    }

    pub fn set_reverb_active(&mut self, active: bool) {
        self.reverb_active = active;
    }

    pub fn set_chorus_active(&mut self, active: bool) {
        self.chorus_active = active;
    }

    pub fn reverb_params(&self) -> ReverbParams {
        self.reverb_params
    }

    pub fn chorus_params(&self) -> ChorusParams {
        self.chorus_params
    }

    /// Selects one of [`REVERB_PRESETS`]. An unknown preset leaves the reverb unchanged.
    pub fn set_reverb_preset(&mut self, num: usize) -> Result<(), SynthError> {
        let params = REVERB_PRESETS
            .get(num)
            .ok_or(SynthError::ReverbPresetNotFound(num))?;
        self.set_reverb_params(*params)
    }

    pub fn set_reverb_params(&mut self, params: ReverbParams) -> Result<(), SynthError> {
        params.validate()?;
        self.reverb_params = params;
        if let Some(unit) = &mut self.reverb {
            unit.set_params(&params);
        }
        Ok(())
    }

    pub fn set_chorus_params(&mut self, params: ChorusParams) -> Result<(), SynthError> {
        params.validate()?;
        self.chorus_params = params;
        if let Some(unit) = &mut self.chorus {
            unit.set_params(&params);
        }
        Ok(())
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        if let Some(unit) = &mut self.reverb {
            unit.set_sample_rate(sample_rate);
        }
        if let Some(unit) = &mut self.chorus {
            unit.set_sample_rate(sample_rate);
        }
    }

    pub fn reset(&mut self) {
        if let Some(unit) = &mut self.reverb {
            unit.reset();
        }
        if let Some(unit) = &mut self.chorus {
            unit.reset();
        }
    }

    /// Runs the enabled units over their send buffers, adding the returns into `output`.
    pub fn process_mix(
        &mut self,
        reverb_in: &[f32],
        chorus_in: &[f32],
        mut output: StereoBufferMut,
    ) {
        if self.reverb_active {
            if let Some(unit) = &mut self.reverb {
                unit.process_mix(reverb_in, output.as_mut());
            }
        }
        if self.chorus_active {
            if let Some(unit) = &mut self.chorus {
                unit.process_mix(chorus_in, output.as_mut());
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::PassThrough;
    use std::sync::{atomic::Ordering, Arc};

    #[test]
    fn test_reverb_presets() {
        let mut effects = Effects::new(44100.0, true, true);
        effects.set_reverb_preset(3).unwrap();
        assert_eq!(effects.reverb_params(), ReverbParams::new(0.8, 0.7, 0.5, 0.6));
    }

    #[test]
    fn test_unknown_preset_keeps_current_params() {
        let mut effects = Effects::new(44100.0, true, true);
        effects.set_reverb_preset(2).unwrap();
        assert_eq!(effects.set_reverb_preset(5), Err(SynthError::ReverbPresetNotFound(5)));
        assert_eq!(effects.reverb_params(), REVERB_PRESETS[2]);
    }

    #[test]
    fn test_rejects_invalid_params() {
        let mut effects = Effects::new(44100.0, true, true);
        let bad = ReverbParams {
            room_size: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            effects.set_reverb_params(bad),
            Err(SynthError::InvalidParameter { .. })
        ));
        let bad = ChorusParams {
            voices: 100,
            ..Default::default()
        };
        assert!(effects.set_chorus_params(bad).is_err());
        assert_eq!(effects.chorus_params(), ChorusParams::default());
    }

    #[test]
    fn test_inactive_units_are_skipped() {
        let reverb = PassThrough::default();
        let calls = Arc::clone(&reverb.calls);
        let mut effects = Effects::new(44100.0, false, false);
        effects.set_reverb_unit(Box::new(reverb));

        let (mut left, mut right) = ([0.0; 4], [0.0; 4]);
        effects.process_mix(&[1.0; 4], &[1.0; 4], StereoBufferMut::new(&mut left, &mut right));
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert_eq!(left, [0.0; 4]);

        effects.set_reverb_active(true);
        effects.process_mix(&[1.0; 4], &[1.0; 4], StereoBufferMut::new(&mut left, &mut right));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(left, [1.0; 4]);
        assert_eq!(right, [1.0; 4]);
    }
}
