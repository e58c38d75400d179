use crate::{
    soundfont::{drum_bank, PresetRef},
    tuning::TuningId,
    util::cents_from_pitch_bend,
    voice::Modulation,
};

pub const BANK_SELECT_MSB: u8 = 0;
pub const DATA_ENTRY_MSB: u8 = 6;
pub const VOLUME: u8 = 7;
pub const PAN: u8 = 10;
pub const EXPRESSION: u8 = 11;
pub const BANK_SELECT_LSB: u8 = 32;
pub const DATA_ENTRY_LSB: u8 = 38;
pub const SUSTAIN: u8 = 64;
pub const REVERB_DEPTH: u8 = 91;
pub const CHORUS_DEPTH: u8 = 93;
pub const RPN_LSB: u8 = 100;
pub const RPN_MSB: u8 = 101;
pub const ALL_SOUNDS_OFF: u8 = 120;
pub const RESET_CONTROLLERS: u8 = 121;
pub const ALL_NOTES_OFF: u8 = 123;

/// Registered parameter number for the pitch bend range.
pub const RPN_PITCH_BEND_RANGE: u16 = 0;

/// Maximum amount the reverb and chorus depth controllers add to a zone's send level.
const SEND_DEPTH: f32 = 0.2;

/// Per-channel MIDI state.
pub struct Channel {
    index: usize,
    /// Bank number without the drum flag.
    bank: u32,
    program: u8,
    preset: Option<PresetRef>,
    tuning: Option<TuningId>,
    cc: [u8; 128],
    pitch_bend: u16,
    /// Pitch bend range in cents.
    pitch_wheel_sensitivity: f32,
    pressure: u8,
}

impl Channel {
    pub fn new(index: usize) -> Self {
        let mut channel = Self {
            index,
            bank: 0,
            program: 0,
            preset: None,
            tuning: None,
            cc: [0; 128],
            pitch_bend: 0x2000,
            pitch_wheel_sensitivity: 200.0,
            pressure: 0,
        };
        channel.reset();
        channel
    }

    /// Restores the power-on state, unbinding the preset and tuning.
    pub fn reset(&mut self) {
        self.bank = 0;
        self.program = 0;
        self.preset = None;
        self.tuning = None;
        self.cc = [0; 128];
        self.cc[VOLUME as usize] = 100;
        self.cc[PAN as usize] = 64;
        self.cc[REVERB_DEPTH as usize] = 40;
        self.pitch_wheel_sensitivity = 200.0;
        self.reset_controllers();
    }

    /// Resets the controllers covered by the "reset all controllers" message.
    pub fn reset_controllers(&mut self) {
        self.cc[1] = 0;
        self.cc[EXPRESSION as usize] = 127;
        for cc in 64..=69 {
            self.cc[cc] = 0;
        }
        self.cc[RPN_LSB as usize] = 127;
        self.cc[RPN_MSB as usize] = 127;
        self.pitch_bend = 0x2000;
        self.pressure = 0;
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Channel 10 of every 16 channel port plays drum kits.
    pub fn is_drum(&self) -> bool {
        self.index % 16 == 9
    }

    /// The bank presets are looked up in, with the drum flag set on drum channels.
    pub fn bank(&self) -> u32 {
        if self.is_drum() {
            drum_bank(self.bank)
        } else {
            self.bank
        }
    }

    pub fn set_bank(&mut self, bank: u32) {
        self.bank = bank;
    }

    pub fn set_bank_msb(&mut self, value: u8) {
        self.bank = (value as u32 & 0x7f) << 7 | (self.bank & 0x7f);
    }

    pub fn set_bank_lsb(&mut self, value: u8) {
        self.bank = (self.bank & !0x7f) | (value as u32 & 0x7f);
    }

    pub fn program(&self) -> u8 {
        self.program
    }

    pub fn set_program(&mut self, program: u8) {
        self.program = program;
    }

    pub fn preset(&self) -> Option<&PresetRef> {
        self.preset.as_ref()
    }

    pub fn set_preset(&mut self, preset: Option<PresetRef>) {
        self.preset = preset;
    }

    pub fn tuning(&self) -> Option<TuningId> {
        self.tuning
    }

    pub fn set_tuning(&mut self, tuning: Option<TuningId>) {
        self.tuning = tuning;
    }

    pub fn cc(&self, control: u8) -> u8 {
        self.cc[control as usize & 0x7f]
    }

    pub fn set_cc(&mut self, control: u8, value: u8) {
        self.cc[control as usize & 0x7f] = value.min(127);
    }

    /// Whether the sustain pedal is held down.
    pub fn sustained(&self) -> bool {
        self.cc(SUSTAIN) >= 64
    }

    pub fn pitch_bend(&self) -> u16 {
        self.pitch_bend
    }

    pub fn set_pitch_bend(&mut self, value: u16) {
        self.pitch_bend = value.min(0x3fff);
    }

    pub fn pitch_wheel_sensitivity(&self) -> f32 {
        self.pitch_wheel_sensitivity
    }

    pub fn set_pitch_wheel_sensitivity(&mut self, cents: f32) {
        self.pitch_wheel_sensitivity = cents.max(0.0);
    }

    pub fn set_pressure(&mut self, value: u8) {
        self.pressure = value.min(127);
    }

    /// The registered parameter selected for data entry, if any.
    pub fn rpn(&self) -> Option<u16> {
        let (msb, lsb) = (self.cc(RPN_MSB), self.cc(RPN_LSB));
        (msb != 127 && lsb != 127).then_some((msb as u16) << 7 | lsb as u16)
    }

    /// Applies a data entry controller to the selected registered parameter.
    /// Returns `true` if the pitch bend range changed.
    pub fn data_entry(&mut self, control: u8, value: u8) -> bool {
        if self.rpn() != Some(RPN_PITCH_BEND_RANGE) {
            return false;
        }
        let cents = self.pitch_wheel_sensitivity as u32;
        let (semitones, cents) = (cents / 100, cents % 100);
        self.pitch_wheel_sensitivity = match control {
            DATA_ENTRY_MSB => value as f32 * 100.0 + cents as f32,
            DATA_ENTRY_LSB => semitones as f32 * 100.0 + value.min(99) as f32,
            _ => return false,
        };
        true
    }

    /// The channel parameters applied to each of its voices.
    pub fn modulation(&self) -> Modulation {
        let level = |cc: u8| {
            let v = self.cc(cc) as f32 / 127.0;
            v * v
        };
        Modulation {
            gain: level(VOLUME) * level(EXPRESSION),
            pan: ((self.cc(PAN) as f32 - 64.0) / 63.0).clamp(-1.0, 1.0),
            pitch_bend: cents_from_pitch_bend(self.pitch_bend, self.pitch_wheel_sensitivity),
            reverb_send: SEND_DEPTH * self.cc(REVERB_DEPTH) as f32 / 127.0,
            chorus_send: SEND_DEPTH * self.cc(CHORUS_DEPTH) as f32 / 127.0,
            pressure: self.pressure as f32 / 127.0,
        }
    }
}
