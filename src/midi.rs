#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MidiEvent {
    NoteOn {
        channel: u8,
        key: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        key: u8,
        velocity: u8,
    },
    ControlChange {
        channel: u8,
        control: u8,
        value: u8,
    },
    ProgramChange {
        channel: u8,
        program: u8,
    },
    ChannelPressure {
        channel: u8,
        value: u8,
    },
    PitchBend {
        channel: u8,
        value: u16,
    },
    Invalid,
}

impl MidiEvent {
    pub fn from_raw(data: &[u8]) -> Self {
        match *data {
            [a @ 0x80..=0x8f, key @ 0..=0x7f, velocity @ 0..=0x7f] => MidiEvent::NoteOff {
                channel: a & 0x0f,
                key,
                velocity,
            },
            // A note-on with zero velocity is a note-off by convention
            [a @ 0x90..=0x9f, key @ 0..=0x7f, 0] => MidiEvent::NoteOff {
                channel: a & 0x0f,
                key,
                velocity: 0,
            },
            [a @ 0x90..=0x9f, key @ 0..=0x7f, velocity @ 0..=0x7f] => MidiEvent::NoteOn {
                channel: a & 0x0f,
                key,
                velocity,
            },
            [a @ 0xb0..=0xbf, control @ 0..=0x7f, value @ 0..=0x7f] => MidiEvent::ControlChange {
                channel: a & 0x0f,
                control,
                value,
            },
            [a @ 0xc0..=0xcf, program @ 0..=0x7f, ..] => MidiEvent::ProgramChange {
                channel: a & 0x0f,
                program,
            },
            [a @ 0xd0..=0xdf, value @ 0..=0x7f, ..] => MidiEvent::ChannelPressure {
                channel: a & 0x0f,
                value,
            },
            [a @ 0xe0..=0xef, lsb @ 0..=0x7f, msb @ 0..=0x7f] => MidiEvent::PitchBend {
                channel: a & 0x0f,
                value: lsb as u16 | ((msb as u16) << 7),
            },
            _ => MidiEvent::Invalid,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, MidiEvent::Invalid)
    }

    /// The MIDI channel the event is addressed to.
    pub fn channel(&self) -> Option<u8> {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::ProgramChange { channel, .. }
            | MidiEvent::ChannelPressure { channel, .. }
            | MidiEvent::PitchBend { channel, .. } => Some(channel),
            MidiEvent::Invalid => None,
        }
    }
}
