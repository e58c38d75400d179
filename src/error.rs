use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthError {
    #[error("Invalid configuration: {0}")]
    Configuration(&'static str),
    #[error("MIDI channel {0} is out of range")]
    ChannelOutOfRange(usize),
    #[error("No preset for bank {bank}, program {program}")]
    PresetNotFound { bank: u32, program: u8 },
    #[error("Soundfont is not loaded")]
    SoundFontNotFound,
    #[error("Reverb preset {0} does not exist")]
    ReverbPresetNotFound(usize),
    #[error("No tuning for bank {bank}, program {program}")]
    TuningNotFound { bank: u8, program: u8 },
    #[error("No voice available")]
    VoicesExhausted,
    #[error("Invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("Unknown setting {0}")]
    UnknownSetting(String),
    #[error("Synth is stopped")]
    Stopped,
}
