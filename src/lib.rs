pub mod audio;
pub mod channel;
pub mod convert;
pub mod effects;
pub mod engine;
pub mod error;
pub mod midi;
pub mod queue;
pub mod render;
pub mod settings;
pub mod soundfont;
#[cfg(test)]
mod testing;
pub mod tuning;
mod util;
pub mod voice;

pub use engine::{SynthEngine, SynthState};
pub use error::SynthError;
pub use settings::SynthSettings;
