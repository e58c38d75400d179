use super::{Preset, SharedSoundFont, SoundFont, Zone};
use basedrop::{Handle, Shared};

/// A soundfont assembled in memory from already-decoded samples.
pub struct MemorySoundFont {
    name: String,
    presets: Vec<MemoryPreset>,
}

pub struct MemoryPreset {
    name: String,
    bank: u32,
    program: u8,
    zones: Vec<Zone>,
}

impl MemorySoundFont {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            presets: vec![],
        }
    }

    /// Adds a preset, replacing any existing preset at the same bank and program.
    pub fn with_preset(mut self, preset: MemoryPreset) -> Self {
        self.presets
            .retain(|p| (p.bank, p.program) != (preset.bank, preset.program));
        self.presets.push(preset);
        self
    }

    pub fn presets(&self) -> impl Iterator<Item = &MemoryPreset> {
        self.presets.iter()
    }

    /// Wraps the soundfont for handing to the engine.
    pub fn into_shared(self, handle: &Handle) -> SharedSoundFont {
        Shared::new(handle, Box::new(self) as Box<dyn SoundFont>)
    }
}

impl SoundFont for MemorySoundFont {
    fn name(&self) -> &str {
        &self.name
    }

    fn preset(&self, bank: u32, program: u8) -> Option<&dyn Preset> {
        self.presets
            .iter()
            .find(|p| p.bank == bank && p.program == program)
            .map(|p| p as &dyn Preset)
    }
}

impl MemoryPreset {
    pub fn new(name: &str, bank: u32, program: u8) -> Self {
        Self {
            name: name.to_owned(),
            bank,
            program,
            zones: vec![],
        }
    }

    pub fn with_zone(mut self, zone: Zone) -> Self {
        self.zones.push(zone);
        self
    }
}

impl Preset for MemoryPreset {
    fn name(&self) -> &str {
        &self.name
    }

    fn bank(&self) -> u32 {
        self.bank
    }

    fn program(&self) -> u8 {
        self.program
    }

    fn zones(&self, key: u8, velocity: u8, f: &mut dyn FnMut(&Zone)) {
        for zone in self.zones.iter().filter(|z| z.matches(key, velocity)) {
            f(zone);
        }
    }
}
