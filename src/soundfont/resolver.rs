use super::{Preset, SharedSoundFont, DRUM_INST_MASK};
use crate::error::SynthError;
use slotmap::{new_key_type, SecondaryMap, SlotMap};

new_key_type! {
    pub struct SoundFontId;
}

/// A resolved preset: the soundfont that owns it and its soundfont-local identity.
#[derive(Clone)]
pub struct PresetRef {
    font_id: SoundFontId,
    font: SharedSoundFont,
    /// Bank within the soundfont, after the bank offset was applied.
    bank: u32,
    program: u8,
}

impl PresetRef {
    pub fn font_id(&self) -> SoundFontId {
        self.font_id
    }

    pub fn font(&self) -> &SharedSoundFont {
        &self.font
    }

    pub fn bank(&self) -> u32 {
        self.bank
    }

    pub fn program(&self) -> u8 {
        self.program
    }

    pub fn preset(&self) -> Option<&dyn Preset> {
        self.font.preset(self.bank, self.program)
    }
}

impl std::fmt::Debug for PresetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresetRef")
            .field("font_id", &self.font_id)
            .field("bank", &self.bank)
            .field("program", &self.program)
            .finish()
    }
}

/// Maps (soundfont, bank, program) to presets across all loaded soundfonts.
#[derive(Default)]
pub struct PresetResolver {
    fonts: SlotMap<SoundFontId, SharedSoundFont>,
    /// Loaded soundfonts, most recently added first.
    order: Vec<SoundFontId>,
    bank_offsets: SecondaryMap<SoundFontId, i32>,
}

impl PresetResolver {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a soundfont ahead of all those already loaded.
    pub fn add(&mut self, font: SharedSoundFont) -> SoundFontId {
        let id = self.fonts.insert(font);
        self.order.insert(0, id);
        id
    }

    /// Removes a soundfont along with its bank offset.
    pub fn remove(&mut self, id: SoundFontId) -> Option<SharedSoundFont> {
        let font = self.fonts.remove(id)?;
        self.order.retain(|&other| other != id);
        self.bank_offsets.remove(id);
        Some(font)
    }

    pub fn get(&self, id: SoundFontId) -> Option<&SharedSoundFont> {
        self.fonts.get(id)
    }

    pub fn contains(&self, id: SoundFontId) -> bool {
        self.fonts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The loaded soundfonts in lookup order.
    pub fn ids(&self) -> impl Iterator<Item = SoundFontId> + '_ {
        self.order.iter().copied()
    }

    pub fn set_bank_offset(&mut self, id: SoundFontId, offset: i32) -> Result<(), SynthError> {
        if !self.fonts.contains_key(id) {
            return Err(SynthError::SoundFontNotFound);
        }
        self.bank_offsets.insert(id, offset);
        Ok(())
    }

    pub fn bank_offset(&self, id: SoundFontId) -> i32 {
        self.bank_offsets.get(id).copied().unwrap_or(0)
    }

    /// Looks up a preset in one specific soundfont.
    pub fn get_preset(&self, id: SoundFontId, bank: u32, program: u8) -> Option<PresetRef> {
        let font = self.fonts.get(id)?;
        let bank = local_bank(bank, self.bank_offset(id))?;
        font.preset(bank, program)?;
        Some(PresetRef {
            font_id: id,
            font: font.clone(),
            bank,
            program,
        })
    }

    /// Searches all soundfonts, most recently added first, for a preset.
    pub fn find_preset(&self, bank: u32, program: u8) -> Option<PresetRef> {
        self.order
            .iter()
            .find_map(|&id| self.get_preset(id, bank, program))
    }
}

/// Translates a bank number into a soundfont's own numbering by subtracting its offset.
/// The drum flag is carried through unchanged. Banks below the offset are not covered.
pub fn local_bank(bank: u32, offset: i32) -> Option<u32> {
    let number = (bank & !DRUM_INST_MASK) as i64 - offset as i64;
    if !(0..DRUM_INST_MASK as i64).contains(&number) {
        return None;
    }
    Some(number as u32 | (bank & DRUM_INST_MASK))
}
