use crate::{
    channel::{self, Channel},
    convert::{self, interleave_stereo, DitherTable},
    effects::{ChorusParams, ChorusUnit, Effects, ReverbParams, ReverbUnit},
    error::SynthError,
    midi::MidiEvent,
    queue::{CommandReceiver, SynthCommand},
    render::{Block, BlockRenderer},
    settings::{SynthSettings, MAX_GAIN, MAX_POLYPHONY},
    soundfont::{drum_bank, PresetRef, PresetResolver, SharedSoundFont, SoundFontId},
    tuning::{Tuning, TuningId, TuningTable},
    voice::{
        pool::VoicePool, ModSource, NoteContext, NoteId, SampleVoice, Voice, VoiceInfo,
    },
};
use std::time::Instant;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SynthState {
    /// Freshly created or reset, no note played yet.
    Clean,
    /// At least one voice may be sounding.
    Playing,
    /// The last block ended with no voices in use.
    Quiet,
    /// Events are refused and blocks are silent until the next system reset.
    Stopped,
}

/// A polyphonic soundfont synthesizer.
///
/// Events and parameter changes are applied between calls to
/// [`one_block`](Self::one_block), which renders a fixed number of samples.
/// The engine never allocates while rendering.
pub struct SynthEngine<V = SampleVoice> {
    settings: SynthSettings,
    state: SynthState,
    channels: Vec<Channel>,
    pool: VoicePool<V>,
    resolver: PresetResolver,
    tunings: TuningTable,
    effects: Effects,
    renderer: BlockRenderer,
    dither: DitherTable,
    dither_index: usize,
    /// Read position in the current block for the `write_*` methods.
    cursor: usize,
    /// Number of samples rendered.
    ticks: u64,
    next_note_id: u64,
    started_at: Instant,
}

impl<V: Voice + Default> SynthEngine<V> {
    pub fn new(settings: SynthSettings) -> Result<Self, SynthError> {
        settings.validate()?;
        log::debug!("Creating synth engine with {settings:?}");
        Ok(Self {
            settings,
            state: SynthState::Clean,
            channels: (0..settings.midi_channels).map(Channel::new).collect(),
            pool: VoicePool::new(settings.polyphony, settings.sample_rate),
            resolver: PresetResolver::new(),
            tunings: TuningTable::new(),
            effects: Effects::new(
                settings.sample_rate,
                settings.reverb_active,
                settings.chorus_active,
            ),
            renderer: BlockRenderer::new(&settings),
            dither: DitherTable::new(),
            dither_index: 0,
            cursor: settings.block_size,
            ticks: 0,
            next_note_id: 1,
            started_at: Instant::now(),
        })
    }

    /// Changes the polyphony limit. Lowering it releases the oldest excess voices.
    pub fn update_polyphony(&mut self, polyphony: usize) -> Result<(), SynthError> {
        if polyphony == 0 || polyphony > MAX_POLYPHONY {
            return Err(SynthError::InvalidParameter {
                name: "polyphony",
                value: polyphony as f64,
            });
        }
        self.pool.set_polyphony(polyphony);
        self.settings.polyphony = polyphony;
        log::info!("Polyphony set to {polyphony}");
        Ok(())
    }

    /// Entry point for the external settings store.
    pub fn apply_setting(&mut self, name: &str, value: f64) -> Result<(), SynthError> {
        match name {
            "synth.gain" => self.update_gain(value as f32),
            "synth.polyphony" => {
                if value.fract() != 0.0 || value < 1.0 {
                    return Err(SynthError::InvalidParameter {
                        name: "polyphony",
                        value,
                    });
                }
                self.update_polyphony(value as usize)
            }
            "synth.reverb.active" => {
                self.set_reverb_active(value != 0.0);
                Ok(())
            }
            "synth.chorus.active" => {
                self.set_chorus_active(value != 0.0);
                Ok(())
            }
            _ => Err(SynthError::UnknownSetting(name.to_owned())),
        }
    }

    /// Applies every queued command. Failures are logged rather than returned,
    /// so this can be called from the audio callback. Returns the number of
    /// commands applied.
    pub fn apply_commands(&mut self, commands: &mut CommandReceiver) -> usize {
        let mut count = 0;
        while let Some(command) = commands.recv() {
            if let Err(err) = self.apply_command(command) {
                log::warn!("Command failed: {err}");
            }
            count += 1;
        }
        count
    }

    fn apply_command(&mut self, command: SynthCommand) -> Result<(), SynthError> {
        match command {
            SynthCommand::Midi(event) => self.handle_event(event),
            SynthCommand::SetGain(gain) => self.update_gain(gain),
            SynthCommand::SetPolyphony(polyphony) => self.limit_polyphony(polyphony),
            SynthCommand::SetReverbActive(active) => {
                self.set_reverb_active(active);
                Ok(())
            }
            SynthCommand::SetChorusActive(active) => {
                self.set_chorus_active(active);
                Ok(())
            }
            SynthCommand::SetReverbPreset(num) => self.set_reverb_preset(num),
            SynthCommand::AllNotesOff(chan) => self.all_notes_off(chan),
            SynthCommand::AllSoundsOff(chan) => self.all_sounds_off(chan),
            SynthCommand::RemoveSoundFont(id) => self.remove_soundfont(id).map(drop),
            SynthCommand::SystemReset => {
                self.system_reset();
                Ok(())
            }
        }
    }
}

impl<V: Voice> SynthEngine<V> {
    pub fn settings(&self) -> &SynthSettings {
        &self.settings
    }

    pub fn state(&self) -> SynthState {
        self.state
    }

    /// Number of samples rendered since the engine was created.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Number of voices counted against the polyphony limit.
    pub fn active_voice_count(&self) -> usize {
        self.pool.active_count()
    }

    /// Number of voices in use, including those in their release phase.
    pub fn voice_count(&self) -> usize {
        self.pool.in_use_count()
    }

    pub fn voices(&self) -> impl Iterator<Item = VoiceInfo> + '_ {
        self.pool.voices()
    }

    pub fn polyphony(&self) -> usize {
        self.pool.polyphony()
    }

    pub fn gain(&self) -> f32 {
        self.settings.gain
    }

    /// Sets the master gain, which applies from the next rendered block.
    pub fn update_gain(&mut self, gain: f32) -> Result<(), SynthError> {
        if !(0.0..=MAX_GAIN).contains(&gain) {
            return Err(SynthError::InvalidParameter {
                name: "gain",
                value: gain as f64,
            });
        }
        self.settings.gain = gain;
        Ok(())
    }

    /// Changes the polyphony limit within the voice slots allocated so far, so it is
    /// safe to call from the audio thread. Limits beyond the current capacity are
    /// rejected; use [`update_polyphony`](Self::update_polyphony) to grow the pool.
    pub fn limit_polyphony(&mut self, polyphony: usize) -> Result<(), SynthError> {
        if polyphony == 0 || polyphony > self.pool.max_polyphony() {
            return Err(SynthError::InvalidParameter {
                name: "polyphony",
                value: polyphony as f64,
            });
        }
        self.pool.limit_polyphony(polyphony);
        self.settings.polyphony = polyphony;
        Ok(())
    }

    fn check_running(&self) -> Result<(), SynthError> {
        match self.state {
            SynthState::Stopped => Err(SynthError::Stopped),
            _ => Ok(()),
        }
    }

    fn check_channel(&self, chan: usize) -> Result<(), SynthError> {
        if chan < self.channels.len() {
            Ok(())
        } else {
            Err(SynthError::ChannelOutOfRange(chan))
        }
    }

    /// Kills every voice and refuses further events until [`system_reset`](Self::system_reset).
    pub fn stop(&mut self) {
        self.pool.kill_all();
        self.state = SynthState::Stopped;
        log::info!("Synth stopped");
    }

    /// Kills every voice, restores every channel to its power-on state and
    /// clears the effect units.
    pub fn system_reset(&mut self) {
        self.pool.kill_all();
        for channel in &mut self.channels {
            channel.reset();
        }
        self.reset_programs();
        self.effects.reset();
        self.state = SynthState::Clean;
        log::info!("Synth reset");
    }

    pub fn handle_event(&mut self, event: MidiEvent) -> Result<(), SynthError> {
        match event {
            MidiEvent::NoteOn {
                channel,
                key,
                velocity,
            } => self.note_on(channel as usize, key, velocity).map(drop),
            MidiEvent::NoteOff { channel, key, .. } => self.note_off(channel as usize, key),
            MidiEvent::ControlChange {
                channel,
                control,
                value,
            } => self.control_change(channel as usize, control, value),
            MidiEvent::ProgramChange { channel, program } => {
                self.program_change(channel as usize, program)
            }
            MidiEvent::ChannelPressure { channel, value } => {
                self.channel_pressure(channel as usize, value)
            }
            MidiEvent::PitchBend { channel, value } => self.pitch_bend(channel as usize, value),
            MidiEvent::Invalid => {
                log::debug!("Ignoring invalid MIDI event");
                Ok(())
            }
        }
    }

    /// Starts a note with one voice per zone of the channel's preset that matches the
    /// key and velocity. Earlier voices for the same key are released first.
    pub fn note_on(&mut self, chan: usize, key: u8, velocity: u8) -> Result<NoteId, SynthError> {
        self.check_running()?;
        check_data("key", key)?;
        if velocity == 0 || velocity > 127 {
            return Err(SynthError::InvalidParameter {
                name: "velocity",
                value: velocity as f64,
            });
        }
        let channel = self
            .channels
            .get(chan)
            .ok_or(SynthError::ChannelOutOfRange(chan))?;
        let not_found = SynthError::PresetNotFound {
            bank: channel.bank(),
            program: channel.program(),
        };
        let preset = channel
            .preset()
            .and_then(PresetRef::preset)
            .ok_or(not_found)?;

        let note_id = NoteId(self.next_note_id);
        self.next_note_id += 1;
        let pitch = channel
            .tuning()
            .and_then(|id| self.tunings.get(id))
            .map_or(100.0 * key as f64, |tuning| tuning.pitch(key));
        let note = NoteContext {
            note_id,
            channel: chan,
            key,
            velocity,
            pitch,
        };
        let modulation = channel.modulation();

        let pool = &mut self.pool;
        pool.release_voice_on_same_note(chan, key);
        let mut started = 0;
        preset.zones(key, velocity, &mut |zone| {
            pool.kill_by_exclusive_class(chan, zone.exclusive_class, note_id);
            match pool.allocate(note_id) {
                Ok(idx) => {
                    pool.start(idx, zone, &note, &modulation);
                    started += 1;
                }
                Err(err) => log::warn!("Dropped voice for key {key} on channel {chan}: {err}"),
            }
        });
        log::trace!("Note {note_id:?} on channel {chan}, key {key}: {started} voices");

        if started > 0 {
            self.state = SynthState::Playing;
        }
        Ok(note_id)
    }

    /// Releases the key, or holds its voices while the sustain pedal is down.
    pub fn note_off(&mut self, chan: usize, key: u8) -> Result<(), SynthError> {
        self.check_running()?;
        self.check_channel(chan)?;
        check_data("key", key)?;
        let sustain = self.channels[chan].sustained();
        self.pool.note_off(chan, key, sustain);
        Ok(())
    }

    /// Releases the voices of a single note.
    pub fn note_off_id(&mut self, note_id: NoteId) -> Result<(), SynthError> {
        self.check_running()?;
        let channel = self
            .pool
            .voices()
            .find(|voice| voice.note_id == note_id)
            .map(|voice| voice.channel);
        if let Some(chan) = channel {
            let sustain = self.channels[chan].sustained();
            self.pool.note_off_id(note_id, sustain);
        }
        Ok(())
    }

    pub fn control_change(
        &mut self,
        chan: usize,
        control: u8,
        value: u8,
    ) -> Result<(), SynthError> {
        self.check_running()?;
        check_data("controller", control)?;
        check_data("controller value", value)?;
        let channel = self
            .channels
            .get_mut(chan)
            .ok_or(SynthError::ChannelOutOfRange(chan))?;
        channel.set_cc(control, value);

        match control {
            channel::BANK_SELECT_MSB => channel.set_bank_msb(value),
            channel::BANK_SELECT_LSB => channel.set_bank_lsb(value),
            channel::SUSTAIN => {
                if value < 64 {
                    self.pool.damp_voices(chan);
                }
            }
            channel::DATA_ENTRY_MSB | channel::DATA_ENTRY_LSB => {
                if channel.data_entry(control, value) {
                    let modulation = channel.modulation();
                    self.pool
                        .modulate_voices(chan, &modulation, ModSource::PitchBend);
                }
            }
            channel::RPN_MSB | channel::RPN_LSB => {}
            channel::ALL_SOUNDS_OFF => self.pool.all_sounds_off(chan),
            channel::RESET_CONTROLLERS => {
                channel.reset_controllers();
                let modulation = channel.modulation();
                self.pool.damp_voices(chan);
                self.pool.modulate_voices_all(chan, &modulation);
            }
            channel::ALL_NOTES_OFF => self.pool.all_notes_off(chan),
            _ => {
                let modulation = channel.modulation();
                self.pool
                    .modulate_voices(chan, &modulation, ModSource::Controller(control));
            }
        }
        Ok(())
    }

    /// Sets the 14 bit pitch wheel position, where 0x2000 is centered.
    pub fn pitch_bend(&mut self, chan: usize, value: u16) -> Result<(), SynthError> {
        self.check_running()?;
        if value > 0x3fff {
            return Err(SynthError::InvalidParameter {
                name: "pitch bend",
                value: value as f64,
            });
        }
        let channel = self
            .channels
            .get_mut(chan)
            .ok_or(SynthError::ChannelOutOfRange(chan))?;
        channel.set_pitch_bend(value);
        let modulation = channel.modulation();
        self.pool
            .modulate_voices(chan, &modulation, ModSource::PitchBend);
        Ok(())
    }

    pub fn channel_pressure(&mut self, chan: usize, value: u8) -> Result<(), SynthError> {
        self.check_running()?;
        check_data("channel pressure", value)?;
        let channel = self
            .channels
            .get_mut(chan)
            .ok_or(SynthError::ChannelOutOfRange(chan))?;
        channel.set_pressure(value);
        let modulation = channel.modulation();
        self.pool
            .modulate_voices(chan, &modulation, ModSource::ChannelPressure);
        Ok(())
    }

    pub fn all_notes_off(&mut self, chan: usize) -> Result<(), SynthError> {
        self.check_channel(chan)?;
        self.pool.all_notes_off(chan);
        Ok(())
    }

    pub fn all_sounds_off(&mut self, chan: usize) -> Result<(), SynthError> {
        self.check_channel(chan)?;
        self.pool.all_sounds_off(chan);
        Ok(())
    }

    /// Sets the bank used by the next program change.
    pub fn bank_select(&mut self, chan: usize, bank: u32) -> Result<(), SynthError> {
        self.check_running()?;
        self.check_channel(chan)?;
        self.channels[chan].set_bank(bank & !crate::soundfont::DRUM_INST_MASK);
        Ok(())
    }

    /// Selects a program from the channel's bank, searching every soundfont. If nothing
    /// matches, a substitute preset is chosen: for melodic channels the same program in
    /// bank 0 and then program 0, for drum channels the first drum kit.
    pub fn program_change(&mut self, chan: usize, program: u8) -> Result<(), SynthError> {
        self.check_running()?;
        self.check_channel(chan)?;
        check_data("program", program)?;
        self.channels[chan].set_program(program);
        let preset = self.find_program(chan);
        if preset.is_none() {
            let channel = &self.channels[chan];
            log::warn!(
                "No preset for bank {}, program {} on channel {chan}",
                channel.bank(),
                program
            );
        }
        self.channels[chan].set_preset(preset);
        Ok(())
    }

    fn find_program(&self, chan: usize) -> Option<PresetRef> {
        let channel = &self.channels[chan];
        let (bank, program) = (channel.bank(), channel.program());
        if let Some(preset) = self.resolver.find_preset(bank, program) {
            return Some(preset);
        }
        let substitute = if channel.is_drum() {
            self.resolver.find_preset(drum_bank(0), 0)
        } else {
            self.resolver
                .find_preset(0, program)
                .or_else(|| self.resolver.find_preset(0, 0))
        };
        if let Some(preset) = &substitute {
            log::warn!(
                "Bank {bank}, program {program} not found on channel {chan}, substituting bank {}, program {}",
                preset.bank(),
                preset.program()
            );
        }
        substitute
    }

    /// Binds a preset from one particular soundfont to the channel.
    pub fn program_select(
        &mut self,
        chan: usize,
        sfont_id: SoundFontId,
        bank: u32,
        program: u8,
    ) -> Result<(), SynthError> {
        self.check_running()?;
        self.check_channel(chan)?;
        check_data("program", program)?;
        if !self.resolver.contains(sfont_id) {
            return Err(SynthError::SoundFontNotFound);
        }
        let preset = self
            .resolver
            .get_preset(sfont_id, bank, program)
            .ok_or(SynthError::PresetNotFound { bank, program })?;
        let channel = &mut self.channels[chan];
        channel.set_bank(bank & !crate::soundfont::DRUM_INST_MASK);
        channel.set_program(program);
        channel.set_preset(Some(preset));
        Ok(())
    }

    /// Re-applies every channel's current program, as if a program change had been received.
    pub fn program_reset(&mut self) -> Result<(), SynthError> {
        self.check_running()?;
        self.reset_programs();
        Ok(())
    }

    fn reset_programs(&mut self) {
        for chan in 0..self.channels.len() {
            let preset = self.find_program(chan);
            self.channels[chan].set_preset(preset);
        }
    }

    /// The preset bound to a channel, if any.
    pub fn channel_preset(&self, chan: usize) -> Result<Option<&PresetRef>, SynthError> {
        self.channels
            .get(chan)
            .map(Channel::preset)
            .ok_or(SynthError::ChannelOutOfRange(chan))
    }

    /// Adds a soundfont ahead of those already loaded and re-applies every channel's program.
    pub fn add_soundfont(&mut self, font: SharedSoundFont) -> SoundFontId {
        self.add_soundfont_with_offset(font, 0)
    }

    pub fn add_soundfont_with_offset(&mut self, font: SharedSoundFont, offset: i32) -> SoundFontId {
        let name = font.name().to_owned();
        let id = self.resolver.add(font);
        if offset != 0 {
            // The id was just issued, so it is always present
            self.resolver.set_bank_offset(id, offset).ok();
        }
        log::info!("Loaded soundfont {name:?} with bank offset {offset}");
        self.reset_programs();
        id
    }

    /// Unloads a soundfont along with its bank offset. Channels using one of its presets
    /// are left without a preset. Voices keep playing the samples they hold.
    pub fn remove_soundfont(&mut self, id: SoundFontId) -> Result<SharedSoundFont, SynthError> {
        let font = self
            .resolver
            .remove(id)
            .ok_or(SynthError::SoundFontNotFound)?;
        log::info!("Unloaded soundfont {:?}", font.name());
        self.update_presets();
        Ok(font)
    }

    /// Re-resolves the (bank, program) of every channel whose preset belongs to a soundfont
    /// that is no longer loaded. Channels with no remaining match are left without a preset.
    pub fn update_presets(&mut self) {
        for channel in &mut self.channels {
            let stale = channel
                .preset()
                .is_some_and(|preset| !self.resolver.contains(preset.font_id()));
            if !stale {
                continue;
            }
            let preset = self.resolver.find_preset(channel.bank(), channel.program());
            if preset.is_none() {
                log::debug!("Channel {} lost its preset", channel.index());
            }
            channel.set_preset(preset);
        }
    }

    pub fn set_bank_offset(&mut self, id: SoundFontId, offset: i32) -> Result<(), SynthError> {
        self.resolver.set_bank_offset(id, offset)
    }

    pub fn bank_offset(&self, id: SoundFontId) -> i32 {
        self.resolver.bank_offset(id)
    }

    pub fn soundfont(&self, id: SoundFontId) -> Option<&SharedSoundFont> {
        self.resolver.get(id)
    }

    pub fn soundfont_count(&self) -> usize {
        self.resolver.len()
    }

    /// Defines a tuning with an explicit pitch in cents for every key.
    pub fn create_key_tuning(
        &mut self,
        bank: u8,
        program: u8,
        name: &str,
        pitch: &[f64; 128],
    ) -> Result<(), SynthError> {
        let id = TuningId::new(bank, program)?;
        self.tunings.insert(Tuning::from_keys(name, id, pitch));
        Ok(())
    }

    /// Defines a tuning which deviates from equal temperament by the same amount in every octave.
    pub fn create_octave_tuning(
        &mut self,
        bank: u8,
        program: u8,
        name: &str,
        deviation: &[f64; 12],
    ) -> Result<(), SynthError> {
        let id = TuningId::new(bank, program)?;
        self.tunings.insert(Tuning::from_octave(name, id, deviation));
        Ok(())
    }

    /// Selects a tuning for the notes started on a channel from now on.
    pub fn select_tuning(&mut self, chan: usize, bank: u8, program: u8) -> Result<(), SynthError> {
        self.check_channel(chan)?;
        let id = TuningId::new(bank, program)?;
        if !self.tunings.contains(id) {
            return Err(SynthError::TuningNotFound { bank, program });
        }
        self.channels[chan].set_tuning(Some(id));
        Ok(())
    }

    /// Returns a channel to equal temperament.
    pub fn reset_tuning(&mut self, chan: usize) -> Result<(), SynthError> {
        self.check_channel(chan)?;
        self.channels[chan].set_tuning(None);
        Ok(())
    }

    /// Deletes a tuning, returning the channels that used it to equal temperament.
    pub fn delete_tuning(&mut self, bank: u8, program: u8) -> Result<(), SynthError> {
        let id = TuningId::new(bank, program)?;
        self.tunings
            .remove(id)
            .ok_or(SynthError::TuningNotFound { bank, program })?;
        for channel in &mut self.channels {
            if channel.tuning() == Some(id) {
                channel.set_tuning(None);
            }
        }
        Ok(())
    }

    pub fn tuning_iteration_start(&mut self) {
        self.tunings.iteration_start();
    }

    /// Returns the (bank, program) of the next defined tuning.
    pub fn tuning_iteration_next(&mut self) -> Option<(u8, u8)> {
        self.tunings
            .iteration_next()
            .map(|id| (id.bank, id.program))
    }

    /// Returns the name and per-key pitches of a tuning.
    pub fn tuning_dump(&self, bank: u8, program: u8) -> Result<(&str, &[f64; 128]), SynthError> {
        let tuning = TuningId::new(bank, program)
            .ok()
            .and_then(|id| self.tunings.get(id))
            .ok_or(SynthError::TuningNotFound { bank, program })?;
        Ok((tuning.name(), tuning.pitches()))
    }

    pub fn set_reverb_unit(&mut self, unit: Box<dyn ReverbUnit>) {
        self.effects.set_reverb_unit(unit);
    }

    pub fn set_chorus_unit(&mut self, unit: Box<dyn ChorusUnit>) {
        self.effects.set_chorus_unit(unit);
    }

    pub fn set_reverb_active(&mut self, active: bool) {
        self.effects.set_reverb_active(active);
        self.settings.reverb_active = active;
    }

    pub fn set_chorus_active(&mut self, active: bool) {
        self.effects.set_chorus_active(active);
        self.settings.chorus_active = active;
    }

    /// Selects one of the canned reverb settings. An unknown preset leaves the reverb untouched.
    pub fn set_reverb_preset(&mut self, num: usize) -> Result<(), SynthError> {
        self.effects.set_reverb_preset(num)
    }

    pub fn set_reverb_params(&mut self, params: ReverbParams) -> Result<(), SynthError> {
        self.effects.set_reverb_params(params)
    }

    pub fn set_chorus_params(&mut self, params: ChorusParams) -> Result<(), SynthError> {
        self.effects.set_chorus_params(params)
    }

    pub fn reverb_params(&self) -> ReverbParams {
        self.effects.reverb_params()
    }

    pub fn chorus_params(&self) -> ChorusParams {
        self.effects.chorus_params()
    }

    /// Renders the next block of audio.
    pub fn one_block(&mut self) -> Block<'_> {
        self.render_block();
        self.cursor = self.renderer.block_size();
        self.renderer.block()
    }

    fn render_block(&mut self) {
        if self.state == SynthState::Stopped {
            self.renderer.render_silence();
        } else {
            self.renderer
                .render(&mut self.pool, &mut self.effects, self.settings.gain);
            if self.state == SynthState::Playing && self.pool.in_use_count() == 0 {
                self.state = SynthState::Quiet;
            }
        }
        self.ticks += self.renderer.block_size() as u64;
        self.cursor = 0;
    }

    /// Walks `len` samples of the first output channel, rendering blocks as needed.
    /// `f` receives the output offset, the left and right input spans, and the dither state.
    fn for_each_span(
        &mut self,
        len: usize,
        mut f: impl FnMut(usize, &[f32], &[f32], &DitherTable, &mut usize),
    ) {
        let block_size = self.renderer.block_size();
        let mut written = 0;
        while written < len {
            if self.cursor >= block_size {
                self.render_block();
            }
            let n = (len - written).min(block_size - self.cursor);
            let range = self.cursor..self.cursor + n;
            if let Some(block) = self.renderer.block().stereo(0) {
                f(
                    written,
                    &block.left[range.clone()],
                    &block.right[range],
                    &self.dither,
                    &mut self.dither_index,
                );
            }
            self.cursor += n;
            written += n;
        }
    }

    pub fn write_f32(&mut self, left: &mut [f32], right: &mut [f32]) {
        let len = left.len().min(right.len());
        self.for_each_span(len, |offset, l, r, _, _| {
            left[offset..offset + l.len()].copy_from_slice(l);
            right[offset..offset + r.len()].copy_from_slice(r);
        });
    }

    pub fn write_interleaved_f32(&mut self, output: &mut [f32]) {
        self.for_each_span(output.len() / 2, |offset, l, r, _, _| {
            interleave_stereo(l, r, &mut output[2 * offset..2 * (offset + l.len())]);
        });
    }

    /// Writes dithered 16 bit samples.
    pub fn write_s16(&mut self, left: &mut [i16], right: &mut [i16]) {
        let len = left.len().min(right.len());
        self.for_each_span(len, |offset, l, r, dither, index| {
            let end = offset + l.len();
            *index = convert::write_s16(
                l,
                r,
                &mut left[offset..end],
                &mut right[offset..end],
                dither,
                *index,
            );
        });
    }

    pub fn write_interleaved_s16(&mut self, output: &mut [i16]) {
        self.for_each_span(output.len() / 2, |offset, l, r, dither, index| {
            let out = &mut output[2 * offset..2 * (offset + l.len())];
            *index = convert::write_interleaved_s16(l, r, out, dither, *index);
        });
    }
}

fn check_data(name: &'static str, value: u8) -> Result<(), SynthError> {
    if value > 127 {
        return Err(SynthError::InvalidParameter {
            name,
            value: value as f64,
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        queue::command_queue,
        soundfont::{MemoryPreset, MemorySoundFont},
        testing::{scripted_zone, test_font, PassThrough, ScriptedVoice},
        voice::VoiceStatus,
    };
    use basedrop::{Collector, Handle};
    use std::sync::{atomic::Ordering, Arc};

    type TestEngine = SynthEngine<ScriptedVoice>;

    fn engine(settings: SynthSettings) -> TestEngine {
        SynthEngine::new(settings).unwrap()
    }

    fn with_font(handle: &Handle, settings: SynthSettings) -> TestEngine {
        let mut synth = engine(settings);
        synth.add_soundfont(test_font(handle, "base"));
        synth
    }

    fn statuses(synth: &TestEngine) -> Vec<VoiceStatus> {
        synth.voices().map(|v| v.status).collect()
    }

    fn preset_name(synth: &TestEngine, chan: usize) -> Option<String> {
        synth
            .channel_preset(chan)
            .unwrap()
            .and_then(|p| p.preset())
            .map(|p| p.name().to_owned())
    }

    #[test]
    fn test_construction_validates_settings() {
        let settings = SynthSettings {
            audio_channels: 0,
            ..Default::default()
        };
        assert!(matches!(
            TestEngine::new(settings),
            Err(SynthError::Configuration(_))
        ));
        let settings = SynthSettings {
            sample_rate: -1.0,
            ..Default::default()
        };
        assert!(TestEngine::new(settings).is_err());
    }

    #[test]
    fn test_active_voices_bounded_by_polyphony() {
        let collector = Collector::new();
        let mut synth = with_font(
            &collector.handle(),
            SynthSettings {
                polyphony: 3,
                ..Default::default()
            },
        );
        for key in 30..90 {
            synth.note_on(0, key, 100).unwrap();
            assert!(synth.active_voice_count() <= 3);
            if key % 4 == 0 {
                synth.one_block();
            }
        }
        assert_eq!(synth.active_voice_count(), 3);
    }

    #[test]
    fn test_single_voice_retrigger_scenario() {
        let collector = Collector::new();
        let mut synth = with_font(
            &collector.handle(),
            SynthSettings {
                polyphony: 1,
                ..Default::default()
            },
        );
        let first = synth.note_on(0, 60, 100).unwrap();
        let second = synth.note_on(0, 60, 100).unwrap();
        assert!(first < second);

        let voices: Vec<_> = synth.voices().map(|v| (v.note_id, v.status)).collect();
        assert_eq!(
            voices,
            [
                (first, VoiceStatus::Releasing),
                (second, VoiceStatus::Playing)
            ]
        );
        assert_eq!(synth.active_voice_count(), 1);

        synth.all_sounds_off(0).unwrap();
        assert_eq!(synth.voice_count(), 0);
        assert_eq!(synth.active_voice_count(), 0);
    }

    #[test]
    fn test_layered_preset_starts_voice_per_zone() {
        let collector = Collector::new();
        let mut synth = with_font(&collector.handle(), Default::default());
        synth.program_change(0, 1).unwrap();
        let note = synth.note_on(0, 60, 100).unwrap();
        assert_eq!(synth.voices().filter(|v| v.note_id == note).count(), 2);

        synth.note_on(0, 60, 100).unwrap();
        assert_eq!(synth.active_voice_count(), 2);
        assert_eq!(synth.voice_count(), 4);
    }

    #[test]
    fn test_exclusive_class_on_drum_channel() {
        let collector = Collector::new();
        let mut synth = with_font(&collector.handle(), Default::default());
        let closed = synth.note_on(9, 42, 100).unwrap();
        let kick = synth.note_on(9, 36, 100).unwrap();

        let open = synth.note_on(9, 46, 100).unwrap();
        let notes: Vec<_> = synth.voices().map(|v| v.note_id).collect();
        assert!(!notes.contains(&closed));
        assert!(notes.contains(&kick));
        assert!(notes.contains(&open));
    }

    #[test]
    fn test_exclusive_class_ignores_other_channels() {
        let collector = Collector::new();
        let mut synth = with_font(
            &collector.handle(),
            SynthSettings {
                midi_channels: 32,
                ..Default::default()
            },
        );
        let first_port = synth.note_on(9, 42, 100).unwrap();
        let second_port = synth.note_on(25, 42, 100).unwrap();
        synth.note_on(9, 46, 100).unwrap();

        let notes: Vec<_> = synth.voices().map(|v| v.note_id).collect();
        assert!(!notes.contains(&first_port));
        assert!(notes.contains(&second_port));
    }

    #[test]
    fn test_note_on_without_preset() {
        let mut synth = engine(Default::default());
        assert_eq!(
            synth.note_on(0, 60, 100),
            Err(SynthError::PresetNotFound { bank: 0, program: 0 })
        );
        assert_eq!(synth.state(), SynthState::Clean);
    }

    #[test]
    fn test_rejects_out_of_range_events() {
        let collector = Collector::new();
        let mut synth = with_font(&collector.handle(), Default::default());
        assert_eq!(synth.note_on(16, 60, 100), Err(SynthError::ChannelOutOfRange(16)));
        assert!(synth.note_on(0, 128, 100).is_err());
        assert!(synth.note_on(0, 60, 0).is_err());
        assert!(synth.pitch_bend(0, 0x4000).is_err());
        assert!(synth.control_change(0, 7, 200).is_err());
        assert_eq!(synth.voice_count(), 0);
    }

    #[test]
    fn test_sustain_pedal() {
        let collector = Collector::new();
        let mut synth = with_font(&collector.handle(), Default::default());
        synth.control_change(0, channel::SUSTAIN, 127).unwrap();
        synth.note_on(0, 60, 100).unwrap();
        synth.note_off(0, 60).unwrap();
        assert_eq!(statuses(&synth), [VoiceStatus::Sustained]);
        assert_eq!(synth.active_voice_count(), 1);

        synth.control_change(0, channel::SUSTAIN, 0).unwrap();
        assert_eq!(statuses(&synth), [VoiceStatus::Releasing]);
    }

    #[test]
    fn test_note_off_by_id() {
        let collector = Collector::new();
        let mut synth = with_font(&collector.handle(), Default::default());
        let a = synth.note_on(0, 60, 100).unwrap();
        let b = synth.note_on(0, 64, 100).unwrap();
        synth.note_off_id(a).unwrap();

        let voices: Vec<_> = synth.voices().map(|v| (v.note_id, v.status)).collect();
        assert_eq!(
            voices,
            [(a, VoiceStatus::Releasing), (b, VoiceStatus::Playing)]
        );
        synth.note_off_id(NoteId(999)).unwrap();
    }

    #[test]
    fn test_all_notes_off_controller() {
        let collector = Collector::new();
        let mut synth = with_font(&collector.handle(), Default::default());
        synth.note_on(0, 60, 100).unwrap();
        synth.note_on(1, 60, 100).unwrap();
        synth.control_change(0, channel::ALL_NOTES_OFF, 0).unwrap();
        assert_eq!(
            statuses(&synth),
            [VoiceStatus::Releasing, VoiceStatus::Playing]
        );
        synth.control_change(1, channel::ALL_SOUNDS_OFF, 0).unwrap();
        assert_eq!(statuses(&synth), [VoiceStatus::Releasing]);
    }

    #[test]
    fn test_controllers_modulate_voices() {
        let collector = Collector::new();
        let mut synth = with_font(&collector.handle(), Default::default());
        synth.note_on(0, 60, 100).unwrap();
        synth.control_change(0, channel::VOLUME, 127).unwrap();
        let voice = &synth.pool_voice(0);
        assert_eq!(voice.last_source, Some(ModSource::Controller(channel::VOLUME)));
        assert_eq!(voice.modulation.gain, 1.0);

        synth.pitch_bend(0, 0).unwrap();
        let voice = &synth.pool_voice(0);
        assert_eq!(voice.last_source, Some(ModSource::PitchBend));
        assert_eq!(voice.modulation.pitch_bend, -200.0);

        synth.channel_pressure(0, 127).unwrap();
        assert_eq!(synth.pool_voice(0).modulation.pressure, 1.0);

        synth.control_change(0, channel::RESET_CONTROLLERS, 0).unwrap();
        let voice = &synth.pool_voice(0);
        assert_eq!(voice.last_source, Some(ModSource::All));
        assert_eq!(voice.modulation.pitch_bend, 0.0);
    }

    #[test]
    fn test_pitch_bend_range_data_entry() {
        let collector = Collector::new();
        let mut synth = with_font(&collector.handle(), Default::default());
        synth.note_on(0, 60, 100).unwrap();
        synth.pitch_bend(0, 0).unwrap();
        let rpn = [
            (channel::RPN_MSB, 0),
            (channel::RPN_LSB, 0),
            (channel::DATA_ENTRY_MSB, 12),
        ];
        for (control, value) in rpn {
            synth.control_change(0, control, value).unwrap();
        }
        assert_eq!(synth.pool_voice(0).modulation.pitch_bend, -1200.0);
    }

    #[test]
    fn test_tuned_pitch() {
        let collector = Collector::new();
        let mut synth = with_font(&collector.handle(), Default::default());
        let mut deviation = [0.0; 12];
        deviation[0] = 50.0;
        synth.create_octave_tuning(1, 2, "quarter up", &deviation).unwrap();
        synth.select_tuning(0, 1, 2).unwrap();

        synth.note_on(0, 60, 100).unwrap();
        synth.note_on(1, 60, 100).unwrap();
        let pitches: Vec<_> = synth.pool_voices().map(|v| v.note.unwrap().pitch).collect();
        assert_eq!(pitches, [6050.0, 6000.0]);

        synth.delete_tuning(1, 2).unwrap();
        synth.note_on(0, 62, 100).unwrap();
        assert_eq!(synth.pool_voice(2).note.unwrap().pitch, 6200.0);
        assert_eq!(
            synth.select_tuning(0, 1, 2),
            Err(SynthError::TuningNotFound { bank: 1, program: 2 })
        );
    }

    #[test]
    fn test_tuning_table_access() {
        let mut synth = engine(Default::default());
        let pitch = core::array::from_fn(|key| key as f64 * 50.0);
        synth.create_key_tuning(0, 3, "quarter tones", &pitch).unwrap();
        synth.create_octave_tuning(2, 0, "et", &[0.0; 12]).unwrap();
        assert!(synth.create_octave_tuning(128, 0, "bad", &[0.0; 12]).is_err());

        let (name, pitches) = synth.tuning_dump(0, 3).unwrap();
        assert_eq!(name, "quarter tones");
        assert_eq!(pitches[10], 500.0);

        synth.tuning_iteration_start();
        assert_eq!(synth.tuning_iteration_next(), Some((0, 3)));
        synth.delete_tuning(0, 3).unwrap();
        assert_eq!(synth.tuning_iteration_next(), Some((2, 0)));
        assert_eq!(synth.tuning_iteration_next(), None);
        assert!(synth.tuning_dump(0, 3).is_err());
    }

    #[test]
    fn test_reset_tuning() {
        let collector = Collector::new();
        let mut synth = with_font(&collector.handle(), Default::default());
        synth.create_octave_tuning(0, 0, "sharp", &[10.0; 12]).unwrap();
        synth.select_tuning(3, 0, 0).unwrap();
        synth.reset_tuning(3).unwrap();
        synth.note_on(3, 60, 100).unwrap();
        assert_eq!(synth.pool_voice(0).note.unwrap().pitch, 6000.0);
    }

    #[test]
    fn test_program_change_and_fallback() {
        let collector = Collector::new();
        let mut synth = with_font(&collector.handle(), Default::default());
        assert_eq!(preset_name(&synth, 0).as_deref(), Some("base piano"));
        assert_eq!(preset_name(&synth, 9).as_deref(), Some("base kit"));

        synth.program_change(0, 1).unwrap();
        assert_eq!(preset_name(&synth, 0).as_deref(), Some("base layers"));

        // Bank 1 has no program 1, so the same program in bank 0 is used
        synth.bank_select(0, 1).unwrap();
        synth.program_change(0, 1).unwrap();
        assert_eq!(preset_name(&synth, 0).as_deref(), Some("base layers"));

        // Program 50 exists nowhere, so bank 0, program 0 is used
        synth.program_change(0, 50).unwrap();
        assert_eq!(preset_name(&synth, 0).as_deref(), Some("base piano"));

        // Drum channels fall back to the first kit
        synth.program_change(9, 20).unwrap();
        assert_eq!(preset_name(&synth, 9).as_deref(), Some("base kit"));
    }

    #[test]
    fn test_bank_select_controllers() {
        let collector = Collector::new();
        let mut synth = with_font(&collector.handle(), Default::default());
        synth.control_change(0, channel::BANK_SELECT_MSB, 0).unwrap();
        synth.control_change(0, channel::BANK_SELECT_LSB, 1).unwrap();
        synth.program_change(0, 0).unwrap();
        assert_eq!(preset_name(&synth, 0).as_deref(), Some("base bass"));

        // The bass preset has no zone above key 59
        let note = synth.note_on(0, 72, 100).unwrap();
        assert_eq!(synth.voices().filter(|v| v.note_id == note).count(), 0);
    }

    #[test]
    fn test_newer_soundfont_shadows_older() {
        let collector = Collector::new();
        let handle = collector.handle();
        let mut synth = with_font(&handle, Default::default());
        let id = synth.add_soundfont(test_font(&handle, "extra"));
        assert_eq!(synth.soundfont_count(), 2);
        assert_eq!(preset_name(&synth, 0).as_deref(), Some("extra piano"));
        assert_eq!(synth.channel_preset(0).unwrap().unwrap().font_id(), id);
    }

    #[test]
    fn test_bank_offset_tuples() {
        let collector = Collector::new();
        let handle = collector.handle();
        let mut synth = with_font(&handle, Default::default());
        let font = MemorySoundFont::new("offset")
            .with_preset(MemoryPreset::new("offset bank 5", 5, 0).with_zone(scripted_zone(&handle)))
            .into_shared(&handle);
        let id = synth.add_soundfont_with_offset(font, 10);
        assert_eq!(synth.bank_offset(id), 10);

        // (offset, offset 10, bank 5, program 0): 5 - 10 < 0, falls through to the fallback
        synth.bank_select(0, 5).unwrap();
        synth.program_change(0, 0).unwrap();
        assert_eq!(preset_name(&synth, 0).as_deref(), Some("base piano"));

        // (offset, offset 10, bank 15, program 0): 15 - 10 = 5
        synth.bank_select(0, 15).unwrap();
        synth.program_change(0, 0).unwrap();
        assert_eq!(preset_name(&synth, 0).as_deref(), Some("offset bank 5"));

        synth.set_bank_offset(id, 0).unwrap();
        synth.bank_select(0, 5).unwrap();
        synth.program_change(0, 0).unwrap();
        assert_eq!(preset_name(&synth, 0).as_deref(), Some("offset bank 5"));
    }

    #[test]
    fn test_unload_leaves_no_dangling_presets() {
        let collector = Collector::new();
        let handle = collector.handle();
        let mut synth = engine(Default::default());
        let base = synth.add_soundfont(test_font(&handle, "base"));
        let extra = synth.add_soundfont(test_font(&handle, "extra"));
        synth.program_select(1, base, 0, 1).unwrap();
        synth.note_on(0, 60, 100).unwrap();

        synth.remove_soundfont(extra).unwrap();
        assert_eq!(synth.bank_offset(extra), 0);
        for chan in 0..16 {
            let preset = synth.channel_preset(chan).unwrap();
            assert!(preset.map_or(true, |p| p.font_id() != extra));
        }
        // The older soundfont has the same bank and program
        assert_eq!(preset_name(&synth, 0).as_deref(), Some("base piano"));
        assert_eq!(preset_name(&synth, 9).as_deref(), Some("base kit"));
        assert_eq!(preset_name(&synth, 1).as_deref(), Some("base layers"));

        // The voice started from the unloaded soundfont keeps playing
        assert_eq!(synth.voice_count(), 1);
        assert_eq!(
            synth.remove_soundfont(extra).err(),
            Some(SynthError::SoundFontNotFound)
        );

        synth.remove_soundfont(base).unwrap();
        for chan in 0..16 {
            assert!(synth.channel_preset(chan).unwrap().is_none());
        }
        assert!(matches!(
            synth.note_on(0, 62, 100),
            Err(SynthError::PresetNotFound { .. })
        ));
    }

    #[test]
    fn test_unload_keeps_presets_of_other_fonts() {
        let collector = Collector::new();
        let handle = collector.handle();
        let mut synth = engine(Default::default());
        let base = synth.add_soundfont(test_font(&handle, "base"));
        let extra = synth.add_soundfont(test_font(&handle, "extra"));
        synth.program_select(0, base, 1, 0).unwrap();

        synth.remove_soundfont(extra).unwrap();
        let preset = synth.channel_preset(0).unwrap().unwrap();
        assert_eq!(preset.font_id(), base);
        assert_eq!(preset_name(&synth, 0).as_deref(), Some("base bass"));
    }

    #[test]
    fn test_program_select() {
        let collector = Collector::new();
        let handle = collector.handle();
        let mut synth = engine(Default::default());
        let base = synth.add_soundfont(test_font(&handle, "base"));
        synth.add_soundfont(test_font(&handle, "extra"));

        synth.program_select(0, base, 1, 0).unwrap();
        assert_eq!(preset_name(&synth, 0).as_deref(), Some("base bass"));
        assert_eq!(
            synth.program_select(0, base, 7, 0),
            Err(SynthError::PresetNotFound { bank: 7, program: 0 })
        );
        assert_eq!(preset_name(&synth, 0).as_deref(), Some("base bass"));

        synth.program_reset().unwrap();
        assert_eq!(preset_name(&synth, 0).as_deref(), Some("extra bass"));
    }

    #[test]
    fn test_block_size_and_ticks() {
        let collector = Collector::new();
        let mut synth = with_font(
            &collector.handle(),
            SynthSettings {
                block_size: 32,
                ..Default::default()
            },
        );
        synth.note_on(0, 60, 100).unwrap();
        for n in 1..=10 {
            let block = synth.one_block();
            assert_eq!(block.len(), 32);
            assert_eq!(synth.ticks(), n * 32);
        }
    }

    #[test]
    fn test_gain_applies_to_next_block() {
        let collector = Collector::new();
        let mut synth = with_font(
            &collector.handle(),
            SynthSettings {
                block_size: 4,
                gain: 1.0,
                ..Default::default()
            },
        );
        synth.note_on(0, 60, 100).unwrap();
        assert_eq!(synth.one_block().left(0).unwrap(), [1.0; 4]);
        synth.update_gain(0.25).unwrap();
        assert_eq!(synth.one_block().left(0).unwrap(), [0.25; 4]);
        assert!(synth.update_gain(11.0).is_err());
        assert!(synth.update_gain(f32::NAN).is_err());
        assert_eq!(synth.gain(), 0.25);
    }

    #[test]
    fn test_reducing_polyphony_releases_voices() {
        let collector = Collector::new();
        let mut synth = with_font(&collector.handle(), Default::default());
        for key in 60..68 {
            synth.note_on(0, key, 100).unwrap();
        }
        synth.update_polyphony(3).unwrap();
        assert_eq!(synth.active_voice_count(), 3);
        assert_eq!(synth.voice_count(), 8);

        // Released voices finish within their release time
        synth.one_block();
        assert_eq!(synth.voice_count(), 3);
        assert!(synth.update_polyphony(0).is_err());
    }

    #[test]
    fn test_apply_setting() {
        let mut synth = engine(Default::default());
        synth.apply_setting("synth.gain", 0.5).unwrap();
        assert_eq!(synth.gain(), 0.5);
        synth.apply_setting("synth.polyphony", 16.0).unwrap();
        assert_eq!(synth.polyphony(), 16);
        assert!(synth.apply_setting("synth.polyphony", 2.5).is_err());
        synth.apply_setting("synth.reverb.active", 0.0).unwrap();
        assert!(!synth.settings().reverb_active);
        assert_eq!(
            synth.apply_setting("synth.nonsense", 1.0),
            Err(SynthError::UnknownSetting("synth.nonsense".to_owned()))
        );
    }

    #[test]
    fn test_reverb_preset_out_of_range() {
        let mut synth = engine(Default::default());
        synth.set_reverb_preset(4).unwrap();
        let before = synth.reverb_params();
        assert_eq!(synth.set_reverb_preset(5), Err(SynthError::ReverbPresetNotFound(5)));
        assert_eq!(synth.reverb_params(), before);
    }

    #[test]
    fn test_state_transitions() {
        let collector = Collector::new();
        let mut synth = with_font(&collector.handle(), Default::default());
        assert_eq!(synth.state(), SynthState::Clean);

        synth.note_on(0, 60, 100).unwrap();
        assert_eq!(synth.state(), SynthState::Playing);
        synth.note_off(0, 60).unwrap();
        synth.one_block();
        assert_eq!(synth.state(), SynthState::Quiet);

        synth.note_on(0, 60, 100).unwrap();
        synth.stop();
        assert_eq!(synth.voice_count(), 0);
        assert_eq!(synth.note_on(0, 60, 100), Err(SynthError::Stopped));
        let ticks = synth.ticks();
        assert!(synth.one_block().left(0).unwrap().iter().all(|&s| s == 0.0));
        assert_eq!(synth.ticks(), ticks + 64);

        synth.system_reset();
        assert_eq!(synth.state(), SynthState::Clean);
        assert_eq!(preset_name(&synth, 0).as_deref(), Some("base piano"));
        synth.note_on(0, 60, 100).unwrap();
    }

    #[test]
    fn test_system_reset_restores_channels() {
        let collector = Collector::new();
        let mut synth = with_font(&collector.handle(), Default::default());
        let reverb = PassThrough::default();
        let resets = Arc::clone(&reverb.resets);
        synth.set_reverb_unit(Box::new(reverb));
        synth.program_change(0, 1).unwrap();
        synth.note_on(0, 60, 100).unwrap();

        synth.system_reset();
        assert_eq!(synth.voice_count(), 0);
        assert_eq!(preset_name(&synth, 0).as_deref(), Some("base piano"));
        assert_eq!(resets.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_write_spans_blocks() {
        let collector = Collector::new();
        let mut synth = with_font(
            &collector.handle(),
            SynthSettings {
                block_size: 4,
                gain: 0.5,
                ..Default::default()
            },
        );
        synth.note_on(0, 60, 100).unwrap();

        let (mut left, mut right) = ([0.0; 6], [0.0; 6]);
        synth.write_f32(&mut left, &mut right);
        assert_eq!(left, [0.5; 6]);
        assert_eq!(synth.ticks(), 8);

        // The remaining two samples of the second block come first
        let mut interleaved = [0.0; 8];
        synth.write_interleaved_f32(&mut interleaved);
        assert_eq!(interleaved, [0.5; 8]);
        assert_eq!(synth.ticks(), 12);
    }

    #[test]
    fn test_write_s16_is_dithered() {
        let collector = Collector::new();
        let mut synth = with_font(
            &collector.handle(),
            SynthSettings {
                block_size: 16,
                gain: 0.5,
                ..Default::default()
            },
        );
        synth.note_on(0, 60, 100).unwrap();
        let (mut left, mut right) = ([0; 40], [0; 40]);
        synth.write_s16(&mut left, &mut right);
        for sample in left.iter().chain(right.iter()) {
            assert!((*sample as i32 - 16383).abs() <= 1);
        }

        let mut interleaved = [0; 20];
        synth.write_interleaved_s16(&mut interleaved);
        assert!(interleaved.iter().all(|&s| (s as i32 - 16383).abs() <= 1));
    }

    #[test]
    fn test_command_queue() {
        let collector = Collector::new();
        let handle = collector.handle();
        let mut synth = engine(Default::default());
        let id = synth.add_soundfont(test_font(&handle, "base"));
        let (mut tx, mut rx) = command_queue(16, &handle);
        tx.send_event(MidiEvent::from_raw(&[0x90, 60, 100])).unwrap();
        tx.send_event(MidiEvent::from_raw(&[0x91, 62, 100])).unwrap();
        tx.send(SynthCommand::AllSoundsOff(1)).unwrap();
        tx.send(SynthCommand::SetGain(20.0)).unwrap();
        tx.send(SynthCommand::RemoveSoundFont(id)).unwrap();

        assert_eq!(synth.apply_commands(&mut rx), 5);
        assert_eq!(synth.voice_count(), 1);
        assert_eq!(synth.gain(), SynthSettings::default().gain);
        assert_eq!(synth.soundfont_count(), 0);
    }

    #[test]
    fn test_queued_polyphony_never_grows_pool() {
        let collector = Collector::new();
        let handle = collector.handle();
        let mut synth = engine(SynthSettings {
            polyphony: 4,
            ..Default::default()
        });
        let (mut tx, mut rx) = command_queue(4, &handle);
        tx.send(SynthCommand::SetPolyphony(64)).unwrap();
        synth.apply_commands(&mut rx);
        assert_eq!(synth.polyphony(), 4);
        assert_eq!(synth.pool.capacity(), 8);

        tx.send(SynthCommand::SetPolyphony(2)).unwrap();
        synth.apply_commands(&mut rx);
        assert_eq!(synth.polyphony(), 2);
        assert_eq!(synth.pool.capacity(), 8);

        // Raising it again within the existing slots is fine
        tx.send(SynthCommand::SetPolyphony(4)).unwrap();
        synth.apply_commands(&mut rx);
        assert_eq!(synth.polyphony(), 4);
        assert_eq!(synth.settings().polyphony, 4);
    }

    impl TestEngine {
        fn pool_voices(&self) -> impl Iterator<Item = &ScriptedVoice> {
            self.pool.voice_states()
        }

        fn pool_voice(&self, n: usize) -> &ScriptedVoice {
            self.pool_voices().nth(n).unwrap()
        }
    }
}
