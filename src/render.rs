use crate::{
    audio::buffer::{StereoBuffer, StereoBufferMut},
    effects::Effects,
    settings::SynthSettings,
    voice::{pool::VoicePool, Voice, VoiceOutput},
};

/// Mixing buffers for one block, reused from block to block.
pub struct BlockRenderer {
    block_size: usize,
    audio_groups: usize,
    /// Left and right buffers for every output channel or group.
    buffers: Vec<[Vec<f32>; 2]>,
    reverb: Vec<f32>,
    chorus: Vec<f32>,
}

impl BlockRenderer {
    pub fn new(settings: &SynthSettings) -> Self {
        let block_size = settings.block_size;
        Self {
            block_size,
            audio_groups: settings.audio_groups,
            buffers: (0..settings.buffer_count())
                .map(|_| [vec![0.0; block_size], vec![0.0; block_size]])
                .collect(),
            reverb: vec![0.0; block_size],
            chorus: vec![0.0; block_size],
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn clear(&mut self) {
        for [left, right] in &mut self.buffers {
            left.fill(0.0);
            right.fill(0.0);
        }
        self.reverb.fill(0.0);
        self.chorus.fill(0.0);
    }

    /// Renders one block: mixes every sounding voice into the buffer of its channel's
    /// group, adds the effect returns, applies `gain` and finally frees the slots
    /// of voices that finished.
    pub fn render<V: Voice>(&mut self, pool: &mut VoicePool<V>, effects: &mut Effects, gain: f32) {
        self.clear();

        let groups = self.audio_groups;
        let Self {
            buffers,
            reverb,
            chorus,
            ..
        } = self;
        pool.process(|channel, voice| {
            let [left, right] = &mut buffers[channel % groups];
            voice.process(VoiceOutput {
                dry: StereoBufferMut::new(left, right),
                reverb: &mut reverb[..],
                chorus: &mut chorus[..],
            })
        });

        if let Some([left, right]) = buffers.first_mut() {
            effects.process_mix(reverb, chorus, StereoBufferMut::new(left, right));
        }

        for [left, right] in buffers.iter_mut() {
            StereoBufferMut::new(left, right).scale(gain);
        }

        pool.reclaim_finished();
    }

    /// Produces a block of silence.
    pub fn render_silence(&mut self) {
        self.clear();
    }

    pub fn block(&self) -> Block<'_> {
        Block {
            buffers: &self.buffers,
        }
    }
}

/// The output of one rendered block, as one stereo pair per output channel or group.
#[derive(Clone, Copy)]
pub struct Block<'a> {
    buffers: &'a [[Vec<f32>; 2]],
}

impl<'a> Block<'a> {
    /// Number of samples in the block.
    pub fn len(&self) -> usize {
        self.buffers.first().map_or(0, |[left, _]| left.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stereo pairs.
    pub fn channel_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn stereo(&self, channel: usize) -> Option<StereoBuffer<'a>> {
        self.buffers
            .get(channel)
            .map(|[left, right]| StereoBuffer::new(left, right))
    }

    pub fn left(&self, channel: usize) -> Option<&'a [f32]> {
        self.stereo(channel).map(|buf| buf.left)
    }

    pub fn right(&self, channel: usize) -> Option<&'a [f32]> {
        self.stereo(channel).map(|buf| buf.right)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        testing::{scripted_zone, PassThrough, ScriptedVoice},
        voice::{Modulation, NoteContext, NoteId},
    };
    use basedrop::Collector;

    fn note(note_id: u64, channel: usize) -> NoteContext {
        NoteContext {
            note_id: NoteId(note_id),
            channel,
            key: 60,
            velocity: 100,
            pitch: 6000.0,
        }
    }

    #[test]
    fn test_routes_channels_to_groups() {
        let collector = Collector::new();
        let zone = scripted_zone(&collector.handle());
        let settings = SynthSettings {
            audio_channels: 2,
            audio_groups: 2,
            block_size: 4,
            ..Default::default()
        };
        let mut renderer = BlockRenderer::new(&settings);
        let mut pool = VoicePool::<ScriptedVoice>::new(4, 44100.0);
        let mut effects = Effects::new(44100.0, false, false);
        for (id, channel) in [(1, 0), (2, 1), (3, 3)] {
            let idx = pool.allocate(NoteId(id)).unwrap();
            pool.start(idx, &zone, &note(id, channel), &Modulation::default());
        }

        renderer.render(&mut pool, &mut effects, 0.5);
        let block = renderer.block();
        assert_eq!(block.len(), 4);
        assert_eq!(block.channel_count(), 2);
        assert_eq!(block.left(0).unwrap(), [0.5; 4]);
        // Channels 1 and 3 both land in group 1
        assert_eq!(block.right(1).unwrap(), [1.0; 4]);
        assert!(block.left(2).is_none());
    }

    #[test]
    fn test_effect_returns_mixed_into_first_group() {
        let collector = Collector::new();
        let zone = scripted_zone(&collector.handle()).with_sends(0.5, 0.0);
        let settings = SynthSettings {
            block_size: 4,
            ..Default::default()
        };
        let mut renderer = BlockRenderer::new(&settings);
        let mut pool = VoicePool::<ScriptedVoice>::new(4, 44100.0);
        let mut effects = Effects::new(44100.0, true, true);
        effects.set_reverb_unit(Box::new(PassThrough::default()));
        let idx = pool.allocate(NoteId(1)).unwrap();
        pool.start(idx, &zone, &note(1, 0), &Modulation::default());

        renderer.render(&mut pool, &mut effects, 1.0);
        assert_eq!(renderer.block().left(0).unwrap(), [1.5; 4]);

        // Buffers are cleared for the next block
        pool.kill_all();
        renderer.render(&mut pool, &mut effects, 1.0);
        assert_eq!(renderer.block().left(0).unwrap(), [0.0; 4]);
    }

    #[test]
    fn test_finished_voice_renders_its_last_block() {
        let collector = Collector::new();
        let zone = scripted_zone(&collector.handle());
        let settings = SynthSettings {
            block_size: 2,
            ..Default::default()
        };
        let mut renderer = BlockRenderer::new(&settings);
        let mut pool = VoicePool::<ScriptedVoice>::new(4, 44100.0);
        let mut effects = Effects::new(44100.0, false, false);
        let idx = pool.allocate(NoteId(1)).unwrap();
        pool.start(idx, &zone, &note(1, 0), &Modulation::default());
        pool.note_off(0, 60, false);

        renderer.render(&mut pool, &mut effects, 1.0);
        assert_eq!(renderer.block().left(0).unwrap(), [1.0; 2]);
        assert_eq!(pool.in_use_count(), 0);
    }
}
