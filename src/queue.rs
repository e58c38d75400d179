//! Lock-free command queue from the control thread to the audio thread.

use crate::{midi::MidiEvent, soundfont::SoundFontId};
use basedrop::Handle;
use ringbuf_basedrop as ringbuf;

/// A request applied by the engine at the next block boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum SynthCommand {
    Midi(MidiEvent),
    SetGain(f32),
    /// Only applied within the voice slots already allocated.
    SetPolyphony(usize),
    SetReverbActive(bool),
    SetChorusActive(bool),
    SetReverbPreset(usize),
    AllNotesOff(usize),
    AllSoundsOff(usize),
    /// Unloads a soundfont. Its memory is reclaimed by the collector, not the audio thread.
    RemoveSoundFont(SoundFontId),
    SystemReset,
}

pub struct CommandSender {
    channel: ringbuf::Producer<SynthCommand>,
}

pub struct CommandReceiver {
    channel: ringbuf::Consumer<SynthCommand>,
}

/// Creates a bounded queue holding up to `capacity` pending commands.
pub fn command_queue(capacity: usize, handle: &Handle) -> (CommandSender, CommandReceiver) {
    let (tx, rx) = ringbuf::RingBuffer::new(capacity).split(handle);
    (CommandSender { channel: tx }, CommandReceiver { channel: rx })
}

impl CommandSender {
    /// Queues a command, handing it back if the queue is full.
    pub fn send(&mut self, command: SynthCommand) -> Result<(), SynthCommand> {
        self.channel.push(command)
    }

    pub fn send_event(&mut self, event: MidiEvent) -> Result<(), SynthCommand> {
        self.send(SynthCommand::Midi(event))
    }

    pub fn is_full(&self) -> bool {
        self.channel.is_full()
    }
}

impl CommandReceiver {
    pub fn recv(&mut self) -> Option<SynthCommand> {
        self.channel.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use basedrop::Collector;

    #[test]
    fn test_commands_arrive_in_order() {
        let collector = Collector::new();
        let (mut tx, mut rx) = command_queue(4, &collector.handle());
        tx.send(SynthCommand::SetGain(0.5)).unwrap();
        tx.send_event(MidiEvent::ProgramChange {
            channel: 0,
            program: 3,
        })
        .unwrap();

        assert_eq!(rx.recv(), Some(SynthCommand::SetGain(0.5)));
        assert!(matches!(rx.recv(), Some(SynthCommand::Midi(_))));
        assert_eq!(rx.recv(), None);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_full_queue_returns_command() {
        let collector = Collector::new();
        let (mut tx, _rx) = command_queue(1, &collector.handle());
        tx.send(SynthCommand::SystemReset).unwrap();
        assert!(tx.is_full());
        assert_eq!(
            tx.send(SynthCommand::SetPolyphony(8)),
            Err(SynthCommand::SetPolyphony(8))
        );
    }
}
