use basedrop::{Collector, Handle, Shared};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use midir::{Ignore, MidiInput};
use sfsynth::audio::sample::AudioSample;
use sfsynth::midi::MidiEvent;
use sfsynth::queue::{command_queue, CommandSender};
use sfsynth::soundfont::{
    drum_bank, LoopMode, MemoryPreset, MemorySoundFont, SharedSoundFont, Zone,
};
use sfsynth::voice::envelope::EnvelopeParams;
use sfsynth::{SynthEngine, SynthSettings};
use std::fs::File;
use std::io::BufReader;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Builds a soundfont with a melodic preset on program 0 and a small drum kit.
/// The instrument plays the given sample, or a generated tone if there is none.
fn demo_soundfont(sample: Option<AudioSample>, handle: &Handle) -> SharedSoundFont {
    let (sample, looped) = match sample {
        Some(sample) => (sample, false),
        None => {
            let period = 100;
            let tone = AudioSample::from_fn(44100, 44100, |i| {
                let phase = (i % period) as f32 / period as f32;
                0.5 * (2.0 * std::f32::consts::PI * phase).sin()
            });
            (tone, true)
        }
    };
    let len = sample.len();
    let sample = Shared::new(handle, sample);

    // 441 Hz tone with a 100 sample period lands just above A4
    let mut instrument = Zone::new(Shared::clone(&sample), 69).with_envelope(EnvelopeParams {
        attack: 0.005,
        decay: 0.8,
        sustain: 0.6,
        release: 0.3,
        ..Default::default()
    });
    if looped {
        instrument = instrument.with_loop(LoopMode::UntilRelease, 0, len);
    }

    let click = Shared::new(
        handle,
        AudioSample::from_fn(44100, 4410, |i| {
            let decay = (-(i as f32) / 400.0).exp();
            decay * if (i / 7) % 2 == 0 { 0.6 } else { -0.6 }
        }),
    );
    let hat = |key: u8, root: u8| {
        Zone::new(Shared::clone(&click), root)
            .with_keys(key..=key)
            .with_exclusive_class(1)
    };

    MemorySoundFont::new("demo")
        .with_preset(
            MemoryPreset::new("Instrument", 0, 0).with_zone(instrument.with_sends(0.2, 0.0)),
        )
        .with_preset(
            MemoryPreset::new("Kit", drum_bank(0), 0)
                .with_zone(hat(42, 60))
                .with_zone(hat(46, 48))
                .with_zone(Zone::new(Shared::clone(&click), 84).with_keys(36..=36)),
        )
        .into_shared(handle)
}

/// Plays an arpeggio with a hi-hat pattern on the drum channel.
fn spawn_arpeggio(commands: Arc<Mutex<CommandSender>>) {
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(500));
        let send = |event: MidiEvent| {
            if let Ok(mut commands) = commands.lock() {
                commands.send_event(event).ok();
            }
        };
        loop {
            for (step, offset) in [0, 4, 7, 12, 7, 4].into_iter().enumerate() {
                let key = 60 + offset;
                let hat = if step == 5 { 46 } else { 42 };
                send(MidiEvent::from_raw(&[0x90, key, 100]));
                send(MidiEvent::from_raw(&[0x99, hat, 90]));
                std::thread::sleep(Duration::from_millis(150));
                send(MidiEvent::from_raw(&[0x80, key, 0]));
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    });
}

fn main() {
    let collector = Collector::new();
    let handle = collector.handle();

    // Load the instrument sample, if one was given
    let sample = std::env::args().nth(1).map(|path| {
        let file = BufReader::new(File::open(&path).unwrap());
        let mut sample = AudioSample::read_wav(file).unwrap();
        sample.normalize();
        sample
    });

    // Set up the output device
    let host = cpal::default_host();
    let device = host.default_output_device().unwrap();
    let config = device.default_output_config().unwrap();
    let sample_format = config.sample_format();
    let mut stream_config: StreamConfig = config.into();
    stream_config.channels = 2;

    // Create the synth
    let settings = SynthSettings {
        sample_rate: stream_config.sample_rate.0 as f32,
        gain: 0.5,
        reverb_active: false,
        chorus_active: false,
        ..Default::default()
    };
    let mut synth: SynthEngine = SynthEngine::new(settings).unwrap();
    synth.add_soundfont(demo_soundfont(sample, &handle));

    let (tx, mut rx) = command_queue(1024, &handle);
    let commands = Arc::new(Mutex::new(tx));

    // Get or generate MIDI input
    let mut midi_in = MidiInput::new("MIDI input").unwrap();
    midi_in.ignore(Ignore::ActiveSense);
    let in_ports = midi_in.ports();
    let _connection;
    if let Some(port) = in_ports.first() {
        let commands = Arc::clone(&commands);
        let callback = move |_, message: &[u8], _: &mut ()| {
            let event = MidiEvent::from_raw(message);
            if event.is_invalid() {
                return;
            }
            if let Ok(mut commands) = commands.lock() {
                commands.send_event(event).ok();
            }
        };
        _connection = midi_in
            .connect(port, "midi-read-connection", callback, ())
            .unwrap();
    } else {
        println!("No MIDI input ports available.");
        spawn_arpeggio(Arc::clone(&commands));
    }

    let on_error = |err: cpal::StreamError| eprintln!("an error occurred on stream: {}", err);
    let stream = match sample_format {
        SampleFormat::I16 => device.build_output_stream(
            &stream_config,
            move |data: &mut [i16], _| {
                synth.apply_commands(&mut rx);
                synth.write_interleaved_s16(data);
            },
            on_error,
            None,
        ),
        _ => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _| {
                synth.apply_commands(&mut rx);
                synth.write_interleaved_f32(data);
            },
            on_error,
            None,
        ),
    }
    .unwrap();
    stream.play().unwrap();

    // Samples released by the audio thread are freed here
    let mut collector = collector;
    loop {
        collector.collect();
        std::thread::sleep(Duration::from_millis(100));
    }
}
