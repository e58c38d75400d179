use super::buffer::AudioBufferMut;
use crate::convert::leftright_to_mono;
use std::io::Read;
use thiserror::Error;

/// Mono sample data referenced by soundfont zones and played back by voices.
#[derive(Clone)]
pub struct AudioSample {
    /// The rate the sample was recorded at.
    sample_rate: u32,
    data: Box<[f32]>,
    peak: Option<f32>,
}

impl AudioSample {
    pub fn new(sample_rate: u32, data: &[f32]) -> Self {
        Self {
            sample_rate,
            data: data.to_vec().into_boxed_slice(),
            peak: None,
        }
    }

    /// Builds a sample from a generator function evaluated at each sample index.
    pub fn from_fn(sample_rate: u32, length: usize, f: impl FnMut(usize) -> f32) -> Self {
        Self {
            sample_rate,
            data: (0..length).map(f).collect(),
            peak: None,
        }
    }

    pub fn read_wav(reader: impl Read) -> Result<Self, ReadSampleError> {
        let wav = hound::WavReader::new(reader)?;

        // Extract information from the file header
        let spec = wav.spec();
        let length = wav.duration() as usize;
        let sample_rate = spec.sample_rate;
        let channels = spec.channels;

        // Determine the maximum sample value, used to normalize the samples between -1.0 and 1.0
        let max_value = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Float, _) => 1,
            (_, 8) => 0x7f,
            (_, 16) => 0x7fff,
            (_, 24) => 0x7fffff,
            (_, 32) => 0x7fffffff,
            _ => return Err(ReadSampleError::BadFormat("Unsupported bit depth")),
        };
        let scale = (max_value as f32).recip();

        // Read the interlaced samples into a buffer, normalized to the range -1.0 to 1.0
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => wav
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 * scale))
                .collect::<Result<_, _>>(),
            hound::SampleFormat::Float => wav.into_samples::<f32>().collect(),
        }?;
        if samples.len() != channels as usize * length {
            return Err(ReadSampleError::UnexpectedError);
        }

        // Fold the channels down to mono
        let data = match channels {
            1 => samples.into_boxed_slice(),
            2 => {
                let (left, right): (Vec<f32>, Vec<f32>) =
                    samples.chunks_exact(2).map(|s| (s[0], s[1])).unzip();
                let mut mono = vec![0.0; length];
                leftright_to_mono(&left, &right, &mut mono);
                mono.into_boxed_slice()
            }
            _ => return Err(ReadSampleError::BadFormat("Unsupported number of channels")),
        };

        log::debug!("read {} frames of {} Hz audio", length, sample_rate);

        Ok(Self {
            sample_rate,
            data,
            peak: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Calculates the largest absolute sample value.
    pub fn analyze_peak(&mut self) -> f32 {
        *self
            .peak
            .get_or_insert_with(|| self.data.iter().fold(0.0, |peak, &s| f32::max(peak, s.abs())))
    }

    /// Normalizes the sample such that the most extreme sample reaches a value of -1.0 or 1.0.
    pub fn normalize(&mut self) {
        let scale = self.analyze_peak().recip();
        if !scale.is_finite() {
            return;
        }

        (&mut self.data[..]).scale(scale);
        self.peak = Some(1.0);
    }
}

#[derive(Error, Debug)]
pub enum ReadSampleError {
    #[error("IO error: {0}")]
    IoError(std::io::Error),
    #[error("Format error: {0}")]
    BadFormat(&'static str),
    #[error("Unexpected error")]
    UnexpectedError,
}

impl From<hound::Error> for ReadSampleError {
    fn from(err: hound::Error) -> Self {
        use hound::Error as A;
        use ReadSampleError as B;
        match err {
            A::IoError(inner) => B::IoError(inner),
            A::FormatError(inner) => B::BadFormat(inner),
            A::Unsupported => B::BadFormat("Unsupported format"),
            _ => B::UnexpectedError,
        }
    }
}
