use rand::{rngs::StdRng, Rng, SeedableRng};

/// Number of entries in each channel of the dither table.
pub const DITHER_SIZE: usize = 48000;

/// Interleaves the two channels of a stereo signal.
pub fn interleave_stereo(left: &[f32], right: &[f32], output: &mut [f32]) {
    let lr = left.iter().zip(right.iter());
    for (i, (&ls, &rs)) in lr.enumerate() {
        output[2 * i] = ls;
        output[2 * i + 1] = rs;
    }
}

/// Converts a LR signal to a mono signal
pub fn leftright_to_mono(left: &[f32], right: &[f32], mono: &mut [f32]) {
    let lr = left.iter().zip(right.iter());
    for ((&l, &r), m) in lr.zip(mono.iter_mut()) {
        *m = 0.5 * (l + r);
    }
}

/// Precomputed triangular dither noise for float to 16-bit conversion, one row per channel.
pub struct DitherTable {
    table: [Box<[f32]>; 2],
}

impl DitherTable {
    /// Creates a dither table from a fixed seed so renders are reproducible.
    pub fn new() -> Self {
        Self::with_rng(&mut StdRng::seed_from_u64(0x5eed))
    }

    pub fn with_rng(rng: &mut impl Rng) -> Self {
        let mut row = || {
            // Differences of uniform noise give a triangular distribution which
            // sums to zero over the whole table.
            let mut table = vec![0.0; DITHER_SIZE];
            let mut prev = 0.0;
            for entry in table[..DITHER_SIZE - 1].iter_mut() {
                let d = rng.gen::<f32>() - 0.5;
                *entry = d - prev;
                prev = d;
            }
            table[DITHER_SIZE - 1] = -prev;
            table.into_boxed_slice()
        };
        Self { table: [row(), row()] }
    }

    #[inline]
    pub fn get(&self, channel: usize, index: usize) -> f32 {
        self.table[channel & 1][index % DITHER_SIZE]
    }
}

impl Default for DitherTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a float sample to a 16-bit integer with the given dither offset.
#[inline]
pub fn s16_from_float(sample: f32, dither: f32) -> i16 {
    let value = (sample * 32766.0 + dither).round();
    value.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Converts a stereo float signal into 16-bit samples, writing to separate channel buffers.
/// Returns the dither index to use for the next call.
pub fn write_s16(
    left_in: &[f32],
    right_in: &[f32],
    left_out: &mut [i16],
    right_out: &mut [i16],
    dither: &DitherTable,
    mut index: usize,
) -> usize {
    let lr_in = left_in.iter().zip(right_in.iter());
    let lr_out = left_out.iter_mut().zip(right_out.iter_mut());
    for ((&l, &r), (lo, ro)) in lr_in.zip(lr_out) {
        *lo = s16_from_float(l, dither.get(0, index));
        *ro = s16_from_float(r, dither.get(1, index));
        index = (index + 1) % DITHER_SIZE;
    }
    index
}

/// Converts a stereo float signal into interleaved 16-bit samples.
/// Returns the dither index to use for the next call.
pub fn write_interleaved_s16(
    left_in: &[f32],
    right_in: &[f32],
    output: &mut [i16],
    dither: &DitherTable,
    mut index: usize,
) -> usize {
    let lr_in = left_in.iter().zip(right_in.iter());
    for ((&l, &r), frame) in lr_in.zip(output.chunks_exact_mut(2)) {
        frame[0] = s16_from_float(l, dither.get(0, index));
        frame[1] = s16_from_float(r, dither.get(1, index));
        index = (index + 1) % DITHER_SIZE;
    }
    index
}
