pub trait Interpolator {
    /// Returns the number of samples needed on each side of the interpolated pair
    /// to perform the interpolation.
    fn window() -> usize;

    /// Performs the interpolation.
    fn interpolate(t: f32, samples: &[f32]) -> f32;
}

pub struct CubicInterpolator;

impl Interpolator for CubicInterpolator {
    #[inline]
    fn window() -> usize {
        1
    }

    #[inline]
    fn interpolate(t: f32, samples: &[f32]) -> f32 {
        let a0 = samples[1];
        let a1 =
            -(1.0 / 3.0) * samples[0] - (0.5) * samples[1] + samples[2] - (1.0 / 6.0) * samples[3];
        let a2 = (0.5) * (samples[0] + samples[2]) - samples[1];
        let a3 = (0.5) * (samples[1] - samples[2]) + (1.0 / 6.0) * (samples[3] - samples[0]);
        let x2 = t * t;
        let x3 = x2 * t;
        a0 + a1 * t + a2 * x2 + a3 * x3
    }
}

/// Gathers the interpolation window around `idx` from `data`, resolving
/// out-of-range positions through `wrap` (looping) or as silence.
///
/// Returns the four points `[idx - 1, idx, idx + 1, idx + 2]`.
#[inline]
pub fn window4(data: &[f32], idx: usize, wrap: Option<(usize, usize)>) -> [f32; 4] {
    let fetch = |pos: isize| -> f32 {
        let pos = match wrap {
            Some((start, end)) if end > start && pos >= end as isize => {
                start as isize + (pos - end as isize) % (end - start) as isize
            }
            _ => pos,
        };
        if pos < 0 {
            0.0
        } else {
            data.get(pos as usize).copied().unwrap_or(0.0)
        }
    };
    let idx = idx as isize;
    [fetch(idx - 1), fetch(idx), fetch(idx + 1), fetch(idx + 2)]
}
