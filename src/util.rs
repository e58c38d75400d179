use std::f32::consts::FRAC_PI_4;

/// Converts a relative gain in dB to the corresponding voltage ratio/scaling factor.
pub fn scale_from_gain(gain: f32) -> f32 {
    10.0_f32.powf(gain / 20.0)
}

/// Converts a pitch interval in cents to a frequency ratio.
pub fn ratio_from_cents(cents: f64) -> f64 {
    2.0f64.powf(cents / 1200.0)
}

/// Converts a MIDI velocity into an amplitude factor, using a squared curve.
pub fn scale_from_velocity(velocity: u8) -> f32 {
    let v = velocity.min(127) as f32 / 127.0;
    v * v
}

/// Constant power pan law, where `pan` ranges from -1.0 (left) to 1.0 (right).
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// Converts a raw 14-bit pitch bend into cents, given the bend range in cents.
pub fn cents_from_pitch_bend(bend: u16, range_cents: f32) -> f32 {
    const MID_POINT: f32 = 8192.0; // No bend
    ((bend.min(0x3fff) as f32 - MID_POINT) / MID_POINT) * range_cents
}
