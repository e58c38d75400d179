pub mod buffer;
pub mod interpolate;
pub mod sample;
