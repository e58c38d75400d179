pub trait AudioBuffer<'a>: Sized {
    fn samples(self) -> &'a [f32];
}

pub trait AudioBufferMut<'a>: AudioBuffer<'a> {
    fn samples_mut(self) -> &'a mut [f32];

    /// Multiplies the samples by `scale`.
    fn scale(self, scale: f32) {
        for sample in self.samples_mut().iter_mut() {
            *sample *= scale;
        }
    }

    /// Adds the samples from `other` to the samples in this buffer.
    fn add<'b>(self, other: impl AudioBuffer<'b>) {
        let samples_in = other.samples();
        let samples_out = self.samples_mut();
        assert!(samples_in.len() == samples_out.len());
        for (s_out, s_in) in samples_out.iter_mut().zip(samples_in.iter()) {
            *s_out += *s_in;
        }
    }
}

impl<'a> AudioBuffer<'a> for &'a [f32] {
    fn samples(self) -> &'a [f32] {
        self
    }
}

impl<'a> AudioBuffer<'a> for &'a mut [f32] {
    fn samples(self) -> &'a [f32] {
        self
    }
}

impl<'a> AudioBufferMut<'a> for &'a mut [f32] {
    fn samples_mut(self) -> &'a mut [f32] {
        self
    }
}

/// A read-only view of a stereo signal.
#[derive(Clone, Copy)]
pub struct StereoBuffer<'a> {
    pub left: &'a [f32],
    pub right: &'a [f32],
}

impl<'a> StereoBuffer<'a> {
    pub fn new(left: &'a [f32], right: &'a [f32]) -> Self {
        assert!(left.len() == right.len());
        Self { left, right }
    }

    pub fn len(&self) -> usize {
        // Both channels must have the same length
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// A stereo mixing target, such as one output group or the dry output of a voice.
pub struct StereoBufferMut<'a> {
    pub left: &'a mut [f32],
    pub right: &'a mut [f32],
}

impl<'a> StereoBufferMut<'a> {
    pub fn new(left: &'a mut [f32], right: &'a mut [f32]) -> Self {
        assert!(left.len() == right.len());
        Self { left, right }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Reborrows the buffer for a shorter lifetime.
    pub fn as_mut(&mut self) -> StereoBufferMut<'_> {
        StereoBufferMut::new(self.left, self.right)
    }

    /// Multiplies both channels by `scale`.
    pub fn scale(&mut self, scale: f32) {
        self.left.scale(scale);
        self.right.scale(scale);
    }

    /// Adds `other` into this buffer.
    pub fn add(&mut self, other: StereoBuffer) {
        self.left.add(other.left);
        self.right.add(other.right);
    }
}
