/// Volume envelope parameters of a zone, with times in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnvelopeParams {
    /// Time before the attack phase begins.
    pub delay: f32,
    pub attack: f32,
    /// Time spent at full level before decaying.
    pub hold: f32,
    pub decay: f32,
    /// Sustain level between 0 and 1.
    pub sustain: f32,
    pub release: f32,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            delay: 0.0,
            attack: 0.001,
            hold: 0.0,
            decay: 1.0,
            sustain: 1.0,
            release: 0.05,
        }
    }
}

/// Shortest phase duration, avoids dividing by zero for instantaneous phases.
const MIN_TIME: f32 = 0.0001;

#[derive(Clone, Copy)]
pub struct AdsrEnvelope {
    /// Duration of a sample in seconds.
    inv_sample_rate: f32,
    /// Delay rate in inverse seconds.
    inv_delay: f32,
    /// Attack rate in inverse seconds.
    inv_attack: f32,
    /// Hold rate in inverse seconds.
    inv_hold: f32,
    /// Decay rate in inverse seconds.
    inv_decay: f32,
    /// Sustain level between 0 and 1.
    sustain: f32,
    /// Release rate in inverse seconds.
    inv_release: f32,
    /// The current envelope state.
    state: AdsrState,
    /// The current amplitude.
    amp: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum AdsrState {
    Delay {
        t: f32,
    },
    Attack {
        /// The amplitude the attack phase started at
        start: f32,
        /// The progress of the attack phase between 0 and 1.
        t: f32,
    },
    Hold {
        t: f32,
    },
    Decay {
        /// The progress of the decay phase between 0 and 1.
        t: f32,
    },
    Sustain,
    Release {
        /// The amplitude the release phase started at
        start: f32,
        /// The progress of the release phase between 0 and 1.
        t: f32,
    },
    Inactive,
}

impl Default for AdsrEnvelope {
    fn default() -> Self {
        Self::new(EnvelopeParams::default())
    }
}

impl AdsrEnvelope {
    pub fn new(params: EnvelopeParams) -> Self {
        let mut envelope = Self {
            inv_sample_rate: 0.0,
            inv_delay: 0.0,
            inv_attack: 0.0,
            inv_hold: 0.0,
            inv_decay: 0.0,
            sustain: 1.0,
            inv_release: 0.0,
            state: AdsrState::Inactive,
            amp: 0.0,
        };
        envelope.set_params(params);
        envelope
    }

    pub fn set_params(&mut self, params: EnvelopeParams) {
        self.inv_delay = params.delay.max(MIN_TIME).recip();
        self.inv_attack = params.attack.max(MIN_TIME).recip();
        self.inv_hold = params.hold.max(MIN_TIME).recip();
        self.inv_decay = params.decay.max(MIN_TIME).recip();
        self.sustain = params.sustain.clamp(0.0, 1.0);
        self.inv_release = params.release.max(MIN_TIME).recip();
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.inv_sample_rate = sample_rate.recip();
    }

    pub fn trigger(&mut self) {
        self.state = AdsrState::Delay { t: 0.0 };
    }

    pub fn release(&mut self) {
        if self.active() {
            self.state = AdsrState::Release {
                start: self.amp,
                t: 0.0,
            };
        }
    }

    /// Silences the envelope immediately.
    pub fn kill(&mut self) {
        self.state = AdsrState::Inactive;
        self.amp = 0.0;
    }

    pub fn active(&self) -> bool {
        !matches!(self.state, AdsrState::Inactive)
    }

    pub fn released(&self) -> bool {
        matches!(self.state, AdsrState::Release { .. })
    }

    /// The amplitude most recently produced.
    pub fn level(&self) -> f32 {
        self.amp
    }

    pub fn process(&mut self) -> f32 {
        use AdsrState::*;
        match self.state {
            Delay { mut t } => {
                self.amp = 0.0;
                t += self.inv_delay * self.inv_sample_rate;
                if t < 1.0 {
                    self.state = Delay { t };
                } else {
                    self.state = Attack { start: 0.0, t: 0.0 };
                }
            }
            Attack { start, mut t } => {
                self.amp = start + (1.0 - start) * t;
                t += self.inv_attack * self.inv_sample_rate;
                if t < 1.0 {
                    self.state = Attack { start, t };
                } else {
                    self.state = Hold { t: 0.0 };
                }
            }
            Hold { mut t } => {
                self.amp = 1.0;
                t += self.inv_hold * self.inv_sample_rate;
                if t < 1.0 {
                    self.state = Hold { t };
                } else {
                    self.state = Decay { t: 0.0 };
                }
            }
            Decay { mut t } => {
                self.amp = 1.0 - t * (1.0 - self.sustain);
                t += self.inv_decay * self.inv_sample_rate;
                if t < 1.0 {
                    self.state = Decay { t };
                } else {
                    self.state = Sustain;
                }
            }
            Sustain => self.amp = self.sustain,
            Release { start, mut t } => {
                self.amp = start * (1.0 - t);
                t += self.inv_release * self.inv_sample_rate;
                if t < 1.0 {
                    self.state = Release { start, t };
                } else {
                    self.state = Inactive;
                }
            }
            Inactive => self.amp = 0.0,
        }

        self.amp
    }
}
