//! Microtonal tuning definitions and the 128 x 128 table that holds them.

use crate::error::SynthError;

/// Identifies a slot in the tuning table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TuningId {
    pub bank: u8,
    pub program: u8,
}

impl TuningId {
    pub fn new(bank: u8, program: u8) -> Result<Self, SynthError> {
        if bank > 127 || program > 127 {
            return Err(SynthError::TuningNotFound { bank, program });
        }
        Ok(Self { bank, program })
    }

    fn index(&self) -> usize {
        self.bank as usize * 128 + self.program as usize
    }

    fn from_index(index: usize) -> Self {
        Self {
            bank: (index / 128) as u8,
            program: (index % 128) as u8,
        }
    }
}

/// Pitch in cents for every MIDI key.
#[derive(Clone, Debug, PartialEq)]
pub struct Tuning {
    name: String,
    id: TuningId,
    pitch: [f64; 128],
}

impl Tuning {
    /// Creates an equal tempered tuning, where key `k` sounds at `100 * k` cents.
    pub fn new(name: &str, id: TuningId) -> Self {
        Self {
            name: name.to_owned(),
            id,
            pitch: core::array::from_fn(|key| 100.0 * key as f64),
        }
    }

    /// Creates a tuning from an explicit pitch for every key.
    pub fn from_keys(name: &str, id: TuningId, pitch: &[f64; 128]) -> Self {
        Self {
            name: name.to_owned(),
            id,
            pitch: *pitch,
        }
    }

    /// Creates a tuning which repeats every octave, with `deviation[n]` cents added
    /// to every key whose pitch class is `n`.
    pub fn from_octave(name: &str, id: TuningId, deviation: &[f64; 12]) -> Self {
        Self {
            name: name.to_owned(),
            id,
            pitch: core::array::from_fn(|key| 100.0 * key as f64 + deviation[key % 12]),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> TuningId {
        self.id
    }

    /// The pitch of `key` in cents.
    pub fn pitch(&self, key: u8) -> f64 {
        self.pitch[key.min(127) as usize]
    }

    pub fn pitches(&self) -> &[f64; 128] {
        &self.pitch
    }

    pub fn set_pitch(&mut self, key: u8, cents: f64) {
        self.pitch[key.min(127) as usize] = cents;
    }
}

const TABLE_SIZE: usize = 128 * 128;

/// The bank x program grid of tunings, with a cursor for enumerating defined entries.
pub struct TuningTable {
    /// Allocated on first insertion.
    tunings: Vec<Option<Box<Tuning>>>,
    /// Flat index of the next slot to inspect during iteration.
    cursor: usize,
}

impl Default for TuningTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TuningTable {
    pub fn new() -> Self {
        Self {
            tunings: Vec::new(),
            cursor: TABLE_SIZE,
        }
    }

    /// Inserts a tuning at its own id, replacing any existing definition.
    pub fn insert(&mut self, tuning: Tuning) -> Option<Tuning> {
        if self.tunings.is_empty() {
            self.tunings.resize_with(TABLE_SIZE, || None);
        }
        let idx = tuning.id().index();
        self.tunings[idx].replace(Box::new(tuning)).map(|old| *old)
    }

    pub fn get(&self, id: TuningId) -> Option<&Tuning> {
        self.tunings.get(id.index()).and_then(|t| t.as_deref())
    }

    pub fn get_mut(&mut self, id: TuningId) -> Option<&mut Tuning> {
        self.tunings.get_mut(id.index()).and_then(|t| t.as_deref_mut())
    }

    pub fn contains(&self, id: TuningId) -> bool {
        self.get(id).is_some()
    }

    /// Removes a tuning. An iteration in progress continues with the slots after the cursor,
    /// so deleting any entry (including the one last returned) never invalidates it.
    pub fn remove(&mut self, id: TuningId) -> Option<Tuning> {
        self.tunings.get_mut(id.index()).and_then(|t| t.take()).map(|t| *t)
    }

    pub fn len(&self) -> usize {
        self.tunings.iter().filter(|t| t.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.tunings.iter().all(|t| t.is_none())
    }

    /// Rewinds the cursor to the first slot.
    pub fn iteration_start(&mut self) {
        self.cursor = 0;
    }

    /// Returns the next defined tuning after the cursor, in bank-major order.
    pub fn iteration_next(&mut self) -> Option<TuningId> {
        while self.cursor < self.tunings.len() {
            let idx = self.cursor;
            self.cursor += 1;
            if self.tunings[idx].is_some() {
                return Some(TuningId::from_index(idx));
            }
        }
        self.cursor = TABLE_SIZE;
        None
    }
}
