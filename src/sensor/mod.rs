//! Mock infrared sensor
//!
//! Produces batches of bounded random readings standing in for the output
//! of a 64-element infrared array, and renders them for the operator.
//!
//! ```text
//! ReadingRange ──► generate() ──► ReadingBatch ──► Presenter ──► stdout
//! ```

pub mod presenter;

use rand::Rng;
use std::fmt;

pub use presenter::{BatchSink, Presenter};

/// Number of readings in every batch
pub const BATCH_SIZE: usize = 64;

/// Closed range of reading values, `min <= max` by construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingRange {
    min: u16,
    max: u16,
}

impl ReadingRange {
    pub fn new(min: u16, max: u16) -> Option<Self> {
        (min <= max).then_some(Self { min, max })
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    pub fn contains(&self, value: u16) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl Default for ReadingRange {
    fn default() -> Self {
        Self {
            min: 0,
            max: u16::MAX,
        }
    }
}

impl fmt::Display for ReadingRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// One emission cycle worth of readings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingBatch {
    values: Vec<u16>,
}

impl ReadingBatch {
    pub fn values(&self) -> &[u16] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<u16> for ReadingBatch {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Generates a fresh batch from the thread-local random source
pub fn generate(range: ReadingRange) -> ReadingBatch {
    generate_with(&mut rand::thread_rng(), range)
}

/// Generates a batch of [`BATCH_SIZE`] readings, each sampled uniformly
/// and independently from `range`.
pub fn generate_with<R: Rng + ?Sized>(rng: &mut R, range: ReadingRange) -> ReadingBatch {
    (0..BATCH_SIZE)
        .map(|_| rng.gen_range(range.min..=range.max))
        .collect()
}
