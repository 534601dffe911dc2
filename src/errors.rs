//! Recoverable error types.
//!
//! Only input that comes from outside the search lands here: textual bitmaps, persisted word
//! indexes and grid templates. Broken invariants inside the search (a word that conflicts with
//! fixed cells, an unknown quality tier, an out-of-range entry id) are panics, not errors.
//!
//! Each variant carries a short stable code for log lines and command line output:
//!
//! - B001: `BitVectorError::EmptyInput`
//! - B002: `BitVectorError::InvalidDigit`
//! - B003: `BitVectorError::LimbOutOfRange`
//! - I001: `IndexLoadError::Json`
//! - I002: `IndexLoadError::InvalidWord`
//! - I003: `IndexLoadError::UnsortedWords`
//! - I004: `IndexLoadError::InvalidBitmapKey`
//! - I005: `IndexLoadError::BitVector`
//! - I006: `IndexLoadError::BitmapMismatch`
//! - I007: `IndexLoadError::EmptyLength`
//! - G001: `GridError::CellCountMismatch`
//! - G002: `GridError::EmptyCell`
//! - G003: `GridError::BarOutOfRange`

use crate::bitvec::Radix;

/// Failure to decode a bit vector from text or raw limbs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitVectorError {
    #[error("empty bitmap string")]
    EmptyInput,

    #[error("invalid {radix} digit {digit:?}")]
    InvalidDigit { digit: char, radix: Radix },

    #[error("limb {limb:#x} does not fit in 30 bits")]
    LimbOutOfRange { limb: u32 },
}

impl BitVectorError {
    pub fn code(&self) -> &'static str {
        match self {
            BitVectorError::EmptyInput => "B001",
            BitVectorError::InvalidDigit { .. } => "B002",
            BitVectorError::LimbOutOfRange { .. } => "B003",
        }
    }
}

/// Failure to load a persisted word index. These come from external storage, so callers are
/// expected to recover (usually by rebuilding the index from the raw word list).
#[derive(Debug, thiserror::Error)]
pub enum IndexLoadError {
    #[error("malformed index document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("word {word:?} is not a valid entry of length {length}")]
    InvalidWord { length: usize, word: String },

    #[error("words of length {length} are not in index order")]
    UnsortedWords { length: usize },

    #[error("unrecognized bitmap key {key:?}")]
    InvalidBitmapKey { key: String },

    #[error("bad bitmap data: {0}")]
    BitVector(#[from] BitVectorError),

    #[error("bitmap {key:?} does not agree with the word list")]
    BitmapMismatch { key: String },

    #[error("no words listed under length {length}")]
    EmptyLength { length: usize },
}

impl IndexLoadError {
    pub fn code(&self) -> &'static str {
        match self {
            IndexLoadError::Json(_) => "I001",
            IndexLoadError::InvalidWord { .. } => "I002",
            IndexLoadError::UnsortedWords { .. } => "I003",
            IndexLoadError::InvalidBitmapKey { .. } => "I004",
            IndexLoadError::BitVector(_) => "I005",
            IndexLoadError::BitmapMismatch { .. } => "I006",
            IndexLoadError::EmptyLength { .. } => "I007",
        }
    }
}

/// Malformed grid input, rejected before any search starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("expected {expected} cells for the grid dimensions, got {actual}")]
    CellCountMismatch { expected: usize, actual: usize },

    #[error("cell {index} is an empty string")]
    EmptyCell { index: usize },

    #[error("bar at cell {index} is outside a grid of {cell_count} cells")]
    BarOutOfRange { index: usize, cell_count: usize },
}

impl GridError {
    pub fn code(&self) -> &'static str {
        match self {
            GridError::CellCountMismatch { .. } => "G001",
            GridError::EmptyCell { .. } => "G002",
            GridError::BarOutOfRange { .. } => "G003",
        }
    }
}
