//! Crossword autofill: a cooperatively scheduled backtracking search that fills the blank cells
//! of a partially completed grid with dictionary words, never repeating a word.

pub mod autofill;
pub mod bitvec;
pub mod errors;
pub mod grid;
pub mod logging;
pub mod word_index;
pub mod worker;

pub use autofill::{AutofillOptions, Autofiller, SearchState, Statistics};
pub use bitvec::{BitVector, Radix};
pub use errors::{BitVectorError, GridError, IndexLoadError};
pub use grid::{render_cells, Cell, Direction, Entry, Grid, GridTemplate};
pub use word_index::{ScoredWord, WordIndex};
pub use worker::{Worker, WorkerCommand, WorkerEvent};

/// The expected maximum length for a single entry. Longer entries still work, they just spill
/// their per-cell data onto the heap.
pub const MAX_ENTRY_LENGTH: usize = 21;

/// Cell marker for a blocked square in a `GridTemplate`.
pub const BLOCK: &str = ".";

/// Cell marker for an empty square in a `GridTemplate`.
pub const BLANK: &str = " ";

/// Index of a cell in the flat, row-major cell array.
pub type CellId = usize;

/// Index of an entry in the grid's entry list (across entries first, then down).
pub type EntryId = usize;

/// Index of a word within its length bucket of the word index; also its bit position in any
/// candidate bitmap for that length.
pub type WordId = usize;
