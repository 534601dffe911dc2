//! The grid model: entries, crossings, and the per-entry candidate bitmaps layered on top of the
//! word index.
//!
//! A `Grid` is a value. Deciding an entry never touches the grid it's called on; it returns a
//! fresh grid (or nothing, if the choice leads straight to a contradiction), so a search can
//! abandon a branch simply by dropping it. The geometry that never changes during a fill
//! (entry cells and crossings) is shared between all grids derived from the same template.

use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use bit_set::BitSet;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::bitvec::BitVector;
use crate::errors::GridError;
use crate::word_index::WordIndex;
use crate::{CellId, EntryId, BLANK, BLOCK, MAX_ENTRY_LENGTH};

/// The caller's description of a grid to fill: row-major cell strings plus bar positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridTemplate {
    /// `BLOCK`, `BLANK`, or the letter (or rebus text) already in the cell.
    pub cells: Vec<String>,
    pub width: usize,
    pub height: usize,
    /// Cells with a bar along their right edge, splitting across entries.
    #[serde(default)]
    pub vbars: Vec<CellId>,
    /// Cells with a bar along their bottom edge, splitting down entries.
    #[serde(default)]
    pub hbars: Vec<CellId>,
}

impl GridTemplate {
    pub fn new(cells: &[&str], width: usize, height: usize) -> GridTemplate {
        GridTemplate {
            cells: cells.iter().map(|cell| cell.to_string()).collect(),
            width,
            height,
            vbars: vec![],
            hbars: vec![],
        }
    }

    pub fn with_bars(mut self, vbars: &[CellId], hbars: &[CellId]) -> GridTemplate {
        self.vbars = vbars.to_vec();
        self.hbars = hbars.to_vec();
        self
    }
}

/// Contents of a single square.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Block,
    Blank,
    /// A letter, or several for a rebus square.
    Fill(String),
}

impl Cell {
    fn parse(text: &str) -> Option<Cell> {
        match text {
            "" => None,
            BLOCK => Some(Cell::Block),
            BLANK => Some(Cell::Blank),
            fill => Some(Cell::Fill(fill.to_uppercase())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Cell::Block => BLOCK,
            Cell::Blank => BLANK,
            Cell::Fill(fill) => fill,
        }
    }

    /// The single letter in this cell, if it holds exactly one.
    fn letter(&self) -> Option<char> {
        match self {
            Cell::Fill(fill) => {
                let mut chars = fill.chars();
                match (chars.next(), chars.next()) {
                    (Some(letter), None) => Some(letter),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Direction that an entry is facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Across,
    Down,
}

/// A crossing between one entry and another, referencing the other entry's id and the location
/// of the intersection within the other entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crossing {
    pub other_entry_id: EntryId,
    pub other_entry_cell: usize,
}

/// The aspects of an entry that are static during filling.
#[derive(Debug)]
pub struct EntryConfig {
    pub id: EntryId,
    pub direction: Direction,
    pub cells: SmallVec<[CellId; MAX_ENTRY_LENGTH]>,
    pub crossings: SmallVec<[Option<Crossing>; MAX_ENTRY_LENGTH]>,
}

struct Layout {
    index: Arc<WordIndex>,
    width: usize,
    height: usize,
    entry_configs: Vec<EntryConfig>,
}

/// The live state of an entry in one particular grid.
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: EntryId,
    pub length: usize,
    /// Words of `length` still consistent with this entry's fixed cells. `None` means no cell is
    /// fixed yet; an empty bitmap on an open entry means the grid can't be filled.
    pub bitmap: Option<BitVector>,
    /// Lower bound on the cost of this entry's eventual word (or the actual cost once decided).
    pub min_cost: f64,
    pub completed_word: Option<String>,
}

impl Entry {
    pub fn is_open(&self) -> bool {
        self.completed_word.is_none()
    }

    fn is_unfillable(&self) -> bool {
        self.is_open() && self.bitmap.as_ref().is_some_and(BitVector::is_zero)
    }
}

/// Find the runs of non-block cells along one axis. `lines` yields the cells of each row (or
/// column) in order; a run ends at a block, at the end of the line, or after a barred cell.
fn find_runs<Lines, Line>(
    cells: &[Cell],
    lines: Lines,
    bars: &BitSet,
) -> Vec<SmallVec<[CellId; MAX_ENTRY_LENGTH]>>
where
    Lines: Iterator<Item = Line>,
    Line: Iterator<Item = CellId>,
{
    let mut runs = vec![];

    for line in lines {
        let mut current: SmallVec<[CellId; MAX_ENTRY_LENGTH]> = smallvec![];

        for cell_id in line {
            if cells[cell_id] == Cell::Block {
                if current.len() > 1 {
                    runs.push(current);
                }
                current = smallvec![];
                continue;
            }

            current.push(cell_id);
            if bars.contains(cell_id) {
                if current.len() > 1 {
                    runs.push(current);
                }
                current = smallvec![];
            }
        }

        if current.len() > 1 {
            runs.push(current);
        }
    }

    runs
}

/// A crossword in the middle of being filled.
#[derive(Clone)]
pub struct Grid {
    layout: Arc<Layout>,
    cells: Vec<Cell>,
    entries: Vec<Entry>,
    used_words: FxHashSet<String>,
}

impl Debug for Grid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("width", &self.layout.width)
            .field("height", &self.layout.height)
            .field("open_entries", &self.open_entry_ids().count())
            .field("used_words", &self.used_words.len())
            .field("cells", &render_cells(&self.to_cells(), self.layout.width))
            .finish()
    }
}

impl Grid {
    /// Build a grid from a template. Across entries are numbered first (row by row), then down
    /// entries (column by column). Entries that are already complete seed the used-word set.
    pub fn from_template(index: Arc<WordIndex>, template: &GridTemplate) -> Result<Grid, GridError> {
        let (width, height) = (template.width, template.height);
        let cell_count = width * height;

        if template.cells.len() != cell_count {
            return Err(GridError::CellCountMismatch {
                expected: cell_count,
                actual: template.cells.len(),
            });
        }

        let cells: Vec<Cell> = template
            .cells
            .iter()
            .enumerate()
            .map(|(cell_id, text)| Cell::parse(text).ok_or(GridError::EmptyCell { index: cell_id }))
            .collect::<Result<_, _>>()?;

        let parse_bars = |bars: &[CellId]| -> Result<BitSet, GridError> {
            let mut result = BitSet::with_capacity(cell_count);
            for &index in bars {
                if index >= cell_count {
                    return Err(GridError::BarOutOfRange { index, cell_count });
                }
                result.insert(index);
            }
            Ok(result)
        };
        let vbars = parse_bars(&template.vbars)?;
        let hbars = parse_bars(&template.hbars)?;

        let across_runs = find_runs(
            &cells,
            (0..height).map(|row| (0..width).map(move |col| row * width + col)),
            &vbars,
        );
        let down_runs = find_runs(
            &cells,
            (0..width).map(|col| (0..height).map(move |row| row * width + col)),
            &hbars,
        );

        // (entry id, position in entry) for every entry passing through each cell.
        let mut entries_by_cell: Vec<SmallVec<[(EntryId, usize); 2]>> = vec![smallvec![]; cell_count];
        let runs: Vec<(Direction, SmallVec<[CellId; MAX_ENTRY_LENGTH]>)> = across_runs
            .into_iter()
            .map(|run| (Direction::Across, run))
            .chain(down_runs.into_iter().map(|run| (Direction::Down, run)))
            .collect();
        for (entry_id, (_, run)) in runs.iter().enumerate() {
            for (position, &cell_id) in run.iter().enumerate() {
                entries_by_cell[cell_id].push((entry_id, position));
            }
        }

        let entry_configs: Vec<EntryConfig> = runs
            .into_iter()
            .enumerate()
            .map(|(id, (direction, cells))| {
                let crossings = cells
                    .iter()
                    .map(|&cell_id| {
                        entries_by_cell[cell_id]
                            .iter()
                            .find(|&&(other_id, _)| other_id != id)
                            .map(|&(other_entry_id, other_entry_cell)| Crossing {
                                other_entry_id,
                                other_entry_cell,
                            })
                    })
                    .collect();
                EntryConfig { id, direction, cells, crossings }
            })
            .collect();

        let mut used_words: FxHashSet<String> = FxHashSet::default();
        let entries: Vec<Entry> = entry_configs
            .iter()
            .map(|config| {
                let length = config.cells.len();
                let is_complete = config.cells.iter().all(|&cell_id| cells[cell_id] != Cell::Blank);

                if is_complete {
                    let word: String = config.cells.iter().map(|&cell_id| cells[cell_id].as_str()).collect();
                    used_words.insert(word.clone());
                    return Entry {
                        id: config.id,
                        length,
                        bitmap: None,
                        min_cost: 0.0,
                        completed_word: Some(word),
                    };
                }

                let pattern: String = config
                    .cells
                    .iter()
                    .map(|&cell_id| cells[cell_id].letter().unwrap_or(' '))
                    .collect();
                let bitmap = if index.words_of_length(length).is_empty() {
                    Some(BitVector::zero())
                } else {
                    index.matching_bitmap(&pattern)
                };
                let min_cost = match &bitmap {
                    Some(bits) if bits.is_zero() => f64::INFINITY,
                    bitmap => index.min_cost(length, bitmap.as_ref()),
                };

                Entry { id: config.id, length, bitmap, min_cost, completed_word: None }
            })
            .collect();

        let grid = Grid {
            layout: Arc::new(Layout { index, width, height, entry_configs }),
            cells,
            entries,
            used_words,
        };
        log::debug!(
            "Built {}x{} grid with {} entries ({} open)",
            width,
            height,
            grid.entries.len(),
            grid.open_entry_ids().count()
        );

        Ok(grid)
    }

    pub fn width(&self) -> usize {
        self.layout.width
    }

    pub fn height(&self) -> usize {
        self.layout.height
    }

    pub fn index(&self) -> &Arc<WordIndex> {
        &self.layout.index
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry(&self, entry_id: EntryId) -> &Entry {
        &self.entries[entry_id]
    }

    pub fn entry_config(&self, entry_id: EntryId) -> &EntryConfig {
        &self.layout.entry_configs[entry_id]
    }

    pub fn used_words(&self) -> &FxHashSet<String> {
        &self.used_words
    }

    pub fn open_entry_ids(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.entries.iter().filter(|entry| entry.is_open()).map(|entry| entry.id)
    }

    /// True once every entry has a word.
    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(|entry| !entry.is_open())
    }

    /// True if this grid provably can't be completed: some open entry has no candidates left, or
    /// the same word already appears in two entries.
    pub fn is_dead_end(&self) -> bool {
        let completed_count = self.entries.iter().filter(|entry| !entry.is_open()).count();
        self.entries.iter().any(Entry::is_unfillable) || self.used_words.len() < completed_count
    }

    /// The entry's known letters with spaces for blanks. Rebus squares also show as blanks.
    pub fn pattern(&self, entry_id: EntryId) -> String {
        self.entry_config(entry_id)
            .cells
            .iter()
            .map(|&cell_id| self.cells[cell_id].letter().unwrap_or(' '))
            .collect()
    }

    /// How many words could still go in this entry.
    pub fn candidate_count(&self, entry_id: EntryId) -> usize {
        let entry = &self.entries[entry_id];
        match &entry.bitmap {
            Some(bits) => bits.bit_count(),
            None => self.layout.index.words_of_length(entry.length).len(),
        }
    }

    /// How many open entries cross this one at a still-blank cell.
    pub fn open_crossing_count(&self, entry_id: EntryId) -> usize {
        let config = self.entry_config(entry_id);
        config
            .crossings
            .iter()
            .zip(&config.cells)
            .filter(|(crossing, &cell_id)| {
                self.cells[cell_id] == Cell::Blank
                    && crossing.is_some_and(|crossing| self.entries[crossing.other_entry_id].is_open())
            })
            .count()
    }

    /// Sum of every entry's cost bound. Never more than the cost of any completion of this grid.
    pub fn min_grid_cost(&self) -> f64 {
        self.entries.iter().map(|entry| entry.min_cost).sum()
    }

    /// Commit `word` to an entry, returning the resulting grid, or `None` if the choice is a dead
    /// end: a crossing entry is left with no candidates, or a word would appear twice.
    ///
    /// Panics if `word` has the wrong length or conflicts with a letter already in the entry;
    /// callers are expected to pick words from the entry's own candidates.
    pub fn with_entry_decided(&self, entry_id: EntryId, word: &str, cost: f64) -> Option<Grid> {
        let index = &self.layout.index;
        let config = self.entry_config(entry_id);
        let letters: SmallVec<[char; MAX_ENTRY_LENGTH]> = word.chars().collect();

        if letters.len() != config.cells.len() {
            panic!("Word {word:?} doesn't fit the {} cells of entry {entry_id}", config.cells.len());
        }
        if self.used_words.contains(word) {
            return None;
        }

        let mut cells = self.cells.clone();
        let mut entries = self.entries.clone();
        let mut used_words = self.used_words.clone();
        let mut touched: SmallVec<[EntryId; MAX_ENTRY_LENGTH]> = smallvec![];

        for (cell_idx, (&cell_id, &letter)) in config.cells.iter().zip(&letters).enumerate() {
            match &self.cells[cell_id] {
                Cell::Blank => {
                    cells[cell_id] = Cell::Fill(letter.to_string());

                    if let Some(crossing) = config.crossings[cell_idx] {
                        let other = &mut entries[crossing.other_entry_id];
                        let bitmap = index.update_bitmap(
                            other.length,
                            other.bitmap.as_ref(),
                            crossing.other_entry_cell,
                            letter,
                        );
                        if bitmap.is_zero() {
                            return None;
                        }
                        other.bitmap = Some(bitmap);
                        touched.push(crossing.other_entry_id);
                    }
                }
                fill @ Cell::Fill(_) => {
                    // Rebus squares are left as they are.
                    if let Some(existing) = fill.letter() {
                        if existing != letter {
                            panic!(
                                "Word {word:?} conflicts with {existing:?} at cell {cell_id} of entry {entry_id}"
                            );
                        }
                    }
                }
                Cell::Block => panic!("Entry {entry_id} runs through a block at cell {cell_id}"),
            }
        }

        let decided = &mut entries[entry_id];
        decided.completed_word = Some(word.to_string());
        decided.min_cost = cost;
        used_words.insert(word.to_string());

        for other_id in touched {
            let other_config = self.entry_config(other_id);
            if other_config.cells.iter().all(|&cell_id| cells[cell_id] != Cell::Blank) {
                let completed: String =
                    other_config.cells.iter().map(|&cell_id| cells[cell_id].as_str()).collect();
                if !used_words.insert(completed.clone()) {
                    return None;
                }
                entries[other_id].completed_word = Some(completed);
            }

            let other = &mut entries[other_id];
            other.min_cost = index.min_cost(other.length, other.bitmap.as_ref());
        }

        Some(Grid {
            layout: self.layout.clone(),
            cells,
            entries,
            used_words,
        })
    }

    /// Partition the open entries (optionally only those in `scope`) into groups that are
    /// connected through shared blank cells. Filling one group can't change the candidates of
    /// another. Groups are returned in order of their lowest entry id.
    pub fn stable_subsets(&self, scope: Option<&BitSet>) -> Vec<BitSet> {
        let entry_count = self.entries.len();
        let open: BitSet = self
            .open_entry_ids()
            .filter(|&entry_id| scope.map_or(true, |scope| scope.contains(entry_id)))
            .collect();

        let mut seen = BitSet::with_capacity(entry_count);
        let mut subsets = vec![];

        for start in open.iter() {
            if !seen.insert(start) {
                continue;
            }

            let mut subset = BitSet::with_capacity(entry_count);
            let mut to_visit = vec![start];

            while let Some(entry_id) = to_visit.pop() {
                subset.insert(entry_id);

                let config = self.entry_config(entry_id);
                for (crossing, &cell_id) in config.crossings.iter().zip(&config.cells) {
                    let Some(crossing) = crossing else {
                        continue;
                    };
                    if self.cells[cell_id] != Cell::Blank {
                        continue;
                    }
                    if open.contains(crossing.other_entry_id) && seen.insert(crossing.other_entry_id) {
                        to_visit.push(crossing.other_entry_id);
                    }
                }
            }

            subsets.push(subset);
        }

        subsets
    }

    /// The cells as template strings, row-major.
    pub fn to_cells(&self) -> Vec<String> {
        self.cells.iter().map(|cell| cell.as_str().to_string()).collect()
    }
}

/// Render flattened cells as rows of text, with `#` for blocks and `.` for blanks.
pub fn render_cells(cells: &[String], width: usize) -> String {
    cells
        .chunks(width.max(1))
        .map(|row| {
            row.iter()
                .map(|cell| match cell.as_str() {
                    BLOCK => "#",
                    BLANK => ".",
                    fill => fill,
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
