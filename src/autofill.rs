//! The autofill search controller.
//!
//! An `Autofiller` runs a depth-first search over immutable `Grid` values, one bounded unit of
//! work per call to `step()`. The search frontier is an explicit stack of frames, each holding
//! the grid at that depth, the entry being decided there and how far through its candidates we
//! are. Backtracking is just popping a frame.

use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use instant::{Duration, Instant};

use crate::errors::GridError;
use crate::grid::{Grid, GridTemplate};
use crate::word_index::{tier_cost, ScoredWord, WordIndex};
use crate::EntryId;

/// Tuning knobs for a single search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutofillOptions {
    /// Abandon any branch whose lower-bound cost rises above this.
    pub cost_ceiling: Option<f64>,
}

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Searching,
    /// Either a fill was reported or every branch was exhausted.
    Completed,
    Cancelled,
}

/// A struct tracking statistics about the filling process.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    /// Calls to `step()` that did work.
    pub states: u64,
    /// Candidate words written into the grid.
    pub attempts: u64,
    pub dead_ends: u64,
    pub backtracks: u64,
    pub duration: Duration,
}

type ResultCallback = Box<dyn FnOnce(&GridTemplate, Vec<String>)>;
type CompleteCallback = Box<dyn FnOnce()>;

/// One choice point: the grid before deciding `entry_id`, and the candidates still to try.
struct Frame {
    grid: Grid,
    entry_id: EntryId,
    candidates: Arc<[ScoredWord]>,
    next: usize,
}

impl Frame {
    /// Advance to the next candidate that isn't already in the grid somewhere.
    fn next_candidate(&mut self) -> Option<ScoredWord> {
        while let Some(candidate) = self.candidates.get(self.next) {
            self.next += 1;
            if !self.grid.used_words().contains(&candidate.word) {
                return Some(candidate.clone());
            }
        }
        None
    }
}

/// Return a value representing how highly we should prioritize filling this entry, using the
/// "dom/ddeg" heuristic: remaining candidates divided by the number of open entries it crosses.
/// Lower is more urgent.
fn calculate_priority(grid: &Grid, entry_id: EntryId) -> u64 {
    let dom = grid.candidate_count(entry_id) as u64 * 1000;
    let ddeg = grid.open_crossing_count(entry_id) as u64;

    dom.checked_div(ddeg).unwrap_or(u64::MAX)
}

/// Pick the next entry to decide: the most urgent entry of the smallest independent region.
/// Returns `None` once there's nothing left open.
fn choose_entry(grid: &Grid) -> Option<EntryId> {
    let subsets = grid.stable_subsets(None);
    let smallest = subsets.iter().min_by_key(|subset| subset.len())?;

    smallest
        .iter()
        .min_by_key(|&entry_id| calculate_priority(grid, entry_id))
}

/// A resumable search for a single fill of one grid.
pub struct Autofiller {
    template: GridTemplate,
    options: AutofillOptions,
    state: SearchState,
    initial: Option<Grid>,
    stack: Vec<Frame>,
    statistics: Statistics,
    start: Instant,
    on_result: Option<ResultCallback>,
    on_complete: Option<CompleteCallback>,
}

impl Debug for Autofiller {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Autofiller")
            .field("state", &self.state)
            .field("depth", &self.stack.len())
            .field("statistics", &self.statistics)
            .finish()
    }
}

impl Autofiller {
    /// Build the initial grid and get ready to search. `on_result` gets the template back along
    /// with the flattened cells of the first complete fill; `on_complete` fires once when the
    /// search stops for any reason.
    pub fn new<OnResult, OnComplete>(
        index: Arc<WordIndex>,
        template: GridTemplate,
        options: AutofillOptions,
        on_result: OnResult,
        on_complete: OnComplete,
    ) -> Result<Autofiller, GridError>
    where
        OnResult: FnOnce(&GridTemplate, Vec<String>) + 'static,
        OnComplete: FnOnce() + 'static,
    {
        let grid = Grid::from_template(index, &template)?;

        log::debug!(
            "Starting autofill for {}x{} grid, {} open entries, min cost {}",
            template.width,
            template.height,
            grid.open_entry_ids().count(),
            grid.min_grid_cost()
        );

        Ok(Autofiller {
            template,
            options,
            state: SearchState::Searching,
            initial: Some(grid),
            stack: vec![],
            statistics: Statistics::default(),
            start: Instant::now(),
            on_result: Some(Box::new(on_result)),
            on_complete: Some(Box::new(on_complete)),
        })
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    /// True once the search has stopped, whether it finished or was cancelled.
    pub fn is_completed(&self) -> bool {
        self.state != SearchState::Searching
    }

    pub fn template(&self) -> &GridTemplate {
        &self.template
    }

    /// Counters so far. While searching, `duration` is the time since construction.
    pub fn statistics(&self) -> Statistics {
        let mut statistics = self.statistics.clone();
        if self.state == SearchState::Searching {
            statistics.duration = self.start.elapsed();
        }
        statistics
    }

    /// Do one unit of work: try the next candidate at the current choice point, or backtrack if
    /// there isn't one. Does nothing once the search has stopped.
    pub fn step(&mut self) {
        if self.state != SearchState::Searching {
            return;
        }
        self.statistics.states += 1;

        if let Some(grid) = self.initial.take() {
            self.descend(grid);
            if self.stack.is_empty() {
                self.complete();
            }
            return;
        }

        let depth = self.stack.len();
        let Some(frame) = self.stack.last_mut() else {
            self.complete();
            return;
        };

        let Some(candidate) = frame.next_candidate() else {
            log::trace!("Out of candidates for entry {}, backtracking", frame.entry_id);
            self.stack.pop();
            self.statistics.backtracks += 1;
            if self.stack.is_empty() {
                self.complete();
            }
            return;
        };

        self.statistics.attempts += 1;
        log::trace!(
            "Trying {} ({}) in entry {} at depth {}",
            candidate.word,
            candidate.score,
            frame.entry_id,
            depth
        );

        let decided = frame.grid.with_entry_decided(frame.entry_id, &candidate.word, tier_cost(candidate.score));
        match decided {
            Some(grid) => self.descend(grid),
            None => self.statistics.dead_ends += 1,
        }
    }

    /// Keep stepping until the search stops.
    pub fn run_to_completion(&mut self) {
        while self.state == SearchState::Searching {
            self.step();
        }
    }

    /// Stop searching and drop all search state. The completion callback fires if it hasn't
    /// already; nothing fires after this.
    pub fn cancel(&mut self) {
        if self.state != SearchState::Searching {
            return;
        }

        self.initial = None;
        self.stack.clear();
        self.on_result = None;
        self.finish(SearchState::Cancelled);
    }

    /// Push a choice point for `grid`, or report it if it's already full.
    fn descend(&mut self, grid: Grid) {
        if grid.is_dead_end() {
            self.statistics.dead_ends += 1;
            return;
        }

        if let Some(ceiling) = self.options.cost_ceiling {
            let cost = grid.min_grid_cost();
            if cost > ceiling {
                log::trace!("Pruning branch with min cost {cost} over ceiling {ceiling}");
                self.statistics.dead_ends += 1;
                return;
            }
        }

        let Some(entry_id) = choose_entry(&grid) else {
            self.report(&grid);
            self.stack.clear();
            self.complete();
            return;
        };

        let entry = grid.entry(entry_id);
        let candidates = grid.index().matching_words(entry.length, entry.bitmap.as_ref());
        self.stack.push(Frame { grid, entry_id, candidates, next: 0 });
    }

    fn report(&mut self, grid: &Grid) {
        if let Some(on_result) = self.on_result.take() {
            log::debug!("Found fill with cost {}", grid.min_grid_cost());
            on_result(&self.template, grid.to_cells());
        }
    }

    fn complete(&mut self) {
        self.finish(SearchState::Completed);
    }

    fn finish(&mut self, state: SearchState) {
        if self.state != SearchState::Searching {
            return;
        }

        self.state = state;
        self.statistics.duration = self.start.elapsed();
        log::info!("Autofill {:?}: {:?}", state, self.statistics);

        if let Some(on_complete) = self.on_complete.take() {
            on_complete();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AutofillOptions, Autofiller, SearchState};
    use crate::grid::GridTemplate;
    use crate::word_index::WordIndex;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorded {
        results: Vec<Vec<String>>,
        completions: usize,
    }

    fn start_autofill(words: &str, template: GridTemplate, options: AutofillOptions) -> (Autofiller, Rc<RefCell<Recorded>>) {
        let recorded = Rc::new(RefCell::new(Recorded::default()));
        let on_result = {
            let recorded = recorded.clone();
            move |_: &GridTemplate, cells: Vec<String>| recorded.borrow_mut().results.push(cells)
        };
        let on_complete = {
            let recorded = recorded.clone();
            move || recorded.borrow_mut().completions += 1
        };

        let autofiller = Autofiller::new(
            Arc::new(WordIndex::build(words)),
            template,
            options,
            on_result,
            on_complete,
        )
        .unwrap();

        (autofiller, recorded)
    }

    fn two_by_two(cells: &[&str]) -> GridTemplate {
        GridTemplate::new(cells, 2, 2)
    }

    #[test]
    fn test_fills_two_by_two() {
        let (mut autofiller, recorded) =
            start_autofill("AB;1\nAC;1\nBD;1\nCD;1", two_by_two(&["A", "B", " ", " "]), AutofillOptions::default());

        autofiller.run_to_completion();

        assert_eq!(autofiller.state(), SearchState::Completed);
        assert_eq!(recorded.borrow().results, vec![vec!["A", "B", "C", "D"]]);
        assert_eq!(recorded.borrow().completions, 1);

        let statistics = autofiller.statistics();
        println!("{:?}", statistics);
        assert_eq!(statistics.attempts, 2);
        assert_eq!(statistics.backtracks, 0);
    }

    #[test]
    fn test_infeasible_grid_completes_without_result() {
        let (mut autofiller, recorded) =
            start_autofill("AB;1\nAC;1\nBD;1\nDC;1", two_by_two(&["A", "B", " ", " "]), AutofillOptions::default());

        autofiller.run_to_completion();

        assert!(autofiller.is_completed());
        assert!(recorded.borrow().results.is_empty());
        assert_eq!(recorded.borrow().completions, 1);
        assert_eq!(autofiller.statistics().attempts, 1);
        assert_eq!(autofiller.statistics().backtracks, 2);
    }

    #[test]
    fn test_words_are_not_repeated() {
        for cells in [["A", "B", " ", " "], ["A", " ", " ", " "]] {
            let (mut autofiller, recorded) =
                start_autofill("AB;1\nBC;1\nBD;1\nDC;1", two_by_two(&cells), AutofillOptions::default());

            autofiller.run_to_completion();

            assert!(recorded.borrow().results.is_empty(), "{cells:?}");
            assert_eq!(recorded.borrow().completions, 1);
        }
    }

    #[test]
    fn test_bar_makes_grid_feasible() {
        let template = two_by_two(&["A", "B", " ", " "]).with_bars(&[2], &[]);
        let (mut autofiller, recorded) = start_autofill("AB;1\nAC;1\nBD;1\nDC;1", template, AutofillOptions::default());

        autofiller.run_to_completion();

        assert_eq!(recorded.borrow().results, vec![vec!["A", "B", "C", "D"]]);
    }

    #[test]
    fn test_complete_template_is_reported_immediately() {
        let (mut autofiller, recorded) =
            start_autofill("AB;1\nCD;1\nAC;1\nBD;1", two_by_two(&["A", "B", "C", "D"]), AutofillOptions::default());

        autofiller.step();

        assert!(autofiller.is_completed());
        assert_eq!(recorded.borrow().results, vec![vec!["A", "B", "C", "D"]]);
        assert_eq!(recorded.borrow().completions, 1);
    }

    #[test]
    fn test_dead_end_template() {
        let (mut autofiller, recorded) =
            start_autofill("AB;1", two_by_two(&["Z", " ", " ", " "]), AutofillOptions::default());

        autofiller.step();

        assert_eq!(autofiller.state(), SearchState::Completed);
        assert!(recorded.borrow().results.is_empty());
        assert_eq!(recorded.borrow().completions, 1);
    }

    #[test]
    fn test_cost_ceiling_prunes_expensive_fills() {
        let words = "AB;3\nAC;3\nBD;3\nCD;0";
        let cells = ["A", "B", " ", " "];

        let (mut autofiller, recorded) = start_autofill(words, two_by_two(&cells), AutofillOptions::default());
        autofiller.run_to_completion();
        assert_eq!(recorded.borrow().results.len(), 1);

        let options = AutofillOptions { cost_ceiling: Some(5.0) };
        let (mut autofiller, recorded) = start_autofill(words, two_by_two(&cells), options);
        autofiller.run_to_completion();
        assert!(recorded.borrow().results.is_empty());
        assert_eq!(recorded.borrow().completions, 1);
        assert!(autofiller.statistics().dead_ends > 0);
    }

    #[test]
    fn test_cancel() {
        let (mut autofiller, recorded) =
            start_autofill("AB;1\nAC;1\nBD;1\nCD;1", two_by_two(&["A", "B", " ", " "]), AutofillOptions::default());

        autofiller.step();
        assert_eq!(autofiller.state(), SearchState::Searching);

        autofiller.cancel();
        assert_eq!(autofiller.state(), SearchState::Cancelled);
        assert_eq!(recorded.borrow().completions, 1);

        // Nothing happens after cancellation.
        autofiller.run_to_completion();
        autofiller.step();
        autofiller.cancel();
        assert!(recorded.borrow().results.is_empty());
        assert_eq!(recorded.borrow().completions, 1);
    }

    #[test]
    fn test_steps_after_completion_are_ignored() {
        let (mut autofiller, recorded) =
            start_autofill("AB;1\nAC;1\nBD;1\nCD;1", two_by_two(&["A", "B", " ", " "]), AutofillOptions::default());

        autofiller.run_to_completion();
        let states = autofiller.statistics().states;

        autofiller.step();
        autofiller.cancel();

        assert_eq!(autofiller.state(), SearchState::Completed);
        assert_eq!(autofiller.statistics().states, states);
        assert_eq!(recorded.borrow().results.len(), 1);
        assert_eq!(recorded.borrow().completions, 1);
    }

    #[test]
    fn test_fills_three_by_three_with_blocks() {
        let words = "CAT;3\nCOT;2\nTOE;3\nARE;1\nACT;1\nTEA;2\nOAT;1\nATE;3\nCAR;2\nTOT;0";
        let template = GridTemplate::new(&[" ", " ", " ", " ", ".", " ", " ", " ", " "], 3, 3);
        let (mut autofiller, recorded) = start_autofill(words, template, AutofillOptions::default());

        autofiller.run_to_completion();

        let recorded = recorded.borrow();
        assert_eq!(recorded.results.len(), 1);
        let cells = &recorded.results[0];
        let row = |start: usize| cells[start..start + 3].concat();
        let column = |start: usize| [0, 3, 6].iter().map(|offset| cells[start + offset].as_str()).collect::<String>();

        let words = [row(0), row(6), column(0), column(2)];
        let unique: std::collections::HashSet<_> = words.iter().collect();
        assert_eq!(unique.len(), 4, "{words:?}");
        println!("{}", crate::grid::render_cells(cells, 3));
    }

    #[test]
    fn test_rejects_bad_template() {
        let result = Autofiller::new(
            Arc::new(WordIndex::build("AB;1")),
            GridTemplate::new(&[" "; 3], 2, 2),
            AutofillOptions::default(),
            |_, _| {},
            || {},
        );
        assert!(result.is_err());
    }
}
