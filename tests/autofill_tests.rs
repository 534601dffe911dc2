//! Integration tests for the autofill engine: index queries, whole searches through the public
//! API, and the same searches driven through the background worker.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use autofill::{
    AutofillOptions, Autofiller, BitVector, GridTemplate, Radix, SearchState, Worker, WorkerCommand, WorkerEvent,
    WordIndex,
};

const SUCCESS_WORDS: &str = "AB;1\nAC;1\nBD;1\nCD;1";
const INFEASIBLE_WORDS: &str = "AB;1\nAC;1\nBD;1\nDC;1";
const REPEAT_WORDS: &str = "AB;1\nBC;1\nBD;1\nDC;1";

/// Run a search to the end, returning every reported fill and the number of completions.
fn fill(words: &str, template: GridTemplate) -> (Vec<Vec<String>>, usize) {
    let results = Rc::new(RefCell::new(vec![]));
    let completions = Rc::new(RefCell::new(0));

    let mut autofiller = Autofiller::new(
        Arc::new(WordIndex::build(words)),
        template,
        AutofillOptions::default(),
        {
            let results = results.clone();
            move |_: &GridTemplate, cells: Vec<String>| results.borrow_mut().push(cells)
        },
        {
            let completions = completions.clone();
            move || *completions.borrow_mut() += 1
        },
    )
    .unwrap();

    autofiller.run_to_completion();
    assert_eq!(autofiller.state(), SearchState::Completed);

    let results = results.borrow().clone();
    let completions = *completions.borrow();
    (results, completions)
}

fn two_by_two(cells: &[&str]) -> GridTemplate {
    GridTemplate::new(cells, 2, 2)
}

fn pairs(words: &[autofill::ScoredWord]) -> Vec<(&str, u32)> {
    words.iter().map(|scored| (scored.word.as_str(), scored.score)).collect()
}

#[cfg(test)]
mod word_index {
    use super::*;

    #[test]
    fn test_pattern_queries() {
        let index = WordIndex::build("TEST;50\nBEST;60\nTESTER;50");

        let query = |pattern: &str| {
            let bitmap = index.matching_bitmap(pattern);
            index.matching_words(pattern.len(), bitmap.as_ref())
        };

        assert_eq!(pairs(&query("TE  ")), vec![("TEST", 50)]);
        assert_eq!(pairs(&query(" E  ")), vec![("BEST", 60), ("TEST", 50)]);
        assert!(query(" F  ").is_empty());
        assert_eq!(pairs(&query(" E    ")), vec![("TESTER", 50)]);
    }

    #[test]
    fn test_queries_are_repeatable() {
        let index = WordIndex::build("TEST;50\nBEST;60\nTESTER;50");

        let first = index.matching_bitmap(" E  ");
        let first_words = index.matching_words(4, first.as_ref());
        for _ in 0..3 {
            let again = index.matching_bitmap(" E  ");
            assert_eq!(again, first);
            assert_eq!(index.matching_words(4, again.as_ref()), first_words);
        }
    }

    #[test]
    fn test_persisted_index_drives_a_search() {
        let json = WordIndex::build(SUCCESS_WORDS).to_json().unwrap();
        let index = WordIndex::from_json(&json).unwrap();

        let result = Rc::new(RefCell::new(None));
        let mut autofiller = Autofiller::new(
            Arc::new(index),
            two_by_two(&["A", "B", " ", " "]),
            AutofillOptions::default(),
            {
                let result = result.clone();
                move |_: &GridTemplate, cells: Vec<String>| *result.borrow_mut() = Some(cells)
            },
            || {},
        )
        .unwrap();
        autofiller.run_to_completion();

        assert_eq!(result.borrow().clone(), Some(vec!["A", "B", "C", "D"].into_iter().map(String::from).collect()));
    }

    #[test]
    fn test_bitmap_text_forms() {
        let bits = BitVector::from_str_radix("v0000001", Radix::Base32).unwrap();
        let base64 = bits.to_str_radix(Radix::Base64);

        assert_eq!(BitVector::from_str_radix(&base64, Radix::Base64).unwrap(), bits);
        assert_eq!(bits.to_str_radix(Radix::Base32), "v0000001");
        assert_eq!(bits.bit_length(), 40);
    }
}

#[cfg(test)]
mod search {
    use super::*;

    #[test]
    fn test_fills_two_by_two() {
        let (results, completions) = fill(SUCCESS_WORDS, two_by_two(&["A", "B", " ", " "]));

        assert_eq!(results, vec![vec!["A", "B", "C", "D"]]);
        assert_eq!(completions, 1);
    }

    #[test]
    fn test_infeasible_grid() {
        let (results, completions) = fill(INFEASIBLE_WORDS, two_by_two(&["A", "B", " ", " "]));

        assert!(results.is_empty());
        assert_eq!(completions, 1);
    }

    #[test]
    fn test_no_repeated_words() {
        for cells in [["A", "B", " ", " "], ["A", " ", " ", " "]] {
            let (results, completions) = fill(REPEAT_WORDS, two_by_two(&cells));

            assert!(results.is_empty(), "{cells:?} filled as {results:?}");
            assert_eq!(completions, 1);
        }
    }

    #[test]
    fn test_bar_unblocks_infeasible_grid() {
        let template = two_by_two(&["A", "B", " ", " "]).with_bars(&[2], &[]);
        let (results, _) = fill(INFEASIBLE_WORDS, template);

        assert_eq!(results, vec![vec!["A", "B", "C", "D"]]);
    }

    #[test]
    fn test_fills_open_three_by_three() {
        let words = "CAT;3\nORE;2\nWED;2\nCOW;3\nARE;3\nTED;1\nCAR;2\nOAT;1\nTOE;2\nWET;1";
        let (results, completions) = fill(words, GridTemplate::new(&[" "; 9], 3, 3));

        assert_eq!(completions, 1);
        assert_eq!(results.len(), 1);

        let cells = &results[0];
        let dictionary: HashSet<&str> = words.lines().filter_map(|line| line.split(';').next()).collect();
        let rows: Vec<String> = (0..3).map(|row| cells[row * 3..row * 3 + 3].concat()).collect();
        let columns: Vec<String> = (0..3)
            .map(|col| (0..3).map(|row| cells[row * 3 + col].as_str()).collect())
            .collect();

        let entries: Vec<&String> = rows.iter().chain(&columns).collect();
        for entry in &entries {
            assert!(dictionary.contains(entry.as_str()), "{entry} isn't a word");
        }
        assert_eq!(entries.iter().collect::<HashSet<_>>().len(), 6, "{entries:?}");
        println!("{}", autofill::render_cells(cells, 3));
    }

    #[test]
    fn test_rejects_malformed_grid() {
        let error = Autofiller::new(
            Arc::new(WordIndex::build(SUCCESS_WORDS)),
            two_by_two(&[" "; 4]).with_bars(&[7], &[]),
            AutofillOptions::default(),
            |_, _| {},
            || {},
        )
        .unwrap_err();

        assert_eq!(error.code(), "G003");
    }
}

#[cfg(test)]
mod worker {
    use super::*;

    fn events_until_complete(worker: &Worker) -> Vec<WorkerEvent> {
        let mut events = vec![];
        loop {
            let event = worker.events().recv_timeout(Duration::from_secs(10)).unwrap();
            let done = event == WorkerEvent::Complete;
            events.push(event);
            if done {
                return events;
            }
        }
    }

    #[test]
    fn test_worker_runs_several_searches() {
        let worker = Worker::spawn().unwrap();
        worker.load_index(Arc::new(WordIndex::build(SUCCESS_WORDS)));
        assert_eq!(
            worker.events().recv_timeout(Duration::from_secs(10)).unwrap(),
            WorkerEvent::IndexLoaded { word_count: 4 }
        );

        let template = two_by_two(&["A", "B", " ", " "]);
        worker.run(template.clone(), AutofillOptions::default());
        let events = events_until_complete(&worker);
        assert!(matches!(&events[..], [WorkerEvent::Result { .. }, WorkerEvent::Complete]));

        worker.send(WorkerCommand::LoadWordList(INFEASIBLE_WORDS.to_string()));
        worker.run(template, AutofillOptions::default());
        let events = events_until_complete(&worker);
        assert_eq!(events, vec![WorkerEvent::IndexLoaded { word_count: 4 }, WorkerEvent::Complete]);
    }

    #[test]
    fn test_worker_cancel() {
        let worker = Worker::spawn().unwrap();
        worker.load_index(Arc::new(WordIndex::build(SUCCESS_WORDS)));
        worker.run(two_by_two(&["A", "B", " ", " "]), AutofillOptions::default());
        worker.cancel();

        let events = events_until_complete(&worker);
        let results = events.iter().filter(|event| matches!(event, WorkerEvent::Result { .. })).count();
        assert!(results <= 1, "{events:?}");
        assert!(worker.events().recv_timeout(Duration::from_millis(100)).is_err());
    }
}
