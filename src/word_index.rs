//! The word index: a scored word list bucketed by length, plus one bitmap per
//! (length, letter, position) recording which words of that length have that letter there.
//!
//! Within a length bucket words are kept in ascending score order (ties in descending
//! alphabetical order), and a word's position in its bucket is its bit index in every bitmap for
//! that length. The buckets and the bitmaps are always built together from the same words; the
//! persisted form is only accepted after its bitmaps have been checked against a rebuild.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::bitvec::{BitVector, Radix};
use crate::errors::IndexLoadError;
use crate::WordId;

/// Fill cost for each quality tier. Tier 0 words are obscure and expensive, tier 3 words are
/// common and cheap.
pub const TIER_COSTS: [f64; 4] = [8.0, 4.0, 2.0, 1.0];

/// Characters treated as "any letter" in a pattern.
const WILDCARDS: [char; 2] = [' ', '?'];

/// Look up the fill cost for a quality tier. Panics on anything outside 0-3, since that means
/// the word list was built from the wrong kind of scores.
pub fn tier_cost(score: u32) -> f64 {
    match TIER_COSTS.get(score as usize) {
        Some(&cost) => cost,
        None => panic!("Unrecognized quality tier {score}"),
    }
}

/// A word together with its quality score.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(String, u32)", into = "(String, u32)")]
pub struct ScoredWord {
    pub word: String,
    pub score: u32,
}

impl ScoredWord {
    pub fn new(word: &str, score: u32) -> ScoredWord {
        ScoredWord { word: word.to_string(), score }
    }
}

impl From<(String, u32)> for ScoredWord {
    fn from((word, score): (String, u32)) -> ScoredWord {
        ScoredWord { word, score }
    }
}

impl From<ScoredWord> for (String, u32) {
    fn from(scored: ScoredWord) -> (String, u32) {
        (scored.word, scored.score)
    }
}

/// Ordering of words within a length bucket: ascending score, ties broken by descending word.
fn index_order(a: &ScoredWord, b: &ScoredWord) -> Ordering {
    a.score.cmp(&b.score).then_with(|| b.word.cmp(&a.word))
}

/// Identifies one of the per-position bitmaps. Encoded as `{length}{letter}{position}` in the
/// persisted form, e.g. `"4T0"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct BitmapKey {
    length: usize,
    letter: char,
    position: usize,
}

impl BitmapKey {
    fn encode(&self) -> String {
        format!("{}{}{}", self.length, self.letter, self.position)
    }

    fn parse(key: &str) -> Option<BitmapKey> {
        let letter_idx = key.find(|c: char| !c.is_ascii_digit())?;
        let (length_digits, rest) = key.split_at(letter_idx);
        let mut rest_chars = rest.chars();
        let letter = rest_chars.next().filter(char::is_ascii_uppercase)?;
        let position_digits = rest_chars.as_str();

        if length_digits.is_empty()
            || position_digits.is_empty()
            || !position_digits.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }

        let length: usize = length_digits.parse().ok()?;
        let position: usize = position_digits.parse().ok()?;
        (position < length).then_some(BitmapKey { length, letter, position })
    }
}

/// The serialized shape of a built index, as handed to and from external storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedIndex {
    /// Word length -> words of that length in index order.
    pub words: BTreeMap<usize, Vec<ScoredWord>>,
    /// Encoded bitmap key -> the bitmap's limbs.
    pub bitmaps: BTreeMap<String, Vec<u32>>,
}

fn build_bitmaps(words: &[Vec<ScoredWord>]) -> FxHashMap<BitmapKey, BitVector> {
    let mut bitmaps: FxHashMap<BitmapKey, BitVector> = FxHashMap::default();

    for (length, words_of_length) in words.iter().enumerate() {
        for (word_id, scored) in words_of_length.iter().enumerate() {
            for (position, letter) in scored.word.chars().enumerate() {
                bitmaps
                    .entry(BitmapKey { length, letter, position })
                    .or_insert_with(BitVector::zero)
                    .set_bit(word_id);
            }
        }
    }

    bitmaps
}

/// A read-only index over a scored word list. Build it once and share it between searches
/// behind an `Arc`; query results are memoized internally.
pub struct WordIndex {
    words: Vec<Vec<ScoredWord>>,
    bitmaps: FxHashMap<BitmapKey, BitVector>,
    bitmap_cache: Mutex<FxHashMap<String, Option<BitVector>>>,
    words_cache: Mutex<FxHashMap<(usize, String), Arc<[ScoredWord]>>>,
}

impl Debug for WordIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("WordIndex")
            .field("words", &format!("({} entries)", self.word_count()))
            .field("bitmaps", &format!("({} bitmaps)", self.bitmaps.len()))
            .finish()
    }
}

impl WordIndex {
    /// Build an index from newline-separated `WORD;score` records. Words are uppercased; records
    /// with non-letter characters, a missing score or a non-numeric score are skipped. When a word
    /// appears more than once its highest score wins.
    pub fn build(raw_word_list: &str) -> WordIndex {
        let mut best_scores: FxHashMap<String, u32> = FxHashMap::default();
        let mut skipped = 0usize;

        for line in raw_word_list.split('\n') {
            let line = line.trim_end_matches('\r').trim();
            if line.is_empty() {
                continue;
            }

            let Some((word, score)) = line.split_once(';') else {
                skipped += 1;
                continue;
            };
            let Ok(score) = score.trim().parse::<u32>() else {
                skipped += 1;
                continue;
            };
            let word = word.trim();
            if word.is_empty() || !word.chars().all(|c| c.is_ascii_alphabetic()) {
                skipped += 1;
                continue;
            }

            let best = best_scores.entry(word.to_ascii_uppercase()).or_insert(score);
            *best = (*best).max(score);
        }

        let mut words: Vec<Vec<ScoredWord>> = vec![];
        for (word, score) in best_scores {
            let length = word.len();
            if words.len() <= length {
                words.resize_with(length + 1, Vec::new);
            }
            words[length].push(ScoredWord { word, score });
        }
        for words_of_length in &mut words {
            words_of_length.sort_by(index_order);
        }

        let index = WordIndex::from_sorted_words(words);
        log::debug!(
            "Built word index: {} words, {} bitmaps, {} records skipped",
            index.word_count(),
            index.bitmaps.len(),
            skipped
        );
        index
    }

    fn from_sorted_words(words: Vec<Vec<ScoredWord>>) -> WordIndex {
        let bitmaps = build_bitmaps(&words);

        WordIndex {
            words,
            bitmaps,
            bitmap_cache: Mutex::new(FxHashMap::default()),
            words_cache: Mutex::new(FxHashMap::default()),
        }
    }

    /// Total number of words across all lengths.
    pub fn word_count(&self) -> usize {
        self.words.iter().map(Vec::len).sum()
    }

    /// The words of a given length in index order (worst first).
    pub fn words_of_length(&self, length: usize) -> &[ScoredWord] {
        self.words.get(length).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The word at a given bit index for a length. Panics if there's no such word.
    pub fn word(&self, length: usize, word_id: WordId) -> &ScoredWord {
        &self.words_of_length(length)[word_id]
    }

    /// Intersect the bitmaps for every fixed letter in `pattern`. Spaces and `?` are wildcards.
    /// Returns `None` if the pattern has no fixed letters at all, meaning "no constraint".
    pub fn matching_bitmap(&self, pattern: &str) -> Option<BitVector> {
        if let Some(cached) = self.lock_bitmap_cache().get(pattern) {
            return cached.clone();
        }

        let length = pattern.chars().count();
        let mut result: Option<BitVector> = None;

        for (position, letter) in pattern.chars().enumerate() {
            if WILDCARDS.contains(&letter) {
                continue;
            }

            let key = BitmapKey { length, letter: letter.to_ascii_uppercase(), position };
            let Some(bits) = self.bitmaps.get(&key) else {
                result = Some(BitVector::zero());
                break;
            };
            match &mut result {
                Some(current) => current.and_in_place(bits),
                None => result = Some(bits.clone()),
            }
        }

        self.lock_bitmap_cache().insert(pattern.to_string(), result.clone());
        result
    }

    /// The words of `length` selected by `bitmap` (all of them for `None`), best score first.
    pub fn matching_words(&self, length: usize, bitmap: Option<&BitVector>) -> Arc<[ScoredWord]> {
        let key = (
            length,
            bitmap.map(|bits| bits.to_str_radix(Radix::Base64)).unwrap_or_default(),
        );
        if let Some(cached) = self.lock_words_cache().get(&key) {
            return cached.clone();
        }

        let words_of_length = self.words_of_length(length);
        let matches: Arc<[ScoredWord]> = match bitmap {
            None => words_of_length.iter().rev().cloned().collect(),
            Some(bits) => bits.active_bits().map(|word_id| words_of_length[word_id].clone()).collect(),
        };

        self.lock_words_cache().insert(key, matches.clone());
        matches
    }

    /// A lower bound on the cost of whatever word ends up in a slot of `length` with the given
    /// candidates: the cost of the best-scoring candidate. Panics if there are no candidates; an
    /// empty bitmap is a dead end and has to be handled before asking for a cost.
    pub fn min_cost(&self, length: usize, bitmap: Option<&BitVector>) -> f64 {
        let words_of_length = self.words_of_length(length);
        let best = match bitmap {
            Some(bits) => bits.bit_length().checked_sub(1),
            None => words_of_length.len().checked_sub(1),
        };
        let best = best.unwrap_or_else(|| panic!("No candidates of length {length} to cost"));

        tier_cost(words_of_length[best].score)
    }

    /// Narrow `bitmap` to words with `letter` at `position`. The result may be empty.
    pub fn update_bitmap(
        &self,
        length: usize,
        bitmap: Option<&BitVector>,
        position: usize,
        letter: char,
    ) -> BitVector {
        let key = BitmapKey { length, letter: letter.to_ascii_uppercase(), position };

        match (bitmap, self.bitmaps.get(&key)) {
            (_, None) => BitVector::zero(),
            (None, Some(bits)) => bits.clone(),
            (Some(current), Some(bits)) => current.and(bits),
        }
    }

    /// Convert to the persisted shape.
    pub fn to_persisted(&self) -> PersistedIndex {
        PersistedIndex {
            words: self
                .words
                .iter()
                .enumerate()
                .filter(|(_, words_of_length)| !words_of_length.is_empty())
                .map(|(length, words_of_length)| (length, words_of_length.clone()))
                .collect(),
            bitmaps: self
                .bitmaps
                .iter()
                .map(|(key, bits)| (key.encode(), bits.limbs().to_vec()))
                .collect(),
        }
    }

    /// Validate and load a persisted index. The word buckets have to be well formed and in index
    /// order, and every stored bitmap has to match the one rebuilt from the words.
    pub fn from_persisted(persisted: PersistedIndex) -> Result<WordIndex, IndexLoadError> {
        // Every bucket is checked before anything is sized from its length key.
        for (&length, words_of_length) in &persisted.words {
            if words_of_length.is_empty() {
                return Err(IndexLoadError::EmptyLength { length });
            }

            if let Some(bad) = words_of_length.iter().find(|scored| {
                length == 0
                    || scored.word.chars().count() != length
                    || !scored.word.chars().all(|c| c.is_ascii_uppercase())
            }) {
                return Err(IndexLoadError::InvalidWord { length, word: bad.word.clone() });
            }

            if words_of_length
                .windows(2)
                .any(|pair| index_order(&pair[0], &pair[1]) != Ordering::Less)
            {
                return Err(IndexLoadError::UnsortedWords { length });
            }
        }

        // Bounded by the longest word actually present.
        let max_length = persisted.words.keys().next_back().copied().unwrap_or(0);
        let mut words: Vec<Vec<ScoredWord>> = vec![vec![]; max_length + 1];
        for (length, words_of_length) in persisted.words {
            words[length] = words_of_length;
        }

        let index = WordIndex::from_sorted_words(words);

        let mut matched: FxHashSet<BitmapKey> = FxHashSet::default();
        for (key_text, limbs) in &persisted.bitmaps {
            let key = BitmapKey::parse(key_text)
                .ok_or_else(|| IndexLoadError::InvalidBitmapKey { key: key_text.clone() })?;
            let stored = BitVector::from_limbs(limbs)?;

            if index.bitmaps.get(&key) != Some(&stored) || !matched.insert(key) {
                return Err(IndexLoadError::BitmapMismatch { key: key_text.clone() });
            }
        }

        if let Some(missing) = index.bitmaps.keys().find(|key| !matched.contains(key)) {
            return Err(IndexLoadError::BitmapMismatch { key: missing.encode() });
        }

        log::debug!("Loaded persisted word index: {} words", index.word_count());
        Ok(index)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_persisted())
    }

    pub fn from_json(json: &str) -> Result<WordIndex, IndexLoadError> {
        let persisted: PersistedIndex = serde_json::from_str(json)?;
        WordIndex::from_persisted(persisted)
    }

    // The caches only ever hold finished values, so a poisoned lock is still usable.
    fn lock_bitmap_cache(&self) -> MutexGuard<'_, FxHashMap<String, Option<BitVector>>> {
        self.bitmap_cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_words_cache(
        &self,
    ) -> MutexGuard<'_, FxHashMap<(usize, String), Arc<[ScoredWord]>>> {
        self.words_cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
