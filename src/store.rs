//! The metapopulation: the bounded, ordered pool of scored candidate
//! programs the search works on.

use std::{collections::HashMap, hash::Hash};

use log::trace;
use rand::Rng;

use crate::score::CompositeScore;

/// A scored candidate program.
#[derive(Clone, Debug)]
pub struct Candidate<T> {
  /// The program tree.
  pub tree: T,
  /// Per-example error vector. Empty until behavioral scoring runs;
  /// entries inserted without domination filtering stay empty.
  pub bscore: Vec<f64>,
  /// The ranking score.
  pub score: CompositeScore,
}

impl<T> Candidate<T> {
  /// Creates a candidate with an empty behavioral score.
  pub fn new(tree: T, score: CompositeScore) -> Self {
    Self {
      tree,
      bscore: Vec::new(),
      score,
    }
  }
}

/// The candidate pool, kept sorted by weighted score descending and
/// indexed by tree for constant-time membership checks. Trees are unique:
/// inserting a tree already in the pool keeps whichever entry ranks
/// higher.
#[derive(Debug)]
pub struct Metapop<T> {
  entries: Vec<Candidate<T>>,
  index: HashMap<T, usize>,
  complexity_ratio: f64,
}

impl<T: Clone + Eq + Hash> Metapop<T> {
  /// Creates an empty pool ranking entries at the given complexity ratio.
  pub fn new(complexity_ratio: f64) -> Self {
    Self {
      entries: Vec::new(),
      index: HashMap::new(),
      complexity_ratio,
    }
  }

  /// The complexity ratio entries are ranked at.
  pub fn complexity_ratio(&self) -> f64 {
    self.complexity_ratio
  }

  /// Number of entries in the pool.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Whether the pool holds no entries.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// The entry at `pos`, counted from the best.
  pub fn get(&self, pos: usize) -> Option<&Candidate<T>> {
    self.entries.get(pos)
  }

  /// The highest-ranked entry.
  pub fn best(&self) -> Option<&Candidate<T>> {
    self.entries.first()
  }

  /// Iterates entries in weighted-score-descending order.
  pub fn iter(&self) -> impl Iterator<Item = &Candidate<T>> {
    self.entries.iter()
  }

  /// Whether a structurally equal tree is already in the pool.
  pub fn contains(&self, tree: &T) -> bool {
    self.index.contains_key(tree)
  }

  /// Position of the entry holding `tree`, if any.
  pub fn position(&self, tree: &T) -> Option<usize> {
    self.index.get(tree).copied()
  }

  /// Inserts a candidate, keeping the pool sorted. If the tree is already
  /// present, the incoming entry replaces the resident one only when it
  /// ranks strictly higher; otherwise it is discarded. Returns whether
  /// the candidate entered the pool.
  pub fn insert(&mut self, candidate: Candidate<T>) -> bool {
    if let Some(pos) = self.index.get(&candidate.tree).copied() {
      let resident = &self.entries[pos];
      let ratio = self.complexity_ratio;
      if candidate.score.weighted(ratio) <= resident.score.weighted(ratio) {
        return false;
      }
      self.remove(pos);
    }
    let pos = self.entries.partition_point(|e| {
      e.score.cmp_desc(&candidate.score, self.complexity_ratio).is_lt()
    });
    self.index.insert(candidate.tree.clone(), pos);
    self.entries.insert(pos, candidate);
    self.reindex(pos + 1);
    true
  }

  /// Removes and returns the entry at `pos`.
  ///
  /// # Panics
  ///
  /// Panics if `pos` is out of bounds.
  pub fn remove(&mut self, pos: usize) -> Candidate<T> {
    let removed = self.entries.remove(pos);
    self.index.remove(&removed.tree);
    self.reindex(pos);
    removed
  }

  /// Drops every entry past the first `len`.
  pub fn truncate(&mut self, len: usize) {
    if len >= self.entries.len() {
      return;
    }
    for dropped in self.entries.drain(len..) {
      self.index.remove(&dropped.tree);
    }
  }

  /// Recomputes every entry's diversity penalty and restores the order.
  pub(crate) fn update_penalties(
    &mut self,
    penalty: impl Fn(&Candidate<T>) -> f64,
  ) {
    for entry in &mut self.entries {
      entry.score.penalty = penalty(entry);
    }
    self.resort();
  }

  /// Restores the weighted-score-descending order after entry scores
  /// changed in place.
  pub(crate) fn resort(&mut self) {
    let ratio = self.complexity_ratio;
    self
      .entries
      .sort_by(|a, b| a.score.cmp_desc(&b.score, ratio));
    self.reindex(0);
  }

  /// Shrinks the pool to the score range and size cap of the search.
  ///
  /// First cuts the tail of entries past `min_pool` whose weighted score
  /// falls more than `useful_range` below the best entry, then erases
  /// uniformly random entries past the `protected` prefix until no more
  /// than `cap` remain. Returns the number of entries erased.
  pub(crate) fn shrink(
    &mut self,
    min_pool: usize,
    protected: usize,
    useful_range: f64,
    cap: usize,
    rng: &mut impl Rng,
  ) -> usize {
    let before = self.len();
    if before <= min_pool {
      return 0;
    }
    let floor = self.entries[0].score.weighted(self.complexity_ratio)
      - useful_range;
    // a single tail cut is enough: entries are sorted by weighted score
    let cut = self.entries[min_pool..]
      .iter()
      .position(|e| e.score.weighted(self.complexity_ratio) < floor)
      .map(|p| min_pool + p);
    if let Some(cut) = cut {
      self.truncate(cut);
    }
    while self.len() > cap && self.len() > protected {
      let victim = rng.gen_range(protected..self.len());
      self.remove(victim);
    }
    let erased = before - self.len();
    if erased > 0 {
      trace!("shrank the pool by {erased} entries to {}", self.len());
    }
    erased
  }

  fn reindex(&mut self, from: usize) {
    for (pos, entry) in self.entries.iter().enumerate().skip(from) {
      self.index.insert(entry.tree.clone(), pos);
    }
  }
}
