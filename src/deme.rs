//! The transient neighborhood expanded around an exemplar: the deme
//! container the inner optimiser fills, and the pipeline steps that turn
//! an optimised deme into merge candidates.

use std::{
  collections::{HashMap, HashSet},
  hash::Hash,
  sync::RwLock,
};

use rayon::prelude::*;

use crate::{
  config::{SearchParams, MIN_POOL},
  interface::{BehavioralScorer, Representation},
  score::{CompositeScore, WORST_SCORE},
  store::Candidate,
};

/// Scored knob-setting instances produced by the inner optimiser for one
/// representation. Lives for a single expansion cycle.
#[derive(Debug)]
pub struct Deme<I> {
  instances: Vec<(I, CompositeScore)>,
}

impl<I> Deme<I> {
  /// Creates an empty deme.
  pub fn new() -> Self {
    Self {
      instances: Vec::new(),
    }
  }

  /// Records a visited instance with its score.
  pub fn push(&mut self, instance: I, score: CompositeScore) {
    self.instances.push((instance, score));
  }

  /// Number of recorded instances.
  pub fn len(&self) -> usize {
    self.instances.len()
  }

  /// Whether no instances were recorded.
  pub fn is_empty(&self) -> bool {
    self.instances.is_empty()
  }

  /// Iterates the recorded instances with their scores.
  pub fn iter(&self) -> impl Iterator<Item = &(I, CompositeScore)> {
    self.instances.iter()
  }

  /// Discards every recorded instance.
  pub fn clear(&mut self) {
    self.instances.clear();
  }

  pub(crate) fn as_slice(&self) -> &[(I, CompositeScore)] {
    &self.instances
  }

  /// Sorts instances by composite score descending.
  pub(crate) fn sort_desc(&mut self, complexity_ratio: f64) {
    self
      .instances
      .sort_by(|a, b| a.1.cmp_desc(&b.1, complexity_ratio));
  }

  /// Drops the tail of instances whose weighted score falls more than
  /// `useful_range` below the best one. Only demes larger than the
  /// minimum pool size are trimmed. Expects the deme sorted descending.
  /// Returns the number of instances dropped.
  pub(crate) fn trim(
    &mut self,
    useful_range: f64,
    complexity_ratio: f64,
  ) -> usize {
    if self.instances.len() <= MIN_POOL {
      return 0;
    }
    let before = self.instances.len();
    let floor = self.instances[0].1.weighted(complexity_ratio) - useful_range;
    while let Some(last) = self.instances.last() {
      if last.1.weighted(complexity_ratio) < floor {
        self.instances.pop();
      } else {
        break;
      }
    }
    before - self.instances.len()
  }
}

impl<I> Default for Deme<I> {
  fn default() -> Self {
    Self::new()
  }
}

/// Turns an optimised deme into merge candidates: decodes every instance
/// with a valid score, drops trees already visited or already pending,
/// and respects the per-cycle candidate bound. Runs on parallel workers
/// when more than one job is configured; the pending map is shared under
/// a reader/writer lock, so duplicates collapse on tree identity no
/// matter which worker gets there first.
pub(crate) fn select_candidates<T, R>(
  deme: &Deme<R::Instance>,
  repr: &R,
  visited: &HashSet<T>,
  params: &SearchParams,
) -> Vec<Candidate<T>>
where
  T: Clone + Eq + Hash + Send + Sync,
  R: Representation<T>,
{
  let pending: RwLock<HashMap<T, CompositeScore>> =
    RwLock::new(HashMap::new());
  let consider = |&(ref instance, score): &(R::Instance, CompositeScore)| {
    if !score.score.is_finite() || score.score <= WORST_SCORE {
      return;
    }
    let tree = repr.candidate(instance, params.reduce_all);
    if visited.contains(&tree) {
      return;
    }
    {
      let pending = pending.read().expect("pending map poisoned");
      if let Some(resident) = pending.get(&tree) {
        if resident.weighted(params.complexity_ratio)
          >= score.weighted(params.complexity_ratio)
        {
          return;
        }
      }
    }
    let mut pending = pending.write().expect("pending map poisoned");
    let full = params
      .max_candidates
      .is_some_and(|max| pending.len() >= max);
    match pending.entry(tree) {
      std::collections::hash_map::Entry::Occupied(mut entry) => {
        if entry.get().weighted(params.complexity_ratio)
          < score.weighted(params.complexity_ratio)
        {
          entry.insert(score);
        }
      }
      std::collections::hash_map::Entry::Vacant(entry) => {
        if !full {
          entry.insert(score);
        }
      }
    }
  };
  if params.jobs > 1 {
    deme.as_slice().par_iter().for_each(consider);
  } else {
    deme.as_slice().iter().for_each(consider);
  }
  pending
    .into_inner()
    .expect("pending map poisoned")
    .into_iter()
    .map(|(tree, score)| Candidate::new(tree, score))
    .collect()
}

/// Computes behavioral scores for the extracted candidates, on parallel
/// workers when more than one job is configured. Needed only when the
/// dominated filter or the diversity penalty is active.
pub(crate) fn score_behaviors<T, B>(
  candidates: &mut [Candidate<T>],
  bscorer: &B,
  jobs: usize,
) where
  T: Send + Sync,
  B: BehavioralScorer<T>,
{
  if jobs > 1 {
    candidates
      .par_iter_mut()
      .for_each(|c| c.bscore = bscorer.bscore(&c.tree));
  } else {
    for c in candidates.iter_mut() {
      c.bscore = bscorer.bscore(&c.tree);
    }
  }
}
