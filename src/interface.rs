//! Capability contracts the engine consumes from its collaborators: tree
//! rewriting, scoring, representation building and the inner optimiser.
//!
//! Scoring contracts are implemented for plain closures, so simple setups
//! need no named types:
//!
//! ```
//! use metapop::{interface::CompositeScorer, CompositeScore};
//!
//! let cscorer = |tree: &Vec<i8>| {
//!   let error: f64 = tree.iter().map(|&g| f64::from(g).abs()).sum();
//!   CompositeScore::new(-error, tree.len() as u32)
//! };
//! assert_eq!(cscorer.cscore(&vec![2, -1]).score, -3.0);
//! ```

use std::{collections::HashSet, error::Error};

use crate::{deme::Deme, score::CompositeScore, store::Candidate};

/// Rewriting and measuring of program trees. Structural equality and
/// hashing come from the tree type's own `Eq` and `Hash`.
pub trait TreeOps<T> {
  /// Rewrites a tree into its reduced normal form.
  fn reduce(&self, tree: &T) -> T;
  /// Measures a tree's complexity. Lower is simpler.
  fn complexity(&self, tree: &T) -> u32;
}

/// Composite scoring of a single tree.
pub trait CompositeScorer<T>: Sync {
  /// Scores a tree. Must be pure and re-entrant: the same tree always
  /// maps to the same score, from any thread.
  fn cscore(&self, tree: &T) -> CompositeScore;
}

impl<T, F> CompositeScorer<T> for F
where
  F: Fn(&T) -> CompositeScore + Sync,
{
  fn cscore(&self, tree: &T) -> CompositeScore {
    self(tree)
  }
}

/// Behavioral scoring of a single tree.
pub trait BehavioralScorer<T>: Sync {
  /// Computes the per-example error vector of a tree, optionally with one
  /// trailing complexity-penalty entry. Lower entries are better.
  /// Potentially expensive; called from parallel workers.
  fn bscore(&self, tree: &T) -> Vec<f64>;
}

impl<T, F> BehavioralScorer<T> for F
where
  F: Fn(&T) -> Vec<f64> + Sync,
{
  fn bscore(&self, tree: &T) -> Vec<f64> {
    self(tree)
  }
}

/// A knob layout derived from one exemplar. Decodes packed knob settings
/// back into program trees; shared read-only with parallel workers.
pub trait Representation<T>: Sync {
  /// Packed knob settings of a single variant.
  type Instance: Clone + Send + Sync;

  /// Number of knobs in the layout.
  fn fields(&self) -> usize;

  /// Decodes an instance into a program tree, reducing the result to
  /// normal form when `reduce` is set.
  fn candidate(&self, instance: &Self::Instance, reduce: bool) -> T;
}

/// Builds knob layouts around exemplars.
pub trait ReprBuilder<T> {
  /// Operator label that can be excluded from knob construction.
  type Op: Clone;
  /// The layout this builder produces.
  type Repr: Representation<T>;

  /// Builds the knob layout for an exemplar, skipping the `ignored`
  /// operators. `None` when no knobs can be derived from the exemplar.
  fn build(&self, exemplar: &T, ignored: &[Self::Op]) -> Option<Self::Repr>;

  /// The operator standing for input column `index`. The engine turns
  /// columns dropped by a [`FeatureSelector`] into ignored operators
  /// through this.
  fn argument(&self, index: usize) -> Self::Op;
}

/// The inner optimiser: fills a deme with scored instances drawn from a
/// representation's neighborhood.
pub trait DemeOptimizer<T, R: Representation<T>> {
  /// Runs up to `budget` evaluations of `scorer`, pushing the visited
  /// instances with their scores into `deme`. Returns the number of
  /// evaluations actually consumed. An error costs the cycle its merge
  /// but does not stop the search.
  fn optimize<F>(
    &self,
    deme: &mut Deme<R::Instance>,
    repr: &R,
    scorer: F,
    budget: usize,
  ) -> Result<usize, Box<dyn Error + Send + Sync>>
  where
    F: Fn(&R::Instance) -> CompositeScore + Sync;
}

/// The input columns worth keeping for an exemplar.
#[derive(Clone, Debug)]
pub struct FeatureSubset {
  /// Indices of the columns to keep.
  pub selected: HashSet<usize>,
  /// Total number of columns.
  pub total: usize,
}

/// Picks the input columns worth building knobs for. Columns outside the
/// returned subset are excluded from the representation.
pub trait FeatureSelector<T> {
  /// Returns the column subset to keep for an exemplar.
  fn select(&self, exemplar: &T) -> FeatureSubset;
}

impl<T, F> FeatureSelector<T> for F
where
  F: Fn(&T) -> FeatureSubset,
{
  fn select(&self, exemplar: &T) -> FeatureSubset {
    self(exemplar)
  }
}

/// Observes every merge. Returning `true` ends the run after the current
/// merge completes.
pub trait MergeHook<T> {
  /// Called with the candidates merged this cycle, best first.
  fn on_merge(&mut self, merged: &[Candidate<T>]) -> bool;
}

impl<T, F> MergeHook<T> for F
where
  F: FnMut(&[Candidate<T>]) -> bool,
{
  fn on_merge(&mut self, merged: &[Candidate<T>]) -> bool {
    self(merged)
  }
}
