//! Search parameters shaping the metapopulation's life cycle.

use typed_builder::TypedBuilder;

/// Pool size below which neither deme trimming nor eviction applies.
pub const MIN_POOL: usize = 250;

/// Number of leading entries never touched by random eviction.
pub const PROTECTED: usize = 50;

/// Tunable parameters of the search.
///
/// Built with a compile-time-checked builder; every field has a default,
/// so `SearchParams::default()` is a working configuration.
///
/// # Examples
/// ```
/// use metapop::SearchParams;
///
/// let params = SearchParams::builder()
///   .complexity_temperature(5.0)
///   .include_dominated(false)
///   .jobs(4)
///   .build();
/// assert!(!params.revisit);
/// ```
#[derive(TypedBuilder, Clone, Debug)]
pub struct SearchParams {
  /// Upper bound on candidates merged per expansion. `None` is unlimited.
  #[builder(default, setter(strip_option))]
  pub max_candidates: Option<usize>,
  /// Reduce trees to normal form before evaluation.
  #[builder(default = true)]
  pub reduce_all: bool,
  /// Clear the visited set once when every exemplar has been tried.
  #[builder(default = false)]
  pub revisit: bool,
  /// Keep dominated candidates. When `false`, merged candidates pass the
  /// non-dominated filter first.
  #[builder(default = true)]
  pub include_dominated: bool,
  /// Penalise candidates behaviorally close to the previous exemplar.
  #[builder(default = false)]
  pub diversity_penalty: bool,
  /// Softmax temperature of exemplar selection. Higher explores more.
  #[builder(default = 3.0)]
  pub complexity_temperature: f64,
  /// Weight of complexity in the weighted score.
  #[builder(default = 0.0)]
  pub complexity_ratio: f64,
  /// Worker budget for the parallel phases.
  #[builder(default = 1)]
  pub jobs: usize,
  /// Seed of the engine's random number generator.
  #[builder(default = 1)]
  pub rng_seed: u64,
}

impl Default for SearchParams {
  fn default() -> Self {
    Self::builder().build()
  }
}

impl SearchParams {
  /// Width of the weighted-score band below the best entry considered
  /// worth keeping, in demes and in the pool.
  pub(crate) fn useful_range(&self) -> f64 {
    0.3 * self.complexity_temperature
  }

  /// Inverse softmax temperature of exemplar selection.
  pub(crate) fn beta(&self) -> f64 {
    100.0 / self.complexity_temperature
  }
}

/// Absolute pool size cap after `n_expansions` completed expansions.
///
/// Lets the pool grow generously early on and tightens towards a linear
/// bound during long runs.
pub(crate) fn population_cap(n_expansions: usize) -> usize {
  let n = n_expansions as f64;
  (50.0 * (n + 250.0) * (1.0 + 2.0 * (-n / 500.0).exp())).floor() as usize
}
