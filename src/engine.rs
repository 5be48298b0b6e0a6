//! The search driver: owns the metapopulation, runs expansion cycles and
//! tracks the best programs seen.

use std::{collections::HashSet, fmt::Display, hash::Hash, io};

use itertools::Itertools;
use log::{debug, info, warn};
use rand::{rngs::StdRng, SeedableRng};
use typed_builder::TypedBuilder;

use crate::{
  config::{population_cap, SearchParams, MIN_POOL, PROTECTED},
  deme::{score_behaviors, select_candidates, Deme},
  error::SearchError,
  interface::{
    BehavioralScorer, CompositeScorer, DemeOptimizer, FeatureSelector,
    MergeHook, ReprBuilder, Representation, TreeOps,
  },
  pareto::nondominated,
  score::CompositeScore,
  select::pick_exemplar,
  store::{Candidate, Metapop},
};

/// Knob-settings type of the representations a builder produces.
type InstanceOf<T, Rb> =
  <<Rb as ReprBuilder<T>>::Repr as Representation<T>>::Instance;

/// Counters accumulated over a run.
#[derive(Clone, Copy, Debug, Default)]
pub struct SearchStats {
  /// Completed expansion cycles.
  pub expansions: usize,
  /// Scoring-function evaluations consumed by the inner optimiser.
  pub evaluations: usize,
  /// Candidates handed to the merger, cumulatively.
  pub merged: usize,
}

/// The best composite score seen and the trees achieving it.
#[derive(Clone, Debug)]
pub struct BestRecord<T> {
  /// The best score, by raw score first, then by lower complexity.
  pub score: CompositeScore,
  /// Every tree that reached the score.
  pub trees: Vec<T>,
}

impl<T> Default for BestRecord<T> {
  fn default() -> Self {
    Self {
      score: CompositeScore::worst(),
      trees: Vec::new(),
    }
  }
}

/// The metapopulation search engine.
///
/// Owns a pool of scored candidate programs and repeatedly expands it:
/// an exemplar is drawn from the pool by softmax over weighted scores, a
/// representation is built around it, the inner optimiser explores that
/// neighborhood, and the promising variants are merged back under score
/// and size pressure. Construction goes through the compile-time-checked
/// builder; collaborators are statically dispatched, except the two
/// optional ones, which are boxed.
///
/// The engine is deterministic for a fixed seed and `jobs = 1`.
#[derive(TypedBuilder)]
pub struct Engine<T, L, Cs, Bs, Rb, Opt>
where
  T: Clone + Eq + Hash + Send + Sync,
  L: TreeOps<T>,
  Cs: CompositeScorer<T>,
  Bs: BehavioralScorer<T>,
  Rb: ReprBuilder<T>,
  Opt: DemeOptimizer<T, Rb::Repr>,
{
  #[builder(default)]
  params: SearchParams,
  tree_ops: L,
  cscorer: Cs,
  bscorer: Bs,
  repr_builder: Rb,
  optimizer: Opt,
  #[builder(default)]
  ignore_ops: Vec<Rb::Op>,
  #[builder(default, setter(strip_option))]
  feature_selector: Option<Box<dyn FeatureSelector<T>>>,
  #[builder(default, setter(strip_option))]
  merge_hook: Option<Box<dyn MergeHook<T>>>,
  #[builder(setter(skip), default = Metapop::new(params.complexity_ratio))]
  pool: Metapop<T>,
  #[builder(setter(skip), default = StdRng::seed_from_u64(params.rng_seed))]
  rng: StdRng,
  #[builder(setter(skip), default)]
  visited: HashSet<T>,
  #[builder(setter(skip), default)]
  best: BestRecord<T>,
  #[builder(setter(skip), default)]
  stats: SearchStats,
  #[builder(setter(skip), default)]
  prev_bscore: Option<Vec<f64>>,
  #[builder(setter(skip), default)]
  done: bool,
}

impl<T, L, Cs, Bs, Rb, Opt> Engine<T, L, Cs, Bs, Rb, Opt>
where
  T: Clone + Eq + Hash + Send + Sync,
  L: TreeOps<T>,
  Cs: CompositeScorer<T>,
  Bs: BehavioralScorer<T>,
  Rb: ReprBuilder<T>,
  Opt: DemeOptimizer<T, Rb::Repr>,
{
  /// The current metapopulation.
  pub fn metapop(&self) -> &Metapop<T> {
    &self.pool
  }

  /// The best score seen so far with the trees achieving it.
  pub fn best(&self) -> &BestRecord<T> {
    &self.best
  }

  /// Counters accumulated so far.
  pub fn stats(&self) -> SearchStats {
    self.stats
  }

  /// The search parameters.
  pub fn params(&self) -> &SearchParams {
    &self.params
  }

  /// Scores the starting exemplars and seeds the pool with them.
  pub fn prime(&mut self, exemplars: impl IntoIterator<Item = T>) {
    let mut seeds = Vec::new();
    for tree in exemplars {
      let tree = if self.params.reduce_all {
        self.tree_ops.reduce(&tree)
      } else {
        tree
      };
      let score = self.cscorer.cscore(&tree);
      debug_assert_eq!(
        score.complexity,
        self.tree_ops.complexity(&tree),
        "composite complexity must match the tree's"
      );
      let mut seed = Candidate::new(tree, score);
      if self.needs_bscore() {
        seed.bscore = self.bscorer.bscore(&seed.tree);
      }
      seeds.push(seed);
    }
    self.update_best(&seeds);
    for seed in seeds {
      self.pool.insert(seed);
    }
  }

  /// Runs expansion cycles until the evaluation budget is spent, the
  /// pool drains, every exemplar is exhausted, or a merge hook stops the
  /// run. The best record remains valid whichever way the run ends.
  pub fn run(&mut self, max_evals: usize) -> SearchStats {
    while !self.done
      && !self.pool.is_empty()
      && self.stats.evaluations < max_evals
    {
      let budget = max_evals - self.stats.evaluations;
      match self.expand(budget) {
        Ok(true) => break,
        Ok(false) => {}
        Err(err) => {
          debug!("search stopped: {err}");
          break;
        }
      }
    }
    self.stats
  }

  /// Runs one expansion cycle: selects an exemplar, builds and optimises
  /// a deme around it and merges the results back into the pool.
  /// Returns `true` when a merge hook asked the search to stop.
  pub fn expand(&mut self, max_evals: usize) -> Result<bool, SearchError> {
    let best_before = self.best.score.score;
    let (exemplar, repr) = self.create_deme()?;
    let mut deme = Deme::new();
    let evals = self.optimize_deme(&mut deme, &repr, max_evals);
    self.stats.evaluations += evals;
    self.close_deme(exemplar, deme, &repr);
    self.stats.expansions += 1;
    let marker = if self.best.score.score > best_before {
      " (new best)"
    } else {
      ""
    };
    debug!(
      "expansion {}: {} evaluations total, pool size {}{marker}",
      self.stats.expansions, self.stats.evaluations, self.pool.len(),
    );
    Ok(self.done)
  }

  /// Draws exemplars until one yields a usable representation. Exemplars
  /// without derivable knobs are marked visited and skipped. When the
  /// pool is exhausted and revisiting is allowed, the visited set is
  /// cleared once and selection retried.
  fn create_deme(&mut self) -> Result<(T, Rb::Repr), SearchError> {
    if self.pool.is_empty() {
      return Err(SearchError::EmptyMetapop);
    }
    let mut revisited = false;
    loop {
      let pick = pick_exemplar(
        &mut self.pool,
        &self.visited,
        &self.params,
        self.prev_bscore.as_deref(),
        &mut self.rng,
      );
      let Some(pos) = pick else {
        if self.params.revisit && !revisited {
          debug!("every exemplar visited: revisiting the pool");
          self.visited.clear();
          revisited = true;
          continue;
        }
        return Err(SearchError::NoExemplar);
      };
      let entry = self.pool.get(pos).expect("selected position is valid");
      let tree = entry.tree.clone();
      let bscore = entry.bscore.clone();
      let ignored = self.ignored_ops(&tree);
      match self.repr_builder.build(&tree, &ignored) {
        Some(repr) if repr.fields() > 0 => {
          self.prev_bscore = (!bscore.is_empty()).then_some(bscore);
          return Ok((tree, repr));
        }
        _ => {
          debug!("no knobs for the chosen exemplar, trying the next one");
          self.visited.insert(tree);
        }
      }
    }
  }

  /// Lets the inner optimiser fill the deme, scoring decoded trees with
  /// the composite scorer. A failed optimiser costs the cycle its merge:
  /// the deme is emptied and zero evaluations are counted.
  fn optimize_deme(
    &self,
    deme: &mut Deme<InstanceOf<T, Rb>>,
    repr: &Rb::Repr,
    budget: usize,
  ) -> usize {
    let reduce = self.params.reduce_all;
    let cscorer = &self.cscorer;
    let scorer = |instance: &InstanceOf<T, Rb>| {
      cscorer.cscore(&repr.candidate(instance, reduce))
    };
    match self.optimizer.optimize(deme, repr, scorer, budget) {
      Ok(evals) => evals,
      Err(err) => {
        warn!("the optimiser failed on this deme: {err}");
        deme.clear();
        0
      }
    }
  }

  /// Closes the cycle: trims the deme, extracts merge candidates,
  /// scores their behavior when needed and merges them into the pool.
  fn close_deme(
    &mut self,
    exemplar: T,
    mut deme: Deme<InstanceOf<T, Rb>>,
    repr: &Rb::Repr,
  ) {
    self.visited.insert(exemplar);
    deme.sort_desc(self.params.complexity_ratio);
    let dropped =
      deme.trim(self.params.useful_range(), self.params.complexity_ratio);
    if dropped > 0 {
      debug!("trimmed {dropped} deme instances below the useful range");
    }
    let mut candidates =
      select_candidates(&deme, repr, &self.visited, &self.params);
    if self.needs_bscore() {
      score_behaviors(&mut candidates, &self.bscorer, self.params.jobs);
    }
    if !self.params.include_dominated {
      let before = candidates.len();
      candidates = keep_nondominated(candidates, self.params.jobs);
      debug!(
        "dominated filter kept {} of {before} candidates",
        candidates.len(),
      );
    }
    self.update_best(&candidates);
    self.merge_candidates(candidates);
  }

  /// Merges a candidate batch into the pool and shrinks it back under
  /// the score-range and size caps.
  fn merge_candidates(&mut self, candidates: Vec<Candidate<T>>) {
    let ratio = self.params.complexity_ratio;
    let candidates: Vec<Candidate<T>> = candidates
      .into_iter()
      .sorted_by(|a, b| a.score.cmp_desc(&b.score, ratio))
      .collect();
    if self.params.include_dominated {
      for candidate in &candidates {
        self.pool.insert(candidate.clone());
      }
    } else {
      self.merge_nondominated(&candidates);
    }
    self.stats.merged += candidates.len();
    self.pool.shrink(
      MIN_POOL,
      PROTECTED,
      self.params.useful_range(),
      population_cap(self.stats.expansions),
      &mut self.rng,
    );
    if let Some(hook) = &mut self.merge_hook {
      if hook.on_merge(&candidates) {
        debug!("merge hook requested termination");
        self.done = true;
      }
    }
  }

  /// Folds an internally non-dominated candidate batch into the pool:
  /// pool entries that became dominated are erased, newcomers that
  /// survive the union filter are inserted.
  fn merge_nondominated(&mut self, candidates: &[Candidate<T>]) {
    let residents = self.pool.len();
    let scores: Vec<&[f64]> = self
      .pool
      .iter()
      .map(|e| e.bscore.as_slice())
      .chain(candidates.iter().map(|c| c.bscore.as_slice()))
      .collect();
    let survivors: HashSet<usize> =
      nondominated(&scores, self.params.jobs).into_iter().collect();
    for pos in (0..residents).rev() {
      if !survivors.contains(&pos) {
        self.pool.remove(pos);
      }
    }
    for (i, candidate) in candidates.iter().enumerate() {
      if survivors.contains(&(residents + i)) {
        self.pool.insert(candidate.clone());
      }
    }
  }

  /// Records candidates beating the best score seen. A strictly better
  /// candidate resets the best set; ties on both score and complexity
  /// extend it.
  fn update_best(&mut self, candidates: &[Candidate<T>]) {
    for candidate in candidates {
      let score = candidate.score.score;
      let complexity = candidate.score.complexity;
      if score > self.best.score.score
        || (score == self.best.score.score
          && complexity < self.best.score.complexity)
      {
        self.best.score = CompositeScore::new(score, complexity);
        self.best.trees = vec![candidate.tree.clone()];
        info!("new best score {score} at complexity {complexity}");
      } else if score == self.best.score.score
        && complexity == self.best.score.complexity
        && !self.best.trees.contains(&candidate.tree)
      {
        self.best.trees.push(candidate.tree.clone());
      }
    }
  }

  fn ignored_ops(&self, exemplar: &T) -> Vec<Rb::Op> {
    let mut ignored = self.ignore_ops.clone();
    if let Some(fsel) = &self.feature_selector {
      let subset = fsel.select(exemplar);
      ignored.extend(
        (0..subset.total)
          .filter(|i| !subset.selected.contains(i))
          .map(|i| self.repr_builder.argument(i)),
      );
    }
    ignored
  }

  fn needs_bscore(&self) -> bool {
    !self.params.include_dominated || self.params.diversity_penalty
  }

  /// Writes the pool to `out`, one candidate per line, best first: raw
  /// score, complexity, then the tree.
  pub fn dump_candidates<W: io::Write>(&self, out: &mut W) -> io::Result<()>
  where
    T: Display,
  {
    for entry in self.pool.iter() {
      writeln!(
        out,
        "{} {} {}",
        entry.score.score, entry.score.complexity, entry.tree
      )?;
    }
    Ok(())
  }
}

/// Keeps the candidates not strictly dominated by another of the batch.
fn keep_nondominated<T>(
  candidates: Vec<Candidate<T>>,
  jobs: usize,
) -> Vec<Candidate<T>> {
  let scores: Vec<&[f64]> =
    candidates.iter().map(|c| c.bscore.as_slice()).collect();
  let survivors: HashSet<usize> =
    nondominated(&scores, jobs).into_iter().collect();
  candidates
    .into_iter()
    .enumerate()
    .filter_map(|(i, c)| survivors.contains(&i).then_some(c))
    .collect()
}

#[cfg(test)]
mod tests {
  use std::{cell::Cell, fmt};

  use super::*;
  use crate::{interface::FeatureSubset, score::ParetoDominance};

  /// Integer-gene programs over a fixed set of input slots. A missing
  /// trailing gene reads as zero.
  #[derive(Clone, PartialEq, Eq, Hash, Debug)]
  struct Prog(Vec<i8>);

  impl fmt::Display for Prog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "(")?;
      for (i, gene) in self.0.iter().enumerate() {
        if i > 0 {
          write!(f, " ")?;
        }
        write!(f, "{gene}")?;
      }
      write!(f, ")")
    }
  }

  const ARITY: usize = 3;
  const TARGET: [i8; ARITY] = [2, -1, 3];

  fn log_init() {
    let _ = env_logger::builder().is_test(true).try_init();
  }

  fn gene(prog: &Prog, slot: usize) -> i8 {
    prog.0.get(slot).copied().unwrap_or(0)
  }

  /// Normal form strips trailing zero genes.
  struct Genes;

  impl TreeOps<Prog> for Genes {
    fn reduce(&self, tree: &Prog) -> Prog {
      let mut genes = tree.0.clone();
      while genes.last() == Some(&0) {
        genes.pop();
      }
      Prog(genes)
    }

    fn complexity(&self, tree: &Prog) -> u32 {
      tree.0.iter().filter(|&&g| g != 0).count() as u32
    }
  }

  struct TargetScorer;

  impl CompositeScorer<Prog> for TargetScorer {
    fn cscore(&self, tree: &Prog) -> CompositeScore {
      let error: i32 = (0..ARITY)
        .map(|i| (i32::from(gene(tree, i)) - i32::from(TARGET[i])).abs())
        .sum();
      let complexity = tree.0.iter().filter(|&&g| g != 0).count() as u32;
      CompositeScore::new(-f64::from(error), complexity)
    }
  }

  struct TargetBscorer;

  impl BehavioralScorer<Prog> for TargetBscorer {
    fn bscore(&self, tree: &Prog) -> Vec<f64> {
      (0..ARITY)
        .map(|i| {
          f64::from((i32::from(gene(tree, i)) - i32::from(TARGET[i])).abs())
        })
        .collect()
    }
  }

  /// Pins ignored slots to the exemplar's genes and exposes the rest.
  struct SlotRepr {
    exemplar: Vec<i8>,
    free: Vec<usize>,
  }

  impl Representation<Prog> for SlotRepr {
    type Instance = Vec<i8>;

    fn fields(&self) -> usize {
      self.free.len()
    }

    fn candidate(&self, instance: &Vec<i8>, reduce: bool) -> Prog {
      let prog = Prog(instance.clone());
      if reduce {
        Genes.reduce(&prog)
      } else {
        prog
      }
    }
  }

  struct SlotBuilder;

  impl ReprBuilder<Prog> for SlotBuilder {
    type Op = usize;
    type Repr = SlotRepr;

    fn build(&self, exemplar: &Prog, ignored: &[usize]) -> Option<SlotRepr> {
      let free: Vec<usize> =
        (0..ARITY).filter(|slot| !ignored.contains(slot)).collect();
      if free.is_empty() {
        return None;
      }
      let mut genes = exemplar.0.clone();
      genes.resize(ARITY, 0);
      Some(SlotRepr {
        exemplar: genes,
        free,
      })
    }

    fn argument(&self, index: usize) -> usize {
      index
    }
  }

  /// Builder that never derives a knob, counting its invocations.
  struct BarrenBuilder(Cell<usize>);

  impl ReprBuilder<Prog> for BarrenBuilder {
    type Op = usize;
    type Repr = SlotRepr;

    fn build(&self, _: &Prog, _: &[usize]) -> Option<SlotRepr> {
      self.0.set(self.0.get() + 1);
      None
    }

    fn argument(&self, index: usize) -> usize {
      index
    }
  }

  /// Enumerates the one-step neighborhood of the exemplar.
  struct StepOptimizer;

  impl DemeOptimizer<Prog, SlotRepr> for StepOptimizer {
    fn optimize<F>(
      &self,
      deme: &mut Deme<Vec<i8>>,
      repr: &SlotRepr,
      scorer: F,
      budget: usize,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>>
    where
      F: Fn(&Vec<i8>) -> CompositeScore + Sync,
    {
      let mut evals = 0;
      for &slot in &repr.free {
        for delta in [-1i8, 1] {
          if evals >= budget {
            return Ok(evals);
          }
          let mut genes = repr.exemplar.clone();
          genes[slot] = genes[slot].saturating_add(delta);
          let score = scorer(&genes);
          deme.push(genes, score);
          evals += 1;
        }
      }
      Ok(evals)
    }
  }

  struct FailingOptimizer;

  impl DemeOptimizer<Prog, SlotRepr> for FailingOptimizer {
    fn optimize<F>(
      &self,
      deme: &mut Deme<Vec<i8>>,
      _: &SlotRepr,
      scorer: F,
      _: usize,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>>
    where
      F: Fn(&Vec<i8>) -> CompositeScore + Sync,
    {
      let probe = vec![1, 1, 1];
      let score = scorer(&probe);
      deme.push(probe, score);
      Err("the neighborhood walk diverged".into())
    }
  }

  type ToyEngine<Rb, Opt> =
    Engine<Prog, Genes, TargetScorer, TargetBscorer, Rb, Opt>;

  fn engine(params: SearchParams) -> ToyEngine<SlotBuilder, StepOptimizer> {
    Engine::builder()
      .params(params)
      .tree_ops(Genes)
      .cscorer(TargetScorer)
      .bscorer(TargetBscorer)
      .repr_builder(SlotBuilder)
      .optimizer(StepOptimizer)
      .build()
  }

  #[test]
  fn test_expand_on_empty_pool_fails() {
    let mut engine = engine(SearchParams::default());
    assert_eq!(engine.expand(100), Err(SearchError::EmptyMetapop));
    assert_eq!(engine.run(100).expansions, 0);
  }

  #[test]
  fn test_prime_scores_and_dedups_seeds() {
    let mut engine = engine(SearchParams::default());
    engine.prime([Prog(vec![]), Prog(vec![0, 0])]);
    // both seeds reduce to the empty program
    assert_eq!(engine.metapop().len(), 1);
    let seed = engine.metapop().best().unwrap();
    assert_eq!(seed.score.score, -6.0);
    assert_eq!(seed.score.complexity, 0);
    assert_eq!(engine.best().score.score, -6.0);
  }

  #[test]
  fn test_run_reaches_the_target() {
    log_init();
    let mut engine = engine(SearchParams::default());
    engine.prime([Prog(vec![])]);
    let stats = engine.run(500);
    assert!(stats.expansions > 0);
    assert!(stats.evaluations <= 500);
    assert_eq!(engine.best().score.score, 0.0);
    assert_eq!(engine.best().trees, vec![Prog(TARGET.to_vec())]);
  }

  #[test]
  fn test_best_improves_monotonically() {
    let mut engine = engine(SearchParams::default());
    engine.prime([Prog(vec![])]);
    let mut last_best = engine.best().score.score;
    for _ in 0..10 {
      if engine.expand(50).is_err() {
        break;
      }
      let best = engine.best().score.score;
      assert!(best >= last_best);
      last_best = best;
    }
  }

  #[test]
  fn test_pool_stays_ordered_and_unique() {
    let mut engine = engine(SearchParams::default());
    engine.prime([Prog(vec![])]);
    engine.run(200);
    let pool = engine.metapop();
    let mut seen = HashSet::new();
    let mut last = f64::INFINITY;
    for entry in pool.iter() {
      assert!(seen.insert(entry.tree.clone()), "duplicate tree in pool");
      let weighted = entry.score.weighted(0.0);
      assert!(weighted <= last, "pool must be sorted descending");
      last = weighted;
    }
  }

  #[test]
  fn test_exemplars_stay_visited() {
    let mut engine = engine(SearchParams::default());
    engine.prime([Prog(vec![])]);
    engine.expand(50).unwrap();
    assert!(engine.visited.contains(&Prog(vec![])));
    engine.expand(50).unwrap();
    assert!(engine.visited.contains(&Prog(vec![])));
    assert_eq!(engine.visited.len(), 2);
  }

  #[test]
  fn test_barren_exemplars_exhaust_the_pool() {
    let mut engine: ToyEngine<BarrenBuilder, StepOptimizer> =
      Engine::builder()
        .params(SearchParams::default())
        .tree_ops(Genes)
        .cscorer(TargetScorer)
        .bscorer(TargetBscorer)
        .repr_builder(BarrenBuilder(Cell::new(0)))
        .optimizer(StepOptimizer)
        .build();
    engine.prime([Prog(vec![1]), Prog(vec![2])]);
    assert_eq!(engine.expand(100), Err(SearchError::NoExemplar));
    // both exemplars were tried once and marked visited
    assert_eq!(engine.repr_builder.0.get(), 2);
    assert_eq!(engine.visited.len(), 2);
  }

  #[test]
  fn test_revisit_clears_the_pool_once() {
    let params = SearchParams::builder().revisit(true).build();
    let mut engine: ToyEngine<BarrenBuilder, StepOptimizer> =
      Engine::builder()
        .params(params)
        .tree_ops(Genes)
        .cscorer(TargetScorer)
        .bscorer(TargetBscorer)
        .repr_builder(BarrenBuilder(Cell::new(0)))
        .optimizer(StepOptimizer)
        .build();
    engine.prime([Prog(vec![1]), Prog(vec![2])]);
    assert_eq!(engine.expand(100), Err(SearchError::NoExemplar));
    // the visited set was cleared once, so each exemplar was tried twice
    assert_eq!(engine.repr_builder.0.get(), 4);
  }

  #[test]
  fn test_optimizer_failure_completes_the_cycle() {
    log_init();
    let mut engine: ToyEngine<SlotBuilder, FailingOptimizer> =
      Engine::builder()
        .params(SearchParams::default())
        .tree_ops(Genes)
        .cscorer(TargetScorer)
        .bscorer(TargetBscorer)
        .repr_builder(SlotBuilder)
        .optimizer(FailingOptimizer)
        .build();
    engine.prime([Prog(vec![])]);
    assert_eq!(engine.expand(100), Ok(false));
    let stats = engine.stats();
    assert_eq!(stats.expansions, 1);
    assert_eq!(stats.evaluations, 0);
    // the aborted deme contributed nothing
    assert_eq!(stats.merged, 0);
    assert_eq!(engine.metapop().len(), 1);
    assert!(engine.visited.contains(&Prog(vec![])));
  }

  #[test]
  fn test_merge_hook_stops_the_run() {
    let mut engine: ToyEngine<SlotBuilder, StepOptimizer> =
      Engine::builder()
        .params(SearchParams::default())
        .tree_ops(Genes)
        .cscorer(TargetScorer)
        .bscorer(TargetBscorer)
        .repr_builder(SlotBuilder)
        .optimizer(StepOptimizer)
        .merge_hook(Box::new(|merged: &[Candidate<Prog>]| !merged.is_empty()))
        .build();
    engine.prime([Prog(vec![])]);
    let stats = engine.run(500);
    assert_eq!(stats.expansions, 1);
  }

  #[test]
  fn test_dominated_filter_keeps_the_pool_clean() {
    let params = SearchParams::builder().include_dominated(false).build();
    let mut engine = engine(params);
    engine.prime([Prog(vec![])]);
    engine.run(100);
    let pool = engine.metapop();
    for a in pool.iter() {
      for b in pool.iter() {
        assert_ne!(
          a.bscore.dominance(&b.bscore),
          std::cmp::Ordering::Greater,
          "{:?} is dominated by {:?}",
          a.tree,
          b.tree,
        );
      }
    }
  }

  #[test]
  fn test_feature_selection_pins_dropped_columns() {
    let mut engine: ToyEngine<SlotBuilder, StepOptimizer> =
      Engine::builder()
        .params(SearchParams::default())
        .tree_ops(Genes)
        .cscorer(TargetScorer)
        .bscorer(TargetBscorer)
        .repr_builder(SlotBuilder)
        .optimizer(StepOptimizer)
        .feature_selector(Box::new(|_: &Prog| FeatureSubset {
          selected: HashSet::from([0, 2]),
          total: ARITY,
        }))
        .build();
    engine.prime([Prog(vec![])]);
    engine.run(500);
    // slot 1 can never move off the seed's zero, so one unit of error
    // stays forever
    assert_eq!(engine.best().score.score, -1.0);
    assert!(engine
      .metapop()
      .iter()
      .all(|entry| gene(&entry.tree, 1) == 0));
  }

  #[test]
  fn test_diversity_penalty_run_still_converges() {
    let params = SearchParams::builder().diversity_penalty(true).build();
    let mut engine = engine(params);
    engine.prime([Prog(vec![])]);
    engine.run(500);
    assert_eq!(engine.best().score.score, 0.0);
  }

  #[test]
  fn test_dump_candidates() {
    let mut engine = engine(SearchParams::default());
    engine.prime([Prog(vec![])]);
    engine.run(100);
    let mut out = Vec::new();
    engine.dump_candidates(&mut out).unwrap();
    let dump = String::from_utf8(out).unwrap();
    let first = dump.lines().next().unwrap();
    let best = engine.metapop().best().unwrap();
    assert!(first.starts_with(&format!(
      "{} {} (",
      best.score.score, best.score.complexity
    )));
    assert_eq!(dump.lines().count(), engine.metapop().len());
  }
}
