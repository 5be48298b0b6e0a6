//! Softmax exemplar selection over the metapopulation.

use std::{collections::HashSet, hash::Hash};

use log::trace;
use rand::{distributions::WeightedIndex, prelude::*};

use crate::{config::SearchParams, score::l1_distance, store::Metapop};

/// Picks the position of the next exemplar.
///
/// Visited trees are excluded. The remaining weighted scores enter a
/// softmax at inverse temperature `100/τ`, shifted by the best of them so
/// the exponentials stay bounded. With the diversity penalty enabled,
/// entries behaviorally close to the previous exemplar are penalised and
/// the pool reordered before the draw, pulling selection away from
/// clones of what was just expanded.
///
/// Returns `None` when every entry has been visited.
pub(crate) fn pick_exemplar<T: Clone + Eq + Hash>(
  pool: &mut Metapop<T>,
  visited: &HashSet<T>,
  params: &SearchParams,
  prev_bscore: Option<&[f64]>,
  rng: &mut impl Rng,
) -> Option<usize> {
  if pool.len() == 1 {
    let sole = pool.best().expect("the pool is nonempty");
    return (!visited.contains(&sole.tree)).then_some(0);
  }
  if params.diversity_penalty {
    if let Some(prev) = prev_bscore {
      pool.update_penalties(|c| {
        if c.bscore.is_empty() {
          0.0
        } else {
          1.0 / (1.0 + l1_distance(prev, &c.bscore))
        }
      });
    }
  }
  let ratio = params.complexity_ratio;
  let scores: Vec<Option<f64>> = pool
    .iter()
    .map(|c| (!visited.contains(&c.tree)).then(|| c.score.weighted(ratio)))
    .collect();
  let best = scores
    .iter()
    .flatten()
    .copied()
    .fold(f64::NEG_INFINITY, f64::max);
  if best == f64::NEG_INFINITY {
    return None;
  }
  let beta = params.beta();
  let weights: Vec<f64> = scores
    .iter()
    .map(|s| s.map_or(0.0, |s| (beta * (s - best)).exp()))
    .collect();
  let dist = WeightedIndex::new(&weights)
    .expect("softmax weights must sum to a positive value");
  let pick = dist.sample(rng);
  trace!("picked exemplar at position {pick} of {}", pool.len());
  Some(pick)
}
