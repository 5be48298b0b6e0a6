//! The non-dominated filter: a divide-and-conquer pass keeping only the
//! candidates no other candidate strictly dominates.

use std::cmp::Ordering;

use crate::score::ParetoDominance;

/// Returns the indices of the behavioral scores not strictly dominated by
/// any other, in no particular order.
///
/// The filter splits the set in half, filters both halves recursively and
/// prunes the surviving halves against each other. While more than one
/// job remains the first half is filtered on a forked worker and the
/// budget halves at every split.
pub fn nondominated(scores: &[&[f64]], jobs: usize) -> Vec<usize> {
  filter((0..scores.len()).collect(), scores, jobs.max(1))
}

fn filter(
  mut handles: Vec<usize>,
  scores: &[&[f64]],
  jobs: usize,
) -> Vec<usize> {
  if handles.len() < 2 {
    return handles;
  }
  let right_half = handles.split_off(handles.len() / 2);
  let (left, right) = if jobs > 1 {
    rayon::join(
      || filter(handles, scores, jobs / 2),
      || filter(right_half, scores, jobs - jobs / 2),
    )
  } else {
    (filter(handles, scores, 1), filter(right_half, scores, 1))
  };
  let (mut left, right) = merge(left, right, scores);
  left.extend(right);
  left
}

/// Prunes two internally non-dominated sets against each other, returning
/// the survivors of each side.
fn merge(
  mut a: Vec<usize>,
  b: Vec<usize>,
  scores: &[&[f64]],
) -> (Vec<usize>, Vec<usize>) {
  if a.is_empty() || b.is_empty() {
    return (a, b);
  }
  if a.len() == 1 {
    let x = a[0];
    let mut kept = Vec::with_capacity(b.len());
    let mut it = b.into_iter();
    while let Some(y) = it.next() {
      match scores[x].dominance(scores[y]) {
        // y is dominated and dropped
        Ordering::Less => {}
        Ordering::Equal => kept.push(y),
        // x is dominated; the rest of b survives untouched
        Ordering::Greater => {
          kept.push(y);
          kept.extend(it);
          return (Vec::new(), kept);
        }
      }
    }
    return (a, kept);
  }
  // thread b through both halves of a: only entries surviving both are kept
  let a2 = a.split_off(a.len() / 2);
  let (mut a1, b) = merge(a, b, scores);
  let (a2, b) = merge(a2, b, scores);
  a1.extend(a2);
  (a1, b)
}
