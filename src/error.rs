//! Terminal conditions of the expansion loop.

use thiserror::Error;

/// An error that stops the search. Neither variant invalidates the best
/// record accumulated so far.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
  /// The metapopulation holds no entries to select an exemplar from.
  #[error("the metapopulation is empty")]
  EmptyMetapop,
  /// Every tree in the pool has already served as an exemplar (and the
  /// one permitted revisit pass, if enabled, is spent).
  #[error("every candidate in the pool has been visited")]
  NoExemplar,
}
