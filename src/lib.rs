#![warn(missing_docs)]

//! A metapopulation search engine for symbolic program synthesis.
//!
//! The engine maintains a bounded pool of scored candidate programs (the
//! *metapopulation*), repeatedly picks one as an *exemplar*, asks an
//! external representation builder and optimiser to explore a
//! neighborhood (*deme*) around it, and merges the promising variants
//! back into the pool under score, dominance and size pressure. Program
//! trees, scoring functions and the inner optimiser are all supplied by
//! the caller through the contracts in [`interface`].

pub mod config;
pub mod deme;
pub mod engine;
pub mod error;
pub mod interface;
pub mod pareto;
pub mod score;
mod select;
pub mod store;

pub use crate::{
  config::SearchParams,
  engine::{BestRecord, Engine, SearchStats},
  error::SearchError,
  score::{CompositeScore, Score, WORST_SCORE},
  store::{Candidate, Metapop},
};
