//! Field-dependency evaluation graphs for finite element assembly.
//!
//! Physics computations are expressed as [evaluators](evaluator::Evaluator) that declare which
//! [fields](tag::FieldTag) they read and which they produce. An
//! [`EvaluationManager`](manager::EvaluationManager) orders the evaluators by their
//! dependencies, allocates storage for every field and evaluates them over batches of cells
//! ([worksets](workset::Workset)).
//!
//! Evaluators are written generically over a [`Number`](scalar::Number) type, so that the same
//! formulas compute plain residuals, Jacobians (forward-mode derivatives) or stochastic
//! expansions, depending on the [`EvaluationType`](evaluation_type::EvaluationType) of the
//! manager.

pub mod container;
pub mod error;
pub mod evaluation_type;
pub mod evaluator;
pub mod graph;
pub mod manager;
pub mod parallel;
pub mod producers;
pub mod tag;
pub mod workset;

pub mod scalar {
    pub use fieldgraph_scalar::*;
}

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use error::EvaluationError;
pub use evaluation_type::EvaluationType;
pub use manager::{BuildSettings, EvaluationManager};
pub use tag::{Dimension, FieldTag};
pub use workset::Workset;
