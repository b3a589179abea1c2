//! General-purpose evaluators.
//!
//! Physics code usually plugs into the graph through [`Pointwise`] (formulas applied entry by
//! entry) or through its own [`Evaluator`](crate::evaluator::Evaluator) implementations. The
//! remaining evaluators connect the graph to a global discretization: [`GatherSolution`]
//! reads local unknowns from a global solution, [`InterpolateToQuadrature`] maps nodal values
//! to quadrature points, and [`ScatterResidual`] sums local residuals (and their derivatives)
//! into global storage.

mod gather;
mod interpolate;
mod pointwise;
mod scatter;

pub use gather::*;
pub use interpolate::*;
pub use pointwise::*;
pub use scatter::*;

use crate::error::EvaluationError;
use crate::tag::{Dimension, FieldTag};

/// Returns the extents of a `(Cell, <first>(n), <second>(m))` field, or an error naming
/// `expected` if the tag has a different shape.
fn cell_matrix_extents(
    tag: &FieldTag,
    first: fn(&Dimension) -> Option<usize>,
    second: fn(&Dimension) -> Option<usize>,
    expected: &str,
) -> Result<(usize, usize), EvaluationError> {
    match tag.shape() {
        [Dimension::Cell, a, b] => match (first(a), second(b)) {
            (Some(n), Some(m)) => Ok((n, m)),
            _ => Err(shape_error(tag, expected)),
        },
        _ => Err(shape_error(tag, expected)),
    }
}

fn shape_error(tag: &FieldTag, expected: &str) -> EvaluationError {
    EvaluationError::InvalidShape {
        name: tag.name().to_string(),
        reason: format!("expected shape {}, got {}", expected, tag),
    }
}

fn node(dim: &Dimension) -> Option<usize> {
    match dim {
        Dimension::Node(n) => Some(*n),
        _ => None,
    }
}

fn quad_point(dim: &Dimension) -> Option<usize> {
    match dim {
        Dimension::QuadPoint(n) => Some(*n),
        _ => None,
    }
}

fn component(dim: &Dimension) -> Option<usize> {
    match dim {
        Dimension::Component(n) => Some(*n),
        _ => None,
    }
}
