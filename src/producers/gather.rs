use super::{cell_matrix_extents, component, node};
use crate::error::EvaluationError;
use crate::evaluation_type::EvaluationType;
use crate::evaluator::{EvaluationContext, Evaluator, FieldBinder, FieldContract, FieldHandle};
use crate::scalar::{InconsistentDerivativeLength, Number};
use crate::tag::FieldTag;
use eyre::eyre;
use nalgebra::{DMatrix, DVector, Scalar};
use num::Zero;
use parking_lot::RwLock;
use std::marker::PhantomData;
use std::sync::Arc;

/// The global solution the local unknowns are gathered from.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSolution<T: Scalar> {
    /// Global solution vector, one entry per degree of freedom.
    pub x: DVector<T>,
    /// Tangent directions, one row per degree of freedom and one column per direction.
    /// Only used by the tangent evaluation types.
    pub directions: Option<DMatrix<T>>,
    /// Expansion coefficients of the solution, one row per degree of freedom and one column
    /// per coefficient. Only used by the expansion evaluation types, which treat the solution
    /// `x` as deterministic when no coefficients are given.
    pub coefficients: Option<DMatrix<T>>,
}

impl<T: Scalar> GlobalSolution<T> {
    pub fn new(x: DVector<T>) -> Self {
        Self {
            x,
            directions: None,
            coefficients: None,
        }
    }

    pub fn with_directions(self, directions: DMatrix<T>) -> Self {
        Self {
            directions: Some(directions),
            ..self
        }
    }

    pub fn with_coefficients(self, coefficients: DMatrix<T>) -> Self {
        Self {
            coefficients: Some(coefficients),
            ..self
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.x.len()
    }
}

/// A global solution shared between the caller and the gather evaluators of all managers.
pub type SharedSolution<T> = Arc<RwLock<GlobalSolution<T>>>;

/// Gathers the local unknowns of every cell from a global solution.
///
/// Produces a `(Cell, Node(n), Component(neq))` field through the DOF map of the workset. The
/// gathered values are seeded according to the evaluation type:
///
/// - `Residual`: plain values,
/// - `Jacobian`, `SgJacobian`, `MpJacobian`: independent variables, where the unknown of
///   `(node, equation)` has derivative index `node * neq + equation`,
/// - `Tangent`, `SgTangent`, `MpTangent`: variables seeded with the rows of the tangent
///   directions,
/// - `SgResidual`, `MpResidual`: constants.
///
/// The expansion types take the value of each unknown from the solution coefficients when the
/// solution has them, and embed the deterministic value `x` otherwise.
#[derive(Debug)]
pub struct GatherSolution<S: Number> {
    name: String,
    evaluation_type: EvaluationType,
    solution: SharedSolution<S::Real>,
    evaluated: Vec<FieldTag>,
    num_nodes: usize,
    equations_per_node: usize,
    output: Option<FieldHandle>,
    marker: PhantomData<fn() -> S>,
}

impl<S: Number> GatherSolution<S> {
    pub fn new(
        evaluation_type: EvaluationType,
        tag: FieldTag,
        solution: SharedSolution<S::Real>,
    ) -> Result<Self, EvaluationError> {
        let (num_nodes, equations_per_node) = cell_matrix_extents(&tag, node, component, "(Cell, Node, Component)")?;
        Ok(Self {
            name: format!("Gather Solution{}", evaluation_type),
            evaluation_type,
            solution,
            evaluated: vec![tag],
            num_nodes,
            equations_per_node,
            output: None,
            marker: PhantomData,
        })
    }
}

impl<S: Number> FieldContract for GatherSolution<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> &[FieldTag] {
        &[]
    }

    fn evaluated_fields(&self) -> &[FieldTag] {
        &self.evaluated
    }
}

impl<S: Number> Evaluator<S> for GatherSolution<S> {
    fn bind(&mut self, fields: &FieldBinder<'_>) -> Result<(), EvaluationError> {
        self.output = Some(fields.resolve(&self.evaluated[0])?);
        Ok(())
    }

    fn evaluate(&mut self, context: &EvaluationContext<'_, S>) -> eyre::Result<()> {
        let handle = self
            .output
            .ok_or_else(|| eyre!("\"{}\" was evaluated before being bound", self.name))?;
        let workset = context.workset();
        let dofs = workset
            .element_dofs()
            .ok_or_else(|| eyre!("Workset {} has no DOF map to gather from", workset.index()))?;
        if dofs.nodes_per_cell() != self.num_nodes || dofs.equations_per_node() != self.equations_per_node {
            return Err(eyre!(
                "DOF map of workset {} has {} nodes with {} equations, but field {} expects {} and {}",
                workset.index(),
                dofs.nodes_per_cell(),
                dofs.equations_per_node(),
                self.evaluated[0],
                self.num_nodes,
                self.equations_per_node
            ));
        }

        let layout = context.layout();
        let derivative_len = S::derivative_len(layout);
        if self.evaluation_type.is_jacobian() && derivative_len != dofs.unknowns_per_cell() {
            return Err(EvaluationError::InconsistentDerivativeLength {
                tag: self.evaluated[0].clone(),
                source: InconsistentDerivativeLength::new(dofs.unknowns_per_cell(), derivative_len),
            }
            .into());
        }

        let solution = self.solution.read();
        let directions = if self.evaluation_type.is_tangent() {
            let directions = solution
                .directions
                .as_ref()
                .ok_or_else(|| eyre!("Tangent evaluation requires tangent directions"))?;
            if directions.nrows() != solution.num_dofs() {
                return Err(eyre!(
                    "Tangent directions have {} rows, but the solution has {} entries",
                    directions.nrows(),
                    solution.num_dofs()
                ));
            }
            if directions.ncols() != derivative_len {
                return Err(EvaluationError::InconsistentDerivativeLength {
                    tag: self.evaluated[0].clone(),
                    source: InconsistentDerivativeLength::new(derivative_len, directions.ncols()),
                }
                .into());
            }
            Some(directions)
        } else {
            None
        };
        let coefficients = match &solution.coefficients {
            Some(coefficients) if self.evaluation_type.is_expansion() => {
                let num_coefficients = S::coefficient_count(layout);
                if coefficients.nrows() != solution.num_dofs() || coefficients.ncols() != num_coefficients {
                    return Err(eyre!(
                        "Solution coefficients have shape {}x{}, expected {}x{}",
                        coefficients.nrows(),
                        coefficients.ncols(),
                        solution.num_dofs(),
                        num_coefficients
                    ));
                }
                Some(coefficients)
            }
            _ => None,
        };

        let mut output = context.field_mut(handle)?;
        let neq = self.equations_per_node;
        let mut seeds = Vec::new();
        let mut row = Vec::new();
        for cell in 0..workset.cell_count() {
            for node in 0..self.num_nodes {
                for eq in 0..neq {
                    let dof = dofs.dof(cell, node, eq);
                    let value = *solution.x.get(dof).ok_or_else(|| {
                        eyre!("DOF {} is out of bounds for a solution with {} entries", dof, solution.num_dofs())
                    })?;
                    // With coefficients, the value comes from the coefficients alone
                    let seed_value = if coefficients.is_some() { S::Real::zero() } else { value };
                    let mut gathered = if self.evaluation_type.is_jacobian() {
                        S::independent(seed_value, node * neq + eq, layout)
                    } else if let Some(directions) = directions {
                        seeds.clear();
                        seeds.extend(directions.row(dof).iter().copied());
                        S::seeded(seed_value, &seeds, layout)
                    } else {
                        S::constant(seed_value)
                    };
                    if let Some(coefficients) = coefficients {
                        row.clear();
                        row.extend(coefficients.row(dof).iter().copied());
                        gathered += S::from_coefficients(&row, layout);
                    }
                    output.set(&[cell, node, eq], gathered)?;
                }
            }
        }
        Ok(())
    }
}
