use super::{cell_matrix_extents, component, node, quad_point, shape_error};
use crate::error::EvaluationError;
use crate::evaluator::{EvaluationContext, Evaluator, FieldBinder, FieldContract, FieldHandle};
use crate::scalar::Number;
use crate::tag::{Dimension, FieldTag};
use eyre::eyre;
use std::marker::PhantomData;

/// Interpolates nodal values to quadrature points.
///
/// Given nodal values `u` with shape `(Cell, Node(n), Component(d))` and basis function
/// values `BF` with shape `(Cell, Node(n), QuadPoint(q))`, computes
///
/// ```text
/// u_qp(c, q, i) = sum_n u(c, n, i) * BF(c, n, q)
/// ```
///
/// as a field with shape `(Cell, QuadPoint(q), Component(d))`.
#[derive(Debug)]
pub struct InterpolateToQuadrature<S> {
    name: String,
    dependencies: Vec<FieldTag>,
    evaluated: Vec<FieldTag>,
    num_nodes: usize,
    num_points: usize,
    num_components: usize,
    handles: Option<[FieldHandle; 3]>,
    marker: PhantomData<fn() -> S>,
}

impl<S: Number> InterpolateToQuadrature<S> {
    /// Creates the evaluator, producing the field `output_name` at the quadrature points.
    pub fn new(nodal: FieldTag, basis: FieldTag, output_name: impl Into<String>) -> Result<Self, EvaluationError> {
        let (num_nodes, num_components) = cell_matrix_extents(&nodal, node, component, "(Cell, Node, Component)")?;
        let (basis_nodes, num_points) = cell_matrix_extents(&basis, node, quad_point, "(Cell, Node, QuadPoint)")?;
        if basis_nodes != num_nodes {
            return Err(shape_error(&basis, &format!("(Cell, Node({}), QuadPoint)", num_nodes)));
        }
        let output = FieldTag::new(
            output_name,
            [
                Dimension::Cell,
                Dimension::QuadPoint(num_points),
                Dimension::Component(num_components),
            ],
        )?;
        Ok(Self {
            name: format!("Interpolate {} to quadrature points", nodal.name()),
            dependencies: vec![nodal, basis],
            evaluated: vec![output],
            num_nodes,
            num_points,
            num_components,
            handles: None,
            marker: PhantomData,
        })
    }

    /// The interpolated field.
    pub fn output(&self) -> &FieldTag {
        &self.evaluated[0]
    }
}

impl<S> FieldContract for InterpolateToQuadrature<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> &[FieldTag] {
        &self.dependencies
    }

    fn evaluated_fields(&self) -> &[FieldTag] {
        &self.evaluated
    }
}

impl<S: Number> Evaluator<S> for InterpolateToQuadrature<S> {
    fn bind(&mut self, fields: &FieldBinder<'_>) -> Result<(), EvaluationError> {
        self.handles = Some([
            fields.resolve(&self.dependencies[0])?,
            fields.resolve(&self.dependencies[1])?,
            fields.resolve(&self.evaluated[0])?,
        ]);
        Ok(())
    }

    fn evaluate(&mut self, context: &EvaluationContext<'_, S>) -> eyre::Result<()> {
        let [nodal, basis, output] = self
            .handles
            .ok_or_else(|| eyre!("\"{}\" was evaluated before being bound", self.name))?;
        let nodal = context.field(nodal)?;
        let basis = context.field(basis)?;
        let mut output = context.field_mut(output)?;

        for cell in 0..context.workset().cell_count() {
            for q in 0..self.num_points {
                for i in 0..self.num_components {
                    let mut value = S::from_f64(0.0);
                    for n in 0..self.num_nodes {
                        value += nodal.get(&[cell, n, i])? * basis.get(&[cell, n, q])?;
                    }
                    output.set(&[cell, q, i], value)?;
                }
            }
        }
        Ok(())
    }
}
