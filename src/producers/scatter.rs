use super::{cell_matrix_extents, component, node};
use crate::error::EvaluationError;
use crate::evaluation_type::EvaluationType;
use crate::evaluator::{EvaluationContext, Evaluator, FieldBinder, FieldContract, FieldHandle};
use crate::scalar::{InconsistentDerivativeLength, Number, Real};
use crate::tag::{Dimension, FieldTag};
use eyre::eyre;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use num::Zero;
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::Arc;

/// Global storage that scatter evaluators accumulate into.
///
/// All contributions are sums, so worksets may be scattered in any order and from several
/// threads at once. The contributions of one workset are added under a single lock, and only
/// after all of them have been validated.
#[derive(Debug)]
pub struct GlobalAssembly<T: Real> {
    num_dofs: usize,
    accumulated: Mutex<Accumulated<T>>,
}

#[derive(Debug)]
struct Accumulated<T: Real> {
    residual: DVector<T>,
    jacobian: CooMatrix<T>,
    // Tangents or expansion coefficients, one row per degree of freedom
    components: Option<DMatrix<T>>,
    // One matrix per expansion coefficient
    coefficient_jacobians: Vec<CooMatrix<T>>,
    coefficient_tangents: Vec<DMatrix<T>>,
}

impl<T: Real> Accumulated<T> {
    fn new(num_dofs: usize) -> Self {
        Self {
            residual: DVector::zeros(num_dofs),
            jacobian: CooMatrix::new(num_dofs, num_dofs),
            components: None,
            coefficient_jacobians: Vec::new(),
            coefficient_tangents: Vec::new(),
        }
    }

    /// Checks that `contributions` fit the storage accumulated so far.
    fn check(&self, contributions: &Contributions<T>) -> eyre::Result<()> {
        if let (Some(matrix), Some(ncols)) = (&self.components, contributions.num_components) {
            if matrix.ncols() != ncols {
                return Err(eyre!(
                    "Cannot scatter {} components into an assembly with {} columns",
                    ncols,
                    matrix.ncols()
                ));
            }
        }
        if let Some(num_coefficients) = contributions.num_coefficient_jacobians {
            let existing = self.coefficient_jacobians.len();
            if existing != 0 && existing != num_coefficients {
                return Err(eyre!(
                    "Cannot scatter Jacobians of {} coefficients into an assembly with {}",
                    num_coefficients,
                    existing
                ));
            }
        }
        if let Some((num_coefficients, num_directions)) = contributions.coefficient_tangent_shape {
            if let Some(first) = self.coefficient_tangents.first() {
                if self.coefficient_tangents.len() != num_coefficients || first.ncols() != num_directions {
                    return Err(eyre!(
                        "Cannot scatter tangents of {} coefficients along {} directions into an assembly with {} \
                         coefficients and {} directions",
                        num_coefficients,
                        num_directions,
                        self.coefficient_tangents.len(),
                        first.ncols()
                    ));
                }
            }
        }
        Ok(())
    }

    fn add(&mut self, contributions: Contributions<T>, num_dofs: usize) {
        for (row, value) in contributions.residual {
            self.residual[row] += value;
        }
        for (row, col, value) in contributions.jacobian {
            self.jacobian.push(row, col, value);
        }
        if let Some(ncols) = contributions.num_components {
            let matrix = self
                .components
                .get_or_insert_with(|| DMatrix::zeros(num_dofs, ncols));
            for (row, col, value) in contributions.components {
                matrix[(row, col)] += value;
            }
        }
        if let Some(num_coefficients) = contributions.num_coefficient_jacobians {
            if self.coefficient_jacobians.is_empty() {
                self.coefficient_jacobians = vec![CooMatrix::new(num_dofs, num_dofs); num_coefficients];
            }
            for (k, row, col, value) in contributions.coefficient_jacobians {
                self.coefficient_jacobians[k].push(row, col, value);
            }
        }
        if let Some((num_coefficients, num_directions)) = contributions.coefficient_tangent_shape {
            if self.coefficient_tangents.is_empty() {
                self.coefficient_tangents = vec![DMatrix::zeros(num_dofs, num_directions); num_coefficients];
            }
            for (k, row, col, value) in contributions.coefficient_tangents {
                self.coefficient_tangents[k][(row, col)] += value;
            }
        }
    }
}

impl<T: Real> GlobalAssembly<T> {
    pub fn new(num_dofs: usize) -> Self {
        Self {
            num_dofs,
            accumulated: Mutex::new(Accumulated::new(num_dofs)),
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    /// Resets all accumulated contributions to zero.
    pub fn clear(&self) {
        *self.accumulated.lock() = Accumulated::new(self.num_dofs);
    }

    /// The accumulated residual (primal values, or means of expansions).
    pub fn residual(&self) -> DVector<T> {
        self.accumulated.lock().residual.clone()
    }

    /// The accumulated Jacobian, with duplicate entries summed.
    pub fn jacobian(&self) -> CsrMatrix<T> {
        CsrMatrix::from(&self.accumulated.lock().jacobian)
    }

    /// The accumulated tangent columns (for `Tangent`) or expansion coefficients (for the
    /// expansion evaluation types), one row per degree of freedom.
    pub fn components(&self) -> Option<DMatrix<T>> {
        self.accumulated.lock().components.clone()
    }

    /// The accumulated Jacobian of every expansion coefficient (for `SgJacobian` and
    /// `MpJacobian`).
    pub fn coefficient_jacobians(&self) -> Vec<CsrMatrix<T>> {
        self.accumulated
            .lock()
            .coefficient_jacobians
            .iter()
            .map(CsrMatrix::from)
            .collect()
    }

    /// The accumulated tangent columns of every expansion coefficient (for `SgTangent` and
    /// `MpTangent`), one row per degree of freedom.
    pub fn coefficient_tangents(&self) -> Vec<DMatrix<T>> {
        self.accumulated.lock().coefficient_tangents.clone()
    }
}

/// Contributions of one workset, collected before anything is added to the assembly.
#[derive(Debug)]
struct Contributions<T> {
    residual: Vec<(usize, T)>,
    jacobian: Vec<(usize, usize, T)>,
    num_components: Option<usize>,
    components: Vec<(usize, usize, T)>,
    num_coefficient_jacobians: Option<usize>,
    coefficient_jacobians: Vec<(usize, usize, usize, T)>,
    coefficient_tangent_shape: Option<(usize, usize)>,
    coefficient_tangents: Vec<(usize, usize, usize, T)>,
}

impl<T> Contributions<T> {
    fn new(evaluation_type: EvaluationType, num_coefficients: usize, derivative_len: usize) -> Self {
        use EvaluationType::*;
        let num_components = match evaluation_type {
            Tangent => Some(derivative_len),
            _ if evaluation_type.is_expansion() => Some(num_coefficients),
            _ => None,
        };
        Self {
            residual: Vec::new(),
            jacobian: Vec::new(),
            num_components,
            components: Vec::new(),
            num_coefficient_jacobians: matches!(evaluation_type, SgJacobian | MpJacobian).then_some(num_coefficients),
            coefficient_jacobians: Vec::new(),
            coefficient_tangent_shape: matches!(evaluation_type, SgTangent | MpTangent)
                .then_some((num_coefficients, derivative_len)),
            coefficient_tangents: Vec::new(),
        }
    }
}

/// Sums a local residual into a [`GlobalAssembly`].
///
/// Consumes a `(Cell, Node(n), Component(neq))` residual field and scatters it through the DOF
/// map of each workset:
///
/// - the primal value (the mean for expansions) of each entry into the residual vector,
/// - for `Jacobian`, the derivative with respect to local unknown `k` into the Jacobian entry
///   `(row, cell_dofs[k])`,
/// - for `Tangent`, the derivative vector into the corresponding row of the component matrix,
/// - for the expansion types, the coefficients of the value into the corresponding row of the
///   component matrix,
/// - for `SgJacobian` and `MpJacobian`, coefficient `c` of the derivative with respect to
///   local unknown `k` into entry `(row, cell_dofs[k])` of the Jacobian of coefficient `c`,
/// - for `SgTangent` and `MpTangent`, coefficient `c` of directional derivative `j` into
///   entry `(row, j)` of the tangent matrix of coefficient `c`.
///
/// Every local unknown of a cell gets a Jacobian entry, also when its derivative is zero.
/// The contributions of a workset are validated before any of them is added, so a failed
/// scatter leaves the assembly unchanged.
///
/// This is a terminal evaluator with side effects: every workset must be scattered at most
/// once per assembly pass. It evaluates a placeholder field ([`ScatterResidual::scatter_tag`])
/// which can be required to prune evaluators that do not contribute to the residual.
#[derive(Debug)]
pub struct ScatterResidual<S: Number> {
    name: String,
    evaluation_type: EvaluationType,
    assembly: Arc<GlobalAssembly<S::Real>>,
    dependencies: Vec<FieldTag>,
    evaluated: Vec<FieldTag>,
    num_nodes: usize,
    equations_per_node: usize,
    residual: Option<FieldHandle>,
    marker: PhantomData<fn() -> S>,
}

impl<S: Number> ScatterResidual<S> {
    pub fn new(
        evaluation_type: EvaluationType,
        residual: FieldTag,
        assembly: Arc<GlobalAssembly<S::Real>>,
    ) -> Result<Self, EvaluationError> {
        let (num_nodes, equations_per_node) =
            cell_matrix_extents(&residual, node, component, "(Cell, Node, Component)")?;
        let scatter_tag = FieldTag::new(format!("Scatter {}", residual.name()), [Dimension::Named("Dummy".into(), 1)])?;
        Ok(Self {
            name: format!("Scatter {}{}", residual.name(), evaluation_type),
            evaluation_type,
            assembly,
            dependencies: vec![residual],
            evaluated: vec![scatter_tag],
            num_nodes,
            equations_per_node,
            residual: None,
            marker: PhantomData,
        })
    }

    /// The placeholder field evaluated by this scatter.
    pub fn scatter_tag(&self) -> &FieldTag {
        &self.evaluated[0]
    }
}

impl<S: Number> FieldContract for ScatterResidual<S> {
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

impl<S: Number> Evaluator<S> for ScatterResidual<S> {
    fn bind(&mut self, fields: &FieldBinder<'_>) -> Result<(), EvaluationError> {
        self.residual = Some(fields.resolve(&self.dependencies[0])?);
        Ok(())
    }

    fn evaluate(&mut self, context: &EvaluationContext<'_, S>) -> eyre::Result<()> {
        let handle = self
            .residual
            .ok_or_else(|| eyre!("\"{}\" was evaluated before being bound", self.name))?;
        let workset = context.workset();
        let dofs = workset
            .element_dofs()
            .ok_or_else(|| eyre!("Workset {} has no DOF map to scatter into", workset.index()))?;
        if dofs.nodes_per_cell() != self.num_nodes || dofs.equations_per_node() != self.equations_per_node {
            return Err(eyre!(
                "DOF map of workset {} does not match the shape of residual {}",
                workset.index(),
                self.dependencies[0]
            ));
        }
        let num_dofs = self.assembly.num_dofs();
        if let Some(&dof) = (0..workset.cell_count())
            .flat_map(|cell| dofs.cell_dofs(cell))
            .find(|&&dof| dof >= num_dofs)
        {
            return Err(eyre!("DOF {} is out of bounds for an assembly of {} DOFs", dof, num_dofs));
        }

        let layout = context.layout();
        let derivative_len = S::derivative_len(layout);
        let num_coefficients = S::coefficient_count(layout);
        if self.evaluation_type.is_jacobian() && derivative_len != dofs.unknowns_per_cell() {
            return Err(EvaluationError::InconsistentDerivativeLength {
                tag: self.dependencies[0].clone(),
                source: InconsistentDerivativeLength::new(dofs.unknowns_per_cell(), derivative_len),
            }
            .into());
        }

        let local = context.field(handle)?;
        let mut contributions = Contributions::new(self.evaluation_type, num_coefficients, derivative_len);
        // Value block first, then one block of coefficients per derivative
        let mut slots = vec![S::Real::zero(); S::footprint(layout)];
        let block = |b: usize, k: usize| b * num_coefficients + k;

        for cell in 0..workset.cell_count() {
            let cell_dofs = dofs.cell_dofs(cell);
            for node in 0..self.num_nodes {
                for eq in 0..self.equations_per_node {
                    let value = local.get(&[cell, node, eq])?;
                    value
                        .store(layout, &mut slots)
                        .map_err(|source| EvaluationError::InconsistentDerivativeLength {
                            tag: self.dependencies[0].clone(),
                            source,
                        })?;
                    let row = dofs.dof(cell, node, eq);
                    contributions.residual.push((row, value.value()));

                    match self.evaluation_type {
                        EvaluationType::Residual => {}
                        EvaluationType::Jacobian => {
                            for (j, &col) in cell_dofs.iter().enumerate() {
                                contributions.jacobian.push((row, col, slots[block(1 + j, 0)]));
                            }
                        }
                        EvaluationType::Tangent => {
                            for j in 0..derivative_len {
                                contributions.components.push((row, j, slots[block(1 + j, 0)]));
                            }
                        }
                        EvaluationType::SgResidual
                        | EvaluationType::MpResidual
                        | EvaluationType::SgJacobian
                        | EvaluationType::MpJacobian
                        | EvaluationType::SgTangent
                        | EvaluationType::MpTangent => {
                            for k in 0..num_coefficients {
                                contributions.components.push((row, k, slots[block(0, k)]));
                            }
                            for j in 0..derivative_len {
                                for k in 0..num_coefficients {
                                    let d = slots[block(1 + j, k)];
                                    if self.evaluation_type.is_jacobian() {
                                        contributions.coefficient_jacobians.push((k, row, cell_dofs[j], d));
                                    } else {
                                        contributions.coefficient_tangents.push((k, row, j, d));
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        let mut accumulated = self.assembly.accumulated.lock();
        accumulated.check(&contributions)?;
        accumulated.add(contributions, num_dofs);
        Ok(())
    }
}
