//! A nonlinear reaction problem on the unit interval with linear line elements.
//!
//! The residual is
//!
//! ```text
//! R_i(u) = ∫ (u³ + sin(u) - 1) N_i dx,
//! ```
//!
//! integrated with two-point Gauss quadrature on every element.
use crate::line_worksets;
use fieldgraph::evaluation_type::EvaluationType;
use fieldgraph::evaluator::{EvaluationContext, Evaluator, FieldBinder, FieldContract, FieldHandle};
use fieldgraph::manager::LayoutRule;
use fieldgraph::producers::{
    GatherSolution, GlobalAssembly, GlobalSolution, InterpolateToQuadrature, Pointwise, ScatterResidual,
    SharedSolution,
};
use fieldgraph::scalar::Number;
use fieldgraph::tag::{Dimension, FieldTag};
use fieldgraph::workset::Workset;
use fieldgraph::{BuildSettings, EvaluationError, EvaluationManager};
use nalgebra::DVector;
use parking_lot::RwLock;
use std::marker::PhantomData;
use std::sync::Arc;

pub const NUM_CELLS: usize = 6;
pub const NUM_DOFS: usize = NUM_CELLS + 1;
pub const CELLS_PER_WORKSET: usize = 4;

pub fn basis_tag() -> FieldTag {
    FieldTag::new("BF", [Dimension::Cell, Dimension::Node(2), Dimension::QuadPoint(2)]).unwrap()
}

pub fn weighted_basis_tag() -> FieldTag {
    FieldTag::new("wBF", [Dimension::Cell, Dimension::Node(2), Dimension::QuadPoint(2)]).unwrap()
}

pub fn solution_tag() -> FieldTag {
    FieldTag::node_vector("u", 2, 1).unwrap()
}

pub fn residual_tag() -> FieldTag {
    FieldTag::node_vector("Residual", 2, 1).unwrap()
}

pub fn worksets() -> Vec<Workset> {
    line_worksets(NUM_CELLS, CELLS_PER_WORKSET)
}

pub fn shared_solution(x: DVector<f64>) -> SharedSolution<f64> {
    Arc::new(RwLock::new(GlobalSolution::new(x)))
}

/// A smooth, non-uniform solution.
pub fn initial_solution() -> DVector<f64> {
    DVector::from_fn(NUM_DOFS, |i, _| 0.3 + 0.5 * (i as f64).sin())
}

/// Basis function values `N_n(x_q)` on the reference element `[0, 1]`.
fn basis_value(node: usize, q: usize) -> f64 {
    let offset = 0.5 / 3.0f64.sqrt();
    let x = if q == 0 { 0.5 - offset } else { 0.5 + offset };
    if node == 0 {
        1.0 - x
    } else {
        x
    }
}

/// Computes `residual(c, n) = sum_q r(c, q) * wBF(c, n, q)`.
struct Integrate<S> {
    dependencies: Vec<FieldTag>,
    evaluated: Vec<FieldTag>,
    handles: Option<[FieldHandle; 3]>,
    marker: PhantomData<fn() -> S>,
}

impl<S> Integrate<S> {
    fn new(integrand: FieldTag) -> Self {
        Self {
            dependencies: vec![integrand, weighted_basis_tag()],
            evaluated: vec![residual_tag()],
            handles: None,
            marker: PhantomData,
        }
    }
}

impl<S> FieldContract for Integrate<S> {
    fn name(&self) -> &str {
        "Integrate Residual"
    }

    fn dependencies(&self) -> &[FieldTag] {
        &self.dependencies
    }

    fn evaluated_fields(&self) -> &[FieldTag] {
        &self.evaluated
    }
}

impl<S: Number> Evaluator<S> for Integrate<S> {
    fn bind(&mut self, fields: &FieldBinder<'_>) -> Result<(), EvaluationError> {
        self.handles = Some([
            fields.resolve(&self.dependencies[0])?,
            fields.resolve(&self.dependencies[1])?,
            fields.resolve(&self.evaluated[0])?,
        ]);
        Ok(())
    }

    fn evaluate(&mut self, context: &EvaluationContext<'_, S>) -> eyre::Result<()> {
        let [integrand, weights, residual] = self.handles.ok_or_else(|| eyre::eyre!("Not bound"))?;
        let integrand = context.field(integrand)?;
        let weights = context.field(weights)?;
        let mut residual = context.field_mut(residual)?;
        for c in 0..context.workset().cell_count() {
            for n in 0..2 {
                let mut r = S::from_f64(0.0);
                for q in 0..2 {
                    r += integrand.get(&[c, q, 0])? * weights.get(&[c, n, q])?;
                }
                residual.set(&[c, n, 0], r)?;
            }
        }
        Ok(())
    }
}

/// A ready manager evaluating the residual and scattering it into `assembly`.
pub fn line_manager<S: Number>(
    evaluation_type: EvaluationType,
    layout_rule: LayoutRule<S>,
    solution: SharedSolution<S::Real>,
    assembly: Arc<GlobalAssembly<S::Real>>,
) -> Result<EvaluationManager<S>, EvaluationError> {
    let gather = GatherSolution::<S>::new(evaluation_type, solution_tag(), solution)?;
    let interpolate = InterpolateToQuadrature::<S>::new(solution_tag(), basis_tag(), "u")?;
    let u_qp = interpolate.output().clone();
    let reaction_tag = FieldTag::new("Reaction", u_qp.shape().to_vec())?;
    let reaction = Pointwise::new("Reaction", vec![u_qp], reaction_tag.clone(), |args: &[S]| {
        let u = args[0].clone();
        u.clone().powi(3) + u.sin() - S::from_f64(1.0)
    })?;
    let integrate = Integrate::<S>::new(reaction_tag);
    let scatter = ScatterResidual::<S>::new(evaluation_type, residual_tag(), assembly)?;
    let scatter_tag = scatter.scatter_tag().clone();

    let mut manager = EvaluationManager::new(evaluation_type, layout_rule)?;
    manager.register_evaluator(scatter)?;
    manager.register_evaluator(integrate)?;
    manager.register_evaluator(reaction)?;
    manager.register_evaluator(interpolate)?;
    manager.register_evaluator(gather)?;
    manager.declare_source(basis_tag())?;
    manager.declare_source(weighted_basis_tag())?;
    manager.require_field(scatter_tag)?;
    manager.build(&BuildSettings::with_max_cells(CELLS_PER_WORKSET))?;
    manager.bind()?;
    Ok(manager)
}

/// Fills the basis function sources and evaluates `workset`.
pub fn evaluate_workset<S: Number>(
    manager: &mut EvaluationManager<S>,
    workset: &Workset,
) -> Result<(), EvaluationError> {
    let h = 1.0 / NUM_CELLS as f64;
    {
        let mut basis = manager.source_mut(&basis_tag(), workset)?;
        for c in 0..workset.cell_count() {
            for n in 0..2 {
                for q in 0..2 {
                    basis.set(&[c, n, q], S::from_f64(basis_value(n, q)))?;
                }
            }
        }
    }
    {
        let mut weighted = manager.source_mut(&weighted_basis_tag(), workset)?;
        for c in 0..workset.cell_count() {
            for n in 0..2 {
                for q in 0..2 {
                    weighted.set(&[c, n, q], S::from_f64(0.5 * h * basis_value(n, q)))?;
                }
            }
        }
    }
    manager.evaluate(workset)
}

/// Evaluates all worksets in sequence.
pub fn assemble<S: Number>(manager: &mut EvaluationManager<S>, worksets: &[Workset]) -> Result<(), EvaluationError> {
    for workset in worksets {
        evaluate_workset(manager, workset)?;
    }
    Ok(())
}

/// The assembled residual at `x`.
pub fn residual_at(x: &DVector<f64>) -> DVector<f64> {
    let assembly = Arc::new(GlobalAssembly::new(NUM_DOFS));
    let mut manager = line_manager::<f64>(
        EvaluationType::Residual,
        LayoutRule::default(),
        shared_solution(x.clone()),
        assembly.clone(),
    )
    .unwrap();
    assemble(&mut manager, &worksets()).unwrap();
    assembly.residual()
}
