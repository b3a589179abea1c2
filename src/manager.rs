//! Owning, binding and running the evaluators of one evaluation type.
use crate::container::{FieldContainer, FieldView, StoragePolicy};
use crate::error::{EvaluationError, EXTERNAL_WRITER};
use crate::evaluation_type::EvaluationType;
use crate::evaluator::{EvaluationContext, Evaluator, FieldBinder, FieldHandle, FieldRef, FieldStore};
use crate::graph::{DependencyGraph, Producer};
use crate::scalar::algebra::ExpansionAlgebra;
use crate::scalar::{Expansion, ExpansionFad, ExpansionFadLayout, ExpansionLayout, Fad, FadLayout, Number, Real};
use crate::tag::FieldTag;
use crate::workset::Workset;
use log::{info, trace};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Lifecycle of an [`EvaluationManager`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManagerState {
    /// Evaluators are being registered; the graph has not been built.
    Uninitialized,
    /// The graph is built and fields are allocated.
    Bound,
    /// Evaluators are bound to their fields and worksets can be evaluated.
    Ready,
}

impl Display for ManagerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Bound => write!(f, "Bound"),
            Self::Ready => write!(f, "Ready"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSettings {
    /// The largest number of cells of any workset that will be evaluated.
    pub max_cells: usize,
    pub storage: StoragePolicy,
}

impl BuildSettings {
    pub fn with_max_cells(max_cells: usize) -> Self {
        Self {
            max_cells,
            storage: StoragePolicy::default(),
        }
    }

    pub fn with_storage(self, storage: StoragePolicy) -> Self {
        Self { storage, ..self }
    }
}

/// Determines the scalar layout (e.g. the derivative length) used for a workset.
pub enum LayoutRule<S: Number> {
    /// The same layout for every workset.
    Fixed(S::Layout),
    /// A layout computed from each workset. `initial` is used to allocate fields.
    PerWorkset {
        initial: S::Layout,
        rule: Box<dyn Fn(&Workset) -> S::Layout + Send + Sync>,
    },
}

impl<S: Number> LayoutRule<S> {
    pub fn per_workset(initial: S::Layout, rule: impl Fn(&Workset) -> S::Layout + Send + Sync + 'static) -> Self {
        Self::PerWorkset {
            initial,
            rule: Box::new(rule),
        }
    }

    pub fn initial(&self) -> &S::Layout {
        match self {
            Self::Fixed(layout) => layout,
            Self::PerWorkset { initial, .. } => initial,
        }
    }

    pub fn layout_for(&self, workset: &Workset) -> S::Layout {
        match self {
            Self::Fixed(layout) => layout.clone(),
            Self::PerWorkset { rule, .. } => rule(workset),
        }
    }
}

impl<S: Number<Layout = ()>> Default for LayoutRule<S> {
    fn default() -> Self {
        Self::Fixed(())
    }
}

impl<S: Number> Debug for LayoutRule<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(layout) => f.debug_tuple("Fixed").field(layout).finish(),
            Self::PerWorkset { initial, .. } => f
                .debug_struct("PerWorkset")
                .field("initial", initial)
                .finish_non_exhaustive(),
        }
    }
}

/// Derivatives with respect to all local unknowns of a cell: one per node and equation.
pub fn jacobian_layout<T: Real>(equations_per_node: usize) -> LayoutRule<Fad<T>> {
    LayoutRule::per_workset(FadLayout::new(0), move |workset: &Workset| {
        FadLayout::new(workset.topology().num_nodes() * equations_per_node)
    })
}

/// Directional derivatives along `num_directions` directions.
pub fn tangent_layout<T: Real>(num_directions: usize) -> LayoutRule<Fad<T>> {
    LayoutRule::Fixed(FadLayout::new(num_directions))
}

pub fn expansion_layout<T: Real, A>(algebra: Arc<A>) -> LayoutRule<Expansion<T, A>>
where
    A: ExpansionAlgebra<T>,
{
    LayoutRule::Fixed(ExpansionLayout::new(algebra))
}

/// Expansion-valued derivatives with respect to all local unknowns of a cell.
pub fn expansion_jacobian_layout<T: Real, A>(
    algebra: Arc<A>,
    equations_per_node: usize,
) -> LayoutRule<ExpansionFad<T, A>>
where
    A: ExpansionAlgebra<T>,
{
    let initial = ExpansionFadLayout::new(Arc::clone(&algebra), 0);
    LayoutRule::per_workset(initial, move |workset: &Workset| {
        ExpansionFadLayout::new(Arc::clone(&algebra), workset.topology().num_nodes() * equations_per_node)
    })
}

/// Expansion-valued directional derivatives along `num_directions` directions.
pub fn expansion_tangent_layout<T: Real, A>(algebra: Arc<A>, num_directions: usize) -> LayoutRule<ExpansionFad<T, A>>
where
    A: ExpansionAlgebra<T>,
{
    LayoutRule::Fixed(ExpansionFadLayout::new(algebra, num_directions))
}

/// Runs the evaluators of one evaluation type over worksets.
///
/// Usage follows the lifecycle `Uninitialized → Bound → Ready`:
///
/// 1. register evaluators, declare source fields and (optionally) required fields,
/// 2. [`build`](Self::build) the dependency graph and allocate fields,
/// 3. [`bind`](Self::bind) evaluators to their fields,
/// 4. for every workset, fill source fields with [`source_mut`](Self::source_mut) and call
///    [`evaluate`](Self::evaluate).
///
/// A manager and its fields must be used by one thread at a time. Use one manager per
/// worker to evaluate worksets in parallel (see [`parallel`](crate::parallel)).
pub struct EvaluationManager<S: Number> {
    evaluation_type: EvaluationType,
    layout_rule: LayoutRule<S>,
    state: ManagerState,
    evaluators: Vec<Box<dyn Evaluator<S>>>,
    sources: Vec<FieldTag>,
    required: Vec<FieldTag>,
    graph: Option<DependencyGraph>,
    store: FieldStore<S>,
    // Fields each evaluator may write, indexed by declaration index
    writable: Vec<Vec<FieldHandle>>,
}

impl<S: Number> Debug for EvaluationManager<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationManager")
            .field("evaluation_type", &self.evaluation_type)
            .field("state", &self.state)
            .field("layout_rule", &self.layout_rule)
            .field("evaluators", &self.evaluators.iter().map(|e| e.name()).collect::<Vec<_>>())
            .field("sources", &self.sources)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

impl<S: Number> EvaluationManager<S> {
    pub fn new(evaluation_type: EvaluationType, layout_rule: LayoutRule<S>) -> Result<Self, EvaluationError> {
        if evaluation_type.representation() != S::REPRESENTATION {
            return Err(EvaluationError::RepresentationMismatch {
                evaluation_type,
                expected: evaluation_type.representation(),
                actual: S::REPRESENTATION,
            });
        }
        Ok(Self {
            evaluation_type,
            layout_rule,
            state: ManagerState::Uninitialized,
            evaluators: Vec::new(),
            sources: Vec::new(),
            required: Vec::new(),
            graph: None,
            store: FieldStore::default(),
            writable: Vec::new(),
        })
    }

    fn expect_state(&self, expected: ManagerState) -> Result<(), EvaluationError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(EvaluationError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    pub fn register_evaluator(&mut self, evaluator: impl Evaluator<S> + 'static) -> Result<(), EvaluationError> {
        self.register_boxed(Box::new(evaluator))
    }

    pub fn register_boxed(&mut self, evaluator: Box<dyn Evaluator<S>>) -> Result<(), EvaluationError> {
        self.expect_state(ManagerState::Uninitialized)?;
        self.evaluators.push(evaluator);
        Ok(())
    }

    /// Declares a field that is filled from outside the graph.
    pub fn declare_source(&mut self, tag: FieldTag) -> Result<(), EvaluationError> {
        self.expect_state(ManagerState::Uninitialized)?;
        self.sources.push(tag);
        Ok(())
    }

    /// Restricts evaluation to the evaluators needed for `tag` (and other required fields).
    pub fn require_field(&mut self, tag: FieldTag) -> Result<(), EvaluationError> {
        self.expect_state(ManagerState::Uninitialized)?;
        self.required.push(tag);
        Ok(())
    }

    /// Builds the dependency graph and allocates all fields it needs.
    pub fn build(&mut self, settings: &BuildSettings) -> Result<(), EvaluationError> {
        self.expect_state(ManagerState::Uninitialized)?;
        let graph = DependencyGraph::build(&self.evaluators, &self.sources, &self.required)?;
        let store = FieldStore::allocate(
            graph.fields(),
            self.layout_rule.initial(),
            settings.max_cells,
            settings.storage,
        )?;
        info!(
            "Built {} evaluation plan with {} of {} evaluators, {} sources and {} fields",
            self.evaluation_type,
            graph.order().len(),
            self.evaluators.len(),
            self.sources.len(),
            store.len()
        );
        self.graph = Some(graph);
        self.store = store;
        self.state = ManagerState::Bound;
        Ok(())
    }

    /// Binds every evaluator in the evaluation order to its fields.
    pub fn bind(&mut self) -> Result<(), EvaluationError> {
        self.expect_state(ManagerState::Bound)?;
        let graph = self.graph.as_ref().ok_or(EvaluationError::InvalidState {
            expected: ManagerState::Bound,
            actual: self.state,
        })?;
        let binder = FieldBinder::new(self.store.handles(), self.evaluation_type);
        let mut writable = vec![Vec::new(); self.evaluators.len()];
        for &i in graph.order() {
            let evaluator = &mut self.evaluators[i];
            evaluator.bind(&binder)?;
            writable[i] = evaluator
                .evaluated_fields()
                .iter()
                .map(|tag| binder.resolve(tag))
                .collect::<Result<_, _>>()?;
        }
        self.writable = writable;
        self.state = ManagerState::Ready;
        Ok(())
    }

    /// Runs all evaluators in order on the cells of `workset`.
    pub fn evaluate(&mut self, workset: &Workset) -> Result<(), EvaluationError> {
        if self.state != ManagerState::Ready {
            return Err(EvaluationError::NotReady { state: self.state });
        }
        let graph = self
            .graph
            .as_ref()
            .ok_or(EvaluationError::NotReady { state: self.state })?;

        let layout = self.layout_rule.layout_for(workset);
        self.store.rebind_all(&layout, workset.cell_count())?;

        for &i in graph.order() {
            let evaluator = &mut self.evaluators[i];
            trace!("Evaluating \"{}\" on workset {}", evaluator.name(), workset.index());
            let name = graph.name(i);
            let context = EvaluationContext::new(&self.store, workset, &layout, name, &self.writable[i]);
            evaluator
                .evaluate(&context)
                .map_err(|report| EvaluationError::from_evaluator(name, report))?;
        }
        Ok(())
    }

    /// The scalar layout used for `workset`.
    pub fn layout_for(&self, workset: &Workset) -> S::Layout {
        self.layout_rule.layout_for(workset)
    }

    /// Write access to a declared source field for the cells of `workset`.
    ///
    /// The field is rebound to the layout of `workset`, so sources must be filled before
    /// each call to [`evaluate`](Self::evaluate) whenever the layout changes between worksets.
    pub fn source_mut(
        &mut self,
        tag: &FieldTag,
        workset: &Workset,
    ) -> Result<FieldView<&mut FieldContainer<S>>, EvaluationError> {
        if self.state == ManagerState::Uninitialized {
            return Err(EvaluationError::InvalidState {
                expected: ManagerState::Bound,
                actual: self.state,
            });
        }
        let is_source = self
            .graph
            .as_ref()
            .map(|graph| graph.producer_of(tag) == Some(Producer::Source))
            .unwrap_or(false);
        if !is_source {
            return Err(EvaluationError::UndeclaredWrite {
                evaluator: EXTERNAL_WRITER.to_string(),
                tag: tag.clone(),
            });
        }
        let handle = self.store.handle(tag)?;
        let layout = self.layout_rule.layout_for(workset);
        let container = self.store.container_mut(handle);
        container.rebind(layout, workset.cell_count())?;
        container.view_mut(workset)
    }

    /// Read access to any field for the cells of `workset`, e.g. after evaluation.
    pub fn field(&self, tag: &FieldTag, workset: &Workset) -> Result<FieldRef<'_, S>, EvaluationError> {
        let handle = self.store.handle(tag)?;
        let container = self
            .store
            .container(handle)
            .ok_or_else(|| EvaluationError::UnknownField { tag: tag.clone() })?
            .try_borrow()
            .map_err(|_| EvaluationError::FieldInUse { tag: tag.clone() })?;
        FieldView::new(container, workset.cell_count())
    }

    pub fn evaluation_type(&self) -> EvaluationType {
        self.evaluation_type
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    /// Names of the evaluators in evaluation order. Empty before the graph is built.
    pub fn evaluation_order(&self) -> Vec<&str> {
        self.graph
            .as_ref()
            .map(DependencyGraph::ordered_names)
            .unwrap_or_default()
    }

    /// All fields evaluated by the graph, in evaluation order.
    pub fn evaluated_fields(&self) -> Vec<&FieldTag> {
        self.graph
            .as_ref()
            .map(DependencyGraph::evaluated_fields)
            .unwrap_or_default()
    }

    pub fn graph(&self) -> Option<&DependencyGraph> {
        self.graph.as_ref()
    }
}
