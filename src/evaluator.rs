//! The evaluator interface and the context evaluators run in.
use crate::container::{FieldContainer, FieldView, StoragePolicy};
use crate::error::EvaluationError;
use crate::evaluation_type::EvaluationType;
use crate::scalar::Number;
use crate::tag::FieldTag;
use crate::workset::Workset;
use rustc_hash::FxHashMap;
use std::cell::{Ref, RefCell, RefMut};

/// Refers to a field within the storage of a single manager.
///
/// Handles are obtained from [`FieldBinder::resolve`] and are only meaningful for the manager
/// that issued them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldHandle(usize);

/// The fields consumed and produced by an evaluator.
///
/// This is all the graph builder needs to know about an evaluator, independently of the
/// scalar representation it computes with.
pub trait FieldContract {
    fn name(&self) -> &str;

    /// Fields read by the evaluator, in declaration order.
    fn dependencies(&self) -> &[FieldTag];

    /// Fields written by the evaluator, in declaration order.
    fn evaluated_fields(&self) -> &[FieldTag];
}

impl<T: FieldContract + ?Sized> FieldContract for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn dependencies(&self) -> &[FieldTag] {
        (**self).dependencies()
    }

    fn evaluated_fields(&self) -> &[FieldTag] {
        (**self).evaluated_fields()
    }
}

impl<T: FieldContract + ?Sized> FieldContract for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn dependencies(&self) -> &[FieldTag] {
        (**self).dependencies()
    }

    fn evaluated_fields(&self) -> &[FieldTag] {
        (**self).evaluated_fields()
    }
}

/// A plain field contract without any computation attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatorDeclaration {
    pub name: String,
    pub dependencies: Vec<FieldTag>,
    pub evaluated: Vec<FieldTag>,
}

impl EvaluatorDeclaration {
    pub fn new(name: impl Into<String>, dependencies: Vec<FieldTag>, evaluated: Vec<FieldTag>) -> Self {
        Self {
            name: name.into(),
            dependencies,
            evaluated,
        }
    }

    /// The declared contract of any evaluator.
    pub fn of(contract: &dyn FieldContract) -> Self {
        Self::new(
            contract.name(),
            contract.dependencies().to_vec(),
            contract.evaluated_fields().to_vec(),
        )
    }
}

impl FieldContract for EvaluatorDeclaration {
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

/// A unit of computation for a single evaluation type.
///
/// The same physics is typically implemented once, generically over the scalar `S`, and
/// instantiated once per evaluation type.
///
/// An evaluator is bound once, after the graph has been built, and then evaluated once per
/// workset. It must only write the fields it declares in
/// [`evaluated_fields`](FieldContract::evaluated_fields), and only for the cells
/// `0 .. workset.cell_count()`. Evaluators with side effects beyond their fields (scatter
/// evaluators) must document them.
pub trait Evaluator<S: Number>: FieldContract + Send {
    /// Resolves the fields the evaluator reads and writes.
    fn bind(&mut self, fields: &FieldBinder<'_>) -> Result<(), EvaluationError>;

    fn evaluate(&mut self, context: &EvaluationContext<'_, S>) -> eyre::Result<()>;
}

/// Field storage for all fields of a manager.
#[derive(Debug)]
pub(crate) struct FieldStore<S: Number> {
    containers: Vec<RefCell<FieldContainer<S>>>,
    handles: FxHashMap<FieldTag, FieldHandle>,
}

impl<S: Number> Default for FieldStore<S> {
    fn default() -> Self {
        Self {
            containers: Vec::new(),
            handles: FxHashMap::default(),
        }
    }
}

impl<S: Number> FieldStore<S> {
    pub fn allocate<'a>(
        tags: impl IntoIterator<Item = &'a FieldTag>,
        layout: &S::Layout,
        capacity: usize,
        policy: StoragePolicy,
    ) -> Result<Self, EvaluationError> {
        let mut store = Self::default();
        for tag in tags {
            if store.handles.contains_key(tag) {
                continue;
            }
            let container = FieldContainer::allocate(tag.clone(), layout.clone(), capacity, policy)?;
            store
                .handles
                .insert(tag.clone(), FieldHandle(store.containers.len()));
            store.containers.push(RefCell::new(container));
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn handle(&self, tag: &FieldTag) -> Result<FieldHandle, EvaluationError> {
        self.handles
            .get(tag)
            .copied()
            .ok_or_else(|| EvaluationError::UnknownField { tag: tag.clone() })
    }

    pub fn handles(&self) -> &FxHashMap<FieldTag, FieldHandle> {
        &self.handles
    }

    pub fn container(&self, handle: FieldHandle) -> Option<&RefCell<FieldContainer<S>>> {
        self.containers.get(handle.0)
    }

    pub fn container_mut(&mut self, handle: FieldHandle) -> &mut FieldContainer<S> {
        self.containers[handle.0].get_mut()
    }

    pub fn rebind_all(&mut self, layout: &S::Layout, cell_count: usize) -> Result<(), EvaluationError> {
        for container in &mut self.containers {
            container.get_mut().rebind(layout.clone(), cell_count)?;
        }
        Ok(())
    }
}

/// Resolves field tags to handles while evaluators are bound.
#[derive(Debug)]
pub struct FieldBinder<'a> {
    handles: &'a FxHashMap<FieldTag, FieldHandle>,
    evaluation_type: EvaluationType,
}

impl<'a> FieldBinder<'a> {
    pub(crate) fn new(handles: &'a FxHashMap<FieldTag, FieldHandle>, evaluation_type: EvaluationType) -> Self {
        Self {
            handles,
            evaluation_type,
        }
    }

    pub fn resolve(&self, tag: &FieldTag) -> Result<FieldHandle, EvaluationError> {
        self.handles
            .get(tag)
            .copied()
            .ok_or_else(|| EvaluationError::UnknownField { tag: tag.clone() })
    }

    pub fn evaluation_type(&self) -> EvaluationType {
        self.evaluation_type
    }
}

/// Read access to a field during evaluation.
pub type FieldRef<'a, S> = FieldView<Ref<'a, FieldContainer<S>>>;

/// Write access to a field during evaluation.
pub type FieldRefMut<'a, S> = FieldView<RefMut<'a, FieldContainer<S>>>;

/// Everything an evaluator has access to while evaluating a workset.
pub struct EvaluationContext<'a, S: Number> {
    store: &'a FieldStore<S>,
    workset: &'a Workset,
    layout: &'a S::Layout,
    evaluator: &'a str,
    writable: &'a [FieldHandle],
}

impl<'a, S: Number> EvaluationContext<'a, S> {
    pub(crate) fn new(
        store: &'a FieldStore<S>,
        workset: &'a Workset,
        layout: &'a S::Layout,
        evaluator: &'a str,
        writable: &'a [FieldHandle],
    ) -> Self {
        Self {
            store,
            workset,
            layout,
            evaluator,
            writable,
        }
    }

    pub fn workset(&self) -> &Workset {
        self.workset
    }

    /// The storage layout of the scalars in this workset, e.g. the local derivative length.
    pub fn layout(&self) -> &S::Layout {
        self.layout
    }

    pub fn field(&self, handle: FieldHandle) -> Result<FieldRef<'_, S>, EvaluationError> {
        let container = self
            .container(handle)?
            .try_borrow()
            .map_err(|_| EvaluationError::FieldInUse {
                tag: self.tag_of(handle),
            })?;
        FieldView::new(container, self.workset.cell_count())
    }

    /// Write access to a field the current evaluator declares as evaluated.
    pub fn field_mut(&self, handle: FieldHandle) -> Result<FieldRefMut<'_, S>, EvaluationError> {
        let cell = self.container(handle)?;
        if !self.writable.contains(&handle) {
            return Err(EvaluationError::UndeclaredWrite {
                evaluator: self.evaluator.to_string(),
                tag: self.tag_of(handle),
            });
        }
        let container = cell.try_borrow_mut().map_err(|_| EvaluationError::FieldInUse {
            tag: self.tag_of(handle),
        })?;
        FieldView::new(container, self.workset.cell_count())
    }

    fn container(&self, handle: FieldHandle) -> Result<&'a RefCell<FieldContainer<S>>, EvaluationError> {
        self.store
            .container(handle)
            .ok_or_else(|| EvaluationError::UnknownField {
                tag: self.tag_of(handle),
            })
    }

    fn tag_of(&self, handle: FieldHandle) -> FieldTag {
        self.store
            .handles
            .iter()
            .find(|(_, &h)| h == handle)
            .map(|(tag, _)| tag.clone())
            .unwrap_or_else(|| FieldTag::cell_scalar(format!("<field {}>", handle.0)))
    }
}
