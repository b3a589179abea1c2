//! Flat storage for the values of one field.
use crate::error::EvaluationError;
use crate::scalar::Number;
use crate::tag::{Dimension, FieldTag};
use crate::workset::Workset;
use log::debug;
use num::Zero;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

/// How a container provides slots when the per-entry footprint of the representation changes
/// between worksets (e.g. Jacobians of cells with different numbers of nodes).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoragePolicy {
    /// Reserve `footprint` slots per entry up front. A workset that needs more slots is
    /// rejected with [`EvaluationError::CapacityExceeded`].
    Preallocate { footprint: usize },
    /// Grow the storage in place whenever a workset needs more slots per entry.
    GrowInPlace,
}

impl Default for StoragePolicy {
    fn default() -> Self {
        Self::GrowInPlace
    }
}

impl StoragePolicy {
    /// Preallocates enough slots for values with the given layout.
    pub fn preallocate_for<S: Number>(layout: &S::Layout) -> Self {
        Self::Preallocate {
            footprint: S::footprint(layout),
        }
    }
}

/// Storage for the values of a single field under the representation `S`.
///
/// Values are kept as flat slots of `S::Real`: `capacity × entries_per_cell × footprint`,
/// where the footprint is the number of slots a value occupies under the current layout.
/// Fields without a cell axis store a single block of entries regardless of capacity.
///
/// The container is allocated once and rebound to a new layout and cell count for every
/// workset. Storage never shrinks. Whenever the footprint changes, all slots are reset to zero,
/// so that no derivative data of a previous workset can be observed. Rebinding to a layout
/// with the same footprint keeps the stored values.
#[derive(Debug)]
pub struct FieldContainer<S: Number> {
    tag: FieldTag,
    layout: S::Layout,
    footprint: usize,
    slots_per_entry: usize,
    policy: StoragePolicy,
    capacity: usize,
    data: Vec<S::Real>,
}

impl<S: Number> FieldContainer<S> {
    pub fn allocate(
        tag: FieldTag,
        layout: S::Layout,
        capacity: usize,
        policy: StoragePolicy,
    ) -> Result<Self, EvaluationError> {
        let footprint = S::footprint(&layout);
        let slots_per_entry = match policy {
            StoragePolicy::Preallocate { footprint: reserved } if footprint > reserved => {
                return Err(EvaluationError::CapacityExceeded {
                    tag,
                    unit: "slots per entry",
                    requested: footprint,
                    capacity: reserved,
                })
            }
            StoragePolicy::Preallocate { footprint: reserved } => reserved,
            StoragePolicy::GrowInPlace => footprint,
        };
        let blocks = if tag.is_cell_field() { capacity } else { 1 };
        let data = vec![S::Real::zero(); blocks * tag.entries_per_cell() * slots_per_entry];
        debug!(
            "Allocated field {} with capacity for {} cells and {} slots per entry",
            tag, capacity, slots_per_entry
        );
        Ok(Self {
            tag,
            layout,
            footprint,
            slots_per_entry,
            policy,
            capacity,
            data,
        })
    }

    pub fn tag(&self) -> &FieldTag {
        &self.tag
    }

    pub fn layout(&self) -> &S::Layout {
        &self.layout
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> StoragePolicy {
        self.policy
    }

    /// Number of slots currently occupied by a single value.
    pub fn footprint(&self) -> usize {
        self.footprint
    }

    /// Number of slots reserved for a single value.
    pub fn slots_per_entry(&self) -> usize {
        self.slots_per_entry
    }

    fn blocks(&self) -> usize {
        if self.tag.is_cell_field() {
            self.capacity
        } else {
            1
        }
    }

    fn check_cell_count(&self, cell_count: usize) -> Result<(), EvaluationError> {
        if self.tag.is_cell_field() && cell_count > self.capacity {
            Err(EvaluationError::CapacityExceeded {
                tag: self.tag.clone(),
                unit: "cells",
                requested: cell_count,
                capacity: self.capacity,
            })
        } else {
            Ok(())
        }
    }

    /// Prepares the container for a workset with `cell_count` cells and the given layout.
    pub fn rebind(&mut self, layout: S::Layout, cell_count: usize) -> Result<(), EvaluationError> {
        self.check_cell_count(cell_count)?;

        let footprint = S::footprint(&layout);
        if footprint != self.footprint {
            if footprint > self.slots_per_entry {
                match self.policy {
                    StoragePolicy::Preallocate { .. } => {
                        return Err(EvaluationError::CapacityExceeded {
                            tag: self.tag.clone(),
                            unit: "slots per entry",
                            requested: footprint,
                            capacity: self.slots_per_entry,
                        });
                    }
                    StoragePolicy::GrowInPlace => {
                        debug!(
                            "Growing field {} from {} to {} slots per entry",
                            self.tag, self.slots_per_entry, footprint
                        );
                        self.slots_per_entry = footprint;
                        let len = self.blocks() * self.tag.entries_per_cell() * footprint;
                        self.data.resize(len, S::Real::zero());
                    }
                }
            }
            self.data.fill(S::Real::zero());
            self.footprint = footprint;
        }
        self.layout = layout;
        Ok(())
    }

    /// Read access to the entries of the cells in `workset`.
    pub fn view(&self, workset: &Workset) -> Result<FieldView<&Self>, EvaluationError> {
        FieldView::new(self, workset.cell_count())
    }

    /// Write access to the entries of the cells in `workset`.
    pub fn view_mut(&mut self, workset: &Workset) -> Result<FieldView<&mut Self>, EvaluationError> {
        FieldView::new(self, workset.cell_count())
    }

    /// The row-major entry index of `index` for a view of `cell_count` cells.
    fn entry_index(&self, index: &[usize], cell_count: usize) -> Result<usize, EvaluationError> {
        let extents = self.extents(cell_count);
        let out_of_range = || EvaluationError::IndexOutOfRange {
            tag: self.tag.clone(),
            index: index.to_vec(),
            extents: extents.clone(),
        };
        if index.len() != extents.len() {
            return Err(out_of_range());
        }
        let mut entry = 0;
        for (&i, &extent) in index.iter().zip(&extents) {
            if i >= extent {
                return Err(out_of_range());
            }
            entry = entry * extent + i;
        }
        Ok(entry)
    }

    fn extents(&self, cell_count: usize) -> Vec<usize> {
        self.tag
            .shape()
            .iter()
            .map(|dim| match dim {
                Dimension::Cell => cell_count,
                _ => dim.extent().unwrap_or(0),
            })
            .collect()
    }

    fn slots(&self, entry: usize) -> &[S::Real] {
        let start = entry * self.footprint;
        &self.data[start..start + self.footprint]
    }
}

/// Bounded access to the entries of a [`FieldContainer`] for the cells of one workset.
///
/// `C` is any (mutable) reference to the container: plain references for direct access, or
/// `Ref`/`RefMut` when the container is borrowed from an evaluation context. Indices address
/// the full shape of the field, including the cell index for cell fields. Entries may also
/// be addressed by their flat (row-major) entry index in `0 .. len()`.
#[derive(Debug)]
pub struct FieldView<C> {
    container: C,
    cell_count: usize,
}

impl<S, C> FieldView<C>
where
    S: Number,
    C: Deref<Target = FieldContainer<S>>,
{
    pub(crate) fn new(container: C, cell_count: usize) -> Result<Self, EvaluationError> {
        container.check_cell_count(cell_count)?;
        let cell_count = if container.tag.is_cell_field() { cell_count } else { 1 };
        Ok(Self { container, cell_count })
    }

    pub fn tag(&self) -> &FieldTag {
        &self.container.tag
    }

    pub fn layout(&self) -> &S::Layout {
        &self.container.layout
    }

    /// Number of cells in the view (one for fields without a cell axis).
    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    /// The extents of every axis of the view, including the cell axis.
    pub fn extents(&self) -> Vec<usize> {
        self.container.extents(self.cell_count)
    }

    pub fn entries_per_cell(&self) -> usize {
        self.container.tag.entries_per_cell()
    }

    /// Total number of entries in the view.
    pub fn len(&self) -> usize {
        self.cell_count * self.entries_per_cell()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_entry(&self, entry: usize) -> Result<(), EvaluationError> {
        if entry < self.len() {
            Ok(())
        } else {
            Err(EvaluationError::IndexOutOfRange {
                tag: self.container.tag.clone(),
                index: vec![entry],
                extents: vec![self.len()],
            })
        }
    }

    pub fn get(&self, index: &[usize]) -> Result<S, EvaluationError> {
        let entry = self.container.entry_index(index, self.cell_count)?;
        Ok(S::load(&self.container.layout, self.container.slots(entry)))
    }

    pub fn get_entry(&self, entry: usize) -> Result<S, EvaluationError> {
        self.check_entry(entry)?;
        Ok(S::load(&self.container.layout, self.container.slots(entry)))
    }

    /// Iterates over all entries of the view in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = S> + '_ {
        let container: &FieldContainer<S> = &self.container;
        (0..self.len()).map(move |entry| S::load(&container.layout, container.slots(entry)))
    }

    /// The primal values of all entries, in row-major order.
    pub fn values(&self) -> Vec<S::Real> {
        self.iter().map(|value| value.value()).collect()
    }
}

impl<S, C> FieldView<C>
where
    S: Number,
    C: DerefMut<Target = FieldContainer<S>>,
{
    fn store(&mut self, entry: usize, value: &S) -> Result<(), EvaluationError> {
        let container = &mut *self.container;
        let start = entry * container.footprint;
        let slots = &mut container.data[start..start + container.footprint];
        value
            .store(&container.layout, slots)
            .map_err(|source| EvaluationError::InconsistentDerivativeLength {
                tag: container.tag.clone(),
                source,
            })
    }

    pub fn set(&mut self, index: &[usize], value: S) -> Result<(), EvaluationError> {
        let entry = self.container.entry_index(index, self.cell_count)?;
        self.store(entry, &value)
    }

    pub fn set_entry(&mut self, entry: usize, value: S) -> Result<(), EvaluationError> {
        self.check_entry(entry)?;
        self.store(entry, &value)
    }

    /// Sets every entry of the view to `value`.
    pub fn fill(&mut self, value: S) -> Result<(), EvaluationError> {
        for entry in 0..self.len() {
            self.store(entry, &value)?;
        }
        Ok(())
    }

    /// Sets the entries of the view from plain values, in row-major order.
    ///
    /// The values become constants of the representation.
    pub fn assign_values(&mut self, values: &[S::Real]) -> Result<(), EvaluationError> {
        if values.len() != self.len() {
            return Err(EvaluationError::IndexOutOfRange {
                tag: self.container.tag.clone(),
                index: vec![values.len()],
                extents: vec![self.len()],
            });
        }
        for (entry, &value) in values.iter().enumerate() {
            self.store(entry, &S::constant(value))?;
        }
        Ok(())
    }
}
