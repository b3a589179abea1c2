//! Identity of named, shaped quantities.
use crate::error::EvaluationError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

/// A single axis in the shape of a field.
///
/// The [`Cell`](Dimension::Cell) axis has no fixed extent: its extent is the cell count of the
/// workset being evaluated. All other axes have a fixed, positive extent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dimension {
    Cell,
    Node(usize),
    QuadPoint(usize),
    Dim(usize),
    Component(usize),
    Named(String, usize),
}

impl Dimension {
    /// The fixed extent of the axis, or `None` for the cell axis.
    pub fn extent(&self) -> Option<usize> {
        match self {
            Self::Cell => None,
            Self::Node(n) | Self::QuadPoint(n) | Self::Dim(n) | Self::Component(n) | Self::Named(_, n) => Some(*n),
        }
    }

    pub fn is_cell(&self) -> bool {
        matches!(self, Self::Cell)
    }
}

impl Display for Dimension {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cell => write!(f, "Cell"),
            Self::Node(n) => write!(f, "Node({})", n),
            Self::QuadPoint(n) => write!(f, "QuadPoint({})", n),
            Self::Dim(n) => write!(f, "Dim({})", n),
            Self::Component(n) => write!(f, "Component({})", n),
            Self::Named(label, n) => write!(f, "{}({})", label, n),
        }
    }
}

/// The identity of a field: a name together with a shape.
///
/// Two tags are equal if and only if both name and shape agree, so `u<Cell,Node(4)>` and
/// `u<Cell,QuadPoint(4)>` are different fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldTag {
    name: String,
    shape: Vec<Dimension>,
}

impl FieldTag {
    /// Creates a new tag.
    ///
    /// The shape must be non-empty, must not contain zero extents and may contain the cell
    /// axis at most once, in the leading position.
    pub fn new(name: impl Into<String>, shape: impl Into<Vec<Dimension>>) -> Result<Self, EvaluationError> {
        let name = name.into();
        let shape = shape.into();
        let invalid = |reason: &str| EvaluationError::InvalidShape {
            name: name.clone(),
            reason: reason.to_string(),
        };

        if shape.is_empty() {
            return Err(invalid("shape is empty"));
        }
        if shape.iter().any(|dim| dim.extent() == Some(0)) {
            return Err(invalid("shape contains a zero extent"));
        }
        if shape.iter().skip(1).any(Dimension::is_cell) {
            return Err(invalid("the cell axis may only appear once, as the leading axis"));
        }

        Ok(Self { name, shape })
    }

    /// A single value per cell.
    pub fn cell_scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: vec![Dimension::Cell],
        }
    }

    pub fn node_scalar(name: impl Into<String>, num_nodes: usize) -> Result<Self, EvaluationError> {
        Self::new(name, [Dimension::Cell, Dimension::Node(num_nodes)])
    }

    pub fn qp_scalar(name: impl Into<String>, num_points: usize) -> Result<Self, EvaluationError> {
        Self::new(name, [Dimension::Cell, Dimension::QuadPoint(num_points)])
    }

    pub fn node_vector(
        name: impl Into<String>,
        num_nodes: usize,
        num_components: usize,
    ) -> Result<Self, EvaluationError> {
        Self::new(
            name,
            [Dimension::Cell, Dimension::Node(num_nodes), Dimension::Component(num_components)],
        )
    }

    pub fn qp_vector(
        name: impl Into<String>,
        num_points: usize,
        num_components: usize,
    ) -> Result<Self, EvaluationError> {
        Self::new(
            name,
            [
                Dimension::Cell,
                Dimension::QuadPoint(num_points),
                Dimension::Component(num_components),
            ],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[Dimension] {
        &self.shape
    }

    /// Whether the leading axis of the field is the cell axis.
    pub fn is_cell_field(&self) -> bool {
        self.shape.first().map(Dimension::is_cell).unwrap_or(false)
    }

    /// Extents of all axes except the cell axis.
    pub fn cell_extents(&self) -> Vec<usize> {
        self.shape.iter().filter_map(Dimension::extent).collect()
    }

    /// Number of entries stored per cell (or in total, for fields without a cell axis).
    pub fn entries_per_cell(&self) -> usize {
        self.shape.iter().filter_map(Dimension::extent).product()
    }

    /// Number of indices needed to address a single entry, including the cell index.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

impl Display for FieldTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.name, self.shape.iter().join(","))
    }
}
