//! Batches of cells evaluated together.
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

/// Identifies the element type of all cells in a workset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementTopology {
    name: String,
    num_nodes: usize,
}

impl ElementTopology {
    pub fn new(name: impl Into<String>, num_nodes: usize) -> Self {
        Self {
            name: name.into(),
            num_nodes,
        }
    }

    pub fn line2() -> Self {
        Self::new("Line2", 2)
    }

    pub fn line3() -> Self {
        Self::new("Line3", 3)
    }

    pub fn tri3() -> Self {
        Self::new("Tri3", 3)
    }

    pub fn quad4() -> Self {
        Self::new("Quad4", 4)
    }

    pub fn tet4() -> Self {
        Self::new("Tet4", 4)
    }

    pub fn hex8() -> Self {
        Self::new("Hex8", 8)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }
}

/// The global cells covered by a workset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellSelection {
    Range(Range<usize>),
    List(Vec<usize>),
}

impl CellSelection {
    pub fn len(&self) -> usize {
        match self {
            Self::Range(range) => range.len(),
            Self::List(cells) => cells.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The global index of the workset-local cell `local`.
    pub fn global(&self, local: usize) -> Option<usize> {
        match self {
            Self::Range(range) => (local < range.len()).then(|| range.start + local),
            Self::List(cells) => cells.get(local).copied(),
        }
    }
}

impl From<Range<usize>> for CellSelection {
    fn from(range: Range<usize>) -> Self {
        Self::Range(range)
    }
}

impl From<Vec<usize>> for CellSelection {
    fn from(cells: Vec<usize>) -> Self {
        Self::List(cells)
    }
}

/// Local-to-global degree of freedom map for the cells of a workset.
///
/// Entry `(cell, node, equation)` holds the global index of that local unknown. The local
/// unknowns of a cell are numbered `node * equations_per_node + equation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDofs {
    nodes_per_cell: usize,
    equations_per_node: usize,
    dofs: Vec<usize>,
}

impl ElementDofs {
    /// # Panics
    ///
    /// Panics if the length of `dofs` is not a multiple of `nodes_per_cell * equations_per_node`.
    pub fn new(nodes_per_cell: usize, equations_per_node: usize, dofs: Vec<usize>) -> Self {
        let per_cell = nodes_per_cell * equations_per_node;
        assert!(per_cell > 0, "Cells must have at least one local unknown");
        assert_eq!(
            dofs.len() % per_cell,
            0,
            "Number of DOF indices must be a multiple of the number of unknowns per cell"
        );
        Self {
            nodes_per_cell,
            equations_per_node,
            dofs,
        }
    }

    /// Builds the map for cells given by their global node indices, with `equations_per_node`
    /// interleaved unknowns per node.
    ///
    /// # Panics
    ///
    /// Panics if a cell does not have exactly `nodes_per_cell` nodes.
    pub fn from_connectivity(nodes_per_cell: usize, connectivity: &[Vec<usize>], equations_per_node: usize) -> Self {
        let dofs = connectivity
            .iter()
            .flat_map(|cell| {
                assert_eq!(cell.len(), nodes_per_cell, "All cells must have {} nodes", nodes_per_cell);
                cell.iter()
                    .flat_map(move |&node| (0..equations_per_node).map(move |eq| equations_per_node * node + eq))
            })
            .collect();
        Self::new(nodes_per_cell, equations_per_node, dofs)
    }

    pub fn nodes_per_cell(&self) -> usize {
        self.nodes_per_cell
    }

    pub fn equations_per_node(&self) -> usize {
        self.equations_per_node
    }

    pub fn unknowns_per_cell(&self) -> usize {
        self.nodes_per_cell * self.equations_per_node
    }

    pub fn num_cells(&self) -> usize {
        self.dofs.len() / self.unknowns_per_cell()
    }

    /// Global indices of the local unknowns of `cell`.
    pub fn cell_dofs(&self, cell: usize) -> &[usize] {
        let n = self.unknowns_per_cell();
        &self.dofs[n * cell..n * (cell + 1)]
    }

    pub fn dof(&self, cell: usize, node: usize, equation: usize) -> usize {
        self.cell_dofs(cell)[node * self.equations_per_node + equation]
    }
}

/// A batch of cells of the same topology, processed by one call to
/// [`EvaluationManager::evaluate`](crate::manager::EvaluationManager::evaluate).
#[derive(Debug, Clone)]
pub struct Workset {
    index: usize,
    cells: CellSelection,
    topology: ElementTopology,
    time: f64,
    step: usize,
    element_dofs: Option<Arc<ElementDofs>>,
}

impl Workset {
    pub fn new(index: usize, cells: impl Into<CellSelection>, topology: ElementTopology) -> Self {
        Self {
            index,
            cells: cells.into(),
            topology,
            time: 0.0,
            step: 0,
            element_dofs: None,
        }
    }

    pub fn with_time(self, time: f64) -> Self {
        Self { time, ..self }
    }

    pub fn with_step(self, step: usize) -> Self {
        Self { step, ..self }
    }

    /// Attaches the local-to-global DOF map of the cells in this workset.
    ///
    /// # Panics
    ///
    /// Panics if the map does not cover exactly the cells of the workset, or if its node count
    /// disagrees with the topology.
    pub fn with_element_dofs(self, element_dofs: impl Into<Arc<ElementDofs>>) -> Self {
        let element_dofs = element_dofs.into();
        assert_eq!(element_dofs.num_cells(), self.cell_count(), "DOF map must cover every cell of the workset");
        assert_eq!(
            element_dofs.nodes_per_cell(),
            self.topology.num_nodes(),
            "DOF map must have one entry per topology node"
        );
        Self {
            element_dofs: Some(element_dofs),
            ..self
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn cells(&self) -> &CellSelection {
        &self.cells
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn topology(&self) -> &ElementTopology {
        &self.topology
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn element_dofs(&self) -> Option<&ElementDofs> {
        self.element_dofs.as_deref()
    }
}
