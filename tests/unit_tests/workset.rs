use super::line_problem::{evaluate_workset, initial_solution, line_manager, shared_solution, NUM_DOFS};
use fieldgraph::evaluation_type::EvaluationType;
use fieldgraph::manager::jacobian_layout;
use fieldgraph::producers::GlobalAssembly;
use fieldgraph::scalar::Fad;
use fieldgraph::workset::{CellSelection, ElementDofs, ElementTopology, Workset};
use nalgebra::DVector;
use std::sync::Arc;
use util::assert_panics_with;

#[test]
fn dof_map_interleaves_equations_per_node() {
    let dofs = ElementDofs::from_connectivity(3, &[vec![0, 1, 2], vec![2, 3, 4]], 2);
    assert_eq!(dofs.num_cells(), 2);
    assert_eq!(dofs.unknowns_per_cell(), 6);
    assert_eq!(dofs.cell_dofs(1), &[4, 5, 6, 7, 8, 9]);
    assert_eq!(dofs.dof(1, 2, 1), 9);
    assert_eq!(dofs.dof(0, 1, 0), 2);
}

#[test]
fn empty_connectivity_gives_empty_dof_map() {
    let dofs = ElementDofs::from_connectivity(4, &[], 1);
    assert_eq!(dofs.num_cells(), 0);
    assert_eq!(dofs.nodes_per_cell(), 4);

    let workset = Workset::new(0, 0..0, ElementTopology::quad4()).with_element_dofs(dofs);
    assert_eq!(workset.cell_count(), 0);
    assert!(workset.cells().is_empty());
}

#[test]
fn cells_with_wrong_node_count_are_rejected() {
    assert_panics_with!(
        ElementDofs::from_connectivity(2, &[vec![0, 1], vec![1, 2, 3]], 1),
        "All cells must have 2 nodes"
    );
    let two_node_dofs = ElementDofs::from_connectivity(2, &[vec![0, 1]], 1);
    assert_panics_with!(
        Workset::new(0, 0..1, ElementTopology::tri3()).with_element_dofs(two_node_dofs.clone()),
        "DOF map must have one entry per topology node"
    );
}

#[test]
fn cell_selection_maps_local_to_global_cells() {
    let range = CellSelection::from(4..7);
    assert_eq!(range.global(0), Some(4));
    assert_eq!(range.global(2), Some(6));
    assert_eq!(range.global(3), None);

    let list = CellSelection::from(vec![9, 2, 5]);
    assert_eq!(list.len(), 3);
    assert_eq!(list.global(1), Some(2));
    assert_eq!(list.global(3), None);
}

#[test]
fn zero_cell_workset_contributes_nothing() {
    let assembly = Arc::new(GlobalAssembly::new(NUM_DOFS));
    let mut manager = line_manager::<Fad<f64>>(
        EvaluationType::Jacobian,
        jacobian_layout(1),
        shared_solution(initial_solution()),
        assembly.clone(),
    )
    .unwrap();

    let no_cells = ElementDofs::from_connectivity(2, &[], 1);
    let empty = Workset::new(0, 0..0, ElementTopology::line2()).with_element_dofs(no_cells);
    evaluate_workset(&mut manager, &empty).unwrap();

    assert_eq!(assembly.residual(), DVector::zeros(NUM_DOFS));
    assert_eq!(assembly.jacobian().nnz(), 0);
}
