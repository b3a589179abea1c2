use super::line_problem::{
    assemble, evaluate_workset, initial_solution, line_manager, shared_solution, NUM_CELLS, NUM_DOFS,
};
use crate::line_worksets;
use fieldgraph::evaluation_type::EvaluationType;
use fieldgraph::manager::{jacobian_layout, LayoutRule};
use fieldgraph::parallel::ParallelWorksetEvaluator;
use fieldgraph::producers::GlobalAssembly;
use fieldgraph::scalar::Fad;
use fieldgraph::EvaluationError;
use matrixcompare::assert_matrix_eq;
use nalgebra::DMatrix;
use std::sync::Arc;

#[test]
fn parallel_residual_matches_serial() {
    // One cell per workset, so that worksets are spread over several threads
    let worksets = line_worksets(NUM_CELLS, 1);
    let solution = shared_solution(initial_solution());

    let serial = Arc::new(GlobalAssembly::new(NUM_DOFS));
    let mut manager = line_manager::<f64>(
        EvaluationType::Residual,
        LayoutRule::default(),
        solution.clone(),
        serial.clone(),
    )
    .unwrap();
    assemble(&mut manager, &worksets).unwrap();

    let parallel = Arc::new(GlobalAssembly::new(NUM_DOFS));
    let mut evaluator = ParallelWorksetEvaluator::new(|| {
        line_manager::<f64>(
            EvaluationType::Residual,
            LayoutRule::default(),
            solution.clone(),
            parallel.clone(),
        )
    });
    evaluator
        .for_each_workset(&worksets, evaluate_workset)
        .unwrap();

    assert_matrix_eq!(parallel.residual(), serial.residual(), comp = abs, tol = 1e-12);
    let num_managers = evaluator.num_managers();
    assert!(num_managers >= 1 && num_managers <= worksets.len());
}

#[test]
fn parallel_jacobian_matches_serial() {
    let worksets = line_worksets(NUM_CELLS, 2);
    let solution = shared_solution(initial_solution());
    let factory = |assembly: Arc<GlobalAssembly<f64>>| {
        line_manager::<Fad<f64>>(EvaluationType::Jacobian, jacobian_layout(1), solution.clone(), assembly)
    };

    let serial = Arc::new(GlobalAssembly::new(NUM_DOFS));
    let mut manager = factory(serial.clone()).unwrap();
    assemble(&mut manager, &worksets).unwrap();

    let parallel = Arc::new(GlobalAssembly::new(NUM_DOFS));
    let evaluator = ParallelWorksetEvaluator::new(|| factory(parallel.clone()));
    evaluator
        .for_each_workset(&worksets, evaluate_workset)
        .unwrap();

    assert_matrix_eq!(parallel.residual(), serial.residual(), comp = abs, tol = 1e-12);
    assert_matrix_eq!(
        DMatrix::from(&parallel.jacobian()),
        DMatrix::from(&serial.jacobian()),
        comp = abs,
        tol = 1e-12
    );
}

#[test]
fn errors_stop_parallel_evaluation() {
    let worksets = line_worksets(NUM_CELLS, 1);
    let solution = shared_solution(initial_solution());
    let evaluator = ParallelWorksetEvaluator::new(|| {
        line_manager::<f64>(
            EvaluationType::Residual,
            LayoutRule::default(),
            solution.clone(),
            Arc::new(GlobalAssembly::new(NUM_DOFS)),
        )
    });
    // Sources are never filled, but evaluation still succeeds with zero basis values
    assert!(evaluator.evaluate_all(&worksets).is_ok());

    let result = evaluator.for_each_workset(&worksets, |manager, workset| {
        if workset.index() == 3 {
            manager.evaluate(&line_worksets(NUM_CELLS, 5)[0])
        } else {
            evaluate_workset(manager, workset)
        }
    });
    assert!(matches!(
        result,
        Err(EvaluationError::CapacityExceeded { requested: 5, .. })
    ));
}
