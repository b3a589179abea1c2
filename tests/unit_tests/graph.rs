use fieldgraph::evaluator::{EvaluatorDeclaration, FieldContract};
use fieldgraph::graph::{DependencyGraph, Producer};
use fieldgraph::proptest::{acyclic_evaluator_graph, cyclic_evaluator_graph, evaluated_field};
use fieldgraph::tag::FieldTag;
use fieldgraph::EvaluationError;
use proptest::prelude::*;

fn tag(name: &str) -> FieldTag {
    FieldTag::cell_scalar(name)
}

fn declare(name: &str, dependencies: &[&str], evaluated: &[&str]) -> EvaluatorDeclaration {
    EvaluatorDeclaration::new(
        name,
        dependencies.iter().map(|n| tag(n)).collect(),
        evaluated.iter().map(|n| tag(n)).collect(),
    )
}

fn abc() -> Vec<EvaluatorDeclaration> {
    vec![
        declare("A", &["S"], &["X"]),
        declare("B", &["X"], &["Y"]),
        declare("C", &["X", "Y"], &["Z"]),
    ]
}

/// Checks that every evaluator in the order runs after the producers of its dependencies.
fn assert_order_respects_dependencies(evaluators: &[EvaluatorDeclaration], graph: &DependencyGraph) {
    let position = |i: usize| graph.order().iter().position(|&j| j == i);
    for &consumer in graph.order() {
        for dependency in evaluators[consumer].dependencies() {
            if let Some(Producer::Evaluator(producer)) = graph.producer_of(dependency) {
                let p = position(producer).expect("Producers of evaluated evaluators are evaluated");
                assert!(p < position(consumer).unwrap());
            }
        }
    }
}

#[test]
fn producers_run_before_consumers() {
    let graph = DependencyGraph::build(&abc(), &[tag("S")], &[]).unwrap();
    assert_eq!(graph.ordered_names(), vec!["A", "B", "C"]);

    let mut reversed = abc();
    reversed.reverse();
    let graph = DependencyGraph::build(&reversed, &[tag("S")], &[]).unwrap();
    assert_eq!(graph.ordered_names(), vec!["A", "B", "C"]);
    assert_eq!(graph.order(), &[2, 1, 0]);
}

#[test]
fn independent_evaluators_run_in_declaration_order() {
    let evaluators = vec![
        declare("P", &["S"], &["p"]),
        declare("Q", &["S"], &["q"]),
        declare("R", &["p", "q"], &["r"]),
        declare("O", &[], &["o"]),
    ];
    let graph = DependencyGraph::build(&evaluators, &[tag("S")], &[]).unwrap();
    assert_eq!(graph.ordered_names(), vec!["P", "Q", "R", "O"]);
}

#[test]
fn introspection() {
    let graph = DependencyGraph::build(&abc(), &[tag("S")], &[]).unwrap();
    assert_eq!(graph.num_evaluators(), 3);
    assert_eq!(graph.producer_of(&tag("S")), Some(Producer::Source));
    assert_eq!(graph.producer_of(&tag("Y")), Some(Producer::Evaluator(1)));
    assert_eq!(graph.producer_of(&tag("W")), None);
    assert_eq!(graph.consumers_of(0), &[1, 2]);
    assert_eq!(graph.consumers_of(1), &[2]);
    assert!(graph.consumers_of(2).is_empty());
    assert_eq!(graph.evaluated_fields(), vec![&tag("X"), &tag("Y"), &tag("Z")]);
    assert_eq!(graph.fields(), vec![&tag("S"), &tag("X"), &tag("Y"), &tag("Z")]);
}

#[test]
fn duplicate_producers_are_rejected() {
    let mut evaluators = abc();
    evaluators.push(declare("D", &["S"], &["Y"]));
    let error = DependencyGraph::build(&evaluators, &[tag("S")], &[]).unwrap_err();
    insta::assert_snapshot!(error, @r###"Field Y<Cell> is produced by both "B" and "D""###);

    // Sources count as producers
    let error = DependencyGraph::build(&abc(), &[tag("S"), tag("X")], &[]).unwrap_err();
    match error {
        EvaluationError::DuplicateProducer { tag: t, first, second } => {
            assert_eq!(t, tag("X"));
            assert_eq!(first, "<source>");
            assert_eq!(second, "A");
        }
        other => panic!("Unexpected error: {}", other),
    }
}

#[test]
fn missing_producers_are_rejected() {
    let error = DependencyGraph::build(&abc(), &[], &[]).unwrap_err();
    insta::assert_snapshot!(
        error,
        @r###"Field S<Cell> consumed by "A" has no producer and is not a declared source"###
    );
}

#[test]
fn cycles_are_reported_with_their_path() {
    let evaluators = vec![
        declare("A", &["Y"], &["X"]),
        declare("B", &["X"], &["Y"]),
        declare("C", &["X"], &["Z"]),
    ];
    let error = DependencyGraph::build(&evaluators, &[], &[]).unwrap_err();
    insta::assert_snapshot!(error, @"Cyclic dependency between evaluators: A -> B -> A");

    let evaluators = vec![declare("Loop", &["X"], &["X"])];
    match DependencyGraph::build(&evaluators, &[], &[]).unwrap_err() {
        EvaluationError::CyclicDependency { cycle } => assert_eq!(cycle, vec!["Loop", "Loop"]),
        other => panic!("Unexpected error: {}", other),
    }
}

#[test]
fn required_fields_prune_unrelated_evaluators() {
    let mut evaluators = abc();
    evaluators.push(declare("Unrelated", &["S"], &["W"]));

    let graph = DependencyGraph::build(&evaluators, &[tag("S")], &[tag("Y")]).unwrap();
    assert_eq!(graph.ordered_names(), vec!["A", "B"]);
    assert_eq!(graph.fields(), vec![&tag("S"), &tag("X"), &tag("Y")]);

    let graph = DependencyGraph::build(&evaluators, &[tag("S")], &[tag("Z"), tag("W")]).unwrap();
    assert_eq!(graph.ordered_names(), vec!["A", "B", "C", "Unrelated"]);

    let graph = DependencyGraph::build(&evaluators, &[tag("S")], &[tag("S")]).unwrap();
    assert!(graph.order().is_empty());

    let error = DependencyGraph::build(&evaluators, &[tag("S")], &[tag("V")]).unwrap_err();
    insta::assert_snapshot!(
        error,
        @r###"Field V<Cell> consumed by "<required>" has no producer and is not a declared source"###
    );
}

#[test]
fn pruned_evaluators_are_still_validated() {
    let mut evaluators = abc();
    evaluators.push(declare("Broken", &["Missing"], &["W"]));
    let error = DependencyGraph::build(&evaluators, &[tag("S")], &[tag("Z")]).unwrap_err();
    assert!(matches!(error, EvaluationError::MissingProducer { .. }));
}

#[test]
fn dot_output() {
    let graph = DependencyGraph::build(&abc(), &[tag("S")], &[]).unwrap();
    insta::assert_snapshot!(graph.to_dot(), @r###"
    digraph fieldgraph {
        s0 [label="S<Cell>", shape=box];
        e0 [label="A"];
        e1 [label="B"];
        e2 [label="C"];
        s0 -> e0 [label="S<Cell>"];
        e0 -> e1 [label="X<Cell>"];
        e0 -> e2 [label="X<Cell>"];
        e1 -> e2 [label="Y<Cell>"];
    }
    "###);
}

proptest! {
    #[test]
    fn acyclic_graphs_are_ordered_topologically(graph in acyclic_evaluator_graph(12, 2)) {
        let built = DependencyGraph::build(&graph.evaluators, &graph.sources, &[]).unwrap();
        prop_assert_eq!(built.order().len(), graph.evaluators.len());
        assert_order_respects_dependencies(&graph.evaluators, &built);
    }

    #[test]
    fn pruned_graphs_are_ordered_topologically(graph in acyclic_evaluator_graph(12, 2)) {
        let required = vec![evaluated_field(0)];
        let built = DependencyGraph::build(&graph.evaluators, &graph.sources, &required).unwrap();
        prop_assert!(!built.order().is_empty());
        assert_order_respects_dependencies(&graph.evaluators, &built);
    }

    #[test]
    fn cycles_are_detected(graph in cyclic_evaluator_graph(8)) {
        let error = DependencyGraph::build(&graph.evaluators, &graph.sources, &[]).unwrap_err();
        let cycle = match error {
            EvaluationError::CyclicDependency { cycle } => cycle,
            other => panic!("Unexpected error: {}", other),
        };
        prop_assert!(cycle.len() >= 2);
        prop_assert_eq!(cycle.first(), cycle.last());

        let by_name = |name: &str| {
            graph.evaluators.iter().find(|e| e.name() == name).expect("Cycle names declared evaluators")
        };
        for pair in cycle.windows(2) {
            let (producer, consumer) = (by_name(&pair[0]), by_name(&pair[1]));
            let connected = consumer
                .dependencies()
                .iter()
                .any(|dependency| producer.evaluated_fields().contains(dependency));
            prop_assert!(connected, "{} does not depend on {}", pair[1], pair[0]);
        }
    }

    #[test]
    fn duplicate_producers_are_detected(graph in acyclic_evaluator_graph(12, 1), pick in any::<prop::sample::Index>()) {
        let mut evaluators = graph.evaluators.clone();
        let duplicated = pick.get(&graph.evaluators).evaluated_fields()[0].clone();
        evaluators.push(EvaluatorDeclaration::new("Duplicate", vec![], vec![duplicated]));
        let error = DependencyGraph::build(&evaluators, &graph.sources, &[]).unwrap_err();
        let is_duplicate = matches!(error, EvaluationError::DuplicateProducer { .. });
        prop_assert!(is_duplicate);
    }
}
