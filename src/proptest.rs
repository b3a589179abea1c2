//! Strategies for random evaluator graphs.
use crate::evaluator::EvaluatorDeclaration;
use crate::tag::FieldTag;
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use ::proptest::sample::Index;

/// A set of evaluator declarations together with the source fields they may depend on.
#[derive(Debug, Clone)]
pub struct EvaluatorGraph {
    pub sources: Vec<FieldTag>,
    /// Evaluator `E{k}` evaluates the field `f{k}`.
    pub evaluators: Vec<EvaluatorDeclaration>,
}

pub fn source_field(index: usize) -> FieldTag {
    FieldTag::cell_scalar(format!("s{}", index))
}

pub fn evaluated_field(index: usize) -> FieldTag {
    FieldTag::cell_scalar(format!("f{}", index))
}

fn declaration(k: usize, dependencies: Vec<FieldTag>) -> EvaluatorDeclaration {
    EvaluatorDeclaration::new(format!("E{}", k), dependencies, vec![evaluated_field(k)])
}

/// Acyclic evaluator graphs with unique producers, declared in random order.
///
/// Evaluator `E{k}` depends on a random selection of the sources and of the fields evaluated by
/// `E0, ..., E{k-1}`.
pub fn acyclic_evaluator_graph(max_evaluators: usize, num_sources: usize) -> impl Strategy<Value = EvaluatorGraph> {
    (1..=max_evaluators.max(1))
        .prop_flat_map(|n| vec(vec(any::<Index>(), 0..4), n))
        .prop_map(move |choices| {
            let evaluators = choices
                .into_iter()
                .enumerate()
                .map(|(k, picks)| {
                    let candidates = num_sources + k;
                    let mut dependencies: Vec<FieldTag> = picks
                        .iter()
                        .filter(|_| candidates > 0)
                        .map(|pick| {
                            let c = pick.index(candidates);
                            if c < num_sources {
                                source_field(c)
                            } else {
                                evaluated_field(c - num_sources)
                            }
                        })
                        .collect();
                    dependencies.sort();
                    dependencies.dedup();
                    declaration(k, dependencies)
                })
                .collect::<Vec<_>>();
            evaluators
        })
        .prop_flat_map(move |evaluators| {
            Just(evaluators)
                .prop_shuffle()
                .prop_map(move |evaluators| EvaluatorGraph {
                    sources: (0..num_sources).map(source_field).collect(),
                    evaluators,
                })
        })
}

/// Evaluator graphs that are guaranteed to contain a cycle, declared in random order.
///
/// Every `E{k}` with `k > 0` depends on `f{k-1}`, and one evaluator `E{i}` additionally depends
/// on `f{j}` for some `j >= i`.
pub fn cyclic_evaluator_graph(max_evaluators: usize) -> impl Strategy<Value = EvaluatorGraph> {
    (1..=max_evaluators.max(1))
        .prop_flat_map(|n| (Just(n), 0..n, 0..n))
        .prop_map(|(n, a, b)| {
            let (i, j) = (a.min(b), a.max(b));
            (0..n)
                .map(|k| {
                    let mut dependencies = Vec::new();
                    if k > 0 {
                        dependencies.push(evaluated_field(k - 1));
                    }
                    if k == i {
                        dependencies.push(evaluated_field(j));
                    }
                    declaration(k, dependencies)
                })
                .collect::<Vec<_>>()
        })
        .prop_flat_map(|evaluators| {
            Just(evaluators).prop_shuffle().prop_map(|evaluators| EvaluatorGraph {
                sources: Vec::new(),
                evaluators,
            })
        })
}
