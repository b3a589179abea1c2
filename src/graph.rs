//! Validation and ordering of evaluators by their field dependencies.
use crate::error::{EvaluationError, REQUIRED_CONSUMER};
use crate::evaluator::FieldContract;
use crate::tag::FieldTag;
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Who produces a field.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Producer {
    /// The field is supplied from outside the graph.
    Source,
    /// The field is produced by the evaluator with the given declaration index.
    Evaluator(usize),
}

/// A validated, ordered evaluation plan.
///
/// Nodes are evaluators, identified by their declaration index. There is an edge from a
/// producer to a consumer for every field the consumer depends on.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    dependencies: Vec<Vec<FieldTag>>,
    evaluated: Vec<Vec<FieldTag>>,
    sources: Vec<FieldTag>,
    producers: FxHashMap<FieldTag, Producer>,
    // Consumers of each evaluator, sorted and without duplicates
    consumers: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl DependencyGraph {
    /// Validates the evaluators and computes an evaluation order.
    ///
    /// Every field consumed by an evaluator must be produced by exactly one evaluator or be one
    /// of the declared `sources`, and the evaluators must not depend on each other cyclically.
    /// Evaluators that are not ordered relative to each other run in declaration order.
    ///
    /// If `required` is non-empty, only evaluators that contribute to the required fields are
    /// included in the order. All evaluators are validated regardless.
    pub fn build<E: FieldContract>(
        evaluators: &[E],
        sources: &[FieldTag],
        required: &[FieldTag],
    ) -> Result<Self, EvaluationError> {
        let names: Vec<String> = evaluators.iter().map(|e| e.name().to_string()).collect();
        let producer_name = |producer: Producer| match producer {
            Producer::Source => "<source>".to_string(),
            Producer::Evaluator(i) => names[i].clone(),
        };

        let mut producers = FxHashMap::default();
        let mut declare = |tag: &FieldTag, producer: Producer| match producers.get(tag) {
            Some(&existing) => Err(EvaluationError::DuplicateProducer {
                tag: tag.clone(),
                first: producer_name(existing),
                second: producer_name(producer),
            }),
            None => {
                producers.insert(tag.clone(), producer);
                Ok(())
            }
        };
        for tag in sources {
            declare(tag, Producer::Source)?;
        }
        for (i, evaluator) in evaluators.iter().enumerate() {
            for tag in evaluator.evaluated_fields() {
                declare(tag, Producer::Evaluator(i))?;
            }
        }

        let mut consumers = vec![Vec::new(); evaluators.len()];
        let mut producers_of = vec![Vec::new(); evaluators.len()];
        for (i, evaluator) in evaluators.iter().enumerate() {
            for tag in evaluator.dependencies() {
                match producers.get(tag) {
                    None => {
                        return Err(EvaluationError::MissingProducer {
                            tag: tag.clone(),
                            consumer: evaluator.name().to_string(),
                        })
                    }
                    Some(Producer::Source) => {}
                    Some(&Producer::Evaluator(p)) => {
                        consumers[p].push(i);
                        producers_of[i].push(p);
                    }
                }
            }
        }
        for list in consumers.iter_mut().chain(producers_of.iter_mut()) {
            list.sort_unstable();
            list.dedup();
        }

        let topological = topological_order(&consumers, &producers_of)
            .map_err(|cycle| EvaluationError::CyclicDependency {
                cycle: cycle.into_iter().map(|i| names[i].clone()).collect(),
            })?;

        let order = if required.is_empty() {
            topological
        } else {
            let active = contributing_evaluators(required, &producers, &producers_of)?;
            let pruned: Vec<usize> = topological
                .into_iter()
                .filter(|i| active.contains(i))
                .collect();
            debug!(
                "Pruned {} of {} evaluators not contributing to required fields",
                evaluators.len() - pruned.len(),
                evaluators.len()
            );
            pruned
        };
        debug!(
            "Evaluation order: {:?}",
            order.iter().map(|&i| names[i].as_str()).collect::<Vec<_>>()
        );

        Ok(Self {
            dependencies: evaluators.iter().map(|e| e.dependencies().to_vec()).collect(),
            evaluated: evaluators.iter().map(|e| e.evaluated_fields().to_vec()).collect(),
            names,
            sources: sources.to_vec(),
            producers,
            consumers,
            order,
        })
    }

    /// Declaration indices of the evaluators to run, in evaluation order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Names of the evaluators to run, in evaluation order.
    pub fn ordered_names(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.names[i].as_str()).collect()
    }

    pub fn num_evaluators(&self) -> usize {
        self.names.len()
    }

    pub fn name(&self, evaluator: usize) -> &str {
        &self.names[evaluator]
    }

    pub fn sources(&self) -> &[FieldTag] {
        &self.sources
    }

    pub fn producer_of(&self, tag: &FieldTag) -> Option<Producer> {
        self.producers.get(tag).copied()
    }

    /// Evaluators that directly depend on a field evaluated by `evaluator`.
    pub fn consumers_of(&self, evaluator: usize) -> &[usize] {
        &self.consumers[evaluator]
    }

    pub fn dependencies_of(&self, evaluator: usize) -> &[FieldTag] {
        &self.dependencies[evaluator]
    }

    pub fn evaluated_by(&self, evaluator: usize) -> &[FieldTag] {
        &self.evaluated[evaluator]
    }

    /// All fields evaluated by the evaluators in the order, in evaluation order.
    pub fn evaluated_fields(&self) -> Vec<&FieldTag> {
        self.order
            .iter()
            .flat_map(|&i| self.evaluated[i].iter())
            .collect()
    }

    /// All fields needed to run the evaluators in the order: sources first, then evaluated
    /// fields in evaluation order.
    pub fn fields(&self) -> Vec<&FieldTag> {
        let mut seen = FxHashSet::default();
        self.sources
            .iter()
            .chain(self.order.iter().flat_map(|&i| self.evaluated[i].iter()))
            .chain(self.order.iter().flat_map(|&i| self.dependencies[i].iter()))
            .filter(|tag| seen.insert(*tag))
            .collect()
    }

    /// Renders the graph in the Graphviz `dot` format.
    pub fn to_dot(&self) -> String {
        Dot(self).to_string()
    }
}

/// Kahn's algorithm with a min-heap on declaration index, so that ties are broken by
/// declaration order. Returns a cycle (first = last) if the graph is cyclic.
fn topological_order(consumers: &[Vec<usize>], producers_of: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let n = consumers.len();
    let mut in_degree: Vec<usize> = producers_of.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| in_degree[i] == 0)
        .map(Reverse)
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &consumer in &consumers[i] {
            in_degree[consumer] -= 1;
            if in_degree[consumer] == 0 {
                ready.push(Reverse(consumer));
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        let start = (0..n)
            .find(|&i| in_degree[i] > 0)
            .unwrap_or_default();
        Err(find_cycle(start, producers_of, &in_degree))
    }
}

/// Every evaluator left with positive in-degree after Kahn's algorithm has at least one
/// producer that is also left over, so walking backwards along such producers must
/// eventually revisit a node.
fn find_cycle(start: usize, producers_of: &[Vec<usize>], in_degree: &[usize]) -> Vec<usize> {
    let mut position = FxHashMap::default();
    let mut path = Vec::new();
    let mut current = start;
    while !position.contains_key(&current) {
        position.insert(current, path.len());
        path.push(current);
        current = producers_of[current]
            .iter()
            .copied()
            .find(|&p| in_degree[p] > 0)
            .unwrap_or(current);
    }
    // The walk went from consumers to producers, reverse it to follow the edges
    let mut cycle = path.split_off(position[&current]);
    cycle.push(current);
    cycle.reverse();
    cycle
}

/// Evaluators whose fields are (transitively) needed for the required fields.
fn contributing_evaluators(
    required: &[FieldTag],
    producers: &FxHashMap<FieldTag, Producer>,
    producers_of: &[Vec<usize>],
) -> Result<FxHashSet<usize>, EvaluationError> {
    let mut active = FxHashSet::default();
    let mut stack = Vec::new();
    for tag in required {
        match producers.get(tag) {
            None => {
                return Err(EvaluationError::MissingProducer {
                    tag: tag.clone(),
                    consumer: REQUIRED_CONSUMER.to_string(),
                })
            }
            Some(Producer::Source) => {}
            Some(&Producer::Evaluator(i)) => stack.push(i),
        }
    }
    while let Some(i) = stack.pop() {
        if active.insert(i) {
            stack.extend(producers_of[i].iter().copied());
        }
    }
    Ok(active)
}

struct Dot<'a>(&'a DependencyGraph);

impl Display for Dot<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let graph = self.0;
        writeln!(f, "digraph fieldgraph {{")?;
        for (s, tag) in graph.sources.iter().enumerate() {
            writeln!(f, "    s{} [label=\"{}\", shape=box];", s, tag)?;
        }
        for &i in &graph.order {
            writeln!(f, "    e{} [label=\"{}\"];", i, graph.names[i])?;
        }
        for &consumer in &graph.order {
            for tag in &graph.dependencies[consumer] {
                let from = match graph.producers.get(tag) {
                    Some(Producer::Evaluator(p)) => format!("e{}", p),
                    Some(Producer::Source) => {
                        let s = graph.sources.iter().position(|t| t == tag).unwrap_or(0);
                        format!("s{}", s)
                    }
                    None => continue,
                };
                writeln!(f, "    {} -> e{} [label=\"{}\"];", from, consumer, tag)?;
            }
        }
        write!(f, "}}")
    }
}
