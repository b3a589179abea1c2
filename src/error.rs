//! Errors reported while building and evaluating field graphs.
use crate::evaluation_type::EvaluationType;
use crate::manager::ManagerState;
use crate::scalar::{InconsistentDerivativeLength, Representation};
use crate::tag::FieldTag;
use itertools::Itertools;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Name used as the consumer in [`EvaluationError::MissingProducer`] when a field was
/// explicitly required but nothing produces it.
pub const REQUIRED_CONSUMER: &str = "<required>";

/// Name used as the writer in [`EvaluationError::UndeclaredWrite`] for writes coming from
/// outside the graph.
pub const EXTERNAL_WRITER: &str = "<external>";

#[derive(Debug)]
#[non_exhaustive]
pub enum EvaluationError {
    /// A field tag was created with an invalid shape.
    InvalidShape { name: String, reason: String },
    /// More than one evaluator (or source declaration) produces the same tag.
    DuplicateProducer { tag: FieldTag, first: String, second: String },
    /// A consumed tag has no producer and is not a declared source.
    MissingProducer { tag: FieldTag, consumer: String },
    /// The evaluators form a cycle. The first and last names are the same evaluator.
    CyclicDependency { cycle: Vec<String> },
    /// A workset needs more storage than the container was allocated with.
    CapacityExceeded {
        tag: FieldTag,
        unit: &'static str,
        requested: usize,
        capacity: usize,
    },
    /// The manager must be bound before it can evaluate.
    NotReady { state: ManagerState },
    /// The requested operation is not available in the current manager state.
    InvalidState { expected: ManagerState, actual: ManagerState },
    /// The evaluation type requires a different scalar representation.
    RepresentationMismatch {
        evaluation_type: EvaluationType,
        expected: Representation,
        actual: Representation,
    },
    /// A value of the wrong derivative (or coefficient) length was stored in a field.
    InconsistentDerivativeLength {
        tag: FieldTag,
        source: InconsistentDerivativeLength,
    },
    IndexOutOfRange {
        tag: FieldTag,
        index: Vec<usize>,
        extents: Vec<usize>,
    },
    UnknownField { tag: FieldTag },
    /// An evaluator attempted to write a field it does not declare as evaluated.
    UndeclaredWrite { evaluator: String, tag: FieldTag },
    /// The field is already borrowed in a conflicting way.
    FieldInUse { tag: FieldTag },
    /// An evaluator failed with an error of its own.
    EvaluatorFailed { evaluator: String, source: eyre::Report },
}

impl Display for EvaluationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidShape { name, reason } => {
                write!(f, "Invalid shape for field \"{}\": {}", name, reason)
            }
            Self::DuplicateProducer { tag, first, second } => {
                write!(f, "Field {} is produced by both \"{}\" and \"{}\"", tag, first, second)
            }
            Self::MissingProducer { tag, consumer } => {
                write!(
                    f,
                    "Field {} consumed by \"{}\" has no producer and is not a declared source",
                    tag, consumer
                )
            }
            Self::CyclicDependency { cycle } => {
                write!(f, "Cyclic dependency between evaluators: {}", cycle.iter().join(" -> "))
            }
            Self::CapacityExceeded {
                tag,
                unit,
                requested,
                capacity,
            } => {
                write!(
                    f,
                    "Field {} needs {} {}, but has capacity for only {}",
                    tag, requested, unit, capacity
                )
            }
            Self::NotReady { state } => {
                write!(f, "Cannot evaluate: manager is {} (must be Ready)", state)
            }
            Self::InvalidState { expected, actual } => {
                write!(f, "Invalid manager state: expected {}, but manager is {}", expected, actual)
            }
            Self::RepresentationMismatch {
                evaluation_type,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Evaluation type {} requires the {} representation, got {}",
                    evaluation_type, expected, actual
                )
            }
            Self::InconsistentDerivativeLength { tag, source } => {
                write!(f, "Cannot store into field {}. {}", tag, source)
            }
            Self::IndexOutOfRange { tag, index, extents } => {
                write!(f, "Index {:?} out of range for field {} with extents {:?}", index, tag, extents)
            }
            Self::UnknownField { tag } => {
                write!(f, "Field {} is not managed by this manager", tag)
            }
            Self::UndeclaredWrite { evaluator, tag } => {
                write!(f, "\"{}\" attempted to write field {}, which it does not evaluate", evaluator, tag)
            }
            Self::FieldInUse { tag } => {
                write!(f, "Field {} is already borrowed", tag)
            }
            Self::EvaluatorFailed { evaluator, source } => {
                write!(f, "Evaluator \"{}\" failed. Error: {}", evaluator, source)
            }
        }
    }
}

impl Error for EvaluationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InconsistentDerivativeLength { source, .. } => Some(source),
            Self::EvaluatorFailed { source, .. } => Some(&**source),
            _ => None,
        }
    }
}

impl EvaluationError {
    /// Attributes an error raised inside an evaluator to that evaluator.
    ///
    /// Reports that already wrap an [`EvaluationError`] are passed through unchanged.
    pub fn from_evaluator(evaluator: &str, report: eyre::Report) -> Self {
        match report.downcast::<EvaluationError>() {
            Ok(error) => error,
            Err(report) => Self::EvaluatorFailed {
                evaluator: evaluator.to_string(),
                source: report,
            },
        }
    }
}
