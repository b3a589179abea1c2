use crate::error::EvaluationError;
use crate::evaluator::{EvaluationContext, Evaluator, FieldBinder, FieldContract, FieldHandle};
use crate::scalar::Number;
use crate::tag::FieldTag;
use eyre::eyre;
use std::fmt;
use std::fmt::{Debug, Formatter};

/// Applies a pure function entry by entry.
///
/// For every entry of the output field, the function receives the corresponding entries of
/// the input fields (in the order they were given) and returns the output value. All fields
/// must have the same shape apart from their names, so that their entries correspond
/// one-to-one.
///
/// Since the function is generic in the scalar type, the same formula can be instantiated for
/// every evaluation type:
///
/// ```
/// # use fieldgraph::producers::Pointwise;
/// # use fieldgraph::scalar::{Fad, Number};
/// # use fieldgraph::tag::FieldTag;
/// fn product<S: Number>() -> Pointwise<S, impl Fn(&[S]) -> S> {
///     let (x, y, z) = (FieldTag::cell_scalar("X"), FieldTag::cell_scalar("Y"), FieldTag::cell_scalar("Z"));
///     Pointwise::new("Z = X * Y", vec![x, y], z, |args: &[S]| args[0].clone() * args[1].clone())
///         .expect("Fields have the same shape")
/// }
/// let residual = product::<f64>();
/// let jacobian = product::<Fad<f64>>();
/// ```
pub struct Pointwise<S, F> {
    name: String,
    dependencies: Vec<FieldTag>,
    evaluated: Vec<FieldTag>,
    inputs: Vec<FieldHandle>,
    output: Option<FieldHandle>,
    function: F,
    arguments: Vec<S>,
}

impl<S, F> Debug for Pointwise<S, F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pointwise")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("evaluated", &self.evaluated)
            .finish_non_exhaustive()
    }
}

impl<S, F> Pointwise<S, F>
where
    S: Number,
    F: Fn(&[S]) -> S + Send,
{
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<FieldTag>,
        output: FieldTag,
        function: F,
    ) -> Result<Self, EvaluationError> {
        if let Some(mismatch) = inputs.iter().find(|tag| tag.shape() != output.shape()) {
            return Err(EvaluationError::InvalidShape {
                name: mismatch.name().to_string(),
                reason: format!("pointwise input {} must have the same shape as output {}", mismatch, output),
            });
        }
        Ok(Self {
            name: name.into(),
            arguments: Vec::with_capacity(inputs.len()),
            dependencies: inputs,
            evaluated: vec![output],
            inputs: Vec::new(),
            output: None,
            function,
        })
    }
}

impl<S, F> FieldContract for Pointwise<S, F> {
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

impl<S, F> Evaluator<S> for Pointwise<S, F>
where
    S: Number,
    F: Fn(&[S]) -> S + Send,
{
    fn bind(&mut self, fields: &FieldBinder<'_>) -> Result<(), EvaluationError> {
        self.inputs = self
            .dependencies
            .iter()
            .map(|tag| fields.resolve(tag))
            .collect::<Result<_, _>>()?;
        self.output = Some(fields.resolve(&self.evaluated[0])?);
        Ok(())
    }

    fn evaluate(&mut self, context: &EvaluationContext<'_, S>) -> eyre::Result<()> {
        let output = self
            .output
            .ok_or_else(|| eyre!("\"{}\" was evaluated before being bound", self.name))?;
        let inputs = self
            .inputs
            .iter()
            .map(|&handle| context.field(handle))
            .collect::<Result<Vec<_>, _>>()?;
        let mut output = context.field_mut(output)?;

        for entry in 0..output.len() {
            self.arguments.clear();
            for input in &inputs {
                self.arguments.push(input.get_entry(entry)?);
            }
            output.set_entry(entry, (self.function)(&self.arguments))?;
        }
        Ok(())
    }
}
