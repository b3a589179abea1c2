//! Test helpers shared by the crates in this workspace.
use nalgebra::{DMatrix, DVector};

/// Asserts that an expression panics with a message containing the given text.
#[macro_export]
macro_rules! assert_panics_with {
    ($e:expr, $text:expr) => {{
        use std::panic::{catch_unwind, AssertUnwindSafe};
        let result = catch_unwind(AssertUnwindSafe(|| $e));
        match result {
            Ok(_) => panic!("assert_panics_with!({}) did not panic.", std::stringify!($e)),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<String>()
                    .cloned()
                    .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
                    .unwrap_or_default();
                assert!(
                    message.contains($text),
                    "Panic message {:?} does not contain {:?}",
                    message,
                    $text
                );
            }
        }
    }};
}

/// Approximates the Jacobian of `f` at `x` with central differences of step `h`.
pub fn approximate_jacobian(
    mut f: impl FnMut(&DVector<f64>) -> DVector<f64>,
    x: &DVector<f64>,
    h: f64,
) -> DMatrix<f64> {
    let out_dim = f(x).len();
    let in_dim = x.len();
    let mut result = DMatrix::zeros(out_dim, in_dim);

    let mut x_plus = x.clone();
    let mut x_minus = x.clone();
    for j in 0..in_dim {
        x_plus[j] += h;
        x_minus[j] -= h;

        // result[.., j] := (f+ - f-) / 2h
        let column_j = (f(&x_plus) - f(&x_minus)) / (2.0 * h);
        result.column_mut(j).copy_from(&column_j);

        x_plus[j] = x[j];
        x_minus[j] = x[j];
    }

    result
}

/// Approximates the derivative of a scalar function with central differences of step `h`.
pub fn approximate_derivative(f: impl Fn(f64) -> f64, x: f64, h: f64) -> f64 {
    (f(x + h) - f(x - h)) / (2.0 * h)
}
