use fieldgraph_scalar::nalgebra::DVector;
use fieldgraph_scalar::{Fad, FadLayout, InconsistentDerivativeLength, Number};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use util::{approximate_derivative, assert_panics_with};

fn fad(value: f64, derivatives: &[f64]) -> Fad<f64> {
    Fad::new(value, DVector::from_column_slice(derivatives))
}

#[test]
fn product_follows_chain_rule() {
    let x = fad(3.0, &[1.0, 0.0]);
    let y = fad(4.0, &[0.0, 1.0]);
    let z = x * y;
    assert_eq!(z.value(), 12.0);
    assert_eq!(z.derivatives().as_slice(), &[4.0, 3.0]);
}

#[test]
fn quotient_follows_chain_rule() {
    let x = fad(3.0, &[1.0, 0.0]);
    let y = fad(4.0, &[0.0, 1.0]);
    let z = x / y;
    assert_scalar_eq!(z.value(), 0.75, comp = abs, tol = 1e-14);
    assert_scalar_eq!(z.derivative(0), 0.25, comp = abs, tol = 1e-14);
    assert_scalar_eq!(z.derivative(1), -3.0 / 16.0, comp = abs, tol = 1e-14);
}

#[test]
fn constant_has_zero_derivative_and_variable_is_one_hot() {
    let c = <Fad<f64> as Number>::constant(5.0);
    assert!(c.is_passive());
    assert_eq!(c.derivative(3), 0.0);

    let x = <Fad<f64> as Number>::independent(2.0, 2, &FadLayout::new(4));
    assert_eq!(x.derivatives().as_slice(), &[0.0, 0.0, 1.0, 0.0]);
}

#[test]
fn passive_numbers_combine_with_any_length() {
    let x = Fad::variable(2.0, 3, 1);
    let z = Fad::from_f64(3.0) * x.clone() + Fad::from_f64(1.0);
    assert_eq!(z.value(), 7.0);
    assert_eq!(z.derivatives().as_slice(), &[0.0, 3.0, 0.0]);

    let w = Fad::from_f64(1.0) / x;
    assert_scalar_eq!(w.derivative(1), -0.25, comp = abs, tol = 1e-14);
}

#[test]
fn mismatched_derivative_lengths_panic() {
    let message = InconsistentDerivativeLength::new(2, 3).to_string();
    assert_panics_with!(Fad::variable(1.0, 2, 0) + Fad::variable(1.0, 3, 0), message.as_str());
    assert_panics_with!(Fad::variable(1.0, 2, 0) * Fad::variable(1.0, 3, 0), "Inconsistent derivative length");
}

#[test]
fn compound_assignment_matches_binary_operators() {
    let x = fad(1.5, &[1.0, 2.0]);
    let y = fad(-0.5, &[3.0, -1.0]);

    let mut z = x.clone();
    z *= y.clone();
    z += x.clone();
    z -= y.clone();
    z /= x.clone();

    let expected = (x.clone() * y.clone() + x.clone() - y) / x;
    assert_eq!(z, expected);
}

#[test]
fn store_checks_derivative_length() {
    let layout = FadLayout::new(2);
    let mut slots = vec![9.0; 3];

    let result = fad(1.0, &[1.0, 2.0, 3.0]).store(&layout, &mut slots);
    assert_eq!(result, Err(InconsistentDerivativeLength::new(2, 3)));

    // Passive numbers clear stale derivative slots
    Fad::constant(4.0).store(&layout, &mut slots).unwrap();
    assert_eq!(slots, vec![4.0, 0.0, 0.0]);
    assert_eq!(<Fad<f64> as Number>::load(&layout, &slots), fad(4.0, &[0.0, 0.0]));
}

#[test]
fn powers_of_zero_have_finite_derivatives() {
    let x = Fad::variable(0.0, 1, 0);
    let p0 = x.clone().powi(0);
    assert_eq!(p0.value(), 1.0);
    assert_eq!(p0.derivative(0), 0.0);

    let p2 = x.powf(2.0);
    assert_eq!(p2.value(), 0.0);
    assert_eq!(p2.derivative(0), 0.0);
}

#[test]
fn nested_expression_matches_finite_differences() {
    fn f<S: Number>(x: S, y: S) -> S {
        (x.clone() * y.clone()).sin() + (x / y.clone()).exp() - y.powi(3)
    }

    let (x0, y0) = (0.7, 1.3);
    let z = f(Fad::variable(x0, 2, 0), Fad::variable(y0, 2, 1));
    let fd = DVector::from_column_slice(&[
        approximate_derivative(|x| f(x, y0), x0, 1e-6),
        approximate_derivative(|y| f(x0, y), y0, 1e-6),
    ]);
    assert_scalar_eq!(z.value(), f(x0, y0), comp = abs, tol = 1e-14);
    assert_matrix_eq!(z.derivatives().clone(), fd, comp = abs, tol = 1e-7);
}

macro_rules! elementary_function_tests {
    ($($function:ident at $x:expr),*) => {
        paste::paste! {
            $(
            #[test]
            fn [<fad_ $function _matches_finite_difference>]() {
                let x = Fad::variable($x, 1, 0);
                let y = Number::$function(x);
                let expected = approximate_derivative(|x: f64| Number::$function(x), $x, 1e-6);
                assert_scalar_eq!(y.value(), Number::$function($x as f64), comp = abs, tol = 1e-14);
                assert_scalar_eq!(y.derivative(0), expected, comp = abs, tol = 1e-7);
            }
            )*
        }
    };
}

elementary_function_tests!(sqrt at 2.3, exp at 0.4, ln at 1.7, sin at 0.9, cos at 0.9, tan at 0.3, abs at -1.7);

#[test]
fn fad_powf_matches_finite_difference() {
    let x = Fad::variable(1.9, 1, 0);
    let y = x.powf(2.5);
    let expected = approximate_derivative(|x: f64| x.powf(2.5), 1.9, 1e-6);
    assert_scalar_eq!(y.derivative(0), expected, comp = abs, tol = 1e-7);
}
