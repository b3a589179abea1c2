use fieldgraph_scalar::algebra::{Ensemble, HermiteChaos};
use fieldgraph_scalar::{Expansion, ExpansionFad, ExpansionFadLayout, Fad, InconsistentDerivativeLength, Number};
use matrixcompare::assert_scalar_eq;
use std::sync::Arc;
use util::assert_panics_with;

type MpFad = ExpansionFad<f64, Ensemble>;
type SgFad = ExpansionFad<f64, HermiteChaos<f64>>;

fn ensemble(samples: &[f64]) -> Expansion<f64, Ensemble> {
    Expansion::from_slice(Arc::new(Ensemble::new(samples.len())), samples)
}

fn formula<S: Number>(x: S, y: S) -> S {
    let xy = x.clone() * y.clone();
    xy.sin() + (x.clone() / y.clone()).exp() - y.clone().powi(3) + x.clone().sqrt() * y.ln()
        - x.clone().tan().abs()
        + x.cos()
}

#[test]
fn ensemble_derivatives_match_samplewise_derivatives() {
    let xs = [0.7, 1.1, 2.0];
    let ys = [1.3, 0.4, 1.8];
    let x = MpFad::variable(ensemble(&xs), 2, 0);
    let y = MpFad::variable(ensemble(&ys), 2, 1);
    let z = formula(x, y);
    assert_eq!(z.len(), 2);

    for k in 0..xs.len() {
        let expected = formula(Fad::variable(xs[k], 2, 0), Fad::variable(ys[k], 2, 1));
        assert_scalar_eq!(z.value().components()[k], expected.value(), comp = abs, tol = 1e-12);
        for j in 0..2 {
            let derivative = z.derivative(j);
            assert_scalar_eq!(derivative.components()[k], expected.derivative(j), comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn hermite_derivatives_of_deterministic_values() {
    let algebra = Arc::new(HermiteChaos::<f64>::new(2));
    let x0 = 0.6f64;
    let x = SgFad::variable(Expansion::from_slice(algebra, &[x0, 0.0, 0.0]), 1, 0);
    let y = x.clone().sin() * x.exp();

    let value = y.value().components();
    let derivative = y.derivative(0);
    assert_scalar_eq!(value[0], x0.sin() * x0.exp(), comp = abs, tol = 1e-12);
    assert_scalar_eq!(
        derivative.components()[0],
        (x0.cos() + x0.sin()) * x0.exp(),
        comp = abs,
        tol = 1e-12
    );
    for k in 1..3 {
        assert_scalar_eq!(value[k], 0.0, comp = abs, tol = 1e-12);
        assert_scalar_eq!(derivative.components()[k], 0.0, comp = abs, tol = 1e-12);
    }
}

#[test]
fn hermite_product_rule_acts_on_coefficients() {
    let algebra = Arc::new(HermiteChaos::<f64>::new(2));
    // x = 1 + ξ with dx/dx_0 = 1, y = 2 - ξ with dy/dx_1 = 1
    let x = SgFad::variable(Expansion::from_slice(algebra.clone(), &[1.0, 1.0, 0.0]), 2, 0);
    let y = SgFad::variable(Expansion::from_slice(algebra, &[2.0, -1.0, 0.0]), 2, 1);
    let z = x * y;

    // (1 + ξ)(2 - ξ) = 2 + ξ - ξ² = 1 + ξ - He_2
    assert_eq!(z.value().components(), &[1.0, 1.0, -1.0]);
    assert_eq!(z.derivative(0).components(), &[2.0, -1.0, 0.0]);
    assert_eq!(z.derivative(1).components(), &[1.0, 1.0, 0.0]);
}

#[test]
fn passive_numbers_combine_with_any_length() {
    let x = MpFad::variable(ensemble(&[1.0, 2.0]), 3, 2);
    let c = MpFad::from_f64(4.0);
    assert!(c.is_passive());

    let z = c.clone() * x.clone() - c;
    assert_eq!(z.len(), 3);
    assert_eq!(z.value().components(), &[0.0, 4.0]);
    assert_eq!(z.derivative(2), ensemble(&[4.0, 4.0]));
    assert_eq!(z.derivative(0), ensemble(&[0.0, 0.0]));

    let y = MpFad::variable(ensemble(&[1.0, 2.0]), 2, 0);
    assert_panics_with!(x + y, "Inconsistent derivative length");
}

#[test]
fn storage_holds_value_block_then_derivative_blocks() {
    let layout = ExpansionFadLayout::new(Arc::new(Ensemble::new(2)), 2);
    assert_eq!(MpFad::footprint(&layout), 6);
    assert_eq!(MpFad::coefficient_count(&layout), 2);
    assert_eq!(MpFad::derivative_len(&layout), 2);

    let x = MpFad::variable(ensemble(&[3.0, 5.0]), 2, 0);
    let mut slots = vec![9.0; 6];
    x.store(&layout, &mut slots).unwrap();
    assert_eq!(slots, vec![3.0, 5.0, 1.0, 1.0, 0.0, 0.0]);
    assert_eq!(MpFad::load(&layout, &slots), x);

    // Passive numbers clear stale derivative slots
    MpFad::from_f64(2.0).store(&layout, &mut slots).unwrap();
    assert_eq!(slots, vec![2.0, 2.0, 0.0, 0.0, 0.0, 0.0]);

    let wrong = MpFad::variable(ensemble(&[3.0, 5.0]), 3, 0);
    assert_eq!(wrong.store(&layout, &mut slots), Err(InconsistentDerivativeLength::new(2, 3)));
}

#[test]
fn seeding_from_coefficients_and_directions() {
    let layout = ExpansionFadLayout::new(Arc::new(Ensemble::new(3)), 2);
    let x = MpFad::seeded(0.0, &[0.5, -1.0], &layout) + MpFad::from_coefficients(&[1.0, 2.0, 3.0], &layout);
    assert_eq!(x.value().components(), &[1.0, 2.0, 3.0]);
    assert_eq!(x.derivative(0), ensemble(&[0.5, 0.5, 0.5]));
    assert_eq!(x.derivative(1), ensemble(&[-1.0, -1.0, -1.0]));
    assert_scalar_eq!(Number::value(&x), 2.0, comp = abs, tol = 1e-14);
}
