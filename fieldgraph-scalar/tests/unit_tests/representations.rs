use fieldgraph_scalar::algebra::{Ensemble, HermiteChaos};
use fieldgraph_scalar::{
    Expansion, ExpansionFad, ExpansionFadLayout, ExpansionLayout, Fad, FadLayout, Number, Representation,
};
use matrixcompare::assert_scalar_eq;
use std::sync::Arc;

fn formula<S: Number>(x: S, y: S) -> S {
    S::from_f64(2.0) * x.clone() * y.clone() + x.sin() - y.sqrt()
}

macro_rules! primal_agreement_tests {
    ($($name:ident: $scalar:ty),*) => {
        paste::paste! {
            $(
            #[test]
            fn [<primal_value_of_ $name _matches_plain_evaluation>]() {
                let (x, y) = (0.8, 2.2);
                let result = formula(<$scalar>::from_f64(x), <$scalar>::from_f64(y));
                assert_scalar_eq!(result.value(), formula(x, y), comp = abs, tol = 1e-12);
            }
            )*
        }
    };
}

primal_agreement_tests!(
    fad: Fad<f64>,
    ensemble: Expansion<f64, Ensemble>,
    hermite: Expansion<f64, HermiteChaos<f64>>,
    ensemble_fad: ExpansionFad<f64, Ensemble>,
    hermite_fad: ExpansionFad<f64, HermiteChaos<f64>>
);

#[test]
fn representations_report_their_kind() {
    assert_eq!(<f64 as Number>::REPRESENTATION, Representation::Value);
    assert_eq!(<Fad<f64> as Number>::REPRESENTATION, Representation::Derivative);
    assert_eq!(<Expansion<f64, Ensemble> as Number>::REPRESENTATION, Representation::Expansion);
    assert_eq!(
        <ExpansionFad<f64, Ensemble> as Number>::REPRESENTATION,
        Representation::ExpansionDerivative
    );
}

#[test]
fn footprints_reflect_storage_requirements() {
    assert_eq!(<f64 as Number>::footprint(&()), 1);
    assert_eq!(<Fad<f64> as Number>::footprint(&FadLayout::new(8)), 9);
    let layout = ExpansionLayout::new(Arc::new(Ensemble::new(5)));
    assert_eq!(<Expansion<f64, Ensemble> as Number>::footprint(&layout), 5);
    let layout = ExpansionFadLayout::new(Arc::new(Ensemble::new(5)), 3);
    assert_eq!(<ExpansionFad<f64, Ensemble> as Number>::footprint(&layout), 20);
}

#[test]
fn primal_arithmetic_is_commutative_and_associative() {
    let a = Fad::variable(1.25, 3, 0);
    let b = Fad::variable(-0.5, 3, 1);
    let c = Fad::variable(3.0, 3, 2);

    let ab = a.clone() * b.clone();
    let ba = b.clone() * a.clone();
    assert_scalar_eq!(ab.value(), ba.value(), comp = abs, tol = 1e-14);

    let left = (a.clone() + b.clone()) + c.clone();
    let right = a + (b + c);
    assert_scalar_eq!(left.value(), right.value(), comp = abs, tol = 1e-14);
    assert_eq!(left.derivatives(), right.derivatives());
}
