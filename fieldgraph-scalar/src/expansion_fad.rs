use crate::algebra::ExpansionAlgebra;
use crate::{Expansion, ExpansionLayout, InconsistentDerivativeLength, Number, Real, Representation};
use nalgebra::Scalar;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use std::sync::Arc;

/// A forward-mode derivative number over expansions.
///
/// Both the value and every partial derivative are [`Expansion`]s in the same algebra, so that
/// the derivatives of a stochastic Galerkin or ensemble residual with respect to the local
/// unknowns are propagated coefficient by coefficient. The chain rule is evaluated in the
/// algebra of the expansion: for $z = f(x)$ the derivative is $f'(x) \, \pd{x}{x_k}$ with
/// the expansion $f'(x)$ computed by the algebra.
///
/// As for [`Fad`](crate::Fad), a number without partial derivatives is passive and may be
/// combined with a number of any derivative length.
#[derive(Debug)]
pub struct ExpansionFad<T: Scalar, A> {
    value: Expansion<T, A>,
    derivatives: Vec<Expansion<T, A>>,
}

impl<T: Scalar, A> Clone for ExpansionFad<T, A> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            derivatives: self.derivatives.clone(),
        }
    }
}

/// Storage layout of [`ExpansionFad`] numbers: the algebra and the local derivative length.
#[derive(Debug)]
pub struct ExpansionFadLayout<A> {
    pub expansion: ExpansionLayout<A>,
    pub len: usize,
}

impl<A> ExpansionFadLayout<A> {
    pub fn new(algebra: Arc<A>, len: usize) -> Self {
        Self {
            expansion: ExpansionLayout::new(algebra),
            len,
        }
    }
}

impl<A> Clone for ExpansionFadLayout<A> {
    fn clone(&self) -> Self {
        Self {
            expansion: self.expansion.clone(),
            len: self.len,
        }
    }
}

impl<T: Real, A: ExpansionAlgebra<T>> Default for ExpansionFad<T, A> {
    fn default() -> Self {
        Self::constant(T::zero())
    }
}

fn constant<T: Real, A: ExpansionAlgebra<T>>(value: T) -> Expansion<T, A> {
    Expansion::constant(value)
}

impl<T: Real, A: ExpansionAlgebra<T>> ExpansionFad<T, A> {
    pub fn new(value: Expansion<T, A>, derivatives: Vec<Expansion<T, A>>) -> Self {
        Self { value, derivatives }
    }

    pub fn constant(value: T) -> Self {
        Self::passive(Expansion::constant(value))
    }

    /// A number with the given value and no partial derivatives.
    pub fn passive(value: Expansion<T, A>) -> Self {
        Self {
            value,
            derivatives: Vec::new(),
        }
    }

    /// An independent variable among `len` unknowns, with derivative one at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn variable(value: Expansion<T, A>, len: usize, index: usize) -> Self {
        assert!(index < len, "Variable index {} out of bounds for {} unknowns", index, len);
        let derivatives = (0..len)
            .map(|k| constant(if k == index { T::one() } else { T::zero() }))
            .collect();
        Self { value, derivatives }
    }

    pub fn value(&self) -> &Expansion<T, A> {
        &self.value
    }

    pub fn derivatives(&self) -> &[Expansion<T, A>] {
        &self.derivatives
    }

    /// The partial derivative with respect to unknown `k`. Zero for passive numbers.
    pub fn derivative(&self, k: usize) -> Expansion<T, A> {
        self.derivatives
            .get(k)
            .cloned()
            .unwrap_or_else(|| constant(T::zero()))
    }

    pub fn len(&self) -> usize {
        self.derivatives.len()
    }

    pub fn is_passive(&self) -> bool {
        self.derivatives.is_empty()
    }

    fn unary(self, value: Expansion<T, A>, slope: Expansion<T, A>) -> Self {
        let derivatives = self
            .derivatives
            .into_iter()
            .map(|d| d * slope.clone())
            .collect();
        Self { value, derivatives }
    }

    /// Computes `value` with derivative `da * a' + db * b'`.
    fn binary(self, other: Self, value: Expansion<T, A>, da: Expansion<T, A>, db: Expansion<T, A>) -> Self {
        let derivatives = match (self.derivatives.len(), other.derivatives.len()) {
            (0, 0) => Vec::new(),
            (_, 0) => self.derivatives.into_iter().map(|d| d * da.clone()).collect(),
            (0, _) => other.derivatives.into_iter().map(|d| d * db.clone()).collect(),
            (n, m) if n == m => self
                .derivatives
                .into_iter()
                .zip(other.derivatives)
                .map(|(a, b)| a * da.clone() + b * db.clone())
                .collect(),
            (n, m) => panic!("{}", InconsistentDerivativeLength::new(n, m)),
        };
        Self { value, derivatives }
    }
}

impl<T: Real, A: ExpansionAlgebra<T>> PartialEq for ExpansionFad<T, A> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.derivatives == other.derivatives
    }
}

impl<T: Real, A: ExpansionAlgebra<T>> Neg for ExpansionFad<T, A> {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            value: -self.value,
            derivatives: self.derivatives.into_iter().map(Neg::neg).collect(),
        }
    }
}

impl<T: Real, A: ExpansionAlgebra<T>> Add for ExpansionFad<T, A> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        let value = self.value.clone() + rhs.value.clone();
        self.binary(rhs, value, constant(T::one()), constant(T::one()))
    }
}

impl<T: Real, A: ExpansionAlgebra<T>> Sub for ExpansionFad<T, A> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        let value = self.value.clone() - rhs.value.clone();
        self.binary(rhs, value, constant(T::one()), constant(-T::one()))
    }
}

impl<T: Real, A: ExpansionAlgebra<T>> Mul for ExpansionFad<T, A> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let (a, b) = (self.value.clone(), rhs.value.clone());
        let value = a.clone() * b.clone();
        self.binary(rhs, value, b, a)
    }
}

impl<T: Real, A: ExpansionAlgebra<T>> Div for ExpansionFad<T, A> {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        let (a, b) = (self.value.clone(), rhs.value.clone());
        let value = a / b.clone();
        let inv_b = constant(T::one()) / b.clone();
        let db = -(value.clone() / b);
        self.binary(rhs, value, inv_b, db)
    }
}

macro_rules! impl_assign_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<T: Real, A: ExpansionAlgebra<T>> $trait for ExpansionFad<T, A> {
            fn $method(&mut self, rhs: Self) {
                *self = std::mem::take(self) $op rhs;
            }
        }
    };
}

impl_assign_op!(AddAssign, add_assign, +);
impl_assign_op!(SubAssign, sub_assign, -);
impl_assign_op!(MulAssign, mul_assign, *);
impl_assign_op!(DivAssign, div_assign, /);

impl<T: Real, A: ExpansionAlgebra<T>> Number for ExpansionFad<T, A> {
    type Real = T;
    type Layout = ExpansionFadLayout<A>;

    const REPRESENTATION: Representation = Representation::ExpansionDerivative;

    fn constant(value: T) -> Self {
        ExpansionFad::constant(value)
    }

    /// The mean of the value.
    fn value(&self) -> T {
        self.value.value()
    }

    /// The expansion coefficients of the value.
    fn components(&self) -> &[T] {
        self.value.components()
    }

    fn independent(value: T, index: usize, layout: &ExpansionFadLayout<A>) -> Self {
        ExpansionFad::variable(Expansion::constant(value), layout.len, index)
    }

    /// # Panics
    ///
    /// Panics if the number of seeds differs from the layout's derivative length.
    fn seeded(value: T, seeds: &[T], layout: &ExpansionFadLayout<A>) -> Self {
        assert_eq!(seeds.len(), layout.len, "Seed count must match derivative length");
        ExpansionFad::new(
            Expansion::constant(value),
            seeds.iter().map(|&seed| constant(seed)).collect(),
        )
    }

    fn from_coefficients(coefficients: &[T], layout: &ExpansionFadLayout<A>) -> Self {
        ExpansionFad::passive(Expansion::from_coefficients(coefficients, &layout.expansion))
    }

    fn footprint(layout: &ExpansionFadLayout<A>) -> usize {
        layout.expansion.algebra.size() * (1 + layout.len)
    }

    fn coefficient_count(layout: &ExpansionFadLayout<A>) -> usize {
        layout.expansion.algebra.size()
    }

    fn load(layout: &ExpansionFadLayout<A>, slots: &[T]) -> Self {
        let size = layout.expansion.algebra.size();
        let mut blocks = slots[..size * (1 + layout.len)].chunks_exact(size);
        let value = blocks
            .next()
            .map(|block| Expansion::load(&layout.expansion, block))
            .unwrap_or_default();
        let derivatives = blocks
            .map(|block| Expansion::load(&layout.expansion, block))
            .collect();
        ExpansionFad::new(value, derivatives)
    }

    fn store(&self, layout: &ExpansionFadLayout<A>, slots: &mut [T]) -> Result<(), InconsistentDerivativeLength> {
        if !self.is_passive() && self.len() != layout.len {
            return Err(InconsistentDerivativeLength::new(layout.len, self.len()));
        }
        let size = layout.expansion.algebra.size();
        let (value_slots, derivative_slots) = slots[..size * (1 + layout.len)].split_at_mut(size);
        self.value.store(&layout.expansion, value_slots)?;
        if self.is_passive() {
            derivative_slots.fill(T::zero());
        } else {
            for (derivative, block) in self.derivatives.iter().zip(derivative_slots.chunks_exact_mut(size)) {
                derivative.store(&layout.expansion, block)?;
            }
        }
        Ok(())
    }

    fn sqrt(self) -> Self {
        let s = self.value.clone().sqrt();
        let slope = constant(T::one()) / (s.clone() + s.clone());
        self.unary(s, slope)
    }

    fn exp(self) -> Self {
        let e = self.value.clone().exp();
        self.unary(e.clone(), e)
    }

    fn ln(self) -> Self {
        let v = self.value.clone();
        let slope = constant(T::one()) / v.clone();
        self.unary(v.ln(), slope)
    }

    fn sin(self) -> Self {
        let v = self.value.clone();
        self.unary(v.clone().sin(), v.cos())
    }

    fn cos(self) -> Self {
        let v = self.value.clone();
        self.unary(v.clone().cos(), -v.sin())
    }

    fn tan(self) -> Self {
        let t = self.value.clone().tan();
        let slope = constant(T::one()) + t.clone() * t.clone();
        self.unary(t, slope)
    }

    fn abs(self) -> Self {
        let v = self.value.clone();
        let slope = v
            .clone()
            .apply(|x| if x >= T::zero() { T::one() } else { -T::one() });
        self.unary(v.abs(), slope)
    }

    fn powf(self, exponent: T) -> Self {
        let v = self.value.clone();
        if exponent == T::zero() {
            return self.unary(v.powf(T::zero()), constant(T::zero()));
        }
        let slope = v.clone().powf(exponent - T::one()) * constant(exponent);
        self.unary(v.powf(exponent), slope)
    }
}
