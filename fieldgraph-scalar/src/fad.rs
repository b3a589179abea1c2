use crate::{InconsistentDerivativeLength, Number, Real, Representation};
use nalgebra::{DVector, Scalar};
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// A forward-mode automatic differentiation number.
///
/// Stores a value $v$ together with the partial derivatives $\pd{v}{x_k}$ with respect to a
/// fixed set of local unknowns $x_k$. Every operation applies the chain rule, so that e.g.
/// for $z = xy$ we get $\pd{z}{x_k} = \pd{x}{x_k} y + x \pd{y}{x_k}$.
///
/// A number with an empty derivative vector is *passive*: it behaves as a constant and may be
/// combined with a number of any derivative length.
#[derive(Debug, Clone, PartialEq)]
pub struct Fad<T: Scalar> {
    value: T,
    derivatives: DVector<T>,
}

/// Storage layout of [`Fad`] numbers for one workset: the local derivative length.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct FadLayout {
    pub len: usize,
}

impl FadLayout {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl<T: Real> Default for Fad<T> {
    fn default() -> Self {
        Self::constant(T::zero())
    }
}

impl<T: Real> Fad<T> {
    pub fn new(value: T, derivatives: DVector<T>) -> Self {
        Self { value, derivatives }
    }

    pub fn constant(value: T) -> Self {
        Self {
            value,
            derivatives: DVector::zeros(0),
        }
    }

    /// An independent variable among `len` unknowns, with derivative one at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn variable(value: T, len: usize, index: usize) -> Self {
        assert!(index < len, "Variable index {} out of bounds for {} unknowns", index, len);
        let mut derivatives = DVector::zeros(len);
        derivatives[index] = T::one();
        Self { value, derivatives }
    }

    pub fn value(&self) -> T {
        self.value
    }

    pub fn derivatives(&self) -> &DVector<T> {
        &self.derivatives
    }

    /// The partial derivative with respect to unknown `k`. Zero for passive numbers.
    pub fn derivative(&self, k: usize) -> T {
        if self.is_passive() {
            T::zero()
        } else {
            self.derivatives[k]
        }
    }

    pub fn len(&self) -> usize {
        self.derivatives.len()
    }

    pub fn is_passive(&self) -> bool {
        self.derivatives.is_empty()
    }

    fn unary(mut self, value: T, slope: T) -> Self {
        self.derivatives *= slope;
        self.value = value;
        self
    }

    /// Computes `value` with derivative `da * a' + db * b'`.
    fn binary(self, other: Self, value: T, da: T, db: T) -> Self {
        let derivatives = match (self.derivatives.len(), other.derivatives.len()) {
            (0, 0) => self.derivatives,
            (_, 0) => self.derivatives * da,
            (0, _) => other.derivatives * db,
            (n, m) if n == m => {
                let mut d = self.derivatives * da;
                d.axpy(db, &other.derivatives, T::one());
                d
            }
            (n, m) => panic!("{}", InconsistentDerivativeLength::new(n, m)),
        };
        Self { value, derivatives }
    }
}

impl<T: Real> Neg for Fad<T> {
    type Output = Self;

    fn neg(self) -> Self {
        let value = -self.value;
        self.unary(value, -T::one())
    }
}

impl<T: Real> Add for Fad<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        let value = self.value + rhs.value;
        self.binary(rhs, value, T::one(), T::one())
    }
}

impl<T: Real> Sub for Fad<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        let value = self.value - rhs.value;
        self.binary(rhs, value, T::one(), -T::one())
    }
}

impl<T: Real> Mul for Fad<T> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let (a, b) = (self.value, rhs.value);
        self.binary(rhs, a * b, b, a)
    }
}

impl<T: Real> Div for Fad<T> {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        let (a, b) = (self.value, rhs.value);
        let inv_b = T::one() / b;
        self.binary(rhs, a * inv_b, inv_b, -a * inv_b * inv_b)
    }
}

macro_rules! impl_assign_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<T: Real> $trait for Fad<T> {
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

impl<T: Real> Number for Fad<T> {
    type Real = T;
    type Layout = FadLayout;

    const REPRESENTATION: Representation = Representation::Derivative;

    fn constant(value: T) -> Self {
        Fad::constant(value)
    }

    fn value(&self) -> T {
        self.value
    }

    fn components(&self) -> &[T] {
        self.derivatives.as_slice()
    }

    fn independent(value: T, index: usize, layout: &FadLayout) -> Self {
        Fad::variable(value, layout.len, index)
    }

    /// # Panics
    ///
    /// Panics if the number of seeds differs from the layout's derivative length.
    fn seeded(value: T, seeds: &[T], layout: &FadLayout) -> Self {
        assert_eq!(seeds.len(), layout.len, "Seed count must match derivative length");
        Fad::new(value, DVector::from_column_slice(seeds))
    }

    fn footprint(layout: &FadLayout) -> usize {
        1 + layout.len
    }

    fn load(layout: &FadLayout, slots: &[T]) -> Self {
        let derivatives = DVector::from_column_slice(&slots[1..1 + layout.len]);
        Fad::new(slots[0], derivatives)
    }

    fn store(&self, layout: &FadLayout, slots: &mut [T]) -> Result<(), InconsistentDerivativeLength> {
        let (value_slot, derivative_slots) = slots.split_at_mut(1);
        let derivative_slots = &mut derivative_slots[..layout.len];
        if self.is_passive() {
            derivative_slots.fill(T::zero());
        } else if self.len() == layout.len {
            derivative_slots.copy_from_slice(self.derivatives.as_slice());
        } else {
            return Err(InconsistentDerivativeLength::new(layout.len, self.len()));
        }
        value_slot[0] = self.value;
        Ok(())
    }

    fn sqrt(self) -> Self {
        let s = self.value.sqrt();
        let slope = T::one() / (s + s);
        self.unary(s, slope)
    }

    fn exp(self) -> Self {
        let e = self.value.exp();
        self.unary(e, e)
    }

    fn ln(self) -> Self {
        let v = self.value;
        self.unary(v.ln(), T::one() / v)
    }

    fn sin(self) -> Self {
        let v = self.value;
        self.unary(v.sin(), v.cos())
    }

    fn cos(self) -> Self {
        let v = self.value;
        self.unary(v.cos(), -v.sin())
    }

    fn tan(self) -> Self {
        let t = self.value.tan();
        self.unary(t, T::one() + t * t)
    }

    fn abs(self) -> Self {
        let v = self.value;
        let slope = if v >= T::zero() { T::one() } else { -T::one() };
        self.unary(v.abs(), slope)
    }

    fn powf(self, exponent: T) -> Self {
        let v = self.value;
        if exponent == T::zero() {
            return self.unary(T::one(), T::zero());
        }
        let slope = exponent * v.powf(exponent - T::one());
        self.unary(v.powf(exponent), slope)
    }

    fn powi(self, exponent: i32) -> Self {
        let v = self.value;
        if exponent == 0 {
            return self.unary(T::one(), T::zero());
        }
        let n: T = nalgebra::convert(exponent as f64);
        let slope = n * v.powi(exponent - 1);
        self.unary(v.powi(exponent), slope)
    }
}
