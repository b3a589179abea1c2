//! Scalar representations for `fieldgraph`.
//!
//! Formula code is written once against the [`Number`] capability and then instantiated for
//! each representation:
//!
//! - plain values (`f32`, `f64`),
//! - forward-mode derivatives ([`Fad`]), which carry a dense vector of partial derivatives
//!   with respect to a fixed set of local unknowns,
//! - expansions ([`Expansion`]), which carry the coefficients of a stochastic or ensemble
//!   expansion together with the algebra that defines their products,
//! - derivatives of expansions ([`ExpansionFad`]), forward-mode numbers whose value and
//!   partial derivatives are expansions.
use nalgebra::RealField;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display};
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

pub use nalgebra;

pub mod algebra;
mod expansion;
mod expansion_fad;
mod fad;

pub use expansion::{Expansion, ExpansionLayout};
pub use expansion_fad::{ExpansionFad, ExpansionFadLayout};
pub use fad::{Fad, FadLayout};

pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// The numeric representation used by a [`Number`] type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Representation {
    /// A plain scalar.
    Value,
    /// A scalar with a vector of partial derivatives.
    Derivative,
    /// A vector of expansion coefficients.
    Expansion,
    /// An expansion with a vector of partial derivatives that are expansions themselves.
    ExpansionDerivative,
}

impl Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => write!(f, "Value"),
            Self::Derivative => write!(f, "Derivative"),
            Self::Expansion => write!(f, "Expansion"),
            Self::ExpansionDerivative => write!(f, "ExpansionDerivative"),
        }
    }
}

/// Two operands (or an operand and its storage) disagree on the length of their
/// derivative or coefficient vectors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InconsistentDerivativeLength {
    pub expected: usize,
    pub actual: usize,
}

impl InconsistentDerivativeLength {
    pub fn new(expected: usize, actual: usize) -> Self {
        Self { expected, actual }
    }
}

impl Display for InconsistentDerivativeLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Inconsistent derivative length: expected {}, got {}",
            self.expected, self.actual
        )
    }
}

impl Error for InconsistentDerivativeLength {}

/// Arithmetic capability shared by all scalar representations.
///
/// Arithmetic is closed over `Self`. Real constants enter through [`Number::constant`] or
/// [`Number::from_f64`], which produce values whose derivative (or non-mean coefficient) part
/// is zero, so that for example `S::from_f64(2.0) * x` works for every representation.
///
/// # Panics
///
/// Binary operations on two operands whose derivative (coefficient) vectors are both
/// non-trivial but of different lengths panic with [`InconsistentDerivativeLength`].
pub trait Number:
    Clone
    + Debug
    + Default
    + PartialEq
    + Send
    + Sync
    + 'static
    + Neg<Output = Self>
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
{
    /// The underlying real type.
    type Real: Real;

    /// Per-workset information needed to move values in and out of flat storage,
    /// e.g. the local derivative length.
    type Layout: Clone + Debug + Send + Sync + 'static;

    const REPRESENTATION: Representation;

    fn constant(value: Self::Real) -> Self;

    fn from_f64(value: f64) -> Self {
        Self::constant(nalgebra::convert(value))
    }

    /// The primal value: the value itself, the value part of a derivative number or the mean of
    /// an expansion.
    fn value(&self) -> Self::Real;

    /// The non-primal part: partial derivatives or expansion coefficients. Empty for plain values.
    fn components(&self) -> &[Self::Real];

    /// An independent variable with a one-hot derivative at `index`.
    ///
    /// Representations without derivatives return a constant.
    fn independent(value: Self::Real, index: usize, layout: &Self::Layout) -> Self;

    /// A variable whose derivative part is given explicitly (e.g. a tangent direction).
    ///
    /// Representations without derivatives return a constant.
    fn seeded(value: Self::Real, seeds: &[Self::Real], layout: &Self::Layout) -> Self;

    /// A value given by its expansion coefficients, without derivative part.
    ///
    /// Representations without expansion coefficients take the first coefficient as a
    /// constant.
    fn from_coefficients(coefficients: &[Self::Real], _layout: &Self::Layout) -> Self {
        Self::constant(coefficients[0])
    }

    /// Number of real slots a single value occupies in flat storage.
    ///
    /// Storage is organized in `1 + derivative_len(layout)` consecutive blocks of
    /// `coefficient_count(layout)` slots: first the value, then one block per partial
    /// derivative.
    fn footprint(layout: &Self::Layout) -> usize;

    /// Number of expansion coefficients of the value and of each partial derivative.
    fn coefficient_count(_layout: &Self::Layout) -> usize {
        1
    }

    /// Number of partial derivatives carried by values under `layout`.
    fn derivative_len(layout: &Self::Layout) -> usize {
        Self::footprint(layout) / Self::coefficient_count(layout) - 1
    }

    /// Reads a value from `footprint(layout)` slots.
    fn load(layout: &Self::Layout, slots: &[Self::Real]) -> Self;

    /// Writes the value into `footprint(layout)` slots.
    fn store(&self, layout: &Self::Layout, slots: &mut [Self::Real]) -> Result<(), InconsistentDerivativeLength>;

    fn sqrt(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn tan(self) -> Self;
    fn abs(self) -> Self;
    fn powf(self, exponent: Self::Real) -> Self;

    fn powi(self, exponent: i32) -> Self {
        self.powf(nalgebra::convert(exponent as f64))
    }
}

macro_rules! impl_plain_number {
    ($($t:ty),*) => {
        $(
        impl Number for $t {
            type Real = $t;
            type Layout = ();

            const REPRESENTATION: Representation = Representation::Value;

            fn constant(value: $t) -> Self {
                value
            }

            fn value(&self) -> $t {
                *self
            }

            fn components(&self) -> &[$t] {
                &[]
            }

            fn independent(value: $t, _index: usize, _layout: &()) -> Self {
                value
            }

            fn seeded(value: $t, _seeds: &[$t], _layout: &()) -> Self {
                value
            }

            fn footprint(_layout: &()) -> usize {
                1
            }

            fn load(_layout: &(), slots: &[$t]) -> Self {
                slots[0]
            }

            fn store(&self, _layout: &(), slots: &mut [$t]) -> Result<(), InconsistentDerivativeLength> {
                slots[0] = *self;
                Ok(())
            }

            fn sqrt(self) -> Self {
                <$t>::sqrt(self)
            }

            fn exp(self) -> Self {
                <$t>::exp(self)
            }

            fn ln(self) -> Self {
                <$t>::ln(self)
            }

            fn sin(self) -> Self {
                <$t>::sin(self)
            }

            fn cos(self) -> Self {
                <$t>::cos(self)
            }

            fn tan(self) -> Self {
                <$t>::tan(self)
            }

            fn abs(self) -> Self {
                <$t>::abs(self)
            }

            fn powf(self, exponent: $t) -> Self {
                <$t>::powf(self, exponent)
            }

            fn powi(self, exponent: i32) -> Self {
                <$t>::powi(self, exponent)
            }
        }
        )*
    };
}

impl_plain_number!(f32, f64);
