use crate::algebra::ExpansionAlgebra;
use crate::{InconsistentDerivativeLength, Number, Real, Representation};
use nalgebra::{DVector, Scalar};
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use std::sync::Arc;

/// A number represented by the coefficients of an expansion in some basis.
///
/// The algebra `A` decides how products, quotients and nonlinear functions act on the
/// coefficients (see [`algebra`](crate::algebra)). An expansion without an algebra is a
/// constant: it holds a single coefficient and is embedded into the algebra of the other
/// operand when combined with it.
#[derive(Debug)]
pub struct Expansion<T: Scalar, A> {
    coefficients: DVector<T>,
    algebra: Option<Arc<A>>,
}

impl<T: Scalar, A> Clone for Expansion<T, A> {
    fn clone(&self) -> Self {
        Self {
            coefficients: self.coefficients.clone(),
            algebra: self.algebra.clone(),
        }
    }
}

/// Storage layout of [`Expansion`] numbers: the shared algebra.
#[derive(Debug)]
pub struct ExpansionLayout<A> {
    pub algebra: Arc<A>,
}

impl<A> ExpansionLayout<A> {
    pub fn new(algebra: Arc<A>) -> Self {
        Self { algebra }
    }
}

impl<A> Clone for ExpansionLayout<A> {
    fn clone(&self) -> Self {
        Self {
            algebra: Arc::clone(&self.algebra),
        }
    }
}

impl<T: Real, A: ExpansionAlgebra<T>> Default for Expansion<T, A> {
    fn default() -> Self {
        Self::constant(T::zero())
    }
}

impl<T: Real, A: ExpansionAlgebra<T>> Expansion<T, A> {
    /// # Panics
    ///
    /// Panics if the number of coefficients does not match the size of the algebra.
    pub fn new(algebra: Arc<A>, coefficients: DVector<T>) -> Self {
        if coefficients.len() != algebra.size() {
            panic!("{}", InconsistentDerivativeLength::new(algebra.size(), coefficients.len()));
        }
        Self {
            coefficients,
            algebra: Some(algebra),
        }
    }

    pub fn from_slice(algebra: Arc<A>, coefficients: &[T]) -> Self {
        Self::new(algebra, DVector::from_column_slice(coefficients))
    }

    pub fn constant(value: T) -> Self {
        Self {
            coefficients: DVector::from_element(1, value),
            algebra: None,
        }
    }

    pub fn coefficients(&self) -> &DVector<T> {
        &self.coefficients
    }

    pub fn algebra(&self) -> Option<&Arc<A>> {
        self.algebra.as_ref()
    }

    pub fn is_constant(&self) -> bool {
        self.algebra.is_none()
    }

    /// The coefficients of this number in the given algebra.
    fn embedded_in(&self, algebra: &A) -> DVector<T> {
        match &self.algebra {
            Some(own) => {
                if own.size() != algebra.size() {
                    panic!("{}", InconsistentDerivativeLength::new(algebra.size(), own.size()));
                }
                self.coefficients.clone()
            }
            None => {
                let mut coefficients = DVector::zeros(algebra.size());
                algebra.embed_constant(coefficients.as_mut_slice(), self.coefficients[0]);
                coefficients
            }
        }
    }

    fn shared_algebra(&self, other: &Self) -> Option<Arc<A>> {
        self.algebra.as_ref().or(other.algebra.as_ref()).cloned()
    }

    /// Combines two operands coefficient-wise.
    fn zip_with(self, other: Self, f: impl Fn(T, T) -> T) -> Self {
        match self.shared_algebra(&other) {
            None => Self::constant(f(self.coefficients[0], other.coefficients[0])),
            Some(algebra) => {
                let a = self.embedded_in(&algebra);
                let b = other.embedded_in(&algebra);
                let coefficients = a.zip_map(&b, f);
                Self {
                    coefficients,
                    algebra: Some(algebra),
                }
            }
        }
    }

    fn scale(mut self, factor: T) -> Self {
        self.coefficients *= factor;
        self
    }

    pub(crate) fn apply(self, f: impl Fn(T) -> T) -> Self {
        let algebra = match &self.algebra {
            None => return Self::constant(f(self.coefficients[0])),
            Some(algebra) => Arc::clone(algebra),
        };
        let mut output = DVector::zeros(algebra.size());
        algebra.apply_into(output.as_mut_slice(), self.coefficients.as_slice(), &f);
        Self {
            coefficients: output,
            algebra: Some(algebra),
        }
    }
}

impl<T: Real, A: ExpansionAlgebra<T>> PartialEq for Expansion<T, A> {
    fn eq(&self, other: &Self) -> bool {
        let size_of = |e: &Self| e.algebra.as_ref().map(|algebra| algebra.size());
        if let (Some(a), Some(b)) = (size_of(self), size_of(other)) {
            if a != b {
                return false;
            }
        }
        match self.shared_algebra(other) {
            None => self.coefficients == other.coefficients,
            Some(algebra) => self.embedded_in(&algebra) == other.embedded_in(&algebra),
        }
    }
}

impl<T: Real, A: ExpansionAlgebra<T>> Neg for Expansion<T, A> {
    type Output = Self;

    fn neg(self) -> Self {
        self.scale(-T::one())
    }
}

impl<T: Real, A: ExpansionAlgebra<T>> Add for Expansion<T, A> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.zip_with(rhs, |a, b| a + b)
    }
}

impl<T: Real, A: ExpansionAlgebra<T>> Sub for Expansion<T, A> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.zip_with(rhs, |a, b| a - b)
    }
}

impl<T: Real, A: ExpansionAlgebra<T>> Mul for Expansion<T, A> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let algebra = match &self.algebra {
            None => {
                let c = self.coefficients[0];
                return rhs.scale(c);
            }
            Some(algebra) => Arc::clone(algebra),
        };
        if rhs.is_constant() {
            let c = rhs.coefficients[0];
            return self.scale(c);
        }
        let b = rhs.embedded_in(&algebra);
        let mut output = DVector::zeros(algebra.size());
        algebra.multiply_into(output.as_mut_slice(), self.coefficients.as_slice(), b.as_slice());
        Self {
            coefficients: output,
            algebra: Some(algebra),
        }
    }
}

impl<T: Real, A: ExpansionAlgebra<T>> Div for Expansion<T, A> {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        let algebra = match &rhs.algebra {
            None => {
                let c = rhs.coefficients[0];
                return self.scale(T::one() / c);
            }
            Some(algebra) => Arc::clone(algebra),
        };
        let a = self.embedded_in(&algebra);
        let mut output = DVector::zeros(algebra.size());
        algebra.divide_into(output.as_mut_slice(), a.as_slice(), rhs.coefficients.as_slice());
        Self {
            coefficients: output,
            algebra: Some(algebra),
        }
    }
}

macro_rules! impl_assign_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<T: Real, A: ExpansionAlgebra<T>> $trait for Expansion<T, A> {
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

impl<T: Real, A: ExpansionAlgebra<T>> Number for Expansion<T, A> {
    type Real = T;
    type Layout = ExpansionLayout<A>;

    const REPRESENTATION: Representation = Representation::Expansion;

    fn constant(value: T) -> Self {
        Expansion::constant(value)
    }

    fn value(&self) -> T {
        match &self.algebra {
            Some(algebra) => algebra.mean(self.coefficients.as_slice()),
            None => self.coefficients[0],
        }
    }

    fn components(&self) -> &[T] {
        self.coefficients.as_slice()
    }

    fn independent(value: T, _index: usize, _layout: &ExpansionLayout<A>) -> Self {
        Expansion::constant(value)
    }

    fn seeded(value: T, _seeds: &[T], _layout: &ExpansionLayout<A>) -> Self {
        Expansion::constant(value)
    }

    fn from_coefficients(coefficients: &[T], layout: &ExpansionLayout<A>) -> Self {
        Expansion::from_slice(Arc::clone(&layout.algebra), coefficients)
    }

    fn footprint(layout: &ExpansionLayout<A>) -> usize {
        layout.algebra.size()
    }

    fn coefficient_count(layout: &ExpansionLayout<A>) -> usize {
        layout.algebra.size()
    }

    fn load(layout: &ExpansionLayout<A>, slots: &[T]) -> Self {
        let size = layout.algebra.size();
        Expansion {
            coefficients: DVector::from_column_slice(&slots[..size]),
            algebra: Some(Arc::clone(&layout.algebra)),
        }
    }

    fn store(&self, layout: &ExpansionLayout<A>, slots: &mut [T]) -> Result<(), InconsistentDerivativeLength> {
        let size = layout.algebra.size();
        let slots = &mut slots[..size];
        match &self.algebra {
            None => layout.algebra.embed_constant(slots, self.coefficients[0]),
            Some(algebra) if algebra.size() == size => slots.copy_from_slice(self.coefficients.as_slice()),
            Some(algebra) => return Err(InconsistentDerivativeLength::new(size, algebra.size())),
        }
        Ok(())
    }

    fn sqrt(self) -> Self {
        self.apply(|x| x.sqrt())
    }

    fn exp(self) -> Self {
        self.apply(|x| x.exp())
    }

    fn ln(self) -> Self {
        self.apply(|x| x.ln())
    }

    fn sin(self) -> Self {
        self.apply(|x| x.sin())
    }

    fn cos(self) -> Self {
        self.apply(|x| x.cos())
    }

    fn tan(self) -> Self {
        self.apply(|x| x.tan())
    }

    fn abs(self) -> Self {
        self.apply(|x| x.abs())
    }

    fn powf(self, exponent: T) -> Self {
        self.apply(move |x| x.powf(exponent))
    }
}
