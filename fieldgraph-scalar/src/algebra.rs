//! Coefficient algebras for [`Expansion`](crate::Expansion) numbers.
//!
//! Sums and differences of expansions act coefficient-wise for every algebra. Products,
//! quotients and nonlinear functions depend on the basis and are delegated to an
//! [`ExpansionAlgebra`].
use crate::Real;
use nalgebra::{DMatrix, DVector, Scalar, SymmetricEigen};
use numeric_literals::replace_float_literals;
use std::fmt::Debug;

pub trait ExpansionAlgebra<T: Scalar>: Debug + Send + Sync + 'static {
    /// Number of coefficients of an expansion.
    fn size(&self) -> usize;

    /// Writes the coefficients of the constant `value` into `output`.
    fn embed_constant(&self, output: &mut [T], value: T);

    /// The primal (mean) value of an expansion.
    fn mean(&self, coefficients: &[T]) -> T;

    fn multiply_into(&self, output: &mut [T], a: &[T], b: &[T]);

    fn divide_into(&self, output: &mut [T], a: &[T], b: &[T]);

    /// Computes the coefficients of $f(a)$.
    fn apply_into(&self, output: &mut [T], a: &[T], f: &dyn Fn(T) -> T);
}

/// An ensemble of independent samples, propagated sample by sample.
///
/// This is the algebra of multi-point (ensemble) evaluation: every operation, including
/// products and nonlinear functions, acts on each sample separately. The primal value is the
/// sample mean.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ensemble {
    size: usize,
}

impl Ensemble {
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "Ensemble must contain at least one sample");
        Self { size }
    }
}

impl<T: Real> ExpansionAlgebra<T> for Ensemble {
    fn size(&self) -> usize {
        self.size
    }

    fn embed_constant(&self, output: &mut [T], value: T) {
        output.fill(value);
    }

    fn mean(&self, coefficients: &[T]) -> T {
        let n: T = nalgebra::convert(coefficients.len() as f64);
        coefficients.iter().fold(T::zero(), |sum, &c| sum + c) / n
    }

    fn multiply_into(&self, output: &mut [T], a: &[T], b: &[T]) {
        for ((o, &a), &b) in output.iter_mut().zip(a).zip(b) {
            *o = a * b;
        }
    }

    fn divide_into(&self, output: &mut [T], a: &[T], b: &[T]) {
        for ((o, &a), &b) in output.iter_mut().zip(a).zip(b) {
            *o = a / b;
        }
    }

    fn apply_into(&self, output: &mut [T], a: &[T], f: &dyn Fn(T) -> T) {
        for (o, &a) in output.iter_mut().zip(a) {
            *o = f(a);
        }
    }
}

/// A one-dimensional polynomial chaos expansion in probabilists' Hermite polynomials
/// $\psi_k = He_k$ of a standard normal variable $\xi$.
///
/// An expansion $u = \sum_k u_k \psi_k(\xi)$ has mean $u_0$. Products are projected back onto
/// the basis with the triple-product tensor
/// $$
/// (ab)_k = \sum_{i,j} a_i b_j \frac{\langle \psi_i \psi_j \psi_k \rangle}{\langle \psi_k^2 \rangle},
/// $$
/// quotients solve the corresponding linear system and nonlinear functions are projected with
/// Gauss-Hermite quadrature.
#[derive(Debug, Clone)]
pub struct HermiteChaos<T: Scalar> {
    order: usize,
    norms: Vec<T>,
    // Indexed as [(i * n + j) * n + k]
    triple_products: Vec<T>,
    quadrature_weights: Vec<T>,
    // Rows are quadrature points, columns are basis functions
    basis_at_points: DMatrix<T>,
}

fn factorial<T: Real>(n: usize) -> T {
    (1..=n).fold(T::one(), |acc, k| acc * nalgebra::convert::<f64, T>(k as f64))
}

impl<T: Real> HermiteChaos<T> {
    pub fn new(order: usize) -> Self {
        let n = order + 1;
        let norms: Vec<T> = (0..n).map(factorial).collect();

        let mut triple_products = vec![T::zero(); n * n * n];
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    let sum = i + j + k;
                    if sum % 2 != 0 {
                        continue;
                    }
                    let s = sum / 2;
                    if s < i || s < j || s < k {
                        continue;
                    }
                    let numerator = factorial::<T>(i) * factorial(j) * factorial(k);
                    let denominator = factorial::<T>(s - i) * factorial(s - j) * factorial(s - k);
                    triple_products[(i * n + j) * n + k] = numerator / denominator;
                }
            }
        }

        // Enough points to project products of the basis functions exactly
        let (points, quadrature_weights) = gauss_hermite(2 * n);
        let mut basis_at_points = DMatrix::zeros(points.len(), n);
        for (q, &x) in points.iter().enumerate() {
            let values = hermite_polynomials(x, n);
            basis_at_points.row_mut(q).copy_from_slice(values.as_slice());
        }

        Self {
            order,
            norms,
            triple_products,
            quadrature_weights,
            basis_at_points,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// $\langle \psi_k^2 \rangle = k!$.
    pub fn norm_squared(&self, k: usize) -> T {
        self.norms[k]
    }

    /// $\langle \psi_i \psi_j \psi_k \rangle$.
    pub fn triple_product(&self, i: usize, j: usize, k: usize) -> T {
        let n = self.order + 1;
        self.triple_products[(i * n + j) * n + k]
    }

    /// Evaluates the expansion with the given coefficients at $\xi$.
    pub fn evaluate(&self, coefficients: &[T], xi: T) -> T {
        let values = hermite_polynomials(xi, self.order + 1);
        coefficients
            .iter()
            .zip(values.iter())
            .fold(T::zero(), |sum, (&c, &psi)| sum + c * psi)
    }
}

impl<T: Real> ExpansionAlgebra<T> for HermiteChaos<T> {
    fn size(&self) -> usize {
        self.order + 1
    }

    fn embed_constant(&self, output: &mut [T], value: T) {
        output.fill(T::zero());
        output[0] = value;
    }

    fn mean(&self, coefficients: &[T]) -> T {
        coefficients[0]
    }

    fn multiply_into(&self, output: &mut [T], a: &[T], b: &[T]) {
        let n = self.size();
        for k in 0..n {
            let mut sum = T::zero();
            for i in 0..n {
                for j in 0..n {
                    sum += a[i] * b[j] * self.triple_product(i, j, k);
                }
            }
            output[k] = sum / self.norms[k];
        }
    }

    /// Solves $b c = a$ for $c$. A singular system yields NaN coefficients.
    fn divide_into(&self, output: &mut [T], a: &[T], b: &[T]) {
        let n = self.size();
        let system = DMatrix::from_fn(n, n, |k, j| {
            let mut sum = T::zero();
            for i in 0..n {
                sum += b[i] * self.triple_product(i, j, k);
            }
            sum / self.norms[k]
        });
        let rhs = DVector::from_column_slice(a);
        match system.lu().solve(&rhs) {
            Some(solution) => output.copy_from_slice(solution.as_slice()),
            None => output.fill(T::zero() / T::zero()),
        }
    }

    fn apply_into(&self, output: &mut [T], a: &[T], f: &dyn Fn(T) -> T) {
        let a = DVector::from_column_slice(a);
        let values_at_points = &self.basis_at_points * a;
        output.fill(T::zero());
        for (q, &w) in self.quadrature_weights.iter().enumerate() {
            let f_q = f(values_at_points[q]);
            for (k, o) in output.iter_mut().enumerate() {
                *o += w * f_q * self.basis_at_points[(q, k)];
            }
        }
        for (o, &norm) in output.iter_mut().zip(&self.norms) {
            *o /= norm;
        }
    }
}

/// Evaluates $He_0(x), \dots, He_{n-1}(x)$ by the three-term recurrence
/// $He_{k+1} = x He_k - k He_{k-1}$.
fn hermite_polynomials<T: Real>(x: T, n: usize) -> DVector<T> {
    let mut values = DVector::zeros(n);
    if n > 0 {
        values[0] = T::one();
    }
    if n > 1 {
        values[1] = x;
    }
    for k in 1..n.saturating_sub(1) {
        let k_t: T = nalgebra::convert(k as f64);
        values[k + 1] = x * values[k] - k_t * values[k - 1];
    }
    values
}

/// Gauss-Hermite points and weights for the standard normal density (weights sum to one),
/// computed with the Golub-Welsch algorithm.
#[replace_float_literals(nalgebra::convert::<f64, T>(literal))]
fn gauss_hermite<T: Real>(num_points: usize) -> (Vec<T>, Vec<T>) {
    let jacobi = DMatrix::from_fn(num_points, num_points, |i, j| {
        if i + 1 == j || j + 1 == i {
            let k = i.max(j);
            nalgebra::convert::<f64, T>(k as f64).sqrt()
        } else {
            0.0
        }
    });
    let eigen = SymmetricEigen::new(jacobi);
    let mut pairs: Vec<(T, T)> = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            let v0 = eigen.eigenvectors[(0, i)];
            (x, v0 * v0)
        })
        .collect();
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    pairs.into_iter().unzip()
}
