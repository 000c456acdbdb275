#![forbid(unsafe_code)]

//! Dense Lyapunov-equation and definiteness helpers.
//!
//! Everything here operates on small dense matrices (region dynamics are
//! a handful of states), so the Lyapunov equation is solved directly via
//! Kronecker vectorization and LU rather than a Bartels-Stewart sweep.

use nalgebra::{DMatrix, DVector, LU};

/// Solve the continuous Lyapunov equation `M' * Q + Q * M = RHS` for a
/// symmetric `Q`. Returns `None` when the Kronecker system is singular
/// (eigenvalue pairs of `M` summing to zero) or the inputs are not
/// square/conformant.
#[must_use]
pub fn solve_lyapunov(m: &DMatrix<f64>, rhs: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let n = m.nrows();
    if m.ncols() != n || rhs.nrows() != n || rhs.ncols() != n {
        return None;
    }
    let mt = m.transpose();
    let identity = DMatrix::<f64>::identity(n, n);
    // vec(M'Q) = (I (x) M') vec(Q); vec(QM) = (M' (x) I) vec(Q)
    let operator = identity.kronecker(&mt) + mt.kronecker(&identity);
    let rhs_vec = DVector::from_iterator(n * n, rhs.iter().copied());
    let solution = LU::new(operator).solve(&rhs_vec)?;
    let q = DMatrix::from_iterator(n, n, solution.iter().copied());
    let q = (&q + q.transpose()) * 0.5;
    q.iter().all(|v| v.is_finite()).then_some(q)
}

/// Strict positive definiteness via Cholesky.
#[must_use]
pub fn is_positive_definite(q: &DMatrix<f64>) -> bool {
    q.is_square() && nalgebra::Cholesky::new(q.clone()).is_some()
}

/// Largest eigenvalue of a symmetric matrix.
#[must_use]
pub fn max_symmetric_eigenvalue(s: &DMatrix<f64>) -> f64 {
    s.symmetric_eigenvalues()
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max)
}

/// `true` when every eigenvalue of `a` has strictly negative real part.
#[must_use]
pub fn is_hurwitz(a: &DMatrix<f64>) -> bool {
    a.complex_eigenvalues().iter().all(|lambda| lambda.re < 0.0)
}

/// Largest real part over the spectrum of `a`.
#[must_use]
pub fn spectral_abscissa(a: &DMatrix<f64>) -> f64 {
    a.complex_eigenvalues()
        .iter()
        .map(|lambda| lambda.re)
        .fold(f64::NEG_INFINITY, f64::max)
}
