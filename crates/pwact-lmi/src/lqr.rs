#![forbid(unsafe_code)]

//! LQR gain via Newton-Kleinman iteration.
//!
//! Each iterate solves one Lyapunov equation, so the whole routine stays
//! on the dense direct path of [`crate::lyap`]. The iteration needs a
//! stabilizing starting gain: zero when the plant is already Hurwitz,
//! otherwise a scanned multiple of `B'` (output damping). Plants that
//! neither start point stabilizes are reported as numerical failures;
//! the synthesis sweep treats that like any other solver failure.

use nalgebra::{Cholesky, DMatrix};

use crate::lyap::{is_hurwitz, is_positive_definite, solve_lyapunov};
use crate::solver::SolverError;

const MAX_ITERATIONS: usize = 60;
const CONVERGENCE_TOL: f64 = 1e-10;
const DAMPING_SCAN: [f64; 5] = [0.1, 1.0, 10.0, 100.0, 1000.0];

/// Solve the continuous-time LQR problem for `(A, B)` with weights
/// `(Q, R)`, returning the gain `K` of the stabilizing law `u = -K*x`.
pub fn lqr_gain(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    q_weight: &DMatrix<f64>,
    r_weight: &DMatrix<f64>,
) -> Result<DMatrix<f64>, SolverError> {
    let n = a.nrows();
    let m = b.ncols();
    if a.ncols() != n || b.nrows() != n || q_weight.shape() != (n, n) || r_weight.shape() != (m, m)
    {
        return Err(SolverError::Numerical(
            "LQR weight shapes do not match the plant".into(),
        ));
    }
    let r_chol = Cholesky::new(r_weight.clone())
        .ok_or_else(|| SolverError::Numerical("R weight is not positive definite".into()))?;

    let mut k = stabilizing_start(a, b)?;
    for _ in 0..MAX_ITERATIONS {
        let a_cl = a - b * &k;
        let rhs = -(q_weight + k.transpose() * r_weight * &k);
        let p = solve_lyapunov(&a_cl, &rhs).ok_or_else(|| {
            SolverError::Numerical("Lyapunov equation singular in the Newton-Kleinman step".into())
        })?;
        if !is_positive_definite(&p) {
            return Err(SolverError::Numerical(
                "Newton-Kleinman iterate lost positive definiteness".into(),
            ));
        }
        let k_next = r_chol.solve(&(b.transpose() * &p));
        let delta = (&k_next - &k).norm();
        k = k_next;
        if delta <= CONVERGENCE_TOL * (1.0 + k.norm()) {
            return Ok(k);
        }
    }
    Err(SolverError::Numerical(
        "Newton-Kleinman iteration did not converge".into(),
    ))
}

fn stabilizing_start(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>, SolverError> {
    if is_hurwitz(a) {
        return Ok(DMatrix::zeros(b.ncols(), a.nrows()));
    }
    for scale in DAMPING_SCAN {
        let candidate = b.transpose() * scale;
        if is_hurwitz(&(a - b * &candidate)) {
            return Ok(candidate);
        }
    }
    Err(SolverError::Numerical(
        "no stabilizing initial gain found for the Newton-Kleinman iteration".into(),
    ))
}
