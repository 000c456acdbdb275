#![forbid(unsafe_code)]

//! Reference feasibility adapters.
//!
//! These are candidate-and-verify checkers, not general SDP/BMI solvers:
//! a Lyapunov-equation candidate for `Q`, a one-parameter grid search
//! for each region's S-procedure multiplier, and an eigenvalue test on
//! every assembled block. `Feasible` always comes with a verified
//! certificate; `Infeasible` is conservative except for a single linear
//! region, where the Lyapunov-equation test is exact.

use nalgebra::{DMatrix, DVector, SVD};

use pwact_model::{AffineDynamics, PwaSystem};

use crate::certificate::{Certificate, ControllerGain, LyapunovCertificate, RegionMultiplier};
use crate::inequality::{InequalitySystem, LyapunovStructure, RegionConstraint, SlackForm};
use crate::lqr::lqr_gain;
use crate::lyap::{is_positive_definite, max_symmetric_eigenvalue, solve_lyapunov};
use crate::solver::{SolveOutcome, SolverAdapter, SolverError};

/// Log-spaced magnitudes scanned for slack multipliers.
const SLACK_EXPONENTS: std::ops::RangeInclusive<i32> = -6..=6;

/// Convex-path reference adapter.
#[derive(Debug, Clone)]
pub struct LyapunovCandidateSolver {
    /// Strictness margin for the eigenvalue tests.
    pub definiteness_tol: f64,
    /// Tolerance for continuity-of-control equalities.
    pub continuity_tol: f64,
}

impl Default for LyapunovCandidateSolver {
    fn default() -> Self {
        Self {
            definiteness_tol: 1e-9,
            continuity_tol: 1e-7,
        }
    }
}

impl SolverAdapter for LyapunovCandidateSolver {
    fn solve(&mut self, system: &InequalitySystem) -> Result<SolveOutcome, SolverError> {
        let Some(gains) = &system.gains else {
            return Err(SolverError::Unsupported(
                "bilinear system dispatched to the convex adapter",
            ));
        };
        if !self.continuity_holds(system, gains) {
            return Ok(SolveOutcome::Infeasible);
        }
        let lyapunov = match system.method.lyapunov {
            LyapunovStructure::Global => self.global_candidates(system, gains),
            LyapunovStructure::PiecewiseQuadratic => self.piecewise_candidates(system, gains),
        };
        match lyapunov {
            Some((family, multipliers)) => Ok(SolveOutcome::Feasible(Box::new(Certificate {
                lyapunov: family,
                alpha: system.alpha,
                multipliers,
                gains: None,
            }))),
            None => Ok(SolveOutcome::Infeasible),
        }
    }
}

impl LyapunovCandidateSolver {
    /// Candidate `Q` matrices for the global structure: the Lyapunov
    /// solution for the mean equilibrium-region closed loop, then for
    /// each equilibrium-region envelope individually.
    fn global_candidates(
        &self,
        system: &InequalitySystem,
        gains: &[ControllerGain],
    ) -> Option<(LyapunovCertificate, Vec<RegionMultiplier>)> {
        let n = system.state_dim;
        let shift = DMatrix::<f64>::identity(n, n) * (system.alpha / 2.0);
        let mut decayed = Vec::new();
        for constraint in &system.constraints {
            if !constraint.contains_equilibrium {
                continue;
            }
            for envelope in &constraint.envelopes {
                decayed.push(closed_loop(envelope, &gains[constraint.region]) + &shift);
            }
        }
        if decayed.is_empty() {
            return None;
        }
        let mean = decayed.iter().fold(DMatrix::zeros(n, n), |acc, m| acc + m)
            / decayed.len() as f64;
        let mut candidates = vec![mean];
        candidates.extend(decayed);

        for candidate in &candidates {
            let Some(q) = solve_lyapunov(candidate, &(-DMatrix::<f64>::identity(n, n))) else {
                continue;
            };
            if !is_positive_definite(&q) {
                continue;
            }
            if let Some(multipliers) = self.verify_regions(system, gains, |_| &q) {
                return Some((LyapunovCertificate::Global(q), multipliers));
            }
        }
        None
    }

    /// Per-region candidates for the piecewise-quadratic structure: each
    /// region gets the Lyapunov solution of one of its own envelopes.
    fn piecewise_candidates(
        &self,
        system: &InequalitySystem,
        gains: &[ControllerGain],
    ) -> Option<(LyapunovCertificate, Vec<RegionMultiplier>)> {
        let n = system.state_dim;
        let shift = DMatrix::<f64>::identity(n, n) * (system.alpha / 2.0);
        let mut family = Vec::with_capacity(system.constraints.len());
        let mut multipliers = Vec::with_capacity(system.constraints.len());
        for constraint in &system.constraints {
            let mut found = None;
            for envelope in &constraint.envelopes {
                let decayed = closed_loop(envelope, &gains[constraint.region]) + &shift;
                let Some(q) = solve_lyapunov(&decayed, &(-DMatrix::<f64>::identity(n, n))) else {
                    continue;
                };
                if !is_positive_definite(&q) {
                    continue;
                }
                if let Some(multiplier) = self.verify_region(constraint, gains, &q, system.alpha) {
                    found = Some((q, multiplier));
                    break;
                }
            }
            let (q, multiplier) = found?;
            family.push(q);
            multipliers.push(multiplier);
        }
        Some((LyapunovCertificate::PiecewiseQuadratic(family), multipliers))
    }

    /// Verify every region constraint against a Lyapunov family given as
    /// a region-indexed lookup. Returns the multipliers on success.
    fn verify_regions<'q>(
        &self,
        system: &InequalitySystem,
        gains: &[ControllerGain],
        q_for: impl Fn(usize) -> &'q DMatrix<f64>,
    ) -> Option<Vec<RegionMultiplier>> {
        let mut multipliers = Vec::with_capacity(system.constraints.len());
        for constraint in &system.constraints {
            let q = q_for(constraint.region);
            multipliers.push(self.verify_region(constraint, gains, q, system.alpha)?);
        }
        Some(multipliers)
    }

    /// Verify one region constraint, searching for its multiplier when
    /// the region does not contain the equilibrium.
    fn verify_region(
        &self,
        constraint: &RegionConstraint,
        gains: &[ControllerGain],
        q: &DMatrix<f64>,
        alpha: f64,
    ) -> Option<RegionMultiplier> {
        let gain = &gains[constraint.region];
        match &constraint.slack {
            None => {
                for envelope in &constraint.envelopes {
                    let m = closed_loop(envelope, gain);
                    let s = m.transpose() * q + q * &m + q * alpha;
                    if max_symmetric_eigenvalue(&s) >= -self.definiteness_tol {
                        return None;
                    }
                }
                Some(RegionMultiplier::Equilibrium)
            }
            Some(SlackForm::Ellipsoidal { el_mat, el_vec }) => {
                self.search_ellipsoidal(constraint, gain, q, alpha, el_mat, el_vec)
            }
            Some(SlackForm::Polytopic { e_mat, e_vec }) => {
                self.search_polytopic(constraint, gain, q, alpha, e_mat, e_vec)
            }
        }
    }

    fn search_ellipsoidal(
        &self,
        constraint: &RegionConstraint,
        gain: &ControllerGain,
        q: &DMatrix<f64>,
        alpha: f64,
        el_mat: &DMatrix<f64>,
        el_vec: &DVector<f64>,
    ) -> Option<RegionMultiplier> {
        let gram = el_mat.transpose() * el_mat;
        let cross = el_mat.transpose() * el_vec;
        let tail = 1.0 - el_vec.dot(el_vec);
        for exponent in SLACK_EXPONENTS {
            let mu = -(10.0_f64).powi(exponent);
            let ok = constraint.envelopes.iter().all(|envelope| {
                let block = self.augmented_block(
                    envelope,
                    gain,
                    q,
                    alpha,
                    &(&gram * mu),
                    &(&cross * mu),
                    -mu * tail,
                );
                max_symmetric_eigenvalue(&block) < -self.definiteness_tol
            });
            if ok {
                return Some(RegionMultiplier::Ellipsoidal(mu));
            }
        }
        None
    }

    fn search_polytopic(
        &self,
        constraint: &RegionConstraint,
        gain: &ControllerGain,
        q: &DMatrix<f64>,
        alpha: f64,
        e_mat: &DMatrix<f64>,
        e_vec: &DVector<f64>,
    ) -> Option<RegionMultiplier> {
        // Mixed-sign rank-two family: Z(t) = t*(w+ w-' + w- w+') keeps
        // every entry nonnegative while making e' Z e negative, which the
        // (2,2) block needs. Regions whose shifted offsets have a single
        // sign stay out of reach of this family and come back infeasible.
        let w_plus = e_vec.map(|v| v.max(0.0));
        let w_minus = e_vec.map(|v| (-v).max(0.0));
        if w_plus.norm() == 0.0 || w_minus.norm() == 0.0 {
            return None;
        }
        let base = &w_plus * w_minus.transpose() + &w_minus * w_plus.transpose();
        for exponent in SLACK_EXPONENTS {
            let t = (10.0_f64).powi(exponent);
            let z = &base * t;
            let gram = e_mat.transpose() * &z * e_mat;
            let cross = e_mat.transpose() * &z * e_vec;
            let tail = (e_vec.transpose() * &z * e_vec)[(0, 0)];
            let ok = constraint.envelopes.iter().all(|envelope| {
                let block = self.augmented_block(envelope, gain, q, alpha, &gram, &cross, tail);
                max_symmetric_eigenvalue(&block) < -self.definiteness_tol
            });
            if ok {
                return Some(RegionMultiplier::Polytopic(z));
            }
        }
        None
    }

    /// Assemble the 2x2 block inequality for one envelope:
    /// `[[S + G11, Q*b + g12], [(Q*b + g12)', g22]]` with
    /// `S = M'Q + QM + alpha*Q` and `b` the shifted closed-loop drift.
    #[allow(clippy::too_many_arguments)]
    fn augmented_block(
        &self,
        envelope: &AffineDynamics,
        gain: &ControllerGain,
        q: &DMatrix<f64>,
        alpha: f64,
        g11: &DMatrix<f64>,
        g12: &DVector<f64>,
        g22: f64,
    ) -> DMatrix<f64> {
        let n = q.nrows();
        let m = closed_loop(envelope, gain);
        let s = m.transpose() * q + q * &m + q * alpha;
        let drift = &envelope.f + &envelope.b * &gain.offset;
        let cross = q * drift + g12;
        let mut block = DMatrix::zeros(n + 1, n + 1);
        block.view_mut((0, 0), (n, n)).copy_from(&(s + g11));
        block.view_mut((0, n), (n, 1)).copy_from(&cross);
        block.view_mut((n, 0), (1, n)).copy_from(&cross.transpose());
        block[(n, n)] = g22;
        block
    }

    /// Continuity-of-control equalities, checked against the fixed gains.
    fn continuity_holds(&self, system: &InequalitySystem, gains: &[ControllerGain]) -> bool {
        system.continuity.iter().all(|link| {
            let first = &system.constraints[link.first];
            let second = &system.constraints[link.second];
            first
                .envelopes
                .iter()
                .zip(second.envelopes.iter())
                .all(|(env_i, env_h)| {
                    let m_i = closed_loop(env_i, &gains[link.first]);
                    let m_h = closed_loop(env_h, &gains[link.second]);
                    let delta_m = (m_i - m_h) * &link.f_mat;
                    let gain_match = match &link.normal {
                        Some(normal) => max_abs(&(normal.transpose() * delta_m)),
                        None => max_abs(&delta_m),
                    };
                    let b_i = &env_i.f + &env_i.b * &gains[link.first].offset;
                    let b_h = &env_h.f + &env_h.b * &gains[link.second].offset;
                    let drift_match = (b_i - b_h).dot(&link.f_vec).abs();
                    gain_match <= self.continuity_tol && drift_match <= self.continuity_tol
                })
        })
    }
}

/// Bilinear-path reference adapter: seed the gains by LQR on each
/// region's dynamics, pin them, and hand the resulting convex system to
/// [`LyapunovCandidateSolver`]. Seed sensitivity is the reason the
/// synthesis sweep retries with re-randomized weights.
#[derive(Debug, Clone, Default)]
pub struct SeededAlternationSolver {
    pub inner: LyapunovCandidateSolver,
}

impl SolverAdapter for SeededAlternationSolver {
    fn solve(&mut self, system: &InequalitySystem) -> Result<SolveOutcome, SolverError> {
        if !system.is_bilinear() {
            return Err(SolverError::Unsupported(
                "linear system dispatched to the bilinear adapter",
            ));
        }
        let seeds = match &system.seed_gains {
            Some(seeds) => seeds.clone(),
            None => {
                let q = DMatrix::identity(system.state_dim, system.state_dim);
                let r = DMatrix::identity(system.input_dim, system.input_dim);
                seed_gains_for(system, &q, &r)
            }
        };
        let pinned = system.with_fixed_gains(seeds.clone());
        match self.inner.solve(&pinned)? {
            SolveOutcome::Feasible(mut certificate) => {
                certificate.gains = Some(seeds);
                Ok(SolveOutcome::Feasible(certificate))
            }
            SolveOutcome::Infeasible => Ok(SolveOutcome::Infeasible),
        }
    }
}

/// Seed gains for every region of a built system, in the builder's
/// shifted coordinates.
#[must_use]
pub fn seed_gains_for(
    system: &InequalitySystem,
    q_weight: &DMatrix<f64>,
    r_weight: &DMatrix<f64>,
) -> Vec<ControllerGain> {
    system
        .constraints
        .iter()
        .map(|constraint| {
            let envelope = &constraint.envelopes[0];
            seed_gain(envelope, q_weight, r_weight)
        })
        .collect()
}

/// Seed gains for every region of a model before any system is built.
/// Dynamics are shifted so the equilibrium sits at the origin, matching
/// [`crate::build_inequality_system`].
#[must_use]
pub fn seed_gain_table(
    system: &PwaSystem,
    xcl: &DVector<f64>,
    q_weight: &DMatrix<f64>,
    r_weight: &DMatrix<f64>,
) -> Vec<ControllerGain> {
    system
        .regions
        .iter()
        .map(|region| {
            let dynamics = &region.dynamics.envelopes()[0];
            let shifted = AffineDynamics {
                a: dynamics.a.clone(),
                f: &dynamics.a * xcl + &dynamics.f,
                b: dynamics.b.clone(),
            };
            seed_gain(&shifted, q_weight, r_weight)
        })
        .collect()
}

fn seed_gain(
    envelope: &AffineDynamics,
    q_weight: &DMatrix<f64>,
    r_weight: &DMatrix<f64>,
) -> ControllerGain {
    let n = envelope.a.nrows();
    let m = envelope.b.ncols();
    if m == 0 || envelope.b.iter().all(|v| *v == 0.0) {
        return ControllerGain::zero(n, m);
    }
    // M = A + B*K, so the stabilizing LQR law u = -Kx enters negated.
    let feedback = match lqr_gain(&envelope.a, &envelope.b, q_weight, r_weight) {
        Ok(k) => -k,
        Err(_) => DMatrix::zeros(m, n),
    };
    // Offset chosen to cancel the shifted drift where the input can.
    let offset = SVD::new(envelope.b.clone(), true, true)
        .solve(&(-&envelope.f), 1e-12)
        .map(|u| DVector::from_column_slice(u.as_slice()))
        .unwrap_or_else(|_| DVector::zeros(m));
    ControllerGain::new(feedback, offset)
}

fn closed_loop(envelope: &AffineDynamics, gain: &ControllerGain) -> DMatrix<f64> {
    &envelope.a + &envelope.b * &gain.feedback
}

/// Largest absolute entry; zero for matrices with no entries (the
/// degenerate n = 1 boundary has an empty span).
fn max_abs<R: nalgebra::Dim, C: nalgebra::Dim, S>(matrix: &nalgebra::Matrix<f64, R, C, S>) -> f64
where
    S: nalgebra::storage::Storage<f64, R, C>,
{
    matrix.iter().fold(0.0, |acc, v| acc.max(v.abs()))
}
