#![forbid(unsafe_code)]

//! Feasibility certificates and per-region affine gains.

use nalgebra::{DMatrix, DVector};

use crate::lyap::is_positive_definite;

/// Per-region affine control law `u = K*x + k`, stored as the pair and
/// exposed in aggregated form `Kbar = [K k]` acting on `[x; 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerGain {
    /// Feedback matrix K, m x n.
    pub feedback: DMatrix<f64>,
    /// Affine offset k, length m.
    pub offset: DVector<f64>,
}

impl ControllerGain {
    #[must_use]
    pub fn new(feedback: DMatrix<f64>, offset: DVector<f64>) -> Self {
        Self { feedback, offset }
    }

    /// The zero gain (open loop).
    #[must_use]
    pub fn zero(state_dim: usize, input_dim: usize) -> Self {
        Self {
            feedback: DMatrix::zeros(input_dim, state_dim),
            offset: DVector::zeros(input_dim),
        }
    }

    /// Aggregated gain `[K k]`, m x (n+1).
    #[must_use]
    pub fn aggregated(&self) -> DMatrix<f64> {
        let m = self.feedback.nrows();
        let n = self.feedback.ncols();
        let mut kbar = DMatrix::zeros(m, n + 1);
        kbar.view_mut((0, 0), (m, n)).copy_from(&self.feedback);
        kbar.view_mut((0, n), (m, 1)).copy_from(&self.offset);
        kbar
    }

    /// Evaluate the control law at a state.
    #[must_use]
    pub fn control(&self, x: &DVector<f64>) -> DVector<f64> {
        &self.feedback * x + &self.offset
    }
}

/// Lyapunov matrix family: one global `Q` or one per region.
#[derive(Debug, Clone, PartialEq)]
pub enum LyapunovCertificate {
    Global(DMatrix<f64>),
    PiecewiseQuadratic(Vec<DMatrix<f64>>),
}

impl LyapunovCertificate {
    /// The Lyapunov matrix governing `region`.
    #[must_use]
    pub fn for_region(&self, region: usize) -> &DMatrix<f64> {
        match self {
            Self::Global(q) => q,
            Self::PiecewiseQuadratic(qs) => &qs[region],
        }
    }

    fn matrices(&self) -> &[DMatrix<f64>] {
        match self {
            Self::Global(q) => std::slice::from_ref(q),
            Self::PiecewiseQuadratic(qs) => qs.as_slice(),
        }
    }
}

/// S-procedure multiplier attached to one region's constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionMultiplier {
    /// Region contains the equilibrium: no slack term.
    Equilibrium,
    /// Elementwise-nonnegative slack matrix Z.
    Polytopic(DMatrix<f64>),
    /// Strictly negative scalar multiplier mu.
    Ellipsoidal(f64),
}

/// A converged feasibility certificate: the Lyapunov family, the fixed
/// decay rate, one multiplier per region, and the synthesized gains when
/// the solve carried unknown gains.
#[derive(Debug, Clone, PartialEq)]
pub struct Certificate {
    pub lyapunov: LyapunovCertificate,
    pub alpha: f64,
    pub multipliers: Vec<RegionMultiplier>,
    pub gains: Option<Vec<ControllerGain>>,
}

impl Certificate {
    /// Check the structural invariants of a converged certificate:
    /// every Lyapunov matrix symmetric positive definite, `alpha > 0`,
    /// polytopic slacks elementwise nonnegative, ellipsoidal multipliers
    /// strictly negative, one multiplier (and one gain when gains are
    /// present) per region.
    #[must_use]
    pub fn is_well_formed(&self, region_count: usize) -> bool {
        if self.alpha <= 0.0 {
            return false;
        }
        if let LyapunovCertificate::PiecewiseQuadratic(qs) = &self.lyapunov
            && qs.len() != region_count
        {
            return false;
        }
        let symmetric_pd = self.lyapunov.matrices().iter().all(|q| {
            let symmetric = (q - q.transpose()).norm() <= 1e-9 * (1.0 + q.norm());
            symmetric && is_positive_definite(q)
        });
        if !symmetric_pd {
            return false;
        }
        if self.multipliers.len() != region_count {
            return false;
        }
        let multipliers_ok = self.multipliers.iter().all(|mult| match mult {
            RegionMultiplier::Equilibrium => true,
            RegionMultiplier::Polytopic(z) => z.iter().all(|v| *v >= 0.0),
            RegionMultiplier::Ellipsoidal(mu) => *mu < 0.0,
        });
        if !multipliers_ok {
            return false;
        }
        match &self.gains {
            Some(gains) => gains.len() == region_count,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_certificate(q: f64, alpha: f64) -> Certificate {
        Certificate {
            lyapunov: LyapunovCertificate::Global(DMatrix::from_row_slice(1, 1, &[q])),
            alpha,
            multipliers: vec![RegionMultiplier::Equilibrium],
            gains: None,
        }
    }

    // 1. Aggregated gain stacks [K k]
    #[test]
    fn test_certificate_gain_aggregated() {
        let gain = ControllerGain::new(
            DMatrix::from_row_slice(1, 2, &[2.0, 3.0]),
            DVector::from_row_slice(&[5.0]),
        );
        let kbar = gain.aggregated();
        assert_eq!(kbar.shape(), (1, 3));
        assert_eq!(kbar[(0, 0)], 2.0);
        assert_eq!(kbar[(0, 2)], 5.0);
        let u = gain.control(&DVector::from_row_slice(&[1.0, -1.0]));
        assert_eq!(u[0], 2.0 - 3.0 + 5.0);
    }

    // 2. Well-formed certificate accepted
    #[test]
    fn test_certificate_well_formed_scalar() {
        assert!(scalar_certificate(0.5, 0.1).is_well_formed(1));
    }

    // 3. Non-positive alpha rejected
    #[test]
    fn test_certificate_rejects_nonpositive_alpha() {
        assert!(!scalar_certificate(0.5, 0.0).is_well_formed(1));
    }

    // 4. Indefinite Lyapunov matrix rejected
    #[test]
    fn test_certificate_rejects_indefinite_q() {
        assert!(!scalar_certificate(-0.5, 0.1).is_well_formed(1));
    }

    // 5. Multiplier sign rules
    #[test]
    fn test_certificate_multiplier_signs() {
        let mut cert = scalar_certificate(1.0, 0.1);
        cert.multipliers = vec![RegionMultiplier::Ellipsoidal(-2.0)];
        assert!(cert.is_well_formed(1));
        cert.multipliers = vec![RegionMultiplier::Ellipsoidal(0.5)];
        assert!(!cert.is_well_formed(1));
        cert.multipliers = vec![RegionMultiplier::Polytopic(DMatrix::from_row_slice(
            1,
            1,
            &[-0.1],
        ))];
        assert!(!cert.is_well_formed(1));
    }

    // 6. Gain count must match the region count
    #[test]
    fn test_certificate_gain_count() {
        let mut cert = scalar_certificate(1.0, 0.1);
        cert.gains = Some(vec![ControllerGain::zero(1, 1), ControllerGain::zero(1, 1)]);
        assert!(!cert.is_well_formed(1));
        cert.gains = Some(vec![ControllerGain::zero(1, 1)]);
        assert!(cert.is_well_formed(1));
    }
}
