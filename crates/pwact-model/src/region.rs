#![forbid(unsafe_code)]

//! Region records: containment predicates and per-region affine dynamics.
//!
//! A region is addressed by its position in the owning system's region
//! vector; that index is the stable key used by the inequality builder,
//! the synthesis sweep, and the runtime feedback block alike.

use nalgebra::{DMatrix, DVector};

/// One affine dynamics block: `x_dot = A*x + f + B*u` on the owning region.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineDynamics {
    /// State matrix, n x n.
    pub a: DMatrix<f64>,
    /// Affine drift, length n.
    pub f: DVector<f64>,
    /// Input matrix, n x m.
    pub b: DMatrix<f64>,
}

impl AffineDynamics {
    #[must_use]
    pub fn new(a: DMatrix<f64>, f: DVector<f64>, b: DMatrix<f64>) -> Self {
        Self { a, f, b }
    }

    /// Drift-free linear dynamics with a zero input matrix.
    #[must_use]
    pub fn linear(a: DMatrix<f64>, input_dim: usize) -> Self {
        let n = a.nrows();
        Self {
            f: DVector::zeros(n),
            b: DMatrix::zeros(n, input_dim),
            a,
        }
    }
}

/// Polytopic containment predicate: `x` is inside iff `E*x + e >= 0`
/// elementwise. The boundary is inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct Polytope {
    /// Half-plane normals, p x n.
    pub e_mat: DMatrix<f64>,
    /// Half-plane offsets, length p.
    pub e_vec: DVector<f64>,
}

impl Polytope {
    #[must_use]
    pub fn new(e_mat: DMatrix<f64>, e_vec: DVector<f64>) -> Self {
        Self { e_mat, e_vec }
    }

    /// Boundary-inclusive membership test.
    #[must_use]
    pub fn contains(&self, x: &DVector<f64>) -> bool {
        let residual = &self.e_mat * x + &self.e_vec;
        residual.iter().all(|v| *v >= 0.0)
    }

    /// Number of half-planes.
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.e_mat.nrows()
    }
}

/// Ellipsoidal containment predicate: `x` is inside iff
/// `||EL*x + eL|| < 1`. Strict on purpose: degenerate (slab) ellipsoids
/// touch their boundary everywhere, so the boundary is excluded.
#[derive(Debug, Clone, PartialEq)]
pub struct Ellipsoid {
    /// Shape matrix, q x n.
    pub el_mat: DMatrix<f64>,
    /// Center offset, length q.
    pub el_vec: DVector<f64>,
}

impl Ellipsoid {
    #[must_use]
    pub fn new(el_mat: DMatrix<f64>, el_vec: DVector<f64>) -> Self {
        Self { el_mat, el_vec }
    }

    /// Strict membership test.
    #[must_use]
    pub fn contains(&self, x: &DVector<f64>) -> bool {
        (&self.el_mat * x + &self.el_vec).norm() < 1.0
    }
}

/// Dynamics attached to a region: a single affine block for a PWA model,
/// or a pair of affine envelopes bounding the true nonlinear dynamics for
/// a PWADI model. Both envelopes share the region's feedback gain.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionDynamics {
    Affine(AffineDynamics),
    Envelope([AffineDynamics; 2]),
}

impl RegionDynamics {
    /// The dynamics blocks as a slice (length 1 or 2).
    #[must_use]
    pub fn envelopes(&self) -> &[AffineDynamics] {
        match self {
            Self::Affine(dynamics) => std::slice::from_ref(dynamics),
            Self::Envelope(pair) => pair.as_slice(),
        }
    }

    /// `true` for the PWADI envelope form.
    #[must_use]
    pub fn is_envelope(&self) -> bool {
        matches!(self, Self::Envelope(_))
    }
}

/// One region record: containment predicates plus dynamics.
///
/// Regions may overlap only at shared boundaries by construction;
/// classification treats boundary inclusion as ties and resolves them
/// with the smallest-index rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub polytope: Polytope,
    pub ellipsoid: Option<Ellipsoid>,
    pub dynamics: RegionDynamics,
}

impl Region {
    #[must_use]
    pub fn new(polytope: Polytope, dynamics: RegionDynamics) -> Self {
        Self {
            polytope,
            ellipsoid: None,
            dynamics,
        }
    }

    #[must_use]
    pub fn with_ellipsoid(mut self, ellipsoid: Ellipsoid) -> Self {
        self.ellipsoid = Some(ellipsoid);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half_line() -> Polytope {
        // x >= 0
        Polytope::new(DMatrix::from_row_slice(1, 1, &[1.0]), DVector::zeros(1))
    }

    // 1. Polytope boundary is inclusive
    #[test]
    fn test_region_polytope_boundary_inclusive() {
        let p = half_line();
        assert!(p.contains(&DVector::from_element(1, 0.0)));
        assert!(p.contains(&DVector::from_element(1, 2.5)));
        assert!(!p.contains(&DVector::from_element(1, -1e-12)));
    }

    // 2. Ellipsoid boundary is strict
    #[test]
    fn test_region_ellipsoid_boundary_strict() {
        // unit interval (-1, 1): ||1*x + 0|| < 1
        let el = Ellipsoid::new(DMatrix::from_row_slice(1, 1, &[1.0]), DVector::zeros(1));
        assert!(el.contains(&DVector::from_element(1, 0.0)));
        assert!(!el.contains(&DVector::from_element(1, 1.0)));
        assert!(!el.contains(&DVector::from_element(1, -1.0)));
    }

    // 3. Envelope slice has two entries, affine has one
    #[test]
    fn test_region_dynamics_envelope_count() {
        let d = AffineDynamics::linear(DMatrix::from_row_slice(1, 1, &[-1.0]), 1);
        assert_eq!(RegionDynamics::Affine(d.clone()).envelopes().len(), 1);
        let env = RegionDynamics::Envelope([d.clone(), d]);
        assert_eq!(env.envelopes().len(), 2);
        assert!(env.is_envelope());
    }

    // 4. Multi-face polytope requires every face
    #[test]
    fn test_region_polytope_all_faces_required() {
        // 0 <= x <= 1 as {x >= 0, -x + 1 >= 0}
        let p = Polytope::new(
            DMatrix::from_row_slice(2, 1, &[1.0, -1.0]),
            DVector::from_row_slice(&[0.0, 1.0]),
        );
        assert_eq!(p.face_count(), 2);
        assert!(p.contains(&DVector::from_element(1, 0.5)));
        assert!(p.contains(&DVector::from_element(1, 1.0)));
        assert!(!p.contains(&DVector::from_element(1, 1.5)));
    }
}
