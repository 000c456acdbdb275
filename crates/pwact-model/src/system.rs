#![forbid(unsafe_code)]

//! Piecewise-affine system container and validation.
//!
//! [`PwaSystem`] is a pure data holder: an index-addressed vector of
//! [`Region`] records plus the state/input dimensions and an optional
//! equilibrium point. [`PwaSystem::validate`] checks every region's
//! shapes against `(n, m)` before any downstream work; validation
//! failures are configuration errors and abort the run.

use nalgebra::{DMatrix, DVector, SVD};
use thiserror::Error;

use crate::region::Region;

/// Relative residual bound for the algebraic equilibrium equation
/// `A*xcl + f + B*u_eq = 0`.
pub const EQUILIBRIUM_TOL: f64 = 1e-7;

/// Model-level configuration errors. All of these are fatal and are
/// raised before any inequality is built or solved.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("model must contain at least one region")]
    EmptyModel,
    #[error("region {region}: invalid {field} shape: {message}")]
    ShapeMismatch {
        region: usize,
        field: &'static str,
        message: String,
    },
    #[error("region {region}: non-finite entry in {field}")]
    NonFiniteEntry { region: usize, field: &'static str },
    #[error("region {region}: mixing plain affine and envelope dynamics in one model")]
    MixedDynamicsKind { region: usize },
    #[error("boundary link ({first}, {second}): {message}")]
    InvalidBoundaryLink {
        first: usize,
        second: usize,
        message: String,
    },
    #[error("equilibrium point has length {actual}, expected {expected}")]
    EquilibriumDimension { expected: usize, actual: usize },
    #[error("equilibrium point is not contained in any region")]
    EquilibriumOutsideModel,
    #[error("region {region}: equilibrium equation violated (residual {residual:.3e})")]
    EquilibriumViolation { region: usize, residual: f64 },
    #[error("region {region}: ellipsoidal approximation requested but no ellipsoid data present")]
    MissingEllipsoid { region: usize },
    #[error("invalid external gain table: {message}")]
    GainTable { message: String },
}

/// Which family of region dynamics a system carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemKind {
    /// One affine dynamics block per region.
    Pwa,
    /// Two affine envelopes per region bounding the true dynamics.
    Pwadi,
}

/// Parametrization of the shared boundary of an ordered adjacent region
/// pair `(first, second)`: boundary points are `F*s + f` for a parameter
/// `s` in the (n-1)-dimensional boundary space. Consumed only when
/// continuity-of-control constraints are requested.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryLink {
    pub first: usize,
    pub second: usize,
    /// n x (n-1) span of the boundary.
    pub f_mat: DMatrix<f64>,
    /// Base point, length n.
    pub f_vec: DVector<f64>,
}

/// An ordered collection of regions with shared dimensions and an
/// optional equilibrium point. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PwaSystem {
    pub regions: Vec<Region>,
    pub state_dim: usize,
    pub input_dim: usize,
    pub equilibrium: Option<DVector<f64>>,
    pub boundary_links: Vec<BoundaryLink>,
}

impl PwaSystem {
    #[must_use]
    pub fn new(regions: Vec<Region>, state_dim: usize, input_dim: usize) -> Self {
        Self {
            regions,
            state_dim,
            input_dim,
            equilibrium: None,
            boundary_links: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_equilibrium(mut self, xcl: DVector<f64>) -> Self {
        self.equilibrium = Some(xcl);
        self
    }

    #[must_use]
    pub fn with_boundary_links(mut self, links: Vec<BoundaryLink>) -> Self {
        self.boundary_links = links;
        self
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    #[must_use]
    pub fn region(&self, index: usize) -> &Region {
        &self.regions[index]
    }

    /// PWA or PWADI, derived from the first region. Validation rejects
    /// models that mix both kinds.
    #[must_use]
    pub fn kind(&self) -> SystemKind {
        match self.regions.first().map(|r| r.dynamics.is_envelope()) {
            Some(true) => SystemKind::Pwadi,
            _ => SystemKind::Pwa,
        }
    }

    /// Check every region's shapes against `(state_dim, input_dim)`,
    /// homogeneity of the dynamics kind, finiteness of all entries, and
    /// boundary-link shapes.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.regions.is_empty() {
            return Err(ModelError::EmptyModel);
        }
        let n = self.state_dim;
        let m = self.input_dim;
        let envelope_kind = self.regions[0].dynamics.is_envelope();

        for (i, region) in self.regions.iter().enumerate() {
            let poly = &region.polytope;
            if poly.e_mat.ncols() != n {
                return Err(shape(i, "E", n, poly.e_mat.ncols(), "columns"));
            }
            if poly.e_vec.len() != poly.e_mat.nrows() {
                return Err(shape(i, "e", poly.e_mat.nrows(), poly.e_vec.len(), "rows"));
            }
            check_finite(i, "E", poly.e_mat.iter())?;
            check_finite(i, "e", poly.e_vec.iter())?;

            if let Some(el) = &region.ellipsoid {
                if el.el_mat.ncols() != n {
                    return Err(shape(i, "EL", n, el.el_mat.ncols(), "columns"));
                }
                if el.el_vec.len() != el.el_mat.nrows() {
                    return Err(shape(i, "eL", el.el_mat.nrows(), el.el_vec.len(), "rows"));
                }
                check_finite(i, "EL", el.el_mat.iter())?;
                check_finite(i, "eL", el.el_vec.iter())?;
            }

            if region.dynamics.is_envelope() != envelope_kind {
                return Err(ModelError::MixedDynamicsKind { region: i });
            }
            for dynamics in region.dynamics.envelopes() {
                if dynamics.a.nrows() != n || dynamics.a.ncols() != n {
                    return Err(shape(i, "A", n, dynamics.a.nrows(), "rows/columns"));
                }
                if dynamics.f.len() != n {
                    return Err(shape(i, "f", n, dynamics.f.len(), "rows"));
                }
                if dynamics.b.nrows() != n || dynamics.b.ncols() != m {
                    return Err(shape(i, "B", n, dynamics.b.nrows(), "rows/columns"));
                }
                check_finite(i, "A", dynamics.a.iter())?;
                check_finite(i, "f", dynamics.f.iter())?;
                check_finite(i, "B", dynamics.b.iter())?;
            }
        }

        for link in &self.boundary_links {
            if link.first >= self.regions.len() || link.second >= self.regions.len() {
                return Err(ModelError::InvalidBoundaryLink {
                    first: link.first,
                    second: link.second,
                    message: "region index out of range".into(),
                });
            }
            if link.first == link.second {
                return Err(ModelError::InvalidBoundaryLink {
                    first: link.first,
                    second: link.second,
                    message: "a region cannot be adjacent to itself".into(),
                });
            }
            let expected_cols = n.saturating_sub(1);
            if link.f_mat.nrows() != n || link.f_mat.ncols() != expected_cols {
                return Err(ModelError::InvalidBoundaryLink {
                    first: link.first,
                    second: link.second,
                    message: format!(
                        "F has shape {}x{}, expected {}x{}",
                        link.f_mat.nrows(),
                        link.f_mat.ncols(),
                        n,
                        expected_cols
                    ),
                });
            }
            if link.f_vec.len() != n {
                return Err(ModelError::InvalidBoundaryLink {
                    first: link.first,
                    second: link.second,
                    message: format!("f has length {}, expected {}", link.f_vec.len(), n),
                });
            }
        }

        if let Some(xcl) = &self.equilibrium
            && xcl.len() != n
        {
            return Err(ModelError::EquilibriumDimension {
                expected: n,
                actual: xcl.len(),
            });
        }

        Ok(())
    }

    /// Least-squares equilibrium input for a region claimed to contain
    /// `xcl`: the `u_eq` minimizing `||A*xcl + f + B*u_eq||`, accepted
    /// when the residual is below [`EQUILIBRIUM_TOL`] (relative). For a
    /// PWADI region both envelopes must admit an equilibrium input; the
    /// first envelope's input is returned.
    pub fn equilibrium_input(
        &self,
        region: usize,
        xcl: &DVector<f64>,
    ) -> Result<DVector<f64>, ModelError> {
        let mut first_input = None;
        for dynamics in self.regions[region].dynamics.envelopes() {
            let drift = &dynamics.a * xcl + &dynamics.f;
            let u_eq = if self.input_dim == 0 || dynamics.b.iter().all(|v| *v == 0.0) {
                DVector::zeros(self.input_dim)
            } else {
                let svd = SVD::new(dynamics.b.clone(), true, true);
                svd.solve(&(-&drift), 1e-12)
                    .map(|u| DVector::from_column_slice(u.as_slice()))
                    .unwrap_or_else(|_| DVector::zeros(self.input_dim))
            };
            let residual = (&dynamics.b * &u_eq + &drift).norm();
            if residual > EQUILIBRIUM_TOL * (1.0 + drift.norm()) {
                return Err(ModelError::EquilibriumViolation { region, residual });
            }
            first_input.get_or_insert(u_eq);
        }
        Ok(first_input.unwrap_or_else(|| DVector::zeros(self.input_dim)))
    }
}

fn shape(
    region: usize,
    field: &'static str,
    expected: usize,
    actual: usize,
    axis: &str,
) -> ModelError {
    ModelError::ShapeMismatch {
        region,
        field,
        message: format!("{axis}: expected {expected}, got {actual}"),
    }
}

fn check_finite<'a>(
    region: usize,
    field: &'static str,
    mut values: impl Iterator<Item = &'a f64>,
) -> Result<(), ModelError> {
    if values.all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ModelError::NonFiniteEntry { region, field })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{AffineDynamics, Polytope, RegionDynamics};

    fn scalar_region(sign: f64, a: f64) -> Region {
        // sign = +1: x >= 0; sign = -1: x <= 0
        Region::new(
            Polytope::new(DMatrix::from_row_slice(1, 1, &[sign]), DVector::zeros(1)),
            RegionDynamics::Affine(AffineDynamics::linear(
                DMatrix::from_row_slice(1, 1, &[a]),
                1,
            )),
        )
    }

    fn two_region_line() -> PwaSystem {
        PwaSystem::new(vec![scalar_region(1.0, -1.0), scalar_region(-1.0, -2.0)], 1, 1)
            .with_equilibrium(DVector::zeros(1))
    }

    // 1. Valid two-region model passes validation
    #[test]
    fn test_system_validate_two_region_ok() {
        assert_eq!(two_region_line().validate(), Ok(()));
    }

    // 2. Empty model rejected
    #[test]
    fn test_system_validate_empty_model() {
        let system = PwaSystem::new(Vec::new(), 1, 1);
        assert_eq!(system.validate(), Err(ModelError::EmptyModel));
    }

    // 3. Wrong E width rejected
    #[test]
    fn test_system_validate_polytope_shape_mismatch() {
        let mut system = two_region_line();
        system.regions[1].polytope.e_mat = DMatrix::zeros(1, 2);
        let err = system.validate().expect_err("shape mismatch must fail");
        assert!(matches!(
            err,
            ModelError::ShapeMismatch {
                region: 1,
                field: "E",
                ..
            }
        ));
    }

    // 4. Non-finite dynamics entry rejected
    #[test]
    fn test_system_validate_non_finite_entry() {
        let mut system = two_region_line();
        if let RegionDynamics::Affine(d) = &mut system.regions[0].dynamics {
            d.a[(0, 0)] = f64::NAN;
        }
        assert_eq!(
            system.validate(),
            Err(ModelError::NonFiniteEntry {
                region: 0,
                field: "A"
            })
        );
    }

    // 5. Mixing affine and envelope dynamics rejected
    #[test]
    fn test_system_validate_mixed_dynamics_kind() {
        let mut system = two_region_line();
        let d = AffineDynamics::linear(DMatrix::from_row_slice(1, 1, &[-1.0]), 1);
        system.regions[1].dynamics = RegionDynamics::Envelope([d.clone(), d]);
        assert_eq!(
            system.validate(),
            Err(ModelError::MixedDynamicsKind { region: 1 })
        );
    }

    // 6. Boundary link referencing a missing region rejected
    #[test]
    fn test_system_validate_boundary_link_out_of_range() {
        let system = two_region_line().with_boundary_links(vec![BoundaryLink {
            first: 0,
            second: 7,
            f_mat: DMatrix::zeros(1, 0),
            f_vec: DVector::zeros(1),
        }]);
        assert!(matches!(
            system.validate(),
            Err(ModelError::InvalidBoundaryLink { second: 7, .. })
        ));
    }

    // 7. Equilibrium dimension mismatch rejected
    #[test]
    fn test_system_validate_equilibrium_dimension() {
        let system = two_region_line().with_equilibrium(DVector::zeros(3));
        assert_eq!(
            system.validate(),
            Err(ModelError::EquilibriumDimension {
                expected: 1,
                actual: 3
            })
        );
    }

    // 8. Equilibrium input for a drift-free region is zero
    #[test]
    fn test_system_equilibrium_input_drift_free() {
        let system = two_region_line();
        let u = system
            .equilibrium_input(0, &DVector::zeros(1))
            .expect("x=0 is an equilibrium of x_dot = -x");
        assert_eq!(u, DVector::zeros(1));
    }

    // 9. Equilibrium violation detected when B cannot cancel the drift
    #[test]
    fn test_system_equilibrium_input_violation() {
        let mut system = two_region_line();
        if let RegionDynamics::Affine(d) = &mut system.regions[0].dynamics {
            d.f[0] = 1.0; // x_dot = -x + 1, B = 0: no equilibrium at x = 0
            d.b = DMatrix::zeros(1, 1);
        }
        let err = system
            .equilibrium_input(0, &DVector::zeros(1))
            .expect_err("uncancellable drift must fail");
        assert!(matches!(err, ModelError::EquilibriumViolation { region: 0, .. }));
    }

    // 10. Equilibrium input recovered when B can cancel the drift
    #[test]
    fn test_system_equilibrium_input_cancels_drift() {
        let mut system = two_region_line();
        if let RegionDynamics::Affine(d) = &mut system.regions[0].dynamics {
            d.f[0] = 3.0;
            d.b = DMatrix::from_row_slice(1, 1, &[2.0]);
        }
        let u = system
            .equilibrium_input(0, &DVector::zeros(1))
            .expect("u = -1.5 cancels the drift");
        assert!((u[0] + 1.5).abs() < 1e-10);
    }

    // 11. Kind derivation
    #[test]
    fn test_system_kind_derivation() {
        assert_eq!(two_region_line().kind(), SystemKind::Pwa);
        let d = AffineDynamics::linear(DMatrix::from_row_slice(1, 1, &[-1.0]), 1);
        let envelope = Region::new(
            Polytope::new(DMatrix::from_row_slice(1, 1, &[1.0]), DVector::zeros(1)),
            RegionDynamics::Envelope([d.clone(), d]),
        );
        let system = PwaSystem::new(vec![envelope], 1, 1);
        assert_eq!(system.kind(), SystemKind::Pwadi);
    }
}
