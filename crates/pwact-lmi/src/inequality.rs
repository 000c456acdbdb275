#![forbid(unsafe_code)]

//! Construction of the Lyapunov matrix-inequality system for a PWA or
//! PWADI model.
//!
//! The builder classifies the equilibrium point, verifies the algebraic
//! equilibrium equation for every region claiming it, and emits one
//! constraint per region: the plain decrease inequality
//! `Q*M + M'*Q + alpha*Q < 0` for regions containing the equilibrium,
//! and a 2x2 block inequality with an S-procedure slack term for the
//! rest. All region data is shifted so the equilibrium sits at the
//! origin; with `xcl = 0` the shift is the identity.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use pwact_model::{AffineDynamics, ApproximationKind, ModelError, PwaSystem, RegionClassifier};

use crate::certificate::ControllerGain;

/// Convex (gains fixed) versus bilinear (gains solved jointly with Q).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InequalityKind {
    Linear,
    Bilinear,
}

/// Shape of the Lyapunov function family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LyapunovStructure {
    Global,
    PiecewiseQuadratic,
}

/// One point of the method cross product swept during analysis or
/// synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodCombination {
    pub approximation: ApproximationKind,
    pub inequality: InequalityKind,
    pub lyapunov: LyapunovStructure,
}

/// Where the per-region gains come from. A single builder handles the
/// open-loop/closed-loop duality through this variant instead of
/// branching logic spread through the constraint assembly.
#[derive(Debug, Clone, PartialEq)]
pub enum GainSource {
    /// Open-loop analysis: every gain fixed at zero.
    FixedZero,
    /// Analysis of an externally supplied closed loop.
    FixedExternal(Vec<ControllerGain>),
    /// Synthesis: gains are unknowns of the feasibility problem.
    Unknown,
}

/// S-procedure slack data for a region that does not contain the
/// equilibrium, already shifted to equilibrium coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum SlackForm {
    /// `E' * Z * E` blocks with Z elementwise nonnegative.
    Polytopic {
        e_mat: DMatrix<f64>,
        e_vec: DVector<f64>,
    },
    /// `mu * EL' * EL` blocks with mu strictly negative.
    Ellipsoidal {
        el_mat: DMatrix<f64>,
        el_vec: DVector<f64>,
    },
}

/// One region's constraint: the (shifted) dynamics envelopes sharing the
/// region's gain, plus the slack form when the region does not contain
/// the equilibrium.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionConstraint {
    pub region: usize,
    pub contains_equilibrium: bool,
    /// Shifted dynamics; one entry for PWA, two for PWADI envelopes.
    pub envelopes: Vec<AffineDynamics>,
    pub slack: Option<SlackForm>,
}

/// Continuity-of-control equality over a shared boundary `(first,
/// second)`: `(M_first - M_second) * F = 0` and `(b_first - b_second)
/// . f = 0`. When `normal` is present only the boundary-normal
/// component of the first equality is constrained.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuityConstraint {
    pub first: usize,
    pub second: usize,
    pub f_mat: DMatrix<f64>,
    pub f_vec: DVector<f64>,
    pub normal: Option<DVector<f64>>,
}

/// An unknown of the feasibility problem, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownKind {
    /// The global Lyapunov matrix (`region: None`) or a per-region one.
    Lyapunov { region: Option<usize> },
    Gain { region: usize },
    Slack { region: usize },
}

/// The assembled feasibility problem handed to a [`crate::SolverAdapter`].
///
/// The positivity requirement on the Lyapunov family (`Q > 0` once
/// globally, or once per region for the piecewise-quadratic structure)
/// is implied by `method.lyapunov` rather than stored as an explicit
/// constraint; adapters must enforce it and certificates are checked
/// against it.
#[derive(Debug, Clone, PartialEq)]
pub struct InequalitySystem {
    pub state_dim: usize,
    pub input_dim: usize,
    pub alpha: f64,
    /// Equilibrium point in the original coordinates; constraint data is
    /// already shifted so this point sits at the origin.
    pub xcl: DVector<f64>,
    pub method: MethodCombination,
    /// Fixed per-region gains; `None` when gains are unknowns.
    pub gains: Option<Vec<ControllerGain>>,
    /// Seed hint for bilinear adapters (shifted coordinates). Ignored by
    /// convex adapters.
    pub seed_gains: Option<Vec<ControllerGain>>,
    pub constraints: Vec<RegionConstraint>,
    pub continuity: Vec<ContinuityConstraint>,
}

impl InequalitySystem {
    /// Bilinear iff the gains are unknowns of the problem.
    #[must_use]
    pub fn is_bilinear(&self) -> bool {
        self.gains.is_none()
    }

    #[must_use]
    pub fn region_count(&self) -> usize {
        self.constraints.len()
    }

    /// The unknown list: Q always; gains and slack multipliers only when
    /// gains were requested as unknowns.
    #[must_use]
    pub fn unknowns(&self) -> Vec<UnknownKind> {
        let mut unknowns = Vec::new();
        match self.method.lyapunov {
            LyapunovStructure::Global => unknowns.push(UnknownKind::Lyapunov { region: None }),
            LyapunovStructure::PiecewiseQuadratic => {
                for constraint in &self.constraints {
                    unknowns.push(UnknownKind::Lyapunov {
                        region: Some(constraint.region),
                    });
                }
            }
        }
        if self.is_bilinear() {
            for constraint in &self.constraints {
                unknowns.push(UnknownKind::Gain {
                    region: constraint.region,
                });
            }
            for constraint in &self.constraints {
                if constraint.slack.is_some() {
                    unknowns.push(UnknownKind::Slack {
                        region: constraint.region,
                    });
                }
            }
        }
        unknowns
    }

    /// A copy of this system with the gains pinned, turning a bilinear
    /// problem into the convex one a candidate adapter can verify.
    #[must_use]
    pub fn with_fixed_gains(&self, gains: Vec<ControllerGain>) -> Self {
        let mut fixed = self.clone();
        fixed.gains = Some(gains);
        fixed.method.inequality = InequalityKind::Linear;
        fixed
    }
}

/// Inputs to [`build_inequality_system`].
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    pub system: &'a PwaSystem,
    pub xcl: &'a DVector<f64>,
    pub alpha: f64,
    pub method: MethodCombination,
    pub gain_source: GainSource,
    /// Emit continuity-of-control equalities for every boundary link.
    /// Always on for piecewise-quadratic Lyapunov structure.
    pub continuity: bool,
    /// Constrain only the boundary-normal component of the gain
    /// mismatch.
    pub normal_direction_only: bool,
}

/// Build the matrix-inequality system for one method combination.
///
/// Fails with a [`ModelError`] (a configuration error) when the model
/// does not validate, the equilibrium point is outside every region, or
/// a containing region violates the algebraic equilibrium equation.
pub fn build_inequality_system(
    request: &BuildRequest<'_>,
) -> Result<InequalitySystem, ModelError> {
    let system = request.system;
    system.validate()?;

    let n = system.state_dim;
    let m = system.input_dim;
    let xcl = request.xcl;
    if xcl.len() != n {
        return Err(ModelError::EquilibriumDimension {
            expected: n,
            actual: xcl.len(),
        });
    }

    // The polytopic predicate is authoritative for locating the
    // equilibrium, regardless of the approximation used for slack.
    let classifier = RegionClassifier::new(system, ApproximationKind::Polytopic);
    let containing = classifier.classify(xcl);
    if containing.is_empty() {
        return Err(ModelError::EquilibriumOutsideModel);
    }
    for &region in &containing {
        system.equilibrium_input(region, xcl)?;
    }

    let gains = resolve_gains(&request.gain_source, request.method.inequality, system, xcl)?;

    let mut constraints = Vec::with_capacity(system.len());
    for (i, region) in system.regions.iter().enumerate() {
        let contains_equilibrium = containing.binary_search(&i).is_ok();
        let envelopes = region
            .dynamics
            .envelopes()
            .iter()
            .map(|dynamics| AffineDynamics {
                a: dynamics.a.clone(),
                f: &dynamics.a * xcl + &dynamics.f,
                b: dynamics.b.clone(),
            })
            .collect();
        let slack = if contains_equilibrium {
            None
        } else {
            Some(match request.method.approximation {
                ApproximationKind::Polytopic => SlackForm::Polytopic {
                    e_mat: region.polytope.e_mat.clone(),
                    e_vec: &region.polytope.e_mat * xcl + &region.polytope.e_vec,
                },
                ApproximationKind::Ellipsoidal => {
                    let ellipsoid = region
                        .ellipsoid
                        .as_ref()
                        .ok_or(ModelError::MissingEllipsoid { region: i })?;
                    SlackForm::Ellipsoidal {
                        el_mat: ellipsoid.el_mat.clone(),
                        el_vec: &ellipsoid.el_mat * xcl + &ellipsoid.el_vec,
                    }
                }
            })
        };
        constraints.push(RegionConstraint {
            region: i,
            contains_equilibrium,
            envelopes,
            slack,
        });
    }

    let continuity_requested = request.continuity
        || request.method.lyapunov == LyapunovStructure::PiecewiseQuadratic;
    let continuity = if continuity_requested {
        system
            .boundary_links
            .iter()
            .map(|link| ContinuityConstraint {
                first: link.first,
                second: link.second,
                f_mat: link.f_mat.clone(),
                f_vec: link.f_vec.clone(),
                normal: request
                    .normal_direction_only
                    .then(|| boundary_normal(&link.f_mat)),
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok(InequalitySystem {
        state_dim: n,
        input_dim: m,
        alpha: request.alpha,
        xcl: xcl.clone(),
        method: request.method,
        gains,
        seed_gains: None,
        constraints,
        continuity,
    })
}

fn resolve_gains(
    source: &GainSource,
    inequality: InequalityKind,
    system: &PwaSystem,
    xcl: &DVector<f64>,
) -> Result<Option<Vec<ControllerGain>>, ModelError> {
    match (source, inequality) {
        (GainSource::Unknown, InequalityKind::Bilinear) => Ok(None),
        (GainSource::Unknown, InequalityKind::Linear) => Err(ModelError::GainTable {
            message: "unknown gains require the bilinear inequality form".into(),
        }),
        (_, InequalityKind::Bilinear) => Err(ModelError::GainTable {
            message: "fixed gains yield a linear inequality form".into(),
        }),
        (GainSource::FixedZero, InequalityKind::Linear) => Ok(Some(
            (0..system.len())
                .map(|_| ControllerGain::zero(system.state_dim, system.input_dim))
                .collect(),
        )),
        (GainSource::FixedExternal(table), InequalityKind::Linear) => {
            if table.len() != system.len() {
                return Err(ModelError::GainTable {
                    message: format!(
                        "table has {} entries for {} regions",
                        table.len(),
                        system.len()
                    ),
                });
            }
            for (i, gain) in table.iter().enumerate() {
                if gain.feedback.nrows() != system.input_dim
                    || gain.feedback.ncols() != system.state_dim
                    || gain.offset.len() != system.input_dim
                {
                    return Err(ModelError::GainTable {
                        message: format!("entry {i} has inconsistent shape"),
                    });
                }
            }
            // External tables describe the runtime law u = K*x + k; in
            // equilibrium coordinates the offset becomes K*xcl + k.
            Ok(Some(
                table
                    .iter()
                    .map(|gain| {
                        ControllerGain::new(
                            gain.feedback.clone(),
                            &gain.feedback * xcl + &gain.offset,
                        )
                    })
                    .collect(),
            ))
        }
    }
}

/// Unit normal of the boundary spanned by the columns of `F`: the
/// eigenvector of `F * F'` with the smallest eigenvalue.
fn boundary_normal(f_mat: &DMatrix<f64>) -> DVector<f64> {
    let n = f_mat.nrows();
    if n == 1 {
        return DVector::from_element(1, 1.0);
    }
    let gram = f_mat * f_mat.transpose();
    let eigen = gram.symmetric_eigen();
    let mut min_index = 0;
    for (i, value) in eigen.eigenvalues.iter().enumerate() {
        if *value < eigen.eigenvalues[min_index] {
            min_index = i;
        }
    }
    let normal = eigen.eigenvectors.column(min_index).clone_owned();
    let norm = normal.norm();
    if norm > 0.0 { normal / norm } else { normal }
}
