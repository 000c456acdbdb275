#![forbid(unsafe_code)]

//! Point-in-region classification.
//!
//! [`RegionClassifier`] is a pure, reentrant view over an immutable
//! [`PwaSystem`]: a linear scan over the regions with no interior state,
//! safe to share across concurrent simulation instances. `classify`
//! returns the full matching set (boundary points may match several
//! regions); `select` applies the deterministic smallest-index tie-break
//! and its `None` is the designated "state left the modeled domain"
//! signal.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::system::PwaSystem;

/// Which containment predicate drives classification.
///
/// When both predicates are configured downstream, polytopic containment
/// is authoritative: the polytope is exact while the ellipsoid is an
/// approximation of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApproximationKind {
    Polytopic,
    Ellipsoidal,
}

/// Classifier over one system and one containment rule.
#[derive(Debug, Clone, Copy)]
pub struct RegionClassifier<'a> {
    system: &'a PwaSystem,
    rule: ApproximationKind,
}

impl<'a> RegionClassifier<'a> {
    #[must_use]
    pub fn new(system: &'a PwaSystem, rule: ApproximationKind) -> Self {
        Self { system, rule }
    }

    #[must_use]
    pub const fn rule(&self) -> ApproximationKind {
        self.rule
    }

    /// All region indices containing `x`, in ascending order.
    ///
    /// Polytopic rule: every row of `E*x + e` is `>= 0` (boundary
    /// inclusive). Ellipsoidal rule: `||EL*x + eL|| < 1` (strict);
    /// regions without ellipsoid data never match under this rule.
    #[must_use]
    pub fn classify(&self, x: &DVector<f64>) -> Vec<usize> {
        self.system
            .regions
            .iter()
            .enumerate()
            .filter(|(_, region)| match self.rule {
                ApproximationKind::Polytopic => region.polytope.contains(x),
                ApproximationKind::Ellipsoidal => {
                    region.ellipsoid.as_ref().is_some_and(|el| el.contains(x))
                }
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Smallest matching region index, or `None` when `x` lies outside
    /// every region.
    #[must_use]
    pub fn select(&self, x: &DVector<f64>) -> Option<usize> {
        self.system.regions.iter().position(|region| match self.rule {
            ApproximationKind::Polytopic => region.polytope.contains(x),
            ApproximationKind::Ellipsoidal => {
                region.ellipsoid.as_ref().is_some_and(|el| el.contains(x))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{AffineDynamics, Ellipsoid, Polytope, Region, RegionDynamics};
    use nalgebra::DMatrix;

    fn region_halfline(sign: f64) -> Region {
        Region::new(
            Polytope::new(DMatrix::from_row_slice(1, 1, &[sign]), DVector::zeros(1)),
            RegionDynamics::Affine(AffineDynamics::linear(
                DMatrix::from_row_slice(1, 1, &[-1.0]),
                1,
            )),
        )
    }

    fn line_system() -> PwaSystem {
        // region 0: x >= 0, region 1: x <= 0; shared boundary at x = 0
        PwaSystem::new(vec![region_halfline(1.0), region_halfline(-1.0)], 1, 1)
    }

    // 1. Interior points match exactly one region
    #[test]
    fn test_classify_interior_single_match() {
        let system = line_system();
        let classifier = RegionClassifier::new(&system, ApproximationKind::Polytopic);
        assert_eq!(classifier.classify(&DVector::from_element(1, 2.0)), vec![0]);
        assert_eq!(classifier.classify(&DVector::from_element(1, -2.0)), vec![1]);
    }

    // 2. Shared boundary matches both regions; select picks the smaller index
    #[test]
    fn test_classify_boundary_tie_break() {
        let system = line_system();
        let classifier = RegionClassifier::new(&system, ApproximationKind::Polytopic);
        let x = DVector::zeros(1);
        assert_eq!(classifier.classify(&x), vec![0, 1]);
        assert_eq!(classifier.select(&x), Some(0));
    }

    // 3. Point outside every region: empty set, select None
    #[test]
    fn test_classify_outside_returns_none() {
        // single bounded region 0 <= x <= 1
        let region = Region::new(
            Polytope::new(
                DMatrix::from_row_slice(2, 1, &[1.0, -1.0]),
                DVector::from_row_slice(&[0.0, 1.0]),
            ),
            RegionDynamics::Affine(AffineDynamics::linear(
                DMatrix::from_row_slice(1, 1, &[-1.0]),
                1,
            )),
        );
        let system = PwaSystem::new(vec![region], 1, 1);
        let classifier = RegionClassifier::new(&system, ApproximationKind::Polytopic);
        let x = DVector::from_element(1, 2.0);
        assert!(classifier.classify(&x).is_empty());
        assert_eq!(classifier.select(&x), None);
    }

    // 4. Ellipsoidal rule: strict boundary, regions without data never match
    #[test]
    fn test_classify_ellipsoidal_rule() {
        let mut system = line_system();
        system.regions[0].ellipsoid = Some(Ellipsoid::new(
            DMatrix::from_row_slice(1, 1, &[0.5]),
            DVector::zeros(1),
        ));
        let classifier = RegionClassifier::new(&system, ApproximationKind::Ellipsoidal);
        // |0.5 * 1.5| = 0.75 < 1: inside region 0; region 1 has no ellipsoid
        assert_eq!(classifier.classify(&DVector::from_element(1, 1.5)), vec![0]);
        // |0.5 * 2.0| = 1.0: boundary excluded
        assert_eq!(classifier.select(&DVector::from_element(1, 2.0)), None);
    }

    // 5. classify is idempotent over unchanged data
    #[test]
    fn test_classify_idempotent() {
        let system = line_system();
        let classifier = RegionClassifier::new(&system, ApproximationKind::Polytopic);
        let x = DVector::from_element(1, 0.25);
        assert_eq!(classifier.classify(&x), classifier.classify(&x));
    }
}
