use k::nalgebra as na;
use ncollide3d::shape::SupportMap;

use super::contact::ContinuousCollisionType;

/// Relative tolerance to decide whether a contact is at one end of a motion
const CC_TIME_TOLERANCE: f64 = 1e-3;

/// Convex hull of a shape at the start and at the end of a motion
///
/// The hull is expressed in the frame of the shape at the start.
pub struct CastHullShape<'a> {
    shape: &'a dyn SupportMap<f64>,
    shape_to_end: na::Isometry3<f64>,
}

impl<'a> CastHullShape<'a> {
    /// `shape_to_end` is the pose at the end in the frame of the start pose
    pub fn new(shape: &'a dyn SupportMap<f64>, shape_to_end: na::Isometry3<f64>) -> Self {
        Self {
            shape,
            shape_to_end,
        }
    }

    /// Decide when along the motion the shape touches `point`
    ///
    /// `point` and `normal` are in the frame of the start pose, `normal`
    /// pointing from this shape to the other one. The returned time is in
    /// `[0, 1]`.
    pub fn contact_time(
        &self,
        point: &na::Point3<f64>,
        normal: &na::Vector3<f64>,
    ) -> (ContinuousCollisionType, f64) {
        let support0 = self.shape.local_support_point(normal);
        let support1 = self.shape.support_point(&self.shape_to_end, normal);
        let dot0 = normal.dot(&support0.coords);
        let dot1 = normal.dot(&support1.coords);
        let tolerance = CC_TIME_TOLERANCE * (support1 - support0).norm().max(1.0);
        if dot0 - dot1 > tolerance {
            (ContinuousCollisionType::Time0, 0.0)
        } else if dot1 - dot0 > tolerance {
            (ContinuousCollisionType::Time1, 1.0)
        } else {
            let l0 = (point - support0).norm();
            let l1 = (point - support1).norm();
            let time = if l0 + l1 > f64::EPSILON {
                l0 / (l0 + l1)
            } else {
                0.5
            };
            (ContinuousCollisionType::Between, time)
        }
    }
}

impl std::fmt::Debug for CastHullShape<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CastHullShape")
            .field("shape_to_end", &self.shape_to_end)
            .finish_non_exhaustive()
    }
}

impl SupportMap<f64> for CastHullShape<'_> {
    fn local_support_point(&self, dir: &na::Vector3<f64>) -> na::Point3<f64> {
        let support0 = self.shape.local_support_point(dir);
        let support1 = self.shape.support_point(&self.shape_to_end, dir);
        if dir.dot(&support1.coords) > dir.dot(&support0.coords) {
            support1
        } else {
            support0
        }
    }
}
