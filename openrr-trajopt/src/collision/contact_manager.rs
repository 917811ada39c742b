use std::collections::HashMap;

use k::nalgebra as na;

use super::contact::ContactResultVector;
use crate::errors::*;

/// Link name to pose in the world frame
pub type LinkTransforms = HashMap<String, na::Isometry3<f64>>;

/// Reports contacts of a set of active links at one configuration
pub trait DiscreteContactManager {
    /// Only pairs with at least one active object are checked
    fn set_active_collision_objects(&mut self, names: &[String]);
    fn active_collision_objects(&self) -> &[String];
    /// Pairs farther than this are not reported
    fn set_contact_distance_threshold(&mut self, distance: f64);
    fn contact_distance_threshold(&self) -> f64;
    /// Every contact closer than the threshold
    ///
    /// `transforms` must contain the pose of every link of the robot.
    fn contact_test(&mut self, transforms: &LinkTransforms) -> Result<ContactResultVector>;
}

/// Reports contacts of active links swept between two configurations
pub trait ContinuousContactManager {
    fn set_active_collision_objects(&mut self, names: &[String]);
    fn active_collision_objects(&self) -> &[String];
    fn set_contact_distance_threshold(&mut self, distance: f64);
    fn contact_distance_threshold(&self) -> f64;
    /// Active links move from `transforms0` to `transforms1`, the others
    /// stay at `transforms0`.
    fn contact_test(
        &mut self,
        transforms0: &LinkTransforms,
        transforms1: &LinkTransforms,
    ) -> Result<ContactResultVector>;
}

/// Source of the contact managers of a scene
pub trait Environment {
    /// A fresh manager, with no active object
    fn discrete_contact_manager(&self) -> Box<dyn DiscreteContactManager>;
    fn continuous_contact_manager(&self) -> Box<dyn ContinuousContactManager>;
    /// Names of all links and obstacles
    fn collision_object_names(&self) -> Vec<String>;
}
