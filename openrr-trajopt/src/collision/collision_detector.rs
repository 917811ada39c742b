/*
Copyright 2017 Takashi Ogura

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/
use std::{collections::HashSet, path::Path};

use indexmap::IndexMap;
use k::nalgebra as na;
use ncollide3d::{
    query,
    shape::{Compound, ShapeHandle},
};
use tracing::{debug, trace};

use super::{
    cast_hull::CastHullShape,
    contact::{ContactResult, ContactResultVector},
    contact_manager::{ContinuousContactManager, DiscreteContactManager, Environment, LinkTransforms},
    urdf::{k_link_geometry_to_shape_handle, urdf_geometry_to_shape_handle},
};
use crate::errors::*;

type NameShapeMap = IndexMap<String, Vec<(ShapeHandle<f64>, na::Isometry3<f64>)>>;

/// A named set of shapes at a pose in the world frame
struct CollisionObject<'a> {
    name: &'a str,
    shapes: &'a [(ShapeHandle<f64>, na::Isometry3<f64>)],
    pose0: na::Isometry3<f64>,
    pose1: na::Isometry3<f64>,
    active: bool,
}

/// Collision scene made of robot links and static obstacles
///
/// Robot links are moved by the transforms given to the contact managers,
/// obstacles never move.
#[derive(Clone)]
pub struct CollisionDetector {
    /// link name -> shapes with their poses in the link frame
    name_collision_model_map: NameShapeMap,
    /// obstacle name -> shapes with their poses in the world frame
    obstacles: NameShapeMap,
    allowed_collision_pairs: HashSet<(String, String)>,
}

impl std::fmt::Debug for CollisionDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionDetector")
            .field("links", &self.name_collision_model_map.keys())
            .field("obstacles", &self.obstacles.keys())
            .field("allowed_collision_pairs", &self.allowed_collision_pairs)
            .finish()
    }
}

impl Default for CollisionDetector {
    fn default() -> Self {
        Self::new(NameShapeMap::new())
    }
}

impl CollisionDetector {
    /// Create CollisionDetector from link shapes, without any obstacle
    pub fn new(name_collision_model_map: NameShapeMap) -> Self {
        CollisionDetector {
            name_collision_model_map,
            obstacles: NameShapeMap::new(),
            allowed_collision_pairs: HashSet::new(),
        }
    }

    /// Create CollisionDetector from urdf_rs::Robot with base_dir support
    ///
    /// base_dir: mesh files are loaded from this dir if the path does not start with "package://"
    ///
    /// Links connected by a joint are never checked against each other.
    pub fn from_urdf_robot_with_base_dir(
        urdf_robot: &urdf_rs::Robot,
        base_dir: Option<&Path>,
    ) -> Self {
        let mut detector = Self::new(links_to_shape_map(&urdf_robot.links, base_dir));
        for joint in &urdf_robot.joints {
            detector.allow_collision(&joint.parent.link, &joint.child.link);
        }
        detector
    }

    /// Create CollisionDetector from k::Chain
    pub fn from_robot(robot: &k::Chain<f64>) -> Self {
        let mut name_collision_model_map = NameShapeMap::new();
        let mut adjacent_pairs = Vec::new();
        for node in robot.iter() {
            let link = match node.link().clone() {
                Some(v) => v,
                None => continue,
            };
            if let Some(parent) = node.parent() {
                if let Some(parent_link) = parent.link().clone() {
                    adjacent_pairs.push((parent_link.name, link.name.clone()));
                }
            }

            let col_pose_vec = link
                .collisions
                .iter()
                .filter_map(|c| {
                    k_link_geometry_to_shape_handle(&c.geometry).map(|col| (col, *c.origin()))
                })
                .collect::<Vec<_>>();

            debug!("name={}, ln={}", link.name, col_pose_vec.len());
            if !col_pose_vec.is_empty() {
                name_collision_model_map.insert(link.name, col_pose_vec);
            }
        }
        let mut detector = Self::new(name_collision_model_map);
        detector.allow_collision_pairs(&adjacent_pairs);
        detector
    }

    /// Add a static obstacle, `pose` is in the world frame
    pub fn add_obstacle(&mut self, name: &str, shape: ShapeHandle<f64>, pose: na::Isometry3<f64>) {
        self.obstacles
            .entry(name.to_owned())
            .or_default()
            .push((shape, pose));
    }

    /// Add all the shapes of a compound as one obstacle
    pub fn add_compound_obstacle(&mut self, name: &str, compound: &Compound<f64>) {
        for (pose, shape) in compound.shapes() {
            self.add_obstacle(name, shape.clone(), *pose);
        }
    }

    /// Add each `<link>` of an obstacle URDF as a named obstacle
    pub fn add_obstacles_from_urdf_robot(&mut self, urdf_obstacles: &urdf_rs::Robot) {
        for (name, shapes) in links_to_shape_map(&urdf_obstacles.links, None) {
            self.obstacles.entry(name).or_default().extend(shapes);
        }
    }

    /// The pair is never reported
    pub fn allow_collision(&mut self, name1: &str, name2: &str) {
        self.allowed_collision_pairs
            .insert((name1.to_owned(), name2.to_owned()));
        self.allowed_collision_pairs
            .insert((name2.to_owned(), name1.to_owned()));
    }

    pub fn allow_collision_pairs(&mut self, pairs: &[(String, String)]) {
        for (name1, name2) in pairs {
            self.allow_collision(name1, name2);
        }
    }

    pub fn is_collision_allowed(&self, name1: &str, name2: &str) -> bool {
        self.allowed_collision_pairs
            .contains(&(name1.to_owned(), name2.to_owned()))
    }

    /// Names of the robot links which have shapes
    pub fn link_names(&self) -> Vec<String> {
        self.name_collision_model_map.keys().cloned().collect()
    }

    pub fn obstacle_names(&self) -> Vec<String> {
        self.obstacles.keys().cloned().collect()
    }

    fn collision_objects<'a>(
        &'a self,
        active: &[String],
        transforms0: &LinkTransforms,
        transforms1: Option<&LinkTransforms>,
    ) -> Result<Vec<CollisionObject<'a>>> {
        let mut objects =
            Vec::with_capacity(self.name_collision_model_map.len() + self.obstacles.len());
        for (name, shapes) in &self.name_collision_model_map {
            let is_active = active.contains(name);
            let pose0 = *transforms0.get(name).ok_or_else(|| {
                Error::ContactManager(format!("no transform for link {name}"))
            })?;
            let pose1 = match transforms1 {
                Some(transforms1) if is_active => *transforms1.get(name).ok_or_else(|| {
                    Error::ContactManager(format!("no end transform for link {name}"))
                })?,
                _ => pose0,
            };
            objects.push(CollisionObject {
                name,
                shapes,
                pose0,
                pose1,
                active: is_active,
            });
        }
        for (name, shapes) in &self.obstacles {
            objects.push(CollisionObject {
                name,
                shapes,
                pose0: na::Isometry3::identity(),
                pose1: na::Isometry3::identity(),
                active: false,
            });
        }
        Ok(objects)
    }

    fn should_check(&self, object1: &CollisionObject<'_>, object2: &CollisionObject<'_>) -> bool {
        (object1.active || object2.active)
            && !self.is_collision_allowed(object1.name, object2.name)
    }

    /// All contacts closer than `threshold` at one configuration
    fn discrete_contacts(
        &self,
        active: &[String],
        threshold: f64,
        transforms: &LinkTransforms,
    ) -> Result<ContactResultVector> {
        let objects = self.collision_objects(active, transforms, None)?;
        let mut contacts = ContactResultVector::new();
        for (i, obj1) in objects.iter().enumerate() {
            for obj2 in &objects[i + 1..] {
                if !self.should_check(obj1, obj2) {
                    continue;
                }
                for (shape1, local1) in obj1.shapes {
                    for (shape2, local2) in obj2.shapes {
                        let pose1 = obj1.pose0 * local1;
                        let pose2 = obj2.pose0 * local2;
                        let contact = match query::contact(&pose1, &**shape1, &pose2, &**shape2, threshold) {
                            Some(contact) => contact,
                            None => continue,
                        };
                        let distance = -contact.depth;
                        if distance > threshold {
                            continue;
                        }
                        trace!("name: {}, name: {} dist={distance}", obj1.name, obj2.name);
                        contacts.push(ContactResult::new(
                            [obj1.name.to_owned(), obj2.name.to_owned()],
                            distance,
                            [contact.world1, contact.world2],
                            contact.normal.into_inner(),
                            [obj1.pose0, obj2.pose0],
                        ));
                    }
                }
            }
        }
        Ok(contacts)
    }

    /// All contacts closer than `threshold` to the volume swept by the
    /// active links between two configurations
    fn cast_contacts(
        &self,
        active: &[String],
        threshold: f64,
        transforms0: &LinkTransforms,
        transforms1: &LinkTransforms,
    ) -> Result<ContactResultVector> {
        let objects = self.collision_objects(active, transforms0, Some(transforms1))?;
        let mut contacts = ContactResultVector::new();
        for (i, obj1) in objects.iter().enumerate() {
            for obj2 in &objects[i + 1..] {
                if !self.should_check(obj1, obj2) {
                    continue;
                }
                for (shape1, local1) in obj1.shapes {
                    let (start1, hull1) = swept_shape(obj1, shape1, local1)?;
                    for (shape2, local2) in obj2.shapes {
                        let (start2, hull2) = swept_shape(obj2, shape2, local2)?;
                        let contact = match query::contact_support_map_support_map(
                            &start1, &hull1, &start2, &hull2, threshold,
                        ) {
                            Some(contact) => contact,
                            None => continue,
                        };
                        let distance = -contact.depth;
                        if distance > threshold {
                            continue;
                        }
                        trace!("name: {}, name: {} cast dist={distance}", obj1.name, obj2.name);
                        let normal = contact.normal.into_inner();
                        let mut result = ContactResult::new(
                            [obj1.name.to_owned(), obj2.name.to_owned()],
                            distance,
                            [contact.world1, contact.world2],
                            normal,
                            [obj1.pose0, obj2.pose0],
                        );
                        result.cc_transform = [obj1.pose1, obj2.pose1];
                        if obj1.active {
                            let (cc_type, cc_time) = hull1.contact_time(
                                &start1.inverse_transform_point(&contact.world1),
                                &start1.inverse_transform_vector(&normal),
                            );
                            result.cc_type[0] = cc_type;
                            result.cc_time[0] = cc_time;
                        }
                        if obj2.active {
                            let (cc_type, cc_time) = hull2.contact_time(
                                &start2.inverse_transform_point(&contact.world2),
                                &start2.inverse_transform_vector(&-normal),
                            );
                            result.cc_type[1] = cc_type;
                            result.cc_time[1] = cc_time;
                        }
                        contacts.push(result);
                    }
                }
            }
        }
        Ok(contacts)
    }
}

/// Start pose and swept hull of one shape of an object
///
/// Objects which do not move get a hull with no motion.
fn swept_shape<'a>(
    object: &CollisionObject<'_>,
    shape: &'a ShapeHandle<f64>,
    local: &na::Isometry3<f64>,
) -> Result<(na::Isometry3<f64>, CastHullShape<'a>)> {
    let support_map = shape
        .as_support_map()
        .ok_or_else(|| Error::UnsupportedShape(object.name.to_owned()))?;
    let start = object.pose0 * local;
    let end = object.pose1 * local;
    Ok((start, CastHullShape::new(support_map, start.inverse() * end)))
}

fn links_to_shape_map(links: &[urdf_rs::Link], base_dir: Option<&Path>) -> NameShapeMap {
    let mut name_collision_model_map = NameShapeMap::new();
    for l in links {
        let col_pose_vec = l
            .collision
            .iter()
            .filter_map(|collision| {
                urdf_geometry_to_shape_handle(&collision.geometry, base_dir)
                    .map(|col| (col, k::urdf::isometry_from(&collision.origin)))
            })
            .collect::<Vec<_>>();
        debug!("name={}, ln={}", l.name, col_pose_vec.len());
        if !col_pose_vec.is_empty() {
            name_collision_model_map.insert(l.name.to_owned(), col_pose_vec);
        }
    }
    name_collision_model_map
}

/// Active set and threshold shared by both kinds of managers
#[derive(Debug, Clone, Default)]
struct ManagerState {
    active: Option<Vec<String>>,
    contact_distance: f64,
}

impl ManagerState {
    fn active(&self) -> Result<&[String]> {
        self.active.as_deref().ok_or_else(|| {
            Error::ContactManager("active collision objects are not set".to_owned())
        })
    }
}

/// [`DiscreteContactManager`] on top of [`CollisionDetector`]
#[derive(Debug, Clone)]
pub struct DiscreteCollisionDetectorManager {
    detector: CollisionDetector,
    state: ManagerState,
}

impl DiscreteCollisionDetectorManager {
    pub fn new(detector: CollisionDetector) -> Self {
        Self {
            detector,
            state: ManagerState::default(),
        }
    }
}

impl DiscreteContactManager for DiscreteCollisionDetectorManager {
    fn set_active_collision_objects(&mut self, names: &[String]) {
        self.state.active = Some(names.to_vec());
    }

    fn active_collision_objects(&self) -> &[String] {
        self.state.active.as_deref().unwrap_or_default()
    }

    fn set_contact_distance_threshold(&mut self, distance: f64) {
        self.state.contact_distance = distance;
    }

    fn contact_distance_threshold(&self) -> f64 {
        self.state.contact_distance
    }

    fn contact_test(&mut self, transforms: &LinkTransforms) -> Result<ContactResultVector> {
        let contacts = self.detector.discrete_contacts(
            self.state.active()?,
            self.state.contact_distance,
            transforms,
        )?;
        debug!("discrete contact test: {} contacts", contacts.len());
        Ok(contacts)
    }
}

/// [`ContinuousContactManager`] on top of [`CollisionDetector`]
#[derive(Debug, Clone)]
pub struct ContinuousCollisionDetectorManager {
    detector: CollisionDetector,
    state: ManagerState,
}

impl ContinuousCollisionDetectorManager {
    pub fn new(detector: CollisionDetector) -> Self {
        Self {
            detector,
            state: ManagerState::default(),
        }
    }
}

impl ContinuousContactManager for ContinuousCollisionDetectorManager {
    fn set_active_collision_objects(&mut self, names: &[String]) {
        self.state.active = Some(names.to_vec());
    }

    fn active_collision_objects(&self) -> &[String] {
        self.state.active.as_deref().unwrap_or_default()
    }

    fn set_contact_distance_threshold(&mut self, distance: f64) {
        self.state.contact_distance = distance;
    }

    fn contact_distance_threshold(&self) -> f64 {
        self.state.contact_distance
    }

    fn contact_test(
        &mut self,
        transforms0: &LinkTransforms,
        transforms1: &LinkTransforms,
    ) -> Result<ContactResultVector> {
        let contacts = self.detector.cast_contacts(
            self.state.active()?,
            self.state.contact_distance,
            transforms0,
            transforms1,
        )?;
        debug!("continuous contact test: {} contacts", contacts.len());
        Ok(contacts)
    }
}

impl Environment for CollisionDetector {
    fn discrete_contact_manager(&self) -> Box<dyn DiscreteContactManager> {
        Box::new(DiscreteCollisionDetectorManager::new(self.clone()))
    }

    fn continuous_contact_manager(&self) -> Box<dyn ContinuousContactManager> {
        Box::new(ContinuousCollisionDetectorManager::new(self.clone()))
    }

    fn collision_object_names(&self) -> Vec<String> {
        let mut names = self.link_names();
        names.extend(self.obstacle_names());
        names
    }
}

/// Convert urdf object into openrr_trajopt/ncollide3d object
pub trait FromUrdf {
    fn from_urdf_robot(robot: &urdf_rs::Robot) -> Self;
    fn from_urdf_file<P>(path: P) -> ::std::result::Result<Self, urdf_rs::UrdfError>
    where
        Self: ::std::marker::Sized,
        P: AsRef<Path>,
    {
        Ok(Self::from_urdf_robot(&urdf_rs::read_file(path)?))
    }
}

/// Create `CollisionDetector` of the links of a robot
impl FromUrdf for CollisionDetector {
    fn from_urdf_robot(urdf_robot: &urdf_rs::Robot) -> Self {
        Self::from_urdf_robot_with_base_dir(urdf_robot, None)
    }
}

/// Create `ncollide::shape::Compound` from URDF file
///
/// The `<link>` elements are used as obstacles. set the origin/geometry of
/// `<collision>`. You can skip `<inertia>`.
impl FromUrdf for Compound<f64> {
    fn from_urdf_robot(urdf_obstacle: &urdf_rs::Robot) -> Self {
        let compound_data = urdf_obstacle
            .links
            .iter()
            .flat_map(|l| {
                l.collision.iter().filter_map(|collision| {
                    urdf_geometry_to_shape_handle(&collision.geometry, None)
                        .map(|col| (k::urdf::isometry_from(&collision.origin), col))
                })
            })
            .collect::<Vec<_>>();
        Compound::new(compound_data)
    }
}

/// Parse args to get allowed collision pairs
///
/// # Example
///
/// ```
/// let pairs = openrr_trajopt::collision::parse_colon_separated_pairs(&vec!["ab:cd".to_owned(), "ab:ef".to_owned()]).unwrap();
/// assert_eq!(pairs.len(), 2);
/// assert_eq!(pairs[0].0, "ab");
/// assert_eq!(pairs[0].1, "cd");
/// assert_eq!(pairs[1].0, "ab");
/// assert_eq!(pairs[1].1, "ef");
/// ```
pub fn parse_colon_separated_pairs(pair_strs: &[String]) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for pair_str in pair_strs {
        match pair_str.split_once(':') {
            Some((p1, p2)) if !p1.is_empty() && !p2.is_empty() => {
                pairs.push((p1.to_owned(), p2.to_owned()));
            }
            _ => return Err(Error::ParseError(pair_str.to_owned())),
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_approx_eq::assert_approx_eq;
    use ncollide3d::shape::Ball;

    use super::*;
    use crate::collision::ContinuousCollisionType;

    fn detector() -> CollisionDetector {
        let mut detector = CollisionDetector::from_urdf_file("spherebot.urdf").unwrap();
        detector.add_obstacles_from_urdf_robot(&urdf_rs::read_file("obstacles.urdf").unwrap());
        detector
    }

    fn transforms(bot: (f64, f64), arm_angle: f64) -> LinkTransforms {
        let bot_pose = na::Isometry3::translation(bot.0, bot.1, 0.0);
        let arm_pose = bot_pose * na::Isometry3::rotation(na::Vector3::z() * arm_angle);
        let mut transforms = HashMap::new();
        transforms.insert("bot_link".to_owned(), bot_pose);
        transforms.insert("arm_link".to_owned(), arm_pose);
        transforms
    }

    fn active() -> Vec<String> {
        vec!["bot_link".to_owned(), "arm_link".to_owned()]
    }

    #[test]
    fn test_names() {
        let detector = detector();
        assert_eq!(detector.link_names(), vec!["bot_link", "arm_link"]);
        assert_eq!(
            detector.collision_object_names(),
            vec!["bot_link", "arm_link", "obstacle", "wall"]
        );
        assert!(detector.is_collision_allowed("arm_link", "bot_link"));
        assert!(!detector.is_collision_allowed("arm_link", "obstacle"));
    }

    #[test]
    fn test_discrete_contact_test() {
        let detector = detector();
        let mut manager = detector.discrete_contact_manager();
        assert!(manager.contact_test(&transforms((0.3, 0.4), 0.0)).is_err());

        manager.set_active_collision_objects(&active());
        manager.set_contact_distance_threshold(0.25);
        let contacts = manager.contact_test(&transforms((0.3, 0.4), 0.0)).unwrap();
        assert_eq!(contacts.len(), 1);
        let contact = &contacts[0];
        assert_eq!(contact.link_names, ["bot_link".to_owned(), "obstacle".to_owned()]);
        assert_approx_eq!(contact.distance, 0.2);
        assert_approx_eq!(contact.normal[0], -0.6);
        assert_approx_eq!(contact.normal[1], -0.8);
        assert_approx_eq!(contact.nearest_points[0][0], 0.24);
        assert_approx_eq!(contact.nearest_points[1][1], 0.16);
        assert_eq!(contact.cc_type[0], ContinuousCollisionType::None);

        manager.set_contact_distance_threshold(0.1);
        assert!(manager
            .contact_test(&transforms((0.3, 0.4), 0.0))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_discrete_penetration() {
        let detector = detector();
        let mut manager = detector.discrete_contact_manager();
        manager.set_active_collision_objects(&active());
        manager.set_contact_distance_threshold(0.0);
        let contacts = manager.contact_test(&transforms((0.25, 0.0), 0.0)).unwrap();
        let contact = contacts
            .iter()
            .find(|c| c.link_names[0] == "bot_link")
            .unwrap();
        assert_approx_eq!(contact.distance, -0.05);
    }

    #[test]
    fn test_missing_transform() {
        let detector = detector();
        let mut manager = detector.discrete_contact_manager();
        manager.set_active_collision_objects(&active());
        let mut poses = transforms((0.3, 0.4), 0.0);
        poses.remove("arm_link");
        assert!(manager.contact_test(&poses).is_err());
    }

    #[test]
    fn test_continuous_contact_test() {
        let detector = detector();
        let mut manager = detector.continuous_contact_manager();
        manager.set_active_collision_objects(&["bot_link".to_owned()]);
        manager.set_contact_distance_threshold(0.2);
        let contacts = manager
            .contact_test(&transforms((-1.0, 0.4), 0.0), &transforms((1.0, 0.4), 0.0))
            .unwrap();
        assert_eq!(contacts.len(), 1);
        let contact = &contacts[0];
        assert_eq!(contact.link_names, ["bot_link".to_owned(), "obstacle".to_owned()]);
        assert_approx_eq!(contact.distance, 0.1, 1e-4);
        assert_eq!(contact.cc_type[0], ContinuousCollisionType::Between);
        assert_eq!(contact.cc_type[1], ContinuousCollisionType::None);
        assert_approx_eq!(contact.cc_time[0], 0.5, 1e-2);
        assert_approx_eq!(contact.cc_transform[0].translation.vector[0], 1.0);

        // a discrete check at both ends does not see the obstacle
        let mut discrete = detector.discrete_contact_manager();
        discrete.set_active_collision_objects(&["bot_link".to_owned()]);
        discrete.set_contact_distance_threshold(0.2);
        assert!(discrete
            .contact_test(&transforms((-1.0, 0.4), 0.0))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_compound_obstacle() {
        let compound = Compound::<f64>::from_urdf_file("obstacles.urdf").unwrap();
        assert_eq!(compound.shapes().len(), 2);
        let mut detector = CollisionDetector::from_urdf_file("spherebot.urdf").unwrap();
        detector.add_compound_obstacle("obstacles", &compound);
        detector.add_obstacle(
            "ball",
            ShapeHandle::new(Ball::new(0.1)),
            na::Isometry3::translation(0.0, -2.0, 0.0),
        );
        assert_eq!(detector.obstacle_names(), vec!["obstacles", "ball"]);

        let mut manager = detector.discrete_contact_manager();
        manager.set_active_collision_objects(&active());
        manager.set_contact_distance_threshold(0.1);
        let contacts = manager.contact_test(&transforms((0.0, -1.75), 0.0)).unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].link_names[1], "ball");
        assert_approx_eq!(contacts[0].distance, 0.05);
    }

    #[test]
    fn test_parse_colon_separated_pairs() {
        let pairs = parse_colon_separated_pairs(&["j0:j1".to_owned(), "j2:j0".to_owned()]).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, "j0");
        assert_eq!(pairs[0].1, "j1");
        assert_eq!(pairs[1].0, "j2");
        assert_eq!(pairs[1].1, "j0");
        assert!(parse_colon_separated_pairs(&["j0".to_owned()]).is_err());
    }
}
