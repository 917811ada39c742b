use std::collections::HashMap;

use tracing::debug;

use crate::{errors::*, kinematics::Manipulator};

/// How a link is attached to the manipulator
#[derive(Debug, Clone, PartialEq)]
pub struct AdjacencyMapPair {
    /// Nearest manipulator joint on the way to the root
    pub joint_name: String,
}

/// Links which move with the manipulator joints
///
/// Only these links can change their distance when the optimized variables
/// change, so they are the active objects of the contact managers.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyMap {
    active_link_names: Vec<String>,
    link_mapping: HashMap<String, AdjacencyMapPair>,
}

impl AdjacencyMap {
    /// `link_names` are the links known by the collision environment.
    ///
    /// Links which are not part of the robot (obstacles) are ignored.
    pub fn new(manipulator: &Manipulator, link_names: &[String]) -> Result<Self> {
        let robot_links = manipulator.link_names();
        let mut active_link_names = Vec::new();
        let mut link_mapping = HashMap::new();
        for link_name in link_names {
            if !robot_links.contains(link_name) {
                continue;
            }
            if let Some(joint_name) = manipulator.attached_joint(link_name)? {
                active_link_names.push(link_name.clone());
                link_mapping.insert(link_name.clone(), AdjacencyMapPair { joint_name });
            }
        }
        debug!("active links: {active_link_names:?}");
        Ok(Self {
            active_link_names,
            link_mapping,
        })
    }

    pub fn active_link_names(&self) -> &[String] {
        &self.active_link_names
    }

    pub fn link_mapping(&self, link_name: &str) -> Option<&AdjacencyMapPair> {
        self.link_mapping.get(link_name)
    }

    pub fn contains(&self, link_name: &str) -> bool {
        self.link_mapping.contains_key(link_name)
    }
}
