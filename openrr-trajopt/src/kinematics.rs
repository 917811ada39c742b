use std::{
    collections::{HashMap, HashSet},
    fmt,
    path::Path,
    sync::Arc,
};

use k::nalgebra as na;
use tracing::debug;

use crate::{errors::*, funcs::create_chain_from_joint_names};

/// Forward kinematics and Jacobians of the joints being optimized
///
/// `chain` is the whole robot, the manipulator is the subset of its joints
/// listed in `joint_names`. Joints outside of the manipulator keep the
/// positions they have in `chain`.
pub struct Manipulator {
    chain: Arc<k::Chain<f64>>,
    using_joints: k::Chain<f64>,
    joint_names: Vec<String>,
    joint_nodes: Vec<k::Node<f64>>,
    /// link name -> node whose frame is the link frame
    link_nodes: Vec<(String, k::Node<f64>)>,
}

impl Manipulator {
    pub fn new(chain: Arc<k::Chain<f64>>, joint_names: &[String]) -> Result<Self> {
        let using_joints = create_chain_from_joint_names(&chain, joint_names)?;
        chain.update_transforms();
        let joint_nodes: Vec<_> = using_joints.iter().cloned().collect();
        for node in &joint_nodes {
            if !node.joint().is_movable() {
                return Err(Error::Other {
                    error: format!("joint {} is not movable", node.joint().name),
                });
            }
        }
        let mut link_nodes = Vec::new();
        for node in chain.iter() {
            if let Some(link) = node.link().clone() {
                link_nodes.push((link.name, node.clone()));
            }
        }
        debug!(
            "manipulator joints={joint_names:?}, links={}",
            link_nodes.len()
        );
        Ok(Self {
            chain,
            using_joints,
            joint_names: joint_names.to_vec(),
            joint_nodes,
            link_nodes,
        })
    }

    pub fn from_urdf_robot(urdf_robot: &urdf_rs::Robot, joint_names: &[String]) -> Result<Self> {
        Self::new(Arc::new(k::Chain::from(urdf_robot)), joint_names)
    }

    pub fn from_urdf_file<P>(path: P, joint_names: &[String]) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        Self::from_urdf_robot(&urdf_rs::read_file(path)?, joint_names)
    }

    pub fn dof(&self) -> usize {
        self.joint_names.len()
    }

    pub fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    /// The whole robot model
    pub fn chain(&self) -> &k::Chain<f64> {
        &self.chain
    }

    pub fn joint_limits(&self) -> Vec<Option<k::joint::Range<f64>>> {
        self.using_joints.iter_joints().map(|j| j.limits).collect()
    }

    /// Names of all links of the robot
    pub fn link_names(&self) -> Vec<String> {
        self.link_nodes.iter().map(|(name, _)| name.clone()).collect()
    }

    fn link_node(&self, link_name: &str) -> Result<&k::Node<f64>> {
        self.link_nodes
            .iter()
            .find(|(name, _)| name == link_name)
            .map(|(_, node)| node)
            .ok_or_else(|| Error::NotFound(link_name.to_owned()))
    }

    fn joint_node(&self, joint_name: &str) -> Result<&k::Node<f64>> {
        self.joint_nodes
            .iter()
            .find(|node| node.joint().name == joint_name)
            .ok_or_else(|| Error::NotFound(joint_name.to_owned()))
    }

    /// Set the manipulator joints and update all the transforms
    ///
    /// Limits are not checked: iterates of the optimizer may leave them.
    pub fn set_joint_positions(&self, joint_positions: &[f64]) -> Result<()> {
        if joint_positions.len() != self.dof() {
            return Err(Error::DofMismatch(joint_positions.len(), self.dof()));
        }
        self.using_joints
            .set_joint_positions_unchecked(joint_positions);
        self.chain.update_transforms();
        Ok(())
    }

    /// Poses of all links in the world frame
    pub fn calc_fwd_kin(
        &self,
        joint_positions: &[f64],
        world_to_base: &na::Isometry3<f64>,
    ) -> Result<HashMap<String, na::Isometry3<f64>>> {
        self.set_joint_positions(joint_positions)?;
        self.link_nodes
            .iter()
            .map(|(name, node)| {
                let pose = node
                    .world_transform()
                    .ok_or_else(|| Error::NotFound(name.to_owned()))?;
                Ok((name.clone(), world_to_base * pose))
            })
            .collect()
    }

    /// Returns the manipulator joint nearest to the link on the way to the root
    ///
    /// `None` means that the link does not move with the manipulator.
    pub fn attached_joint(&self, link_name: &str) -> Result<Option<String>> {
        let mut current = Some(self.link_node(link_name)?.clone());
        while let Some(node) = current {
            let name = node.joint().name.clone();
            if self.joint_names.contains(&name) {
                return Ok(Some(name));
            }
            current = node.parent();
        }
        Ok(None)
    }

    /// Positional Jacobian (3 x dof) of a point rigidly attached to the frame
    /// of `joint_name`, using the current joint positions.
    ///
    /// `point` is expressed in the base frame and so is the result.
    pub fn calc_jacobian(
        &self,
        joint_name: &str,
        point: &na::Point3<f64>,
    ) -> Result<na::Matrix3xX<f64>> {
        let mut ancestors = HashSet::new();
        let mut current = Some(self.joint_node(joint_name)?.clone());
        while let Some(node) = current {
            ancestors.insert(node.joint().name.clone());
            current = node.parent();
        }

        let mut jacobian = na::Matrix3xX::zeros(self.dof());
        for (i, node) in self.joint_nodes.iter().enumerate() {
            // `joint()` locks the node, so the transform has to be read first
            let transform = node.world_transform();
            let joint = node.joint();
            if !ancestors.contains(&joint.name) {
                continue;
            }
            let transform = transform.ok_or_else(|| Error::NotFound(joint.name.clone()))?;
            match &joint.joint_type {
                k::joint::JointType::Rotational { axis } => {
                    let axis = transform.rotation * *axis;
                    let column = axis.cross(&(point.coords - transform.translation.vector));
                    jacobian.set_column(i, &column);
                }
                k::joint::JointType::Linear { axis } => {
                    let axis = transform.rotation * *axis;
                    jacobian.set_column(i, &axis.into_inner());
                }
                k::joint::JointType::Fixed => {}
            }
        }
        Ok(jacobian)
    }
}

impl fmt::Debug for Manipulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manipulator")
            .field("joint_names", &self.joint_names)
            .field("link_names", &self.link_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::*;

    fn spherebot() -> Manipulator {
        Manipulator::from_urdf_file(
            "spherebot.urdf",
            &[
                "x_joint".to_owned(),
                "y_joint".to_owned(),
                "arm_joint".to_owned(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_not_found_joint() {
        assert!(Manipulator::from_urdf_file("spherebot.urdf", &["no_joint".to_owned()]).is_err());
    }

    #[test]
    fn test_calc_fwd_kin() {
        let manip = spherebot();
        assert_eq!(manip.dof(), 3);
        let poses = manip
            .calc_fwd_kin(&[0.3, 0.4, 0.0], &na::Isometry3::identity())
            .unwrap();
        let bot = poses["bot_link"].translation.vector;
        assert_approx_eq!(bot[0], 0.3);
        assert_approx_eq!(bot[1], 0.4);
        assert!(manip.calc_fwd_kin(&[0.0], &na::Isometry3::identity()).is_err());

        let shifted = na::Isometry3::translation(0.0, 0.0, 1.0);
        let poses = manip.calc_fwd_kin(&[0.3, 0.4, 0.0], &shifted).unwrap();
        assert_approx_eq!(poses["bot_link"].translation.vector[2], 1.0);
    }

    #[test]
    fn test_attached_joint() {
        let manip = spherebot();
        assert_eq!(manip.attached_joint("bot_link").unwrap().unwrap(), "y_joint");
        assert_eq!(manip.attached_joint("arm_link").unwrap().unwrap(), "arm_joint");
        assert!(manip.attached_joint("no_link").is_err());

        let manip =
            Manipulator::from_urdf_file("spherebot.urdf", &["arm_joint".to_owned()]).unwrap();
        assert_eq!(manip.attached_joint("bot_link").unwrap(), None);
    }

    #[test]
    fn test_calc_jacobian_before_setting_positions() {
        let manip = spherebot();
        let jac = manip
            .calc_jacobian("arm_joint", &na::Point3::new(0.5, 0.0, 0.0))
            .unwrap();
        assert_approx_eq!(jac[(0, 0)], 1.0);
        assert_approx_eq!(jac[(1, 1)], 1.0);
        // z × (p − o) with o at the origin
        assert_approx_eq!(jac[(0, 2)], 0.0);
        assert_approx_eq!(jac[(1, 2)], 0.5);
    }

    #[test]
    fn test_calc_jacobian() {
        let manip = spherebot();
        manip
            .set_joint_positions(&[-0.5, 0.5, -std::f64::consts::FRAC_PI_2])
            .unwrap();
        let point = na::Point3::new(-0.45, 0.0, 0.0);
        let jac = manip.calc_jacobian("arm_joint", &point).unwrap();
        // prismatic x, prismatic y
        assert_approx_eq!(jac[(0, 0)], 1.0);
        assert_approx_eq!(jac[(1, 1)], 1.0);
        // z × (p − o) with o = (-0.5, 0.5, 0)
        assert_approx_eq!(jac[(0, 2)], 0.5);
        assert_approx_eq!(jac[(1, 2)], 0.05);
        assert_approx_eq!(jac[(2, 2)], 0.0);

        // the body does not move with the arm joint
        let jac = manip
            .calc_jacobian("y_joint", &na::Point3::new(-0.5, 0.5, 0.0))
            .unwrap();
        assert_approx_eq!(jac[(0, 2)], 0.0);
        assert_approx_eq!(jac[(1, 2)], 0.0);
    }
}
