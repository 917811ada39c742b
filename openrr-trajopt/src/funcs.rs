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

use std::f64::consts::PI;

use crate::errors::*;

type Limits = Vec<Option<k::joint::Range<f64>>>;

/// Create a sub chain which shares the nodes of `robot`
///
/// Setting joint positions of the returned chain changes `robot`.
pub fn create_chain_from_joint_names(
    robot: &k::Chain<f64>,
    joint_names: &[String],
) -> Result<k::Chain<f64>> {
    let mut nodes = Vec::with_capacity(joint_names.len());
    for name in joint_names {
        match robot.find(name) {
            Some(node) => nodes.push(node.clone()),
            None => return Err(Error::NotFound(name.to_owned())),
        }
    }
    Ok(k::Chain::from_nodes(nodes))
}

/// Generate random joint angles from the optional limits
///
/// If the limit is None, -PI <-> PI is used.
pub fn generate_random_joint_positions_from_limits(limits: &Limits) -> Vec<f64> {
    limits
        .iter()
        .map(|range| match *range {
            Some(ref range) => (range.max - range.min) * rand::random::<f64>() + range.min,
            None => (rand::random::<f64>() - 0.5) * 2.0 * PI,
        })
        .collect()
}

/// Flatten a trajectory (one row per step) into the decision vector layout
///
/// ```
/// let x = openrr_trajopt::traj_to_vec(&[vec![0.0, 1.0], vec![2.0, 3.0]]);
/// assert_eq!(x, vec![0.0, 1.0, 2.0, 3.0]);
/// ```
pub fn traj_to_vec(traj: &[Vec<f64>]) -> Vec<f64> {
    traj.iter().flatten().copied().collect()
}
