use std::{fmt, sync::Arc};

use k::nalgebra as na;
use tracing::debug;

use crate::{
    collision::Environment,
    errors::*,
    kinematics::Manipulator,
    sco::{Constraint, Cost, VarArray},
    term_info::TermInfo,
};

/// Trajectory optimization problem: variables, robot, scene and terms
///
/// The decision vector `x` is the trajectory flattened row by row, one row
/// of `dof` joint positions for each of the `n_steps` steps.
pub struct TrajOptProblem {
    vars: VarArray,
    manipulator: Arc<Manipulator>,
    environment: Box<dyn Environment>,
    world_to_base: na::Isometry3<f64>,
    costs: Vec<Box<dyn Cost>>,
    constraints: Vec<Box<dyn Constraint>>,
}

impl TrajOptProblem {
    pub fn new(
        n_steps: usize,
        manipulator: Arc<Manipulator>,
        environment: Box<dyn Environment>,
    ) -> Self {
        let vars = VarArray::new(n_steps, manipulator.dof(), 0);
        Self {
            vars,
            manipulator,
            environment,
            world_to_base: na::Isometry3::identity(),
            costs: vec![],
            constraints: vec![],
        }
    }

    /// Pose of the robot base in the world frame
    pub fn with_world_to_base(mut self, world_to_base: na::Isometry3<f64>) -> Self {
        self.world_to_base = world_to_base;
        self
    }

    pub fn n_steps(&self) -> usize {
        self.vars.rows()
    }

    pub fn dof(&self) -> usize {
        self.vars.cols()
    }

    pub fn num_vars(&self) -> usize {
        self.vars.flatten().len()
    }

    pub fn vars(&self) -> &VarArray {
        &self.vars
    }

    pub fn manipulator(&self) -> &Arc<Manipulator> {
        &self.manipulator
    }

    pub fn environment(&self) -> &dyn Environment {
        &*self.environment
    }

    pub fn world_to_base(&self) -> &na::Isometry3<f64> {
        &self.world_to_base
    }

    pub fn add_cost(&mut self, cost: Box<dyn Cost>) {
        debug!("add cost {}", cost.name());
        self.costs.push(cost);
    }

    pub fn add_constraint(&mut self, constraint: Box<dyn Constraint>) {
        debug!("add constraint {}", constraint.name());
        self.constraints.push(constraint);
    }

    /// Create the costs and constraints described by `info`
    pub fn add_term(&mut self, info: &dyn TermInfo) -> Result<()> {
        info.hatch(self)
    }

    pub fn costs(&self) -> &[Box<dyn Cost>] {
        &self.costs
    }

    pub fn constraints(&self) -> &[Box<dyn Constraint>] {
        &self.constraints
    }

    fn check_len(&self, x: &[f64]) -> Result<()> {
        if x.len() != self.num_vars() {
            return Err(Error::DofMismatch(x.len(), self.num_vars()));
        }
        Ok(())
    }

    /// Value of each cost at `x`
    pub fn cost_values(&self, x: &[f64]) -> Result<Vec<(String, f64)>> {
        self.check_len(x)?;
        self.costs
            .iter()
            .map(|cost| Ok((cost.name().to_owned(), cost.value(x)?)))
            .collect()
    }

    /// Total violation of each constraint at `x`
    pub fn constraint_violations(&self, x: &[f64]) -> Result<Vec<(String, f64)>> {
        self.check_len(x)?;
        self.constraints
            .iter()
            .map(|cnt| Ok((cnt.name().to_owned(), cnt.violation(x)?)))
            .collect()
    }

    pub fn total_cost(&self, x: &[f64]) -> Result<f64> {
        Ok(self.cost_values(x)?.iter().map(|(_, v)| v).sum())
    }
}

impl fmt::Debug for TrajOptProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrajOptProblem")
            .field("n_steps", &self.n_steps())
            .field("joint_names", &self.manipulator.joint_names())
            .field("world_to_base", &self.world_to_base)
            .field(
                "costs",
                &self.costs.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field(
                "constraints",
                &self.constraints.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
