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

//! Collision avoidance as costs and constraints of the optimizer

use std::{cell::RefCell, fmt, rc::Rc, sync::Arc};

use k::nalgebra as na;
use tracing::{debug, warn};

use crate::{
    cache::{Cache, ConfigKey},
    collision::{
        AdjacencyMap, ContactResult, ContactResultVector, ContinuousCollisionType,
        ContinuousContactManager, DiscreteContactManager, Environment,
    },
    errors::*,
    kinematics::Manipulator,
    plot::Visualization,
    safety_margin::SafetyMarginData,
    sco::{
        get_vec, AffExpr, Constraint, ConstraintType, ConvexConstraints, ConvexObjective, Cost,
        Model, Var, VarVector,
    },
};

/// Number of configurations whose contacts are kept by one evaluator
pub const COLLISION_CACHE_CAPACITY: usize = 10;

type ContactCache = Cache<ConfigKey, Rc<ContactResultVector>, COLLISION_CACHE_CAPACITY>;

/// State shared by both kinds of evaluators
struct EvaluatorCore {
    manip: Arc<Manipulator>,
    adjacency_map: AdjacencyMap,
    world_to_base: na::Isometry3<f64>,
    safety_margin_data: Arc<SafetyMarginData>,
    cache: RefCell<ContactCache>,
}

impl EvaluatorCore {
    fn new(
        manip: Arc<Manipulator>,
        env: &dyn Environment,
        world_to_base: na::Isometry3<f64>,
        safety_margin_data: Arc<SafetyMarginData>,
    ) -> Result<Self> {
        let adjacency_map = AdjacencyMap::new(&manip, &env.collision_object_names())?;
        Ok(Self {
            manip,
            adjacency_map,
            world_to_base,
            safety_margin_data,
            cache: RefCell::new(ContactCache::new()),
        })
    }

    fn check_dof(&self, vars: &[Var]) -> Result<()> {
        if vars.len() != self.manip.dof() {
            return Err(Error::DofMismatch(vars.len(), self.manip.dof()));
        }
        Ok(())
    }

    /// Positional Jacobian in the world frame of a world point carried by
    /// `link_name`, using the current joint positions of the manipulator.
    fn point_jacobian(
        &self,
        link_name: &str,
        point: &na::Point3<f64>,
    ) -> Result<na::Matrix3xX<f64>> {
        let pair = self
            .adjacency_map
            .link_mapping(link_name)
            .ok_or_else(|| Error::NotFound(link_name.to_owned()))?;
        let point_in_base = self.world_to_base.inverse_transform_point(point);
        let jacobian = self.manip.calc_jacobian(&pair.joint_name, &point_in_base)?;
        Ok(self.world_to_base.rotation.to_rotation_matrix().matrix() * jacobian)
    }
}

/// Contacts of the robot at one step of the trajectory
pub struct SingleTimestepCollisionEvaluator {
    core: EvaluatorCore,
    vars: VarVector,
    contact_manager: RefCell<Box<dyn DiscreteContactManager>>,
}

impl SingleTimestepCollisionEvaluator {
    pub fn new(
        manip: Arc<Manipulator>,
        env: &dyn Environment,
        world_to_base: na::Isometry3<f64>,
        safety_margin_data: Arc<SafetyMarginData>,
        vars: VarVector,
    ) -> Result<Self> {
        let core = EvaluatorCore::new(manip, env, world_to_base, safety_margin_data)?;
        core.check_dof(&vars)?;
        let mut contact_manager = env.discrete_contact_manager();
        contact_manager.set_active_collision_objects(core.adjacency_map.active_link_names());
        contact_manager.set_contact_distance_threshold(core.safety_margin_data.max_safety_margin());
        Ok(Self {
            core,
            vars,
            contact_manager: RefCell::new(contact_manager),
        })
    }

    fn calc_collisions(&self, x: &[f64]) -> Result<ContactResultVector> {
        let dofvals = get_vec(x, &self.vars)?;
        let transforms = self
            .core
            .manip
            .calc_fwd_kin(&dofvals, &self.core.world_to_base)?;
        self.contact_manager.borrow_mut().contact_test(&transforms)
    }

    fn calc_dist_expressions(
        &self,
        x: &[f64],
        contacts: &[ContactResult],
    ) -> Result<Vec<AffExpr>> {
        let dofvals = get_vec(x, &self.vars)?;
        self.core.manip.set_joint_positions(&dofvals)?;
        let dof = self.vars.len();
        let mut exprs = Vec::with_capacity(contacts.len());
        for contact in contacts {
            let mut grad = na::DVector::zeros(dof);
            for i in 0..2 {
                let link_name = &contact.link_names[i];
                if !self.core.adjacency_map.contains(link_name) {
                    continue;
                }
                let jacobian = self
                    .core
                    .point_jacobian(link_name, &contact.nearest_points[i])?;
                grad += side_sign(i) * jacobian.tr_mul(&contact.normal);
            }
            let grad = finite_or_zero(grad, contact);
            let constant =
                contact.distance - grad.dot(&na::DVector::from_column_slice(&dofvals));
            let mut expr = AffExpr::from_constant(constant);
            expr.inc_dot(grad.as_slice(), &self.vars);
            exprs.push(expr);
        }
        Ok(exprs)
    }
}

impl fmt::Debug for SingleTimestepCollisionEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleTimestepCollisionEvaluator")
            .field("vars", &self.vars)
            .field("active_links", &self.core.adjacency_map.active_link_names())
            .finish_non_exhaustive()
    }
}

/// Contacts of the robot swept between two steps of the trajectory
pub struct CastCollisionEvaluator {
    core: EvaluatorCore,
    vars0: VarVector,
    vars1: VarVector,
    contact_manager: RefCell<Box<dyn ContinuousContactManager>>,
}

impl CastCollisionEvaluator {
    pub fn new(
        manip: Arc<Manipulator>,
        env: &dyn Environment,
        world_to_base: na::Isometry3<f64>,
        safety_margin_data: Arc<SafetyMarginData>,
        vars0: VarVector,
        vars1: VarVector,
    ) -> Result<Self> {
        let core = EvaluatorCore::new(manip, env, world_to_base, safety_margin_data)?;
        core.check_dof(&vars0)?;
        core.check_dof(&vars1)?;
        let mut contact_manager = env.continuous_contact_manager();
        contact_manager.set_active_collision_objects(core.adjacency_map.active_link_names());
        contact_manager.set_contact_distance_threshold(core.safety_margin_data.max_safety_margin());
        Ok(Self {
            core,
            vars0,
            vars1,
            contact_manager: RefCell::new(contact_manager),
        })
    }

    fn calc_collisions(&self, x: &[f64]) -> Result<ContactResultVector> {
        let dofvals0 = get_vec(x, &self.vars0)?;
        let dofvals1 = get_vec(x, &self.vars1)?;
        let manip = &self.core.manip;
        let transforms0 = manip.calc_fwd_kin(&dofvals0, &self.core.world_to_base)?;
        let transforms1 = manip.calc_fwd_kin(&dofvals1, &self.core.world_to_base)?;
        self.contact_manager
            .borrow_mut()
            .contact_test(&transforms0, &transforms1)
    }

    fn calc_dist_expressions(
        &self,
        x: &[f64],
        contacts: &[ContactResult],
    ) -> Result<Vec<AffExpr>> {
        let dofvals0 = get_vec(x, &self.vars0)?;
        let dofvals1 = get_vec(x, &self.vars1)?;
        let dof = self.vars0.len();
        let mut exprs = Vec::with_capacity(contacts.len());
        for contact in contacts {
            let mut grad0 = na::DVector::zeros(dof);
            let mut grad1 = na::DVector::zeros(dof);
            for i in 0..2 {
                let link_name = &contact.link_names[i];
                if !self.core.adjacency_map.contains(link_name) {
                    continue;
                }
                let (weight0, weight1) = match contact.cc_type[i] {
                    ContinuousCollisionType::Time0 => (1.0, 0.0),
                    ContinuousCollisionType::Time1 => (0.0, 1.0),
                    _ => (1.0 - contact.cc_time[i], contact.cc_time[i]),
                };
                // the contact point moves rigidly with the link along the sweep
                let pose0 = contact.transform[i];
                let pose1 = contact.cc_transform[i];
                let pose_at_contact = pose0.lerp_slerp(&pose1, contact.cc_time[i]);
                let local_point =
                    pose_at_contact.inverse_transform_point(&contact.nearest_points[i]);
                let sign = side_sign(i);

                self.core.manip.set_joint_positions(&dofvals0)?;
                let jacobian0 = self.core.point_jacobian(link_name, &(pose0 * local_point))?;
                grad0 += sign * weight0 * jacobian0.tr_mul(&contact.normal);

                self.core.manip.set_joint_positions(&dofvals1)?;
                let jacobian1 = self.core.point_jacobian(link_name, &(pose1 * local_point))?;
                grad1 += sign * weight1 * jacobian1.tr_mul(&contact.normal);
            }
            let grad0 = finite_or_zero(grad0, contact);
            let grad1 = finite_or_zero(grad1, contact);
            let constant = contact.distance
                - grad0.dot(&na::DVector::from_column_slice(&dofvals0))
                - grad1.dot(&na::DVector::from_column_slice(&dofvals1));
            let mut expr = AffExpr::from_constant(constant);
            expr.inc_dot(grad0.as_slice(), &self.vars0);
            expr.inc_dot(grad1.as_slice(), &self.vars1);
            exprs.push(expr);
        }
        Ok(exprs)
    }
}

impl fmt::Debug for CastCollisionEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CastCollisionEvaluator")
            .field("vars0", &self.vars0)
            .field("vars1", &self.vars1)
            .field("active_links", &self.core.adjacency_map.active_link_names())
            .finish_non_exhaustive()
    }
}

/// Moving link 0 against the normal or link 1 along it increases the distance
fn side_sign(i: usize) -> f64 {
    if i == 0 {
        -1.0
    } else {
        1.0
    }
}

fn finite_or_zero(grad: na::DVector<f64>, contact: &ContactResult) -> na::DVector<f64> {
    if grad.iter().all(|v| v.is_finite()) {
        grad
    } else {
        warn!(
            "non-finite distance gradient for {} - {}, using zero",
            contact.link_names[0], contact.link_names[1]
        );
        na::DVector::zeros(grad.len())
    }
}

/// Computes and caches the contacts of a collision term
///
/// One evaluator is shared by the cost and the constraint of the same
/// term, so both see the same contacts for the same `x`.
#[derive(Debug)]
pub enum CollisionEvaluator {
    SingleTimestep(SingleTimestepCollisionEvaluator),
    Cast(CastCollisionEvaluator),
}

impl CollisionEvaluator {
    fn core(&self) -> &EvaluatorCore {
        match self {
            CollisionEvaluator::SingleTimestep(e) => &e.core,
            CollisionEvaluator::Cast(e) => &e.core,
        }
    }

    /// Query the contact manager without looking at the cache
    pub fn calc_collisions(&self, x: &[f64]) -> Result<ContactResultVector> {
        match self {
            CollisionEvaluator::SingleTimestep(e) => e.calc_collisions(x),
            CollisionEvaluator::Cast(e) => e.calc_collisions(x),
        }
    }

    /// Contacts at `x`, computed at most once per configuration while it
    /// stays in the cache
    pub fn get_collisions_cached(&self, x: &[f64]) -> Result<Rc<ContactResultVector>> {
        let key = ConfigKey::new(&get_vec(x, &self.vars())?);
        let core = self.core();
        if let Some(contacts) = core.cache.borrow_mut().get(&key) {
            debug!("collision cache hit ({})", key.fingerprint());
            return Ok(contacts.clone());
        }
        let contacts = Rc::new(self.calc_collisions(x)?);
        debug!(
            "collision cache miss ({}): {} contacts",
            key.fingerprint(),
            contacts.len()
        );
        core.cache.borrow_mut().put(key, contacts.clone());
        Ok(contacts)
    }

    /// Linearized distance of each contact around `x`, in the order of
    /// [`Self::get_collisions_cached`]
    ///
    /// Each expression evaluates to the contact distance at `x` and grows
    /// when the links move apart.
    pub fn calc_dist_expressions(&self, x: &[f64]) -> Result<Vec<AffExpr>> {
        let contacts = self.get_collisions_cached(x)?;
        match self {
            CollisionEvaluator::SingleTimestep(e) => e.calc_dist_expressions(x, &contacts),
            CollisionEvaluator::Cast(e) => e.calc_dist_expressions(x, &contacts),
        }
    }

    /// Distance of each contact, without the Jacobians
    pub fn calc_dists(&self, x: &[f64]) -> Result<Vec<f64>> {
        Ok(self
            .get_collisions_cached(x)?
            .iter()
            .map(|contact| contact.distance)
            .collect())
    }

    /// `(margin, coeff)` of each contact at `x`
    pub fn safety_margins(&self, x: &[f64]) -> Result<Vec<(f64, f64)>> {
        let data = self.safety_margin_data();
        Ok(self
            .get_collisions_cached(x)?
            .iter()
            .map(|c| data.pair_safety_margin_data(&c.link_names[0], &c.link_names[1]))
            .collect())
    }

    pub fn plot(&self, plotter: &mut dyn Visualization, x: &[f64]) -> Result<()> {
        let contacts = self.get_collisions_cached(x)?;
        let margins = self
            .safety_margins(x)?
            .into_iter()
            .map(|(margin, _)| margin)
            .collect::<Vec<_>>();
        plotter.plot_contact_results(&contacts, &margins);
        Ok(())
    }

    /// Variables the contacts depend on
    ///
    /// For casts this is the variables of the start followed by the ones of
    /// the end.
    pub fn vars(&self) -> VarVector {
        match self {
            CollisionEvaluator::SingleTimestep(e) => e.vars.clone(),
            CollisionEvaluator::Cast(e) => {
                let mut vars = e.vars0.clone();
                vars.extend_from_slice(&e.vars1);
                vars
            }
        }
    }

    pub fn safety_margin_data(&self) -> &SafetyMarginData {
        &self.core().safety_margin_data
    }

    pub fn active_link_names(&self) -> &[String] {
        self.core().adjacency_map.active_link_names()
    }
}

impl From<SingleTimestepCollisionEvaluator> for CollisionEvaluator {
    fn from(e: SingleTimestepCollisionEvaluator) -> Self {
        CollisionEvaluator::SingleTimestep(e)
    }
}

impl From<CastCollisionEvaluator> for CollisionEvaluator {
    fn from(e: CastCollisionEvaluator) -> Self {
        CollisionEvaluator::Cast(e)
    }
}

/// Hinge penalty `Σ coeff * max(0, margin − distance)` over all contacts
#[derive(Debug, Clone)]
pub struct CollisionCost {
    name: String,
    evaluator: Rc<CollisionEvaluator>,
}

impl CollisionCost {
    pub fn new(name: &str, evaluator: Rc<CollisionEvaluator>) -> Self {
        Self {
            name: name.to_owned(),
            evaluator,
        }
    }

    pub fn evaluator(&self) -> &Rc<CollisionEvaluator> {
        &self.evaluator
    }

    pub fn plot(&self, plotter: &mut dyn Visualization, x: &[f64]) -> Result<()> {
        self.evaluator.plot(plotter, x)
    }
}

impl Cost for CollisionCost {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self, x: &[f64]) -> Result<f64> {
        let dists = self.evaluator.calc_dists(x)?;
        let margins = self.evaluator.safety_margins(x)?;
        Ok(dists
            .iter()
            .zip(&margins)
            .map(|(dist, (margin, coeff))| coeff * (margin - dist).max(0.0))
            .sum())
    }

    fn convex(&self, x: &[f64], model: &mut dyn Model) -> Result<ConvexObjective> {
        let exprs = self.evaluator.calc_dist_expressions(x)?;
        let margins = self.evaluator.safety_margins(x)?;
        let mut out = ConvexObjective::new();
        for (expr, (margin, coeff)) in exprs.iter().zip(margins) {
            out.add_hinge(model, AffExpr::negated_from(margin, expr), coeff);
        }
        Ok(out)
    }

    fn vars(&self) -> VarVector {
        self.evaluator.vars()
    }
}

/// Inequalities `margin − distance <= 0`, one for each contact
#[derive(Debug, Clone)]
pub struct CollisionConstraint {
    name: String,
    evaluator: Rc<CollisionEvaluator>,
}

impl CollisionConstraint {
    pub fn new(name: &str, evaluator: Rc<CollisionEvaluator>) -> Self {
        Self {
            name: name.to_owned(),
            evaluator,
        }
    }

    pub fn evaluator(&self) -> &Rc<CollisionEvaluator> {
        &self.evaluator
    }

    pub fn plot(&self, plotter: &mut dyn Visualization, x: &[f64]) -> Result<()> {
        self.evaluator.plot(plotter, x)
    }
}

impl Constraint for CollisionConstraint {
    fn name(&self) -> &str {
        &self.name
    }

    fn constraint_type(&self) -> ConstraintType {
        ConstraintType::Ineq
    }

    fn value(&self, x: &[f64]) -> Result<Vec<f64>> {
        let dists = self.evaluator.calc_dists(x)?;
        let margins = self.evaluator.safety_margins(x)?;
        Ok(dists
            .iter()
            .zip(&margins)
            .map(|(dist, (margin, _))| margin - dist)
            .collect())
    }

    fn convex(&self, x: &[f64], _model: &mut dyn Model) -> Result<ConvexConstraints> {
        let exprs = self.evaluator.calc_dist_expressions(x)?;
        let margins = self.evaluator.safety_margins(x)?;
        let mut out = ConvexConstraints::new();
        for (expr, (margin, _)) in exprs.iter().zip(margins) {
            out.add_ineq(AffExpr::negated_from(margin, expr));
        }
        Ok(out)
    }

    fn vars(&self) -> VarVector {
        self.evaluator.vars()
    }
}
