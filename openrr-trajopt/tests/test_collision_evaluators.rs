use std::{f64::consts::FRAC_PI_2, rc::Rc, sync::Arc};

use assert_approx_eq::assert_approx_eq;
use k::nalgebra as na;
use openrr_trajopt::{
    collision::ContinuousCollisionType,
    sco::{BasicModel, Cost, VarArray},
    CastCollisionEvaluator, CollisionCost, CollisionDetector, CollisionEvaluator, FromUrdf,
    Manipulator, SafetyMarginData, SingleTimestepCollisionEvaluator,
};

fn joint_names() -> Vec<String> {
    ["x_joint", "y_joint", "arm_joint"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn manip() -> Arc<Manipulator> {
    Arc::new(Manipulator::from_urdf_file("spherebot.urdf", &joint_names()).unwrap())
}

fn environment() -> CollisionDetector {
    let mut detector = CollisionDetector::from_urdf_file("spherebot.urdf").unwrap();
    detector.add_obstacles_from_urdf_robot(&urdf_rs::read_file("obstacles.urdf").unwrap());
    detector
}

fn discrete(margin: f64, world_to_base: na::Isometry3<f64>) -> CollisionEvaluator {
    SingleTimestepCollisionEvaluator::new(
        manip(),
        &environment(),
        world_to_base,
        Arc::new(SafetyMarginData::new(margin, 1.0)),
        VarArray::new(1, 3, 0).row(0),
    )
    .unwrap()
    .into()
}

#[test]
fn test_discrete_body_contact() {
    let evaluator = discrete(0.25, na::Isometry3::identity());
    let x = [0.3, 0.4, 0.0];
    let contacts = evaluator.get_collisions_cached(&x).unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].link_names[0], "bot_link");
    assert_eq!(contacts[0].link_names[1], "obstacle");
    assert_approx_eq!(contacts[0].distance, 0.2);

    let exprs = evaluator.calc_dist_expressions(&x).unwrap();
    assert_approx_eq!(exprs[0].coeffs[0], 0.6);
    assert_approx_eq!(exprs[0].coeffs[1], 0.8);
    assert_approx_eq!(exprs[0].coeffs[2], 0.0);
    assert_approx_eq!(exprs[0].value(&x).unwrap(), 0.2);
    assert_eq!(evaluator.calc_dists(&x).unwrap(), vec![contacts[0].distance]);
}

#[test]
fn test_discrete_arm_contact() {
    let evaluator = discrete(0.3, na::Isometry3::identity());
    let x = [-0.5, 0.5, -FRAC_PI_2];
    let contacts = evaluator.get_collisions_cached(&x).unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].link_names[0], "arm_link");
    assert_approx_eq!(contacts[0].distance, 0.25);

    let exprs = evaluator.calc_dist_expressions(&x).unwrap();
    assert_approx_eq!(exprs[0].coeffs[0], -1.0);
    assert_approx_eq!(exprs[0].coeffs[1], 0.0);
    assert_approx_eq!(exprs[0].coeffs[2], -0.5);
}

#[test]
fn test_linearization_matches_finite_difference() {
    let evaluator = discrete(0.3, na::Isometry3::identity());
    let x0 = [-0.5, 0.5, -FRAC_PI_2];
    let expr = evaluator.calc_dist_expressions(&x0).unwrap().remove(0);
    let x1 = [-0.5 + 2e-4, 0.5 - 1e-4, -FRAC_PI_2 + 3e-4];
    let dists = evaluator.calc_dists(&x1).unwrap();
    assert_eq!(dists.len(), 1);
    assert!((expr.value(&x1).unwrap() - dists[0]).abs() < 1e-6);
}

#[test]
fn test_world_to_base() {
    // the robot base is shifted by -0.3 along y in the world
    let evaluator = discrete(0.25, na::Isometry3::translation(0.0, -0.3, 0.0));
    let x = [0.3, 0.7, 0.0];
    let contacts = evaluator.get_collisions_cached(&x).unwrap();
    assert_eq!(contacts.len(), 1);
    assert_approx_eq!(contacts[0].distance, 0.2);
    let exprs = evaluator.calc_dist_expressions(&x).unwrap();
    assert_approx_eq!(exprs[0].coeffs[0], 0.6);
    assert_approx_eq!(exprs[0].coeffs[1], 0.8);
}

#[test]
fn test_cast_contacts() {
    let vars = VarArray::new(2, 3, 0);
    let evaluator: CollisionEvaluator = CastCollisionEvaluator::new(
        manip(),
        &environment(),
        na::Isometry3::identity(),
        Arc::new(SafetyMarginData::new(0.2, 1.0)),
        vars.row(0),
        vars.row(1),
    )
    .unwrap()
    .into();
    let x = [-1.0, 0.4, 0.0, 1.0, 0.4, 0.0];
    let contacts = evaluator.get_collisions_cached(&x).unwrap();
    assert_eq!(contacts.len(), 2);

    let bot = &contacts[0];
    assert_eq!(bot.link_names[0], "bot_link");
    assert_approx_eq!(bot.distance, 0.1, 1e-4);
    assert_eq!(bot.cc_type[0], ContinuousCollisionType::Between);
    assert_approx_eq!(bot.cc_time[0], 0.5, 1e-2);

    let arm = &contacts[1];
    assert_eq!(arm.link_names[0], "arm_link");
    assert_approx_eq!(arm.distance, 0.15, 1e-4);
    assert_approx_eq!(arm.cc_time[0], 0.25, 1e-2);

    let exprs = evaluator.calc_dist_expressions(&x).unwrap();
    assert_eq!(exprs[0].vars, evaluator.vars());
    // y of both ends share the gradient of the body
    assert_approx_eq!(exprs[0].coeffs[1], 0.5, 1e-3);
    assert_approx_eq!(exprs[0].coeffs[4], 0.5, 1e-3);
    assert_approx_eq!(exprs[0].coeffs[0], 0.0, 1e-3);
    assert_approx_eq!(exprs[0].value(&x).unwrap(), bot.distance);
    // the arm touches at a quarter of the motion
    assert_approx_eq!(exprs[1].coeffs[1], 0.75, 1e-2);
    assert_approx_eq!(exprs[1].coeffs[4], 0.25, 1e-2);

    // a discrete check at both ends misses the obstacle
    let evaluator = discrete(0.2, na::Isometry3::identity());
    assert!(evaluator.calc_dists(&x[..3]).unwrap().is_empty());
    assert!(evaluator.calc_dists(&x[3..]).unwrap().is_empty());
}

#[test]
fn test_cast_linearization_matches_finite_difference() {
    let vars = VarArray::new(2, 3, 0);
    let evaluator: CollisionEvaluator = CastCollisionEvaluator::new(
        manip(),
        &environment(),
        na::Isometry3::identity(),
        Arc::new(SafetyMarginData::new(0.2, 1.0)),
        vars.row(0),
        vars.row(1),
    )
    .unwrap()
    .into();
    // the arm points away from the obstacle, only the swept body is close
    let x = [-1.0, 0.4, FRAC_PI_2, 1.0, 0.5, FRAC_PI_2];
    let contacts = evaluator.get_collisions_cached(&x).unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].link_names[0], "bot_link");
    let expr = evaluator.calc_dist_expressions(&x).unwrap().remove(0);
    assert_eq!(expr.vars, evaluator.vars());

    let h = 1e-4;
    for i in [0, 1, 3, 4] {
        let mut plus = x;
        plus[i] += h;
        let mut minus = x;
        minus[i] -= h;
        let fd = (evaluator.calc_dists(&plus).unwrap()[0]
            - evaluator.calc_dists(&minus).unwrap()[0])
            / (2.0 * h);
        assert!(
            (expr.coeffs[i] - fd).abs() < 1e-3,
            "var {i}: {} != {fd}",
            expr.coeffs[i]
        );
    }
    // both ends move the body away from the obstacle
    assert!(expr.coeffs[1] > 0.0);
    assert!(expr.coeffs[4] > 0.0);
}

#[test]
fn test_cost_convexification_reduces_penalty() {
    let evaluator = Rc::new(discrete(0.25, na::Isometry3::identity()));
    let cost = CollisionCost::new("collision", evaluator);
    let x = [0.3, 0.4, 0.0];
    assert_approx_eq!(cost.value(&x).unwrap(), 0.05);

    let mut model = BasicModel::new(3);
    let convex = cost.convex(&x, &mut model).unwrap();
    assert_approx_eq!(convex.value(&x).unwrap(), 0.05);
    // moving away from the obstacle along the gradient
    let moved = [0.33, 0.44, 0.0];
    assert!(convex.value(&moved).unwrap() < 0.05);
    assert!(cost.value(&moved).unwrap() < 0.05);
}
