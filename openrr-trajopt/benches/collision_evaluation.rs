use std::{rc::Rc, sync::Arc};

use criterion::{criterion_group, criterion_main, Criterion};
use k::nalgebra as na;
use openrr_trajopt::{
    generate_random_joint_positions_from_limits,
    sco::{Constraint, Cost, VarArray},
    CastCollisionEvaluator, CollisionConstraint, CollisionCost, CollisionDetector,
    CollisionEvaluator, FromUrdf, Manipulator, SafetyMarginData, SingleTimestepCollisionEvaluator,
};

fn setup() -> (Arc<Manipulator>, CollisionDetector) {
    let joint_names = ["x_joint", "y_joint", "arm_joint"]
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>();
    let manip = Arc::new(Manipulator::from_urdf_file("spherebot.urdf", &joint_names).unwrap());
    let mut detector = CollisionDetector::from_urdf_file("spherebot.urdf").unwrap();
    detector.add_obstacles_from_urdf_robot(&urdf_rs::read_file("obstacles.urdf").unwrap());
    (manip, detector)
}

fn bench_single_timestep_evaluation(c: &mut Criterion) {
    let (manip, detector) = setup();
    let limits = manip.joint_limits();
    let evaluator = Rc::new(CollisionEvaluator::from(
        SingleTimestepCollisionEvaluator::new(
            manip,
            &detector,
            na::Isometry3::identity(),
            Arc::new(SafetyMarginData::new(0.3, 1.0)),
            VarArray::new(1, 3, 0).row(0),
        )
        .unwrap(),
    ));
    let cost = CollisionCost::new("collision", evaluator.clone());
    let constraint = CollisionConstraint::new("collision", evaluator);

    c.bench_function("bench_single_timestep_evaluation", |b| {
        b.iter(|| {
            let x = generate_random_joint_positions_from_limits(&limits);
            cost.value(&x).unwrap();
        });
    });

    // the constraint reuses the contacts of the cost
    c.bench_function("bench_single_timestep_cost_and_constraint", |b| {
        b.iter(|| {
            let x = generate_random_joint_positions_from_limits(&limits);
            cost.value(&x).unwrap();
            constraint.value(&x).unwrap();
        });
    });
}

fn bench_cast_evaluation(c: &mut Criterion) {
    let (manip, detector) = setup();
    let limits = manip.joint_limits();
    let vars = VarArray::new(2, 3, 0);
    let evaluator = Rc::new(CollisionEvaluator::from(
        CastCollisionEvaluator::new(
            manip,
            &detector,
            na::Isometry3::identity(),
            Arc::new(SafetyMarginData::new(0.3, 1.0)),
            vars.row(0),
            vars.row(1),
        )
        .unwrap(),
    ));
    let cost = CollisionCost::new("cast_collision", evaluator);

    c.bench_function("bench_cast_evaluation", |b| {
        b.iter(|| {
            let mut x = generate_random_joint_positions_from_limits(&limits);
            x.extend(generate_random_joint_positions_from_limits(&limits));
            cost.value(&x).unwrap();
        });
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(100);
    targets = bench_single_timestep_evaluation, bench_cast_evaluation);
criterion_main!(benches);
