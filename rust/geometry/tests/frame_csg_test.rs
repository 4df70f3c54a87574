// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use approx::assert_relative_eq;
use stage_geometry::primitives;
use stage_geometry::{BooleanEvaluator, BooleanOp, Brush, FrameNormalizer, Mesh, Transform};
use stage_geometry::{Matrix4, UnitQuaternion, Vector3};

fn assert_same_solid(a: &Mesh, b: &Mesh) {
    assert_relative_eq!(a.volume(), b.volume(), epsilon = 2e-3);
    let (min_a, max_a) = a.bounds();
    let (min_b, max_b) = b.bounds();
    assert_relative_eq!(min_a, min_b, epsilon = 1e-3);
    assert_relative_eq!(max_a, max_b, epsilon = 1e-3);
}

/// Evaluate in the de-scaled zone frame and map the result back to world space
/// the way the scene graph composes it: zone matrix times result matrix.
fn evaluate_normalized(zone: &Transform, other_world: &Mesh, op: BooleanOp) -> Mesh {
    let normalizer = FrameNormalizer::new();
    let frame = normalizer.normalize(zone).unwrap();

    let mut zone_brush = Brush::new(primitives::cuboid());
    zone_brush.apply_matrix(&frame.scale_matrix());

    let mut other = Brush::new(other_world.clone());
    other.apply_matrix(&frame.world_to_unit());

    let mut result = BooleanEvaluator::new()
        .evaluate(&zone_brush, &other, op)
        .unwrap();
    normalizer.denormalize(&mut result, &frame.inverse_scale);

    let world: Matrix4<f64> = zone.to_matrix() * result.matrix();
    result.mesh.transformed(&world)
}

#[test]
fn normalized_evaluation_matches_direct_evaluation() {
    let scales = [
        Vector3::new(2.0, 1.0, 0.5),
        Vector3::new(1.0, 3.0, 1.0),
        Vector3::new(0.25, 0.25, 4.0),
    ];
    let sphere = Brush::with_transform(
        primitives::sphere(0.8, 16, 16),
        Transform::from_position(Vector3::new(0.6, 0.2, -0.1)),
    )
    .world_mesh();

    for scale in scales {
        let zone = Transform::new(
            Vector3::new(0.3, -0.2, 0.1),
            UnitQuaternion::from_euler_angles(0.0, 0.4, 0.0),
            scale,
        );

        for op in [BooleanOp::Intersection, BooleanOp::Subtraction] {
            let direct = BooleanEvaluator::new()
                .evaluate(
                    &Brush::with_transform(primitives::cuboid(), zone),
                    &Brush::new(sphere.clone()),
                    op,
                )
                .unwrap()
                .mesh;
            let normalized = evaluate_normalized(&zone, &sphere, op);
            assert_same_solid(&direct, &normalized);
        }
    }
}

#[test]
fn visible_and_occluded_reconstitute_the_zone() {
    let evaluator = BooleanEvaluator::new();
    let zone = Brush::with_transform(
        primitives::cuboid(),
        Transform::identity().with_scale(Vector3::new(2.0, 2.0, 2.0)),
    );
    let capture = Brush::with_transform(
        primitives::view_frustum(1.2, 0.9, 0.2, 4.0),
        Transform::from_position(Vector3::new(0.0, 0.0, -0.5)),
    );

    let visible = evaluator.evaluate(&zone, &capture, BooleanOp::Intersection).unwrap();
    let occluded = evaluator.evaluate(&zone, &capture, BooleanOp::Subtraction).unwrap();
    assert!(visible.volume() > 0.1);
    assert!(occluded.volume() > 0.1);

    let rebuilt = evaluator.evaluate(&visible, &occluded, BooleanOp::Union).unwrap();
    assert_relative_eq!(rebuilt.volume(), zone.volume(), epsilon = 5e-3);
    assert_relative_eq!(visible.volume() + occluded.volume(), zone.volume(), epsilon = 5e-3);
}

#[test]
fn union_accumulation_is_order_independent() {
    let evaluator = BooleanEvaluator::new();
    let ranges = [
        Brush::with_transform(primitives::pyramid(1.0, 1.0, 3.0), Transform::identity()),
        Brush::with_transform(
            primitives::cuboid(),
            Transform::from_position(Vector3::new(0.4, 0.1, 1.5)),
        ),
        Brush::with_transform(
            primitives::sphere(0.7, 16, 16),
            Transform::from_position(Vector3::new(-0.5, 0.0, 2.0)),
        ),
    ];
    let orders = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    let accumulate = |order: &[usize; 3]| -> Brush {
        order.iter().fold(Brush::default(), |acc, &i| {
            evaluator.evaluate(&acc, &ranges[i], BooleanOp::Union).unwrap()
        })
    };

    let reference = accumulate(&orders[0]);
    for order in &orders[1..] {
        let union = accumulate(order);
        assert_same_solid(&reference.mesh, &union.mesh);
    }
}
