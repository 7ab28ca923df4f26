use armature_animation_core::{
    data::RawAnimation, interp::InterpolationStrategy, parse_raw_animation_json,
    parse_skeleton_json, Config, Skeleton, Vec3,
};

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

fn load(name: &str) -> RawAnimation {
    let json = armature_test_fixtures::animations::json(name).expect("load animation fixture");
    parse_raw_animation_json(&json).expect("parse animation fixture")
}

#[test]
fn every_fixture_parses_and_bakes_against_every_skeleton() {
    for skeleton_name in armature_test_fixtures::skeletons::keys() {
        let json = armature_test_fixtures::skeletons::json(&skeleton_name).unwrap();
        let skeleton = Skeleton::from_defs(parse_skeleton_json(&json).unwrap(), Config::default())
            .unwrap_or_else(|e| panic!("skeleton {skeleton_name}: {e}"));
        for name in armature_test_fixtures::animations::keys() {
            let baked = skeleton
                .bake(&load(&name))
                .unwrap_or_else(|e| panic!("bake {name} on {skeleton_name}: {e}"));
            assert_eq!(baked.name, name);
            assert!(!baked.tracks.is_empty(), "{name}");
        }
    }
}

#[test]
fn wave_fixture_preserves_strategies_and_handles() {
    let wave = load("wave");
    approx(wave.length, 2.0, 1e-6);

    let arm = &wave.bones["right_arm"];
    assert_eq!(arm.rotation.len(), 4);
    match arm.rotation[1].strategy {
        InterpolationStrategy::Bezier {
            left: Some(left),
            right: Some(right),
        } => {
            approx(left.time.x, -0.15, 1e-6);
            approx(right.time.z, 0.15, 1e-6);
        }
        other => panic!("unexpected strategy {other:?}"),
    }
    // A bare "bezier" keeps the default handles.
    assert!(matches!(
        arm.rotation[3].strategy,
        InterpolationStrategy::Bezier {
            left: None,
            right: None
        }
    ));

    let forearm = &wave.bones["right_forearm"];
    assert_eq!(forearm.rotation[0].strategy, InterpolationStrategy::Linear);
    assert_eq!(forearm.rotation[2].strategy, InterpolationStrategy::CatmullRom);

    // Scale multipliers become offsets from identity.
    let hand = &wave.bones["right_hand"];
    assert_eq!(hand.scale[0].vector, Vec3::zeros());
    approx(hand.scale[1].vector.x, 0.2, 1e-6);
    assert_eq!(hand.scale[1].strategy, InterpolationStrategy::Step);
}

#[test]
fn humanoid_fixture_is_ordered_parents_first() {
    let json = armature_test_fixtures::skeletons::json("humanoid").unwrap();
    let skeleton = Skeleton::from_defs(parse_skeleton_json(&json).unwrap(), Config::default())
        .unwrap();
    assert_eq!(skeleton.len(), 17);
    for bone in skeleton.bones() {
        if let Some(parent) = bone.parent() {
            assert!(parent < bone.id(), "{} before its parent", bone.name());
        }
    }
    let head = skeleton.bone_transform("head").unwrap();
    approx(head.position.y, 1.8, 1e-5);
}
