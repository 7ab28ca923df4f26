use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use armature_animation_core::{
    parse_raw_animation_json, parse_skeleton_json, AnimationModifier, Config, RawAnimation,
    Skeleton, Vec3,
};

fn humanoid(config: Config) -> Skeleton {
    let json = armature_test_fixtures::skeletons::json("humanoid").unwrap();
    Skeleton::from_defs(parse_skeleton_json(&json).unwrap(), config).unwrap()
}

fn raw(name: &str) -> RawAnimation {
    let json = armature_test_fixtures::animations::json(name).unwrap();
    parse_raw_animation_json(&json).unwrap()
}

fn bake_benchmark(c: &mut Criterion) {
    let skeleton = humanoid(Config::default());
    let wave = raw("wave");

    c.bench_function("bake_wave", |b| {
        b.iter(|| black_box(skeleton.bake(black_box(&wave)).unwrap()))
    });
}

fn tick_benchmark(c: &mut Criterion) {
    let skeleton = humanoid(Config::default());
    for name in ["wave", "breathe"] {
        let baked = skeleton.bake(&raw(name)).unwrap();
        skeleton
            .animate(name, &baked, AnimationModifier::default(), || {})
            .unwrap();
    }

    c.bench_function("tick_humanoid_two_layers", |b| {
        b.iter(|| black_box(skeleton.tick()))
    });

    let ik = humanoid(Config::default());
    for (arm, hand) in [("left_arm", "left_hand"), ("right_arm", "right_hand")] {
        let chain = ik.register_ik_chain(arm, hand).unwrap().unwrap();
        let target = ik.bone_transform(arm).unwrap().position + Vec3::new(0.0, 0.4, 0.1);
        ik.set_ik_target(chain, move || Some(target)).unwrap();
    }

    c.bench_function("tick_humanoid_two_ik_chains", |b| {
        b.iter(|| black_box(ik.tick()))
    });
}

criterion_group!(benches, bake_benchmark, tick_benchmark);
criterion_main!(benches);
