use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use armature_animation_core::{
    config::Config,
    data::LoopMode,
    layer::{AnimationLayer, AnimationModifier},
    pose::{Delta, Vec3},
    state::LayeredAnimationState,
    BakedTrack,
};
use parking_lot::Mutex;

fn track(xs: &[f32], step: f32) -> Arc<BakedTrack> {
    let deltas = xs
        .iter()
        .enumerate()
        .map(|(i, &x)| Delta {
            time_delta: if i == 0 { 0.0 } else { step },
            position: Some(Vec3::new(x, 0.0, 0.0)),
            ..Delta::default()
        })
        .collect();
    Arc::new(BakedTrack::new("bone", deltas))
}

fn active_x(state: &LayeredAnimationState) -> Option<f32> {
    state.active_delta().and_then(|d| d.position).map(|p| p.x)
}

#[test]
fn preempted_loop_restarts_from_its_first_keyframe() {
    let cfg = Config::default();
    let mut state = LayeredAnimationState::new();
    state
        .add(AnimationLayer::new(
            "idle",
            track(&[10.0, 11.0, 12.0, 13.0], 0.1),
            LoopMode::Loop,
            AnimationModifier::new(0, 0),
            None,
        ))
        .unwrap();

    for tick in 0..4 {
        state.resolve(tick, &cfg);
    }
    assert_eq!(active_x(&state), Some(12.0));
    assert_eq!(state.layer("idle").unwrap().cursor().index(), 3);

    state
        .add(AnimationLayer::new(
            "burst",
            track(&[50.0, 51.0], 0.1),
            LoopMode::Once,
            AnimationModifier::new(0, 0),
            None,
        ))
        .unwrap();

    let r = state.resolve(4, &cfg);
    assert_eq!(r.activated.as_deref(), Some("burst"));
    assert_eq!(state.delay_ticks(), 0);
    assert_eq!(active_x(&state), Some(50.0));
    assert_eq!(state.layer("idle").unwrap().cursor().index(), 0);

    state.resolve(5, &cfg);
    assert_eq!(active_x(&state), Some(51.0));
    state.resolve(6, &cfg);

    let r = state.resolve(7, &cfg);
    assert_eq!(r.removed.len(), 1);
    assert_eq!(r.removed[0].name(), "burst");
    assert_eq!(r.activated.as_deref(), Some("idle"));
    assert_eq!(state.delay_ticks(), 0);
    assert_eq!(active_x(&state), Some(10.0));
}

#[test]
fn hidden_top_layer_yields_to_lower_layer() {
    let cfg = Config::default();
    let visible = Arc::new(AtomicBool::new(true));
    let flag = visible.clone();
    let mut state = LayeredAnimationState::new();
    state
        .add(AnimationLayer::new(
            "base",
            track(&[1.0], 0.1),
            LoopMode::Hold,
            AnimationModifier::new(0, 0),
            None,
        ))
        .unwrap();
    state
        .add(AnimationLayer::new(
            "gesture",
            track(&[7.0, 8.0], 0.1),
            LoopMode::Loop,
            AnimationModifier::new(0, 0).with_predicate(move || flag.load(Ordering::SeqCst)),
            None,
        ))
        .unwrap();

    state.resolve(0, &cfg);
    assert_eq!(active_x(&state), Some(7.0));

    visible.store(false, Ordering::SeqCst);
    let r = state.resolve(1, &cfg);
    assert_eq!(r.activated.as_deref(), Some("base"));
    assert_eq!(active_x(&state), Some(1.0));
    assert_eq!(state.layer("gesture").unwrap().cursor().index(), 0);

    visible.store(true, Ordering::SeqCst);
    let r = state.resolve(2, &cfg);
    assert_eq!(r.activated.as_deref(), Some("gesture"));
    assert_eq!(active_x(&state), Some(7.0));
}

#[test]
fn speed_change_rescales_pending_delay() {
    let cfg = Config::default();
    let speed = Arc::new(Mutex::new(1.0f32));
    let source = speed.clone();
    let mut state = LayeredAnimationState::new();
    state
        .add(AnimationLayer::new(
            "walk",
            track(&[0.0, 1.0, 2.0], 0.5),
            LoopMode::Loop,
            AnimationModifier::new(0, 0).with_speed(move || *source.lock()),
            None,
        ))
        .unwrap();

    state.resolve(0, &cfg);
    state.resolve(1, &cfg);
    assert_eq!(state.delay_ticks(), 10);

    *speed.lock() = 2.0;
    state.resolve(2, &cfg);
    assert_eq!(state.delay_ticks(), 5);

    state.resolve(3, &cfg);
    assert_eq!(state.delay_ticks(), 4);
}

#[test]
fn faster_layers_pull_more_often() {
    let cfg = Config::default();
    let pulls = |speed: f32| {
        let mut state = LayeredAnimationState::new();
        state
            .add(AnimationLayer::new(
                "a",
                track(&[0.0, 1.0, 2.0, 3.0], 0.2),
                LoopMode::Loop,
                AnimationModifier::new(0, 0).with_constant_speed(speed),
                None,
            ))
            .unwrap();
        (0..40)
            .filter(|&tick| state.resolve(tick, &cfg).changed)
            .count()
    };
    let normal = pulls(1.0);
    let double = pulls(2.0);
    assert!(double > normal, "double={double} normal={normal}");
}

#[test]
fn end_frame_eases_out_before_removal() {
    let cfg = Config::default();
    let mut state = LayeredAnimationState::new();
    state
        .add(AnimationLayer::new(
            "nod",
            track(&[3.0], 0.1),
            LoopMode::Once,
            AnimationModifier::new(0, 4),
            None,
        ))
        .unwrap();

    state.resolve(0, &cfg);
    assert_eq!(active_x(&state), Some(3.0));
    let r = state.resolve(1, &cfg);
    assert!(r.removed.is_empty());
    assert!(state.active_delta().unwrap().is_empty());
    assert_eq!(state.delay_ticks(), 4);

    let mut removed_at = None;
    for tick in 2..10 {
        if !state.resolve(tick, &cfg).removed.is_empty() {
            removed_at = Some(tick);
            break;
        }
    }
    assert_eq!(removed_at, Some(5));
    assert!(state.active_delta().is_none());
}
