//! Armature Animation Core (engine-agnostic)
//!
//! Skeletal animation for tree-structured models: raw per-channel keyframes
//! are baked into resampled, delta-encoded tracks; each bone resolves one
//! active keyframe per tick from a stack of concurrently requested
//! animations; transforms propagate parent to child; FABRIK chains bend
//! toward moving targets afterwards.
//!
//! Hosts own everything around this: applying [`BoneMovement`]s to renderable
//! objects, transporting them, and supplying predicates and IK targets.

pub mod baking;
pub mod config;
pub mod cursor;
pub mod data;
pub mod error;
pub mod ids;
pub mod ik;
pub mod interp;
pub mod layer;
pub mod outputs;
pub mod pose;
pub mod skeleton;
pub mod state;
pub mod stored_animation;

// Re-exports for consumers (hosts)
pub use baking::{
    bake_animation, export_baked_json, BakedAnimation, BakedTrack, BoneHierarchy, FlatHierarchy,
};
pub use config::{Config, Features, IkConfig};
pub use cursor::AnimatorCursor;
pub use data::{CompositeSample, LoopMode, RawAnimation, RawBoneAnimation, SamplePoint};
pub use error::{AnimationError, Result};
pub use ids::{BoneId, ChainId};
pub use ik::{fabrik, IkChain, IkSolution};
pub use interp::{interpolate, BezierHandle, InterpolationStrategy};
pub use layer::{AnimationLayer, AnimationModifier, RemoveHook, TickMemo};
pub use outputs::{AnimationEvent, BoneMovement, RunningAnimation, TickOutputs};
pub use pose::{Delta, Pose, Quat, Transform, Vec3};
pub use skeleton::{BoneDef, BoneNode, Skeleton, TargetFn};
pub use state::{LayeredAnimationState, Resolution};
pub use stored_animation::{parse_raw_animation_json, parse_skeleton_json};
