//! Output contracts from the skeleton tick.
//!
//! Outputs carry the resolved transform of every bone, in arena order, plus a
//! separate list of semantic events. Hosts turn them into whatever
//! renderable or network form they need.

use serde::{Deserialize, Serialize};

use crate::data::LoopMode;
use crate::ids::BoneId;
use crate::pose::{Delta, Transform};

/// One bone's resolved model-space transform for this tick.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoneMovement {
    pub bone: BoneId,
    pub name: String,
    pub transform: Transform,
    /// The active delta the transform was built from (`None` = static pose).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<Delta>,
}

/// Introspection descriptor for the animation currently driving a bone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningAnimation {
    pub name: String,
    pub loop_mode: LoopMode,
}

/// Discrete semantic signals emitted during a tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AnimationEvent {
    /// A layer took over a bone (first activation or preemption).
    LayerActivated { bone: String, animation: String },
    /// A layer ran out of frames and was removed from a bone.
    LayerRemoved { bone: String, animation: String },
    /// Every bone layer created by one `animate` call is gone.
    AnimationFinished { animation: String },
}

/// Outputs returned by `Skeleton::tick()`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TickOutputs {
    pub tick: u64,
    #[serde(default)]
    pub movements: Vec<BoneMovement>,
    #[serde(default)]
    pub events: Vec<AnimationEvent>,
}

impl TickOutputs {
    #[inline]
    pub fn push_movement(&mut self, movement: BoneMovement) {
        self.movements.push(movement);
    }

    #[inline]
    pub fn push_event(&mut self, event: AnimationEvent) {
        self.events.push(event);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.movements.is_empty() && self.events.is_empty()
    }

    pub fn movement(&self, name: &str) -> Option<&BoneMovement> {
        self.movements.iter().find(|m| m.name == name)
    }
}
