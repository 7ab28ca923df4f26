//! Forward-only readers over a baked track.

use std::sync::Arc;

use crate::baking::BakedTrack;
use crate::data::LoopMode;
use crate::pose::Delta;

#[derive(Clone, Debug)]
pub enum AnimatorCursor {
    /// Plays through once; `reset()` is a no-op after exhaustion.
    PlayOnce { track: Arc<BakedTrack>, index: usize },
    /// Cycles forever; `reset()` rewinds to the first keyframe.
    Loop { track: Arc<BakedTrack>, index: usize },
    /// Plays through once, then repeats the final keyframe with no time delta.
    Hold { track: Arc<BakedTrack>, index: usize },
}

impl AnimatorCursor {
    pub fn new(track: Arc<BakedTrack>, mode: LoopMode) -> Self {
        match mode {
            LoopMode::Once => Self::PlayOnce { track, index: 0 },
            LoopMode::Loop => Self::Loop { track, index: 0 },
            LoopMode::Hold => Self::Hold { track, index: 0 },
        }
    }

    pub fn mode(&self) -> LoopMode {
        match self {
            Self::PlayOnce { .. } => LoopMode::Once,
            Self::Loop { .. } => LoopMode::Loop,
            Self::Hold { .. } => LoopMode::Hold,
        }
    }

    pub fn track(&self) -> &Arc<BakedTrack> {
        match self {
            Self::PlayOnce { track, .. } | Self::Loop { track, .. } | Self::Hold { track, .. } => {
                track
            }
        }
    }

    /// Position of the next keyframe to be returned.
    pub fn index(&self) -> usize {
        match self {
            Self::PlayOnce { index, .. } | Self::Loop { index, .. } | Self::Hold { index, .. } => {
                *index
            }
        }
    }

    pub fn has_next(&self) -> bool {
        match self {
            Self::PlayOnce { track, index } => *index < track.len(),
            Self::Loop { track, .. } | Self::Hold { track, .. } => !track.is_empty(),
        }
    }

    pub fn next(&mut self) -> Option<Delta> {
        match self {
            Self::PlayOnce { track, index } => {
                let delta = track.get(*index)?.clone();
                *index += 1;
                Some(delta)
            }
            Self::Loop { track, index } => {
                if track.is_empty() {
                    return None;
                }
                let delta = track.get(*index % track.len())?.clone();
                *index = (*index + 1) % track.len();
                Some(delta)
            }
            Self::Hold { track, index } => match track.get(*index) {
                Some(delta) => {
                    let delta = delta.clone();
                    *index += 1;
                    Some(delta)
                }
                None => track.deltas.last().map(|d| d.with_time_delta(0.0)),
            },
        }
    }

    /// Rewind to the first keyframe. Returns `false` when nothing was rewound.
    pub fn reset(&mut self) -> bool {
        match self {
            Self::PlayOnce { track, index } => {
                if *index >= track.len() {
                    return false;
                }
                *index = 0;
                true
            }
            Self::Loop { index, .. } | Self::Hold { index, .. } => {
                *index = 0;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Vec3;

    fn track(n: usize) -> Arc<BakedTrack> {
        let deltas = (0..n)
            .map(|i| Delta {
                time_delta: if i == 0 { 0.0 } else { 0.1 },
                position: Some(Vec3::new(i as f32, 0.0, 0.0)),
                ..Delta::default()
            })
            .collect();
        Arc::new(BakedTrack::new("bone", deltas))
    }

    #[test]
    fn play_once_exhausts_permanently() {
        let mut c = AnimatorCursor::new(track(3), LoopMode::Once);
        for _ in 0..3 {
            assert!(c.has_next());
            assert!(c.next().is_some());
        }
        assert!(!c.has_next());
        assert!(c.next().is_none());
        assert!(!c.reset());
        assert!(!c.has_next());
    }

    #[test]
    fn play_once_rewinds_before_exhaustion() {
        let mut c = AnimatorCursor::new(track(3), LoopMode::Once);
        c.next();
        assert!(c.reset());
        assert_eq!(c.index(), 0);
    }

    #[test]
    fn loop_wraps_to_first_keyframe() {
        let t = track(4);
        let mut c = AnimatorCursor::new(t.clone(), LoopMode::Loop);
        for _ in 0..4 {
            c.next();
        }
        assert_eq!(c.next().as_ref(), t.get(0));
        c.next();
        assert!(c.reset());
        assert_eq!(c.next().as_ref(), t.get(0));
    }

    #[test]
    fn hold_repeats_last_keyframe() {
        let t = track(2);
        let mut c = AnimatorCursor::new(t.clone(), LoopMode::Hold);
        c.next();
        c.next();
        let held = c.next().unwrap();
        assert_eq!(held.position, t.get(1).unwrap().position);
        assert_eq!(held.time_delta, 0.0);
        assert!(c.has_next());
    }

    #[test]
    fn empty_track_never_yields() {
        for mode in [LoopMode::Once, LoopMode::Loop, LoopMode::Hold] {
            let mut c = AnimatorCursor::new(Arc::new(BakedTrack::default()), mode);
            assert!(!c.has_next());
            assert!(c.next().is_none());
        }
    }
}
