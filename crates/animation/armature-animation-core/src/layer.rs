//! Animation layers: one named animation request on one bone.
//!
//! A layer wraps an [`AnimatorCursor`] with the blend framing the per-bone
//! state machine relies on: a synthetic start frame that eases into the
//! track's first keyframe, an optional empty end frame that eases back out,
//! and speed scaling of every delta in between.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::baking::BakedTrack;
use crate::config::Config;
use crate::cursor::AnimatorCursor;
use crate::data::LoopMode;
use crate::pose::Delta;

/// A supplier evaluated at most once per tick, shared by every layer that holds it.
pub struct TickMemo<T: Copy> {
    source: Arc<dyn Fn() -> T + Send + Sync>,
    cache: Mutex<Option<(u64, T)>>,
}

impl<T: Copy> TickMemo<T> {
    pub fn new(source: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            source: Arc::new(source),
            cache: Mutex::new(None),
        }
    }

    pub fn get(&self, tick: u64) -> T {
        let mut cache = self.cache.lock();
        match *cache {
            Some((at, value)) if at == tick => value,
            _ => {
                let value = (*self.source)();
                *cache = Some((tick, value));
                value
            }
        }
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for TickMemo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickMemo")
            .field("cached", &*self.cache.lock())
            .finish()
    }
}

/// Per-request playback settings.
///
/// Cloning shares the speed and predicate memos, so every bone animated from
/// one modifier observes the same per-tick values.
#[derive(Clone, Debug)]
pub struct AnimationModifier {
    /// Ticks spent easing from the current pose into the first keyframe.
    pub start_ticks: u32,
    /// Ticks spent easing back out once the track is exhausted (0 = none).
    pub end_ticks: u32,
    pub speed: Arc<TickMemo<f32>>,
    pub predicate: Arc<TickMemo<bool>>,
    /// Overrides the loop mode stored with the baked animation.
    pub loop_override: Option<LoopMode>,
}

impl Default for AnimationModifier {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

impl AnimationModifier {
    pub fn new(start_ticks: u32, end_ticks: u32) -> Self {
        Self {
            start_ticks,
            end_ticks,
            speed: Arc::new(TickMemo::new(|| 1.0)),
            predicate: Arc::new(TickMemo::new(|| true)),
            loop_override: None,
        }
    }

    pub fn with_speed(mut self, speed: impl Fn() -> f32 + Send + Sync + 'static) -> Self {
        self.speed = Arc::new(TickMemo::new(speed));
        self
    }

    pub fn with_constant_speed(self, speed: f32) -> Self {
        self.with_speed(move || speed)
    }

    pub fn with_predicate(mut self, predicate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Arc::new(TickMemo::new(predicate));
        self
    }

    pub fn with_loop_mode(mut self, mode: LoopMode) -> Self {
        self.loop_override = Some(mode);
        self
    }
}

/// Fires a callback once the last of `count` layers has been released.
pub struct RemoveHook {
    remaining: AtomicUsize,
    callback: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl RemoveHook {
    pub fn new(count: usize, callback: impl FnOnce() + Send + 'static) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            callback: Mutex::new(Some(Box::new(callback))),
        }
    }

    /// Release one layer. Returns `true` if this release ran the callback.
    pub fn release(&self) -> bool {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous != 1 {
            return false;
        }
        let callback = self.callback.lock().take();
        match callback {
            Some(cb) => {
                cb();
                true
            }
            None => false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }
}

impl fmt::Debug for RemoveHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoveHook")
            .field("remaining", &self.remaining())
            .finish()
    }
}

#[derive(Debug)]
pub struct AnimationLayer {
    name: String,
    cursor: AnimatorCursor,
    modifier: AnimationModifier,
    hook: Option<Arc<RemoveHook>>,
    started: bool,
    ended: bool,
    speed: f32,
    previous_speed: f32,
    speed_tick: Option<u64>,
    last_delta: Option<Delta>,
}

impl AnimationLayer {
    pub fn new(
        name: impl Into<String>,
        track: Arc<BakedTrack>,
        mode: LoopMode,
        modifier: AnimationModifier,
        hook: Option<Arc<RemoveHook>>,
    ) -> Self {
        let mode = modifier.loop_override.unwrap_or(mode);
        Self {
            name: name.into(),
            cursor: AnimatorCursor::new(track, mode),
            modifier,
            hook,
            started: false,
            ended: false,
            speed: 1.0,
            previous_speed: 1.0,
            speed_tick: None,
            last_delta: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn loop_mode(&self) -> LoopMode {
        self.cursor.mode()
    }

    #[inline]
    pub fn cursor(&self) -> &AnimatorCursor {
        &self.cursor
    }

    pub fn modifier(&self) -> &AnimationModifier {
        &self.modifier
    }

    pub(crate) fn take_hook(&mut self) -> Option<Arc<RemoveHook>> {
        self.hook.take()
    }

    /// The delta most recently handed out by [`Self::next_delta`].
    pub fn last_delta(&self) -> Option<&Delta> {
        self.last_delta.as_ref()
    }

    pub fn is_visible(&self, tick: u64) -> bool {
        self.modifier.predicate.get(tick)
    }

    /// Current speed, refreshed at most once per tick and clamped to `min_speed`.
    pub fn speed(&mut self, tick: u64, min_speed: f32) -> f32 {
        if self.speed_tick != Some(tick) {
            let raw = self.modifier.speed.get(tick);
            let floor = min_speed.max(f32::EPSILON);
            let speed = if raw.is_finite() { raw.max(floor) } else { floor };
            self.previous_speed = self.speed;
            self.speed = speed;
            self.speed_tick = Some(tick);
        }
        self.speed
    }

    /// Ratio of the current speed to the one observed before it.
    #[inline]
    pub fn delta_speed(&self) -> f32 {
        self.speed / self.previous_speed
    }

    /// Whether another delta (keyframe or synthetic frame) can still be pulled.
    pub fn has_pending(&self) -> bool {
        (!self.started && !self.cursor.track().is_empty())
            || self.cursor.has_next()
            || (!self.ended && self.modifier.end_ticks > 0)
    }

    /// Pull the next delta: the start frame, then speed-scaled keyframes, then the end frame.
    pub fn next_delta(&mut self, tick: u64, cfg: &Config) -> Option<Delta> {
        let delta = self.pull(tick, cfg);
        if delta.is_some() {
            self.last_delta = delta.clone();
        }
        delta
    }

    fn pull(&mut self, tick: u64, cfg: &Config) -> Option<Delta> {
        if !self.started {
            self.started = true;
            if let Some(first) = self.cursor.next() {
                return Some(first.with_time_delta(cfg.ticks_to_seconds(self.modifier.start_ticks)));
            }
        }
        let speed = self.speed(tick, cfg.min_speed);
        if let Some(delta) = self.cursor.next() {
            return Some(delta.with_time_delta(delta.time_delta / speed));
        }
        if !self.ended && self.modifier.end_ticks > 0 {
            self.ended = true;
            return Some(Delta::empty(cfg.ticks_to_seconds(self.modifier.end_ticks)));
        }
        None
    }

    /// Rewind after being preempted. Exhausted play-once layers stay exhausted.
    pub fn reset(&mut self) {
        if self.cursor.reset() {
            self.started = false;
            self.ended = false;
        }
    }

    /// Swap in a new track and modifier, restarting playback.
    pub fn replace(&mut self, track: Arc<BakedTrack>, mode: LoopMode, modifier: AnimationModifier) {
        let mode = modifier.loop_override.unwrap_or(mode);
        self.cursor = AnimatorCursor::new(track, mode);
        self.modifier = modifier;
        self.started = false;
        self.ended = false;
        self.speed_tick = None;
    }

    /// A fresh copy of this layer for another bone; the removal hook is not carried over.
    pub fn detached_copy(&self) -> Self {
        Self {
            name: self.name.clone(),
            cursor: self.cursor.clone(),
            modifier: self.modifier.clone(),
            hook: None,
            started: self.started,
            ended: self.ended,
            speed: self.speed,
            previous_speed: self.previous_speed,
            speed_tick: self.speed_tick,
            last_delta: self.last_delta.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Vec3;
    use std::sync::atomic::AtomicU32;

    fn track() -> Arc<BakedTrack> {
        Arc::new(BakedTrack::new(
            "bone",
            vec![
                Delta {
                    time_delta: 0.0,
                    position: Some(Vec3::new(1.0, 0.0, 0.0)),
                    ..Delta::default()
                },
                Delta {
                    time_delta: 0.5,
                    position: Some(Vec3::new(2.0, 0.0, 0.0)),
                    ..Delta::default()
                },
            ],
        ))
    }

    #[test]
    fn start_and_end_frames_wrap_the_track() {
        let cfg = Config::default();
        let mut layer = AnimationLayer::new(
            "walk",
            track(),
            LoopMode::Once,
            AnimationModifier::new(4, 2),
            None,
        );
        let start = layer.next_delta(0, &cfg).unwrap();
        assert!((start.time_delta - 0.2).abs() < 1e-6);
        assert_eq!(start.position, Some(Vec3::new(1.0, 0.0, 0.0)));
        let body = layer.next_delta(1, &cfg).unwrap();
        assert_eq!(body.position, Some(Vec3::new(2.0, 0.0, 0.0)));
        let end = layer.next_delta(2, &cfg).unwrap();
        assert!(end.is_empty());
        assert!((end.time_delta - 0.1).abs() < 1e-6);
        assert!(!layer.has_pending());
        assert!(layer.next_delta(3, &cfg).is_none());
    }

    #[test]
    fn speed_divides_time_delta_and_clamps() {
        let cfg = Config::default();
        let mut layer = AnimationLayer::new(
            "walk",
            track(),
            LoopMode::Once,
            AnimationModifier::new(0, 0).with_constant_speed(2.0),
            None,
        );
        layer.next_delta(0, &cfg);
        let body = layer.next_delta(1, &cfg).unwrap();
        assert!((body.time_delta - 0.25).abs() < 1e-6);

        let mut stalled = AnimationLayer::new(
            "stalled",
            track(),
            LoopMode::Loop,
            AnimationModifier::new(0, 0).with_constant_speed(-3.0),
            None,
        );
        assert_eq!(stalled.speed(0, cfg.min_speed), cfg.min_speed);
    }

    #[test]
    fn speed_is_memoized_per_tick() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let modifier = AnimationModifier::default().with_speed(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            1.0
        });
        let mut a = AnimationLayer::new("a", track(), LoopMode::Loop, modifier.clone(), None);
        let mut b = AnimationLayer::new("a", track(), LoopMode::Loop, modifier, None);
        a.speed(7, 1e-3);
        b.speed(7, 1e-3);
        a.speed(7, 1e-3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        a.speed(8, 1e-3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn delta_speed_tracks_changes() {
        let speed = Arc::new(Mutex::new(1.0f32));
        let source = speed.clone();
        let mut layer = AnimationLayer::new(
            "a",
            track(),
            LoopMode::Loop,
            AnimationModifier::default().with_speed(move || *source.lock()),
            None,
        );
        layer.speed(0, 1e-3);
        *speed.lock() = 2.0;
        layer.speed(1, 1e-3);
        assert!((layer.delta_speed() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn remove_hook_fires_on_last_release_only() {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();
        let hook = RemoveHook::new(2, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!hook.release());
        assert!(hook.release());
        assert!(!hook.release());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn loop_override_wins() {
        let layer = AnimationLayer::new(
            "a",
            track(),
            LoopMode::Once,
            AnimationModifier::default().with_loop_mode(LoopMode::Hold),
            None,
        );
        assert_eq!(layer.loop_mode(), LoopMode::Hold);
    }
}
