//! Per-bone layered animation state and the recency-priority resolution walk.

use std::sync::Arc;

use hashbrown::HashMap;
use log::trace;

use crate::baking::BakedTrack;
use crate::config::Config;
use crate::data::LoopMode;
use crate::error::{AnimationError, Result};
use crate::layer::{AnimationLayer, AnimationModifier};
use crate::pose::Delta;

/// What one resolution pass changed.
#[derive(Debug, Default)]
pub struct Resolution {
    /// The active delta differs from the previous tick.
    pub changed: bool,
    /// Name of a layer that became active during this pass.
    pub activated: Option<String>,
    /// Layers removed because they ran out of frames.
    pub removed: Vec<AnimationLayer>,
}

/// Insertion-ordered layers of one bone. The most recently added layer has
/// the highest priority.
#[derive(Debug, Default)]
pub struct LayeredAnimationState {
    layers: Vec<AnimationLayer>,
    index: HashMap<String, usize>,
    active: Option<String>,
    active_delta: Option<Delta>,
    delay_ticks: u32,
}

impl LayeredAnimationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn layer(&self, name: &str) -> Option<&AnimationLayer> {
        self.index.get(name).map(|&i| &self.layers[i])
    }

    /// Layer names from lowest to highest priority.
    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(AnimationLayer::name)
    }

    pub fn active_layer(&self) -> Option<&AnimationLayer> {
        self.active.as_deref().and_then(|name| self.layer(name))
    }

    #[inline]
    pub fn active_delta(&self) -> Option<&Delta> {
        self.active_delta.as_ref()
    }

    #[inline]
    pub fn delay_ticks(&self) -> u32 {
        self.delay_ticks
    }

    /// Add a layer on top. Fails if a layer with the same name is already present.
    pub fn add(&mut self, layer: AnimationLayer) -> Result<()> {
        if self.contains(layer.name()) {
            return Err(AnimationError::invalid_operation(format!(
                "animation '{}' is already running; use replace",
                layer.name()
            )));
        }
        self.index.insert(layer.name().to_string(), self.layers.len());
        self.layers.push(layer);
        Ok(())
    }

    /// Restart an existing layer with a new track, keeping its priority.
    /// Returns `false` if no layer has that name.
    pub fn replace(
        &mut self,
        name: &str,
        track: Arc<BakedTrack>,
        mode: LoopMode,
        modifier: AnimationModifier,
    ) -> bool {
        let Some(&i) = self.index.get(name) else {
            return false;
        };
        self.layers[i].replace(track, mode, modifier);
        if self.active.as_deref() == Some(name) {
            self.delay_ticks = 0;
        }
        true
    }

    /// Remove a layer by name. The active delta is kept until the next resolution.
    pub fn remove(&mut self, name: &str) -> Option<AnimationLayer> {
        let i = *self.index.get(name)?;
        Some(self.remove_at(i))
    }

    /// Remove every layer.
    pub fn clear(&mut self) -> Vec<AnimationLayer> {
        self.index.clear();
        self.active = None;
        self.delay_ticks = 0;
        std::mem::take(&mut self.layers)
    }

    /// Copy the layers of `other` that this state does not already have.
    /// Copies go on top, in their original order.
    pub fn extend_from(&mut self, other: &LayeredAnimationState) -> usize {
        let mut copied = 0;
        for layer in &other.layers {
            if self.contains(layer.name()) {
                continue;
            }
            self.index.insert(layer.name().to_string(), self.layers.len());
            self.layers.push(layer.detached_copy());
            copied += 1;
        }
        copied
    }

    fn remove_at(&mut self, i: usize) -> AnimationLayer {
        let layer = self.layers.remove(i);
        self.index.remove(layer.name());
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        if self.active.as_deref() == Some(layer.name()) {
            self.active = None;
            self.delay_ticks = 0;
        }
        layer
    }

    fn set_active_delta(&mut self, delta: Delta, cfg: &Config, hard_cut: bool) {
        self.delay_ticks = if hard_cut {
            0
        } else {
            cfg.seconds_to_ticks(delta.time_delta)
        };
        self.active_delta = Some(delta);
    }

    /// Resolve this tick's active delta.
    pub fn resolve(&mut self, tick: u64, cfg: &Config) -> Resolution {
        let mut out = Resolution::default();
        self.delay_ticks = self.delay_ticks.saturating_sub(1);
        // Set once the active layer exhausts in this pass; the fallback becomes active with no delay.
        let mut fallback = false;

        let mut i = self.layers.len();
        while i > 0 {
            i -= 1;
            if !self.layers[i].is_visible(tick) {
                continue;
            }
            let is_active = self.active.as_deref() == Some(self.layers[i].name());

            if is_active && self.delay_ticks > 0 {
                let layer = &mut self.layers[i];
                layer.speed(tick, cfg.min_speed);
                let ratio = layer.delta_speed();
                if ratio.is_finite() && ratio > 0.0 && (ratio - 1.0).abs() > 1e-3 {
                    self.delay_ticks = (self.delay_ticks as f32 / ratio).round() as u32;
                }
                if self.active_delta.is_none() {
                    self.active_delta = layer.last_delta().cloned();
                    out.changed = true;
                }
                return out;
            }

            match self.layers[i].next_delta(tick, cfg) {
                Some(delta) => {
                    if is_active {
                        self.set_active_delta(delta, cfg, false);
                    } else {
                        let hard_cut = self.active.is_some() || fallback;
                        if let Some(previous) = self.active.take() {
                            if let Some(&j) = self.index.get(&previous) {
                                self.layers[j].reset();
                            }
                        }
                        let name = self.layers[i].name().to_string();
                        trace!("layer '{name}' activated (hard cut: {hard_cut})");
                        self.active = Some(name.clone());
                        out.activated = Some(name);
                        self.set_active_delta(delta, cfg, hard_cut);
                    }
                    out.changed = true;
                    return out;
                }
                None => {
                    if is_active {
                        fallback = true;
                    }
                    let removed = self.remove_at(i);
                    trace!("layer '{}' exhausted", removed.name());
                    out.removed.push(removed);
                }
            }
        }

        // No eligible layer. A hidden active layer keeps its countdown for when it reappears.
        if self.active_delta.take().is_some() {
            out.changed = true;
        }
        out
    }
}
