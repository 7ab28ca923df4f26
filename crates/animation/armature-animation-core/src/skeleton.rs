//! Skeleton: an arena of bone nodes, their layered animation state, transform
//! propagation and IK.
//!
//! Bones live in a `Vec` indexed by [`BoneId`], parents before children. Each
//! node guards its mutable state (layers, cached transform, IK override) with
//! its own lock, so callers may start and stop animations from any thread
//! while another thread ticks. Ticking, IK solving and transform queries are
//! serialized with a separate step lock.
//!
//! Tick order: resolve every bone's layers, invalidate changed subtrees,
//! solve IK chains that have a target supplier, then emit one movement per bone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::baking::{bake_animation, BakedAnimation, BoneHierarchy};
use crate::config::Config;
use crate::data::RawAnimation;
use crate::error::{AnimationError, Result};
use crate::ids::{BoneId, ChainId, IdAllocator};
use crate::ik::{fabrik, solve_batch, IkChain, IkJob, IkSolution};
use crate::layer::{AnimationLayer, AnimationModifier, RemoveHook};
use crate::outputs::{AnimationEvent, BoneMovement, RunningAnimation, TickOutputs};
use crate::pose::{Pose, Quat, Transform, Vec3};
use crate::state::LayeredAnimationState;

/// Supplies an IK chain's model-space target each tick (`None` = leave the chain alone).
/// Suppliers run while the tick holds the skeleton's step lock and must not call back into it.
pub type TargetFn = dyn Fn() -> Option<Vec3> + Send + Sync;

/// Static description of one bone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneDef {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub pose: Pose,
}

impl BoneDef {
    pub fn new(name: impl Into<String>, parent: Option<&str>, pose: Pose) -> Self {
        Self {
            name: name.into(),
            parent: parent.map(str::to_string),
            pose,
        }
    }
}

#[derive(Debug, Default)]
struct BoneState {
    layers: LayeredAnimationState,
    cache: Option<Transform>,
    ik_rotation: Option<Quat>,
}

#[derive(Debug)]
pub struct BoneNode {
    id: BoneId,
    name: String,
    parent: Option<BoneId>,
    children: Vec<BoneId>,
    pose: Pose,
    state: Mutex<BoneState>,
}

impl BoneNode {
    #[inline]
    pub fn id(&self) -> BoneId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn parent(&self) -> Option<BoneId> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[BoneId] {
        &self.children
    }

    #[inline]
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Static pose plus active delta, with any IK rotation replacing the local rotation.
    fn local_transform(&self, state: &BoneState) -> Transform {
        let mut local = Transform::from_pose(&self.pose.plus(state.layers.active_delta()));
        if let Some(rotation) = state.ik_rotation {
            local.rotation = rotation;
        }
        local
    }
}

struct RegisteredChain {
    id: ChainId,
    chain: IkChain,
    target: Option<Arc<TargetFn>>,
}

pub struct Skeleton {
    config: Config,
    bones: Vec<BoneNode>,
    by_name: HashMap<String, BoneId>,
    tick: AtomicU64,
    chains: RwLock<Vec<RegisteredChain>>,
    chain_ids: Mutex<IdAllocator>,
    step: Mutex<()>,
}

impl std::fmt::Debug for Skeleton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Skeleton")
            .field("bones", &self.bones.len())
            .field("chains", &self.chains.read().len())
            .field("tick", &self.current_tick())
            .finish()
    }
}

impl BoneHierarchy for Skeleton {
    fn parent_of(&self, bone: &str) -> Option<String> {
        let id = self.by_name.get(bone)?;
        let parent = self.bones[id.index()].parent?;
        Some(self.bones[parent.index()].name.clone())
    }
}

impl Skeleton {
    /// Build a skeleton. Definitions may come in any order; names must be
    /// unique, parents must exist and the hierarchy must be acyclic.
    pub fn from_defs(defs: Vec<BoneDef>, config: Config) -> Result<Self> {
        let mut seen: HashMap<&str, usize> = HashMap::with_capacity(defs.len());
        for (i, def) in defs.iter().enumerate() {
            if seen.insert(def.name.as_str(), i).is_some() {
                return Err(AnimationError::DuplicateBone {
                    name: def.name.clone(),
                });
            }
        }
        for def in &defs {
            if let Some(parent) = &def.parent {
                if !seen.contains_key(parent.as_str()) {
                    return Err(AnimationError::InvalidSkeleton {
                        reason: format!("bone '{}' has unknown parent '{parent}'", def.name),
                    });
                }
            }
        }

        // Place parents before children; a pass that places nothing means a cycle.
        let mut order: Vec<usize> = Vec::with_capacity(defs.len());
        let mut placed: HashMap<&str, BoneId> = HashMap::with_capacity(defs.len());
        while order.len() < defs.len() {
            let before = order.len();
            for (i, def) in defs.iter().enumerate() {
                if placed.contains_key(def.name.as_str()) {
                    continue;
                }
                let ready = match &def.parent {
                    None => true,
                    Some(p) => placed.contains_key(p.as_str()),
                };
                if ready {
                    placed.insert(def.name.as_str(), BoneId(order.len() as u32));
                    order.push(i);
                }
            }
            if order.len() == before {
                return Err(AnimationError::InvalidSkeleton {
                    reason: "bone hierarchy contains a cycle".to_string(),
                });
            }
        }

        let mut bones: Vec<BoneNode> = Vec::with_capacity(defs.len());
        for (slot, &i) in order.iter().enumerate() {
            let def = &defs[i];
            let parent = def.parent.as_deref().and_then(|p| placed.get(p).copied());
            bones.push(BoneNode {
                id: BoneId(slot as u32),
                name: def.name.clone(),
                parent,
                children: Vec::new(),
                pose: def.pose.clone(),
                state: Mutex::new(BoneState::default()),
            });
        }
        for slot in 0..bones.len() {
            if let Some(parent) = bones[slot].parent {
                bones[parent.index()].children.push(BoneId(slot as u32));
            }
        }
        let by_name = bones.iter().map(|b| (b.name.clone(), b.id)).collect();
        debug!("skeleton built with {} bones", bones.len());

        Ok(Self {
            config,
            bones,
            by_name,
            tick: AtomicU64::new(0),
            chains: RwLock::new(Vec::new()),
            chain_ids: Mutex::new(IdAllocator::new()),
            step: Mutex::new(()),
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// Number of ticks run so far.
    pub fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    pub fn bones(&self) -> impl Iterator<Item = &BoneNode> {
        self.bones.iter()
    }

    pub fn bone(&self, name: &str) -> Result<&BoneNode> {
        let id = self.bone_id(name)?;
        Ok(&self.bones[id.index()])
    }

    pub fn bone_id(&self, name: &str) -> Result<BoneId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| AnimationError::BoneNotFound {
                name: name.to_string(),
            })
    }

    /// Bake `raw` against this skeleton's hierarchy and config.
    pub fn bake(&self, raw: &RawAnimation) -> Result<BakedAnimation> {
        bake_animation(raw, self, &self.config)
    }

    /// Start `animation` under `name` on every bone it has a track for.
    ///
    /// `on_remove` runs once, after the last bone layer created by this call
    /// is removed. Returns the number of bones animated.
    pub fn animate(
        &self,
        name: &str,
        animation: &BakedAnimation,
        modifier: AnimationModifier,
        on_remove: impl FnOnce() + Send + 'static,
    ) -> Result<usize> {
        self.animate_filtered(name, animation, modifier, |_| true, on_remove)
    }

    /// Like [`Self::animate`], restricted to bones accepted by `filter`.
    pub fn animate_filtered(
        &self,
        name: &str,
        animation: &BakedAnimation,
        modifier: AnimationModifier,
        filter: impl Fn(&str) -> bool,
        on_remove: impl FnOnce() + Send + 'static,
    ) -> Result<usize> {
        let mut targets = Vec::new();
        for (bone, track) in &animation.tracks {
            if !filter(bone) {
                continue;
            }
            match self.by_name.get(bone.as_str()) {
                Some(&id) => targets.push((id, track.clone())),
                None => warn!("animation '{name}': no bone named '{bone}', track skipped"),
            }
        }
        targets.sort_by_key(|(id, _)| *id);

        if targets.is_empty() {
            debug!("animation '{name}' matched no bones");
            on_remove();
            return Ok(0);
        }

        let hook = Arc::new(RemoveHook::new(targets.len(), on_remove));
        for (k, (id, track)) in targets.iter().enumerate() {
            let layer = AnimationLayer::new(
                name,
                track.clone(),
                animation.loop_mode,
                modifier.clone(),
                Some(hook.clone()),
            );
            let added = self.bones[id.index()].state.lock().layers.add(layer);
            if let Err(err) = added {
                for (undo, _) in &targets[..k] {
                    self.bones[undo.index()].state.lock().layers.remove(name);
                }
                return Err(err);
            }
        }
        debug!("animation '{name}' started on {} bones", targets.len());
        Ok(targets.len())
    }

    /// Restart a running animation with new data on the bones it is running on.
    /// Returns `false` if no bone was running it.
    pub fn replace(&self, name: &str, animation: &BakedAnimation, modifier: AnimationModifier) -> bool {
        let mut replaced = false;
        for (bone, track) in &animation.tracks {
            let Some(id) = self.by_name.get(bone.as_str()) else {
                continue;
            };
            let mut state = self.bones[id.index()].state.lock();
            replaced |= state.layers.replace(
                name,
                track.clone(),
                animation.loop_mode,
                modifier.clone(),
            );
        }
        replaced
    }

    /// Stop `name` on every bone. Returns `false` if it was not running.
    pub fn stop(&self, name: &str) -> bool {
        let mut removed = Vec::new();
        for bone in &self.bones {
            if let Some(layer) = bone.state.lock().layers.remove(name) {
                removed.push(layer);
            }
        }
        let found = !removed.is_empty();
        if found {
            debug!("animation '{name}' stopped on {} bones", removed.len());
        }
        release_layers(removed);
        found
    }

    /// Stop every animation on every bone.
    pub fn stop_all(&self) {
        let mut removed = Vec::new();
        for bone in &self.bones {
            removed.extend(bone.state.lock().layers.clear());
        }
        release_layers(removed);
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.bones
            .iter()
            .any(|b| b.state.lock().layers.contains(name))
    }

    /// The animation currently driving `bone`, if any.
    pub fn running_animation(&self, bone: &str) -> Result<Option<RunningAnimation>> {
        let node = self.bone(bone)?;
        let state = node.state.lock();
        Ok(state.layers.active_layer().map(|layer| RunningAnimation {
            name: layer.name().to_string(),
            loop_mode: layer.loop_mode(),
        }))
    }

    /// Copy the layers of `from` that `to` does not already run. Returns the number copied.
    pub fn copy_animations(&self, from: &str, to: &str) -> Result<usize> {
        let src = self.bone_id(from)?;
        let dst = self.bone_id(to)?;
        if src == dst {
            return Err(AnimationError::invalid_operation(format!(
                "cannot copy animations of bone '{from}' onto itself"
            )));
        }
        let snapshot = {
            let state = self.bones[src.index()].state.lock();
            let mut copy = LayeredAnimationState::new();
            copy.extend_from(&state.layers);
            copy
        };
        let copied = self.bones[dst.index()]
            .state
            .lock()
            .layers
            .extend_from(&snapshot);
        Ok(copied)
    }

    /// Model-space transform of `bone` for the current tick.
    pub fn bone_transform(&self, bone: &str) -> Result<Transform> {
        let id = self.bone_id(bone)?;
        let _step = self.step.lock();
        Ok(self.relative_transform(id))
    }

    /// Pull-based: reuse the cache when fresh, otherwise recompute from the parent.
    fn relative_transform(&self, id: BoneId) -> Transform {
        let node = &self.bones[id.index()];
        if let Some(cached) = &node.state.lock().cache {
            return cached.clone();
        }
        let parent = node.parent.map(|p| self.relative_transform(p));
        let mut state = node.state.lock();
        let local = node.local_transform(&state);
        let transform = match parent {
            Some(parent) => parent.compose(&local),
            None => local,
        };
        state.cache = Some(transform.clone());
        transform
    }

    /// Drop the cached transform of `id` and all its descendants.
    ///
    /// A bone without a cache has no cached descendants, so those subtrees are skipped.
    fn invalidate(&self, id: BoneId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.bones[current.index()];
            if node.state.lock().cache.take().is_none() && current != id {
                continue;
            }
            stack.extend_from_slice(&node.children);
        }
    }

    /// Advance one tick.
    pub fn tick(&self) -> TickOutputs {
        let (mut out, finished) = {
            let _step = self.step.lock();
            self.step_locked()
        };
        // Callbacks run without any skeleton lock held.
        for (name, hook) in finished {
            if hook.release() {
                out.push_event(AnimationEvent::AnimationFinished { animation: name });
            }
        }
        out
    }

    fn step_locked(&self) -> (TickOutputs, Vec<(String, Arc<RemoveHook>)>) {
        let tick = self.tick.fetch_add(1, Ordering::AcqRel);
        let mut out = TickOutputs {
            tick,
            ..TickOutputs::default()
        };
        let mut finished = Vec::new();

        for node in &self.bones {
            let (resolution, had_ik) = {
                let mut state = node.state.lock();
                let had_ik = state.ik_rotation.take().is_some();
                (state.layers.resolve(tick, &self.config), had_ik)
            };
            if let Some(animation) = resolution.activated {
                out.push_event(AnimationEvent::LayerActivated {
                    bone: node.name.clone(),
                    animation,
                });
            }
            for mut layer in resolution.removed {
                out.push_event(AnimationEvent::LayerRemoved {
                    bone: node.name.clone(),
                    animation: layer.name().to_string(),
                });
                if let Some(hook) = layer.take_hook() {
                    finished.push((layer.name().to_string(), hook));
                }
            }
            if resolution.changed || had_ik {
                self.invalidate(node.id);
            }
        }

        self.solve_supplied_chains();

        for node in &self.bones {
            let transform = self.relative_transform(node.id);
            let delta = node.state.lock().layers.active_delta().cloned();
            out.push_movement(BoneMovement {
                bone: node.id,
                name: node.name.clone(),
                transform,
                delta,
            });
        }
        trace!("tick {tick}: {} events", out.events.len());
        (out, finished)
    }

    /// Register an IK chain from `source` down to its descendant `target`.
    ///
    /// Segment lengths are measured from the current pose and kept from then on.
    /// Chains shorter than two bones are not registered (`Ok(None)`).
    pub fn register_ik_chain(&self, source: &str, target: &str) -> Result<Option<ChainId>> {
        let source_id = self.bone_id(source)?;
        let target_id = self.bone_id(target)?;
        let mut path = vec![target_id];
        let mut current = target_id;
        while current != source_id {
            match self.bones[current.index()].parent {
                Some(parent) => {
                    path.push(parent);
                    current = parent;
                }
                None => {
                    return Err(AnimationError::invalid_operation(format!(
                        "bone '{source}' is not an ancestor of '{target}'"
                    )))
                }
            }
        }
        path.reverse();

        let positions = {
            let _step = self.step.lock();
            self.chain_positions(&path)
        };
        let Some(chain) = IkChain::from_positions(path, &positions) else {
            warn!("IK chain '{source}' -> '{target}' has fewer than two bones; ignored");
            return Ok(None);
        };
        let id = self.chain_ids.lock().alloc_chain();
        debug!(
            "IK chain {:?} registered: {} bones, reach {:.3}",
            id,
            chain.len(),
            chain.total_length()
        );
        self.chains.write().push(RegisteredChain {
            id,
            chain,
            target: None,
        });
        Ok(Some(id))
    }

    /// Install the per-tick target supplier of a chain.
    pub fn set_ik_target(
        &self,
        chain: ChainId,
        target: impl Fn() -> Option<Vec3> + Send + Sync + 'static,
    ) -> Result<()> {
        let mut chains = self.chains.write();
        let entry = chains
            .iter_mut()
            .find(|c| c.id == chain)
            .ok_or_else(|| AnimationError::invalid_operation(format!("unknown IK chain {chain:?}")))?;
        entry.target = Some(Arc::new(target));
        Ok(())
    }

    pub fn ik_chain(&self, chain: ChainId) -> Option<IkChain> {
        self.chains
            .read()
            .iter()
            .find(|c| c.id == chain)
            .map(|c| c.chain.clone())
    }

    /// Solve one chain toward `target` and apply the result.
    ///
    /// The rotations are visible through [`Self::bone_transform`] until the next
    /// [`Self::tick`], which clears them before resolving; they never reach a
    /// [`TickOutputs`]. Use [`Self::set_ik_target`] for a chain that should
    /// follow a target in tick output.
    pub fn solve_ik_chain(&self, chain: ChainId, target: Vec3) -> Result<IkSolution> {
        let _step = self.step.lock();
        let chains = self.chains.read();
        let entry = chains
            .iter()
            .find(|c| c.id == chain)
            .ok_or_else(|| AnimationError::invalid_operation(format!("unknown IK chain {chain:?}")))?;
        let positions = self.chain_positions(entry.chain.bones());
        let solution = fabrik(&entry.chain, &positions, target, &self.config.ik);
        self.apply_ik(&entry.chain, &solution);
        Ok(solution)
    }

    /// Solve every registered chain toward the same `target` and apply the results.
    ///
    /// Like [`Self::solve_ik_chain`], the overrides last until the next tick.
    pub fn solve_ik(&self, target: Vec3) -> Vec<IkSolution> {
        let _step = self.step.lock();
        let chains = self.chains.read();
        let requests: Vec<(&IkChain, Vec3)> = chains.iter().map(|c| (&c.chain, target)).collect();
        self.solve_and_apply(&requests)
    }

    fn solve_supplied_chains(&self) {
        let chains = self.chains.read();
        let requests: Vec<(&IkChain, Vec3)> = chains
            .iter()
            .filter_map(|c| {
                let target = c.target.as_ref()?;
                (**target)().map(|t| (&c.chain, t))
            })
            .collect();
        if !requests.is_empty() {
            self.solve_and_apply(&requests);
        }
    }

    /// Chains are solved from the pose left by the previous chain, so chains
    /// sharing bones see each other's results only across ticks.
    fn solve_and_apply(&self, requests: &[(&IkChain, Vec3)]) -> Vec<IkSolution> {
        let jobs: Vec<IkJob<'_>> = requests
            .iter()
            .map(|&(chain, target)| IkJob {
                chain,
                positions: self.chain_positions(chain.bones()),
                target,
            })
            .collect();
        let solutions = solve_batch(&jobs, &self.config.ik, self.config.features.parallel_ik);
        for (job, solution) in jobs.iter().zip(&solutions) {
            self.apply_ik(job.chain, solution);
        }
        solutions
    }

    fn chain_positions(&self, bones: &[BoneId]) -> Vec<Vec3> {
        bones
            .iter()
            .map(|&b| self.relative_transform(b).position)
            .collect()
    }

    /// Turn segment rotations into local rotation overrides on the chain bones.
    fn apply_ik(&self, chain: &IkChain, solution: &IkSolution) {
        let bones = chain.bones();
        let old_world: Vec<Quat> = bones
            .iter()
            .map(|&b| self.relative_transform(b).rotation)
            .collect();
        let mut parent_world = match self.bones[chain.source().index()].parent {
            Some(parent) => self.relative_transform(parent).rotation,
            None => Quat::identity(),
        };
        for (k, rotation) in solution.rotations.iter().enumerate() {
            let world = rotation * old_world[k];
            let local = parent_world.inverse() * world;
            self.bones[bones[k].index()].state.lock().ik_rotation = Some(local);
            parent_world = world;
        }
        self.invalidate(chain.source());
    }
}

/// Release removal hooks of layers removed outside a tick.
fn release_layers(layers: Vec<AnimationLayer>) {
    for mut layer in layers {
        if let Some(hook) = layer.take_hook() {
            hook.release();
        }
    }
}
