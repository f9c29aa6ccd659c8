//! Scene session: node lifecycle, selection and debounced mesh reduction

use crate::debounce::Debouncer;
use crate::node::{
    CameraNode, GroupNode, LightNode, Material, MeshNode, MeshPair, NodeId, Scene, SceneNode,
};
use crate::worker::{SimplifyJob, SimplifyOutcome, SimplifyWorker};
use meshtune_core::{Error, NodeTransform, Result, TriangleMesh};
use meshtune_simplification::{vertices_to_remove_for_ratio, MeshSimplifier, QemSimplifier};
use meshtune_telemetry::RenderCounters;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Session configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Quiet period before a reduction request is acted on
    pub debounce_ms: f64,
    /// Run simplification on a background thread
    pub background_simplification: bool,
    /// Largest accepted reduction ratio
    pub max_ratio: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 150.0,
            background_simplification: false,
            max_ratio: 0.99,
        }
    }
}

impl SessionConfig {
    pub fn with_debounce(mut self, debounce_ms: f64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    pub fn with_background(mut self, enabled: bool) -> Self {
        self.background_simplification = enabled;
        self
    }
}

/// Which meshes a reduction request applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReductionScope {
    #[default]
    Selected,
    All,
}

/// How a duplicated mesh node gets its geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CloneMode {
    /// Share the immutable original and working meshes with the source node
    Shared,
    /// Give the copy its own deep-copied meshes
    #[default]
    Deep,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReductionRequest {
    pub ratio: f32,
    pub scope: ReductionScope,
}

/// Counters for simplification activity in this session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Simplifier runs started, synchronous or background
    pub simplifications: u64,
    /// Results swapped into a working mesh
    pub applied: u64,
    /// Runs that failed; the previous working mesh was kept
    pub failed: u64,
    /// Results dropped because their node was deleted or re-requested
    pub discarded: u64,
}

pub struct SceneSession<S: MeshSimplifier = QemSimplifier> {
    config: SessionConfig,
    scene: Scene,
    simplifier: S,
    selection: Option<NodeId>,
    debouncer: Debouncer<ReductionRequest>,
    worker: Option<SimplifyWorker>,
    in_flight: usize,
    last_ratio: f32,
    stats: SessionStats,
}

impl SceneSession<QemSimplifier> {
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_simplifier(QemSimplifier::new(), config)
    }
}

impl<S: MeshSimplifier + Clone + Send + 'static> SceneSession<S> {
    /// Create a session; spawns the background worker when configured
    pub fn with_simplifier(simplifier: S, config: SessionConfig) -> Result<Self> {
        let worker = if config.background_simplification {
            Some(SimplifyWorker::new(simplifier.clone())?)
        } else {
            None
        };
        Ok(Self::build(simplifier, config, worker))
    }
}

impl<S: MeshSimplifier> SceneSession<S> {
    /// Session that always simplifies on the calling thread
    pub fn local(simplifier: S, config: SessionConfig) -> Self {
        Self::build(simplifier, config, None)
    }

    fn build(simplifier: S, config: SessionConfig, worker: Option<SimplifyWorker>) -> Self {
        Self {
            debouncer: Debouncer::new(config.debounce_ms),
            config,
            scene: Scene::new(),
            simplifier,
            selection: None,
            worker,
            in_flight: 0,
            last_ratio: 0.0,
            stats: SessionStats::default(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn selection(&self) -> Option<NodeId> {
        self.selection
    }

    /// Ratio of the most recently applied reduction request
    pub fn current_ratio(&self) -> f32 {
        self.last_ratio
    }

    pub fn pending_jobs(&self) -> usize {
        self.in_flight
    }

    // ------------------------------------------------------------------
    // Node lifecycle
    // ------------------------------------------------------------------

    /// Add a parsed mesh as a new root node and select it
    pub fn load_mesh(&mut self, name: &str, mut mesh: TriangleMesh) -> Result<NodeId> {
        mesh.validate()?;
        if mesh.vertices.is_empty() || mesh.faces.is_empty() {
            return Err(Error::MalformedMesh(format!("'{}' has no triangles", name)));
        }
        if mesh.normals.is_none() {
            mesh.compute_vertex_normals();
        }
        log::info!(
            "Loaded '{}': {} vertices, {} triangles",
            name,
            mesh.vertex_count(),
            mesh.face_count()
        );
        let id = self.scene.add(SceneNode::Mesh(MeshNode::new(name, mesh)), None)?;
        self.selection = Some(id);
        Ok(id)
    }

    pub fn add_group(&mut self, name: &str, parent: Option<NodeId>) -> Result<NodeId> {
        self.scene.add(SceneNode::Group(GroupNode::new(name)), parent)
    }

    pub fn add_light(&mut self, light: LightNode, parent: Option<NodeId>) -> Result<NodeId> {
        self.scene.add(SceneNode::Light(light), parent)
    }

    pub fn add_camera(&mut self, camera: CameraNode, parent: Option<NodeId>) -> Result<NodeId> {
        self.scene.add(SceneNode::Camera(camera), parent)
    }

    /// Copy a node next to the original and select the copy
    pub fn duplicate(&mut self, id: NodeId, mode: CloneMode) -> Result<NodeId> {
        let copy_mesh = move |pair: &MeshPair| match mode {
            CloneMode::Shared => pair.clone(),
            CloneMode::Deep => {
                let original = Arc::new(pair.original.as_ref().clone());
                let working = if pair.is_original() {
                    Arc::clone(&original)
                } else {
                    Arc::new(pair.working.as_ref().clone())
                };
                MeshPair {
                    original,
                    working,
                    generation: pair.generation,
                }
            }
        };
        let copy = self.scene.duplicate_with(id, &copy_mesh)?;
        log::debug!("Duplicated node {} as {} ({:?})", id, copy, mode);
        self.selection = Some(copy);
        Ok(copy)
    }

    /// Remove a node and its subtree. Pending results for removed meshes
    /// are discarded when they arrive.
    pub fn delete(&mut self, id: NodeId) -> Result<()> {
        let removed = self.scene.remove(id)?;
        if self.selection.map_or(false, |s| removed.contains(&s)) {
            self.selection = None;
        }
        log::debug!("Deleted {} node(s) starting at {}", removed.len(), id);
        Ok(())
    }

    pub fn select(&mut self, id: NodeId) -> Result<()> {
        self.scene.get(id)?;
        self.selection = Some(id);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    // ------------------------------------------------------------------
    // Node editing
    // ------------------------------------------------------------------

    pub fn set_transform(&mut self, id: NodeId, transform: NodeTransform) -> Result<()> {
        *self.scene.get_mut(id)?.transform_mut() = transform;
        Ok(())
    }

    pub fn transform_mut(&mut self, id: NodeId) -> Result<&mut NodeTransform> {
        Ok(self.scene.get_mut(id)?.transform_mut())
    }

    fn mesh_node_mut(&mut self, id: NodeId) -> Result<&mut MeshNode> {
        self.scene
            .get_mut(id)?
            .as_mesh_mut()
            .ok_or_else(|| Error::InvalidData(format!("node {} is not a mesh", id)))
    }

    fn mesh_node(&self, id: NodeId) -> Result<&MeshNode> {
        self.scene
            .get(id)?
            .as_mesh()
            .ok_or_else(|| Error::InvalidData(format!("node {} is not a mesh", id)))
    }

    pub fn set_wireframe(&mut self, id: NodeId, wireframe: bool) -> Result<()> {
        self.mesh_node_mut(id)?.material.wireframe = wireframe;
        Ok(())
    }

    pub fn set_material(&mut self, id: NodeId, material: Material) -> Result<()> {
        self.mesh_node_mut(id)?.material = material;
        Ok(())
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> Result<()> {
        self.mesh_node_mut(id)?.visible = visible;
        Ok(())
    }

    pub fn working_mesh(&self, id: NodeId) -> Result<Arc<TriangleMesh>> {
        Ok(Arc::clone(&self.mesh_node(id)?.pair.working))
    }

    pub fn original_mesh(&self, id: NodeId) -> Result<Arc<TriangleMesh>> {
        Ok(Arc::clone(&self.mesh_node(id)?.pair.original))
    }

    // ------------------------------------------------------------------
    // Reduction
    // ------------------------------------------------------------------

    /// Record a reduction ratio change. Nothing is simplified until the
    /// quiet period has passed without another request.
    pub fn request_reduction(&mut self, ratio: f32, scope: ReductionScope, now_ms: f64) {
        let ratio = if ratio.is_finite() {
            ratio.clamp(0.0, self.config.max_ratio)
        } else {
            0.0
        };
        self.debouncer.submit(ReductionRequest { ratio, scope }, now_ms);
    }

    /// Advance the session: apply finished background results, then fire a
    /// due reduction request. Returns the nodes whose working mesh changed.
    pub fn tick(&mut self, now_ms: f64) -> Vec<NodeId> {
        let mut changed = Vec::new();
        let outcomes = match &self.worker {
            Some(worker) => worker.poll_results(),
            None => Vec::new(),
        };
        for outcome in outcomes {
            if let Some(id) = self.apply_outcome(outcome) {
                changed.push(id);
            }
        }
        if let Some(request) = self.debouncer.poll(now_ms) {
            changed.extend(self.apply_reduction(request));
        }
        changed
    }

    /// Block until all background jobs have reported or `timeout` passes.
    /// Returns the nodes whose working mesh changed.
    pub fn finish_pending(&mut self, timeout: Duration) -> Vec<NodeId> {
        let deadline = Instant::now() + timeout;
        let mut changed = Vec::new();
        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let outcome = match &self.worker {
                Some(worker) => worker.wait_result(remaining),
                None => None,
            };
            match outcome {
                Some(outcome) => {
                    if let Some(id) = self.apply_outcome(outcome) {
                        changed.push(id);
                    }
                }
                None => break,
            }
        }
        changed
    }

    fn reduction_targets(&self, scope: ReductionScope) -> Vec<NodeId> {
        match scope {
            ReductionScope::All => self.scene.mesh_ids(),
            ReductionScope::Selected => match self.selection {
                Some(id) if self.mesh_node(id).is_ok() => vec![id],
                Some(id) => {
                    log::debug!("Selected node {} is not a mesh, nothing to reduce", id);
                    Vec::new()
                }
                None => Vec::new(),
            },
        }
    }

    fn apply_reduction(&mut self, request: ReductionRequest) -> Vec<NodeId> {
        self.last_ratio = request.ratio;
        let mut changed = Vec::new();

        for id in self.reduction_targets(request.scope) {
            let Ok(node) = self.mesh_node_mut(id) else {
                continue;
            };
            node.pair.generation += 1;
            let generation = node.pair.generation;
            let source = Arc::clone(&node.pair.original);
            let to_remove = vertices_to_remove_for_ratio(source.vertex_count(), request.ratio);

            if to_remove == 0 {
                if !node.pair.is_original() {
                    node.pair.reset();
                    changed.push(id);
                }
                continue;
            }

            self.stats.simplifications += 1;
            let job = SimplifyJob {
                node: id,
                generation,
                source,
                vertices_to_remove: to_remove,
            };
            match &self.worker {
                Some(worker) => match worker.submit(job) {
                    Ok(()) => self.in_flight += 1,
                    Err(err) => {
                        self.stats.failed += 1;
                        log::warn!("Could not queue simplification of {}: {}", id, err);
                    }
                },
                None => {
                    let result = self.simplifier.simplify(&job.source, job.vertices_to_remove);
                    let outcome = SimplifyOutcome {
                        node: id,
                        generation,
                        result,
                    };
                    if let Some(id) = self.swap_in(outcome) {
                        changed.push(id);
                    }
                }
            }
        }
        changed
    }

    fn apply_outcome(&mut self, outcome: SimplifyOutcome) -> Option<NodeId> {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.swap_in(outcome)
    }

    /// Replace the working mesh if the node still exists and nothing newer
    /// was requested for it.
    fn swap_in(&mut self, outcome: SimplifyOutcome) -> Option<NodeId> {
        let id = outcome.node;
        let node = match self.scene.get_mut(id).ok().and_then(SceneNode::as_mesh_mut) {
            Some(node) if node.pair.generation == outcome.generation => node,
            _ => {
                self.stats.discarded += 1;
                log::debug!(
                    "Discarding simplification result for {} (generation {})",
                    id,
                    outcome.generation
                );
                return None;
            }
        };

        match outcome.result {
            Ok(mesh) if mesh.is_empty() => {
                self.stats.failed += 1;
                log::warn!(
                    "Simplification of {} produced an empty mesh, keeping previous mesh",
                    id
                );
                None
            }
            Ok(mesh) => {
                log::debug!(
                    "Node {}: {} -> {} vertices",
                    id,
                    node.pair.original.vertex_count(),
                    mesh.vertex_count()
                );
                node.pair.working = Arc::new(mesh);
                self.stats.applied += 1;
                Some(id)
            }
            Err(err) => {
                self.stats.failed += 1;
                log::warn!("Simplification of {} failed, keeping previous mesh: {}", id, err);
                None
            }
        }
    }
}

impl<S: MeshSimplifier> RenderCounters for SceneSession<S> {
    /// One draw call per visible mesh node
    fn draw_calls(&self) -> u32 {
        self.scene.meshes().filter(|(_, m)| m.visible).count() as u32
    }

    fn triangles(&self) -> u64 {
        self.scene
            .meshes()
            .filter(|(_, m)| m.visible)
            .map(|(_, m)| m.pair.working.face_count() as u64)
            .sum()
    }

    fn gpu_bytes(&self) -> u64 {
        self.scene
            .meshes()
            .map(|(_, m)| m.pair.working.estimated_gpu_bytes())
            .sum()
    }
}
