//! Headless simplify-and-profile run
//!
//! Loads a procedural sphere into a scene session, drives a simulated render
//! loop through the telemetry sampler, and drags the reduction slider
//! partway through so the effect on the aggregated metrics is visible:
//! - Debounced reduction requests
//! - Optional background simplification
//! - Capped or uncapped frame pacing
//! - Simulated GPU timer queries that resolve a few frames late

use anyhow::{bail, Context, Result};
use clap::Parser;
use meshtune_core::{Point3f, TriangleMesh};
use meshtune_scene::{
    CameraNode, CloneMode, LightKind, LightNode, ReductionScope, SceneSession, SessionConfig,
};
use meshtune_telemetry::{
    Clock, FramePacer, FrameRateMode, GpuTimer, ManualClock, QueryHandle, QueryState,
    RenderCounters, TelemetryConfig, TelemetrySampler,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "simplify_and_profile")]
#[command(about = "Simplify a mesh while sampling simulated frame telemetry")]
struct Args {
    /// Fraction of vertices to remove, in [0, 1)
    #[arg(long, default_value_t = 0.5)]
    ratio: f32,

    /// Number of frames to simulate
    #[arg(long, default_value_t = 600)]
    frames: u32,

    /// Render as fast as possible instead of at the refresh rate
    #[arg(long)]
    uncapped: bool,

    /// Display refresh rate in Hz
    #[arg(long, default_value_t = 60.0)]
    refresh_hz: f64,

    /// Sphere resolution (stacks; slices are twice this)
    #[arg(long, default_value_t = 24)]
    resolution: usize,

    /// Simplify on a background thread
    #[arg(long)]
    background: bool,

    /// Print aggregated records as JSON lines
    #[arg(long)]
    json: bool,

    /// Seed for the simulated frame cost jitter
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

/// GPU timer whose results arrive a fixed number of frames after the query
/// ends. The cost of each frame is set by the render loop before ending the
/// query.
struct SimulatedGpuTimer {
    frame_cost_ms: Rc<Cell<f64>>,
    latency_frames: u64,
    next_id: u64,
    ends: u64,
    ended: HashMap<u64, (u64, f64)>,
}

impl SimulatedGpuTimer {
    fn new(frame_cost_ms: Rc<Cell<f64>>, latency_frames: u64) -> Self {
        Self {
            frame_cost_ms,
            latency_frames,
            next_id: 0,
            ends: 0,
            ended: HashMap::new(),
        }
    }
}

impl GpuTimer for SimulatedGpuTimer {
    fn is_supported(&self) -> bool {
        true
    }

    fn begin_query(&mut self) -> meshtune_core::Result<QueryHandle> {
        self.next_id += 1;
        Ok(QueryHandle(self.next_id))
    }

    fn end_query(&mut self, handle: QueryHandle) -> meshtune_core::Result<()> {
        self.ends += 1;
        self.ended.insert(handle.0, (self.ends, self.frame_cost_ms.get()));
        Ok(())
    }

    fn poll(&mut self, handle: QueryHandle) -> QueryState {
        match self.ended.get(&handle.0) {
            Some(&(end, ms)) if self.ends - end >= self.latency_frames => QueryState::Ready(ms),
            Some(_) => QueryState::Pending,
            None => QueryState::Lost,
        }
    }

    fn release(&mut self, handle: QueryHandle) {
        self.ended.remove(&handle.0);
    }
}

fn make_sphere(stacks: usize, slices: usize) -> TriangleMesh {
    let mut vertices = vec![Point3f::new(0.0, 1.0, 0.0)];
    for i in 1..stacks {
        let phi = std::f32::consts::PI * i as f32 / stacks as f32;
        for j in 0..slices {
            let theta = 2.0 * std::f32::consts::PI * j as f32 / slices as f32;
            vertices.push(Point3f::new(
                phi.sin() * theta.cos(),
                phi.cos(),
                phi.sin() * theta.sin(),
            ));
        }
    }
    vertices.push(Point3f::new(0.0, -1.0, 0.0));
    let south = vertices.len() - 1;
    let ring = |i: usize, j: usize| 1 + (i - 1) * slices + (j % slices);

    let mut faces = Vec::new();
    for j in 0..slices {
        faces.push([0, ring(1, j + 1), ring(1, j)]);
    }
    for i in 1..(stacks - 1) {
        for j in 0..slices {
            let (a, b) = (ring(i, j), ring(i, j + 1));
            let (c, d) = (ring(i + 1, j), ring(i + 1, j + 1));
            faces.push([a, b, d]);
            faces.push([a, d, c]);
        }
    }
    for j in 0..slices {
        faces.push([south, ring(stacks - 1, j), ring(stacks - 1, j + 1)]);
    }
    TriangleMesh::from_vertices_and_faces(vertices, faces)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !(0.0..1.0).contains(&args.ratio) {
        bail!("--ratio must be in [0, 1), got {}", args.ratio);
    }
    if args.resolution < 3 {
        bail!("--resolution must be at least 3");
    }

    let session_config = SessionConfig::default().with_background(args.background);
    let mut session =
        SceneSession::new(session_config).context("failed to create scene session")?;

    let sphere = make_sphere(args.resolution, args.resolution * 2);
    let source = session.load_mesh("sphere", sphere)?;
    let copy = session.duplicate(source, CloneMode::Shared)?;
    session
        .transform_mut(copy)?
        .translate_by(meshtune_core::Vector3f::new(2.5, 0.0, 0.0));
    session.set_wireframe(copy, true)?;
    session.add_camera(CameraNode::default(), None)?;
    session.add_light(
        LightNode {
            name: "Sun".to_string(),
            kind: LightKind::Directional,
            color: [1.0, 0.98, 0.9],
            intensity: 3.0,
            transform: Default::default(),
        },
        None,
    )?;

    let clock = ManualClock::new(0.0);
    let gpu_cost = Rc::new(Cell::new(0.0));
    let timer = SimulatedGpuTimer::new(Rc::clone(&gpu_cost), 2);
    let mut sampler = TelemetrySampler::with_parts(clock.clone(), timer, TelemetryConfig::default());
    let mut pacer = FramePacer::new(FrameRateMode::from_capped(!args.uncapped), args.refresh_hz);
    let mut rng = StdRng::seed_from_u64(args.seed);

    // The slider is dragged over several frames a third of the way in
    let drag_start = args.frames / 3;
    let drag_steps = 8u32;

    log::info!(
        "Simulating {} frames ({:?}), reducing by {:.0}%",
        args.frames,
        pacer.mode(),
        args.ratio * 100.0
    );

    let mut frame = 0;
    while frame < args.frames {
        let now = clock.now_ms();
        if !pacer.should_tick(now) {
            clock.advance(pacer.time_until_next_tick(now));
            continue;
        }
        pacer.mark_tick(now);

        if frame >= drag_start && frame < drag_start + drag_steps {
            let step = (frame - drag_start + 1) as f32 / drag_steps as f32;
            session.request_reduction(args.ratio * step, ReductionScope::All, now);
        }
        for id in session.tick(now) {
            log::info!("Working mesh of node {} replaced", id);
        }

        sampler.begin_frame();
        let triangles = session.triangles() as f64;
        let cpu_ms = 0.4 + triangles * 2.0e-4 + rng.gen_range(0.0..0.3);
        gpu_cost.set(0.2 + triangles * 5.0e-4 + rng.gen_range(0.0..0.2));
        clock.advance(cpu_ms);
        sampler.end_frame(&session);

        if let Some(record) = sampler.aggregate() {
            if args.json {
                println!("{}", serde_json::to_string(&record)?);
            } else {
                println!("{}", record);
            }
        }
        frame += 1;
    }

    session.finish_pending(Duration::from_secs(10));
    let stats = session.stats();
    log::info!(
        "Done: {} simplification(s), {} applied, {} failed, {} discarded",
        stats.simplifications,
        stats.applied,
        stats.failed,
        stats.discarded
    );
    for (id, node) in session.scene().meshes() {
        println!(
            "{} '{}': {} -> {} vertices",
            id,
            node.name,
            node.pair.original.vertex_count(),
            node.pair.working.vertex_count()
        );
    }
    println!(
        "History: {} record(s), {} GPU queries lost",
        sampler.history().len(),
        sampler.lost_gpu_queries()
    );
    Ok(())
}
