//! Session behaviour with the real QEM simplifier, the background worker and
//! the telemetry sampler

use meshtune_core::{Point3f, Result, TriangleMesh};
use meshtune_scene::{CloneMode, ReductionScope, SceneSession, SessionConfig};
use meshtune_simplification::{MeshSimplifier, QemSimplifier};
use meshtune_telemetry::{
    Clock, ManualClock, NullGpuTimer, RenderCounters, TelemetryConfig, TelemetrySampler,
};
use std::sync::Arc;
use std::time::Duration;

fn wavy_grid(n: usize) -> TriangleMesh {
    let mut vertices = Vec::new();
    for y in 0..n {
        for x in 0..n {
            let (fx, fy) = (x as f32 / (n - 1) as f32, y as f32 / (n - 1) as f32);
            let z = 0.2 * (fx * std::f32::consts::PI * 2.0).sin() * (fy * std::f32::consts::PI).cos();
            vertices.push(Point3f::new(fx, fy, z));
        }
    }
    let mut faces = Vec::new();
    for y in 0..n - 1 {
        for x in 0..n - 1 {
            let a = y * n + x;
            faces.push([a, a + 1, a + n]);
            faces.push([a + 1, a + n + 1, a + n]);
        }
    }
    TriangleMesh::from_vertices_and_faces(vertices, faces)
}

const WAIT: Duration = Duration::from_secs(30);

#[test]
fn test_synchronous_reduction_with_qem() {
    let mut session = SceneSession::new(SessionConfig::default()).unwrap();
    let id = session.load_mesh("wavy", wavy_grid(12)).unwrap();

    session.request_reduction(0.5, ReductionScope::Selected, 0.0);
    assert_eq!(session.tick(150.0), vec![id]);

    let working = session.working_mesh(id).unwrap();
    assert!(working.vertex_count() < 144);
    assert!(working.validate().is_ok());
    assert_eq!(session.original_mesh(id).unwrap().vertex_count(), 144);
}

#[test]
fn test_background_result_swapped_when_live() {
    let config = SessionConfig::default().with_background(true);
    let mut session = SceneSession::new(config).unwrap();
    let id = session.load_mesh("wavy", wavy_grid(10)).unwrap();
    let before = session.working_mesh(id).unwrap();

    session.request_reduction(0.3, ReductionScope::Selected, 0.0);
    assert!(session.tick(150.0).is_empty());
    assert_eq!(session.pending_jobs(), 1);
    // The previous mesh stays displayed until the result is collected
    assert!(Arc::ptr_eq(&before, &session.working_mesh(id).unwrap()));

    let changed = session.finish_pending(WAIT);
    assert_eq!(changed, vec![id]);
    assert_eq!(session.pending_jobs(), 0);
    assert!(session.working_mesh(id).unwrap().vertex_count() < 100);
    assert_eq!(session.stats().applied, 1);
}

#[test]
fn test_result_for_deleted_node_is_discarded() {
    let config = SessionConfig::default().with_background(true);
    let mut session = SceneSession::new(config).unwrap();
    let id = session.load_mesh("wavy", wavy_grid(10)).unwrap();

    session.request_reduction(0.5, ReductionScope::Selected, 0.0);
    session.tick(150.0);
    session.delete(id).unwrap();

    let changed = session.finish_pending(WAIT);
    assert!(changed.is_empty());
    assert_eq!(session.stats().discarded, 1);
    assert_eq!(session.stats().applied, 0);
    assert!(session.scene().is_empty());
}

/// Holds every run until the test releases it
#[derive(Clone)]
struct GatedSimplifier {
    gate: flume::Receiver<()>,
}

impl MeshSimplifier for GatedSimplifier {
    fn simplify(&self, mesh: &TriangleMesh, vertices_to_remove: usize) -> Result<TriangleMesh> {
        let _ = self.gate.recv();
        QemSimplifier::new().simplify(mesh, vertices_to_remove)
    }
}

#[test]
fn test_superseded_result_is_discarded() {
    let (open, gate) = flume::unbounded();
    let config = SessionConfig::default().with_background(true);
    let mut session = SceneSession::with_simplifier(GatedSimplifier { gate }, config).unwrap();
    let id = session.load_mesh("wavy", wavy_grid(10)).unwrap();
    let source = session.original_mesh(id).unwrap();

    session.request_reduction(0.2, ReductionScope::Selected, 0.0);
    session.tick(150.0);
    session.request_reduction(0.6, ReductionScope::Selected, 160.0);
    session.tick(310.0);

    open.send(()).unwrap();
    open.send(()).unwrap();
    assert_eq!(session.pending_jobs(), 2);
    let changed = session.finish_pending(WAIT);
    assert_eq!(changed, vec![id]);

    let stats = session.stats();
    assert_eq!(stats.simplifications, 2);
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.applied, 1);

    let expected = QemSimplifier::new().simplify(&source, 60).unwrap();
    assert_eq!(
        session.working_mesh(id).unwrap().vertex_count(),
        expected.vertex_count()
    );
}

#[test]
fn test_duplicates_reduce_independently() {
    for mode in [CloneMode::Shared, CloneMode::Deep] {
        let mut session = SceneSession::new(SessionConfig::default()).unwrap();
        let source = session.load_mesh("wavy", wavy_grid(8)).unwrap();
        let copy = session.duplicate(source, mode).unwrap();
        assert_eq!(session.selection(), Some(copy));

        let shares = Arc::ptr_eq(
            &session.original_mesh(source).unwrap(),
            &session.original_mesh(copy).unwrap(),
        );
        assert_eq!(shares, mode == CloneMode::Shared);

        session.request_reduction(0.5, ReductionScope::Selected, 0.0);
        assert_eq!(session.tick(150.0), vec![copy]);

        assert_eq!(session.working_mesh(source).unwrap().vertex_count(), 64);
        assert!(session.working_mesh(copy).unwrap().vertex_count() < 64);
        assert_eq!(
            session.scene().get(copy).unwrap().name(),
            "wavy (copy)"
        );
    }
}

#[test]
fn test_session_feeds_telemetry_counters() {
    let mut session = SceneSession::new(SessionConfig::default()).unwrap();
    let id = session.load_mesh("wavy", wavy_grid(10)).unwrap();
    let full_triangles = session.triangles();
    assert_eq!(full_triangles, 162);

    let clock = ManualClock::new(0.0);
    let mut sampler =
        TelemetrySampler::with_parts(clock.clone(), NullGpuTimer, TelemetryConfig::default());

    session.request_reduction(0.5, ReductionScope::All, 0.0);
    let mut record = None;
    for _ in 0..60 {
        sampler.begin_frame();
        clock.advance(1.0);
        let sample = sampler.end_frame(&session);
        assert_eq!(sample.draw_calls, 1);
        clock.advance(9.0);
        session.tick(clock.now_ms());
        if let Some(r) = sampler.aggregate() {
            record = Some(r);
        }
    }

    let record = record.unwrap();
    assert_eq!(record.fps, 100);
    let reduced = session.working_mesh(id).unwrap();
    assert_eq!(record.triangles, reduced.face_count() as u64);
    assert!(record.triangles < full_triangles);
    assert_eq!(record.gpu_bytes, reduced.estimated_gpu_bytes());
}
