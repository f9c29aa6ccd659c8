//! Edge collapse simplification
//!
//! Iterative edge contraction driven by quadric error metrics (QEM). Every
//! vertex carries its accumulated quadric and the faces and neighbours
//! incident to it; undirected edges sit in a min-priority queue keyed by the
//! edge so that re-costing an edge replaces its entry in place.

use crate::quadric_error::Quadric;
use crate::MeshSimplifier;
use itertools::Itertools;
use log::debug;
use meshtune_core::{Error, Point3d, Point3f, Result, TriangleMesh, Vector3d};
use priority_queue::PriorityQueue;
use std::cmp::Ordering;
use std::collections::HashSet;

type EdgeKey = (usize, usize);

#[inline]
fn edge_key(a: usize, b: usize) -> EdgeKey {
    (a.min(b), a.max(b))
}

// ============================================================
// Vertex and face records
// ============================================================

#[derive(Debug, Clone)]
struct VertexRecord {
    position: Point3d,
    quadric: Quadric,
    faces: Vec<usize>,
    neighbors: Vec<usize>,
    removed: bool,
}

#[derive(Debug, Clone)]
struct Face {
    corners: [usize; 3],
    removed: bool,
}

impl Face {
    fn contains(&self, v: usize) -> bool {
        self.corners.contains(&v)
    }
}

/// Why a candidate collapse was not performed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    /// Collapse would make the surface non-manifold
    Topology,
    /// Collapse would flip or flatten an adjacent face
    Flip,
}

/// Per-run bookkeeping for one simplification pass.
struct CollapseMesh {
    vertices: Vec<VertexRecord>,
    faces: Vec<Face>,
    uvs: Option<Vec<[f32; 2]>>,
    colors: Option<Vec<[u8; 3]>>,
}

impl CollapseMesh {
    fn from_triangle_mesh(mesh: &TriangleMesh, boundary_weight: f64) -> Self {
        let mut vertices: Vec<VertexRecord> = mesh
            .vertices
            .iter()
            .map(|p| VertexRecord {
                position: p.cast::<f64>(),
                quadric: Quadric::zero(),
                faces: Vec::new(),
                neighbors: Vec::new(),
                removed: false,
            })
            .collect();

        let mut faces = Vec::with_capacity(mesh.faces.len());
        for face in &mesh.faces {
            if face[0] == face[1] || face[1] == face[2] || face[2] == face[0] {
                continue;
            }
            let fi = faces.len();
            faces.push(Face {
                corners: *face,
                removed: false,
            });
            if let Some(q) = Quadric::from_triangle(
                &mesh.vertices[face[0]],
                &mesh.vertices[face[1]],
                &mesh.vertices[face[2]],
            ) {
                for &v in face {
                    vertices[v].quadric += q;
                }
            }
            for &v in face {
                vertices[v].faces.push(fi);
            }
        }

        let mut cm = CollapseMesh {
            vertices,
            faces,
            uvs: mesh.uvs.clone(),
            colors: mesh.colors.clone(),
        };
        for v in 0..cm.vertices.len() {
            cm.rebuild_neighbors(v);
        }
        if boundary_weight > 0.0 {
            cm.add_boundary_constraints(boundary_weight);
        }
        cm
    }

    /// Add a weighted plane perpendicular to each boundary face along its
    /// boundary edge, so boundary vertices resist moving off the outline.
    fn add_boundary_constraints(&mut self, weight: f64) {
        let mut constraints = Vec::new();
        for (fi, face) in self.faces.iter().enumerate() {
            for (a, b) in [(0, 1), (1, 2), (2, 0)] {
                let (va, vb) = (face.corners[a], face.corners[b]);
                if self.edge_face_count(va, vb) != 1 {
                    continue;
                }
                let pa = self.vertices[va].position;
                let pb = self.vertices[vb].position;
                let n = self.face_normal(fi);
                let m = (pb - pa).cross(&n);
                let len = m.norm();
                if len > f64::EPSILON {
                    let m = m / len;
                    let q = Quadric::from_plane(m.x, m.y, m.z, -m.dot(&pa.coords)).scaled(weight);
                    constraints.push((va, vb, q));
                }
            }
        }
        for (va, vb, q) in constraints {
            self.vertices[va].quadric += q;
            self.vertices[vb].quadric += q;
        }
    }

    fn rebuild_neighbors(&mut self, v: usize) {
        let neighbors: Vec<usize> = self.vertices[v]
            .faces
            .iter()
            .flat_map(|&f| self.faces[f].corners)
            .filter(|&n| n != v)
            .unique()
            .collect();
        self.vertices[v].neighbors = neighbors;
    }

    /// Unnormalized normal (twice the area) of a face
    fn face_normal(&self, f: usize) -> Vector3d {
        let [a, b, c] = self.faces[f].corners;
        let p0 = self.vertices[a].position;
        (self.vertices[b].position - p0).cross(&(self.vertices[c].position - p0))
    }

    fn edge_face_count(&self, a: usize, b: usize) -> usize {
        self.vertices[a]
            .faces
            .iter()
            .filter(|&&f| self.faces[f].contains(b))
            .count()
    }

    fn is_boundary_vertex(&self, v: usize) -> bool {
        self.vertices[v]
            .neighbors
            .iter()
            .any(|&n| self.edge_face_count(v, n) == 1)
    }

    /// Link condition: the vertices adjacent to both endpoints must be exactly
    /// the apices of the faces sharing the edge.
    fn check_link_condition(&self, a: usize, b: usize) -> bool {
        let na: HashSet<usize> = self.vertices[a].neighbors.iter().copied().collect();
        let common = self.vertices[b]
            .neighbors
            .iter()
            .filter(|n| na.contains(n))
            .count();
        let apices: HashSet<usize> = self.vertices[a]
            .faces
            .iter()
            .filter(|&&f| self.faces[f].contains(b))
            .flat_map(|&f| self.faces[f].corners)
            .filter(|&v| v != a && v != b)
            .collect();
        !apices.is_empty() && common == apices.len()
    }

    /// Whether contracting (a, b) would leave a vertex without faces. Only
    /// the faces shared by both endpoints disappear, so only `a` and the
    /// apices of those faces can be stranded.
    fn would_strand_vertex(&self, a: usize, b: usize) -> bool {
        let shared: Vec<usize> = self.vertices[a]
            .faces
            .iter()
            .copied()
            .filter(|&f| self.faces[f].contains(b))
            .collect();
        if self.vertices[a].faces.len() + self.vertices[b].faces.len() == 2 * shared.len() {
            return true;
        }
        shared
            .iter()
            .flat_map(|&f| self.faces[f].corners)
            .filter(|&v| v != a && v != b)
            .any(|v| self.vertices[v].faces.iter().all(|f| shared.contains(f)))
    }

    /// Whether moving both endpoints to `target` flips or flattens any face
    /// that survives the collapse.
    fn would_flip(&self, a: usize, b: usize, target: &Point3d, threshold: f64) -> bool {
        let incident = self.vertices[a]
            .faces
            .iter()
            .chain(self.vertices[b].faces.iter());
        for &f in incident {
            let face = &self.faces[f];
            if face.contains(a) && face.contains(b) {
                continue;
            }
            let before = self.face_normal(f);
            let before_len = before.norm();
            if before_len <= f64::EPSILON {
                continue;
            }
            let moved = face.corners.map(|v| {
                if v == a || v == b {
                    *target
                } else {
                    self.vertices[v].position
                }
            });
            let after = (moved[1] - moved[0]).cross(&(moved[2] - moved[0]));
            let after_len = after.norm();
            if after_len <= before_len * 1e-6 {
                return true;
            }
            if before.dot(&after) / (before_len * after_len) < threshold {
                return true;
            }
        }
        false
    }

    fn is_live_edge(&self, a: usize, b: usize) -> bool {
        !self.vertices[a].removed
            && !self.vertices[b].removed
            && self.vertices[a].neighbors.contains(&b)
    }

    /// Contract `b` into `a` at `target`. Returns the vertices whose
    /// neighbourhood changed. Callers must have ruled out stranded vertices
    /// with `would_strand_vertex`.
    fn collapse(&mut self, a: usize, b: usize, target: Point3d) -> Vec<usize> {
        let t = edge_parameter(&self.vertices[a].position, &self.vertices[b].position, &target);
        if let Some(uvs) = self.uvs.as_mut() {
            let (ua, ub) = (uvs[a], uvs[b]);
            uvs[a] = [lerp(ua[0], ub[0], t), lerp(ua[1], ub[1], t)];
        }
        if let Some(colors) = self.colors.as_mut() {
            let (ca, cb) = (colors[a], colors[b]);
            colors[a] = [0, 1, 2].map(|i| lerp(ca[i] as f32, cb[i] as f32, t).round() as u8);
        }

        let mut affected: Vec<usize> = self.vertices[a]
            .neighbors
            .iter()
            .chain(self.vertices[b].neighbors.iter())
            .copied()
            .filter(|&v| v != a && v != b)
            .unique()
            .collect();
        affected.sort_unstable();

        let b_faces = std::mem::take(&mut self.vertices[b].faces);
        for f in b_faces {
            if self.faces[f].contains(a) {
                self.faces[f].removed = true;
                for v in self.faces[f].corners {
                    if v != b {
                        self.vertices[v].faces.retain(|&x| x != f);
                    }
                }
            } else {
                for c in self.faces[f].corners.iter_mut() {
                    if *c == b {
                        *c = a;
                    }
                }
                self.vertices[a].faces.push(f);
            }
        }

        let qb = self.vertices[b].quadric;
        self.vertices[a].quadric += qb;
        self.vertices[a].position = target;
        self.vertices[b].removed = true;
        self.vertices[b].neighbors.clear();

        self.rebuild_neighbors(a);
        for &v in &affected {
            self.rebuild_neighbors(v);
        }
        affected
    }

    fn to_triangle_mesh(&self) -> TriangleMesh {
        let mut remap = vec![usize::MAX; self.vertices.len()];
        let mut positions = Vec::new();
        let mut uvs = self.uvs.as_ref().map(|_| Vec::new());
        let mut colors = self.colors.as_ref().map(|_| Vec::new());

        for (i, v) in self.vertices.iter().enumerate() {
            if v.removed || v.faces.is_empty() {
                continue;
            }
            remap[i] = positions.len();
            positions.push(Point3f::new(
                v.position.x as f32,
                v.position.y as f32,
                v.position.z as f32,
            ));
            if let (Some(out), Some(src)) = (uvs.as_mut(), self.uvs.as_ref()) {
                out.push(src[i]);
            }
            if let (Some(out), Some(src)) = (colors.as_mut(), self.colors.as_ref()) {
                out.push(src[i]);
            }
        }

        let faces = self
            .faces
            .iter()
            .filter(|f| !f.removed)
            .map(|f| f.corners.map(|v| remap[v]))
            .filter(|f| f[0] != f[1] && f[1] != f[2] && f[2] != f[0])
            .collect();

        let mut mesh = TriangleMesh::from_vertices_and_faces(positions, faces);
        mesh.uvs = uvs;
        mesh.colors = colors;
        mesh.compute_vertex_normals();
        mesh
    }
}

/// Parameter of the projection of `p` onto segment `a -> b`, clamped to [0, 1].
fn edge_parameter(a: &Point3d, b: &Point3d, p: &Point3d) -> f32 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 <= f64::EPSILON {
        return 0.0;
    }
    ((p - a).dot(&ab) / len2).clamp(0.0, 1.0) as f32
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

// ============================================================
// Edge Cost for Priority Queue
// ============================================================

#[derive(Debug, Clone)]
struct EdgeCost {
    key: EdgeKey,
    position: Point3d,
    cost: f64,
}

impl PartialEq for EdgeCost {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for EdgeCost {}

impl PartialOrd for EdgeCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCost {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: smallest cost first, then smallest key
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.key.cmp(&self.key))
    }
}

/// Outcome counters for one simplification pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimplificationReport {
    /// Number of edge contractions performed
    pub collapses: usize,
    /// Vertices removed: one per contraction plus any input vertex no face
    /// referenced
    pub vertices_removed: usize,
    /// Candidates dropped because they would break manifoldness or strand a
    /// vertex without faces
    pub skipped_topology: usize,
    /// Candidates deferred because they would flip a face
    pub skipped_flip: usize,
    /// The queue ran dry before the requested count was reached
    pub exhausted: bool,
}

impl SimplificationReport {
    /// No candidate was skipped or deferred during the pass
    pub fn is_clean(&self) -> bool {
        self.skipped_topology == 0 && self.skipped_flip == 0
    }
}

// ============================================================
// QEM Simplifier
// ============================================================

/// Quadric error metric edge-collapse simplifier.
///
/// Removes a requested number of vertices by repeatedly contracting the
/// cheapest edge. The input mesh is never modified; a new mesh with
/// recomputed vertex normals is returned.
#[derive(Debug, Clone, PartialEq)]
pub struct QemSimplifier {
    /// Penalty added to boundary edge costs and weight of the boundary
    /// constraint planes
    pub boundary_weight: f64,
    /// Exclude every edge touching the boundary from collapsing
    pub preserve_boundary: bool,
    /// Minimum cosine between a face normal before and after a collapse
    pub flip_threshold: f64,
    /// Stop once the cheapest remaining collapse exceeds this cost
    pub max_error: Option<f64>,
}

impl Default for QemSimplifier {
    fn default() -> Self {
        Self {
            boundary_weight: 1000.0,
            preserve_boundary: false,
            flip_threshold: 0.0,
            max_error: None,
        }
    }
}

impl QemSimplifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(
        boundary_weight: f64,
        preserve_boundary: bool,
        flip_threshold: f64,
        max_error: Option<f64>,
    ) -> Self {
        Self {
            boundary_weight,
            preserve_boundary,
            flip_threshold,
            max_error,
        }
    }

    /// Cost and merged position for contracting edge (a, b), or `None` when
    /// the edge is excluded from simplification.
    fn evaluate_edge(&self, cm: &CollapseMesh, a: usize, b: usize) -> Option<EdgeCost> {
        let a_boundary = cm.is_boundary_vertex(a);
        let b_boundary = cm.is_boundary_vertex(b);
        if self.preserve_boundary && (a_boundary || b_boundary) {
            return None;
        }

        let q = cm.vertices[a].quadric + cm.vertices[b].quadric;
        let pa = cm.vertices[a].position;
        let pb = cm.vertices[b].position;

        let position = match (a_boundary, b_boundary) {
            // Keep the outline where it is
            (true, false) => pa,
            (false, true) => pb,
            _ => self.optimal_position(&q, &pa, &pb),
        };

        let mut cost = q.evaluate(&position).max(0.0);
        if cm.edge_face_count(a, b) == 1 {
            cost += self.boundary_weight;
        }

        Some(EdgeCost {
            key: edge_key(a, b),
            position,
            cost,
        })
    }

    fn optimal_position(&self, q: &Quadric, pa: &Point3d, pb: &Point3d) -> Point3d {
        let midpoint = Point3d::from((pa.coords + pb.coords) * 0.5);
        let edge_len = (pb - pa).norm();
        if let Some(p) = q.minimizer() {
            // Nearly singular systems can place the optimum far off the edge
            if (p - midpoint).norm() <= edge_len * 2.0 {
                return p;
            }
        }
        [*pa, *pb, midpoint]
            .into_iter()
            .min_by(|x, y| q.evaluate(x).total_cmp(&q.evaluate(y)))
            .unwrap_or(midpoint)
    }

    fn refresh_edges(
        &self,
        cm: &CollapseMesh,
        queue: &mut PriorityQueue<EdgeKey, EdgeCost>,
        around: &[usize],
    ) {
        let mut seen: HashSet<EdgeKey> = HashSet::new();
        for &v in around {
            if cm.vertices[v].removed {
                continue;
            }
            for &n in &cm.vertices[v].neighbors {
                let key = edge_key(v, n);
                if !seen.insert(key) {
                    continue;
                }
                match self.evaluate_edge(cm, key.0, key.1) {
                    Some(cost) => {
                        queue.push(key, cost);
                    }
                    None => {
                        queue.remove(&key);
                    }
                }
            }
        }
    }

    fn build_queue(&self, cm: &CollapseMesh) -> PriorityQueue<EdgeKey, EdgeCost> {
        let mut queue = PriorityQueue::new();
        for (v, record) in cm.vertices.iter().enumerate() {
            for &n in &record.neighbors {
                if v < n {
                    if let Some(cost) = self.evaluate_edge(cm, v, n) {
                        queue.push(edge_key(v, n), cost);
                    }
                }
            }
        }
        queue
    }

    fn check_candidate(
        &self,
        cm: &CollapseMesh,
        candidate: &EdgeCost,
        relaxed: bool,
    ) -> std::result::Result<(), SkipReason> {
        let (a, b) = candidate.key;
        if !cm.check_link_condition(a, b) || cm.would_strand_vertex(a, b) {
            return Err(SkipReason::Topology);
        }
        if !relaxed && cm.would_flip(a, b, &candidate.position, self.flip_threshold) {
            return Err(SkipReason::Flip);
        }
        Ok(())
    }

    /// Simplify and return the pass statistics alongside the mesh.
    pub fn simplify_with_report(
        &self,
        mesh: &TriangleMesh,
        vertices_to_remove: usize,
    ) -> Result<(TriangleMesh, SimplificationReport)> {
        let vertex_count = mesh.vertex_count();
        if vertices_to_remove == 0 || vertices_to_remove >= vertex_count {
            return Err(Error::InvalidReductionTarget {
                requested: vertices_to_remove,
                vertex_count,
            });
        }
        mesh.validate()?;
        if mesh.faces.is_empty() {
            return Err(Error::MalformedMesh("mesh has no triangles".to_string()));
        }

        let mut cm = CollapseMesh::from_triangle_mesh(mesh, self.boundary_weight);
        let mut report = SimplificationReport::default();

        // Vertices no face references are dropped during compaction anyway
        for record in cm.vertices.iter_mut() {
            if record.faces.is_empty() {
                record.removed = true;
                report.vertices_removed += 1;
            }
        }

        let mut queue = self.build_queue(&cm);
        let mut deferred: HashSet<EdgeKey> = HashSet::new();
        let mut relaxed = false;

        while report.vertices_removed < vertices_to_remove {
            let candidate = match queue.pop() {
                Some((_, candidate)) => candidate,
                None => {
                    if relaxed || deferred.is_empty() {
                        report.exhausted = true;
                        break;
                    }
                    // Retry deferred candidates, accepting flipped faces
                    relaxed = true;
                    let retry: Vec<usize> = deferred.drain().flat_map(|(a, b)| [a, b]).collect();
                    self.refresh_edges(&cm, &mut queue, &retry);
                    continue;
                }
            };

            if let Some(limit) = self.max_error {
                if candidate.cost > limit {
                    break;
                }
            }

            let (a, b) = candidate.key;
            if !cm.is_live_edge(a, b) {
                continue;
            }

            match self.check_candidate(&cm, &candidate, relaxed) {
                Ok(()) => {}
                Err(SkipReason::Topology) => {
                    report.skipped_topology += 1;
                    continue;
                }
                Err(SkipReason::Flip) => {
                    report.skipped_flip += 1;
                    deferred.insert(candidate.key);
                    continue;
                }
            }

            let old_neighbors = cm.vertices[b].neighbors.clone();
            let affected = cm.collapse(a, b, candidate.position);
            report.collapses += 1;
            report.vertices_removed += 1;

            for n in old_neighbors {
                queue.remove(&edge_key(b, n));
            }

            let mut around = Vec::with_capacity(affected.len() + 1);
            around.push(a);
            around.extend(affected);
            self.refresh_edges(&cm, &mut queue, &around);
        }

        let result = cm.to_triangle_mesh();
        debug!(
            "QEM pass: {} -> {} vertices, {} -> {} faces ({} collapses, {} topology skips, {} flip deferrals{})",
            vertex_count,
            result.vertex_count(),
            mesh.face_count(),
            result.face_count(),
            report.collapses,
            report.skipped_topology,
            report.skipped_flip,
            if report.exhausted { ", queue exhausted" } else { "" }
        );
        Ok((result, report))
    }
}

impl MeshSimplifier for QemSimplifier {
    fn simplify(&self, mesh: &TriangleMesh, vertices_to_remove: usize) -> Result<TriangleMesh> {
        self.simplify_with_report(mesh, vertices_to_remove)
            .map(|(mesh, _)| mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn make_single_triangle() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.5, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        )
    }

    fn make_tetrahedron() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.5, 1.0, 0.0),
                Point3::new(0.5, 0.5, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        )
    }

    fn make_cube() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
                Point3::new(1.0, 0.0, 1.0),
                Point3::new(1.0, 1.0, 1.0),
                Point3::new(0.0, 1.0, 1.0),
            ],
            vec![
                [0, 2, 1], [0, 3, 2], // bottom
                [4, 5, 6], [4, 6, 7], // top
                [0, 1, 5], [0, 5, 4], // front
                [2, 3, 7], [2, 7, 6], // back
                [1, 2, 6], [1, 6, 5], // right
                [0, 4, 7], [0, 7, 3], // left
            ],
        )
    }

    fn make_plane_grid(size: usize) -> TriangleMesh {
        let mut vertices = Vec::new();
        for y in 0..size {
            for x in 0..size {
                vertices.push(Point3::new(x as f32, y as f32, 0.0));
            }
        }
        let mut faces = Vec::new();
        for y in 0..(size - 1) {
            for x in 0..(size - 1) {
                let tl = y * size + x;
                let tr = tl + 1;
                let bl = (y + 1) * size + x;
                let br = bl + 1;
                faces.push([tl, bl, tr]);
                faces.push([tr, bl, br]);
            }
        }
        TriangleMesh::from_vertices_and_faces(vertices, faces)
    }

    fn assert_valid(mesh: &TriangleMesh) {
        for f in &mesh.faces {
            for &v in f {
                assert!(v < mesh.vertex_count(), "index {} out of range", v);
            }
            assert!(f[0] != f[1] && f[1] != f[2] && f[2] != f[0], "degenerate face {:?}", f);
        }
        assert_eq!(mesh.normals.as_ref().map(Vec::len), Some(mesh.vertex_count()));
    }

    // ---- Construction tests ----

    #[test]
    fn test_creation() {
        let s = QemSimplifier::new();
        assert!(!s.preserve_boundary);
        assert!(s.max_error.is_none());
        assert_eq!(s.boundary_weight, 1000.0);
    }

    #[test]
    fn test_with_params() {
        let s = QemSimplifier::with_params(50.0, true, 0.2, Some(0.01));
        assert_eq!(s.boundary_weight, 50.0);
        assert!(s.preserve_boundary);
        assert_eq!(s.flip_threshold, 0.2);
        assert_eq!(s.max_error, Some(0.01));
    }

    // ---- Record structure tests ----

    #[test]
    fn test_records_closed_mesh() {
        let cm = CollapseMesh::from_triangle_mesh(&make_tetrahedron(), 0.0);
        for v in 0..4 {
            assert_eq!(cm.vertices[v].neighbors.len(), 3);
            assert_eq!(cm.vertices[v].faces.len(), 3);
            assert!(!cm.is_boundary_vertex(v));
        }
        assert!(cm.check_link_condition(0, 1));
    }

    #[test]
    fn test_records_boundary() {
        let cm = CollapseMesh::from_triangle_mesh(&make_single_triangle(), 0.0);
        for v in 0..3 {
            assert!(cm.is_boundary_vertex(v));
        }
        assert_eq!(cm.edge_face_count(0, 1), 1);
    }

    #[test]
    fn test_stranding_detection() {
        let quad = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        );
        let cm = CollapseMesh::from_triangle_mesh(&quad, 0.0);
        // The diagonal carries both faces; contracting it leaves nothing
        assert!(cm.would_strand_vertex(0, 2));
        assert!(!cm.would_strand_vertex(0, 1));

        let cm = CollapseMesh::from_triangle_mesh(&make_single_triangle(), 0.0);
        for (a, b) in [(0, 1), (1, 2), (0, 2)] {
            assert!(cm.would_strand_vertex(a, b));
        }
    }

    #[test]
    fn test_flip_detection() {
        let cm = CollapseMesh::from_triangle_mesh(&make_plane_grid(3), 0.0);
        // Dragging the centre vertex past the far diagonal folds the fan over
        let far = Point3d::new(3.0, 3.0, 0.0);
        assert!(cm.would_flip(4, 3, &far, 0.0));
        let near = Point3d::new(0.5, 1.0, 0.0);
        assert!(!cm.would_flip(4, 3, &near, 0.0));
    }

    // ---- Simplification tests ----

    #[test]
    fn test_rejects_out_of_range_target() {
        let s = QemSimplifier::new();
        let mesh = make_cube();
        assert!(matches!(
            s.simplify(&mesh, 0),
            Err(Error::InvalidReductionTarget { requested: 0, vertex_count: 8 })
        ));
        assert!(matches!(
            s.simplify(&mesh, 8),
            Err(Error::InvalidReductionTarget { requested: 8, .. })
        ));
        assert!(s.simplify(&mesh, 100).is_err());
    }

    #[test]
    fn test_rejects_mesh_without_faces() {
        let s = QemSimplifier::new();
        let mut mesh = make_single_triangle();
        mesh.faces.clear();
        assert!(matches!(s.simplify(&mesh, 1), Err(Error::MalformedMesh(_))));
    }

    #[test]
    fn test_rejects_non_finite() {
        let s = QemSimplifier::new();
        let mut mesh = make_cube();
        mesh.vertices[3].y = f32::INFINITY;
        assert!(matches!(s.simplify(&mesh, 2), Err(Error::MalformedMesh(_))));
    }

    #[test]
    fn test_cube_to_four_vertices() {
        let s = QemSimplifier::new();
        let mesh = make_cube();
        let (result, report) = s.simplify_with_report(&mesh, 4).unwrap();
        assert_eq!(result.vertex_count(), 4);
        assert!((2..=4).contains(&result.face_count()));
        assert_eq!(report.collapses, 4);
        assert_valid(&result);
        // Input untouched
        assert_eq!(mesh, make_cube());
    }

    #[test]
    fn test_planar_grid_simplification() {
        let s = QemSimplifier::new();
        let mesh = make_plane_grid(6);
        let (result, report) = s.simplify_with_report(&mesh, 10).unwrap();
        assert_valid(&result);
        assert!(result.vertex_count() <= 26);
        assert!(result.face_count() < mesh.face_count());
        assert!(!report.exhausted);
        assert_eq!(report.vertices_removed, 10);
        assert_eq!(result.vertex_count(), 26);
        for n in result.normals.as_ref().unwrap() {
            assert!(n.z.abs() > 0.99, "planar grid normal drifted: {:?}", n);
        }
    }

    #[test]
    fn test_preserve_boundary_keeps_outline() {
        let s = QemSimplifier::with_params(1000.0, true, 0.0, None);
        let mesh = make_plane_grid(5);
        let result = s.simplify(&mesh, 4).unwrap();
        assert_valid(&result);
        // Only interior vertices may go; the 16 outline vertices stay
        for p in mesh.vertices.iter().filter(|p| {
            p.x == 0.0 || p.y == 0.0 || p.x == 4.0 || p.y == 4.0
        }) {
            assert!(result.vertices.iter().any(|q| (q - p).norm() < 1e-5));
        }
    }

    #[test]
    fn test_attributes_carried() {
        let mut mesh = make_plane_grid(4);
        let uvs = mesh.vertices.iter().map(|p| [p.x / 3.0, p.y / 3.0]).collect();
        mesh.set_uvs(uvs);
        mesh.set_colors(vec![[10, 20, 30]; 16]);

        let result = QemSimplifier::new().simplify(&mesh, 3).unwrap();
        assert_eq!(result.uvs.as_ref().unwrap().len(), result.vertex_count());
        assert_eq!(result.colors.as_ref().unwrap().len(), result.vertex_count());
        for c in result.colors.as_ref().unwrap() {
            assert_eq!(*c, [10, 20, 30]);
        }
        for uv in result.uvs.as_ref().unwrap() {
            assert!((0.0..=1.0).contains(&uv[0]) && (0.0..=1.0).contains(&uv[1]));
        }
    }

    #[test]
    fn test_max_error_stops_early() {
        let s = QemSimplifier::with_params(1000.0, false, 0.0, Some(1e-9));
        let mesh = make_cube();
        // Every cube collapse moves a corner off at least one face plane
        let (result, report) = s.simplify_with_report(&mesh, 4).unwrap();
        assert_eq!(report.collapses, 0);
        assert_eq!(result.vertex_count(), 8);
    }

    #[test]
    fn test_two_triangle_quad_keeps_a_face() {
        let quad = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        );
        let (result, report) = QemSimplifier::new().simplify_with_report(&quad, 1).unwrap();
        assert_eq!(result.vertex_count(), 3);
        assert_eq!(result.face_count(), 1);
        assert_eq!(report.vertices_removed, 1);
        assert!(report.skipped_topology >= 1);
        assert_valid(&result);
    }

    #[test]
    fn test_single_triangle_is_left_intact() {
        let mesh = make_single_triangle();
        let (result, report) = QemSimplifier::new().simplify_with_report(&mesh, 1).unwrap();
        assert_eq!(result.vertex_count(), 3);
        assert_eq!(result.face_count(), 1);
        assert_eq!(report.collapses, 0);
        assert_eq!(report.vertices_removed, 0);
        assert_eq!(report.skipped_topology, 3);
        assert!(report.exhausted);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_unreferenced_vertices_count_as_removed() {
        let mut mesh = make_tetrahedron();
        mesh.add_vertex(Point3::new(5.0, 5.0, 5.0));
        let (result, report) = QemSimplifier::new().simplify_with_report(&mesh, 1).unwrap();
        assert_eq!(report.collapses, 0);
        assert_eq!(result.vertex_count(), 4);
        assert_eq!(result.face_count(), 4);
    }
}
