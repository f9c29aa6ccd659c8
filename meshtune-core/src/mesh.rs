//! Mesh data structures and functionality

use crate::error::{Error, Result};
use crate::point::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An indexed triangle mesh with optional per-vertex attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3f>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub colors: Option<Vec<[u8; 3]>>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            normals: None,
            uvs: None,
            colors: None,
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
            uvs: None,
            colors: None,
        }
    }

    /// Create a mesh from an unindexed position list, where every three
    /// consecutive positions form one triangle.
    pub fn from_triangle_soup(positions: Vec<Point3f>) -> Result<Self> {
        if positions.len() % 3 != 0 {
            return Err(Error::InvalidData(format!(
                "Triangle soup needs a multiple of 3 positions, got {}",
                positions.len()
            )));
        }
        let faces = (0..positions.len() / 3)
            .map(|t| [t * 3, t * 3 + 1, t * 3 + 2])
            .collect();
        Ok(Self::from_vertices_and_faces(positions, faces))
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Add a vertex to the mesh
    pub fn add_vertex(&mut self, vertex: Point3f) -> usize {
        let index = self.vertices.len();
        self.vertices.push(vertex);
        index
    }

    /// Add a face to the mesh
    pub fn add_face(&mut self, face: [usize; 3]) {
        self.faces.push(face);
    }

    /// Check that every index is in range and every coordinate is finite.
    pub fn validate(&self) -> Result<()> {
        let n = self.vertices.len();
        if let Some(i) = self
            .vertices
            .iter()
            .position(|v| !v.coords.iter().all(|c| c.is_finite()))
        {
            return Err(Error::MalformedMesh(format!(
                "vertex {} has a non-finite coordinate",
                i
            )));
        }
        for (fi, face) in self.faces.iter().enumerate() {
            if face.iter().any(|&v| v >= n) {
                return Err(Error::MalformedMesh(format!(
                    "face {} references a vertex outside 0..{}",
                    fi, n
                )));
            }
        }
        for (name, len) in [
            ("normals", self.normals.as_ref().map(Vec::len)),
            ("uvs", self.uvs.as_ref().map(Vec::len)),
            ("colors", self.colors.as_ref().map(Vec::len)),
        ] {
            if let Some(len) = len {
                if len != n {
                    return Err(Error::MalformedMesh(format!(
                        "{} has {} entries for {} vertices",
                        name, len, n
                    )));
                }
            }
        }
        Ok(())
    }

    /// Calculate face normals
    pub fn calculate_face_normals(&self) -> Vec<Vector3f> {
        self.faces
            .iter()
            .map(|face| {
                let v0 = self.vertices[face[0]];
                let v1 = self.vertices[face[1]];
                let v2 = self.vertices[face[2]];

                let edge1 = v1 - v0;
                let edge2 = v2 - v0;

                edge1.cross(&edge2).normalize()
            })
            .collect()
    }

    /// Recompute vertex normals as the area-weighted average of the adjacent
    /// face normals. Vertices with no usable adjacent face get +Z.
    pub fn compute_vertex_normals(&mut self) {
        let mut acc = vec![Vector3f::zeros(); self.vertices.len()];
        for face in &self.faces {
            let v0 = self.vertices[face[0]];
            let v1 = self.vertices[face[1]];
            let v2 = self.vertices[face[2]];
            // Unnormalized cross product weights by twice the area
            let n = (v1 - v0).cross(&(v2 - v0));
            for &vi in face {
                acc[vi] += n;
            }
        }
        let normals = acc
            .into_iter()
            .map(|n| {
                let len = n.norm();
                if len > f32::EPSILON && len.is_finite() {
                    n / len
                } else {
                    Vector3f::z()
                }
            })
            .collect();
        self.normals = Some(normals);
    }

    /// Merge vertices whose positions fall in the same `epsilon` cell.
    ///
    /// The first vertex of each cell keeps its attributes. Faces that lose a
    /// distinct corner are dropped. An `epsilon` of zero merges only exact
    /// duplicates.
    pub fn weld_vertices(&self, epsilon: f32) -> TriangleMesh {
        let mut cells: HashMap<[i64; 3], usize> = HashMap::with_capacity(self.vertices.len());
        let mut remap = Vec::with_capacity(self.vertices.len());
        let mut kept = Vec::new();

        for (i, v) in self.vertices.iter().enumerate() {
            let key = if epsilon > 0.0 {
                [
                    (v.x / epsilon).round() as i64,
                    (v.y / epsilon).round() as i64,
                    (v.z / epsilon).round() as i64,
                ]
            } else {
                [v.x.to_bits() as i64, v.y.to_bits() as i64, v.z.to_bits() as i64]
            };
            let next = kept.len();
            let slot = *cells.entry(key).or_insert(next);
            if slot == next {
                kept.push(i);
            }
            remap.push(slot);
        }

        let faces = self
            .faces
            .iter()
            .map(|f| [remap[f[0]], remap[f[1]], remap[f[2]]])
            .filter(|f| f[0] != f[1] && f[1] != f[2] && f[2] != f[0])
            .collect();

        TriangleMesh {
            vertices: kept.iter().map(|&i| self.vertices[i]).collect(),
            faces,
            normals: self.normals.as_ref().map(|n| kept.iter().map(|&i| n[i]).collect()),
            uvs: self.uvs.as_ref().map(|u| kept.iter().map(|&i| u[i]).collect()),
            colors: self.colors.as_ref().map(|c| kept.iter().map(|&i| c[i]).collect()),
        }
    }

    /// Interleave positions, normals and UVs into the GPU vertex layout.
    pub fn to_gpu_vertices(&self) -> Vec<GpuVertex> {
        self.vertices
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let normal = self
                    .normals
                    .as_ref()
                    .map(|n| n[i])
                    .unwrap_or_else(Vector3f::z);
                let uv = self.uvs.as_ref().map(|u| u[i]).unwrap_or([0.0; 2]);
                GpuVertex::new(p, &normal, uv)
            })
            .collect()
    }

    /// Flatten faces into a 32-bit index buffer.
    pub fn to_index_buffer(&self) -> Vec<u32> {
        self.faces
            .iter()
            .flat_map(|f| f.iter().map(|&i| i as u32))
            .collect()
    }

    /// Estimated video memory for this mesh's vertex and index buffers.
    pub fn estimated_gpu_bytes(&self) -> u64 {
        let vertex_bytes = self.vertices.len() * GpuVertex::STRIDE;
        let index_bytes = self.faces.len() * 3 * std::mem::size_of::<u32>();
        (vertex_bytes + index_bytes) as u64
    }

    /// Set vertex normals
    pub fn set_normals(&mut self, normals: Vec<Vector3f>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Set vertex texture coordinates
    pub fn set_uvs(&mut self, uvs: Vec<[f32; 2]>) {
        if uvs.len() == self.vertices.len() {
            self.uvs = Some(uvs);
        }
    }

    /// Set vertex colors
    pub fn set_colors(&mut self, colors: Vec<[u8; 3]>) {
        if colors.len() == self.vertices.len() {
            self.colors = Some(colors);
        }
    }

    /// Clear the mesh
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.faces.clear();
        self.normals = None;
        self.uvs = None;
        self.colors = None;
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}
