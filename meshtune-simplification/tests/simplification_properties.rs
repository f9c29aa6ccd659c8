//! Property tests for QEM simplification over closed and open meshes

use meshtune_core::{Error, Point3f, TriangleMesh};
use meshtune_simplification::{
    vertices_to_remove_for_ratio, MeshSimplifier, QemSimplifier,
};

/// Closed UV sphere with single-vertex poles
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
            let a = ring(i, j);
            let b = ring(i, j + 1);
            let c = ring(i + 1, j);
            let d = ring(i + 1, j + 1);
            faces.push([a, b, d]);
            faces.push([a, d, c]);
        }
    }
    for j in 0..slices {
        faces.push([south, ring(stacks - 1, j), ring(stacks - 1, j + 1)]);
    }
    TriangleMesh::from_vertices_and_faces(vertices, faces)
}

/// Open grid with a slight ripple so no two faces are exactly coplanar
fn make_rippled_grid(n: usize) -> TriangleMesh {
    let mut vertices = Vec::new();
    for y in 0..n {
        for x in 0..n {
            let z = 0.01 * ((x * 7 + y * 3) % 5) as f32;
            vertices.push(Point3f::new(x as f32, y as f32, z));
        }
    }
    let mut faces = Vec::new();
    for y in 0..n - 1 {
        for x in 0..n - 1 {
            let a = y * n + x;
            faces.push([a, a + n, a + 1]);
            faces.push([a + 1, a + n, a + n + 1]);
        }
    }
    TriangleMesh::from_vertices_and_faces(vertices, faces)
}

fn make_cube() -> TriangleMesh {
    TriangleMesh::from_vertices_and_faces(
        vec![
            Point3f::new(-1.0, -1.0, -1.0),
            Point3f::new(1.0, -1.0, -1.0),
            Point3f::new(1.0, 1.0, -1.0),
            Point3f::new(-1.0, 1.0, -1.0),
            Point3f::new(-1.0, -1.0, 1.0),
            Point3f::new(1.0, -1.0, 1.0),
            Point3f::new(1.0, 1.0, 1.0),
            Point3f::new(-1.0, 1.0, 1.0),
        ],
        vec![
            [0, 2, 1], [0, 3, 2],
            [4, 5, 6], [4, 6, 7],
            [0, 1, 5], [0, 5, 4],
            [2, 3, 7], [2, 7, 6],
            [1, 2, 6], [1, 6, 5],
            [0, 4, 7], [0, 7, 3],
        ],
    )
}

fn assert_valid_triangles(mesh: &TriangleMesh) {
    let n = mesh.vertex_count();
    for face in &mesh.faces {
        assert!(face.iter().all(|&v| v < n), "face {:?} out of range for {} vertices", face, n);
        assert!(
            face[0] != face[1] && face[1] != face[2] && face[2] != face[0],
            "face {:?} repeats a vertex",
            face
        );
    }
}

#[test]
fn test_cube_scenario() {
    let result = QemSimplifier::new().simplify(&make_cube(), 4).unwrap();
    assert_eq!(result.vertex_count(), 4);
    assert!(result.face_count() >= 2 && result.face_count() <= 4);
    assert_valid_triangles(&result);
}

#[test]
fn test_triangle_validity_and_monotonic_reduction() {
    let sphere = make_sphere(8, 12);
    let n = sphere.vertex_count();
    let simplifier = QemSimplifier::new();

    for to_remove in [1, 5, 20, 40, 60, n - 5] {
        let (result, report) = simplifier.simplify_with_report(&sphere, to_remove).unwrap();
        assert_valid_triangles(&result);
        assert!(result.face_count() > 0);
        assert_eq!(result.vertex_count(), n - report.vertices_removed);
        if !report.exhausted {
            assert_eq!(result.vertex_count(), n - to_remove);
        }
    }
}

#[test]
fn test_open_grids_hit_exact_count() {
    let simplifier = QemSimplifier::new();
    for size in [4, 6, 9] {
        let grid = make_rippled_grid(size);
        let n = grid.vertex_count();
        for to_remove in 1..n {
            let (result, report) = simplifier.simplify_with_report(&grid, to_remove).unwrap();
            assert_valid_triangles(&result);
            assert!(result.vertex_count() >= 3, "grid {} lost its surface at {}", size, to_remove);
            assert!(result.face_count() > 0);
            assert_eq!(result.vertex_count(), n - report.vertices_removed);
            if report.is_clean() && !report.exhausted {
                assert_eq!(
                    result.vertex_count(),
                    n - to_remove,
                    "grid {} removing {}: {:?}",
                    size,
                    to_remove,
                    report
                );
            }
        }
    }
}

#[test]
fn test_smallest_open_meshes_stay_non_empty() {
    let simplifier = QemSimplifier::new();
    let triangle = TriangleMesh::from_vertices_and_faces(
        vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
        ],
        vec![[0, 1, 2]],
    );
    let quad = make_rippled_grid(2);

    for mesh in [triangle, quad] {
        match simplifier.simplify(&mesh, 1) {
            Ok(result) => {
                assert!(!result.is_empty());
                assert_valid_triangles(&result);
            }
            Err(err) => assert!(matches!(err, Error::InvalidReductionTarget { .. })),
        }
    }
}

#[test]
fn test_resimplify_simplified_mesh() {
    let sphere = make_sphere(10, 16);
    let simplifier = QemSimplifier::new();

    let first = simplifier.simplify(&sphere, 40).unwrap();
    assert_valid_triangles(&first);

    let second = simplifier.simplify(&first, 20).unwrap();
    assert_valid_triangles(&second);
    assert!(second.vertex_count() < first.vertex_count());
    assert!(second.face_count() <= first.face_count());
}

#[test]
fn test_shape_is_roughly_kept() {
    let sphere = make_sphere(12, 24);
    let target = vertices_to_remove_for_ratio(sphere.vertex_count(), 0.6);
    let result = QemSimplifier::new().simplify(&sphere, target).unwrap();
    for v in &result.vertices {
        let r = v.coords.norm();
        assert!(r > 0.6 && r < 1.2, "vertex drifted to radius {}", r);
    }
}

#[test]
fn test_boundary_rejections() {
    let simplifier = QemSimplifier::new();
    let sphere = make_sphere(6, 8);
    let n = sphere.vertex_count();

    assert!(matches!(
        simplifier.simplify(&sphere, n),
        Err(Error::InvalidReductionTarget { .. })
    ));
    assert!(matches!(
        simplifier.simplify(&sphere, n + 10),
        Err(Error::InvalidReductionTarget { .. })
    ));

    let no_faces = TriangleMesh::from_vertices_and_faces(sphere.vertices.clone(), vec![]);
    assert!(matches!(simplifier.simplify(&no_faces, 3), Err(Error::MalformedMesh(_))));
}

#[test]
fn test_near_total_removal_terminates() {
    let sphere = make_sphere(6, 8);
    let n = sphere.vertex_count();
    let result = QemSimplifier::new().simplify(&sphere, n - 1).unwrap();
    assert_valid_triangles(&result);
    assert!(result.vertex_count() < n);
    assert!(result.face_count() > 0);
}

#[test]
fn test_welded_soup_simplifies() {
    let sphere = make_sphere(6, 10);
    let soup_positions: Vec<Point3f> = sphere
        .faces
        .iter()
        .flat_map(|f| f.map(|v| sphere.vertices[v]))
        .collect();
    let soup = TriangleMesh::from_triangle_soup(soup_positions).unwrap();
    let welded = soup.weld_vertices(1e-5);
    assert_eq!(welded.vertex_count(), sphere.vertex_count());

    let result = QemSimplifier::new().simplify(&welded, 10).unwrap();
    assert_valid_triangles(&result);
    assert!(result.vertex_count() <= welded.vertex_count() - 10);
}
