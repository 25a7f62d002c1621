//! Indexed triangle meshes
//!
//! Meshes are stored in local space together with an AABB tree over
//! their triangles. Index width is chosen per mesh: 16-bit indices when
//! every vertex index fits, 32-bit otherwise.

use crate::error::{Result, SceneQueryError};
use crate::foundation::math::Vec3;
use crate::spatial::aabb_tree::AabbTree;
use super::bounds::Aabb;
use super::primitives::Triangle;

/// Triangle index buffer in either width
#[derive(Debug, Clone, PartialEq)]
pub enum MeshIndices {
    /// 16-bit vertex indices
    U16(Vec<[u16; 3]>),
    /// 32-bit vertex indices
    U32(Vec<[u32; 3]>),
}

impl MeshIndices {
    /// Number of triangles
    pub fn len(&self) -> usize {
        match self {
            MeshIndices::U16(tris) => tris.len(),
            MeshIndices::U32(tris) => tris.len(),
        }
    }

    /// Whether there are no triangles
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vertex indices of one triangle
    pub fn get(&self, triangle: usize) -> Option<[u32; 3]> {
        match self {
            MeshIndices::U16(tris) => tris.get(triangle).map(|t| t.map(u32::from)),
            MeshIndices::U32(tris) => tris.get(triangle).copied(),
        }
    }

    fn max_index(&self) -> Option<u32> {
        (0..self.len()).filter_map(|i| self.get(i)).flatten().max()
    }
}

/// Local-space triangle mesh with its own AABB tree
#[derive(Debug, Clone)]
pub struct TriangleMesh {
    vertices: Vec<Vec3>,
    indices: MeshIndices,
    tree: AabbTree,
    bounds: Aabb,
}

impl TriangleMesh {
    /// Build a mesh from vertices and an index buffer
    pub fn new(vertices: Vec<Vec3>, indices: MeshIndices) -> Result<Self> {
        if let Some(max) = indices.max_index() {
            if max as usize >= vertices.len() {
                return Err(SceneQueryError::InvalidMesh(format!(
                    "index {} out of range for {} vertices",
                    max,
                    vertices.len()
                )));
            }
        }
        let mut mesh = Self {
            vertices,
            indices,
            tree: AabbTree::default(),
            bounds: Aabb::empty(),
        };
        let boxes: Vec<Aabb> = (0..mesh.nb_triangles()).map(|i| mesh.local_triangle(i).aabb()).collect();
        mesh.bounds = boxes.iter().fold(Aabb::empty(), |acc, b| acc.union(b));
        mesh.tree = AabbTree::build(&boxes);
        log::debug!(
            "TriangleMesh: {} triangles, {}-bit indices",
            mesh.nb_triangles(),
            if mesh.has_16bit_indices() { 16 } else { 32 }
        );
        Ok(mesh)
    }

    /// Build a mesh from a flat triangle list, narrowing to 16-bit indices when possible
    pub fn from_triangle_list(vertices: Vec<Vec3>, indices: &[u32]) -> Result<Self> {
        if indices.len() % 3 != 0 {
            return Err(SceneQueryError::InvalidMesh(format!(
                "index count {} is not a multiple of 3",
                indices.len()
            )));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(SceneQueryError::InvalidMesh(format!(
                "index {} out of range for {} vertices",
                bad,
                vertices.len()
            )));
        }
        let narrow = vertices.len() <= usize::from(u16::MAX) + 1;
        let indices = if narrow {
            MeshIndices::U16(
                indices
                    .chunks_exact(3)
                    .map(|t| [t[0] as u16, t[1] as u16, t[2] as u16])
                    .collect(),
            )
        } else {
            MeshIndices::U32(indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]]).collect())
        };
        Self::new(vertices, indices)
    }

    /// Number of triangles
    pub fn nb_triangles(&self) -> usize {
        self.indices.len()
    }

    /// Whether triangles use 16-bit indices
    pub fn has_16bit_indices(&self) -> bool {
        matches!(self.indices, MeshIndices::U16(_))
    }

    /// Local-space vertices
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// Local-space bounds
    pub fn local_bounds(&self) -> Aabb {
        self.bounds
    }

    /// Tree over triangle bounds; leaf primitives are triangle indices
    pub fn tree(&self) -> &AabbTree {
        &self.tree
    }

    /// Vertices of triangle `index` in local space
    ///
    /// `index` must be below [`TriangleMesh::nb_triangles`].
    pub fn local_triangle(&self, index: usize) -> Triangle {
        let [a, b, c] = self.indices.get(index).unwrap_or([0, 0, 0]);
        debug_assert!(index < self.nb_triangles());
        Triangle::new(
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Unit quad in the XZ plane at y = 0, facing +Y
    pub(crate) fn quad() -> TriangleMesh {
        let vertices = vec![
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 1.0),
        ];
        TriangleMesh::from_triangle_list(vertices, &[0, 2, 1, 0, 3, 2]).unwrap()
    }

    #[test]
    fn test_index_width_selection() {
        let mesh = quad();
        assert!(mesh.has_16bit_indices());
        assert_eq!(mesh.nb_triangles(), 2);

        let vertices: Vec<Vec3> = (0..70_000).map(|i| Vec3::new(i as f32, 0.0, (i % 2) as f32)).collect();
        let wide = TriangleMesh::from_triangle_list(vertices, &[0, 1, 69_999]).unwrap();
        assert!(!wide.has_16bit_indices());
        assert_eq!(wide.local_triangle(0).v2.x, 69_999.0);
    }

    #[test]
    fn test_quad_faces_up() {
        let mesh = quad();
        for i in 0..mesh.nb_triangles() {
            assert!(mesh.local_triangle(i).normal().y > 0.99);
        }
        let bounds = mesh.local_bounds();
        assert_eq!(bounds.min, Vec3::new(-1.0, 0.0, -1.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 0.0, 1.0));
        assert!(!mesh.tree().is_empty());
    }

    #[test]
    fn test_rejects_bad_indices() {
        let vertices = vec![Vec3::zeros(), Vec3::x(), Vec3::y()];
        assert!(TriangleMesh::from_triangle_list(vertices.clone(), &[0, 1]).is_err());
        assert!(TriangleMesh::from_triangle_list(vertices.clone(), &[0, 1, 3]).is_err());
        assert!(TriangleMesh::new(vertices, MeshIndices::U32(vec![[0, 1, 7]])).is_err());
    }
}
