//! Reference-cell data for the supported cell shapes.
//!
//! Vertex numbering follows the usual reference conventions: simplices are
//! numbered by vertex, tensor-product cells in lexicographic (tensor) order.
//! Sub-entity `i` of dimension `d` is the list of reference vertices
//! returned by [`CellType::entity_vertices`]`(d)[i]`.

use crate::mesh_error::MeshError;
use serde::{Deserialize, Serialize};

/// Cell shapes supported by the mesh pipeline.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum CellType {
    /// 0D vertex.
    #[default]
    Vertex,
    /// 1D interval.
    Segment,
    /// 2D simplex.
    Triangle,
    /// 2D tensor-product cell.
    Quadrilateral,
    /// 3D simplex.
    Tetrahedron,
    /// 3D tensor-product cell.
    Hexahedron,
}

const VERTEX_ROWS: [&[usize]; 8] = [&[0], &[1], &[2], &[3], &[4], &[5], &[6], &[7]];

const SEGMENT_CELL: [&[usize]; 1] = [&[0, 1]];

const TRIANGLE_EDGES: [&[usize]; 3] = [&[1, 2], &[0, 2], &[0, 1]];
const TRIANGLE_CELL: [&[usize]; 1] = [&[0, 1, 2]];

const QUAD_EDGES: [&[usize]; 4] = [&[0, 1], &[0, 2], &[1, 3], &[2, 3]];
const QUAD_CELL: [&[usize]; 1] = [&[0, 1, 2, 3]];

const TET_EDGES: [&[usize]; 6] = [&[2, 3], &[1, 3], &[1, 2], &[0, 3], &[0, 2], &[0, 1]];
const TET_FACES: [&[usize]; 4] = [&[1, 2, 3], &[0, 2, 3], &[0, 1, 3], &[0, 1, 2]];
const TET_CELL: [&[usize]; 1] = [&[0, 1, 2, 3]];

const HEX_EDGES: [&[usize]; 12] = [
    &[0, 1],
    &[0, 2],
    &[0, 4],
    &[1, 3],
    &[1, 5],
    &[2, 3],
    &[2, 6],
    &[3, 7],
    &[4, 5],
    &[4, 6],
    &[5, 7],
    &[6, 7],
];
const HEX_FACES: [&[usize]; 6] = [
    &[0, 1, 2, 3],
    &[0, 1, 4, 5],
    &[0, 2, 4, 6],
    &[1, 3, 5, 7],
    &[2, 3, 6, 7],
    &[4, 5, 6, 7],
];
const HEX_CELL: [&[usize]; 1] = [&[0, 1, 2, 3, 4, 5, 6, 7]];

impl CellType {
    /// Topological dimension.
    pub fn dim(self) -> usize {
        match self {
            CellType::Vertex => 0,
            CellType::Segment => 1,
            CellType::Triangle | CellType::Quadrilateral => 2,
            CellType::Tetrahedron | CellType::Hexahedron => 3,
        }
    }

    pub fn num_vertices(self) -> usize {
        match self {
            CellType::Vertex => 1,
            CellType::Segment => 2,
            CellType::Triangle => 3,
            CellType::Quadrilateral | CellType::Tetrahedron => 4,
            CellType::Hexahedron => 8,
        }
    }

    /// True for triangles and tetrahedra (and the trivial simplices).
    pub fn is_simplex(self) -> bool {
        !matches!(self, CellType::Quadrilateral | CellType::Hexahedron)
    }

    /// Reference vertices of every sub-entity of dimension `dim`.
    /// Empty when `dim > self.dim()`.
    pub fn entity_vertices(self, dim: usize) -> &'static [&'static [usize]] {
        let tdim = self.dim();
        if dim > tdim {
            return &[];
        }
        if dim == 0 {
            return &VERTEX_ROWS[..self.num_vertices()];
        }
        match (self, dim) {
            (CellType::Segment, 1) => &SEGMENT_CELL,
            (CellType::Triangle, 1) => &TRIANGLE_EDGES,
            (CellType::Triangle, 2) => &TRIANGLE_CELL,
            (CellType::Quadrilateral, 1) => &QUAD_EDGES,
            (CellType::Quadrilateral, 2) => &QUAD_CELL,
            (CellType::Tetrahedron, 1) => &TET_EDGES,
            (CellType::Tetrahedron, 2) => &TET_FACES,
            (CellType::Tetrahedron, 3) => &TET_CELL,
            (CellType::Hexahedron, 1) => &HEX_EDGES,
            (CellType::Hexahedron, 2) => &HEX_FACES,
            (CellType::Hexahedron, 3) => &HEX_CELL,
            _ => &[],
        }
    }

    /// Number of sub-entities of dimension `dim`.
    pub fn num_entities(self, dim: usize) -> usize {
        self.entity_vertices(dim).len()
    }

    /// Shape of the sub-entities of dimension `dim`.
    pub fn entity_type(self, dim: usize) -> Result<CellType, MeshError> {
        let tdim = self.dim();
        if dim > tdim {
            return Err(MeshError::InvalidDimension { dim, tdim });
        }
        Ok(match dim {
            0 => CellType::Vertex,
            1 => CellType::Segment,
            d if d == tdim => self,
            // dim == 2 inside a 3D cell
            _ => match self {
                CellType::Tetrahedron => CellType::Triangle,
                _ => CellType::Quadrilateral,
            },
        })
    }

    /// Shape of the facets (entities of dimension `tdim - 1`).
    pub fn facet_type(self) -> Result<CellType, MeshError> {
        match self.dim() {
            0 => Err(MeshError::UnsupportedCellType {
                cell_type: self,
                context: "a vertex has no facets",
            }),
            d => self.entity_type(d - 1),
        }
    }

    /// Cell shape of dimension `tdim` with `n` vertices.
    pub fn from_num_vertices(tdim: usize, n: usize) -> Option<CellType> {
        match (tdim, n) {
            (0, 1) => Some(CellType::Vertex),
            (1, 2) => Some(CellType::Segment),
            (2, 3) => Some(CellType::Triangle),
            (2, 4) => Some(CellType::Quadrilateral),
            (3, 4) => Some(CellType::Tetrahedron),
            (3, 8) => Some(CellType::Hexahedron),
            _ => None,
        }
    }
}
