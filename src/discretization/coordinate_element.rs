//! Coordinate element descriptors: which node of a cell's node list sits on
//! which reference sub-entity.
//!
//! Node positions follow the usual Lagrange ordering: vertex nodes first (in
//! reference vertex order), then the interior nodes of every edge, then of
//! every face, then of the cell interior. Within an entity the nodes are
//! numbered consecutively.

use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellType;
use serde::{Deserialize, Serialize};

/// Element family of a coordinate element.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum ElementFamily {
    #[default]
    Lagrange,
}

/// Positions of the degrees of freedom (geometric nodes) within a cell's
/// node list, grouped by reference sub-entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDofLayout {
    cell_type: CellType,
    /// `entity_dofs[dim][entity]` = node positions owned by that entity.
    entity_dofs: Vec<Vec<Vec<usize>>>,
    num_dofs: usize,
}

impl ElementDofLayout {
    /// Build and validate a layout. Every entity of one dimension must carry
    /// the same number of nodes, every vertex exactly one, and the positions
    /// must cover `0..num_dofs` exactly once.
    pub fn new(cell_type: CellType, entity_dofs: Vec<Vec<Vec<usize>>>) -> Result<Self, MeshError> {
        let tdim = cell_type.dim();
        if entity_dofs.len() != tdim + 1 {
            return Err(MeshError::MalformedDofLayout(format!(
                "expected {} dimensions, got {}",
                tdim + 1,
                entity_dofs.len()
            )));
        }
        for (dim, per_entity) in entity_dofs.iter().enumerate() {
            let expected = cell_type.num_entities(dim);
            if per_entity.len() != expected {
                return Err(MeshError::MalformedDofLayout(format!(
                    "dimension {dim}: expected {expected} entities, got {}",
                    per_entity.len()
                )));
            }
            if let Some(first) = per_entity.first() {
                if per_entity.iter().any(|d| d.len() != first.len()) {
                    return Err(MeshError::MalformedDofLayout(format!(
                        "dimension {dim}: entities carry different dof counts"
                    )));
                }
            }
        }
        if entity_dofs[0].iter().any(|d| d.len() != 1) {
            return Err(MeshError::MalformedDofLayout(
                "every vertex must carry exactly one node".into(),
            ));
        }

        let num_dofs: usize = entity_dofs.iter().flatten().map(Vec::len).sum();
        let mut seen = vec![false; num_dofs];
        for &pos in entity_dofs.iter().flatten().flatten() {
            match seen.get_mut(pos) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(MeshError::MalformedDofLayout(format!(
                        "node position {pos} is listed twice"
                    )));
                }
                None => {
                    return Err(MeshError::MalformedDofLayout(format!(
                        "node position {pos} exceeds {num_dofs} nodes"
                    )));
                }
            }
        }
        Ok(Self {
            cell_type,
            entity_dofs,
            num_dofs,
        })
    }

    /// Lagrange layout of the given degree.
    pub fn lagrange(cell_type: CellType, degree: usize) -> Result<Self, MeshError> {
        if degree == 0 {
            return Err(MeshError::UnsupportedElement {
                family: ElementFamily::Lagrange,
                cell_type,
                degree,
            });
        }
        let tdim = cell_type.dim();
        let mut next = 0usize;
        let mut entity_dofs = Vec::with_capacity(tdim + 1);
        for dim in 0..=tdim {
            let shape = cell_type.entity_type(dim)?;
            let per_entity = interior_lagrange_nodes(shape, degree);
            let rows = (0..cell_type.num_entities(dim))
                .map(|_| {
                    let row: Vec<usize> = (next..next + per_entity).collect();
                    next += per_entity;
                    row
                })
                .collect();
            entity_dofs.push(rows);
        }
        Self::new(cell_type, entity_dofs)
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    /// Nodes carried by each entity of dimension `dim` (0 beyond tdim).
    pub fn num_entity_dofs(&self, dim: usize) -> usize {
        self.entity_dofs
            .get(dim)
            .and_then(|rows| rows.first())
            .map_or(0, Vec::len)
    }

    /// Node positions of entity `entity` of dimension `dim`.
    pub fn entity_dofs(&self, dim: usize, entity: usize) -> &[usize] {
        self.entity_dofs
            .get(dim)
            .and_then(|rows| rows.get(entity))
            .map_or(&[], Vec::as_slice)
    }

    /// Position of every reference vertex in the node list.
    pub fn vertex_positions(&self) -> Vec<usize> {
        self.entity_dofs[0].iter().map(|d| d[0]).collect()
    }
}

/// Nodes strictly inside a reference entity of `shape` for degree `p`.
fn interior_lagrange_nodes(shape: CellType, p: usize) -> usize {
    let q = p - 1;
    match shape {
        CellType::Vertex => 1,
        CellType::Segment => q,
        CellType::Triangle => q * q.saturating_sub(1) / 2,
        CellType::Quadrilateral => q * q,
        CellType::Tetrahedron => q * q.saturating_sub(1) * q.saturating_sub(2) / 6,
        CellType::Hexahedron => q * q * q,
    }
}

/// Geometric (coordinate) element: a cell shape, a degree and its node layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateElement {
    family: ElementFamily,
    degree: usize,
    layout: ElementDofLayout,
}

impl CoordinateElement {
    pub fn new(family: ElementFamily, cell_type: CellType, degree: usize) -> Result<Self, MeshError> {
        let layout = match family {
            ElementFamily::Lagrange => ElementDofLayout::lagrange(cell_type, degree)?,
        };
        Ok(Self {
            family,
            degree,
            layout,
        })
    }

    /// Shorthand for a Lagrange element.
    pub fn lagrange(cell_type: CellType, degree: usize) -> Result<Self, MeshError> {
        Self::new(ElementFamily::Lagrange, cell_type, degree)
    }

    /// Element with a caller-supplied node layout.
    pub fn with_layout(family: ElementFamily, degree: usize, layout: ElementDofLayout) -> Self {
        Self {
            family,
            degree,
            layout,
        }
    }

    pub fn family(&self) -> ElementFamily {
        self.family
    }

    pub fn cell_shape(&self) -> CellType {
        self.layout.cell_type()
    }

    pub fn dof_layout(&self) -> &ElementDofLayout {
        &self.layout
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Nodes per cell.
    pub fn num_nodes(&self) -> usize {
        self.layout.num_dofs()
    }

    /// True when some edge or face carries more than one node, so the node
    /// order on it depends on the entity's orientation.
    pub fn needs_dof_permutations(&self) -> bool {
        let tdim = self.cell_shape().dim();
        (1..tdim).any(|d| self.layout.num_entity_dofs(d) > 1)
    }
}
