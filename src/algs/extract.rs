//! Vertex-only connectivity from geometric node lists.

use crate::data::AdjacencyList;
use crate::discretization::ElementDofLayout;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellType;

/// Keep only the vertex nodes of every cell, in reference vertex order.
///
/// Vertex `i` of a cell is `raw[layout.entity_dofs(0, i)[0]]`. For degree-1
/// layouts this is the identity.
pub fn extract_topology<T: Copy>(
    cell_type: CellType,
    layout: &ElementDofLayout,
    raw_cells: &AdjacencyList<T>,
) -> Result<AdjacencyList<T>, MeshError> {
    if layout.cell_type() != cell_type {
        return Err(MeshError::MalformedDofLayout(format!(
            "layout is for {:?}, cells are {cell_type:?}",
            layout.cell_type()
        )));
    }
    let positions = layout.vertex_positions();
    let num_nodes = layout.num_dofs();

    let mut topology = Vec::with_capacity(raw_cells.num_nodes() * positions.len());
    for (cell, nodes) in raw_cells.iter().enumerate() {
        if nodes.len() != num_nodes {
            return Err(MeshError::CellNodeCountMismatch {
                cell,
                expected: num_nodes,
                found: nodes.len(),
            });
        }
        topology.extend(positions.iter().map(|&p| nodes[p]));
    }
    AdjacencyList::uniform(topology, positions.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_layout_is_identity() {
        let layout = ElementDofLayout::lagrange(CellType::Triangle, 1).unwrap();
        let cells = AdjacencyList::uniform(vec![4i64, 9, 2, 9, 2, 7], 3).unwrap();
        assert_eq!(
            extract_topology(CellType::Triangle, &layout, &cells).unwrap(),
            cells
        );
    }

    #[test]
    fn quadratic_layout_drops_edge_nodes() {
        let layout = ElementDofLayout::lagrange(CellType::Triangle, 2).unwrap();
        let cells = AdjacencyList::uniform(vec![0i64, 1, 2, 10, 11, 12], 6).unwrap();
        let topo = extract_topology(CellType::Triangle, &layout, &cells).unwrap();
        assert_eq!(topo.links(0), &[0, 1, 2]);
    }

    #[test]
    fn wrong_row_length_is_rejected() {
        let layout = ElementDofLayout::lagrange(CellType::Triangle, 2).unwrap();
        let cells = AdjacencyList::uniform(vec![0i64, 1, 2], 3).unwrap();
        assert!(matches!(
            extract_topology(CellType::Triangle, &layout, &cells),
            Err(MeshError::CellNodeCountMismatch { cell: 0, .. })
        ));
        assert!(extract_topology(CellType::Quadrilateral, &layout, &cells).is_err());
    }
}
