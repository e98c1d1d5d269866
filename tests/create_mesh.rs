mod util;
use util::*;

use hashbrown::HashMap;
use parmesh::prelude::*;
use serial_test::serial;

/// Rank 0 holds cells 0 and 1, rank 1 holds cells 2 and 3. Cells 0 and 3
/// share the facet (1, 4) across the cut.
fn fixed_partition(
    comm: &RayonComm,
    _n_parts: usize,
    _tdim: usize,
    cells: &AdjacencyList<i64>,
    _ghost_mode: GhostMode,
) -> Result<AdjacencyList<i32>, MeshError> {
    let rows: &[&[i32]] = if comm.rank() == 0 {
        &[&[0, 1], &[0]]
    } else {
        &[&[1], &[1, 0]]
    };
    assert_eq!(cells.num_nodes(), rows.len());
    Ok(AdjacencyList::from_rows(rows.iter().map(|r| r.iter().copied())))
}

fn square_on_two_ranks(ghost_mode: GhostMode) -> Vec<(Topology, Geometry<f64>)> {
    run_ranks(2, |comm| {
        let r = comm.rank();
        let cells = cells_of(&SQUARE_CELLS[2 * r..2 * r + 2]);
        let x = &SQUARE_X[6 * r..6 * r + 6];
        let element = CoordinateElement::lagrange(CellType::Triangle, 1).unwrap();
        let mesh =
            create_mesh_with_partitioner(&comm, &cells, &element, x, 2, ghost_mode, &fixed_partition)
                .unwrap();
        (mesh.topology().clone(), mesh.geometry().clone())
    })
}

/// Global vertex numbers must name the same input vertex on every rank.
fn assert_vertex_numbering_agrees(parts: &[(Topology, Geometry<f64>)], num_vertices: i64) {
    let mut input_of: HashMap<i64, i64> = HashMap::new();
    for (topo, _) in parts {
        let vmap = topo.index_map(0).unwrap();
        assert_eq!(vmap.size_global(), num_vertices);
        for (v, &input) in topo.original_vertex_index().iter().enumerate() {
            let g = vmap.local_to_global(v as i32).unwrap();
            assert_eq!(*input_of.entry(g).or_insert(input), input, "global vertex {g}");
        }
    }
    assert_eq!(input_of.len() as i64, num_vertices);
}

fn assert_geometry_matches_input(geom: &Geometry<f64>, x: &[f64], gdim: usize) {
    for (i, &input) in geom.input_global_indices().iter().enumerate() {
        let row = input as usize;
        assert_eq!(geom.node(i), &x[row * gdim..(row + 1) * gdim]);
    }
}

#[test]
fn serial_square() {
    let cells = cells_of(&SQUARE_CELLS);
    let element = CoordinateElement::lagrange(CellType::Triangle, 1).unwrap();
    let mesh = create_mesh(&NoComm, &cells, &element, &SQUARE_X, 2, GhostMode::SharedFacet).unwrap();
    let topo = mesh.topology();
    assert_eq!(topo.index_map(2).unwrap().size_local(), 4);
    assert_eq!(topo.index_map(2).unwrap().num_ghosts(), 0);
    assert_eq!(topo.index_map(0).unwrap().size_local(), 6);
    assert_permutation(topo.original_cell_index(), &[0, 1, 2, 3]);
    assert_eq!(mesh.geometry().dofmap(), topo.connectivity(2, 0).unwrap());
    assert_geometry_matches_input(mesh.geometry(), &SQUARE_X, 2);
    // Row `c` of the topology is input cell `original_cell_index[c]`.
    for (c, &orig) in topo.original_cell_index().iter().enumerate() {
        let input: Vec<i64> = topo
            .connectivity(2, 0)
            .unwrap()
            .links(c)
            .iter()
            .map(|&v| topo.original_vertex_index()[v as usize])
            .collect();
        assert_eq!(input, SQUARE_CELLS[orig as usize]);
    }
}

#[test]
fn identity_reordering_keeps_input_order() {
    let cells = cells_of(&SQUARE_CELLS);
    let element = CoordinateElement::lagrange(CellType::Triangle, 1).unwrap();
    let config = MeshConfig::default();
    let mesh = create_mesh_with_config(
        &NoComm,
        &cells,
        &element,
        &SQUARE_X,
        2,
        &config,
        &GraphPartitioner::new(RcmBands),
        &IdentityReordering,
    )
    .unwrap();
    assert_eq!(mesh.topology().original_cell_index(), &[0, 1, 2, 3]);
}

#[test]
#[serial]
fn two_ranks_with_facet_ghosts() {
    let parts = square_on_two_ranks(GhostMode::SharedFacet);

    let (t0, _) = &parts[0];
    let cells0 = t0.index_map(2).unwrap();
    assert_eq!((cells0.size_local(), cells0.num_ghosts()), (2, 1));
    assert_permutation(&t0.original_cell_index()[..2], &[0, 1]);
    assert_eq!(t0.original_cell_index()[2], 3);
    assert_eq!(cells0.owners(), &[1]);
    let verts0 = t0.index_map(0).unwrap();
    assert_eq!((verts0.size_local(), verts0.num_ghosts()), (4, 1));
    assert_eq!(t0.original_vertex_index()[4], 5);

    let (t1, _) = &parts[1];
    let cells1 = t1.index_map(2).unwrap();
    assert_eq!((cells1.size_local(), cells1.num_ghosts()), (2, 1));
    assert_permutation(&t1.original_cell_index()[..2], &[2, 3]);
    assert_eq!(t1.original_cell_index()[2], 0);
    let verts1 = t1.index_map(0).unwrap();
    assert_eq!((verts1.size_local(), verts1.num_ghosts()), (2, 3));
    assert_permutation(&t1.original_vertex_index()[..2], &[2, 5]);
    assert!(verts1.owners().iter().all(|&o| o == 0));

    assert_vertex_numbering_agrees(&parts, 6);
    for (topo, geom) in &parts {
        assert_eq!(geom.dofmap(), topo.connectivity(2, 0).unwrap());
        assert_geometry_matches_input(geom, &SQUARE_X, 2);
    }

    // Ghost cells carry the global index their owner gave them.
    let global_cell = |topo: &Topology, orig: i64| {
        let c = topo.original_cell_index().iter().position(|&o| o == orig).unwrap();
        topo.index_map(2).unwrap().local_to_global(c as i32).unwrap()
    };
    assert_eq!(global_cell(t0, 3), global_cell(t1, 3));
    assert_eq!(global_cell(t1, 0), global_cell(t0, 0));
}

#[test]
#[serial]
fn two_ranks_without_ghosts() {
    let parts = square_on_two_ranks(GhostMode::None);
    for (topo, geom) in &parts {
        let cells = topo.index_map(2).unwrap();
        assert_eq!(cells.size_local(), 2);
        assert_eq!(cells.num_ghosts(), 0);
        assert_eq!(geom.dofmap().num_nodes(), 2);
    }
    // Vertex 5 is no longer seen by rank 0; vertex 0 no longer by rank 1.
    assert_eq!(parts[0].0.index_map(0).unwrap().local_size_with_ghosts(), 4);
    assert_eq!(parts[1].0.index_map(0).unwrap().local_size_with_ghosts(), 4);
    assert_vertex_numbering_agrees(&parts, 6);
}

#[test]
#[serial]
fn three_ranks_default_partitioner() {
    let (cells, x) = triangle_grid(4);
    let num_cells = cells.len();
    let num_nodes = x.len() / 2;
    let parts = run_ranks(3, |comm| {
        let r = comm.rank();
        let mine = cells_of(&cells[block(num_cells, r, 3)]);
        let rows = block(num_nodes, r, 3);
        let my_x = &x[2 * rows.start..2 * rows.end];
        let element = CoordinateElement::lagrange(CellType::Triangle, 1).unwrap();
        let mesh = create_mesh(&comm, &mine, &element, my_x, 2, GhostMode::SharedFacet).unwrap();
        (mesh.topology().clone(), mesh.geometry().clone())
    });

    let mut owned: Vec<i64> = Vec::new();
    for (rank, (topo, geom)) in parts.iter().enumerate() {
        for dim in [0, 2] {
            let map = topo.index_map(dim).unwrap();
            assert!(map.owners().iter().all(|&o| o as usize != rank));
            assert_eq!(
                topo.connectivity(dim, dim).map(|c| c.num_nodes()),
                Some(map.local_size_with_ghosts())
            );
        }
        let map = topo.index_map(2).unwrap();
        assert_eq!(map.size_global(), num_cells as i64);
        owned.extend_from_slice(&topo.original_cell_index()[..map.size_local()]);
        assert_eq!(geom.dofmap(), topo.connectivity(2, 0).unwrap());
        assert_geometry_matches_input(geom, &x, 2);
    }
    let all: Vec<i64> = (0..num_cells as i64).collect();
    assert_permutation(&owned, &all);
    assert_vertex_numbering_agrees(&parts, num_nodes as i64);
}

#[test]
fn quadratic_triangles_create_edges() {
    // One P2 triangle: vertices first, then one node per edge.
    let cells = AdjacencyList::from_rows([[0i64, 1, 2, 3, 4, 5]]);
    let x = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.5, 0.5, 0.0, 0.5, 0.5, 0.0];
    let element = CoordinateElement::lagrange(CellType::Triangle, 2).unwrap();
    let mesh = create_mesh(&NoComm, &cells, &element, &x, 2, GhostMode::None).unwrap();
    let topo = mesh.topology();
    assert_eq!(topo.index_map(1).unwrap().size_local(), 3);
    assert!(topo.cell_permutations().is_none());
    let geom = mesh.geometry();
    assert_eq!(geom.num_nodes(), 6);
    assert_eq!(&geom.dofmap().links(0)[..3], topo.connectivity(2, 0).unwrap().links(0));
    assert_geometry_matches_input(geom, &x, 2);
}

#[test]
fn cubic_triangles_need_permutations() {
    let cells = AdjacencyList::from_rows([(0i64..10).collect::<Vec<_>>()]);
    let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
    let element = CoordinateElement::lagrange(CellType::Triangle, 3).unwrap();
    assert!(element.needs_dof_permutations());
    let mesh = create_mesh(&NoComm, &cells, &element, &x, 2, GhostMode::None).unwrap();
    assert_eq!(mesh.topology().cell_permutations().map(|p| p.len()), Some(1));
    assert_eq!(mesh.geometry().num_nodes(), 10);
}

#[test]
fn quadrilaterals() {
    let cells = AdjacencyList::from_rows([[0i64, 1, 3, 4], [1, 2, 4, 5]]);
    let element = CoordinateElement::lagrange(CellType::Quadrilateral, 1).unwrap();
    let mut mesh = create_mesh(&NoComm, &cells, &element, &SQUARE_X, 2, GhostMode::None).unwrap();
    mesh.create_entities(1).unwrap();
    assert_eq!(mesh.topology().index_map(1).unwrap().size_local(), 7);
    mesh.create_connectivity(1, 2).unwrap();
    let shared = mesh
        .topology()
        .connectivity(1, 2)
        .unwrap()
        .iter()
        .filter(|c| c.len() == 2)
        .count();
    assert_eq!(shared, 1);
}

#[test]
fn sub_of_one_edge() {
    let cells = cells_of(&SQUARE_CELLS);
    let element = CoordinateElement::lagrange(CellType::Triangle, 1).unwrap();
    let mut mesh = create_mesh(&NoComm, &cells, &element, &SQUARE_X, 2, GhostMode::None).unwrap();
    let sub = mesh.sub(1, &[0]).unwrap();
    assert_eq!(sub.topology.cell_type(), CellType::Segment);
    assert_eq!(sub.entity_map, vec![0]);
    assert_eq!(sub.vertex_map.len(), 2);
    assert_eq!(sub.topology.index_map(0).unwrap().local_size_with_ghosts(), 2);
    assert_permutation(sub.topology.connectivity(1, 0).unwrap().links(0), &[0, 1]);
    assert_eq!(mesh.topology().index_map(1).unwrap().size_local(), 9);
}

#[test]
fn shared_vertex_is_rejected() {
    let cells = cells_of(&SQUARE_CELLS);
    let element = CoordinateElement::lagrange(CellType::Triangle, 1).unwrap();
    let err = create_mesh(&NoComm, &cells, &element, &SQUARE_X, 2, GhostMode::SharedVertex).unwrap_err();
    assert!(matches!(err, MeshError::UnsupportedGhostMode(GhostMode::SharedVertex)));
}

#[test]
fn non_manifold_input_is_rejected() {
    let cells = cells_of(&[[0, 1, 2], [0, 1, 3], [0, 1, 4]]);
    let x = [0.0; 10];
    let element = CoordinateElement::lagrange(CellType::Triangle, 1).unwrap();
    let err = create_mesh(&NoComm, &cells, &element, &x, 2, GhostMode::None).unwrap_err();
    assert!(matches!(err, MeshError::NonManifoldFacet { count: 3, .. }));
}

fn non_manifold_on_ranks(layout: &[&[[i64; 3]]]) -> Vec<Result<(), MeshError>> {
    let size = layout.len();
    let x = [0.0f64; 10];
    run_ranks(size, |comm| {
        let r = comm.rank();
        let cells = cells_of(layout[r]);
        let rows = block(5, r, size);
        let element = CoordinateElement::lagrange(CellType::Triangle, 1).unwrap();
        create_mesh(&comm, &cells, &element, &x[2 * rows.start..2 * rows.end], 2, GhostMode::SharedFacet)
            .map(|_| ())
    })
}

#[test]
#[serial]
fn non_manifold_across_ranks_is_rejected() {
    let two_and_one: &[&[[i64; 3]]] = &[&[[0, 1, 2], [0, 1, 3]], &[[0, 1, 4]]];
    let one_each: &[&[[i64; 3]]] = &[&[[0, 1, 2]], &[[0, 1, 3]], &[[0, 1, 4]]];
    for layout in [two_and_one, one_each] {
        for (rank, res) in non_manifold_on_ranks(layout).iter().enumerate() {
            assert!(
                matches!(res, Err(MeshError::NonManifoldFacet { count: 3, .. })),
                "rank {rank} of {}: {res:?}",
                layout.len()
            );
        }
    }
}

#[test]
#[serial]
fn bad_row_on_one_rank_fails_all_ranks() {
    let results = run_ranks(2, |comm| {
        let r = comm.rank();
        let cells = if r == 0 {
            cells_of(&SQUARE_CELLS[..2])
        } else {
            AdjacencyList::from_rows([vec![1i64, 2, 5], vec![1, 5]])
        };
        let element = CoordinateElement::lagrange(CellType::Triangle, 1).unwrap();
        create_mesh(&comm, &cells, &element, &SQUARE_X[6 * r..6 * r + 6], 2, GhostMode::SharedFacet)
            .map(|_| ())
    });
    assert!(matches!(
        results[1],
        Err(MeshError::CellNodeCountMismatch { cell: 1, expected: 3, found: 2 })
    ));
    assert!(matches!(results[0], Err(MeshError::CommError { neighbor: 1, .. })));
}

#[test]
#[serial]
fn bad_coordinates_on_one_rank_fail_all_ranks() {
    let results = run_ranks(2, |comm| {
        let r = comm.rank();
        let cells = cells_of(&SQUARE_CELLS[2 * r..2 * r + 2]);
        // Rank 1 drops half a coordinate row.
        let x = if r == 0 { &SQUARE_X[..6] } else { &SQUARE_X[6..11] };
        let element = CoordinateElement::lagrange(CellType::Triangle, 1).unwrap();
        create_mesh(&comm, &cells, &element, x, 2, GhostMode::SharedFacet).map(|_| ())
    });
    assert!(matches!(results[1], Err(MeshError::InvalidCoordinates { len: 5, gdim: 2 })));
    assert!(matches!(results[0], Err(MeshError::CommError { neighbor: 1, .. })));
}

#[test]
fn missing_coordinates_are_reported() {
    let cells = cells_of(&SQUARE_CELLS);
    let element = CoordinateElement::lagrange(CellType::Triangle, 1).unwrap();
    let err = create_mesh(&NoComm, &cells, &element, &SQUARE_X[..8], 2, GhostMode::None).unwrap_err();
    assert!(matches!(err, MeshError::NodeOutOfRange { total: 4, .. }));
}

#[test]
fn config_serde_round_trip() {
    let cfg = MeshConfig {
        ghost_mode: GhostMode::None,
        reorder_passes: 3,
        tag: CommTag::new(0x2000),
    };
    let json = serde_json::to_string(&cfg).unwrap();
    let back: MeshConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cfg);

    let partial: MeshConfig = serde_json::from_str(r#"{"ghost_mode":"None"}"#).unwrap();
    assert_eq!(partial.ghost_mode, GhostMode::None);
    assert_eq!(partial.reorder_passes, 2);
}
