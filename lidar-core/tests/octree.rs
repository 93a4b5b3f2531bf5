mod common;

use common::{build, unit_cube_points};
use glam::DVec3;
use lidar_core::export::{export_points, ExportFormat, ExportOptions};
use lidar_core::format::{INDEX_HEADER_SIZE, NODE_RECORD_SIZE};
use lidar_core::reader::CancelToken;
use lidar_core::{Aabb, ConeState, OctreeError, PagedOctree};
use std::collections::HashSet;
use std::fs;

const MIB: usize = 1024 * 1024;

#[test]
fn built_octree_respects_node_bounds() {
    let points = unit_cube_points(10_000, 1);
    let built = build(&points, DVec3::ZERO, 256);
    assert_eq!(built.summary.num_input_points, 10_000);
    assert_eq!(built.summary.oversized_leaves, 0);

    let mut tree = PagedOctree::open(&built.stem, 16 * MIB).unwrap();
    assert_eq!(tree.num_points(), 10_000);
    assert_eq!(tree.max_points_per_node(), 256);

    let mut details = vec![0.0; tree.num_nodes()];
    let mut leaf_points = 0;
    tree.process_nodes_postfix(|node, _depth| {
        assert!(node.points.len() <= 256, "node {} holds {} points", node.id, node.points.len());
        for p in node.points {
            assert!(node.cube.contains(p.position_f64()), "node {} holds a stray point", node.id);
        }
        if node.is_leaf {
            leaf_points += node.points.len();
        }
        details[node.id] = node.detail_size;
    })
    .unwrap();
    assert_eq!(leaf_points, 10_000);

    for id in 0..tree.num_nodes() {
        let record = *tree.node_record(id);
        if record.is_leaf() {
            continue;
        }
        let first = ((record.children_offset as u64 - INDEX_HEADER_SIZE) / NODE_RECORD_SIZE) as usize;
        for child in first..first + 8 {
            assert!(details[child] <= details[id], "detail size grows from node {id} to {child}");
        }
    }
}

#[test]
fn box_export_matches_input_count() {
    let points = unit_cube_points(10_000, 2);
    let offset = DVec3::new(1000.0, 2000.0, 0.0);
    let built = build(&points, offset, 256);
    let mut tree = PagedOctree::open(&built.stem, 16 * MIB).unwrap();
    assert_eq!(tree.offset(), offset);

    let source_box = Aabb::new(DVec3::splat(0.25) + offset, DVec3::splat(0.75) + offset);
    let expected = points
        .iter()
        .filter(|p| p.cmpge(DVec3::splat(0.25)).all() && p.cmple(DVec3::splat(0.75)).all())
        .count() as u64;

    let output = built.dir.path().join("box.xyzrgb");
    let options = ExportOptions {
        format: ExportFormat::Ascii,
        bbox: Some(source_box),
        show_progress: false,
    };
    assert_eq!(export_points(&mut tree, &output, &options).unwrap(), expected);

    let text = fs::read_to_string(&output).unwrap();
    assert_eq!(text.lines().count() as u64, expected);
    for line in text.lines() {
        let xyz: Vec<f64> = line.split_whitespace().take(3).map(|v| v.parse().unwrap()).collect();
        assert!(source_box.contains(DVec3::new(xyz[0], xyz[1], xyz[2])), "{line}");
    }
}

#[test]
fn las_export_counts_every_point() {
    let points = unit_cube_points(2_000, 3);
    let built = build(&points, DVec3::new(500.0, 0.0, 0.0), 128);
    let mut tree = PagedOctree::open(&built.stem, 16 * MIB).unwrap();

    let output = built.dir.path().join("all.las");
    let options = ExportOptions {
        format: ExportFormat::Las {
            scale: DVec3::splat(0.001),
        },
        bbox: None,
        show_progress: false,
    };
    assert_eq!(export_points(&mut tree, &output, &options).unwrap(), 2_000);
    let bytes = fs::read(&output).unwrap();
    assert_eq!(bytes.len(), 227 + 2_000 * 26);
    assert_eq!(u32::from_le_bytes([bytes[107], bytes[108], bytes[109], bytes[110]]), 2_000);
}

#[test]
fn small_cache_bounds_resident_bytes() {
    let points = unit_cube_points(120_000, 4);
    let built = build(&points, DVec3::ZERO, 256);
    let points_file = fs::metadata(built.stem.join("Points")).unwrap().len();

    let budget = 64 * 1024;
    assert!(points_file > 16 * budget as u64);
    let mut tree = PagedOctree::open(&built.stem, budget).unwrap();

    let small = Aabb::new(DVec3::splat(0.4), DVec3::splat(0.45));
    let mut in_box = 0;
    tree.process_points_in_box(&small, |_| in_box += 1).unwrap();
    let expected = points
        .iter()
        .filter(|p| small.contains(**p))
        .count();
    assert_eq!(in_box, expected);

    let mut all = 0u64;
    tree.process_points(|_| all += 1).unwrap();
    assert_eq!(all, 120_000);

    let stats = tree.cache_stats();
    assert!(stats.peak_bytes <= budget, "peak {} over budget {}", stats.peak_bytes, budget);
    assert!(stats.evictions > 0);
    assert_eq!(stats.unavailable_nodes, 0);
}

#[test]
fn cone_returns_the_closest_hit() {
    let points = unit_cube_points(5_000, 5);
    let built = build(&points, DVec3::ZERO, 64);
    let mut tree = PagedOctree::open(&built.stem, 16 * MIB).unwrap();

    let rays = [
        (DVec3::new(-1.0, 0.5, 0.5), DVec3::X),
        (DVec3::new(0.2, -2.0, 0.7), DVec3::new(0.1, 1.0, -0.1)),
        (DVec3::new(2.0, 2.0, 2.0), DVec3::new(-1.0, -1.0, -1.0)),
    ];
    for (origin, direction) in rays {
        let probe = ConeState::new(origin, direction, 0.02);
        let nearest = points
            .iter()
            .filter_map(|p| probe.param_in_cone(*p).map(|t| (t, *p)))
            .min_by(|a, b| a.0.total_cmp(&b.0));

        let mut cone = probe;
        let hit = tree.intersect_cone(&mut cone).unwrap();
        match nearest {
            Some((t, _)) => {
                assert_eq!(cone.best_t, t);
                let hit = hit.unwrap();
                assert_eq!(probe.param_in_cone(hit), Some(t));
            }
            None => assert!(hit.is_none()),
        }
    }
}

/// Parent of every node, read from the children offsets.
fn parents(tree: &PagedOctree) -> Vec<Option<usize>> {
    let mut parents = vec![None; tree.num_nodes()];
    for id in 0..tree.num_nodes() {
        let record = *tree.node_record(id);
        if !record.is_leaf() {
            let first = ((record.children_offset as u64 - INDEX_HEADER_SIZE) / NODE_RECORD_SIZE) as usize;
            for child in first..first + 8 {
                parents[child] = Some(id);
            }
        }
    }
    parents
}

fn lod_front(tree: &mut PagedOctree, eye: DVec3) -> HashSet<usize> {
    let mut front = HashSet::new();
    tree.process_lod_nodes(eye, |node| {
        assert!(front.insert(node.id), "node {} drawn twice", node.id);
    })
    .unwrap();
    front
}

#[test]
fn lod_front_is_a_cut_that_shrinks_with_the_threshold() {
    let points = unit_cube_points(20_000, 7);
    let built = build(&points, DVec3::ZERO, 128);
    let mut tree = PagedOctree::open(&built.stem, 16 * MIB).unwrap();
    let parents = parents(&tree);
    let eye = DVec3::new(0.5, 0.5, 3.0);
    let filled_leaves: Vec<usize> = (0..tree.num_nodes())
        .filter(|&id| tree.node_record(id).is_leaf() && tree.node_record(id).num_points > 0)
        .collect();

    let mut previous = usize::MAX;
    for threshold in [0.0, 1.0e-4, 1.0e-3, 1.0e-2, 1.0e-1, 10.0] {
        tree.set_lod_threshold(threshold);
        let front = lod_front(&mut tree, eye);
        for &leaf in &filled_leaves {
            let mut on_path = 0;
            let mut node = Some(leaf);
            while let Some(id) = node {
                on_path += usize::from(front.contains(&id));
                node = parents[id];
            }
            assert_eq!(on_path, 1, "leaf {leaf} is covered {on_path} times at threshold {threshold}");
        }
        assert!(front.len() <= previous, "threshold {threshold} draws more nodes");
        previous = front.len();

        if threshold == 0.0 {
            assert_eq!(front.len(), filled_leaves.len());
        }
        if threshold == 10.0 {
            assert_eq!(front.into_iter().collect::<Vec<_>>(), vec![0]);
        }
    }

    tree.set_lod_threshold(1.0e-2);
    let coarse = lod_front(&mut tree, eye).len();
    tree.set_render_quality(2.0);
    assert!(lod_front(&mut tree, eye).len() >= coarse);
}

#[test]
fn cancelled_traversal_stops_early() {
    let points = unit_cube_points(5_000, 8);
    let built = build(&points, DVec3::ZERO, 64);
    let mut tree = PagedOctree::open(&built.stem, 16 * MIB).unwrap();

    let token = CancelToken::new();
    tree.set_cancel_token(Some(token.clone()));
    let mut visited = 0;
    let result = tree.process_points(|_| {
        visited += 1;
        token.cancel();
    });
    assert!(matches!(result, Err(OctreeError::Cancelled)));
    assert!(visited > 0 && visited <= 64, "{visited} points visited");

    token.reset();
    let mut all = 0;
    tree.process_points(|_| all += 1).unwrap();
    assert_eq!(all, 5_000);
}
