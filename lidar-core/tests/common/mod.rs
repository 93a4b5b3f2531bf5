#![allow(dead_code)]

use glam::{DVec3, Vec3};
use lidar_core::accumulator::{AccumulatorSettings, PointAccumulator};
use lidar_core::builder::{BuildSettings, BuildSummary, OctreeBuilder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use tempfile::TempDir;

/// An octree written into a scratch directory that lives as long as this value.
pub struct Built {
    pub dir: TempDir,
    pub stem: PathBuf,
    pub summary: BuildSummary,
}

/// Uniform random points in the unit cube, rounded to single precision so that
/// stored positions equal the input exactly.
pub fn unit_cube_points(n: usize, seed: u64) -> Vec<DVec3> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| Vec3::new(rng.random(), rng.random(), rng.random()).as_dvec3())
        .collect()
}

/// Run points through the accumulator and the builder.
pub fn build(points: &[DVec3], offset: DVec3, max_points_per_node: u32) -> Built {
    let dir = tempfile::tempdir().unwrap();
    let template = |name: &str| dir.path().join(name).to_string_lossy().into_owned();

    let mut accumulator = PointAccumulator::new(AccumulatorSettings {
        memory_size: 64 * 1024,
        temp_octree_max_points_per_node: 1024,
        temp_octree_template: template("TempOctree"),
    });
    accumulator.set_point_offset(offset).unwrap();
    for (i, p) in points.iter().enumerate() {
        let shade = (i % 256) as f32;
        accumulator.add_point(*p + offset, [shade, 255.0 - shade, 128.0]).unwrap();
    }
    accumulator.finish_reading().unwrap();

    let stem = dir.path().join("Cloud.lidar");
    let summary = {
        let builder = OctreeBuilder::new(
            accumulator.temp_octrees(),
            BuildSettings {
                max_points_per_node,
                num_threads: 2,
                memory_size: 1 << 20,
                temp_point_template: template("TempPoints"),
                write_colors: false,
                show_progress: false,
            },
        )
        .unwrap();
        builder.build(&stem, offset).unwrap()
    };
    accumulator.delete_temp_octrees().unwrap();
    Built { dir, stem, summary }
}
