//! Octree builder: merges temporary octrees into the final on-disk octree.
use crate::error::BuildError;
use crate::format::{
    INDEX_HEADER_SIZE, IndexHeader, NODE_RECORD_SIZE, NodeRecord, point_record_size,
    write_offset_file, write_point,
};
use crate::geometry::{Bounds, Cube, CubePath};
use crate::point::{OffsetVector, StreamPoint};
use crate::progress::{node_bar, point_bar};
use crate::temp_octree::{TempOctree, scratch_file};
use byteorder::{LittleEndian, WriteBytesExt};
use constants::files::{COLORS_FILE_NAME, INDEX_FILE_NAME, OFFSET_FILE_NAME, POINTS_FILE_NAME};
use constants::preprocessor::{
    DEFAULT_MAX_POINTS_PER_NODE, DEFAULT_MEMORY_CACHE_SIZE_MIB, DEFAULT_NUM_THREADS,
    DEFAULT_TEMP_POINT_TEMPLATE, MAX_OCTREE_DEPTH, ROOT_CUBE_PADDING, SUBSAMPLE_SEED,
};
use indicatif::ProgressBar;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Settings of the final octree.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub max_points_per_node: u32,
    pub num_threads: usize,
    /// Bytes available for subtrees that are built in memory.
    pub memory_size: usize,
    pub temp_point_template: String,
    /// Also write a `Colors` side file.
    pub write_colors: bool,
    pub show_progress: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            max_points_per_node: DEFAULT_MAX_POINTS_PER_NODE,
            num_threads: DEFAULT_NUM_THREADS,
            memory_size: DEFAULT_MEMORY_CACHE_SIZE_MIB * 1024 * 1024,
            temp_point_template: DEFAULT_TEMP_POINT_TEMPLATE.to_string(),
            write_colors: false,
            show_progress: true,
        }
    }
}

/// Statistics of a finished build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildSummary {
    pub num_input_points: u64,
    pub num_nodes: u64,
    pub num_leaves: u64,
    pub num_stored_points: u64,
    pub max_depth: u32,
    pub oversized_leaves: u64,
    pub root: Option<Cube>,
}

struct BuiltNode {
    cube: Cube,
    detail_size: f64,
    num_points: u32,
    /// Input points stored in the leaves below this node.
    subtree_points: u64,
    /// Region holding this node's points and the first record inside it.
    region: usize,
    first_point: u64,
    children: Option<Vec<BuiltNode>>,
}

/// Private point scratch area of one subtree.
struct Region {
    file: NamedTempFile,
    writer: BufWriter<File>,
    next_record: u64,
}

impl Region {
    fn new(template: &str) -> Result<Self, BuildError> {
        let file = scratch_file(template)?;
        let writer = BufWriter::new(file.as_file().try_clone()?);
        Ok(Self {
            file,
            writer,
            next_record: 0,
        })
    }

    fn append(&mut self, points: &[StreamPoint], has_normals: bool) -> io::Result<u64> {
        let first = self.next_record;
        for sp in points {
            let normal = has_normals.then(|| sp.normal.unwrap_or_default());
            write_point(&mut self.writer, &sp.point, normal)?;
        }
        self.next_record += points.len() as u64;
        Ok(first)
    }

    fn finish(mut self) -> io::Result<(NamedTempFile, u64)> {
        self.writer.flush()?;
        Ok((self.file, self.next_record))
    }
}

/// Fixed-seed reservoir sample of a point stream.
struct Reservoir {
    capacity: usize,
    seen: u64,
    points: Vec<StreamPoint>,
    rng: StdRng,
}

impl Reservoir {
    fn new(capacity: usize, path: &CubePath) -> Self {
        Self {
            capacity,
            seen: 0,
            points: Vec::with_capacity(capacity),
            rng: StdRng::seed_from_u64(SUBSAMPLE_SEED ^ path.key()),
        }
    }

    fn offer(&mut self, sp: StreamPoint) {
        self.seen += 1;
        if self.points.len() < self.capacity {
            self.points.push(sp);
        } else {
            let slot = self.rng.random_range(0..self.seen);
            if slot < self.capacity as u64 {
                self.points[slot as usize] = sp;
            }
        }
    }
}

impl BuiltNode {
    fn num_nodes(&self) -> u64 {
        1 + self.children.iter().flatten().map(BuiltNode::num_nodes).sum::<u64>()
    }

    fn interior(
        cube: Cube,
        num_points: u32,
        region: usize,
        first_point: u64,
        children: Vec<BuiltNode>,
    ) -> Self {
        let subtree_points = children.iter().map(|c| c.subtree_points).sum();
        Self {
            cube,
            detail_size: detail_size(cube.radius, subtree_points),
            num_points,
            subtree_points,
            region,
            first_point,
            children: Some(children),
        }
    }

    /// Cap every detail size by its parent's so it never grows towards the leaves.
    fn clamp_detail(&mut self, limit: f64) {
        self.detail_size = self.detail_size.min(limit);
        let limit = self.detail_size;
        for child in self.children.iter_mut().flatten() {
            child.clamp_detail(limit);
        }
    }
}

/// Point spacing of a cube holding `num_points` points.
fn detail_size(radius: f64, num_points: u64) -> f64 {
    if num_points == 0 {
        0.0
    } else {
        radius / (num_points as f64).cbrt()
    }
}

fn leaf_count(count: usize) -> Result<u32, BuildError> {
    u32::try_from(count).map_err(|_| BuildError::PointCountOverflow(count as u64))
}

/// Builds the final octree from the accumulator's temporary octrees.
pub struct OctreeBuilder<'a> {
    temp_octrees: &'a [TempOctree],
    settings: BuildSettings,
    has_normals: bool,
    in_memory_limit: usize,
    progress: ProgressBar,
}

impl<'a> OctreeBuilder<'a> {
    pub fn new(temp_octrees: &'a [TempOctree], settings: BuildSettings) -> Result<Self, BuildError> {
        if settings.max_points_per_node == 0 {
            return Err(BuildError::Settings(
                "maximum number of points per node must be positive".to_string(),
            ));
        }
        let threads = settings.num_threads.max(1);
        let in_memory_limit = (settings.memory_size / std::mem::size_of::<StreamPoint>() / threads)
            .max(settings.max_points_per_node as usize * 8);
        let total: u64 = temp_octrees.iter().map(|t| t.num_points()).sum();
        let progress = point_bar(total, "Building octree", settings.show_progress);

        Ok(Self {
            temp_octrees,
            has_normals: temp_octrees.first().is_some_and(|t| t.has_normals()),
            settings,
            in_memory_limit,
            progress,
        })
    }

    /// Root cube around the union of all temporary octree cubes.
    pub fn root_cube(&self) -> Cube {
        let mut bounds = Bounds::new();
        for tree in self.temp_octrees {
            bounds.update(tree.cube().min());
            bounds.update(tree.cube().max());
        }
        Cube::bounding(&bounds, ROOT_CUBE_PADDING)
    }

    /// Build the octree and write `Index`, `Points`, and optional side files below `stem`.
    pub fn build(&self, stem: &Path, offset: OffsetVector) -> Result<BuildSummary, BuildError> {
        let root_path = CubePath::root(self.root_cube());
        let max = self.settings.max_points_per_node as usize;

        let mut root_region = Region::new(&self.settings.temp_point_template)?;
        let mut sampler = Reservoir::new(max, &root_path);
        let mut all = Vec::new();
        let mut total = 0u64;
        for tree in self.temp_octrees {
            tree.for_each_point_in(&root_path, |sp| {
                total += 1;
                if all.len() <= max {
                    all.push(sp);
                }
                sampler.offer(sp);
            })?;
        }
        let num_input: u64 = self.temp_octrees.iter().map(|t| t.num_points()).sum();
        if total != num_input {
            warn!("{} input points fell outside the root cube", num_input - total);
        }

        let mut regions = Vec::new();
        let mut root = if total <= max as u64 {
            self.progress.inc(all.len() as u64);
            let first_point = root_region.append(&all, self.has_normals)?;
            BuiltNode {
                cube: root_path.cube(),
                detail_size: detail_size(root_path.cube().radius, all.len() as u64),
                num_points: all.len() as u32,
                subtree_points: all.len() as u64,
                region: 0,
                first_point,
                children: None,
            }
        } else {
            drop(all);
            let first_point = root_region.append(&sampler.points, self.has_normals)?;
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.settings.num_threads.max(1))
                .build()
                .map_err(|err| BuildError::Settings(err.to_string()))?;
            let built: Vec<(BuiltNode, Region)> = pool.install(|| {
                (0..8usize)
                    .into_par_iter()
                    .map(|octant| {
                        let mut region = Region::new(&self.settings.temp_point_template)?;
                        let node = self.build_from_temp(root_path.child(octant), octant + 1, &mut region)?;
                        Ok((node, region))
                    })
                    .collect::<Result<Vec<_>, BuildError>>()
            })?;

            let mut children = Vec::with_capacity(8);
            for (node, region) in built {
                children.push(node);
                regions.push(region);
            }
            BuiltNode::interior(root_path.cube(), sampler.points.len() as u32, 0, first_point, children)
        };
        root.clamp_detail(f64::INFINITY);
        regions.insert(0, root_region);
        self.progress.finish_with_message("Octree built");

        let mut summary = self.write(stem, &root, regions)?;
        summary.num_input_points = num_input;
        summary.root = Some(root.cube);

        if offset != OffsetVector::ZERO {
            write_offset_file(&stem.join(OFFSET_FILE_NAME), offset)?;
        }
        info!(
            "wrote {} nodes ({} leaves, depth {}) holding {} points to {}",
            summary.num_nodes,
            summary.num_leaves,
            summary.max_depth,
            summary.num_stored_points,
            stem.display()
        );
        Ok(summary)
    }

    /// Build a subtree whose points are still spread over the temporary octrees.
    fn build_from_temp(&self, path: CubePath, region_index: usize, region: &mut Region) -> Result<BuiltNode, BuildError> {
        let max = self.settings.max_points_per_node as usize;
        let mut sampler = Reservoir::new(max, &path);
        let mut collected = Vec::new();
        let mut count = 0usize;
        let mut fits = true;
        for tree in self.temp_octrees {
            tree.for_each_point_in(&path, |sp| {
                count += 1;
                if fits {
                    if count > self.in_memory_limit {
                        fits = false;
                        collected = Vec::new();
                    } else {
                        collected.push(sp);
                    }
                }
                sampler.offer(sp);
            })?;
        }

        if fits {
            return self.build_in_memory(path, collected, region_index, region);
        }

        if path.depth() >= MAX_OCTREE_DEPTH {
            // Too many coincident points to hold in memory; stream them into one leaf.
            let mut first_point = None;
            for tree in self.temp_octrees {
                let mut batch = Vec::new();
                tree.collect_points_in(&path, &mut batch)?;
                let first = region.append(&batch, self.has_normals)?;
                first_point.get_or_insert(first);
            }
            warn!(
                "kept {} coincident points in one leaf at depth {}",
                count,
                path.depth()
            );
            self.progress.inc(count as u64);
            return Ok(BuiltNode {
                cube: path.cube(),
                detail_size: detail_size(path.cube().radius, count as u64),
                num_points: leaf_count(count)?,
                subtree_points: count as u64,
                region: region_index,
                first_point: first_point.unwrap_or(region.next_record),
                children: None,
            });
        }

        let first_point = region.append(&sampler.points, self.has_normals)?;
        let mut children = Vec::with_capacity(8);
        for octant in 0..8 {
            children.push(self.build_from_temp(path.child(octant), region_index, region)?);
        }
        Ok(BuiltNode::interior(
            path.cube(),
            sampler.points.len() as u32,
            region_index,
            first_point,
            children,
        ))
    }

    fn build_in_memory(
        &self,
        path: CubePath,
        points: Vec<StreamPoint>,
        region_index: usize,
        region: &mut Region,
    ) -> Result<BuiltNode, BuildError> {
        let max = self.settings.max_points_per_node as usize;
        let cube = path.cube();

        if points.len() <= max || path.depth() >= MAX_OCTREE_DEPTH {
            if points.len() > max {
                warn!(
                    "kept {} coincident points in one leaf at depth {}",
                    points.len(),
                    path.depth()
                );
            }
            self.progress.inc(points.len() as u64);
            let first_point = region.append(&points, self.has_normals)?;
            return Ok(BuiltNode {
                cube,
                detail_size: detail_size(cube.radius, points.len() as u64),
                num_points: leaf_count(points.len())?,
                subtree_points: points.len() as u64,
                region: region_index,
                first_point,
                children: None,
            });
        }

        let mut sampler = Reservoir::new(max, &path);
        let mut buckets: [Vec<StreamPoint>; 8] = Default::default();
        for sp in points {
            sampler.offer(sp);
            buckets[cube.octant(sp.point.position_f64())].push(sp);
        }
        let first_point = region.append(&sampler.points, self.has_normals)?;
        let num_points = sampler.points.len() as u32;
        drop(sampler);

        let mut children = Vec::with_capacity(8);
        for (octant, bucket) in buckets.into_iter().enumerate() {
            children.push(self.build_in_memory(path.child(octant), bucket, region_index, region)?);
        }
        Ok(BuiltNode::interior(cube, num_points, region_index, first_point, children))
    }

    /// Concatenate the point regions and write node records in breadth-first order.
    fn write(&self, stem: &Path, root: &BuiltNode, regions: Vec<Region>) -> Result<BuildSummary, BuildError> {
        fs::create_dir_all(stem)?;
        let record_size = point_record_size(self.has_normals);

        let mut points = BufWriter::new(File::create(stem.join(POINTS_FILE_NAME))?);
        points.write_u32::<LittleEndian>(record_size)?;
        let mut region_base = Vec::with_capacity(regions.len());
        let mut finished = Vec::with_capacity(regions.len());
        let mut base = 0u64;
        for region in regions {
            let (file, records) = region.finish()?;
            region_base.push(base);
            base += records;
            io::copy(&mut File::open(file.path())?, &mut points)?;
            finished.push(file);
        }
        points.flush()?;

        if self.settings.write_colors {
            self.write_colors(stem, &finished)?;
        }
        for file in finished {
            file.close()?;
        }

        let mut summary = BuildSummary {
            num_stored_points: base,
            ..Default::default()
        };
        let mut index = BufWriter::new(File::create(stem.join(INDEX_FILE_NAME))?);
        IndexHeader {
            center: root.cube.center,
            radius: root.cube.radius,
            max_points_per_node: self.settings.max_points_per_node,
        }
        .write(&mut index)?;

        let pb = node_bar(root.num_nodes(), "Writing node records", self.settings.show_progress);
        let mut next_free = INDEX_HEADER_SIZE + NODE_RECORD_SIZE;
        let mut queue = VecDeque::from([(root, 0u32)]);
        while let Some((node, depth)) = queue.pop_front() {
            let children_offset = match &node.children {
                Some(children) => {
                    let offset = next_free;
                    next_free += 8 * NODE_RECORD_SIZE;
                    queue.extend(children.iter().map(|c| (c, depth + 1)));
                    offset as i64
                }
                None => {
                    summary.num_leaves += 1;
                    if node.num_points > self.settings.max_points_per_node {
                        summary.oversized_leaves += 1;
                    }
                    0
                }
            };
            NodeRecord {
                children_offset,
                detail_size: node.detail_size,
                points_offset: (region_base[node.region] + node.first_point) as i64,
                num_points: node.num_points,
            }
            .write(&mut index)?;
            summary.num_nodes += 1;
            summary.max_depth = summary.max_depth.max(depth);
            pb.inc(1);
        }
        index.flush()?;
        pb.finish_with_message("Node records written");
        Ok(summary)
    }

    fn write_colors(&self, stem: &Path, regions: &[NamedTempFile]) -> Result<(), BuildError> {
        let mut colors = BufWriter::new(File::create(stem.join(COLORS_FILE_NAME))?);
        for file in regions {
            let mut reader = io::BufReader::new(File::open(file.path())?);
            loop {
                match crate::format::read_point(&mut reader, self.has_normals) {
                    Ok((point, _)) => colors.write_all(&point.color.0)?,
                    Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
                    Err(err) => return Err(err.into()),
                }
            }
        }
        colors.flush()?;
        Ok(())
    }
}
