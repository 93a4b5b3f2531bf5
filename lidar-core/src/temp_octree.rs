//! Temporary octrees written by the point accumulator.
//!
//! Each temporary octree splits one buffer of points in memory until every
//! leaf holds at most the configured number of points, writes the leaves
//! to a scratch file, and keeps only the node directory in memory.
use crate::error::BuildError;
use crate::format::{point_record_size, read_point, write_point};
use crate::geometry::{Bounds, Cube, CubePath};
use crate::point::StreamPoint;
use constants::preprocessor::{MAX_OCTREE_DEPTH, ROOT_CUBE_PADDING, TEMP_FILE_RANDOM_CHARS};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Create a uniquely named scratch file from a path template such as `/tmp/LidarPreprocessorTempOctree`.
pub(crate) fn scratch_file(template: &str) -> Result<NamedTempFile, BuildError> {
    let template_path = Path::new(template);
    let dir = match template_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = template_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    tempfile::Builder::new()
        .prefix(&prefix)
        .rand_bytes(TEMP_FILE_RANDOM_CHARS)
        .tempfile_in(&dir)
        .map_err(|source| BuildError::ScratchFile {
            template: template.to_string(),
            source,
        })
}

#[derive(Debug, Clone)]
struct TempNode {
    cube: Cube,
    /// Index of the first of eight children in the directory.
    first_child: Option<usize>,
    /// First point record of a leaf inside the scratch file.
    first_point: u64,
    num_points: u32,
}

/// One spilled buffer of the accumulator.
#[derive(Debug)]
pub struct TempOctree {
    file: NamedTempFile,
    nodes: Vec<TempNode>,
    bounds: Bounds,
    num_points: u64,
    has_normals: bool,
}

impl TempOctree {
    /// Split the given points into a balanced octree and write its leaves to a new scratch file.
    pub fn create(
        points: Vec<StreamPoint>,
        max_points_per_leaf: u32,
        template: &str,
        has_normals: bool,
    ) -> Result<Self, BuildError> {
        if max_points_per_leaf == 0 {
            return Err(BuildError::Settings(
                "temporary octree leaf bound must be positive".to_string(),
            ));
        }

        let mut bounds = Bounds::new();
        for sp in &points {
            bounds.update(sp.point.position_f64());
        }
        let num_points = points.len() as u64;
        let root = Cube::bounding(&bounds, ROOT_CUBE_PADDING);

        let file = scratch_file(template)?;
        let mut tree = Self {
            file,
            nodes: vec![TempNode {
                cube: root,
                first_child: None,
                first_point: 0,
                num_points: 0,
            }],
            bounds,
            num_points,
            has_normals,
        };

        let mut writer = BufWriter::new(tree.file.as_file().try_clone()?);
        let mut next_point = 0u64;
        tree.split(0, points, 0, max_points_per_leaf, &mut writer, &mut next_point)?;
        writer.flush()?;

        debug!(
            "temporary octree {} holds {} points in {} nodes",
            tree.path().display(),
            tree.num_points,
            tree.nodes.len()
        );
        Ok(tree)
    }

    fn split<W: Write>(
        &mut self,
        node: usize,
        points: Vec<StreamPoint>,
        depth: u32,
        max_points_per_leaf: u32,
        writer: &mut W,
        next_point: &mut u64,
    ) -> Result<(), BuildError> {
        if points.len() <= max_points_per_leaf as usize || depth >= MAX_OCTREE_DEPTH {
            let has_normals = self.has_normals;
            for sp in &points {
                let normal = has_normals.then(|| sp.normal.unwrap_or_default());
                write_point(writer, &sp.point, normal)?;
            }
            let entry = &mut self.nodes[node];
            entry.first_point = *next_point;
            entry.num_points = points.len() as u32;
            *next_point += points.len() as u64;
            return Ok(());
        }

        let cube = self.nodes[node].cube;
        let mut buckets: [Vec<StreamPoint>; 8] = Default::default();
        for sp in points {
            buckets[cube.octant(sp.point.position_f64())].push(sp);
        }

        let first_child = self.nodes.len();
        for octant in 0..8 {
            self.nodes.push(TempNode {
                cube: cube.child(octant),
                first_child: None,
                first_point: 0,
                num_points: 0,
            });
        }
        self.nodes[node].first_child = Some(first_child);

        for (octant, bucket) in buckets.into_iter().enumerate() {
            self.split(
                first_child + octant,
                bucket,
                depth + 1,
                max_points_per_leaf,
                writer,
                next_point,
            )?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn cube(&self) -> Cube {
        self.nodes[0].cube
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn num_points(&self) -> u64 {
        self.num_points
    }

    pub fn has_normals(&self) -> bool {
        self.has_normals
    }

    /// Visit every stored point owned by the given node path.
    pub fn for_each_point_in<F>(&self, path: &CubePath, mut visit: F) -> Result<(), BuildError>
    where
        F: FnMut(StreamPoint),
    {
        let record_size = u64::from(point_record_size(self.has_normals));
        let mut file = BufReader::new(File::open(self.path())?);
        let expected = self.num_points * record_size;
        let actual = file.get_ref().metadata()?.len();
        if actual != expected {
            return Err(self.corrupt(format!(
                "file holds {actual} bytes, {expected} expected"
            )));
        }

        // Slack against rounding between the two cube hierarchies.
        let target = path.cube();
        let query = Cube::new(target.center, target.radius * (1.0 + 1.0e-9));

        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !overlaps(&node.cube, &query) {
                continue;
            }
            if let Some(first) = node.first_child {
                stack.extend((first..first + 8).rev());
                continue;
            }
            if node.num_points == 0 {
                continue;
            }
            file.seek(SeekFrom::Start(node.first_point * record_size))?;
            for _ in 0..node.num_points {
                let (point, normal) = read_point(&mut file, self.has_normals).map_err(|err| {
                    if err.kind() == io::ErrorKind::UnexpectedEof {
                        self.corrupt("leaf points run past the end of the file".to_string())
                    } else {
                        BuildError::Io(err)
                    }
                })?;
                if path.owns(point.position_f64()) {
                    visit(StreamPoint { point, normal });
                }
            }
        }
        Ok(())
    }

    /// Collect the points owned by a node path into a vector.
    pub fn collect_points_in(&self, path: &CubePath, out: &mut Vec<StreamPoint>) -> Result<(), BuildError> {
        self.for_each_point_in(path, |sp| out.push(sp))
    }

    fn corrupt(&self, reason: String) -> BuildError {
        BuildError::CorruptTempOctree {
            path: self.path().to_path_buf(),
            reason,
        }
    }

    /// Remove the scratch file.
    pub fn delete(self) -> Result<(), BuildError> {
        let path = self.path().to_path_buf();
        self.file.close()?;
        debug!("deleted temporary octree {}", path.display());
        Ok(())
    }
}

fn overlaps(a: &Cube, b: &Cube) -> bool {
    let d = (a.center - b.center).abs();
    d.max_element() <= a.radius + b.radius
}
