//! Paged octree reader.
//!
//! The node directory is read and validated when the octree is opened;
//! node points are paged in on demand into a byte-bounded LRU cache. All
//! traversals run on the caller's thread through `&mut self`.
pub mod cache;
pub mod lod;
pub mod selection;

use crate::error::OctreeError;
use crate::format::{
    INDEX_HEADER_SIZE, IndexHeader, LinearUnit, NODE_RECORD_SIZE, NodeRecord, POINT_RECORD_SIZE,
    POINT_RECORD_SIZE_WITH_NORMALS, POINTS_HEADER_SIZE, read_offset_file, read_point,
    read_unit_file, read_vec3,
};
use crate::geometry::{Aabb, ConeState, Cube, Interactor};
use crate::point::{LidarPoint, OffsetVector, Rgba};
use byteorder::{LittleEndian, ReadBytesExt};
use cache::{CacheStats, LoadedNode, NodeCache, Slot};
use constants::files::{INDEX_FILE_NAME, NORMALS_FILE_NAME, OFFSET_FILE_NAME, POINTS_FILE_NAME, UNIT_FILE_NAME};
use constants::viewer::{DEFAULT_GRAPHICS_CACHE_SIZE_MIB, DEFAULT_MEMORY_CACHE_SIZE_MIB};
use glam::{DVec3, Vec3};
use lod::LodSettings;
use selection::{SelectionMask, SideStore};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Shared flag polled by traversals at every node entry.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Options for opening a paged octree.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Node cache budget in bytes.
    pub memory_cache_size: usize,
    /// Budget handed to rendering adapters, in bytes.
    pub graphics_cache_size: usize,
    /// Per-point RGBA file overriding the stored colours.
    pub colors_path: Option<PathBuf>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            memory_cache_size: DEFAULT_MEMORY_CACHE_SIZE_MIB * 1024 * 1024,
            graphics_cache_size: DEFAULT_GRAPHICS_CACHE_SIZE_MIB * 1024 * 1024,
            colors_path: None,
        }
    }
}

/// A node handed to node visitors, with its points paged in.
#[derive(Debug)]
pub struct NodeView<'a> {
    pub id: usize,
    pub cube: Cube,
    pub detail_size: f64,
    pub is_leaf: bool,
    pub points: &'a [LidarPoint],
    pub normals: Option<&'a [Vec3]>,
    pub selection: &'a SelectionMask,
}

/// File offset of a node record, the key of its side-file entries.
pub fn node_file_offset(id: usize) -> u64 {
    INDEX_HEADER_SIZE + NODE_RECORD_SIZE * id as u64
}

fn structure(path: &Path, reason: impl Into<String>) -> OctreeError {
    OctreeError::Structure {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn open_file(path: &Path) -> Result<File, OctreeError> {
    File::open(path).map_err(|source| OctreeError::Open {
        path: path.to_path_buf(),
        source,
    })
}

pub struct PagedOctree {
    stem: PathBuf,
    points_file: File,
    colors_file: Option<File>,
    normals_file: Option<File>,
    header: IndexHeader,
    records: Vec<NodeRecord>,
    cubes: Vec<Cube>,
    point_normals: bool,
    record_size: u32,
    num_leaf_points: u64,
    offset: OffsetVector,
    unit: Option<LinearUnit>,
    graphics_cache_size: usize,
    cache: NodeCache,
    selection_store: Option<SideStore>,
    color_store: Option<SideStore>,
    touched: BTreeSet<usize>,
    lod: LodSettings,
    cancel: Option<CancelToken>,
    unavailable: usize,
}

impl PagedOctree {
    /// Open the octree directory at `stem` with a node cache of `memory_cache_size` bytes.
    pub fn open(stem: impl AsRef<Path>, memory_cache_size: usize) -> Result<Self, OctreeError> {
        Self::open_with(
            stem,
            ReaderOptions {
                memory_cache_size,
                ..Default::default()
            },
        )
    }

    pub fn open_with(stem: impl AsRef<Path>, options: ReaderOptions) -> Result<Self, OctreeError> {
        let stem = stem.as_ref().to_path_buf();

        let index_path = stem.join(INDEX_FILE_NAME);
        let index_file = open_file(&index_path)?;
        let index_len = index_file.metadata()?.len();
        if index_len < INDEX_HEADER_SIZE + NODE_RECORD_SIZE {
            return Err(structure(&index_path, "file too short for header and root node"));
        }
        if (index_len - INDEX_HEADER_SIZE) % NODE_RECORD_SIZE != 0 {
            return Err(structure(&index_path, "size is not a whole number of node records"));
        }
        let mut index = BufReader::new(index_file);
        let header = IndexHeader::read(&mut index)?;
        if !(header.radius.is_finite() && header.radius > 0.0) || !header.center.is_finite() {
            return Err(structure(&index_path, "invalid root cube"));
        }
        if header.max_points_per_node == 0 {
            return Err(structure(&index_path, "zero node size bound"));
        }

        let points_path = stem.join(POINTS_FILE_NAME);
        let mut points_file = open_file(&points_path)?;
        let points_len = points_file.metadata()?.len();
        if points_len < POINTS_HEADER_SIZE {
            return Err(structure(&points_path, "missing point record size"));
        }
        let record_size = points_file.read_u32::<LittleEndian>()?;
        let point_normals = match record_size {
            POINT_RECORD_SIZE => false,
            POINT_RECORD_SIZE_WITH_NORMALS => true,
            other => {
                return Err(structure(&points_path, format!("unknown point record size {other}")));
            }
        };
        if (points_len - POINTS_HEADER_SIZE) % u64::from(record_size) != 0 {
            return Err(structure(&points_path, "size is not a whole number of point records"));
        }
        let num_point_records = (points_len - POINTS_HEADER_SIZE) / u64::from(record_size);

        let num_records = ((index_len - INDEX_HEADER_SIZE) / NODE_RECORD_SIZE) as usize;
        let mut records = Vec::with_capacity(num_records);
        for _ in 0..num_records {
            records.push(NodeRecord::read(&mut index)?);
        }

        let mut cubes = vec![Cube::new(header.center, header.radius); num_records];
        let mut reached = vec![false; num_records];
        reached[0] = true;
        let mut num_leaf_points = 0u64;
        for (id, record) in records.iter().enumerate() {
            if !reached[id] {
                return Err(structure(&index_path, format!("node record {id} is not referenced")));
            }
            if record.points_offset < 0
                || record.points_offset as u64 + u64::from(record.num_points) > num_point_records
            {
                return Err(structure(&index_path, format!("node {id} points lie outside the points file")));
            }
            if record.is_leaf() {
                num_leaf_points += u64::from(record.num_points);
                continue;
            }
            let offset = record.children_offset;
            if offset < (INDEX_HEADER_SIZE + NODE_RECORD_SIZE) as i64
                || (offset as u64 - INDEX_HEADER_SIZE) % NODE_RECORD_SIZE != 0
                || offset as u64 + 8 * NODE_RECORD_SIZE > index_len
            {
                return Err(structure(&index_path, format!("node {id} has an impossible children offset {offset}")));
            }
            let first = ((offset as u64 - INDEX_HEADER_SIZE) / NODE_RECORD_SIZE) as usize;
            if first <= id || (first..first + 8).any(|child| reached[child]) {
                return Err(structure(&index_path, format!("node {id} children overlap earlier nodes")));
            }
            for octant in 0..8 {
                cubes[first + octant] = cubes[id].child(octant);
                reached[first + octant] = true;
            }
        }

        let colors_file = match &options.colors_path {
            Some(path) => {
                let file = open_file(path)?;
                if file.metadata()?.len() != num_point_records * 4 {
                    return Err(structure(path, "colour file does not match the points file"));
                }
                Some(file)
            }
            None => None,
        };

        let normals_path = stem.join(NORMALS_FILE_NAME);
        let normals_file = if !point_normals && normals_path.exists() {
            let file = open_file(&normals_path)?;
            if file.metadata()?.len() != num_point_records * 12 {
                return Err(structure(&normals_path, "normal file does not match the points file"));
            }
            Some(file)
        } else {
            None
        };

        let offset_path = stem.join(OFFSET_FILE_NAME);
        let offset = if offset_path.exists() {
            read_offset_file(&offset_path)?
        } else {
            DVec3::ZERO
        };

        let unit_path = stem.join(UNIT_FILE_NAME);
        let unit = if unit_path.exists() {
            match read_unit_file(&unit_path) {
                Ok(unit) => Some(unit),
                Err(err) => {
                    warn!("ignoring unit file {}: {}", unit_path.display(), err);
                    None
                }
            }
        } else {
            None
        };

        info!(
            "opened octree {} with {} nodes and {} leaf points",
            stem.display(),
            num_records,
            num_leaf_points
        );

        Ok(Self {
            stem,
            points_file,
            colors_file,
            normals_file,
            header,
            records,
            cubes,
            point_normals,
            record_size,
            num_leaf_points,
            offset,
            unit,
            graphics_cache_size: options.graphics_cache_size,
            cache: NodeCache::new(options.memory_cache_size),
            selection_store: None,
            color_store: None,
            touched: BTreeSet::new(),
            lod: LodSettings::default(),
            cancel: None,
            unavailable: 0,
        })
    }

    pub fn stem(&self) -> &Path {
        &self.stem
    }

    pub fn root_cube(&self) -> Cube {
        self.cubes[0]
    }

    pub fn max_points_per_node(&self) -> u32 {
        self.header.max_points_per_node
    }

    pub fn num_nodes(&self) -> usize {
        self.records.len()
    }

    /// Number of points stored in leaves, which is the number of input points.
    pub fn num_points(&self) -> u64 {
        self.num_leaf_points
    }

    pub fn node_record(&self, id: usize) -> &NodeRecord {
        &self.records[id]
    }

    pub fn node_cube(&self, id: usize) -> Cube {
        self.cubes[id]
    }

    pub fn has_normal_vectors(&self) -> bool {
        self.point_normals || self.normals_file.is_some()
    }

    pub fn offset(&self) -> OffsetVector {
        self.offset
    }

    pub fn unit(&self) -> Option<&LinearUnit> {
        self.unit.as_ref()
    }

    pub fn graphics_cache_size(&self) -> usize {
        self.graphics_cache_size
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn set_cancel_token(&mut self, token: Option<CancelToken>) {
        self.cancel = token;
    }

    pub fn lod_settings(&self) -> &LodSettings {
        &self.lod
    }

    pub fn set_render_quality(&mut self, quality: f64) {
        self.lod.render_quality = quality;
    }

    pub fn set_lod_threshold(&mut self, threshold: f64) {
        self.lod.threshold = threshold;
    }

    pub fn set_focus_and_context(&mut self, center: DVec3, radius: f64, weight: f64) {
        self.lod.focus_center = Some(center);
        self.lod.focus_radius = radius;
        self.lod.focus_weight = weight;
    }

    fn children(&self, id: usize) -> Option<std::ops::Range<usize>> {
        let record = &self.records[id];
        if record.is_leaf() {
            None
        } else {
            let first = ((record.children_offset as u64 - INDEX_HEADER_SIZE) / NODE_RECORD_SIZE) as usize;
            Some(first..first + 8)
        }
    }

    fn check_cancel(&self) -> Result<(), OctreeError> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(OctreeError::Cancelled),
            _ => Ok(()),
        }
    }

    fn begin_traversal(&mut self) {
        self.unavailable = 0;
    }

    fn end_traversal(&mut self) {
        self.cache.set_unavailable(self.unavailable);
    }

    /// Run a traversal body and publish its unavailable-node count however it ends.
    fn traverse<R>(&mut self, body: impl FnOnce(&mut Self) -> Result<R, OctreeError>) -> Result<R, OctreeError> {
        self.begin_traversal();
        let result = body(self);
        self.end_traversal();
        result
    }

    fn read_node(&mut self, id: usize) -> io::Result<LoadedNode> {
        let record = self.records[id];
        let n = record.num_points as usize;
        let first = record.points_offset as u64;

        let mut bytes = vec![0u8; n * self.record_size as usize];
        self.points_file
            .seek(SeekFrom::Start(POINTS_HEADER_SIZE + first * u64::from(self.record_size)))?;
        self.points_file.read_exact(&mut bytes)?;
        let mut cursor = Cursor::new(bytes);
        let mut points = Vec::with_capacity(n);
        let mut normals = self.point_normals.then(|| Vec::with_capacity(n));
        for _ in 0..n {
            let (point, normal) = read_point(&mut cursor, self.point_normals)?;
            points.push(point);
            if let (Some(list), Some(normal)) = (normals.as_mut(), normal) {
                list.push(normal);
            }
        }

        if let Some(colors) = self.colors_file.as_mut() {
            let mut rgba = vec![0u8; n * 4];
            colors.seek(SeekFrom::Start(first * 4))?;
            colors.read_exact(&mut rgba)?;
            for (point, c) in points.iter_mut().zip(rgba.chunks_exact(4)) {
                point.color = Rgba([c[0], c[1], c[2], c[3]]);
            }
        }

        if let Some(file) = self.normals_file.as_mut() {
            let mut raw = vec![0u8; n * 12];
            file.seek(SeekFrom::Start(first * 12))?;
            file.read_exact(&mut raw)?;
            let mut cursor = Cursor::new(raw);
            let mut list = Vec::with_capacity(n);
            for _ in 0..n {
                list.push(read_vec3(&mut cursor)?);
            }
            normals = Some(list);
        }

        let mut node = LoadedNode::new(points, normals);
        let key = node_file_offset(id);
        if let Some(store) = self.color_store.as_mut() {
            if let Some(rgba) = store.get(key)? {
                for (point, c) in node.points.iter_mut().zip(rgba.chunks_exact(4)) {
                    point.color = Rgba([c[0], c[1], c[2], c[3]]);
                }
            }
        }
        if let Some(store) = self.selection_store.as_mut() {
            if let Some(mask) = store.get(key)? {
                node.selection = SelectionMask::from_bytes(n, &mask)?;
            }
        }
        Ok(node)
    }

    /// Page a node in, evicting others as needed.
    fn load_node(&mut self, id: usize) -> Result<Slot, OctreeError> {
        if let Some(slot) = self.cache.lookup(id) {
            return Ok(slot);
        }
        let data = self.read_node(id)?;
        debug!("paged in node {} with {} points", id, data.points.len());

        let Self {
            cache,
            selection_store,
            color_store,
            ..
        } = self;
        cache.insert(id, data, |victim, evicted| {
            persist(selection_store, color_store, victim, evicted).map_err(OctreeError::Persist)
        })
    }

    /// Load a node, pin it while `f` runs, and skip it if it cannot be read.
    fn with_node<R>(&mut self, id: usize, f: impl FnOnce(&LoadedNode) -> R) -> Result<Option<R>, OctreeError> {
        match self.load_node(id) {
            Ok(slot) => {
                self.cache.pin(slot);
                let result = f(self.cache.get(slot));
                self.cache.unpin(slot);
                Ok(Some(result))
            }
            Err(OctreeError::Io(err)) => {
                warn!("node {} is unavailable: {}", id, err);
                self.unavailable += 1;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn with_node_mut<R>(&mut self, id: usize, f: impl FnOnce(&mut LoadedNode) -> R) -> Result<Option<R>, OctreeError> {
        match self.load_node(id) {
            Ok(slot) => {
                self.cache.pin(slot);
                let result = f(self.cache.get_mut(slot));
                self.cache.unpin(slot);
                Ok(Some(result))
            }
            Err(OctreeError::Io(err)) => {
                warn!("node {} is unavailable: {}", id, err);
                self.unavailable += 1;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Leaves in depth-first octant order whose cube passes `keep`; subtrees failing it are pruned.
    fn leaves_where(&self, keep: impl Fn(&Cube) -> bool) -> Result<Vec<usize>, OctreeError> {
        let mut leaves = Vec::new();
        let mut stack = vec![0usize];
        while let Some(id) = stack.pop() {
            self.check_cancel()?;
            if !keep(&self.cubes[id]) {
                continue;
            }
            match self.children(id) {
                Some(children) => stack.extend(children.rev()),
                None if self.records[id].num_points > 0 => leaves.push(id),
                None => {}
            }
        }
        Ok(leaves)
    }

    /// Call `visitor` for every leaf point in depth-first order.
    pub fn process_points<F>(&mut self, mut visitor: F) -> Result<(), OctreeError>
    where
        F: FnMut(&LidarPoint),
    {
        self.traverse(|tree| {
            for leaf in tree.leaves_where(|_| true)? {
                tree.check_cancel()?;
                tree.with_node(leaf, |node| node.points.iter().for_each(&mut visitor))?;
            }
            Ok(())
        })
    }

    /// Call `visitor` for every leaf point inside a box given in octree coordinates.
    pub fn process_points_in_box<F>(&mut self, bbox: &Aabb, mut visitor: F) -> Result<(), OctreeError>
    where
        F: FnMut(&LidarPoint),
    {
        self.traverse(|tree| {
            for leaf in tree.leaves_where(|cube| cube.intersects_box(bbox))? {
                tree.check_cancel()?;
                let inside = tree.cubes[leaf].inside_box(bbox);
                tree.with_node(leaf, |node| {
                    for p in &node.points {
                        if inside || bbox.contains(p.position_f64()) {
                            visitor(p);
                        }
                    }
                })?;
            }
            Ok(())
        })
    }

    /// Call `visitor` for every selected point.
    pub fn process_selected_points<F>(&mut self, mut visitor: F) -> Result<(), OctreeError>
    where
        F: FnMut(&LidarPoint),
    {
        self.process_selected_points_with_normals(|p, _| visitor(p))
    }

    /// Call `visitor` for every selected point with its normal, if the octree has normals.
    pub fn process_selected_points_with_normals<F>(&mut self, mut visitor: F) -> Result<(), OctreeError>
    where
        F: FnMut(&LidarPoint, Option<Vec3>),
    {
        self.traverse(|tree| {
            let leaves = tree.leaves_where(|_| true)?;
            for leaf in leaves {
                if !tree.touched.contains(&leaf) {
                    continue;
                }
                tree.check_cancel()?;
                tree.with_node(leaf, |node| {
                    for i in node.selection.iter_selected() {
                        let normal = node.normals.as_ref().map(|n| n[i]);
                        visitor(&node.points[i], normal);
                    }
                })?;
            }
            Ok(())
        })
    }

    /// Number of currently selected points.
    pub fn num_selected_points(&mut self) -> Result<usize, OctreeError> {
        let mut count = 0;
        self.process_selected_points(|_| count += 1)?;
        Ok(count)
    }

    /// Call `visitor(node, depth)` for every node, children before their parent.
    pub fn process_nodes_postfix<F>(&mut self, mut visitor: F) -> Result<(), OctreeError>
    where
        F: FnMut(&NodeView<'_>, u32),
    {
        self.traverse(|tree| tree.postfix(0, 0, &mut visitor))
    }

    fn postfix<F>(&mut self, id: usize, depth: u32, visitor: &mut F) -> Result<(), OctreeError>
    where
        F: FnMut(&NodeView<'_>, u32),
    {
        self.check_cancel()?;
        if let Some(children) = self.children(id) {
            for child in children {
                self.postfix(child, depth + 1, visitor)?;
            }
        }
        let cube = self.cubes[id];
        let record = self.records[id];
        self.with_node(id, |node| {
            visitor(
                &NodeView {
                    id,
                    cube,
                    detail_size: record.detail_size,
                    is_leaf: record.is_leaf(),
                    points: &node.points,
                    normals: node.normals.as_deref(),
                    selection: &node.selection,
                },
                depth,
            )
        })?;
        Ok(())
    }

    /// Call `visitor` for the nodes a renderer at `eye` would draw under the current LOD settings.
    pub fn process_lod_nodes<F>(&mut self, eye: DVec3, mut visitor: F) -> Result<(), OctreeError>
    where
        F: FnMut(&NodeView<'_>),
    {
        self.traverse(|tree| {
            let mut stack = vec![0usize];
            while let Some(id) = stack.pop() {
                tree.check_cancel()?;
                let cube = tree.cubes[id];
                let record = tree.records[id];
                if let Some(children) = tree.children(id) {
                    if tree.lod.should_refine(&cube, record.detail_size, eye) {
                        stack.extend(children.rev());
                        continue;
                    }
                }
                if record.num_points == 0 {
                    continue;
                }
                tree.with_node(id, |node| {
                    visitor(&NodeView {
                        id,
                        cube,
                        detail_size: record.detail_size,
                        is_leaf: record.is_leaf(),
                        points: &node.points,
                        normals: node.normals.as_deref(),
                        selection: &node.selection,
                    })
                })?;
            }
            Ok(())
        })
    }

    /// Find the leaf point nearest along the cone's ray, visiting nodes front to back.
    pub fn intersect_cone(&mut self, cone: &mut ConeState) -> Result<Option<DVec3>, OctreeError> {
        self.traverse(|tree| tree.cone(0, cone))?;
        Ok(cone.hit)
    }

    fn cone(&mut self, id: usize, cone: &mut ConeState) -> Result<(), OctreeError> {
        self.check_cancel()?;
        if cone.may_hit(&self.cubes[id]).is_none() {
            return Ok(());
        }
        match self.children(id) {
            None => {
                if self.records[id].num_points > 0 {
                    self.with_node(id, |node| {
                        for p in &node.points {
                            cone.offer(p.position_f64());
                        }
                    })?;
                }
            }
            Some(children) => {
                let mut order: Vec<(f64, usize)> = children
                    .filter_map(|child| cone.may_hit(&self.cubes[child]).map(|t| (t, child)))
                    .collect();
                order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                for (_, child) in order {
                    self.cone(child, cone)?;
                }
            }
        }
        Ok(())
    }

    /// Mark every leaf whose cube meets the interactor sphere as touched; returns their number.
    pub fn interact(&mut self, interactor: &Interactor) -> Result<usize, OctreeError> {
        let leaves = self.leaves_where(|cube| cube.intersects_sphere(interactor.center, interactor.radius))?;
        let count = leaves.len();
        self.touched.extend(leaves);
        Ok(count)
    }

    /// Select every point inside the interactor sphere; returns the number of newly selected points.
    pub fn select_points(&mut self, interactor: &Interactor) -> Result<usize, OctreeError> {
        self.change_selection(interactor, true)
    }

    /// Deselect every point inside the interactor sphere; returns the number of deselected points.
    pub fn deselect_points(&mut self, interactor: &Interactor) -> Result<usize, OctreeError> {
        self.change_selection(interactor, false)
    }

    fn change_selection(&mut self, interactor: &Interactor, select: bool) -> Result<usize, OctreeError> {
        self.traverse(|tree| {
            let leaves = tree.leaves_where(|cube| cube.intersects_sphere(interactor.center, interactor.radius))?;

            // Collect all changes first so a cancelled traversal leaves the selection untouched.
            let mut changes: Vec<(usize, Vec<usize>)> = Vec::new();
            for &leaf in &leaves {
                tree.check_cancel()?;
                let flips = tree.with_node(leaf, |node| {
                    node.points
                        .iter()
                        .enumerate()
                        .filter(|(i, p)| {
                            node.selection.get(*i) != select && interactor.contains(p.position_f64())
                        })
                        .map(|(i, _)| i)
                        .collect::<Vec<_>>()
                })?;
                if let Some(flips) = flips.filter(|f| !f.is_empty()) {
                    changes.push((leaf, flips));
                }
            }

            let mut changed = 0;
            for (leaf, flips) in changes {
                let applied = tree.with_node_mut(leaf, |node| {
                    for &i in &flips {
                        node.selection.set(i, select);
                    }
                    node.selection_dirty = true;
                    flips.len()
                })?;
                changed += applied.unwrap_or(0);
            }
            tree.touched.extend(leaves);
            Ok(changed)
        })
    }

    /// Replace the colour of every selected point with the classifier's result.
    pub fn color_selected_points<F>(&mut self, mut classifier: F) -> Result<usize, OctreeError>
    where
        F: FnMut(&LidarPoint) -> Rgba,
    {
        self.traverse(|tree| {
            let touched: Vec<usize> = tree.touched.iter().copied().collect();

            // Classify every selected point first so a cancelled traversal recolours nothing.
            let mut changes: Vec<(usize, Vec<(usize, Rgba)>)> = Vec::new();
            for leaf in touched {
                tree.check_cancel()?;
                let colors = tree.with_node(leaf, |node| {
                    node.selection
                        .iter_selected()
                        .map(|i| (i, classifier(&node.points[i])))
                        .collect::<Vec<_>>()
                })?;
                if let Some(colors) = colors.filter(|c| !c.is_empty()) {
                    changes.push((leaf, colors));
                }
            }

            let mut colored = 0;
            for (leaf, colors) in changes {
                let count = tree.with_node_mut(leaf, |node| {
                    for &(i, color) in &colors {
                        node.points[i].color = color;
                    }
                    node.colors_dirty = true;
                    colors.len()
                })?;
                colored += count.unwrap_or(0);
            }
            Ok(colored)
        })
    }

    /// Clear all selection bits and drop the selection side file.
    pub fn clear_selection(&mut self) {
        self.cache.for_each_mut(|_, node| {
            node.selection.clear();
            node.selection_dirty = false;
        });
        self.selection_store = None;
        self.touched.clear();
    }
}

/// Write a node's dirty selection bits and colours to the side files before it leaves the cache.
fn persist(
    selection_store: &mut Option<SideStore>,
    color_store: &mut Option<SideStore>,
    id: usize,
    node: &LoadedNode,
) -> io::Result<()> {
    let key = node_file_offset(id);
    if node.selection_dirty {
        if !node.selection.any() {
            if let Some(store) = selection_store.as_mut() {
                store.remove(key);
            }
        } else {
            if selection_store.is_none() {
                *selection_store = Some(SideStore::new()?);
            }
            if let Some(store) = selection_store.as_mut() {
                store.put(key, &node.selection.to_bytes())?;
            }
        }
    }
    if node.colors_dirty {
        if color_store.is_none() {
            *color_store = Some(SideStore::new()?);
        }
        if let Some(store) = color_store.as_mut() {
            let rgba: Vec<u8> = node.points.iter().flat_map(|p| p.color.0).collect();
            store.put(key, &rgba)?;
        }
    }
    Ok(())
}
