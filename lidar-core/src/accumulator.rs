//! Point accumulator: absorbs an unordered point stream into temporary octrees.
use crate::error::BuildError;
use crate::geometry::Bounds;
use crate::point::{LidarPoint, OffsetVector, Rgba, StreamPoint};
use crate::temp_octree::TempOctree;
use constants::preprocessor::{
    DEFAULT_MEMORY_CACHE_SIZE_MIB, DEFAULT_TEMP_OCTREE_MAX_POINTS_PER_NODE,
    DEFAULT_TEMP_OCTREE_TEMPLATE,
};
use glam::{DAffine3, DVec3, Vec3};
use tracing::{debug, info};

/// Memory and scratch-file settings of the accumulator.
#[derive(Debug, Clone)]
pub struct AccumulatorSettings {
    /// Bytes available for the in-memory point buffer.
    pub memory_size: usize,
    pub temp_octree_max_points_per_node: u32,
    pub temp_octree_template: String,
}

impl Default for AccumulatorSettings {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_CACHE_SIZE_MIB * 1024 * 1024,
            temp_octree_max_points_per_node: DEFAULT_TEMP_OCTREE_MAX_POINTS_PER_NODE,
            temp_octree_template: DEFAULT_TEMP_OCTREE_TEMPLATE.to_string(),
        }
    }
}

/// Spatial and colour extents of the points read since the last reset.
#[derive(Debug, Clone, Copy)]
pub struct Extents {
    pub spatial: Bounds,
    pub color_min: [f32; 3],
    pub color_max: [f32; 3],
}

impl Default for Extents {
    fn default() -> Self {
        Self {
            spatial: Bounds::new(),
            color_min: [f32::INFINITY; 3],
            color_max: [f32::NEG_INFINITY; 3],
        }
    }
}

pub struct PointAccumulator {
    settings: AccumulatorSettings,
    offset: OffsetVector,
    transform: Option<DAffine3>,
    color_mask: [f32; 3],
    has_normals: bool,
    buffer: Vec<StreamPoint>,
    buffer_capacity: usize,
    temp_octrees: Vec<TempOctree>,
    num_points: u64,
    extents: Extents,
}

impl PointAccumulator {
    pub fn new(settings: AccumulatorSettings) -> Self {
        let buffer_capacity =
            (settings.memory_size / std::mem::size_of::<StreamPoint>()).max(1024);
        Self {
            settings,
            offset: DVec3::ZERO,
            transform: None,
            color_mask: [1.0; 3],
            has_normals: false,
            buffer: Vec::new(),
            buffer_capacity,
            temp_octrees: Vec::new(),
            num_points: 0,
            extents: Extents::default(),
        }
    }

    fn check_no_points(&self, what: &'static str) -> Result<(), BuildError> {
        if self.num_points > 0 {
            Err(BuildError::AfterFirstPoint(what))
        } else {
            Ok(())
        }
    }

    /// Set the offset subtracted from every subsequent point.
    pub fn set_point_offset(&mut self, offset: OffsetVector) -> Result<(), BuildError> {
        self.check_no_points("point offset")?;
        self.offset = offset;
        Ok(())
    }

    pub fn reset_point_offset(&mut self) -> Result<(), BuildError> {
        self.set_point_offset(DVec3::ZERO)
    }

    /// Set the rigid transformation applied to every subsequent point before offset subtraction.
    pub fn set_transform(&mut self, transform: DAffine3) -> Result<(), BuildError> {
        self.check_no_points("transformation")?;
        self.transform = Some(transform);
        Ok(())
    }

    pub fn reset_transform(&mut self) -> Result<(), BuildError> {
        self.check_no_points("transformation")?;
        self.transform = None;
        Ok(())
    }

    /// Store a normal vector with every point; points added without one get a zero normal.
    pub fn set_normals(&mut self, has_normals: bool) -> Result<(), BuildError> {
        self.check_no_points("normal vector storage")?;
        self.has_normals = has_normals;
        Ok(())
    }

    /// Multiply read colours component-wise.
    pub fn set_color_mask(&mut self, mask: [f32; 3]) {
        self.color_mask = mask;
    }

    pub fn point_offset(&self) -> OffsetVector {
        self.offset
    }

    pub fn has_normals(&self) -> bool {
        self.has_normals
    }

    pub fn num_points(&self) -> u64 {
        self.num_points
    }

    pub fn extents(&self) -> &Extents {
        &self.extents
    }

    /// Add a point given in source coordinates with a colour in the 0-255 range.
    pub fn add_point(&mut self, position: DVec3, color: [f32; 3]) -> Result<(), BuildError> {
        self.add(position, color, None)
    }

    pub fn add_point_with_normal(
        &mut self,
        position: DVec3,
        color: [f32; 3],
        normal: Vec3,
    ) -> Result<(), BuildError> {
        self.add(position, color, Some(normal))
    }

    fn add(&mut self, position: DVec3, color: [f32; 3], normal: Option<Vec3>) -> Result<(), BuildError> {
        if self.num_points >= u64::from(u32::MAX) {
            return Err(BuildError::PointCountOverflow(self.num_points + 1));
        }

        let (position, normal) = match &self.transform {
            Some(t) => (
                t.transform_point3(position),
                normal.map(|n| t.transform_vector3(n.as_dvec3()).normalize_or_zero().as_vec3()),
            ),
            None => (position, normal),
        };
        self.extents.spatial.update(position);

        let mut masked = color;
        for i in 0..3 {
            masked[i] *= self.color_mask[i];
            self.extents.color_min[i] = self.extents.color_min[i].min(masked[i]);
            self.extents.color_max[i] = self.extents.color_max[i].max(masked[i]);
        }

        let stored = (position - self.offset).as_vec3();
        let normal = if self.has_normals {
            Some(normal.unwrap_or(Vec3::ZERO))
        } else {
            None
        };
        self.buffer.push(StreamPoint {
            point: LidarPoint::new(stored, Rgba::from_f32(masked)),
            normal,
        });
        self.num_points += 1;

        if self.buffer.len() >= self.buffer_capacity {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<(), BuildError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let points = std::mem::take(&mut self.buffer);
        debug!("spilling {} buffered points to a temporary octree", points.len());
        let tree = TempOctree::create(
            points,
            self.settings.temp_octree_max_points_per_node,
            &self.settings.temp_octree_template,
            self.has_normals,
        )?;
        self.temp_octrees.push(tree);
        Ok(())
    }

    /// Flush the final buffer into a temporary octree.
    pub fn finish_reading(&mut self) -> Result<(), BuildError> {
        self.spill()?;
        info!(
            "accumulated {} points in {} temporary octrees",
            self.num_points,
            self.temp_octrees.len()
        );
        Ok(())
    }

    pub fn temp_octrees(&self) -> &[TempOctree] {
        &self.temp_octrees
    }

    /// Delete the backing files of all temporary octrees.
    pub fn delete_temp_octrees(&mut self) -> Result<(), BuildError> {
        for tree in self.temp_octrees.drain(..) {
            tree.delete()?;
        }
        Ok(())
    }

    pub fn reset_extents(&mut self) {
        self.extents = Extents::default();
    }

    /// Print spatial and colour extents of the points read since the last reset.
    pub fn print_extents(&self) {
        let e = &self.extents;
        if e.spatial.is_empty() {
            println!("No points read");
            return;
        }
        println!("Point extents:");
        println!("  X: {:.3} to {:.3}", e.spatial.min.x, e.spatial.max.x);
        println!("  Y: {:.3} to {:.3}", e.spatial.min.y, e.spatial.max.y);
        println!("  Z: {:.3} to {:.3}", e.spatial.min.z, e.spatial.max.z);
        println!(
            "Colour extents: ({:.1}, {:.1}, {:.1}) to ({:.1}, {:.1}, {:.1})",
            e.color_min[0], e.color_min[1], e.color_min[2], e.color_max[0], e.color_max[1], e.color_max[2]
        );
    }
}
