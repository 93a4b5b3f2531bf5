//! Out-of-core multiresolution LiDAR octrees and primitive extraction.
//!
//! Points flow from the [`accumulator`] through temporary octrees into the
//! [`builder`], which writes the on-disk octree read back by
//! [`reader::PagedOctree`]. Selected points feed the [`fit`] routines, whose
//! [`primitive`]s can be combined by [`algebra`] and saved to primitive files.
pub mod accumulator;
pub mod algebra;
pub mod builder;
pub mod cluster;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod fit;
pub mod format;
pub mod geometry;
pub mod point;
pub mod primitive;
pub mod progress;
pub mod reader;
pub mod report;
pub mod temp_octree;

pub use error::{AlgebraError, BuildError, ClusterError, CodecError, ConfigError, ExportError, FitError, OctreeError};
pub use geometry::{Aabb, ConeState, Cube, Interactor};
pub use point::{LidarPoint, OffsetVector, Rgba};
pub use reader::PagedOctree;
