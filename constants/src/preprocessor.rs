/// Preprocessor defaults, overridable from the configuration file and the command line

/// Memory available to the point accumulator and the builder in MiB
pub const DEFAULT_MEMORY_CACHE_SIZE_MIB: usize = 512;

/// Leaf bound of the temporary octrees written by the accumulator
pub const DEFAULT_TEMP_OCTREE_MAX_POINTS_PER_NODE: u32 = 4096;

/// Leaf bound of the final octree
pub const DEFAULT_MAX_POINTS_PER_NODE: u32 = 4096;

/// Number of builder worker threads
pub const DEFAULT_NUM_THREADS: usize = 1;

/// Scratch file template for temporary octrees
pub const DEFAULT_TEMP_OCTREE_TEMPLATE: &str = "/tmp/LidarPreprocessorTempOctree";

/// Scratch file template for per-subtree point regions
pub const DEFAULT_TEMP_POINT_TEMPLATE: &str = "/tmp/LidarPreprocessorTempPoints";

/// Number of random characters appended to scratch file templates
pub const TEMP_FILE_RANDOM_CHARS: usize = 6;

/// Seed of the representative subsampling, fixed for reproducible octrees
pub const SUBSAMPLE_SEED: u64 = 0x4c69_4441_5220_4f63;

/// Subdivision depth at which coincident points stay in one oversized leaf
pub const MAX_OCTREE_DEPTH: u32 = 32;

/// Relative padding added around the bounding cube of all input points
pub const ROOT_CUBE_PADDING: f64 = 1.0e-4;

/// Number of points per progress bar update
pub const PROGRESS_UPDATE_INTERVAL: u64 = 50_000;

/// Node cache used when an existing octree is re-read as input, in MiB
pub const LIDAR_INPUT_CACHE_SIZE_MIB: usize = 64;
