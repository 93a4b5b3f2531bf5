/// Reader defaults for the paged octree

/// Node cache budget in MiB
pub const DEFAULT_MEMORY_CACHE_SIZE_MIB: usize = 512;

/// Graphics cache budget in MiB, handed to rendering adapters untouched
pub const DEFAULT_GRAPHICS_CACHE_SIZE_MIB: usize = 128;

/// Neutral render quality; each unit doubles the refinement eagerness
pub const DEFAULT_RENDER_QUALITY: f64 = 0.0;

/// Focus+context weight; zero disables the focus region
pub const DEFAULT_FOCUS_AND_CONTEXT_WEIGHT: f64 = 0.5;

/// Angular detail size (radians) above which a node is refined at quality zero
pub const DEFAULT_LOD_THRESHOLD: f64 = 1.0 / 1024.0;

/// Radius of the selection sphere in world units
pub const DEFAULT_SELECTOR_RADIUS: f64 = 1.0;
