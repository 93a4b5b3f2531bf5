/// On-disk names and headers of the octree directory and the primitive file

/// Node record stream of an octree directory
pub const INDEX_FILE_NAME: &str = "Index";

/// Point record stream of an octree directory
pub const POINTS_FILE_NAME: &str = "Points";

/// Optional per-point RGBA override stream
pub const COLORS_FILE_NAME: &str = "Colors";

/// Optional per-point normal vector stream
pub const NORMALS_FILE_NAME: &str = "Normals";

/// Optional ASCII unit description, `<factor> <name>`
pub const UNIT_FILE_NAME: &str = "Unit";

/// Optional three little-endian doubles added back to stored coordinates
pub const OFFSET_FILE_NAME: &str = "Offset";

/// Fixed 40-byte header of version 1.3 primitive files (NUL terminated)
pub const PRIMITIVE_FILE_HEADER: &[u8; 40] = b"LidarViewer primitive file v1.3       \n\0";

/// Environment variable naming the configuration file
pub const CONFIG_FILE_ENV_VAR: &str = "LIDARVIEWER_CONFIGFILENAME";
