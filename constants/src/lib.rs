//! Built-in defaults shared by the LiDAR octree library and its tools.
pub mod exporter;
pub mod files;
pub mod preprocessor;
pub mod viewer;
