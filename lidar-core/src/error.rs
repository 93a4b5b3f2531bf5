//! Error types of the LiDAR core.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while opening or traversing a paged octree.
#[derive(Error, Debug)]
pub enum OctreeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt octree file {path}: {reason}")]
    Structure { path: PathBuf, reason: String },

    #[error("node cache exhausted: {needed} bytes requested with {pinned} of {budget} bytes pinned")]
    CacheExhausted {
        needed: usize,
        pinned: usize,
        budget: usize,
    },

    #[error("traversal cancelled")]
    Cancelled,

    #[error("cannot save selection state of an evicted node: {0}")]
    Persist(#[source] io::Error),
}

/// Errors raised by the point accumulator, the temporary octrees, and the builder.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot create scratch file from template {template}: {source}")]
    ScratchFile {
        template: String,
        #[source]
        source: io::Error,
    },

    #[error("{0} must be set before any point is added")]
    AfterFirstPoint(&'static str),

    #[error("point count {0} exceeds the 32-bit limit of a single octree file")]
    PointCountOverflow(u64),

    #[error("corrupt temporary octree {path}: {reason}")]
    CorruptTempOctree { path: PathBuf, reason: String },

    #[error("invalid build setting: {0}")]
    Settings(String),
}

/// Numerical failures of the primitive fitters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("not enough points: {needed} needed, {found} selected")]
    InsufficientPoints { needed: usize, found: usize },

    #[error("degenerate point configuration: {0}")]
    Degenerate(&'static str),
}

/// Failures of primitive intersections.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlgebraError {
    #[error("planes are parallel")]
    ParallelPlanes,

    #[error("linear system is singular")]
    SingularSystem,

    #[error("line is parallel to the plane")]
    NoIntersection,

    #[error("mismatching selected primitives")]
    MismatchedSelection,
}

/// Errors of the primitive file and pipe codec.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("not a version 1.3 primitive file")]
    BadHeader,

    #[error("unknown primitive type tag {0}")]
    UnknownTypeTag(i32),

    #[error("truncated primitive record")]
    Truncated,

    #[error("primitive label is not valid UTF-8")]
    BadLabel,
}

/// Errors of the cluster broadcast channel.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("{0}")]
    RemoteFailure(String),

    #[error("cluster diverged: unexpected tag {0}")]
    Divergence(u8),

    #[error("cluster pipe closed")]
    Disconnected,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors while reading the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Errors of the point exporters.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Octree(#[from] OctreeError),

    #[error("{0} points do not fit into a LAS 1.2 file")]
    TooManyPoints(u64),

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}
