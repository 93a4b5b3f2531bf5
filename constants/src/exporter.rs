/// Exporter defaults

/// Node cache budget in MiB
pub const DEFAULT_CACHE_SIZE_MIB: usize = 512;
