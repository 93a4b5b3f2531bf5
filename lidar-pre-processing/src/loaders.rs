/// Input file readers feeding the point accumulator.
use byteorder::{LittleEndian, ReadBytesExt};
use constants::preprocessor::{LIDAR_INPUT_CACHE_SIZE_MIB, PROGRESS_UPDATE_INTERVAL};
use glam::DVec3;
use las::Reader;
use lidar_core::accumulator::PointAccumulator;
use lidar_core::progress::point_bar;
use lidar_core::{BuildError, OctreeError, PagedOctree};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Errors while reading one input file.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("LAS error: {0}")]
    Las(#[from] las::Error),

    #[error(transparent)]
    Octree(#[from] OctreeError),

    /// The accumulator itself failed; the run cannot continue.
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("{0} input files are not supported")]
    Unsupported(&'static str),
}

impl LoadError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, LoadError::Build(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Auto,
    Tiff,
    XyzBil,
    Bin,
    BinRgb,
    Ply,
    Las,
    Xyzi,
    Xyzrgb,
    Ascii,
    AsciiRgb,
    Csv,
    CsvRgb,
    BlockedAscii,
    BlockedAsciiRgb,
    Idl,
    Oct,
    Lidar,
}

impl FileFormat {
    /// Format selected by a command-line flag name (without the dash), case-insensitive.
    pub fn from_flag(name: &str) -> Option<Self> {
        let format = match name.to_ascii_lowercase().as_str() {
            "auto" => FileFormat::Auto,
            "tiff" => FileFormat::Tiff,
            "xyzbil" => FileFormat::XyzBil,
            "bin" => FileFormat::Bin,
            "binrgb" => FileFormat::BinRgb,
            "ply" => FileFormat::Ply,
            "las" => FileFormat::Las,
            "xyzi" => FileFormat::Xyzi,
            "xyzrgb" => FileFormat::Xyzrgb,
            "ascii" => FileFormat::Ascii,
            "asciirgb" => FileFormat::AsciiRgb,
            "csv" => FileFormat::Csv,
            "csvrgb" => FileFormat::CsvRgb,
            "blockedascii" => FileFormat::BlockedAscii,
            "blockedasciirgb" => FileFormat::BlockedAsciiRgb,
            "idl" => FileFormat::Idl,
            "oct" => FileFormat::Oct,
            "lidar" => FileFormat::Lidar,
            _ => return None,
        };
        Some(format)
    }

    /// Whether the flag is followed by column indices.
    pub fn takes_columns(self) -> bool {
        matches!(
            self,
            FileFormat::Ascii
                | FileFormat::AsciiRgb
                | FileFormat::Csv
                | FileFormat::CsvRgb
                | FileFormat::BlockedAscii
                | FileFormat::BlockedAsciiRgb
        )
    }

    /// Format implied by a file name extension.
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let format = match ext.as_str() {
            "tif" | "tiff" => FileFormat::Tiff,
            "img" => FileFormat::XyzBil,
            "bin" => FileFormat::Bin,
            "binrgb" => FileFormat::BinRgb,
            "ply" => FileFormat::Ply,
            "las" | "laz" => FileFormat::Las,
            "xyzi" => FileFormat::Xyzi,
            "xyzrgb" => FileFormat::Xyzrgb,
            "oct" => FileFormat::Oct,
            "lidar" => FileFormat::Lidar,
            _ => return None,
        };
        Some(format)
    }

    pub fn description(self) -> &'static str {
        match self {
            FileFormat::Auto => "auto-detected",
            FileFormat::Tiff => "TIFF",
            FileFormat::XyzBil => "XYZ BIL",
            FileFormat::Bin => "binary",
            FileFormat::BinRgb => "RGB binary",
            FileFormat::Ply => "PLY",
            FileFormat::Las => "LAS",
            FileFormat::Xyzi => "XYZI",
            FileFormat::Xyzrgb => "XYZRGB",
            FileFormat::Ascii => "generic ASCII",
            FileFormat::AsciiRgb => "generic RGB ASCII",
            FileFormat::Csv => "generic CSV",
            FileFormat::CsvRgb => "generic RGB CSV",
            FileFormat::BlockedAscii => "blocked ASCII",
            FileFormat::BlockedAsciiRgb => "blocked RGB ASCII",
            FileFormat::Idl => "redshift IDL",
            FileFormat::Oct => "LiDAR octree",
            FileFormat::Lidar => "LiDAR",
        }
    }
}

/// Column of x, y, z and then either intensity or r, g, b.
pub type Columns = [Option<usize>; 6];

/// One input file together with the reader settings in effect for it.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub path: PathBuf,
    pub format: FileFormat,
    pub header_lines: usize,
    pub columns: Columns,
    /// Bit `c` accepts LAS class `c & 31`.
    pub las_classes: u32,
}

/// Read `spec` into `acc` and return the number of points added.
///
/// Points added before an error stay in the accumulator.
pub fn load(acc: &mut PointAccumulator, spec: &InputSpec, show_progress: bool) -> Result<u64, LoadError> {
    let before = acc.num_points();
    let path = spec.path.as_path();
    match spec.format {
        FileFormat::Bin => load_bin(acc, path, false, show_progress)?,
        FileFormat::BinRgb => load_bin(acc, path, true, show_progress)?,
        FileFormat::Las => load_las(acc, path, spec.las_classes, show_progress)?,
        FileFormat::Xyzi => load_xyz(acc, path, false)?,
        FileFormat::Xyzrgb => load_xyz(acc, path, true)?,
        FileFormat::Ascii => load_ascii(acc, spec, false, false)?,
        FileFormat::AsciiRgb => load_ascii(acc, spec, false, true)?,
        FileFormat::Csv => load_ascii(acc, spec, true, false)?,
        FileFormat::CsvRgb => load_ascii(acc, spec, true, true)?,
        FileFormat::BlockedAscii => load_blocked_ascii(acc, spec, false)?,
        FileFormat::BlockedAsciiRgb => load_blocked_ascii(acc, spec, true)?,
        FileFormat::Oct => load_old_octree(acc, path)?,
        FileFormat::Lidar => load_lidar(acc, path)?,
        other @ (FileFormat::Tiff | FileFormat::XyzBil | FileFormat::Ply | FileFormat::Idl | FileFormat::Auto) => {
            return Err(LoadError::Unsupported(other.description()));
        }
    }
    Ok(acc.num_points() - before)
}

/// Point count followed by `x y z i` (or `x y z` and RGBA bytes) records.
fn load_bin(acc: &mut PointAccumulator, path: &Path, rgb: bool, show_progress: bool) -> Result<(), LoadError> {
    let mut file = BufReader::new(File::open(path)?);
    let count = u64::from(file.read_u32::<LittleEndian>()?);
    let pb = point_bar(count, "Reading points", show_progress);
    for idx in 0..count {
        let mut xyz = [0f32; 3];
        file.read_f32_into::<LittleEndian>(&mut xyz)?;
        let color = if rgb {
            let mut rgba = [0u8; 4];
            file.read_exact(&mut rgba)?;
            [f32::from(rgba[0]), f32::from(rgba[1]), f32::from(rgba[2])]
        } else {
            [file.read_f32::<LittleEndian>()?; 3]
        };
        acc.add_point(DVec3::from(xyz.map(f64::from)), color)?;

        if idx % PROGRESS_UPDATE_INTERVAL == 0 {
            pb.set_position(idx);
        }
    }
    pb.finish_and_clear();
    Ok(())
}

fn load_las(acc: &mut PointAccumulator, path: &Path, class_mask: u32, show_progress: bool) -> Result<(), LoadError> {
    let mut reader = Reader::new(BufReader::new(File::open(path)?))?;
    let total = reader.header().number_of_points();
    let pb = point_bar(total, "Reading LAS points", show_progress);

    let mut rejected = 0u64;
    for (idx, point) in reader.points().enumerate() {
        let point = point?;
        if idx as u64 % PROGRESS_UPDATE_INTERVAL == 0 {
            pb.set_position(idx as u64);
        }

        let class_bit = 1u32 << (u8::from(point.classification) & 0x1f);
        if class_mask & class_bit == 0 {
            rejected += 1;
            continue;
        }
        // 16-bit colour channels; without colour the raw intensity becomes a grey value.
        let color = match point.color {
            Some(c) => [c.red, c.green, c.blue].map(|v| f32::from(v) / 257.0),
            None => [f32::from(point.intensity); 3],
        };
        acc.add_point(DVec3::new(point.x, point.y, point.z), color)?;
    }
    pb.finish_and_clear();

    if rejected > 0 {
        info!("{}: {} points outside the selected classes", path.display(), rejected);
    }
    Ok(())
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    }
}

fn parse_number(token: &str) -> Result<f64, String> {
    token.parse().map_err(|_| format!("\"{token}\" is not a number"))
}

/// Whitespace-separated `x y z i` or `x y z r g b` rows; bad rows are reported and skipped.
fn load_xyz(acc: &mut PointAccumulator, path: &Path, rgb: bool) -> Result<(), LoadError> {
    let needed = if rgb { 6 } else { 4 };
    let reader = BufReader::new(File::open(path)?);
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let body = strip_comment(&line);
        if body.trim().is_empty() {
            continue;
        }
        let values: Result<Vec<f64>, String> = body.split_whitespace().take(needed).map(parse_number).collect();
        match values {
            Ok(v) if v.len() == needed => {
                let color = if rgb {
                    [v[3] as f32, v[4] as f32, v[5] as f32]
                } else {
                    [v[3] as f32; 3]
                };
                acc.add_point(DVec3::new(v[0], v[1], v[2]), color)?;
            }
            _ => warn!("{}: Point parsing error in line {}", path.display(), index + 1),
        }
    }
    Ok(())
}

/// Mapping from file columns to point components.
struct ColumnLayout {
    /// Component index of each column up to the last used one.
    components: Vec<Option<usize>>,
}

impl ColumnLayout {
    fn new(columns: &Columns) -> Self {
        let last = columns.iter().flatten().copied().max().unwrap_or(0);
        let mut components = vec![None; last + 1];
        for (component, column) in columns.iter().enumerate() {
            if let Some(column) = column {
                components[*column] = Some(component);
            }
        }
        Self { components }
    }

    /// Position and colour of one record. Missing colour components read as 255.
    fn parse<'a>(&self, fields: impl Iterator<Item = &'a str>, rgb: bool) -> Result<(DVec3, [f32; 3]), String> {
        let mut values = [0.0, 0.0, 0.0, 255.0, 255.0, 255.0];
        let mut found = 0;
        for (field, component) in fields.zip(&self.components) {
            if let Some(component) = component {
                values[*component] = parse_number(field)?;
            }
            found += 1;
        }
        if found < self.components.len() {
            return Err(format!("expected {} columns, found {found}", self.components.len()));
        }
        let color = if rgb {
            [values[3] as f32, values[4] as f32, values[5] as f32]
        } else {
            [values[3] as f32; 3]
        };
        Ok((DVec3::new(values[0], values[1], values[2]), color))
    }
}

/// Fields of a row; strict CSV separates by commas only.
fn split_fields(line: &str, strict_csv: bool) -> Vec<&str> {
    if strict_csv {
        line.split(',').map(str::trim).collect()
    } else {
        line.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .collect()
    }
}

/// Data rows after the header, with their one-based line numbers.
fn data_lines(spec: &InputSpec) -> Result<impl Iterator<Item = io::Result<(usize, String)>>, io::Error> {
    let reader = BufReader::new(File::open(&spec.path)?);
    Ok(reader
        .lines()
        .enumerate()
        .skip(spec.header_lines)
        .map(|(index, line)| line.map(|l| (index + 1, l))))
}

/// Column-selected ASCII rows. The first malformed row ends the file.
fn load_ascii(acc: &mut PointAccumulator, spec: &InputSpec, strict_csv: bool, rgb: bool) -> Result<(), LoadError> {
    let layout = ColumnLayout::new(&spec.columns);
    for line in data_lines(spec)? {
        let (number, line) = line?;
        let body = strip_comment(&line);
        if body.trim().is_empty() {
            continue;
        }
        let (position, color) = layout
            .parse(split_fields(body, strict_csv).into_iter(), rgb)
            .map_err(|reason| LoadError::Parse { line: number, reason })?;
        acc.add_point(position, color)?;
    }
    Ok(())
}

/// Blocks of column-selected rows, each preceded by a line holding its row count.
fn load_blocked_ascii(acc: &mut PointAccumulator, spec: &InputSpec, rgb: bool) -> Result<(), LoadError> {
    let layout = ColumnLayout::new(&spec.columns);
    let mut remaining = 0usize;
    for line in data_lines(spec)? {
        let (number, line) = line?;
        let body = strip_comment(&line);
        if body.trim().is_empty() {
            continue;
        }
        if remaining == 0 {
            let count = body.split_whitespace().next().unwrap_or_default();
            remaining = count.parse().map_err(|_| LoadError::Parse {
                line: number,
                reason: format!("\"{count}\" is not a block size"),
            })?;
            continue;
        }
        let (position, color) = layout
            .parse(split_fields(body, false).into_iter(), rgb)
            .map_err(|reason| LoadError::Parse { line: number, reason })?;
        acc.add_point(position, color)?;
        remaining -= 1;
    }
    if remaining > 0 {
        warn!("{}: last block is missing {} points", spec.path.display(), remaining);
    }
    Ok(())
}

/// Header of the legacy `.oct` structure file: centre, radius, and leaf bound.
const OLD_OCTREE_HEADER_SIZE: u64 = 3 * 4 + 4 + 4;
/// Children offset, detail size, points offset, point count.
const OLD_OCTREE_NODE_SIZE: u64 = 8 + 4 + 8 + 4;

/// Legacy octree pair `<stem>.oct` / `<stem>.obin`; only leaf points are read.
fn load_old_octree(acc: &mut PointAccumulator, path: &Path) -> Result<(), LoadError> {
    let stem = match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("oct") => path.with_extension(""),
        _ => path.to_path_buf(),
    };
    let mut oct = BufReader::new(File::open(stem.with_extension("oct"))?);
    let mut obin = BufReader::new(File::open(stem.with_extension("obin"))?);
    read_old_subtree(acc, &mut oct, &mut obin, OLD_OCTREE_HEADER_SIZE)
}

fn read_old_subtree<R: Read + Seek>(
    acc: &mut PointAccumulator,
    oct: &mut R,
    obin: &mut R,
    node_offset: u64,
) -> Result<(), LoadError> {
    oct.seek(SeekFrom::Start(node_offset))?;
    let children_offset = oct.read_u64::<LittleEndian>()?;
    let _detail_size = oct.read_f32::<LittleEndian>()?;
    let points_offset = oct.read_u64::<LittleEndian>()?;
    let num_points = oct.read_u32::<LittleEndian>()?;

    if children_offset != 0 {
        for child in 0..8 {
            read_old_subtree(acc, oct, obin, children_offset + child * OLD_OCTREE_NODE_SIZE)?;
        }
        return Ok(());
    }
    obin.seek(SeekFrom::Start(points_offset))?;
    for _ in 0..num_points {
        let mut xyz = [0f32; 3];
        obin.read_f32_into::<LittleEndian>(&mut xyz)?;
        let mut rgba = [0u8; 4];
        obin.read_exact(&mut rgba)?;
        acc.add_point(
            DVec3::from(xyz.map(f64::from)),
            [f32::from(rgba[0]), f32::from(rgba[1]), f32::from(rgba[2])],
        )?;
    }
    Ok(())
}

/// Leaf points of an existing octree directory, in source coordinates.
fn load_lidar(acc: &mut PointAccumulator, path: &Path) -> Result<(), LoadError> {
    let mut tree = PagedOctree::open(path, LIDAR_INPUT_CACHE_SIZE_MIB * 1024 * 1024)?;
    let offset = tree.offset();
    let mut added: Result<(), BuildError> = Ok(());
    tree.process_points(|p| {
        if added.is_ok() {
            let c = p.color;
            added = acc.add_point(
                p.position_f64() + offset,
                [f32::from(c.r()), f32::from(c.g()), f32::from(c.b())],
            );
        }
    })?;
    added?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use lidar_core::accumulator::AccumulatorSettings;
    use lidar_core::export::{LasWriter, PointSink};
    use lidar_core::{LidarPoint, Rgba};
    use std::io::Write;
    use tempfile::TempDir;

    fn accumulator(dir: &TempDir) -> PointAccumulator {
        PointAccumulator::new(AccumulatorSettings {
            memory_size: 1 << 20,
            temp_octree_max_points_per_node: 64,
            temp_octree_template: dir.path().join("TempOctree").to_string_lossy().into_owned(),
        })
    }

    fn spec(path: PathBuf, format: FileFormat, columns: Columns) -> InputSpec {
        InputSpec {
            path,
            format,
            header_lines: 0,
            columns,
            las_classes: !0,
        }
    }

    fn write_file(dir: &TempDir, name: &str, text: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn extensions_select_formats() {
        assert_eq!(FileFormat::detect(Path::new("scan.LAZ")), Some(FileFormat::Las));
        assert_eq!(FileFormat::detect(Path::new("out/Cloud.LiDAR")), Some(FileFormat::Lidar));
        assert_eq!(FileFormat::detect(Path::new("a.xyzrgb")), Some(FileFormat::Xyzrgb));
        assert_eq!(FileFormat::detect(Path::new("notes.txt")), None);
        assert_eq!(FileFormat::from_flag("BlockedAsciiRGB"), Some(FileFormat::BlockedAsciiRgb));
        assert!(FileFormat::Csv.takes_columns() && !FileFormat::Las.takes_columns());
    }

    #[test]
    fn xyzi_skips_comments_and_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.xyzi", "# header\n1 2 3 40\n\nnot a point\n4 5 6 80 # trailing\n");
        let mut acc = accumulator(&dir);
        let n = load(&mut acc, &spec(path, FileFormat::Xyzi, [None; 6]), false).unwrap();
        assert_eq!(n, 2);
        let e = acc.extents();
        assert!(e.spatial.min.abs_diff_eq(DVec3::new(1.0, 2.0, 3.0), 0.0));
        assert!(e.spatial.max.abs_diff_eq(DVec3::new(4.0, 5.0, 6.0), 0.0));
        assert_eq!(e.color_min, [40.0; 3]);
        assert_eq!(e.color_max, [80.0; 3]);
    }

    #[test]
    fn csv_columns_and_header_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.csv", "id,z,x,y,r,g,b\n7, 3.5, 1, 2, 10, 20, 30\n8,4.5,2,3,40,50,60\n");
        let mut acc = accumulator(&dir);
        let mut input = spec(path, FileFormat::CsvRgb, [Some(2), Some(3), Some(1), Some(4), Some(5), Some(6)]);
        input.header_lines = 1;
        assert_eq!(load(&mut acc, &input, false).unwrap(), 2);
        let e = acc.extents();
        assert!(e.spatial.min.abs_diff_eq(DVec3::new(1.0, 2.0, 3.5), 0.0));
        assert_eq!(e.color_min, [10.0, 20.0, 30.0]);
        assert_eq!(e.color_max, [40.0, 50.0, 60.0]);
    }

    #[test]
    fn ascii_without_colour_columns_is_white() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.txt", "0 0 0\n1,1,1\n");
        let mut acc = accumulator(&dir);
        let input = spec(path, FileFormat::Ascii, [Some(0), Some(1), Some(2), None, None, None]);
        assert_eq!(load(&mut acc, &input, false).unwrap(), 2);
        assert_eq!(acc.extents().color_min, [255.0; 3]);
    }

    #[test]
    fn malformed_ascii_row_ends_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.txt", "0 0 0 5\n1 1\n2 2 2 5\n");
        let mut acc = accumulator(&dir);
        let input = spec(path, FileFormat::Ascii, [Some(0), Some(1), Some(2), Some(3), None, None]);
        match load(&mut acc, &input, false) {
            Err(LoadError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(acc.num_points(), 1);
    }

    #[test]
    fn blocked_ascii_reads_every_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.txt", "2\n0 0 0 1\n1 1 1 2\n1\n5 5 5 3\n");
        let mut acc = accumulator(&dir);
        let input = spec(path, FileFormat::BlockedAscii, [Some(0), Some(1), Some(2), Some(3), None, None]);
        assert_eq!(load(&mut acc, &input, false).unwrap(), 3);
        assert_eq!(acc.extents().spatial.max, DVec3::splat(5.0));
    }

    #[test]
    fn binary_rgb_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.binrgb");
        let mut file = File::create(&path).unwrap();
        file.write_u32::<LittleEndian>(2).unwrap();
        for (xyz, rgba) in [([1f32, 2.0, 3.0], [9u8, 8, 7, 255]), ([-1.0, 0.5, 0.0], [1, 2, 3, 255])] {
            for v in xyz {
                file.write_f32::<LittleEndian>(v).unwrap();
            }
            file.write_all(&rgba).unwrap();
        }
        drop(file);

        let mut acc = accumulator(&dir);
        assert_eq!(load(&mut acc, &spec(path, FileFormat::BinRgb, [None; 6]), false).unwrap(), 2);
        assert_eq!(acc.extents().color_max, [9.0, 8.0, 7.0]);
        assert!(acc.extents().spatial.min.abs_diff_eq(DVec3::new(-1.0, 0.5, 0.0), 0.0));
    }

    #[test]
    fn truncated_binary_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        let mut file = File::create(&path).unwrap();
        file.write_u32::<LittleEndian>(3).unwrap();
        file.write_all(&[0u8; 16]).unwrap();
        drop(file);

        let mut acc = accumulator(&dir);
        let err = load(&mut acc, &spec(path, FileFormat::Bin, [None; 6]), false).unwrap_err();
        assert!(matches!(err, LoadError::Io(_)) && !err.is_fatal());
        assert_eq!(acc.num_points(), 1);
    }

    #[test]
    fn las_points_keep_source_coordinates_and_colour() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.las");
        let offset = DVec3::new(500_000.0, 4_000_000.0, 100.0);
        let mut writer = LasWriter::new(File::create(&path).unwrap(), offset, DVec3::splat(0.001), DVec3::ZERO).unwrap();
        writer
            .write_point(&LidarPoint::new(glam::Vec3::new(1.0, 2.0, 3.0), Rgba::new(255, 0, 10, 255)))
            .unwrap();
        writer
            .write_point(&LidarPoint::new(glam::Vec3::new(-1.0, 0.0, 0.5), Rgba::new(0, 0, 0, 255)))
            .unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let mut acc = accumulator(&dir);
        assert_eq!(load(&mut acc, &spec(path, FileFormat::Las, [None; 6]), false).unwrap(), 2);
        let e = acc.extents();
        assert!(e.spatial.max.abs_diff_eq(offset + DVec3::new(1.0, 2.0, 3.0), 1e-6));
        assert!(e.spatial.min.abs_diff_eq(offset + DVec3::new(-1.0, 0.0, 0.5), 1e-6));
        assert_eq!(e.color_max, [255.0, 0.0, 10.0]);
    }

    #[test]
    fn las_class_mask_filters_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.las");
        let mut writer = LasWriter::new(File::create(&path).unwrap(), DVec3::ZERO, DVec3::splat(0.01), DVec3::ZERO).unwrap();
        writer.write_point(&LidarPoint::new(glam::Vec3::ZERO, Rgba::WHITE)).unwrap();
        writer.finish().unwrap();

        // Exported records carry class 0.
        let mut acc = accumulator(&dir);
        let mut input = spec(path, FileFormat::Las, [None; 6]);
        input.las_classes = 1 << 2;
        assert_eq!(load(&mut acc, &input, false).unwrap(), 0);
        input.las_classes = 1;
        assert_eq!(load(&mut acc, &input, false).unwrap(), 1);
    }

    #[test]
    fn unsupported_formats_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.ply", "ply\n");
        let mut acc = accumulator(&dir);
        let err = load(&mut acc, &spec(path, FileFormat::Ply, [None; 6]), false).unwrap_err();
        assert_eq!(err.to_string(), "PLY input files are not supported");
    }
}
