//! Writing octree points back out as ASCII, binary, or LAS 1.2 files.
use crate::cluster::{MulticastPipe, Replica};
use crate::error::{ClusterError, ExportError};
use crate::geometry::{Aabb, Bounds};
use crate::point::{LidarPoint, OffsetVector};
use crate::progress::point_bar;
use crate::reader::PagedOctree;
use crate::report::{user_error, SAVE_SELECTION};
use byteorder::{LittleEndian, WriteBytesExt};
use glam::{DVec3, Vec3};
use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::info;

/// Size of the LAS 1.2 public header, and the offset of the first point record.
pub const LAS_HEADER_SIZE: u16 = 227;
/// Record length of LAS point data format 2.
pub const LAS_RECORD_LENGTH: u16 = 26;
/// Quantisation step used when none is given.
pub const DEFAULT_LAS_SCALE: DVec3 = DVec3::splat(0.001);

const LAS_POINT_COUNT_POS: u64 = 107;
const LAS_BOUNDS_POS: u64 = 179;
const BINARY_COUNT_POS: u64 = 24;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExportFormat {
    /// `x y z r g b` text lines in source coordinates.
    Ascii,
    /// Offset header, point count, then raw point records.
    Binary,
    /// LAS 1.2 point data format 2 with the given quantisation scale.
    Las { scale: DVec3 },
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// Box in source coordinates; `None` exports every point.
    pub bbox: Option<Aabb>,
    pub show_progress: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Ascii,
            bbox: None,
            show_progress: true,
        }
    }
}

/// Destination of exported points.
pub trait PointSink {
    fn write_point(&mut self, point: &LidarPoint) -> Result<(), ExportError>;

    /// Complete the file and return the number of points written.
    fn finish(self) -> Result<u64, ExportError>;
}

pub struct AsciiWriter<W: Write> {
    out: W,
    offset: OffsetVector,
    count: u64,
}

impl<W: Write> AsciiWriter<W> {
    pub fn new(out: W, offset: OffsetVector) -> Self {
        Self { out, offset, count: 0 }
    }
}

impl<W: Write> PointSink for AsciiWriter<W> {
    fn write_point(&mut self, point: &LidarPoint) -> Result<(), ExportError> {
        let p = point.position_f64() + self.offset;
        let c = point.color;
        writeln!(self.out, "{} {} {} {} {} {}", p.x, p.y, p.z, c.r(), c.g(), c.b())?;
        self.count += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<u64, ExportError> {
        self.out.flush()?;
        Ok(self.count)
    }
}

pub struct BinaryWriter<W: Write + Seek> {
    out: W,
    count: u64,
}

impl<W: Write + Seek> BinaryWriter<W> {
    pub fn new(mut out: W, offset: OffsetVector) -> io::Result<Self> {
        for c in offset.to_array() {
            out.write_f64::<LittleEndian>(c)?;
        }
        out.write_u32::<LittleEndian>(0)?;
        Ok(Self { out, count: 0 })
    }
}

impl<W: Write + Seek> PointSink for BinaryWriter<W> {
    fn write_point(&mut self, point: &LidarPoint) -> Result<(), ExportError> {
        for c in point.position.to_array() {
            self.out.write_f32::<LittleEndian>(c)?;
        }
        self.out.write_all(&point.color.0)?;
        self.count += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<u64, ExportError> {
        let count = u32::try_from(self.count).map_err(|_| ExportError::TooManyPoints(self.count))?;
        self.out.seek(SeekFrom::Start(BINARY_COUNT_POS))?;
        self.out.write_u32::<LittleEndian>(count)?;
        self.out.flush()?;
        Ok(self.count)
    }
}

/// LAS 1.2 writer. Point count and bounds are patched into the header by [`PointSink::finish`].
pub struct LasWriter<W: Write + Seek> {
    out: W,
    file_offset: OffsetVector,
    quantisation_offset: DVec3,
    scale: DVec3,
    bounds: Bounds,
    count: u64,
}

impl<W: Write + Seek> LasWriter<W> {
    /// `quantisation_offset` is in octree coordinates; the header stores it in source coordinates.
    pub fn new(mut out: W, file_offset: OffsetVector, scale: DVec3, quantisation_offset: DVec3) -> io::Result<Self> {
        let zeros = [0u8; 32];
        out.write_all(b"LASF")?;
        out.write_u16::<LittleEndian>(0)?; // file source id
        out.write_u16::<LittleEndian>(0)?; // global encoding
        out.write_all(&zeros[..16])?; // project GUID
        out.write_u8(1)?;
        out.write_u8(2)?;
        out.write_all(&zeros)?; // system identifier
        out.write_all(&zeros)?; // generating software
        out.write_u16::<LittleEndian>(1)?; // creation day of year
        out.write_u16::<LittleEndian>(2011)?;
        out.write_u16::<LittleEndian>(LAS_HEADER_SIZE)?;
        out.write_u32::<LittleEndian>(u32::from(LAS_HEADER_SIZE))?;
        out.write_u32::<LittleEndian>(0)?; // variable length records
        out.write_u8(2)?;
        out.write_u16::<LittleEndian>(LAS_RECORD_LENGTH)?;
        for _ in 0..6 {
            out.write_u32::<LittleEndian>(0)?; // total and per-return counts
        }
        for c in scale.to_array() {
            out.write_f64::<LittleEndian>(c)?;
        }
        for c in (quantisation_offset + file_offset).to_array() {
            out.write_f64::<LittleEndian>(c)?;
        }
        write_las_bounds(&mut out, DVec3::ZERO, DVec3::ZERO)?;
        Ok(Self {
            out,
            file_offset,
            quantisation_offset,
            scale,
            bounds: Bounds::new(),
            count: 0,
        })
    }
}

fn write_las_bounds<W: Write>(out: &mut W, min: DVec3, max: DVec3) -> io::Result<()> {
    for i in 0..3 {
        out.write_f64::<LittleEndian>(max[i])?;
        out.write_f64::<LittleEndian>(min[i])?;
    }
    Ok(())
}

impl<W: Write + Seek> PointSink for LasWriter<W> {
    fn write_point(&mut self, point: &LidarPoint) -> Result<(), ExportError> {
        let p = point.position_f64();
        let q = ((p - self.quantisation_offset) / self.scale + 0.5).floor();
        for c in q.to_array() {
            self.out.write_i32::<LittleEndian>(c as i32)?;
        }
        self.out.write_u16::<LittleEndian>(point.color.intensity())?;
        self.out.write_u8(0)?; // return data
        self.out.write_u8(0)?; // classification
        self.out.write_u8(0)?; // scan angle
        self.out.write_u8(0)?; // user data
        self.out.write_u16::<LittleEndian>(0)?; // point source
        for c in [point.color.r(), point.color.g(), point.color.b()] {
            self.out.write_u16::<LittleEndian>(u16::from(c) * 257)?;
        }
        self.bounds.update(p);
        self.count += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<u64, ExportError> {
        let count = u32::try_from(self.count).map_err(|_| ExportError::TooManyPoints(self.count))?;
        self.out.seek(SeekFrom::Start(LAS_POINT_COUNT_POS))?;
        self.out.write_u32::<LittleEndian>(count)?;
        // every point is a first return
        self.out.write_u32::<LittleEndian>(count)?;
        self.out.seek(SeekFrom::Start(LAS_BOUNDS_POS))?;
        if self.bounds.is_empty() {
            write_las_bounds(&mut self.out, DVec3::ZERO, DVec3::ZERO)?;
        } else {
            write_las_bounds(
                &mut self.out,
                self.bounds.min + self.file_offset,
                self.bounds.max + self.file_offset,
            )?;
        }
        self.out.flush()?;
        Ok(self.count)
    }
}

/// Stream the points of `tree` (optionally clipped to a box) into `sink`.
pub fn write_points<S: PointSink>(tree: &mut PagedOctree, bbox: Option<&Aabb>, mut sink: S, show_progress: bool) -> Result<u64, ExportError> {
    let pb = point_bar(tree.num_points(), "Exporting points", show_progress);
    let mut failure = None;
    let mut visit = |p: &LidarPoint| {
        if failure.is_some() {
            return;
        }
        match sink.write_point(p) {
            Ok(()) => pb.inc(1),
            Err(e) => failure = Some(e),
        }
    };
    match bbox {
        Some(b) => tree.process_points_in_box(&b.translated(-tree.offset()), &mut visit)?,
        None => tree.process_points(&mut visit)?,
    }
    if let Some(e) = failure {
        pb.abandon();
        return Err(e);
    }
    let count = sink.finish()?;
    pb.finish_with_message("Export complete");
    Ok(count)
}

/// Export the points of `tree` to `path`; returns the number of points written.
pub fn export_points(tree: &mut PagedOctree, path: &Path, options: &ExportOptions) -> Result<u64, ExportError> {
    let out = BufWriter::new(File::create(path)?);
    let bbox = options.bbox.as_ref();
    let count = match options.format {
        ExportFormat::Ascii => write_points(tree, bbox, AsciiWriter::new(out, tree.offset()), options.show_progress)?,
        ExportFormat::Binary => {
            let sink = BinaryWriter::new(out, tree.offset())?;
            write_points(tree, bbox, sink, options.show_progress)?
        }
        ExportFormat::Las { scale } => {
            let sink = LasWriter::new(out, tree.offset(), scale, tree.root_cube().center)?;
            write_points(tree, bbox, sink, options.show_progress)?
        }
    };
    info!("exported {count} points to {}", path.display());
    Ok(count)
}

/// Write every selected point as a `x y z [nx ny nz] r g b` line in source coordinates.
pub fn write_selection<W: Write>(tree: &mut PagedOctree, out: &mut W) -> Result<u64, ExportError> {
    let offset = tree.offset();
    let mut count = 0u64;
    let mut failure: Option<io::Error> = None;
    tree.process_selected_points_with_normals(|point, normal: Option<Vec3>| {
        if failure.is_some() {
            return;
        }
        let p = point.position_f64() + offset;
        let c = point.color;
        let line = match normal {
            Some(n) => writeln!(out, "{} {} {} {} {} {} {} {} {}", p.x, p.y, p.z, n.x, n.y, n.z, c.r(), c.g(), c.b()),
            None => writeln!(out, "{} {} {} {} {} {}", p.x, p.y, p.z, c.r(), c.g(), c.b()),
        };
        match line {
            Ok(()) => count += 1,
            Err(e) => failure = Some(e),
        }
    })?;
    if let Some(e) = failure {
        return Err(e.into());
    }
    out.flush()?;
    Ok(count)
}

/// Save the selection to `path`. Only the head replica writes; every replica
/// reports the same outcome as a user-facing message.
pub fn save_selection<P: MulticastPipe>(tree: &mut PagedOctree, path: &Path, replica: &mut Replica<P>) -> Result<(), String> {
    let outcome = replica.run(|| {
        let file = File::create(path).map_err(|e| e.to_string())?;
        let mut out = BufWriter::new(file);
        let count = write_selection(tree, &mut out).map_err(|e| e.to_string())?;
        info!("saved {count} selected points to {}", path.display());
        Ok(())
    });
    outcome.map_err(|e| match e {
        ClusterError::RemoteFailure(message) => user_error(
            SAVE_SELECTION,
            format!("Could not write selection to file {} due to exception {message}", path.display()),
        ),
        other => user_error(SAVE_SELECTION, other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Rgba;
    use byteorder::ReadBytesExt;
    use std::io::{Cursor, Read};

    fn point(x: f32, y: f32, z: f32, c: Rgba) -> LidarPoint {
        LidarPoint::new(Vec3::new(x, y, z), c)
    }

    #[test]
    fn ascii_lines_add_the_offset_back() {
        let mut out = Vec::new();
        let mut sink = AsciiWriter::new(&mut out, DVec3::new(1000.0, 0.0, -5.0));
        sink.write_point(&point(1.5, 2.0, 0.25, Rgba::new(1, 2, 3, 255))).unwrap();
        assert_eq!(sink.finish().unwrap(), 1);
        assert_eq!(String::from_utf8(out).unwrap(), "1001.5 2 -4.75 1 2 3\n");
    }

    #[test]
    fn binary_layout() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut sink = BinaryWriter::new(&mut buffer, DVec3::new(1.0, 2.0, 3.0)).unwrap();
            sink.write_point(&point(0.5, 0.0, 0.0, Rgba::new(9, 8, 7, 6))).unwrap();
            sink.write_point(&point(1.5, 0.0, 0.0, Rgba::WHITE)).unwrap();
            sink.finish().unwrap();
        }
        let bytes = buffer.into_inner();
        assert_eq!(bytes.len(), 24 + 4 + 2 * 16);
        let mut r = Cursor::new(&bytes);
        assert_eq!(r.read_f64::<LittleEndian>().unwrap(), 1.0);
        r.set_position(24);
        assert_eq!(r.read_u32::<LittleEndian>().unwrap(), 2);
        assert_eq!(r.read_f32::<LittleEndian>().unwrap(), 0.5);
        r.set_position(28 + 12);
        let mut rgba = [0u8; 4];
        r.read_exact(&mut rgba).unwrap();
        assert_eq!(rgba, [9, 8, 7, 6]);
    }

    #[test]
    fn las_header_is_completed_on_finish() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let offset = DVec3::new(100.0, 200.0, 0.0);
            let mut sink = LasWriter::new(&mut buffer, offset, DEFAULT_LAS_SCALE, DVec3::ZERO).unwrap();
            sink.write_point(&point(1.0, -2.0, 0.5, Rgba::new(10, 20, 31, 255))).unwrap();
            sink.write_point(&point(-1.0, 4.0, 0.25, Rgba::WHITE)).unwrap();
            assert_eq!(sink.finish().unwrap(), 2);
        }
        let bytes = buffer.into_inner();
        assert_eq!(bytes.len(), 227 + 2 * 26);
        assert_eq!(&bytes[..4], b"LASF");

        let mut r = Cursor::new(&bytes);
        r.set_position(94);
        assert_eq!(r.read_u16::<LittleEndian>().unwrap(), 227);
        assert_eq!(r.read_u32::<LittleEndian>().unwrap(), 227);
        r.set_position(104);
        assert_eq!(r.read_u8().unwrap(), 2);
        assert_eq!(r.read_u16::<LittleEndian>().unwrap(), 26);
        assert_eq!(r.read_u32::<LittleEndian>().unwrap(), 2);
        r.set_position(155);
        assert_eq!(r.read_f64::<LittleEndian>().unwrap(), 100.0);
        r.set_position(179);
        let bounds: Vec<f64> = (0..6).map(|_| r.read_f64::<LittleEndian>().unwrap()).collect();
        assert_eq!(bounds, vec![101.0, 99.0, 204.0, 198.0, 0.5, 0.25]);

        // first record
        assert_eq!(r.read_i32::<LittleEndian>().unwrap(), 1000);
        assert_eq!(r.read_i32::<LittleEndian>().unwrap(), -2000);
        assert_eq!(r.read_i32::<LittleEndian>().unwrap(), 500);
        assert_eq!(r.read_u16::<LittleEndian>().unwrap(), 20);
        r.set_position(227 + 20);
        assert_eq!(r.read_u16::<LittleEndian>().unwrap(), 10 * 257);
    }
}
