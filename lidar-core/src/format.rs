//! Little-endian on-disk layout of an octree directory.
//!
//! `Index` holds a 36-byte header followed by 28-byte node records, the
//! root record first. `Points` starts with the point record size and then
//! holds every node's points back to back; node records address them by
//! record number.
use crate::point::{LidarPoint, Rgba};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::{DVec3, Vec3};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

pub const INDEX_HEADER_SIZE: u64 = 36;
pub const NODE_RECORD_SIZE: u64 = 28;
pub const POINTS_HEADER_SIZE: u64 = 4;
pub const POINT_RECORD_SIZE: u32 = 16;
pub const POINT_RECORD_SIZE_WITH_NORMALS: u32 = 28;

/// Root cube and node bound stored at the start of `Index`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexHeader {
    pub center: DVec3,
    pub radius: f64,
    pub max_points_per_node: u32,
}

impl IndexHeader {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_dvec3(w, self.center)?;
        w.write_f64::<LittleEndian>(self.radius)?;
        w.write_u32::<LittleEndian>(self.max_points_per_node)
    }

    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            center: read_dvec3(r)?,
            radius: r.read_f64::<LittleEndian>()?,
            max_points_per_node: r.read_u32::<LittleEndian>()?,
        })
    }
}

/// One node of the index file.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NodeRecord {
    /// Byte offset of the first of eight child records; zero for leaves.
    pub children_offset: i64,
    pub detail_size: f64,
    /// Number of the node's first point record inside `Points`.
    pub points_offset: i64,
    pub num_points: u32,
}

impl NodeRecord {
    pub fn is_leaf(&self) -> bool {
        self.children_offset == 0
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i64::<LittleEndian>(self.children_offset)?;
        w.write_f64::<LittleEndian>(self.detail_size)?;
        w.write_i64::<LittleEndian>(self.points_offset)?;
        w.write_u32::<LittleEndian>(self.num_points)
    }

    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            children_offset: r.read_i64::<LittleEndian>()?,
            detail_size: r.read_f64::<LittleEndian>()?,
            points_offset: r.read_i64::<LittleEndian>()?,
            num_points: r.read_u32::<LittleEndian>()?,
        })
    }
}

/// Point record size for a points file with or without normals.
pub fn point_record_size(has_normals: bool) -> u32 {
    if has_normals {
        POINT_RECORD_SIZE_WITH_NORMALS
    } else {
        POINT_RECORD_SIZE
    }
}

pub fn write_point<W: Write>(w: &mut W, point: &LidarPoint, normal: Option<Vec3>) -> io::Result<()> {
    write_vec3(w, point.position)?;
    w.write_all(&point.color.0)?;
    if let Some(n) = normal {
        write_vec3(w, n)?;
    }
    Ok(())
}

pub fn read_point<R: Read>(r: &mut R, has_normals: bool) -> io::Result<(LidarPoint, Option<Vec3>)> {
    let position = read_vec3(r)?;
    let mut rgba = [0u8; 4];
    r.read_exact(&mut rgba)?;
    let normal = if has_normals { Some(read_vec3(r)?) } else { None };
    Ok((LidarPoint::new(position, Rgba(rgba)), normal))
}

pub fn write_vec3<W: Write>(w: &mut W, v: Vec3) -> io::Result<()> {
    w.write_f32::<LittleEndian>(v.x)?;
    w.write_f32::<LittleEndian>(v.y)?;
    w.write_f32::<LittleEndian>(v.z)
}

pub fn read_vec3<R: Read>(r: &mut R) -> io::Result<Vec3> {
    Ok(Vec3::new(
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
    ))
}

pub fn write_dvec3<W: Write>(w: &mut W, v: DVec3) -> io::Result<()> {
    w.write_f64::<LittleEndian>(v.x)?;
    w.write_f64::<LittleEndian>(v.y)?;
    w.write_f64::<LittleEndian>(v.z)
}

pub fn read_dvec3<R: Read>(r: &mut R) -> io::Result<DVec3> {
    Ok(DVec3::new(
        r.read_f64::<LittleEndian>()?,
        r.read_f64::<LittleEndian>()?,
        r.read_f64::<LittleEndian>()?,
    ))
}

/// Read an `Offset` file (three little-endian doubles).
pub fn read_offset_file(path: &Path) -> io::Result<DVec3> {
    let mut file = BufReader::new(File::open(path)?);
    read_dvec3(&mut file)
}

pub fn write_offset_file(path: &Path, offset: DVec3) -> io::Result<()> {
    let mut file = File::create(path)?;
    write_dvec3(&mut file, offset)?;
    file.flush()
}

/// Length unit of an octree, as stored in the `Unit` file.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearUnit {
    pub factor: f64,
    pub name: String,
}

/// Parse a `Unit` file of the form `<factor> <name>`.
pub fn read_unit_file(path: &Path) -> io::Result<LinearUnit> {
    let mut line = String::new();
    BufReader::new(File::open(path)?).read_line(&mut line)?;
    parse_unit(&line).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("malformed unit description {:?}", line.trim()),
        )
    })
}

fn parse_unit(line: &str) -> Option<LinearUnit> {
    let mut tokens = line.split_whitespace();
    let factor = tokens.next()?.parse().ok()?;
    let name = tokens.collect::<Vec<_>>().join(" ");
    (!name.is_empty()).then_some(LinearUnit { factor, name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_and_record_sizes_match_layout() {
        let mut buf = Vec::new();
        IndexHeader {
            center: DVec3::new(1.0, 2.0, 3.0),
            radius: 4.0,
            max_points_per_node: 256,
        }
        .write(&mut buf)
        .unwrap();
        assert_eq!(buf.len() as u64, INDEX_HEADER_SIZE);

        let record = NodeRecord {
            children_offset: 64,
            detail_size: 0.5,
            points_offset: 7,
            num_points: 9,
        };
        let mut rec = Vec::new();
        record.write(&mut rec).unwrap();
        assert_eq!(rec.len() as u64, NODE_RECORD_SIZE);
        assert_eq!(NodeRecord::read(&mut Cursor::new(rec)).unwrap(), record);
    }

    #[test]
    fn point_records_with_and_without_normals() {
        let p = LidarPoint::new(Vec3::new(1.5, -2.0, 0.25), Rgba::new(1, 2, 3, 4));
        let mut buf = Vec::new();
        write_point(&mut buf, &p, None).unwrap();
        assert_eq!(buf.len() as u32, POINT_RECORD_SIZE);
        write_point(&mut buf, &p, Some(Vec3::Z)).unwrap();
        assert_eq!(buf.len() as u32, POINT_RECORD_SIZE + POINT_RECORD_SIZE_WITH_NORMALS);

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_point(&mut cursor, false).unwrap(), (p, None));
        assert_eq!(read_point(&mut cursor, true).unwrap(), (p, Some(Vec3::Z)));
    }

    #[test]
    fn unit_description_parses_factor_and_name() {
        assert_eq!(
            parse_unit("0.3048 US survey foot\n"),
            Some(LinearUnit {
                factor: 0.3048,
                name: "US survey foot".to_string()
            })
        );
        assert_eq!(parse_unit("meter"), None);
    }
}
