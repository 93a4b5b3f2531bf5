//! Version 1.3 primitive files and the primitive wire format.
//!
//! A file is the fixed 40-byte header followed by records, each an `i32`
//! type tag and the little-endian payload of that type. Pipe messages use
//! the same records without the header and without a coordinate offset.
use super::{CylinderShape, LineShape, PlaneShape, PointShape, Primitive, PrimitiveKind, SphereShape};
use crate::error::CodecError;
use crate::format::{read_dvec3, write_dvec3};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use constants::files::PRIMITIVE_FILE_HEADER;
use glam::DVec3;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Write one record, adding `offset` to every stored position.
pub fn write_primitive<W: Write>(w: &mut W, primitive: &Primitive, offset: DVec3) -> Result<(), CodecError> {
    w.write_i32::<LittleEndian>(primitive.type_tag())?;
    w.write_u64::<LittleEndian>(primitive.num_points)?;
    w.write_f64::<LittleEndian>(primitive.rms)?;
    let label = primitive.label.as_bytes();
    w.write_u32::<LittleEndian>(label.len() as u32)?;
    w.write_all(label)?;

    match &primitive.kind {
        PrimitiveKind::Point(shape) => write_dvec3(w, shape.point + offset)?,
        PrimitiveKind::Sphere(shape) => {
            write_dvec3(w, shape.center + offset)?;
            w.write_f64::<LittleEndian>(shape.radius)?;
        }
        PrimitiveKind::Line(line) => write_line(w, line, offset)?,
        PrimitiveKind::Cylinder(cylinder) => {
            write_line(w, &cylinder.line, offset)?;
            w.write_f64::<LittleEndian>(cylinder.radius)?;
            write_num_lines(w, cylinder.num_lines)?;
        }
        PrimitiveKind::Plane(plane) | PrimitiveKind::Brunton(plane) => {
            write_dvec3(w, plane.center + offset)?;
            write_dvec3(w, plane.normal)?;
            for axis in plane.axes {
                write_dvec3(w, axis)?;
            }
            for extent in plane.extents {
                w.write_f64::<LittleEndian>(extent[0])?;
                w.write_f64::<LittleEndian>(extent[1])?;
            }
            write_num_lines(w, plane.num_lines)?;
        }
    }
    Ok(())
}

fn write_line<W: Write>(w: &mut W, line: &LineShape, offset: DVec3) -> io::Result<()> {
    write_dvec3(w, line.center + offset)?;
    write_dvec3(w, line.axis)?;
    w.write_f64::<LittleEndian>(line.length)?;
    w.write_f64::<LittleEndian>(line.extents[0])?;
    w.write_f64::<LittleEndian>(line.extents[1])
}

fn write_num_lines<W: Write>(w: &mut W, num_lines: [i32; 2]) -> io::Result<()> {
    w.write_i32::<LittleEndian>(num_lines[0])?;
    w.write_i32::<LittleEndian>(num_lines[1])
}

/// Read one record, subtracting `offset` from every stored position.
///
/// Returns `None` at a clean end of stream.
pub fn read_primitive<R: Read>(r: &mut R, offset: DVec3) -> Result<Option<Primitive>, CodecError> {
    let Some(tag) = read_tag(r)? else {
        return Ok(None);
    };
    record(read_record(r, tag, offset))
}

fn record(result: Result<Primitive, CodecError>) -> Result<Option<Primitive>, CodecError> {
    match result {
        Ok(primitive) => Ok(Some(primitive)),
        Err(CodecError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Err(CodecError::Truncated),
        Err(e) => Err(e),
    }
}

fn read_tag<R: Read>(r: &mut R) -> Result<Option<i32>, CodecError> {
    let mut bytes = [0u8; 4];
    let mut filled = 0;
    while filled < bytes.len() {
        match r.read(&mut bytes[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(CodecError::Truncated),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(i32::from_le_bytes(bytes)))
}

fn read_record<R: Read>(r: &mut R, tag: i32, offset: DVec3) -> Result<Primitive, CodecError> {
    if !(0..=5).contains(&tag) {
        return Err(CodecError::UnknownTypeTag(tag));
    }
    let num_points = r.read_u64::<LittleEndian>()?;
    let rms = r.read_f64::<LittleEndian>()?;
    let label_len = r.read_u32::<LittleEndian>()? as usize;
    let mut label = Vec::new();
    (&mut *r).take(label_len as u64).read_to_end(&mut label)?;
    if label.len() != label_len {
        return Err(CodecError::Truncated);
    }
    let label = String::from_utf8(label).map_err(|_| CodecError::BadLabel)?;

    let kind = match tag {
        0 => PrimitiveKind::Point(PointShape {
            point: read_dvec3(r)? - offset,
        }),
        1 => PrimitiveKind::Sphere(SphereShape {
            center: read_dvec3(r)? - offset,
            radius: r.read_f64::<LittleEndian>()?,
        }),
        2 => PrimitiveKind::Line(read_line(r, offset)?),
        3 => PrimitiveKind::Cylinder(CylinderShape {
            line: read_line(r, offset)?,
            radius: r.read_f64::<LittleEndian>()?,
            num_lines: read_num_lines(r)?,
        }),
        _ => {
            let plane = read_plane(r, offset)?;
            if tag == 4 {
                PrimitiveKind::Plane(plane)
            } else {
                PrimitiveKind::Brunton(plane)
            }
        }
    };
    let mut primitive = Primitive::new(kind, num_points, rms);
    primitive.label = label;
    Ok(primitive)
}

fn read_line<R: Read>(r: &mut R, offset: DVec3) -> io::Result<LineShape> {
    Ok(LineShape {
        center: read_dvec3(r)? - offset,
        axis: read_dvec3(r)?,
        length: r.read_f64::<LittleEndian>()?,
        extents: [r.read_f64::<LittleEndian>()?, r.read_f64::<LittleEndian>()?],
    })
}

fn read_plane<R: Read>(r: &mut R, offset: DVec3) -> io::Result<PlaneShape> {
    let center = read_dvec3(r)? - offset;
    let normal = read_dvec3(r)?;
    let axes = [read_dvec3(r)?, read_dvec3(r)?];
    let mut extents = [[0.0; 2]; 2];
    for extent in extents.iter_mut() {
        *extent = [r.read_f64::<LittleEndian>()?, r.read_f64::<LittleEndian>()?];
    }
    Ok(PlaneShape {
        center,
        normal,
        axes,
        extents,
        num_lines: read_num_lines(r)?,
    })
}

fn read_num_lines<R: Read>(r: &mut R) -> io::Result<[i32; 2]> {
    Ok([r.read_i32::<LittleEndian>()?, r.read_i32::<LittleEndian>()?])
}

/// Save primitives with `offset` added so the file is in source coordinates.
pub fn write_primitive_file<'a, I>(path: &Path, primitives: I, offset: DVec3) -> Result<(), CodecError>
where
    I: IntoIterator<Item = &'a Primitive>,
{
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(PRIMITIVE_FILE_HEADER)?;
    for primitive in primitives {
        write_primitive(&mut w, primitive, offset)?;
    }
    w.flush()?;
    Ok(())
}

/// Load all primitives of a file, moving them into octree coordinates by subtracting `offset`.
pub fn read_primitive_file(path: &Path, offset: DVec3) -> Result<Vec<Primitive>, CodecError> {
    let mut r = BufReader::new(File::open(path)?);
    let mut header = [0u8; 40];
    r.read_exact(&mut header).map_err(|_| CodecError::BadHeader)?;
    if &header != PRIMITIVE_FILE_HEADER {
        return Err(CodecError::BadHeader);
    }
    let mut primitives = Vec::new();
    while let Some(primitive) = read_primitive(&mut r, offset)? {
        primitives.push(primitive);
    }
    Ok(primitives)
}

pub fn write_primitive_to_pipe<W: Write>(pipe: &mut W, primitive: &Primitive) -> Result<(), CodecError> {
    write_primitive(pipe, primitive, DVec3::ZERO)
}

pub fn read_primitive_from_pipe<R: Read>(pipe: &mut R) -> Result<Primitive, CodecError> {
    read_primitive(pipe, DVec3::ZERO)?.ok_or(CodecError::Truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sphere() -> Primitive {
        let mut p = Primitive::new(
            PrimitiveKind::Sphere(SphereShape {
                center: DVec3::new(1.0, 2.0, 3.0),
                radius: 0.5,
            }),
            6,
            1.0e-3,
        );
        p.label = "Manhole".into();
        p
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut bytes = Vec::new();
        bytes.write_i32::<LittleEndian>(9).unwrap();
        let err = read_primitive(&mut Cursor::new(bytes), DVec3::ZERO).unwrap_err();
        assert!(matches!(err, CodecError::UnknownTypeTag(9)));
    }

    #[test]
    fn cut_record_is_truncated() {
        let mut bytes = Vec::new();
        write_primitive(&mut bytes, &sphere(), DVec3::ZERO).unwrap();
        bytes.truncate(bytes.len() - 3);
        let err = read_primitive(&mut Cursor::new(bytes), DVec3::ZERO).unwrap_err();
        assert!(matches!(err, CodecError::Truncated));
    }

    #[test]
    fn offset_is_added_on_write_and_removed_on_read() {
        let offset = DVec3::new(1000.0, -50.0, 0.25);
        let mut bytes = Vec::new();
        write_primitive(&mut bytes, &sphere(), offset).unwrap();
        // tag, count, rms, label length, label
        let center_at = 4 + 8 + 8 + 4 + "Manhole".len();
        let stored = read_dvec3(&mut Cursor::new(&bytes[center_at..])).unwrap();
        assert_eq!(stored, DVec3::new(1001.0, -48.0, 3.25));

        let back = read_primitive(&mut Cursor::new(bytes), offset).unwrap().unwrap();
        assert_eq!(back, sphere());
    }

    #[test]
    fn pipe_records_carry_no_offset() {
        let mut bytes = Vec::new();
        write_primitive_to_pipe(&mut bytes, &sphere()).unwrap();
        let back = read_primitive_from_pipe(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(back, sphere());
    }
}
