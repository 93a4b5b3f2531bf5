//! Fitted geometric primitives and their shared metadata.
mod drag;
mod file;
mod list;

pub use drag::{DragState, PickedPart};
pub use list::{PrimitiveList, SELECTED_SURFACE_COLOR};
pub use file::{
    read_primitive, read_primitive_file, read_primitive_from_pipe, write_primitive, write_primitive_file,
    write_primitive_to_pipe,
};

use glam::DVec3;
use std::f64::consts::PI;

/// Colour of transparent surfaces of new primitives.
pub const DEFAULT_SURFACE_COLOR: [f32; 4] = [0.6, 0.6, 0.1, 0.5];
/// Colour of grid lines of new primitives.
pub const DEFAULT_GRID_COLOR: [f32; 4] = [0.2, 0.2, 0.2, 1.0];
/// Maximum grid line count along either direction of a surface.
pub const MAX_GRID_LINES: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointShape {
    pub point: DVec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereShape {
    pub center: DVec3,
    pub radius: f64,
}

/// Line segment `center + axis * t` for `t` in `extents`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineShape {
    pub center: DVec3,
    /// Unit direction.
    pub axis: DVec3,
    pub length: f64,
    pub extents: [f64; 2],
}

impl LineShape {
    pub fn start(&self) -> DVec3 {
        self.center + self.axis * self.extents[0]
    }

    pub fn end(&self) -> DVec3 {
        self.center + self.axis * self.extents[1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CylinderShape {
    pub line: LineShape,
    pub radius: f64,
    pub num_lines: [i32; 2],
}

impl CylinderShape {
    /// Recomputes the grid so mantle cells stay roughly square.
    pub fn update_num_lines(&mut self) {
        let height = self.line.extents[1] - self.line.extents[0];
        self.num_lines = grid_line_counts(2.0 * PI * self.radius, height);
    }
}

/// Rectangle on a plane, spanned by two in-plane axes around `center`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneShape {
    pub center: DVec3,
    pub normal: DVec3,
    pub axes: [DVec3; 2],
    /// Interval along each axis, relative to `center`.
    pub extents: [[f64; 2]; 2],
    pub num_lines: [i32; 2],
}

impl PlaneShape {
    /// Corner `index` with bit 0 selecting the upper end of axis 0 and bit 1 that of axis 1.
    pub fn corner(&self, index: usize) -> DVec3 {
        self.center
            + self.axes[0] * self.extents[0][index & 1]
            + self.axes[1] * self.extents[1][(index >> 1) & 1]
    }

    /// Centre of the rectangle, which need not coincide with `center`.
    pub fn visual_center(&self) -> DVec3 {
        self.center
            + self.axes[0] * mid(self.extents[0])
            + self.axes[1] * mid(self.extents[1])
    }

    pub fn update_num_lines(&mut self) {
        let w0 = self.extents[0][1] - self.extents[0][0];
        let w1 = self.extents[1][1] - self.extents[1][0];
        self.num_lines = grid_line_counts(w0, w1);
    }

    /// Strike and dip angles in degrees, with the normal flipped to point upwards.
    pub fn strike_dip(&self) -> (f64, f64) {
        let mut n = self.normal.normalize_or_zero();
        if n.z < 0.0 {
            n = -n;
        }
        let dip = n.z.clamp(-1.0, 1.0).acos();
        let mut strike = n.x.atan2(n.y);
        if strike < 0.0 {
            strike += 2.0 * PI;
        }
        (strike.to_degrees(), dip.to_degrees())
    }
}

/// Shape data of a primitive, tagged by variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimitiveKind {
    Point(PointShape),
    Sphere(SphereShape),
    Line(LineShape),
    Cylinder(CylinderShape),
    Plane(PlaneShape),
    Brunton(PlaneShape),
}

impl PrimitiveKind {
    /// Type tag written ahead of each record in primitive files.
    pub fn type_tag(&self) -> i32 {
        match self {
            PrimitiveKind::Point(_) => 0,
            PrimitiveKind::Sphere(_) => 1,
            PrimitiveKind::Line(_) => 2,
            PrimitiveKind::Cylinder(_) => 3,
            PrimitiveKind::Plane(_) => 4,
            PrimitiveKind::Brunton(_) => 5,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PrimitiveKind::Point(_) => "Point",
            PrimitiveKind::Sphere(_) => "Sphere",
            PrimitiveKind::Line(_) => "Line",
            PrimitiveKind::Cylinder(_) => "Cylinder",
            PrimitiveKind::Plane(_) => "Plane",
            PrimitiveKind::Brunton(_) => "Brunton",
        }
    }
}

/// A fitted shape with its residual metadata and display state.
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub num_points: u64,
    pub rms: f64,
    pub label: String,
    surface_color: [f32; 4],
    grid_color: [f32; 4],
    version: u64,
    pub kind: PrimitiveKind,
}

impl Primitive {
    pub fn new(kind: PrimitiveKind, num_points: u64, rms: f64) -> Self {
        Self {
            num_points,
            rms,
            label: String::new(),
            surface_color: DEFAULT_SURFACE_COLOR,
            grid_color: DEFAULT_GRID_COLOR,
            version: 1,
            kind,
        }
    }

    pub fn type_tag(&self) -> i32 {
        self.kind.type_tag()
    }

    /// Cache key for renderers; bumped on every visible change.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn invalidate(&mut self) {
        self.version += 1;
    }

    pub fn surface_color(&self) -> [f32; 4] {
        self.surface_color
    }

    pub fn set_surface_color(&mut self, color: [f32; 4]) {
        self.surface_color = color;
        self.invalidate();
    }

    pub fn grid_color(&self) -> [f32; 4] {
        self.grid_color
    }

    pub fn set_grid_color(&mut self, color: [f32; 4]) {
        self.grid_color = color;
        self.invalidate();
    }

    /// Strike and dip in degrees for Brunton primitives.
    pub fn strike_dip(&self) -> Option<(f64, f64)> {
        match &self.kind {
            PrimitiveKind::Brunton(plane) => Some(plane.strike_dip()),
            _ => None,
        }
    }

    /// Multi-line human readable description, coordinates shifted by `offset`.
    pub fn describe(&self, offset: DVec3) -> String {
        let mut text = format!("{} fitting {} points\n", self.kind.type_name(), self.num_points);
        match &self.kind {
            PrimitiveKind::Point(p) => {
                text += &format!("Point: {}\n", fmt_point(p.point + offset));
            }
            PrimitiveKind::Sphere(s) => {
                text += &format!("Center point: {}\nRadius: {}\n", fmt_point(s.center + offset), s.radius);
            }
            PrimitiveKind::Line(l) => {
                text += &format!(
                    "Center point: {}\nAxis direction: {}\nLength: {}\n",
                    fmt_point(l.center + offset),
                    fmt_point(l.axis),
                    l.length
                );
            }
            PrimitiveKind::Cylinder(c) => {
                text += &format!(
                    "Center point: {}\nAxis direction: {}\nRadius: {}, height: {}\n",
                    fmt_point(c.line.center + offset),
                    fmt_point(c.line.axis),
                    c.radius,
                    c.line.length
                );
            }
            PrimitiveKind::Plane(p) | PrimitiveKind::Brunton(p) => {
                text += &format!(
                    "Plane equation: {} * x = {}\n",
                    fmt_point(p.normal),
                    p.normal.dot(p.center + offset)
                );
                if let PrimitiveKind::Brunton(_) = self.kind {
                    let (strike, dip) = p.strike_dip();
                    text += &format!("Strike angle: {strike}\nDip angle: {dip}\n");
                }
            }
        }
        text += &format!("RMS approximation residual: {}", self.rms);
        text
    }
}

fn fmt_point(p: DVec3) -> String {
    format!("({}, {}, {})", p.x, p.y, p.z)
}

pub(crate) fn mid(interval: [f64; 2]) -> f64 {
    (interval[0] + interval[1]) * 0.5
}

/// Grid line counts for a `w0` by `w1` surface: ten along the longer side,
/// the other rounded so cells are about square.
pub fn grid_line_counts(w0: f64, w1: f64) -> [i32; 2] {
    let aspect = w0 / w1;
    if !aspect.is_finite() || aspect <= 0.0 {
        return [MAX_GRID_LINES, MAX_GRID_LINES];
    }
    if aspect >= 1.0 {
        [MAX_GRID_LINES, (10.0 / aspect + 0.5).floor() as i32]
    } else {
        [(10.0 * aspect + 0.5).floor() as i32, MAX_GRID_LINES]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square_plane() -> PlaneShape {
        PlaneShape {
            center: DVec3::ZERO,
            normal: DVec3::Z,
            axes: [DVec3::X, DVec3::Y],
            extents: [[-1.0, 1.0], [-2.0, 2.0]],
            num_lines: [0, 0],
        }
    }

    #[test]
    fn grid_lines_keep_cells_square() {
        assert_eq!(grid_line_counts(2.0, 1.0), [10, 5]);
        assert_eq!(grid_line_counts(1.0, 4.0), [3, 10]);
        assert_eq!(grid_line_counts(1.0, 1.0), [10, 10]);
    }

    #[test]
    fn corners_follow_index_bits() {
        let plane = square_plane();
        assert_eq!(plane.corner(0), DVec3::new(-1.0, -2.0, 0.0));
        assert_eq!(plane.corner(1), DVec3::new(1.0, -2.0, 0.0));
        assert_eq!(plane.corner(2), DVec3::new(-1.0, 2.0, 0.0));
        assert_eq!(plane.corner(3), DVec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn colour_changes_bump_version() {
        let mut p = Primitive::new(PrimitiveKind::Plane(square_plane()), 4, 0.0);
        assert_eq!(p.version(), 1);
        assert_eq!(p.surface_color(), DEFAULT_SURFACE_COLOR);
        p.set_surface_color([1.0, 0.0, 0.0, 1.0]);
        p.set_grid_color([0.0, 0.0, 0.0, 1.0]);
        assert_eq!(p.version(), 3);
    }

    #[test]
    fn strike_and_dip_of_tilted_plane() {
        let mut plane = square_plane();
        plane.normal = DVec3::new(0.0, -1.0, -1.0).normalize();
        let (strike, dip) = plane.strike_dip();
        assert_relative_eq!(dip, 45.0, epsilon = 1e-9);
        assert_relative_eq!(strike, 0.0, epsilon = 1e-9);

        plane.normal = DVec3::new(1.0, 0.0, 1.0).normalize();
        let (strike, _) = plane.strike_dip();
        assert_relative_eq!(strike, 90.0, epsilon = 1e-9);
    }
}
