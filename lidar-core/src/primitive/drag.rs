//! Picking and dragging of primitives.
use super::{mid, CylinderShape, LineShape, PlaneShape, Primitive, PrimitiveKind};
use glam::DVec3;

/// Part of a primitive grabbed by a pick, with the offset between the pick
/// position and the grabbed feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PickedPart {
    /// Points and spheres: picked but never moved.
    Whole,
    /// Plane corner; bit 0 selects the upper end of axis 0, bit 1 that of axis 1.
    Corner { index: usize, offset: DVec3 },
    /// Plane edge `2 * axis + upper`.
    Edge { index: usize, offset: DVec3 },
    Face,
    Lower { offset: f64 },
    Upper { offset: f64 },
    Line,
}

/// An ongoing drag: the index of the picked primitive in its list plus the grabbed part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragState {
    pub index: usize,
    pub part: PickedPart,
}

impl Primitive {
    /// Picks this primitive if it is closer to `p` than `sqrt(max_dist2)`, shrinking `max_dist2` on success.
    pub fn pick(&self, p: DVec3, max_dist2: &mut f64) -> Option<PickedPart> {
        match &self.kind {
            PrimitiveKind::Point(shape) => {
                let dist2 = p.distance_squared(shape.point);
                pick_whole(dist2, max_dist2)
            }
            PrimitiveKind::Sphere(shape) => {
                let center_dist2 = p.distance_squared(shape.center);
                let surface = center_dist2.sqrt() - shape.radius;
                pick_whole(center_dist2.min(surface * surface), max_dist2)
            }
            PrimitiveKind::Line(line) => {
                let axis_dist2 = line.axis.cross(p - line.center).length_squared();
                pick_segment(line, p, axis_dist2, max_dist2)
            }
            PrimitiveKind::Cylinder(cylinder) => {
                let axis_dist2 = cylinder.line.axis.cross(p - cylinder.line.center).length_squared();
                let mantle = axis_dist2.sqrt() - cylinder.radius;
                pick_segment(&cylinder.line, p, axis_dist2.min(mantle * mantle), max_dist2)
            }
            PrimitiveKind::Plane(plane) | PrimitiveKind::Brunton(plane) => pick_plane(plane, p, max_dist2),
        }
    }

    /// Moves the grabbed part towards `p`; the part may change when extents cross.
    pub fn drag(&mut self, part: &mut PickedPart, p: DVec3) {
        let changed = match &mut self.kind {
            PrimitiveKind::Point(_) | PrimitiveKind::Sphere(_) => false,
            PrimitiveKind::Line(line) => drag_segment(line, part, p),
            PrimitiveKind::Cylinder(cylinder) => drag_cylinder(cylinder, part, p),
            PrimitiveKind::Plane(plane) | PrimitiveKind::Brunton(plane) => drag_plane(plane, part, p),
        };
        if changed {
            self.invalidate();
        }
    }
}

fn pick_whole(dist2: f64, max_dist2: &mut f64) -> Option<PickedPart> {
    if *max_dist2 > dist2 {
        *max_dist2 = dist2;
        Some(PickedPart::Whole)
    } else {
        None
    }
}

fn pick_segment(line: &LineShape, p: DVec3, axis_dist2: f64, max_dist2: &mut f64) -> Option<PickedPart> {
    if axis_dist2 >= *max_dist2 {
        return None;
    }
    let param = (p - line.center).dot(line.axis);
    if param <= mid(line.extents) {
        let d = param - line.extents[0];
        let dist2 = axis_dist2 + d * d;
        if *max_dist2 > dist2 {
            *max_dist2 = dist2;
            return Some(PickedPart::Lower {
                offset: line.extents[0] - param,
            });
        }
    } else {
        let d = param - line.extents[1];
        let dist2 = axis_dist2 + d * d;
        if *max_dist2 > dist2 {
            *max_dist2 = dist2;
            return Some(PickedPart::Upper {
                offset: line.extents[1] - param,
            });
        }
    }
    if param >= line.extents[0] && param <= line.extents[1] {
        *max_dist2 = axis_dist2;
        return Some(PickedPart::Line);
    }
    None
}

fn drag_segment(line: &mut LineShape, part: &mut PickedPart, p: DVec3) -> bool {
    let param = (p - line.center).dot(line.axis);
    match *part {
        PickedPart::Lower { offset } => {
            line.extents[0] = param + offset;
            if line.extents[0] > line.extents[1] {
                line.extents.swap(0, 1);
                *part = PickedPart::Upper { offset };
            }
        }
        PickedPart::Upper { offset } => {
            line.extents[1] = param + offset;
            if line.extents[0] > line.extents[1] {
                line.extents.swap(0, 1);
                *part = PickedPart::Lower { offset };
            }
        }
        _ => return false,
    }
    line.length = line.extents[1] - line.extents[0];
    true
}

fn drag_cylinder(cylinder: &mut CylinderShape, part: &mut PickedPart, p: DVec3) -> bool {
    let changed = drag_segment(&mut cylinder.line, part, p);
    if changed {
        cylinder.update_num_lines();
    }
    changed
}

fn pick_plane(plane: &PlaneShape, p: DVec3, max_dist2: &mut f64) -> Option<PickedPart> {
    let pc = p - plane.center;
    let plane_dist = pc.dot(plane.normal);
    let plane_dist2 = plane_dist * plane_dist;
    if plane_dist2 >= *max_dist2 {
        return None;
    }

    let mut corner_index = 0;
    let mut corner_dist2 = plane_dist2;
    let mut edge_index = 0;
    let mut edge_dist2 = f64::MAX;
    let mut face_dist2 = plane_dist2;
    for i in 0..2 {
        let local = pc.dot(plane.axes[i]);
        let extent = plane.extents[i];
        let upper = local >= mid(extent);
        let d = if upper { local - extent[1] } else { local - extent[0] };
        let d2 = d * d;
        if upper {
            corner_index |= 1 << i;
        }
        corner_dist2 += d2;
        if edge_dist2 > plane_dist2 + d2 {
            edge_dist2 = plane_dist2 + d2;
            edge_index = 2 * i + usize::from(upper);
        }
        if local < extent[0] || local > extent[1] {
            face_dist2 += d2;
        }
    }
    if face_dist2 >= *max_dist2 {
        return None;
    }

    if *max_dist2 > corner_dist2 {
        *max_dist2 = corner_dist2;
        Some(PickedPart::Corner {
            index: corner_index,
            offset: plane.corner(corner_index) - p,
        })
    } else if *max_dist2 > edge_dist2 {
        *max_dist2 = edge_dist2;
        let axis = edge_index >> 1;
        let other = 1 - axis;
        let edge_pos = plane.center
            + plane.axes[axis] * plane.extents[axis][edge_index & 1]
            + plane.axes[other] * mid(plane.extents[other]);
        Some(PickedPart::Edge {
            index: edge_index,
            offset: edge_pos - p,
        })
    } else {
        *max_dist2 = face_dist2;
        Some(PickedPart::Face)
    }
}

fn drag_plane(plane: &mut PlaneShape, part: &mut PickedPart, p: DVec3) -> bool {
    match part {
        PickedPart::Corner { index, offset } => {
            // Rotate the in-plane frame so the grabbed corner points at the drag position.
            let visual_center = plane.visual_center();
            let mut dpc = p + *offset - visual_center;
            dpc -= plane.normal * dpc.dot(plane.normal);
            let dpc2 = dpc.length_squared();
            if dpc2 == 0.0 {
                return false;
            }
            let cc = plane.corner(*index) - visual_center;
            let cc2 = cc.length_squared();
            if cc2 == 0.0 {
                return false;
            }
            let cos = (dpc.dot(cc) / (dpc2 * cc2).sqrt()).clamp(-1.0, 1.0);
            let mut sin = (1.0 - cos * cos).sqrt();
            if cc.cross(dpc).dot(plane.normal) < 0.0 {
                sin = -sin;
            }
            let [a0, a1] = plane.axes;
            plane.axes = [
                (a0 * cos + a1 * sin).normalize(),
                (a1 * cos - a0 * sin).normalize(),
            ];
            true
        }
        PickedPart::Edge { index, offset } => {
            let axis = *index >> 1;
            let along = (p - plane.center + *offset).dot(plane.axes[axis]);
            plane.extents[axis][*index & 1] = along;
            if plane.extents[axis][0] > plane.extents[axis][1] {
                plane.extents[axis].swap(0, 1);
                *index ^= 1;
            }
            plane.update_num_lines();
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{PointShape, SphereShape};
    use approx::assert_relative_eq;

    fn plane() -> Primitive {
        Primitive::new(
            PrimitiveKind::Plane(PlaneShape {
                center: DVec3::ZERO,
                normal: DVec3::Z,
                axes: [DVec3::X, DVec3::Y],
                extents: [[-1.0, 1.0], [-1.0, 1.0]],
                num_lines: [10, 10],
            }),
            4,
            0.0,
        )
    }

    fn line() -> Primitive {
        Primitive::new(
            PrimitiveKind::Line(LineShape {
                center: DVec3::ZERO,
                axis: DVec3::X,
                length: 2.0,
                extents: [-1.0, 1.0],
            }),
            2,
            0.0,
        )
    }

    fn plane_shape(p: &Primitive) -> &PlaneShape {
        match &p.kind {
            PrimitiveKind::Plane(shape) => shape,
            _ => unreachable!(),
        }
    }

    #[test]
    fn plane_picks_corner_edge_and_face() {
        let p = plane();
        let mut max = 0.25;
        assert!(matches!(
            p.pick(DVec3::new(0.9, 0.9, 0.0), &mut max),
            Some(PickedPart::Corner { index: 3, .. })
        ));

        let mut max = 0.25;
        assert!(matches!(
            p.pick(DVec3::new(0.0, -0.9, 0.1), &mut max),
            Some(PickedPart::Edge { index: 2, .. })
        ));

        let mut max = 0.25;
        assert_eq!(p.pick(DVec3::new(0.0, 0.0, 0.1), &mut max), Some(PickedPart::Face));
        assert_relative_eq!(max, 0.01, epsilon = 1e-12);

        let mut max = 0.25;
        assert_eq!(p.pick(DVec3::new(0.0, 0.0, 0.6), &mut max), None);
        assert_eq!(max, 0.25);
    }

    #[test]
    fn dragging_an_edge_past_its_partner_swaps_extents() {
        let mut p = plane();
        let mut max = 0.25;
        let mut part = p.pick(DVec3::new(0.95, 0.0, 0.0), &mut max).unwrap();
        assert!(matches!(part, PickedPart::Edge { index: 1, .. }));
        p.drag(&mut part, DVec3::new(-2.0, 0.0, 0.0));
        let shape = plane_shape(&p);
        assert_relative_eq!(shape.extents[0][0], -2.0 + 0.05, epsilon = 1e-12);
        assert_eq!(shape.extents[0][1], -1.0);
        assert!(matches!(part, PickedPart::Edge { index: 0, .. }));
        assert_eq!(p.version(), 2);
    }

    #[test]
    fn dragging_a_corner_rotates_the_frame() {
        let mut p = plane();
        let mut max = 0.25;
        let mut part = p.pick(DVec3::new(1.0, 1.0, 0.0), &mut max).unwrap();
        // Rotate the corner at 45 degrees to lie on the y axis.
        p.drag(&mut part, DVec3::new(0.0, 2.0f64.sqrt(), 0.0));
        let shape = plane_shape(&p);
        let corner = shape.corner(3);
        assert_relative_eq!(corner.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(corner.y, 2.0f64.sqrt(), epsilon = 1e-9);
        assert_relative_eq!(shape.axes[0].dot(shape.axes[1]), 0.0, epsilon = 1e-12);
        assert_relative_eq!(shape.axes[0].cross(shape.axes[1]).z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn line_endpoints_swap_when_crossed() {
        let mut p = line();
        let mut max = 0.04;
        let mut part = p.pick(DVec3::new(-0.9, 0.05, 0.0), &mut max).unwrap();
        assert!(matches!(part, PickedPart::Lower { .. }));
        p.drag(&mut part, DVec3::new(2.9, 0.0, 0.0));
        match &p.kind {
            PrimitiveKind::Line(l) => {
                assert_relative_eq!(l.extents[0], 1.0);
                assert_relative_eq!(l.extents[1], 2.8, epsilon = 1e-12);
                assert_relative_eq!(l.length, 1.8, epsilon = 1e-12);
            }
            _ => unreachable!(),
        }
        assert!(matches!(part, PickedPart::Upper { .. }));
    }

    #[test]
    fn line_middle_is_picked_as_line() {
        let p = line();
        let mut max = 0.04;
        assert_eq!(p.pick(DVec3::new(0.0, 0.1, 0.0), &mut max), Some(PickedPart::Line));
        let mut max = 0.04;
        assert_eq!(p.pick(DVec3::new(3.0, 0.0, 0.0), &mut max), None);
    }

    #[test]
    fn spheres_pick_on_surface_and_centre_but_do_not_move() {
        let mut s = Primitive::new(
            PrimitiveKind::Sphere(SphereShape {
                center: DVec3::ZERO,
                radius: 2.0,
            }),
            6,
            0.0,
        );
        let mut max = 0.01;
        let mut part = s.pick(DVec3::new(2.05, 0.0, 0.0), &mut max).unwrap();
        assert_eq!(part, PickedPart::Whole);
        s.drag(&mut part, DVec3::new(5.0, 0.0, 0.0));
        assert_eq!(s.version(), 1);

        let point = Primitive::new(PrimitiveKind::Point(PointShape { point: DVec3::ONE }), 3, 0.0);
        let mut max = 0.01;
        assert!(point.pick(DVec3::new(1.0, 1.0, 1.05), &mut max).is_some());
    }
}
