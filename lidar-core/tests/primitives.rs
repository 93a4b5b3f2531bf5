mod common;

use approx::assert_relative_eq;
use common::build;
use glam::DVec3;
use lidar_core::algebra::intersect_planes;
use lidar_core::cluster::{ChannelPipe, Replica};
use lidar_core::extract::extract_primitive;
use lidar_core::fit::{fit_plane, FitKind};
use lidar_core::primitive::{
    read_primitive_file, write_primitive_file, CylinderShape, LineShape, PlaneShape, PointShape, Primitive,
    PrimitiveKind, PrimitiveList, SphereShape,
};
use lidar_core::{Interactor, PagedOctree};

fn every_kind() -> Vec<Primitive> {
    let line = LineShape {
        center: DVec3::new(1.5, -2.0, 0.25),
        axis: DVec3::new(0.6, 0.8, 0.0),
        length: 3.0,
        extents: [-1.5, 1.5],
    };
    let plane = PlaneShape {
        center: DVec3::new(4.0, 4.5, -1.0),
        normal: DVec3::Z,
        axes: [DVec3::X, DVec3::Y],
        extents: [[-2.0, 2.5], [-0.5, 0.75]],
        num_lines: [10, 3],
    };
    let kinds = [
        PrimitiveKind::Point(PointShape {
            point: DVec3::new(0.5, 0.25, 8.0),
        }),
        PrimitiveKind::Sphere(SphereShape {
            center: DVec3::new(-3.0, 2.0, 1.0),
            radius: 0.75,
        }),
        PrimitiveKind::Line(line),
        PrimitiveKind::Cylinder(CylinderShape {
            line,
            radius: 2.0,
            num_lines: [10, 4],
        }),
        PrimitiveKind::Plane(plane),
        PrimitiveKind::Brunton(plane),
    ];
    kinds
        .into_iter()
        .enumerate()
        .map(|(i, kind)| {
            let mut p = Primitive::new(kind, 100 + i as u64, 0.125 * i as f64);
            p.label = format!("Fläche {i}");
            p
        })
        .collect()
}

#[test]
fn primitive_file_round_trip_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("SavedPrimitives.dat");
    let offset = DVec3::new(4096.0, -1024.0, 256.0);
    let written = every_kind();

    write_primitive_file(&path, written.iter(), offset).unwrap();
    let header = std::fs::read(&path).unwrap();
    assert_eq!(&header[..40], b"LidarViewer primitive file v1.3       \n");

    let read = read_primitive_file(&path, offset).unwrap();
    assert_eq!(read, written);
    let tags: Vec<i32> = read.iter().map(Primitive::type_tag).collect();
    assert_eq!(tags, [0, 1, 2, 3, 4, 5]);
}

#[test]
fn plane_is_extracted_from_selected_points() {
    // z = 0.5 x + 1 sampled on a grid, stored with a large offset
    let mut points = Vec::new();
    for i in 0..40 {
        for j in 0..40 {
            let x = i as f64 * 0.125;
            let y = j as f64 * 0.125;
            points.push(DVec3::new(x, y, 0.5 * x + 1.0));
        }
    }
    let offset = DVec3::new(350_000.0, 4_100_000.0, 0.0);
    let built = build(&points, offset, 128);
    let mut tree = PagedOctree::open(&built.stem, 1 << 24).unwrap();

    tree.select_points(&Interactor::new(DVec3::new(2.5, 2.5, 2.25), 100.0)).unwrap();
    assert_eq!(tree.num_selected_points().unwrap(), 1600);

    let mut list = PrimitiveList::new();
    let mut replica: Replica<ChannelPipe> = Replica::Standalone;
    let index = extract_primitive(&mut tree, FitKind::Plane, &mut list, &mut replica).unwrap();
    let plane = list.get(index).unwrap();
    assert_eq!(plane.label, "Plane 1");
    assert_eq!(plane.num_points, 1600);
    assert!(plane.rms < 1e-5);
    let PrimitiveKind::Plane(shape) = plane.kind else {
        panic!("expected a plane");
    };
    let expected = DVec3::new(-0.5, 0.0, 1.0).normalize();
    assert_relative_eq!(shape.normal.dot(expected), 1.0, epsilon = 1e-9);

    let path = built.dir.path().join("Plane.dat");
    list.save(&path, tree.offset()).unwrap();
    let mut restored = PrimitiveList::new();
    restored.load(&path, tree.offset()).unwrap();
    let Some(PrimitiveKind::Plane(reloaded)) = restored.get(0).map(|p| p.kind) else {
        panic!("expected the plane back");
    };
    assert_eq!(reloaded.normal, shape.normal);
    assert_eq!(reloaded.extents, shape.extents);
    assert!(reloaded.center.abs_diff_eq(shape.center, 1e-9));
}

#[test]
fn exact_planes_meet_on_the_x_axis() {
    let mut floor = Vec::new();
    let mut wall = Vec::new();
    for i in -5..=5 {
        for j in 0..=4 {
            floor.push(DVec3::new(i as f64, j as f64 * 0.5, 0.0));
            wall.push(DVec3::new(i as f64 * 0.8, 0.0, j as f64 * 0.5));
        }
    }
    let a = fit_plane(floor).unwrap();
    let b = fit_plane(wall).unwrap();
    let PrimitiveKind::Line(line) = intersect_planes(&a, &b).unwrap().kind else {
        panic!("expected a line");
    };
    assert_relative_eq!(line.axis.x.abs(), 1.0, epsilon = 1e-9);
    assert_relative_eq!(line.center.y, 0.0, epsilon = 1e-9);
    assert_relative_eq!(line.center.z, 0.0, epsilon = 1e-9);
    assert!(intersect_planes(&a, &b).unwrap().rms < 1e-12);
}
