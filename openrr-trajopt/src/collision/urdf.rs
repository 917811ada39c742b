use std::path::Path;

use k::{nalgebra as na, Vector3};
use ncollide3d::{
    shape::{Ball, Capsule, ConvexHull, Cuboid, Cylinder, ShapeHandle},
    transformation::ToTriMesh,
};
use tracing::*;

use super::mesh::load_mesh_vertices;

const NUM_CYLINDER_SUBDIVISIONS: u32 = 30;
const NUM_CAPSULE_SUBDIVISIONS: (u32, u32) = (30, 15);

/// Convert a URDF geometry into a convex shape
///
/// Every shape supports both discrete and swept queries, so cylinders,
/// capsules and meshes are replaced by their convex hulls.
pub(crate) fn urdf_geometry_to_shape_handle(
    collision_geometry: &urdf_rs::Geometry,
    base_dir: Option<&Path>,
) -> Option<ShapeHandle<f64>> {
    match *collision_geometry {
        urdf_rs::Geometry::Box { ref size } => {
            let cube = Cuboid::new(Vector3::new(size[0] * 0.5, size[1] * 0.5, size[2] * 0.5));
            Some(ShapeHandle::new(cube))
        }
        urdf_rs::Geometry::Cylinder { radius, length } => {
            // ncollide3d cylinders are along y, URDF ones are along z
            let y_cylinder = Cylinder::new(length * 0.5, radius);
            let points = y_cylinder
                .to_trimesh(NUM_CYLINDER_SUBDIVISIONS)
                .coords
                .iter()
                .map(|point| point.xzy())
                .collect::<Vec<_>>();
            convex_hull_shape_handle(&points)
        }
        urdf_rs::Geometry::Capsule { radius, length } => {
            let y_capsule = Capsule::new(length * 0.5, radius);
            let points = y_capsule
                .to_trimesh(NUM_CAPSULE_SUBDIVISIONS)
                .coords
                .iter()
                .map(|point| point.xzy())
                .collect::<Vec<_>>();
            convex_hull_shape_handle(&points)
        }
        urdf_rs::Geometry::Sphere { radius } => Some(ShapeHandle::new(Ball::new(radius))),
        urdf_rs::Geometry::Mesh {
            ref filename,
            scale,
        } => {
            let scale = scale.unwrap_or(DEFAULT_MESH_SCALE);
            let replaced_filename = match urdf_rs::utils::expand_package_path(filename, base_dir) {
                Ok(replaced_filename) => replaced_filename,
                Err(e) => {
                    error!("{e}");
                    return None;
                }
            };
            let path = Path::new(&*replaced_filename);
            if !path.exists() {
                error!("{replaced_filename} not found");
                return None;
            }
            match load_mesh_vertices(path, &scale) {
                Ok(vertices) => convex_hull_shape_handle(&vertices),
                Err(err) => {
                    error!("load_mesh {path:?} failed: {err}");
                    None
                }
            }
        }
    }
}

fn convex_hull_shape_handle(points: &[na::Point3<f64>]) -> Option<ShapeHandle<f64>> {
    match ConvexHull::try_from_points(points) {
        Some(hull) => Some(ShapeHandle::new(hull)),
        None => {
            warn!("failed to compute convex hull of {} points", points.len());
            None
        }
    }
}

pub(crate) fn k_link_geometry_to_shape_handle(
    collision_geometry: &k::link::Geometry<f64>,
) -> Option<ShapeHandle<f64>> {
    let converted_geometry = match collision_geometry {
        k::link::Geometry::Box {
            depth,
            width,
            height,
        } => urdf_rs::Geometry::Box {
            size: urdf_rs::Vec3([*depth, *width, *height]),
        },
        k::link::Geometry::Cylinder { radius, length } => urdf_rs::Geometry::Cylinder {
            radius: *radius,
            length: *length,
        },
        k::link::Geometry::Capsule { radius, length } => urdf_rs::Geometry::Capsule {
            radius: *radius,
            length: *length,
        },
        k::link::Geometry::Sphere { radius } => urdf_rs::Geometry::Sphere { radius: *radius },
        k::link::Geometry::Mesh { filename, scale } => urdf_rs::Geometry::Mesh {
            filename: filename.to_string(),
            scale: Some(urdf_rs::Vec3([scale[0], scale[1], scale[2]])),
        },
    };
    urdf_geometry_to_shape_handle(&converted_geometry, None)
}

// https://github.com/openrr/urdf-rs/pull/3/files#diff-0fb2eeea3273a4c9b3de69ee949567f546dc8c06b1e190336870d00b54ea0979L36-L38
const DEFAULT_MESH_SCALE: urdf_rs::Vec3 = urdf_rs::Vec3([1.0f64; 3]);
