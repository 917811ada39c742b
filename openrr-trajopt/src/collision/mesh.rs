use std::{ffi::OsStr, fs, path::Path};

use k::nalgebra as na;

use crate::errors::*;

/// Load the vertices of a mesh file, scaled
///
/// Only the vertices are kept because link meshes are used as convex hulls.
#[cfg(feature = "assimp")]
pub(crate) fn load_mesh_vertices<P>(filename: P, scale: &[f64; 3]) -> Result<Vec<na::Point3<f64>>>
where
    P: AsRef<Path>,
{
    let filename = filename.as_ref();
    let mut importer = assimp::Importer::new();
    importer.pre_transform_vertices(|x| x.enable = true);
    importer.collada_ignore_up_direction(true);
    if let Some(file_string) = filename.to_str() {
        match importer.read_file(file_string) {
            Ok(assimp_scene) => Ok(assimp_scene
                .mesh_iter()
                .flat_map(|mesh| {
                    mesh.vertex_iter()
                        .map(|v| scaled_point([v.x, v.y, v.z], scale))
                        .collect::<Vec<_>>()
                })
                .collect()),
            Err(err) => Err(Error::MeshError(err.to_owned())),
        }
    } else {
        // assimp crate only supports utf-8 path
        load_vertices_by_extension(filename, scale)
    }
}

#[cfg(not(feature = "assimp"))]
pub(crate) fn load_mesh_vertices<P>(filename: P, scale: &[f64; 3]) -> Result<Vec<na::Point3<f64>>>
where
    P: AsRef<Path>,
{
    load_vertices_by_extension(filename.as_ref(), scale)
}

fn load_vertices_by_extension(filename: &Path, scale: &[f64; 3]) -> Result<Vec<na::Point3<f64>>> {
    match filename.extension().and_then(OsStr::to_str) {
        Some("stl" | "STL") => load_stl(filename, scale),
        Some("dae" | "DAE") => load_collada(filename, scale),
        _ => Err(Error::MeshError(format!("could not parse {filename:?}"))),
    }
}

fn scaled_point(v: [f32; 3], scale: &[f64; 3]) -> na::Point3<f64> {
    na::Point3::new(
        v[0] as f64 * scale[0],
        v[1] as f64 * scale[1],
        v[2] as f64 * scale[2],
    )
}

fn load_stl(filename: &Path, scale: &[f64; 3]) -> Result<Vec<na::Point3<f64>>> {
    let scene = mesh_loader::stl::from_slice(&fs::read(filename)?)?;
    Ok(scene
        .meshes
        .iter()
        .flat_map(|mesh| mesh.vertices.iter().map(|v| scaled_point(*v, scale)))
        .collect())
}

fn load_collada(filename: &Path, scale: &[f64; 3]) -> Result<Vec<na::Point3<f64>>> {
    let scene = mesh_loader::collada::from_str(&fs::read_to_string(filename)?)?;
    Ok(scene
        .meshes
        .iter()
        .flat_map(|mesh| mesh.vertices.iter().map(|v| scaled_point(*v, scale)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_extension() {
        assert!(load_mesh_vertices("spherebot.urdf", &[1.0; 3]).is_err());
    }

    #[test]
    fn test_load_stl() {
        let vertices = load_mesh_vertices("tetrahedron.stl", &[2.0, 1.0, 0.5]).unwrap();
        assert!(!vertices.is_empty());
        let max = |f: fn(&na::Point3<f64>) -> f64| {
            vertices.iter().map(f).fold(f64::NEG_INFINITY, f64::max)
        };
        assert_eq!(max(|p| p.x), 2.0);
        assert_eq!(max(|p| p.y), 1.0);
        assert_eq!(max(|p| p.z), 0.5);
        assert!(vertices.iter().all(|p| p.x >= 0.0 && p.y >= 0.0 && p.z >= 0.0));
    }
}
