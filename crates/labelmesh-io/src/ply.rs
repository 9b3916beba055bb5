//! Stanford PLY support through `ply-rs`.
//!
//! Meshes are written as ASCII with double-precision positions and per-vertex
//! normals. Reading accepts any encoding `ply-rs` understands.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use glam::DVec3;
use labelmesh_core::{LabelMeshError, Result, Stage, TriMesh};
use ply_rs::parser::Parser;
use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
    ScalarType,
};
use ply_rs::writer::Writer;

/// Loads a triangle mesh from a PLY file; polygons are fan-triangulated.
pub fn read(path: &Path, stage: Stage) -> Result<TriMesh> {
    let file = File::open(path).map_err(|source| LabelMeshError::Io {
        stage,
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let fail = |reason: String| LabelMeshError::parse(stage, path, reason);

    let parser = Parser::<DefaultElement>::new();
    let header = parser
        .read_header(&mut reader)
        .map_err(|e| fail(format!("failed to parse PLY header: {e}")))?;
    let payload = parser
        .read_payload(&mut reader, &header)
        .map_err(|e| fail(format!("failed to read PLY payload: {e}")))?;

    let mut mesh = TriMesh::default();
    if let Some(vertices) = payload.get("vertex") {
        mesh.vertices.reserve(vertices.len());
        for element in vertices {
            let coord = |key: &str| {
                float_property(element, key).ok_or_else(|| fail(format!("vertex lacks '{key}'")))
            };
            mesh.vertices
                .push(DVec3::new(coord("x")?, coord("y")?, coord("z")?));
        }
    }
    if let Some(faces) = payload.get("face") {
        for element in faces {
            let indices = index_list(element).map_err(&fail)?;
            for i in 1..indices.len().saturating_sub(1) {
                mesh.triangles
                    .push([indices[0], indices[i], indices[i + 1]]);
            }
        }
    }

    let n = mesh.vertices.len();
    if let Some(bad) = mesh.triangles.iter().flatten().find(|&&v| v as usize >= n) {
        return Err(fail(format!("face references vertex {bad}, file has {n}")));
    }
    mesh.remove_degenerate_triangles();
    Ok(mesh)
}

fn float_property(element: &DefaultElement, key: &str) -> Option<f64> {
    match element.get(key)? {
        Property::Float(v) => Some(f64::from(*v)),
        Property::Double(v) => Some(*v),
        _ => None,
    }
}

fn index_list(element: &DefaultElement) -> std::result::Result<Vec<u32>, String> {
    fn convert<T: Copy + std::fmt::Display>(values: &[T]) -> std::result::Result<Vec<u32>, String>
    where
        u32: TryFrom<T>,
    {
        values
            .iter()
            .map(|&i| u32::try_from(i).map_err(|_| format!("invalid vertex index {i}")))
            .collect()
    }

    for key in ["vertex_indices", "vertex_index"] {
        if let Some(prop) = element.get(key) {
            return match prop {
                Property::ListInt(v) => convert(v),
                Property::ListUInt(v) => Ok(v.clone()),
                Property::ListShort(v) => convert(v),
                Property::ListUShort(v) => convert(v),
                Property::ListChar(v) => convert(v),
                Property::ListUChar(v) => convert(v),
                _ => continue,
            };
        }
    }
    Ok(Vec::new())
}

/// Writes `mesh` as ASCII PLY with vertex normals.
pub fn write(mesh: &TriMesh, path: &Path, stage: Stage) -> Result<()> {
    let write_err = |source| LabelMeshError::Write {
        stage,
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(write_err)?;
    let mut out = BufWriter::new(file);

    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::Ascii;
    ply.header
        .comments
        .push("labelmesh surface".to_string());

    let mut vertex_def = ElementDef::new("vertex".to_string());
    for key in ["x", "y", "z", "nx", "ny", "nz"] {
        vertex_def.properties.add(PropertyDef::new(
            key.to_string(),
            PropertyType::Scalar(ScalarType::Double),
        ));
    }
    vertex_def.count = mesh.vertices.len();
    ply.header.elements.add(vertex_def);

    let mut face_def = ElementDef::new("face".to_string());
    face_def.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::UInt),
    ));
    face_def.count = mesh.triangles.len();
    ply.header.elements.add(face_def);

    let normals = mesh.vertex_normals();
    let vertices = mesh
        .vertices
        .iter()
        .zip(&normals)
        .map(|(p, n)| {
            let mut element = DefaultElement::new();
            for (key, value) in [
                ("x", p.x),
                ("y", p.y),
                ("z", p.z),
                ("nx", n.x),
                ("ny", n.y),
                ("nz", n.z),
            ] {
                element.insert(key.to_string(), Property::Double(value));
            }
            element
        })
        .collect();
    ply.payload.insert("vertex".to_string(), vertices);

    let faces = mesh
        .triangles
        .iter()
        .map(|tri| {
            let mut element = DefaultElement::new();
            element.insert("vertex_indices".to_string(), Property::ListUInt(tri.to_vec()));
            element
        })
        .collect();
    ply.payload.insert("face".to_string(), faces);

    Writer::new()
        .write_ply(&mut out, &mut ply)
        .and_then(|_| out.flush())
        .map_err(write_err)?;
    log::debug!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetra() -> TriMesh {
        TriMesh::new(
            vec![
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(0.0, 1.0, 0.0),
                DVec3::new(0.0, 0.0, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]],
        )
    }

    #[test]
    fn test_roundtrip_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tetra.ply");
        let mesh = tetra();
        write(&mesh, &path, Stage::Optimize).unwrap();

        let loaded = read(&path, Stage::Optimize).unwrap();
        assert_eq!(loaded.triangles, mesh.triangles);
        for (a, b) in loaded.vertices.iter().zip(&mesh.vertices) {
            assert!((*a - *b).length() < 1e-9);
        }
    }

    #[test]
    fn test_quads_are_triangulated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.ply");
        std::fs::write(
            &path,
            "ply\nformat ascii 1.0\nelement vertex 4\nproperty float x\nproperty float y\n\
             property float z\nelement face 1\nproperty list uchar int vertex_indices\n\
             end_header\n0 0 0\n1 0 0\n1 1 0\n0 1 0\n4 0 1 2 3\n",
        )
        .unwrap();
        let mesh = read(&path, Stage::Optimize).unwrap();
        assert_eq!(mesh.triangles, vec![[0, 1, 2], [0, 2, 3]]);
    }

    fn write_ply(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_negative_index_is_named() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ply(
            dir.path(),
            "neg.ply",
            b"ply\nformat ascii 1.0\nelement vertex 3\nproperty float x\nproperty float y\n\
              property float z\nelement face 1\nproperty list uchar int vertex_indices\n\
              end_header\n0 0 0\n1 0 0\n0 1 0\n3 0 1 -1\n",
        );
        let err = read(&path, Stage::Optimize).unwrap_err();
        assert!(matches!(err, LabelMeshError::Parse { .. }));
        assert!(err.to_string().contains("invalid vertex index -1"), "{err}");
    }

    #[test]
    fn test_declared_count_beyond_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ply(
            dir.path(),
            "short.ply",
            b"ply\nformat ascii 1.0\nelement vertex 1000000000000\nproperty float x\n\
              property float y\nproperty float z\nend_header\n0 0 0\n",
        );
        match read(&path, Stage::Optimize) {
            Err(LabelMeshError::Parse {
                stage,
                path: err_path,
                ..
            }) => {
                assert_eq!(stage, Stage::Optimize);
                assert_eq!(err_path, path);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_truncated_binary_payload() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 2\n\
            property float x\nproperty float y\nproperty float z\nend_header\n"
            .to_vec();
        for v in [0.0_f32, 1.0, 2.0, 3.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let path = write_ply(dir.path(), "cut.ply", &bytes);
        assert!(matches!(
            read(&path, Stage::Optimize),
            Err(LabelMeshError::Parse { stage: Stage::Optimize, .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read(&dir.path().join("none.ply"), Stage::Optimize),
            Err(LabelMeshError::Io { .. })
        ));
    }
}
