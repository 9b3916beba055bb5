//! Legacy VTK polydata (`.vtk`, ASCII).
//!
//! The writer emits `POINTS`, `POLYGONS` and area-weighted `NORMALS`. The reader
//! accepts both the classic cell layout and the `OFFSETS`/`CONNECTIVITY` layout of
//! file version 5, triangulating polygons and triangle strips. Point and cell
//! attributes are skipped.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use glam::DVec3;
use labelmesh_core::{LabelMeshError, Result, Stage, TriMesh};

/// Writes `mesh` as ASCII legacy VTK polydata with per-vertex normals.
pub fn write(mesh: &TriMesh, path: &Path, stage: Stage) -> Result<()> {
    let to_err = |source| LabelMeshError::Write {
        stage,
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(to_err)?;
    let mut w = BufWriter::new(file);
    write_to(mesh, &mut w)
        .and_then(|()| w.flush())
        .map_err(to_err)?;
    log::debug!(
        "wrote {} ({} vertices, {} triangles)",
        path.display(),
        mesh.num_vertices(),
        mesh.num_triangles()
    );
    Ok(())
}

fn write_to<W: Write>(mesh: &TriMesh, w: &mut W) -> std::io::Result<()> {
    writeln!(w, "# vtk DataFile Version 3.0")?;
    writeln!(w, "labelmesh surface")?;
    writeln!(w, "ASCII")?;
    writeln!(w, "DATASET POLYDATA")?;
    writeln!(w, "POINTS {} double", mesh.vertices.len())?;
    for v in &mesh.vertices {
        writeln!(w, "{} {} {}", v.x, v.y, v.z)?;
    }
    let n = mesh.triangles.len();
    writeln!(w, "POLYGONS {} {}", n, n * 4)?;
    for [a, b, c] in &mesh.triangles {
        writeln!(w, "3 {a} {b} {c}")?;
    }
    if !mesh.vertices.is_empty() {
        writeln!(w, "POINT_DATA {}", mesh.vertices.len())?;
        writeln!(w, "NORMALS Normals double")?;
        for n in mesh.vertex_normals() {
            writeln!(w, "{} {} {}", n.x, n.y, n.z)?;
        }
    }
    Ok(())
}

/// Reads an ASCII legacy VTK polydata file.
pub fn read(path: &Path, stage: Stage) -> Result<TriMesh> {
    let text = fs::read_to_string(path).map_err(|source| LabelMeshError::Io {
        stage,
        path: path.to_path_buf(),
        source,
    })?;
    let mesh = parse(&text).map_err(|reason| LabelMeshError::parse(stage, path, reason))?;
    log::debug!(
        "read {} ({} vertices, {} triangles)",
        path.display(),
        mesh.num_vertices(),
        mesh.num_triangles()
    );
    Ok(mesh)
}

struct Tokens<'a> {
    inner: std::str::SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn token(&mut self) -> Option<&'a str> {
        self.inner.next()
    }

    fn expect(&mut self, what: &str) -> std::result::Result<&'a str, String> {
        self.token()
            .ok_or_else(|| format!("unexpected end of file, expected {what}"))
    }

    /// Fails unless `count` items of `per_item` tokens each are still present.
    fn ensure_available(
        &self,
        count: usize,
        per_item: usize,
        what: &str,
    ) -> std::result::Result<(), String> {
        let left = self.inner.clone().count();
        if count.checked_mul(per_item).map_or(true, |needed| needed > left) {
            return Err(format!(
                "header declares {count} {what} but only {left} values follow"
            ));
        }
        Ok(())
    }

    fn number<T: std::str::FromStr>(&mut self, what: &str) -> std::result::Result<T, String> {
        let token = self.expect(what)?;
        token
            .parse()
            .map_err(|_| format!("invalid {what} '{token}'"))
    }
}

fn parse(text: &str) -> std::result::Result<TriMesh, String> {
    let mut lines = text.splitn(4, '\n');
    let version = lines.next().unwrap_or_default();
    if !version.trim_start().starts_with("# vtk DataFile") {
        return Err("missing '# vtk DataFile' header".into());
    }
    let _title = lines.next();
    let format = lines.next().unwrap_or_default().trim();
    if !format.eq_ignore_ascii_case("ASCII") {
        return Err(format!("only ASCII files are supported, found '{format}'"));
    }
    let mut tokens = Tokens {
        inner: lines.next().unwrap_or_default().split_whitespace(),
    };

    let keyword = tokens.expect("DATASET")?;
    let kind = tokens.expect("dataset type")?;
    if !keyword.eq_ignore_ascii_case("DATASET") || !kind.eq_ignore_ascii_case("POLYDATA") {
        return Err(format!("expected 'DATASET POLYDATA', found '{keyword} {kind}'"));
    }

    let mut mesh = TriMesh::default();
    while let Some(keyword) = tokens.token() {
        match keyword.to_ascii_uppercase().as_str() {
            "POINTS" => {
                let n: usize = tokens.number("point count")?;
                let _data_type = tokens.expect("point data type")?;
                tokens.ensure_available(n, 3, "points")?;
                mesh.vertices.reserve(n);
                for _ in 0..n {
                    let x = tokens.number("coordinate")?;
                    let y = tokens.number("coordinate")?;
                    let z = tokens.number("coordinate")?;
                    mesh.vertices.push(DVec3::new(x, y, z));
                }
            }
            section @ ("POLYGONS" | "TRIANGLE_STRIPS" | "VERTICES" | "LINES") => {
                let cells = read_cells(&mut tokens)?;
                match section {
                    "POLYGONS" => {
                        for cell in &cells {
                            for i in 1..cell.len().saturating_sub(1) {
                                mesh.triangles.push([cell[0], cell[i], cell[i + 1]]);
                            }
                        }
                    }
                    "TRIANGLE_STRIPS" => {
                        for cell in &cells {
                            for i in 0..cell.len().saturating_sub(2) {
                                let (a, b, c) = (cell[i], cell[i + 1], cell[i + 2]);
                                mesh.triangles
                                    .push(if i % 2 == 0 { [a, b, c] } else { [b, a, c] });
                            }
                        }
                    }
                    _ => {}
                }
            }
            "POINT_DATA" | "CELL_DATA" | "METADATA" | "FIELD" => break,
            other => return Err(format!("unsupported section '{other}'")),
        }
    }

    let n = mesh.vertices.len();
    if let Some(bad) = mesh.triangles.iter().flatten().find(|&&v| v as usize >= n) {
        return Err(format!("cell references point {bad}, file has {n} points"));
    }
    let dropped = mesh.remove_degenerate_triangles();
    if dropped > 0 {
        log::debug!("dropped {dropped} degenerate cells");
    }
    Ok(mesh)
}

/// Reads the body of a cell section, in either the classic or the offsets layout.
fn read_cells(tokens: &mut Tokens<'_>) -> std::result::Result<Vec<Vec<u32>>, String> {
    let first: usize = tokens.number("cell count")?;
    let second: usize = tokens.number("cell size")?;

    let mut peek = Tokens {
        inner: tokens.inner.clone(),
    };
    if peek
        .token()
        .is_some_and(|t| t.eq_ignore_ascii_case("OFFSETS"))
    {
        // Version 5: `first` offsets, `second` connectivity entries.
        tokens.expect("OFFSETS")?;
        tokens.expect("offset type")?;
        tokens.ensure_available(first, 1, "offsets")?;
        let offsets = (0..first)
            .map(|_| tokens.number::<usize>("offset"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let keyword = tokens.expect("CONNECTIVITY")?;
        if !keyword.eq_ignore_ascii_case("CONNECTIVITY") {
            return Err(format!("expected CONNECTIVITY, found '{keyword}'"));
        }
        tokens.expect("connectivity type")?;
        let connectivity = (0..second)
            .map(|_| tokens.number::<u32>("point index"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        return offsets
            .windows(2)
            .map(|w| {
                connectivity
                    .get(w[0]..w[1])
                    .map(<[u32]>::to_vec)
                    .ok_or_else(|| format!("offset range {}..{} out of bounds", w[0], w[1]))
            })
            .collect();
    }

    tokens.ensure_available(first, 1, "cells")?;
    let mut cells = Vec::with_capacity(first);
    let mut consumed = 0;
    for _ in 0..first {
        let len: usize = tokens.number("cell length")?;
        let cell = (0..len)
            .map(|_| tokens.number::<u32>("point index"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        consumed += len + 1;
        cells.push(cell);
    }
    if consumed != second {
        return Err(format!("cell size is {second} but cells hold {consumed} values"));
    }
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> TriMesh {
        TriMesh::new(
            vec![
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(1.0, 1.0, 0.0),
                DVec3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.vtk");
        let mut mesh = quad();
        mesh.vertices[2].z = 0.1 + 0.2;
        write(&mesh, &path, Stage::Isosurface).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("NORMALS Normals double"));
        assert_eq!(read(&path, Stage::Optimize).unwrap(), mesh);
    }

    #[test]
    fn test_polygons_are_triangulated() {
        let text = "# vtk DataFile Version 3.0\nquad\nASCII\nDATASET POLYDATA\n\
                    POINTS 4 float\n0 0 0 1 0 0 1 1 0 0 1 0\nPOLYGONS 1 5\n4 0 1 2 3\n";
        let mesh = parse(text).unwrap();
        assert_eq!(mesh.triangles, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_version5_offsets_and_strips() {
        let text = "# vtk DataFile Version 5.1\nstrip\nASCII\nDATASET POLYDATA\n\
                    POINTS 4 float\n0 0 0 1 0 0 0 1 0 1 1 0\n\
                    TRIANGLE_STRIPS 2 4\nOFFSETS vtktypeint64\n0 4\n\
                    CONNECTIVITY vtktypeint64\n0 1 2 3\n";
        let mesh = parse(text).unwrap();
        assert_eq!(mesh.triangles, vec![[0, 1, 2], [2, 1, 3]]);
    }

    #[test]
    fn test_rejects_bad_files() {
        assert!(parse("hello").is_err());
        let binary = "# vtk DataFile Version 3.0\nx\nBINARY\nDATASET POLYDATA\n";
        assert!(parse(binary).unwrap_err().contains("ASCII"));
        let out_of_range = "# vtk DataFile Version 3.0\nx\nASCII\nDATASET POLYDATA\n\
                            POINTS 3 float\n0 0 0 1 0 0 0 1 0\nPOLYGONS 1 4\n3 0 1 7\n";
        assert!(parse(out_of_range).is_err());

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read(&dir.path().join("missing.vtk"), Stage::Optimize),
            Err(LabelMeshError::Io { .. })
        ));
    }

    #[test]
    fn test_declared_counts_beyond_data() {
        let huge_points = "# vtk DataFile Version 3.0\nx\nASCII\nDATASET POLYDATA\n\
                           POINTS 1000000000000000000 double\n0 0 0\n";
        let err = parse(huge_points).unwrap_err();
        assert!(err.contains("1000000000000000000 points"), "{err}");

        let huge_cells = "# vtk DataFile Version 3.0\nx\nASCII\nDATASET POLYDATA\n\
                          POINTS 3 float\n0 0 0 1 0 0 0 1 0\n\
                          POLYGONS 1000000000000000000 4\n3 0 1 2\n";
        assert!(parse(huge_cells).unwrap_err().contains("cells"));

        let huge_offsets = "# vtk DataFile Version 5.1\nx\nASCII\nDATASET POLYDATA\n\
                            POINTS 3 float\n0 0 0 1 0 0 0 1 0\n\
                            POLYGONS 99999999999 3\nOFFSETS vtktypeint64\n0 3\n";
        assert!(parse(huge_offsets).unwrap_err().contains("offsets"));
    }

    #[test]
    fn test_truncated_points_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.vtk");
        fs::write(
            &path,
            "# vtk DataFile Version 3.0\nx\nASCII\nDATASET POLYDATA\nPOINTS 3 float\n0 0 0 1 0",
        )
        .unwrap();
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
}
