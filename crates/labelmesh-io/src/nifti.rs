//! NIfTI-1 single-file (`.nii`) reader and writer.
//!
//! NIfTI stores world coordinates in RAS; volumes here use the LPS frame of
//! MetaImage and ITK. Reading negates the first two rows of the direction matrix
//! and the first two origin components; writing undoes it.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use std::fs;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use glam::{DMat3, DVec3};
use labelmesh_core::{Grid, LabelMeshError, Result, Stage, Volume};

use crate::element::{encode_le, Element, ScalarKind};
use crate::Image;

const HEADER_SIZE: usize = 348;
/// Header plus the 4-byte extension flag.
const DATA_OFFSET: usize = 352;

const RAS_TO_LPS: DMat3 = DMat3::from_cols(
    DVec3::new(-1.0, 0.0, 0.0),
    DVec3::new(0.0, -1.0, 0.0),
    DVec3::new(0.0, 0.0, 1.0),
);

/// Reads a `.nii` file, detecting the byte order from `sizeof_hdr`.
pub fn read(path: &Path, stage: Stage) -> Result<Image> {
    let bytes = fs::read(path).map_err(|source| LabelMeshError::Io {
        stage,
        path: path.to_path_buf(),
        source,
    })?;
    let fail = |reason: &str| LabelMeshError::parse(stage, path, reason);

    if bytes.starts_with(&[0x1f, 0x8b]) {
        return Err(fail("gzip-compressed NIfTI is not supported"));
    }
    if bytes.len() < HEADER_SIZE {
        return Err(fail("file is shorter than a NIfTI-1 header"));
    }
    let image = if LittleEndian::read_i32(&bytes[0..4]) == 348 {
        parse::<LittleEndian>(&bytes)
    } else if BigEndian::read_i32(&bytes[0..4]) == 348 {
        parse::<BigEndian>(&bytes)
    } else {
        Err("sizeof_hdr is not 348".to_string())
    }
    .map_err(|reason| fail(&reason))?;

    log::debug!(
        "read {} ({:?}, {:?})",
        path.display(),
        image.volume.dims(),
        image.kind
    );
    Ok(image)
}

fn parse<E: ByteOrder>(bytes: &[u8]) -> std::result::Result<Image, String> {
    let i16_at = |offset: usize| E::read_i16(&bytes[offset..offset + 2]);
    let f32_at = |offset: usize| f64::from(E::read_f32(&bytes[offset..offset + 4]));

    if &bytes[344..347] != b"n+1" {
        return Err("not a single-file NIfTI-1 image (magic is not 'n+1')".into());
    }

    let dim: Vec<i16> = (0..8).map(|i| i16_at(40 + 2 * i)).collect();
    let ndim = usize::try_from(dim[0])
        .ok()
        .filter(|n| (1..=7).contains(n))
        .ok_or_else(|| format!("invalid dim[0] = {}", dim[0]))?;
    if dim[4..=ndim.max(3)].iter().any(|&d| d > 1) {
        return Err(format!("only 3D images are supported, dim = {:?}", &dim[..=ndim]));
    }
    let mut dims = [1_usize; 3];
    for (axis, slot) in dims.iter_mut().enumerate().take(ndim) {
        *slot = usize::try_from(dim[axis + 1])
            .ok()
            .filter(|&d| d > 0)
            .ok_or_else(|| format!("invalid dim[{}] = {}", axis + 1, dim[axis + 1]))?;
    }

    let datatype = i16_at(70);
    let kind = ScalarKind::from_nifti_code(datatype)
        .ok_or_else(|| format!("unsupported datatype {datatype}"))?;

    let vox_offset = f32_at(108);
    if vox_offset.is_nan() || vox_offset < HEADER_SIZE as f64 {
        return Err(format!("invalid vox_offset {vox_offset}"));
    }
    let data_start = vox_offset as usize;
    let count = dims[0] * dims[1] * dims[2];
    let mut values = kind
        .decode::<E>(bytes.get(data_start..).unwrap_or(&[]), count)
        .ok_or_else(|| format!("expected {} bytes of voxel data", count * kind.size()))?;

    let slope = f32_at(112);
    let inter = f32_at(116);
    if slope != 0.0 && slope.is_finite() && inter.is_finite() && (slope != 1.0 || inter != 0.0) {
        for v in &mut values {
            *v = *v * slope + inter;
        }
    }

    let pixdim: Vec<f64> = (0..8).map(|i| f32_at(76 + 4 * i)).collect();
    let qform_code = i16_at(252);
    let sform_code = i16_at(254);

    let (spacing, direction, origin) = if sform_code > 0 {
        let row = |offset: usize| DVec3::new(f32_at(offset), f32_at(offset + 4), f32_at(offset + 8));
        let (rx, ry, rz) = (row(280), row(296), row(312));
        let affine = DMat3::from_cols(rx, ry, rz).transpose();
        let origin = DVec3::new(f32_at(292), f32_at(308), f32_at(324));
        let (spacing, direction) = split_affine(affine);
        (spacing, direction, origin)
    } else if qform_code > 0 {
        let rotation = quaternion_matrix(f32_at(256), f32_at(260), f32_at(264));
        let qfac = if pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let direction = DMat3::from_cols(rotation.x_axis, rotation.y_axis, rotation.z_axis * qfac);
        let spacing = positive_spacing(DVec3::new(pixdim[1], pixdim[2], pixdim[3]).abs());
        let origin = DVec3::new(f32_at(268), f32_at(272), f32_at(276));
        (spacing, direction, origin)
    } else {
        let spacing = positive_spacing(DVec3::new(pixdim[1], pixdim[2], pixdim[3]).abs());
        (spacing, DMat3::IDENTITY, DVec3::ZERO)
    };

    let grid = Grid::new(dims)
        .with_spacing(spacing)
        .with_origin(RAS_TO_LPS * origin)
        .with_direction(RAS_TO_LPS * direction);
    let volume = Volume::new(grid, values).map_err(|e| e.to_string())?;
    Ok(Image { volume, kind })
}

/// Splits an affine's linear part into column lengths and unit columns.
fn split_affine(affine: DMat3) -> (DVec3, DMat3) {
    let mut spacing = DVec3::ONE;
    let mut cols = [DVec3::X, DVec3::Y, DVec3::Z];
    for (axis, col) in cols.iter_mut().enumerate() {
        let c = affine.col(axis);
        let len = c.length();
        if len > 0.0 && len.is_finite() {
            spacing[axis] = len;
            *col = c / len;
        }
    }
    (spacing, DMat3::from_cols(cols[0], cols[1], cols[2]))
}

fn positive_spacing(spacing: DVec3) -> DVec3 {
    let mut out = spacing;
    for axis in 0..3 {
        if out[axis] <= 0.0 || !out[axis].is_finite() {
            log::warn!("voxel spacing along axis {axis} is {}, using 1", out[axis]);
            out[axis] = 1.0;
        }
    }
    out
}

/// Rotation matrix of the unit quaternion `(a, b, c, d)` with `a` implied.
fn quaternion_matrix(b: f64, c: f64, d: f64) -> DMat3 {
    let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
    DMat3::from_cols(
        DVec3::new(
            a * a + b * b - c * c - d * d,
            2.0 * (b * c + a * d),
            2.0 * (b * d - a * c),
        ),
        DVec3::new(
            2.0 * (b * c - a * d),
            a * a + c * c - b * b - d * d,
            2.0 * (c * d + a * b),
        ),
        DVec3::new(
            2.0 * (b * d + a * c),
            2.0 * (c * d - a * b),
            a * a + d * d - b * b - c * c,
        ),
    )
}

/// Writes a little-endian `.nii` file with the geometry in the sform.
pub fn write<T: Element>(volume: &Volume<T>, path: &Path, stage: Stage) -> Result<()> {
    let grid = volume.grid();
    let mut bytes = vec![0_u8; DATA_OFFSET];
    let put_i16 = |bytes: &mut [u8], offset: usize, v: i16| {
        LittleEndian::write_i16(&mut bytes[offset..offset + 2], v);
    };
    let put_f32 = |bytes: &mut [u8], offset: usize, v: f64| {
        LittleEndian::write_f32(&mut bytes[offset..offset + 4], v as f32);
    };

    LittleEndian::write_i32(&mut bytes[0..4], HEADER_SIZE as i32);
    put_i16(&mut bytes, 40, 3);
    for (axis, &n) in grid.dims.iter().enumerate() {
        let n = i16::try_from(n).map_err(|_| {
            LabelMeshError::invalid("dims", format!("{n} voxels exceed the NIfTI-1 limit"))
        })?;
        put_i16(&mut bytes, 42 + 2 * axis, n);
    }
    for axis in 4..8 {
        put_i16(&mut bytes, 40 + 2 * axis, 1);
    }
    put_i16(&mut bytes, 70, T::KIND.nifti_code());
    put_i16(&mut bytes, 72, (T::KIND.size() * 8) as i16);
    put_f32(&mut bytes, 76, 1.0);
    for axis in 0..3 {
        put_f32(&mut bytes, 80 + 4 * axis, grid.spacing[axis]);
    }
    put_f32(&mut bytes, 108, DATA_OFFSET as f64);
    put_i16(&mut bytes, 254, 1);

    let affine = RAS_TO_LPS * grid.direction * DMat3::from_diagonal(grid.spacing);
    let origin = RAS_TO_LPS * grid.origin;
    for row in 0..3 {
        let offset = 280 + 16 * row;
        for col in 0..3 {
            put_f32(&mut bytes, offset + 4 * col, affine.col(col)[row]);
        }
        put_f32(&mut bytes, offset + 12, origin[row]);
    }
    bytes[344..348].copy_from_slice(b"n+1\0");

    bytes.extend_from_slice(&encode_le(volume.data()));
    fs::write(path, bytes).map_err(|source| LabelMeshError::Write {
        stage,
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_volume() -> Volume<u16> {
        let grid = Grid::new([4, 3, 2])
            .with_spacing(DVec3::new(0.5, 0.75, 2.0))
            .with_origin(DVec3::new(-10.0, 20.0, 5.5));
        let data = (0..24).map(|v| v % 3).collect();
        Volume::new(grid, data).unwrap()
    }

    #[test]
    fn test_roundtrip_through_sform() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.nii");
        let volume = sample_volume();
        write(&volume, &path, Stage::Convert).unwrap();

        let image = read(&path, Stage::Convert).unwrap();
        assert_eq!(image.kind, ScalarKind::U16);
        assert_eq!(image.volume.grid(), volume.grid());
        let expected: Vec<f64> = volume.data().iter().map(|&v| f64::from(v)).collect();
        assert_eq!(image.volume.data(), expected.as_slice());
    }

    #[test]
    fn test_ras_to_lps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.nii");
        write(&sample_volume(), &path, Stage::Convert).unwrap();
        let bytes = fs::read(&path).unwrap();
        // srow_x[0] and srow_x[3] carry the flipped x axis and origin.
        assert!((LittleEndian::read_f32(&bytes[280..284]) + 0.5).abs() < 1e-6);
        assert!((LittleEndian::read_f32(&bytes[292..296]) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_qform_and_scaling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qform.nii");
        write(&sample_volume(), &path, Stage::Convert).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        // Switch to an identity qform with an offset, and scale by 2.
        LittleEndian::write_i16(&mut bytes[252..254], 1);
        LittleEndian::write_i16(&mut bytes[254..256], 0);
        LittleEndian::write_f32(&mut bytes[268..272], 3.0);
        LittleEndian::write_f32(&mut bytes[272..276], 4.0);
        LittleEndian::write_f32(&mut bytes[276..280], 5.0);
        LittleEndian::write_f32(&mut bytes[112..116], 2.0);
        fs::write(&path, bytes).unwrap();

        let image = read(&path, Stage::Convert).unwrap();
        let grid = image.volume.grid();
        assert_eq!(grid.origin, DVec3::new(-3.0, -4.0, 5.0));
        assert_eq!(grid.spacing, DVec3::new(0.5, 0.75, 2.0));
        assert_eq!(grid.direction.col(0), DVec3::new(-1.0, 0.0, 0.0));
        assert_eq!(image.volume.data()[2], 4.0);
    }

    #[test]
    fn test_big_endian_header() {
        let mut bytes = vec![0_u8; DATA_OFFSET];
        BigEndian::write_i32(&mut bytes[0..4], 348);
        BigEndian::write_i16(&mut bytes[40..42], 3);
        for offset in [42, 44, 46] {
            BigEndian::write_i16(&mut bytes[offset..offset + 2], 1);
        }
        BigEndian::write_i16(&mut bytes[70..72], 4);
        BigEndian::write_f32(&mut bytes[108..112], 352.0);
        bytes[344..348].copy_from_slice(b"n+1\0");
        bytes.extend_from_slice(&[0xFF, 0xFE]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("be.nii");
        fs::write(&path, bytes).unwrap();
        let image = read(&path, Stage::Convert).unwrap();
        assert_eq!(image.kind, ScalarKind::I16);
        assert_eq!(image.volume.data(), &[-2.0]);
    }

    #[test]
    fn test_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.nii");
        fs::write(&path, vec![7_u8; 400]).unwrap();
        assert!(matches!(
            read(&path, Stage::Convert),
            Err(LabelMeshError::Parse { .. })
        ));

        fs::write(&path, [0x1f, 0x8b, 0, 0]).unwrap();
        let err = read(&path, Stage::Convert).unwrap_err();
        assert!(err.to_string().contains("gzip"), "{err}");
    }
}
