//! MetaImage (`.mha` / `.mhd`) reader and writer.
//!
//! Only uncompressed, single-channel, three-dimensional images are supported.
//! Floating-point header fields are written with Rust's shortest round-trip
//! formatting, so grid geometry survives a write/read cycle bit-for-bit.
//!
//! `TransformMatrix` lists the direction of the first axis, then the second, then
//! the third (the columns of [`Grid::direction`]).

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, LittleEndian};
use glam::{DMat3, DVec3};
use labelmesh_core::{Grid, LabelMeshError, Result, Stage, Volume};

use crate::element::{encode_le, Element, ScalarKind};
use crate::Image;

#[derive(Debug, Default)]
struct Header {
    ndims: Option<usize>,
    dims: Option<[usize; 3]>,
    spacing: Option<DVec3>,
    origin: Option<DVec3>,
    direction: Option<DMat3>,
    big_endian: bool,
    kind: Option<ScalarKind>,
    header_size: Option<i64>,
    data_file: Option<String>,
}

/// Reads a MetaImage file.
pub fn read(path: &Path, stage: Stage) -> Result<Image> {
    let bytes = fs::read(path).map_err(|source| LabelMeshError::Io {
        stage,
        path: path.to_path_buf(),
        source,
    })?;
    let fail = |reason: String| LabelMeshError::parse(stage, path, reason);

    let (header, data_start) = parse_header(&bytes).map_err(&fail)?;
    if let Some(n) = header.ndims {
        if n != 3 {
            return Err(fail(format!("only 3D images are supported, NDims = {n}")));
        }
    }
    let dims = header.dims.ok_or_else(|| fail("missing DimSize".into()))?;
    let kind = header.kind.ok_or_else(|| fail("missing ElementType".into()))?;
    let data_file = header
        .data_file
        .as_deref()
        .ok_or_else(|| fail("missing ElementDataFile".into()))?;

    let grid = Grid::new(dims)
        .with_spacing(header.spacing.unwrap_or(DVec3::ONE))
        .with_origin(header.origin.unwrap_or(DVec3::ZERO))
        .with_direction(header.direction.unwrap_or(DMat3::IDENTITY));
    let data_len = grid
        .checked_num_voxels()
        .and_then(|count| count.checked_mul(kind.size()))
        .ok_or_else(|| {
            fail(format!(
                "DimSize {} {} {} is too large",
                dims[0], dims[1], dims[2]
            ))
        })?;
    let count = data_len / kind.size();

    let detached;
    let payload: &[u8] = if data_file.eq_ignore_ascii_case("LOCAL") {
        &bytes[data_start..]
    } else {
        let data_path = detached_path(path, data_file);
        detached = fs::read(&data_path).map_err(|source| LabelMeshError::Io {
            stage,
            path: data_path.clone(),
            source,
        })?;
        match header.header_size {
            Some(-1) => &detached[detached.len().saturating_sub(data_len)..],
            Some(skip) => {
                let skip = usize::try_from(skip)
                    .map_err(|_| fail(format!("invalid HeaderSize {skip}")))?;
                detached.get(skip..).unwrap_or(&[])
            }
            None => &detached[..],
        }
    };

    let values = if header.big_endian {
        kind.decode::<BigEndian>(payload, count)
    } else {
        kind.decode::<LittleEndian>(payload, count)
    }
    .ok_or_else(|| {
        fail(format!(
            "expected {data_len} bytes of voxel data, found {}",
            payload.len()
        ))
    })?;

    log::debug!(
        "read {} ({}x{}x{} {})",
        path.display(),
        dims[0],
        dims[1],
        dims[2],
        kind.met_name()
    );
    Ok(Image {
        volume: Volume::new(grid, values).map_err(|e| e.in_stage(stage, Some(path)))?,
        kind,
    })
}

/// Writes a volume as MetaImage.
///
/// A `.mhd` path gets its voxels in a sibling `.raw` file; any other extension
/// stores them inline after the header.
pub fn write<T: Element>(volume: &Volume<T>, path: &Path, stage: Stage) -> Result<()> {
    let detached = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mhd"));
    let raw_path = path.with_extension("raw");
    let data_file = if detached {
        raw_path
            .file_name()
            .map_or_else(|| "LOCAL".to_string(), |n| n.to_string_lossy().into_owned())
    } else {
        "LOCAL".to_string()
    };

    let mut bytes = header_text(volume.grid(), T::KIND, &data_file).into_bytes();
    let data = encode_le(volume.data());
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| LabelMeshError::Write {
            stage,
            path,
            source,
        }
    };
    if detached {
        fs::write(&raw_path, data).map_err(write_err(&raw_path))?;
    } else {
        bytes.extend_from_slice(&data);
    }
    fs::write(path, bytes).map_err(write_err(path))?;
    log::debug!("wrote {}", path.display());
    Ok(())
}

fn header_text(grid: &Grid, kind: ScalarKind, data_file: &str) -> String {
    let d = grid.direction;
    let mut text = String::new();
    // Writing into a String cannot fail.
    let _ = write!(
        text,
        "ObjectType = Image\n\
         NDims = 3\n\
         BinaryData = True\n\
         BinaryDataByteOrderMSB = False\n\
         CompressedData = False\n\
         TransformMatrix = {} {} {} {} {} {} {} {} {}\n\
         Offset = {} {} {}\n\
         CenterOfRotation = 0 0 0\n\
         AnatomicalOrientation = RAI\n\
         ElementSpacing = {} {} {}\n\
         DimSize = {} {} {}\n\
         ElementType = {}\n\
         ElementDataFile = {}\n",
        d.x_axis.x,
        d.x_axis.y,
        d.x_axis.z,
        d.y_axis.x,
        d.y_axis.y,
        d.y_axis.z,
        d.z_axis.x,
        d.z_axis.y,
        d.z_axis.z,
        grid.origin.x,
        grid.origin.y,
        grid.origin.z,
        grid.spacing.x,
        grid.spacing.y,
        grid.spacing.z,
        grid.dims[0],
        grid.dims[1],
        grid.dims[2],
        kind.met_name(),
        data_file,
    );
    text
}

fn detached_path(header_path: &Path, data_file: &str) -> PathBuf {
    let data_file = Path::new(data_file);
    if data_file.is_absolute() {
        data_file.to_path_buf()
    } else {
        header_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(data_file)
    }
}

/// Parses `Key = Value` lines up to and including `ElementDataFile`.
///
/// Returns the header and the byte offset where inline data starts.
fn parse_header(bytes: &[u8]) -> std::result::Result<(Header, usize), String> {
    let mut header = Header::default();
    let mut pos = 0;
    while pos < bytes.len() {
        let end = bytes[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(bytes.len(), |i| pos + i);
        let line = std::str::from_utf8(&bytes[pos..end])
            .map_err(|_| format!("header line at byte {pos} is not text"))?
            .trim();
        pos = (end + 1).min(bytes.len());
        if line.is_empty() {
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("malformed header line '{line}'"))?;
        let (key, value) = (key.trim(), value.trim());
        match key {
            "NDims" => header.ndims = Some(parse_one(key, value)?),
            "DimSize" => {
                let [x, y, z] = parse_n::<usize, 3>(key, value)?;
                header.dims = Some([x, y, z]);
            }
            "ElementSpacing" => {
                header.spacing = Some(DVec3::from_array(parse_n(key, value)?));
            }
            "Offset" | "Origin" | "Position" => {
                header.origin = Some(DVec3::from_array(parse_n(key, value)?));
            }
            "TransformMatrix" | "Rotation" | "Orientation" => {
                let m: [f64; 9] = parse_n(key, value)?;
                header.direction = Some(DMat3::from_cols_array(&m));
            }
            "BinaryDataByteOrderMSB" | "ElementByteOrderMSB" => {
                header.big_endian = parse_bool(key, value)?;
            }
            "CompressedData" => {
                if parse_bool(key, value)? {
                    return Err("compressed data is not supported".into());
                }
            }
            "BinaryData" => {
                if !parse_bool(key, value)? {
                    return Err("ASCII voxel data is not supported".into());
                }
            }
            "ElementNumberOfChannels" => {
                let channels: usize = parse_one(key, value)?;
                if channels != 1 {
                    return Err(format!("expected 1 channel, found {channels}"));
                }
            }
            "ElementType" => {
                header.kind = Some(
                    ScalarKind::from_met_name(value)
                        .ok_or_else(|| format!("unsupported ElementType '{value}'"))?,
                );
            }
            "HeaderSize" => header.header_size = Some(parse_one(key, value)?),
            "ElementDataFile" => {
                header.data_file = Some(value.to_string());
                return Ok((header, pos));
            }
            _ => log::trace!("ignoring MetaImage key '{key}'"),
        }
    }
    Err("header ended without ElementDataFile".into())
}

fn parse_one<T: std::str::FromStr>(key: &str, value: &str) -> std::result::Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid {key} value '{value}'"))
}

fn parse_n<T: std::str::FromStr + Copy + Default, const N: usize>(
    key: &str,
    value: &str,
) -> std::result::Result<[T; N], String> {
    let mut out = [T::default(); N];
    let mut parts = value.split_whitespace();
    for slot in &mut out {
        let part = parts
            .next()
            .ok_or_else(|| format!("{key} needs {N} values, got '{value}'"))?;
        *slot = parse_one(key, part)?;
    }
    if parts.next().is_some() {
        return Err(format!("{key} needs {N} values, got '{value}'"));
    }
    Ok(out)
}

fn parse_bool(key: &str, value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(format!("invalid {key} value '{value}'")),
    }
}
