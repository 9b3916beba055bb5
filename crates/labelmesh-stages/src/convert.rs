//! Format conversion: label volume in, 16-bit MetaImage out.

use std::path::{Path, PathBuf};

use labelmesh_core::{LabelVolume, Result, Stage};

use crate::{ensure_output_dir, file_stem, output_path};

/// Loads the label volume at `input` and writes it as `<stem>.mha` into
/// `output_dir`.
///
/// Supported inputs are `.nii`, `.mha` and `.mhd`. Grid metadata is copied
/// unchanged. Returns the loaded labels together with the written path.
pub fn convert(input: &Path, output_dir: &Path) -> Result<(LabelVolume, PathBuf)> {
    ensure_output_dir(output_dir, Stage::Convert)?;
    let labels = labelmesh_io::read_label_volume(input, Stage::Convert)?;

    let output = output_path(output_dir, &file_stem(input), "", "mha");
    labelmesh_io::write_volume(&labels, &output, Stage::Convert)?;

    let [nx, ny, nz] = labels.dims();
    log::info!(
        "converted {} ({nx}x{ny}x{nz}) -> {}",
        input.display(),
        output.display()
    );
    if let Some((lo, hi)) = labels.range() {
        log::debug!("label range {lo}..={hi}");
    }
    Ok((labels, output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelmesh_core::{DMat3, DVec3, Grid, LabelMeshError, Volume};

    fn oblique_grid() -> Grid {
        Grid::new([3, 2, 2])
            .with_spacing(DVec3::new(0.7, 0.3, 1.1))
            .with_origin(DVec3::new(-12.5, 3.25, 0.1))
            .with_direction(DMat3::from_cols(DVec3::Y, -DVec3::X, DVec3::Z))
    }

    #[test]
    fn test_convert_preserves_grid_and_labels() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("labels.nii");
        let data: Vec<i16> = (0..12).map(|v| v % 4).collect();
        let source = Volume::new(oblique_grid(), data).unwrap();
        labelmesh_io::write_volume(&source, &input, Stage::Convert).unwrap();

        let out = tempfile::tempdir().unwrap();
        let (labels, path) = convert(&input, out.path()).unwrap();
        assert_eq!(path, out.path().join("labels.mha"));
        assert_eq!(labels.data(), &[0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3]);

        let written = labelmesh_io::read_label_volume(&path, Stage::Segment).unwrap();
        assert_eq!(written.grid(), labels.grid());
        assert_eq!(written.data(), labels.data());
        assert!((labels.grid().spacing - source.grid().spacing).abs().max_element() < 1e-6);
    }

    #[test]
    fn test_convert_failures() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.nii");
        assert!(matches!(
            convert(&missing, dir.path()),
            Err(LabelMeshError::Io { stage: Stage::Convert, .. })
        ));

        let input = dir.path().join("labels.mha");
        let source = Volume::new(Grid::new([2, 1, 1]), vec![1_u8, 2]).unwrap();
        labelmesh_io::write_volume(&source, &input, Stage::Convert).unwrap();
        assert!(matches!(
            convert(&input, &dir.path().join("no-such-dir")),
            Err(LabelMeshError::Write { stage: Stage::Convert, .. })
        ));
    }
}
