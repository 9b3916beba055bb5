//! Connected-component segmentation with size-based pruning.
//!
//! Components are maximal sets of equal, non-zero label voxels under full
//! 26-connectivity (faces, edges and corners). Labeling is the classic two-pass
//! scheme: the first pass assigns provisional ids in scan order and unions them
//! with already-visited neighbours, the second resolves every voxel to its root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use labelmesh_core::{
    Grid, LabelMeshError, LabelVolume, MaskVolume, Result, Stage, UnionFind, Volume,
};
use rayon::prelude::*;
use serde::Serialize;

use crate::{ensure_output_dir, output_path};

/// Neighbour offsets `(dk, dj, di)` that precede a voxel in scan order.
const PRIOR_NEIGHBORS: [(isize, isize, isize); 13] = [
    (-1, -1, -1),
    (-1, -1, 0),
    (-1, -1, 1),
    (-1, 0, -1),
    (-1, 0, 0),
    (-1, 0, 1),
    (-1, 1, -1),
    (-1, 1, 0),
    (-1, 1, 1),
    (0, -1, -1),
    (0, -1, 0),
    (0, -1, 1),
    (0, 0, -1),
];

const UNLABELED: u32 = u32::MAX;

/// A connected set of voxels sharing one label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    /// Label value of every voxel in the component.
    pub label: u16,
    /// 1-based position among the components of this label, in scan order.
    pub ordinal: usize,
    /// Number of voxels.
    pub voxel_count: usize,
    /// Smallest voxel index along each axis (inclusive).
    pub min: [usize; 3],
    /// Largest voxel index along each axis (inclusive).
    pub max: [usize; 3],
    /// Linear voxel indices, ascending.
    #[serde(skip)]
    pub voxels: Vec<usize>,
}

impl Component {
    /// Output name, `Component<label>_<ordinal>`.
    pub fn name(&self) -> String {
        format!("Component{}_{}", self.label, self.ordinal)
    }

    /// Binary mask of this component on `grid`.
    pub fn mask(&self, grid: &Grid) -> MaskVolume {
        let mut mask = Volume::filled(*grid, 0_u8);
        let data = mask.data_mut();
        for &v in &self.voxels {
            data[v] = 1;
        }
        mask
    }
}

/// Outcome of [`segment`].
#[derive(Debug, Clone, Default)]
pub struct Segmentation {
    /// Components with at least `component_size` voxels.
    pub retained: Vec<Component>,
    /// Components that were discarded.
    pub pruned: Vec<Component>,
}

/// Finds every connected component of every non-zero label.
///
/// Components are ordered by label, then by ordinal.
///
/// # Errors
/// [`LabelMeshError::IndexOverflow`] if the first pass needs more provisional
/// ids than fit in `u32`.
pub fn find_components(labels: &LabelVolume) -> Result<Vec<Component>> {
    let grid = labels.grid();
    let [nx, ny, nz] = grid.dims;
    let data = labels.data();

    let mut provisional = vec![UNLABELED; data.len()];
    let mut sets = UnionFind::new(0);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let index = grid.index(i, j, k);
                let label = data[index];
                if label == 0 {
                    continue;
                }
                let mut id = None;
                for &(dk, dj, di) in &PRIOR_NEIGHBORS {
                    let (Some(ni), Some(nj), Some(nk)) = (
                        offset(i, di, nx),
                        offset(j, dj, ny),
                        offset(k, dk, nz),
                    ) else {
                        continue;
                    };
                    let neighbor = grid.index(ni, nj, nk);
                    if data[neighbor] != label {
                        continue;
                    }
                    let other = provisional[neighbor] as usize;
                    id = Some(match id {
                        None => other,
                        Some(current) => sets.union(current, other),
                    });
                }
                let id = id.unwrap_or_else(|| sets.push());
                provisional[index] = provisional_id(id)?;
            }
        }
    }

    let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
    let mut per_label: HashMap<u16, usize> = HashMap::new();
    let mut components: Vec<Component> = Vec::new();
    for (index, &id) in provisional.iter().enumerate() {
        if id == UNLABELED {
            continue;
        }
        let root = sets.find(id as usize);
        let slot = *slot_of_root.entry(root).or_insert_with(|| {
            let label = data[index];
            let ordinal = per_label.entry(label).or_insert(0);
            *ordinal += 1;
            components.push(Component {
                label,
                ordinal: *ordinal,
                voxel_count: 0,
                min: [usize::MAX; 3],
                max: [0; 3],
                voxels: Vec::new(),
            });
            components.len() - 1
        });

        let coords = grid.coords(index);
        let component = &mut components[slot];
        component.voxel_count += 1;
        component.voxels.push(index);
        for axis in 0..3 {
            component.min[axis] = component.min[axis].min(coords[axis]);
            component.max[axis] = component.max[axis].max(coords[axis]);
        }
    }

    components.sort_by_key(|c| (c.label, c.ordinal));
    Ok(components)
}

/// Narrows a union-find id to the `u32` stored per voxel; `UNLABELED` is reserved.
fn provisional_id(id: usize) -> Result<u32> {
    u32::try_from(id)
        .ok()
        .filter(|&id| id != UNLABELED)
        .ok_or(LabelMeshError::IndexOverflow {
            stage: Some(Stage::Segment),
            count: id,
        })
}

fn offset(index: usize, delta: isize, len: usize) -> Option<usize> {
    index.checked_add_signed(delta).filter(|&v| v < len)
}

/// Labels the components of `labels` and discards those with fewer than
/// `component_size` voxels.
///
/// A component with exactly `component_size` voxels is kept, so a size of 0
/// keeps everything.
///
/// # Errors
/// [`LabelMeshError::EmptyResult`] when nothing is retained.
pub fn segment(labels: &LabelVolume, component_size: usize) -> Result<Segmentation> {
    let (retained, pruned): (Vec<_>, Vec<_>) = find_components(labels)?
        .into_iter()
        .partition(|c| c.voxel_count >= component_size);

    for c in &pruned {
        log::warn!(
            "pruning {} ({} voxels < component_size {component_size})",
            c.name(),
            c.voxel_count
        );
    }
    log::info!(
        "segmentation kept {} of {} components",
        retained.len(),
        retained.len() + pruned.len()
    );

    if retained.is_empty() {
        return Err(LabelMeshError::EmptyResult {
            stage: Stage::Segment,
            component_size,
        });
    }
    Ok(Segmentation { retained, pruned })
}

/// Writes one `Component<label>_<ordinal>.mha` mask per component.
///
/// Masks are built and written in parallel; paths come back in component order.
pub fn write_masks(
    grid: &Grid,
    components: &[Component],
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    ensure_output_dir(output_dir, Stage::Segment)?;
    components
        .par_iter()
        .map(|c| {
            let path = output_path(output_dir, &c.name(), "", "mha");
            labelmesh_io::write_volume(&c.mask(grid), &path, Stage::Segment)?;
            log::debug!("wrote {} ({} voxels)", path.display(), c.voxel_count);
            Ok(path)
        })
        .collect()
}

/// Reads a label volume, segments it and writes the retained masks.
pub fn segment_file(
    input: &Path,
    output_dir: &Path,
    component_size: usize,
) -> Result<Vec<PathBuf>> {
    ensure_output_dir(output_dir, Stage::Segment)?;
    let labels = labelmesh_io::read_label_volume(input, Stage::Segment)?;
    let segmentation = segment(&labels, component_size)?;
    write_masks(labels.grid(), &segmentation.retained, output_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(dims: [usize; 3], voxels: &[([usize; 3], u16)]) -> LabelVolume {
        let mut labels = Volume::filled(Grid::new(dims), 0_u16);
        for &([i, j, k], label) in voxels {
            labels.set(i, j, k, label);
        }
        labels
    }

    #[test]
    fn test_corner_contact_connects() {
        // Two voxels touching only at a corner form one component.
        let labels = volume([3, 3, 3], &[([0, 0, 0], 1), ([1, 1, 1], 1)]);
        let components = find_components(&labels).unwrap();
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].voxel_count, 2);
        assert_eq!(components[0].min, [0, 0, 0]);
        assert_eq!(components[0].max, [1, 1, 1]);
    }

    #[test]
    fn test_labels_do_not_merge() {
        let labels = volume([3, 1, 1], &[([0, 0, 0], 1), ([1, 0, 0], 2), ([2, 0, 0], 1)]);
        let components = find_components(&labels).unwrap();
        let summary: Vec<_> = components
            .iter()
            .map(|c| (c.label, c.ordinal, c.voxel_count))
            .collect();
        assert_eq!(summary, vec![(1, 1, 1), (1, 2, 1), (2, 1, 1)]);
    }

    #[test]
    fn test_u_shape_merges_late() {
        // Two arms that only join in the last row need a union across provisional ids.
        let mut voxels = Vec::new();
        for j in 0..4 {
            voxels.push(([0, j, 0], 5));
            voxels.push(([4, j, 0], 5));
        }
        for i in 0..5 {
            voxels.push(([i, 4, 0], 5));
        }
        let labels = volume([5, 5, 1], &voxels);
        let components = find_components(&labels).unwrap();
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].voxel_count, 13);
        assert_eq!(components[0].name(), "Component5_1");
    }

    #[test]
    fn test_pruning_threshold_is_inclusive() {
        let mut voxels: Vec<_> = (0..4).map(|i| ([i, 0, 0], 1)).collect();
        voxels.extend((0..3).map(|i| ([i, 2, 0], 2)));
        let labels = volume([4, 3, 1], &voxels);

        let seg = segment(&labels, 4).unwrap();
        assert_eq!(seg.retained.len(), 1);
        assert_eq!(seg.retained[0].label, 1);
        assert_eq!(seg.pruned.len(), 1);
        assert_eq!(seg.pruned[0].label, 2);

        let seg = segment(&labels, 0).unwrap();
        assert_eq!(seg.retained.len(), 2);
        assert!(seg.pruned.is_empty());
    }

    #[test]
    fn test_provisional_ids_stop_below_the_sentinel() {
        assert_eq!(provisional_id(7).unwrap(), 7);
        assert_eq!(provisional_id(u32::MAX as usize - 1).unwrap(), u32::MAX - 1);
        match provisional_id(u32::MAX as usize) {
            Err(err @ LabelMeshError::IndexOverflow { .. }) => {
                assert_eq!(err.stage(), Some(Stage::Segment));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_empty_result() {
        let labels = volume([4, 4, 4], &[]);
        assert!(matches!(
            segment(&labels, 0),
            Err(LabelMeshError::EmptyResult { stage: Stage::Segment, .. })
        ));

        let labels = volume([4, 4, 4], &[([1, 1, 1], 3)]);
        match segment(&labels, 2) {
            Err(LabelMeshError::EmptyResult { component_size, .. }) => {
                assert_eq!(component_size, 2);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_write_masks() {
        let labels = volume([3, 3, 1], &[([0, 0, 0], 7), ([2, 2, 0], 7), ([1, 0, 0], 9)]);
        let seg = segment(&labels, 0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let paths = write_masks(labels.grid(), &seg.retained, dir.path()).unwrap();

        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["Component7_1.mha", "Component7_2.mha", "Component9_1.mha"]
        );

        let mask = labelmesh_io::read_label_volume(&paths[1], Stage::Filter).unwrap();
        assert_eq!(mask.grid(), labels.grid());
        assert_eq!(mask.data().iter().filter(|&&v| v == 1).count(), 1);
        assert_eq!(mask.get(2, 2, 0), 1);
    }
}
