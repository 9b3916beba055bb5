//! Marching cubes iso-surface extraction on a regular grid.
//!
//! Works in index space on an x-fastest scalar buffer. Vertices on cube edges are
//! shared between neighbouring cells through a two-slab index cache, so the output
//! is an indexed mesh without duplicate edge vertices.

#![allow(
    clippy::unreadable_literal,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]

use glam::DVec3;

use crate::error::{LabelMeshError, Result};
use crate::mesh::{index_u32, TriMesh};

/// Cube edges in table order: `(corner a, corner b, axis, origin offset)`.
///
/// Corner `c` sits at offset `(c & 1, (c >> 1) & 1, (c >> 2) & 1)` from the cell.
const CELL_EDGES: [(usize, usize, usize, [usize; 3]); 12] = [
    (0, 1, 0, [0, 0, 0]),
    (2, 3, 0, [0, 1, 0]),
    (4, 5, 0, [0, 0, 1]),
    (6, 7, 0, [0, 1, 1]),
    (0, 2, 1, [0, 0, 0]),
    (1, 3, 1, [1, 0, 0]),
    (4, 6, 1, [0, 0, 1]),
    (5, 7, 1, [1, 0, 1]),
    (0, 4, 2, [0, 0, 0]),
    (1, 5, 2, [1, 0, 0]),
    (2, 6, 2, [0, 1, 0]),
    (3, 7, 2, [1, 1, 0]),
];

/// Extracts the `isoval` level set of `field`.
///
/// Grid points with `field >= isoval` count as inside. The returned vertices are
/// in grid-index space; map them with [`crate::Grid::index_to_world`]. Triangle
/// winding is consistent within each surface but its sign is not normalized, see
/// [`crate::topology::orient_outward`].
///
/// # Errors
/// Returns [`LabelMeshError::ShapeMismatch`] if `field` does not hold
/// `nx * ny * nz` values, [`LabelMeshError::InputValidation`] if any dimension
/// is below 2 and [`LabelMeshError::IndexOverflow`] if the surface needs more
/// vertices than `u32` indices can address.
pub fn marching_cubes(field: &[f32], isoval: f32, dims: [usize; 3]) -> Result<TriMesh> {
    let [nx, ny, nz] = dims;
    if field.len() != nx * ny * nz {
        return Err(LabelMeshError::ShapeMismatch {
            stage: None,
            path: None,
            expected: nx * ny * nz,
            actual: field.len(),
        });
    }
    if dims.iter().any(|&n| n < 2) {
        return Err(LabelMeshError::invalid(
            "dims",
            format!("every dimension must be >= 2, got {nx}x{ny}x{nz}"),
        ));
    }

    // Vertex index per edge axis at each (x, y); z alternates between two slabs.
    let slab_index = |i: usize, j: usize, k: usize| nx * ny * (k % 2) + j * nx + i;
    let mut slab = vec![[0_u32; 3]; nx * ny * 2];

    let mut mesh = TriMesh::default();
    let mut values = [0.0_f32; 8];
    let mut edge_vertex = [0_u32; 12];

    for z in 0..nz - 1 {
        for y in 0..ny - 1 {
            for x in 0..nx - 1 {
                let mut config = 0_usize;
                for (c, value) in values.iter_mut().enumerate() {
                    let (dx, dy, dz) = (c & 1, (c >> 1) & 1, (c >> 2) & 1);
                    *value = field[((z + dz) * ny + y + dy) * nx + x + dx] - isoval;
                    if *value >= 0.0 {
                        config |= 1 << c;
                    }
                }
                if config == 0 || config == 255 {
                    continue;
                }

                let cell = [x, y, z];
                for (e, &(a, b, axis, offset)) in CELL_EDGES.iter().enumerate() {
                    let origin = [cell[0] + offset[0], cell[1] + offset[1], cell[2] + offset[2]];
                    let slot = slab_index(origin[0], origin[1], origin[2]);
                    // Edges on the low faces were already visited by an earlier cell.
                    let owned = (0..3).all(|p| p == axis || offset[p] == 1 || cell[p] == 0);
                    if owned && (values[a] >= 0.0) != (values[b] >= 0.0) {
                        let (va, vb) = (f64::from(values[a]), f64::from(values[b]));
                        let mut v =
                            DVec3::new(origin[0] as f64, origin[1] as f64, origin[2] as f64);
                        v[axis] += va / (va - vb);
                        slab[slot][axis] = index_u32(mesh.vertices.len())?;
                        mesh.vertices.push(v);
                    }
                    edge_vertex[e] = slab[slot][axis];
                }

                let entry = MC_TRIS[config];
                let count = (entry & 0xF) as usize;
                let edge = |n: usize| ((entry >> (4 + 4 * n)) & 0xF) as usize;
                for t in 0..count {
                    mesh.triangles.push([
                        edge_vertex[edge(3 * t)],
                        edge_vertex[edge(3 * t + 1)],
                        edge_vertex[edge(3 * t + 2)],
                    ]);
                }
            }
        }
    }

    Ok(mesh)
}

/// Triangle configurations, one per corner sign pattern.
///
/// Each entry packs the triangle count in bits `[3:0]` followed by 4-bit edge
/// indices (into [`CELL_EDGES`]), three per triangle.
#[rustfmt::skip]
static MC_TRIS: [u64; 256] = [
    0, 33793, 36945, 159668546,
    18961, 144771090, 5851666, 595283255635,
    20913, 67640146, 193993474, 655980856339,
    88782242, 736732689667, 797430812739, 194554754,
    26657, 104867330, 136709522, 298069416227,
    109224258, 8877909667, 318136408323, 1567994331701604,
    189884450, 350847647843, 559958167731, 3256298596865604,
    447393122899, 651646838401572, 2538311371089956, 737032694307,
    29329, 43484162, 91358498, 374810899075,
    158485010, 178117478419, 88675058979, 433581536604804,
    158486962, 649105605635, 4866906995, 3220959471609924,
    649165714851, 3184943915608436, 570691368417972, 595804498035,
    124295042, 431498018963, 508238522371, 91518530,
    318240155763, 291789778348404, 1830001131721892, 375363605923,
    777781811075, 1136111028516116, 3097834205243396, 508001629971,
    2663607373704004, 680242583802939237, 333380770766129845, 179746658,
    42545, 138437538, 93365810, 713842853011,
    73602098, 69575510115, 23964357683, 868078761575828,
    28681778, 713778574611, 250912709379, 2323825233181284,
    302080811955, 3184439127991172, 1694042660682596, 796909779811,
    176306722, 150327278147, 619854856867, 1005252473234484,
    211025400963, 36712706, 360743481544788, 150627258963,
    117482600995, 1024968212107700, 2535169275963444, 4734473194086550421,
    628107696687956, 9399128243, 5198438490361643573, 194220594,
    104474994, 566996932387, 427920028243, 2014821863433780,
    492093858627, 147361150235284, 2005882975110676, 9671606099636618005,
    777701008947, 3185463219618820, 482784926917540, 2900953068249785909,
    1754182023747364, 4274848857537943333, 13198752741767688709, 2015093490989156,
    591272318771, 2659758091419812, 1531044293118596, 298306479155,
    408509245114388, 210504348563, 9248164405801223541, 91321106,
    2660352816454484, 680170263324308757, 8333659837799955077, 482966828984116,
    4274926723105633605, 3184439197724820, 192104450, 15217,
    45937, 129205250, 129208402, 529245952323,
    169097138, 770695537027, 382310500883, 2838550742137652,
    122763026, 277045793139, 81608128403, 1991870397907988,
    362778151475, 2059003085103236, 2132572377842852, 655681091891,
    58419234, 239280858627, 529092143139, 1568257451898804,
    447235128115, 679678845236084, 2167161349491220, 1554184567314086709,
    165479003923, 1428768988226596, 977710670185060, 10550024711307499077,
    1305410032576132, 11779770265620358997, 333446212255967269, 978168444447012,
    162736434, 35596216627, 138295313843, 891861543990356,
    692616541075, 3151866750863876, 100103641866564, 6572336607016932133,
    215036012883, 726936420696196, 52433666, 82160664963,
    2588613720361524, 5802089162353039525, 214799000387, 144876322,
    668013605731, 110616894681956, 1601657732871812, 430945547955,
    3156382366321172, 7644494644932993285, 3928124806469601813, 3155990846772900,
    339991010498708, 10743689387941597493, 5103845475, 105070898,
    3928064910068824213, 156265010, 1305138421793636, 27185,
    195459938, 567044449971, 382447549283, 2175279159592324,
    443529919251, 195059004769796, 2165424908404116, 1554158691063110021,
    504228368803, 1436350466655236, 27584723588724, 1900945754488837749,
    122971970, 443829749251, 302601798803, 108558722,
    724700725875, 43570095105972, 2295263717447940, 2860446751369014181,
    2165106202149444, 69275726195, 2860543885641537797, 2165106320445780,
    2280890014640004, 11820349930268368933, 8721082628082003989, 127050770,
    503707084675, 122834978, 2538193642857604, 10129,
    801441490467, 2923200302876740, 1443359556281892, 2901063790822564949,
    2728339631923524, 7103874718248233397, 12775311047932294245, 95520290,
    2623783208098404, 1900908618382410757, 137742672547, 2323440239468964,
    362478212387, 727199575803140, 73425410, 34337,
    163101314, 668566030659, 801204361987, 73030562,
    591509145619, 162574594, 100608342969108, 5553,
    724147968595, 1436604830452292, 176259090, 42001,
    143955266, 2385, 18433, 0,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::is_watertight;

    fn ball(n: usize, radius: f64) -> Vec<f32> {
        let center = DVec3::splat((n - 1) as f64 / 2.0);
        let mut field = Vec::with_capacity(n * n * n);
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    let p = DVec3::new(i as f64, j as f64, k as f64);
                    field.push((radius - p.distance(center)) as f32);
                }
            }
        }
        field
    }

    #[test]
    fn test_all_inside_or_outside() {
        let mesh = marching_cubes(&[1.0; 27], 0.0, [3, 3, 3]).unwrap();
        assert!(mesh.is_empty());
        let mesh = marching_cubes(&[-1.0; 27], 0.0, [3, 3, 3]).unwrap();
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_single_corner_gives_one_triangle() {
        let mut field = vec![0.0_f32; 8];
        field[0] = 1.0;
        let mesh = marching_cubes(&field, 0.5, [2, 2, 2]).unwrap();
        assert_eq!(mesh.num_triangles(), 1);
        assert_eq!(mesh.num_vertices(), 3);
        for v in &mesh.vertices {
            assert!((v.length() - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_value_on_contour_counts_as_inside() {
        let mut field = vec![0.0_f32; 8];
        field[7] = 0.5;
        let mesh = marching_cubes(&field, 0.5, [2, 2, 2]).unwrap();
        assert_eq!(mesh.num_triangles(), 1);
    }

    #[test]
    fn test_ball_is_closed() {
        let n = 20;
        let radius = 6.0;
        let mesh = marching_cubes(&ball(n, radius), 0.0, [n, n, n]).unwrap();
        assert!(mesh.num_triangles() > 100);
        assert!(mesh.validate().is_ok());
        assert!(is_watertight(&mesh));

        let center = DVec3::splat((n - 1) as f64 / 2.0);
        for v in &mesh.vertices {
            assert!((v.distance(center) - radius).abs() < 0.5);
        }
        let expected = 4.0 / 3.0 * std::f64::consts::PI * radius.powi(3);
        let volume = mesh.signed_volume().abs();
        assert!((volume - expected).abs() / expected < 0.1);
    }

    #[test]
    fn test_edge_vertices_are_shared() {
        let n = 12;
        let mesh = marching_cubes(&ball(n, 3.5), 0.0, [n, n, n]).unwrap();
        let mut positions: Vec<[u64; 3]> = mesh
            .vertices
            .iter()
            .map(|v| [v.x.to_bits(), v.y.to_bits(), v.z.to_bits()])
            .collect();
        positions.sort_unstable();
        positions.dedup();
        assert_eq!(positions.len(), mesh.num_vertices());
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(matches!(
            marching_cubes(&[0.0; 10], 0.0, [3, 3, 3]),
            Err(LabelMeshError::ShapeMismatch {
                stage: None,
                expected: 27,
                actual: 10,
                ..
            })
        ));
        assert!(matches!(
            marching_cubes(&[0.0; 1], 0.0, [1, 1, 1]),
            Err(LabelMeshError::InputValidation { .. })
        ));
    }
}
