//! Integer-grid helpers shared by the patch generation stages: the
//! squared-distance neighbor shells, voxelization and 1-D fingerprints.

use fxhash::FxHashMap;
use nalgebra::Vector3;

use crate::GeometryCoord;

/// Neighbor shifts grouped by squared distance 1..=9.
///
/// Shell index `d` holds every integer offset at squared distance `d + 1`;
/// shell 6 (squared distance 7) is empty, no such integer offset exists.
pub(crate) static ADJACENT_SHELLS: [&[[i32; 3]]; 9] = [
    // squared distance 1
    &[
        [1, 0, 0],
        [-1, 0, 0],
        [0, 1, 0],
        [0, -1, 0],
        [0, 0, 1],
        [0, 0, -1],
    ],
    // squared distance 2
    &[
        [1, 1, 0],
        [1, -1, 0],
        [-1, 1, 0],
        [-1, -1, 0],
        [0, 1, 1],
        [0, 1, -1],
        [0, -1, 1],
        [0, -1, -1],
        [1, 0, 1],
        [-1, 0, 1],
        [1, 0, -1],
        [-1, 0, -1],
    ],
    // squared distance 3
    &[
        [1, 1, 1],
        [1, 1, -1],
        [1, -1, 1],
        [1, -1, -1],
        [-1, 1, 1],
        [-1, 1, -1],
        [-1, -1, 1],
        [-1, -1, -1],
    ],
    // squared distance 4
    &[
        [2, 0, 0],
        [-2, 0, 0],
        [0, 2, 0],
        [0, -2, 0],
        [0, 0, 2],
        [0, 0, -2],
    ],
    // squared distance 5
    &[
        [2, 1, 0],
        [2, -1, 0],
        [1, 2, 0],
        [1, -2, 0],
        [-1, 2, 0],
        [-1, -2, 0],
        [-2, 1, 0],
        [-2, -1, 0],
        [0, 2, 1],
        [0, 2, -1],
        [0, 1, 2],
        [0, 1, -2],
        [0, -1, 2],
        [0, -1, -2],
        [0, -2, 1],
        [0, -2, -1],
        [1, 0, 2],
        [-1, 0, 2],
        [2, 0, 1],
        [-2, 0, 1],
        [2, 0, -1],
        [-2, 0, -1],
        [1, 0, -2],
        [-1, 0, -2],
    ],
    // squared distance 6
    &[
        [2, 1, 1],
        [2, 1, -1],
        [2, -1, 1],
        [2, -1, -1],
        [1, 2, 1],
        [1, 2, -1],
        [1, 1, 2],
        [1, 1, -2],
        [1, -1, 2],
        [1, -1, -2],
        [1, -2, 1],
        [1, -2, -1],
        [-1, 2, 1],
        [-1, 2, -1],
        [-1, 1, 2],
        [-1, 1, -2],
        [-1, -1, 2],
        [-1, -1, -2],
        [-1, -2, 1],
        [-1, -2, -1],
        [-2, 1, 1],
        [-2, 1, -1],
        [-2, -1, 1],
        [-2, -1, -1],
    ],
    // squared distance 7 does not exist on an integer grid
    &[],
    // squared distance 8
    &[
        [2, 2, 0],
        [2, -2, 0],
        [-2, 2, 0],
        [-2, -2, 0],
        [0, 2, 2],
        [0, 2, -2],
        [0, -2, 2],
        [0, -2, -2],
        [2, 0, 2],
        [-2, 0, 2],
        [2, 0, -2],
        [-2, 0, -2],
    ],
    // squared distance 9
    &[
        [3, 0, 0],
        [-3, 0, 0],
        [0, 3, 0],
        [0, -3, 0],
        [0, 0, 3],
        [0, 0, -3],
        [2, 2, 1],
        [2, 2, -1],
        [2, 1, 2],
        [2, 1, -2],
        [2, -1, 2],
        [2, -1, -2],
        [2, -2, 1],
        [2, -2, -1],
        [1, 2, 2],
        [1, 2, -2],
        [1, -2, 2],
        [1, -2, -2],
        [-1, 2, 2],
        [-1, 2, -2],
        [-1, -2, 2],
        [-1, -2, -2],
        [-2, 2, 1],
        [-2, 2, -1],
        [-2, 1, 2],
        [-2, 1, -2],
        [-2, -1, 2],
        [-2, -1, -2],
        [-2, -2, 1],
        [-2, -2, -1],
    ],
];

/// 1-D fingerprint of a grid position: `x + (y << bits) + (z << 2*bits)`.
#[inline]
pub(crate) fn location_1d(point: &Vector3<GeometryCoord>, bits: usize) -> u64 {
    (point[0] as u64) + ((point[1] as u64) << bits) + ((point[2] as u64) << (2 * bits))
}

/// Apply an integer shift to a grid point, rejecting results outside
/// `0..=grid_max` on any axis.
#[inline]
pub(crate) fn shifted_point(
    point: &Vector3<GeometryCoord>,
    shift: &[i32; 3],
    grid_max: i32,
) -> Option<Vector3<GeometryCoord>> {
    let x = point[0] as i32 + shift[0];
    let y = point[1] as i32 + shift[1];
    let z = point[2] as i32 + shift[2];
    if x < 0 || y < 0 || z < 0 || x > grid_max || y > grid_max || z > grid_max {
        return None;
    }
    Some(Vector3::new(
        x as GeometryCoord,
        y as GeometryCoord,
        z as GeometryCoord,
    ))
}

/// Quantize `points` from `in_bits` to `out_bits` of per-axis resolution.
///
/// Returns the deduplicated voxel list in first-encountered order and, for
/// every input point, the index of its voxel.
pub(crate) fn voxelize(
    points: &[Vector3<GeometryCoord>],
    in_bits: usize,
    out_bits: usize,
) -> (Vec<Vector3<GeometryCoord>>, Vec<usize>) {
    debug_assert!(out_bits <= in_bits);
    log::trace!(target: "PATCH GENERATION",
        "voxelization from {in_bits} to {out_bits} bits of resolution");

    let shift = in_bits - out_bits;
    let approx_voxel_count = 1usize << (out_bits * 2).min(24);

    let mut voxels: Vec<Vector3<GeometryCoord>> = Vec::with_capacity(approx_voxel_count);
    let mut points_id_to_voxel_id = vec![0usize; points.len()];
    let mut coord_to_voxel: FxHashMap<u64, usize> = FxHashMap::default();
    coord_to_voxel.reserve(approx_voxel_count);

    for (point_index, point) in points.iter().enumerate() {
        let coord = Vector3::new(point[0] >> shift, point[1] >> shift, point[2] >> shift);
        let key = location_1d(&coord, out_bits);
        let next_index = voxels.len();
        let voxel_index = *coord_to_voxel.entry(key).or_insert(next_index);
        if voxel_index == next_index {
            voxels.push(coord);
        }
        points_id_to_voxel_id[point_index] = voxel_index;
    }

    (voxels, points_id_to_voxel_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shells_hold_their_squared_distance() {
        for (shell, shifts) in ADJACENT_SHELLS.iter().enumerate() {
            let expected = (shell + 1) as i32;
            for s in shifts.iter() {
                assert_eq!(s[0] * s[0] + s[1] * s[1] + s[2] * s[2], expected);
            }
        }
        assert!(ADJACENT_SHELLS[6].is_empty());
    }

    #[test]
    fn voxelize_identity_mapping_and_shift() {
        let points = vec![
            Vector3::new(0u16, 0, 0),
            Vector3::new(1, 1, 1),
            Vector3::new(2, 2, 2),
            Vector3::new(3, 3, 3),
        ];
        let (voxels, map) = voxelize(&points, 4, 3);
        assert_eq!(map.len(), points.len());
        for (i, point) in points.iter().enumerate() {
            let v = voxels[map[i]];
            assert_eq!(v[0], point[0] >> 1);
            assert_eq!(v[1], point[1] >> 1);
            assert_eq!(v[2], point[2] >> 1);
        }
        // (0,0,0)/(1,1,1) share a voxel, (2,2,2)/(3,3,3) share the next.
        assert_eq!(voxels.len(), 2);
        assert_eq!(map, vec![0, 0, 1, 1]);
    }

    #[test]
    fn voxelize_preserves_first_encounter_order() {
        let points = vec![
            Vector3::new(6u16, 0, 0),
            Vector3::new(0, 0, 0),
            Vector3::new(7, 1, 0),
        ];
        let (voxels, map) = voxelize(&points, 4, 3);
        assert_eq!(voxels[0], Vector3::new(3, 0, 0));
        assert_eq!(voxels[1], Vector3::new(0, 0, 0));
        assert_eq!(map, vec![0, 1, 0]);
    }

    #[test]
    fn shifted_point_bounds() {
        let p = Vector3::new(0u16, 5, 7);
        assert!(shifted_point(&p, &[-1, 0, 0], 7).is_none());
        assert!(shifted_point(&p, &[0, 0, 1], 7).is_none());
        assert_eq!(
            shifted_point(&p, &[1, -1, 0], 7),
            Some(Vector3::new(1, 4, 7))
        );
    }
}
