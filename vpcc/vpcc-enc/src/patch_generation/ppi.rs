//! Projection plane index assignment: per-point argmax over the six plane
//! normals, then an iterative grid-based smoothing pass.

use fxhash::FxHashMap;
use nalgebra::Vector3;

use crate::patch_generation::grid::{location_1d, shifted_point, ADJACENT_SHELLS};
use crate::{projection_plane_normal, GeometryCoord, PROJECTION_PLANE_COUNT};

/// Tuning of the refine pass. The slicing path runs the same pass with its
/// own values, so this is split out of the global parameter table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RefineSegmentationConfig {
    /// Bit depth of the incoming (possibly voxelized) geometry.
    pub point_bits: usize,
    /// Super-voxel grid bit depth.
    pub grid_bits: usize,
    /// Neighbor search bound, a shell index into the distance LUT.
    pub max_nn_voxel_distance_lut: usize,
    /// Stop collecting neighbors once this many points were seen.
    pub max_nn_total_point_count: usize,
    pub lambda: f64,
    pub iteration_count: usize,
}

/// Classification of a filled super-voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VoxClass {
    /// Uniform PPI inside and across all neighbors; skipped by refinement.
    NoEdge,
    /// Uniform inside but disagreeing with the neighborhood consensus.
    IndirectEdge,
    /// A single point.
    SDirectEdge,
    /// Multiple points with differing PPIs.
    MDirectEdge,
}

struct VoxelAttribute {
    update_flag: bool,
    class: VoxClass,
    ppi: usize,
    /// Histogram of the PPIs of the points inside.
    score: [usize; PROJECTION_PLANE_COUNT],
}

impl VoxelAttribute {
    fn new() -> Self {
        Self {
            update_flag: false,
            class: VoxClass::NoEdge,
            ppi: 0,
            score: [0; PROJECTION_PLANE_COUNT],
        }
    }
}

/// Assign every point the plane whose normal best matches its own,
/// lowest index winning ties.
pub(crate) fn initial_segmentation(normals: &[Vector3<f64>], ppis: &mut [usize]) {
    for (index, normal) in normals.iter().enumerate() {
        let mut best = 0;
        let mut best_score = normal.dot(&projection_plane_normal(0));
        for ppi in 1..PROJECTION_PLANE_COUNT {
            let score = normal.dot(&projection_plane_normal(ppi));
            if score > best_score {
                best_score = score;
                best = ppi;
            }
        }
        ppis[index] = best;
    }
}

fn update_voxel_attribute(attr: &mut VoxelAttribute, vox_points: &[usize], ppis: &[usize]) {
    if attr.class == VoxClass::SDirectEdge {
        attr.ppi = ppis[vox_points[0]];
        attr.score[attr.ppi] = 1;
        return;
    }

    for &point_index in vox_points {
        attr.score[ppis[point_index]] += 1;
    }

    if attr.score[ppis[vox_points[0]]] == vox_points.len() {
        // Uniform PPI distribution inside the voxel.
        attr.class = VoxClass::NoEdge;
        attr.ppi = ppis[vox_points[0]];
        return;
    }

    attr.class = VoxClass::MDirectEdge;
    attr.ppi = argmax(&attr.score);
}

fn argmax(values: &[usize; PROJECTION_PLANE_COUNT]) -> usize {
    let mut best = 0;
    for k in 1..PROJECTION_PLANE_COUNT {
        if values[k] > values[best] {
            best = k;
        }
    }
    best
}

/// Sum the PPI histograms of all voxels in the adjacency list.
fn compute_extended_score(
    adj_list: &[usize],
    attrs: &[VoxelAttribute],
) -> [usize; PROJECTION_PLANE_COUNT] {
    let mut extended = [0usize; PROJECTION_PLANE_COUNT];
    for &voxel_index in adj_list {
        for k in 0..PROJECTION_PLANE_COUNT {
            extended[k] += attrs[voxel_index].score[k];
        }
    }
    extended
}

/// Close-range neighbors disagreeing with the neighborhood consensus
/// become indirect edges and take part in later rounds.
fn update_adjacent_classes(
    attrs: &mut [VoxelAttribute],
    extended: &[usize; PROJECTION_PLANE_COUNT],
    idev_list: &[usize],
) {
    let consensus = argmax(extended);
    for &voxel_index in idev_list {
        let attr = &mut attrs[voxel_index];
        if attr.class == VoxClass::NoEdge && attr.ppi != consensus {
            attr.class = VoxClass::IndirectEdge;
        }
    }
}

/// A voxel is (newly) no-edge when its whole neighborhood carries exactly
/// one PPI and it is the voxel's own.
fn check_no_edge(
    class: VoxClass,
    ppi: usize,
    extended: &[usize; PROJECTION_PLANE_COUNT],
) -> bool {
    if class == VoxClass::MDirectEdge {
        return false;
    }
    let represented = extended.iter().filter(|&&s| s != 0).count();
    if represented != 1 {
        return false;
    }
    extended[ppi] != 0
}

fn refine_point_ppis(
    ppis: &mut [usize],
    vox_points: &[usize],
    weight: f64,
    extended: &[usize; PROJECTION_PLANE_COUNT],
    normals: &[Vector3<f64>],
) {
    let mut weighted = [0.0f64; PROJECTION_PLANE_COUNT];
    for k in 0..PROJECTION_PLANE_COUNT {
        weighted[k] = weight * extended[k] as f64;
    }

    for &point_index in vox_points {
        let normal = &normals[point_index];
        let mut best = 0;
        let mut best_score = weighted[0] + normal.dot(&projection_plane_normal(0));
        for k in 1..PROJECTION_PLANE_COUNT {
            let score = weighted[k] + normal.dot(&projection_plane_normal(k));
            if score > best_score {
                best_score = score;
                best = k;
            }
        }
        ppis[point_index] = best;
    }
}

/// Smooth the PPI field over `iteration_count` rounds of a super-voxel
/// grid at `cfg.grid_bits` of resolution.
pub(crate) fn refine_segmentation(
    points: &[Vector3<GeometryCoord>],
    normals: &[Vector3<f64>],
    ppis: &mut [usize],
    cfg: &RefineSegmentationConfig,
) {
    if points.is_empty() {
        return;
    }
    let shift = cfg.point_bits - cfg.grid_bits;
    let grid_max = (1i32 << cfg.grid_bits) - 1;

    // Super-voxelization in first-encountered order.
    let estimated = 3 * (points.len() >> (shift * 3)).max(1);
    let mut voxel_map: FxHashMap<u64, usize> = FxHashMap::default();
    voxel_map.reserve(estimated);
    let mut voxel_coords: Vec<Vector3<GeometryCoord>> = Vec::with_capacity(estimated);
    let mut vox_points: Vec<Vec<usize>> = Vec::with_capacity(estimated);

    for (point_index, point) in points.iter().enumerate() {
        let coord = Vector3::new(point[0] >> shift, point[1] >> shift, point[2] >> shift);
        let key = location_1d(&coord, cfg.grid_bits);
        let next_index = voxel_coords.len();
        let voxel_index = *voxel_map.entry(key).or_insert(next_index);
        if voxel_index == next_index {
            voxel_coords.push(coord);
            vox_points.push(Vec::with_capacity(4));
        }
        vox_points[voxel_index].push(point_index);
    }

    let voxel_count = voxel_coords.len();
    let mut attrs: Vec<VoxelAttribute> = Vec::with_capacity(voxel_count);
    let mut adj_lists: Vec<Vec<usize>> = vec![Vec::new(); voxel_count];
    // Short-range subset of the adjacency (shells 0..=3), the voxels whose
    // class an extended-score consensus may flip.
    let mut idev_lists: Vec<Vec<usize>> = vec![Vec::new(); voxel_count];
    let mut weights: Vec<f64> = vec![0.0; voxel_count];

    const IDEV_RANGE: usize = 3;
    for voxel_index in 0..voxel_count {
        let mut attr = VoxelAttribute::new();
        if vox_points[voxel_index].len() == 1 {
            attr.class = VoxClass::SDirectEdge;
        }
        update_voxel_attribute(&mut attr, &vox_points[voxel_index], ppis);
        attrs.push(attr);

        let mut nn_points = 0usize;
        'shells: for (shell, shifts) in ADJACENT_SHELLS
            .iter()
            .enumerate()
            .take(cfg.max_nn_voxel_distance_lut)
        {
            for s in shifts.iter() {
                let Some(adj) = shifted_point(&voxel_coords[voxel_index], s, grid_max) else {
                    continue;
                };
                let key = location_1d(&adj, cfg.grid_bits);
                if let Some(&neighbor_index) = voxel_map.get(&key) {
                    adj_lists[voxel_index].push(neighbor_index);
                    if shell <= IDEV_RANGE {
                        idev_lists[voxel_index].push(neighbor_index);
                    }
                    nn_points += vox_points[neighbor_index].len();
                    if nn_points >= cfg.max_nn_total_point_count {
                        break 'shells;
                    }
                }
            }
        }
        weights[voxel_index] = cfg.lambda / nn_points as f64;
    }

    for _ in 0..cfg.iteration_count {
        for voxel_index in 0..voxel_count {
            let class = attrs[voxel_index].class;
            if class == VoxClass::NoEdge {
                continue;
            }

            let extended = compute_extended_score(&adj_lists[voxel_index], &attrs);
            update_adjacent_classes(&mut attrs, &extended, &idev_lists[voxel_index]);
            if check_no_edge(class, attrs[voxel_index].ppi, &extended) {
                continue;
            }

            refine_point_ppis(
                ppis,
                &vox_points[voxel_index],
                weights[voxel_index],
                &extended,
                normals,
            );
            attrs[voxel_index].update_flag = true;
        }

        // Re-derive histogram and class for the voxels whose points moved.
        for voxel_index in 0..voxel_count {
            if !attrs[voxel_index].update_flag {
                continue;
            }
            let attr = &mut attrs[voxel_index];
            attr.update_flag = false;
            attr.score = [0; PROJECTION_PLANE_COUNT];
            update_voxel_attribute(attr, &vox_points[voxel_index], ppis);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_segmentation_picks_best_plane() {
        let normals = vec![
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.1),
            Vector3::new(0.0, 0.0, -1.0),
            Vector3::new(-0.9, 0.1, 0.0),
        ];
        let mut ppis = vec![0; normals.len()];
        initial_segmentation(&normals, &mut ppis);
        assert_eq!(ppis, vec![0, 1, 5, 3]);
        assert!(ppis.iter().all(|&p| p < PROJECTION_PLANE_COUNT));
    }

    #[test]
    fn initial_segmentation_breaks_ties_low() {
        // Equidistant from +X and +Y: lowest index wins.
        let normals = vec![Vector3::new(0.5f64.sqrt(), 0.5f64.sqrt(), 0.0)];
        let mut ppis = vec![9; 1];
        initial_segmentation(&normals, &mut ppis);
        assert_eq!(ppis[0], 0);
    }

    #[test]
    fn refine_flips_isolated_outlier() {
        // An 8x8 plane of +Z points with one mislabeled point in the
        // middle: the neighborhood consensus should recover it.
        let mut points = Vec::new();
        let mut normals = Vec::new();
        for x in 0..8u16 {
            for y in 0..8u16 {
                points.push(Vector3::new(x, y, 4));
                normals.push(Vector3::new(0.0, 0.0, 1.0));
            }
        }
        let mut ppis = vec![2usize; points.len()];
        let outlier = 8 * 3 + 3;
        ppis[outlier] = 0;
        normals[outlier] = Vector3::new(0.6, 0.0, 0.8);

        let cfg = RefineSegmentationConfig {
            point_bits: 4,
            grid_bits: 3,
            max_nn_voxel_distance_lut: 4,
            max_nn_total_point_count: 64,
            lambda: 3.5,
            iteration_count: 3,
        };
        refine_segmentation(&points, &normals, &mut ppis, &cfg);
        assert!(ppis.iter().all(|&p| p == 2), "ppis: {ppis:?}");
    }
}
