//! Patch segmentation: grow PPI-consistent connected components, project
//! them onto their plane and build the two depth layers. The outer loop
//! re-runs until every point is captured by a patch or rejected.

use std::collections::VecDeque;

use fxhash::{FxHashMap, FxHashSet};
use nalgebra::Vector3;

use crate::parameters::Parameters;
use crate::patch_generation::grid::{location_1d, shifted_point, ADJACENT_SHELLS};
use crate::{round_up, Frame, GeometryCoord, Patch, INFINITE_DEPTH, INVALID_INDEX};

/// Pixels deviating further than this from their occupancy-block peak are
/// dropped back into the pool.
const DISTANCE_FILTERING: i32 = 32;

/// Encoded depth must fit 8 bits after the `posD` shift.
const GEOMETRY_NOMINAL_2D_BITDEPTH: usize = 8;

fn create_connected_components(
    flags: &mut [bool],
    raw_points: &[usize],
    points_ppis: &[usize],
    propagation_map: &mut FxHashMap<u64, usize>,
    points: &[Vector3<GeometryCoord>],
    params: &Parameters,
) -> Vec<Vec<usize>> {
    let bits = params.geo_bit_depth_input;
    let grid_max = (1i32 << bits) - 1;
    let mut components: Vec<Vec<usize>> = Vec::with_capacity(256);
    let mut fifo: VecDeque<usize> = VecDeque::new();

    for &seed in raw_points {
        if !flags[seed] {
            continue;
        }
        flags[seed] = false;
        propagation_map.remove(&location_1d(&points[seed], bits));
        let cc_ppi = points_ppis[seed];
        let mut component = vec![seed];
        fifo.push_back(seed);

        while let Some(point_index) = fifo.pop_front() {
            let current = &points[point_index];
            let mut nn_count = 0usize;
            'shells: for shifts in ADJACENT_SHELLS
                .iter()
                .take(params.patch_segmentation_max_propagation_distance)
            {
                for shift in shifts.iter() {
                    let Some(adj) = shifted_point(current, shift, grid_max) else {
                        continue;
                    };
                    let key = location_1d(&adj, bits);
                    if let Some(&neighbor_index) = propagation_map.get(&key) {
                        if cc_ppi == points_ppis[neighbor_index] {
                            propagation_map.remove(&key);
                            flags[neighbor_index] = false;
                            fifo.push_back(neighbor_index);
                            component.push(neighbor_index);
                            nn_count += 1;
                            if nn_count == params.max_nn_count_patch_segmentation {
                                break 'shells;
                            }
                        }
                    }
                }
            }
        }

        if component.len() >= params.min_point_count_per_cc {
            components.push(component);
        }
    }

    components
}

fn compute_patch_bounding_box(
    patch: &mut Patch,
    component: &[usize],
    points: &[Vector3<GeometryCoord>],
    om_resolution: usize,
) {
    let u_axis = patch.tangent_axis;
    let v_axis = patch.bitangent_axis;
    let mut min_u = GeometryCoord::MAX;
    let mut min_v = GeometryCoord::MAX;
    let mut max_u = GeometryCoord::MIN;
    let mut max_v = GeometryCoord::MIN;

    for &point_index in component {
        let point = &points[point_index];
        min_u = min_u.min(point[u_axis]);
        min_v = min_v.min(point[v_axis]);
        max_u = max_u.max(point[u_axis]);
        max_v = max_v.max(point[v_axis]);
    }

    patch.pos_u = min_u as usize;
    patch.pos_v = min_v as usize;
    // Sizes that are multiples of the occupancy block avoid edge checks
    // when the patch is written into the maps.
    patch.width_in_pixel = round_up(1 + (max_u - min_u) as usize, om_resolution);
    patch.height_in_pixel = round_up(1 + (max_v - min_v) as usize, om_resolution);
}

/// Cut an oversized component down to a maxPatchSize corner window. The
/// removed points stay available for the next outer iteration.
fn patch_splitting(
    component: &mut Vec<usize>,
    patch: &mut Patch,
    points: &[Vector3<GeometryCoord>],
    params: &Parameters,
) {
    let u_axis = patch.tangent_axis;
    let v_axis = patch.bitangent_axis;
    let limit_u = (params.max_patch_size + patch.pos_u) as GeometryCoord;
    let limit_v = (params.max_patch_size + patch.pos_v) as GeometryCoord;

    let mut kept: Vec<usize> = Vec::with_capacity(component.len());
    for &point_index in component.iter() {
        let point = &points[point_index];
        if point[u_axis] < limit_u && point[v_axis] < limit_v {
            kept.push(point_index);
        }
    }

    if kept.is_empty() {
        // The accepted window sits on the top-left corner; for shapes like
        // an '_|' no points live there, so retry at the bottom-right.
        let limit_u =
            (patch.pos_u + patch.width_in_pixel) as i64 - params.max_patch_size as i64;
        let limit_v =
            (patch.pos_v + patch.height_in_pixel) as i64 - params.max_patch_size as i64;
        for &point_index in component.iter() {
            let point = &points[point_index];
            if point[u_axis] as i64 > limit_u && point[v_axis] as i64 > limit_v {
                kept.push(point_index);
            }
        }
    }

    if kept.is_empty() {
        log::error!(
            target: "PATCH SEGMENTATION",
            "Possible infinite loop was reach. Context : A patch is bigger than the maxPatchSize \
             parameter. So, it is split. However, the shape of the patch makes the current \
             spliting algorithm not working. A way to solve this issue is to increase the \
             maximum patch size parameter (maxPatchSize)"
        );
    }

    *component = kept;
    if !component.is_empty() {
        compute_patch_bounding_box(patch, component, points, params.occupancy_map_ds_resolution);
    }
}

fn compute_patch_depth_l1(
    patch: &mut Patch,
    component: &[usize],
    patch_partition: &mut [usize],
    points: &[Vector3<GeometryCoord>],
    params: &Parameters,
) {
    let is_mode0 = !patch.projection_mode;
    let partition_id = patch.patch_index + 1;
    let om_resolution = params.occupancy_map_ds_resolution;
    let min_level = params.min_level;
    let mut min_d: GeometryCoord = if is_mode0 { INFINITE_DEPTH } else { 0 };
    let mut size_u_om = 0usize;
    let mut size_v_om = 0usize;

    for &point_index in component {
        patch_partition[point_index] = partition_id;
        let point = &points[point_index];
        let d = point[patch.normal_axis];
        let u = (point[patch.tangent_axis] as usize) - patch.pos_u;
        let v = (point[patch.bitangent_axis] as usize) - patch.pos_v;
        let pos = v * patch.width_in_pixel + u;
        let patch_d = patch.depth_l1[pos];

        // Several component points can project onto the same pixel; the
        // projection mode decides whether the nearer or further one wins.
        if is_mode0 {
            if patch_d <= d {
                continue;
            }
            if d < min_d {
                min_d = (d / min_level as GeometryCoord) * min_level as GeometryCoord;
            }
        } else {
            if patch_d >= d && patch_d != INFINITE_DEPTH {
                continue;
            }
            if d > min_d {
                min_d = round_up(d as usize, min_level) as GeometryCoord;
            }
        }

        patch.depth_l1[pos] = d;
        patch.depth_pc_idx_l1[pos] = point_index;
        if params.double_layer {
            patch.depth_l2[pos] = d;
            patch.depth_pc_idx_l2[pos] = point_index;
        }

        size_u_om = size_u_om.max(u / om_resolution);
        size_v_om = size_v_om.max(v / om_resolution);
    }

    patch.pos_d = min_d as usize;
    patch.width_in_occ_blk = size_u_om + 1;
    patch.height_in_occ_blk = size_v_om + 1;
    patch.patch_occupancy = vec![0u8; patch.width_in_pixel * patch.height_in_pixel];

    debug_assert_eq!(
        patch.width_in_occ_blk,
        patch.width_in_pixel / om_resolution
    );
    debug_assert_eq!(
        patch.height_in_occ_blk,
        patch.height_in_pixel / om_resolution
    );
}

/// Remove pixels whose depth cannot be encoded from `posD` in 8 bits or
/// that sit too far from their occupancy block's peak. The points behind
/// them go back to the pool.
fn filter_depth(patch: &mut Patch, params: &Parameters) {
    let is_mode0 = !patch.projection_mode;
    let om_resolution = params.occupancy_map_ds_resolution;
    let mut peak_per_block: Vec<GeometryCoord> =
        vec![if is_mode0 { INFINITE_DEPTH } else { 0 }; patch.width_in_occ_blk * patch.height_in_occ_blk];

    for v in 0..patch.height_in_pixel {
        for u in 0..patch.width_in_pixel {
            let depth = patch.depth_l1[v * patch.width_in_pixel + u];
            if depth == INFINITE_DEPTH {
                continue;
            }
            let pom = (v / om_resolution) * patch.width_in_occ_blk + u / om_resolution;
            if is_mode0 {
                peak_per_block[pom] = peak_per_block[pom].min(depth);
            } else {
                peak_per_block[pom] = peak_per_block[pom].max(depth);
            }
        }
    }

    let direction: i32 = if is_mode0 { 1 } else { -1 };
    let max_allowed_depth = (1i32 << GEOMETRY_NOMINAL_2D_BITDEPTH) - 1;

    for v in 0..patch.height_in_pixel {
        for u in 0..patch.width_in_pixel {
            let pos = v * patch.width_in_pixel + u;
            let depth = patch.depth_l1[pos];
            if depth == INFINITE_DEPTH {
                continue;
            }
            let pom = (v / om_resolution) * patch.width_in_occ_blk + u / om_resolution;
            let deviation = (depth as i32 - peak_per_block[pom] as i32).abs();
            let reach = params.surface_thickness as i32 + direction * depth as i32;
            let bound = direction * patch.pos_d as i32 + max_allowed_depth;
            if deviation > DISTANCE_FILTERING || reach > bound {
                patch.depth_l1[pos] = INFINITE_DEPTH;
                patch.depth_pc_idx_l1[pos] = INVALID_INDEX;
                if params.double_layer {
                    patch.depth_l2[pos] = INFINITE_DEPTH;
                    patch.depth_pc_idx_l2[pos] = INVALID_INDEX;
                }
            }
        }
    }
}

/// Build the far layer: start as a copy of L1, then keep, per pixel, the
/// furthest component point within `surfaceThickness` of L1.
fn compute_patch_depth_l2(
    patch: &mut Patch,
    component: &[usize],
    points: &[Vector3<GeometryCoord>],
    params: &Parameters,
) {
    patch.depth_l2.copy_from_slice(&patch.depth_l1);
    patch.depth_pc_idx_l2.copy_from_slice(&patch.depth_pc_idx_l1);

    let is_mode0 = !patch.projection_mode;
    let direction: i32 = if is_mode0 { 1 } else { -1 };

    for &point_index in component {
        let point = &points[point_index];
        let d = point[patch.normal_axis];
        let u = (point[patch.tangent_axis] as usize) - patch.pos_u;
        let v = (point[patch.bitangent_axis] as usize) - patch.pos_v;
        let pos = v * patch.width_in_pixel + u;
        let depth_l1 = patch.depth_l1[pos];
        if depth_l1 == INFINITE_DEPTH {
            continue;
        }

        let delta = direction * (d as i32 - depth_l1 as i32);
        if (0..=params.surface_thickness as i32).contains(&delta)
            && direction * (d as i32 - patch.depth_l2[pos] as i32) > 0
        {
            patch.depth_l2[pos] = d;
            patch.depth_pc_idx_l2[pos] = point_index;
        }

        debug_assert!(
            (is_mode0 && patch.depth_l2[pos] >= depth_l1)
                || (!is_mode0 && patch.depth_l2[pos] <= depth_l1)
        );
    }
}

/// Mark the written pixels in the patch occupancy, fingerprint the
/// reconstructed points into the resample set and shift both layers down
/// by `posD`.
fn resample_patch(
    resample_set: &mut FxHashSet<u64>,
    patch: &mut Patch,
    params: &Parameters,
) {
    patch.size_d = 0;
    let bits = params.geo_bit_depth_input;
    // projection mode 0 -> +1, mode 1 -> -1
    let direction: i32 = 1 - 2 * patch.projection_mode as i32;

    for v in 0..patch.height_in_pixel {
        for u in 0..patch.width_in_pixel {
            let pos = v * patch.width_in_pixel + u;
            if patch.depth_l1[pos] == INFINITE_DEPTH {
                continue;
            }
            patch.patch_occupancy[pos] = 1;

            let depth0 = patch.depth_l1[pos];
            let mut point: Vector3<GeometryCoord> = Vector3::zeros();
            point[patch.normal_axis] = depth0;
            point[patch.tangent_axis] = (u + patch.pos_u) as GeometryCoord;
            point[patch.bitangent_axis] = (v + patch.pos_v) as GeometryCoord;
            resample_set.insert(location_1d(&point, bits));

            let shifted = direction * (depth0 as i32 - patch.pos_d as i32);
            patch.depth_l1[pos] = shifted as GeometryCoord;
            patch.size_d = patch.size_d.max(shifted as usize);

            if params.double_layer {
                if point[patch.normal_axis] != patch.depth_l2[pos] {
                    point[patch.normal_axis] = patch.depth_l2[pos];
                    resample_set.insert(location_1d(&point, bits));
                }
                let shifted2 = direction * (patch.depth_l2[pos] as i32 - patch.pos_d as i32);
                patch.depth_l2[pos] = shifted2 as GeometryCoord;
                patch.size_d = patch.size_d.max(shifted2 as usize);
            }
        }
    }
}

/// Clamp and quantize `sizeD` so the decoder-side bit budget holds.
fn compute_additional_patch_info(patch: &mut Patch, params: &Parameters) {
    let bitdepth_2d = params
        .geo_bit_depth_input
        .min(GEOMETRY_NOMINAL_2D_BITDEPTH);
    patch.size_d = patch.size_d.min((1usize << bitdepth_2d) - 1);

    let bitdepth_d = bitdepth_2d.saturating_sub(params.min_level.ilog2() as usize);
    let max_dd_plus1 = 1usize << bitdepth_d;
    let mut quant_dd = if patch.size_d == 0 {
        0
    } else {
        (patch.size_d - 1) / params.min_level + 1
    };
    quant_dd = quant_dd.min(max_dd_plus1 - 1);
    patch.size_d = if quant_dd == 0 {
        0
    } else {
        quant_dd * params.min_level - 1
    };
}

/// Re-derive the free point pool: a point is raw again when neither it
/// nor a close neighbor has been resampled into a patch.
fn refill_raw_points(
    resample_set: &FxHashSet<u64>,
    raw_points: &mut Vec<usize>,
    points: &[Vector3<GeometryCoord>],
    flags: &mut [bool],
    propagation_map: &mut FxHashMap<u64, usize>,
    params: &Parameters,
) {
    let bits = params.geo_bit_depth_input;
    let grid_max = (1i32 << bits) - 1;
    flags.fill(false);
    raw_points.clear();

    'points: for (point_index, point) in points.iter().enumerate() {
        let key = location_1d(point, bits);
        if resample_set.contains(&key) {
            continue;
        }

        // Captured at distance 1: the point stays off the pool entirely.
        for shift in ADJACENT_SHELLS[0].iter() {
            if let Some(adj) = shifted_point(point, shift, grid_max) {
                if resample_set.contains(&location_1d(&adj, bits)) {
                    continue 'points;
                }
            }
        }

        flags[point_index] = true;
        propagation_map.entry(key).or_insert(point_index);

        // Only points further than the rejection radius from any captured
        // point may seed or join a new component.
        for shifts in &ADJACENT_SHELLS[1..params.max_allowed_dist2_raw_points_detection] {
            for shift in shifts.iter() {
                if let Some(adj) = shifted_point(point, shift, grid_max) {
                    if resample_set.contains(&location_1d(&adj, bits)) {
                        continue 'points;
                    }
                }
            }
        }

        raw_points.push(point_index);
    }
}

/// Decompose the frame's point cloud into patches. `points_ppis` holds
/// one plane index per point.
pub(crate) fn patch_segmentation(
    frame: &mut Frame,
    points_ppis: &[usize],
    params: &Parameters,
) {
    let point_count = frame.points_geometry.len();
    log::trace!(target: "PATCH GENERATION",
        "patch segmentation of frame {}", frame.frame_id);

    frame.patch_list.reserve(256);
    frame.patch_partition = vec![INVALID_INDEX; point_count];

    let bits = params.geo_bit_depth_input;
    let mut raw_points: Vec<usize> = (0..point_count).collect();
    let mut flags = vec![true; point_count];

    let mut resample_set: FxHashSet<u64> = FxHashSet::default();
    resample_set.reserve(point_count);

    let mut propagation_map: FxHashMap<u64, usize> = FxHashMap::default();
    propagation_map.reserve(point_count);
    for (point_index, point) in frame.points_geometry.iter().enumerate() {
        propagation_map.insert(location_1d(point, bits), point_index);
    }

    while !raw_points.is_empty() {
        let components = create_connected_components(
            &mut flags,
            &raw_points,
            points_ppis,
            &mut propagation_map,
            &frame.points_geometry,
            params,
        );
        if components.is_empty() {
            break;
        }

        for mut component in components {
            let patch_index = frame.patch_list.len();
            let mut patch = Patch {
                patch_index,
                ..Patch::default()
            };
            patch.set_patch_ppi(points_ppis[component[0]]);

            compute_patch_bounding_box(
                &mut patch,
                &component,
                &frame.points_geometry,
                params.occupancy_map_ds_resolution,
            );
            if params.enable_patch_splitting
                && (patch.width_in_pixel > params.max_patch_size
                    || patch.height_in_pixel > params.max_patch_size)
            {
                patch_splitting(&mut component, &mut patch, &frame.points_geometry, params);
                if component.is_empty() {
                    continue;
                }
            }

            let raster_len = patch.width_in_pixel * patch.height_in_pixel;
            patch.depth_l1 = vec![INFINITE_DEPTH; raster_len];
            patch.depth_pc_idx_l1 = vec![INVALID_INDEX; raster_len];
            if params.double_layer {
                patch.depth_l2 = vec![INFINITE_DEPTH; raster_len];
                patch.depth_pc_idx_l2 = vec![INVALID_INDEX; raster_len];
            }

            compute_patch_depth_l1(
                &mut patch,
                &component,
                &mut frame.patch_partition,
                &frame.points_geometry,
                params,
            );
            filter_depth(&mut patch, params);
            if params.double_layer {
                compute_patch_depth_l2(&mut patch, &component, &frame.points_geometry, params);
            }
            resample_patch(&mut resample_set, &mut patch, params);
            compute_additional_patch_info(&mut patch, params);

            frame.patch_list.push(patch);
        }

        refill_raw_points(
            &resample_set,
            &mut raw_points,
            &frame.points_geometry,
            &mut flags,
            &mut propagation_map,
            params,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> Parameters {
        let mut params = Parameters::default();
        params.geo_bit_depth_input = 5;
        params.geo_bit_depth_voxelized = 5;
        params.occupancy_map_ds_resolution = 2;
        params.min_point_count_per_cc = 5;
        params.min_level = 8;
        params.surface_thickness = 4;
        params.max_patch_size = 1024;
        // Capture every same-PPI neighbor so the small grids of these
        // tests are covered exhaustively.
        params.max_nn_count_patch_segmentation = 32;
        params
    }

    fn plane_frame() -> Frame {
        // An 8x8 grid at z = 5 in the XY plane, uniformly red.
        let mut geometry = Vec::new();
        for x in 0..8u16 {
            for y in 0..8u16 {
                geometry.push(Vector3::new(x, y, 5));
            }
        }
        let count = geometry.len();
        Frame::new(0, 0, "plane", geometry, vec![[255, 0, 0]; count])
    }

    #[test]
    fn single_plane_becomes_one_patch() {
        let params = small_params();
        let mut frame = plane_frame();
        let ppis = vec![2usize; frame.points_geometry.len()];
        patch_segmentation(&mut frame, &ppis, &params);

        assert_eq!(frame.patch_list.len(), 1);
        let patch = &frame.patch_list[0];
        assert_eq!(patch.patch_ppi, 2);
        assert_eq!(patch.width_in_pixel, 8);
        assert_eq!(patch.height_in_pixel, 8);
        assert_eq!(patch.pos_d, 5 / params.min_level * params.min_level);
        assert_eq!(patch.width_in_pixel % params.occupancy_map_ds_resolution, 0);
        assert_eq!(patch.height_in_pixel % params.occupancy_map_ds_resolution, 0);

        for pos in 0..64 {
            assert_ne!(patch.depth_l1[pos], INFINITE_DEPTH);
            assert_eq!(patch.patch_occupancy[pos], 1);
            assert_eq!(patch.depth_l1[pos] as usize, 5 - patch.pos_d);
            // The back reference points at the very point that projected
            // onto this pixel.
            let point = &frame.points_geometry[patch.depth_pc_idx_l1[pos]];
            let u = pos % patch.width_in_pixel;
            assert_eq!(point[patch.tangent_axis] as usize, patch.pos_u + u);
        }
    }

    #[test]
    fn tiny_component_is_dropped() {
        let mut params = small_params();
        params.min_point_count_per_cc = 5;
        let mut frame = Frame::new(
            0,
            0,
            "dot",
            vec![Vector3::new(0u16, 0, 0)],
            vec![[10, 20, 30]],
        );
        let ppis = vec![2usize];
        patch_segmentation(&mut frame, &ppis, &params);
        assert!(frame.patch_list.is_empty());
    }

    #[test]
    fn double_layer_respects_surface_thickness() {
        let mut params = small_params();
        params.min_point_count_per_cc = 1;
        params.surface_thickness = 1;
        params.double_layer = true;

        // Two stacked points along z, PPI 2 (projection onto XY, mode 0).
        let mut frame = Frame::new(
            0,
            0,
            "pair",
            vec![Vector3::new(0u16, 0, 0), Vector3::new(0u16, 0, 1)],
            vec![[9, 9, 9], [9, 9, 9]],
        );
        let ppis = vec![2usize, 2];
        patch_segmentation(&mut frame, &ppis, &params);

        assert_eq!(frame.patch_list.len(), 1);
        let patch = &frame.patch_list[0];
        assert_eq!(patch.depth_l1[0], 0);
        assert_eq!(patch.depth_l2[0], 1);
        // Both reconstructed points entered the resample set, so no raw
        // point survives and the loop ran once.
        assert_eq!(frame.patch_partition[0], 1);
        assert_eq!(frame.patch_partition[1], 1);
    }

    #[test]
    fn depth_fits_eight_bits_after_shift() {
        let mut params = small_params();
        params.geo_bit_depth_input = 5;
        params.min_point_count_per_cc = 1;
        let mut frame = plane_frame();
        let ppis = vec![2usize; frame.points_geometry.len()];
        patch_segmentation(&mut frame, &ppis, &params);
        for patch in &frame.patch_list {
            for &depth in &patch.depth_l1 {
                if depth != INFINITE_DEPTH {
                    assert!(depth <= 255);
                }
            }
            for (&l1, &l2) in patch.depth_l1.iter().zip(&patch.depth_l2) {
                if l1 != INFINITE_DEPTH {
                    assert!(l2 >= l1);
                    assert!((l2 - l1) as usize <= params.surface_thickness);
                }
            }
        }
    }
}
