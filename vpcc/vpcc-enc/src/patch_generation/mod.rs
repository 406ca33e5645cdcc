//! Patch generation: from a raw point cloud to the frame's patch list.
//!
//! The PPI of each point comes either from the normal-estimation path
//! (KNN, normals, orientation, initial + refine segmentation) or from the
//! slicing path, selected by `activateSlicing`.

use nalgebra::Vector3;

use crate::parameters::Parameters;
use crate::patch_generation::kd_tree::KdTree;
use crate::patch_generation::ppi::RefineSegmentationConfig;
use crate::{Frame, GeometryCoord};

pub(crate) mod grid;
pub(crate) mod kd_tree;
pub(crate) mod normals;
pub(crate) mod orientation;
pub(crate) mod patch_segmentation;
pub(crate) mod ppi;
pub(crate) mod slicing;

fn compute_points_nn_list(
    points: &[Vector3<GeometryCoord>],
    nn_count: usize,
    max_leaf_size: usize,
) -> Vec<Vec<usize>> {
    log::trace!(target: "PATCH GENERATION", "compute KNN lists");
    let tree = KdTree::new(max_leaf_size, points);
    let nn_count = nn_count.min(points.len());
    points
        .iter()
        .map(|point| {
            let mut neighbors = Vec::with_capacity(nn_count);
            tree.knn(point, nn_count, &mut neighbors);
            neighbors
        })
        .collect()
}

fn refine_config(params: &Parameters) -> RefineSegmentationConfig {
    RefineSegmentationConfig {
        point_bits: params.geo_bit_depth_voxelized,
        grid_bits: params.geo_bit_depth_refine_segmentation,
        max_nn_voxel_distance_lut: params.refine_segmentation_max_nn_voxel_distance_lut,
        max_nn_total_point_count: params.refine_segmentation_max_nn_total_point_count,
        lambda: params.refine_segmentation_lambda,
        iteration_count: params.refine_segmentation_iteration_count,
    }
}

/// Run the whole patch generation pipeline on one frame. Returns the
/// voxel count, for statistics.
pub(crate) fn generate_frame_patches(frame: &mut Frame, params: &Parameters) -> usize {
    log::trace!(target: "PATCH GENERATION",
        "generate patches for frame {}", frame.frame_id);
    debug_assert!(params.geo_bit_depth_input >= params.geo_bit_depth_voxelized);

    let use_voxelization = params.geo_bit_depth_input != params.geo_bit_depth_voxelized;
    let (voxelized_buffer, points_id_to_voxel_id) = if use_voxelization {
        let (voxels, mapping) = grid::voxelize(
            &frame.points_geometry,
            params.geo_bit_depth_input,
            params.geo_bit_depth_voxelized,
        );
        (voxels, mapping)
    } else {
        (Vec::new(), Vec::new())
    };
    let voxelized_points: &[Vector3<GeometryCoord>] = if use_voxelization {
        &voxelized_buffer
    } else {
        &frame.points_geometry
    };
    let voxel_count = voxelized_points.len();

    let mut voxels_ppis = vec![usize::MAX; voxel_count];
    if params.activate_slicing {
        slicing::assign_ppis_slicing(voxelized_points, &mut voxels_ppis, params);
    } else {
        let nn_count = params
            .normal_computation_knn_count
            .max(params.normal_orientation_knn_count);
        let nn_lists =
            compute_points_nn_list(voxelized_points, nn_count, params.kd_tree_max_leaf_size);

        let knn_count = params.normal_computation_knn_count.min(voxel_count);
        let mut normals = normals::compute_normals(
            voxelized_points,
            &nn_lists,
            knn_count,
            params.normal_computation_max_diagonal_step,
        );
        orientation::orient_normals(
            voxelized_points,
            &mut normals,
            &nn_lists,
            params.normal_orientation_knn_count,
        );

        ppi::initial_segmentation(&normals, &mut voxels_ppis);
        ppi::refine_segmentation(
            voxelized_points,
            &normals,
            &mut voxels_ppis,
            &refine_config(params),
        );
    }

    // De-voxelization: every point inherits the PPI of its voxel.
    let points_ppis: Vec<usize> = if use_voxelization {
        points_id_to_voxel_id
            .iter()
            .map(|&voxel_index| voxels_ppis[voxel_index])
            .collect()
    } else {
        voxels_ppis
    };

    patch_segmentation::patch_segmentation(frame, &points_ppis, params);

    // Largest patch first; the sort is stable so equal sizes keep their
    // creation order.
    frame
        .patch_list
        .sort_by(|a, b| {
            let size_a = a.width_in_pixel.max(a.height_in_pixel);
            let size_b = b.width_in_pixel.max(b.height_in_pixel);
            size_b.cmp(&size_a)
        });

    // The patches carry index back references; the raw geometry is no
    // longer needed.
    frame.points_geometry = Vec::new();

    voxel_count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_frame_end_to_end_normal_path() {
        let mut params = Parameters::default();
        params.geo_bit_depth_input = 5;
        params.geo_bit_depth_voxelized = 5;
        params.geo_bit_depth_refine_segmentation = 4;
        params.min_point_count_per_cc = 5;
        params.min_level = 8;
        params.max_nn_count_patch_segmentation = 32;
        params.normal_computation_knn_count = 6;
        params.normal_orientation_knn_count = 4;

        let mut geometry = Vec::new();
        for x in 0..8u16 {
            for y in 0..8u16 {
                geometry.push(Vector3::new(x, y, 5));
            }
        }
        let count = geometry.len();
        let mut frame = Frame::new(0, 0, "plane", geometry, vec![[255, 0, 0]; count]);
        generate_frame_patches(&mut frame, &params);

        assert_eq!(frame.patch_list.len(), 1);
        let patch = &frame.patch_list[0];
        // A flat XY plane projects along Z, one way or the other.
        assert!(patch.patch_ppi == 2 || patch.patch_ppi == 5);
        assert_eq!(patch.width_in_pixel, 8);
        assert_eq!(patch.height_in_pixel, 8);
        assert!(frame.points_geometry.is_empty());
    }

    #[test]
    fn patches_sorted_largest_first() {
        let mut params = Parameters::default();
        params.geo_bit_depth_input = 6;
        params.geo_bit_depth_voxelized = 6;
        params.geo_bit_depth_refine_segmentation = 5;
        params.min_point_count_per_cc = 4;
        params.min_level = 8;
        params.max_nn_count_patch_segmentation = 32;

        // Two XY planes of different sizes, far apart.
        let mut geometry = Vec::new();
        for x in 0..12u16 {
            for y in 0..12u16 {
                geometry.push(Vector3::new(x, y, 3));
            }
        }
        for x in 40..44u16 {
            for y in 40..44u16 {
                geometry.push(Vector3::new(x, y, 30));
            }
        }
        let count = geometry.len();
        let mut frame = Frame::new(0, 0, "planes", geometry, vec![[0, 255, 0]; count]);
        generate_frame_patches(&mut frame, &params);

        assert!(frame.patch_list.len() >= 2);
        for pair in frame.patch_list.windows(2) {
            let size_a = pair[0].width_in_pixel.max(pair[0].height_in_pixel);
            let size_b = pair[1].width_in_pixel.max(pair[1].height_in_pixel);
            assert!(size_a >= size_b);
        }
    }
}
