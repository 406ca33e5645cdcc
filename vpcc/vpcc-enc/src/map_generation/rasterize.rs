//! Patch rasterization: blit each patch's occupancy, depth and per-pixel
//! attributes into the frame atlases.

use crate::{Frame, Patch, INFINITE_DEPTH};

/// Compile-time specialization over (doubleLayer, axisSwap); the hot loop
/// stays branch-free.
#[allow(clippy::too_many_arguments)]
fn write_patch<const DOUBLE_LAYER: bool, const AXIS_SWAP: bool>(
    patch: &Patch,
    image_size: usize,
    map_width: usize,
    om_resolution: usize,
    attributes: &[[u8; 3]],
    geometry_l1: &mut [u8],
    attribute_l1: &mut [u8],
    geometry_l2: &mut [u8],
    attribute_l2: &mut [u8],
) {
    let om_x = patch.om_ds_pos_x * om_resolution;
    let om_y = patch.om_ds_pos_y * om_resolution;
    let image_size2 = 2 * image_size;

    for v in 0..patch.height_in_pixel {
        let v_offset = v * patch.width_in_pixel;
        for u in 0..patch.width_in_pixel {
            let patch_pos = u + v_offset;
            let depth = patch.depth_l1[patch_pos];
            if depth == INFINITE_DEPTH {
                continue;
            }

            let x = if AXIS_SWAP { v } else { u };
            let y = if AXIS_SWAP { u } else { v };
            let map_pos = om_x + x + (om_y + y) * map_width;

            let color = attributes[patch.depth_pc_idx_l1[patch_pos]];
            geometry_l1[map_pos] = depth as u8;
            attribute_l1[map_pos] = color[0];
            attribute_l1[map_pos + image_size] = color[1];
            attribute_l1[map_pos + image_size2] = color[2];

            if DOUBLE_LAYER {
                let color2 = attributes[patch.depth_pc_idx_l2[patch_pos]];
                geometry_l2[map_pos] = patch.depth_l2[patch_pos] as u8;
                attribute_l2[map_pos] = color2[0];
                attribute_l2[map_pos + image_size] = color2[1];
                attribute_l2[map_pos + image_size2] = color2[2];
            }
        }
    }
}

/// Blit the patch occupancy rasters into the frame occupancy map.
pub(crate) fn write_patch_occupancies(
    frame: &mut Frame,
    map_width: usize,
    om_resolution: usize,
) {
    let occupancy_map = &mut frame.occupancy_map;
    for patch in &frame.patch_list {
        let om_x = patch.om_ds_pos_x * om_resolution;
        let om_y = patch.om_ds_pos_y * om_resolution;
        for v in 0..patch.height_in_pixel {
            for u in 0..patch.width_in_pixel {
                if patch.patch_occupancy[u + v * patch.width_in_pixel] == 0 {
                    continue;
                }
                let x = if patch.axis_swap { v } else { u };
                let y = if patch.axis_swap { u } else { v };
                occupancy_map[om_x + x + (om_y + y) * map_width] = 1;
            }
        }
    }
}

/// Write every patch's geometry and attribute pixels into the frame maps.
pub(crate) fn write_patches(
    frame: &mut Frame,
    gof_maps_height: usize,
    map_width: usize,
    om_resolution: usize,
    double_layer: bool,
) {
    let image_size = map_width * gof_maps_height;
    let Frame {
        patch_list,
        points_attribute,
        geometry_map_l1,
        geometry_map_l2,
        attribute_map_l1,
        attribute_map_l2,
        ..
    } = frame;

    for patch in patch_list.iter() {
        match (double_layer, patch.axis_swap) {
            (true, true) => write_patch::<true, true>(
                patch,
                image_size,
                map_width,
                om_resolution,
                points_attribute,
                geometry_map_l1,
                attribute_map_l1,
                geometry_map_l2,
                attribute_map_l2,
            ),
            (true, false) => write_patch::<true, false>(
                patch,
                image_size,
                map_width,
                om_resolution,
                points_attribute,
                geometry_map_l1,
                attribute_map_l1,
                geometry_map_l2,
                attribute_map_l2,
            ),
            (false, true) => write_patch::<false, true>(
                patch,
                image_size,
                map_width,
                om_resolution,
                points_attribute,
                geometry_map_l1,
                attribute_map_l1,
                geometry_map_l2,
                attribute_map_l2,
            ),
            (false, false) => write_patch::<false, false>(
                patch,
                image_size,
                map_width,
                om_resolution,
                points_attribute,
                geometry_map_l1,
                attribute_map_l1,
                geometry_map_l2,
                attribute_map_l2,
            ),
        }
    }
}
