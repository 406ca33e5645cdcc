//! Map generation: turn a frame's packed patches into the occupancy,
//! geometry and attribute atlases the 2-D encoder consumes.

use crate::parameters::Parameters;
use crate::{round_up, Frame, Gof};

pub(crate) mod background;
pub(crate) mod color;
pub(crate) mod occupancy;
pub(crate) mod rasterize;

/// Allocate (or grow) the frame maps at the GOF-unified height. Occupancy
/// planes start at zero, geometry and attribute at their background
/// values. The U and V planes of occupancy and geometry carry no
/// information for the decoder.
fn allocate_maps(frame: &mut Frame, gof_maps_height: usize, params: &Parameters) {
    let image_size = params.map_width * gof_maps_height;

    if frame.occupancy_map.len() != image_size {
        frame.occupancy_map.resize(image_size, 0);
    }

    let r = params.occupancy_map_ds_resolution;
    let image_size_ds = image_size / (r * r);
    frame
        .occupancy_map_ds
        .resize(image_size_ds + (image_size_ds >> 1), 0);

    let geometry_background = params.map_generation_background_value_geometry;
    let attribute_background = params.map_generation_background_value_attribute;
    frame
        .geometry_map_l1
        .resize(image_size + (image_size >> 1), geometry_background);
    frame
        .attribute_map_l1
        .resize(image_size * 3, attribute_background);
    if params.double_layer {
        frame
            .geometry_map_l2
            .resize(image_size + (image_size >> 1), geometry_background);
        frame
            .attribute_map_l2
            .resize(image_size * 3, attribute_background);
    }
}

/// Generate every map of one frame at its (GOF-unified) `map_height`.
pub(crate) fn generate_frame_maps(frame: &mut Frame, params: &Parameters) {
    let map_height = frame.map_height;
    let image_size = params.map_width * map_height;
    allocate_maps(frame, map_height, params);

    if !params.dynamic_map_height {
        // With a fixed atlas height the packer may have refused patches;
        // they are gone for good.
        frame.patch_list.retain(|patch| !patch.is_discarded);
    }

    rasterize::write_patch_occupancies(
        frame,
        params.map_width,
        params.occupancy_map_ds_resolution,
    );
    occupancy::occupancy_map_downscaling(
        map_height,
        &mut frame.occupancy_map,
        &mut frame.occupancy_map_ds,
        params,
    );

    rasterize::write_patches(
        frame,
        map_height,
        params.map_width,
        params.occupancy_map_ds_resolution,
        params.double_layer,
    );

    let ds_plane = image_size / (params.occupancy_map_ds_resolution * params.occupancy_map_ds_resolution);
    {
        let occupancy_ds = &frame.occupancy_map_ds[..ds_plane];
        background::bg_fill_geometry(
            occupancy_ds,
            map_height,
            &mut frame.geometry_map_l1[..image_size],
            params,
        );
        if params.double_layer {
            background::bg_fill_geometry(
                occupancy_ds,
                map_height,
                &mut frame.geometry_map_l2[..image_size],
                params,
            );
        }

        background::bg_fill_attribute(
            &frame.occupancy_map,
            occupancy_ds,
            map_height,
            &mut frame.attribute_map_l1,
            params,
        );
        if params.double_layer {
            background::bg_fill_attribute(
                &frame.occupancy_map,
                occupancy_ds,
                map_height,
                &mut frame.attribute_map_l2,
                params,
            );
        }
    }

    if params.use_reference_color_conversion {
        color::rgb444_to_yuv420_reference(&mut frame.attribute_map_l1, params.map_width, map_height);
        if params.double_layer {
            color::rgb444_to_yuv420_reference(
                &mut frame.attribute_map_l2,
                params.map_width,
                map_height,
            );
        }
    } else {
        color::rgb444_to_yuv420(&mut frame.attribute_map_l1, params.map_width, map_height);
        if params.double_layer {
            color::rgb444_to_yuv420(&mut frame.attribute_map_l2, params.map_width, map_height);
        }
    }

    // The attribute pixels have been splatted; the per-point colors are
    // no longer needed.
    frame.points_attribute = Vec::new();
}

/// Unify the map height across the frames of a GOF, before their map
/// generation runs.
pub(crate) fn init_gof_map_generation(gof: &mut Gof, params: &Parameters) {
    log::trace!(target: "MAP GENERATION",
        "initialize maps of GOF {}", gof.gof_id);

    if !params.dynamic_map_height {
        gof.map_height_gof = gof.frames[0].map_height;
        gof.map_height_ds_gof = gof.frames[0].map_height_ds;
        return;
    }

    for frame in &gof.frames {
        gof.map_height_ds_gof = gof.map_height_ds_gof.max(frame.map_height_ds);
    }
    gof.map_height_ds_gof = round_up(gof.map_height_ds_gof, 8);
    gof.map_height_gof = gof.map_height_ds_gof * params.occupancy_map_ds_resolution;

    for frame in &mut gof.frames {
        frame.map_height = gof.map_height_gof;
        frame.map_height_ds = gof.map_height_ds_gof;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::AttributeBgFill;
    use crate::{Patch, INFINITE_DEPTH};
    use nalgebra::Vector3;

    fn map_params() -> Parameters {
        let mut params = Parameters::default();
        params.map_width = 16;
        params.minimum_map_height = 16;
        params.occupancy_map_ds_resolution = 2;
        params.double_layer = false;
        params.attribute_bg_fill = AttributeBgFill::PatchExtension;
        params
    }

    /// One 8x8 patch at depth 5, PPI 2, colored red, placed at the atlas
    /// origin.
    fn red_plane_frame() -> Frame {
        let mut frame = Frame::default();
        frame.map_height = 16;
        frame.map_height_ds = 8;
        frame.points_attribute = vec![[255, 0, 0]; 64];

        let mut patch = Patch::default();
        patch.set_patch_ppi(2);
        patch.width_in_pixel = 8;
        patch.height_in_pixel = 8;
        patch.width_in_occ_blk = 4;
        patch.height_in_occ_blk = 4;
        patch.pos_d = 0;
        patch.depth_l1 = vec![5; 64];
        patch.depth_pc_idx_l1 = (0..64).collect();
        patch.patch_occupancy = vec![1; 64];
        frame.patch_list.push(patch);
        frame
    }

    #[test]
    fn empty_frame_maps_are_all_background() {
        let params = map_params();
        let mut frame = Frame::default();
        frame.map_height = 16;
        frame.map_height_ds = 8;
        generate_frame_maps(&mut frame, &params);

        let image_size = 16 * 16;
        assert!(frame.occupancy_map.iter().all(|&p| p == 0));
        assert!(frame.occupancy_map_ds.iter().all(|&p| p == 0));
        assert!(frame.geometry_map_l1[..image_size].iter().all(|&p| p == 128));
        // Uniform mid-gray RGB converts to uniform mid-gray YUV.
        assert!(frame.attribute_map_l1.iter().all(|&p| p == 128));
    }

    #[test]
    fn rasterized_patch_lands_in_the_maps() {
        let params = map_params();
        let mut frame = red_plane_frame();
        generate_frame_maps(&mut frame, &params);

        let image_size = 16 * 16;
        for v in 0..8 {
            for u in 0..8 {
                let pos = u + v * 16;
                assert_eq!(frame.occupancy_map[pos], 1);
                assert_eq!(frame.geometry_map_l1[pos], 5);
            }
        }
        // The red block became the expected BT.709 luma/chroma.
        let y = frame.attribute_map_l1[0];
        let u = frame.attribute_map_l1[image_size];
        let v = frame.attribute_map_l1[image_size + image_size / 4];
        assert_eq!(y, (0.2126f32 * 255.0) as u8);
        assert_eq!(u, (-0.114572f32 * 255.0 + 128.0) as u8);
        assert_eq!(v, (0.5f32 * 255.0 + 128.0) as u8);
    }

    #[test]
    fn axis_swapped_patch_transposes() {
        let params = map_params();
        let mut frame = Frame::default();
        frame.map_height = 16;
        frame.map_height_ds = 8;
        frame.points_attribute = vec![[1, 2, 3]; 8];

        let mut patch = Patch::default();
        patch.set_patch_ppi(2);
        patch.width_in_pixel = 4;
        patch.height_in_pixel = 2;
        patch.width_in_occ_blk = 2;
        patch.height_in_occ_blk = 1;
        patch.axis_swap = true;
        patch.depth_l1 = vec![INFINITE_DEPTH; 8];
        patch.depth_l1[3] = 7; // (u=3, v=0)
        patch.depth_pc_idx_l1 = vec![0; 8];
        patch.patch_occupancy = vec![0; 8];
        patch.patch_occupancy[3] = 1;
        frame.patch_list.push(patch);

        generate_frame_maps(&mut frame, &params);
        // With the swap, (u,v) = (3,0) writes at (x,y) = (0,3).
        assert_eq!(frame.geometry_map_l1[3 * 16], 7);
        assert_eq!(frame.occupancy_map[3 * 16], 1);
    }

    #[test]
    fn gof_height_unification_takes_the_maximum() {
        let mut params = map_params();
        params.dynamic_map_height = true;
        let mut gof = Gof::default();
        for (id, height_ds) in [(0usize, 5usize), (1, 9), (2, 7)] {
            let mut frame = Frame::default();
            frame.frame_id = id;
            frame.map_height_ds = height_ds;
            gof.frames.push(frame);
        }
        init_gof_map_generation(&mut gof, &params);

        // max 9, rounded up to a multiple of 8.
        assert_eq!(gof.map_height_ds_gof, 16);
        assert_eq!(gof.map_height_gof, 32);
        for frame in &gof.frames {
            assert_eq!(frame.map_height, 32);
            assert_eq!(frame.map_height_ds, 16);
        }
    }
}
