//! Core of a V-PCC (video-based point cloud compression) encoder.
//!
//! Each input frame is a 3-D point cloud (geometry plus per-point RGB).
//! The pipeline decomposes it into 2-D patches, lays the patches out into
//! three video maps (occupancy, geometry, attribute) and hands the map
//! sequences of a group of frames (GOF) to an external 2-D video encoder.
//! The resulting bitstreams are exposed as V3C chunks on an output stream.
//!
//! The 2-D codec itself and the patch packing heuristic are collaborators
//! behind narrow seams: [`map_encoding::Map2dEncoder`] and
//! [`packing::PatchPacker`].

use nalgebra::Vector3;

pub mod error;
pub mod logging;
pub mod map_encoding;
pub mod map_generation;
pub mod packing;
pub mod parameters;
pub mod patch_generation;
pub mod stream;

mod encoder;
mod preset;
mod stats;

pub use encoder::{Encoder, EncoderBuilder};
pub use error::Error;
pub use parameters::Parameters;
pub use stream::{V3cChunk, V3cUnitStream};

/// Integer type of the input point coordinates (bit depth 9-11 typically).
pub type GeometryCoord = u16;

/// Sentinel depth for an empty patch pixel.
pub const INFINITE_DEPTH: GeometryCoord = GeometryCoord::MAX;

/// Sentinel for "no point" back references.
pub const INVALID_INDEX: usize = usize::MAX;

/// Number of axis-aligned projection planes.
pub const PROJECTION_PLANE_COUNT: usize = 6;

/// Orientation (unit normal) of a projection plane, ordered +X, +Y, +Z, -X, -Y, -Z.
pub fn projection_plane_normal(ppi: usize) -> Vector3<f64> {
    match ppi {
        0 => Vector3::new(1.0, 0.0, 0.0),
        1 => Vector3::new(0.0, 1.0, 0.0),
        2 => Vector3::new(0.0, 0.0, 1.0),
        3 => Vector3::new(-1.0, 0.0, 0.0),
        4 => Vector3::new(0.0, -1.0, 0.0),
        5 => Vector3::new(0.0, 0.0, -1.0),
        _ => unreachable!("PPI out of range: {ppi}"),
    }
}

/// Round `number` up to the nearest multiple of `multiple` (a power of two).
///
/// `round_up(7, 8) == 8`, `round_up(17, 8) == 24`.
pub(crate) fn round_up(number: usize, multiple: usize) -> usize {
    debug_assert!(multiple.is_power_of_two());
    (number + multiple - 1) & multiple.wrapping_neg()
}

/// A 2-D patch: the projection of one connected component onto its plane.
#[derive(Debug, Clone, Default)]
pub struct Patch {
    pub patch_index: usize,
    /// Projection plane index, 0..6.
    pub patch_ppi: usize,

    pub normal_axis: usize,
    pub tangent_axis: usize,
    pub bitangent_axis: usize,
    /// false: layer 1 keeps the minimum depth; true: the maximum.
    pub projection_mode: bool,

    /// Tangential shift (minU of the bounding box).
    pub pos_u: usize,
    /// Bitangential shift (minV of the bounding box).
    pub pos_v: usize,
    /// Depth shift, a multiple of `minLevel`.
    pub pos_d: usize,
    /// Quantized depth extent of the patch.
    pub size_d: usize,

    /// Bounding box width, a multiple of the occupancy block size.
    pub width_in_pixel: usize,
    /// Bounding box height, a multiple of the occupancy block size.
    pub height_in_pixel: usize,
    pub width_in_occ_blk: usize,
    pub height_in_occ_blk: usize,

    /// Atlas position in downscaled-occupancy blocks, filled by the packer.
    pub om_ds_pos_x: usize,
    pub om_ds_pos_y: usize,
    /// Packed with tangent and bitangent swapped, decided by the packer.
    pub axis_swap: bool,
    /// Set by the packer when the patch did not fit a fixed-height atlas.
    pub is_discarded: bool,

    /// First (near) depth layer, `INFINITE_DEPTH` where empty.
    pub depth_l1: Vec<GeometryCoord>,
    /// Back reference into the frame point cloud for every written pixel.
    pub depth_pc_idx_l1: Vec<usize>,
    /// Second (far) depth layer, present when `doubleLayer` is enabled.
    pub depth_l2: Vec<GeometryCoord>,
    pub depth_pc_idx_l2: Vec<usize>,

    /// Full-resolution per-patch occupancy, one byte per pixel.
    pub patch_occupancy: Vec<u8>,
}

impl Patch {
    /// Derive the projection axes and mode from the PPI (fixed table).
    pub fn set_patch_ppi(&mut self, ppi: usize) {
        self.patch_ppi = ppi;
        let (normal, tangent, bitangent, mode) = match ppi {
            0 => (0, 2, 1, false),
            1 => (1, 2, 0, false),
            2 => (2, 0, 1, false),
            3 => (0, 2, 1, true),
            4 => (1, 2, 0, true),
            5 => (2, 0, 1, true),
            _ => unreachable!("PPI out of range: {ppi}"),
        };
        self.normal_axis = normal;
        self.tangent_axis = tangent;
        self.bitangent_axis = bitangent;
        self.projection_mode = mode;
    }
}

/// One input frame and, as the pipeline advances, its patches and maps.
///
/// Geometry and attribute buffers are released as soon as the stages that
/// need them have run (the patches keep index back references instead).
#[derive(Debug, Default)]
pub struct Frame {
    /// Relative index, 0 for the first submitted frame.
    pub frame_id: usize,
    /// Number from the input naming, used for log and export labels.
    pub frame_number: usize,
    /// Label for intermediate exports done by outer layers.
    pub base_name: String,

    pub points_geometry: Vec<Vector3<GeometryCoord>>,
    pub points_attribute: Vec<[u8; 3]>,

    pub patch_list: Vec<Patch>,
    /// Point index -> 1 + index of the patch that captured it.
    pub patch_partition: Vec<usize>,

    /// Full-resolution map height of this frame (unified per GOF).
    pub map_height: usize,
    /// Downscaled occupancy map height, set by the packer.
    pub map_height_ds: usize,

    /// Full-resolution occupancy, one byte in {0,1} per pixel.
    pub occupancy_map: Vec<u8>,
    /// Downscaled occupancy, YUV420-padded for the 2-D encoder.
    pub occupancy_map_ds: Vec<u8>,

    /// YUV420 planar geometry maps.
    pub geometry_map_l1: Vec<u8>,
    pub geometry_map_l2: Vec<u8>,
    /// Attribute maps: planar RGB during generation, YUV420 after conversion.
    pub attribute_map_l1: Vec<u8>,
    pub attribute_map_l2: Vec<u8>,
}

impl Frame {
    pub fn new(
        frame_id: usize,
        frame_number: usize,
        base_name: impl Into<String>,
        points_geometry: Vec<Vector3<GeometryCoord>>,
        points_attribute: Vec<[u8; 3]>,
    ) -> Self {
        debug_assert_eq!(points_geometry.len(), points_attribute.len());
        Self {
            frame_id,
            frame_number,
            base_name: base_name.into(),
            points_geometry,
            points_attribute,
            ..Self::default()
        }
    }
}

/// A group of frames coded as one 2-D video segment.
///
/// The GOF owns its frames exclusively; per-frame stages receive the few
/// GOF-level fields they need by value.
#[derive(Debug, Default)]
pub struct Gof {
    pub gof_id: usize,
    pub frames: Vec<Frame>,

    /// Unified full-resolution map height for all member frames.
    pub map_height_gof: usize,
    pub map_height_ds_gof: usize,

    pub bitstream_occupancy: Vec<u8>,
    pub bitstream_geometry: Vec<u8>,
    pub bitstream_attribute: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_table_matches_ppi() {
        let mut patch = Patch::default();
        for ppi in 0..PROJECTION_PLANE_COUNT {
            patch.set_patch_ppi(ppi);
            assert_eq!(patch.normal_axis, [0, 1, 2][ppi % 3]);
            assert_eq!(patch.projection_mode, ppi >= 3);
            // The three axes are a permutation of {0,1,2}.
            let mut axes = [patch.normal_axis, patch.tangent_axis, patch.bitangent_axis];
            axes.sort_unstable();
            assert_eq!(axes, [0, 1, 2]);
        }
    }

    #[test]
    fn plane_normals_are_axis_aligned_units() {
        for ppi in 0..PROJECTION_PLANE_COUNT {
            let n = projection_plane_normal(ppi);
            assert_eq!(n.norm(), 1.0);
            assert_eq!(n.abs().max(), 1.0);
        }
    }

    #[test]
    fn round_up_multiples() {
        assert_eq!(round_up(7, 8), 8);
        assert_eq!(round_up(17, 8), 24);
        assert_eq!(round_up(16, 8), 16);
        assert_eq!(round_up(1, 2), 2);
    }
}
