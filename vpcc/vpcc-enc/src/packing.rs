//! The patch packing seam. The layout heuristic is a collaborator: it
//! receives the per-patch bounding boxes (in downscaled occupancy blocks)
//! and fills in the atlas coordinates. A minimal deterministic shelf
//! packer ships as the default so the pipeline runs end to end.

use crate::error::Error;
use crate::{round_up, Patch};

/// Atlas dimensions handed to the packer, in downscaled occupancy blocks.
#[derive(Debug, Clone, Copy)]
pub struct PackingContext {
    pub map_width_ds: usize,
    pub minimum_map_height_ds: usize,
    /// When false the atlas height is fixed at `minimum_map_height_ds`
    /// and patches that do not fit must be marked discarded.
    pub dynamic_map_height: bool,
}

/// Assigns `omDSPosX`/`omDSPosY` (and optionally `axisSwap`) to every
/// patch of a frame.
pub trait PatchPacker: Send + Sync {
    /// Lay out `patches` (already sorted largest first) and return the
    /// resulting atlas height in downscaled occupancy blocks.
    fn pack_frame(&self, patches: &mut [Patch], context: &PackingContext)
        -> Result<usize, Error>;
}

/// Row-by-row shelf layout: patches fill a shelf left to right; a patch
/// that does not fit opens a new shelf under the tallest patch so far.
#[derive(Debug, Default)]
pub struct ShelfPacker;

impl PatchPacker for ShelfPacker {
    fn pack_frame(
        &self,
        patches: &mut [Patch],
        context: &PackingContext,
    ) -> Result<usize, Error> {
        let width_limit = context.map_width_ds;
        let mut x = 0usize;
        let mut y = 0usize;
        let mut shelf_height = 0usize;

        for patch in patches.iter_mut() {
            let w = patch.width_in_occ_blk;
            let h = patch.height_in_occ_blk;
            if w > width_limit {
                return Err(Error::Precondition(format!(
                    "patch {} is wider than the atlas ({} > {} occupancy blocks); \
                     increase mapWidth or lower maxPatchSize",
                    patch.patch_index, w, width_limit
                )));
            }
            if x + w > width_limit {
                y += shelf_height;
                x = 0;
                shelf_height = 0;
            }
            if !context.dynamic_map_height && y + h > context.minimum_map_height_ds {
                log::debug!(target: "PATCH PACKING",
                    "patch {} does not fit the fixed atlas height, discarding", patch.patch_index);
                patch.is_discarded = true;
                continue;
            }
            patch.om_ds_pos_x = x;
            patch.om_ds_pos_y = y;
            patch.axis_swap = false;
            x += w;
            shelf_height = shelf_height.max(h);
        }

        let used_height = y + shelf_height;
        if context.dynamic_map_height {
            Ok(round_up(used_height.max(1), 8).max(context.minimum_map_height_ds))
        } else {
            Ok(context.minimum_map_height_ds)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_patch(index: usize, w: usize, h: usize) -> Patch {
        Patch {
            patch_index: index,
            width_in_occ_blk: w,
            height_in_occ_blk: h,
            ..Patch::default()
        }
    }

    #[test]
    fn patches_do_not_overlap() {
        let mut patches = vec![
            block_patch(0, 4, 4),
            block_patch(1, 4, 2),
            block_patch(2, 3, 3),
            block_patch(3, 2, 1),
        ];
        let context = PackingContext {
            map_width_ds: 8,
            minimum_map_height_ds: 8,
            dynamic_map_height: true,
        };
        let height = ShelfPacker.pack_frame(&mut patches, &context).unwrap();
        assert!(height >= 8);

        // Pairwise disjoint rectangles.
        for (i, a) in patches.iter().enumerate() {
            assert!(a.om_ds_pos_x + a.width_in_occ_blk <= context.map_width_ds);
            for b in patches.iter().skip(i + 1) {
                let disjoint_x = a.om_ds_pos_x + a.width_in_occ_blk <= b.om_ds_pos_x
                    || b.om_ds_pos_x + b.width_in_occ_blk <= a.om_ds_pos_x;
                let disjoint_y = a.om_ds_pos_y + a.height_in_occ_blk <= b.om_ds_pos_y
                    || b.om_ds_pos_y + b.height_in_occ_blk <= a.om_ds_pos_y;
                assert!(disjoint_x || disjoint_y, "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn fixed_height_discards_what_does_not_fit() {
        let mut patches = vec![block_patch(0, 8, 2), block_patch(1, 8, 2)];
        let context = PackingContext {
            map_width_ds: 8,
            minimum_map_height_ds: 2,
            dynamic_map_height: false,
        };
        let height = ShelfPacker.pack_frame(&mut patches, &context).unwrap();
        assert_eq!(height, 2);
        assert!(!patches[0].is_discarded);
        assert!(patches[1].is_discarded);
    }

    #[test]
    fn oversized_patch_is_a_precondition_error() {
        let mut patches = vec![block_patch(0, 16, 2)];
        let context = PackingContext {
            map_width_ds: 8,
            minimum_map_height_ds: 8,
            dynamic_map_height: true,
        };
        assert!(ShelfPacker.pack_frame(&mut patches, &context).is_err());
    }
}
