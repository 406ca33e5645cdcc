//! Occupancy map downscaling: block-average the full-resolution map down
//! to the coded resolution.

use crate::parameters::Parameters;

fn downscale<const R: usize>(
    map_width: usize,
    map_height: usize,
    threshold: usize,
    occupancy_map: &mut [u8],
    occupancy_map_ds: &mut [u8],
) {
    let map_width_ds = map_width / R;
    let map_height_ds = map_height / R;
    for y_ds in 0..map_height_ds {
        for x_ds in 0..map_width_ds {
            let block_x = x_ds * R;
            let block_y = y_ds * R;

            let mut sum = 0usize;
            for dy in 0..R {
                let row = (block_y + dy) * map_width + block_x;
                for dx in 0..R {
                    sum += occupancy_map[row + dx] as usize;
                }
            }

            // A sum exactly at the threshold counts as present.
            if sum >= threshold {
                occupancy_map_ds[y_ds * map_width_ds + x_ds] = 1;
            } else {
                occupancy_map_ds[y_ds * map_width_ds + x_ds] = 0;
                // Zero the dropped block so background filling sees a
                // clean boundary.
                for dy in 0..R {
                    let row = (block_y + dy) * map_width + block_x;
                    occupancy_map[row..row + R].fill(0);
                }
            }
        }
    }
}

/// Downscale `occupancy_map` by `occupancyMapDSResolution` into the Y
/// plane of `occupancy_map_ds`, zeroing full-resolution blocks that fall
/// below the refinement threshold.
pub(crate) fn occupancy_map_downscaling(
    map_height: usize,
    occupancy_map: &mut [u8],
    occupancy_map_ds: &mut [u8],
    params: &Parameters,
) {
    match params.occupancy_map_ds_resolution {
        2 => downscale::<2>(
            params.map_width,
            map_height,
            params.om_refinement_treshold2,
            occupancy_map,
            occupancy_map_ds,
        ),
        4 => downscale::<4>(
            params.map_width,
            map_height,
            params.om_refinement_treshold4,
            occupancy_map,
            occupancy_map_ds,
        ),
        other => unreachable!("unsupported occupancy downscale factor {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params_r2(threshold: usize) -> Parameters {
        let mut params = Parameters::default();
        params.map_width = 4;
        params.occupancy_map_ds_resolution = 2;
        params.om_refinement_treshold2 = threshold;
        params
    }

    #[test]
    fn below_threshold_zeroes_the_block() {
        let params = params_r2(2);
        // One lit pixel in the top-left 2x2 block: threshold - 1 ones.
        let mut occupancy = vec![0u8; 4 * 4];
        occupancy[0] = 1;
        let mut ds = vec![0u8; 2 * 2];
        occupancy_map_downscaling(4, &mut occupancy, &mut ds, &params);
        assert_eq!(ds[0], 0);
        assert!(occupancy.iter().all(|&p| p == 0), "block was not cleared");
    }

    #[test]
    fn exactly_at_threshold_is_present() {
        let params = params_r2(2);
        let mut occupancy = vec![0u8; 4 * 4];
        occupancy[0] = 1;
        occupancy[1] = 1;
        let mut ds = vec![0u8; 2 * 2];
        occupancy_map_downscaling(4, &mut occupancy, &mut ds, &params);
        assert_eq!(ds[0], 1);
        // The full-resolution block is left intact.
        assert_eq!(occupancy[0], 1);
        assert_eq!(occupancy[1], 1);
    }

    #[test]
    fn r4_sums_the_whole_block() {
        let mut params = Parameters::default();
        params.map_width = 4;
        params.occupancy_map_ds_resolution = 4;
        params.om_refinement_treshold4 = 5;
        let mut occupancy = vec![0u8; 4 * 4];
        for i in 0..5 {
            occupancy[i * 3] = 1;
        }
        let mut ds = vec![0u8; 1];
        occupancy_map_downscaling(4, &mut occupancy, &mut ds, &params);
        assert_eq!(ds[0], 1);
    }
}
