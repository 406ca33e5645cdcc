//! Background filling of the geometry and attribute atlases. Empty areas
//! are given values continuous with the patches so the downstream video
//! codec spends fewer bits on them.

use crate::parameters::{AttributeBgFill, Parameters};

const NEIGHBORS_4: [[i64; 2]; 4] = [[0, -1], [-1, 0], [1, 0], [0, 1]];

/// Patch-extension fill of a single-channel (geometry) plane: empty
/// blocks copy their left column or top row, mixed blocks run the
/// iterative 4-neighbor average. Bounded by blockSize^2 iterations, a
/// filled pixel whose true value equals the background sentinel may stall
/// the count.
fn fill_geometry_patch_extension<const BLOCK: usize>(
    occupancy_ds: &[u8],
    gof_maps_height: usize,
    geometry: &mut [u8],
    map_width: usize,
    background: u8,
    fill_empty_blocks: bool,
) {
    let blocks_u = map_width / BLOCK;
    let blocks_v = gof_maps_height / BLOCK;
    let pixel_block_count = BLOCK * BLOCK;

    let mut iterations = vec![0u32; pixel_block_count];
    let mut count = vec![0usize; pixel_block_count];
    let mut values = vec![0i32; pixel_block_count];

    for y_blk in 0..blocks_v {
        let y_offset = y_blk * BLOCK;
        for x_blk in 0..blocks_u {
            let x_offset = x_blk * BLOCK;

            if occupancy_ds[x_blk + y_blk * blocks_u] == 0 {
                if !fill_empty_blocks {
                    continue;
                }
                if x_blk > 0 {
                    let left_x = x_offset - 1;
                    for v in 0..BLOCK {
                        let y = y_offset + v;
                        let left_value = geometry[left_x + y * map_width];
                        let row = x_offset + y * map_width;
                        geometry[row..row + BLOCK].fill(left_value);
                    }
                } else if y_blk > 0 {
                    let top_y = y_offset - 1;
                    for u in 0..BLOCK {
                        let x = x_offset + u;
                        let top_value = geometry[x + top_y * map_width];
                        for v in 0..BLOCK {
                            geometry[x + (y_offset + v) * map_width] = top_value;
                        }
                    }
                }
                // The top-left block keeps the uniform background.
                continue;
            }

            iterations.fill(0);
            let mut empty_pixel_count = 0usize;
            for v in 0..BLOCK {
                for u in 0..BLOCK {
                    let index = x_offset + u + (y_offset + v) * map_width;
                    if geometry[index] == background {
                        empty_pixel_count += 1;
                    } else {
                        iterations[u + v * BLOCK] = 1;
                    }
                }
            }
            if empty_pixel_count == 0 {
                continue;
            }

            count.fill(0);
            values.fill(0);
            let mut iteration = 1u32;
            while empty_pixel_count > 0 && (iteration as usize) < pixel_block_count {
                for v in 0..BLOCK {
                    for u in 0..BLOCK {
                        if iterations[u + v * BLOCK] != iteration {
                            continue;
                        }
                        let source =
                            geometry[x_offset + u + (y_offset + v) * map_width] as i32;
                        for n in NEIGHBORS_4 {
                            let un = u as i64 + n[0];
                            let vn = v as i64 + n[1];
                            if un < 0 || un >= BLOCK as i64 || vn < 0 || vn >= BLOCK as i64 {
                                continue;
                            }
                            let neighbor = un as usize + vn as usize * BLOCK;
                            if iterations[neighbor] != 0 {
                                continue;
                            }
                            values[neighbor] += source;
                            count[neighbor] += 1;
                        }
                    }
                }
                for v in 0..BLOCK {
                    for u in 0..BLOCK {
                        let local = u + v * BLOCK;
                        if count[local] == 0 {
                            continue;
                        }
                        let index = x_offset + u + (y_offset + v) * map_width;
                        let c = count[local] as i32;
                        geometry[index] = ((values[local] + c / 2) / c) as u8;
                        iterations[local] = iteration + 1;
                        empty_pixel_count -= 1;
                        count[local] = 0;
                        values[local] = 0;
                    }
                }
                iteration += 1;
            }
        }
    }
}

/// Fill the Y plane of one geometry map.
pub(crate) fn bg_fill_geometry(
    occupancy_ds: &[u8],
    gof_maps_height: usize,
    geometry: &mut [u8],
    params: &Parameters,
) {
    let background = params.map_generation_background_value_geometry;
    match params.occupancy_map_ds_resolution {
        2 => fill_geometry_patch_extension::<2>(
            occupancy_ds,
            gof_maps_height,
            geometry,
            params.map_width,
            background,
            params.map_generation_fill_empty_block,
        ),
        4 => fill_geometry_patch_extension::<4>(
            occupancy_ds,
            gof_maps_height,
            geometry,
            params.map_width,
            background,
            params.map_generation_fill_empty_block,
        ),
        other => unreachable!("unsupported occupancy downscale factor {other}"),
    }
}

fn fill_attribute_patch_extension(
    occupancy_ds: &[u8],
    gof_maps_height: usize,
    attribute: &mut [u8],
    params: &Parameters,
) {
    let block = params.occupancy_map_ds_resolution;
    let map_width = params.map_width;
    let channel_offset = map_width * gof_maps_height;
    let blocks_u = map_width / block;
    let blocks_v = gof_maps_height / block;
    let pixel_block_count = block * block;
    let background = params.map_generation_background_value_attribute;

    let mut iterations = vec![0u32; pixel_block_count];
    let mut count = vec![0usize; pixel_block_count];
    let mut values_r = vec![0i32; pixel_block_count];
    let mut values_g = vec![0i32; pixel_block_count];
    let mut values_b = vec![0i32; pixel_block_count];

    for y_blk in 0..blocks_v {
        let y_offset = y_blk * block;
        for x_blk in 0..blocks_u {
            let x_offset = x_blk * block;

            if occupancy_ds[x_blk + y_blk * blocks_u] == 0 {
                // No reconstructed point in this block: extend the left
                // column or the top row.
                if !params.map_generation_fill_empty_block {
                    continue;
                }
                if x_blk > 0 {
                    for v in 0..block {
                        let y = y_offset + v;
                        let left = x_offset - 1 + y * map_width;
                        let left_r = attribute[left];
                        let left_g = attribute[left + channel_offset];
                        let left_b = attribute[left + 2 * channel_offset];
                        for u in 0..block {
                            let index = x_offset + u + y * map_width;
                            attribute[index] = left_r;
                            attribute[index + channel_offset] = left_g;
                            attribute[index + 2 * channel_offset] = left_b;
                        }
                    }
                } else if y_blk > 0 {
                    for u in 0..block {
                        let x = x_offset + u;
                        let top = x + (y_offset - 1) * map_width;
                        let top_r = attribute[top];
                        let top_g = attribute[top + channel_offset];
                        let top_b = attribute[top + 2 * channel_offset];
                        for v in 0..block {
                            let index = x + (y_offset + v) * map_width;
                            attribute[index] = top_r;
                            attribute[index + channel_offset] = top_g;
                            attribute[index + 2 * channel_offset] = top_b;
                        }
                    }
                }
                continue;
            }

            let mut empty_pixel_count = 0usize;
            iterations.fill(0);
            for v in 0..block {
                for u in 0..block {
                    let index = x_offset + u + (y_offset + v) * map_width;
                    // A real value equal to the background sentinel counts
                    // as missing; the iteration bound below caps the
                    // resulting extra rounds.
                    if attribute[index] == background {
                        empty_pixel_count += 1;
                    } else {
                        iterations[u + v * block] = 1;
                    }
                }
            }
            if empty_pixel_count == 0 {
                continue;
            }

            count.fill(0);
            values_r.fill(0);
            values_g.fill(0);
            values_b.fill(0);
            let mut iteration = 1u32;
            while empty_pixel_count > 0 && (iteration as usize) < pixel_block_count {
                for v in 0..block {
                    for u in 0..block {
                        if iterations[u + v * block] != iteration {
                            continue;
                        }
                        let index = x_offset + u + (y_offset + v) * map_width;
                        for n in NEIGHBORS_4 {
                            let un = u as i64 + n[0];
                            let vn = v as i64 + n[1];
                            if un < 0 || un >= block as i64 || vn < 0 || vn >= block as i64 {
                                continue;
                            }
                            let neighbor = un as usize + vn as usize * block;
                            if iterations[neighbor] != 0 {
                                continue;
                            }
                            values_r[neighbor] += attribute[index] as i32;
                            values_g[neighbor] += attribute[index + channel_offset] as i32;
                            values_b[neighbor] += attribute[index + 2 * channel_offset] as i32;
                            count[neighbor] += 1;
                        }
                    }
                }
                for v in 0..block {
                    for u in 0..block {
                        let local = u + v * block;
                        if count[local] == 0 {
                            continue;
                        }
                        let index = x_offset + u + (y_offset + v) * map_width;
                        let c = count[local] as i32;
                        attribute[index] = ((values_r[local] + c / 2) / c) as u8;
                        attribute[index + channel_offset] = ((values_g[local] + c / 2) / c) as u8;
                        attribute[index + 2 * channel_offset] =
                            ((values_b[local] + c / 2) / c) as u8;
                        iterations[local] = iteration + 1;
                        empty_pixel_count -= 1;
                        count[local] = 0;
                        values_r[local] = 0;
                        values_g[local] = 0;
                        values_b[local] = 0;
                    }
                }
                iteration += 1;
            }
        }
    }
}

fn mean4w(p1: u8, w1: u32, p2: u8, w2: u32, p3: u8, w3: u32, p4: u8, w4: u32) -> u8 {
    let sum = p1 as u32 * w1 + p2 as u32 * w2 + p3 as u32 * w3 + p4 as u32 * w4;
    (sum / (w1 + w2 + w3 + w4)) as u8
}

/// One pull step: a half-resolution weighted mip of the filled pixels.
fn push_pull_mip(
    image: &[u8],
    width: usize,
    height: usize,
    new_width: usize,
    new_height: usize,
    mip: &mut Vec<u8>,
    occupancy: &[u8],
    mip_occupancy: &mut Vec<u8>,
) {
    mip.resize(new_width * new_height * 3, 0);
    mip_occupancy.clear();
    mip_occupancy.resize(new_width * new_height, 0);

    for y in 0..new_height {
        let y_up = y << 1;
        for x in 0..new_width {
            let x_up = x << 1;
            let w1 = if occupancy[x_up + width * y_up] == 0 { 0 } else { 255 };
            let w2 = if x_up + 1 >= width || occupancy[x_up + 1 + width * y_up] == 0 {
                0
            } else {
                255
            };
            let w3 = if y_up + 1 >= height || occupancy[x_up + width * (y_up + 1)] == 0 {
                0
            } else {
                255
            };
            let w4 = if x_up + 1 >= width
                || y_up + 1 >= height
                || occupancy[x_up + 1 + width * (y_up + 1)] == 0
            {
                0
            } else {
                255
            };
            if w1 + w2 + w3 + w4 == 0 {
                continue;
            }
            for channel in 0..3 {
                let plane = channel * width * height;
                let val1 = image[x_up + y_up * width + plane];
                let val2 = if x_up + 1 >= width {
                    0
                } else {
                    image[x_up + 1 + y_up * width + plane]
                };
                let val3 = if y_up + 1 >= height {
                    0
                } else {
                    image[x_up + (y_up + 1) * width + plane]
                };
                let val4 = if x_up + 1 >= width || y_up + 1 >= height {
                    0
                } else {
                    image[x_up + 1 + (y_up + 1) * width + plane]
                };
                mip[x + y * new_width + channel * new_width * new_height] =
                    mean4w(val1, w1, val2, w2, val3, w3, val4, w4);
            }
            mip_occupancy[x + new_width * y] = 1;
        }
    }
}

/// One push step: interpolate empty pixels from the coarser mip with a
/// 4-tap filter keyed on the sub-position, then box-smooth `num_iters`
/// times.
fn push_pull_fill(
    image: &mut Vec<u8>,
    width: usize,
    height: usize,
    width_up: usize,
    height_up: usize,
    mip: &[u8],
    occupancy_up: &[u8],
    num_iters: usize,
) {
    let plane = width * height;
    let plane_up = width_up * height_up;

    for y_up in 0..height_up {
        let y = y_up >> 1;
        for x_up in 0..width_up {
            let x = x_up >> 1;
            if occupancy_up[x_up + width_up * y_up] != 0 {
                continue;
            }
            // Horizontal/vertical taps lean toward the parent texel the
            // pixel sits in.
            let (dx, dy): (i64, i64) = match (x_up % 2, y_up % 2) {
                (0, 0) => (-1, -1),
                (1, 0) => (1, -1),
                (0, 1) => (-1, 1),
                _ => (1, 1),
            };
            let x2 = x as i64 + dx;
            let y2 = y as i64 + dy;
            let has_x = x2 >= 0 && (x2 as usize) < width;
            let has_y = y2 >= 0 && (y2 as usize) < height;
            let w1 = 144u32;
            let w2 = if has_x { 48 } else { 0 };
            let w3 = if has_y { 48 } else { 0 };
            let w4 = if has_x && has_y { 16 } else { 0 };
            for channel in 0..3 {
                let base = channel * plane;
                let val = mip[x + y * width + base];
                let val_x = if has_x {
                    mip[x2 as usize + y * width + base]
                } else {
                    0
                };
                let val_y = if has_y {
                    mip[x + y2 as usize * width + base]
                } else {
                    0
                };
                let val_xy = if has_x && has_y {
                    mip[x2 as usize + y2 as usize * width + base]
                } else {
                    0
                };
                image[x_up + y_up * width_up + channel * plane_up] =
                    mean4w(val, w1, val_x, w2, val_y, w3, val_xy, w4);
            }
        }
    }

    let mut scratch = image.clone();
    for _ in 0..num_iters {
        for y in 0..height_up {
            let y1 = y.saturating_sub(1);
            let y2 = (y + 1).min(height_up - 1);
            for x in 0..width_up {
                if occupancy_up[x + width_up * y] != 0 {
                    continue;
                }
                let x1 = x.saturating_sub(1);
                let x2 = (x + 1).min(width_up - 1);
                for channel in 0..3 {
                    let base = channel * plane_up;
                    let sum = image[x1 + y1 * width_up + base] as u32
                        + image[x2 + y1 * width_up + base] as u32
                        + image[x1 + y2 * width_up + base] as u32
                        + image[x2 + y2 * width_up + base] as u32
                        + image[x1 + y * width_up + base] as u32
                        + image[x2 + y * width_up + base] as u32
                        + image[x + y1 * width_up + base] as u32
                        + image[x + y2 * width_up + base] as u32;
                    scratch[x + y * width_up + base] = ((sum + 4) >> 3) as u8;
                }
            }
        }
        std::mem::swap(image, &mut scratch);
    }
}

fn fill_attribute_push_pull(
    occupancy_map: &[u8],
    gof_maps_height: usize,
    attribute: &mut Vec<u8>,
    params: &Parameters,
) {
    let mut mips: Vec<Vec<u8>> = Vec::new();
    let mut mip_occupancies: Vec<Vec<u8>> = Vec::new();
    let mut widths: Vec<usize> = Vec::new();
    let mut heights: Vec<usize> = Vec::new();

    let mut width = params.map_width;
    let mut height = gof_maps_height;
    let mut new_width = (width + 1) >> 1;
    let mut new_height = (height + 1) >> 1;

    // Pull phase: build the weighted mip pyramid.
    loop {
        let level = mips.len();
        mips.push(Vec::new());
        mip_occupancies.push(Vec::new());
        widths.push(new_width);
        heights.push(new_height);

        if level > 0 {
            let (previous, current) = mips.split_at_mut(level);
            let (previous_occ, current_occ) = mip_occupancies.split_at_mut(level);
            push_pull_mip(
                &previous[level - 1],
                width,
                height,
                new_width,
                new_height,
                &mut current[0],
                &previous_occ[level - 1],
                &mut current_occ[0],
            );
        } else {
            push_pull_mip(
                attribute,
                width,
                height,
                new_width,
                new_height,
                &mut mips[0],
                occupancy_map,
                &mut mip_occupancies[0],
            );
        }

        if new_width <= 4 || new_height <= 4 {
            break;
        }
        width = new_width;
        height = new_height;
        new_width = (width + 1) >> 1;
        new_height = (height + 1) >> 1;
    }

    // Push phase: refill from the coarsest level down, smoothing more
    // aggressively near full resolution.
    let mut num_iters = 4usize;
    for level in (0..mips.len()).rev() {
        if level > 0 {
            let width = widths[level];
            let height = heights[level];
            let width_up = widths[level - 1];
            let height_up = heights[level - 1];
            let (previous, current) = mips.split_at_mut(level);
            push_pull_fill(
                &mut previous[level - 1],
                width,
                height,
                width_up,
                height_up,
                &current[0],
                &mip_occupancies[level - 1],
                num_iters,
            );
        } else {
            push_pull_fill(
                attribute,
                widths[0],
                heights[0],
                params.map_width,
                gof_maps_height,
                &mips[0],
                occupancy_map,
                num_iters,
            );
        }
        num_iters = (num_iters + 1).min(16);
    }
}

/// Block-based patch extension at `blockSizeBBPE` granularity: blocks
/// with no downscaled occupancy are skipped, mixed blocks propagate the
/// 4-neighbor average inward from the occupied pixels.
fn fill_attribute_bbpe(
    occupancy_map: &[u8],
    occupancy_ds: &[u8],
    map_height: usize,
    attribute: &mut [u8],
    params: &Parameters,
) {
    let block = params.block_size_bbpe;
    let map_width = params.map_width;
    let bbpe_width = map_width / block;
    let bbpe_height = map_height / block;
    let block_in_ds = block / params.occupancy_map_ds_resolution;
    let ds_width = map_width / params.occupancy_map_ds_resolution;
    let pixel_block_count = block * block;
    let channel_offset = map_width * map_height;

    let mut iterations = vec![0u32; pixel_block_count];
    let mut count = vec![0usize; pixel_block_count];
    let mut values_r = vec![0i32; pixel_block_count];
    let mut values_g = vec![0i32; pixel_block_count];
    let mut values_b = vec![0i32; pixel_block_count];

    for y_bbpe in 0..bbpe_height {
        let y_ds_offset = y_bbpe * block_in_ds;
        let y_pixel_offset = y_bbpe * block;

        for x_bbpe in 0..bbpe_width {
            let x_ds_offset = x_bbpe * block_in_ds;
            let x_pixel_offset = x_bbpe * block;

            let occupied = (0..block_in_ds).any(|j| {
                let row = (y_ds_offset + j) * ds_width;
                (0..block_in_ds).any(|i| occupancy_ds[row + x_ds_offset + i] > 0)
            });
            if !occupied {
                continue;
            }

            let mut occupied_pixel_count = 0usize;
            for j in 0..block {
                let row = (y_pixel_offset + j) * map_width + x_pixel_offset;
                for i in 0..block {
                    occupied_pixel_count += occupancy_map[row + i] as usize;
                }
            }
            if occupied_pixel_count == pixel_block_count {
                continue;
            }

            count.fill(0);
            values_r.fill(0);
            values_g.fill(0);
            values_b.fill(0);
            let mut empty_pixel_count = pixel_block_count - occupied_pixel_count;

            for j in 0..block {
                let y = y_pixel_offset + j;
                for i in 0..block {
                    let x = x_pixel_offset + i;
                    iterations[i + j * block] = occupancy_map[x + y * map_width] as u32;
                }
            }

            let mut iteration = 1u32;
            while empty_pixel_count > 0 && (iteration as usize) < pixel_block_count {
                for v in 0..block {
                    let y = y_pixel_offset + v;
                    for u in 0..block {
                        if iterations[u + v * block] != iteration {
                            continue;
                        }
                        let index = x_pixel_offset + u + y * map_width;
                        for n in NEIGHBORS_4 {
                            let un = u as i64 + n[0];
                            let vn = v as i64 + n[1];
                            if un < 0 || vn < 0 || un >= block as i64 || vn >= block as i64 {
                                continue;
                            }
                            let neighbor = un as usize + vn as usize * block;
                            if iterations[neighbor] > 0 {
                                continue;
                            }
                            values_r[neighbor] += attribute[index] as i32;
                            values_g[neighbor] += attribute[index + channel_offset] as i32;
                            values_b[neighbor] += attribute[index + 2 * channel_offset] as i32;
                            count[neighbor] += 1;
                        }
                    }
                }

                iteration += 1;
                for local in 0..pixel_block_count {
                    if count[local] == 0 {
                        continue;
                    }
                    let u = local % block;
                    let v = local / block;
                    let index = x_pixel_offset + u + (y_pixel_offset + v) * map_width;
                    let c = count[local] as i32;
                    attribute[index] = ((values_r[local] + c / 2) / c) as u8;
                    attribute[index + channel_offset] = ((values_g[local] + c / 2) / c) as u8;
                    attribute[index + 2 * channel_offset] = ((values_b[local] + c / 2) / c) as u8;
                    iterations[local] = iteration;
                    empty_pixel_count -= 1;
                    count[local] = 0;
                }
            }
        }
    }
}

/// Fill one attribute map (planar RGB) with the configured algorithm.
pub(crate) fn bg_fill_attribute(
    occupancy_map: &[u8],
    occupancy_ds: &[u8],
    map_height: usize,
    attribute: &mut Vec<u8>,
    params: &Parameters,
) {
    match params.attribute_bg_fill {
        AttributeBgFill::PatchExtension => {
            fill_attribute_patch_extension(occupancy_ds, map_height, attribute, params)
        }
        AttributeBgFill::Bbpe => {
            fill_attribute_bbpe(occupancy_map, occupancy_ds, map_height, attribute, params)
        }
        AttributeBgFill::PushPull => {
            fill_attribute_push_pull(occupancy_map, map_height, attribute, params)
        }
        AttributeBgFill::None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params(width: usize) -> Parameters {
        let mut params = Parameters::default();
        params.map_width = width;
        params.occupancy_map_ds_resolution = 2;
        params
    }

    #[test]
    fn geometry_patch_extension_is_idempotent() {
        let params = test_params(8);
        let height = 8;
        // Two occupied DS blocks with values far from the background so a
        // second run sees no pixel as missing.
        let mut occupancy_ds = vec![0u8; 4 * 4];
        occupancy_ds[0] = 1;
        occupancy_ds[5] = 1;
        let mut geometry = vec![128u8; 8 * 8];
        geometry[0] = 10;
        geometry[9] = 30;
        geometry[2 * 8 + 2] = 50;

        bg_fill_geometry(&occupancy_ds, height, &mut geometry, &params);
        let first = geometry.clone();
        bg_fill_geometry(&occupancy_ds, height, &mut geometry, &params);
        assert_eq!(first, geometry);
        assert!(geometry.iter().all(|&p| p != 128));
    }

    #[test]
    fn empty_blocks_copy_their_left_column() {
        let params = test_params(8);
        let mut occupancy_ds = vec![0u8; 4 * 4];
        occupancy_ds[0] = 1;
        let mut geometry = vec![128u8; 8 * 8];
        geometry[0] = 40;
        geometry[1] = 40;
        geometry[8] = 40;
        geometry[9] = 40;

        bg_fill_geometry(&occupancy_ds, 8, &mut geometry, &params);
        // The block right of the occupied one took the rightmost column.
        assert_eq!(geometry[2], 40);
        assert_eq!(geometry[3], 40);
    }

    #[test]
    fn mixed_block_averages_its_neighbors() {
        let params = test_params(4);
        let mut occupancy_ds = vec![0u8; 2 * 2];
        occupancy_ds[0] = 1;
        let mut geometry = vec![128u8; 4 * 4];
        geometry[0] = 20;
        geometry[1] = 40;

        bg_fill_geometry(&occupancy_ds, 4, &mut geometry, &params);
        // Pixel (0,1) has exactly one filled 4-neighbor (value 20).
        assert_eq!(geometry[4], 20);
        // Pixel (1,1) then averages over its filled neighbors.
        assert_ne!(geometry[5], 128);
    }

    #[test]
    fn attribute_patch_extension_fills_every_channel() {
        let params = test_params(4);
        let height = 4;
        let plane = 4 * height;
        let mut occupancy_ds = vec![0u8; 2 * 2];
        occupancy_ds[0] = 1;
        let mut attribute = vec![128u8; plane * 3];
        attribute[0] = 200;
        attribute[plane] = 90;
        attribute[2 * plane] = 30;

        bg_fill_attribute(&[], &occupancy_ds, height, &mut attribute, &params);
        // The occupied block is fully propagated in all three planes.
        for v in 0..2 {
            for u in 0..2 {
                let index = u + v * 4;
                assert_eq!(attribute[index], 200);
                assert_eq!(attribute[index + plane], 90);
                assert_eq!(attribute[index + 2 * plane], 30);
            }
        }
    }

    #[test]
    fn push_pull_fills_all_empty_pixels() {
        let mut params = test_params(16);
        params.attribute_bg_fill = AttributeBgFill::PushPull;
        let height = 16;
        let plane = 16 * height;
        let mut occupancy = vec![0u8; plane];
        let mut attribute = vec![0u8; plane * 3];
        for y in 4..8 {
            for x in 4..8 {
                occupancy[x + y * 16] = 1;
                attribute[x + y * 16] = 180;
                attribute[x + y * 16 + plane] = 90;
                attribute[x + y * 16 + 2 * plane] = 45;
            }
        }

        bg_fill_attribute(&occupancy, &[], height, &mut attribute, &params);
        // Empty pixels converge toward the single patch color.
        for y in 0..16 {
            for x in 0..16 {
                let index = x + y * 16;
                if occupancy[index] == 0 {
                    assert!(attribute[index] > 0, "pixel ({x},{y}) untouched");
                }
            }
        }
    }

    #[test]
    fn bbpe_skips_unoccupied_blocks() {
        let mut params = test_params(8);
        params.attribute_bg_fill = AttributeBgFill::Bbpe;
        params.block_size_bbpe = 4;
        let height = 8;
        let plane = 8 * height;
        let mut occupancy = vec![0u8; plane];
        let mut occupancy_ds = vec![0u8; 4 * 4];
        let mut attribute = vec![128u8; plane * 3];
        // One occupied 2x2 full-res region in the top-left BBPE block.
        for y in 0..2 {
            for x in 0..2 {
                occupancy[x + y * 8] = 1;
                attribute[x + y * 8] = 60;
            }
        }
        occupancy_ds[0] = 1;

        bg_fill_attribute(&occupancy, &occupancy_ds, height, &mut attribute, &params);
        // Inside the occupied BBPE block the fill propagated,
        assert_eq!(attribute[2], 60);
        // while fully empty BBPE blocks stayed at the background.
        assert_eq!(attribute[7 + 7 * 8], 128);
    }
}
