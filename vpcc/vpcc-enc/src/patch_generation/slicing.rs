//! Slicing-based PPI assignment: instead of estimating normals, the point
//! set is cut into 1-voxel-thick slices along each axis and a contour
//! weaving walk derives a per-axis PPI from the local travel direction.
//! The three axis votes are then merged and smoothed by a refine pass.

use std::sync::LazyLock;

use fxhash::FxHashMap;
use nalgebra::Vector3;

use crate::parameters::{Parameters, PresetName};
use crate::patch_generation::ppi::{refine_segmentation, RefineSegmentationConfig};
use crate::GeometryCoord;

/// In-plane axes per slicing family: for slices stacked along X the plane
/// coordinates are (y, z), along Y (x, z), along Z (y, x).
pub(crate) const AXIS_X: [usize; 2] = [1, 2];
pub(crate) const AXIS_Y: [usize; 2] = [0, 2];
pub(crate) const AXIS_Z: [usize; 2] = [1, 0];

/// Per-axis PPI vote. Values 0..6 map onto the projection planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlicePpi {
    Ppi0,
    Ppi1,
    Ppi2,
    Ppi3,
    Ppi4,
    Ppi5,
    /// Diagonal step, resolved by the smoothing fill.
    Blank,
    NotAssigned,
}

impl SlicePpi {
    fn index(self) -> Option<usize> {
        match self {
            SlicePpi::Ppi0 => Some(0),
            SlicePpi::Ppi1 => Some(1),
            SlicePpi::Ppi2 => Some(2),
            SlicePpi::Ppi3 => Some(3),
            SlicePpi::Ppi4 => Some(4),
            SlicePpi::Ppi5 => Some(5),
            _ => None,
        }
    }
}

/// Marks a point whose merged vote is still ambiguous after the three-axis
/// merge; resolved by parent inheritance.
const UNDEFINED_PARENT_PPI: usize = usize::MAX - 1;
const PPI_NOT_ASSIGNED: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Point2 {
    x: i32,
    y: i32,
}

/// Blind spot marker inside the reading-order matrices.
const BS: i32 = 0;

/// Base reading-order matrices for the neighbor search, one per incoming
/// direction class; the remaining 18 are quarter rotations of these.
/// A non-zero entry is the 1-based priority of that shift.
#[rustfmt::skip]
const BASE_MATRICES: [[[i32; 7]; 7]; 6] = [
    [
        [BS, BS, 19, 13, 14, BS, BS],
        [BS, 20, 12,  7,  8, 11, BS],
        [23, 18,  6,  5,  2,  4, 10],
        [22, 17, 15, BS,  1,  3,  9],
        [26, 21, 16, BS, BS, BS, BS],
        [BS, 27, 25, 24, BS, BS, BS],
        [BS, BS, 29, 28, BS, BS, BS],
    ],
    [
        [BS, BS, 14,  8,  9, BS, BS],
        [BS, 15,  7,  4,  5,  6, BS],
        [18, 13,  3,  2,  1, BS, BS],
        [17, 12, 10, BS, BS, BS, BS],
        [22, 16, 11, 19, BS, BS, BS],
        [BS, 23, 21, 20, 24, 28, BS],
        [BS, BS, 26, 25, 27, BS, BS],
    ],
    [
        [BS, BS, 15,  9, 10, BS, BS],
        [BS, 16,  8,  4,  6,  7, BS],
        [19, 14,  3,  2,  1,  5, BS],
        [18, 13, 11, BS, BS, BS, BS],
        [23, 17, 12, 20, BS, BS, BS],
        [BS, 24, 22, 21, BS, BS, BS],
        [BS, BS, 27, 26, 28, BS, BS],
    ],
    [
        [BS, BS, 16, 10, 11, BS, BS],
        [BS, 17,  9,  4,  6,  8, BS],
        [20, 15,  3,  2,  1,  5,  7],
        [19, 14, 12, BS, BS, BS, BS],
        [24, 18, 13, 21, BS, BS, BS],
        [BS, 25, 23, 22, BS, BS, BS],
        [BS, BS, 27, 26, BS, BS, BS],
    ],
    [
        [BS, BS, 13,  7,  8, BS, BS],
        [BS, 14,  6,  4,  5, BS, BS],
        [17, 12,  2,  1, BS, BS, BS],
        [16, 11,  3, BS, BS, BS, BS],
        [21, 15,  9, 10, 18, BS, BS],
        [BS, 22, 20, 19, 23, 27, BS],
        [BS, BS, 25, 24, 26, BS, BS],
    ],
    [
        [BS, BS,  8,  6,  7, BS, BS],
        [BS, 12,  5,  4, BS, BS, BS],
        [15,  9,  2,  1, BS, BS, BS],
        [14, 11,  3, BS, BS, BS, BS],
        [20, 13, 10, 16, 17, 25, BS],
        [BS, 21, 19, 18, 22, 26, BS],
        [BS, BS, 24, 23, 27, BS, BS],
    ],
];

fn rotate_90_ccw(mat: &[[i32; 7]; 7]) -> [[i32; 7]; 7] {
    let mut result = [[0i32; 7]; 7];
    for (i, row) in result.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = mat[j][6 - i];
        }
    }
    result
}

/// The 24 reading-order matrices: each base matrix and its three quarter
/// rotations.
static SEARCH_MATRICES: LazyLock<[[[i32; 7]; 7]; 24]> = LazyLock::new(|| {
    let mut result = [[[0i32; 7]; 7]; 24];
    let mut k = 0;
    for base in &BASE_MATRICES {
        result[k] = *base;
        result[k + 1] = rotate_90_ccw(&result[k]);
        result[k + 2] = rotate_90_ccw(&result[k + 1]);
        result[k + 3] = rotate_90_ccw(&result[k + 2]);
        k += 4;
    }
    result
});

/// Shift lists derived from the matrices, ordered by priority, and the
/// number of valid shifts in each.
static ORDERED_SHIFTS: LazyLock<([[Point2; 49]; 24], [usize; 24])> = LazyLock::new(|| {
    let na = Point2 {
        x: i32::MAX,
        y: i32::MAX,
    };
    let mut shifts = [[na; 49]; 24];
    let mut counts = [0usize; 24];
    for (k, matrix) in SEARCH_MATRICES.iter().enumerate() {
        for (i, row) in matrix.iter().enumerate() {
            for (j, &score) in row.iter().enumerate() {
                if score != BS {
                    shifts[k][(score - 1) as usize] = Point2 {
                        x: 3 - i as i32,
                        y: j as i32 - 3,
                    };
                }
            }
        }
        counts[k] = shifts[k].iter().take_while(|p| p.x != i32::MAX).count();
    }
    (shifts, counts)
});

/// Matrix index for a given previous-direction vector, indexed as
/// `[3 - v.x][v.y + 3]`. NA cells are never reached.
const NA: usize = 48;
#[rustfmt::skip]
const DIRECTION_TO_MATRIX: [[usize; 7]; 7] = [
    [NA, NA, 12,  0, 23, NA, NA],
    [NA,  4,  8,  0, 19,  7, NA],
    [20, 16,  4,  0,  7, 11, 15],
    [ 1,  1,  1, NA,  3,  3,  3],
    [13,  9,  5,  2,  6, 18, 22],
    [NA,  5, 17,  2, 10,  6, NA],
    [NA, NA, 21,  2, 14, NA, NA],
];

/// Heuristic distance of each shift, same indexing as the matrices.
#[rustfmt::skip]
const DISTANCES_LUT: [[usize; 7]; 7] = [
    [8, 7, 6, 5, 6, 7, 8],
    [7, 4, 3, 2, 3, 4, 7],
    [6, 3, 1, 1, 1, 3, 6],
    [5, 2, 1, 0, 1, 2, 5],
    [6, 3, 1, 1, 1, 3, 6],
    [7, 4, 3, 2, 3, 4, 7],
    [8, 7, 6, 5, 6, 7, 8],
];

/// PPI of a travel direction per axis family, ordered by the argmax of
/// the dot products {y, -x, -y, x}.
const DIRECTION_TO_PPI: [[SlicePpi; 4]; 3] = [
    // Slices along X: the plane is (y, z).
    [SlicePpi::Ppi4, SlicePpi::Ppi5, SlicePpi::Ppi1, SlicePpi::Ppi2],
    // Slices along Y: the plane is (x, z).
    [SlicePpi::Ppi3, SlicePpi::Ppi5, SlicePpi::Ppi0, SlicePpi::Ppi2],
    // Slices along Z: the plane is (y, x).
    [SlicePpi::Ppi4, SlicePpi::Ppi3, SlicePpi::Ppi1, SlicePpi::Ppi0],
];

#[inline]
fn pos_1d(x: i32, y: i32, bits: usize) -> u64 {
    x as u64 + ((y as u64) << bits)
}

fn direction_ppi(axis_id: usize, vector: Point2) -> SlicePpi {
    let dots = [vector.y, -vector.x, -vector.y, vector.x];
    let mut best = 0;
    for k in 1..4 {
        if dots[k] > dots[best] {
            best = k;
        }
    }
    DIRECTION_TO_PPI[axis_id][best]
}

/// Search state of one slice: which points are still free to be woven.
struct MapSearch {
    free_points: FxHashMap<u64, usize>,
    subslice_children: Vec<u64>,
}

impl MapSearch {
    fn new(
        slice: &[usize],
        points: &[Vector3<GeometryCoord>],
        axis: [usize; 2],
        bits: usize,
    ) -> Self {
        let mut free_points = FxHashMap::default();
        free_points.reserve(slice.len());
        for (slice_index, &point_index) in slice.iter().enumerate() {
            let p = &points[point_index];
            free_points.insert(pos_1d(p[axis[0]] as i32, p[axis[1]] as i32, bits), slice_index);
        }
        Self {
            free_points,
            subslice_children: Vec::with_capacity(slice.len()),
        }
    }

    fn find(&self, key: u64) -> Option<usize> {
        self.free_points.get(&key).copied()
    }

    fn erase(&mut self, key: u64) {
        self.free_points.remove(&key);
    }

    fn add_child(&mut self, key: u64) {
        self.subslice_children.push(key);
    }

    /// Children of a finished subslice can no longer seed or join another
    /// subslice.
    fn end_of_subslice(&mut self) {
        let children = std::mem::take(&mut self.subslice_children);
        for key in children {
            self.free_points.remove(&key);
        }
    }
}

/// Find the best next point around `current`, enlisting nearby extras as
/// children of the current point. Returns the slice index of the best
/// candidate and its heuristic distance.
#[allow(clippy::too_many_arguments)]
fn find_next_point(
    child_to_parent: &mut FxHashMap<usize, usize>,
    current_index_pg: usize,
    slice: &[usize],
    is_in_subslice: &mut [bool],
    search: &mut MapSearch,
    current: Point2,
    previous_vector: Point2,
    bits: usize,
) -> Option<(usize, usize)> {
    let grid_end = 1i32 << bits;
    let matrix_index =
        DIRECTION_TO_MATRIX[(3 - previous_vector.x) as usize][(previous_vector.y + 3) as usize];
    debug_assert_ne!(matrix_index, NA);

    let (shift_lists, counts) = &*ORDERED_SHIFTS;
    let shifts = &shift_lists[matrix_index][..counts[matrix_index]];

    let mut best: Option<(usize, usize)> = None;
    let mut best_shift_index = 0;
    for (shift_index, shift) in shifts.iter().enumerate() {
        let adj = Point2 {
            x: current.x + shift.x,
            y: current.y + shift.y,
        };
        if adj.x < 0 || adj.x >= grid_end || adj.y < 0 || adj.y >= grid_end {
            continue;
        }
        let key = pos_1d(adj.x, adj.y, bits);
        if let Some(neighbor_index) = search.find(key) {
            let distance = DISTANCES_LUT[(3 - shift.x) as usize][(shift.y + 3) as usize];
            search.erase(key);
            best = Some((neighbor_index, distance));
            best_shift_index = shift_index;
            break;
        }
    }

    let (_, best_distance) = best?;

    // Later shifts within distance + 1 become children of the current
    // point: close enough to inherit its PPI, not on the walked contour.
    let extended = best_distance + 1;
    for shift in &shifts[best_shift_index + 1..] {
        if DISTANCES_LUT[(3 - shift.x) as usize][(shift.y + 3) as usize] > extended {
            continue;
        }
        let adj = Point2 {
            x: current.x + shift.x,
            y: current.y + shift.y,
        };
        if adj.x < 0 || adj.x >= grid_end || adj.y < 0 || adj.y >= grid_end {
            continue;
        }
        let key = pos_1d(adj.x, adj.y, bits);
        if let Some(neighbor_index) = search.find(key) {
            if is_in_subslice[neighbor_index] {
                continue;
            }
            is_in_subslice[neighbor_index] = true;
            child_to_parent.insert(slice[neighbor_index], current_index_pg);
            search.add_child(key);
        }
    }

    best
}

/// Decide whether returning to the starting point beats moving on to the
/// best candidate.
fn is_end_of_subslice(
    best_distance: usize,
    current: Point2,
    previous_vector: Point2,
    best_point: Point2,
    starting_vector: Point2,
) -> bool {
    let starting_distance = if starting_vector.x.abs() == 1 && starting_vector.y.abs() == 1 {
        1
    } else {
        (starting_vector.x * starting_vector.x + starting_vector.y * starting_vector.y) as usize
    };
    debug_assert_ne!(starting_distance, 0);

    if starting_distance < best_distance {
        return true;
    }
    if starting_distance > best_distance {
        return false;
    }

    // Same distance: compare priorities in the current reading order.
    if previous_vector.x == -starting_vector.x && previous_vector.y == -starting_vector.y {
        // Going straight back where we came from is never the end.
        return false;
    }
    let matrix_index =
        DIRECTION_TO_MATRIX[(3 - previous_vector.x) as usize][(previous_vector.y + 3) as usize];
    debug_assert_ne!(matrix_index, NA);

    let start_score = SEARCH_MATRICES[matrix_index][(3 - starting_vector.x) as usize]
        [(starting_vector.y + 3) as usize];
    if start_score == BS {
        // The starting point sits in a blind spot: closing wins.
        return true;
    }
    let candidate_vector = Point2 {
        x: best_point.x - current.x,
        y: best_point.y - current.y,
    };
    let candidate_score = SEARCH_MATRICES[matrix_index][(3 - candidate_vector.x) as usize]
        [(candidate_vector.y + 3) as usize];
    start_score <= candidate_score
}

/// Fill a maximal run of blank PPIs from its two non-blank endpoints.
fn fill_blank_run(
    ppis: &mut [SlicePpi],
    low_index: usize,
    up_index: usize,
    low: SlicePpi,
    up: SlicePpi,
) {
    if low == up {
        for ppi in &mut ppis[low_index + 1..up_index] {
            *ppi = low;
        }
        return;
    }
    let len = up_index - low_index - 1;
    let len_half = len / 2 + 1;
    for ppi in &mut ppis[low_index + 1..low_index + 1 + len_half] {
        *ppi = low;
    }
    for ppi in &mut ppis[low_index + 1 + len_half..up_index] {
        *ppi = up;
    }
}

fn smooth_slice_ppis(ppis: &mut [SlicePpi]) {
    let mut low_index = 0;
    let mut inside_run = false;
    for index in 1..ppis.len() {
        if !inside_run && ppis[index] == SlicePpi::Blank && ppis[index - 1] != SlicePpi::Blank {
            low_index = index - 1;
            inside_run = true;
        } else if inside_run && ppis[index] != SlicePpi::Blank {
            let low = ppis[low_index];
            let up = ppis[index];
            fill_blank_run(ppis, low_index, index, low, up);
            inside_run = false;
        }
    }
}

/// Weave one subslice starting at `start_index_pg`; appends to the parent
/// order/PPI lists. Returns when the contour closes or runs out.
#[allow(clippy::too_many_arguments)]
fn weave_subslice(
    start_index_pg: usize,
    start_point: Point2,
    slice: &[usize],
    points: &[Vector3<GeometryCoord>],
    child_to_parent: &mut FxHashMap<usize, usize>,
    is_in_subslice: &mut [bool],
    parent_ordered_index: &mut Vec<usize>,
    parent_ordered_ppis: &mut Vec<SlicePpi>,
    search: &mut MapSearch,
    axis: [usize; 2],
    axis_id: usize,
    bits: usize,
) {
    let mut current_index_pg = start_index_pg;
    let mut current = start_point;
    let mut starting_vector = Point2 { x: 0, y: 0 };
    let mut previous_vector = Point2 { x: 1, y: 0 };
    let mut is_start = true;

    loop {
        let Some((best_index_slice, best_distance)) = find_next_point(
            child_to_parent,
            current_index_pg,
            slice,
            is_in_subslice,
            search,
            current,
            previous_vector,
            bits,
        ) else {
            break; // no neighbors left, open end
        };

        let best_index_pg = slice[best_index_slice];
        let best_point = Point2 {
            x: points[best_index_pg][axis[0]] as i32,
            y: points[best_index_pg][axis[1]] as i32,
        };

        if !is_start
            && is_end_of_subslice(
                best_distance,
                current,
                previous_vector,
                best_point,
                starting_vector,
            )
        {
            if !is_in_subslice[best_index_slice] {
                // The last candidate still joins as a child.
                child_to_parent.insert(best_index_pg, current_index_pg);
                is_in_subslice[best_index_slice] = true;
            }
            break; // looped back to the start
        }

        previous_vector = Point2 {
            x: best_point.x - current.x,
            y: best_point.y - current.y,
        };
        if is_start {
            parent_ordered_ppis.push(direction_ppi(axis_id, previous_vector));
        } else if previous_vector.x.abs() == previous_vector.y.abs() {
            // Diagonal steps get a PPI during the smoothing fill.
            parent_ordered_ppis.push(SlicePpi::Blank);
        } else {
            parent_ordered_ppis.push(direction_ppi(axis_id, previous_vector));
        }

        current = best_point;
        current_index_pg = best_index_pg;
        starting_vector = Point2 {
            x: start_point.x - current.x,
            y: start_point.y - current.y,
        };

        if is_in_subslice[best_index_slice] {
            // Promoted from child to parent within this subslice.
            child_to_parent.remove(&best_index_pg);
        } else {
            is_in_subslice[best_index_slice] = true;
        }

        parent_ordered_index.push(best_index_pg);
        is_start = false;
    }

    // PPI of the last point of the subslice.
    if is_start {
        // Single-point subslice.
        parent_ordered_ppis.push(SlicePpi::Ppi0);
    } else if *parent_ordered_ppis.last().unwrap() == SlicePpi::Blank {
        let closing_vector = Point2 {
            x: start_point.x - current.x,
            y: start_point.y - current.y,
        };
        parent_ordered_ppis.push(direction_ppi(axis_id, closing_vector));
    } else {
        parent_ordered_ppis.push(*parent_ordered_ppis.last().unwrap());
    }

    search.end_of_subslice();
}

/// Weave every subslice of one slice and write the parents' PPI votes.
pub(crate) fn weave_slice(
    slice: &[usize],
    points: &[Vector3<GeometryCoord>],
    child_to_parent: &mut FxHashMap<usize, usize>,
    point_ppis_axis: &mut [SlicePpi],
    axis: [usize; 2],
    axis_id: usize,
    bits: usize,
) {
    let mut is_in_subslice = vec![false; slice.len()];
    let mut parent_ordered_ppis: Vec<SlicePpi> = Vec::with_capacity(slice.len());
    let mut parent_ordered_index: Vec<usize> = Vec::with_capacity(slice.len());
    let mut search = MapSearch::new(slice, points, axis, bits);

    let mut next_start = 0usize;
    loop {
        let Some(offset) = is_in_subslice[next_start..].iter().position(|&used| !used) else {
            break; // every slice point is woven
        };
        let start_index_slice = next_start + offset;
        next_start = start_index_slice + 1;

        let start_index_pg = slice[start_index_slice];
        let start_point = Point2 {
            x: points[start_index_pg][axis[0]] as i32,
            y: points[start_index_pg][axis[1]] as i32,
        };
        search.erase(pos_1d(start_point.x, start_point.y, bits));
        parent_ordered_index.push(start_index_pg);
        is_in_subslice[start_index_slice] = true;

        weave_subslice(
            start_index_pg,
            start_point,
            slice,
            points,
            child_to_parent,
            &mut is_in_subslice,
            &mut parent_ordered_index,
            &mut parent_ordered_ppis,
            &mut search,
            axis,
            axis_id,
            bits,
        );
    }

    smooth_slice_ppis(&mut parent_ordered_ppis);
    for (order_index, &point_index) in parent_ordered_index.iter().enumerate() {
        point_ppis_axis[point_index] = parent_ordered_ppis[order_index];
    }
}

/// Bucket point indices into 1-voxel-thick slices along every axis.
fn create_slices(
    points: &[Vector3<GeometryCoord>],
    bits: usize,
) -> [Vec<Vec<usize>>; 3] {
    let level_count = 1usize << bits;
    let mut slices = [
        vec![Vec::new(); level_count],
        vec![Vec::new(); level_count],
        vec![Vec::new(); level_count],
    ];
    for (point_index, point) in points.iter().enumerate() {
        slices[0][point[0] as usize].push(point_index);
        slices[1][point[1] as usize].push(point_index);
        slices[2][point[2] as usize].push(point_index);
    }
    slices
}

fn weave_axis(
    slices: &mut [Vec<usize>],
    points: &[Vector3<GeometryCoord>],
    child_to_parent: &mut FxHashMap<usize, usize>,
    point_ppis_axis: &mut [SlicePpi],
    axis: [usize; 2],
    axis_id: usize,
    bits: usize,
) {
    child_to_parent.reserve(points.len());
    for slice in slices.iter_mut() {
        if slice.is_empty() {
            continue;
        }
        // Sorted along the primary in-plane axis, index as the tie-break.
        slice.sort_unstable_by_key(|&index| (points[index][axis[0]], index));
        weave_slice(
            slice,
            points,
            child_to_parent,
            point_ppis_axis,
            axis,
            axis_id,
            bits,
        );
    }
}

fn ppi_normal(ppi: SlicePpi) -> Vector3<f64> {
    crate::projection_plane_normal(ppi.index().expect("blank vote has no normal"))
}

/// Merge the three axis votes of a parent point. Two agreeing axes give a
/// weighted point (unit normal); three disagreeing give the Y vote with a
/// zero normal; anything thinner stays undefined.
fn merged_parent_ppi(
    ppi_x: SlicePpi,
    ppi_y: SlicePpi,
    ppi_z: SlicePpi,
    attributions: usize,
    normal: &mut Vector3<f64>,
) -> usize {
    if attributions == 1 {
        return UNDEFINED_PARENT_PPI;
    }
    if (ppi_x == ppi_y || ppi_z == ppi_y) && ppi_y != SlicePpi::NotAssigned {
        *normal = ppi_normal(ppi_y);
        return ppi_y.index().unwrap();
    }
    if ppi_x == ppi_z && ppi_x != SlicePpi::NotAssigned {
        *normal = ppi_normal(ppi_x);
        return ppi_x.index().unwrap();
    }
    if attributions == 3 {
        // All three differ: keep the Y vote, non-weighted.
        return ppi_y.index().unwrap();
    }
    UNDEFINED_PARENT_PPI
}

/// Resolve a parent whose votes stayed ambiguous: inherit from its own
/// parent along a missing axis (priority Y, X, Z), else fall back to the
/// first assigned axis vote in the same order.
#[allow(clippy::too_many_arguments)]
fn undefined_parent_ppi(
    point_ppis: &[usize],
    ppi_x: SlicePpi,
    ppi_y: SlicePpi,
    ppi_z: SlicePpi,
    child_to_parent_x: &FxHashMap<usize, usize>,
    child_to_parent_y: &FxHashMap<usize, usize>,
    child_to_parent_z: &FxHashMap<usize, usize>,
    index: usize,
) -> usize {
    if ppi_y == SlicePpi::NotAssigned {
        if let Some(&parent) = child_to_parent_y.get(&index) {
            if point_ppis[parent] < 6 {
                return point_ppis[parent];
            }
        }
    }
    if ppi_x == SlicePpi::NotAssigned {
        if let Some(&parent) = child_to_parent_x.get(&index) {
            if point_ppis[parent] < 6 {
                return point_ppis[parent];
            }
        }
    }
    if ppi_z == SlicePpi::NotAssigned {
        if let Some(&parent) = child_to_parent_z.get(&index) {
            if point_ppis[parent] < 6 {
                return point_ppis[parent];
            }
        }
    }
    if let Some(ppi) = ppi_y.index() {
        return ppi;
    }
    if let Some(ppi) = ppi_x.index() {
        return ppi;
    }
    ppi_z.index().unwrap_or(1)
}

/// Children inherit the (refined) PPI of their parent, axis priority Y,
/// X, Z.
fn inherit_child_ppis(
    child_to_parent_x: &FxHashMap<usize, usize>,
    child_to_parent_y: &FxHashMap<usize, usize>,
    child_to_parent_z: &FxHashMap<usize, usize>,
    point_ppis: &mut [usize],
) {
    for index in 0..point_ppis.len() {
        if point_ppis[index] < 6 {
            continue;
        }
        let mut inherited = None;
        for map in [child_to_parent_y, child_to_parent_x, child_to_parent_z] {
            if let Some(&parent) = map.get(&index) {
                if point_ppis[parent] < 6 {
                    inherited = Some(point_ppis[parent]);
                    break;
                }
            }
        }
        debug_assert!(inherited.is_some(), "point {index} has no resolved parent");
        point_ppis[index] = inherited.unwrap_or(1);
    }
}

fn slicing_refine_config(params: &Parameters) -> RefineSegmentationConfig {
    RefineSegmentationConfig {
        point_bits: params.geo_bit_depth_voxelized,
        grid_bits: params.geo_bit_depth_refine_segmentation,
        max_nn_voxel_distance_lut: params.slicing_refine_segmentation_max_nn_voxel_distance_lut,
        max_nn_total_point_count: params.slicing_refine_segmentation_max_nn_total_point_count,
        lambda: params.slicing_refine_segmentation_lambda,
        iteration_count: params.slicing_refine_segmentation_iteration_count,
    }
}

struct AxisVotes {
    ppis: [Vec<SlicePpi>; 3],
    child_to_parent: [FxHashMap<usize, usize>; 3],
}

/// The fast preset refines only parent points on a compacted sublist,
/// then children inherit.
fn final_attribution_fast(
    points: &[Vector3<GeometryCoord>],
    votes: &AxisVotes,
    point_ppis: &mut [usize],
    params: &Parameters,
) {
    let point_count = points.len();
    let mut parent_ppis = Vec::with_capacity(point_count);
    let mut parent_geometry = Vec::with_capacity(point_count);
    let mut parent_normals: Vec<Vector3<f64>> = Vec::with_capacity(point_count);
    let mut parent_index_in_pg = Vec::with_capacity(point_count);

    for index in 0..point_count {
        let ppi_x = votes.ppis[0][index];
        let ppi_y = votes.ppis[1][index];
        let ppi_z = votes.ppis[2][index];
        let attributions = [ppi_x, ppi_y, ppi_z]
            .iter()
            .filter(|&&p| p != SlicePpi::NotAssigned)
            .count();
        if attributions == 0 {
            continue; // pure child
        }
        let mut normal = Vector3::zeros();
        point_ppis[index] = merged_parent_ppi(ppi_x, ppi_y, ppi_z, attributions, &mut normal);
        if point_ppis[index] == UNDEFINED_PARENT_PPI {
            continue; // resolved in the second sweep below
        }
        parent_ppis.push(point_ppis[index]);
        parent_index_in_pg.push(index);
        parent_geometry.push(points[index]);
        parent_normals.push(normal);
    }

    for index in 0..point_count {
        if point_ppis[index] != UNDEFINED_PARENT_PPI {
            continue;
        }
        let ppi = undefined_parent_ppi(
            point_ppis,
            votes.ppis[0][index],
            votes.ppis[1][index],
            votes.ppis[2][index],
            &votes.child_to_parent[0],
            &votes.child_to_parent[1],
            &votes.child_to_parent[2],
            index,
        );
        point_ppis[index] = ppi;
        parent_ppis.push(ppi);
        parent_index_in_pg.push(index);
        parent_geometry.push(points[index]);
        parent_normals.push(Vector3::zeros());
    }

    refine_segmentation(
        &parent_geometry,
        &parent_normals,
        &mut parent_ppis,
        &slicing_refine_config(params),
    );
    for (sublist_index, &pg_index) in parent_index_in_pg.iter().enumerate() {
        point_ppis[pg_index] = parent_ppis[sublist_index];
    }

    inherit_child_ppis(
        &votes.child_to_parent[0],
        &votes.child_to_parent[1],
        &votes.child_to_parent[2],
        point_ppis,
    );
}

/// The slow preset lets children inherit first, then refines everything.
fn final_attribution_slow(
    points: &[Vector3<GeometryCoord>],
    votes: &AxisVotes,
    point_ppis: &mut [usize],
    params: &Parameters,
) {
    let point_count = points.len();
    let mut normals: Vec<Vector3<f64>> = vec![Vector3::zeros(); point_count];

    for index in 0..point_count {
        let ppi_x = votes.ppis[0][index];
        let ppi_y = votes.ppis[1][index];
        let ppi_z = votes.ppis[2][index];
        let attributions = [ppi_x, ppi_y, ppi_z]
            .iter()
            .filter(|&&p| p != SlicePpi::NotAssigned)
            .count();
        if attributions == 0 {
            continue;
        }
        point_ppis[index] =
            merged_parent_ppi(ppi_x, ppi_y, ppi_z, attributions, &mut normals[index]);
    }

    for index in 0..point_count {
        if point_ppis[index] != UNDEFINED_PARENT_PPI {
            continue;
        }
        point_ppis[index] = undefined_parent_ppi(
            point_ppis,
            votes.ppis[0][index],
            votes.ppis[1][index],
            votes.ppis[2][index],
            &votes.child_to_parent[0],
            &votes.child_to_parent[1],
            &votes.child_to_parent[2],
            index,
        );
    }

    inherit_child_ppis(
        &votes.child_to_parent[0],
        &votes.child_to_parent[1],
        &votes.child_to_parent[2],
        point_ppis,
    );
    refine_segmentation(points, &normals, point_ppis, &slicing_refine_config(params));
}

/// Assign a PPI to every point through the slicing path. `points` is the
/// voxelized geometry at `geoBitDepthVoxelized` bits.
pub(crate) fn assign_ppis_slicing(
    points: &[Vector3<GeometryCoord>],
    point_ppis: &mut [usize],
    params: &Parameters,
) {
    let bits = params.geo_bit_depth_voxelized;
    let point_count = points.len();
    point_ppis.fill(PPI_NOT_ASSIGNED);

    let mut slices = create_slices(points, bits);
    let mut votes = AxisVotes {
        ppis: [
            vec![SlicePpi::NotAssigned; point_count],
            vec![SlicePpi::NotAssigned; point_count],
            vec![SlicePpi::NotAssigned; point_count],
        ],
        child_to_parent: [
            FxHashMap::default(),
            FxHashMap::default(),
            FxHashMap::default(),
        ],
    };

    let [slices_x, slices_y, slices_z] = &mut slices;
    let [ppis_x, ppis_y, ppis_z] = &mut votes.ppis;
    let [map_x, map_y, map_z] = &mut votes.child_to_parent;
    weave_axis(slices_x, points, map_x, ppis_x, AXIS_X, 0, bits);
    weave_axis(slices_y, points, map_y, ppis_y, AXIS_Y, 1, bits);
    weave_axis(slices_z, points, map_z, ppis_z, AXIS_Z, 2, bits);

    match params.preset_name {
        PresetName::Fast => final_attribution_fast(points, &votes, point_ppis, params),
        PresetName::Slow => final_attribution_slow(points, &votes, point_ppis, params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_tables_are_consistent() {
        let (shifts, counts) = &*ORDERED_SHIFTS;
        for k in 0..24 {
            assert!(counts[k] > 0);
            for shift in &shifts[k][..counts[k]] {
                assert!(shift.x.abs() <= 3 && shift.y.abs() <= 3);
                assert!(!(shift.x == 0 && shift.y == 0));
            }
        }
    }

    #[test]
    fn blank_runs_are_filled_from_both_ends() {
        let mut ppis = vec![
            SlicePpi::Ppi0,
            SlicePpi::Blank,
            SlicePpi::Blank,
            SlicePpi::Blank,
            SlicePpi::Ppi1,
        ];
        smooth_slice_ppis(&mut ppis);
        assert!(!ppis.contains(&SlicePpi::Blank));
        assert_eq!(ppis[1], SlicePpi::Ppi0);
        assert_eq!(ppis[2], SlicePpi::Ppi0);
        assert_eq!(ppis[4], SlicePpi::Ppi1);
    }

    #[test]
    fn ring_weaves_into_one_closed_subslice() {
        // Twelve points on a circle of radius 4 in the XY plane, a single
        // Z slice. The weave must close the loop in one subslice and,
        // after smoothing, only in-plane PPIs (0/3 for X, 1/4 for Y)
        // remain.
        let center = 8i32;
        let offsets = [
            (4, 0),
            (3, 2),
            (2, 3),
            (0, 4),
            (-2, 3),
            (-3, 2),
            (-4, 0),
            (-3, -2),
            (-2, -3),
            (0, -4),
            (2, -3),
            (3, -2),
        ];
        let points: Vec<Vector3<GeometryCoord>> = offsets
            .iter()
            .map(|&(dx, dy)| {
                Vector3::new((center + dx) as u16, (center + dy) as u16, 5u16)
            })
            .collect();

        let bits = 5;
        let mut slice: Vec<usize> = (0..points.len()).collect();
        // Sorted along the primary in-plane axis of the Z family (y).
        slice.sort_unstable_by_key(|&index| (points[index][AXIS_Z[0]], index));

        let mut child_to_parent = FxHashMap::default();
        let mut axis_ppis = vec![SlicePpi::NotAssigned; points.len()];
        weave_slice(
            &slice,
            &points,
            &mut child_to_parent,
            &mut axis_ppis,
            AXIS_Z,
            2,
            bits,
        );

        // Every ring point was woven as a parent of a single loop; none
        // were demoted to children and no blank vote survived smoothing.
        assert!(child_to_parent.is_empty(), "ring points became children");
        for (index, ppi) in axis_ppis.iter().enumerate() {
            assert!(
                matches!(
                    ppi,
                    SlicePpi::Ppi0 | SlicePpi::Ppi1 | SlicePpi::Ppi3 | SlicePpi::Ppi4
                ),
                "point {index} got {ppi:?}"
            );
        }
    }

    #[test]
    fn full_slicing_assigns_every_point() {
        // A small solid box surface; whatever the contours do, every
        // point must end with a PPI in 0..6.
        let mut points = Vec::new();
        for x in 2..8u16 {
            for y in 2..8u16 {
                points.push(Vector3::new(x, y, 2));
                points.push(Vector3::new(x, y, 7));
            }
        }
        let mut params = Parameters::default();
        params.geo_bit_depth_input = 4;
        params.geo_bit_depth_voxelized = 4;
        params.geo_bit_depth_refine_segmentation = 3;
        params.activate_slicing = true;

        let mut ppis = vec![PPI_NOT_ASSIGNED; points.len()];
        assign_ppis_slicing(&points, &mut ppis, &params);
        assert!(ppis.iter().all(|&p| p < 6), "unassigned ppi present");
    }
}
