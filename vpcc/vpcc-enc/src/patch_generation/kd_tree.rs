//! A small static kd-tree for the k-nearest-neighbor searches feeding
//! normal estimation and orientation.

use std::collections::BinaryHeap;

use nalgebra::Vector3;

use crate::GeometryCoord;

enum Node {
    Leaf {
        start: usize,
        end: usize,
    },
    Split {
        axis: usize,
        value: i64,
        left: usize,
        right: usize,
    },
}

pub(crate) struct KdTree<'a> {
    points: &'a [Vector3<GeometryCoord>],
    nodes: Vec<Node>,
    order: Vec<usize>,
}

#[derive(PartialEq, Eq)]
struct HeapEntry {
    dist_sq: i64,
    index: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap over (distance, index): the lexicographically largest
        // entry is the first to be evicted, which makes ties on distance
        // resolve toward the lower point index.
        (self.dist_sq, self.index).cmp(&(other.dist_sq, other.index))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

fn dist_sq(a: &Vector3<GeometryCoord>, b: &Vector3<GeometryCoord>) -> i64 {
    let dx = a[0] as i64 - b[0] as i64;
    let dy = a[1] as i64 - b[1] as i64;
    let dz = a[2] as i64 - b[2] as i64;
    dx * dx + dy * dy + dz * dz
}

impl<'a> KdTree<'a> {
    pub fn new(max_leaf_size: usize, points: &'a [Vector3<GeometryCoord>]) -> Self {
        let mut order: Vec<usize> = (0..points.len()).collect();
        let mut nodes = Vec::new();
        if !points.is_empty() {
            build(points, &mut order, 0, points.len(), max_leaf_size.max(1), &mut nodes);
        }
        Self {
            points,
            nodes,
            order,
        }
    }

    /// Indices of the `k` points closest to `query`, nearest first, ties
    /// broken by lower index. When `query` is one of the indexed points it
    /// is its own first neighbor.
    pub fn knn(&self, query: &Vector3<GeometryCoord>, k: usize, out: &mut Vec<usize>) {
        out.clear();
        if self.nodes.is_empty() || k == 0 {
            return;
        }
        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(k + 1);
        self.search(0, query, k, &mut heap);

        let mut found = heap.into_vec();
        found.sort_unstable_by_key(|e| (e.dist_sq, e.index));
        out.extend(found.into_iter().map(|e| e.index));
    }

    fn search(&self, node: usize, query: &Vector3<GeometryCoord>, k: usize, heap: &mut BinaryHeap<HeapEntry>) {
        match self.nodes[node] {
            Node::Leaf { start, end } => {
                for &index in &self.order[start..end] {
                    let d = dist_sq(query, &self.points[index]);
                    if heap.len() < k {
                        heap.push(HeapEntry { dist_sq: d, index });
                    } else if let Some(worst) = heap.peek() {
                        if (d, index) < (worst.dist_sq, worst.index) {
                            heap.pop();
                            heap.push(HeapEntry { dist_sq: d, index });
                        }
                    }
                }
            }
            Node::Split {
                axis,
                value,
                left,
                right,
            } => {
                let delta = query[axis] as i64 - value;
                let (near, far) = if delta < 0 { (left, right) } else { (right, left) };
                self.search(near, query, k, heap);
                let plane_dist = delta * delta;
                let must_cross = heap.len() < k
                    || heap.peek().map_or(true, |worst| plane_dist <= worst.dist_sq);
                if must_cross {
                    self.search(far, query, k, heap);
                }
            }
        }
    }
}

/// Recursive median split on the widest axis. Returns the node index.
fn build(
    points: &[Vector3<GeometryCoord>],
    order: &mut [usize],
    start: usize,
    end: usize,
    max_leaf_size: usize,
    nodes: &mut Vec<Node>,
) -> usize {
    let node_id = nodes.len();
    if end - start <= max_leaf_size {
        nodes.push(Node::Leaf { start, end });
        return node_id;
    }

    // Widest axis of the bounding box of this range.
    let mut min = [GeometryCoord::MAX; 3];
    let mut max = [GeometryCoord::MIN; 3];
    for &index in &order[start..end] {
        for axis in 0..3 {
            min[axis] = min[axis].min(points[index][axis]);
            max[axis] = max[axis].max(points[index][axis]);
        }
    }
    let axis = (0..3)
        .max_by_key(|&a| (max[a] - min[a], std::cmp::Reverse(a)))
        .unwrap();

    let segment = &mut order[start..end];
    segment.sort_unstable_by_key(|&index| (points[index][axis], index));
    let mid = segment.len() / 2;
    let value = points[segment[mid]][axis] as i64;

    nodes.push(Node::Split {
        axis,
        value,
        left: 0,
        right: 0,
    });
    let left = build(points, order, start, start + mid, max_leaf_size, nodes);
    let right = build(points, order, start + mid, end, max_leaf_size, nodes);
    if let Node::Split {
        left: l, right: r, ..
    } = &mut nodes[node_id]
    {
        *l = left;
        *r = right;
    }
    node_id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force_knn(points: &[Vector3<GeometryCoord>], query: &Vector3<GeometryCoord>, k: usize) -> Vec<usize> {
        let mut all: Vec<(i64, usize)> = points
            .iter()
            .enumerate()
            .map(|(i, p)| (dist_sq(query, p), i))
            .collect();
        all.sort_unstable();
        all.truncate(k);
        all.into_iter().map(|(_, i)| i).collect()
    }

    #[test]
    fn knn_matches_brute_force_on_a_grid() {
        let mut points = Vec::new();
        for x in 0..6u16 {
            for y in 0..6u16 {
                points.push(Vector3::new(x * 3, y * 2, (x + y) % 4));
            }
        }
        let tree = KdTree::new(4, &points);
        let mut out = Vec::new();
        for query in &points {
            tree.knn(query, 5, &mut out);
            assert_eq!(out, brute_force_knn(&points, query, 5));
        }
    }

    #[test]
    fn query_point_is_first_neighbor() {
        let points = vec![
            Vector3::new(0u16, 0, 0),
            Vector3::new(10, 0, 0),
            Vector3::new(0, 10, 0),
        ];
        let tree = KdTree::new(2, &points);
        let mut out = Vec::new();
        tree.knn(&points[1], 2, &mut out);
        assert_eq!(out[0], 1);
    }

    #[test]
    fn ties_resolve_to_lower_index() {
        // Two points at the same distance from the query.
        let points = vec![
            Vector3::new(5u16, 5, 5),
            Vector3::new(6, 5, 5),
            Vector3::new(4, 5, 5),
        ];
        let tree = KdTree::new(1, &points);
        let mut out = Vec::new();
        tree.knn(&points[0], 2, &mut out);
        assert_eq!(out, vec![0, 1]);
    }
}
