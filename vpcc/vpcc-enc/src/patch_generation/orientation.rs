//! Consistent normal orientation: a Kruskal-like sweep over KNN edges,
//! strongest-coupled edges first.

use std::collections::BinaryHeap;

use nalgebra::Vector3;

use crate::GeometryCoord;

struct WeightedEdge {
    weight: f64,
    start: usize,
    end: usize,
}

impl PartialEq for WeightedEdge {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for WeightedEdge {}

impl Ord for WeightedEdge {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Lexicographic on (weight, start, end) so that equal-weight pops
        // are deterministic.
        self.weight
            .total_cmp(&other.weight)
            .then(self.start.cmp(&other.start))
            .then(self.end.cmp(&other.end))
    }
}

impl PartialOrd for WeightedEdge {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Push the unvisited KNN edges of `current` and, for seeds, accumulate
/// the normals of already-visited neighbors.
fn add_neighbors(
    normals: &[Vector3<f64>],
    current: usize,
    nn_lists: &[Vec<usize>],
    knn_count: usize,
    visited: &[bool],
    edges: &mut BinaryHeap<WeightedEdge>,
    mut accumulate: Option<(&mut Vector3<f64>, &mut usize)>,
) {
    // The first KNN entry is the query point itself, always visited here.
    for &index in &nn_lists[current][1..knn_count.min(nn_lists[current].len())] {
        if visited[index] {
            if let Some((sum, count)) = accumulate.as_mut() {
                **sum += normals[index];
                **count += 1;
            }
        } else {
            edges.push(WeightedEdge {
                weight: normals[current].dot(&normals[index]).abs(),
                start: current,
                end: index,
            });
        }
    }
}

/// Flip normals in place so neighboring normals agree in sign. Seeds with
/// no visited neighbor orient against the viewpoint at the origin.
pub(crate) fn orient_normals(
    points: &[Vector3<GeometryCoord>],
    normals: &mut [Vector3<f64>],
    nn_lists: &[Vec<usize>],
    knn_count: usize,
) {
    let mut visited = vec![false; points.len()];
    let mut edges: BinaryHeap<WeightedEdge> = BinaryHeap::new();

    for seed in 0..points.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;

        let mut accumulated = Vector3::zeros();
        let mut count = 0usize;
        add_neighbors(
            normals,
            seed,
            nn_lists,
            knn_count,
            &visited,
            &mut edges,
            Some((&mut accumulated, &mut count)),
        );

        if count == 0 {
            // Nothing visited around this seed: orient toward the
            // viewpoint at the origin. This is the first point of each
            // disconnected region.
            let p = &points[seed];
            accumulated = -Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64);
        }
        if normals[seed].dot(&accumulated) < 0.0 {
            normals[seed] = -normals[seed];
        }

        while let Some(edge) = edges.pop() {
            let current = edge.end;
            if visited[current] {
                continue;
            }
            visited[current] = true;
            if normals[edge.start].dot(&normals[current]) < 0.0 {
                normals[current] = -normals[current];
            }
            add_neighbors(normals, current, nn_lists, knn_count, &visited, &mut edges, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch_generation::kd_tree::KdTree;
    use crate::patch_generation::normals::compute_normals;

    #[test]
    fn plane_normals_agree_after_orientation() {
        let mut points = Vec::new();
        for x in 0..6u16 {
            for y in 0..6u16 {
                points.push(Vector3::new(x, y, 9));
            }
        }
        let tree = KdTree::new(4, &points);
        let nn_lists: Vec<Vec<usize>> = points
            .iter()
            .map(|p| {
                let mut out = Vec::new();
                tree.knn(p, 6, &mut out);
                out
            })
            .collect();

        let mut normals = compute_normals(&points, &nn_lists, 6, 8);
        // Deliberately flip every other normal.
        for (index, n) in normals.iter_mut().enumerate() {
            if index % 2 == 0 {
                *n = -*n;
            }
        }
        orient_normals(&points, &mut normals, &nn_lists, 6);

        for (index, n) in normals.iter().enumerate() {
            for &other in &nn_lists[index][1..] {
                let dot = n.dot(&normals[other]);
                if dot.abs() > 0.5 {
                    assert!(dot >= 0.0, "disagreeing neighbors {index} and {other}");
                }
            }
        }
        // The z=9 plane seen from the origin: normals point toward -z.
        assert!(normals.iter().all(|n| n[2] < 0.0));
    }
}
