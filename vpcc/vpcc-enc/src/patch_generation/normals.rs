//! Per-point normal estimation: KNN barycenter, 3x3 covariance and a
//! bounded Jacobi-style diagonalization driven through a quaternion.

use nalgebra::{Matrix3, Vector3};

use crate::GeometryCoord;

/// Diagonalize the symmetric matrix `a`: returns `(q, d)` with
/// `d = qᵀ a q` diagonal up to the iteration budget. Two early exits: the
/// largest off-diagonal entry reaches zero, or the rotation hits
/// floating-point precision.
fn diagonalize(a: &Matrix3<f64>, max_steps: usize) -> (Matrix3<f64>, Matrix3<f64>) {
    let mut quat = [0.0f64, 0.0, 0.0, 1.0];
    let mut q = Matrix3::identity();
    let mut d = *a;

    for _ in 0..max_steps {
        let sqx = quat[0] * quat[0];
        let sqy = quat[1] * quat[1];
        let sqz = quat[2] * quat[2];
        let sqw = quat[3] * quat[3];
        q[(0, 0)] = sqx - sqy - sqz + sqw;
        q[(1, 1)] = -sqx + sqy - sqz + sqw;
        q[(2, 2)] = -sqx - sqy + sqz + sqw;
        let mut tmp1 = quat[0] * quat[1];
        let mut tmp2 = quat[2] * quat[3];
        q[(1, 0)] = 2.0 * (tmp1 + tmp2);
        q[(0, 1)] = 2.0 * (tmp1 - tmp2);
        tmp1 = quat[0] * quat[2];
        tmp2 = quat[1] * quat[3];
        q[(2, 0)] = 2.0 * (tmp1 - tmp2);
        q[(0, 2)] = 2.0 * (tmp1 + tmp2);
        tmp1 = quat[1] * quat[2];
        tmp2 = quat[0] * quat[3];
        q[(2, 1)] = 2.0 * (tmp1 + tmp2);
        q[(1, 2)] = 2.0 * (tmp1 - tmp2);

        d = q.transpose() * a * q;

        let off = [d[(1, 2)], d[(0, 2)], d[(0, 1)]];
        let mag = [off[0].abs(), off[1].abs(), off[2].abs()];
        let k0 = if mag[0] > mag[1] && mag[0] > mag[2] {
            0
        } else if mag[1] > mag[2] {
            1
        } else {
            2
        };
        let k1 = (k0 + 1) % 3;
        let k2 = (k0 + 2) % 3;
        if off[k0] == 0.0 {
            break; // already diagonal
        }

        let mut theta = (d[(k2, k2)] - d[(k1, k1)]) / (2.0 * off[k0]);
        let sign = if theta > 0.0 { 1.0 } else { -1.0 };
        theta *= sign;
        let t = sign
            / (theta
                + if theta < 1.0e6 {
                    (theta * theta + 1.0).sqrt()
                } else {
                    theta
                });
        let c = 1.0 / (t * t + 1.0).sqrt();
        if c == 1.0 {
            break; // no room for improvement, machine precision reached
        }

        let mut jr = [0.0f64; 4];
        // Half-angle identity; negated for the v*M quaternion convention.
        jr[k0] = -sign * ((1.0 - c) / 2.0).sqrt();
        jr[3] = (1.0 - jr[k0] * jr[k0]).sqrt();
        if jr[3] == 1.0 {
            break; // rotation below floating-point precision
        }

        quat = [
            quat[3] * jr[0] + quat[0] * jr[3] + quat[1] * jr[2] - quat[2] * jr[1],
            quat[3] * jr[1] - quat[0] * jr[2] + quat[1] * jr[3] + quat[2] * jr[0],
            quat[3] * jr[2] + quat[0] * jr[1] - quat[1] * jr[0] + quat[2] * jr[3],
            quat[3] * jr[3] - quat[0] * jr[0] - quat[1] * jr[1] - quat[2] * jr[2],
        ];
        let norm =
            (quat[0] * quat[0] + quat[1] * quat[1] + quat[2] * quat[2] + quat[3] * quat[3]).sqrt();
        for component in &mut quat {
            *component /= norm;
        }
    }

    (q, d)
}

fn compute_normal(
    points: &[Vector3<GeometryCoord>],
    point: &Vector3<GeometryCoord>,
    neighbors: &[usize],
    knn_count: usize,
    max_diagonal_steps: usize,
) -> Vector3<f64> {
    // The KNN search returns the query point as its own first neighbor; it
    // seeds the barycenter.
    let mut bary = Vector3::new(point[0] as f64, point[1] as f64, point[2] as f64);
    for &index in &neighbors[1..knn_count] {
        let p = &points[index];
        bary += Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64);
    }
    bary /= knn_count as f64;

    let mut cov = Matrix3::zeros();
    for &index in &neighbors[..knn_count] {
        let p = &points[index];
        let d = Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64) - bary;
        cov[(0, 0)] += d[0] * d[0];
        cov[(1, 1)] += d[1] * d[1];
        cov[(2, 2)] += d[2] * d[2];
        cov[(0, 1)] += d[0] * d[1];
        cov[(0, 2)] += d[0] * d[2];
        cov[(1, 2)] += d[1] * d[2];
    }
    cov /= knn_count as f64 - 1.0;
    cov[(1, 0)] = cov[(0, 1)];
    cov[(2, 0)] = cov[(0, 2)];
    cov[(2, 1)] = cov[(1, 2)];

    let (q, d) = diagonalize(&cov, max_diagonal_steps);

    // The eigenvector of the smallest-magnitude eigenvalue is the normal.
    let eigen = [d[(0, 0)].abs(), d[(1, 1)].abs(), d[(2, 2)].abs()];
    let column = if eigen[0] < eigen[1] && eigen[0] < eigen[2] {
        0
    } else if eigen[1] < eigen[2] {
        1
    } else {
        2
    };
    Vector3::new(q[(0, column)], q[(1, column)], q[(2, column)])
}

/// Estimate one normal per point. The sign is undefined at this stage;
/// orientation happens separately.
pub(crate) fn compute_normals(
    points: &[Vector3<GeometryCoord>],
    nn_lists: &[Vec<usize>],
    knn_count: usize,
    max_diagonal_steps: usize,
) -> Vec<Vector3<f64>> {
    debug_assert!(knn_count <= points.len().max(1));
    points
        .iter()
        .enumerate()
        .map(|(index, point)| {
            compute_normal(points, point, &nn_lists[index], knn_count, max_diagonal_steps)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch_generation::kd_tree::KdTree;

    fn nn_lists(points: &[Vector3<GeometryCoord>], k: usize) -> Vec<Vec<usize>> {
        let tree = KdTree::new(4, points);
        points
            .iter()
            .map(|p| {
                let mut out = Vec::new();
                tree.knn(p, k, &mut out);
                out
            })
            .collect()
    }

    #[test]
    fn flat_plane_normal_is_z_axis_and_unit() {
        let mut points = Vec::new();
        for x in 0..5u16 {
            for y in 0..5u16 {
                points.push(Vector3::new(x, y, 7));
            }
        }
        let lists = nn_lists(&points, 6);
        let normals = compute_normals(&points, &lists, 6, 8);
        for n in &normals {
            assert!((n.norm() - 1.0).abs() < 1e-6, "norm {}", n.norm());
            assert!(n[2].abs() > 0.999, "normal not along z: {n:?}");
            assert!(n[0].abs() < 1e-6 && n[1].abs() < 1e-6);
        }
    }

    #[test]
    fn selected_eigenvalue_is_minimal() {
        // A plane with zero extent along x: the smallest eigenvalue (zero)
        // belongs to the x axis, whatever column order the rotation ends
        // up with.
        let mut points = Vec::new();
        for y in 0..6u16 {
            for z in 0..6u16 {
                points.push(Vector3::new(3, y, z));
            }
        }
        let lists = nn_lists(&points, 6);
        let normals = compute_normals(&points, &lists, 6, 16);
        for n in &normals {
            assert!((n.norm() - 1.0).abs() < 1e-6);
            assert!(n[0].abs() > 0.999, "normal not along x: {n:?}");
        }
    }
}
