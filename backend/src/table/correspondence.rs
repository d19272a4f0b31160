//! Correspondence analysis ordering
//!
//! Rows and columns are ordered by their coordinate on the first principal
//! axis of the standardized residuals of a non-negative matrix. Similar
//! rows (and columns) end up next to each other.
//!
//! The eigen-decomposition is a cyclic Jacobi iteration on the symmetric
//! cross-product matrix. Anything that prevents a meaningful axis (negative
//! cells, empty rows or columns, a single row or column, no structure, no
//! convergence) yields `None`.

const MAX_SWEEPS: usize = 100;
const EPSILON: f64 = 1e-12;

/// Row and column permutations, or `None` when not solvable.
pub fn reorder(data: &[Vec<f64>]) -> Option<(Vec<usize>, Vec<usize>)> {
    let nrows = data.len();
    let ncols = data.first().map(Vec::len).unwrap_or(0);
    if nrows < 2 || ncols < 2 {
        return None;
    }
    if data.iter().flatten().any(|v| *v < 0.0 || !v.is_finite()) {
        return None;
    }

    let total: f64 = data.iter().flatten().sum();
    if total <= 0.0 {
        return None;
    }
    let row_mass: Vec<f64> = data.iter().map(|r| r.iter().sum::<f64>() / total).collect();
    let col_mass: Vec<f64> = (0..ncols)
        .map(|j| data.iter().map(|r| r[j]).sum::<f64>() / total)
        .collect();
    if row_mass.iter().chain(&col_mass).any(|m| *m <= 0.0) {
        return None;
    }

    // standardized residuals
    let residuals: Vec<Vec<f64>> = (0..nrows)
        .map(|i| {
            (0..ncols)
                .map(|j| {
                    let expected = row_mass[i] * col_mass[j];
                    (data[i][j] / total - expected) / expected.sqrt()
                })
                .collect()
        })
        .collect();

    let cross: Vec<Vec<f64>> = (0..ncols)
        .map(|a| {
            (0..ncols)
                .map(|b| (0..nrows).map(|i| residuals[i][a] * residuals[i][b]).sum())
                .collect()
        })
        .collect();

    let (eigenvalues, eigenvectors) = jacobi_eigen(cross)?;
    let (axis, &lambda) = eigenvalues
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    if lambda < EPSILON {
        return None;
    }

    let mut v: Vec<f64> = (0..ncols).map(|j| eigenvectors[j][axis]).collect();
    // fix the arbitrary sign so the ordering is deterministic
    let pivot = v.iter().copied().fold(0.0_f64, |acc, x| if x.abs() > acc.abs() { x } else { acc });
    if pivot < 0.0 {
        v.iter_mut().for_each(|x| *x = -*x);
    }

    let sigma = lambda.sqrt();
    let row_scores: Vec<f64> = (0..nrows)
        .map(|i| {
            let u: f64 = (0..ncols).map(|j| residuals[i][j] * v[j]).sum::<f64>() / sigma;
            u / row_mass[i].sqrt()
        })
        .collect();
    let col_scores: Vec<f64> = (0..ncols).map(|j| v[j] / col_mass[j].sqrt()).collect();

    Some((order_by(&row_scores), order_by(&col_scores)))
}

fn order_by(scores: &[f64]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..scores.len()).collect();
    idx.sort_by(|a, b| scores[*a].total_cmp(&scores[*b]));
    idx
}

/// Eigenvalues and eigenvectors (as columns) of a symmetric matrix.
///
/// Cyclic Jacobi rotations, written out here on purpose: report matrices are
/// small and dense, and the crate has no linear-algebra dependency.
fn jacobi_eigen(mut a: Vec<Vec<f64>>) -> Option<(Vec<f64>, Vec<Vec<f64>>)> {
    let n = a.len();
    let mut v: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for _ in 0..MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|p| (p + 1..n).map(move |q| (p, q)))
            .map(|(p, q)| a[p][q] * a[p][q])
            .sum();
        if off < EPSILON * EPSILON {
            let eigenvalues = (0..n).map(|i| a[i][i]).collect();
            return Some((eigenvalues, v));
        }

        for p in 0..n {
            for q in p + 1..n {
                if a[p][q].abs() < EPSILON * EPSILON {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for row in a.iter_mut() {
                    let (kp, kq) = (row[p], row[q]);
                    row[p] = c * kp - s * kq;
                    row[q] = s * kp + c * kq;
                }
                for k in 0..n {
                    let (pk, qk) = (a[p][k], a[q][k]);
                    a[p][k] = c * pk - s * qk;
                    a[q][k] = s * pk + c * qk;
                }
                for row in v.iter_mut() {
                    let (kp, kq) = (row[p], row[q]);
                    row[p] = c * kp - s * kq;
                    row[q] = s * kp + c * kq;
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jacobi_diagonalizes() {
        let (values, vectors) = jacobi_eigen(vec![vec![2.0, 1.0], vec![1.0, 2.0]]).unwrap();
        let mut sorted = values.clone();
        sorted.sort_by(f64::total_cmp);
        assert!((sorted[0] - 1.0).abs() < 1e-9);
        assert!((sorted[1] - 3.0).abs() < 1e-9);

        // columns are unit length
        for k in 0..2 {
            let norm: f64 = (0..2).map(|i| vectors[i][k] * vectors[i][k]).sum();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_block_structure_is_grouped() {
        let data = vec![
            vec![5.0, 0.0, 5.0, 0.0],
            vec![0.0, 5.0, 0.0, 5.0],
            vec![5.0, 0.0, 5.0, 0.0],
            vec![0.0, 5.0, 0.0, 5.0],
        ];
        let (rows, cols) = reorder(&data).unwrap();

        let pos = |order: &[usize], i: usize| order.iter().position(|x| *x == i).unwrap();
        assert_eq!((pos(&rows, 0) as i64 - pos(&rows, 2) as i64).abs(), 1);
        assert_eq!((pos(&cols, 1) as i64 - pos(&cols, 3) as i64).abs(), 1);
    }

    #[test]
    fn test_unsolvable_inputs() {
        assert_eq!(reorder(&[vec![1.0, 2.0]]), None);
        assert_eq!(reorder(&[vec![0.0, 0.0], vec![0.0, 0.0]]), None);
        assert_eq!(reorder(&[vec![1.0, -1.0], vec![1.0, 1.0]]), None);
        assert_eq!(reorder(&[vec![1.0, 0.0], vec![0.0, 0.0]]), None);
        // independent rows and columns carry no axis
        assert_eq!(reorder(&[vec![1.0, 1.0], vec![1.0, 1.0]]), None);
    }
}
