//! Weighted least-squares kernels.
//!
//! The estimation problem is
//!
//! ```text
//! minimize Σ w_i (r_i - a_iᵀ Δx)²
//! ```
//!
//! solved either through the normal equations `N Δx = b` (Cholesky) or
//! directly on the row-weighted design matrix (QR). Both paths work on a
//! column-equilibrated system: every column is scaled so the normal matrix
//! has a unit diagonal. UT1 partials (s/s) and pole partials (s/rad) differ
//! by several orders of magnitude, and equilibration keeps the pivots
//! comparable and the rank test scale-free.

use nalgebra::{Cholesky, DMatrix, DVector};

/// Pivot below which a column of the equilibrated normal matrix is treated as
/// a linear combination of the preceding ones.
pub const SINGULAR_PIVOT_TOLERANCE: f64 = 1e-12;

/// Smallest equilibrated Cholesky pivot still trusted in `auto` mode; below it
/// the QR path is used.
pub const QR_SWITCH_PIVOT: f64 = 1e-8;

/// Combination coefficients smaller than this fraction of the largest one do
/// not implicate their column in a dependency.
const COMBINATION_TOLERANCE: f64 = 1e-6;

/// Relative tolerance for covariance symmetry and eigenvalue checks.
const COVARIANCE_TOLERANCE: f64 = 1e-9;

/// Column scale factors `1/sqrt(N_jj)` making the normal matrix unit-diagonal.
///
/// Returns `None` if a diagonal entry is not strictly positive.
pub fn equilibration_scale(normal: &DMatrix<f64>) -> Option<DVector<f64>> {
    let d = normal.diagonal();
    if d.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
        return None;
    }
    Some(d.map(|v| 1.0 / v.sqrt()))
}

/// `S N S` for the diagonal scaling `S = diag(scale)`.
pub fn scale_symmetric(normal: &DMatrix<f64>, scale: &DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(normal.nrows(), normal.ncols(), |i, j| normal[(i, j)] * scale[i] * scale[j])
}

/// Indices of columns that are numerically dependent on earlier columns.
///
/// Runs a Cholesky factorization that skips (rather than fails on) a pivot
/// below `tolerance`. On a unit-diagonal matrix the pivot of column `j` is the
/// squared sine of the angle between column `j` and the span of the accepted
/// columns before it, so the result names the later member of each
/// dependent group, in column order.
pub fn dependent_columns(scaled_normal: &DMatrix<f64>, tolerance: f64) -> Vec<usize> {
    let n = scaled_normal.nrows();
    let mut l = DMatrix::<f64>::zeros(n, n);
    let mut dependent = Vec::new();

    for j in 0..n {
        let mut pivot = scaled_normal[(j, j)];
        for k in 0..j {
            pivot -= l[(j, k)] * l[(j, k)];
        }
        if !(pivot.is_finite() && pivot > tolerance) {
            dependent.push(j);
            continue;
        }
        let ljj = pivot.sqrt();
        l[(j, j)] = ljj;
        for i in (j + 1)..n {
            let mut s = scaled_normal[(i, j)];
            for k in 0..j {
                s -= l[(i, k)] * l[(j, k)];
            }
            l[(i, j)] = s / ljj;
        }
    }

    dependent
}

/// Columns implicated in each numerical dependency.
///
/// Every dependent column found by [`dependent_columns`] is expressed as a
/// combination of the accepted columns before it. The group holds those
/// columns with a non-negligible coefficient, followed by the dependent
/// column itself.
pub fn dependency_groups(scaled_normal: &DMatrix<f64>, tolerance: f64) -> Vec<Vec<usize>> {
    let dependent = dependent_columns(scaled_normal, tolerance);
    dependent
        .iter()
        .map(|&j| {
            let basis: Vec<usize> = (0..j).filter(|k| !dependent.contains(k)).collect();
            let mut group = combination_of(scaled_normal, &basis, j);
            group.push(j);
            group
        })
        .collect()
}

/// Columns of `basis` with a significant coefficient when column `j` is
/// projected onto their span.
fn combination_of(scaled_normal: &DMatrix<f64>, basis: &[usize], j: usize) -> Vec<usize> {
    if basis.is_empty() {
        return Vec::new();
    }
    let gram = scaled_normal.select_rows(basis.iter()).select_columns(basis.iter());
    let cross = DVector::from_iterator(basis.len(), basis.iter().map(|&k| scaled_normal[(k, j)]));
    let Some(chol) = Cholesky::new(gram) else {
        return Vec::new();
    };
    let coefficients = chol.solve(&cross);
    let largest = coefficients.amax();
    if !(largest.is_finite() && largest > 0.0) {
        return Vec::new();
    }
    basis
        .iter()
        .zip(coefficients.iter())
        .filter(|(_, c)| c.abs() > COMBINATION_TOLERANCE * largest)
        .map(|(&k, _)| k)
        .collect()
}

/// Solution of an equilibrated system, mapped back to original units.
#[derive(Debug, Clone)]
pub struct LsqSolution {
    pub correction: DVector<f64>,
    /// Inverse normal matrix `N⁻¹` (unscaled by the variance factor).
    pub cofactor: DMatrix<f64>,
}

/// Result of a Cholesky attempt.
#[derive(Debug, Clone)]
pub struct CholeskySolution {
    pub solution: LsqSolution,
    /// Smallest squared diagonal entry of the factor of the equilibrated matrix.
    pub min_pivot: f64,
}

/// Solve `N Δx = b` with Cholesky on the equilibrated normal matrix.
pub fn solve_cholesky(normal: &DMatrix<f64>, rhs: &DVector<f64>) -> Option<CholeskySolution> {
    let scale = equilibration_scale(normal)?;
    let scaled = scale_symmetric(normal, &scale);
    let scaled_rhs = rhs.component_mul(&scale);

    let chol = Cholesky::new(scaled)?;
    let min_pivot = chol
        .l_dirty()
        .diagonal()
        .iter()
        .map(|v| v * v)
        .fold(f64::INFINITY, f64::min);

    let x_scaled = chol.solve(&scaled_rhs);
    let inv_scaled = chol.inverse();

    let correction = x_scaled.component_mul(&scale);
    let cofactor = scale_symmetric(&inv_scaled, &scale);
    if correction.iter().chain(cofactor.iter()).any(|v| !v.is_finite()) {
        return None;
    }

    Some(CholeskySolution {
        solution: LsqSolution { correction, cofactor },
        min_pivot,
    })
}

/// Solve the weighted problem by QR of the row-weighted design matrix.
///
/// `weighted_design` rows are `sqrt(w_i)·a_i`, `weighted_rhs` entries
/// `sqrt(w_i)·r_i`. Requires at least as many rows as columns.
pub fn solve_qr(weighted_design: &DMatrix<f64>, weighted_rhs: &DVector<f64>) -> Option<LsqSolution> {
    let (m, n) = weighted_design.shape();
    if m < n || n == 0 {
        return None;
    }

    let norms: Vec<f64> = weighted_design.column_iter().map(|c| c.norm()).collect();
    if norms.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
        return None;
    }
    let scale = DVector::from_iterator(n, norms.iter().map(|v| 1.0 / v));
    let mut scaled = weighted_design.clone();
    for (j, mut col) in scaled.column_iter_mut().enumerate() {
        col *= scale[j];
    }

    let qr = scaled.qr();
    let r = qr.r();
    let qt_b = qr.q().transpose() * weighted_rhs;

    let x_scaled = r.solve_upper_triangular(&qt_b)?;
    let r_inv = r.solve_upper_triangular(&DMatrix::identity(n, n))?;
    let inv_scaled = &r_inv * r_inv.transpose();

    let correction = x_scaled.component_mul(&scale);
    let cofactor = scale_symmetric(&inv_scaled, &scale);
    if correction.iter().chain(cofactor.iter()).any(|v| !v.is_finite()) {
        return None;
    }
    Some(LsqSolution { correction, cofactor })
}

/// Check that `covariance` is symmetric and positive semi-definite.
///
/// Returns the exactly symmetrized matrix on success.
pub fn verify_covariance(covariance: &DMatrix<f64>) -> Result<DMatrix<f64>, String> {
    if !covariance.is_square() {
        return Err(format!("covariance is not square ({:?})", covariance.shape()));
    }
    if covariance.iter().any(|v| !v.is_finite()) {
        return Err("covariance has non-finite entries".to_string());
    }
    let n = covariance.nrows();
    if n == 0 {
        return Ok(covariance.clone());
    }

    let max_abs = covariance.amax().max(f64::MIN_POSITIVE);
    let asym = (covariance - covariance.transpose()).amax();
    if asym > COVARIANCE_TOLERANCE * max_abs {
        return Err(format!("covariance is not symmetric (max asymmetry {asym:e})"));
    }
    let symmetric = (covariance + covariance.transpose()) * 0.5;

    if let Some(i) = (0..n).find(|&i| symmetric[(i, i)] < 0.0) {
        return Err(format!("covariance has negative variance at index {i}"));
    }

    // Eigenvalues of the correlation form: the raw matrix mixes s² and rad².
    let scale = DVector::from_iterator(
        n,
        (0..n).map(|i| {
            let d = symmetric[(i, i)];
            if d > 0.0 { 1.0 / d.sqrt() } else { 1.0 }
        }),
    );
    let correlation = scale_symmetric(&symmetric, &scale);
    let eigen = correlation.symmetric_eigen();
    let min_eig = eigen.eigenvalues.min();
    if min_eig < -COVARIANCE_TOLERANCE * n as f64 {
        return Err(format!("covariance is not positive semi-definite (eigenvalue {min_eig:e})"));
    }

    Ok(symmetric)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cholesky_and_qr_agree_on_a_line_fit() {
        // Fit y = 2 + 3x on x = [0,1,2,3] with unequal weights.
        let a = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0, 11.0]);
        let w = DVector::from_row_slice(&[1.0, 4.0, 1.0, 9.0]);

        let sw = w.map(f64::sqrt);
        let mut aw = a.clone();
        for (i, mut row) in aw.row_iter_mut().enumerate() {
            row *= sw[i];
        }
        let yw = y.component_mul(&sw);

        let normal = aw.transpose() * &aw;
        let rhs = aw.transpose() * &yw;

        let chol = solve_cholesky(&normal, &rhs).unwrap();
        let qr = solve_qr(&aw, &yw).unwrap();

        assert_relative_eq!(chol.solution.correction[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(chol.solution.correction[1], 3.0, epsilon = 1e-12);
        assert_relative_eq!(qr.correction, chol.solution.correction, epsilon = 1e-12);
        assert_relative_eq!(qr.cofactor, chol.solution.cofactor, epsilon = 1e-10);
        assert!(chol.min_pivot > QR_SWITCH_PIVOT);
    }

    #[test]
    fn dependent_column_is_the_later_one() {
        // Column 2 = column 0 - column 1.
        let a = DMatrix::from_row_slice(
            4,
            3,
            &[1.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, -1.0, 2.0, 1.0, 1.0],
        );
        let normal = a.transpose() * &a;
        let scale = equilibration_scale(&normal).unwrap();
        let scaled = scale_symmetric(&normal, &scale);
        assert_eq!(dependent_columns(&scaled, SINGULAR_PIVOT_TOLERANCE), vec![2]);
        assert_eq!(dependency_groups(&scaled, SINGULAR_PIVOT_TOLERANCE), vec![vec![0, 1, 2]]);
    }

    #[test]
    fn dependency_group_leaves_out_uninvolved_columns() {
        // Column 3 duplicates column 1; columns 0 and 2 play no part.
        let a = DMatrix::from_row_slice(
            5,
            4,
            &[
                1.0, 0.0, 2.0, 0.0, //
                1.0, 1.0, 0.0, 1.0, //
                1.0, 2.0, 1.0, 2.0, //
                1.0, 0.5, 3.0, 0.5, //
                1.0, 4.0, -1.0, 4.0,
            ],
        );
        let normal = a.transpose() * &a;
        let scale = equilibration_scale(&normal).unwrap();
        let scaled = scale_symmetric(&normal, &scale);
        assert_eq!(dependency_groups(&scaled, SINGULAR_PIVOT_TOLERANCE), vec![vec![1, 3]]);
    }

    #[test]
    fn independent_columns_pass_the_rank_scan() {
        let normal = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let scale = equilibration_scale(&normal).unwrap();
        assert!(dependent_columns(&scale_symmetric(&normal, &scale), SINGULAR_PIVOT_TOLERANCE).is_empty());
    }

    #[test]
    fn covariance_verification() {
        let good = DMatrix::from_row_slice(2, 2, &[1e-18, 2e-16, 2e-16, 1e-13]);
        assert!(verify_covariance(&good).is_ok());

        let asym = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.1, 1.0]);
        assert!(verify_covariance(&asym).is_err());

        let indefinite = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(verify_covariance(&indefinite).is_err());
    }

    #[test]
    fn zero_diagonal_cannot_be_equilibrated() {
        let normal = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 0.0]);
        assert!(equilibration_scale(&normal).is_none());
        assert!(solve_cholesky(&normal, &DVector::zeros(2)).is_none());
    }
}
