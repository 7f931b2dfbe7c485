//! Weighted least-squares solve of one screening iteration.
//!
//! ```text
//! N = AᵀWA,  b = AᵀWr,  N Δx = b
//! σ₀² = vᵀWv / (n - p),  v = r - AΔx
//! Cov(Δx) = σ₀² N⁻¹
//! ```
//!
//! `n` counts active observations and `p` observable parameters. The
//! system is rank-checked before any decomposition so a singular network
//! reports which parameters are dependent instead of a meaningless solution.

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::domain::{Decomposition, ParameterVector, SolverMethod};
use crate::error::EstimationError;
use crate::fit::design::DesignMatrix;
use crate::fit::normal::NormalEquations;
use crate::math::{
    QR_SWITCH_PIVOT, SINGULAR_PIVOT_TOLERANCE, dependency_groups, equilibration_scale, scale_symmetric,
    solve_cholesky, solve_qr, verify_covariance,
};

/// Output of a single solve.
#[derive(Debug, Clone, PartialEq)]
pub struct LeastSquaresSolution {
    /// Corrections for every parameter; zero for unobservable ones.
    pub corrections: DVector<f64>,
    pub observable: Vec<usize>,
    /// Covariance over `observable`, scaled by the variance factor.
    pub covariance: DMatrix<f64>,
    pub variance_factor: f64,
    pub degrees_of_freedom: usize,
    /// Weighted post-fit RMS `sqrt(vᵀWv / Σw)` (s).
    pub weighted_rms: f64,
    /// Post-fit residual per design row.
    pub postfit_residuals: DVector<f64>,
    pub decomposition: Decomposition,
}

/// Solve the weighted least-squares problem described by `design`.
pub fn solve(
    design: &DesignMatrix,
    parameters: &ParameterVector,
    method: SolverMethod,
) -> Result<LeastSquaresSolution, EstimationError> {
    let n = design.n_rows();
    let p = design.observable.len();
    if design.degrees_of_freedom() <= 0 {
        return Err(EstimationError::underdetermined(n, p));
    }

    let normal = NormalEquations::from_design(design);
    check_rank(&normal, design, parameters)?;

    let (correction, cofactor, decomposition) = if p == 0 {
        (DVector::zeros(0), DMatrix::zeros(0, 0), Decomposition::Cholesky)
    } else {
        decompose(&normal, design, method)?
    };

    let observable_design = DMatrix::from_fn(n, p, |i, k| design.matrix[(i, design.observable[k])]);
    let postfit_residuals = &design.residuals - &observable_design * &correction;

    let vtpv: f64 = postfit_residuals
        .iter()
        .zip(design.weights.iter())
        .map(|(v, w)| w * v * v)
        .sum();
    let weight_sum: f64 = design.weights.iter().sum();
    let dof = n - p;
    let variance_factor = vtpv / dof as f64;
    let weighted_rms = (vtpv / weight_sum).sqrt();
    if !(variance_factor.is_finite() && weighted_rms.is_finite()) {
        return Err(EstimationError::NumericalFailure(
            "post-fit variance factor is not finite".to_string(),
        ));
    }

    let covariance = verify_covariance(&(cofactor * variance_factor)).map_err(EstimationError::NumericalFailure)?;

    let mut corrections = DVector::zeros(parameters.len());
    for (k, &j) in design.observable.iter().enumerate() {
        corrections[j] = correction[k];
    }

    debug!(
        "solved {} parameters from {} observations via {:?}: sigma0^2={:.4e}, wrms={:.4e} s",
        p, n, decomposition, variance_factor, weighted_rms
    );

    Ok(LeastSquaresSolution {
        corrections,
        observable: design.observable.clone(),
        covariance,
        variance_factor,
        degrees_of_freedom: dof,
        weighted_rms,
        postfit_residuals,
        decomposition,
    })
}

fn check_rank(
    normal: &NormalEquations,
    design: &DesignMatrix,
    parameters: &ParameterVector,
) -> Result<(), EstimationError> {
    if normal.dim() == 0 {
        return Ok(());
    }
    let scale = equilibration_scale(&normal.matrix).ok_or_else(|| {
        EstimationError::NumericalFailure("normal matrix has a non-positive diagonal".to_string())
    })?;
    let groups = dependency_groups(&scale_symmetric(&normal.matrix, &scale), SINGULAR_PIVOT_TOLERANCE);
    if groups.is_empty() {
        return Ok(());
    }
    let mut implicated: Vec<usize> = groups.into_iter().flatten().collect();
    implicated.sort_unstable();
    implicated.dedup();
    let names = implicated
        .into_iter()
        .filter_map(|k| parameters.get(design.observable[k]))
        .map(|p| p.name.clone())
        .collect();
    Err(EstimationError::SingularSystem { parameters: names })
}

fn decompose(
    normal: &NormalEquations,
    design: &DesignMatrix,
    method: SolverMethod,
) -> Result<(DVector<f64>, DMatrix<f64>, Decomposition), EstimationError> {
    let via_qr = || {
        let (aw, rw) = design.weighted_observable();
        solve_qr(&aw, &rw)
            .map(|s| (s.correction, s.cofactor, Decomposition::Qr))
            .ok_or_else(|| EstimationError::NumericalFailure("QR solve failed".to_string()))
    };

    match method {
        SolverMethod::Qr => via_qr(),
        SolverMethod::Cholesky => solve_cholesky(&normal.matrix, &normal.rhs)
            .map(|s| (s.solution.correction, s.solution.cofactor, Decomposition::Cholesky))
            .ok_or_else(|| EstimationError::NumericalFailure("Cholesky factorization failed".to_string())),
        SolverMethod::Auto => match solve_cholesky(&normal.matrix, &normal.rhs) {
            Some(s) if s.min_pivot >= QR_SWITCH_PIVOT => {
                Ok((s.solution.correction, s.solution.cofactor, Decomposition::Cholesky))
            }
            Some(s) => {
                debug!("normal matrix poorly conditioned (min pivot {:.3e}); using QR", s.min_pivot);
                via_qr()
            }
            None => via_qr(),
        },
    }
}
