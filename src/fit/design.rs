//! Design matrix assembly.
//!
//! Maps the active observations onto the parameter index space:
//!
//! - row `i` holds the partials of the i-th active observation
//! - column `j` follows the order of the `ParameterVector`
//! - parameters without a single non-zero partial are flagged unobservable
//!
//! The builder is a pure function of its inputs; iteration order is the
//! observation order and the parameter order, nothing else.

use nalgebra::{DMatrix, DVector};

use crate::domain::{Observation, ParameterVector};

/// Linear system `A Δx ≈ r` with weights `w = 1/σ²`.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    /// Rows = active observations, columns = all parameters.
    pub matrix: DMatrix<f64>,
    pub weights: DVector<f64>,
    /// Pre-fit residuals (observed - computed).
    pub residuals: DVector<f64>,
    /// Index into the observation slice of each row.
    pub rows: Vec<usize>,
    /// Parameter indices with at least one non-zero partial.
    pub observable: Vec<usize>,
    /// Parameter indices excluded from the solve.
    pub unobservable: Vec<usize>,
}

impl DesignMatrix {
    pub fn build(observations: &[Observation], parameters: &ParameterVector) -> Self {
        let rows: Vec<usize> = observations
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_active())
            .map(|(i, _)| i)
            .collect();

        let n = rows.len();
        let p = parameters.len();
        let mut matrix = DMatrix::<f64>::zeros(n, p);
        let mut weights = DVector::<f64>::zeros(n);
        let mut residuals = DVector::<f64>::zeros(n);

        for (row, &i) in rows.iter().enumerate() {
            let obs = &observations[i];
            for (col, param) in parameters.iter().enumerate() {
                matrix[(row, col)] = obs.partial(&param.name);
            }
            weights[row] = obs.weight();
            residuals[row] = obs.residual();
        }

        let (observable, unobservable): (Vec<usize>, Vec<usize>) =
            (0..p).partition(|&j| matrix.column(j).iter().any(|v| *v != 0.0));

        Self {
            matrix,
            weights,
            residuals,
            rows,
            observable,
            unobservable,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Active observations minus observable parameters (may be negative).
    pub fn degrees_of_freedom(&self) -> isize {
        self.rows.len() as isize - self.observable.len() as isize
    }

    /// Row-weighted design restricted to the observable columns, with the
    /// matching weighted residuals: `(√w·A_obs, √w·r)`.
    pub fn weighted_observable(&self) -> (DMatrix<f64>, DVector<f64>) {
        let sw = self.weights.map(f64::sqrt);
        let a = DMatrix::from_fn(self.n_rows(), self.observable.len(), |i, k| {
            self.matrix[(i, self.observable[k])] * sw[i]
        });
        (a, self.residuals.component_mul(&sw))
    }
}
