//! Normal equations `N Δx = b` over the observable parameters.

use nalgebra::{DMatrix, DVector};

use crate::fit::design::DesignMatrix;

/// `N = AᵀWA`, `b = AᵀWr`, restricted to observable columns.
///
/// Rebuilt from the design matrix on every solve; never updated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalEquations {
    pub matrix: DMatrix<f64>,
    pub rhs: DVector<f64>,
}

impl NormalEquations {
    pub fn from_design(design: &DesignMatrix) -> Self {
        let p = design.observable.len();
        let mut matrix = DMatrix::<f64>::zeros(p, p);
        let mut rhs = DVector::<f64>::zeros(p);

        for row in 0..design.n_rows() {
            let w = design.weights[row];
            let r = design.residuals[row];
            for (a, &ja) in design.observable.iter().enumerate() {
                let wa = w * design.matrix[(row, ja)];
                if wa == 0.0 {
                    continue;
                }
                rhs[a] += wa * r;
                for (b, &jb) in design.observable.iter().enumerate().skip(a) {
                    matrix[(a, b)] += wa * design.matrix[(row, jb)];
                }
            }
        }
        matrix.fill_lower_triangle_with_upper_triangle();

        Self { matrix, rhs }
    }

    pub fn dim(&self) -> usize {
        self.rhs.len()
    }
}
