//! Outlier screening (data snooping).
//!
//! Repeats: build → solve → standardize residuals → reject, until nothing is
//! rejected. All observations above the threshold after a solve are rejected
//! together, so the outcome does not depend on observation order. Rejections
//! are permanent for the run.
//!
//! ```text
//! Fitting ──no outliers──────────────▶ Converged
//!    │ ──cap reached with outliers──▶ MaxIterationsReached (warning)
//!    │ ──survivors leave n ≤ p───────▶ Failed (UnderdeterminedSystem)
//!    └──outliers──▶ deactivate, re-solve
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use crate::domain::{
    EstimationConfig, IterationRecord, Observation, ParameterVector, ScreeningState, SolutionResult,
};
use crate::error::{EstimationError, SolutionWarning};
use crate::fit::design::DesignMatrix;
use crate::fit::solver::{LeastSquaresSolution, solve};

/// Multiple of machine epsilon, relative to the largest delay, still treated
/// as rounding in a post-fit residual.
const ROUNDING_HEADROOM: f64 = 100.0;

/// Variance factor at which the post-fit residuals of `rows` are no larger
/// than rounding in the delays they were formed from.
///
/// Standardizing by a variance factor below this turns rounding into
/// outliers, which matters once delay sigmas reach the sub-picosecond level.
pub fn rounding_variance_floor(observations: &[Observation], rows: &[usize]) -> f64 {
    let (largest, tightest) = rows.iter().map(|&i| &observations[i]).fold(
        (0.0_f64, f64::INFINITY),
        |(largest, tightest), o| {
            (
                largest.max(o.observed_delay().abs()).max(o.apriori_delay().abs()),
                tightest.min(o.uncertainty()),
            )
        },
    );
    if !tightest.is_finite() {
        return 0.0;
    }
    let rounding = ROUNDING_HEADROOM * f64::EPSILON * largest / tightest;
    rounding * rounding
}

/// Post-fit residual of `obs` for the full correction vector.
pub fn postfit_residual(obs: &Observation, parameters: &ParameterVector, corrections: &[f64]) -> f64 {
    parameters
        .iter()
        .zip(corrections)
        .fold(obs.residual(), |v, (p, dx)| v - obs.partial(&p.name) * dx)
}

/// One screening run over a set of observations it exclusively borrows.
pub struct ScreeningLoop<'a> {
    observations: &'a mut [Observation],
    parameters: &'a ParameterVector,
    config: &'a EstimationConfig,
    state: ScreeningState,
    history: Vec<IterationRecord>,
}

impl<'a> ScreeningLoop<'a> {
    pub fn new(
        observations: &'a mut [Observation],
        parameters: &'a ParameterVector,
        config: &'a EstimationConfig,
    ) -> Self {
        Self {
            observations,
            parameters,
            config,
            state: ScreeningState::Fitting,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> ScreeningState {
        self.state
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    /// Run to completion.
    ///
    /// `cancel` is polled before every solve; a raised flag abandons the run.
    pub fn run(&mut self, cancel: Option<&AtomicBool>) -> Result<SolutionResult, EstimationError> {
        let result = self.iterate(cancel);
        if result.is_err() {
            self.state = ScreeningState::Failed;
        }
        result
    }

    fn iterate(&mut self, cancel: Option<&AtomicBool>) -> Result<SolutionResult, EstimationError> {
        self.config.validate()?;
        let mut iteration = 0;

        loop {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                return Err(EstimationError::Cancelled);
            }
            iteration += 1;

            let design = DesignMatrix::build(&*self.observations, self.parameters);
            let solution = solve(&design, self.parameters, self.config.solver)?;
            let corrections = solution.corrections.as_slice();

            let floor = rounding_variance_floor(&*self.observations, &design.rows).max(self.config.variance_floor);
            let scale = solution.variance_factor.max(floor).sqrt();
            let postfit: Vec<f64> = self
                .observations
                .iter()
                .map(|o| postfit_residual(o, self.parameters, corrections))
                .collect();
            let standardized: Vec<f64> = self
                .observations
                .iter()
                .zip(&postfit)
                .map(|(o, v)| v / (o.uncertainty() * scale))
                .collect();

            let outliers: Vec<usize> = design
                .rows
                .iter()
                .copied()
                .filter(|&i| standardized[i].abs() > self.config.threshold)
                .collect();

            self.history.push(IterationRecord {
                iteration,
                active: design.n_rows(),
                rejected: outliers.len(),
                variance_factor: solution.variance_factor,
                weighted_rms: solution.weighted_rms,
            });
            debug!(
                "screening iteration {iteration}: {} active, {} above {:.2}, sigma0^2={:.4e}",
                design.n_rows(),
                outliers.len(),
                self.config.threshold,
                solution.variance_factor
            );

            if outliers.is_empty() {
                self.state = ScreeningState::Converged;
                info!(
                    "screening converged after {iteration} iteration(s): {} active, wrms={:.3} ps",
                    design.n_rows(),
                    solution.weighted_rms * 1e12
                );
                return Ok(self.finish(solution, postfit, standardized, iteration, Vec::new()));
            }

            if iteration >= self.config.max_iterations {
                self.state = ScreeningState::MaxIterationsReached;
                let warning = SolutionWarning::NotFullyConverged {
                    iterations: iteration,
                    pending_outliers: outliers.len(),
                };
                warn!("{warning}");
                return Ok(self.finish(solution, postfit, standardized, iteration, vec![warning]));
            }

            for &i in &outliers {
                let o = &self.observations[i];
                warn!(
                    "rejecting {} at {} (standardized residual {:.2})",
                    o.baseline(),
                    o.epoch(),
                    standardized[i]
                );
                self.observations[i].deactivate();
            }

            // Parameters seen only by the rejected rows drop out with them.
            let survivors = DesignMatrix::build(&*self.observations, self.parameters);
            if survivors.degrees_of_freedom() <= 0 {
                return Err(EstimationError::underdetermined(
                    survivors.n_rows(),
                    survivors.observable.len(),
                ));
            }
        }
    }

    fn finish(
        &self,
        solution: LeastSquaresSolution,
        postfit: Vec<f64>,
        standardized: Vec<f64>,
        iterations: usize,
        warnings: Vec<SolutionWarning>,
    ) -> SolutionResult {
        SolutionResult {
            parameters: self.parameters.clone(),
            corrections: solution.corrections.iter().copied().collect(),
            observable: solution.observable,
            covariance: solution.covariance,
            variance_factor: solution.variance_factor,
            weighted_rms: solution.weighted_rms,
            degrees_of_freedom: solution.degrees_of_freedom,
            postfit_residuals: postfit,
            standardized_residuals: standardized,
            active: self.observations.iter().map(|o| o.is_active()).collect(),
            iterations,
            state: self.state,
            history: self.history.clone(),
            decomposition: solution.decomposition,
            warnings,
        }
    }
}

/// Convenience wrapper: screen `observations` with `config`.
pub fn screen(
    observations: &mut [Observation],
    parameters: &ParameterVector,
    config: &EstimationConfig,
) -> Result<SolutionResult, EstimationError> {
    ScreeningLoop::new(observations, parameters, config).run(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Baseline, Epoch, Parameter};
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    const SIGMA: f64 = 1.0;

    /// y = 2 + 0.5 x sampled at x = 0..n, exact unless corrupted.
    fn line(n: usize, corrupt: &[(usize, f64)]) -> Vec<Observation> {
        (0..n)
            .map(|i| {
                let x = i as f64;
                let map: BTreeMap<String, f64> =
                    [("a".to_string(), 1.0), ("b".to_string(), x)].into_iter().collect();
                let bump = corrupt.iter().find(|(j, _)| *j == i).map(|(_, b)| *b).unwrap_or(0.0);
                Observation::new(
                    Baseline::new("A", "B"),
                    Epoch::from_mjd(x),
                    2.0 + 0.5 * x + bump,
                    0.0,
                    SIGMA,
                    map,
                )
                .unwrap()
            })
            .collect()
    }

    fn params() -> ParameterVector {
        ParameterVector::new(vec![Parameter::new("a", 0.0), Parameter::new("b", 0.0)]).unwrap()
    }

    #[test]
    fn clean_data_converges_in_one_iteration() {
        let mut obs = line(30, &[]);
        let config = EstimationConfig::default();
        let p = params();
        let mut lp = ScreeningLoop::new(&mut obs, &p, &config);
        let r = lp.run(None).unwrap();
        assert_eq!(lp.state(), ScreeningState::Converged);
        assert_eq!(r.iterations, 1);
        assert_eq!(r.rejected_count(), 0);
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn single_gross_outlier_is_removed_in_one_pass() {
        let mut obs = line(30, &[(7, 100.0 * SIGMA)]);
        let r = screen(&mut obs, &params(), &EstimationConfig::default()).unwrap();
        assert_eq!(r.history[0].rejected, 1);
        assert_eq!(r.iterations, 2);
        assert_eq!(r.active.iter().filter(|a| !**a).count(), 1);
        assert!(!r.active[7]);
        assert_relative_eq!(r.corrections[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(r.corrections[1], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn simultaneous_outliers_are_rejected_together() {
        let mut obs = line(40, &[(5, 100.0), (25, -100.0)]);
        let r = screen(&mut obs, &params(), &EstimationConfig::default()).unwrap();
        assert_eq!(r.history[0].rejected, 2);
        assert!(!r.active[5] && !r.active[25]);
        assert_eq!(r.rejected_count(), 2);
    }

    #[test]
    fn iteration_cap_returns_last_solution_with_warning() {
        let mut obs = line(30, &[(7, 100.0)]);
        let config = EstimationConfig { max_iterations: 1, ..Default::default() };
        let p = params();
        let mut lp = ScreeningLoop::new(&mut obs, &p, &config);
        let r = lp.run(None).unwrap();
        assert_eq!(lp.state(), ScreeningState::MaxIterationsReached);
        assert_eq!(r.state, ScreeningState::MaxIterationsReached);
        assert!(!r.is_converged());
        assert_eq!(
            r.warnings,
            vec![SolutionWarning::NotFullyConverged { iterations: 1, pending_outliers: 1 }]
        );
        assert!(r.active.iter().all(|a| *a));
    }

    #[test]
    fn rejection_that_would_underdetermine_fails() {
        // Three points, two parameters, one wild point: removing it leaves n = p.
        let mut obs = line(3, &[(1, 100.0)]);
        let config = EstimationConfig { threshold: 0.5, ..Default::default() };
        let p = params();
        let mut lp = ScreeningLoop::new(&mut obs, &p, &config);
        let err = lp.run(None).unwrap_err();
        assert!(matches!(err, EstimationError::UnderdeterminedSystem { .. }));
        assert_eq!(lp.state(), ScreeningState::Failed);
    }

    #[test]
    fn rejecting_the_only_rows_of_a_parameter_leaves_it_unobservable() {
        // Three exact line points plus two rows seeing only "c", pulled apart
        // by ±10. Both "c" rows are rejected; the line still has a spare dof.
        let mut obs = line(3, &[]);
        for (x, bump) in [(3.0, 10.0), (4.0, -10.0)] {
            let map: BTreeMap<String, f64> = [("c".to_string(), 1.0)].into_iter().collect();
            obs.push(
                Observation::new(Baseline::new("A", "C"), Epoch::from_mjd(x), bump, 0.0, SIGMA, map).unwrap(),
            );
        }
        let p = ParameterVector::new(vec![
            Parameter::new("a", 0.0),
            Parameter::new("b", 0.0),
            Parameter::new("c", 0.0),
        ])
        .unwrap();
        let config = EstimationConfig { threshold: 0.5, ..Default::default() };

        let r = screen(&mut obs, &p, &config).unwrap();
        assert!(r.is_converged());
        assert_eq!(r.history[0].rejected, 2);
        assert!(!r.active[3] && !r.active[4]);
        assert_eq!(r.unobservable(), vec!["c"]);
        assert_eq!(r.sigma("c"), None);
        assert_relative_eq!(r.corrections[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(r.corrections[1], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn rounding_floor_scales_with_delay_over_sigma() {
        let obs = line(4, &[]);
        let rows = [0, 1, 2, 3];
        // Largest delay is 3.5 with unit sigma.
        let expected = (ROUNDING_HEADROOM * f64::EPSILON * 3.5).powi(2);
        assert_relative_eq!(rounding_variance_floor(&obs, &rows), expected, epsilon = 0.0, max_relative = 1e-12);
        assert_eq!(rounding_variance_floor(&obs, &[]), 0.0);
    }

    #[test]
    fn large_delays_with_tiny_sigmas_are_not_rejected_for_rounding() {
        // Delays near 1000 s with a 1 fs sigma: rounding in the delay alone
        // is about 1e-13 s, far more than a sigma.
        let mut obs: Vec<Observation> = (0..30)
            .map(|i| {
                let x = i as f64;
                let map: BTreeMap<String, f64> =
                    [("a".to_string(), 1.0), ("b".to_string(), x)].into_iter().collect();
                Observation::new(Baseline::new("A", "B"), Epoch::from_mjd(x), 1002.0 + 0.1 * x, 1000.0, 1e-15, map)
                    .unwrap()
            })
            .collect();
        let r = screen(&mut obs, &params(), &EstimationConfig::default()).unwrap();
        assert!(r.is_converged());
        assert_eq!(r.iterations, 1);
        assert_eq!(r.rejected_count(), 0);
        assert!(r.standardized_residuals.iter().all(|z| z.abs() < 1.0));
    }

    #[test]
    fn cancellation_is_honoured_before_solving() {
        let mut obs = line(10, &[]);
        let flag = AtomicBool::new(true);
        let config = EstimationConfig::default();
        let p = params();
        let err = ScreeningLoop::new(&mut obs, &p, &config).run(Some(&flag)).unwrap_err();
        assert_eq!(err, EstimationError::Cancelled);
    }
}
