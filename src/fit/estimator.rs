//! One estimation run per session, and data-parallel runs over many sessions.
//!
//! Pipeline for a session:
//! validate → resolve parameters → derive rate partials → drop observations
//! that see no estimated parameter → screening loop → EOP extraction.

use std::sync::atomic::AtomicBool;

use log::{info, warn};
use rayon::prelude::*;

use crate::domain::{EopComponent, Epoch, EstimationConfig, Observation, ParameterVector, Session, SolutionResult};
use crate::error::EstimationError;
use crate::fit::screening::ScreeningLoop;
use crate::report::eop::{EopReport, extract_eop};

/// Everything one run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimationRun {
    pub session: String,
    pub reference_epoch: Epoch,
    /// Observations that entered the solve, with their final active flags.
    pub observations: Vec<Observation>,
    /// Observations dropped for having no partial of any estimated parameter.
    pub dropped: usize,
    pub solution: SolutionResult,
    pub eop: EopReport,
}

/// Estimate EOPs for one session.
pub fn estimate(session: &Session, config: &EstimationConfig) -> Result<EstimationRun, EstimationError> {
    run(session, config, None)
}

/// Like [`estimate`], abandoning the run when `cancel` is raised.
pub fn estimate_with_cancel(
    session: &Session,
    config: &EstimationConfig,
    cancel: &AtomicBool,
) -> Result<EstimationRun, EstimationError> {
    run(session, config, Some(cancel))
}

/// Estimate independent sessions in parallel. Results keep the input order.
pub fn estimate_sessions(
    sessions: &[Session],
    config: &EstimationConfig,
) -> Vec<Result<EstimationRun, EstimationError>> {
    sessions.par_iter().map(|s| run(s, config, None)).collect()
}

/// Parallel runs sharing one cancellation flag.
pub fn estimate_sessions_with_cancel(
    sessions: &[Session],
    config: &EstimationConfig,
    cancel: &AtomicBool,
) -> Vec<Result<EstimationRun, EstimationError>> {
    sessions.par_iter().map(|s| run(s, config, Some(cancel))).collect()
}

fn run(
    session: &Session,
    config: &EstimationConfig,
    cancel: Option<&AtomicBool>,
) -> Result<EstimationRun, EstimationError> {
    config.validate()?;
    session.validate()?;

    let Some(reference_epoch) = session.reference_epoch() else {
        return Err(EstimationError::underdetermined(0, config.estimated_parameters.len()));
    };
    let parameters = ParameterVector::resolve(
        &config.estimated_parameters,
        &session.apriori,
        &session.apriori_eop,
        reference_epoch,
    )?;

    let mut observations: Vec<Observation> = session.observations.clone();
    derive_rate_partials(&mut observations, &parameters, reference_epoch);

    let before = observations.len();
    observations.retain(|o| o.depends_on_any(parameters.names()));
    let dropped = before - observations.len();
    if dropped > 0 {
        warn!(
            "session '{}': dropped {dropped} observation(s) without partials for any estimated parameter",
            session.name
        );
    }

    info!(
        "session '{}': estimating {} parameter(s) from {} observation(s)",
        session.name,
        parameters.len(),
        observations.len()
    );

    let solution = ScreeningLoop::new(&mut observations, &parameters, config).run(cancel)?;
    let components = config.components_to_report(&parameters);
    let eop = extract_eop(&solution, &components, Some(reference_epoch));

    Ok(EstimationRun {
        session: session.name.clone(),
        reference_epoch,
        observations,
        dropped,
        solution,
        eop,
    })
}

/// Fill in missing rate partials as `offset partial × (t - t_ref)` in days.
pub fn derive_rate_partials(observations: &mut [Observation], parameters: &ParameterVector, reference: Epoch) {
    let rates: Vec<(EopComponent, EopComponent)> = EopComponent::ALL
        .into_iter()
        .filter(|c| parameters.contains(c.name()))
        .filter_map(|c| c.offset().map(|o| (c, o)))
        .collect();

    for obs in observations.iter_mut() {
        let dt = obs.epoch().days_since(reference);
        for (rate, offset) in &rates {
            if obs.partials().contains_key(rate.name()) {
                continue;
            }
            let p = obs.partial(offset.name());
            if p != 0.0 {
                obs.insert_partial(rate.name(), p * dt);
            }
        }
    }
}
