mod common;

use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;

use approx::assert_abs_diff_eq;

use baseline::data::{SyntheticConfig, clock_parameter, generate_session};
use baseline::domain::{EopComponent, EstimationConfig, ScreeningState, Session, SolverMethod};
use baseline::error::EstimationError;
use baseline::fit::{estimate, estimate_sessions, estimate_sessions_with_cancel, estimate_with_cancel};
use baseline::report::{EopField, Unavailable};

use common::*;

#[test]
fn noise_free_session_recovers_truth() {
    let sim = noise_free(7);
    let run = estimate(&sim.session, &embedded_config(&sim.session)).unwrap();
    let sol = &run.solution;

    assert_eq!(sol.state, ScreeningState::Converged);
    assert_eq!(sol.iterations, 1);
    assert_eq!(sol.rejected_count(), 0);
    assert!(sol.weighted_rms < 1e-16, "wrms = {}", sol.weighted_rms);

    for (name, truth) in &sim.truth {
        let got = sol.correction(name).unwrap();
        assert_abs_diff_eq!(got, *truth, epsilon = recovery_tolerance(name));
    }
}

#[test]
fn clocks_and_troposphere_are_recovered_with_the_eop() {
    let sim = generate_session(&SyntheticConfig {
        seed: 11,
        duration_hours: 24.0,
        noise: false,
        clock_sigma: 1e-9,
        troposphere_sigma: 3e-11,
        ..SyntheticConfig::default()
    })
    .unwrap();
    let config = embedded_config(&sim.session);
    assert!(config.estimated_parameters.len() > 3);

    let run = estimate(&sim.session, &config).unwrap();
    assert!(run.solution.is_converged());
    for (name, truth) in &sim.truth {
        assert_abs_diff_eq!(
            run.solution.correction(name).unwrap(),
            *truth,
            epsilon = recovery_tolerance(name)
        );
    }
}

#[test]
fn single_corrupted_observation_is_rejected_in_one_iteration() {
    let sim = noise_free(7);
    let config = embedded_config(&sim.session);
    let clean = estimate(&sim.session, &config).unwrap();

    let bad = sim.session.observations.len() / 2;
    let mut corrupted = sim.session.clone();
    let obs = &corrupted.observations[bad];
    corrupted.observations[bad] = shifted(obs, 100.0 * obs.uncertainty());

    let run = estimate(&corrupted, &config).unwrap();
    let sol = &run.solution;

    assert_eq!(sol.state, ScreeningState::Converged);
    assert_eq!(sol.iterations, 2);
    assert_eq!(sol.history[0].rejected, 1);
    assert_eq!(sol.history[1].rejected, 0);

    let rejected: Vec<usize> = (0..sol.active.len()).filter(|&i| !sol.active[i]).collect();
    assert_eq!(rejected, vec![bad]);
    assert!(!run.observations[bad].is_active());

    for name in config.estimated_parameters.iter() {
        assert_abs_diff_eq!(
            sol.correction(name).unwrap(),
            clean.solution.correction(name).unwrap(),
            epsilon = recovery_tolerance(name)
        );
    }
}

#[test]
fn too_few_observations_is_underdetermined() {
    let sim = noise_free(3);
    let session = Session::new("tiny", sim.session.observations[..2].to_vec());

    let err = estimate(&session, &EstimationConfig::default()).unwrap_err();
    assert_eq!(
        err,
        EstimationError::UnderdeterminedSystem {
            observations: 2,
            parameters: 3,
            deficit: 2
        }
    );
}

#[test]
fn parameter_without_partials_is_reported_unavailable() {
    // No y pole signal either, so the remaining model is exact.
    let sim = generate_session(&SyntheticConfig {
        seed: 5,
        duration_hours: 12.0,
        noise: false,
        y_pole_offset: 0.0,
        ..SyntheticConfig::default()
    })
    .unwrap();
    let mut session = sim.session.clone();
    session.observations = session
        .observations
        .iter()
        .map(|o| without_partials(o, |name| name != "y_pole"))
        .collect();

    let config = EstimationConfig::default();
    let run = estimate(&session, &config).unwrap();

    assert!(!run.solution.is_observable("y_pole"));
    assert_eq!(run.solution.sigma("y_pole"), None);
    assert_eq!(run.solution.correction("y_pole"), Some(0.0));
    assert_eq!(run.solution.unobservable(), vec!["y_pole"]);

    assert_eq!(
        run.eop.field(EopComponent::YPole),
        Some(&EopField::Unavailable {
            component: EopComponent::YPole,
            reason: Unavailable::Unobservable
        })
    );
    assert_eq!(run.eop.value_map().get("y_pole"), Some(&None));
    assert!(run.eop.estimate(EopComponent::Ut1).is_some());
}

#[test]
fn covariance_is_symmetric_with_non_negative_diagonal() {
    let sim = noisy(9);
    let run = estimate(&sim.session, &embedded_config(&sim.session)).unwrap();
    let cov = &run.solution.covariance;

    assert_eq!(cov.nrows(), run.solution.observable.len());
    for i in 0..cov.nrows() {
        assert!(cov[(i, i)] >= 0.0);
        for j in 0..cov.ncols() {
            assert_abs_diff_eq!(cov[(i, j)], cov[(j, i)], epsilon = 1e-12 * cov[(i, i)].max(cov[(j, j)]));
        }
    }
    // 20 ps noise: the variance factor of a correctly weighted fit is near one.
    assert!((0.7..1.3).contains(&run.solution.variance_factor));
}

#[test]
fn estimating_every_clock_is_singular() {
    let sim = generate_session(&SyntheticConfig {
        seed: 13,
        duration_hours: 12.0,
        noise: false,
        clock_sigma: 1e-9,
        ..SyntheticConfig::default()
    })
    .unwrap();
    let mut config = embedded_config(&sim.session);
    config
        .estimated_parameters
        .push(clock_parameter(&sim.reference_station));

    // The clock partials sum to zero on every row, so each observing clock is named.
    let observed: BTreeSet<String> = sim
        .session
        .observations
        .iter()
        .flat_map(|o| [clock_parameter(&o.baseline().station1), clock_parameter(&o.baseline().station2)])
        .collect();
    let clocks: Vec<String> = config
        .estimated_parameters
        .iter()
        .filter(|name| observed.contains(*name))
        .cloned()
        .collect();
    assert!(clocks.len() > 2);

    let err = estimate(&sim.session, &config).unwrap_err();
    assert_eq!(err, EstimationError::SingularSystem { parameters: clocks });
}

#[test]
fn parallel_batch_matches_sequential_runs() {
    let sessions: Vec<Session> = (20..24).map(|seed| noisy(seed).session).collect();
    let config = embedded_config(&sessions[0]);

    let parallel = estimate_sessions(&sessions, &config);
    assert_eq!(parallel.len(), sessions.len());
    for (session, result) in sessions.iter().zip(parallel) {
        assert_eq!(result, estimate(session, &config));
    }
}

#[test]
fn qr_and_cholesky_agree() {
    let sim = noisy(17);
    let base = embedded_config(&sim.session);
    let chol = estimate(
        &sim.session,
        &EstimationConfig {
            solver: SolverMethod::Cholesky,
            ..base.clone()
        },
    )
    .unwrap();
    let qr = estimate(
        &sim.session,
        &EstimationConfig {
            solver: SolverMethod::Qr,
            ..base.clone()
        },
    )
    .unwrap();

    assert_eq!(chol.solution.decomposition, baseline::domain::Decomposition::Cholesky);
    assert_eq!(qr.solution.decomposition, baseline::domain::Decomposition::Qr);
    for name in &base.estimated_parameters {
        let sigma = chol.solution.sigma(name).unwrap();
        assert_abs_diff_eq!(
            chol.solution.correction(name).unwrap(),
            qr.solution.correction(name).unwrap(),
            epsilon = 1e-6 * sigma
        );
        assert_abs_diff_eq!(sigma, qr.solution.sigma(name).unwrap(), epsilon = 1e-6 * sigma);
    }
}

#[test]
fn ut1_rate_is_estimated_around_the_reference_epoch() {
    let sim = noise_free(21);
    let mut config = embedded_config(&sim.session);
    config.estimated_parameters.push("UT1_rate".to_string());

    let run = estimate(&sim.session, &config).unwrap();
    let rate = run.eop.estimate(EopComponent::Ut1Rate).unwrap();

    // The generator's a priori table drifts by -0.45 ms/day and adds no rate.
    assert_abs_diff_eq!(rate.apriori, -0.000_45, epsilon = 1e-12);
    assert_abs_diff_eq!(rate.correction, 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(
        run.solution.correction("UT1").unwrap(),
        sim.truth["UT1"],
        epsilon = 1e-9
    );
}

#[test]
fn raised_cancel_flag_abandons_the_run() {
    let sim = noise_free(2);
    let cancel = AtomicBool::new(true);
    let err = estimate_with_cancel(&sim.session, &embedded_config(&sim.session), &cancel).unwrap_err();
    assert_eq!(err, EstimationError::Cancelled);
}

#[test]
fn shared_cancel_flag_governs_every_parallel_run() {
    let sessions: Vec<Session> = (30..34).map(|seed| noisy(seed).session).collect();
    let config = embedded_config(&sessions[0]);

    let raised = AtomicBool::new(true);
    let cancelled = estimate_sessions_with_cancel(&sessions, &config, &raised);
    assert_eq!(cancelled.len(), sessions.len());
    assert!(cancelled.iter().all(|r| r == &Err(EstimationError::Cancelled)));

    let lowered = AtomicBool::new(false);
    assert_eq!(
        estimate_sessions_with_cancel(&sessions, &config, &lowered),
        estimate_sessions(&sessions, &config)
    );
}

#[test]
fn sub_picosecond_noise_free_session_converges_without_rejection() {
    for delay_sigma in [0.5e-12, 0.3e-12, 0.1e-12] {
        let sim = generate_session(&SyntheticConfig {
            seed: 7,
            duration_hours: 12.0,
            noise: false,
            delay_sigma,
            ..SyntheticConfig::default()
        })
        .unwrap();
        let run = estimate(&sim.session, &embedded_config(&sim.session)).unwrap();
        let sol = &run.solution;
        assert_eq!(sol.iterations, 1, "sigma {delay_sigma:e}");
        assert_eq!(sol.rejected_count(), 0, "sigma {delay_sigma:e}");
        assert_eq!(sol.state, ScreeningState::Converged);
        for (name, truth) in &sim.truth {
            assert_abs_diff_eq!(sol.correction(name).unwrap(), *truth, epsilon = recovery_tolerance(name));
        }
    }
}
