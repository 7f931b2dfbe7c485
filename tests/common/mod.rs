#![allow(dead_code)]

use baseline::data::{SyntheticConfig, SyntheticSession, generate_session};
use baseline::domain::{EstimationConfig, Observation, Session};

/// Noise-free 12-hour session over the default network.
pub fn noise_free(seed: u64) -> SyntheticSession {
    generate_session(&SyntheticConfig {
        seed,
        duration_hours: 12.0,
        noise: false,
        ..SyntheticConfig::default()
    })
    .expect("synthetic session")
}

pub fn noisy(seed: u64) -> SyntheticSession {
    generate_session(&SyntheticConfig {
        seed,
        duration_hours: 12.0,
        ..SyntheticConfig::default()
    })
    .expect("synthetic session")
}

/// The configuration the generator embedded in the session.
pub fn embedded_config(session: &Session) -> EstimationConfig {
    session.config.clone().expect("generator embeds a config")
}

/// Copy of `obs` with the observed delay shifted by `shift` seconds.
pub fn shifted(obs: &Observation, shift: f64) -> Observation {
    rebuild(obs, obs.observed_delay() + shift, |_| true)
}

/// Copy of `obs` keeping only the partials `keep` accepts.
pub fn without_partials(obs: &Observation, keep: impl Fn(&str) -> bool) -> Observation {
    rebuild(obs, obs.observed_delay(), keep)
}

fn rebuild(obs: &Observation, observed: f64, keep: impl Fn(&str) -> bool) -> Observation {
    let partials = obs
        .partials()
        .iter()
        .filter(|(name, _)| keep(name))
        .map(|(name, value)| (name.clone(), *value))
        .collect();
    let out = Observation::new(
        obs.baseline().clone(),
        obs.epoch(),
        observed,
        obs.apriori_delay(),
        obs.uncertainty(),
        partials,
    )
    .expect("valid observation");
    match obs.source() {
        Some(source) => out.with_source(source),
        None => out,
    }
}

/// Absolute tolerance for recovering a truth value from noise-free data.
pub fn recovery_tolerance(name: &str) -> f64 {
    match name {
        "UT1" => 1e-10,
        "x_pole" | "y_pole" => 5e-15,
        n if n.starts_with("clock:") => 1e-15,
        _ => 1e-16,
    }
}
