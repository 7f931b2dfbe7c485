//! Synthetic VLBI session generation.
//!
//! Builds a deterministic (seeded) 24-hour style session over a small global
//! network. Geometry is deliberately simple (no precession/nutation, spherical
//! Earth for elevations) but self-consistent: the partials handed to the
//! estimator are exactly the ones used to perturb the observed delays, so a
//! noise-free session is recovered to rounding level.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use nalgebra::Vector3;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{
    AprioriEopSample, AprioriEopSeries, Baseline, EopComponent, Epoch, EstimationConfig, MAS_PER_RADIAN, Observation,
    Session,
};
use crate::error::AppError;

/// Speed of light (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;
/// Ratio of universal to sidereal rotation.
const ERA_RATE: f64 = 1.002_737_811_911_354_48;
/// Earth rotation rate per second of UT1 (rad/s).
const EARTH_ROTATION_RATE: f64 = TAU * ERA_RATE / 86_400.0;

/// A network station: name and ECEF position (m).
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub name: String,
    pub position: Vector3<f64>,
}

impl Station {
    pub fn new(name: &str, x: f64, y: f64, z: f64) -> Self {
        Self {
            name: name.to_string(),
            position: Vector3::new(x, y, z),
        }
    }

    /// Sine of the elevation of direction `s` (spherical Earth).
    fn sin_elevation(&self, s: &Vector3<f64>) -> f64 {
        self.position.normalize().dot(s)
    }
}

/// A radio source at fixed celestial coordinates (degrees).
#[derive(Debug, Clone, PartialEq)]
pub struct RadioSource {
    pub name: String,
    pub ra_deg: f64,
    pub dec_deg: f64,
}

impl RadioSource {
    pub fn new(name: &str, ra_deg: f64, dec_deg: f64) -> Self {
        Self {
            name: name.to_string(),
            ra_deg,
            dec_deg,
        }
    }
}

/// Generator settings. Truth values are corrections to the a priori model.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub seed: u64,
    pub name: String,
    pub start_mjd: f64,
    pub duration_hours: f64,
    pub scan_interval_minutes: f64,
    pub elevation_cutoff_deg: f64,
    pub stations: Vec<Station>,
    pub sources: Vec<RadioSource>,
    /// Formal delay uncertainty assigned to every observation (s).
    pub delay_sigma: f64,
    /// Whether Gaussian noise with `delay_sigma` is added.
    pub noise: bool,
    /// UT1 correction (s).
    pub ut1_offset: f64,
    /// Pole corrections (mas).
    pub x_pole_offset: f64,
    pub y_pole_offset: f64,
    /// Std dev of per-station clock offsets (s); zero disables them.
    pub clock_sigma: f64,
    /// Std dev of per-station zenith delay corrections (s); zero disables them.
    pub troposphere_sigma: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            name: "SIM-R1".to_string(),
            start_mjd: 60_815.0,
            duration_hours: 24.0,
            scan_interval_minutes: 10.0,
            elevation_cutoff_deg: 5.0,
            stations: default_network(),
            sources: default_sources(),
            delay_sigma: 20e-12,
            noise: true,
            ut1_offset: 2.0e-5,
            x_pole_offset: 0.35,
            y_pole_offset: -0.22,
            clock_sigma: 0.0,
            troposphere_sigma: 0.0,
        }
    }
}

/// Generated session together with the truth it was built from.
#[derive(Debug, Clone)]
pub struct SyntheticSession {
    pub session: Session,
    /// True correction per parameter name (internal units).
    pub truth: BTreeMap<String, f64>,
    /// Station whose clock is held fixed.
    pub reference_station: String,
}

/// Six-station network with roughly global coverage.
pub fn default_network() -> Vec<Station> {
    vec![
        Station::new("WETTZELL", 4_075_539.5, 931_735.6, 4_801_629.4),
        Station::new("KOKEE", -5_543_837.6, -2_054_566.0, 2_387_852.2),
        Station::new("ONSALA60", 3_370_605.8, 711_917.7, 5_349_830.9),
        Station::new("WESTFORD", 1_492_206.6, -4_458_130.5, 4_296_015.5),
        Station::new("HART15M", 5_085_401.1, 2_668_330.1, -2_768_688.9),
        Station::new("HOBART26", -3_950_237.0, 2_522_347.6, -4_311_561.8),
    ]
}

/// Geodetic calibrators spread over the sky.
pub fn default_sources() -> Vec<RadioSource> {
    vec![
        RadioSource::new("0552+398", 88.878, 39.814),
        RadioSource::new("1741-038", 265.995, -3.835),
        RadioSource::new("0851+202", 133.704, 20.108),
        RadioSource::new("1921-293", 291.213, -29.241),
        RadioSource::new("0229+131", 38.021, 13.358),
        RadioSource::new("2145+067", 327.022, 6.961),
        RadioSource::new("1144-379", 176.756, -38.203),
        RadioSource::new("0016+731", 4.941, 73.458),
        RadioSource::new("1803+784", 270.190, 78.468),
        RadioSource::new("0727-115", 112.580, -11.687),
    ]
}

pub fn clock_parameter(station: &str) -> String {
    format!("clock:{station}")
}

pub fn troposphere_parameter(station: &str) -> String {
    format!("atm:{station}")
}

/// Generate a synthetic session.
pub fn generate_session(config: &SyntheticConfig) -> Result<SyntheticSession, AppError> {
    validate(config)?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, 1.0).map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

    let reference_station = config.stations[0].name.clone();

    let mut truth = BTreeMap::new();
    truth.insert(EopComponent::Ut1.name().to_string(), config.ut1_offset);
    truth.insert(EopComponent::XPole.name().to_string(), config.x_pole_offset / MAS_PER_RADIAN);
    truth.insert(EopComponent::YPole.name().to_string(), config.y_pole_offset / MAS_PER_RADIAN);
    if config.clock_sigma > 0.0 {
        for st in &config.stations[1..] {
            truth.insert(clock_parameter(&st.name), config.clock_sigma * normal.sample(&mut rng));
        }
    }
    if config.troposphere_sigma > 0.0 {
        for st in &config.stations {
            truth.insert(troposphere_parameter(&st.name), config.troposphere_sigma * normal.sample(&mut rng));
        }
    }

    let apriori_eop = apriori_series(config);
    let sin_cutoff = config.elevation_cutoff_deg.to_radians().sin();
    let n_scans = (config.duration_hours * 60.0 / config.scan_interval_minutes).floor() as usize;

    let mut observations = Vec::new();
    for scan in 0..n_scans {
        let epoch = Epoch::from_mjd(config.start_mjd + scan as f64 * config.scan_interval_minutes / 1440.0);
        let ut1 = apriori_eop.value_at(EopComponent::Ut1, epoch).unwrap_or(0.0);
        let xp = apriori_eop.value_at(EopComponent::XPole, epoch).unwrap_or(0.0);
        let yp = apriori_eop.value_at(EopComponent::YPole, epoch).unwrap_or(0.0);
        let theta = earth_rotation_angle(epoch.mjd() + ut1 / 86_400.0);

        // Start at a random source and take the first one at least two stations see.
        let start = rng.gen_range(0..config.sources.len());
        let chosen = (0..config.sources.len())
            .map(|k| &config.sources[(start + k) % config.sources.len()])
            .find_map(|src| {
                let geom = SourceGeometry::new(src, theta, xp, yp);
                let visible: Vec<(&Station, f64)> = config
                    .stations
                    .iter()
                    .map(|st| (st, st.sin_elevation(&geom.direction)))
                    .filter(|(_, sin_el)| *sin_el > sin_cutoff)
                    .collect();
                (visible.len() >= 2).then_some((src, geom, visible))
            });
        let Some((source, geom, visible)) = chosen else {
            continue;
        };

        for i in 0..visible.len() {
            for j in (i + 1)..visible.len() {
                let (s1, sin1) = visible[i];
                let (s2, sin2) = visible[j];
                let b = s2.position - s1.position;

                let apriori_delay = -b.dot(&geom.direction) / SPEED_OF_LIGHT;
                let mut partials = BTreeMap::new();
                partials.insert(
                    EopComponent::Ut1.name().to_string(),
                    -b.dot(&geom.d_theta) * EARTH_ROTATION_RATE / SPEED_OF_LIGHT,
                );
                partials.insert(EopComponent::XPole.name().to_string(), -b.dot(&geom.d_xp) / SPEED_OF_LIGHT);
                partials.insert(EopComponent::YPole.name().to_string(), -b.dot(&geom.d_yp) / SPEED_OF_LIGHT);
                // Every clock gets a partial; the reference is fixed by not estimating it.
                partials.insert(clock_parameter(&s1.name), -1.0);
                partials.insert(clock_parameter(&s2.name), 1.0);
                partials.insert(troposphere_parameter(&s1.name), -1.0 / sin1);
                partials.insert(troposphere_parameter(&s2.name), 1.0 / sin2);

                let signal: f64 = truth
                    .iter()
                    .map(|(name, value)| partials.get(name).copied().unwrap_or(0.0) * value)
                    .sum();
                let noise = if config.noise {
                    config.delay_sigma * normal.sample(&mut rng)
                } else {
                    0.0
                };

                let obs = Observation::new(
                    Baseline::new(s1.name.as_str(), s2.name.as_str()),
                    epoch,
                    apriori_delay + signal + noise,
                    apriori_delay,
                    config.delay_sigma,
                    partials,
                )?
                .with_source(source.name.as_str());
                observations.push(obs);
            }
        }
    }

    let mut session = Session::new(config.name.clone(), observations);
    session.apriori_eop = apriori_eop;
    session.config = Some(EstimationConfig {
        estimated_parameters: truth.keys().cloned().collect(),
        ..EstimationConfig::default()
    });

    Ok(SyntheticSession {
        session,
        truth,
        reference_station,
    })
}

fn validate(config: &SyntheticConfig) -> Result<(), AppError> {
    if config.stations.len() < 2 {
        return Err(AppError::new(2, "Synthetic network needs at least two stations."));
    }
    if config.sources.is_empty() {
        return Err(AppError::new(2, "Synthetic session needs at least one source."));
    }
    if !(config.duration_hours.is_finite() && config.duration_hours > 0.0) {
        return Err(AppError::new(2, "Session duration must be > 0 hours."));
    }
    if !(config.scan_interval_minutes.is_finite() && config.scan_interval_minutes > 0.0) {
        return Err(AppError::new(2, "Scan interval must be > 0 minutes."));
    }
    if !(config.delay_sigma.is_finite() && config.delay_sigma > 0.0) {
        return Err(AppError::new(2, "Delay sigma must be > 0."));
    }
    if !(config.clock_sigma >= 0.0 && config.troposphere_sigma >= 0.0) {
        return Err(AppError::new(2, "Clock and troposphere sigmas must be >= 0."));
    }
    Ok(())
}

/// A priori EOP table spanning the session with a day of margin each side.
fn apriori_series(config: &SyntheticConfig) -> AprioriEopSeries {
    let first = config.start_mjd.floor() - 1.0;
    let last = (config.start_mjd + config.duration_hours / 24.0).ceil() + 1.0;
    let days = (last - first) as usize;
    AprioriEopSeries::new(
        (0..=days)
            .map(|d| {
                let t = d as f64;
                AprioriEopSample {
                    mjd: first + t,
                    ut1: 0.0312 - 0.000_45 * t,
                    x_pole: 152.4 + 0.9 * t,
                    y_pole: 381.7 - 1.3 * t,
                }
            })
            .collect(),
    )
}

/// Earth rotation angle (rad) at a UT1 MJD.
fn earth_rotation_angle(mjd_ut1: f64) -> f64 {
    let du = mjd_ut1 - 51_544.5;
    (TAU * (0.779_057_273_264 + ERA_RATE * du)).rem_euclid(TAU)
}

/// Terrestrial source direction and its first derivatives.
struct SourceGeometry {
    direction: Vector3<f64>,
    /// ∂s/∂θ (per radian of rotation angle).
    d_theta: Vector3<f64>,
    /// ∂s/∂x_pole, ∂s/∂y_pole (per radian).
    d_xp: Vector3<f64>,
    d_yp: Vector3<f64>,
}

impl SourceGeometry {
    fn new(source: &RadioSource, theta: f64, xp: f64, yp: f64) -> Self {
        let dec = source.dec_deg.to_radians();
        let h = theta - source.ra_deg.to_radians();
        let (sin_h, cos_h) = h.sin_cos();
        let (sin_d, cos_d) = dec.sin_cos();

        // Direction in the rotating (pre polar motion) frame.
        let s = Vector3::new(cos_d * cos_h, -cos_d * sin_h, sin_d);
        let ds = Vector3::new(-cos_d * sin_h, -cos_d * cos_h, 0.0);

        // First-order polar motion.
        let polar = |v: &Vector3<f64>| Vector3::new(v.x - xp * v.z, v.y + yp * v.z, v.z + xp * v.x - yp * v.y);
        let direction = polar(&s);

        Self {
            direction,
            d_theta: polar(&ds),
            d_xp: Vector3::new(-direction.z, 0.0, direction.x),
            d_yp: Vector3::new(0.0, direction.z, -direction.y),
        }
    }
}
