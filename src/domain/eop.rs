//! Earth orientation parameter names, units and the a priori EOP table.

use serde::{Deserialize, Serialize};

use crate::domain::Epoch;

/// Milliarcseconds per radian.
pub const MAS_PER_RADIAN: f64 = 180.0 / std::f64::consts::PI * 3600.0 * 1000.0;

/// The EOP quantities this crate knows how to report.
///
/// Internal units: UT1-UTC in seconds of time, pole coordinates in radians,
/// rates per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EopComponent {
    #[serde(rename = "UT1")]
    Ut1,
    #[serde(rename = "UT1_rate")]
    Ut1Rate,
    #[serde(rename = "x_pole")]
    XPole,
    #[serde(rename = "x_pole_rate")]
    XPoleRate,
    #[serde(rename = "y_pole")]
    YPole,
    #[serde(rename = "y_pole_rate")]
    YPoleRate,
}

impl EopComponent {
    pub const ALL: [EopComponent; 6] = [
        EopComponent::Ut1,
        EopComponent::Ut1Rate,
        EopComponent::XPole,
        EopComponent::XPoleRate,
        EopComponent::YPole,
        EopComponent::YPoleRate,
    ];

    /// Offsets reported when nothing else is requested.
    pub const OFFSETS: [EopComponent; 3] = [EopComponent::Ut1, EopComponent::XPole, EopComponent::YPole];

    /// Parameter name as it appears in partial-derivative maps.
    pub fn name(self) -> &'static str {
        match self {
            EopComponent::Ut1 => "UT1",
            EopComponent::Ut1Rate => "UT1_rate",
            EopComponent::XPole => "x_pole",
            EopComponent::XPoleRate => "x_pole_rate",
            EopComponent::YPole => "y_pole",
            EopComponent::YPoleRate => "y_pole_rate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        EopComponent::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Conventional reporting unit.
    pub fn unit_label(self) -> &'static str {
        match self {
            EopComponent::Ut1 => "s",
            EopComponent::Ut1Rate => "s/day",
            EopComponent::XPole | EopComponent::YPole => "mas",
            EopComponent::XPoleRate | EopComponent::YPoleRate => "mas/day",
        }
    }

    /// Multiplier from internal to conventional units.
    pub fn conventional_scale(self) -> f64 {
        match self {
            EopComponent::Ut1 | EopComponent::Ut1Rate => 1.0,
            _ => MAS_PER_RADIAN,
        }
    }

    pub fn to_conventional(self, internal: f64) -> f64 {
        internal * self.conventional_scale()
    }

    pub fn from_conventional(self, conventional: f64) -> f64 {
        conventional / self.conventional_scale()
    }

    /// The offset a rate belongs to (`None` for offsets).
    pub fn offset(self) -> Option<EopComponent> {
        match self {
            EopComponent::Ut1Rate => Some(EopComponent::Ut1),
            EopComponent::XPoleRate => Some(EopComponent::XPole),
            EopComponent::YPoleRate => Some(EopComponent::YPole),
            _ => None,
        }
    }

    pub fn is_rate(self) -> bool {
        self.offset().is_some()
    }
}

impl std::fmt::Display for EopComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for EopComponent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EopComponent::from_name(s).ok_or_else(|| {
            let names: Vec<&str> = EopComponent::ALL.iter().map(|c| c.name()).collect();
            format!("unknown EOP component '{s}' (expected one of {})", names.join(", "))
        })
    }
}

/// One row of the a priori EOP table (conventional units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AprioriEopSample {
    pub mjd: f64,
    /// UT1-UTC (s).
    pub ut1: f64,
    /// x pole (mas).
    pub x_pole: f64,
    /// y pole (mas).
    pub y_pole: f64,
}

impl AprioriEopSample {
    fn value(&self, component: EopComponent) -> f64 {
        match component.offset().unwrap_or(component) {
            EopComponent::XPole => self.x_pole,
            EopComponent::YPole => self.y_pole,
            _ => self.ut1,
        }
    }
}

/// Time-ordered a priori EOP table used to derive per-session a priori values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<AprioriEopSample>", into = "Vec<AprioriEopSample>")]
pub struct AprioriEopSeries {
    samples: Vec<AprioriEopSample>,
}

impl From<Vec<AprioriEopSample>> for AprioriEopSeries {
    fn from(samples: Vec<AprioriEopSample>) -> Self {
        AprioriEopSeries::new(samples)
    }
}

impl From<AprioriEopSeries> for Vec<AprioriEopSample> {
    fn from(series: AprioriEopSeries) -> Self {
        series.samples
    }
}

impl AprioriEopSeries {
    /// Sorts by epoch and drops rows with non-finite fields.
    pub fn new(mut samples: Vec<AprioriEopSample>) -> Self {
        samples.retain(|s| s.mjd.is_finite() && s.ut1.is_finite() && s.x_pole.is_finite() && s.y_pole.is_finite());
        samples.sort_by(|a, b| a.mjd.total_cmp(&b.mjd));
        samples.dedup_by(|a, b| a.mjd == b.mjd);
        Self { samples }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[AprioriEopSample] {
        &self.samples
    }

    /// A priori value of `component` at `epoch`, in internal units.
    ///
    /// Offsets are interpolated linearly; rates are the slope of the bracketing
    /// segment. Epochs outside the table clamp to the end segment. A
    /// single-row table is constant (zero rates).
    pub fn value_at(&self, component: EopComponent, epoch: Epoch) -> Option<f64> {
        let conventional = match self.samples.as_slice() {
            [] => return None,
            [only] => {
                if component.is_rate() {
                    0.0
                } else {
                    only.value(component)
                }
            }
            samples => {
                let t = epoch.mjd();
                let upper = samples
                    .iter()
                    .position(|s| s.mjd >= t)
                    .unwrap_or(samples.len() - 1)
                    .max(1);
                let (a, b) = (&samples[upper - 1], &samples[upper]);
                let (va, vb) = (a.value(component), b.value(component));
                let slope = (vb - va) / (b.mjd - a.mjd);
                if component.is_rate() {
                    slope
                } else if t <= samples[0].mjd {
                    samples[0].value(component)
                } else if t >= samples[samples.len() - 1].mjd {
                    samples[samples.len() - 1].value(component)
                } else {
                    va + slope * (t - a.mjd)
                }
            }
        };
        Some(component.from_conventional(conventional))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn series() -> AprioriEopSeries {
        AprioriEopSeries::new(vec![
            AprioriEopSample { mjd: 60_816.0, ut1: 0.0302, x_pole: 150.0, y_pole: 401.0 },
            AprioriEopSample { mjd: 60_815.0, ut1: 0.0300, x_pole: 148.0, y_pole: 400.0 },
        ])
    }

    #[test]
    fn names_round_trip() {
        for c in EopComponent::ALL {
            assert_eq!(EopComponent::from_name(c.name()), Some(c));
            assert_eq!(c.name().parse::<EopComponent>().unwrap(), c);
        }
        assert!("LOD".parse::<EopComponent>().is_err());
    }

    #[test]
    fn pole_converts_radians_to_mas() {
        let one_mas = EopComponent::XPole.from_conventional(1.0);
        assert_abs_diff_eq!(one_mas, 4.848_136_811_095_36e-9, epsilon = 1e-20);
        assert_abs_diff_eq!(EopComponent::XPole.to_conventional(one_mas), 1.0, epsilon = 1e-12);
        assert_eq!(EopComponent::Ut1.to_conventional(0.25), 0.25);
    }

    #[test]
    fn interpolates_offsets_and_rates() {
        let s = series();
        let mid = Epoch::from_mjd(60_815.5);
        assert_abs_diff_eq!(s.value_at(EopComponent::Ut1, mid).unwrap(), 0.0301, epsilon = 1e-12);
        assert_abs_diff_eq!(s.value_at(EopComponent::Ut1Rate, mid).unwrap(), 0.0002, epsilon = 1e-12);
        let x = s.value_at(EopComponent::XPole, mid).unwrap();
        assert_abs_diff_eq!(EopComponent::XPole.to_conventional(x), 149.0, epsilon = 1e-9);
    }

    #[test]
    fn clamps_outside_the_table() {
        let s = series();
        let late = Epoch::from_mjd(60_820.0);
        let y = s.value_at(EopComponent::YPole, late).unwrap();
        assert_abs_diff_eq!(EopComponent::YPole.to_conventional(y), 401.0, epsilon = 1e-9);
        assert!(AprioriEopSeries::default().value_at(EopComponent::Ut1, late).is_none());
    }
}
