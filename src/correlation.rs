//! Correlation Analyzer - Pearson correlation per entity and pooled over all entities
//!
//! Coefficients use the product-moment formula; p-values are two-sided and come
//! from Student's t with N-2 degrees of freedom. A series with zero variance has
//! no defined coefficient and is reported as `CorrelationStatus::ZeroVariance`
//! with NaN coefficient and p-value.

use crate::error::Result;
use crate::records::PairedObservation;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Entity label of the pooled result.
pub const AGGREGATE_ENTITY: &str = "ALL";

/// Smallest sample size that yields a coefficient at all.
pub const DEFAULT_MIN_SAMPLES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStatus {
    Defined,
    ZeroVariance,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationResult {
    pub entity: String,
    pub coefficient: f64,
    pub p_value: f64,
    pub sample_size: usize,
    pub status: CorrelationStatus,
}

impl CorrelationResult {
    pub fn is_defined(&self) -> bool {
        self.status == CorrelationStatus::Defined
    }

    pub fn significance(&self) -> SignificanceBand {
        SignificanceBand::from_p_value(self.p_value)
    }
}

/// Star markers used when rendering coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum SignificanceBand {
    None,
    /// p < 0.05
    Weak,
    /// p < 0.01
    Strong,
    /// p < 0.001
    Strongest,
}

impl SignificanceBand {
    pub fn from_p_value(p_value: f64) -> Self {
        if p_value < 0.001 {
            SignificanceBand::Strongest
        } else if p_value < 0.01 {
            SignificanceBand::Strong
        } else if p_value < 0.05 {
            SignificanceBand::Weak
        } else {
            // NaN lands here too
            SignificanceBand::None
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            SignificanceBand::Strongest => "***",
            SignificanceBand::Strong => "**",
            SignificanceBand::Weak => "*",
            SignificanceBand::None => "",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Sort by coefficient. Undefined coefficients go last in either order.
pub fn rank_results(results: &mut [CorrelationResult], order: SortOrder) {
    results.sort_by(|a, b| match (a.is_defined(), b.is_defined()) {
        (true, true) => {
            let ord = a
                .coefficient
                .partial_cmp(&b.coefficient)
                .unwrap_or(Ordering::Equal);
            match order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            }
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.entity.cmp(&b.entity),
    });
}

/// Pearson's r, or `None` when either series is constant or shorter than two.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 || is_constant(&a[..n]) || is_constant(&b[..n]) {
        return None;
    }

    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a[..n].iter().zip(&b[..n]) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    // The (N-1) normalizations of covariance and both variances cancel
    let denom = (var_a * var_b).sqrt();
    if denom <= 0.0 || !denom.is_finite() {
        return None;
    }
    Some((cov / denom).clamp(-1.0, 1.0))
}

fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

/// Two-sided p-value of `r` over `n` samples.
///
/// With `n == 2` there are no degrees of freedom left and the p-value is 1.0.
/// A perfect correlation with `n > 2` has p-value 0.0.
pub fn pearson_p_value(r: f64, n: usize) -> f64 {
    if !r.is_finite() || n < 2 {
        return f64::NAN;
    }
    if n == 2 {
        return 1.0;
    }
    if r.abs() >= 1.0 {
        return 0.0;
    }
    let df = (n - 2) as f64;
    let t = r * (df / (1.0 - r * r)).sqrt();
    student_t_two_sided(t, df)
}

/// P(|T| >= |t|) for Student's t with `df` degrees of freedom.
pub fn student_t_two_sided(t: f64, df: f64) -> f64 {
    let x = df / (df + t * t);
    special::regularized_incomplete_beta(df / 2.0, 0.5, x).clamp(0.0, 1.0)
}

mod special {
    const LANCZOS: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_9e-2,
        -0.539_523_938_495_3e-5,
    ];

    pub fn ln_gamma(x: f64) -> f64 {
        let tmp = x + 5.5;
        let tmp = tmp - (x + 0.5) * tmp.ln();
        let mut y = x;
        let mut ser = 1.000_000_000_190_015;
        for c in LANCZOS {
            y += 1.0;
            ser += c / y;
        }
        -tmp + (2.506_628_274_631_000_5 * ser / x).ln()
    }

    /// I_x(a, b)
    pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
        if x <= 0.0 {
            return 0.0;
        }
        if x >= 1.0 {
            return 1.0;
        }
        let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
        let front = ln_front.exp();
        if x < (a + 1.0) / (a + b + 2.0) {
            front * continued_fraction(a, b, x) / a
        } else {
            1.0 - front * continued_fraction(b, a, 1.0 - x) / b
        }
    }

    fn continued_fraction(a: f64, b: f64, x: f64) -> f64 {
        const MAX_ITER: usize = 300;
        const EPS: f64 = 3.0e-16;
        const TINY: f64 = 1.0e-300;

        let qab = a + b;
        let qap = a + 1.0;
        let qam = a - 1.0;
        let mut c = 1.0;
        let mut d = 1.0 - qab * x / qap;
        if d.abs() < TINY {
            d = TINY;
        }
        d = 1.0 / d;
        let mut h = d;

        for m in 1..=MAX_ITER {
            let m = m as f64;
            let m2 = 2.0 * m;

            let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
            d = 1.0 + aa * d;
            if d.abs() < TINY {
                d = TINY;
            }
            c = 1.0 + aa / c;
            if c.abs() < TINY {
                c = TINY;
            }
            d = 1.0 / d;
            h *= d * c;

            let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
            d = 1.0 + aa * d;
            if d.abs() < TINY {
                d = TINY;
            }
            c = 1.0 + aa / c;
            if c.abs() < TINY {
                c = TINY;
            }
            d = 1.0 / d;
            let delta = d * c;
            h *= delta;
            if (delta - 1.0).abs() < EPS {
                break;
            }
        }
        h
    }
}

/// Per-entity and pooled correlations of one paired dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationReport {
    /// One result per entity that met the sample minimum, in entity order.
    pub per_entity: Vec<CorrelationResult>,
    /// Pooled result, `None` when the paired set is smaller than the minimum.
    pub aggregate: Option<CorrelationResult>,
    /// Entities below the minimum, with their sample size.
    pub skipped: Vec<(String, usize)>,
}

impl CorrelationReport {
    /// False when there was nothing to correlate at all.
    pub fn has_data(&self) -> bool {
        self.aggregate.is_some() || !self.per_entity.is_empty()
    }

    pub fn get(&self, entity: &str) -> Option<&CorrelationResult> {
        self.per_entity.iter().find(|r| r.entity == entity)
    }

    pub fn ranked(&self, order: SortOrder) -> Vec<CorrelationResult> {
        let mut results = self.per_entity.clone();
        rank_results(&mut results, order);
        results
    }

    /// Frame `entity, coefficient, p_value, sample_size, significance` for the renderer.
    pub fn to_frame(&self, order: SortOrder) -> Result<DataFrame> {
        let ranked = self.ranked(order);
        let entity: Vec<&str> = ranked.iter().map(|r| r.entity.as_str()).collect();
        let coefficient: Vec<Option<f64>> = ranked
            .iter()
            .map(|r| r.is_defined().then_some(r.coefficient))
            .collect();
        let p_value: Vec<Option<f64>> = ranked
            .iter()
            .map(|r| r.is_defined().then_some(r.p_value))
            .collect();
        let sample_size: Vec<u64> = ranked.iter().map(|r| r.sample_size as u64).collect();
        let significance: Vec<&str> = ranked.iter().map(|r| r.significance().marker()).collect();

        Ok(DataFrame::new(vec![
            Series::new("entity", entity),
            Series::new("coefficient", coefficient),
            Series::new("p_value", p_value),
            Series::new("sample_size", sample_size),
            Series::new("significance", significance),
        ])?)
    }
}

#[derive(Debug, Clone)]
pub struct CorrelationAnalyzer {
    min_samples: usize,
}

impl Default for CorrelationAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SAMPLES)
    }
}

impl CorrelationAnalyzer {
    /// Minimums below two are raised to two.
    pub fn new(min_samples: usize) -> Self {
        Self {
            min_samples: min_samples.max(DEFAULT_MIN_SAMPLES),
        }
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    pub fn analyze(&self, pairs: &[PairedObservation]) -> CorrelationReport {
        let mut groups: BTreeMap<&str, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
        for pair in pairs {
            let (a, b) = groups.entry(pair.entity.as_str()).or_default();
            a.push(pair.value_a);
            b.push(pair.value_b);
        }

        let mut per_entity = Vec::new();
        let mut skipped = Vec::new();
        for (entity, (a, b)) in &groups {
            if a.len() < self.min_samples {
                debug!("Skipping {}: {} samples < {}", entity, a.len(), self.min_samples);
                skipped.push((entity.to_string(), a.len()));
                continue;
            }
            per_entity.push(self.correlate(entity, a, b));
        }

        let aggregate = if pairs.len() >= self.min_samples {
            let a: Vec<f64> = pairs.iter().map(|p| p.value_a).collect();
            let b: Vec<f64> = pairs.iter().map(|p| p.value_b).collect();
            Some(self.correlate(AGGREGATE_ENTITY, &a, &b))
        } else {
            warn!(
                "No data for pooled correlation: {} pairs < {}",
                pairs.len(),
                self.min_samples
            );
            None
        };

        let undefined = per_entity.iter().filter(|r| !r.is_defined()).count();
        if undefined > 0 {
            warn!("{} entities have a constant series; coefficient undefined", undefined);
        }
        info!(
            "Correlated {} entities ({} skipped below {} samples)",
            per_entity.len(),
            skipped.len(),
            self.min_samples
        );

        CorrelationReport {
            per_entity,
            aggregate,
            skipped,
        }
    }

    /// Correlate two aligned series under `entity`'s label.
    pub fn correlate(&self, entity: &str, a: &[f64], b: &[f64]) -> CorrelationResult {
        let sample_size = a.len().min(b.len());
        match pearson(a, b) {
            Some(r) => CorrelationResult {
                entity: entity.to_string(),
                coefficient: r,
                p_value: pearson_p_value(r, sample_size),
                sample_size,
                status: CorrelationStatus::Defined,
            },
            None => CorrelationResult {
                entity: entity.to_string(),
                coefficient: f64::NAN,
                p_value: f64::NAN,
                sample_size,
                status: CorrelationStatus::ZeroVariance,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_two_points_perfect_correlation() {
        let pairs = vec![
            PairedObservation::new("Z", 2000, 10.0, 1.0),
            PairedObservation::new("Z", 2001, 20.0, 2.0),
        ];
        let report = CorrelationAnalyzer::default().analyze(&pairs);
        let z = report.get("Z").unwrap();

        assert!(approx(z.coefficient, 1.0));
        assert_eq!(z.p_value, 1.0);
        assert_eq!(z.sample_size, 2);
    }

    #[test]
    fn test_known_p_values() {
        let r = pearson(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 4.0, 5.0, 4.0, 5.0]).unwrap();
        assert!(approx(r, 0.774_596_669_241_483_4));
        assert!((pearson_p_value(r, 5) - 0.124_027_062_657_554_5).abs() < 1e-7);

        let r = pearson(&[1.0, 2.0, 3.0, 4.0], &[1.0, 3.0, 2.0, 4.0]).unwrap();
        assert!(approx(r, 0.8));
        assert!((pearson_p_value(r, 4) - 0.2).abs() < 1e-7);
    }

    #[test]
    fn test_student_t_closed_forms() {
        // Cauchy: P(|T| > 1) = 0.5
        assert!((student_t_two_sided(1.0, 1.0) - 0.5).abs() < 1e-9);
        // df = 2: p = 1 - t / sqrt(2 + t^2)
        let t: f64 = 1.0;
        assert!((student_t_two_sided(t, 2.0) - (1.0 - t / (2.0 + t * t).sqrt())).abs() < 1e-9);
        assert!(approx(student_t_two_sided(0.0, 7.0), 1.0));
    }

    #[test]
    fn test_perfect_correlation_beyond_two_points() {
        assert_eq!(pearson_p_value(1.0, 5), 0.0);
        assert_eq!(pearson_p_value(-1.0, 5), 0.0);
    }

    #[test]
    fn test_zero_variance_is_undefined() {
        let pairs = vec![
            PairedObservation::new("Flat", 2000, 5.0, 1.0),
            PairedObservation::new("Flat", 2001, 5.0, 2.0),
            PairedObservation::new("Flat", 2002, 5.0, 3.0),
        ];
        let report = CorrelationAnalyzer::default().analyze(&pairs);
        let flat = report.get("Flat").unwrap();

        assert_eq!(flat.status, CorrelationStatus::ZeroVariance);
        assert!(flat.coefficient.is_nan());
        assert!(flat.p_value.is_nan());
        assert_eq!(flat.significance(), SignificanceBand::None);
    }

    #[test]
    fn test_min_samples_excludes_entities() {
        let pairs = vec![
            PairedObservation::new("Short", 2000, 1.0, 2.0),
            PairedObservation::new("Short", 2001, 2.0, 1.0),
            PairedObservation::new("Long", 2000, 1.0, 1.0),
            PairedObservation::new("Long", 2001, 2.0, 3.0),
            PairedObservation::new("Long", 2002, 3.0, 2.0),
            PairedObservation::new("Long", 2003, 4.0, 4.0),
        ];
        let report = CorrelationAnalyzer::new(4).analyze(&pairs);

        assert!(report.get("Short").is_none());
        assert!(report.get("Long").is_some());
        assert_eq!(report.skipped, vec![("Short".to_string(), 2)]);
        assert_eq!(report.aggregate.as_ref().unwrap().sample_size, 6);
        assert_eq!(report.aggregate.as_ref().unwrap().entity, AGGREGATE_ENTITY);
    }

    #[test]
    fn test_empty_input_reports_no_data() {
        let report = CorrelationAnalyzer::default().analyze(&[]);
        assert!(!report.has_data());
        assert!(report.aggregate.is_none());
    }

    #[test]
    fn test_significance_thresholds() {
        assert_eq!(SignificanceBand::from_p_value(0.0009).marker(), "***");
        assert_eq!(SignificanceBand::from_p_value(0.001).marker(), "**");
        assert_eq!(SignificanceBand::from_p_value(0.0099).marker(), "**");
        assert_eq!(SignificanceBand::from_p_value(0.01).marker(), "*");
        assert_eq!(SignificanceBand::from_p_value(0.0499).marker(), "*");
        assert_eq!(SignificanceBand::from_p_value(0.05).marker(), "");
        assert_eq!(SignificanceBand::from_p_value(f64::NAN).marker(), "");
    }

    #[test]
    fn test_ranking_puts_undefined_last() {
        let analyzer = CorrelationAnalyzer::default();
        let mut results = vec![
            analyzer.correlate("Up", &[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]),
            analyzer.correlate("Flat", &[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]),
            analyzer.correlate("Down", &[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]),
        ];

        rank_results(&mut results, SortOrder::Ascending);
        let order: Vec<&str> = results.iter().map(|r| r.entity.as_str()).collect();
        assert_eq!(order, vec!["Down", "Up", "Flat"]);

        rank_results(&mut results, SortOrder::Descending);
        let order: Vec<&str> = results.iter().map(|r| r.entity.as_str()).collect();
        assert_eq!(order, vec!["Up", "Down", "Flat"]);
    }

    #[test]
    fn test_report_frame() {
        let pairs = vec![
            PairedObservation::new("A", 2000, 1.0, 2.0),
            PairedObservation::new("A", 2001, 2.0, 4.1),
            PairedObservation::new("A", 2002, 3.0, 5.9),
        ];
        let report = CorrelationAnalyzer::default().analyze(&pairs);
        let df = report.to_frame(SortOrder::Descending).unwrap();

        assert_eq!(df.height(), 1);
        assert_eq!(
            df.get_column_names(),
            vec!["entity", "coefficient", "p_value", "sample_size", "significance"]
        );
    }
}
