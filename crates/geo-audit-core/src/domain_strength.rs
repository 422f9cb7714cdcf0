use crate::model::{Band, DomainStrengthInputs, DomainStrengthSnapshot};
use crate::urlnorm::normalize_domain;
use anyhow::Result;
use chrono::NaiveDate;

pub const DEFAULT_ENGINE: &str = "google";

const ETV_WEIGHT: f64 = 0.5;
const ETV_CAP: f64 = 10_000_000.0;
const KEYWORDS_WEIGHT: f64 = 0.3;
const KEYWORDS_CAP: f64 = 1_000_000.0;
const TOP10_WEIGHT: f64 = 0.2;
const TOP10_CAP: f64 = 100_000.0;

fn log_component(x: f64, cap: f64) -> f64 {
    if !x.is_finite() || x <= 0.0 {
        return 0.0;
    }
    ((1.0 + x).ln() / (1.0 + cap).ln()).clamp(0.0, 1.0)
}

/// 0-100 strength score, rounded to one decimal.
pub fn score(inputs: &DomainStrengthInputs) -> f64 {
    let raw = ETV_WEIGHT * log_component(inputs.organic_etv, ETV_CAP)
        + KEYWORDS_WEIGHT * log_component(inputs.organic_keywords as f64, KEYWORDS_CAP)
        + TOP10_WEIGHT * log_component(inputs.top10_keywords as f64, TOP10_CAP);
    (raw * 1000.0).round() / 10.0
}

pub fn snapshot(
    domain: &str,
    engine: &str,
    date: NaiveDate,
    inputs: DomainStrengthInputs,
) -> Result<DomainStrengthSnapshot> {
    let domain = normalize_domain(domain)
        .ok_or_else(|| crate::errors::ValidationError(format!("invalid domain: {domain}")))?;
    let engine = engine.trim().to_lowercase();
    let engine = if engine.is_empty() {
        DEFAULT_ENGINE.to_string()
    } else {
        engine
    };
    let score = score(&inputs);

    Ok(DomainStrengthSnapshot {
        domain,
        engine,
        snapshot_date: date,
        score,
        band: Band::from_score(score),
        organic_etv: inputs.organic_etv,
        organic_keywords: inputs.organic_keywords,
        top10_keywords: inputs.top10_keywords,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_bounds() {
        assert_eq!(score(&DomainStrengthInputs::default()), 0.0);
        let saturated = DomainStrengthInputs {
            organic_etv: 1e9,
            organic_keywords: 10_000_000,
            top10_keywords: 1_000_000,
        };
        assert_eq!(score(&saturated), 100.0);
        let nan = DomainStrengthInputs {
            organic_etv: f64::NAN,
            ..Default::default()
        };
        assert_eq!(score(&nan), 0.0);
    }

    #[test]
    fn test_score_is_monotonic() {
        let small = DomainStrengthInputs {
            organic_etv: 1_000.0,
            organic_keywords: 500,
            top10_keywords: 50,
        };
        let big = DomainStrengthInputs {
            organic_etv: 100_000.0,
            organic_keywords: 20_000,
            top10_keywords: 2_000,
        };
        let (s, b) = (score(&small), score(&big));
        assert!(s > 0.0 && s < b && b < 100.0, "{s} < {b}");
    }

    #[test]
    fn test_snapshot_normalizes_domain_and_bands() {
        let snap = snapshot(
            "https://www.Example.com/",
            "",
            "2024-06-01".parse().unwrap(),
            DomainStrengthInputs {
                organic_etv: 1e9,
                organic_keywords: 10_000_000,
                top10_keywords: 1_000_000,
            },
        )
        .unwrap();
        assert_eq!(snap.domain, "example.com");
        assert_eq!(snap.engine, "google");
        assert_eq!(snap.band, Band::Dominant);

        assert!(snapshot("", "google", "2024-06-01".parse().unwrap(), Default::default()).is_err());
    }
}
