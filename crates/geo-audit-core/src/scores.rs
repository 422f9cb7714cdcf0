use crate::citations::CitationSummary;
use crate::model::AuditResult;

const VISIBILITY_WEIGHT: f64 = 0.30;
const AUTHORITY_WEIGHT: f64 = 0.20;
const CONTENT_SCHEMA_WEIGHT: f64 = 0.15;
const LOCAL_ENTITY_WEIGHT: f64 = 0.15;
const AI_VISIBILITY_WEIGHT: f64 = 0.20;

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

pub fn ai_visibility(summary: &CitationSummary) -> f64 {
    round1(summary.citation_rate * 100.0)
}

/// Weighted mean of the sub-scores that are present, weights renormalized.
pub fn overall(result: &AuditResult) -> Option<f64> {
    let parts = [
        (result.visibility_score, VISIBILITY_WEIGHT),
        (result.authority_score, AUTHORITY_WEIGHT),
        (result.content_schema_score, CONTENT_SCHEMA_WEIGHT),
        (result.local_entity_score, LOCAL_ENTITY_WEIGHT),
        (result.ai_visibility_score, AI_VISIBILITY_WEIGHT),
    ];

    let (sum, weight) = parts
        .iter()
        .filter_map(|(score, w)| score.filter(|s| s.is_finite()).map(|s| (s * w, *w)))
        .fold((0.0, 0.0), |(sum, weight), (s, w)| (sum + s, weight + w));

    if weight == 0.0 {
        None
    } else {
        Some(round1(sum / weight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audit() -> AuditResult {
        AuditResult {
            property_url: "https://example.com".into(),
            audit_date: "2024-06-01".parse().unwrap(),
            visibility_score: None,
            authority_score: None,
            content_schema_score: None,
            local_entity_score: None,
            ai_visibility_score: None,
            overall_score: None,
            gsc_timeseries: None,
            money_pages_metrics: None,
            ranking_ai_data: None,
            schema_pages_detail: None,
        }
    }

    #[test]
    fn test_overall_all_present() {
        let mut r = audit();
        r.visibility_score = Some(80.0);
        r.authority_score = Some(60.0);
        r.content_schema_score = Some(40.0);
        r.local_entity_score = Some(20.0);
        r.ai_visibility_score = Some(50.0);
        // 24 + 12 + 6 + 3 + 10
        assert_eq!(overall(&r), Some(55.0));
    }

    #[test]
    fn test_overall_renormalizes_missing() {
        let mut r = audit();
        r.visibility_score = Some(90.0);
        r.ai_visibility_score = Some(40.0);
        // (27 + 8) / 0.5
        assert_eq!(overall(&r), Some(70.0));
        assert_eq!(overall(&audit()), None);
    }

    #[test]
    fn test_ai_visibility_from_summary() {
        let s = CitationSummary {
            total_keywords: 10,
            ai_overview_keywords: 3,
            cited_keywords: 1,
            citation_rate: 1.0 / 3.0,
            pages: vec![],
        };
        assert_eq!(ai_visibility(&s), 33.3);
    }
}
