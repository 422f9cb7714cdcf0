//! AI Overview citation matching.
//!
//! Decides whether a tracked domain is cited inside Google's AI Overview and
//! attributes each citation to a page, keyword and audit date.

use crate::model::KeywordRanking;
use crate::urlnorm::{domain_matches, is_bare_path, normalize_path, normalize_url};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Field names a citation object may carry its URL under, in priority order.
const URL_FIELDS: &[&str] = &[
    "url",
    "link",
    "source_url",
    "sourceUrl",
    "href",
    "source",
    "cited_url",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitedUrl {
    pub url: String,
    pub normalized: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitationMatch {
    pub keyword: String,
    pub audit_date: NaiveDate,
    pub property_url: String,
    pub cited_url: String,
    pub cited_path: String,
    pub best_rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageCitations {
    pub path: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitationSummary {
    pub total_keywords: usize,
    pub ai_overview_keywords: usize,
    pub cited_keywords: usize,
    pub citation_rate: f64,
    pub pages: Vec<PageCitations>,
}

pub fn citation_url(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => non_empty(s),
        Value::Object(map) => URL_FIELDS
            .iter()
            .filter_map(|field| map.get(*field).and_then(Value::as_str))
            .find_map(non_empty),
        _ => None,
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t)
    }
}

/// Citations pointing at `domain` (or a subdomain), in order, deduplicated by normalized URL.
pub fn find_domain_citations(citations: &[Value], domain: &str) -> Vec<CitedUrl> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for c in citations {
        let Some(url) = citation_url(c) else {
            continue;
        };
        if !domain_matches(url, domain) {
            continue;
        }
        let Some(normalized) = normalize_url(url) else {
            continue;
        };
        if !seen.insert(normalized.clone()) {
            continue;
        }
        let title = c
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string);
        out.push(CitedUrl {
            url: url.to_string(),
            path: normalize_path(url),
            normalized,
            title,
        });
    }
    out
}

enum PageFilter {
    Path(String),
    Url(Option<String>),
}

impl PageFilter {
    fn parse(raw: &str) -> Self {
        if is_bare_path(raw) {
            PageFilter::Path(normalize_path(raw))
        } else {
            PageFilter::Url(normalize_url(raw))
        }
    }

    fn keeps(&self, cited: &CitedUrl) -> bool {
        match self {
            PageFilter::Path(p) => &cited.path == p,
            PageFilter::Url(u) => u.as_deref() == Some(cited.normalized.as_str()),
        }
    }
}

/// Every (keyword, cited page) pair for the domain. With `page_filter`, only
/// citations of that page are kept: a bare path compares paths, anything else
/// compares normalized URLs.
pub fn match_rankings(
    rankings: &[KeywordRanking],
    domain: &str,
    page_filter: Option<&str>,
) -> Vec<CitationMatch> {
    let filter = page_filter.map(PageFilter::parse);
    let mut out = Vec::new();

    for row in rankings.iter().filter(|r| r.shows_ai_overview()) {
        for cited in find_domain_citations(&row.ai_citations, domain) {
            if filter.as_ref().is_some_and(|f| !f.keeps(&cited)) {
                continue;
            }
            out.push(CitationMatch {
                keyword: row.keyword.clone(),
                audit_date: row.audit_date,
                property_url: row.property_url.clone(),
                cited_url: cited.url,
                cited_path: cited.path,
                best_rank: row.best_rank,
            });
        }
    }
    out
}

fn keyword_key(k: &str) -> String {
    k.trim().to_lowercase()
}

pub fn summarize(rankings: &[KeywordRanking], domain: &str) -> CitationSummary {
    let mut all = BTreeSet::new();
    let mut with_overview = BTreeSet::new();
    let mut cited = BTreeSet::new();
    let mut pages: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for row in rankings {
        let key = keyword_key(&row.keyword);
        all.insert(key.clone());
        if !row.shows_ai_overview() {
            continue;
        }
        with_overview.insert(key.clone());

        let hits = find_domain_citations(&row.ai_citations, domain);
        if hits.is_empty() {
            continue;
        }
        cited.insert(key.clone());
        for hit in hits {
            pages.entry(hit.path).or_default().insert(key.clone());
        }
    }

    let citation_rate = if with_overview.is_empty() {
        0.0
    } else {
        cited.len() as f64 / with_overview.len() as f64
    };

    let mut pages: Vec<PageCitations> = pages
        .into_iter()
        .map(|(path, keywords)| PageCitations {
            path,
            keywords: keywords.into_iter().collect(),
        })
        .collect();
    // BTreeMap iteration already orders by path; stable sort keeps that as tiebreak.
    pages.sort_by(|a, b| b.keywords.len().cmp(&a.keywords.len()));

    CitationSummary {
        total_keywords: all.len(),
        ai_overview_keywords: with_overview.len(),
        cited_keywords: cited.len(),
        citation_rate,
        pages,
    }
}

/// The audit date citations are attributed to: the latest one, optionally capped.
pub fn latest_audit_date(
    rankings: &[KeywordRanking],
    on_or_before: Option<NaiveDate>,
) -> Option<NaiveDate> {
    rankings
        .iter()
        .map(|r| r.audit_date)
        .filter(|d| on_or_before.map_or(true, |cap| *d <= cap))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ranking(date: &str, keyword: &str, overview: bool, citations: Value) -> KeywordRanking {
        KeywordRanking {
            audit_date: date.parse().unwrap(),
            property_url: "https://example.com".into(),
            keyword: keyword.into(),
            best_rank: Some(4),
            best_url: None,
            ctr: None,
            has_ai_overview: overview,
            ai_citations: serde_json::from_value(citations).unwrap(),
        }
    }

    #[test]
    fn test_citation_url_field_priority() {
        assert_eq!(citation_url(&json!("https://a.com")), Some("https://a.com"));
        assert_eq!(
            citation_url(&json!({"link": "https://b.com", "source": "Wiki"})),
            Some("https://b.com")
        );
        assert_eq!(
            citation_url(&json!({"url": "  ", "sourceUrl": "https://c.com"})),
            Some("https://c.com")
        );
        assert_eq!(citation_url(&json!({"title": "no url"})), None);
        assert_eq!(citation_url(&json!(42)), None);
    }

    #[test]
    fn test_find_domain_citations_dedupes_and_keeps_order() {
        let cits: Vec<Value> = vec![
            json!({"url": "https://other.com/x"}),
            json!({"url": "https://www.example.com/guide/?utm=1", "title": "Guide"}),
            json!({"href": "http://example.com/guide"}),
            json!("https://blog.example.com/post"),
        ];
        let hits = find_domain_citations(&cits, "example.com");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].normalized, "example.com/guide");
        assert_eq!(hits[0].path, "/guide");
        assert_eq!(hits[0].title.as_deref(), Some("Guide"));
        assert_eq!(hits[1].normalized, "blog.example.com/post");
    }

    #[test]
    fn test_match_rankings_with_page_filter() {
        let rows = vec![
            ranking(
                "2024-05-01",
                "geo audit",
                true,
                json!([{"url": "https://example.com/pricing"}, {"url": "https://example.com/"}]),
            ),
            ranking(
                "2024-05-01",
                "ai seo",
                true,
                json!([{"link": "https://www.example.com/pricing/"}]),
            ),
            ranking("2024-05-01", "no overview", false, json!([])),
        ];

        let all = match_rankings(&rows, "example.com", None);
        assert_eq!(all.len(), 3);

        let pricing = match_rankings(&rows, "example.com", Some("http://example.com/pricing"));
        let keywords: Vec<_> = pricing.iter().map(|m| m.keyword.as_str()).collect();
        assert_eq!(keywords, vec!["geo audit", "ai seo"]);
        assert!(pricing.iter().all(|m| m.cited_path == "/pricing"));
        assert_eq!(pricing[0].best_rank, Some(4));

        let by_path = match_rankings(&rows, "example.com", Some("/Pricing/"));
        assert_eq!(by_path, pricing);

        let root = match_rankings(&rows, "example.com", Some("/"));
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].keyword, "geo audit");

        assert!(match_rankings(&rows, "example.com", Some("other.com/pricing")).is_empty());
    }

    #[test]
    fn test_summarize_counts_and_page_order() {
        let rows = vec![
            ranking("2024-05-01", "a", true, json!([{"url": "https://example.com/p1"}])),
            ranking(
                "2024-05-01",
                "b",
                true,
                json!([{"url": "https://example.com/p1"}, {"url": "https://example.com/p0"}]),
            ),
            ranking("2024-05-01", "c", true, json!([{"url": "https://rival.com/"}])),
            ranking("2024-05-01", "d", false, json!([])),
        ];
        let s = summarize(&rows, "example.com");
        assert_eq!(s.total_keywords, 4);
        assert_eq!(s.ai_overview_keywords, 3);
        assert_eq!(s.cited_keywords, 2);
        assert!((s.citation_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(s.pages[0].path, "/p1");
        assert_eq!(s.pages[0].keywords, vec!["a", "b"]);
        assert_eq!(s.pages[1].path, "/p0");
    }

    #[test]
    fn test_summarize_without_overviews() {
        let rows = vec![ranking("2024-05-01", "x", false, json!([]))];
        let s = summarize(&rows, "example.com");
        assert_eq!(s.citation_rate, 0.0);
        assert!(s.pages.is_empty());
    }

    #[test]
    fn test_citations_without_flag_count_as_overview() {
        let rows = vec![ranking(
            "2024-05-01",
            "flagless",
            false,
            json!([{"url": "https://example.com/a"}]),
        )];
        assert_eq!(summarize(&rows, "example.com").cited_keywords, 1);
    }

    #[test]
    fn test_latest_audit_date() {
        let rows = vec![
            ranking("2024-04-01", "a", false, json!([])),
            ranking("2024-05-01", "a", false, json!([])),
            ranking("2024-06-01", "a", false, json!([])),
        ];
        assert_eq!(latest_audit_date(&rows, None), "2024-06-01".parse().ok());
        assert_eq!(
            latest_audit_date(&rows, "2024-05-15".parse().ok()),
            "2024-05-01".parse().ok()
        );
        assert_eq!(latest_audit_date(&rows, "2024-01-01".parse().ok()), None);
    }
}
