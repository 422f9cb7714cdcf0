//! Rolling 28-day window aggregation of Search Console page/query rows into
//! per-segment metrics.

use crate::model::{GscRow, Scope, Segment, SegmentMetric28d};
use crate::segments::SegmentClassifier;
use crate::urlnorm::normalize_url;
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const WINDOW_DAYS: i64 = 28;
pub const DEFAULT_LAG_DAYS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window28d {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window28d {
    /// Window ending `lag_days` before `today`, both ends inclusive. `None`
    /// when the window would fall outside the representable date range.
    pub fn ending(today: NaiveDate, lag_days: u32) -> Option<Self> {
        let end = today.checked_sub_days(Days::new(u64::from(lag_days)))?;
        let start = end.checked_sub_days(Days::new(WINDOW_DAYS as u64 - 1))?;
        Some(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageQueryRow {
    pub page: String,
    pub query: String,
    pub clicks: f64,
    pub impressions: f64,
    pub position: f64,
}

impl PageQueryRow {
    /// Expects a row requested with dimensions `[page, query]`.
    pub fn from_gsc(row: &GscRow) -> Option<Self> {
        let page = row.keys.first()?.clone();
        let query = row.keys.get(1).cloned().unwrap_or_default();
        Some(Self {
            page,
            query,
            clicks: row.clicks,
            impressions: row.impressions,
            position: row.position,
        })
    }
}

#[derive(Default)]
struct Accumulator {
    clicks: f64,
    impressions: f64,
    weighted_position: f64,
    pages: BTreeSet<String>,
}

impl Accumulator {
    fn add(&mut self, row: &PageQueryRow, page_key: &str) {
        self.clicks += row.clicks;
        self.impressions += row.impressions;
        self.weighted_position += row.position * row.impressions;
        self.pages.insert(page_key.to_string());
    }
}

fn is_brand(query: &str, brand_terms: &[String]) -> bool {
    let q = query.to_lowercase();
    brand_terms.iter().any(|t| q.contains(t.as_str()))
}

/// Aggregates rows into one metric per observed (segment, scope) plus the
/// synthetic `all` segment. Non-brand rows are only produced when brand terms
/// are supplied.
pub fn aggregate(
    rows: &[PageQueryRow],
    site_url: &str,
    run_id: &str,
    window: Window28d,
    classifier: &SegmentClassifier,
    brand_terms: &[String],
) -> Vec<SegmentMetric28d> {
    let brand: Vec<String> = brand_terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let mut acc: BTreeMap<(Segment, Scope), Accumulator> = BTreeMap::new();

    for row in rows {
        let segment = classifier.classify(&row.page);
        let page_key = normalize_url(&row.page).unwrap_or_else(|| row.page.clone());

        let mut scopes = vec![Scope::All];
        if !brand.is_empty() && !is_brand(&row.query, &brand) {
            scopes.push(Scope::NonBrand);
        }

        for scope in scopes {
            for seg in [Segment::All, segment] {
                acc.entry((seg, scope)).or_default().add(row, &page_key);
            }
        }
    }

    acc.into_iter()
        .map(|((segment, scope), a)| {
            let (ctr, position) = if a.impressions > 0.0 {
                (a.clicks / a.impressions, a.weighted_position / a.impressions)
            } else {
                (0.0, 0.0)
            };
            SegmentMetric28d {
                run_id: run_id.to_string(),
                site_url: site_url.to_string(),
                segment,
                scope,
                date_start: window.start,
                date_end: window.end,
                clicks: a.clicks,
                impressions: a.impressions,
                ctr,
                position,
                pages: a.pages.len() as u32,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn row(page: &str, query: &str, clicks: f64, impressions: f64, position: f64) -> PageQueryRow {
        PageQueryRow {
            page: page.into(),
            query: query.into(),
            clicks,
            impressions,
            position,
        }
    }

    #[test]
    fn test_window_is_28_inclusive_days() {
        let w = Window28d::ending(d("2024-06-30"), 2).unwrap();
        assert_eq!(w.end, d("2024-06-28"));
        assert_eq!(w.start, d("2024-06-01"));
        assert_eq!(w.days(), 28);
        assert!(w.contains(d("2024-06-01")));
        assert!(!w.contains(d("2024-05-31")));
        assert!(!w.contains(d("2024-06-29")));
    }

    #[test]
    fn test_window_crosses_month_boundary() {
        let w = Window28d::ending(d("2024-03-05"), 0).unwrap();
        assert_eq!(w.start, d("2024-02-07"));
        assert_eq!(w.days(), 28);
    }

    #[test]
    fn test_window_at_date_range_edge() {
        assert_eq!(Window28d::ending(NaiveDate::MIN, 2), None);
        let near_min = NaiveDate::MIN.checked_add_days(Days::new(10)).unwrap();
        assert_eq!(Window28d::ending(near_min, 0), None);
        assert!(Window28d::ending(NaiveDate::MAX, 2).is_some());
    }

    #[test]
    fn test_from_gsc_row() {
        let g = GscRow {
            keys: vec!["https://example.com/a".into(), "q".into()],
            clicks: 3.0,
            impressions: 10.0,
            ctr: 0.3,
            position: 2.0,
        };
        let r = PageQueryRow::from_gsc(&g).unwrap();
        assert_eq!(r.page, "https://example.com/a");
        assert_eq!(r.query, "q");
        assert!(PageQueryRow::from_gsc(&GscRow::default()).is_none());
    }

    #[test]
    fn test_aggregate_segments_and_weighting() {
        let w = Window28d::ending(d("2024-06-30"), 2).unwrap();
        let rows = vec![
            row("https://example.com/academy/a", "learn seo", 10.0, 100.0, 2.0),
            row("https://example.com/academy/a/", "acme academy", 5.0, 100.0, 4.0),
            row("https://example.com/academy/b", "seo course", 0.0, 0.0, 0.0),
            row("https://example.com/pricing", "acme pricing", 1.0, 50.0, 1.0),
        ];
        let out = aggregate(
            &rows,
            "https://example.com/",
            "run-1",
            w,
            &SegmentClassifier::default(),
            &["ACME".to_string()],
        );

        let find = |seg, scope| {
            out.iter()
                .find(|m| m.segment == seg && m.scope == scope)
                .unwrap()
        };

        let academy = find(Segment::Academy, Scope::All);
        assert_eq!(academy.clicks, 15.0);
        assert_eq!(academy.impressions, 200.0);
        assert!((academy.ctr - 0.075).abs() < 1e-9);
        assert!((academy.position - 3.0).abs() < 1e-9);
        assert_eq!(academy.pages, 2);
        assert_eq!(academy.date_start, d("2024-06-01"));

        let academy_nb = find(Segment::Academy, Scope::NonBrand);
        assert_eq!(academy_nb.clicks, 10.0);
        assert_eq!(academy_nb.pages, 2);

        let all = find(Segment::All, Scope::All);
        assert_eq!(all.clicks, 16.0);
        assert_eq!(all.pages, 3);

        assert!(out
            .iter()
            .all(|m| !(m.segment == Segment::Product && m.scope == Scope::NonBrand)));

        // Sorted by segment then scope.
        assert_eq!(out[0].segment, Segment::All);
        assert_eq!(out[0].scope, Scope::All);
        assert_eq!(out[1].scope, Scope::NonBrand);
    }

    #[test]
    fn test_aggregate_without_brand_terms_has_no_non_brand() {
        let w = Window28d::ending(d("2024-06-30"), 2).unwrap();
        let rows = vec![row("https://example.com/blog/x", "q", 0.0, 0.0, 0.0)];
        let out = aggregate(&rows, "s", "r", w, &SegmentClassifier::default(), &[]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|m| m.scope == Scope::All));
        assert!(out.iter().all(|m| m.ctr == 0.0 && m.position == 0.0));
    }
}
