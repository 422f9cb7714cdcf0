use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const AUDIT_RESULTS: &str = "audit_results";
pub const AUDIT_RESULTS_CONFLICT: &str = "property_url,audit_date";

pub const KEYWORD_RANKINGS: &str = "keyword_rankings";
pub const KEYWORD_RANKINGS_CONFLICT: &str = "audit_date,property_url,keyword";

pub const SEGMENT_METRICS_28D: &str = "portfolio_segment_metrics_28d";
pub const SEGMENT_METRICS_28D_CONFLICT: &str = "run_id,site_url,segment,scope";

pub const DOMAIN_STRENGTH: &str = "domain_strength_snapshots";
pub const DOMAIN_STRENGTH_CONFLICT: &str = "domain,engine,snapshot_date";

/// Stored columns are frequently `null` where the row type wants an empty value.
fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// One audit run for a property on a given date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditResult {
    pub property_url: String,
    pub audit_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_schema_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_entity_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_visibility_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gsc_timeseries: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub money_pages_metrics: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranking_ai_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_pages_detail: Option<Value>,
}

/// Rank and AI Overview state of one keyword for one property and audit date.
///
/// Every field is serialized (including nulls) so batches of rankings share
/// the same column set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordRanking {
    pub audit_date: NaiveDate,
    pub property_url: String,
    pub keyword: String,
    #[serde(default)]
    pub best_rank: Option<u32>,
    #[serde(default)]
    pub best_url: Option<String>,
    #[serde(default)]
    pub ctr: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_ai_overview: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ai_citations: Vec<Value>,
}

impl KeywordRanking {
    /// A row counts as carrying an AI Overview when flagged or when citations were captured.
    pub fn shows_ai_overview(&self) -> bool {
        self.has_ai_overview || !self.ai_citations.is_empty()
    }
}

/// Money-page classification used to bucket metrics. `All` is the synthetic
/// bucket covering every page and is never produced by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    All,
    Landing,
    Event,
    Product,
    Academy,
    Blog,
    Other,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::All => "all",
            Segment::Landing => "landing",
            Segment::Event => "event",
            Segment::Product => "product",
            Segment::Academy => "academy",
            Segment::Blog => "blog",
            Segment::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Segment::All),
            "landing" => Some(Segment::Landing),
            "event" => Some(Segment::Event),
            "product" => Some(Segment::Product),
            "academy" => Some(Segment::Academy),
            "blog" => Some(Segment::Blog),
            "other" => Some(Segment::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    All,
    NonBrand,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::All => "all",
            Scope::NonBrand => "non_brand",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Scope::All),
            "non_brand" | "nonbrand" => Some(Scope::NonBrand),
            _ => None,
        }
    }
}

/// Aggregated search metrics for one segment over a rolling 28-day window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentMetric28d {
    pub run_id: String,
    pub site_url: String,
    pub segment: Segment,
    pub scope: Scope,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    pub clicks: f64,
    pub impressions: f64,
    pub ctr: f64,
    pub position: f64,
    pub pages: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Weak,
    Emerging,
    Established,
    Strong,
    Dominant,
}

impl Band {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Band::Dominant
        } else if score >= 60.0 {
            Band::Strong
        } else if score >= 40.0 {
            Band::Established
        } else if score >= 20.0 {
            Band::Emerging
        } else {
            Band::Weak
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Band::Weak => "weak",
            Band::Emerging => "emerging",
            Band::Established => "established",
            Band::Strong => "strong",
            Band::Dominant => "dominant",
        }
    }
}

/// Raw organic metrics a strength score is derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainStrengthInputs {
    pub organic_etv: f64,
    pub organic_keywords: u64,
    pub top10_keywords: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainStrengthSnapshot {
    pub domain: String,
    pub engine: String,
    pub snapshot_date: NaiveDate,
    pub score: f64,
    pub band: Band,
    pub organic_etv: f64,
    pub organic_keywords: u64,
    pub top10_keywords: u64,
}

/// One Search Console row. `keys` follows the order of the requested dimensions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GscRow {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub clicks: f64,
    #[serde(default)]
    pub impressions: f64,
    #[serde(default)]
    pub ctr: f64,
    #[serde(default)]
    pub position: f64,
}
