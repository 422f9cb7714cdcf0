//! Money-page segment classification.
//!
//! Rules are ordered and the first matching rule wins. Patterns are regular
//! expressions evaluated against the normalized path (see [`normalize_path`]).

use crate::model::Segment;
use crate::urlnorm::normalize_path;
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

/// Optional two-letter locale prefix such as `/en` or `/nl-be`.
const LOCALE: &str = r"^(/[a-z]{2}(-[a-z]{2})?)?";

#[derive(Debug, Clone)]
pub struct SegmentRule {
    pub segment: Segment,
    patterns: Vec<Regex>,
}

impl SegmentRule {
    pub fn new(segment: Segment, patterns: &[String]) -> Result<Self> {
        anyhow::ensure!(
            segment != Segment::All,
            "segment 'all' is reserved for the aggregate bucket"
        );
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("invalid pattern for {}: {p}", segment.as_str())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { segment, patterns })
    }

    fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(path))
    }
}

#[derive(Debug, Clone)]
pub struct SegmentClassifier {
    rules: Vec<SegmentRule>,
}

#[derive(Deserialize)]
struct RulesFile {
    segments: Vec<RuleEntry>,
}

#[derive(Deserialize)]
struct RuleEntry {
    segment: String,
    patterns: Vec<String>,
}

/// Built-in rules. The patterns are constants, checked by `test_builtin_rules_compile`.
const BUILTIN: [(Segment, &str); 5] = [
    (Segment::Academy, "(academy|courses?|learn|training)"),
    (Segment::Event, "(events?|webinars?|workshops?)"),
    (Segment::Product, "(products?|shop|store|pricing)"),
    (Segment::Landing, "(lp|landing)"),
    (Segment::Blog, "(blog|news|articles?|insights)"),
];

fn builtin_rules() -> Result<Vec<SegmentRule>> {
    BUILTIN
        .iter()
        .map(|(segment, alt)| {
            let mut patterns = vec![format!("{LOCALE}/{alt}(/|$)")];
            // The home page counts as a landing page.
            if *segment == Segment::Landing {
                patterns.push("^/$".to_string());
            }
            SegmentRule::new(*segment, &patterns)
        })
        .collect()
}

impl Default for SegmentClassifier {
    fn default() -> Self {
        let rules = builtin_rules().unwrap_or_else(|e| {
            tracing::error!(event = "segment_rules_builtin_invalid", error = %format!("{e:#}"));
            Vec::new()
        });
        Self { rules }
    }
}

impl SegmentClassifier {
    pub fn new(rules: Vec<SegmentRule>) -> Self {
        Self { rules }
    }

    pub fn classify(&self, url: &str) -> Segment {
        let path = normalize_path(url);
        self.rules
            .iter()
            .find(|r| r.matches(&path))
            .map(|r| r.segment)
            .unwrap_or(Segment::Other)
    }

    pub fn rules(&self) -> &[SegmentRule] {
        &self.rules
    }

    /// Parses a YAML rule file. Unknown keys are logged and otherwise ignored.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let mut ignored = BTreeSet::new();
        let de = serde_yaml::Deserializer::from_str(raw);
        let file: RulesFile = serde_ignored::deserialize(de, |path| {
            ignored.insert(path.to_string());
        })
        .context("failed to parse segment rules YAML")?;

        if !ignored.is_empty() {
            tracing::warn!(
                event = "segment_rules_unknown_keys",
                keys = ?ignored,
                "Ignored unknown keys in segment rules"
            );
        }

        let mut rules = Vec::with_capacity(file.segments.len());
        for entry in file.segments {
            let segment = Segment::parse(&entry.segment)
                .with_context(|| format!("unknown segment '{}'", entry.segment))?;
            rules.push(SegmentRule::new(segment, &entry.patterns)?);
        }
        anyhow::ensure!(!rules.is_empty(), "segment rules file defines no segments");

        Ok(Self { rules })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read segment rules {}", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("invalid segment rules {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_rules() {
        let c = SegmentClassifier::default();
        assert_eq!(c.classify("https://example.com/"), Segment::Landing);
        assert_eq!(c.classify("https://example.com/lp/spring-sale"), Segment::Landing);
        assert_eq!(c.classify("https://example.com/academy/seo-101"), Segment::Academy);
        assert_eq!(c.classify("https://example.com/en/courses"), Segment::Academy);
        assert_eq!(c.classify("https://example.com/events/2024/summit"), Segment::Event);
        assert_eq!(c.classify("https://example.com/webinar"), Segment::Event);
        assert_eq!(c.classify("https://example.com/pricing?plan=pro"), Segment::Product);
        assert_eq!(c.classify("https://example.com/nl-be/shop/item"), Segment::Product);
        assert_eq!(c.classify("https://example.com/blog/post"), Segment::Blog);
        assert_eq!(c.classify("https://example.com/about"), Segment::Other);
        assert_eq!(c.classify("https://example.com/learning-center"), Segment::Other);
    }

    #[test]
    fn test_builtin_rules_compile() {
        let rules = builtin_rules().unwrap();
        assert_eq!(rules.len(), BUILTIN.len());
        assert_eq!(SegmentClassifier::default().rules().len(), BUILTIN.len());
    }

    #[test]
    fn test_first_rule_wins() {
        let c = SegmentClassifier::new(vec![
            SegmentRule::new(Segment::Event, &["^/blog/events".to_string()]).unwrap(),
            SegmentRule::new(Segment::Blog, &["^/blog".to_string()]).unwrap(),
        ]);
        assert_eq!(c.classify("/blog/events/launch"), Segment::Event);
        assert_eq!(c.classify("/blog/other"), Segment::Blog);
    }

    #[test]
    fn test_yaml_rules() {
        let c = SegmentClassifier::from_yaml_str(
            r#"
segments:
  - segment: product
    patterns: ["^/plans"]
    owner: growth
  - segment: academy
    patterns: ["^/school", "^/tutorials"]
"#,
        )
        .unwrap();
        assert_eq!(c.rules().len(), 2);
        assert_eq!(c.classify("https://x.com/plans/pro"), Segment::Product);
        assert_eq!(c.classify("https://x.com/tutorials"), Segment::Academy);
        assert_eq!(c.classify("https://x.com/blog"), Segment::Other);
    }

    #[test]
    fn test_yaml_rejects_bad_rules() {
        let unknown = SegmentClassifier::from_yaml_str("segments:\n  - segment: merch\n    patterns: ['^/m']\n");
        assert!(unknown.unwrap_err().to_string().contains("unknown segment"));

        let reserved = SegmentClassifier::from_yaml_str("segments:\n  - segment: all\n    patterns: ['^/']\n");
        assert!(reserved.is_err());

        let bad_regex = SegmentClassifier::from_yaml_str("segments:\n  - segment: blog\n    patterns: ['(']\n");
        assert!(format!("{:#}", bad_regex.unwrap_err()).contains("invalid pattern"));

        let empty = SegmentClassifier::from_yaml_str("segments: []\n");
        assert!(empty.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "segments:\n  - segment: event\n    patterns: ['^/meetups']").unwrap();
        let c = SegmentClassifier::load(f.path()).unwrap();
        assert_eq!(c.classify("/meetups/ams"), Segment::Event);
    }
}
