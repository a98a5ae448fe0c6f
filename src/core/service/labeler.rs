//! Rule-based market labeler.
//!
//! Assigns semantic category labels to markets from keyword and tag rules.
//! Human labels are never overwritten; auto labels are re-derivable.

use tracing::info;

use crate::core::domain::{Market, MarketLabel};
use crate::core::store::{Repository, SharedRepository};
use crate::error::Result;

/// One labeling rule. A market matches when any keyword appears in its
/// question (case-insensitive) or any listed tag slug is on its event.
#[derive(Debug, Clone)]
pub struct LabelRule {
    pub label: &'static str,
    pub keywords: &'static [&'static str],
    pub tag_slugs: &'static [&'static str],
    /// Extracts a sub-label (e.g. a city) from the question when set.
    pub sub_labels: &'static [&'static str],
    pub confidence: f64,
}

/// The built-in rule set.
#[must_use]
pub fn default_rules() -> Vec<LabelRule> {
    vec![
        LabelRule {
            label: "pre_market_fdv",
            keywords: &["fdv", "fully diluted", "valuation at launch"],
            tag_slugs: &["fdv", "token-launch"],
            sub_labels: &[],
            confidence: 0.9,
        },
        LabelRule {
            label: "token_listing",
            keywords: &["listed on", "listing on", "list the token"],
            tag_slugs: &["listings"],
            sub_labels: &[],
            confidence: 0.85,
        },
        LabelRule {
            label: "btc",
            keywords: &["bitcoin", "btc"],
            tag_slugs: &["bitcoin", "crypto"],
            sub_labels: &[],
            confidence: 0.9,
        },
        LabelRule {
            label: "weather",
            keywords: &["temperature", "degrees", "rainfall", "snowfall"],
            tag_slugs: &["weather"],
            sub_labels: &["nyc", "chicago", "miami", "london", "seattle"],
            confidence: 0.85,
        },
        LabelRule {
            label: "news",
            keywords: &["announce", "statement", "press conference"],
            tag_slugs: &["breaking-news"],
            sub_labels: &[],
            confidence: 0.6,
        },
        LabelRule {
            label: "celebrity_quote",
            keywords: &["say", "tweet", "post about"],
            tag_slugs: &["mentions"],
            sub_labels: &[],
            confidence: 0.6,
        },
    ]
}

pub struct Labeler {
    repo: SharedRepository,
    rules: Vec<LabelRule>,
}

impl Labeler {
    #[must_use]
    pub fn new(repo: SharedRepository, rules: Vec<LabelRule>) -> Self {
        Self { repo, rules }
    }

    fn matches(rule: &LabelRule, market: &Market, tag_slugs: &[String]) -> Option<MarketLabel> {
        let question = market.question.to_lowercase();
        let keyword_hit = rule.keywords.iter().any(|k| question.contains(k));
        let tag_hit = rule
            .tag_slugs
            .iter()
            .any(|wanted| tag_slugs.iter().any(|slug| slug == wanted));
        if !keyword_hit && !tag_hit {
            return None;
        }
        let sub_label = rule
            .sub_labels
            .iter()
            .find(|city| question.contains(*city))
            .map(|city| (*city).to_string());
        Some(MarketLabel {
            market_id: market.id.clone(),
            label: rule.label.to_string(),
            sub_label,
            auto_labeled: true,
            confidence: rule.confidence,
        })
    }

    /// Label every tradeable market. Existing human labels (same key,
    /// `auto_labeled = false`) are left alone. Returns labels written.
    pub async fn label_markets(&self) -> Result<usize> {
        let markets = self.repo.list_tradeable_markets().await?;
        let mut written = 0;
        for market in markets {
            let tag_slugs: Vec<String> = self
                .repo
                .list_tags_for_event(&market.event_id)
                .await?
                .into_iter()
                .map(|t| t.slug)
                .collect();
            let existing = self.repo.list_labels_for_market(&market.id).await?;
            for rule in &self.rules {
                let Some(label) = Self::matches(rule, &market, &tag_slugs) else {
                    continue;
                };
                if existing
                    .iter()
                    .any(|l| l.label == label.label && !l.auto_labeled)
                {
                    continue;
                }
                self.repo.upsert_label(&label).await?;
                written += 1;
            }
        }
        if written > 0 {
            info!(written, "markets labeled");
        }
        Ok(written)
    }
}
