//! Catalog entities: events, markets, outcome tokens, tags and labels.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{EventId, MarketId, TokenId};

/// A catalog event grouping one or more markets.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: EventId,
    pub slug: String,
    pub title: String,
    pub active: bool,
    pub closed: bool,
    pub end_time: Option<DateTime<Utc>>,
    pub series_id: Option<String>,
}

impl Event {
    /// Active and not closed: eligible for strategy evaluation.
    #[must_use]
    pub fn is_tradeable(&self) -> bool {
        self.active && !self.closed
    }
}

/// A binary market within an event. Exactly two tokens (YES/NO) belong
/// to each market; `closed` is monotonic once true.
#[derive(Debug, Clone, PartialEq)]
pub struct Market {
    pub id: MarketId,
    pub event_id: EventId,
    pub slug: String,
    pub question: String,
    pub condition_id: String,
    pub tick_size: Decimal,
    pub active: bool,
    pub closed: bool,
    pub neg_risk: bool,
}

impl Market {
    #[must_use]
    pub fn is_tradeable(&self) -> bool {
        self.active && !self.closed
    }
}

/// Which outcome of a binary market a token pays out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
        }
    }

    /// Parse from the catalog's outcome string, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "YES" => Some(Self::Yes),
            "NO" => Some(Self::No),
            _ => None,
        }
    }

    #[must_use]
    pub fn opposite(&self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outcome share. Exactly two per binary market; price in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub id: TokenId,
    pub market_id: MarketId,
    pub outcome: Outcome,
}

/// A catalog tag. Tags relate to events n:m via [`EventTag`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub label: String,
    pub slug: String,
}

/// n:m association between a tag and an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTag {
    pub event_id: EventId,
    pub tag_id: String,
}

/// A semantic category label on a market, assigned by the labeler rule set
/// or by a human.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketLabel {
    pub market_id: MarketId,
    pub label: String,
    pub sub_label: Option<String>,
    pub auto_labeled: bool,
    /// Labeler confidence in `[0, 1]`. Float: a statistic, not money.
    pub confidence: f64,
}

/// Append-only record of how a market resolved, kept for learning
/// category priors.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSettlement {
    pub market_id: MarketId,
    pub event_id: EventId,
    pub outcome: Outcome,
    pub labels: Vec<String>,
    pub initial_yes_price: Option<Decimal>,
    pub final_yes_price: Option<Decimal>,
    pub settled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_parses_case_insensitively() {
        assert_eq!(Outcome::parse("yes"), Some(Outcome::Yes));
        assert_eq!(Outcome::parse("NO"), Some(Outcome::No));
        assert_eq!(Outcome::parse("maybe"), None);
    }

    #[test]
    fn closed_event_is_not_tradeable() {
        let event = Event {
            id: EventId::from("e1"),
            slug: "e1".into(),
            title: "Event".into(),
            active: true,
            closed: true,
            end_time: None,
            series_id: None,
        };
        assert!(!event.is_tradeable());
    }
}
