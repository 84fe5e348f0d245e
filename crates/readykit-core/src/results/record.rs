use std::cmp::Reverse;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::session::Session;

/// `extra.user` value when no one is signed in.
pub const GUEST_USER: &str = "guest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Quiz,
    Game,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Quiz => "quiz",
            ResultKind::Game => "game",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One quiz or game outcome. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    /// Assigned by the store when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub kind: ResultKind,
    pub subject_id: String,
    pub score: f64,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "Record<string, unknown>"))]
    pub extra: Map<String, Value>,
}

impl ResultRecord {
    pub fn new(kind: ResultKind, subject_id: impl Into<String>, score: f64) -> Self {
        Self {
            id: None,
            kind,
            subject_id: subject_id.into(),
            score,
            total: None,
            timestamp: None,
            extra: Map::new(),
        }
    }

    /// Quiz outcome tagged with the signed-in user (or `guest`).
    pub fn quiz(quiz_id: impl Into<String>, score: f64, total: f64, session: Option<&Session>) -> Self {
        Self::new(ResultKind::Quiz, quiz_id, score)
            .with_total(total)
            .tagged_with(session)
    }

    /// Game outcome tagged with the signed-in user (or `guest`).
    pub fn game(game_id: impl Into<String>, score: f64, session: Option<&Session>) -> Self {
        Self::new(ResultKind::Game, game_id, score).tagged_with(session)
    }

    pub fn with_total(mut self, total: f64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Tag with the session user (`guest` without one) and district.
    pub fn tagged_with(self, session: Option<&Session>) -> Self {
        let user = session.map_or(GUEST_USER, |s| s.email.as_str()).to_string();
        let record = self.with_extra("user", user);
        match session.and_then(|s| s.district.clone()) {
            Some(district) => record.with_extra("district", district),
            None => record,
        }
    }

    /// `extra.user`, if present.
    pub fn user(&self) -> Option<&str> {
        self.extra.get("user").and_then(Value::as_str)
    }

    pub fn percentage(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0.0 => Some(self.score / total * 100.0),
            _ => None,
        }
    }
}

/// Sort by timestamp, most recent first. Undated records go last.
pub fn newest_first(records: &mut [ResultRecord]) {
    records.sort_by_key(|r| (r.timestamp.is_none(), Reverse(r.timestamp)));
}
