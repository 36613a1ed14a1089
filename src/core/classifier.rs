// src/core/classifier.rs
//! Pure status classification over negotiation history rows.
//!
//! The platform reports an application's progress as a status code
//! drawn from a vocabulary that is not exhaustively documented, so the
//! delivered/failed sets are configuration, not enums. "Delivered"
//! means the application reached the employer at some point; a later
//! rejection does not undo that.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Deserialize;

const DEFAULT_DELIVERED: &[&str] = &[
    "applied",
    "response",
    "responded",
    "invited",
    "interview",
    "offer",
    "hired",
    "accepted",
];

const DEFAULT_DELIVERED_PREFIXES: &[&str] =
    &["applied", "response", "responded", "invited", "offer"];

const DEFAULT_FAILED: &[&str] = &[
    "failed",
    "rejected",
    "declined",
    "canceled",
    "cancelled",
    "discard",
    "expired",
];

/// Status vocabulary, overridable from the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub delivered: Vec<String>,
    pub delivered_prefixes: Vec<String>,
    pub failed: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let to_owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        Self {
            delivered: to_owned(DEFAULT_DELIVERED),
            delivered_prefixes: to_owned(DEFAULT_DELIVERED_PREFIXES),
            failed: to_owned(DEFAULT_FAILED),
        }
    }
}

/// One history row as the classifier sees it. Kept free of storage
/// concerns so the layer stays I/O-less.
#[derive(Debug, Clone)]
pub struct ClassifiedRecord {
    pub vacancy_id: String,
    pub vacancy_title: String,
    pub employer_name: String,
    pub status: String,
    pub applied_at: DateTime<Utc>,
}

/// Per-vacancy rollup produced by [`StatusClassifier::reduce`].
#[derive(Debug, Clone)]
pub struct VacancyOutcome {
    pub last_status: String,
    pub last_applied_at: DateTime<Utc>,
    pub was_delivered: bool,
    pub vacancy_title: String,
    pub employer_name: String,
}

/// Lookup sets the UI uses for strike-through and dedup decisions.
#[derive(Debug, Default)]
pub struct DeliveredIndex {
    /// Vacancy ids an application actually reached.
    pub delivered_ids: HashSet<String>,
    /// Normalized `title|employer` keys for delivered vacancies.
    pub delivered_keys: HashSet<String>,
    /// Normalized employer names that received at least one application.
    pub delivered_employers: HashSet<String>,
    /// Current status per vacancy id.
    pub outcomes: HashMap<String, VacancyOutcome>,
}

impl DeliveredIndex {
    pub fn is_delivered_vacancy(&self, vacancy_id: &str) -> bool {
        self.delivered_ids.contains(vacancy_id)
    }

    pub fn is_delivered_key(&self, title: &str, employer: &str) -> bool {
        self.delivered_keys.contains(&title_employer_key(title, employer))
    }

    pub fn contacted_employer(&self, employer: &str) -> bool {
        let key = normalize(employer);
        !key.is_empty() && self.delivered_employers.contains(&key)
    }
}

/// Trim, lower-case, collapse inner whitespace.
pub fn normalize(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn title_employer_key(title: &str, employer: &str) -> String {
    format!("{}|{}", normalize(title), normalize(employer))
}

#[derive(Debug, Clone)]
pub struct StatusClassifier {
    config: ClassifierConfig,
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl StatusClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Whether a single raw status means the application reached the
    /// employer. Failed vocabulary takes precedence: a code listed as
    /// failed is never delivered, whatever else it resembles.
    pub fn is_delivered(&self, status: &str) -> bool {
        let code = normalize(status);
        if code.is_empty() {
            return false;
        }
        if self.config.failed.iter().any(|f| f == &code) {
            return false;
        }
        if self.config.delivered.iter().any(|d| d == &code) {
            return true;
        }
        self.config
            .delivered_prefixes
            .iter()
            .any(|p| code.starts_with(p.as_str()))
    }

    pub fn is_failed(&self, status: &str) -> bool {
        let code = normalize(status);
        self.config.failed.iter().any(|f| f == &code)
    }

    /// Roll the raw per-(vacancy, resume) history up to one outcome per
    /// vacancy. The newest `applied_at` wins the current status; the
    /// delivered bit is OR-ed across every historical status, so one
    /// delivered event marks the vacancy delivered permanently. Ties at
    /// equal timestamps keep the first record seen, which only affects
    /// the title/employer strings carried along.
    pub fn reduce<'a, I>(&self, records: I) -> DeliveredIndex
    where
        I: IntoIterator<Item = &'a ClassifiedRecord>,
    {
        let mut outcomes: HashMap<String, VacancyOutcome> = HashMap::new();

        for record in records {
            if record.vacancy_id.is_empty() {
                continue;
            }
            let delivered = self.is_delivered(&record.status);

            match outcomes.get_mut(&record.vacancy_id) {
                None => {
                    outcomes.insert(
                        record.vacancy_id.clone(),
                        VacancyOutcome {
                            last_status: record.status.clone(),
                            last_applied_at: record.applied_at,
                            was_delivered: delivered,
                            vacancy_title: record.vacancy_title.clone(),
                            employer_name: record.employer_name.clone(),
                        },
                    );
                }
                Some(outcome) => {
                    if record.applied_at > outcome.last_applied_at {
                        outcome.last_status = record.status.clone();
                        outcome.last_applied_at = record.applied_at;
                    }
                    if delivered {
                        outcome.was_delivered = true;
                    }
                }
            }
        }

        let mut index = DeliveredIndex::default();
        for (vacancy_id, outcome) in &outcomes {
            if !outcome.was_delivered {
                continue;
            }
            index.delivered_ids.insert(vacancy_id.clone());

            let key = title_employer_key(&outcome.vacancy_title, &outcome.employer_name);
            if key.trim_matches('|') != "" {
                index.delivered_keys.insert(key);
            }

            let employer = normalize(&outcome.employer_name);
            if !employer.is_empty() {
                index.delivered_employers.insert(employer);
            }
        }
        index.outcomes = outcomes;
        index
    }
}
