// src/types/api.rs
//! Response structs for the remote recruiting platform API.
//!
//! Only the fields the client actually consumes are declared; anything
//! else in the payload is ignored by serde. Fields that the platform
//! sometimes omits are `Option` so a partial record never fails the
//! whole page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ===== OAuth2 =====

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until expiry. Absent in some responses; callers default
    /// to one hour.
    pub expires_in: Option<i64>,
}

// ===== Account =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

// ===== Resumes =====

#[derive(Debug, Clone, Deserialize)]
pub struct Resume {
    pub id: String,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResumeCollection {
    #[serde(default)]
    pub items: Vec<Resume>,
}

// ===== Vacancies =====

#[derive(Debug, Clone, Deserialize)]
pub struct Employer {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Salary {
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Area {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VacancySummary {
    pub id: String,
    pub name: String,
    pub employer: Option<Employer>,
    pub salary: Option<Salary>,
    pub area: Option<Area>,
    pub alternate_url: Option<String>,
}

impl VacancySummary {
    pub fn employer_name(&self) -> &str {
        self.employer
            .as_ref()
            .and_then(|e| e.name.as_deref())
            .unwrap_or("-")
    }
}

#[derive(Debug, Deserialize)]
pub struct VacancyPage {
    #[serde(default)]
    pub items: Vec<VacancySummary>,
    #[serde(default)]
    pub page: u32,
    #[serde(default = "one")]
    pub pages: u32,
    #[serde(default)]
    pub found: u64,
}

fn one() -> u32 {
    1
}

// ===== Negotiations (application history) =====

#[derive(Debug, Clone, Deserialize)]
pub struct NegotiationState {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NegotiationVacancy {
    pub id: Option<String>,
    pub name: Option<String>,
    pub employer: Option<Employer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NegotiationResume {
    pub id: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Negotiation {
    pub id: Option<String>,
    pub state: Option<NegotiationState>,
    pub vacancy: Option<NegotiationVacancy>,
    pub resume: Option<NegotiationResume>,
    pub updated_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Negotiation {
    /// Canonical status code: the coded state id when present, the
    /// human-readable state name otherwise. Always lower-cased.
    pub fn canonical_status(&self) -> String {
        let raw = self
            .state
            .as_ref()
            .and_then(|s| s.id.as_deref().or(s.name.as_deref()))
            .unwrap_or("");
        raw.trim().to_lowercase()
    }

    /// The instant this record last changed, preferring `updated_at`.
    pub fn effective_timestamp(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.created_at)
    }
}

#[derive(Debug, Deserialize)]
pub struct NegotiationPage {
    #[serde(default)]
    pub items: Vec<Negotiation>,
    #[serde(default)]
    pub page: u32,
    #[serde(default = "one")]
    pub pages: u32,
}

// ===== Apply =====

/// Error body the platform returns for a rejected application, e.g.
/// `{"errors": [{"type": "negotiations", "value": "test_required"}]}`.
#[derive(Debug, Deserialize)]
pub struct ApplyErrorBody {
    #[serde(default)]
    pub errors: Vec<ApplyErrorItem>,
}

#[derive(Debug, Deserialize)]
pub struct ApplyErrorItem {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub value: Option<String>,
}

/// Outcome of an apply call: either the application went through or
/// the platform's reason code for turning it down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub ok: bool,
    pub reason: Option<String>,
}

impl ApplyOutcome {
    pub fn applied() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    pub fn failed(reason: String) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_status_prefers_state_id() {
        let n: Negotiation = serde_json::from_value(serde_json::json!({
            "state": {"id": "DISCARD", "name": "Отказ"}
        }))
        .unwrap();
        assert_eq!(n.canonical_status(), "discard");
    }

    #[test]
    fn canonical_status_falls_back_to_name() {
        let n: Negotiation = serde_json::from_value(serde_json::json!({
            "state": {"name": "  Invited  "}
        }))
        .unwrap();
        assert_eq!(n.canonical_status(), "invited");
    }

    #[test]
    fn canonical_status_empty_without_state() {
        let n: Negotiation = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(n.canonical_status(), "");
    }

    #[test]
    fn vacancy_page_defaults() {
        let page: VacancyPage = serde_json::from_str("{}").unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.pages, 1);
    }

    #[test]
    fn apply_error_body_parses_reason() {
        let body: ApplyErrorBody = serde_json::from_str(
            r#"{"errors": [{"type": "negotiations", "value": "test_required"}]}"#,
        )
        .unwrap();
        assert_eq!(body.errors[0].value.as_deref(), Some("test_required"));
    }
}
