//! Session and data-bag value types
//!
//! The bag is an explicit value: a stage handler consumes the old bag and
//! returns a new one, there is no shared-reference mutation. Every field
//! defaults on deserialization so a structurally incomplete persisted
//! record never turns into a parse error.

use super::{HISTORY_LIMIT, SESSION_TTL_SECS};
use crate::stages::Stage;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the bounded conversational history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

/// Patient identity snapshot from the scheduling provider.
///
/// `patient_id` is absent for patients who went through the in-chat
/// pre-registration wizard and do not exist server-side yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    #[serde(default)]
    pub patient_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub insurance_id: Option<i64>,
}

impl PatientRecord {
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

/// A clinic unit. The id list covers annex buildings that share a unit name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    pub name: String,
    pub clinic_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Procedure {
    pub id: i64,
    #[serde(rename = "nome")]
    pub name: String,
}

/// One bookable time slot. Carries its owning professional so a
/// "no preference" booking can adopt the owner of the chosen slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    #[serde(rename = "inicio")]
    pub start: String,
    #[serde(rename = "fim")]
    pub end: String,
    #[serde(default, rename = "profissional_id")]
    pub professional_id: Option<i64>,
    #[serde(default, rename = "profissional_nome")]
    pub professional_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Professional {
    pub id: i64,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(default, rename = "horarios_matutino")]
    pub morning_slots: Vec<Slot>,
    #[serde(default, rename = "horarios_vespertino")]
    pub afternoon_slots: Vec<Slot>,
    #[serde(default, rename = "horarios_noturno")]
    pub evening_slots: Vec<Slot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shift {
    Morning,
    Afternoon,
    Evening,
}

impl Shift {
    /// User-facing label, matching the provider's shift names.
    pub fn label(self) -> &'static str {
        match self {
            Shift::Morning => "Matutino",
            Shift::Afternoon => "Vespertino",
            Shift::Evening => "Noturno",
        }
    }
}

/// In-progress booking fields, in causal order: facility → procedure
/// catalog → procedure → date → professionals → professional → shifts →
/// shift → slot. A downstream field is only ever meaningful while every
/// field before it is present; invalidation clears suffixes of this chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingData {
    #[serde(default)]
    pub facility: Option<Facility>,
    /// Procedure catalog for the chosen facility and insurance.
    #[serde(default)]
    pub procedures: Vec<Procedure>,
    #[serde(default)]
    pub procedure: Option<Procedure>,
    /// DD/MM/YYYY, already validated as a future date.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub professionals: Vec<Professional>,
    #[serde(default)]
    pub professionals_presented: bool,
    #[serde(default)]
    pub professional: Option<Professional>,
    /// User declined to pick a professional; the slot's owner is adopted.
    #[serde(default)]
    pub no_preference: bool,
    #[serde(default)]
    pub shift_slots: BTreeMap<Shift, Vec<Slot>>,
    #[serde(default)]
    pub shift: Option<Shift>,
    #[serde(default)]
    pub slot: Option<Slot>,
}

/// Fields collected by the pre-registration wizard, in collection order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationData {
    #[serde(default)]
    pub started: bool,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub national_id: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub insurance: Option<String>,
}

/// The namespaced key-value collection accumulated across turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<PatientRecord>,
    #[serde(default)]
    pub booking: BookingData,
    #[serde(default)]
    pub registration: RegistrationData,
    /// Stage to resume after the help menu.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_return: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// One session per user identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    #[serde(default)]
    pub stage: Stage,
    #[serde(default)]
    pub bag: DataBag,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
    #[serde(default = "Utc::now")]
    pub last_activity: DateTime<Utc>,
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self {
            stage: Stage::default(),
            bag: DataBag::default(),
            history: Vec::new(),
            last_activity: Utc::now(),
        }
    }
}

impl ConversationSession {
    /// True once the inactivity window has lapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.last_activity > Duration::seconds(SESSION_TTL_SECS)
    }

    /// Back to the initial stage with a cleared bag, keeping only the
    /// already-identified patient record.
    pub fn reset_preserving_patient(&mut self) {
        let patient = self.bag.patient.take();
        self.stage = Stage::Start;
        self.bag = DataBag {
            patient,
            ..DataBag::default()
        };
        self.history.clear();
    }

    pub fn push_user(&mut self, content: &str) {
        self.push(Role::User, content);
    }

    pub fn push_assistant(&mut self, content: &str) {
        self.push(Role::Assistant, content);
    }

    fn push(&mut self, role: Role, content: &str) {
        self.history.push(HistoryTurn {
            role,
            content: content.to_string(),
        });
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_for_missing_fields() {
        let session: ConversationSession = serde_json::from_str("{}").unwrap();
        assert_eq!(session.stage, Stage::Start);
        assert_eq!(session.bag, DataBag::default());
        assert!(session.history.is_empty());
    }

    #[test]
    fn reset_keeps_only_patient() {
        let mut session = ConversationSession::default();
        session.stage = Stage::ChooseDate;
        session.bag.patient = Some(PatientRecord {
            patient_id: Some(7),
            name: "Ana Souza".into(),
            insurance_id: Some(3),
        });
        session.bag.booking.date = Some("25/06/2026".into());
        session.push_user("oi");

        session.reset_preserving_patient();

        assert_eq!(session.stage, Stage::Start);
        assert!(session.history.is_empty());
        assert_eq!(session.bag.booking, BookingData::default());
        assert_eq!(session.bag.patient.as_ref().unwrap().first_name(), "Ana");
    }

    #[test]
    fn expiry_uses_inactivity_window() {
        let mut session = ConversationSession::default();
        let now = Utc::now();
        assert!(!session.is_expired(now));
        session.last_activity = now - Duration::seconds(SESSION_TTL_SECS + 1);
        assert!(session.is_expired(now));
    }

    proptest! {
        /// History never exceeds the bound and keeps the most recent
        /// turns in relative order.
        #[test]
        fn history_is_bounded_and_ordered(turns in prop::collection::vec("[a-z]{1,8}", 0..40)) {
            let mut session = ConversationSession::default();
            for (i, t) in turns.iter().enumerate() {
                if i % 2 == 0 {
                    session.push_user(t);
                } else {
                    session.push_assistant(t);
                }
            }
            prop_assert!(session.history.len() <= HISTORY_LIMIT);
            let expected: Vec<&String> = turns
                .iter()
                .skip(turns.len().saturating_sub(HISTORY_LIMIT))
                .collect();
            let got: Vec<&String> = session.history.iter().map(|h| &h.content).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
