//! Per-user conversation sessions
//!
//! One `ConversationSession` per normalized phone key: current stage, the
//! namespaced data bag collected across turns, and a bounded reply history.

mod store;
pub mod types;

pub use store::{SessionStore, SqliteSessionStore, StoreError};
pub use types::{
    BookingData, ConversationSession, DataBag, Facility, HistoryTurn, PatientRecord, Procedure,
    Professional, RegistrationData, Role, Shift, Slot,
};

/// Canonical phone key: digits only, the country code stripped, and the
/// mobile nine restored when the carrier dropped it. Session rows, turn
/// locks and provider lookups all key on this form.
pub fn normalize_phone(raw: &str) -> String {
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if let Some(rest) = digits.strip_prefix("55") {
        if rest.len() >= 10 {
            digits = rest.to_string();
        }
    }
    if digits.len() > 9 && digits.chars().nth(2) != Some('9') {
        digits.insert(2, '9');
    }
    digits
}

/// Inactivity window after which a session is considered stale.
pub const SESSION_TTL_SECS: i64 = 8 * 60 * 60;

/// Number of user/assistant turns kept as conversational context.
pub const HISTORY_LIMIT: usize = 6;

#[cfg(test)]
mod tests {
    use super::normalize_phone;

    #[test]
    fn phone_keys_are_canonical() {
        // Country code and punctuation stripped.
        assert_eq!(normalize_phone("+55 (92) 98888-7777"), "92988887777");
        // Eight-digit local numbers get the mobile nine restored.
        assert_eq!(normalize_phone("5592888877 77"), "92988887777");
        // Already canonical stays put.
        assert_eq!(normalize_phone("92988887777"), "92988887777");
        // Short numbers are left alone rather than guessed at.
        assert_eq!(normalize_phone("987654"), "987654");
    }
}
