//! Data-bag invalidation on mid-flow corrections
//!
//! Booking fields form a causal chain: facility → procedure catalog →
//! procedure → date → professional list → professional → shift slots →
//! shift → slot. When the user revises an upstream choice, every field
//! downstream of the revised link is stale and must be cleared before the
//! redirected stage runs, otherwise the old answer leaks into the new
//! flow. The table here is the single place that knows which suffix each
//! intent severs.

use crate::intent::Intent;
use crate::session::{BookingData, DataBag};

/// Clear the bag namespaces invalidated by `intent`, leaving everything
/// still causally valid in place.
pub fn apply(intent: Intent, mut bag: DataBag) -> DataBag {
    match intent {
        Intent::RestartBooking => {
            bag.booking = BookingData::default();
            bag.registration = Default::default();
            bag.help_return = None;
            bag.feedback = None;
        }
        Intent::ChangeFacility => {
            bag.booking = BookingData::default();
        }
        Intent::ChangeProcedure => {
            // Facility and its procedure catalog stay valid.
            bag.booking.procedure = None;
            clear_from_date(&mut bag.booking);
        }
        Intent::ChangeDate => {
            clear_from_date(&mut bag.booking);
        }
        Intent::ChangeProfessional => {
            // The fetched professional list is still for the same
            // procedure and date, so the redirected stage can re-present
            // it without another provider call.
            clear_from_professional(&mut bag.booking);
        }
        Intent::ChangeInsurance | Intent::Cancel | Intent::RequestHelp => {}
    }
    bag
}

fn clear_from_date(booking: &mut BookingData) {
    booking.date = None;
    booking.professionals.clear();
    booking.professionals_presented = false;
    clear_from_professional(booking);
}

fn clear_from_professional(booking: &mut BookingData) {
    booking.professional = None;
    booking.no_preference = false;
    booking.shift_slots.clear();
    booking.shift = None;
    booking.slot = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Facility, PatientRecord, Procedure, Professional, Shift, Slot};
    use proptest::prelude::*;

    fn full_bag() -> DataBag {
        let professional = Professional {
            id: 9,
            name: "Dra. Carla Mendes".into(),
            morning_slots: vec![],
            afternoon_slots: vec![],
            evening_slots: vec![],
        };
        let slot = Slot {
            start: "08:00".into(),
            end: "08:40".into(),
            professional_id: Some(9),
            professional_name: Some("Dra. Carla Mendes".into()),
        };
        let mut bag = DataBag::default();
        bag.patient = Some(PatientRecord {
            patient_id: Some(1),
            name: "Ana Souza".into(),
            insurance_id: Some(2),
        });
        bag.booking.facility = Some(Facility {
            name: "Vieiralves".into(),
            clinic_ids: vec![1, 3],
        });
        bag.booking.procedures = vec![Procedure {
            id: 5,
            name: "Pilates".into(),
        }];
        bag.booking.procedure = Some(Procedure {
            id: 5,
            name: "Pilates".into(),
        });
        bag.booking.date = Some("25/06/2026".into());
        bag.booking.professionals = vec![professional.clone()];
        bag.booking.professionals_presented = true;
        bag.booking.professional = Some(professional);
        bag.booking.shift_slots.insert(Shift::Morning, vec![slot.clone()]);
        bag.booking.shift = Some(Shift::Morning);
        bag.booking.slot = Some(slot);
        bag
    }

    #[test]
    fn restart_clears_everything_but_patient() {
        let bag = apply(Intent::RestartBooking, full_bag());
        assert!(bag.patient.is_some());
        assert_eq!(bag.booking, BookingData::default());
        assert!(!bag.registration.started);
        assert!(bag.help_return.is_none());
    }

    #[test]
    fn facility_change_drops_the_whole_chain() {
        let bag = apply(Intent::ChangeFacility, full_bag());
        assert_eq!(bag.booking, BookingData::default());
        assert!(bag.patient.is_some());
    }

    #[test]
    fn procedure_change_keeps_facility_and_catalog() {
        let bag = apply(Intent::ChangeProcedure, full_bag());
        assert!(bag.booking.facility.is_some());
        assert!(!bag.booking.procedures.is_empty());
        assert!(bag.booking.procedure.is_none());
        assert!(bag.booking.date.is_none());
        assert!(bag.booking.slot.is_none());
    }

    #[test]
    fn date_change_keeps_procedure() {
        let bag = apply(Intent::ChangeDate, full_bag());
        assert!(bag.booking.procedure.is_some());
        assert!(bag.booking.date.is_none());
        assert!(bag.booking.professionals.is_empty());
        assert!(!bag.booking.professionals_presented);
        assert!(bag.booking.shift.is_none());
    }

    #[test]
    fn professional_change_keeps_fetched_list() {
        let bag = apply(Intent::ChangeProfessional, full_bag());
        assert!(bag.booking.date.is_some());
        assert!(!bag.booking.professionals.is_empty());
        assert!(bag.booking.professionals_presented);
        assert!(bag.booking.professional.is_none());
        assert!(!bag.booking.no_preference);
        assert!(bag.booking.shift_slots.is_empty());
        assert!(bag.booking.slot.is_none());
    }

    #[test]
    fn non_revision_intents_touch_nothing() {
        for intent in [Intent::ChangeInsurance, Intent::Cancel, Intent::RequestHelp] {
            assert_eq!(apply(intent, full_bag()), full_bag());
        }
    }

    /// A booking is causally consistent when every present field has all
    /// of its upstream dependencies present.
    fn causally_consistent(b: &BookingData) -> bool {
        let picked = b.professional.is_some() || b.no_preference;
        (b.procedure.is_none() || b.facility.is_some())
            && (b.date.is_none() || b.procedure.is_some())
            && (b.professionals_presented || b.professionals.is_empty())
            && (!b.professionals_presented || b.date.is_some())
            && (!picked || b.professionals_presented)
            && (b.shift.is_none() || !b.shift_slots.is_empty())
            && (b.shift_slots.is_empty() || picked)
            && (b.slot.is_none() || b.shift.is_some())
    }

    proptest! {
        /// Severing the chain at any intent leaves a consistent prefix.
        #[test]
        fn every_intent_preserves_causal_consistency(choice in 0usize..8) {
            let intent = [
                Intent::RestartBooking,
                Intent::ChangeFacility,
                Intent::ChangeProcedure,
                Intent::ChangeDate,
                Intent::ChangeProfessional,
                Intent::ChangeInsurance,
                Intent::Cancel,
                Intent::RequestHelp,
            ][choice];
            let bag = apply(intent, full_bag());
            prop_assert!(causally_consistent(&bag.booking));
        }
    }
}
