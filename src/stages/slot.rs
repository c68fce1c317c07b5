//! Shift and time-slot selection
//!
//! Two questions share this stage: first the shift (skipped when only
//! one has openings), then the slot inside it. Picking a slot flows
//! straight into the booking summary in the same turn.

use super::{fall_back, prompts, summary, Stage, StageContext, StageOutcome};
use crate::intent::normalize;
use crate::session::types::{DataBag, Professional, Shift};

fn match_shift(text: &str, bag: &DataBag) -> Option<Shift> {
    let t = normalize(text);
    if let Ok(n) = t.parse::<usize>() {
        return bag.booking.shift_slots.keys().nth(n.checked_sub(1)?).copied();
    }
    let by_word = if t.contains("manha") || t.contains("matutino") {
        Shift::Morning
    } else if t.contains("tarde") || t.contains("vespertino") {
        Shift::Afternoon
    } else if t.contains("noite") || t.contains("noturno") {
        Shift::Evening
    } else {
        return None;
    };
    bag.booking
        .shift_slots
        .contains_key(&by_word)
        .then_some(by_word)
}

pub(super) async fn handle(ctx: &StageContext<'_>, text: &str, mut bag: DataBag) -> StageOutcome {
    if bag.booking.shift_slots.is_empty() {
        let reply = if bag.booking.professionals.is_empty() {
            prompts::date_prompt()
        } else {
            prompts::professional_list(&bag.booking.professionals)
        };
        let next = if bag.booking.professionals.is_empty() {
            Stage::ChooseDate
        } else {
            Stage::ChooseProfessional
        };
        return StageOutcome::advance(reply, bag, next);
    }

    let Some(shift) = bag.booking.shift else {
        return match match_shift(text, &bag) {
            Some(shift) => {
                let slots = bag
                    .booking
                    .shift_slots
                    .get(&shift)
                    .cloned()
                    .unwrap_or_default();
                bag.booking.shift = Some(shift);
                StageOutcome::stay(prompts::slot_list(shift, &slots), bag, Stage::ChooseTimeSlot)
            }
            None => {
                let reprompt = format!(
                    "Não entendi o turno. {}",
                    prompts::shift_menu(&bag.booking.shift_slots)
                );
                fall_back(ctx, Stage::ChooseTimeSlot, text, bag, reprompt).await
            }
        };
    };

    let slots = bag
        .booking
        .shift_slots
        .get(&shift)
        .cloned()
        .unwrap_or_default();
    let t = normalize(text);

    if t == "voltar" && bag.booking.shift_slots.len() > 1 {
        bag.booking.shift = None;
        return StageOutcome::stay(
            prompts::shift_menu(&bag.booking.shift_slots),
            bag,
            Stage::ChooseTimeSlot,
        );
    }

    let picked = if let Ok(n) = t.parse::<usize>() {
        n.checked_sub(1).and_then(|i| slots.get(i)).cloned()
    } else {
        slots.iter().find(|s| s.start == t).cloned()
    };

    match picked {
        Some(slot) => {
            // A no-preference booking adopts the owner of the chosen slot.
            if bag.booking.no_preference && bag.booking.professional.is_none() {
                if let (Some(id), Some(name)) = (slot.professional_id, &slot.professional_name) {
                    bag.booking.professional = Some(Professional {
                        id,
                        name: name.clone(),
                        morning_slots: Vec::new(),
                        afternoon_slots: Vec::new(),
                        evening_slots: Vec::new(),
                    });
                }
            }
            bag.booking.slot = Some(slot);
            summary::present(ctx, bag).await
        }
        None => {
            let reprompt = format!("Não encontrei esse horário. {}", prompts::slot_list(shift, &slots));
            fall_back(ctx, Stage::ChooseTimeSlot, text, bag, reprompt).await
        }
    }
}
