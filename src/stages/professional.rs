//! Professional selection
//!
//! "0" / "sem preferência" is a first-class answer: the booking carries
//! no professional until a slot is picked, then adopts the slot's owner.

use super::{fall_back, prompts, Stage, StageContext, StageOutcome};
use crate::intent::normalize;
use crate::session::types::{DataBag, Professional, Shift, Slot};
use std::collections::BTreeMap;

enum Choice {
    NoPreference,
    Picked(Professional),
}

fn match_choice(text: &str, professionals: &[Professional]) -> Option<Choice> {
    let t = normalize(text);
    if t == "0" || t.contains("sem preferencia") || t.contains("tanto faz") || t.contains("qualquer")
    {
        return Some(Choice::NoPreference);
    }
    if let Ok(n) = t.parse::<usize>() {
        if n >= 1 && n <= professionals.len() {
            return Some(Choice::Picked(professionals[n - 1].clone()));
        }
        return None;
    }
    if t.len() < 3 {
        return None;
    }
    professionals
        .iter()
        .find(|p| normalize(&p.name).contains(&t))
        .cloned()
        .map(Choice::Picked)
}

fn owned(slots: &[Slot], owner: &Professional) -> Vec<Slot> {
    slots
        .iter()
        .cloned()
        .map(|mut s| {
            if s.professional_id.is_none() {
                s.professional_id = Some(owner.id);
                s.professional_name = Some(owner.name.clone());
            }
            s
        })
        .collect()
}

fn shift_slots_for(professionals: &[Professional]) -> BTreeMap<Shift, Vec<Slot>> {
    let mut map: BTreeMap<Shift, Vec<Slot>> = BTreeMap::new();
    for p in professionals {
        for (shift, slots) in [
            (Shift::Morning, &p.morning_slots),
            (Shift::Afternoon, &p.afternoon_slots),
            (Shift::Evening, &p.evening_slots),
        ] {
            if !slots.is_empty() {
                map.entry(shift).or_default().extend(owned(slots, p));
            }
        }
    }
    for slots in map.values_mut() {
        slots.sort_by(|a, b| a.start.cmp(&b.start));
    }
    map
}

pub(super) async fn handle(ctx: &StageContext<'_>, text: &str, mut bag: DataBag) -> StageOutcome {
    if bag.booking.professionals.is_empty() {
        return StageOutcome::advance(prompts::date_prompt(), bag, Stage::ChooseDate);
    }

    let Some(choice) = match_choice(text, &bag.booking.professionals) else {
        let reprompt = format!(
            "Não encontrei essa opção. {}",
            prompts::professional_list(&bag.booking.professionals)
        );
        return fall_back(ctx, Stage::ChooseProfessional, text, bag, reprompt).await;
    };

    let (shift_slots, label) = match &choice {
        Choice::NoPreference => (
            shift_slots_for(&bag.booking.professionals),
            "Sem preferência de profissional".to_string(),
        ),
        Choice::Picked(p) => (
            shift_slots_for(std::slice::from_ref(p)),
            format!("Profissional *{}*", p.name),
        ),
    };

    if shift_slots.is_empty() {
        return StageOutcome::stay(
            format!(
                "Esse profissional não tem horários livres nessa data. 😕\n\n{}",
                prompts::professional_list(&bag.booking.professionals)
            ),
            bag,
            Stage::ChooseProfessional,
        );
    }

    match choice {
        Choice::NoPreference => bag.booking.no_preference = true,
        Choice::Picked(p) => bag.booking.professional = Some(p),
    }
    bag.booking.shift_slots = shift_slots;

    // A single populated shift needs no shift question.
    if bag.booking.shift_slots.len() == 1 {
        let (shift, slots) = bag
            .booking
            .shift_slots
            .iter()
            .map(|(s, v)| (*s, v.clone()))
            .next()
            .unwrap_or((Shift::Morning, Vec::new()));
        bag.booking.shift = Some(shift);
        return StageOutcome::advance(
            format!("✅ {label}.\n\n{}", prompts::slot_list(shift, &slots)),
            bag,
            Stage::ChooseTimeSlot,
        );
    }

    let menu = prompts::shift_menu(&bag.booking.shift_slots);
    StageOutcome::advance(
        format!("✅ {label}.\n\n{menu}"),
        bag,
        Stage::ChooseTimeSlot,
    )
}
