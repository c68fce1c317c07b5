//! Appointment date
//!
//! Accepts DD/MM or DD/MM/YYYY. A year-less date resolves to the next
//! occurrence: this month's 10th of January in August means January next
//! year, not a rejection. On a valid date the professional list is
//! fetched right away, so the next prompt already shows who is actually
//! available.

use super::{fall_back, prompts, Stage, StageContext, StageOutcome};
use crate::session::types::DataBag;
use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

fn date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(\d{1,2})[/.\-](\d{1,2})(?:[/.\-](\d{2,4}))?\s*$")
            .expect("static date pattern")
    })
}

#[derive(Debug, PartialEq, Eq)]
enum DateParse {
    /// DD/MM/YYYY, today or later.
    Valid(String),
    Past,
    Invalid,
}

fn parse_date(text: &str, today: NaiveDate) -> DateParse {
    let Some(caps) = date_pattern().captures(text) else {
        return DateParse::Invalid;
    };
    let day: u32 = caps[1].parse().unwrap_or(0);
    let month: u32 = caps[2].parse().unwrap_or(0);
    let explicit_year = caps.get(3).map(|m| {
        let y: i32 = m.as_str().parse().unwrap_or(0);
        if y < 100 {
            2000 + y
        } else {
            y
        }
    });

    match explicit_year {
        Some(year) => match NaiveDate::from_ymd_opt(year, month, day) {
            Some(date) if date >= today => DateParse::Valid(date.format("%d/%m/%Y").to_string()),
            Some(_) => DateParse::Past,
            None => DateParse::Invalid,
        },
        None => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
            match this_year {
                Some(date) if date >= today => {
                    DateParse::Valid(date.format("%d/%m/%Y").to_string())
                }
                Some(_) => match NaiveDate::from_ymd_opt(today.year() + 1, month, day) {
                    Some(date) => DateParse::Valid(date.format("%d/%m/%Y").to_string()),
                    None => DateParse::Invalid,
                },
                // 29/02 may only exist next year.
                None => match NaiveDate::from_ymd_opt(today.year() + 1, month, day) {
                    Some(date) => DateParse::Valid(date.format("%d/%m/%Y").to_string()),
                    None => DateParse::Invalid,
                },
            }
        }
    }
}

pub(super) async fn handle(ctx: &StageContext<'_>, text: &str, mut bag: DataBag) -> StageOutcome {
    let (Some(facility), Some(procedure)) = (
        bag.booking.facility.clone(),
        bag.booking.procedure.clone(),
    ) else {
        return StageOutcome::advance(prompts::facility_menu(), bag, Stage::ChooseFacility);
    };

    match parse_date(text, Local::now().date_naive()) {
        DateParse::Valid(date) => {
            match ctx
                .scheduling
                .available_professionals(&facility.clinic_ids, procedure.id, &date)
                .await
            {
                Ok(professionals) if !professionals.is_empty() => {
                    bag.booking.date = Some(date.clone());
                    bag.booking.professionals = professionals;
                    bag.booking.professionals_presented = true;
                    StageOutcome::advance(
                        format!(
                            "✅ Data *{}*.\n\n{}",
                            date,
                            prompts::professional_list(&bag.booking.professionals)
                        ),
                        bag,
                        Stage::ChooseProfessional,
                    )
                }
                Ok(_) => StageOutcome::stay(
                    format!(
                        "Não temos horários de {} em *{}*. 😕 Pode escolher outra data?",
                        procedure.name, date
                    ),
                    bag,
                    Stage::ChooseDate,
                ),
                Err(err) => {
                    tracing::warn!(error = %err, "availability lookup failed");
                    StageOutcome::stay(
                        "Nosso sistema de agenda está instável agora. Pode repetir a data em \
                         alguns instantes?",
                        bag,
                        Stage::ChooseDate,
                    )
                }
            }
        }
        DateParse::Past => StageOutcome::stay(
            format!("Essa data já passou! {}", prompts::date_prompt()),
            bag,
            Stage::ChooseDate,
        ),
        DateParse::Invalid => {
            let reprompt = format!("Não entendi a data. {}", prompts::date_prompt());
            fall_back(ctx, Stage::ChooseDate, text, bag, reprompt).await
        }
    }
}
