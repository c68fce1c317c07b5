//! Post-booking feedback
//!
//! A rating closes the conversation; anything else is kept verbatim as
//! free-form feedback. There is no wrong answer at this point.

use super::{prompts, Stage, StageContext, StageOutcome};
use crate::intent::normalize;
use crate::session::types::DataBag;

fn rating_label(t: &str) -> Option<&'static str> {
    match t {
        "1" | "otimo" => Some("Ótimo"),
        "2" | "bom" => Some("Bom"),
        "3" | "regular" => Some("Regular"),
        "4" | "ruim" => Some("Ruim"),
        _ => None,
    }
}

pub(super) async fn handle(_ctx: &StageContext<'_>, text: &str, mut bag: DataBag) -> StageOutcome {
    let t = normalize(text);
    bag.feedback = Some(match rating_label(&t) {
        Some(label) => label.to_string(),
        None => text.trim().to_string(),
    });
    tracing::info!(feedback = %bag.feedback.as_deref().unwrap_or(""), "feedback recorded");
    StageOutcome::advance(
        format!("Obrigado pela avaliação! 💙 {}", prompts::farewell()),
        bag,
        Stage::Closed,
    )
}
