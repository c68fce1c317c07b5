//! Procedure selection from the fetched catalog

use super::{fall_back, prompts, Stage, StageContext, StageOutcome};
use crate::intent::normalize;
use crate::session::types::{DataBag, Procedure};

fn match_procedure(text: &str, catalog: &[Procedure]) -> Option<Procedure> {
    let t = normalize(text);
    if let Ok(n) = t.parse::<usize>() {
        if n >= 1 && n <= catalog.len() {
            return Some(catalog[n - 1].clone());
        }
        return None;
    }
    if t.len() < 3 {
        return None;
    }
    catalog
        .iter()
        .find(|p| normalize(&p.name).contains(&t))
        .cloned()
}

pub(super) async fn handle(ctx: &StageContext<'_>, text: &str, mut bag: DataBag) -> StageOutcome {
    if bag.booking.procedures.is_empty() {
        // Catalog lost (stale session trimmed by hand, or a skipped
        // facility step). Re-anchor at the unit choice.
        return StageOutcome::advance(prompts::facility_menu(), bag, Stage::ChooseFacility);
    }

    match match_procedure(text, &bag.booking.procedures) {
        Some(procedure) => {
            let name = procedure.name.clone();
            bag.booking.procedure = Some(procedure);
            StageOutcome::advance(
                format!("✅ *{}* selecionado.\n\n{}", name, prompts::date_prompt()),
                bag,
                Stage::ChooseDate,
            )
        }
        None => {
            let reprompt = format!(
                "Não encontrei essa opção. {}",
                prompts::procedure_list(&bag.booking.procedures)
            );
            fall_back(ctx, Stage::ChooseProcedure, text, bag, reprompt).await
        }
    }
}
