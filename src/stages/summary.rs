//! Booking résumé
//!
//! Presented right after the slot choice; the stored stage moves to the
//! confirmation question. The insurance name is a courtesy lookup and
//! never blocks the summary.

use super::{prompts, Stage, StageContext, StageOutcome};
use crate::session::types::DataBag;

pub(super) async fn present(ctx: &StageContext<'_>, bag: DataBag) -> StageOutcome {
    let insurance = insurance_label(ctx, &bag).await;
    let reply = prompts::summary(&bag, &insurance);
    StageOutcome::advance(reply, bag, Stage::ConfirmBooking)
}

async fn insurance_label(ctx: &StageContext<'_>, bag: &DataBag) -> String {
    let Some(id) = bag.patient.as_ref().and_then(|p| p.insurance_id) else {
        return "Particular".to_string();
    };
    match ctx.scheduling.insurance_catalog().await {
        Ok(list) => list
            .into_iter()
            .find(|i| i.convenio_id == id)
            .map_or_else(|| "A confirmar".to_string(), |i| i.nome_convenio),
        Err(err) => {
            tracing::warn!(error = %err, "insurance name lookup failed");
            "A confirmar".to_string()
        }
    }
}

/// Reached only through stale sessions; re-presents the résumé.
pub(super) async fn handle(ctx: &StageContext<'_>, _text: &str, bag: DataBag) -> StageOutcome {
    present(ctx, bag).await
}
