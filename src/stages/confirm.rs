//! Final confirmation and registration
//!
//! The only stage that writes to the provider. Essentials are
//! re-validated right before the write: a bag that lost a link of the
//! chain restarts at the unit choice instead of registering garbage.

use super::{fall_back, prompts, Stage, StageContext, StageOutcome};
use crate::gateway::GatewayError;
use crate::intent::normalize;
use crate::session::types::{BookingData, DataBag};
use serde_json::json;

fn is_yes(t: &str) -> bool {
    t == "1" || t == "sim" || t == "s" || t == "ok" || t.contains("confirm") || t.contains("pode sim")
}

fn is_no(t: &str) -> bool {
    t == "2" || t == "nao" || t == "n" || t.starts_with("nao ")
}

pub(super) async fn handle(ctx: &StageContext<'_>, text: &str, mut bag: DataBag) -> StageOutcome {
    let t = normalize(text);

    if is_no(&t) {
        return StageOutcome::stay(prompts::revision_menu(), bag, Stage::ConfirmBooking);
    }

    if !is_yes(&t) {
        let reprompt = format!("Só para confirmar: {}", prompts::confirm_question());
        return fall_back(ctx, Stage::ConfirmBooking, text, bag, reprompt).await;
    }

    let essentials = (
        bag.patient.clone(),
        bag.booking.facility.clone(),
        bag.booking.procedure.clone(),
        bag.booking.date.clone(),
        bag.booking.slot.clone(),
    );
    let (Some(patient), Some(facility), Some(procedure), Some(date), Some(slot)) = essentials
    else {
        bag.booking = BookingData::default();
        return StageOutcome::advance(
            format!(
                "Ops, perdi parte dos dados do seu agendamento. Vamos recomeçar rapidinho.\n\n{}",
                prompts::facility_menu()
            ),
            bag,
            Stage::ChooseFacility,
        );
    };

    let professional_id = bag
        .booking
        .professional
        .as_ref()
        .map(|p| p.id)
        .or(slot.professional_id);

    let payload = json!({
        "nome": patient.name,
        "paciente_id": patient.patient_id,
        "telefone": ctx.user_id,
        "convenio_id": patient.insurance_id,
        "clinica_id": facility.clinic_ids.first(),
        "procedimento_id": procedure.id,
        "profissional_id": professional_id,
        "data": date,
        "hora_inicio": slot.start,
        "hora_fim": slot.end,
    });

    match ctx.scheduling.register_appointment(payload).await {
        Ok(_) => {
            tracing::info!(user = %ctx.user_id, procedure = %procedure.name, date = %date, "appointment registered");
            StageOutcome::advance(
                format!(
                    "🎉 *Agendamento confirmado!*\n{} em {} às {}, unidade {}.\n\n{}",
                    procedure.name,
                    date,
                    slot.start,
                    facility.name,
                    prompts::feedback_prompt()
                ),
                bag,
                Stage::Feedback,
            )
        }
        Err(GatewayError::Rejected(reason)) => {
            tracing::warn!(user = %ctx.user_id, reason = %reason, "provider rejected the booking");
            StageOutcome::stay(
                format!(
                    "O sistema não aceitou esse agendamento: {reason}.\n\n{}",
                    prompts::revision_menu()
                ),
                bag,
                Stage::ConfirmBooking,
            )
        }
        Err(err) => {
            tracing::warn!(user = %ctx.user_id, error = %err, "appointment registration failed");
            StageOutcome::stay(
                "Não consegui registrar agora, o sistema está instável. 😕 Responda *1* em \
                 instantes para eu tentar de novo.",
                bag,
                Stage::ConfirmBooking,
            )
        }
    }
}
