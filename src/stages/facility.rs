//! Unit selection
//!
//! First link of the booking chain. Also the point where an unknown
//! phone number branches into the pre-registration wizard.

use super::{fall_back, prompts, Stage, StageContext, StageOutcome};
use crate::intent::normalize;
use crate::session::types::{BookingData, DataBag, Facility};

/// The two units and their clinic ids. Vieiralves spans the main
/// building and its annex, which the provider treats as separate clinics.
pub(super) fn match_facility(text: &str) -> Option<Facility> {
    let t = normalize(text);
    if t == "1" || t.contains("vieiralves") {
        Some(Facility {
            name: "Vieiralves".to_string(),
            clinic_ids: vec![1, 3],
        })
    } else if t == "2" || t.contains("sao jose") {
        Some(Facility {
            name: "São José".to_string(),
            clinic_ids: vec![2],
        })
    } else {
        None
    }
}

pub(super) async fn handle(ctx: &StageContext<'_>, text: &str, mut bag: DataBag) -> StageOutcome {
    let Some(facility) = match_facility(text) else {
        return fall_back(ctx, Stage::ChooseFacility, text, bag, prompts::facility_menu()).await;
    };

    // A fresh unit choice restarts the chain below it.
    bag.booking = BookingData {
        facility: Some(facility.clone()),
        ..BookingData::default()
    };

    if bag.patient.is_none() {
        match ctx.scheduling.lookup_patient(ctx.user_id).await {
            Ok(found) => bag.patient = found,
            Err(err) => {
                tracing::warn!(user = %ctx.user_id, error = %err, "patient lookup unavailable");
            }
        }
    }

    let Some(patient) = bag.patient.clone() else {
        return StageOutcome::advance(
            format!(
                "✅ Unidade *{}* selecionada.\n\n\
                 Não encontrei um cadastro para o seu número. Deseja fazer um \
                 *pré-cadastro* rápido por aqui?\n*1.* Sim\n*2.* Não",
                facility.name
            ),
            bag,
            Stage::RegistrationWizard,
        );
    };

    match ctx
        .scheduling
        .procedures_by_insurance(patient.insurance_id, &facility.clinic_ids)
        .await
    {
        Ok(procedures) if !procedures.is_empty() => {
            bag.booking.procedures = procedures;
            StageOutcome::advance(
                format!(
                    "✅ Unidade *{}* selecionada.\n\n{}",
                    facility.name,
                    prompts::procedure_list(&bag.booking.procedures)
                ),
                bag,
                Stage::ChooseProcedure,
            )
        }
        Ok(_) => {
            bag.booking.facility = None;
            StageOutcome::stay(
                format!(
                    "Não encontrei procedimentos disponíveis para o seu convênio na unidade {}. \
                     Quer tentar a outra unidade?\n\n{}",
                    facility.name,
                    prompts::facility_menu()
                ),
                bag,
                Stage::ChooseFacility,
            )
        }
        Err(err) => {
            tracing::warn!(error = %err, "procedure catalog unavailable");
            bag.booking.facility = None;
            StageOutcome::stay(
                "Nosso sistema de agenda está instável agora. Pode repetir a unidade em \
                 alguns instantes?",
                bag,
                Stage::ChooseFacility,
            )
        }
    }
}
