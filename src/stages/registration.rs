//! Pre-registration wizard for unknown phone numbers
//!
//! One field per turn, in a fixed order. The first missing field decides
//! the question, so the wizard needs no step counter and survives
//! partially filled sessions. Completion produces a local patient record
//! (no server-side id yet) and rejoins the booking flow at the procedure
//! catalog.

use super::{fall_back, prompts, Stage, StageContext, StageOutcome};
use crate::intent::normalize;
use crate::session::types::{DataBag, PatientRecord};
use crate::session::normalize_phone;
use chrono::{Local, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

fn birth_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(\d{1,2})/(\d{1,2})/(\d{4})\s*$").expect("static birth-date pattern")
    })
}

fn parse_birth_date(text: &str, today: NaiveDate) -> Option<String> {
    let caps = birth_pattern().captures(text)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    (year >= 1900 && date < today).then(|| date.format("%d/%m/%Y").to_string())
}

fn parse_national_id(text: &str) -> Option<String> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    (digits.len() == 11).then_some(digits)
}

fn looks_like_full_name(text: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    words.len() >= 2 && words.iter().all(|w| w.chars().all(|c| c.is_alphabetic() || c == '\'' || c == '-'))
}

pub(super) async fn handle(ctx: &StageContext<'_>, text: &str, mut bag: DataBag) -> StageOutcome {
    let t = normalize(text);

    if !bag.registration.started {
        return if t == "1" || t == "sim" {
            bag.registration.started = true;
            StageOutcome::stay(
                "Ótimo! Vamos lá. Qual o seu *nome completo*?",
                bag,
                Stage::RegistrationWizard,
            )
        } else if t == "2" || t == "nao" {
            StageOutcome::advance(
                "Sem problemas! Se preferir, nossa recepção pode fazer o cadastro por telefone. \
                 Posso ajudar em mais alguma coisa?",
                bag,
                Stage::Start,
            )
        } else {
            let reprompt = "Deseja fazer o *pré-cadastro*?\n*1.* Sim\n*2.* Não".to_string();
            fall_back(ctx, Stage::RegistrationWizard, text, bag, reprompt).await
        };
    }

    if bag.registration.full_name.is_none() {
        if !looks_like_full_name(text.trim()) {
            return StageOutcome::stay(
                "Preciso do seu *nome completo* (nome e sobrenome), por favor.",
                bag,
                Stage::RegistrationWizard,
            );
        }
        bag.registration.full_name = Some(text.trim().to_string());
        return StageOutcome::stay(
            "Agora me informe o seu *CPF* (somente números).",
            bag,
            Stage::RegistrationWizard,
        );
    }

    if bag.registration.national_id.is_none() {
        let Some(id) = parse_national_id(text) else {
            return StageOutcome::stay(
                "Esse CPF não parece válido. São *11 dígitos*, pode conferir?",
                bag,
                Stage::RegistrationWizard,
            );
        };
        bag.registration.national_id = Some(id);
        return StageOutcome::stay(
            "Qual a sua *data de nascimento*? (DD/MM/AAAA)",
            bag,
            Stage::RegistrationWizard,
        );
    }

    if bag.registration.birth_date.is_none() {
        let Some(date) = parse_birth_date(text, Local::now().date_naive()) else {
            return StageOutcome::stay(
                "Não entendi a data. Me informe no formato *DD/MM/AAAA*, por exemplo 03/07/1990.",
                bag,
                Stage::RegistrationWizard,
            );
        };
        bag.registration.birth_date = Some(date);
        return StageOutcome::stay(
            "Qual o seu *telefone* com DDD? Se for este mesmo número, responda *este*.",
            bag,
            Stage::RegistrationWizard,
        );
    }

    if bag.registration.phone.is_none() {
        let phone = if t == "este" || t == "esse" || t == "este mesmo" || t == "esse mesmo" {
            ctx.user_id.to_string()
        } else {
            normalize_phone(text)
        };
        if phone.len() < 10 {
            return StageOutcome::stay(
                "Esse telefone não parece completo. Me informe com *DDD*, por exemplo 92 98888-7777.",
                bag,
                Stage::RegistrationWizard,
            );
        }
        bag.registration.phone = Some(phone);
        return StageOutcome::stay(
            "Qual o seu *endereço*? (rua, número e bairro)",
            bag,
            Stage::RegistrationWizard,
        );
    }

    if bag.registration.address.is_none() {
        if text.trim().len() < 5 {
            return StageOutcome::stay(
                "Pode me passar o endereço um pouco mais completo? (rua, número e bairro)",
                bag,
                Stage::RegistrationWizard,
            );
        }
        bag.registration.address = Some(text.trim().to_string());
        return StageOutcome::stay(
            "Para terminar: qual o seu *convênio*? Se não tiver, responda *particular*.",
            bag,
            Stage::RegistrationWizard,
        );
    }

    bag.registration.insurance = Some(text.trim().to_string());
    complete(ctx, bag).await
}

/// Wizard finished: promote the collected data to a patient record and
/// rejoin the booking flow.
async fn complete(ctx: &StageContext<'_>, mut bag: DataBag) -> StageOutcome {
    let name = bag
        .registration
        .full_name
        .clone()
        .unwrap_or_else(|| "Paciente".to_string());
    bag.patient = Some(PatientRecord {
        patient_id: None,
        name: name.clone(),
        insurance_id: None,
    });
    tracing::info!(user = %ctx.user_id, "pre-registration completed");

    let Some(facility) = bag.booking.facility.clone() else {
        return StageOutcome::advance(
            format!(
                "Pré-cadastro concluído, {}! 🎉\n\n{}",
                first_name(&name),
                prompts::facility_menu()
            ),
            bag,
            Stage::ChooseFacility,
        );
    };

    match ctx
        .scheduling
        .procedures_by_insurance(None, &facility.clinic_ids)
        .await
    {
        Ok(procedures) if !procedures.is_empty() => {
            bag.booking.procedures = procedures;
            StageOutcome::advance(
                format!(
                    "Pré-cadastro concluído, {}! 🎉\n\n{}",
                    first_name(&name),
                    prompts::procedure_list(&bag.booking.procedures)
                ),
                bag,
                Stage::ChooseProcedure,
            )
        }
        Ok(_) | Err(_) => {
            bag.booking.facility = None;
            StageOutcome::advance(
                format!(
                    "Pré-cadastro concluído, {}! 🎉 Nosso sistema de agenda está instável, \
                     vamos retomar pela unidade.\n\n{}",
                    first_name(&name),
                    prompts::facility_menu()
                ),
                bag,
                Stage::ChooseFacility,
            )
        }
    }
}

fn first_name(name: &str) -> &str {
    name.split_whitespace().next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Operation;
    use crate::session::types::Facility;
    use crate::testing::{MockLlm, MockSchedulingGateway};
    use serde_json::json;

    fn ctx<'a>(sched: &'a MockSchedulingGateway, llm: &'a MockLlm) -> StageContext<'a> {
        StageContext {
            user_id: "92988887777",
            history: &[],
            scheduling: sched,
            llm,
        }
    }

    fn bag_with_facility() -> DataBag {
        let mut bag = DataBag::default();
        bag.booking.facility = Some(Facility {
            name: "Vieiralves".into(),
            clinic_ids: vec![1, 3],
        });
        bag
    }

    #[test]
    fn field_validators() {
        assert!(looks_like_full_name("Ana Souza"));
        assert!(!looks_like_full_name("Ana"));
        assert!(!looks_like_full_name("Ana 123"));
        assert_eq!(parse_national_id("529.982.247-25"), Some("52998224725".into()));
        assert_eq!(parse_national_id("1234"), None);
        let today = NaiveDate::from_ymd_opt(2026, 8, 25).unwrap();
        assert_eq!(parse_birth_date("03/07/1990", today), Some("03/07/1990".into()));
        assert_eq!(parse_birth_date("03/07/2030", today), None);
        assert_eq!(parse_birth_date("3 de julho", today), None);
    }

    #[tokio::test]
    async fn full_wizard_run_rejoins_the_booking_flow() {
        let sched = MockSchedulingGateway::new();
        sched.queue_ok(
            Operation::ProceduresByInsurance,
            json!([{ "id": 5, "nome": "Pilates" }]),
        );
        let llm = MockLlm::new();
        let c = ctx(&sched, &llm);

        let mut bag = bag_with_facility();
        for (input, expect) in [
            ("1", "nome completo"),
            ("Ana Souza", "CPF"),
            ("529.982.247-25", "nascimento"),
            ("03/07/1990", "telefone"),
            ("este", "endereço"),
            ("Rua das Flores, 120, Centro", "convênio"),
        ] {
            let out = handle(&c, input, bag).await;
            assert_eq!(out.next, Stage::RegistrationWizard, "after input {input:?}");
            assert!(out.reply.contains(expect), "after {input:?}: {}", out.reply);
            bag = out.bag;
        }

        let out = handle(&c, "particular", bag).await;
        assert_eq!(out.next, Stage::ChooseProcedure);
        let patient = out.bag.patient.as_ref().unwrap();
        assert_eq!(patient.name, "Ana Souza");
        assert!(patient.patient_id.is_none());
        assert_eq!(out.bag.registration.phone.as_deref(), Some("92988887777"));
        assert!(out.reply.contains("Pilates"));
    }

    #[tokio::test]
    async fn invalid_cpf_is_asked_again() {
        let sched = MockSchedulingGateway::new();
        let llm = MockLlm::new();
        let mut bag = bag_with_facility();
        bag.registration.started = true;
        bag.registration.full_name = Some("Ana Souza".into());
        let out = handle(&ctx(&sched, &llm), "12345", bag).await;
        assert_eq!(out.next, Stage::RegistrationWizard);
        assert!(out.bag.registration.national_id.is_none());
        assert!(out.reply.contains("11 dígitos"));
    }

    #[tokio::test]
    async fn declining_returns_to_the_start() {
        let sched = MockSchedulingGateway::new();
        let llm = MockLlm::new();
        let out = handle(&ctx(&sched, &llm), "2", bag_with_facility()).await;
        assert_eq!(out.next, Stage::Start);
        assert!(out.reply.contains("recepção"));
    }
}
