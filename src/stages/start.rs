//! First-contact stage
//!
//! The only stage with open-ended input. The model decides between free
//! conversation and one of three menu functions; everything downstream
//! of here is closed-choice parsing.

use super::{facility, prompts, Stage, StageContext, StageOutcome};
use crate::llm::{canned_reply, ChatTurn, FunctionSpec, LlmReply};
use crate::session::types::{DataBag, Role};
use serde_json::json;

fn menu_functions() -> Vec<FunctionSpec> {
    vec![
        FunctionSpec {
            name: "start_booking",
            description: "Inicia o fluxo de agendamento de consulta. Chame quando o usuário quer agendar, marcar ou remarcar uma consulta.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "unidade": {
                        "type": "string",
                        "description": "Unidade desejada, se o usuário mencionou: Vieiralves ou São José"
                    }
                }
            }),
        },
        FunctionSpec {
            name: "get_insurance_data",
            description: "Lista os convênios aceitos pela clínica. Chame quando o usuário pergunta sobre convênios ou planos de saúde.",
            parameters: json!({ "type": "object", "properties": {} }),
        },
        FunctionSpec {
            name: "get_clinic_data",
            description: "Informa endereço e telefone das unidades. Chame quando o usuário pergunta onde fica a clínica ou como entrar em contato.",
            parameters: json!({ "type": "object", "properties": {} }),
        },
    ]
}

fn build_turns(ctx: &StageContext<'_>, bag: &DataBag, text: &str) -> Vec<ChatTurn> {
    let patient_line = match &bag.patient {
        Some(p) => format!("O usuário se chama {} e já é paciente.", p.name),
        None => "O usuário ainda não foi identificado como paciente.".to_string(),
    };
    let mut turns = vec![ChatTurn::system(format!(
        "Você é o assistente virtual de uma clínica de fisioterapia com duas unidades, \
         Vieiralves e São José. {patient_line} Seja breve e cordial, responda em português \
         e use as funções disponíveis quando o pedido corresponder a uma delas. Para \
         qualquer outro assunto, explique educadamente o que você consegue fazer."
    ))];
    for turn in ctx.history {
        turns.push(match turn.role {
            Role::User => ChatTurn::user(turn.content.clone()),
            Role::Assistant => ChatTurn::assistant(turn.content.clone()),
        });
    }
    turns.push(ChatTurn::user(text.to_string()));
    turns
}

pub(super) async fn handle(ctx: &StageContext<'_>, text: &str, mut bag: DataBag) -> StageOutcome {
    if bag.patient.is_none() {
        match ctx.scheduling.lookup_patient(ctx.user_id).await {
            Ok(found) => bag.patient = found,
            Err(err) => {
                tracing::warn!(user = %ctx.user_id, error = %err, "patient lookup unavailable");
            }
        }
    }

    let turns = build_turns(ctx, &bag, text);
    match ctx.llm.complete(&turns, &menu_functions()).await {
        Ok(LlmReply::FunctionCall { name, arguments }) => match name.as_str() {
            "start_booking" => {
                let unit = arguments
                    .get("unidade")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                if facility::match_facility(unit).is_some() {
                    // The model already extracted the unit; let the
                    // facility stage take it from here in the same turn.
                    return facility::handle(ctx, unit, bag).await;
                }
                StageOutcome::advance(
                    format!(
                        "Perfeito! Vou te ajudar a agendar.\n\n{}",
                        prompts::facility_menu()
                    ),
                    bag,
                    Stage::ChooseFacility,
                )
            }
            "get_insurance_data" => {
                let reply = insurance_info(ctx).await;
                StageOutcome::stay(reply, bag, Stage::Start)
            }
            "get_clinic_data" => {
                let reply = clinic_info(ctx).await;
                StageOutcome::stay(reply, bag, Stage::Start)
            }
            other => {
                tracing::warn!(function = %other, "model called an unknown menu function");
                StageOutcome::stay(prompts::start_menu(bag.patient.as_ref()), bag, Stage::Start)
            }
        },
        Ok(LlmReply::Text(reply)) => StageOutcome::stay(reply, bag, Stage::Start),
        Err(err) => {
            tracing::warn!(error = %err, "start-stage completion failed");
            StageOutcome::stay(canned_reply(text), bag, Stage::Start)
        }
    }
}

pub(super) async fn insurance_info(ctx: &StageContext<'_>) -> String {
    match ctx.scheduling.insurance_catalog().await {
        Ok(list) if !list.is_empty() => {
            let names: Vec<String> = list
                .iter()
                .map(|i| format!("• {}", i.nome_convenio))
                .collect();
            format!(
                "Atendemos os seguintes convênios:\n{}\n\nPosso ajudar em algo mais?",
                names.join("\n")
            )
        }
        Ok(_) => "No momento não temos convênios cadastrados. Atendemos na modalidade particular."
            .to_string(),
        Err(err) => {
            tracing::warn!(error = %err, "insurance catalog unavailable");
            "No momento não consigo consultar os convênios. Pode tentar novamente em alguns minutos?"
                .to_string()
        }
    }
}

pub(super) async fn clinic_info(ctx: &StageContext<'_>) -> String {
    match ctx.scheduling.clinic_catalog().await {
        Ok(list) if !list.is_empty() => {
            let mut out = String::from("Nossas unidades:\n");
            for c in &list {
                out.push_str(&format!("🏥 *{}*\n{}\n", c.nome, c.endereco));
                if !c.telefone.is_empty() {
                    out.push_str(&format!("📞 {}\n", c.telefone));
                }
            }
            out
        }
        Ok(_) => "Não encontrei os dados das unidades agora. Pode tentar novamente em instantes?"
            .to_string(),
        Err(err) => {
            tracing::warn!(error = %err, "clinic catalog unavailable");
            "No momento não consigo consultar os dados das unidades. Pode tentar novamente em alguns minutos?"
                .to_string()
        }
    }
}
