//! Intent classification over raw user text
//!
//! A pure keyword scan over normalized (case-folded, accent-stripped)
//! text, checked in a fixed priority order before any stage-local
//! parsing. A secondary LLM path with a constrained output vocabulary
//! runs only when a stage handler failed to interpret the input locally;
//! it is advisory and degrades to `RequestHelp` on any failure, so this
//! module never propagates an error to the orchestrator.

use crate::llm::{ChatTurn, LlmGateway, LlmReply};
use crate::stages::Stage;

/// A transient classification of one turn's input. Each intent carries a
/// redirect stage and, through the invalidation table, the data-bag
/// namespaces it forces out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    RestartBooking,
    ChangeFacility,
    ChangeProcedure,
    ChangeDate,
    ChangeProfessional,
    ChangeInsurance,
    Cancel,
    RequestHelp,
}

impl Intent {
    /// The stage dispatch is redirected to when this intent fires.
    pub fn redirect_stage(self) -> Stage {
        match self {
            Intent::RestartBooking => Stage::Start,
            Intent::ChangeFacility => Stage::ChooseFacility,
            Intent::ChangeProcedure => Stage::ChooseProcedure,
            Intent::ChangeDate => Stage::ChooseDate,
            Intent::ChangeProfessional => Stage::ChooseProfessional,
            Intent::ChangeInsurance => Stage::Start,
            Intent::Cancel => Stage::Closed,
            Intent::RequestHelp => Stage::HelpMenu,
        }
    }

    /// Inverse of the constrained vocabulary the fallback classifier is
    /// prompted with.
    fn from_vocab(word: &str) -> Option<Self> {
        match word {
            "agendar" => Some(Intent::RestartBooking),
            "unidade" => Some(Intent::ChangeFacility),
            "procedimento" => Some(Intent::ChangeProcedure),
            "data" => Some(Intent::ChangeDate),
            "profissional" => Some(Intent::ChangeProfessional),
            "convenio" => Some(Intent::ChangeInsurance),
            "cancelar" => Some(Intent::Cancel),
            "ajuda" => Some(Intent::RequestHelp),
            _ => None,
        }
    }
}

/// Case-fold, strip accents and trim. All keyword vocabularies are
/// stored in this normalized form.
pub fn normalize(text: &str) -> String {
    text.trim()
        .chars()
        .flat_map(|c| c.to_lowercase())
        .map(fold_accent)
        .collect()
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

const RESTART_WORDS: &[&str] = &[
    "novo agendamento",
    "comecar de novo",
    "recomecar",
    "agendamento",
    "agendar",
    "marcacao",
    "marcar",
];

const FACILITY_WORDS: &[&str] = &[
    "trocar de unidade",
    "outra unidade",
    "outra clinica",
    "unidade",
    "clinica",
    "vieiralves",
    "sao jose",
];

const PROCEDURE_WORDS: &[&str] = &[
    "outro procedimento",
    "trocar procedimento",
    "outro tratamento",
    "procedimento",
    "tratamento",
];

const DATE_WORDS: &[&str] = &["outra data", "outro dia", "mudar a data", "remarcar", "data"];

const PROFESSIONAL_WORDS: &[&str] = &[
    "outro profissional",
    "profissional",
    "medico",
    "doutor",
    "doutora",
    "fisioterapeuta",
];

const INSURANCE_WORDS: &[&str] = &["convenio", "plano de saude", "seguro", "cobertura"];

const CANCEL_WORDS: &[&str] = &[
    "cancelar",
    "desistir",
    "nao quero",
    "parar",
    "sair",
    "encerrar",
];

const HELP_WORDS: &[&str] = &[
    "ajuda",
    "menu",
    "opcoes",
    "socorro",
    "nao entendo",
    "nao entendi",
    "estou preso",
    "travei",
];

fn matches_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// Keyword scan in fixed priority order. Expects normalized text;
/// returns `None` when nothing matches, meaning the current stage keeps
/// interpreting the input.
pub fn classify(normalized: &str) -> Option<Intent> {
    if matches_any(normalized, RESTART_WORDS) {
        Some(Intent::RestartBooking)
    } else if matches_any(normalized, FACILITY_WORDS) {
        Some(Intent::ChangeFacility)
    } else if matches_any(normalized, PROCEDURE_WORDS) {
        Some(Intent::ChangeProcedure)
    } else if matches_any(normalized, DATE_WORDS) {
        Some(Intent::ChangeDate)
    } else if matches_any(normalized, PROFESSIONAL_WORDS) {
        Some(Intent::ChangeProfessional)
    } else if matches_any(normalized, INSURANCE_WORDS) {
        Some(Intent::ChangeInsurance)
    } else if matches_any(normalized, CANCEL_WORDS) {
        Some(Intent::Cancel)
    } else if matches_any(normalized, HELP_WORDS) {
        Some(Intent::RequestHelp)
    } else {
        None
    }
}

/// What the fallback path decided about unrecognized input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackVerdict {
    /// No redirect: the current stage should re-prompt.
    Continue,
    Redirect(Intent),
}

fn stage_expectation(stage: Stage) -> &'static str {
    match stage {
        Stage::ChooseFacility => {
            "O usuário deve escolher entre Vieiralves (1) ou São José (2)."
        }
        Stage::ChooseProcedure => {
            "O usuário deve escolher um procedimento da lista numerada ou digitar o nome."
        }
        Stage::ChooseDate => {
            "O usuário deve informar uma data no formato DD/MM ou DD/MM/YYYY."
        }
        Stage::ChooseProfessional => {
            "O usuário deve escolher um profissional da lista numerada ou digitar 0 para sem preferência."
        }
        Stage::ChooseTimeSlot => "O usuário deve escolher um turno ou horário da lista numerada.",
        _ => "O usuário está em uma etapa de agendamento e deve fornecer uma resposta específica.",
    }
}

/// Delegate classification of input no stage handler understood to the
/// language model, constrained to the intent vocabulary plus
/// `continuar`. Falls back to `RequestHelp` on any collaborator failure
/// or out-of-vocabulary answer.
pub async fn classify_with_llm(
    llm: &dyn LlmGateway,
    raw_text: &str,
    stage: Stage,
) -> FallbackVerdict {
    let prompt = format!(
        "Você é um assistente virtual de agendamento de uma clínica.\n\
         {expectation}\n\n\
         O usuário disse: \"{raw_text}\"\n\n\
         Determine a intenção e responda APENAS com uma destas palavras:\n\
         agendar, unidade, procedimento, data, profissional, convenio, cancelar, ajuda, continuar.\n\
         Use \"continuar\" quando o usuário está tentando responder corretamente de forma diferente.",
        expectation = stage_expectation(stage),
    );
    let turns = [ChatTurn::system(prompt), ChatTurn::user(raw_text.to_string())];

    match llm.complete(&turns, &[]).await {
        Ok(LlmReply::Text(answer)) => {
            let word = normalize(&answer);
            if word == "continuar" {
                FallbackVerdict::Continue
            } else if let Some(intent) = Intent::from_vocab(&word) {
                FallbackVerdict::Redirect(intent)
            } else {
                tracing::debug!(answer = %answer, "fallback classifier answered out of vocabulary");
                FallbackVerdict::Redirect(Intent::RequestHelp)
            }
        }
        Ok(LlmReply::FunctionCall { .. }) => FallbackVerdict::Redirect(Intent::RequestHelp),
        Err(err) => {
            tracing::warn!(error = %err, "fallback classifier unavailable");
            FallbackVerdict::Redirect(Intent::RequestHelp)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::testing::MockLlm;

    #[test]
    fn normalization_folds_case_and_accents() {
        assert_eq!(normalize("  Quero TROCAR de Unidade  "), "quero trocar de unidade");
        assert_eq!(normalize("São José"), "sao jose");
        assert_eq!(normalize("CONVÊNIO"), "convenio");
    }

    #[test]
    fn facility_change_is_detected() {
        assert_eq!(
            classify(&normalize("quero trocar de unidade")),
            Some(Intent::ChangeFacility)
        );
        assert_eq!(classify(&normalize("a clínica São José")), Some(Intent::ChangeFacility));
    }

    #[test]
    fn restart_outranks_later_categories() {
        // "agendar" and "unidade" both present: restart wins.
        assert_eq!(
            classify(&normalize("quero agendar em outra unidade")),
            Some(Intent::RestartBooking)
        );
    }

    #[test]
    fn cancel_and_help_rank_last() {
        assert_eq!(classify(&normalize("quero cancelar")), Some(Intent::Cancel));
        assert_eq!(classify(&normalize("me ajuda, travei")), Some(Intent::RequestHelp));
        // A cancel phrase mentioning the date category still ranks date first.
        assert_eq!(
            classify(&normalize("cancelar essa data")),
            Some(Intent::ChangeDate)
        );
    }

    #[test]
    fn menu_numbers_and_plain_answers_do_not_classify() {
        assert_eq!(classify(&normalize("2")), None);
        assert_eq!(classify(&normalize("25/06")), None);
        assert_eq!(classify(&normalize("sim")), None);
    }

    #[test]
    fn redirect_stages_cover_all_intents() {
        assert_eq!(Intent::RestartBooking.redirect_stage(), Stage::Start);
        assert_eq!(Intent::ChangeFacility.redirect_stage(), Stage::ChooseFacility);
        assert_eq!(Intent::Cancel.redirect_stage(), Stage::Closed);
        assert_eq!(Intent::RequestHelp.redirect_stage(), Stage::HelpMenu);
    }

    #[tokio::test]
    async fn llm_fallback_maps_vocabulary() {
        let mock = MockLlm::new();
        mock.queue_reply(LlmReply::Text("procedimento".into()));
        let verdict = classify_with_llm(&mock, "quero mudar aquilo", Stage::ChooseDate).await;
        assert_eq!(verdict, FallbackVerdict::Redirect(Intent::ChangeProcedure));
    }

    #[tokio::test]
    async fn llm_fallback_continue_passes_through() {
        let mock = MockLlm::new();
        mock.queue_reply(LlmReply::Text("Continuar".into()));
        let verdict = classify_with_llm(&mock, "dia vinte e cinco", Stage::ChooseDate).await;
        assert_eq!(verdict, FallbackVerdict::Continue);
    }

    #[tokio::test]
    async fn llm_fallback_degrades_to_help_on_failure() {
        let mock = MockLlm::new();
        mock.queue_error(LlmError::network("down"));
        let verdict = classify_with_llm(&mock, "???", Stage::ChooseProcedure).await;
        assert_eq!(verdict, FallbackVerdict::Redirect(Intent::RequestHelp));

        let mock = MockLlm::new();
        mock.queue_reply(LlmReply::Text("banana".into()));
        let verdict = classify_with_llm(&mock, "???", Stage::ChooseProcedure).await;
        assert_eq!(verdict, FallbackVerdict::Redirect(Intent::RequestHelp));
    }
}
