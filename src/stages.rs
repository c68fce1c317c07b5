//! Conversation stages and the turn dispatcher
//!
//! A stage is a node of the booking flow; its handler is a pure-ish
//! async function from (context, user text, bag) to (reply, new bag,
//! next stage). Handlers never return errors: a collaborator failure
//! turns into a polite in-band reply so the conversation always moves.

mod closed;
mod confirm;
mod date;
mod facility;
mod feedback;
mod help;
mod procedure;
mod professional;
pub mod prompts;
pub mod redirect;
mod registration;
mod slot;
mod start;
mod summary;

use crate::gateway::SchedulingGateway;
use crate::intent::{self, FallbackVerdict, Intent};
use crate::llm::LlmGateway;
use crate::session::types::{DataBag, HistoryTurn};
use serde::{Deserialize, Serialize};

/// Every node of the conversation flow. The set is closed: dispatch is
/// an exhaustive match, so adding a stage without a handler does not
/// compile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Start,
    ChooseFacility,
    ChooseProcedure,
    ChooseDate,
    ChooseProfessional,
    ChooseTimeSlot,
    ReviewSummary,
    ConfirmBooking,
    RegistrationWizard,
    HelpMenu,
    Feedback,
    Closed,
}

impl Stage {
    /// Position of this stage along the booking chain, used to decide
    /// which corrections are meaningful here. Stages off the chain
    /// (help, wizard, feedback) have no rank.
    fn booking_rank(self) -> Option<u8> {
        match self {
            Stage::ChooseFacility => Some(0),
            Stage::ChooseProcedure => Some(1),
            Stage::ChooseDate => Some(2),
            Stage::ChooseProfessional => Some(3),
            Stage::ChooseTimeSlot => Some(4),
            Stage::ReviewSummary | Stage::ConfirmBooking => Some(5),
            _ => None,
        }
    }

    /// Whether a classified intent may override this stage's own input
    /// handling. A correction only fires once the thing it corrects has
    /// been asked: "trocar de unidade" while still choosing the unit is
    /// ordinary input, not a correction.
    pub fn allows_override(self, intent: Intent) -> bool {
        let rank = self.booking_rank();
        match intent {
            Intent::RestartBooking | Intent::Cancel | Intent::RequestHelp | Intent::ChangeInsurance => {
                self != Stage::Start
            }
            Intent::ChangeFacility => rank.is_some_and(|r| r >= 1),
            Intent::ChangeProcedure => rank.is_some_and(|r| r >= 2),
            Intent::ChangeDate => rank.is_some_and(|r| r >= 3),
            Intent::ChangeProfessional => rank.is_some_and(|r| r >= 4),
        }
    }
}

/// Collaborators a handler may reach during one turn.
pub struct StageContext<'a> {
    pub user_id: &'a str,
    pub history: &'a [HistoryTurn],
    pub scheduling: &'a dyn SchedulingGateway,
    pub llm: &'a dyn LlmGateway,
}

/// What one turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub reply: String,
    pub bag: DataBag,
    pub next: Stage,
}

impl StageOutcome {
    pub fn stay(reply: impl Into<String>, bag: DataBag, stage: Stage) -> Self {
        Self {
            reply: reply.into(),
            bag,
            next: stage,
        }
    }

    pub fn advance(reply: impl Into<String>, bag: DataBag, next: Stage) -> Self {
        Self {
            reply: reply.into(),
            bag,
            next,
        }
    }
}

/// Route one turn of user input to the current stage's handler.
pub async fn dispatch(
    stage: Stage,
    ctx: &StageContext<'_>,
    text: &str,
    bag: DataBag,
) -> StageOutcome {
    match stage {
        Stage::Start => start::handle(ctx, text, bag).await,
        Stage::ChooseFacility => facility::handle(ctx, text, bag).await,
        Stage::ChooseProcedure => procedure::handle(ctx, text, bag).await,
        Stage::ChooseDate => date::handle(ctx, text, bag).await,
        Stage::ChooseProfessional => professional::handle(ctx, text, bag).await,
        Stage::ChooseTimeSlot => slot::handle(ctx, text, bag).await,
        Stage::ReviewSummary => summary::handle(ctx, text, bag).await,
        Stage::ConfirmBooking => confirm::handle(ctx, text, bag).await,
        Stage::RegistrationWizard => registration::handle(ctx, text, bag).await,
        Stage::HelpMenu => help::handle(ctx, text, bag).await,
        Stage::Feedback => feedback::handle(ctx, text, bag).await,
        Stage::Closed => closed::handle(ctx, text, bag).await,
    }
}

/// Shared tail for input the stage could not parse locally: ask the
/// fallback classifier, redirect when it names an allowed correction,
/// otherwise re-prompt in place.
pub(crate) async fn fall_back(
    ctx: &StageContext<'_>,
    current: Stage,
    text: &str,
    bag: DataBag,
    reprompt: String,
) -> StageOutcome {
    match intent::classify_with_llm(ctx.llm, text, current).await {
        FallbackVerdict::Redirect(intent) if current.allows_override(intent) => {
            redirect::apply(intent, current, bag)
        }
        _ => StageOutcome::stay(reprompt, bag, current),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_serialization_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&Stage::ChooseTimeSlot).unwrap(),
            "\"choose_time_slot\""
        );
        let parsed: Stage = serde_json::from_str("\"registration_wizard\"").unwrap();
        assert_eq!(parsed, Stage::RegistrationWizard);
        assert_eq!(Stage::default(), Stage::Start);
    }

    #[test]
    fn corrections_only_fire_after_their_subject_was_asked() {
        assert!(!Stage::ChooseFacility.allows_override(Intent::ChangeFacility));
        assert!(Stage::ChooseProcedure.allows_override(Intent::ChangeFacility));
        assert!(!Stage::ChooseDate.allows_override(Intent::ChangeDate));
        assert!(Stage::ChooseProfessional.allows_override(Intent::ChangeDate));
        assert!(Stage::ConfirmBooking.allows_override(Intent::ChangeProfessional));
        assert!(!Stage::ChooseProfessional.allows_override(Intent::ChangeProfessional));
    }

    #[test]
    fn global_intents_fire_anywhere_but_the_start() {
        for stage in [Stage::ChooseFacility, Stage::ConfirmBooking, Stage::HelpMenu] {
            assert!(stage.allows_override(Intent::Cancel));
            assert!(stage.allows_override(Intent::RequestHelp));
            assert!(stage.allows_override(Intent::RestartBooking));
        }
        assert!(!Stage::Start.allows_override(Intent::RestartBooking));
        assert!(!Stage::Start.allows_override(Intent::RequestHelp));
    }
}
