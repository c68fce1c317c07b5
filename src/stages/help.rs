//! Help menu
//!
//! Entered through the help intent from anywhere in the flow. Option 1
//! resumes exactly where the user left off, rebuilt from the bag.

use super::{fall_back, prompts, redirect, start, Stage, StageContext, StageOutcome};
use crate::intent::{normalize, Intent};
use crate::session::types::DataBag;

pub(super) async fn handle(ctx: &StageContext<'_>, text: &str, mut bag: DataBag) -> StageOutcome {
    match normalize(text).as_str() {
        "1" => {
            let target = bag.help_return.take().unwrap_or(Stage::Start);
            let reprompt = prompts::reprompt_for(target, &bag);
            StageOutcome::advance(
                format!("Perfeito, vamos continuar!\n\n{reprompt}"),
                bag,
                target,
            )
        }
        "2" => redirect::apply(Intent::RestartBooking, Stage::HelpMenu, bag),
        "3" => {
            let info = start::insurance_info(ctx).await;
            StageOutcome::stay(
                format!("{info}\n\n{}", prompts::help_menu()),
                bag,
                Stage::HelpMenu,
            )
        }
        "4" => {
            let info = start::clinic_info(ctx).await;
            StageOutcome::stay(
                format!("{info}\n\n{}", prompts::help_menu()),
                bag,
                Stage::HelpMenu,
            )
        }
        "5" => StageOutcome::advance(prompts::farewell(), bag, Stage::Closed),
        _ => {
            let reprompt = format!("Escolha uma das opções.\n\n{}", prompts::help_menu());
            fall_back(ctx, Stage::HelpMenu, text, bag, reprompt).await
        }
    }
}
