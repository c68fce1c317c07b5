//! Mid-flow corrections
//!
//! Applies the invalidation table for a classified intent, then builds
//! the target stage's prompt straight from what survives in the bag. No
//! collaborator calls happen here, so a redirect can never fail and can
//! never re-enter the dispatcher.

use super::{prompts, Stage, StageOutcome};
use crate::intent::Intent;
use crate::invalidation;
use crate::session::types::DataBag;

pub fn apply(intent: Intent, current: Stage, bag: DataBag) -> StageOutcome {
    let mut bag = invalidation::apply(intent, bag);

    match intent {
        Intent::RestartBooking => StageOutcome::advance(
            format!(
                "Claro, vamos recomeçar!\n\n{}",
                prompts::start_menu(bag.patient.as_ref())
            ),
            bag,
            Stage::Start,
        ),
        Intent::ChangeFacility => {
            StageOutcome::advance(prompts::facility_menu(), bag, Stage::ChooseFacility)
        }
        Intent::ChangeProcedure => {
            // The catalog survives a procedure change; if it is somehow
            // gone, fall back to picking the unit again.
            if bag.booking.procedures.is_empty() {
                StageOutcome::advance(prompts::facility_menu(), bag, Stage::ChooseFacility)
            } else {
                StageOutcome::advance(
                    prompts::procedure_list(&bag.booking.procedures),
                    bag,
                    Stage::ChooseProcedure,
                )
            }
        }
        Intent::ChangeDate => StageOutcome::advance(prompts::date_prompt(), bag, Stage::ChooseDate),
        Intent::ChangeProfessional => StageOutcome::advance(
            prompts::professional_list(&bag.booking.professionals),
            bag,
            Stage::ChooseProfessional,
        ),
        Intent::ChangeInsurance => StageOutcome::advance(
            format!(
                "Para atualizar seu convênio, vamos começar um novo atendimento.\n\n{}",
                prompts::start_menu(bag.patient.as_ref())
            ),
            bag,
            Stage::Start,
        ),
        Intent::Cancel => StageOutcome::advance(prompts::cancelled(), bag, Stage::Closed),
        Intent::RequestHelp => {
            if current != Stage::HelpMenu {
                bag.help_return = Some(current);
            }
            StageOutcome::advance(prompts::help_menu(), bag, Stage::HelpMenu)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::{Facility, Procedure};

    fn bag_with_catalog() -> DataBag {
        let mut bag = DataBag::default();
        bag.booking.facility = Some(Facility {
            name: "Vieiralves".into(),
            clinic_ids: vec![1, 3],
        });
        bag.booking.procedures = vec![Procedure {
            id: 1,
            name: "Acupuntura".into(),
        }];
        bag.booking.procedure = Some(Procedure {
            id: 1,
            name: "Acupuntura".into(),
        });
        bag.booking.date = Some("25/06/2026".into());
        bag
    }

    #[test]
    fn procedure_change_represents_surviving_catalog() {
        let outcome = apply(Intent::ChangeProcedure, Stage::ChooseDate, bag_with_catalog());
        assert_eq!(outcome.next, Stage::ChooseProcedure);
        assert!(outcome.reply.contains("Acupuntura"));
        assert!(outcome.bag.booking.procedure.is_none());
        assert!(outcome.bag.booking.date.is_none());
    }

    #[test]
    fn procedure_change_without_catalog_degrades_to_facility() {
        let outcome = apply(Intent::ChangeProcedure, Stage::ChooseDate, DataBag::default());
        assert_eq!(outcome.next, Stage::ChooseFacility);
    }

    #[test]
    fn help_remembers_where_to_return() {
        let outcome = apply(Intent::RequestHelp, Stage::ChooseDate, DataBag::default());
        assert_eq!(outcome.next, Stage::HelpMenu);
        assert_eq!(outcome.bag.help_return, Some(Stage::ChooseDate));

        // Asking for help from the help menu does not loop the return.
        let outcome = apply(Intent::RequestHelp, Stage::HelpMenu, outcome.bag);
        assert_eq!(outcome.bag.help_return, Some(Stage::ChooseDate));
    }

    #[test]
    fn cancel_closes_the_conversation() {
        let outcome = apply(Intent::Cancel, Stage::ConfirmBooking, bag_with_catalog());
        assert_eq!(outcome.next, Stage::Closed);
        assert!(outcome.reply.contains("cancelado"));
    }
}
