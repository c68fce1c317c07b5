//! Terminal stage
//!
//! Neutral input after the conversation ended lands here. The handler
//! answers with the farewell and mutates nothing; only a greeting or a
//! restart keyword, both resolved upstream, reopens the session.

use super::{prompts, Stage, StageContext, StageOutcome};
use crate::session::types::DataBag;

pub(super) async fn handle(_ctx: &StageContext<'_>, _text: &str, bag: DataBag) -> StageOutcome {
    StageOutcome::stay(prompts::farewell(), bag, Stage::Closed)
}
