//! User-facing reply builders shared by handlers and redirects
//!
//! WhatsApp-flavored formatting: `*bold*` markers, numbered options,
//! one emoji per prompt at most.

use crate::session::types::{DataBag, PatientRecord, Procedure, Professional, Shift, Slot};
use std::collections::BTreeMap;

pub fn start_menu(patient: Option<&PatientRecord>) -> String {
    let greeting = match patient {
        Some(p) => format!("Olá, {}! 😊", p.first_name()),
        None => "Olá! 😊".to_string(),
    };
    format!(
        "{greeting} Sou o assistente virtual da clínica.\n\
         Posso te ajudar a *agendar* uma consulta, informar os *convênios* aceitos \
         ou o *endereço* das unidades. O que você precisa?"
    )
}

pub fn facility_menu() -> String {
    "🏥 *Para qual unidade deseja agendar?*\n*1.* Vieiralves\n*2.* São José".to_string()
}

pub fn procedure_list(procedures: &[Procedure]) -> String {
    let mut out = String::from("Qual *procedimento* você deseja agendar?\n");
    for (i, p) in procedures.iter().enumerate() {
        out.push_str(&format!("*{}.* {}\n", i + 1, p.name));
    }
    out.push_str("\nResponda com o número ou o nome.");
    out
}

pub fn date_prompt() -> String {
    "📅 Para qual *data* deseja agendar? (formato DD/MM ou DD/MM/AAAA)".to_string()
}

pub fn professional_list(professionals: &[Professional]) -> String {
    let mut out = String::from("Com qual *profissional* você prefere?\n*0.* Sem preferência\n");
    for (i, p) in professionals.iter().enumerate() {
        out.push_str(&format!("*{}.* {}\n", i + 1, p.name));
    }
    out
}

pub fn shift_menu(shift_slots: &BTreeMap<Shift, Vec<Slot>>) -> String {
    let mut out = String::from("Qual *turno* fica melhor para você?\n");
    for (i, (shift, slots)) in shift_slots.iter().enumerate() {
        out.push_str(&format!(
            "*{}.* {} ({} horários)\n",
            i + 1,
            shift.label(),
            slots.len()
        ));
    }
    out
}

pub fn slot_list(shift: Shift, slots: &[Slot]) -> String {
    let mut out = format!("Horários disponíveis no turno *{}*:\n", shift.label());
    for (i, s) in slots.iter().enumerate() {
        out.push_str(&format!("*{}.* {} às {}", i + 1, s.start, s.end));
        if let Some(name) = &s.professional_name {
            out.push_str(&format!(" — {name}"));
        }
        out.push('\n');
    }
    out.push_str("\nResponda com o número do horário.");
    out
}

pub fn help_menu() -> String {
    "Claro, estou aqui para ajudar! O que você gostaria de fazer?\n\
     *1.* Continuar de onde parei\n\
     *2.* Recomeçar o agendamento\n\
     *3.* Ver convênios aceitos\n\
     *4.* Ver endereços das unidades\n\
     *5.* Encerrar atendimento"
        .to_string()
}

pub fn confirm_question() -> String {
    "Posso *confirmar* o agendamento?\n*1.* Sim\n*2.* Não".to_string()
}

pub fn revision_menu() -> String {
    "Sem problemas! Me diga o que deseja alterar: *unidade*, *procedimento*, \
     *data* ou *profissional* — ou diga *cancelar* para desistir."
        .to_string()
}

pub fn feedback_prompt() -> String {
    "Antes de ir, como você avalia nosso atendimento?\n\
     *1.* Ótimo\n*2.* Bom\n*3.* Regular\n*4.* Ruim"
        .to_string()
}

pub fn farewell() -> String {
    "Atendimento encerrado. Quando precisar, é só mandar um *oi*! 👋".to_string()
}

pub fn cancelled() -> String {
    "Tudo bem, agendamento cancelado. Quando quiser retomar, é só mandar um *oi*! 👋".to_string()
}

pub fn summary(bag: &DataBag, insurance_name: &str) -> String {
    let booking = &bag.booking;
    let patient_name = bag
        .patient
        .as_ref()
        .map_or("—".to_string(), |p| p.name.clone());
    let facility = booking
        .facility
        .as_ref()
        .map_or("—".to_string(), |f| f.name.clone());
    let procedure = booking
        .procedure
        .as_ref()
        .map_or("—".to_string(), |p| p.name.clone());
    let date = booking.date.clone().unwrap_or_else(|| "—".to_string());
    let professional = booking
        .professional
        .as_ref()
        .map(|p| p.name.clone())
        .or_else(|| {
            booking
                .slot
                .as_ref()
                .and_then(|s| s.professional_name.clone())
        })
        .unwrap_or_else(|| "—".to_string());
    let time = booking
        .slot
        .as_ref()
        .map_or("—".to_string(), |s| format!("{} às {}", s.start, s.end));

    format!(
        "📋 *Resumo do agendamento*\n\
         Paciente: {patient_name}\n\
         Unidade: {facility}\n\
         Procedimento: {procedure}\n\
         Data: {date}\n\
         Horário: {time}\n\
         Profissional: {professional}\n\
         Convênio: {insurance_name}\n\n{}",
        confirm_question()
    )
}

/// The question a stage would ask next, rebuilt from what the bag
/// already holds. Used when resuming from the help menu.
pub fn reprompt_for(stage: super::Stage, bag: &DataBag) -> String {
    use super::Stage;
    match stage {
        Stage::Start | Stage::Closed => start_menu(bag.patient.as_ref()),
        Stage::ChooseFacility => facility_menu(),
        Stage::ChooseProcedure => procedure_list(&bag.booking.procedures),
        Stage::ChooseDate => date_prompt(),
        Stage::ChooseProfessional => professional_list(&bag.booking.professionals),
        Stage::ChooseTimeSlot => match bag.booking.shift {
            Some(shift) => {
                let slots = bag
                    .booking
                    .shift_slots
                    .get(&shift)
                    .cloned()
                    .unwrap_or_default();
                slot_list(shift, &slots)
            }
            None => shift_menu(&bag.booking.shift_slots),
        },
        Stage::ReviewSummary | Stage::ConfirmBooking => confirm_question(),
        Stage::RegistrationWizard => {
            "Vamos continuar seu pré-cadastro. Pode repetir a última resposta?".to_string()
        }
        Stage::HelpMenu => help_menu(),
        Stage::Feedback => feedback_prompt(),
    }
}
