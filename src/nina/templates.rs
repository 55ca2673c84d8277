//! Patient-facing reply texts (pt-BR).

use crate::model::{AppointmentSlot, Nutritionist, Patient};
use crate::nina::response::HandoffReason;

pub const REFUSAL: &str = "Desculpe, não posso ajudar com esse tipo de solicitação. \
Se você estiver passando por uma situação de risco, procure ajuda imediatamente: \
ligue 188 (CVV) ou 192 (SAMU).";

pub const OFF_TOPIC: &str = "Posso ajudar com agendamentos, dúvidas sobre a consulta \
ou sobre o seu plano alimentar. Sobre o que você gostaria de falar?";

pub const FAQ_NOT_FOUND: &str = "Boa pergunta! Não tenho essa informação agora, \
mas vou encaminhar para a nutricionista, que vai te responder em breve.";

pub const DIET_NOT_CONFIGURED: &str = "Ainda não tenho o seu plano alimentar cadastrado. \
Assim que a nutricionista enviar, vou poder tirar suas dúvidas sobre ele.";

pub const DIET_ERROR: &str = "Desculpe, tive um problema para consultar o seu plano alimentar. \
Vou encaminhar sua pergunta para a nutricionista.";

pub const DIET_NOT_FOUND_SUFFIX: &str =
    "Vou encaminhar sua pergunta para a nutricionista confirmar.";

pub const PATIENT_NOT_IDENTIFIED: &str = "Para continuar, preciso confirmar o seu cadastro. \
Vou pedir para a equipe da nutricionista entrar em contato com você.";

pub const NO_AVAILABLE_SLOTS: &str = "No momento não encontrei horários disponíveis nas \
próximas semanas. Vou avisar a nutricionista para encontrar um horário para você.";

pub const NOTHING_AVAILABLE_NOW: &str =
    "No momento não há horários disponíveis nas próximas semanas.";

pub const NO_APPOINTMENT_TO_CANCEL: &str =
    "Não encontrei nenhuma consulta agendada no seu nome.";

pub const CANCELLATION_KEPT: &str = "Tudo bem, sua consulta está mantida. \
Posso ajudar em algo mais?";

pub const CANCELLATION_DONE: &str = "Sua consulta foi cancelada. \
Quando quiser, é só pedir para agendar um novo horário.";

pub fn greeting(assistant: &str, nutritionist: &Nutritionist, patient: Option<&Patient>) -> String {
    let hello = match patient {
        Some(p) => format!("Olá, {}!", p.first_name()),
        None => "Olá!".to_string(),
    };
    format!(
        "{hello} Eu sou a {assistant}, assistente virtual de {}. \
         Posso ajudar com agendamentos, dúvidas sobre a consulta ou sobre o seu plano alimentar. \
         Como posso ajudar?",
        nutritionist.name
    )
}

pub fn handoff(reason: HandoffReason) -> &'static str {
    match reason {
        HandoffReason::MedicalQuestion => {
            "Entendo sua preocupação. Questões de saúde precisam da avaliação da nutricionista, \
             então vou encaminhar sua mensagem para ela. Se for urgente, procure atendimento médico."
        }
        HandoffReason::Complaint => {
            "Sinto muito pelo ocorrido. Vou encaminhar sua mensagem para a nutricionista, \
             que vai entrar em contato com você."
        }
        HandoffReason::HumanRequested => {
            "Claro! Vou avisar a nutricionista que você quer falar com ela. \
             Ela vai te responder assim que possível."
        }
        _ => "Vou encaminhar sua mensagem para a nutricionista, que vai te responder em breve.",
    }
}

/// Numbered, 1-based slot list.
pub fn slot_list(slots: &[AppointmentSlot]) -> String {
    slots
        .iter()
        .enumerate()
        .map(|(i, slot)| format!("{}. {}", i + 1, slot.formatted))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn offer_slots(slots: &[AppointmentSlot]) -> String {
    format!(
        "Tenho estes horários disponíveis:\n\n{}\n\nResponda com o número do horário que prefere.",
        slot_list(slots)
    )
}

pub fn availability(slots: &[AppointmentSlot]) -> String {
    format!(
        "Estes são os próximos horários livres:\n\n{}\n\nSe quiser agendar, é só responder com o número.",
        slot_list(slots)
    )
}

pub fn reschedule_offer(current: &str, slots: &[AppointmentSlot]) -> String {
    format!(
        "Sua consulta atual está marcada para {current}. Posso remarcar para um destes horários:\n\n{}\n\n\
         Responda com o número do novo horário.",
        slot_list(slots)
    )
}

pub fn no_slots_for_reschedule(current: &str) -> String {
    format!(
        "Sua consulta está marcada para {current}, mas não encontrei outros horários livres \
         nas próximas semanas. Vou pedir para a nutricionista verificar uma alternativa."
    )
}

pub fn no_appointment_to_reschedule() -> &'static str {
    "Não encontrei nenhuma consulta agendada para remarcar. Quer agendar uma nova consulta?"
}

pub fn confirm_cancellation(current: &str) -> String {
    format!(
        "Você tem uma consulta marcada para {current}. Confirma o cancelamento? \
         Responda \"sim\" para cancelar ou \"não\" para manter."
    )
}

pub fn invalid_selection(count: usize, slots: &[AppointmentSlot]) -> String {
    format!(
        "Não entendi sua escolha. Por favor, responda com um número de 1 a {count}:\n\n{}",
        slot_list(slots)
    )
}

pub fn slot_taken(remaining: &[AppointmentSlot]) -> String {
    format!(
        "Desculpe, esse horário acabou de ser reservado. Ainda tenho estes disponíveis:\n\n{}\n\n\
         Responda com o número do horário que prefere.",
        slot_list(remaining)
    )
}

pub fn booking_confirmed(formatted: &str) -> String {
    format!("Pronto! Sua consulta foi agendada para {formatted}. Até lá!")
}

pub fn reschedule_confirmed(formatted: &str) -> String {
    format!("Pronto! Sua consulta foi remarcada para {formatted}. Até lá!")
}

pub fn scheduling_failed(error: &str) -> String {
    format!("Desculpe, não consegui concluir o agendamento: {error}")
}

pub fn cancellation_failed(error: &str) -> String {
    format!("Desculpe, não consegui cancelar a consulta: {error}")
}

pub fn availability_failed(error: &str) -> String {
    format!("Desculpe, não consegui consultar a agenda agora: {error}")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn slot(label: &str) -> AppointmentSlot {
        AppointmentSlot {
            starts_at: Utc::now(),
            ends_at: Utc::now(),
            formatted: label.to_string(),
        }
    }

    #[test]
    fn slot_list_is_one_based_and_ordered() {
        let text = slot_list(&[slot("a"), slot("b"), slot("c")]);
        assert_eq!(text, "1. a\n2. b\n3. c");
    }

    #[test]
    fn greeting_uses_first_name_when_known() {
        let n = Nutritionist::new("Dra. Ana Lima");
        let p = Patient::new(n.id, "Maria Souza");
        let text = greeting("Nina", &n, Some(&p));
        assert!(text.starts_with("Olá, Maria!"));
        assert!(text.contains("Dra. Ana Lima"));
        assert!(greeting("Nina", &n, None).starts_with("Olá!"));
    }
}
