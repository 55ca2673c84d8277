//! Grounded answers over the patient's diet plan.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::NinaConfig;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::model::{Message, Nutritionist, Patient, Sender};
use crate::nina::response::{HandoffReason, Intent, NinaResponse};
use crate::nina::templates;

/// Phrases meaning the plan does not cover the question. Matched lower-case.
const NOT_FOUND_PHRASES: &[&str] = &[
    "não encontrei",
    "nao encontrei",
    "não consta",
    "nao consta",
    "não está no seu plano",
    "nao esta no seu plano",
    "não há informação",
    "nao ha informacao",
    "não tenho essa informação",
    "nao tenho essa informacao",
    "não está especificado",
    "nao esta especificado",
];

pub struct DietQaHandler {
    llm: Arc<dyn LlmProvider>,
    assistant_name: String,
    history_turns: usize,
    temperature: f32,
    max_tokens: u32,
}

impl DietQaHandler {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &NinaConfig) -> Self {
        Self {
            llm,
            assistant_name: config.assistant_name.clone(),
            history_turns: config.diet_history_turns,
            temperature: config.diet_temperature,
            max_tokens: config.diet_max_tokens,
        }
    }

    /// Answer `message` using only the patient's diet text.
    pub async fn answer(
        &self,
        message: &str,
        nutritionist: &Nutritionist,
        patient: Option<&Patient>,
        history: &[Message],
    ) -> NinaResponse {
        let Some(diet) = patient.and_then(Patient::diet_text) else {
            info!("No diet plan on file");
            return NinaResponse::new(Intent::DietQuestion, templates::DIET_NOT_CONFIGURED);
        };

        let request = self.build_request(message, diet, nutritionist, history);
        match self.llm.complete(request).await {
            Ok(response) => {
                let answer = response.content.trim().to_string();
                if mentions_not_found(&answer) {
                    info!("Diet plan does not cover the question, handing off");
                    NinaResponse::new(
                        Intent::DietQuestion,
                        format!("{answer}\n\n{}", templates::DIET_NOT_FOUND_SUFFIX),
                    )
                    .with_handoff(HandoffReason::DietInfoNotFound)
                } else {
                    NinaResponse::new(Intent::DietQuestion, answer)
                }
            }
            Err(e) => {
                warn!(error = %e, "Diet answer generation failed");
                NinaResponse::new(Intent::DietQuestion, templates::DIET_ERROR)
                    .with_handoff(HandoffReason::ErrorProcessingDietQuestion)
            }
        }
    }

    fn build_request(
        &self,
        message: &str,
        diet: &str,
        nutritionist: &Nutritionist,
        history: &[Message],
    ) -> CompletionRequest {
        let system = format!(
            "Você é {assistant}, assistente virtual de {nutritionist}.\n\
             Responda dúvidas do paciente usando SOMENTE as informações do plano alimentar abaixo.\n\
             Regras:\n\
             - Não invente alimentos, quantidades ou substituições que não estejam no plano\n\
             - Se a resposta não estiver no plano, responda: \"Não encontrei essa informação no seu plano alimentar.\"\n\
             - Não dê orientações médicas\n\
             - Seja breve e cordial, em português do Brasil\n\n\
             PLANO ALIMENTAR:\n{diet}",
            assistant = self.assistant_name,
            nutritionist = nutritionist.name,
        );

        let mut messages = vec![ChatMessage::system(system)];
        messages.extend(self.context_turns(message, history));
        messages.push(ChatMessage::user(message));

        CompletionRequest::new(messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }

    /// Last `history_turns` prior turns. The current message is dropped if
    /// the caller already stored it at the end of `history`.
    fn context_turns(&self, message: &str, history: &[Message]) -> Vec<ChatMessage> {
        let prior = match history.split_last() {
            Some((last, rest)) if last.sender == Sender::Patient && last.content == message => rest,
            _ => history,
        };
        let start = prior.len().saturating_sub(self.history_turns);
        prior[start..]
            .iter()
            .map(|m| match m.sender {
                Sender::Patient => ChatMessage::user(m.content.clone()),
                Sender::Assistant | Sender::Nutritionist => ChatMessage::assistant(m.content.clone()),
            })
            .collect()
    }
}

fn mentions_not_found(answer: &str) -> bool {
    let lowered = answer.to_lowercase();
    NOT_FOUND_PHRASES.iter().any(|p| lowered.contains(p))
}
