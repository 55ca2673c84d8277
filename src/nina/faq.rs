//! FAQ topic matching and verbatim answers.
//!
//! Answers always come from the practice's own configured text. When a topic
//! is unknown or unanswered the reply is a handoff, never a generated answer.

use std::fmt;

use tracing::{debug, info};

use crate::model::Nutritionist;
use crate::nina::response::{HandoffReason, Intent, NinaResponse};
use crate::nina::templates;

/// Fixed FAQ categories, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaqTopic {
    Price,
    Location,
    Preparation,
    Duration,
    Online,
}

impl FaqTopic {
    /// Key under which the practice stores the answer.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Location => "location",
            Self::Preparation => "preparation",
            Self::Duration => "duration",
            Self::Online => "online",
        }
    }
}

impl fmt::Display for FaqTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Lower-case substrings per topic. First topic with any hit wins.
pub static FAQ_KEYWORDS: &[(FaqTopic, &[&str])] = &[
    (
        FaqTopic::Price,
        &[
            "preço",
            "preco",
            "quanto custa",
            "custa",
            "custo",
            "pagamento",
            "pagar",
            "plano de saúde",
            "plano de saude",
            "convênio",
            "convenio",
            "qual o valor",
            "valor da consulta",
        ],
    ),
    (
        FaqTopic::Location,
        &[
            "endereço",
            "endereco",
            "onde fica",
            "localização",
            "localizacao",
            "como chegar",
        ],
    ),
    (
        FaqTopic::Preparation,
        &["preparo", "preparar", "o que levar", "jejum", "exames"],
    ),
    (
        FaqTopic::Duration,
        &[
            "duração",
            "duracao",
            "quanto tempo dura",
            "tempo de consulta",
            "demora",
        ],
    ),
    (
        FaqTopic::Online,
        &[
            "online",
            "on-line",
            "virtual",
            "videochamada",
            "teleconsulta",
            "remot",
        ],
    ),
];

/// Keyword-to-topic resolver.
#[derive(Debug, Clone, Default)]
pub struct FaqMatcher;

impl FaqMatcher {
    pub fn new() -> Self {
        Self
    }

    /// First topic whose keyword appears in the message.
    pub fn match_topic(&self, message: &str) -> Option<FaqTopic> {
        let text = message.to_lowercase();
        FAQ_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
            .map(|(topic, _)| *topic)
    }

    /// Answer with the configured text, or hand off.
    pub fn handle(&self, message: &str, nutritionist: &Nutritionist) -> NinaResponse {
        let topic = self.match_topic(message);
        match topic.and_then(|t| nutritionist.faq_answer(t.key()).map(|answer| (t, answer))) {
            Some((topic, answer)) => {
                debug!(topic = topic.key(), "Answering FAQ from configured text");
                NinaResponse::new(Intent::Faq, answer).with_faq_key(topic.key())
            }
            None => {
                info!(
                    topic = topic.map(|t| t.key()).unwrap_or("none"),
                    "No configured FAQ answer, handing off"
                );
                let response = NinaResponse::new(Intent::Faq, templates::FAQ_NOT_FOUND)
                    .with_handoff(HandoffReason::FaqNotFound);
                match topic {
                    Some(t) => response.with_faq_key(t.key()),
                    None => response,
                }
            }
        }
    }
}
