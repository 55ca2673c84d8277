//! Intent classification: ordered keyword fast path, LLM fallback.
//!
//! Flow:
//! 1. Keyword table (no LLM) → first matching intent wins
//! 2. LLM call with a fixed prompt → label validated against the closed set
//! 3. Invalid or failed LLM answer → `Handoff` (scheduling sub-intent: `Book`)

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::NinaConfig;
use crate::llm::LlmProvider;
use crate::nina::faq::FAQ_KEYWORDS;
use crate::nina::keywords::KeywordTable;
use crate::nina::response::{Intent, SchedulingSubIntent};

static GREETING_PATTERNS: &[&str] = &[
    r"^\s*(oi+e?|ol[aá]|opa|e a[ií]|bom dia|boa tarde|boa noite|hey|hello)(,? nina)?[\s,!.]*(tudo bem|tudo bom|como vai)?[\s!.?]*$",
];

static HANDOFF_PATTERNS: &[&str] = &[
    r"\bdor(es)?\b",
    r"sintoma",
    r"passando mal",
    r"enjoo",
    r"n[aá]usea",
    r"alergia",
    r"reclama",
    r"insatisfeit",
    r"falar com (a|o) (nutricionista|doutora|doutor|dra|dr)",
    r"falar com (um|uma|algu[eé]m) (humano|pessoa|atendente)",
    r"\batendente\b",
    r"\bhumano\b",
];

/// FAQ questions that name the consultation itself. Checked before the
/// scheduling vocabulary; every other FAQ keyword is checked after it, so a
/// booking request that mentions "online" or "exames" still books.
static FAQ_QUESTION_PATTERNS: &[&str] = &[
    r"quanto custa",
    r"qual (é |e )?o valor",
    r"valor da consulta",
    r"pre[cç]o",
    r"quanto tempo dura",
    r"dura[cç][aã]o da consulta",
    r"consulta (é|e) (online|on-line)",
    r"\b(atende|atendem|fazem?)\b.*\b(online|on-line)\b",
];

static SCHEDULING_PATTERNS: &[&str] = &[
    r"agendar",
    r"agendamento",
    r"\bmarcar\b",
    r"remarcar",
    r"reagendar",
    r"desmarcar",
    r"cancelar",
    r"hor[aá]rio",
    r"disponibilidade",
    r"dispon[ií]ve(l|is)",
    r"\bconsulta\b",
    r"\bretorno\b",
];

static DIET_PATTERNS: &[&str] = &[
    r"\bcomer\b",
    r"posso (comer|tomar|beber|trocar|substituir)",
    r"substitu",
    r"por[cç][aã]o",
    r"por[cç][oõ]es",
    r"\bdieta\b",
    r"card[aá]pio",
    r"plano alimentar",
    r"refei[cç]",
    r"caf[eé] da manh[aã]",
    r"almo[cç]o",
    r"\bjantar\b",
    r"\blanche",
    r"\bceia\b",
    r"aliment",
    r"quantidade",
];

static RESCHEDULE_PATTERNS: &[&str] = &[
    r"remarcar",
    r"reagendar",
    r"mudar (o |a |meu |minha )?(hor[aá]rio|data|consulta)",
    r"trocar (o |de |meu )?hor[aá]rio",
    r"outro hor[aá]rio",
    r"\badiar\b",
];

static CANCEL_PATTERNS: &[&str] = &[
    r"cancelar",
    r"cancelamento",
    r"desmarcar",
    r"n[aã]o vou (poder )?(ir|comparecer)",
];

static AVAILABILITY_PATTERNS: &[&str] = &[
    r"disponibilidade",
    r"dispon[ií]ve(l|is)",
    r"quais (s[aã]o )?(os )?hor[aá]rios",
    r"tem hor[aá]rio",
    r"\bvagas?\b",
    r"agenda livre",
];

static BOOK_PATTERNS: &[&str] = &[
    r"agendar",
    r"agendamento",
    r"\bmarcar\b",
    r"nova consulta",
    r"quero (uma )?consulta",
];

const CLASSIFY_SYSTEM_PROMPT: &str = "Você classifica mensagens de pacientes de uma clínica de nutrição.\n\
Responda APENAS com um dos rótulos abaixo, sem pontuação nem explicação:\n\
- greeting: cumprimentos e saudações\n\
- scheduling: agendar, remarcar, cancelar ou consultar horários\n\
- diet_question: dúvidas sobre o plano alimentar, alimentos, substituições, porções\n\
- faq: preço, endereço, preparo, duração ou atendimento online\n\
- handoff: sintomas, questões médicas, reclamações ou pedido para falar com a nutricionista\n\
- off_topic: assuntos sem relação com a clínica\n\
- dangerous: conteúdo perigoso ou ilegal";

const SUB_INTENT_SYSTEM_PROMPT: &str = "Você classifica pedidos de agendamento de uma clínica de nutrição.\n\
Responda APENAS com um dos rótulos abaixo, sem pontuação nem explicação:\n\
- book: marcar uma nova consulta\n\
- reschedule: mudar a data ou o horário de uma consulta existente\n\
- cancel: cancelar uma consulta existente\n\
- check_availability: apenas saber quais horários estão livres";

/// Two-stage classifier.
pub struct IntentClassifier {
    llm: Arc<dyn LlmProvider>,
    intents: KeywordTable<Intent>,
    sub_intents: KeywordTable<SchedulingSubIntent>,
    temperature: f32,
    max_tokens: u32,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &NinaConfig) -> Self {
        Self {
            llm,
            intents: default_intent_table(),
            sub_intents: KeywordTable::from_entries(&[
                (SchedulingSubIntent::Reschedule, RESCHEDULE_PATTERNS),
                (SchedulingSubIntent::Cancel, CANCEL_PATTERNS),
                (SchedulingSubIntent::CheckAvailability, AVAILABILITY_PATTERNS),
                (SchedulingSubIntent::Book, BOOK_PATTERNS),
            ]),
            temperature: config.classifier_temperature,
            max_tokens: config.classifier_max_tokens,
        }
    }

    /// Keyword fast path only.
    pub fn match_keywords(&self, message: &str) -> Option<Intent> {
        self.intents.first_match(message)
    }

    /// Classify a message into a top-level intent.
    pub async fn classify(&self, message: &str) -> Intent {
        let text = message.trim();
        if text.is_empty() {
            return Intent::Greeting;
        }

        if let Some(intent) = self.match_keywords(text) {
            debug!(intent = intent.as_str(), source = "keywords", "Classified message");
            return intent;
        }

        match self
            .llm
            .complete_prompt(CLASSIFY_SYSTEM_PROMPT, text, self.temperature, self.max_tokens)
            .await
        {
            Ok(raw) => match parse_label::<Intent>(&raw) {
                Some(intent) => {
                    info!(intent = intent.as_str(), source = "llm", "Classified message");
                    intent
                }
                None => {
                    warn!(raw_response = %raw, "Unrecognized intent label, defaulting to handoff");
                    Intent::Handoff
                }
            },
            Err(e) => {
                warn!(error = %e, "Intent classification failed, defaulting to handoff");
                Intent::Handoff
            }
        }
    }

    /// Disambiguate a scheduling message.
    pub async fn classify_scheduling_sub_intent(&self, message: &str) -> SchedulingSubIntent {
        let text = message.trim();
        if let Some(sub) = self.sub_intents.first_match(text) {
            debug!(sub_intent = sub.as_str(), source = "keywords", "Classified scheduling request");
            return sub;
        }

        match self
            .llm
            .complete_prompt(SUB_INTENT_SYSTEM_PROMPT, text, self.temperature, self.max_tokens)
            .await
        {
            Ok(raw) => parse_label::<SchedulingSubIntent>(&raw).unwrap_or_else(|| {
                warn!(raw_response = %raw, "Unrecognized sub-intent label, defaulting to book");
                SchedulingSubIntent::Book
            }),
            Err(e) => {
                warn!(error = %e, "Sub-intent classification failed, defaulting to book");
                SchedulingSubIntent::Book
            }
        }
    }
}

/// Ordered intent table.
///
/// Price, duration and format questions about the consultation precede
/// scheduling; the remaining FAQ topics follow it.
fn default_intent_table() -> KeywordTable<Intent> {
    let faq_patterns = FAQ_KEYWORDS
        .iter()
        .flat_map(|(_, keywords)| keywords.iter().map(|k| regex::escape(k)));

    KeywordTable::new()
        .with(Intent::Greeting, GREETING_PATTERNS.iter().copied())
        .with(Intent::Handoff, HANDOFF_PATTERNS.iter().copied())
        .with(Intent::Faq, FAQ_QUESTION_PATTERNS.iter().copied())
        .with(Intent::Scheduling, SCHEDULING_PATTERNS.iter().copied())
        .with(Intent::Faq, faq_patterns)
        .with(Intent::DietQuestion, DIET_PATTERNS.iter().copied())
}

/// Extract a label from a free-text model answer.
///
/// Accepts surrounding whitespace, quotes, punctuation and case differences;
/// anything else is rejected.
fn parse_label<T: std::str::FromStr>(raw: &str) -> Option<T> {
    let token = raw.split_whitespace().next()?;
    let cleaned: String = token
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
        .to_lowercase();
    cleaned.parse().ok()
}
