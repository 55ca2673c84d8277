//! Deterministic safety pre-filter.
//!
//! Runs before anything else in a turn. Dangerous-content patterns are
//! checked before prompt-injection patterns, so a message matching both is
//! reported as dangerous.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::nina::keywords::KeywordTable;

/// Why a message was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    DangerousContent,
    PromptInjectionAttempt,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DangerousContent => "dangerous_content",
            Self::PromptInjectionAttempt => "prompt_injection_attempt",
        }
    }
}

/// Outcome of a guardrail check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardrailVerdict {
    pub blocked: bool,
    pub reason: Option<BlockReason>,
}

impl GuardrailVerdict {
    pub fn allowed() -> Self {
        Self {
            blocked: false,
            reason: None,
        }
    }

    pub fn blocked(reason: BlockReason) -> Self {
        Self {
            blocked: true,
            reason: Some(reason),
        }
    }
}

/// Weapons, self-harm, violence, drug trafficking and other illegal acts.
static DANGEROUS_PATTERNS: &[&str] = &[
    r"\barmas?\b",
    r"arma de fogo",
    r"\bbombas?\b",
    r"explosiv",
    r"me matar",
    r"suic[ií]d",
    r"me machucar",
    r"automutila",
    r"me cortar",
    r"quero morrer",
    r"matar (algu[eé]m|uma pessoa|ele|ela)",
    r"\bagredir\b",
    r"espancar",
    r"tr[aá]fico",
    r"(vender|comprar) drogas?",
    r"coca[ií]na",
    r"\bcrack\b",
    r"falsificar",
    r"lavagem de dinheiro",
    r"hackear",
    r"\broubar\b",
];

/// Attempts to override the assistant's instructions.
static INJECTION_PATTERNS: &[&str] = &[
    r"ignore (all )?(the )?previous instructions",
    r"ignore (as )?instru[cç][oõ]es anteriores",
    r"ignor(e|ar) (todas )?(as )?suas instru[cç][oõ]es",
    r"esque[cç]a (todas )?(as )?suas instru[cç][oõ]es",
    r"act as if",
    r"aja como se",
    r"\bfinja (que|ser)\b",
    r"pretend (to be|you are)",
    r"\[system\]",
    r"\[sistema\]",
    r"system prompt",
    r"prompt do sistema",
    r"you are now",
    r"voc[eê] agora [eé]",
    r"developer mode",
    r"modo desenvolvedor",
    r"jailbreak",
];

/// Pattern-based pre-filter. No LLM involvement.
#[derive(Debug, Clone)]
pub struct GuardrailEngine {
    rules: KeywordTable<BlockReason>,
}

impl Default for GuardrailEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardrailEngine {
    pub fn new() -> Self {
        Self {
            rules: KeywordTable::from_entries(&[
                (BlockReason::DangerousContent, DANGEROUS_PATTERNS),
                (BlockReason::PromptInjectionAttempt, INJECTION_PATTERNS),
            ]),
        }
    }

    /// Check a raw inbound message.
    pub fn check(&self, message: &str) -> GuardrailVerdict {
        match self.rules.first_match(message) {
            Some(reason) => {
                warn!(reason = reason.as_str(), "Guardrail blocked message");
                GuardrailVerdict::blocked(reason)
            }
            None => GuardrailVerdict::allowed(),
        }
    }
}
