//! Decides whether an automated answer may be sent or a human must reply.

use std::fmt;

use crate::text;

/// With retrieved context this confidence is enough regardless of threshold.
pub const CONTEXT_CONFIDENCE: f32 = 0.65;

/// Below this, legally sensitive questions always go to an operator.
pub const HIGH_STAKES_CONFIDENCE: f32 = 0.75;

/// The rule that produced an escalation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationRule {
    Pleasantry,
    ContextBacked,
    HighStakes,
    AboveThreshold,
    BelowThreshold,
}

impl EscalationRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationRule::Pleasantry => "pleasantry",
            EscalationRule::ContextBacked => "context_backed",
            EscalationRule::HighStakes => "high_stakes",
            EscalationRule::AboveThreshold => "above_threshold",
            EscalationRule::BelowThreshold => "below_threshold",
        }
    }
}

impl fmt::Display for EscalationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationDecision {
    pub escalate: bool,
    pub rule: EscalationRule,
}

/// Evaluate the rules in priority order; the first match decides.
pub fn evaluate(
    question: &str,
    confidence: f32,
    threshold: f32,
    context_available: bool,
) -> EscalationDecision {
    let decide = |escalate, rule| EscalationDecision { escalate, rule };

    if text::is_pleasantry(question) {
        return decide(false, EscalationRule::Pleasantry);
    }
    if context_available && confidence >= CONTEXT_CONFIDENCE {
        return decide(false, EscalationRule::ContextBacked);
    }
    if confidence < HIGH_STAKES_CONFIDENCE && text::is_high_stakes(question) {
        return decide(true, EscalationRule::HighStakes);
    }
    if confidence >= threshold {
        return decide(false, EscalationRule::AboveThreshold);
    }
    decide(true, EscalationRule::BelowThreshold)
}

pub fn should_escalate(
    question: &str,
    confidence: f32,
    threshold: f32,
    context_available: bool,
) -> bool {
    evaluate(question, confidence, threshold, context_available).escalate
}
