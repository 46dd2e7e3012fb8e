//! Domain gate: accept, ask for clarification, or reject
//!
//! Stateless. The decision depends only on the lexical signals of the query
//! and the best retrieval score, against two configurable thresholds.

use crate::config::GateConfig;
use crate::lexicon::{QuerySignals, Slot};
use serde::Serialize;

/// Maximum clarifying questions returned at once
pub const MAX_QUESTIONS: usize = 3;

/// Missing slots at which a query counts as broad
const BROAD_MISSING_SLOTS: usize = 2;

/// Outcome of the gate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Accept,
    Clarify {
        missing_slots: Vec<Slot>,
        questions: Vec<String>,
    },
    Reject,
}

impl GateDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateDecision::Accept => "accept",
            GateDecision::Clarify { .. } => "clarify",
            GateDecision::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DomainGate {
    weak_threshold: f32,
    strong_threshold: f32,
}

impl DomainGate {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            weak_threshold: config.weak_threshold,
            strong_threshold: config.strong_threshold,
        }
    }

    /// Evaluate the rules in order; the first that applies decides.
    pub fn evaluate(&self, signals: &QuerySignals, max_score: f32) -> GateDecision {
        if signals.is_definition && signals.has_domain_hint() {
            return GateDecision::Accept;
        }

        if !signals.has_domain_hint() && max_score < self.weak_threshold {
            return GateDecision::Reject;
        }

        let missing = signals.missing_slots();
        if missing.len() >= BROAD_MISSING_SLOTS && max_score < self.strong_threshold {
            let questions = missing.iter().take(MAX_QUESTIONS).map(|s| question_for(*s).to_string()).collect();
            return GateDecision::Clarify {
                missing_slots: missing,
                questions,
            };
        }

        GateDecision::Accept
    }
}

fn question_for(slot: Slot) -> &'static str {
    match slot {
        Slot::Product => {
            "¿Sobre qué producto o tipo de alimento es la consulta (por ejemplo carnes, lácteos, quesos o verduras)?"
        }
        Slot::Sector => "¿En qué sector o área ocurre (cámara, depósito, góndola, cocina, comedor)?",
        Slot::Stage => {
            "¿En qué etapa del proceso estás (recepción, almacenamiento, elaboración, fraccionado, exhibición)?"
        }
        Slot::Parameter => {
            "¿Qué parámetro necesitás controlar (temperatura, tiempo, concentración de sanitizante)?"
        }
    }
}
