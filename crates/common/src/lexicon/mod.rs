//! Lexical signals extracted from a user query
//!
//! All keyword knowledge lives in one table, [`RULES`]: each entry maps a
//! pattern to a category and a weight. [`Lexicon::analyze`] normalizes the
//! query once, evaluates every rule, and folds the matches into a single
//! [`QuerySignals`] value consumed by the gate, the arbitrator and the alias
//! resolver.
//!
//! Patterns are written in natural Spanish (accents included) and normalized
//! when the lexicon is built. Terms match at word boundaries and tolerate a
//! plural suffix, so `sanitizante` also matches `sanitizantes`. Patterns are
//! therefore written in the singular.

use crate::text::{contains_term, fold, normalize};
use regex_lite::Regex;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

/// Semantic slots that make a question specific enough to answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Product,
    Sector,
    Stage,
    Parameter,
}

impl Slot {
    pub const ALL: [Slot; 4] = [Slot::Product, Slot::Sector, Slot::Stage, Slot::Parameter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Product => "product",
            Slot::Sector => "sector",
            Slot::Stage => "stage",
            Slot::Parameter => "parameter",
        }
    }
}

/// What a matching rule says about the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Category {
    /// Subject-area keyword; the weight feeds the domain score
    Domain,
    /// Definition phrasing, matched at the start of the query or after a
    /// greeting or request lead-in ("hola", "me explicás")
    Definition,
    /// Request for a root-cause analysis (Ishikawa, 5 whys)
    RootCause,
    Slot(Slot),
    FetchVerb,
    FetchNoun,
}

/// One entry of the rule table
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub pattern: &'static str,
    pub category: Category,
    pub weight: f32,
}

const fn rule(pattern: &'static str, category: Category, weight: f32) -> Rule {
    Rule { pattern, category, weight }
}

const fn domain(pattern: &'static str, weight: f32) -> Rule {
    rule(pattern, Category::Domain, weight)
}

const fn slot(pattern: &'static str, slot: Slot) -> Rule {
    rule(pattern, Category::Slot(slot), 1.0)
}

const fn definition(pattern: &'static str) -> Rule {
    rule(pattern, Category::Definition, 1.0)
}

const fn root_cause(pattern: &'static str) -> Rule {
    rule(pattern, Category::RootCause, 1.0)
}

const fn verb(pattern: &'static str) -> Rule {
    rule(pattern, Category::FetchVerb, 1.0)
}

const fn noun(pattern: &'static str) -> Rule {
    rule(pattern, Category::FetchNoun, 1.0)
}

/// The rule table
pub const RULES: &[Rule] = &[
    // Domain vocabulary: programs and regulations
    domain("bpm", 1.0),
    domain("buenas prácticas de manufactura", 1.0),
    domain("poes", 1.0),
    domain("poe", 1.0),
    domain("procedimientos operativos estandarizados de saneamiento", 1.0),
    domain("haccp", 1.0),
    domain("appcc", 1.0),
    domain("caa", 1.0),
    domain("código alimentario argentino", 1.0),
    domain("mip", 1.0),
    domain("manejo integrado de plagas", 1.0),
    domain("5s", 1.0),
    domain("manual 5s", 1.0),
    domain("pcc", 1.0),
    domain("ppro", 1.0),
    domain("punto crítico de control", 1.0),
    domain("seguridad alimentaria", 1.0),
    domain("inocuidad", 1.0),
    domain("enfermedades transmitidas por alimentos", 1.0),
    domain("fefo", 1.0),
    domain("manual de bpm", 1.0),
    domain("poes comedor", 1.0),
    // Domain vocabulary: practices
    domain("sanitizante", 1.0),
    domain("sanitización", 1.0),
    domain("desinfección", 1.0),
    domain("alérgeno", 1.0),
    domain("cadena de frío", 1.0),
    domain("trazabilidad", 1.0),
    domain("recepción de perecederos", 1.0),
    domain("contaminación cruzada", 1.0),
    domain("limpieza", 0.5),
    domain("higiene", 0.5),
    domain("freezer", 0.5),
    domain("refrigeración", 0.5),
    domain("cocción", 0.5),
    domain("temperatura", 0.5),
    domain("fraccionado", 0.5),
    domain("fraccionamiento", 0.5),
    domain("etiquetado", 0.5),
    domain("plaga", 0.5),
    domain("manipulación de alimentos", 0.5),
    // Document vocabulary counts as a weak domain cue
    domain("procedimiento", 0.25),
    domain("registro", 0.25),
    domain("planilla", 0.25),
    domain("instructivo", 0.25),
    // Definition phrasings
    definition("qué es"),
    definition("qué son"),
    definition("qué significa"),
    definition("qué quiere decir"),
    definition("a qué se refiere"),
    definition("definición de"),
    definition("definí"),
    definition("definime"),
    definition("what is"),
    definition("define"),
    // Root-cause analysis requests
    root_cause("ishikawa"),
    root_cause("espina de pescado"),
    root_cause("5 porqués"),
    root_cause("cinco porqués"),
    root_cause("5 por qué"),
    // Product
    slot("producto", Slot::Product),
    slot("alimento", Slot::Product),
    slot("carne", Slot::Product),
    slot("pollo", Slot::Product),
    slot("pescado", Slot::Product),
    slot("queso", Slot::Product),
    slot("lácteo", Slot::Product),
    slot("leche", Slot::Product),
    slot("fiambre", Slot::Product),
    slot("dulce", Slot::Product),
    slot("verdura", Slot::Product),
    slot("fruta", Slot::Product),
    slot("huevo", Slot::Product),
    slot("helado", Slot::Product),
    slot("congelado", Slot::Product),
    slot("perecedero", Slot::Product),
    slot("panificado", Slot::Product),
    // Sector or area
    slot("sector", Slot::Sector),
    slot("sucursal", Slot::Sector),
    slot("carnicería", Slot::Sector),
    slot("fiambrería", Slot::Sector),
    slot("panadería", Slot::Sector),
    slot("verdulería", Slot::Sector),
    slot("pescadería", Slot::Sector),
    slot("rotisería", Slot::Sector),
    slot("depósito", Slot::Sector),
    slot("cámara", Slot::Sector),
    slot("góndola", Slot::Sector),
    slot("heladera", Slot::Sector),
    slot("comedor", Slot::Sector),
    slot("cocina", Slot::Sector),
    // Process stage
    slot("recepción", Slot::Stage),
    slot("almacenamiento", Slot::Stage),
    slot("conservación", Slot::Stage),
    slot("descongelado", Slot::Stage),
    slot("descongelamiento", Slot::Stage),
    slot("cocción", Slot::Stage),
    slot("enfriamiento", Slot::Stage),
    slot("fraccionado", Slot::Stage),
    slot("fraccionamiento", Slot::Stage),
    slot("elaboración", Slot::Stage),
    slot("envasado", Slot::Stage),
    slot("etiquetado", Slot::Stage),
    slot("exhibición", Slot::Stage),
    slot("transporte", Slot::Stage),
    slot("limpieza", Slot::Stage),
    slot("desinfección", Slot::Stage),
    // Numeric parameter (quantities with units are matched separately)
    slot("temperatura", Slot::Parameter),
    slot("tiempo", Slot::Parameter),
    slot("concentración", Slot::Parameter),
    slot("ppm", Slot::Parameter),
    slot("ph", Slot::Parameter),
    slot("humedad", Slot::Parameter),
    slot("dosis", Slot::Parameter),
    slot("vida útil", Slot::Parameter),
    slot("vencimiento", Slot::Parameter),
    slot("grados", Slot::Parameter),
    // Document fetch: verbs
    verb("dame"),
    verb("pasame"),
    verb("pásame"),
    verb("enviame"),
    verb("envíame"),
    verb("mandame"),
    verb("mostrame"),
    verb("compartime"),
    verb("conseguime"),
    verb("abrir"),
    verb("abrí"),
    verb("descargar"),
    verb("descargá"),
    verb("bajar"),
    verb("quiero"),
    verb("necesito"),
    verb("busco"),
    verb("tenés"),
    verb("give me"),
    verb("open"),
    verb("download"),
    verb("send me"),
    // Document fetch: nouns
    noun("pdf"),
    noun("documento"),
    noun("archivo"),
    noun("manual"),
    noun("procedimiento"),
    noun("registro"),
    noun("planilla"),
    noun("instructivo"),
    noun("formulario"),
    noun("poes"),
];

/// Words that may precede a definition phrasing: greetings, courtesy and
/// "explain to me" requests. Already normalized.
const DEFINITION_LEAD_IN: &[&str] = &[
    "hola", "buenas", "buenos", "buen", "dia", "dias", "tardes", "noches", "che", "una", "consulta",
    "pregunta", "disculpa", "disculpame", "perdon", "por", "favor", "y", "entonces", "me", "te", "nos",
    "explicas", "explica", "explicame", "explicarme", "explicar", "podes", "podrias", "puedes", "decis",
    "decime", "decir", "decirme", "sabes", "quisiera", "queria", "quiero", "necesito", "saber", "contame",
];

static QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|[^0-9a-z])-?\d+(?:[.,]\d+)?\s*(?:°\s*[cf]|º\s*[cf]|grados|ppm|mg/l|mg|kg|g|ml|l|min|minutos|h|hs|horas|dias|%)(?:[^0-9a-z]|$)",
    )
    .expect("quantity pattern is valid")
});

/// Everything the lexicon recognized in one query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySignals {
    pub normalized: String,
    /// Sum of matched domain weights, capped at 1.0
    pub domain_score: f32,
    pub domain_terms: Vec<String>,
    pub is_definition: bool,
    pub slots: BTreeSet<Slot>,
    pub fetch_intent: bool,
    /// Asks for an Ishikawa diagram or a 5-whys chain
    pub root_cause: bool,
}

impl QuerySignals {
    pub fn has_domain_hint(&self) -> bool {
        self.domain_score > 0.0
    }

    pub fn slot_coverage(&self) -> usize {
        self.slots.len()
    }

    /// Missing slots in canonical order
    pub fn missing_slots(&self) -> Vec<Slot> {
        Slot::ALL.into_iter().filter(|s| !self.slots.contains(s)).collect()
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    term: String,
    category: Category,
    weight: f32,
}

/// Compiled rule table
#[derive(Debug, Clone)]
pub struct Lexicon {
    rules: Vec<CompiledRule>,
    intent_words: HashSet<String>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::new(RULES)
    }
}

impl Lexicon {
    pub fn new(rules: &[Rule]) -> Self {
        let rules: Vec<CompiledRule> = rules
            .iter()
            .map(|r| CompiledRule {
                term: normalize(r.pattern),
                category: r.category,
                weight: r.weight,
            })
            .filter(|r| !r.term.is_empty())
            .collect();

        let intent_words = rules
            .iter()
            .filter(|r| matches!(r.category, Category::FetchVerb | Category::FetchNoun))
            .flat_map(|r| r.term.split(' ').map(str::to_string).collect::<Vec<_>>())
            .collect();

        Self { rules, intent_words }
    }

    /// Evaluate every rule against `query`.
    pub fn analyze(&self, query: &str) -> QuerySignals {
        let normalized = normalize(query);

        let mut domain_score = 0.0f32;
        let mut domain_terms: Vec<String> = Vec::new();
        let mut is_definition = false;
        let mut root_cause = false;
        let mut slots = BTreeSet::new();
        let mut has_verb = false;
        let mut nouns: Vec<&str> = Vec::new();

        for rule in &self.rules {
            let matched = match rule.category {
                Category::Definition => opens_with(&normalized, &rule.term),
                _ => contains_term(&normalized, &rule.term),
            };
            if !matched {
                continue;
            }

            match rule.category {
                Category::Domain => {
                    domain_score += rule.weight;
                    if !domain_terms.contains(&rule.term) {
                        domain_terms.push(rule.term.clone());
                    }
                }
                Category::Definition => is_definition = true,
                Category::RootCause => root_cause = true,
                Category::Slot(slot) => {
                    slots.insert(slot);
                }
                Category::FetchVerb => has_verb = true,
                Category::FetchNoun => nouns.push(&rule.term),
            }
        }

        if QUANTITY.is_match(&fold(query)) {
            slots.insert(Slot::Parameter);
        }

        // "quiero saber qué es el POES" asks for a definition, not the file
        let fetch_intent = !is_definition && !nouns.is_empty() && (has_verb || nouns.contains(&"pdf"));

        QuerySignals {
            normalized,
            domain_score: domain_score.min(1.0),
            domain_terms,
            is_definition,
            slots,
            fetch_intent,
            root_cause,
        }
    }

    /// Words that express fetch intent rather than naming a document
    pub fn is_intent_word(&self, token: &str) -> bool {
        self.intent_words.contains(token)
    }
}

/// Whether `term` starts `normalized`, allowing only lead-in words before it.
fn opens_with(normalized: &str, term: &str) -> bool {
    let mut rest = normalized;
    loop {
        if rest.strip_prefix(term).is_some_and(|tail| tail.is_empty() || tail.starts_with(' ')) {
            return true;
        }
        match rest.split_once(' ') {
            Some((word, tail)) if DEFINITION_LEAD_IN.contains(&word) => rest = tail,
            _ => return false,
        }
    }
}
