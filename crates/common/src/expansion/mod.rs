//! Query expansion for retrieval recall
//!
//! One raw query becomes a short, ordered list of alternate strings: the
//! original first, then one variant per matching synonym entry, then a
//! domain-context variant for very short queries. The result is deterministic
//! and bounded.

use crate::text::{contains_term, normalize};

/// Queries with at most this many words get the domain suffix variant
const SHORT_QUERY_WORDS: usize = 3;

/// Context appended to very short queries
const DOMAIN_SUFFIX: &str = "seguridad alimentaria BPM POES CAA";

/// One declarative expansion entry
#[derive(Debug, Clone, Copy)]
pub struct Synonym {
    /// Any of these (normalized, word-bounded) triggers the entry
    pub triggers: &'static [&'static str],
    /// Terms appended to the original query
    pub terms: &'static str,
}

/// Expansion table for the food-safety domain
pub const SYNONYMS: &[Synonym] = &[
    Synonym {
        triggers: &["bpm"],
        terms: "buenas prácticas de manufactura higiene manipulación",
    },
    Synonym {
        triggers: &["poe"],
        terms: "procedimientos operativos estandarizados de saneamiento limpieza desinfección",
    },
    Synonym {
        triggers: &["haccp", "appcc"],
        terms: "análisis de peligros y puntos críticos de control",
    },
    Synonym {
        triggers: &["pcc"],
        terms: "punto crítico de control límite crítico monitoreo",
    },
    Synonym {
        triggers: &["caa"],
        terms: "código alimentario argentino",
    },
    Synonym {
        triggers: &["mip", "plaga"],
        terms: "manejo integrado de plagas control de roedores e insectos",
    },
    Synonym {
        triggers: &["5s"],
        terms: "metodología 5s clasificar ordenar limpiar estandarizar",
    },
    Synonym {
        triggers: &["sanitizante", "sanitizacion", "desinfectante"],
        terms: "concentración de sanitizante ppm desinfección de superficies",
    },
    Synonym {
        triggers: &["cadena de frio", "freezer", "heladera", "refrigeracion"],
        terms: "temperatura de conservación refrigerado 0 a 4 °C congelado -18 °C",
    },
    Synonym {
        triggers: &["fefo", "vencimiento"],
        terms: "rotación de mercadería primero en vencer primero en salir",
    },
    Synonym {
        triggers: &["alergeno"],
        terms: "alérgenos declaración en rótulo contaminación cruzada",
    },
];

/// Builds alternate retrieval queries
#[derive(Debug, Clone)]
pub struct QueryExpander {
    synonyms: &'static [Synonym],
    max_expansions: usize,
}

impl QueryExpander {
    pub fn new(max_expansions: usize) -> Self {
        Self::with_table(SYNONYMS, max_expansions)
    }

    pub fn with_table(synonyms: &'static [Synonym], max_expansions: usize) -> Self {
        Self {
            synonyms,
            max_expansions: max_expansions.max(1),
        }
    }

    /// Expand `query`. The first element is always the query unmodified.
    pub fn expand(&self, query: &str) -> Vec<String> {
        let normalized = normalize(query);
        let mut out = vec![query.to_string()];

        for synonym in self.synonyms {
            if synonym.triggers.iter().any(|t| contains_term(&normalized, t)) {
                push_unique(&mut out, format!("{} {}", query, synonym.terms));
            }
        }

        let words = normalized.split(' ').filter(|w| !w.is_empty()).count();
        if words > 0 && words <= SHORT_QUERY_WORDS {
            push_unique(&mut out, format!("{} {}", query, DOMAIN_SUFFIX));
        }

        out.truncate(self.max_expansions);
        out
    }
}

fn push_unique(out: &mut Vec<String>, candidate: String) {
    if !out.contains(&candidate) {
        out.push(candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_original_query_first_and_unmodified() {
        let expander = QueryExpander::new(6);
        for q in ["¿Qué es BPM?", "clima", "  espacios  ", "cómo limpio la cortadora de fiambre"] {
            assert_eq!(expander.expand(q)[0], q);
        }
    }

    #[test]
    fn test_acronym_expands() {
        let out = QueryExpander::new(6).expand("¿Qué es BPM?");
        assert!(out.iter().any(|q| q.contains("buenas prácticas de manufactura")));
        assert!(out.iter().any(|q| q.ends_with(DOMAIN_SUFFIX)));
    }

    #[test]
    fn test_long_query_without_triggers_is_untouched() {
        let q = "cómo limpio la cortadora de fiambre";
        assert_eq!(QueryExpander::new(6).expand(q), vec![q.to_string()]);
    }

    #[test]
    fn test_bounded() {
        let q = "BPM POES HACCP CAA MIP 5s sanitizante freezer";
        let out = QueryExpander::new(6).expand(q);
        assert_eq!(out.len(), 6);
        assert_eq!(out[0], q);

        let out = QueryExpander::new(2).expand(q);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_deterministic() {
        let expander = QueryExpander::new(6);
        let q = "sanitizante en la cadena de frío";
        assert_eq!(expander.expand(q), expander.expand(q));
    }

    #[test]
    fn test_zero_limit_still_keeps_original() {
        assert_eq!(QueryExpander::new(0).expand("bpm"), vec!["bpm".to_string()]);
    }
}
