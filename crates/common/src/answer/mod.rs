//! Grounded answer assembly
//!
//! Prompt construction, post-processing of the model reply, the empty-reply
//! fallback, citation lists, the root-cause analysis template and the fixed
//! user-facing texts.

use crate::completion::ChatMessage;
use crate::retrieval::RetrievalCandidate;
use crate::text::fold;
use regex_lite::Regex;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::LazyLock;

/// Characters of retrieved text used when the model returns nothing
const FALLBACK_CONTEXT_CHARS: usize = 1200;

pub const SYSTEM_PROMPT: &str = "Sos un especialista en seguridad alimentaria en Argentina \
(BPM, POES, CAA, HACCP, cadena de frío, sanitización). Respondé en español rioplatense, \
de forma clara y accionable, usando primero el contexto provisto. Si el contexto no alcanza, \
podés completar con criterios generales del Código Alimentario Argentino y de las BPM, \
aclarando que es una guía general. No inventes números de procedimiento ni valores que no \
estén en el contexto. No ofrezcas enviar archivos ni PDFs. Si la consulta está fuera de \
seguridad alimentaria, indicá que solo respondés sobre ese tema.";

pub const DECLINE_TEXT: &str = "Solo respondo temas de **seguridad alimentaria** (BPM, POES, CAA, HACCP, \
sanitización, temperaturas, cadena de frío, etc.). Reformulá tu consulta dentro de ese alcance.";

pub const UNAVAILABLE_TEXT: &str =
    "El servicio no está disponible en este momento. Probá de nuevo en unos minutos.";

pub const EMPTY_QUERY_QUESTION: &str = "¿Cuál es tu consulta sobre seguridad alimentaria?";

const GENERIC_GUIDANCE: &str = "Guía general (CAA / BPM):\n\
- Mantené la cadena de frío: refrigerados entre 0 y 4 °C, congelados a -18 °C o menos.\n\
- Rotá la mercadería con criterio FEFO (primero en vencer, primero en salir).\n\
- Separá alimentos crudos de listos para consumo para evitar contaminación cruzada.\n\
- Registrá temperaturas y controles en las planillas correspondientes.";

/// Offers to send files the assistant cannot deliver
static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)¿?\s*(?:quer[eé]s|quieres)\s+(?:que te (?:pase|env[ií]e|mande)\s+)?el\s+pdf\s*\?")
        .expect("disallowed phrase pattern is valid")
});

/// System and user messages for a grounded answer
pub fn build_messages(query: &str, context: &[RetrievalCandidate]) -> Vec<ChatMessage> {
    let mut prompt = format!("Consulta: \"{}\"\n\n", query.trim());

    if context.is_empty() {
        prompt.push_str("Contexto: no se recuperaron fragmentos de la documentación.\n");
    } else {
        prompt.push_str("Contexto:\n");
        for (i, candidate) in context.iter().enumerate() {
            let chunk = &candidate.chunk;
            let _ = write!(prompt, "[{}] {} ({})\n{}\n\n", i + 1, chunk.title, chunk.source, chunk.text.trim());
        }
    }

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)]
}

/// Strip disallowed phrases and surrounding whitespace.
pub fn sanitize(reply: &str) -> String {
    DISALLOWED.replace_all(reply, "").trim().to_string()
}

/// Answer used when the model returned empty text
pub fn fallback_answer(context: &[RetrievalCandidate]) -> String {
    match context.first() {
        Some(candidate) => {
            let text = candidate.chunk.text.trim();
            let mut excerpt: String = text.chars().take(FALLBACK_CONTEXT_CHARS).collect();
            if excerpt.len() < text.len() {
                excerpt.push('…');
            }
            format!("Según la documentación ({}):\n\n{}", candidate.chunk.title, excerpt)
        }
        None => GENERIC_GUIDANCE.to_string(),
    }
}

/// Distinct sources of the context, in prompt order
pub fn citations(context: &[RetrievalCandidate]) -> Vec<String> {
    let mut seen = HashSet::new();
    context
        .iter()
        .map(|c| c.chunk.source.as_str())
        .filter(|s| seen.insert(*s))
        .map(str::to_string)
        .collect()
}

/// Text for a document request that matched nothing
pub fn not_found_text(suggestions: &[&str], catalog: &[&str]) -> String {
    let mut text = String::from("No encontré ese documento.");
    let (intro, titles) = if !suggestions.is_empty() {
        (" Quizás buscabas:", suggestions)
    } else if !catalog.is_empty() {
        (" Los documentos disponibles son:", catalog)
    } else {
        return format!("{} Por ahora no hay documentos publicados.", text);
    };

    text.push_str(intro);
    for title in titles {
        let _ = write!(text, "\n- {}", title);
    }
    text
}

/// Problem named when the query is about expired products on display
const EXPIRED_ON_SHELF: &str = "Productos vencidos en góndola";

/// Ishikawa categories with typical causes for retail food-safety problems
const ISHIKAWA: &[(&str, &[&str])] = &[
    (
        "Métodos / Procedimientos",
        &[
            "Retiro anticipado no aplicado según la norma interna (10 días secos y congelados, 2 días perecederos).",
            "Rotación FEFO omitida durante la reposición.",
        ],
    ),
    (
        "Mano de obra",
        &[
            "Personal sin capacitación en control de fechas y rotación.",
            "Picos de trabajo en los que se saltean los controles.",
        ],
    ),
    (
        "Materiales",
        &[
            "Rotulado interno incompleto o ilegible.",
            "Etiquetas sin fecha de apertura o de fraccionado.",
        ],
    ),
    (
        "Maquinaria / Equipos",
        &[
            "Lector o aplicación de control de fechas sin uso o con fallas.",
            "Heladeras sobrecargadas que dificultan la revisión.",
        ],
    ),
    (
        "Medio ambiente",
        &[
            "Exhibidores desordenados con fechas poco visibles.",
            "Falta de señalización de retiro anticipado.",
        ],
    ),
    (
        "Medición / Control",
        &[
            "Sin checklist diario de vencimientos por góndola o sector.",
            "Registros incompletos o sin verificación de un responsable.",
        ],
    ),
];

/// Question and answer for each step of the 5-whys chain
const FIVE_WHYS: &[(&str, &str)] = &[
    ("¿Por qué ocurrió el problema?", "Porque los productos no se retiraron a tiempo."),
    ("¿Por qué no se retiraron a tiempo?", "Porque no se hizo el control diario de vencimientos."),
    ("¿Por qué no se hizo el control diario?", "Porque la tarea no tenía horario ni responsable asignados."),
    ("¿Por qué no estaba asignada?", "Porque el procedimiento no la define y no hay checklist operativo."),
    (
        "¿Por qué el procedimiento no la define?",
        "Porque la norma de retiro anticipado no se incorporó al procedimiento ni a la capacitación.",
    ),
];

const IMMEDIATE_ACTIONS: &[&str] = &[
    "Recorrer las góndolas por sector y hacer el retiro anticipado según la norma.",
    "Señalizar y registrar cada retiro en la planilla correspondiente.",
];

const PREVENTIVE_ACTIONS: &[&str] = &[
    "Actualizar el procedimiento con el retiro anticipado y su responsable.",
    "Implementar un checklist diario con verificación del supervisor.",
    "Capacitar en CAA, BPM, FEFO y retiro anticipado.",
    "Auditar el cumplimiento cada semana.",
];

/// Structured root-cause analysis: an Ishikawa diagram followed by a
/// 5-whys chain with immediate and preventive actions.
pub fn root_cause_analysis(query: &str) -> String {
    let folded = fold(query);
    let problem = if folded.contains("vencid") && folded.contains("gondola") {
        EXPIRED_ON_SHELF
    } else {
        query.trim()
    };

    let mut text = format!(
        "Análisis de causa raíz: diagrama de Ishikawa (espina de pescado)\n**Problema:** {}\n",
        problem
    );
    for (category, causes) in ISHIKAWA {
        let _ = write!(text, "\n**{}**\n", category);
        for cause in *causes {
            let _ = writeln!(text, "- {}", cause);
        }
    }

    let _ = write!(text, "\n5 porqués (ejemplo para \"{}\")\n", problem);
    for (i, (why, because)) in FIVE_WHYS.iter().enumerate() {
        let _ = write!(text, "{}. {}\n   → {}\n", i + 1, why, because);
    }

    text.push_str("\nAcciones inmediatas\n");
    for action in IMMEDIATE_ACTIONS {
        let _ = writeln!(text, "- {}", action);
    }
    text.push_str("\nAcciones preventivas\n");
    for action in PREVENTIVE_ACTIONS {
        let _ = writeln!(text, "- {}", action);
    }
    text.trim_end().to_string()
}

/// Public location of a document under `base`
pub fn document_url(base: &str, filename: &str) -> String {
    let mut encoded = String::with_capacity(filename.len());
    for byte in filename.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => encoded.push(byte as char),
            _ => {
                let _ = write!(encoded, "%{:02X}", byte);
            }
        }
    }
    format!("{}/{}", base.trim_end_matches('/'), encoded)
}
