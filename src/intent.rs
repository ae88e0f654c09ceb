use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::llm::strip_code_fence;
use crate::types::{Intent, IntentKind};

pub const SYSTEM_PROMPT: &str = "You identify the intent of requests made to an academic research \
assistant. Answer strictly with the JSON object that was asked for.";

/// Build the classification prompt for one user utterance.
pub fn prompt(user_input: &str) -> String {
    format!(
        r#"Analyse the user's request and identify the intent and any parameters. Supported intents:
- search: search the literature. parameters: query (keywords), method ("scholarly" or "llm", optional).
- summarize: summarize a paper from the current list. parameters: paper_id (1-based number).
- polish: polish academic text. parameters: text.
- analyze: analyse data. parameters: data_type (e.g. descriptive).
- cite: format a citation. parameters: paper_id (1-based number), style ("apa" or "mla", default "apa"),
  validate ("true" when the user only wants the citation metadata checked for completeness).
- parseBibtex: load papers from BibTeX. parameters: bibtex (the BibTeX text, if given).
- parsePdf: extract the sections of a PDF file. parameters: path.
- analyzePdf: analyse the content of a PDF file. parameters: path.
- help: show help.
- exit: quit.
- unknown: anything else.

Return a JSON object with exactly two fields:
- intent: one of search, summarize, polish, analyze, cite, parseBibtex, parsePdf, analyzePdf, help, exit, unknown.
- parameters: an object of parameter values; {{}} when there are none.

User request: {user_input}

Return only the JSON, with no explanation."#
    )
}

/// Interpret the model's reply. Anything that is not the expected JSON
/// shape becomes `unknown` with no parameters.
pub fn parse_reply(reply: &str) -> Intent {
    let body = strip_code_fence(reply);
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, reply = body, "intent reply is not JSON");
            return Intent::unknown();
        }
    };
    let Some(kind) = value
        .get("intent")
        .and_then(Value::as_str)
        .and_then(IntentKind::from_name)
    else {
        debug!(reply = body, "intent reply has no recognised intent");
        return Intent::unknown();
    };
    let Some(params) = value.get("parameters").and_then(Value::as_object) else {
        debug!(reply = body, "intent reply has no parameter object");
        return Intent::unknown();
    };
    Intent {
        kind,
        parameters: stringify_params(params),
    }
}

fn stringify_params(params: &serde_json::Map<String, Value>) -> BTreeMap<String, String> {
    params
        .iter()
        .filter_map(|(k, v)| {
            let s = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((k.clone(), s))
        })
        .collect()
}
