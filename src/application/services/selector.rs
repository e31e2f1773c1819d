use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::domain::{KindSelection, PipelineError, Query, ResourceKind};

use super::backoff::BackoffController;
use super::capabilities::{CompletionRequest, LanguageModel};

/// Builds the classifier instruction from the kind catalog.
pub fn selector_instruction() -> String {
    let mut system = String::from(
        "You route questions about a Kubernetes cluster to the data needed to answer them.\n\
         Available resource kinds:\n",
    );
    for kind in ResourceKind::ALL {
        system.push_str(&format!("- {}: {}\n", kind.as_str(), kind.description()));
    }
    system.push_str(
        "\nReply with the minimal comma-separated list of kind ids from the list above that is \
         needed to answer the question, or `all` if the question is about the whole cluster.\n\
         If the question is about exactly one namespace, append `namespace=<name>`.\n\
         Reply with nothing else.",
    );
    system
}

/// Chooses which resource kinds a query needs through a constrained classification call.
pub struct ResourceSelector {
    model: Arc<dyn LanguageModel>,
    temperature: f32,
    max_tokens: u32,
}

impl ResourceSelector {
    pub fn new(model: Arc<dyn LanguageModel>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model,
            temperature,
            max_tokens,
        }
    }

    pub fn select(
        &self,
        query: &Query,
        backoff: &BackoffController,
    ) -> Result<KindSelection, PipelineError> {
        let request = CompletionRequest {
            system: selector_instruction(),
            user: query.as_str().to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let output = backoff.call("select", || self.model.complete(&request))?;
        debug!(target: "kubequery::selector", output = %output.trim(), "classifier output");
        Ok(parse_selection(&output))
    }
}

/// Validate classifier output against the kind catalog.
///
/// Tokens outside the catalog are discarded. When nothing usable remains the maximal
/// selection is returned with its fallback flag set.
pub fn parse_selection(output: &str) -> KindSelection {
    let mut kinds = BTreeSet::new();
    let mut namespace = None;
    let mut wants_all = false;

    for piece in output.split([',', ';', '\n', '|']) {
        let piece = clean_token(piece);
        if piece.is_empty() {
            continue;
        }
        if let Some(raw_ns) = piece
            .strip_prefix("namespace=")
            .or_else(|| piece.strip_prefix("namespace:"))
        {
            namespace = valid_namespace(clean_token(raw_ns));
            continue;
        }
        if piece.eq_ignore_ascii_case("all") {
            wants_all = true;
            continue;
        }
        match piece.parse::<ResourceKind>() {
            Ok(kind) => {
                kinds.insert(kind);
            }
            // Prose such as "pods and services": try word by word, skipping two-letter
            // short names that collide with English ("no", "po").
            Err(_) => kinds.extend(
                piece
                    .split_whitespace()
                    .map(clean_token)
                    .filter(|word| word.len() > 2)
                    .filter_map(|word| word.parse::<ResourceKind>().ok()),
            ),
        }
    }

    let selection = if wants_all {
        KindSelection::all()
    } else {
        KindSelection::of(kinds)
    };
    selection.with_namespace(namespace)
}

fn clean_token(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("- ")
        .trim_matches(|c: char| matches!(c, '`' | '"' | '\'' | '[' | ']' | '.' | '*' | '(' | ')'))
        .trim()
}

/// Accept only RFC 1123 labels, the format Kubernetes requires for namespace names.
fn valid_namespace(raw: &str) -> Option<String> {
    let name = raw.to_ascii_lowercase();
    let well_formed = (1..=63).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    well_formed.then_some(name)
}
