use std::sync::Arc;

use crate::domain::{Answer, FilteredContext, Grounding, PipelineError, Query};

use super::backoff::BackoffController;
use super::capabilities::{CompletionRequest, LanguageModel};

/// Canonical reply when the context lacks what the question needs.
pub const INSUFFICIENT_ANSWER: &str = "Insufficient information in the cluster data.";

/// Reply when the snapshot holds no records at all; produced without a model call.
pub const NO_DATA_ANSWER: &str = "No relevant data was found in the cluster.";

const ANSWER_INSTRUCTION: &str = "You answer questions about a Kubernetes cluster using ONLY the \
JSON cluster data in the user message. Follow these rules strictly:
1. Use only facts present in the cluster data. Never use outside knowledge and never guess.
2. If the cluster data does not contain what is needed, reply exactly: Insufficient information in the cluster data.
3. For counts, reply with the number only.
4. For status questions, reply with the status word only.
5. For lists of names, reply with the names separated by commas.
6. Otherwise reply with one short sentence.
7. Secret values are never part of the cluster data. If asked for one, reply with the sentence from rule 2.
8. A kind with an \"omitted\" count lists only some of its items; \"total\" counts all of them.
9. \"status_counts\" tallies every record of a kind by phase (readiness for nodes), omitted ones included. Use it for counts.
10. Never include explanations, quotes or brackets.";

/// Produces a short answer grounded in the filtered context.
pub struct AnswerSynthesizer {
    model: Arc<dyn LanguageModel>,
    temperature: f32,
    max_tokens: u32,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model,
            temperature,
            max_tokens,
        }
    }

    /// `data` is the serialized form of `context`, encoded once by the caller.
    pub fn synthesize(
        &self,
        query: &Query,
        context: &FilteredContext,
        data: &str,
        backoff: &BackoffController,
    ) -> Result<Answer, PipelineError> {
        if context.has_no_records() {
            return Ok(Answer::new(NO_DATA_ANSWER, Grounding::NoData));
        }

        let request = CompletionRequest {
            system: ANSWER_INSTRUCTION.to_string(),
            user: format!("Cluster data (JSON):\n{data}\n\nQuestion: {query}"),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let raw = backoff.call("answer", || self.model.complete(&request))?;
        Ok(normalize_answer(&raw))
    }
}

/// Trim decoration the instruction forbids and map insufficiency replies onto the canonical
/// sentence.
pub fn normalize_answer(raw: &str) -> Answer {
    let mut text = raw
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '[' | ']' | '{' | '}'))
        .trim();
    if !text.contains(char::is_whitespace) {
        text = text.trim_end_matches('.');
    }

    let lowered = text.to_lowercase();
    if text.is_empty() || lowered.contains("insufficient information") {
        return Answer::new(INSUFFICIENT_ANSWER, Grounding::InsufficientContext);
    }
    Answer::new(text, Grounding::Grounded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::backoff::BackoffPolicy;
    use crate::application::services::projection::ProjectionFilter;
    use crate::application::services::testing::{
        leaky_responder, pod, secret, RecordingObserver, RecordingSleeper, ScriptedModel,
        SECRET_PAYLOAD,
    };
    use crate::domain::{BackendError, RawResourceSet, ResourceKind, ResourceRecord};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn backoff() -> BackoffController {
        BackoffController::new(
            BackoffPolicy::new(3, Duration::from_millis(10)),
            Arc::new(RecordingSleeper::default()),
            Arc::new(RecordingObserver::default()),
        )
    }

    fn context(resources: Vec<(ResourceKind, Vec<ResourceRecord>)>) -> FilteredContext {
        bounded_context(ProjectionFilter::default(), resources)
    }

    fn bounded_context(
        filter: ProjectionFilter,
        resources: Vec<(ResourceKind, Vec<ResourceRecord>)>,
    ) -> FilteredContext {
        let kinds: Vec<ResourceKind> = resources.iter().map(|(kind, _)| *kind).collect();
        let snapshot =
            RawResourceSet::from_parts(None, resources.into_iter().collect(), BTreeMap::new());
        filter.filter(&snapshot, &kinds)
    }

    fn ask(
        synthesizer: &AnswerSynthesizer,
        question: &str,
        context: &FilteredContext,
    ) -> Result<Answer, PipelineError> {
        let data = context.to_json().unwrap();
        synthesizer.synthesize(&Query::parse(question).unwrap(), context, &data, &backoff())
    }

    #[test]
    fn test_empty_context_answers_without_model_call() {
        let model = Arc::new(ScriptedModel::replying([Ok("42".to_string())]));
        let synthesizer = AnswerSynthesizer::new(model.clone(), 0.1, 64);

        let answer = ask(
            &synthesizer,
            "How many pods are running?",
            &context(vec![(ResourceKind::Pod, Vec::new())]),
        )
        .unwrap();

        assert_eq!(answer.text, NO_DATA_ANSWER);
        assert_eq!(answer.grounding, Grounding::NoData);
        assert!(model.requests().is_empty());
    }

    #[test]
    fn test_prompt_carries_context_and_question() {
        let model = Arc::new(ScriptedModel::replying([Ok(" \"1\" ".to_string())]));
        let synthesizer = AnswerSynthesizer::new(model.clone(), 0.1, 64);

        let answer = ask(
            &synthesizer,
            "How many pods are running?",
            &context(vec![(ResourceKind::Pod, vec![pod("default", "web", "Running")])]),
        )
        .unwrap();

        assert_eq!(answer, Answer::new("1", Grounding::Grounded));
        let request = &model.requests()[0];
        assert!(request.system.contains("ONLY"));
        assert!(request.user.contains("\"phase\":\"Running\""));
        assert!(request.user.ends_with("Question: How many pods are running?"));
    }

    #[test]
    fn test_secret_value_question_never_leaks() {
        let model = Arc::new(ScriptedModel::default().with_responder(leaky_responder));
        let synthesizer = AnswerSynthesizer::new(model.clone(), 0.1, 64);

        let answer = ask(
            &synthesizer,
            "What is the password stored in secret db-credentials?",
            &context(vec![(ResourceKind::Secret, vec![secret("shop", "db-credentials")])]),
        )
        .unwrap();

        assert_eq!(answer.grounding, Grounding::InsufficientContext);
        assert!(!answer.text.contains(SECRET_PAYLOAD));
        assert!(!model.requests()[0].user.contains(SECRET_PAYLOAD));
    }

    #[test]
    fn test_question_about_excluded_resource_is_insufficient() {
        let model = Arc::new(ScriptedModel::default().with_responder(leaky_responder));
        let synthesizer = AnswerSynthesizer::new(model, 0.1, 64);

        let answer = ask(
            &synthesizer,
            "Which image does the payments deployment run?",
            &context(vec![(ResourceKind::Pod, vec![pod("default", "web", "Running")])]),
        )
        .unwrap();

        assert_eq!(answer.text, INSUFFICIENT_ANSWER);
    }

    #[test]
    fn test_backend_failure_surfaces() {
        let model = Arc::new(ScriptedModel::replying([Err(BackendError::rejected("400"))]));
        let synthesizer = AnswerSynthesizer::new(model, 0.1, 64);

        let err = ask(
            &synthesizer,
            "How many pods?",
            &context(vec![(ResourceKind::Pod, vec![pod("default", "web", "Running")])]),
        )
        .unwrap_err();

        assert!(matches!(err, PipelineError::BackendUnavailable(_)));
    }

    #[test]
    fn test_truncated_context_is_not_reported_as_empty() {
        let model = Arc::new(ScriptedModel::replying([Ok("5".to_string())]));
        let synthesizer = AnswerSynthesizer::new(model.clone(), 0.1, 64);
        let pods: Vec<ResourceRecord> = (0..5)
            .map(|i| pod("shop", &format!("web-{i}"), "Running"))
            .collect();
        let context = bounded_context(ProjectionFilter::new(40), vec![(ResourceKind::Pod, pods)]);
        assert_eq!(context.record_count(), 0);

        let answer = ask(&synthesizer, "How many pods are running?", &context).unwrap();

        assert_eq!(answer, Answer::new("5", Grounding::Grounded));
        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].user.contains(r#""status_counts":{"Running":5}"#));
    }

    #[test]
    fn test_prompt_data_is_passed_through_verbatim() {
        let model = Arc::new(ScriptedModel::replying([Ok("1".to_string())]));
        let synthesizer = AnswerSynthesizer::new(model.clone(), 0.1, 64);
        let context = context(vec![(ResourceKind::Pod, vec![pod("default", "web", "Running")])]);
        let data = context.to_json().unwrap();

        synthesizer
            .synthesize(
                &Query::parse("How many pods?").unwrap(),
                &context,
                &data,
                &backoff(),
            )
            .unwrap();

        let user = &model.requests()[0].user;
        assert!(user.starts_with(&format!("Cluster data (JSON):\n{data}\n\n")));
    }

    #[test]
    fn test_normalize_answer() {
        assert_eq!(normalize_answer("3."), Answer::new("3", Grounding::Grounded));
        assert_eq!(
            normalize_answer("[default, kube-system]"),
            Answer::new("default, kube-system", Grounding::Grounded)
        );
        assert_eq!(
            normalize_answer("The api deployment has 2 ready replicas."),
            Answer::new(
                "The api deployment has 2 ready replicas.",
                Grounding::Grounded
            )
        );
        assert_eq!(
            normalize_answer("   "),
            Answer::new(INSUFFICIENT_ANSWER, Grounding::InsufficientContext)
        );
        assert_eq!(
            normalize_answer("insufficient information in the cluster data"),
            Answer::new(INSUFFICIENT_ANSWER, Grounding::InsufficientContext)
        );
    }
}
