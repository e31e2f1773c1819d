use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Answer, KindSelection, PipelineError, Query, ResourceKind};

use super::backoff::{BackoffController, BackoffPolicy};
use super::capabilities::{ClusterApi, LanguageModel, PipelineObserver, Sleeper};
use super::collector::ResourceCollector;
use super::projection::{ProjectionFilter, DEFAULT_MAX_CONTEXT_BYTES};
use super::selector::ResourceSelector;
use super::synthesizer::AnswerSynthesizer;

/// Tunables shared by every query the service runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub backoff: BackoffPolicy,
    pub max_context_bytes: usize,
    pub selector_temperature: f32,
    pub selector_max_tokens: u32,
    pub answer_temperature: f32,
    pub answer_max_tokens: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            max_context_bytes: DEFAULT_MAX_CONTEXT_BYTES,
            selector_temperature: 0.0,
            selector_max_tokens: 64,
            answer_temperature: 0.1,
            answer_max_tokens: 256,
        }
    }
}

/// Stages a query passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    Selecting,
    Collecting,
    Filtering,
    Synthesizing,
    Done,
    Failed,
}

/// Everything a caller may want to know about one answered query.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub query_id: Uuid,
    pub query: String,
    pub selection: KindSelection,
    pub answer: Answer,
    /// Kinds that could not be listed; the answer was produced without them.
    pub failed_kinds: Vec<ResourceKind>,
    pub stages: Vec<PipelineStage>,
    pub answered_at: DateTime<Utc>,
}

/// Runs select, collect, filter and synthesize for each query.
///
/// Holds no per-query state, so a single instance serves concurrent callers.
pub struct QueryService {
    selector: ResourceSelector,
    collector: ResourceCollector,
    filter: ProjectionFilter,
    synthesizer: AnswerSynthesizer,
    backoff: BackoffController,
    observer: Arc<dyn PipelineObserver>,
}

impl QueryService {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        model: Arc<dyn LanguageModel>,
        observer: Arc<dyn PipelineObserver>,
        sleeper: Arc<dyn Sleeper>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            selector: ResourceSelector::new(
                model.clone(),
                config.selector_temperature,
                config.selector_max_tokens,
            ),
            collector: ResourceCollector::new(cluster),
            filter: ProjectionFilter::new(config.max_context_bytes),
            synthesizer: AnswerSynthesizer::new(
                model,
                config.answer_temperature,
                config.answer_max_tokens,
            ),
            backoff: BackoffController::new(config.backoff, sleeper, observer.clone()),
            observer,
        }
    }

    pub fn answer(&self, raw: &str) -> Result<QueryOutcome, PipelineError> {
        let query_id = Uuid::new_v4();
        let mut stages = vec![PipelineStage::Received];
        self.observer.query_received(query_id, raw.trim());

        match self.run(query_id, raw, &mut stages) {
            Ok((query, selection, answer, failed_kinds)) => {
                stages.push(PipelineStage::Done);
                self.observer.answered(query_id, &answer);
                Ok(QueryOutcome {
                    query_id,
                    query: query.as_str().to_string(),
                    selection,
                    answer,
                    failed_kinds,
                    stages,
                    answered_at: Utc::now(),
                })
            }
            Err(err) => {
                stages.push(PipelineStage::Failed);
                debug!(target: "kubequery::pipeline", %query_id, stages = ?stages, "pipeline aborted");
                self.observer.failed(query_id, &err);
                Err(err)
            }
        }
    }

    fn run(
        &self,
        query_id: Uuid,
        raw: &str,
        stages: &mut Vec<PipelineStage>,
    ) -> Result<(Query, KindSelection, Answer, Vec<ResourceKind>), PipelineError> {
        let query = Query::parse(raw)?;

        stages.push(PipelineStage::Selecting);
        let selection = self.selector.select(&query, &self.backoff)?;
        self.observer.kinds_selected(query_id, &selection);

        stages.push(PipelineStage::Collecting);
        let snapshot = self.collector.collect(&selection)?;
        self.observer.collection_finished(query_id, &snapshot);

        stages.push(PipelineStage::Filtering);
        let kinds: Vec<ResourceKind> = selection.kinds().iter().copied().collect();
        let context = self.filter.filter(&snapshot, &kinds);
        let data = context.to_json().map_err(|err| {
            PipelineError::internal(format!("could not encode cluster data: {err}"))
        })?;
        self.observer
            .context_filtered(query_id, context.record_count(), data.len());

        stages.push(PipelineStage::Synthesizing);
        let answer = self
            .synthesizer
            .synthesize(&query, &context, &data, &self.backoff)?;

        let failed_kinds = snapshot.failures().keys().copied().collect();
        Ok((query, selection, answer, failed_kinds))
    }
}
