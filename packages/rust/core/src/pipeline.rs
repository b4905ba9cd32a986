//! Workflow orchestrator: one ingestion run end-to-end.
//!
//! `Idle → Extracting → Classifying → Reconciling → Persisting → Done|Failed`
//!
//! Extraction and classification fan out over a bounded worker pool; each
//! stage finishes the whole batch before the next starts. Per-item failures
//! are collected into [`WorkflowResult::errors`] in input order and never
//! abort the run. Only store failures (or cancellation) do.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use curator_classifier::Classifier;
use curator_extractor::Extractor;
use curator_shared::{
    AppConfig, Category, ClassifiedRecord, ConfidenceBand, CuratorError, ExtractedRecord,
    PipelineConfig, RawInput, Result, WorkflowResult, WorkflowState,
};
use curator_store::{CommitResult, ContentStore};

use crate::intake::{self, Candidate};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called on every state transition.
    fn phase(&self, state: WorkflowState);
    /// Called when an item finishes a stage (successfully or not).
    fn item_done(&self, url: &str, current: usize, total: usize);
    /// Called once with the final result.
    fn done(&self, result: &WorkflowResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _state: WorkflowState) {}
    fn item_done(&self, _url: &str, _current: usize, _total: usize) {}
    fn done(&self, _result: &WorkflowResult) {}
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Drives runs against one extractor, classifier and store.
///
/// Cheap to share: overlapping runs on the same `Workflow` (or on workflows
/// sharing a store) serialise their reconcile+persist step per category.
pub struct Workflow {
    extractor: Arc<Extractor>,
    classifier: Arc<Classifier>,
    store: Arc<ContentStore>,
    concurrency: usize,
    item_timeout: Duration,
}

impl Workflow {
    pub fn new(
        extractor: Arc<Extractor>,
        classifier: Arc<Classifier>,
        store: Arc<ContentStore>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            extractor,
            classifier,
            store,
            concurrency: config.concurrency.max(1) as usize,
            item_timeout: Duration::from_secs(config.item_timeout_secs),
        }
    }

    /// Wire real components from the application config.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let extractor = Extractor::from_config(&config.extractor)?;
        let classifier = Classifier::from_config(&config.classifier)?;
        let store = ContentStore::from_config(&config.store)?
            .with_call_timeout(Duration::from_secs(config.pipeline.store_timeout_secs));
        Ok(Self::new(
            Arc::new(extractor),
            Arc::new(classifier),
            Arc::new(store),
            &config.pipeline,
        ))
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Run a batch to completion.
    pub async fn run(&self, inputs: &[RawInput], progress: &dyn ProgressReporter) -> WorkflowResult {
        let (_never, cancel) = watch::channel(false);
        self.run_with_cancel(inputs, cancel, progress).await
    }

    /// Run a batch; once `cancel` reads `true` no further items are
    /// dispatched and nothing is persisted.
    #[instrument(skip_all, fields(inputs = inputs.len()))]
    pub async fn run_with_cancel(
        &self,
        inputs: &[RawInput],
        cancel: watch::Receiver<bool>,
        progress: &dyn ProgressReporter,
    ) -> WorkflowResult {
        let start = Instant::now();
        let mut run = Run {
            result: WorkflowResult::new(Uuid::now_v7().to_string()),
            progress,
        };
        let candidates = intake::collect(inputs);
        info!(run_id = %run.result.run_id, candidates = candidates.len(), "starting run");

        // --- Extracting ---
        run.transition(WorkflowState::Extracting);
        let extracted = self.extract_all(&candidates, &cancel, &mut run).await;

        // --- Classifying ---
        run.transition(WorkflowState::Classifying);
        let classified = self.classify_all(extracted, &cancel, &mut run).await;

        if *cancel.borrow() {
            warn!(run_id = %run.result.run_id, "run cancelled, nothing persisted");
            return run.fail(CuratorError::Cancelled, start);
        }

        run.result.processed_count = classified.len();
        for record in &classified {
            match record.band {
                ConfidenceBand::Unclassified => run.result.triage.push(record.url.clone()),
                ConfidenceBand::NeedsReview => run.result.needs_review.push(record.url.clone()),
                ConfidenceBand::AutoPublish => {}
            }
        }

        let persistable = classified
            .iter()
            .any(|r| r.category != Category::Unknown && r.band != ConfidenceBand::Unclassified);
        if !persistable {
            info!(
                run_id = %run.result.run_id,
                processed = run.result.processed_count,
                "nothing to persist"
            );
            return run.finish(start);
        }

        // --- Reconciling + Persisting ---
        match self.persist(&classified, &mut run).await {
            Ok(()) => run.finish(start),
            Err(e) => run.fail(e, start),
        }
    }

    async fn extract_all(
        &self,
        candidates: &[Candidate],
        cancel: &watch::Receiver<bool>,
        run: &mut Run<'_>,
    ) -> Vec<ExtractedRecord> {
        let timeout = self.item_timeout;
        let handles = self
            .dispatch(candidates, cancel, |candidate| {
                let extractor = Arc::clone(&self.extractor);
                let url = candidate.url.clone();
                let received_at = candidate.received_at;
                async move {
                    let mut record = tokio::time::timeout(timeout, extractor.extract(&url))
                        .await
                        .map_err(|_| format!("timed out after {}s", timeout.as_secs()))?
                        .map_err(|e| e.to_string())?;
                    record.received_at = Some(received_at);
                    Ok::<_, String>(record)
                }
            })
            .await;

        let labels: Vec<&str> = candidates.iter().map(|c| c.url.as_str()).collect();
        run.collect(handles, &labels).await
    }

    async fn classify_all(
        &self,
        records: Vec<ExtractedRecord>,
        cancel: &watch::Receiver<bool>,
        run: &mut Run<'_>,
    ) -> Vec<ClassifiedRecord> {
        let timeout = self.item_timeout;
        let labels: Vec<String> = records.iter().map(|r| r.source_url.clone()).collect();
        let handles = self
            .dispatch(&records, cancel, |record| {
                let classifier = Arc::clone(&self.classifier);
                let record = record.clone();
                async move {
                    tokio::time::timeout(timeout, classifier.classify(record))
                        .await
                        .map_err(|_| format!("classification timed out after {}s", timeout.as_secs()))
                }
            })
            .await;

        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        run.collect(handles, &labels).await
    }

    /// Spawn one task per item, at most `concurrency` at a time. Stops
    /// dispatching once cancelled.
    async fn dispatch<I, T, F, Fut>(
        &self,
        items: &[I],
        cancel: &watch::Receiver<bool>,
        make: F,
    ) -> Vec<JoinHandle<std::result::Result<T, String>>>
    where
        F: Fn(&I) -> Fut,
        Fut: Future<Output = std::result::Result<T, String>> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(items.len());

        for item in items {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            if *cancel.borrow() {
                break;
            }
            let task = make(item);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                task.await
            }));
        }
        handles
    }

    /// Reconcile against the current store snapshot and write the result.
    async fn persist(&self, classified: &[ClassifiedRecord], run: &mut Run<'_>) -> Result<()> {
        let _guard = self.store.locks().acquire_all().await;

        run.transition(WorkflowState::Reconciling);
        let existing = self.store.snapshot().await?;
        let merged = curator_reconcile::merge(&existing, classified, Utc::now())?;
        run.result.added = merged.added_count;
        run.result.updated = merged.updated_count;
        run.result.skipped = merged.skipped_count;
        info!(
            added = merged.added_count,
            updated = merged.updated_count,
            skipped = merged.skipped_count,
            total = merged.entries.len(),
            "reconciled"
        );

        run.transition(WorkflowState::Persisting);
        let (commits, failure) = match self.store.write(&merged.entries).await {
            Ok(commits) => (commits, None),
            Err(err) => (err.committed, Some(err.source)),
        };

        for commit in &commits {
            if let CommitResult::Committed { path, reference } = commit {
                run.result.created_files.push(path.clone());
                run.result.commit_ref = Some(reference.clone());
            }
        }
        match failure {
            Some(e) => {
                if !run.result.created_files.is_empty() {
                    warn!(
                        run_id = %run.result.run_id,
                        committed = ?run.result.created_files,
                        "store failed after a partial commit"
                    );
                }
                Err(e)
            }
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Run bookkeeping
// ---------------------------------------------------------------------------

struct Run<'a> {
    result: WorkflowResult,
    progress: &'a dyn ProgressReporter,
}

impl Run<'_> {
    fn transition(&mut self, state: WorkflowState) {
        info!(run_id = %self.result.run_id, state = ?state, "state transition");
        self.result.state = state;
        self.progress.phase(state);
    }

    /// Await handles in dispatch order. Failures become `"<url>: <reason>"`.
    async fn collect<T>(
        &mut self,
        handles: Vec<JoinHandle<std::result::Result<T, String>>>,
        labels: &[&str],
    ) -> Vec<T> {
        let total = handles.len();
        let mut ok = Vec::with_capacity(total);

        for (i, handle) in handles.into_iter().enumerate() {
            let label = labels.get(i).copied().unwrap_or("<unknown>");
            match handle.await {
                Ok(Ok(value)) => ok.push(value),
                Ok(Err(reason)) => {
                    warn!(url = %label, %reason, "item failed");
                    self.result.errors.push(format!("{label}: {reason}"));
                }
                Err(join_err) => {
                    error!(url = %label, error = %join_err, "item task failed");
                    self.result.errors.push(format!("{label}: task failed: {join_err}"));
                }
            }
            self.progress.item_done(label, i + 1, total);
        }
        ok
    }

    fn finish(mut self, start: Instant) -> WorkflowResult {
        self.transition(WorkflowState::Done);
        self.result.success = true;
        info!(
            run_id = %self.result.run_id,
            processed = self.result.processed_count,
            errors = self.result.errors.len(),
            commit = self.result.commit_ref.as_deref().unwrap_or("none"),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "run complete"
        );
        self.progress.done(&self.result);
        self.result
    }

    fn fail(mut self, e: CuratorError, start: Instant) -> WorkflowResult {
        error!(run_id = %self.result.run_id, error = %e, "run failed");
        self.result.errors.push(e.to_string());
        self.transition(WorkflowState::Failed);
        self.result.success = false;
        info!(
            run_id = %self.result.run_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "run finished with failure"
        );
        self.progress.done(&self.result);
        self.result
    }
}
