//! Mutation State Controller
//!
//! Owns the phase of a replacement run and orchestrates the pipeline:
//! validation, checkpoint, adaptive batches, terminal transition. Nothing is
//! mutated before the checkpoint exists, and every result produced after it
//! carries the checkpoint.

use crate::cancel::CancellationFlag;
use crate::checkpoint::CheckpointManager;
use crate::error::{ReplaceError, StateMachineError};
use crate::mutation::Migrator;
use crate::progress::{percentage, ControllerEvent, EventSink, ProgressThrottle};
use crate::resolver::ResolvedResourceMap;
use crate::scheduler::{AdaptiveBatchScheduler, ItemResult};
use crate::state_machine::{cancellation_guaranteed, validate_transition};
use crate::validation::{validate_request, ValidatedRequest};
use futures::StreamExt;
use parking_lot::Mutex;
use restyle_core::{
    node_label, Checkpoint, ClonedResource, DocumentHost, EngineConfig, ErrorClassifier,
    FailureRecord, MutationRequest, NodeId, Phase, ProgressUpdate, ReplacementResult,
    RetryPolicy, RunId, RunStatus,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::Instrument;

#[derive(Debug, Default)]
struct RunTotals {
    updated: usize,
    failed: usize,
    skipped: usize,
    failures: Vec<FailureRecord>,
    batch_sizes: Vec<usize>,
    clones: Vec<ClonedResource>,
}

impl RunTotals {
    fn into_result(
        self,
        run_id: RunId,
        status: RunStatus,
        checkpoint: Option<Checkpoint>,
        started: Instant,
    ) -> ReplacementResult {
        ReplacementResult {
            run_id,
            status,
            success: status == RunStatus::Completed && self.failed == 0,
            items_updated: self.updated,
            items_failed: self.failed,
            items_skipped: self.skipped,
            has_warnings: self.failed > 0 || self.skipped > 0,
            failures: self.failures,
            checkpoint,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            batch_sizes: self.batch_sizes,
            clones: self.clones,
        }
    }
}

/// Drives bulk replacement runs against one document host
///
/// One run at a time; `run()` on a controller with a run in flight returns
/// [`ReplaceError::Busy`].
pub struct ReplacementController<H> {
    host: Arc<H>,
    config: EngineConfig,
    retry: RetryPolicy,
    scheduler: AdaptiveBatchScheduler,
    checkpoints: CheckpointManager,
    phase: Mutex<Phase>,
    cancel: CancellationFlag,
    events: EventSink,
}

impl<H: DocumentHost> ReplacementController<H> {
    /// Create an idle controller
    #[must_use]
    pub fn new(host: Arc<H>, config: EngineConfig) -> Self {
        Self {
            retry: RetryPolicy::new(config.retry.clone(), ErrorClassifier::new()),
            scheduler: AdaptiveBatchScheduler::new(config.batch),
            checkpoints: CheckpointManager::new(),
            phase: Mutex::new(Phase::Idle),
            cancel: CancellationFlag::new(),
            events: EventSink::disconnected(),
            host,
            config,
        }
    }

    /// Use a custom failure classifier
    #[must_use]
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.retry = RetryPolicy::new(self.config.retry.clone(), classifier);
        self
    }

    /// Receive phase changes and progress updates
    ///
    /// Replaces any previous subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ControllerEvent> {
        let (sink, rx) = EventSink::channel();
        self.events = sink;
        rx
    }

    /// Document host
    #[inline]
    #[must_use]
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// Whether cancelling now is guaranteed to prevent every mutation
    #[must_use]
    pub fn can_cancel(&self) -> bool {
        cancellation_guaranteed(self.phase())
    }

    /// Request cancellation of the current or next run
    ///
    /// Returns `false` when the controller is in a terminal phase and the
    /// request has nothing to act on. After the checkpoint, cancellation only
    /// skips items that have not started yet.
    pub fn cancel(&self) -> bool {
        let phase = self.phase();
        if phase.is_terminal() {
            return false;
        }
        self.cancel.cancel();
        tracing::info!(phase = %phase, "cancellation requested");
        true
    }

    /// Return a terminal controller to idle
    ///
    /// # Errors
    /// `StateMachineError::IllegalTransition` while a run is in flight.
    pub fn reset(&self) -> Result<(), StateMachineError> {
        let mut phase = self.phase.lock();
        if *phase == Phase::Idle {
            return Ok(());
        }
        validate_transition(*phase, Phase::Idle)?;
        let from = std::mem::replace(&mut *phase, Phase::Idle);
        self.cancel.reset();
        self.events.emit(ControllerEvent::PhaseChanged {
            run_id: None,
            from,
            to: Phase::Idle,
        });
        Ok(())
    }

    /// Execute a replacement request
    ///
    /// Item failures do not fail the run; they are reported in the result.
    /// Cancellation yields `Ok` with [`RunStatus::Cancelled`].
    ///
    /// # Errors
    /// - `ReplaceError::Busy` if another run is in flight
    /// - `ReplaceError::Validation` if the request is structurally invalid
    /// - `ReplaceError::Checkpoint` if the snapshot could not be captured
    /// - `ReplaceError::Aborted` on an internal fault after the checkpoint
    pub async fn run(&self, request: MutationRequest) -> Result<ReplacementResult, ReplaceError> {
        let run_id = RunId::new();
        self.begin(run_id)?;
        self.execute(run_id, request)
            .instrument(tracing::info_span!("replacement_run", run_id = %run_id))
            .await
    }

    fn begin(&self, run_id: RunId) -> Result<(), ReplaceError> {
        let mut phase = self.phase.lock();
        if phase.is_terminal() {
            let from = std::mem::replace(&mut *phase, Phase::Idle);
            self.cancel.reset();
            self.events.emit(ControllerEvent::PhaseChanged {
                run_id: Some(run_id),
                from,
                to: Phase::Idle,
            });
        } else if *phase != Phase::Idle {
            return Err(ReplaceError::Busy(*phase));
        }
        validate_transition(Phase::Idle, Phase::Validating)?;
        *phase = Phase::Validating;
        self.events.emit(ControllerEvent::PhaseChanged {
            run_id: Some(run_id),
            from: Phase::Idle,
            to: Phase::Validating,
        });
        Ok(())
    }

    async fn execute(
        &self,
        run_id: RunId,
        request: MutationRequest,
    ) -> Result<ReplacementResult, ReplaceError> {
        let started = Instant::now();
        tracing::info!(nodes = request.affected_node_ids.len(), "run started");

        let validated = match validate_request(self.host.as_ref(), request).await {
            Ok(validated) => validated,
            Err(err) => {
                tracing::warn!(error = %err, "request rejected");
                self.fail(run_id);
                return Err(err.into());
            }
        };

        if self.cancel.is_cancelled() {
            self.transition(run_id, Phase::Cancelled)?;
            tracing::info!("cancelled before checkpoint");
            let totals = RunTotals {
                skipped: validated.node_ids().len(),
                ..RunTotals::default()
            };
            return Ok(totals.into_result(run_id, RunStatus::Cancelled, None, started));
        }

        self.transition(run_id, Phase::CreatingCheckpoint)?;
        let checkpoint = match self.checkpoints.create(self.host.as_ref(), &validated).await {
            Ok(checkpoint) => checkpoint,
            Err(err) => {
                tracing::error!(error = %err, "checkpoint failed, nothing mutated");
                self.fail(run_id);
                return Err(err.into());
            }
        };

        self.transition(run_id, Phase::Processing)
            .map_err(|err| self.abort(run_id, &checkpoint, err))?;
        let totals = self.process(&validated, &checkpoint).await;

        let (terminal, status) = if totals.skipped > 0 {
            (Phase::Cancelled, RunStatus::Cancelled)
        } else {
            (Phase::Complete, RunStatus::Completed)
        };
        self.transition(run_id, terminal)
            .map_err(|err| self.abort(run_id, &checkpoint, err))?;

        let total = validated.node_ids().len();
        let settled = totals.updated + totals.failed;
        self.events.emit(ControllerEvent::Progress(ProgressUpdate {
            phase: terminal,
            percentage: percentage(settled, total),
            batch_number: totals.batch_sizes.len(),
            total_batches: totals.batch_sizes.len(),
            batch_size: totals.batch_sizes.last().copied().unwrap_or(0),
            items_processed: settled,
            items_failed: totals.failed,
            checkpoint_title: Some(checkpoint.title.clone()),
        }));
        tracing::info!(
            status = ?status,
            updated = totals.updated,
            failed = totals.failed,
            skipped = totals.skipped,
            batches = totals.batch_sizes.len(),
            clones = totals.clones.len(),
            "run finished"
        );

        Ok(totals.into_result(run_id, status, Some(checkpoint), started))
    }

    async fn process(&self, validated: &ValidatedRequest, checkpoint: &Checkpoint) -> RunTotals {
        let map = ResolvedResourceMap::new();
        let migrator = Migrator::for_request(self.host.as_ref(), &validated.request, &map);
        let host = self.host.as_ref();
        let retry = &self.retry;
        let migrator = &migrator;

        let total = validated.node_ids().len();
        let mut throttle = ProgressThrottle::new(self.config.progress.throttle());
        let mut totals = RunTotals::default();

        let batches = self.scheduler.process_batches(
            validated.node_ids().to_vec(),
            self.cancel.clone(),
            move |id| migrate_item(host, retry, migrator, id),
        );
        futures::pin_mut!(batches);

        while let Some(mut outcome) = batches.next().await {
            totals.updated += outcome.succeeded;
            totals.failed += outcome.failed;
            totals.skipped += outcome.skipped;
            totals.batch_sizes.push(outcome.size);
            totals.failures.append(&mut outcome.failures);

            let update = ProgressUpdate {
                phase: Phase::Processing,
                percentage: percentage(totals.updated + totals.failed + totals.skipped, total),
                batch_number: outcome.batch_number,
                total_batches: outcome.estimated_total_batches,
                batch_size: outcome.size,
                items_processed: totals.updated + totals.failed,
                items_failed: totals.failed,
                checkpoint_title: Some(checkpoint.title.clone()),
            };
            if throttle.admit(&update) {
                self.events.emit(ControllerEvent::Progress(update));
            }
        }

        totals.skipped = total - totals.updated - totals.failed;
        totals.clones = map.clones();
        totals
    }

    fn transition(&self, run_id: RunId, to: Phase) -> Result<(), StateMachineError> {
        let from = {
            let mut phase = self.phase.lock();
            validate_transition(*phase, to)?;
            std::mem::replace(&mut *phase, to)
        };
        tracing::debug!(from = %from, to = %to, "phase transition");
        self.events.emit(ControllerEvent::PhaseChanged {
            run_id: Some(run_id),
            from,
            to,
        });
        Ok(())
    }

    fn fail(&self, run_id: RunId) {
        if let Err(err) = self.transition(run_id, Phase::Error) {
            tracing::error!(error = %err, "could not enter error phase");
        }
    }

    fn abort(&self, run_id: RunId, checkpoint: &Checkpoint, err: StateMachineError) -> ReplaceError {
        tracing::error!(error = %err, checkpoint = %checkpoint.title, "run aborted");
        self.fail(run_id);
        ReplaceError::Aborted {
            checkpoint: Box::new(checkpoint.clone()),
            reason: err.to_string(),
        }
    }
}

async fn migrate_item<H: DocumentHost + ?Sized>(
    host: &H,
    retry: &RetryPolicy,
    migrator: &Migrator<'_, H>,
    id: NodeId,
) -> ItemResult {
    match retry.retry(|| migrator.migrate(&id)).await {
        Ok(_) => ItemResult::Succeeded,
        Err(failure) => {
            let node_label = node_label(host, &id).await;
            tracing::warn!(
                node = %node_label,
                kind = %failure.kind,
                attempts = failure.attempts,
                error = %failure.error,
                "node migration failed"
            );
            ItemResult::Failed(FailureRecord {
                node_id: id,
                node_label,
                error_kind: failure.kind,
                message: failure.error.to_string(),
                retry_count: failure.retry_count(),
            })
        }
    }
}
