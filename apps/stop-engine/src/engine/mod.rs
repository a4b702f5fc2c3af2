//! Control loop: fetch positions, evaluate stops, apply amendments.
//!
//! One cycle runs Idle -> FetchingState -> Evaluating -> Applying and
//! back to Idle. Each tick spawns its cycle off the timer, so a slow
//! exchange call on one symbol never holds up the cadence. Evaluation
//! fans out across a bounded worker pool, one task per position;
//! amendments pass through a second, narrower gate so a burst of
//! accepted candidates cannot flood the exchange. A position whose
//! amendment is still in flight when the next cycle starts is skipped,
//! not queued.

pub mod events;
pub mod retry;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ExchangeError, ExchangePort, MarketDataPort, StopAmendment};
use crate::config::{EngineConfig, ProtectionPolicy};
use crate::models::{Position, PositionKey};
use crate::protection::{
    GuardContext, PositionTracker, RejectReason, Verdict, candidate_stop, evaluate,
    widened_multiplier,
};
use crate::volatility::{VolatilityError, VolatilitySnapshot};

pub use events::{DecisionOutcome, StopDecision};
pub use retry::{Backoff, RetryPolicy};

/// Phase of the control loop, readable from other tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CyclePhase {
    /// Waiting for the next tick.
    Idle = 0,
    /// Fetching open positions from the exchange.
    FetchingState = 1,
    /// Evaluating positions in the worker pool.
    Evaluating = 2,
    /// Waiting on in-flight stop amendments.
    Applying = 3,
}

impl From<u8> for CyclePhase {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::FetchingState,
            2 => Self::Evaluating,
            3 => Self::Applying,
            _ => Self::Idle,
        }
    }
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Positions evaluated this cycle.
    pub evaluated: usize,
    /// Amendments confirmed by the exchange.
    pub applied: usize,
    /// Candidates rejected by the guard.
    pub rejected: usize,
    /// Positions skipped without a verdict.
    pub skipped: usize,
    /// Transport or exchange failures after retries.
    pub errors: usize,
}

/// Outcome of one worker task, folded into the cycle summary.
enum WorkerOutcome {
    Applied,
    Rejected,
    Skipped,
    Error,
}

/// Shared pieces each evaluation worker needs.
struct EvalContext<M, E> {
    market_data: Arc<M>,
    exchange: Arc<E>,
    tracker: Arc<PositionTracker>,
    amendment_gate: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<PositionKey>>>,
    decision_tx: broadcast::Sender<StopDecision>,
    retry: RetryPolicy,
    widen_factor: Decimal,
    candle_limit: usize,
}

impl<M, E> Clone for EvalContext<M, E> {
    fn clone(&self) -> Self {
        Self {
            market_data: Arc::clone(&self.market_data),
            exchange: Arc::clone(&self.exchange),
            tracker: Arc::clone(&self.tracker),
            amendment_gate: Arc::clone(&self.amendment_gate),
            in_flight: Arc::clone(&self.in_flight),
            decision_tx: self.decision_tx.clone(),
            retry: self.retry.clone(),
            widen_factor: self.widen_factor,
            candle_limit: self.candle_limit,
        }
    }
}

/// The stop-loss engine service.
pub struct StopLossEngine<M, E> {
    config: EngineConfig,
    policies: HashMap<String, ProtectionPolicy>,
    tracker: Arc<PositionTracker>,
    phase: AtomicU8,
    worker_gate: Arc<Semaphore>,
    ctx: EvalContext<M, E>,
    shutdown: CancellationToken,
}

impl<M, E> StopLossEngine<M, E>
where
    M: MarketDataPort + Send + Sync + 'static,
    E: ExchangePort + Send + Sync + 'static,
{
    /// Create an engine over the given ports.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        policies: HashMap<String, ProtectionPolicy>,
        market_data: Arc<M>,
        exchange: Arc<E>,
        shutdown: CancellationToken,
    ) -> Self {
        let (decision_tx, _) = broadcast::channel(256);
        let tracker = Arc::new(PositionTracker::new());
        let ctx = EvalContext {
            market_data,
            exchange,
            tracker: Arc::clone(&tracker),
            amendment_gate: Arc::new(Semaphore::new(config.max_concurrent_amendments)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            decision_tx,
            retry: config.retry.to_policy(),
            widen_factor: config.widen_factor,
            candle_limit: config.candle_limit,
        };
        Self {
            worker_gate: Arc::new(Semaphore::new(config.workers)),
            config,
            policies,
            tracker,
            phase: AtomicU8::new(CyclePhase::Idle as u8),
            ctx,
            shutdown,
        }
    }

    /// Current phase of the loop.
    #[must_use]
    pub fn phase(&self) -> CyclePhase {
        CyclePhase::from(self.phase.load(Ordering::Acquire))
    }

    /// Tracked protection state, shared with the loop.
    #[must_use]
    pub fn tracker(&self) -> Arc<PositionTracker> {
        Arc::clone(&self.tracker)
    }

    /// Subscribe to stop decision events.
    #[must_use]
    pub fn decision_updates(&self) -> broadcast::Receiver<StopDecision> {
        self.ctx.decision_tx.subscribe()
    }

    /// Run the control loop until the shutdown token fires.
    ///
    /// Seeds protection state from the exchange first so a restart
    /// picks up existing stops instead of re-deriving looser ones.
    /// Every tick spawns its cycle as a task; when an amendment from an
    /// earlier tick is still awaiting its ack, the next cycle skips
    /// that position while the rest proceed on schedule.
    pub async fn run(self: Arc<Self>) {
        if let Err(e) = self.seed_from_exchange().await {
            tracing::warn!(error = %e, "Startup recovery failed, continuing unseeded");
        }

        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.config.interval_secs,
            workers = self.config.workers,
            symbols = self.policies.len(),
            "Stop-loss engine started"
        );

        let mut cycles: JoinSet<CycleSummary> = JoinSet::new();
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let engine = Arc::clone(&self);
                    cycles.spawn(async move { engine.run_cycle().await });
                }
                Some(joined) = cycles.join_next() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Cycle task panicked");
                    }
                }
                () = self.shutdown.cancelled() => {
                    tracing::info!("Stop-loss engine shutting down");
                    break;
                }
            }
        }

        // In-flight amendments complete before the engine returns.
        while let Some(joined) = cycles.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Cycle task panicked");
            }
        }
    }

    /// Seed tracker state from exchange-side stops.
    ///
    /// # Errors
    ///
    /// Returns the exchange error when listing positions fails after
    /// retries.
    pub async fn seed_from_exchange(&self) -> Result<(), ExchangeError> {
        let exchange = Arc::clone(&self.ctx.exchange);
        let positions = with_retry(
            &self.ctx.retry,
            || {
                let exchange = Arc::clone(&exchange);
                async move { exchange.list_positions().await }
            },
            ExchangeError::is_transient,
        )
        .await?;

        let mut seeded = 0usize;
        for position in &positions {
            if position.is_closed() {
                continue;
            }
            let state = self.tracker.get_or_create(position);
            if state.is_protected() {
                seeded += 1;
            }
        }
        tracing::info!(
            positions = positions.len(),
            protected = seeded,
            "Recovered position state from exchange"
        );
        Ok(())
    }

    /// Run one full evaluation cycle and return its counters.
    pub async fn run_cycle(&self) -> CycleSummary {
        let started = Instant::now();
        let mut summary = CycleSummary::default();

        self.phase
            .store(CyclePhase::FetchingState as u8, Ordering::Release);

        let exchange = Arc::clone(&self.ctx.exchange);
        let positions = match with_retry(
            &self.ctx.retry,
            || {
                let exchange = Arc::clone(&exchange);
                async move { exchange.list_positions().await }
            },
            ExchangeError::is_transient,
        )
        .await
        {
            Ok(positions) => positions,
            Err(e) => {
                // Deferred to the next tick; amending blind is worse.
                tracing::warn!(error = %e, "Failed to list positions, deferring cycle");
                summary.errors += 1;
                self.phase.store(CyclePhase::Idle as u8, Ordering::Release);
                return summary;
            }
        };

        let open: HashSet<PositionKey> = positions
            .iter()
            .filter(|p| !p.is_closed())
            .map(Position::key)
            .collect();
        for key in self.tracker.retain_open(&open) {
            tracing::info!(position = %key, "Position closed, protection state dropped");
        }

        self.phase
            .store(CyclePhase::Evaluating as u8, Ordering::Release);

        let mut workers: JoinSet<WorkerOutcome> = JoinSet::new();
        for position in positions {
            if position.is_closed() {
                continue;
            }
            let key = position.key();

            let Some(policy) = self.policies.get(&position.symbol) else {
                tracing::debug!(position = %key, "No policy for symbol, skipping");
                summary.skipped += 1;
                continue;
            };

            // Skip-not-queue: an amendment from the previous cycle that
            // is still awaiting its ack keeps the position locked.
            if !self.ctx.in_flight.lock().insert(key.clone()) {
                tracing::debug!(position = %key, "Amendment in flight, skipping");
                let (band, old_stop) = self
                    .tracker
                    .get(&key)
                    .map_or((0, None), |s| (s.band, s.applied_stop));
                emit(
                    &self.ctx,
                    StopDecision::skipped(&key, band, old_stop, "amendment in flight"),
                );
                summary.skipped += 1;
                continue;
            }

            summary.evaluated += 1;
            let ctx = self.ctx.clone();
            let policy = policy.clone();
            let worker_gate = Arc::clone(&self.worker_gate);
            workers.spawn(async move {
                let _permit = worker_gate.acquire().await;
                let outcome = evaluate_position(&ctx, &position, &policy).await;
                ctx.in_flight.lock().remove(&position.key());
                outcome
            });
        }

        self.phase
            .store(CyclePhase::Applying as u8, Ordering::Release);

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(WorkerOutcome::Applied) => summary.applied += 1,
                Ok(WorkerOutcome::Rejected) => summary.rejected += 1,
                Ok(WorkerOutcome::Skipped) => summary.skipped += 1,
                Ok(WorkerOutcome::Error) => summary.errors += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Evaluation worker panicked");
                    summary.errors += 1;
                }
            }
        }

        self.phase.store(CyclePhase::Idle as u8, Ordering::Release);

        tracing::info!(
            evaluated = summary.evaluated,
            applied = summary.applied,
            rejected = summary.rejected,
            skipped = summary.skipped,
            errors = summary.errors,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Cycle complete"
        );

        summary
    }
}

/// Evaluate one position: estimate volatility, classify, derive a
/// candidate, pass the guard, and amend on acceptance.
async fn evaluate_position<M, E>(
    ctx: &EvalContext<M, E>,
    position: &Position,
    policy: &ProtectionPolicy,
) -> WorkerOutcome
where
    M: MarketDataPort + Send + Sync,
    E: ExchangePort + Send + Sync,
{
    let key = position.key();
    let state = ctx.tracker.get_or_create(position);

    let candles = match with_retry(
        &ctx.retry,
        || async {
            ctx.market_data
                .candle_history(&position.symbol, &policy.timeframe, ctx.candle_limit)
                .await
        },
        crate::application::ports::MarketDataError::is_transient,
    )
    .await
    {
        Ok(candles) => candles,
        Err(e) => {
            tracing::warn!(position = %key, error = %e, "Candle fetch failed, skipping");
            emit(
                ctx,
                StopDecision::skipped(&key, state.band, state.applied_stop, e.to_string()),
            );
            return WorkerOutcome::Error;
        }
    };

    let snapshot = match VolatilitySnapshot::compute(
        &position.symbol,
        &policy.timeframe,
        &candles,
        policy.atr_period,
    ) {
        Ok(snapshot) => snapshot,
        Err(e @ VolatilityError::InsufficientData { .. }) => {
            // Young listing; the position keeps whatever stop it has.
            tracing::debug!(position = %key, error = %e, "Skipping volatility estimate");
            emit(
                ctx,
                StopDecision::skipped(&key, state.band, state.applied_stop, e.to_string()),
            );
            return WorkerOutcome::Skipped;
        }
        Err(e) => {
            tracing::warn!(position = %key, error = %e, "Volatility estimate failed");
            emit(
                ctx,
                StopDecision::skipped(&key, state.band, state.applied_stop, e.to_string()),
            );
            return WorkerOutcome::Error;
        }
    };

    let selection = policy.ladder.classify(
        position.side,
        position.entry_price,
        position.mark_price,
        state.band,
    );

    // First-stop widening only: once a stop is on the exchange the
    // configured multiplier applies unmodified.
    let multiplier = if state.is_protected() {
        selection.multiplier
    } else {
        widened_multiplier(selection.multiplier, ctx.widen_factor, state.widen_applications)
    };

    let candidate = candidate_stop(
        position.side,
        position.mark_price,
        snapshot.value,
        multiplier,
        policy.tick_size,
    );
    tracing::debug!(
        position = %key,
        atr = %snapshot.value,
        band = selection.index,
        multiplier = %multiplier,
        candidate = %candidate,
        "Derived candidate stop"
    );

    let guard_ctx = GuardContext {
        side: position.side,
        current_price: position.mark_price,
        prior_stop: state.applied_stop,
        tick_size: policy.tick_size,
        min_stop_distance: policy.min_stop_distance,
    };

    match evaluate(candidate, &guard_ctx) {
        Verdict::Reject(reason) => {
            if reason == RejectReason::TooCloseToPrice && !state.is_protected() {
                // Unprotected position stuck inside the exchange floor:
                // widen the next attempt instead of looping forever.
                ctx.tracker.note_min_distance_reject(&key);
                tracing::warn!(
                    position = %key,
                    candidate = %candidate,
                    widen_applications = state.widen_applications + 1,
                    "First stop inside minimum distance, widening next cycle"
                );
            } else if reason == RejectReason::WouldTriggerImmediately {
                // Stale or bad volatility read; keep the prior stop.
                ctx.tracker.touch(&key);
                tracing::warn!(
                    position = %key,
                    candidate = %candidate,
                    mark_price = %position.mark_price,
                    "Candidate on wrong side of price, retaining prior stop"
                );
            } else {
                // The expected case when price moves against the position.
                ctx.tracker.touch(&key);
                tracing::info!(
                    position = %key,
                    candidate = %candidate,
                    reason = %reason,
                    "Candidate rejected"
                );
            }
            emit(
                ctx,
                StopDecision::rejected(
                    &key,
                    selection.index,
                    multiplier,
                    state.applied_stop,
                    candidate,
                    reason,
                ),
            );
            WorkerOutcome::Rejected
        }
        Verdict::Accept => {
            apply_amendment(ctx, position, selection.index, multiplier, candidate).await
        }
    }
}

/// Submit an accepted candidate through the amendment gate.
async fn apply_amendment<M, E>(
    ctx: &EvalContext<M, E>,
    position: &Position,
    band: usize,
    multiplier: Decimal,
    candidate: Decimal,
) -> WorkerOutcome
where
    M: MarketDataPort + Send + Sync,
    E: ExchangePort + Send + Sync,
{
    let key = position.key();
    let state = ctx.tracker.get_or_create(position);
    let _permit = ctx.amendment_gate.acquire().await;

    let request = StopAmendment::new(position.symbol.clone(), position.side, candidate);
    let result = with_retry(
        &ctx.retry,
        || {
            let request = request.clone();
            async { ctx.exchange.amend_stop(request).await }
        },
        ExchangeError::is_transient,
    )
    .await;

    match result {
        Ok(ack) => {
            ctx.tracker.record_applied(&key, ack.stop_price, band);
            tracing::info!(
                position = %key,
                old_stop = ?state.applied_stop,
                new_stop = %ack.stop_price,
                band,
                unchanged = ack.unchanged,
                "Stop amendment confirmed"
            );
            emit(
                ctx,
                StopDecision::applied(&key, band, multiplier, state.applied_stop, ack.stop_price),
            );
            WorkerOutcome::Applied
        }
        Err(ExchangeError::PositionNotFound { .. }) => {
            // Closed between listing and amending. Normal race.
            ctx.tracker.remove(&key);
            tracing::info!(position = %key, "Position gone before amendment, state dropped");
            emit(
                ctx,
                StopDecision::skipped(&key, state.band, state.applied_stop, "position closed"),
            );
            WorkerOutcome::Skipped
        }
        Err(e) => {
            // Deferred: the next cycle re-derives from fresh data
            // rather than queueing a stale candidate.
            tracing::warn!(position = %key, error = %e, "Stop amendment failed, deferring");
            emit(
                ctx,
                StopDecision::skipped(&key, state.band, state.applied_stop, e.to_string()),
            );
            WorkerOutcome::Error
        }
    }
}

fn emit<M, E>(ctx: &EvalContext<M, E>, decision: StopDecision) {
    // No subscribers is fine.
    let _ = ctx.decision_tx.send(decision);
}

/// Run an operation with bounded exponential backoff.
///
/// Only errors `is_transient` marks are retried; the final error is
/// returned once attempts run out.
async fn with_retry<T, Err, Fut, F, P>(
    policy: &RetryPolicy,
    mut op: F,
    is_transient: P,
) -> Result<T, Err>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Err>>,
    P: Fn(&Err) -> bool,
    Err: std::fmt::Display,
{
    let mut backoff = Backoff::new(policy);
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) => match backoff.next_delay() {
                Some(delay) => {
                    tracing::debug!(
                        error = %e,
                        attempt = backoff.attempts_used(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
}
