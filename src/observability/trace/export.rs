//! Span export pipeline.
//!
//! # Data Flow
//! ```text
//! span end / drop
//!     → QueueSpanProcessor::on_end
//!     → SpanQueue::submit (try_send, never waits)
//!     → bounded mpsc channel
//!     → worker task (batch by size or interval)
//!     → SpanExporter::export (timeout + retries with backoff)
//! ```
//!
//! # Design Decisions
//! - A full queue drops the newest span and counts it; the request path never waits
//! - A batch failing every attempt is dropped and counted
//! - On shutdown the worker drains the queue and flushes once

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::Context;
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::trace::{Span, SpanData, SpanExporter, SpanProcessor};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::span::SpanCounters;
use crate::config::TracingConfig;
use crate::resilience::Backoff;

/// Writes each span as a debug log event.
#[derive(Debug, Default, Clone)]
pub struct LogExporter;

impl SpanExporter for LogExporter {
    async fn export(&self, batch: Vec<SpanData>) -> OTelSdkResult {
        for span in &batch {
            let duration = span.end_time.duration_since(span.start_time).unwrap_or_default();
            tracing::debug!(
                target: "span",
                trace_id = %span.span_context.trace_id(),
                span_id = %span.span_context.span_id(),
                parent_span_id = %span.parent_span_id,
                name = %span.name,
                duration_us = duration.as_micros() as u64,
                status = ?span.status,
                "Span finished"
            );
        }
        Ok(())
    }
}

/// Counters describing the export pipeline.
#[derive(Debug, Default)]
pub struct ExportStats {
    enqueued: AtomicU64,
    exported: AtomicU64,
    dropped_queue_full: AtomicU64,
    dropped_shutdown: AtomicU64,
    dropped_export_failed: AtomicU64,
    failed_batches: AtomicU64,
}

impl ExportStats {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn exported(&self) -> u64 {
        self.exported.load(Ordering::Relaxed)
    }

    pub fn dropped_queue_full(&self) -> u64 {
        self.dropped_queue_full.load(Ordering::Relaxed)
    }

    /// Spans submitted after the worker stopped accepting.
    pub fn dropped_shutdown(&self) -> u64 {
        self.dropped_shutdown.load(Ordering::Relaxed)
    }

    pub fn dropped_export_failed(&self) -> u64 {
        self.dropped_export_failed.load(Ordering::Relaxed)
    }

    pub fn failed_batches(&self) -> u64 {
        self.failed_batches.load(Ordering::Relaxed)
    }
}

/// Producer side of the bounded span queue.
#[derive(Debug, Clone)]
pub struct SpanQueue {
    tx: mpsc::Sender<SpanData>,
    stats: Arc<ExportStats>,
}

impl SpanQueue {
    /// Hand a span to the worker. Drops it when the queue is full or closed.
    pub fn submit(&self, span: SpanData) {
        match self.tx.try_send(span) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dropped_queue_full.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("trace_spans_dropped_total", "reason" => "queue_full").increment(1);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped_shutdown.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("trace_spans_dropped_total", "reason" => "shutdown").increment(1);
            }
        }
    }

    pub fn stats(&self) -> &Arc<ExportStats> {
        &self.stats
    }
}

/// Span processor installed on the tracer provider.
///
/// Counts every recording span it sees and hands sampled ones to the queue.
/// Export happens on the worker task, never inside `on_end`.
#[derive(Debug)]
pub struct QueueSpanProcessor {
    queue: Option<SpanQueue>,
    counters: Arc<SpanCounters>,
}

impl QueueSpanProcessor {
    pub fn new(queue: Option<SpanQueue>, counters: Arc<SpanCounters>) -> Self {
        Self { queue, counters }
    }
}

impl SpanProcessor for QueueSpanProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {
        self.counters.on_open();
    }

    fn on_end(&self, span: SpanData) {
        self.counters.on_close();
        if let Some(queue) = &self.queue {
            if span.span_context.is_sampled() {
                queue.submit(span);
            }
        }
    }

    fn force_flush(&self) -> OTelSdkResult {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
        Ok(())
    }
}

/// Batching parameters for the export worker.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub queue_capacity: usize,
    pub max_batch_size: usize,
    pub scheduled_delay: Duration,
    pub export_timeout: Duration,
    pub max_export_attempts: u32,
    pub backoff: Backoff,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::from(&TracingConfig::default())
    }
}

impl From<&TracingConfig> for BatchConfig {
    fn from(config: &TracingConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity.max(1),
            max_batch_size: config.max_batch_size.max(1),
            scheduled_delay: Duration::from_millis(config.scheduled_delay_ms.max(1)),
            export_timeout: Duration::from_millis(config.export_timeout_ms),
            max_export_attempts: config.max_export_attempts.max(1),
            backoff: Backoff::new(config.backoff_base_ms, config.backoff_max_ms),
        }
    }
}

/// Bounded queue plus the background task draining it.
pub struct ExportWorker {
    queue: SpanQueue,
    handle: JoinHandle<()>,
}

impl ExportWorker {
    /// Spawn the worker on the current runtime.
    ///
    /// The worker stops when `shutdown` fires or every [`SpanQueue`] clone is dropped.
    pub fn spawn<E>(exporter: E, config: BatchConfig, shutdown: broadcast::Receiver<()>) -> Self
    where
        E: SpanExporter + 'static,
    {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let stats = Arc::new(ExportStats::default());
        let worker = Worker {
            exporter,
            config,
            stats: stats.clone(),
        };
        let handle = tokio::spawn(worker.run(rx, shutdown));

        Self {
            queue: SpanQueue { tx, stats },
            handle,
        }
    }

    pub fn queue(&self) -> SpanQueue {
        self.queue.clone()
    }

    pub fn stats(&self) -> Arc<ExportStats> {
        self.queue.stats.clone()
    }

    /// Split into the queue handle and the worker's join handle.
    pub fn into_parts(self) -> (SpanQueue, JoinHandle<()>) {
        (self.queue, self.handle)
    }
}

struct Worker<E> {
    exporter: E,
    config: BatchConfig,
    stats: Arc<ExportStats>,
}

impl<E: SpanExporter + 'static> Worker<E> {
    async fn run(mut self, mut rx: mpsc::Receiver<SpanData>, mut shutdown: broadcast::Receiver<()>) {
        let mut batch = Vec::with_capacity(self.config.max_batch_size);
        let period = self.config.scheduled_delay;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(span) => {
                        batch.push(span);
                        if batch.len() >= self.config.max_batch_size {
                            self.flush(&mut batch).await;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.flush(&mut batch).await;
                    }
                }
                _ = shutdown.recv() => {
                    rx.close();
                    while let Some(span) = rx.recv().await {
                        batch.push(span);
                        if batch.len() >= self.config.max_batch_size {
                            self.flush(&mut batch).await;
                        }
                    }
                    break;
                }
            }
        }

        if !batch.is_empty() {
            self.flush(&mut batch).await;
        }
        tracing::debug!(
            exported = self.stats.exported(),
            dropped = self.stats.dropped_queue_full()
                + self.stats.dropped_shutdown()
                + self.stats.dropped_export_failed(),
            "Span export worker stopped"
        );
    }

    async fn flush(&mut self, batch: &mut Vec<SpanData>) {
        let count = batch.len() as u64;
        let attempts = self.config.max_export_attempts;

        for attempt in 1..=attempts {
            let export = self.exporter.export(batch.clone());
            let result = match tokio::time::timeout(self.config.export_timeout, export).await {
                Ok(result) => result,
                Err(_) => Err(OTelSdkError::Timeout(self.config.export_timeout)),
            };

            match result {
                Ok(()) => {
                    self.stats.exported.fetch_add(count, Ordering::Relaxed);
                    metrics::counter!("trace_spans_exported_total").increment(count);
                    batch.clear();
                    return;
                }
                Err(e) => {
                    metrics::counter!("trace_export_failures_total").increment(1);
                    if attempt < attempts {
                        let delay = self.config.backoff.delay(attempt);
                        tracing::debug!(attempt, delay = ?delay, error = %e, "Span export failed, retrying");
                        tokio::time::sleep(delay).await;
                    } else {
                        tracing::warn!(attempts, spans = count, error = %e, "Dropping span batch after failed export");
                    }
                }
            }
        }

        self.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.stats.dropped_export_failed.fetch_add(count, Ordering::Relaxed);
        metrics::counter!("trace_spans_dropped_total", "reason" => "export_failed").increment(count);
        batch.clear();
    }
}
