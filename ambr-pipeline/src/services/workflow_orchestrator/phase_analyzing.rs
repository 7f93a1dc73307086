//! ANALYZING
//!
//! One descriptor per spread. Calls run concurrently up to the analysis
//! queue's limit; fallbacks are resolved afterwards in spread order because
//! an exhausted spread inherits its predecessor's descriptor.

use anyhow::{bail, Result};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use uuid::Uuid;

use ambr_common::db::{failures, FailureRecord, FailureStage};
use ambr_common::events::AmbrEvent;
use ambr_common::models::{BookStatus, Descriptor, Page};

use super::PipelineOrchestrator;
use crate::error::AnalysisError;
use crate::services::descriptor_extractor::resolve_descriptor;
use crate::services::job_queue::QueueName;
use crate::services::scene_segmenter::{build_spreads, Spread};
use crate::utils::retry::Attempted;

pub(super) struct AnalysisOutcome {
    pub spreads: Vec<Spread>,
    /// `descriptors[i]` belongs to `spreads[i]`
    pub descriptors: Vec<Descriptor>,
    pub failed_spreads: u32,
    pub cost: f64,
}

impl PipelineOrchestrator {
    pub(super) async fn phase_analyzing(
        &self,
        book_id: Uuid,
        pages: &[Page],
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<AnalysisOutcome> {
        let spreads = build_spreads(pages);
        let total = spreads.len() as u32;

        tracing::info!(book_id = %book_id, spreads = total, "Phase: ANALYZING");
        self.emit_progress(book_id, BookStatus::Analyzing, 0, total);

        let mut tasks = FuturesUnordered::new();
        for spread in &spreads {
            tasks.push(async move {
                let outcome = match self.queues.acquire(QueueName::Analysis).await {
                    Ok(_permit) => self.extractor.extract(&spread.text).await,
                    Err(_) => Attempted {
                        result: Err(AnalysisError::UpstreamUnavailable("analysis queue closed".into())),
                        attempts: 0,
                    },
                };
                (spread.index as usize, outcome)
            });
        }

        let mut results: Vec<Option<Attempted<Descriptor, AnalysisError>>> =
            (0..spreads.len()).map(|_| None).collect();
        let mut completed = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => bail!("Processing cancelled"),
                next = tasks.next() => {
                    let Some((index, outcome)) = next else { break };
                    results[index] = Some(outcome);
                    completed += 1;
                    self.emit_progress(book_id, BookStatus::Analyzing, completed, total);
                }
            }
        }
        drop(tasks);

        let mut descriptors: Vec<Descriptor> = Vec::with_capacity(spreads.len());
        let mut failed_spreads = 0;
        let mut attempts_total = 0;

        for (spread, outcome) in spreads.iter().zip(results) {
            let Some(outcome) = outcome else {
                bail!("Spread {} was never analyzed", spread.index);
            };
            attempts_total += outcome.attempts;

            let descriptor = resolve_descriptor(&outcome.result, descriptors.last());
            if let Err(e) = &outcome.result {
                failed_spreads += 1;
                self.record_spread_failure(book_id, spread, e, outcome.attempts).await?;
            }
            descriptors.push(descriptor);
        }

        let cost = attempts_total as f64 * self.settings.analysis_unit_cost;
        self.charge(book_id, cost).await;

        tracing::info!(
            book_id = %book_id,
            spreads = total,
            failed_spreads,
            attempts = attempts_total,
            "Descriptor extraction completed"
        );

        self.transition(book_id, BookStatus::Analyzing, BookStatus::Segmenting)
            .await?;

        Ok(AnalysisOutcome {
            spreads,
            descriptors,
            failed_spreads,
            cost,
        })
    }

    async fn record_spread_failure(
        &self,
        book_id: Uuid,
        spread: &Spread,
        error: &AnalysisError,
        attempts: u32,
    ) -> Result<()> {
        let fallback = match error {
            AnalysisError::InvalidResponse(_) => "neutral descriptor",
            _ => "previous spread's descriptor",
        };
        tracing::warn!(
            book_id = %book_id,
            spread_index = spread.index,
            start_page = spread.start_page,
            attempts,
            error = %error,
            fallback,
            "Spread analysis failed, continuing"
        );

        failures::record_failure(
            &self.db,
            &FailureRecord {
                book_id,
                scene_id: None,
                spread_index: Some(spread.index),
                stage: FailureStage::Analysis,
                reason: error.to_string(),
                attempts,
                created_at: Utc::now(),
            },
        )
        .await?;

        self.event_bus.emit_lossy(AmbrEvent::SpreadAnalysisFailed {
            book_id,
            spread_index: spread.index,
            reason: error.to_string(),
            attempts,
            timestamp: Utc::now(),
        });
        Ok(())
    }
}
