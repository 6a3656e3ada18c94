//! Translation orchestrator: deduplicates every unit's source string, sends
//! the distinct strings out in bounded concurrent batches and maps the
//! results back onto the units by string identity.

pub mod protect;

use futures_util::{StreamExt, stream};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{EngineError, Result};
use crate::model::{Degradation, Document};
use crate::providers::TranslationBackend;
use crate::providers::retry::Backoff;
use crate::settings::TranslationSettings;

use protect::{Protected, passthrough, protect};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationSummary {
    /// Distinct non-empty source strings in the document.
    pub distinct: usize,
    /// Distinct strings actually sent to the backend.
    pub submitted: usize,
    pub batches: usize,
    pub failed_batches: usize,
}

pub struct Orchestrator {
    backend: Arc<dyn TranslationBackend>,
    settings: TranslationSettings,
}

type BatchOutcome = std::result::Result<Vec<String>, String>;

impl Orchestrator {
    pub fn new(backend: Arc<dyn TranslationBackend>, settings: TranslationSettings) -> Self {
        Self { backend, settings }
    }

    /// Attaches a translation to every unit whose batch succeeded and flags
    /// the rest with [`Degradation::TranslationFailed`]. Unit order is never
    /// touched. Fails only when the job is cancelled or every batch failed.
    pub async fn translate(
        &self,
        document: &mut Document,
        target_lang: &str,
        source_lang: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<TranslationSummary> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let distinct = distinct_sources(document);
        let prepared: Vec<Protected> = distinct
            .iter()
            .map(|source| {
                if self.settings.protect_technical {
                    protect(source)
                } else {
                    passthrough(source)
                }
            })
            .collect();
        let pending: Vec<usize> = (0..prepared.len())
            .filter(|&index| !prepared[index].is_inert())
            .collect();

        let batch_size = self.settings.batch_size.max(1);
        let batches: Vec<Vec<usize>> = pending.chunks(batch_size).map(<[usize]>::to_vec).collect();
        let mut summary = TranslationSummary {
            distinct: distinct.len(),
            submitted: pending.len(),
            batches: batches.len(),
            failed_batches: 0,
        };
        info!(
            "translating {} distinct string(s) in {} batch(es) via {} ({} in flight)",
            summary.submitted,
            summary.batches,
            self.backend.name(),
            self.settings.concurrency.max(1)
        );

        let work = stream::iter(batches.into_iter().enumerate())
            .map(|(index, members)| {
                let texts: Vec<String> = members.iter().map(|&member| prepared[member].text.clone()).collect();
                async move {
                    let outcome = self.run_batch(index, &texts, source_lang, target_lang).await;
                    (members, outcome)
                }
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect::<Vec<_>>();

        let results = tokio::select! {
            results = work => results,
            _ = cancel.cancelled() => {
                info!("translation cancelled; abandoning in-flight batches");
                return Err(EngineError::Cancelled);
            }
        };

        let mut outcomes: Vec<Option<std::result::Result<String, String>>> = vec![None; distinct.len()];
        let mut last_reason = String::new();
        for (members, outcome) in results {
            match outcome {
                Ok(translations) => {
                    for (member, translated) in members.into_iter().zip(translations) {
                        outcomes[member] = Some(Ok(prepared[member].restore(&translated)));
                    }
                }
                Err(reason) => {
                    summary.failed_batches += 1;
                    for member in members {
                        outcomes[member] = Some(Err(reason.clone()));
                    }
                    last_reason = reason;
                }
            }
        }

        if summary.batches > 0 && summary.failed_batches == summary.batches {
            return Err(EngineError::TranslationUnavailable {
                failed_batches: summary.failed_batches,
                reason: last_reason,
            });
        }

        let lookup: HashMap<&str, usize> = distinct
            .iter()
            .enumerate()
            .map(|(index, source)| (source.as_str(), index))
            .collect();
        for unit in document.units_mut() {
            let Some(&index) = lookup.get(unit.source.as_str()) else {
                continue;
            };
            match &outcomes[index] {
                Some(Ok(translated)) => unit.set_translation(translated.clone()),
                Some(Err(reason)) => unit.degrade(Degradation::TranslationFailed {
                    reason: reason.clone(),
                }),
                None => {}
            }
        }

        if summary.failed_batches > 0 {
            let note = format!(
                "{} of {} translation batches failed",
                summary.failed_batches, summary.batches
            );
            warn!("{}", note);
            document.notes.push(note);
        }
        Ok(summary)
    }

    async fn run_batch(
        &self,
        index: usize,
        texts: &[String],
        source_lang: Option<&str>,
        target_lang: &str,
    ) -> BatchOutcome {
        let mut backoff = Backoff::new(self.settings.max_retries, self.settings.retry_base_delay);
        loop {
            let attempt = timeout(
                self.settings.timeout,
                self.backend.translate_batch(texts, source_lang, target_lang),
            )
            .await;
            let reason = match attempt {
                Ok(Ok(translations)) if translations.len() == texts.len() => {
                    debug!("batch {} translated {} string(s)", index + 1, texts.len());
                    return Ok(translations);
                }
                Ok(Ok(translations)) => format!(
                    "expected {} translation(s), got {}",
                    texts.len(),
                    translations.len()
                ),
                Ok(Err(err)) => format!("{:#}", err),
                Err(_) => format!("timed out after {:.1}s", self.settings.timeout.as_secs_f32()),
            };
            let what = format!("batch {} failed: {}", index + 1, reason);
            if !backoff.wait(&what, None).await {
                warn!("batch {} gave up after {} retries: {}", index + 1, backoff.retries(), reason);
                return Err(reason);
            }
        }
    }
}

/// Distinct non-blank sources in first-seen order.
fn distinct_sources(document: &Document) -> Vec<String> {
    let mut seen = HashMap::new();
    let mut distinct = Vec::new();
    for unit in document.units() {
        if unit.source.trim().is_empty() || seen.contains_key(unit.source.as_str()) {
            continue;
        }
        seen.insert(unit.source.as_str(), distinct.len());
        distinct.push(unit.source.clone());
    }
    distinct
}
