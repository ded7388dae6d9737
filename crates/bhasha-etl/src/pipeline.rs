//! The resumable classification pipeline.
//!
//! A run enumerates the saved library, skips finalized tracks and takes
//! every other track through lyrics, scoring, classification and side
//! effects, committing each one before moving to the next. Records are
//! checkpointed after the lyrics fetch and after scoring (`scored` acts as
//! a write-ahead marker), so an interrupted run resumes where it stopped
//! and never repeats a finalized track.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use bhasha_core::model::{
    Classification, ClassificationRecord, Language, Lyrics, RunId, Status, Thresholds, Track,
    TrackId,
};
use bhasha_core::schema::Database;

use crate::adapters::{
    enumerate_tracks, LanguageScorer, LyricsProvider, PlaylistHandle, PlaylistSink, TrackOrder,
    TrackSource,
};
use crate::config::{playlist_name, Config};
use crate::error::{AdapterError, AdapterResult, PipelineError, PipelineResult};
use crate::report::Reports;
use crate::resilience::RetryPolicy;
use crate::scorer::score_text;

/// The external services a run talks to.
#[derive(Debug, Clone)]
pub struct Adapters {
    pub source: Arc<dyn TrackSource>,
    pub lyrics: Arc<dyn LyricsProvider>,
    pub scorer: Arc<dyn LanguageScorer>,
    pub sink: Arc<dyn PlaylistSink>,
}

/// Policy values fixed for the lifetime of a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub thresholds: Thresholds,
    pub playlist_prefix: String,
    pub track_order: TrackOrder,
    pub retry: RetryPolicy,
    pub max_consecutive_failures: u32,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            thresholds: config.thresholds()?,
            playlist_prefix: config.playlist_prefix.clone(),
            track_order: config.track_order,
            retry: config.retry_policy(),
            max_consecutive_failures: config.max_consecutive_failures.max(1),
        })
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let config = Config::default();
        Self {
            retry: config.retry_policy(),
            thresholds: Thresholds::default(),
            track_order: config.track_order,
            max_consecutive_failures: config.max_consecutive_failures,
            playlist_prefix: config.playlist_prefix,
        }
    }
}

/// Per-run controls.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Process at most this many non-finalized tracks.
    pub limit: Option<usize>,
    /// Do not start a new track once this much time has passed.
    pub time_budget: Option<Duration>,
    /// Re-evaluate finalized records as the run reaches them. Stored lyrics
    /// are reused and playlist membership is never withdrawn.
    pub reevaluate: bool,
    /// Checked between tracks; set it to stop cleanly.
    pub stop: Arc<AtomicBool>,
}

/// Why a run ended before visiting every track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Limit,
    TimeBudget,
    Signal,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Limit => "track limit reached",
            Self::TimeBudget => "time budget exhausted",
            Self::Signal => "stop requested",
        })
    }
}

/// Counts reported at the end of every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: RunId,
    /// Tracks in the library.
    pub discovered: usize,
    /// Tracks already finalized by an earlier run.
    pub skipped: usize,
    /// Tracks finalized by this run.
    pub processed: usize,
    /// Tracks added to (or confirmed in) each language playlist.
    pub included: BTreeMap<Language, usize>,
    /// Tracks written to the review report.
    pub flagged: usize,
    /// Tracks demoted to `failed`.
    pub failed: usize,
    pub stopped: Option<StopReason>,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            run_id: RunId::new(),
            discovered: 0,
            skipped: 0,
            processed: 0,
            included: BTreeMap::new(),
            flagged: 0,
            failed: 0,
            stopped: None,
        }
    }

    fn record_finalized(&mut self, classification: &Classification) {
        self.processed += 1;
        for language in &classification.included {
            *self.included.entry(*language).or_insert(0) += 1;
        }
        if classification.needs_review() {
            self.flagged += 1;
        }
    }

    /// Total included across languages (a track counts once per language).
    pub fn included_total(&self) -> usize {
        self.included.values().sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}", self.run_id)?;
        writeln!(f, "  discovered: {}", self.discovered)?;
        writeln!(f, "  skipped (already finalized): {}", self.skipped)?;
        writeln!(f, "  processed: {}", self.processed)?;
        for language in Language::ALL {
            writeln!(
                f,
                "  included {}: {}",
                language,
                self.included.get(&language).copied().unwrap_or(0)
            )?;
        }
        writeln!(f, "  flagged for review: {}", self.flagged)?;
        write!(f, "  failed: {}", self.failed)?;
        if let Some(reason) = self.stopped {
            write!(f, "\n  stopped early: {reason}")?;
        }
        Ok(())
    }
}

/// A run that ended on a fatal error. Everything finalized before the
/// error stays finalized.
#[derive(Debug, Error)]
#[error("run {} aborted after finalizing {} track(s): {error}", .summary.run_id, .summary.processed)]
pub struct RunFailure {
    pub summary: RunSummary,
    #[source]
    pub error: PipelineError,
}

enum Outcome {
    Finalized(Classification),
    Failed { stage: &'static str },
}

/// The classification pipeline.
#[derive(Debug)]
pub struct Pipeline {
    store: Database,
    reports: Reports,
    adapters: Adapters,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        store: Database,
        reports: Reports,
        adapters: Adapters,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            reports,
            adapters,
            settings,
        }
    }

    pub fn store(&self) -> &Database {
        &self.store
    }

    pub fn reports(&self) -> &Reports {
        &self.reports
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Execute one run.
    ///
    /// The summary is logged whether the run completes or aborts.
    pub async fn run(&mut self, options: &RunOptions) -> Result<RunSummary, RunFailure> {
        let mut summary = RunSummary::new();
        log::info!("Starting run {}", summary.run_id);

        let result = self.run_tracks(options, &mut summary).await;
        match result {
            Ok(()) => {
                log::info!("{summary}");
                Ok(summary)
            }
            Err(error) => {
                log::error!("Run {} aborted: {error}", summary.run_id);
                log::info!("{summary}");
                Err(RunFailure { summary, error })
            }
        }
    }

    async fn run_tracks(
        &mut self,
        options: &RunOptions,
        summary: &mut RunSummary,
    ) -> PipelineResult<()> {
        let result = self.process_tracks(options, summary).await;
        if options.reevaluate {
            // Rows appended during the run keep their first classification;
            // rewrite both reports from the store, which is consistent even
            // when the run stopped early.
            self.reports
                .export(&self.store, &self.settings.thresholds)?;
        }
        result
    }

    async fn process_tracks(
        &mut self,
        options: &RunOptions,
        summary: &mut RunSummary,
    ) -> PipelineResult<()> {
        let tracks = enumerate_tracks(
            self.adapters.source.as_ref(),
            &self.settings.retry,
            self.settings.track_order,
        )
        .await?;
        summary.discovered = tracks.len();

        let started = Instant::now();
        let mut playlists: HashMap<Language, PlaylistHandle> = HashMap::new();
        let mut attempted = 0usize;
        let mut consecutive_failures = 0u32;

        for track in &tracks {
            let existing = self.store.get_record(&track.id)?;
            let reopen = existing.as_ref().is_some_and(ClassificationRecord::is_finalized);
            if reopen && !options.reevaluate {
                summary.skipped += 1;
                continue;
            }

            if let Some(reason) = stop_reason(options, started, attempted) {
                log::info!("Stopping before {}: {reason}", track.id);
                summary.stopped = Some(reason);
                break;
            }
            attempted += 1;

            match self.process_track(track, existing, reopen, &mut playlists).await? {
                Outcome::Finalized(classification) => {
                    summary.record_finalized(&classification);
                    consecutive_failures = 0;
                }
                Outcome::Failed { stage } => {
                    summary.failed += 1;
                    consecutive_failures += 1;
                    if consecutive_failures >= self.settings.max_consecutive_failures {
                        log::error!(
                            "{consecutive_failures} consecutive tracks failed; {stage} looks unavailable"
                        );
                        return Err(AdapterError::CircuitOpen {
                            source_name: stage.to_string(),
                        }
                        .into());
                    }
                }
            }
        }
        Ok(())
    }

    /// Take one non-finalized track to `finalized`, or to `failed` when an
    /// adapter keeps failing.
    ///
    /// A `reopened` record was finalized before and is re-evaluated from its
    /// stored lyrics. It stays finalized in the store until the new
    /// classification commits, and a failure leaves the old one in place.
    async fn process_track(
        &mut self,
        track: &Track,
        existing: Option<ClassificationRecord>,
        reopened: bool,
        playlists: &mut HashMap<Language, PlaylistHandle>,
    ) -> PipelineResult<Outcome> {
        let mut record = match existing {
            Some(mut record) => {
                record.refresh_track(track);
                if reopened {
                    record.reopen();
                }
                record
            }
            None => {
                let record = ClassificationRecord::new(track.clone());
                self.store.upsert_record(&record)?;
                record
            }
        };
        log::debug!(
            "Processing {} '{}' ({})",
            track.id,
            track.name,
            if reopened { "re-evaluating" } else { record.status.as_str() }
        );

        if !record.lyrics.is_fetched() {
            match self.fetch_lyrics(track).await {
                Ok(lyrics) => record.lyrics = lyrics,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => return self.fail(record, reopened, "lyrics provider", &e),
            }
            self.checkpoint(&record, reopened)?;
        }

        if record.status != Status::Scored {
            let scores = match record.lyrics.text() {
                Some(text) => score_text(self.adapters.scorer.as_ref(), text).await?,
                None => BTreeMap::new(),
            };
            record.record_scores(scores, &self.settings.thresholds);
            self.checkpoint(&record, reopened)?;
        }

        let classification = record.classification(&self.settings.thresholds);
        record.needs_review = classification.needs_review();

        for &language in &classification.included {
            match self.ensure_membership(language, &track.id, playlists).await {
                Ok(()) => record.mark_member(language),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => return self.fail(record, reopened, "playlist sink", &e),
            }
        }

        record.mark_finalized();
        self.reports.record(&record, &classification)?;
        self.store.commit_finalized(&record)?;

        if classification.is_detected() || classification.needs_review() {
            log::info!(
                "Finalized {} '{}': included [{}], review [{}]",
                track.id,
                track.name,
                join_names(&classification.included),
                join_names(&classification.review)
            );
        } else {
            log::debug!("Finalized {} with no detected language", track.id);
        }
        Ok(Outcome::Finalized(classification))
    }

    async fn fetch_lyrics(&self, track: &Track) -> AdapterResult<Lyrics> {
        let lyrics = self.adapters.lyrics.as_ref();
        match self
            .settings
            .retry
            .run("fetch lyrics", || lyrics.fetch(track))
            .await
        {
            Ok(text) => Ok(Lyrics::Found(text)),
            Err(e) if e.is_not_found() => {
                log::debug!("No lyrics for {} '{}'", track.id, track.name);
                Ok(Lyrics::Unavailable)
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_membership(
        &self,
        language: Language,
        track_id: &TrackId,
        playlists: &mut HashMap<Language, PlaylistHandle>,
    ) -> AdapterResult<()> {
        let sink = self.adapters.sink.as_ref();
        let retry = &self.settings.retry;

        let handle = match playlists.get(&language) {
            Some(handle) => handle.clone(),
            None => {
                let name = playlist_name(&self.settings.playlist_prefix, language);
                let handle = retry
                    .run("ensure playlist", || sink.ensure_playlist(&name))
                    .await?;
                playlists.insert(language, handle.clone());
                handle
            }
        };

        let added = retry
            .run("add track to playlist", || sink.ensure_member(&handle, track_id))
            .await?;
        if added {
            log::debug!("Added {track_id} to '{}'", handle.name);
        } else {
            log::debug!("{track_id} already in '{}'", handle.name);
        }
        Ok(())
    }

    /// Persist an intermediate state. Reopened records are only written
    /// once finalized again.
    fn checkpoint(&self, record: &ClassificationRecord, reopened: bool) -> PipelineResult<()> {
        if !reopened {
            self.store.upsert_record(record)?;
        }
        Ok(())
    }

    fn fail(
        &self,
        mut record: ClassificationRecord,
        reopened: bool,
        stage: &'static str,
        error: &AdapterError,
    ) -> PipelineResult<Outcome> {
        log::warn!(
            "Track {} '{}' failed in {stage}: {error}",
            record.track.id,
            record.track.name
        );
        if reopened {
            log::info!("Keeping the previous classification of {}", record.track.id);
        } else {
            record.mark_failed(error.to_string());
            self.store.upsert_record(&record)?;
        }
        Ok(Outcome::Failed { stage })
    }
}

fn stop_reason(options: &RunOptions, started: Instant, attempted: usize) -> Option<StopReason> {
    if options.stop.load(Ordering::SeqCst) {
        Some(StopReason::Signal)
    } else if options.limit.is_some_and(|limit| attempted >= limit) {
        Some(StopReason::Limit)
    } else if options
        .time_budget
        .is_some_and(|budget| started.elapsed() >= budget)
    {
        Some(StopReason::TimeBudget)
    } else {
        None
    }
}

fn join_names(languages: &[Language]) -> String {
    languages
        .iter()
        .map(|l| l.name())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_priority() {
        let options = RunOptions {
            limit: Some(2),
            ..RunOptions::default()
        };
        let started = Instant::now();
        assert_eq!(stop_reason(&options, started, 1), None);
        assert_eq!(stop_reason(&options, started, 2), Some(StopReason::Limit));

        options.stop.store(true, Ordering::SeqCst);
        assert_eq!(stop_reason(&options, started, 0), Some(StopReason::Signal));
    }

    #[test]
    fn test_zero_time_budget_stops_immediately() {
        let options = RunOptions {
            time_budget: Some(Duration::ZERO),
            ..RunOptions::default()
        };
        assert_eq!(
            stop_reason(&options, Instant::now(), 0),
            Some(StopReason::TimeBudget)
        );
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary::new();
        summary.record_finalized(&Classification {
            included: vec![Language::Hindi, Language::Tamil],
            review: vec![Language::Telugu],
        });
        summary.record_finalized(&Classification::default());
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.flagged, 1);
        assert_eq!(summary.included_total(), 2);
        let text = summary.to_string();
        assert!(text.contains("included Hindi: 1"));
        assert!(text.contains("included Kannada: 0"));
    }

    #[test]
    fn test_default_settings() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.thresholds, Thresholds::default());
        assert_eq!(settings.playlist_prefix, "Indian Collection");
        assert_eq!(settings.max_consecutive_failures, 5);
    }
}
