// Streaming session
// Per-stream state tying framer, window, gate, classifier and hysteresis together

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::audio::framer::StreamFramer;
use crate::audio::gate::{GateState, VolumeGate};
use crate::audio::wire::decode_f32_le;
use crate::audio::window::{AnalysisWindow, WindowError};
use crate::config::{ConfigError, DetectorConfig};
use crate::events::backend::{ClassifierError, NoteClassifier};
use crate::events::clock::{Clock, MonotonicClock};
use crate::events::hysteresis::NoteTracker;
use crate::events::suppression::suppress_harmonics;
use crate::events::types::{NoteEvent, NoteRecord, ProbabilityFrame, StreamEvent};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Window error: {0}")]
    Window(#[from] WindowError),
}

/// Running counters for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Hops pulled from the framer, silent ones included
    pub hops_processed: u64,

    /// Active hops dropped because the classifier failed
    pub hops_skipped: u64,

    /// Hops below the volume floor
    pub silent_hops: u64,

    /// Input chunks rejected as empty or malformed
    pub chunks_discarded: u64,
}

/// What a session leaves behind once it is closed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub stats: SessionStats,

    /// Samples lost to the framer bound
    pub dropped_samples: u64,

    /// Every note the session closed, in closing order
    pub take: Vec<NoteRecord>,
}

impl SessionSummary {
    pub fn note_count(&self) -> usize {
        self.take.len()
    }
}

/// One audio stream's detector state
///
/// Every processing method takes `&mut self`, so a session never has more
/// than one classifier call in flight. Independent sessions share nothing
/// but the classifier, which is stateless.
pub struct StreamSession {
    id: Uuid,
    opened_at: DateTime<Utc>,
    config: DetectorConfig,
    framer: StreamFramer,
    window: AnalysisWindow,
    gate: VolumeGate,
    tracker: NoteTracker,
    classifier: Arc<dyn NoteClassifier>,
    clock: Arc<dyn Clock>,
    take: Vec<NoteRecord>,
    stats: SessionStats,
}

impl StreamSession {
    /// Create a session after validating `config`
    pub fn new(
        config: DetectorConfig,
        classifier: Arc<dyn NoteClassifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let session = StreamSession {
            id: Uuid::new_v4(),
            opened_at: Utc::now(),
            framer: StreamFramer::from_config(&config),
            window: AnalysisWindow::from_config(&config),
            gate: VolumeGate::from_config(&config),
            tracker: NoteTracker::from_config(&config),
            config,
            classifier,
            clock,
            take: Vec::new(),
            stats: SessionStats::default(),
        };

        log::info!(
            "Opened session {} (hop {}, window {})",
            session.id,
            session.config.hop_size,
            session.config.window_length
        );
        Ok(session)
    }

    /// Create a session timed by a fresh monotonic clock
    pub fn open(
        config: DetectorConfig,
        classifier: Arc<dyn NoteClassifier>,
    ) -> Result<Self, ConfigError> {
        Self::new(config, classifier, Arc::new(MonotonicClock::new()))
    }

    /// Feed a little-endian f32 byte payload
    /// Payloads that do not decode are discarded without error
    pub async fn push_bytes(&mut self, bytes: &[u8]) -> Result<Vec<StreamEvent>, SessionError> {
        match decode_f32_le(bytes) {
            Ok(samples) => self.push_samples(&samples).await,
            Err(e) => {
                log::debug!("Session {}: discarding payload: {}", self.id, e);
                self.stats.chunks_discarded += 1;
                Ok(Vec::new())
            }
        }
    }

    /// Feed a chunk of samples and process every hop it completes
    pub async fn push_samples(&mut self, chunk: &[f32]) -> Result<Vec<StreamEvent>, SessionError> {
        if !self.framer.push(chunk) {
            self.stats.chunks_discarded += 1;
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        while let Some(hop) = self.framer.next_hop() {
            events.extend(self.process_hop(&hop).await?);
        }
        Ok(events)
    }

    /// Run one hop through window, gate, classifier and hysteresis
    pub async fn process_hop(&mut self, hop: &[f32]) -> Result<Vec<StreamEvent>, SessionError> {
        self.window.push_hop(hop)?;
        self.stats.hops_processed += 1;

        let reading = self.gate.evaluate(hop);
        let mut events = vec![StreamEvent::Volume {
            value: reading.volume,
        }];

        match reading.state {
            GateState::Silent => {
                self.stats.silent_hops += 1;
                let released = self.tracker.flush(self.clock.now());
                if !released.is_empty() {
                    log::debug!(
                        "Session {}: silence released {} notes",
                        self.id,
                        released.len()
                    );
                    self.emit(&released, &mut events);
                    events.push(StreamEvent::SilenceReset);
                }
            }
            GateState::Active => match self.classify().await {
                Ok(mut frame) => {
                    suppress_harmonics(&mut frame.note);
                    // Timestamped after inference, when the result is applied
                    let now = self.clock.now();
                    let transitions = self.tracker.process_frame(&frame, now);
                    self.emit(&transitions, &mut events);
                }
                Err(e) => {
                    self.stats.hops_skipped += 1;
                    log::warn!("Session {}: skipping hop, classifier failed: {}", self.id, e);
                }
            },
        }

        Ok(events)
    }

    /// Force-close every sounding note and finish the session
    /// Buffered samples short of a full hop are discarded
    pub fn close(mut self) -> (Vec<StreamEvent>, SessionSummary) {
        let released = self.tracker.flush(self.clock.now());
        let mut events = Vec::with_capacity(released.len());
        self.emit(&released, &mut events);

        let summary = SessionSummary {
            id: self.id,
            opened_at: self.opened_at,
            closed_at: Utc::now(),
            stats: self.stats,
            dropped_samples: self.framer.dropped_samples(),
            take: self.take,
        };

        log::info!(
            "Closed session {}: {} notes, {} hops ({} skipped)",
            summary.id,
            summary.note_count(),
            summary.stats.hops_processed,
            summary.stats.hops_skipped
        );
        (events, summary)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Notes closed so far
    pub fn take(&self) -> &[NoteRecord] {
        &self.take
    }

    pub fn tracker(&self) -> &NoteTracker {
        &self.tracker
    }

    pub fn buffered_samples(&self) -> usize {
        self.framer.buffered()
    }

    pub fn dropped_samples(&self) -> u64 {
        self.framer.dropped_samples()
    }

    async fn classify(&self) -> Result<ProbabilityFrame, ClassifierError> {
        let classifier = Arc::clone(&self.classifier);
        let window = self.window.snapshot();

        tokio::task::spawn_blocking(move || classifier.classify(&window))
            .await
            .map_err(|e| ClassifierError::TaskFailed(e.to_string()))?
    }

    fn emit(&mut self, transitions: &[NoteEvent], events: &mut Vec<StreamEvent>) {
        for transition in transitions {
            if let Some(record) = NoteRecord::from_event(transition) {
                self.take.push(record);
            }
            let event = StreamEvent::from(transition);
            log::trace!("Session {}: {:?}", self.id, event);
            events.push(event);
        }
    }
}
