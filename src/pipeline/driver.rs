// Session driver
// Channel-based run loop for one stream: byte chunks in, events out, flush on teardown

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::events::types::StreamEvent;
use crate::pipeline::journal::EventJournal;
use crate::pipeline::session::{SessionSummary, StreamSession};

/// Client-side ends of a spawned session
pub struct SessionHandle {
    /// Send f32 little-endian payloads here; drop it to end the stream
    pub chunks: mpsc::Sender<Vec<u8>>,

    /// Events in emission order
    pub events: mpsc::Receiver<StreamEvent>,

    /// Resolves to the summary once the session is torn down
    pub task: JoinHandle<SessionSummary>,
}

/// Drive `session` until the inbound stream ends or the sink goes away
///
/// Either way every sounding note is force-closed; the resulting note-offs
/// are still delivered when the sink is open.
pub async fn run_session(
    mut session: StreamSession,
    mut chunks: mpsc::Receiver<Vec<u8>>,
    events: mpsc::Sender<StreamEvent>,
    journal: Option<EventJournal>,
) -> SessionSummary {
    let mut sink_open = true;

    while let Some(chunk) = chunks.recv().await {
        let produced = match session.push_bytes(&chunk).await {
            Ok(produced) => produced,
            Err(e) => {
                log::error!("Session {} failed: {}", session.id(), e);
                break;
            }
        };

        record(journal.as_ref(), &produced);
        if !deliver(&events, produced).await {
            log::warn!("Session {}: event sink closed, tearing down", session.id());
            sink_open = false;
            break;
        }
    }

    let (released, summary) = session.close();
    record(journal.as_ref(), &released);
    if sink_open {
        deliver(&events, released).await;
    }

    summary
}

/// Spawn a session on the runtime with channels of `capacity` slots
pub fn spawn_session(
    session: StreamSession,
    capacity: usize,
    journal: Option<EventJournal>,
) -> SessionHandle {
    let capacity = capacity.max(1);
    let (chunk_tx, chunk_rx) = mpsc::channel(capacity);
    let (event_tx, event_rx) = mpsc::channel(capacity);

    let task = tokio::spawn(run_session(session, chunk_rx, event_tx, journal));

    SessionHandle {
        chunks: chunk_tx,
        events: event_rx,
        task,
    }
}

async fn deliver(sink: &mpsc::Sender<StreamEvent>, events: Vec<StreamEvent>) -> bool {
    for event in events {
        if sink.send(event).await.is_err() {
            return false;
        }
    }
    true
}

fn record(journal: Option<&EventJournal>, events: &[StreamEvent]) {
    if let Some(journal) = journal {
        if let Err(e) = journal.write_batch(events) {
            log::warn!("Failed to write journal {:?}: {}", journal.path(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wire::encode_f32_le;
    use crate::events::backend::{ClassifierError, NoteClassifier};
    use crate::events::clock::ManualClock;
    use crate::events::types::{AttackKind, PitchIndex, ProbabilityFrame};
    use crate::pipeline::journal::read_journal;
    use crate::pipeline::session::tests::{frame, test_config, ScriptedClassifier};
    use std::sync::Arc;

    /// Reads the pitch off the newest sample: value v sounds index round(v * 100)
    fn level_classifier() -> Arc<dyn NoteClassifier> {
        Arc::new(
            |window: &[f32]| -> Result<ProbabilityFrame, ClassifierError> {
                let level = window.last().copied().ok_or(ClassifierError::EmptyOutput)?;
                let pitch = PitchIndex::new((level * 100.0).round() as usize)
                    .ok_or_else(|| ClassifierError::Inference("level out of range".to_string()))?;

                let mut frame = ProbabilityFrame::silent();
                frame.set(pitch, 0.9, 0.7);
                Ok(frame)
            },
        )
    }

    async fn collect(mut events: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut collected = Vec::new();
        while let Some(event) = events.recv().await {
            collected.push(event);
        }
        collected
    }

    #[tokio::test]
    async fn test_disconnect_flushes_active_notes() {
        let classifier = Arc::new(ScriptedClassifier::default());
        classifier.push(Some(frame(&[(39, 0.8, 0.9)])));
        let clock = ManualClock::new(0.0);
        let session =
            StreamSession::new(test_config(), classifier, Arc::new(clock.clone())).unwrap();

        let handle = spawn_session(session, 16, None);
        handle.chunks.send(encode_f32_le(&[0.5; 4])).await.unwrap();
        clock.set(0.5);
        drop(handle.chunks);

        let events = collect(handle.events).await;
        let summary = handle.task.await.unwrap();

        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[1],
            StreamEvent::NoteOn {
                midi: 60,
                event: AttackKind::NewAttack,
                ..
            }
        ));
        assert!(matches!(events[2], StreamEvent::NoteOff { midi: 60, .. }));
        assert!(!events.contains(&StreamEvent::SilenceReset));
        assert_eq!(summary.note_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_sink_ends_session() {
        let session = StreamSession::open(test_config(), level_classifier()).unwrap();
        let (chunk_tx, chunk_rx) = mpsc::channel(4);
        let (event_tx, event_rx) = mpsc::channel(4);
        drop(event_rx);

        let task = tokio::spawn(run_session(session, chunk_rx, event_tx, None));
        let _ = chunk_tx.send(encode_f32_le(&[0.3; 4])).await;

        // The driver stops on its own even though the inbound side is still open
        let summary = task.await.unwrap();
        assert_eq!(summary.stats.hops_processed, 1);
        assert_eq!(summary.note_count(), 1);
    }

    #[tokio::test]
    async fn test_journal_records_delivered_events() {
        let dir = tempfile::tempdir().unwrap();
        let session = StreamSession::open(test_config(), level_classifier()).unwrap();
        let journal = EventJournal::new(dir.path().join("events.jsonl"), session.id());
        let path = journal.path().to_path_buf();

        let handle = spawn_session(session, 16, Some(journal));
        handle.chunks.send(encode_f32_le(&[0.3; 8])).await.unwrap();
        drop(handle.chunks);

        let events = collect(handle.events).await;
        let summary = handle.task.await.unwrap();

        let entries = read_journal(&path).unwrap();
        assert_eq!(entries.len(), events.len());
        assert!(entries.iter().all(|e| e.session_id == summary.id));
        let journaled: Vec<StreamEvent> = entries.into_iter().map(|e| e.event).collect();
        assert_eq!(journaled, events);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sessions_stay_isolated() {
        let classifier = level_classifier();
        let mut running = Vec::new();

        for i in 0..32usize {
            let session = StreamSession::open(test_config(), Arc::clone(&classifier)).unwrap();
            let handle = spawn_session(session, 8, None);
            let level = (i + 10) as f32 / 100.0;
            let expected_midi = PitchIndex::new(i + 10).unwrap().midi();

            let chunks = handle.chunks;
            let feeder = tokio::spawn(async move {
                for _ in 0..5 {
                    chunks.send(encode_f32_le(&[level; 4])).await.unwrap();
                }
            });
            let reader = tokio::spawn(collect(handle.events));
            running.push((expected_midi, feeder, reader, handle.task));
        }

        for (expected_midi, feeder, reader, task) in running {
            feeder.await.unwrap();
            let events = reader.await.unwrap();
            let summary = task.await.unwrap();

            let volumes = events
                .iter()
                .filter(|e| matches!(e, StreamEvent::Volume { .. }))
                .count();
            assert_eq!(volumes, 5);

            let notes: Vec<&StreamEvent> = events
                .iter()
                .filter(|e| !matches!(e, StreamEvent::Volume { .. }))
                .collect();
            assert_eq!(notes.len(), 2);
            for event in notes {
                match event {
                    StreamEvent::NoteOn { midi, .. } | StreamEvent::NoteOff { midi, .. } => {
                        assert_eq!(*midi, expected_midi)
                    }
                    other => panic!("unexpected event {:?}", other),
                }
            }

            assert_eq!(summary.take.len(), 1);
            assert_eq!(summary.take[0].midi, expected_midi);
        }
    }
}
