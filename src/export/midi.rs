// Take export - Render a session's completed notes as a Standard MIDI File
// One track at a fixed tempo; note times come straight from the take, unquantized

use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::events::types::NoteRecord;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write MIDI: {0}")]
    Write(String),

    #[error("Take has no notes to export")]
    EmptyTake,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// MIDI export options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidiExportOptions {
    /// Pulses per quarter note (PPQ)
    pub ppq: u16,

    /// Tempo written to the file; only used to convert seconds to ticks
    pub bpm: f64,

    /// Velocity for every note (1-127)
    pub velocity: u8,

    /// MIDI channel (0-15)
    pub channel: u8,

    /// Optional track name meta event
    pub track_name: Option<String>,
}

impl Default for MidiExportOptions {
    fn default() -> Self {
        MidiExportOptions {
            ppq: 480,
            bpm: 120.0,
            velocity: 100,
            channel: 0,
            track_name: None,
        }
    }
}

/// Export a take to MIDI file bytes
pub fn export_take(take: &[NoteRecord], options: &MidiExportOptions) -> Result<Vec<u8>, ExportError> {
    if take.is_empty() {
        return Err(ExportError::EmptyTake);
    }
    if options.ppq == 0 || !(options.bpm > 0.0 && options.bpm.is_finite()) {
        return Err(ExportError::Write(format!(
            "invalid timing: {} PPQ at {} BPM",
            options.ppq, options.bpm
        )));
    }

    let header = Header {
        format: Format::SingleTrack,
        timing: Timing::Metrical(options.ppq.into()),
    };

    let ticks_per_second = calculate_ticks_per_second(options.bpm, options.ppq);
    let channel = options.channel.min(15);
    let velocity = options.velocity.clamp(1, 127);

    // (tick, order, event); note-offs sort ahead of note-ons on the same tick
    let mut events: Vec<(u32, u8, TrackEventKind)> = Vec::new();
    for record in take {
        let key = record.midi.min(127);
        let tick_on = seconds_to_ticks(record.start_time, ticks_per_second);
        let tick_off = seconds_to_ticks(record.start_time + record.duration, ticks_per_second)
            .max(tick_on + 1);

        events.push((
            tick_on,
            1,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOn {
                    key: key.into(),
                    vel: velocity.into(),
                },
            },
        ));
        events.push((
            tick_off,
            0,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOff {
                    key: key.into(),
                    vel: 0.into(),
                },
            },
        ));
    }
    events.sort_by_key(|(tick, order, _)| (*tick, *order));

    let mut track = Track::new();
    if let Some(name) = &options.track_name {
        add_track_name(&mut track, name);
    }
    add_tempo(&mut track, options.bpm);

    let mut last_tick = 0;
    for (tick, _, kind) in events {
        track.push(TrackEvent {
            delta: tick.saturating_sub(last_tick).into(),
            kind,
        });
        last_tick = tick;
    }
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header,
        tracks: vec![track],
    };

    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| ExportError::Write(e.to_string()))?;

    log::debug!("Exported {} notes as {} MIDI bytes", take.len(), bytes.len());
    Ok(bytes)
}

/// Export a take and write it to `path`
pub fn write_take(path: &Path, take: &[NoteRecord], options: &MidiExportOptions) -> Result<(), ExportError> {
    let bytes = export_take(take, options)?;
    std::fs::write(path, bytes)?;
    log::info!("Wrote take of {} notes to {:?}", take.len(), path);
    Ok(())
}

fn calculate_ticks_per_second(bpm: f64, ppq: u16) -> f64 {
    ppq as f64 * bpm / 60.0
}

fn seconds_to_ticks(seconds: f64, ticks_per_second: f64) -> u32 {
    (seconds.max(0.0) * ticks_per_second).round() as u32
}

fn add_track_name<'a>(track: &mut Track<'a>, name: &'a str) {
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
    });
}

fn add_tempo(track: &mut Track<'_>, bpm: f64) {
    // Microseconds per quarter note, 24-bit
    let us_per_quarter = ((60_000_000.0 / bpm) as u32).min(0x00FF_FFFF);
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter.into())),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn record(midi: u8, start_time: f64, duration: f64) -> NoteRecord {
        NoteRecord {
            midi,
            note: crate::events::types::midi_to_note_name(midi),
            start_time,
            duration,
        }
    }

    /// (absolute tick, key, is_on) for every note message
    fn note_messages(smf: &Smf) -> Vec<(u32, u8, bool)> {
        let mut tick = 0u32;
        let mut notes = Vec::new();
        for event in &smf.tracks[0] {
            tick += u32::from(event.delta);
            if let TrackEventKind::Midi { message, .. } = event.kind {
                match message {
                    MidiMessage::NoteOn { key, .. } => notes.push((tick, u8::from(key), true)),
                    MidiMessage::NoteOff { key, .. } => notes.push((tick, u8::from(key), false)),
                    _ => {}
                }
            }
        }
        notes
    }

    #[test]
    fn test_ticks_per_second() {
        // 120 BPM: a quarter note is half a second
        assert!((calculate_ticks_per_second(120.0, 480) - 960.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_take_rejected() {
        let result = export_take(&[], &MidiExportOptions::default());
        assert!(matches!(result, Err(ExportError::EmptyTake)));
    }

    #[test]
    fn test_invalid_tempo_rejected() {
        let options = MidiExportOptions {
            bpm: 0.0,
            ..Default::default()
        };
        let result = export_take(&[record(60, 0.0, 1.0)], &options);
        assert!(matches!(result, Err(ExportError::Write(_))));
    }

    #[test]
    fn test_export_parses_back() {
        let take = vec![record(60, 0.0, 0.5), record(64, 0.5, 0.25)];
        let bytes = export_take(&take, &MidiExportOptions::default()).unwrap();

        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::SingleTrack);
        assert_eq!(smf.header.timing, Timing::Metrical(480.into()));
        assert_eq!(smf.tracks.len(), 1);

        assert_eq!(
            note_messages(&smf),
            vec![(0, 60, true), (480, 60, false), (480, 64, true), (720, 64, false)]
        );
    }

    #[test]
    fn test_tempo_and_name_written() {
        let options = MidiExportOptions {
            track_name: Some("take".to_string()),
            ..Default::default()
        };
        let bytes = export_take(&[record(69, 0.0, 1.0)], &options).unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        let track = &smf.tracks[0];
        if let TrackEventKind::Meta(MetaMessage::TrackName(name)) = &track[0].kind {
            assert_eq!(*name, b"take");
        } else {
            panic!("Expected TrackName event");
        }
        if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = &track[1].kind {
            assert_eq!(u32::from(*tempo), 500000);
        } else {
            panic!("Expected Tempo event");
        }
        assert!(matches!(
            track[track.len() - 1].kind,
            TrackEventKind::Meta(MetaMessage::EndOfTrack)
        ));
    }

    #[test]
    fn test_retriggered_note_releases_first() {
        // Same key closed and re-struck at 0.2 s
        let take = vec![record(60, 0.0, 0.2), record(60, 0.2, 0.3)];
        let bytes = export_take(&take, &MidiExportOptions::default()).unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        assert_eq!(
            note_messages(&smf),
            vec![(0, 60, true), (192, 60, false), (192, 60, true), (480, 60, false)]
        );
    }

    #[test]
    fn test_zero_length_note_lasts_one_tick() {
        let bytes = export_take(&[record(60, 1.0, 0.0)], &MidiExportOptions::default()).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(note_messages(&smf), vec![(960, 60, true), (961, 60, false)]);
    }

    #[test]
    fn test_write_take_to_file() {
        let temp_file = NamedTempFile::new().unwrap();
        write_take(
            temp_file.path(),
            &[record(60, 0.0, 0.5)],
            &MidiExportOptions::default(),
        )
        .unwrap();

        let bytes = std::fs::read(temp_file.path()).unwrap();
        assert!(Smf::parse(&bytes).is_ok());
    }
}
