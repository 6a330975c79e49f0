// Note event types
// Pitch indexing, probability frames, note events and the wire schema sent to clients

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of piano keys covered by the classifier
pub const PITCH_COUNT: usize = 88;

/// MIDI number of pitch index 0 (A0)
pub const MIDI_OFFSET: u8 = 21;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Scientific pitch name for a MIDI number, sharps only ("C4" for 60)
pub fn midi_to_note_name(midi: u8) -> String {
    let octave = (midi / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(midi % 12) as usize], octave)
}

/// Round seconds to millisecond precision for transmission
pub fn round_ms(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

/// One of the 88 piano keys, 0 = A0 (MIDI 21), 87 = C8 (MIDI 108)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PitchIndex(u8);

impl PitchIndex {
    /// Create from a classifier index, `None` outside 0..88
    pub fn new(index: usize) -> Option<Self> {
        if index < PITCH_COUNT {
            Some(PitchIndex(index as u8))
        } else {
            None
        }
    }

    /// Create from a MIDI number, `None` outside the piano range
    pub fn from_midi(midi: u8) -> Option<Self> {
        midi.checked_sub(MIDI_OFFSET)
            .and_then(|index| PitchIndex::new(index as usize))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn midi(self) -> u8 {
        self.0 + MIDI_OFFSET
    }

    pub fn note_name(self) -> String {
        midi_to_note_name(self.midi())
    }

    /// All pitches in ascending order
    pub fn all() -> impl Iterator<Item = PitchIndex> {
        (0..PITCH_COUNT as u8).map(PitchIndex)
    }
}

/// Errors building a probability frame from classifier output
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("Classifier returned an empty activation vector")]
    Empty,

    #[error("Expected 88 {which} activations, got {len}")]
    Length { which: &'static str, len: usize },

    #[error("Focus window must cover at least one frame")]
    FocusZero,
}

/// Per-pitch note and onset probabilities for the current window
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityFrame {
    /// Probability that each pitch is sounding
    pub note: [f32; PITCH_COUNT],

    /// Probability that each pitch started in this frame
    pub onset: [f32; PITCH_COUNT],
}

impl ProbabilityFrame {
    /// A frame with every activation at zero
    pub fn silent() -> Self {
        ProbabilityFrame {
            note: [0.0; PITCH_COUNT],
            onset: [0.0; PITCH_COUNT],
        }
    }

    /// Build from classifier vectors, clamping values into [0, 1]
    pub fn from_vecs(note: &[f32], onset: &[f32]) -> Result<Self, FrameError> {
        let mut frame = ProbabilityFrame::silent();
        fill_activations(&mut frame.note, note, "note")?;
        fill_activations(&mut frame.onset, onset, "onset")?;
        Ok(frame)
    }

    /// Collapse per-time-frame model output (T x 88) into one frame
    /// Each pitch takes its maximum over the last `focus` rows,
    /// which covers the audio added since the previous call
    pub fn from_activation_rows(
        note_rows: &[Vec<f32>],
        onset_rows: &[Vec<f32>],
        focus: usize,
    ) -> Result<Self, FrameError> {
        if focus == 0 {
            return Err(FrameError::FocusZero);
        }

        let mut frame = ProbabilityFrame::silent();
        collapse_rows(&mut frame.note, note_rows, focus, "note")?;
        collapse_rows(&mut frame.onset, onset_rows, focus, "onset")?;
        Ok(frame)
    }

    /// Set both activations for one pitch (values clamped)
    pub fn set(&mut self, pitch: PitchIndex, note: f32, onset: f32) {
        self.note[pitch.index()] = sanitize(note);
        self.onset[pitch.index()] = sanitize(onset);
    }
}

fn sanitize(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn fill_activations(
    target: &mut [f32; PITCH_COUNT],
    source: &[f32],
    which: &'static str,
) -> Result<(), FrameError> {
    if source.is_empty() {
        return Err(FrameError::Empty);
    }
    if source.len() != PITCH_COUNT {
        return Err(FrameError::Length {
            which,
            len: source.len(),
        });
    }
    for (slot, &value) in target.iter_mut().zip(source) {
        *slot = sanitize(value);
    }
    Ok(())
}

fn collapse_rows(
    target: &mut [f32; PITCH_COUNT],
    rows: &[Vec<f32>],
    focus: usize,
    which: &'static str,
) -> Result<(), FrameError> {
    if rows.is_empty() {
        return Err(FrameError::Empty);
    }

    let start = rows.len().saturating_sub(focus);
    for row in &rows[start..] {
        if row.len() != PITCH_COUNT {
            return Err(FrameError::Length {
                which,
                len: row.len(),
            });
        }
        for (slot, &value) in target.iter_mut().zip(row) {
            *slot = slot.max(sanitize(value));
        }
    }
    Ok(())
}

/// How a note-on came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackKind {
    /// Pitch was silent and got a qualifying onset
    #[serde(rename = "new_attack")]
    NewAttack,

    /// Pitch was already sounding and was struck again
    #[serde(rename = "re_trigger")]
    Retrigger,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEventKind {
    On { attack: AttackKind },
    /// Seconds the note sounded
    Off { duration: f64 },
}

/// A note transition emitted by the hysteresis engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub pitch: PitchIndex,

    pub kind: NoteEventKind,

    /// Seconds from the session's first attack to the note's start
    pub relative_start: f64,
}

impl NoteEvent {
    pub fn on(pitch: PitchIndex, attack: AttackKind, relative_start: f64) -> Self {
        NoteEvent {
            pitch,
            kind: NoteEventKind::On { attack },
            relative_start,
        }
    }

    pub fn off(pitch: PitchIndex, relative_start: f64, duration: f64) -> Self {
        NoteEvent {
            pitch,
            kind: NoteEventKind::Off { duration },
            relative_start,
        }
    }

    pub fn midi(&self) -> u8 {
        self.pitch.midi()
    }

    pub fn note_name(&self) -> String {
        self.pitch.note_name()
    }

    pub fn is_on(&self) -> bool {
        matches!(self.kind, NoteEventKind::On { .. })
    }

    pub fn attack(&self) -> Option<AttackKind> {
        match self.kind {
            NoteEventKind::On { attack } => Some(attack),
            NoteEventKind::Off { .. } => None,
        }
    }

    pub fn duration(&self) -> Option<f64> {
        match self.kind {
            NoteEventKind::On { .. } => None,
            NoteEventKind::Off { duration } => Some(duration),
        }
    }
}

/// Events delivered to the client, in emission order
/// Serialized as JSON objects tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// RMS of the newest hop, sent for every hop
    Volume { value: f32 },

    NoteOn {
        midi: u8,
        note: String,
        event: AttackKind,
        start_time: f64,
    },

    NoteOff {
        midi: u8,
        note: String,
        start_time: f64,
        duration: f64,
    },

    /// Sent after a silent hop flushed sounding notes
    SilenceReset,
}

impl StreamEvent {
    /// Serialize to a single JSON object
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&NoteEvent> for StreamEvent {
    fn from(event: &NoteEvent) -> Self {
        match event.kind {
            NoteEventKind::On { attack } => StreamEvent::NoteOn {
                midi: event.midi(),
                note: event.note_name(),
                event: attack,
                start_time: round_ms(event.relative_start),
            },
            NoteEventKind::Off { duration } => StreamEvent::NoteOff {
                midi: event.midi(),
                note: event.note_name(),
                start_time: round_ms(event.relative_start),
                duration: round_ms(duration),
            },
        }
    }
}

/// A completed note kept in the session's take
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub midi: u8,
    pub note: String,

    /// Seconds from the session's first attack
    pub start_time: f64,

    /// Seconds the note sounded
    pub duration: f64,
}

impl NoteRecord {
    /// Build from a note-off event, `None` for note-ons
    pub fn from_event(event: &NoteEvent) -> Option<Self> {
        event.duration().map(|duration| NoteRecord {
            midi: event.midi(),
            note: event.note_name(),
            start_time: round_ms(event.relative_start),
            duration: round_ms(duration),
        })
    }
}
