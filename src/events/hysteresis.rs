// Note hysteresis engine
// Per-pitch Off/On state machine turning probability frames into note events
//
// Off --(sustain && onset > onset_threshold)--> On            (new attack)
// On  --(!sustain)--> Off                                      (release)
// On  --(sustain && onset > retrigger && cooldown over)--> On  (Off + On pair)

use std::collections::BTreeMap;

use crate::config::DetectorConfig;
use crate::events::types::{AttackKind, NoteEvent, PitchIndex, ProbabilityFrame, PITCH_COUNT};

/// A pitch that is currently sounding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveNote {
    pub pitch: PitchIndex,

    /// Clock time of the attack that opened this note
    pub start: f64,
}

/// Thresholds driving the state machine
#[derive(Debug, Clone, PartialEq)]
pub struct NoteThresholds {
    /// Note activation needed to start a note
    pub note_start: f32,

    /// Note activation needed to keep a sounding note
    pub note_keep: f32,

    /// Onset activation for a new attack
    pub onset: f32,

    /// Onset activation for re-striking a sounding note
    pub retrigger_onset: f32,

    /// Seconds a note must have sounded before it can be retriggered
    pub retrigger_cooldown: f64,
}

impl From<&DetectorConfig> for NoteThresholds {
    fn from(config: &DetectorConfig) -> Self {
        NoteThresholds {
            note_start: config.note_start_threshold,
            note_keep: config.note_keep_threshold,
            onset: config.onset_threshold,
            retrigger_onset: config.retrigger_onset_threshold,
            retrigger_cooldown: config.retrigger_cooldown,
        }
    }
}

impl Default for NoteThresholds {
    fn default() -> Self {
        NoteThresholds::from(&DetectorConfig::default())
    }
}

/// Tracks which pitches are sounding and emits their transitions
pub struct NoteTracker {
    thresholds: NoteThresholds,

    /// Sounding notes keyed by pitch, iterated in ascending pitch order
    active: BTreeMap<PitchIndex, ActiveNote>,

    /// Time of the first attack ever seen, set once
    session_start: Option<f64>,

    /// Most recent attack time per pitch
    last_attack: [Option<f64>; PITCH_COUNT],
}

impl NoteTracker {
    pub fn new(thresholds: NoteThresholds) -> Self {
        NoteTracker {
            thresholds,
            active: BTreeMap::new(),
            session_start: None,
            last_attack: [None; PITCH_COUNT],
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(NoteThresholds::from(config))
    }

    /// Evaluate one (already suppressed) frame at time `now`
    ///
    /// Events come out in ascending pitch order, followed by the releases
    /// of notes that were not sustained this frame. A retrigger always
    /// emits its Off before its On.
    pub fn process_frame(&mut self, frame: &ProbabilityFrame, now: f64) -> Vec<NoteEvent> {
        let mut events = Vec::new();
        let mut sustained = [false; PITCH_COUNT];

        for pitch in PitchIndex::all() {
            let i = pitch.index();
            let current = self.active.get(&pitch).copied();

            let threshold = if current.is_some() {
                self.thresholds.note_keep
            } else {
                self.thresholds.note_start
            };
            if frame.note[i] <= threshold {
                continue;
            }
            sustained[i] = true;

            match current {
                None => {
                    if frame.onset[i] > self.thresholds.onset {
                        events.push(self.open(pitch, now, AttackKind::NewAttack));
                    }
                }
                Some(note) => {
                    let cooled_down = now - note.start > self.thresholds.retrigger_cooldown;
                    if frame.onset[i] > self.thresholds.retrigger_onset && cooled_down {
                        if let Some(off) = self.close(pitch, now) {
                            events.push(off);
                        }
                        events.push(self.open(pitch, now, AttackKind::Retrigger));
                    }
                }
            }
        }

        let released: Vec<PitchIndex> = self
            .active
            .keys()
            .filter(|pitch| !sustained[pitch.index()])
            .copied()
            .collect();
        for pitch in released {
            if let Some(off) = self.close(pitch, now) {
                events.push(off);
            }
        }

        events
    }

    /// Close every sounding note at `now`, in ascending pitch order
    /// Used for silence and for session teardown
    pub fn flush(&mut self, now: f64) -> Vec<NoteEvent> {
        let pitches: Vec<PitchIndex> = self.active.keys().copied().collect();
        pitches
            .into_iter()
            .filter_map(|pitch| self.close(pitch, now))
            .collect()
    }

    pub fn is_active(&self, pitch: PitchIndex) -> bool {
        self.active.contains_key(&pitch)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn active_notes(&self) -> impl Iterator<Item = &ActiveNote> {
        self.active.values()
    }

    pub fn session_start(&self) -> Option<f64> {
        self.session_start
    }

    pub fn last_attack(&self, pitch: PitchIndex) -> Option<f64> {
        self.last_attack[pitch.index()]
    }

    pub fn thresholds(&self) -> &NoteThresholds {
        &self.thresholds
    }

    fn open(&mut self, pitch: PitchIndex, now: f64, attack: AttackKind) -> NoteEvent {
        let session_start = *self.session_start.get_or_insert(now);

        self.active.insert(pitch, ActiveNote { pitch, start: now });
        self.last_attack[pitch.index()] = Some(now);

        log::debug!("Note on {} ({:?})", pitch.note_name(), attack);
        NoteEvent::on(pitch, attack, now - session_start)
    }

    fn close(&mut self, pitch: PitchIndex, now: f64) -> Option<NoteEvent> {
        let note = self.active.remove(&pitch)?;
        let duration = now - note.start;

        log::debug!("Note off {} after {:.3}s", pitch.note_name(), duration);
        Some(NoteEvent::off(pitch, self.relative(note.start), duration))
    }

    fn relative(&self, time: f64) -> f64 {
        time - self.session_start.unwrap_or(time)
    }
}
