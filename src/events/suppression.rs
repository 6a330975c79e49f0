// Harmonic suppression
// Removes overtone bleed and undertone ghosts from a note activation vector

use crate::events::types::PITCH_COUNT;

/// Lowest index examined; anything below has no partner 19 semitones down
const LOWEST_CHECKED: usize = 25;

/// Activations below this are ignored outright
const NEGLIGIBLE: f32 = 0.1;

/// A pitch is "strong" above this level
const STRONG: f32 = 0.5;

/// A lower partial weaker than this fraction of a strong pitch is a ghost
const GHOST_RATIO: f32 = 0.9;

/// Octave and octave-plus-fifth below
const GHOST_OFFSETS: [usize; 2] = [12, 19];

/// Zero harmonic artifacts in `note`, in place
///
/// Runs from the highest pitch down so zeroed values cascade within the pass:
/// 1. Overtone: a pitch weaker than a strong pitch one octave below is bleed.
/// 2. Ghost: a strong pitch zeroes weaker partials 12 and 19 semitones below it.
pub fn suppress_harmonics(note: &mut [f32; PITCH_COUNT]) {
    for i in (LOWEST_CHECKED..PITCH_COUNT).rev() {
        let prob = note[i];
        if prob < NEGLIGIBLE {
            continue;
        }

        let below = i - 12;
        let prob_below = note[below];
        if prob_below > STRONG && prob < prob_below {
            note[i] = 0.0;
            continue;
        }

        if prob > STRONG {
            for offset in GHOST_OFFSETS {
                let low = i - offset;
                if note[low] < prob * GHOST_RATIO {
                    note[low] = 0.0;
                }
            }
        }
    }
}
