pub mod audio;
pub mod analysis;
pub mod export;
pub mod error;

pub use audio::WaveformBuffer;
pub use error::{AudioError, ExportError, SelectError};

#[derive(Clone, Debug, PartialEq)]
pub struct LoopCandidate {
    pub id: u32,
    pub start: usize, // Frame offset, snapped to a zero crossing
    pub end: usize,   // Frame offset, strictly after start
    pub score: u8,    // 0..=100, higher means a less audible seam
    pub label: String,
}

impl LoopCandidate {
    /// Loop covering the whole buffer, used when detection finds nothing.
    pub fn whole_buffer(frame_count: usize) -> Self {
        Self {
            id: 0,
            start: 0,
            end: frame_count.saturating_sub(1),
            score: 0,
            label: "Full track".to_string(),
        }
    }

    /// Copy of this candidate with user-adjusted bounds.
    ///
    /// The score is carried over untouched: a manual edit is an override and
    /// is never re-correlated or re-validated here.
    pub fn with_bounds(&self, start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            ..self.clone()
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug)]
pub struct DetectorSettings {
    pub end_probe_tail: usize, // First end probe sits this many frames before the end
    pub end_probe_fractions: [f64; 2], // Remaining end probes, as fractions of the frame count
    pub min_probe_position: usize, // End probes below this are dropped before snapping
    pub end_search_radius: usize, // Zero-crossing search radius around end probes
    pub start_search_radius: usize, // Zero-crossing search radius around start probes
    pub min_end_position: usize, // Snapped ends below this are rejected, regardless of sample rate
    pub min_loop_length: usize, // Starts must sit at least this far before the end
    pub min_start_step: usize,
    pub start_probe_divisions: usize, // Start step is end / divisions, floored at min_start_step
    pub comparison_window: usize, // Frames compared between loop start and loop end
    pub score_scale: f32, // score = 100 - mean_abs_diff * score_scale
    pub acceptance_score: f32, // A region's best pair must score strictly above this
    pub max_candidates: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            end_probe_tail: 100,
            end_probe_fractions: [0.75, 0.5],
            min_probe_position: 1000,
            end_search_radius: 2000,
            start_search_radius: 100,
            min_end_position: 22050, // Half a second at 44.1kHz
            min_loop_length: 1000, // ~22ms at 44.1kHz
            min_start_step: 10,
            start_probe_divisions: 100,
            comparison_window: 500,
            score_scale: 200.0,
            acceptance_score: 60.0,
            max_candidates: 3,
        }
    }
}

/// Values written into the header of the `smpl` chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerInfo {
    pub unity_note: u32, // MIDI note played back at original pitch
    pub pitch_fraction: u32,
    pub play_count: u32, // 0 loops forever
}

impl Default for SamplerInfo {
    fn default() -> Self {
        Self {
            unity_note: 60, // Middle C
            pitch_fraction: 0,
            play_count: 0,
        }
    }
}
