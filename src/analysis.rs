use crate::audio::WaveformBuffer;
use crate::error::SelectError;
use crate::{DetectorSettings, LoopCandidate};

/// Outcome of the start search for one end probe.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionReport {
    pub probe: usize,               // End position before snapping
    pub end: usize,                 // End position after snapping
    pub best_start: Option<usize>,
    pub score: f32,                 // Score of best_start, 0 when no start was usable
    pub starts_tried: usize,
}

impl RegionReport {
    /// Score as stored on a candidate.
    pub fn rounded_score(&self) -> u8 {
        self.score.round().clamp(0.0, 100.0) as u8
    }

    /// Acceptance is judged on the rounded score, so an emitted candidate
    /// always carries a score above the threshold.
    pub fn accepted(&self, settings: &DetectorSettings) -> bool {
        self.best_start.is_some() && self.rounded_score() as f32 > settings.acceptance_score
    }
}

/// Finds loop candidates in the first channel of `audio`.
pub fn detect_loops(audio: &WaveformBuffer, settings: &DetectorSettings) -> Vec<LoopCandidate> {
    match audio.channel(0) {
        Some(samples) => detect_in_channel(samples, audio.frame_count(), audio.sample_rate(), settings),
        None => Vec::new(),
    }
}

/// Finds up to `settings.max_candidates` loops in a single channel, best first.
/// An empty result means no region scored above the acceptance threshold.
pub fn detect_in_channel(
    samples: &[f32],
    frame_count: usize,
    sample_rate: u32,
    settings: &DetectorSettings,
) -> Vec<LoopCandidate> {
    let samples = &samples[..frame_count.min(samples.len())];

    let mut accepted: Vec<(usize, usize, f32, u8)> = end_probes(samples.len(), settings)
        .into_iter()
        .filter_map(|probe| scan_region(samples, probe, settings))
        .filter(|report| {
            let ok = report.accepted(settings);
            if !ok {
                log::debug!(
                    "Region at {} rejected (end {}, score {:.1})",
                    report.probe,
                    report.end,
                    report.score
                );
            }
            ok
        })
        .filter_map(|report| {
            report
                .best_start
                .map(|start| (start, report.end, report.score, report.rounded_score()))
        })
        .collect();

    // Stable, so equal scores keep probe order
    accepted.sort_by(|a, b| b.2.total_cmp(&a.2));
    accepted.truncate(settings.max_candidates);

    accepted
        .into_iter()
        .enumerate()
        .map(|(rank, (start, end, _, score))| LoopCandidate {
            id: rank as u32,
            start,
            end,
            score,
            label: make_label(rank + 1, end - start, sample_rate),
        })
        .collect()
}

fn make_label(rank: usize, length: usize, sample_rate: u32) -> String {
    if sample_rate == 0 {
        return format!("Loop {}", rank);
    }
    format!("Loop {} ({:.2}s)", rank, length as f32 / sample_rate as f32)
}

/// End positions to try: near the tail, then at fixed fractions of the file.
/// Probes too close to the file start are dropped.
pub fn end_probes(frame_count: usize, settings: &DetectorSettings) -> Vec<usize> {
    let mut probes = Vec::with_capacity(1 + settings.end_probe_fractions.len());
    probes.push(frame_count.saturating_sub(settings.end_probe_tail));
    for fraction in settings.end_probe_fractions {
        probes.push((frame_count as f64 * fraction) as usize);
    }
    probes.retain(|&p| p >= settings.min_probe_position);
    probes
}

/// Snaps `probe` to a zero crossing and searches for the best matching start.
/// Returns `None` when the probe or its snapped end is too close to the file start.
pub fn scan_region(samples: &[f32], probe: usize, settings: &DetectorSettings) -> Option<RegionReport> {
    if probe < settings.min_probe_position || probe >= samples.len() {
        return None;
    }

    let end = find_zero_crossing(samples, probe, settings.end_search_radius);
    if end < settings.min_end_position {
        log::trace!("End {} (probe {}) below minimum span", end, probe);
        return None;
    }

    let limit = end.saturating_sub(settings.min_loop_length);
    let step = (end / settings.start_probe_divisions.max(1)).max(settings.min_start_step.max(1));

    let mut best: Option<(usize, f32)> = None;
    let mut starts_tried = 0;

    for probe_start in (0..limit).step_by(step) {
        let start = find_zero_crossing(samples, probe_start, settings.start_search_radius);
        if start >= limit {
            continue;
        }
        let Some(score) = correlation_score(samples, start, end, settings) else {
            continue;
        };
        starts_tried += 1;

        if best.map_or(true, |(_, s)| score > s) {
            best = Some((start, score));
        }
    }

    let report = RegionReport {
        probe,
        end,
        best_start: best.map(|(start, _)| start),
        score: best.map_or(0.0, |(_, score)| score),
        starts_tried,
    };
    log::debug!(
        "Region probe {} -> end {}, best start {:?}, score {:.1} ({} starts)",
        report.probe,
        report.end,
        report.best_start,
        report.score,
        report.starts_tried
    );
    Some(report)
}

/// Index `i` within `radius` of `center` where samples `i` and `i + 1` change sign
/// (zero counts as either sign) and `|samples[i]|` is smallest. The first such
/// index wins ties. Returns `center` when the window holds no crossing.
pub fn find_zero_crossing(samples: &[f32], center: usize, radius: usize) -> usize {
    if samples.len() < 2 {
        return center;
    }

    let lo = center.saturating_sub(radius);
    let hi = center.saturating_add(radius).min(samples.len() - 2);

    let mut best = center;
    let mut best_mag = f32::INFINITY;
    for i in lo..=hi {
        let (a, b) = (samples[i], samples[i + 1]);
        let crosses = (a <= 0.0 && b >= 0.0) || (a >= 0.0 && b <= 0.0);
        if crosses && a.abs() < best_mag {
            best = i;
            best_mag = a.abs();
        }
    }
    best
}

/// Similarity of the windows starting at `start` and `end`, 0..=100.
///
/// Uses the mean absolute difference over `settings.comparison_window` frames.
/// Returns `None` when either window would run past the buffer.
pub fn correlation_score(samples: &[f32], start: usize, end: usize, settings: &DetectorSettings) -> Option<f32> {
    let len = settings.comparison_window;
    if len == 0 || start.max(end).checked_add(len)? > samples.len() {
        return None;
    }

    let total_diff: f32 = samples[start..start + len]
        .iter()
        .zip(&samples[end..end + len])
        .map(|(a, b)| (a - b).abs())
        .sum();
    let avg_diff = total_diff / len as f32;

    Some((100.0 - avg_diff * settings.score_scale).max(0.0))
}

/// Candidate at `index` (best first), or the whole buffer when there is none.
pub fn choose_loop(candidates: &[LoopCandidate], frame_count: usize, index: Option<usize>) -> LoopCandidate {
    match candidates.get(index.unwrap_or(0)) {
        Some(candidate) => candidate.clone(),
        None => {
            log::warn!("No loop candidate available, falling back to the whole buffer");
            LoopCandidate::whole_buffer(frame_count)
        }
    }
}

/// Loop to export for the `index`-th candidate (0 is the best).
///
/// With no candidates, index 0 falls back to the whole buffer, or to no loop
/// at all when the buffer is too short to hold one.
pub fn select_loop(
    candidates: &[LoopCandidate],
    frame_count: usize,
    index: usize,
) -> Result<Option<LoopCandidate>, SelectError> {
    if let Some(candidate) = candidates.get(index) {
        return Ok(Some(candidate.clone()));
    }
    if !candidates.is_empty() || index > 0 {
        return Err(SelectError::PickOutOfRange {
            index,
            available: candidates.len(),
        });
    }
    if frame_count < 2 {
        log::warn!("Buffer of {} frames is too short to loop", frame_count);
        return Ok(None);
    }
    log::warn!("No loop candidate available, falling back to the whole buffer");
    Ok(Some(LoopCandidate::whole_buffer(frame_count)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Uniform LCG noise in [-0.5, 0.5).
    fn noise(frames: usize, seed: u32) -> Vec<f32> {
        let mut state = seed;
        (0..frames)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5
            })
            .collect()
    }

    fn sine(freq: f32, sample_rate: u32, frames: usize, amplitude: f32) -> Vec<f32> {
        (0..frames)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (2.0 * std::f32::consts::PI * freq * t).sin() * amplitude
            })
            .collect()
    }

    #[test]
    fn zero_crossing_prefers_smallest_magnitude() {
        let samples = [0.5, 0.4, -0.3, -0.2, 0.1, 0.6];
        assert_eq!(find_zero_crossing(&samples, 2, 3), 3);
    }

    #[test]
    fn zero_crossing_counts_exact_zero() {
        let samples = [0.5, 0.4, 0.0, 0.3, 0.2];
        assert_eq!(find_zero_crossing(&samples, 3, 2), 2);
    }

    #[test]
    fn zero_crossing_without_sign_change_keeps_center() {
        let samples = [0.5, 0.4, 0.3, 0.2, 0.1, 0.2];
        assert_eq!(find_zero_crossing(&samples, 3, 2), 3);
    }

    #[test]
    fn zero_crossing_window_is_clamped_to_buffer() {
        let samples = [0.3, 0.2, 0.1, -0.1];
        assert_eq!(find_zero_crossing(&samples, 3, 100), 2);
        assert_eq!(find_zero_crossing(&[0.1], 0, 10), 0);
    }

    #[test]
    fn identical_windows_score_100() {
        let samples = vec![0.25; 3000];
        let score = correlation_score(&samples, 0, 2000, &DetectorSettings::default()).unwrap();
        assert_relative_eq!(score, 100.0);
    }

    #[test]
    fn score_uses_mean_abs_difference() {
        let mut samples = vec![0.0; 2000];
        for s in &mut samples[1000..1500] {
            *s = 0.1;
        }
        let score = correlation_score(&samples, 0, 1000, &DetectorSettings::default()).unwrap();
        assert_relative_eq!(score, 80.0, epsilon = 1e-3);
    }

    #[test]
    fn score_is_floored_at_zero() {
        let mut samples = vec![-1.0; 2000];
        for s in &mut samples[1000..] {
            *s = 1.0;
        }
        let score = correlation_score(&samples, 0, 1000, &DetectorSettings::default()).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn score_needs_full_window_at_both_ends() {
        let samples = vec![0.0; 1500];
        let settings = DetectorSettings::default();
        assert!(correlation_score(&samples, 0, 1000, &settings).is_some());
        assert!(correlation_score(&samples, 0, 1001, &settings).is_none());
        assert!(correlation_score(&samples, 0, 1498, &settings).is_none());
        assert!(correlation_score(&samples, 1001, 900, &settings).is_none());
    }

    #[test]
    fn noise_with_quiet_tail_yields_nothing() {
        // The tail snaps onto the two trailing zeros, leaving no room for a full window
        let mut samples = noise(88200, 0x1234_5678);
        let len = samples.len();
        samples[len - 3] = 0.0;
        samples[len - 2] = 0.0;

        let settings = DetectorSettings::default();
        let tail = scan_region(&samples, len - 100, &settings).unwrap();
        assert_eq!(tail.end, len - 3);
        assert_eq!(tail.best_start, None);
        assert!(!tail.accepted(&settings));

        assert!(detect_in_channel(&samples, len, 44100, &settings).is_empty());
    }

    #[test]
    fn low_scoring_regions_are_rejected() {
        let samples = noise(150_000, 42);
        let settings = DetectorSettings::default();

        let reports: Vec<RegionReport> = end_probes(samples.len(), &settings)
            .into_iter()
            .filter_map(|probe| scan_region(&samples, probe, &settings))
            .collect();
        // Every region passes the span filter; the mid-file ones always have a full window
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().filter(|r| r.best_start.is_some()).count() >= 2);
        for report in &reports {
            assert!(report.score <= settings.acceptance_score);
            assert!(!report.accepted(&settings));
        }

        assert!(detect_in_channel(&samples, samples.len(), 44100, &settings).is_empty());
    }

    #[test]
    fn start_probes_step_and_skip_past_limit() {
        let mut samples = vec![0.5; 60_000];
        // Crossing at 49060, just past the start limit of 50050 - 1000
        samples[49_061] = -0.5;
        // Quieter crossing at 50050 that the end probe snaps to
        samples[50_050] = 0.1;
        samples[50_051] = -0.5;

        let report = scan_region(&samples, 50_050, &DetectorSettings::default()).unwrap();
        assert_eq!(report.end, 50_050);
        // Step is 50050 / 100 = 500: probes 0, 500, ..., 49000. The last one snaps
        // to 49060 and is skipped.
        assert_eq!(report.starts_tried, 98);
        assert_eq!(report.best_start, Some(0));
    }

    #[test]
    fn acceptance_uses_rounded_score() {
        let settings = DetectorSettings::default();
        let mut report = RegionReport {
            probe: 50_000,
            end: 50_000,
            best_start: Some(0),
            score: 60.4,
            starts_tried: 1,
        };
        assert_eq!(report.rounded_score(), 60);
        assert!(!report.accepted(&settings));

        report.score = 60.5;
        assert_eq!(report.rounded_score(), 61);
        assert!(report.accepted(&settings));

        report.best_start = None;
        assert!(!report.accepted(&settings));
    }

    #[test]
    fn fractional_probes_stay_exact_on_long_files() {
        let probes = end_probes(16_777_219, &DetectorSettings::default());
        assert_eq!(probes, vec![16_777_119, 12_582_914, 8_388_609]);
    }

    #[test]
    fn end_probes_drop_positions_near_start() {
        let settings = DetectorSettings::default();
        assert_eq!(end_probes(88200, &settings), vec![88100, 66150, 44100]);
        assert_eq!(end_probes(1500, &settings), vec![1400, 1125]);
        assert!(end_probes(1000, &settings).is_empty());
    }

    #[test]
    fn silent_buffer_yields_perfect_tail_loop() {
        let samples = vec![0.0; 88200];
        let loops = detect_in_channel(&samples, samples.len(), 44100, &DetectorSettings::default());

        assert_eq!(loops.len(), 3);
        let top = &loops[0];
        // Every index is a crossing, so the snap lands on the window's first index
        assert_eq!(top.end, 88100 - 2000);
        assert_eq!(top.start, 0);
        assert_eq!(top.score, 100);
        assert_eq!(top.id, 0);
        assert_eq!(top.label, "Loop 1 (1.95s)");
    }

    #[test]
    fn short_buffer_yields_nothing() {
        let samples = sine(440.0, 44100, 20000, 0.8);
        let loops = detect_in_channel(&samples, samples.len(), 44100, &DetectorSettings::default());
        assert!(loops.is_empty());
    }

    #[test]
    fn sine_candidates_respect_invariants() {
        let frames = 88200;
        let samples = sine(440.0, 44100, frames, 0.8);
        let settings = DetectorSettings::default();
        let loops = detect_in_channel(&samples, frames, 44100, &settings);

        assert!(!loops.is_empty());
        assert!(loops.len() <= 3);
        assert!(loops[0].score > 90);
        for pair in loops.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        for lp in &loops {
            assert!(lp.start < lp.end);
            assert!(lp.end <= frames - 1);
            assert!(lp.end - lp.start >= settings.min_loop_length);
        }
    }

    #[test]
    fn detection_is_deterministic() {
        let samples = sine(311.0, 44100, 100_000, 0.5);
        let settings = DetectorSettings::default();
        let a = detect_in_channel(&samples, samples.len(), 44100, &settings);
        let b = detect_in_channel(&samples, samples.len(), 44100, &settings);
        assert_eq!(a, b);
    }

    #[test]
    fn only_first_channel_is_analyzed() {
        let left = vec![0.0; 88200];
        let right = sine(97.0, 44100, 88200, 1.0);
        let settings = DetectorSettings::default();

        let stereo = WaveformBuffer::new(vec![left.clone(), right], 44100);
        let mono = WaveformBuffer::mono(left, 44100);
        assert_eq!(detect_loops(&stereo, &settings), detect_loops(&mono, &settings));
    }

    #[test]
    fn empty_buffer_yields_nothing() {
        let buffer = WaveformBuffer::new(Vec::new(), 44100);
        assert!(detect_loops(&buffer, &DetectorSettings::default()).is_empty());
    }

    #[test]
    fn choose_loop_falls_back_to_whole_buffer() {
        let chosen = choose_loop(&[], 5000, None);
        assert_eq!(chosen, LoopCandidate::whole_buffer(5000));

        let candidates = detect_in_channel(&vec![0.0; 88200], 88200, 44100, &DetectorSettings::default());
        assert_eq!(choose_loop(&candidates, 88200, Some(1)), candidates[1]);
        assert_eq!(choose_loop(&candidates, 88200, Some(7)).start, 0);
    }

    #[test]
    fn select_loop_rejects_missing_candidates() {
        let candidates = detect_in_channel(&vec![0.0; 88200], 88200, 44100, &DetectorSettings::default());
        assert_eq!(select_loop(&candidates, 88200, 2).unwrap(), Some(candidates[2].clone()));
        assert_eq!(
            select_loop(&candidates, 88200, 3),
            Err(SelectError::PickOutOfRange { index: 3, available: 3 })
        );
        assert_eq!(
            select_loop(&[], 5000, 1),
            Err(SelectError::PickOutOfRange { index: 1, available: 0 })
        );
    }

    #[test]
    fn select_loop_falls_back_or_skips_short_buffers() {
        assert_eq!(select_loop(&[], 5000, 0).unwrap(), Some(LoopCandidate::whole_buffer(5000)));
        assert_eq!(select_loop(&[], 1, 0).unwrap(), None);
        assert_eq!(select_loop(&[], 0, 0).unwrap(), None);
    }
}
