use anyhow::{Context, Result};
use seamloop::{analysis, audio, DetectorSettings};
use std::path::PathBuf;

fn main() -> Result<()> {
    env_logger::init();

    let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        println!("Usage: debug_analysis <file.wav>");
        return Ok(());
    };

    if !path.exists() {
        println!("File not found: {:?}", path);
        return Ok(());
    }

    println!("Loading file: {:?}", path);
    let buffer = audio::load_wav_file(&path).context("failed to read WAV file")?;
    println!(
        "Loaded. Sample Rate: {}, Channels: {}, Frames: {}",
        buffer.sample_rate(),
        buffer.channel_count(),
        buffer.frame_count()
    );

    let settings = DetectorSettings::default();
    let Some(samples) = buffer.channel(0) else {
        println!("No channels.");
        return Ok(());
    };

    let probes = analysis::end_probes(samples.len(), &settings);
    println!("End probes: {:?}", probes);

    for probe in probes {
        let secs = probe as f32 / buffer.sample_rate().max(1) as f32;
        match analysis::scan_region(samples, probe, &settings) {
            None => println!("Probe {} ({:.2}s): snapped end below {} frames, skipped", probe, secs, settings.min_end_position),
            Some(report) => {
                let verdict = if report.accepted(&settings) { "accepted" } else { "rejected" };
                println!(
                    "Probe {} ({:.2}s) -> end {}, best start {:?}, score {:.2}, {} starts tried, {}",
                    report.probe, secs, report.end, report.best_start, report.score, report.starts_tried, verdict
                );
            }
        }
    }

    println!("--- Final candidates ---");
    let candidates = analysis::detect_loops(&buffer, &settings);
    if candidates.is_empty() {
        println!("None. Fallback: {:?}", analysis::choose_loop(&candidates, buffer.frame_count(), None));
    }
    for (i, c) in candidates.iter().enumerate() {
        println!("{}. {} start {} end {} score {}", i + 1, c.label, c.start, c.end, c.score);
    }

    Ok(())
}
