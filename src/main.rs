use anyhow::{bail, Context, Result};
use clap::Parser;
use seamloop::{analysis, audio, export, DetectorSettings, LoopCandidate};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about = "Find seamless loop points and write them into WAV smpl chunks", long_about = None)]
struct Cli {
    /// WAV files to process
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Directory for the looped files (defaults to each input's directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Candidate to export, 1 is the best
    #[arg(short, long, default_value_t = 1)]
    pick: usize,
    /// Manual loop start, overrides detection
    #[arg(long, requires = "end")]
    start: Option<usize>,
    /// Manual loop end, overrides detection
    #[arg(long, requires = "start")]
    end: Option<usize>,
    /// Write a plain file without a loop chunk
    #[arg(long, conflicts_with_all = ["start", "end"])]
    no_loop: bool,
    /// Only print candidates, write nothing
    #[arg(short, long)]
    list: bool,
    /// Re-read each written file and check its loop chunk
    #[arg(long)]
    verify: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let settings = DetectorSettings::default();

    let mut failed = 0;
    for input in &cli.inputs {
        if let Err(e) = process_file(&cli, input, &settings) {
            log::error!("{}: {:#}", input.display(), e);
            eprintln!("Failed: {:?}: {:#}", input, e);
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{} of {} files failed", failed, cli.inputs.len());
    }
    Ok(())
}

fn process_file(cli: &Cli, input: &Path, settings: &DetectorSettings) -> Result<()> {
    log::info!("Loading {}", input.display());
    let buffer = audio::load_wav_file(input).context("failed to read WAV file")?;
    println!(
        "{:?}: {} Hz, {} channels, {:.2}s",
        input,
        buffer.sample_rate(),
        buffer.channel_count(),
        buffer.duration().as_secs_f32()
    );

    let candidates = analysis::detect_loops(&buffer, settings);
    if candidates.is_empty() {
        println!("No clear loop detected.");
    }
    for c in &candidates {
        println!("  {}: {}..{} (score {})", c.label, c.start, c.end, c.score);
    }

    if cli.list {
        return Ok(());
    }

    let chosen: Option<LoopCandidate> = if cli.no_loop {
        None
    } else {
        let index = cli.pick.checked_sub(1).context("--pick counts from 1")?;
        let picked = analysis::select_loop(&candidates, buffer.frame_count(), index)?;
        match (cli.start, cli.end) {
            (Some(start), Some(end)) => Some(
                picked
                    .unwrap_or_else(|| LoopCandidate::whole_buffer(buffer.frame_count()))
                    .with_bounds(start, end),
            ),
            _ => {
                if picked.is_none() {
                    println!("Too short to loop, writing a plain file.");
                }
                picked
            }
        }
    };

    let output = output_path(input, cli.output_dir.as_deref())?;
    match &chosen {
        Some(lp) => println!("Exporting {}..{} to {:?}", lp.start, lp.end, output),
        None => println!("Exporting without loop to {:?}", output),
    }
    export::export_wav(&output, &buffer, chosen.as_ref())
        .with_context(|| format!("failed to write {:?}", output))?;

    if cli.verify {
        let written = std::fs::read(&output).context("failed to re-read output")?;
        let found = export::read_loop_points(&written);
        let expected = chosen.as_ref().map(|lp| (lp.start, lp.end));
        if found != expected {
            bail!("loop chunk mismatch: wrote {:?}, read {:?}", expected, found);
        }
        log::info!("Verified {}", output.display());
    }

    println!("Export complete.");
    Ok(())
}

fn output_path(input: &Path, output_dir: Option<&Path>) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .context("input has no file name")?
        .to_string_lossy();
    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    Ok(dir.join(format!("{}_loop.wav", stem)))
}
