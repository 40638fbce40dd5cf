use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use stagelight_core::{
    AppConfig, MainsSource, PlayStatus, ShowDescription, ShowRig, StagelightError,
};
use tracing_subscriber::EnvFilter;

fn main() -> stagelight_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            show,
            config,
            seconds,
        } => run_play(show.as_deref(), config.as_deref(), seconds),
        Commands::Inspect { show } => run_inspect(show.as_deref()),
        Commands::DemoShow { output } => run_demo_show(&output),
    }
}

fn load_show(path: Option<&Path>) -> stagelight_core::Result<ShowDescription> {
    match path {
        Some(path) => ShowDescription::from_path(path),
        None => Ok(ShowDescription::demo()),
    }
}

fn run_play(
    show: Option<&Path>,
    config: Option<&Path>,
    seconds: u32,
) -> stagelight_core::Result<()> {
    let config = match config {
        Some(path) => AppConfig::from_path(path)?,
        None => AppConfig::default(),
    };
    let (storyboard, report) = load_show(show)?.into_storyboard();
    if !report.is_clean() {
        tracing::warn!(rejected = report.rejected.len(), "show loaded with rejections");
    }
    tracing::info!(
        ?show,
        timelines = storyboard.timelines_count(),
        duration_ms = storyboard.duration(),
        crc = storyboard.calc_crc32(0),
        "starting simulated playback"
    );

    let (mut rig, _outputs) = ShowRig::simulated(&config, storyboard)?;
    rig.player_mut().play()?;

    let ticks_per_second = u64::from(config.timing.ticks_per_second);
    let crossing_every = u64::from(config.timing.nominal_ticks_per_crossing());
    let triac = rig.triac();
    let relay = rig.relay();

    for tick in 1..=u64::from(seconds) * ticks_per_second {
        // Stand-in for the edge interrupt when the board expects external crossings.
        if config.timing.mains == MainsSource::External && tick % crossing_every == 0 {
            triac.zero_crossing();
        }

        match rig.player_mut().main_loop() {
            Err(StagelightError::EmptyShow) => {
                tracing::warn!("show has nothing to play, stopping simulation");
                break;
            }
            other => other?,
        }
        rig.tick()?;

        if tick % ticks_per_second == 0 {
            let relays: Vec<String> = relay
                .pending()?
                .iter()
                .map(|group| format!("{group:08b}"))
                .collect();
            let dimmers = triac.values()?;
            tracing::info!(
                second = tick / ticks_per_second,
                time_ms = rig.player().storyboard_time(),
                status = ?rig.player().status(),
                ?dimmers,
                ?relays,
                mains_hz = triac.measured_frequency(),
                stable = triac.input_is_stable(),
                "snapshot"
            );
        }
    }

    if rig.player().status() == PlayStatus::Playing {
        rig.player_mut().stop();
    }
    Ok(())
}

fn run_inspect(show: Option<&Path>) -> stagelight_core::Result<()> {
    let (storyboard, report) = load_show(show)?.into_storyboard();

    println!("duration: {} ms", storyboard.duration());
    println!("timelines: {}", storyboard.timelines_count());
    for timeline in storyboard.timelines() {
        println!(
            "  channel {:>2} ({:?}): {} entries",
            timeline.output_id(),
            timeline.channel().kind(),
            timeline.entries_count()
        );
        for entry in timeline.entries() {
            println!(
                "    t={:>6} ms value={:>3} over {} ms",
                entry.time, entry.value, entry.duration
            );
        }
    }
    for rejection in &report.rejected {
        println!(
            "  rejected: channel {} entry {:?}: {}",
            rejection.output_id, rejection.entry_index, rejection.error
        );
    }
    println!("crc32: {:#010x}", storyboard.calc_crc32(0));
    Ok(())
}

fn run_demo_show(output: &Path) -> stagelight_core::Result<()> {
    tracing::info!(?output, "writing demo show");
    std::fs::write(output, ShowDescription::demo().to_json_pretty()?)?;
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Storyboard player for TRIAC dimmer and relay boards", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a show on simulated boards in virtual time.
    Play {
        /// Show description to play; the built-in demo when omitted.
        #[arg(short, long)]
        show: Option<PathBuf>,
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Simulated seconds to run.
        #[arg(long, default_value_t = 5)]
        seconds: u32,
    },
    /// Print the timelines, entries and checksum of a show.
    Inspect {
        /// Show description to inspect; the built-in demo when omitted.
        #[arg(short, long)]
        show: Option<PathBuf>,
    },
    /// Write the built-in demo show as JSON.
    DemoShow {
        /// Output path for the show description.
        output: PathBuf,
    },
}
