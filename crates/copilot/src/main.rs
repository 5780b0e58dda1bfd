//! Curve Co-Pilot - Main Entry Point

use anyhow::Context;
use callout_scheduler::CalloutStyle;
use clap::{Args, Parser, Subcommand, ValueEnum};
use copilot::{
    demo_route, detect_events, init_logging, run_simulation, spawn_speaker, CopilotConfig,
    LogAnnouncer, RouteEvents, RouteFile, Session,
};
use route_geometry::DistanceIndex;
use std::path::PathBuf;
use tracing::info;

/// Curve co-pilot: find curves on a route and rehearse the callouts
#[derive(Parser, Debug)]
#[command(name = "copilot", version)]
#[command(about = "Detect curves on a route and simulate co-pilot callouts", long_about = None)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print detected events as JSON
    Detect {
        /// Route JSON file
        #[arg(short, long)]
        route: PathBuf,

        /// Detection strategy
        #[arg(short, long, value_enum, default_value_t = Strategy::Curves)]
        strategy: Strategy,
    },
    /// Drive a simulated vehicle along a route file
    Simulate {
        /// Route JSON file
        #[arg(short, long)]
        route: PathBuf,

        #[command(flatten)]
        drive: DriveArgs,
    },
    /// Drive the built-in demo route
    Demo {
        #[command(flatten)]
        drive: DriveArgs,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    /// Discrete curves with pace-note severities
    Curves,
    /// Zone-aware flow sampling
    Flow,
}

#[derive(Args, Debug)]
struct DriveArgs {
    /// Vehicle speed in m/s
    #[arg(long)]
    speed: Option<f64>,

    /// Simulation speed-up factor
    #[arg(short, long)]
    acceleration: Option<f64>,

    /// Tick period in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Log callouts instead of simulating speech timing
    #[arg(long)]
    instant: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json).context("Failed to set tracing subscriber")?;

    info!("=== Curve Co-Pilot v{} ===", env!("CARGO_PKG_VERSION"));
    let config =
        CopilotConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Detect { route, strategy } => {
            let route = RouteFile::load(&route)?;
            detect(&config, &route, strategy)
        }
        Command::Simulate { route, drive } => {
            let route = RouteFile::load(&route)?;
            simulate(config, &route, drive).await
        }
        Command::Demo { drive } => simulate(config, &demo_route(), drive).await,
    }
}

fn detect(config: &CopilotConfig, route: &RouteFile, strategy: Strategy) -> anyhow::Result<()> {
    let index = DistanceIndex::build(&route.points);
    let style = match strategy {
        Strategy::Curves => CalloutStyle::Rally,
        Strategy::Flow => CalloutStyle::Advisory,
    };
    let json = match detect_events(config, style, &index, &route.zones) {
        RouteEvents::Curves(events) => serde_json::to_string_pretty(&events[..])?,
        RouteEvents::Flow(events) => serde_json::to_string_pretty(&events[..])?,
    };
    println!("{}", json);
    Ok(())
}

async fn simulate(
    mut config: CopilotConfig,
    route: &RouteFile,
    drive: DriveArgs,
) -> anyhow::Result<()> {
    if let Some(speed) = drive.speed {
        config.simulation.speed_mps = speed;
    }
    if let Some(acceleration) = drive.acceleration {
        config.simulation.time_acceleration = acceleration;
    }
    if let Some(tick_ms) = drive.tick_ms {
        config.simulation.tick_ms = tick_ms;
    }
    let simulation = config.simulation.clone();
    let speaker_config = config.speaker.clone();

    let mut session = Session::new(config);
    session.load_route(route).context("Failed to load route")?;

    let report = if drive.instant {
        let mut announcer = LogAnnouncer::new();
        run_simulation(&mut session, &simulation, &mut announcer, None).await?
    } else {
        let (mut speaker, mut completions, task) = spawn_speaker(speaker_config);
        let report =
            run_simulation(&mut session, &simulation, &mut speaker, Some(&mut completions)).await?;
        drop(speaker);
        task.await.context("Speaker task failed")?;
        report
    };

    if drive.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for callout in &report.callouts {
            println!(
                "{:>7.0} m  {:<5}  {:<6}  {}",
                callout.distance_m,
                callout.kind,
                format!("{:?}", callout.priority),
                callout.text
            );
        }
        println!(
            "{} callouts over {:.1} km ({} throttled, {} preempted)",
            report.callouts.len(),
            report.route_length_m / 1_000.0,
            report.scheduler.throttled,
            report.scheduler.preempted
        );
    }
    Ok(())
}
