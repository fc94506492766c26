// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! `ringrec` - recorder daemon, control client and capture simulator.

mod client;
mod protocol;
mod server;
mod simulate;

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand, builder::BoolishValueParser};
use ringrec::{EngineContext, FrameRate, Recorder, RecorderSettings, TestPattern, Timecode};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

use crate::{
    protocol::{Request, Response},
    simulate::SimulateOptions,
};

type BoxError = Box<dyn std::error::Error>;

/// Multi-channel ring buffer recorder
#[derive(Parser, Debug)]
#[command(name = "ringrec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Recorder settings file
    #[arg(long, global = true, env = "RINGREC_CONFIG", default_value = "/etc/ringrec/settings.json")]
    config: PathBuf,

    /// Control socket path
    #[arg(long, global = true, env = "RINGREC_SOCKET", default_value = "/run/ringrec/control.sock")]
    socket: PathBuf,

    /// Ring buffer domain directory (overrides the settings file)
    #[arg(long, global = true, env = "RINGREC_DOMAIN")]
    domain: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Attach to the rings and serve the control socket
    Run,
    /// Start recording
    Start {
        /// Start timecode (hh:mm:ss:ff); omitted to start now
        #[arg(long)]
        at: Option<String>,

        /// Frames to record before the start timecode
        #[arg(long, default_value_t = 0)]
        pre_roll: i64,

        /// Per-track enable flags, channels first, then quad (e.g. 1,1,0,0,1)
        #[arg(long, value_delimiter = ',', value_parser = BoolishValueParser::new())]
        enable: Vec<bool>,

        /// Project name written to the recordings
        #[arg(long, default_value = "")]
        project: String,
    },
    /// Stop recording
    Stop {
        /// Stop timecode (hh:mm:ss:ff); omitted to stop now
        #[arg(long)]
        at: Option<String>,

        /// Frames to record after the stop point
        #[arg(long, default_value_t = 0)]
        post_roll: i64,

        /// Description written to the recordings
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Show per-track status
    Status,
    /// Reload the daemon's settings file
    UpdateConfig,
    /// Publish rings and fill them with test-pattern frames
    Simulate {
        #[arg(long, default_value_t = 4)]
        channels: usize,

        #[arg(long, default_value_t = 125)]
        ring_len: usize,

        #[arg(long, default_value_t = 720)]
        width: usize,

        #[arg(long, default_value_t = 576)]
        height: usize,

        /// Frame rate as `fps` or `numerator/denominator`
        #[arg(long, default_value = "25", value_parser = parse_frame_rate)]
        rate: FrameRate,

        /// Timecode of the first frame
        #[arg(long, default_value = "10:00:00:00")]
        start: String,

        /// Frames each channel lags behind the previous one
        #[arg(long, default_value_t = 0)]
        skew: i64,

        /// Frames to produce per channel (0 runs until killed)
        #[arg(long, default_value_t = 0)]
        frames: u64,

        /// Corrupt every n-th LTC codeword (0 never)
        #[arg(long, default_value_t = 0)]
        ltc_dropout: u64,
    },
}

fn parse_frame_rate(text: &str) -> Result<FrameRate, String> {
    let (numerator, denominator) = match text.split_once('/') {
        Some((numerator, denominator)) => (numerator.trim(), denominator.trim()),
        None => (text.trim(), "1"),
    };
    let numerator = numerator.parse().map_err(|_| format!("Invalid rate: {text}"))?;
    let denominator = denominator.parse().map_err(|_| format!("Invalid rate: {text}"))?;
    FrameRate::new(numerator, denominator).map_err(|error| error.to_string())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(error) => {
            error!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, BoxError> {
    let request = match cli.command {
        Commands::Run => return serve(&cli.config, cli.domain, &cli.socket),
        Commands::Simulate {
            channels,
            ring_len,
            width,
            height,
            rate,
            start,
            skew,
            frames,
            ltc_dropout,
        } => {
            let options = SimulateOptions {
                domain: cli
                    .domain
                    .unwrap_or_else(|| PathBuf::from("/dev/shm/ringrec")),
                channels,
                ring_len,
                frame_rate: rate,
                width,
                height,
                start: Timecode::try_from_text_at(&start, rate)?,
                skew,
                frames,
                ltc_dropout,
                realtime: true,
            };
            simulate::run(&options, &TestPattern::default())?;
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Start {
            at,
            pre_roll,
            enable,
            project,
        } => Request::Start {
            start_timecode: at,
            pre_roll,
            enabled: enable,
            project,
        },
        Commands::Stop {
            at,
            post_roll,
            description,
        } => Request::Stop {
            stop_timecode: at,
            post_roll,
            description,
            locators: Vec::new(),
        },
        Commands::Status => Request::TracksStatus,
        Commands::UpdateConfig => Request::UpdateConfig,
    };

    let response = client::send(&cli.socket, &request)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(match response {
        Response::Error { .. } => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

fn serve(
    config: &std::path::Path,
    domain: Option<PathBuf>,
    socket: &std::path::Path,
) -> Result<ExitCode, BoxError> {
    let mut settings = RecorderSettings::load(config)?;
    if let Some(domain) = domain {
        settings.domain = domain;
    }
    info!(
        "Recorder '{}' attaching to {}",
        settings.recorder_name,
        settings.domain.display()
    );
    let context = EngineContext::attach(&settings)?;
    let recorder = Arc::new(Recorder::new(context, settings).with_settings_path(config));
    let listener = server::bind(socket)?;
    server::serve(listener, recorder)?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_start_with_enable_flags() {
        let cli = Cli::try_parse_from([
            "ringrec", "start", "--at", "10:00:00:00", "--pre-roll", "5", "--enable", "1,0,true",
        ])
        .unwrap();
        match cli.command {
            Commands::Start {
                at,
                pre_roll,
                enable,
                ..
            } => {
                assert_eq!(at.as_deref(), Some("10:00:00:00"));
                assert_eq!(pre_roll, 5);
                assert_eq!(enable, vec![true, false, true]);
            }
            other => panic!("Unexpected command {other:?}"),
        }
    }

    #[test]
    fn frame_rates_parse_as_fraction_or_integer() {
        assert_eq!(parse_frame_rate("25").unwrap(), FrameRate::PAL);
        assert_eq!(parse_frame_rate("30000/1001").unwrap(), FrameRate::NTSC);
        assert!(parse_frame_rate("fast").is_err());
    }
}
