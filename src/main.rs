use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use vox_assistant::voice::{CaptureDevice, MicCapture, ReplyPlayer, SpeakerPlayback};
use vox_assistant::{BackendClient, Config, Session, SessionState};

/// Vox - voice command assistant
#[derive(Parser)]
#[command(name = "vox", version, about)]
struct Cli {
    /// Path to a config file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL override
    #[arg(long, env = "VOX_BACKEND_URL")]
    backend_url: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,vox_assistant=info",
        1 => "info,vox_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref(), cli.backend_url.as_deref())?;

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(&config, duration).await,
            Command::TestSpeaker => test_speaker().await,
        };
    }

    tracing::info!(backend = %config.backend.base_url, "vox assistant starting");

    let capture = MicCapture::new(config.capture.sample_rate);
    let transport = BackendClient::new(&config.backend)?;
    let playback = SpeakerPlayback::new();

    let session = Session::new(capture, transport, playback);
    let transcript = session.transcript();
    let mut state_rx = session.watch_state();

    let (tap_tx, tap_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

    // Terminal front: every Enter press is one mic tap; EOF shuts down.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            if line.is_err() || tap_tx.blocking_send(()).is_err() {
                break;
            }
        }
        let _ = shutdown_tx.blocking_send(());
    });

    // Print new transcript entries and the mic prompt on each transition.
    tokio::spawn(async move {
        let mut printed = 0usize;
        loop {
            let state = *state_rx.borrow_and_update();
            let entries = transcript.snapshot();
            for entry in &entries[printed..] {
                let who = match entry.sender {
                    vox_assistant::Sender::User => "you",
                    vox_assistant::Sender::Assistant => "vox",
                };
                println!("[{who}] {}", entry.text);
            }
            printed = entries.len();

            match state {
                SessionState::Idle => println!("(press Enter to record)"),
                SessionState::Recording => println!("(recording... press Enter to stop)"),
                SessionState::Sending => println!("(processing...)"),
                SessionState::PlayingReply => println!("(playing reply...)"),
            }

            if state_rx.changed().await.is_err() {
                break;
            }
        }
    });

    session.run(tap_rx, shutdown_rx).await;

    tracing::info!("vox assistant stopped");
    Ok(())
}

/// Record for `duration` seconds and report what was captured
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    let mut capture = MicCapture::new(config.capture.sample_rate);

    println!("Recording for {duration}s...");
    let handle = capture.begin()?;
    tokio::time::sleep(Duration::from_secs(duration)).await;

    let artifact = capture.end(handle)?;
    println!(
        "Captured {} bytes of {}",
        artifact.bytes.len(),
        artifact.content_type
    );
    Ok(())
}

/// Play a short test tone through the playback component
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    let sample_rate = 24000u32;
    let tone: Vec<f32> = (0..sample_rate)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.2 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
        })
        .collect();
    let wav = vox_assistant::voice::samples_to_wav(&tone, sample_rate)?;

    let mut playback = SpeakerPlayback::new();
    let handle = playback.load_bytes(&wav)?;
    println!("Playing test tone...");
    playback.play_to_completion(&handle).await?;
    playback.unload(handle).await;
    println!("Done.");
    Ok(())
}
