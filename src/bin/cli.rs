//! Umabase CLI - paddock analysis and race prediction from the terminal

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use umabase::capture::{CaptureError, CaptureMode, MediaCapture, MediaFile};
use umabase::gemini::{GeminiClient, GenerativeModel};
use umabase::{
    load_race, mock_race, AnalysisBook, AppConfig, ConfigOverrides, PaddockAnalysisResult,
    PredictionState, Race, RaceSession, SessionError,
};

/// Polls while a camera warms up before giving up on a frame
const FRAME_WAIT_ATTEMPTS: u32 = 25;
const FRAME_WAIT_MS: u64 = 200;

#[derive(Parser)]
#[command(name = "umabase")]
#[command(author, version, about = "Paddock analysis and race prediction CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Run in interactive mode
    #[arg(short, long)]
    interactive: bool,

    /// Race card JSON (defaults to the built-in sample race)
    #[arg(long)]
    race_file: Option<PathBuf>,

    /// TOML config file
    #[arg(long, env = "UMABASE_CONFIG")]
    config: Option<PathBuf>,

    /// Gemini API key (overrides API_KEY / GEMINI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Gemini model name
    #[arg(long)]
    model: Option<String>,

    /// Camera device passed to ffmpeg
    #[arg(long)]
    camera_device: Option<String>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the race card
    Race,

    /// Analyze one horse in the paddock
    Analyze {
        /// Horse id (e.g. h1)
        #[arg(long)]
        horse: String,

        /// Image or video file
        #[arg(long, conflicts_with = "camera", required_unless_present = "camera")]
        file: Option<PathBuf>,

        /// Capture from the camera instead of a file
        #[arg(long)]
        camera: bool,
    },

    /// Analyze paddock images, then predict the race
    Predict {
        /// Paddock image per horse, as ID=PATH (repeatable)
        #[arg(long = "paddock", value_parser = parse_paddock_arg)]
        paddock: Vec<(String, PathBuf)>,

        /// Number of ranked horses to show
        #[arg(long, default_value = "5")]
        top: usize,
    },
}

fn parse_paddock_arg(s: &str) -> Result<(String, PathBuf), String> {
    let (id, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ID=PATH, got '{}'", s))?;
    if id.is_empty() || path.is_empty() {
        return Err(format!("expected ID=PATH, got '{}'", s));
    }
    Ok((id.to_string(), PathBuf::from(path)))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    println!("{}", "Umabase AI v0.1.0".cyan().bold());
    println!();

    let race = match &cli.race_file {
        Some(path) => load_race(path)
            .with_context(|| format!("Failed to load race from {:?}", path))?,
        None => mock_race(),
    };

    let overrides = ConfigOverrides {
        api_key: cli.api_key.clone(),
        model: cli.model.clone(),
        camera: cli.camera_device.clone(),
        config_file: cli.config.clone(),
    };
    let config = AppConfig::load(&overrides).context("Failed to load configuration")?;

    if !cli.interactive {
        match &cli.command {
            None => {
                println!("Use --help for usage information or --interactive for interactive mode.");
                return Ok(());
            }
            Some(Commands::Race) => {
                print_race_card(&race, &AnalysisBook::new());
                return Ok(());
            }
            Some(_) => {}
        }
    }

    config.require_api_key()?;
    let client =
        GeminiClient::new(config.gemini.clone()).context("Failed to create Gemini client")?;
    println!("{}", format!("Model: {}", client.config().model).dimmed());
    let mut session = RaceSession::new(race, MediaCapture::new(config.capture.clone()), &client);

    // Create runtime for async operations
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    if cli.interactive {
        return run_interactive(&rt, &mut session);
    }

    match cli.command {
        Some(Commands::Analyze { horse, file, camera }) => {
            let mode = if camera {
                CaptureMode::Camera
            } else {
                let path = file.ok_or_else(|| anyhow!("--file or --camera is required"))?;
                CaptureMode::File(media_file(path)?)
            };
            run_analyze(&rt, &mut session, &horse, mode)?;
        }
        Some(Commands::Predict { paddock, top }) => {
            for (horse, path) in paddock {
                let file = match MediaFile::from_path(&path) {
                    Some(file) => file,
                    None => {
                        println!(
                            "{}",
                            format!("Skipping {:?}: not an image or video file", path).yellow()
                        );
                        continue;
                    }
                };
                if let Err(e) = run_analyze(&rt, &mut session, &horse, CaptureMode::File(file)) {
                    println!("{}", format!("{}: {:#}", horse, e).red());
                }
            }
            run_predict(&rt, &mut session, top)?;
        }
        Some(Commands::Race) | None => {}
    }

    Ok(())
}

fn media_file(path: PathBuf) -> Result<MediaFile> {
    MediaFile::from_path(&path)
        .ok_or_else(|| anyhow!("Unsupported media file: {:?} (expected an image or video)", path))
}

fn spinner(msg: String) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(msg);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// Capture and analyze the selected horse, waiting for a live camera to
/// deliver its first frame
async fn analyze_selected<M: GenerativeModel>(
    session: &mut RaceSession<M>,
) -> Result<(), SessionError> {
    let mut attempt = 0;
    loop {
        match session.capture_and_analyze().await {
            Ok(_) => return Ok(()),
            Err(SessionError::Capture(CaptureError::FrameNotReady))
                if attempt + 1 < FRAME_WAIT_ATTEMPTS =>
            {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(FRAME_WAIT_MS)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn run_analyze<M: GenerativeModel>(
    rt: &Runtime,
    session: &mut RaceSession<M>,
    horse_id: &str,
    mode: CaptureMode,
) -> Result<()> {
    let horse = session.select_horse(horse_id)?;
    let name = horse.name.clone();

    let kind = session
        .start_capture(mode)
        .context("Failed to start capture")?;
    debug!("Capturing {} from {:?}", name, kind);

    let pb = spinner(format!("Analyzing {}...", name))?;
    let result = rt.block_on(analyze_selected(session));
    pb.finish_and_clear();
    session.stop_capture();
    result?;

    if let Some(analysis) = session.analysis_for(horse_id) {
        print_analysis(&name, analysis);
    }
    Ok(())
}

fn run_predict<M: GenerativeModel>(
    rt: &Runtime,
    session: &mut RaceSession<M>,
    top: usize,
) -> Result<()> {
    let pb = spinner(format!(
        "Predicting {} ({} paddock analyses)...",
        session.race().name,
        session.analyses().len()
    ))?;
    rt.block_on(session.run_prediction());
    pb.finish_and_clear();

    match session.prediction_state() {
        PredictionState::Failed(e) => {
            println!("{}", format!("予想に失敗しました: {}", e).red());
        }
        PredictionState::Succeeded(_) => print_prediction(session, top),
        PredictionState::NotRun | PredictionState::Running => {}
    }
    Ok(())
}

fn print_race_card(race: &Race, analyses: &AnalysisBook) {
    println!(
        "{}: {} / {} {}m / {} / {}",
        "Race".green(),
        race.name,
        race.venue,
        race.distance,
        race.weather,
        race.track_condition
    );
    println!();

    println!("{}", "出馬表 (Race Card):".yellow().bold());
    println!(
        "{:>4} {:>4} {:<14} {:<10} {:>5} {:>6} {:<8} {:>8}",
        "ID", "馬番", "馬名", "騎手", "斤量", "オッズ", "近走", "パドック"
    );
    println!("{}", "-".repeat(72));

    for h in &race.horses {
        let positions: Vec<String> = h.last_positions.iter().map(|p| p.to_string()).collect();
        let paddock = match analyses.get(&h.id) {
            Some(a) => format!("{:.1}", a.score),
            None => "-".to_string(),
        };
        println!(
            "{:>4} {:>4} {:<14} {:<10} {:>5.1} {:>6.1} {:<8} {:>8}",
            h.id,
            h.number,
            truncate_name(&h.name, 14),
            truncate_name(&h.jockey, 10),
            h.weight,
            h.odds,
            positions.join("-"),
            paddock
        );
    }
    println!();
}

fn print_analysis(name: &str, analysis: &PaddockAnalysisResult) {
    println!("{}", "パドック診断 (Paddock Analysis):".yellow().bold());
    let score = format!("{:.1}", analysis.score);
    let score = if analysis.score >= 8.0 {
        score.green().bold()
    } else if analysis.score < 5.0 {
        score.red()
    } else {
        score.normal()
    };
    println!("{} スコア: {} / 10", name.bold(), score);
    println!("{}", analysis.feedback);
    println!(
        "{}",
        analysis
            .analyzed_at
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_prediction<M: GenerativeModel>(session: &RaceSession<M>, top: usize) {
    let ranking = session.ranking();
    if ranking.is_empty() {
        println!("{}", "No predictions returned.".yellow());
        return;
    }

    println!("{}", "AI予想 (Win Probabilities):".yellow().bold());
    println!(
        "{:>2} {:>4} {:<14} {:>8} {:>6} {:>6} {:>8}",
        "印", "馬番", "馬名", "勝率", "オッズ", "EV", "パドック"
    );
    println!("{}", "-".repeat(60));

    let entries = ranking.entries();
    for entry in entries.iter().take(top) {
        let mark = entry.mark.unwrap_or(" ");
        let (number, name, odds) = match entry.horse {
            Some(h) => (h.number.to_string(), truncate_name(&h.name, 14), format!("{:.1}", h.odds)),
            None => ("?".to_string(), entry.prediction.horse_id.clone(), "-".to_string()),
        };
        let ev = entry
            .expected_value
            .map(|ev| format!("{:.2}", ev))
            .unwrap_or_else(|| "-".to_string());
        let ev = if entry.is_value_bet() {
            ev.green().bold()
        } else {
            ev.normal()
        };
        let paddock = session
            .analysis_for(&entry.prediction.horse_id)
            .map(|a| format!("{:.1}", a.score))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:>2} {:>4} {:<14} {:>7.1}% {:>6} {:>6} {:>8}",
            mark,
            number,
            name,
            entry.prediction.win_probability * 100.0,
            odds,
            ev,
            paddock
        );
    }
    println!();

    println!("{}", "予想根拠 (Reasoning):".yellow().bold());
    for entry in entries.iter().take(top) {
        let label = match entry.horse {
            Some(h) => format!("{} {}", h.number, h.name),
            None => entry.prediction.horse_id.clone(),
        };
        println!("{} {}", label.bold(), entry.prediction.reasoning);
    }
    println!();

    println!("{}", "推奨買い目 (Suggested Tickets):".yellow().bold());
    let quinella = ranking.quinella();
    let trio = ranking.trio();
    println!("{:<6} {}", quinella.kind.label(), quinella);
    println!("{:<6} {}", trio.kind.label(), trio);

    let value_bets: Vec<String> = entries
        .iter()
        .filter(|e| e.is_value_bet())
        .filter_map(|e| e.horse.map(|h| h.number.to_string()))
        .collect();
    if !value_bets.is_empty() {
        println!("{:<6} {}", "単勝", value_bets.join(", ").green());
    }
    println!();
}

fn run_interactive<M: GenerativeModel>(rt: &Runtime, session: &mut RaceSession<M>) -> Result<()> {
    println!("{}", "Interactive mode".green().bold());
    println!();

    let theme = ColorfulTheme::default();

    loop {
        let selected = session
            .selected_horse()
            .map(|h| format!("{} {}", h.number, h.name))
            .unwrap_or_else(|| "none".to_string());
        let source = session
            .capture()
            .describe_source()
            .unwrap_or_else(|| "none".to_string());
        println!("{} {}  {} {}", "Horse:".dimmed(), selected, "Source:".dimmed(), source);

        let options = vec![
            "Show race card",
            "Select horse",
            "Load image/video file",
            "Start camera",
            "Capture & analyze",
            "Stop capture",
            "Run prediction",
            "Quit",
        ];

        let selection = Select::with_theme(&theme)
            .with_prompt("What would you like to do?")
            .items(&options)
            .default(0)
            .interact()?;

        match selection {
            0 => {
                println!();
                print_race_card(session.race(), session.analyses());
            }
            1 => {
                let labels: Vec<String> = session
                    .race()
                    .horses
                    .iter()
                    .map(|h| format!("{:>2} {}", h.number, h.name))
                    .collect();
                let idx = Select::with_theme(&theme)
                    .with_prompt("Horse")
                    .items(&labels)
                    .default(0)
                    .interact()?;
                let id = session.race().horses[idx].id.clone();
                session.select_horse(&id)?;
            }
            2 => {
                let path: String = Input::with_theme(&theme)
                    .with_prompt("File path")
                    .allow_empty(true)
                    .interact_text()?;
                let path = path.trim();
                if path.is_empty() {
                    continue;
                }
                match MediaFile::from_path(path) {
                    Some(file) => match session.start_capture(CaptureMode::File(file)) {
                        Ok(_) => println!("{}", "File loaded.".green()),
                        Err(e) => println!("{}", e.to_string().red()),
                    },
                    None => {
                        debug!("Ignoring unsupported file {}", path);
                        println!("{}", "No file selected.".dimmed());
                    }
                }
            }
            3 => match session.start_capture(CaptureMode::Camera) {
                Ok(_) => println!("{}", "Camera started.".green()),
                Err(e) => println!(
                    "{}",
                    format!("カメラへのアクセスを許可してください: {}", e).red()
                ),
            },
            4 => {
                let Some(name) = session.selected_horse().map(|h| h.name.clone()) else {
                    println!("{}", "Select a horse first.".yellow());
                    continue;
                };
                let pb = spinner(format!("Analyzing {}...", name))?;
                let result = rt.block_on(analyze_selected(session));
                pb.finish_and_clear();

                match result {
                    Ok(()) => {
                        let analysis = session
                            .selected_horse()
                            .and_then(|h| session.analysis_for(&h.id));
                        if let Some(analysis) = analysis {
                            print_analysis(&name, analysis);
                        }
                    }
                    Err(e) => println!("{}", format!("Analysis failed: {}", e).red()),
                }
            }
            5 => {
                session.stop_capture();
                println!("{}", "Capture stopped.".dimmed());
            }
            6 => {
                if session.analyses().is_empty() {
                    let proceed = Confirm::with_theme(&theme)
                        .with_prompt("パドック診断が未実施です。このまま予想しますか？")
                        .default(false)
                        .interact()?;
                    if !proceed {
                        continue;
                    }
                }
                println!();
                let field = session.race().horses.len();
                run_predict(rt, session, field)?;
            }
            7 => {
                println!("Goodbye!");
                break;
            }
            _ => {}
        }
    }

    Ok(())
}

/// Truncate name to fit display width
fn truncate_name(name: &str, max_len: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= max_len {
        name.to_string()
    } else {
        chars[..max_len - 1].iter().collect::<String>() + "…"
    }
}
