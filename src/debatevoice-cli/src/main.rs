//! DebateVoice CLI - spoken debate rebuttals
//!
//! Generates rebuttals with an OpenAI-compatible model and speaks them with
//! whichever text-to-speech provider is working.

use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use debatevoice_core::{
    Config, Player, Position, ProviderKind, RebuttalGenerator, ResourceTracker, SynthesisEvent,
    Synthesizer,
};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "debatevoice.toml";

#[derive(Parser)]
#[command(
    name = "debatevoice",
    version,
    about = "Spoken debate rebuttals with multi-provider text-to-speech",
    long_about = "A CLI that generates debate rebuttals with an OpenAI-compatible model and speaks them, falling back across ElevenLabs, a local Kokoro engine and Google TTS."
)]
struct Cli {
    /// Path to a TOML config file (defaults to ./debatevoice.toml when present)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Speak a piece of text
    Speak {
        /// The text to speak
        #[arg(value_name = "TEXT")]
        text: String,

        #[command(flatten)]
        voice: VoiceArgs,

        /// Copy the synthesized audio to this file before cleanup
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Show which TTS providers are available
    Providers,

    /// Debate interactively: type your arguments, hear the rebuttals
    Debate {
        /// The debate motion (prompted for when omitted)
        #[arg(short, long, value_name = "MOTION")]
        motion: Option<String>,

        /// Your position, for or against (prompted for when omitted)
        #[arg(short, long, value_name = "POSITION")]
        position: Option<String>,

        /// Model name (overrides the config file)
        #[arg(long, value_name = "MODEL")]
        model: Option<String>,

        /// Answer straight away instead of asking before each rebuttal
        #[arg(long)]
        no_pause: bool,

        #[command(flatten)]
        voice: VoiceArgs,
    },
}

#[derive(clap::Args)]
struct VoiceArgs {
    /// Voice ID for providers that support voice selection
    #[arg(long, value_name = "VOICE_ID")]
    voice: Option<String>,

    /// Provider to try, in order (repeat to build a fallback order)
    #[arg(long = "provider", action = ArgAction::Append, value_name = "PROVIDER")]
    providers: Vec<String>,

    /// Do not play the audio
    #[arg(long)]
    no_play: bool,
}

impl VoiceArgs {
    fn fallback_order(
        &self,
        synthesizer: &Synthesizer,
    ) -> Result<Vec<ProviderKind>, Box<dyn std::error::Error>> {
        if self.providers.is_empty() {
            return Ok(synthesizer.fallback_order().to_vec());
        }
        let order = self
            .providers
            .iter()
            .map(|p| p.parse::<ProviderKind>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(order)
    }

    fn voice_id<'a>(&'a self, config: &'a Config) -> &'a str {
        self.voice.as_deref().unwrap_or(&config.tts.default_voice_id)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;

    // Every temporary audio file is owned here; anything still tracked is
    // deleted when this is dropped.
    let tracker = Arc::new(ResourceTracker::new());

    let result = tokio::select! {
        result = run(cli.command, &config, tracker.clone()) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    tracker.cleanup_all().await;

    match result {
        Some(result) => result,
        None => {
            // A pending stdin read would keep the runtime from shutting down.
            eprintln!();
            eprintln!("{}", "Interrupted.".yellow());
            std::process::exit(130);
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Ok(Config::load(DEFAULT_CONFIG_FILE)?),
        None => Ok(Config::default()),
    }
}

async fn run(
    command: Command,
    config: &Config,
    tracker: Arc<ResourceTracker>,
) -> Result<(), Box<dyn std::error::Error>> {
    let elevenlabs_key = env::var("ELEVEN_LABS_API_KEY").ok();
    let synthesizer = Synthesizer::from_config(config, elevenlabs_key, tracker.clone())
        .await
        .with_callback(create_console_callback());
    let player = Player::new(tracker);

    match command {
        Command::Providers => {
            print_providers(&synthesizer);
            Ok(())
        }
        Command::Speak {
            text,
            voice,
            output,
        } => {
            let order = voice.fallback_order(&synthesizer)?;
            let artifact = synthesizer
                .speak_with_order(&text, voice.voice_id(config), &order)
                .await?;

            let outcome = async {
                if let Some(output) = &output {
                    tokio::fs::copy(&artifact.path, output).await?;
                    println!("{} {}", "Saved:".bold(), output.display());
                }
                if !voice.no_play {
                    player.play(&artifact).await?;
                }
                Ok::<_, Box<dyn std::error::Error>>(())
            }
            .await;

            synthesizer.release(&artifact).await;
            outcome
        }
        Command::Debate {
            motion,
            position,
            model,
            no_pause,
            voice,
        } => {
            let mut llm = config.llm.clone();
            if let Some(model) = model {
                llm.model = model;
            }
            let session = DebateSession {
                synthesizer: &synthesizer,
                player: &player,
                voice_id: voice.voice_id(config),
                order: voice.fallback_order(&synthesizer)?,
                play: !voice.no_play,
                pause: !no_pause,
            };
            session.run(llm, motion, position).await
        }
    }
}

fn print_providers(synthesizer: &Synthesizer) {
    println!();
    println!("{}", "TTS providers:".bold());
    for d in synthesizer.descriptors() {
        let status = if d.available {
            "available".green()
        } else {
            "unavailable".red()
        };
        let voices = if d.voice_identity {
            "voice selection"
        } else {
            "fixed voice"
        };
        println!(
            "  {:<12} {:<12} max {} chars, {}",
            d.kind.to_string().bright_cyan(),
            status,
            d.max_chars,
            voices.dimmed()
        );
    }
    let order: Vec<String> = synthesizer
        .fallback_order()
        .iter()
        .map(|k| k.to_string())
        .collect();
    println!();
    println!("{} {}", "Fallback order:".bold(), order.join(" → "));
    println!();
}

struct DebateSession<'a> {
    synthesizer: &'a Synthesizer,
    player: &'a Player,
    voice_id: &'a str,
    order: Vec<ProviderKind>,
    play: bool,
    pause: bool,
}

impl DebateSession<'_> {
    async fn run(
        &self,
        llm: debatevoice_core::config::LlmConfig,
        motion: Option<String>,
        position: Option<String>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let api_base = env::var("OPENAI_API_BASE")
            .or_else(|_| env::var("OPENAI_BASE_URL"))
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
            eprintln!(
                "{}",
                "Warning: OPENAI_API_KEY not set. API calls may fail.".yellow()
            );
            String::new()
        });

        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        let motion = match motion {
            Some(motion) => motion,
            None => prompt(&mut lines, "Enter the debate motion: ").await?,
        };
        let position = match position {
            Some(position) => position.parse::<Position>()?,
            None => loop {
                let answer = prompt(&mut lines, "Enter your position (for/against): ").await?;
                match answer.parse::<Position>() {
                    Ok(position) => break position,
                    Err(_) => eprintln!("{}", "Please enter either 'for' or 'against'.".yellow()),
                }
            },
        };

        let mut generator = RebuttalGenerator::new(api_base, api_key, llm);
        generator.set_context(position, &motion);
        info!("Debating '{}' ({})", motion, position);

        if position == Position::For {
            println!();
            println!("{}", "Presenting opening arguments...".bright_magenta());
            let opening = generator.opening().await?;
            self.deliver("Opening Arguments", &opening).await;
        }

        loop {
            println!();
            let input = prompt(&mut lines, "Type your argument (or 'exit' to quit): ").await?;
            if input.eq_ignore_ascii_case("exit") {
                break;
            }
            if input.is_empty() {
                continue;
            }

            if self.pause {
                wait_for_confirmation(&mut lines).await?;
            }

            match generator.rebut(&input).await {
                Ok(rebuttal) => self.deliver("Rebuttal", &rebuttal).await,
                Err(e) => eprintln!("{} {}", "Error:".red().bold(), e),
            }
            debug!("{} messages in conversation", generator.history_len());
        }

        Ok(())
    }

    /// Print, speak and release one reply. Failures are reported and the debate goes on.
    async fn deliver(&self, label: &str, text: &str) {
        println!();
        println!("{}", format!("{}:", label).bright_cyan().bold());
        for line in textwrap(text, 66).lines() {
            println!("  {}", line);
        }

        let artifact = match self
            .synthesizer
            .speak_with_order(text, self.voice_id, &self.order)
            .await
        {
            Ok(artifact) => artifact,
            Err(e) => {
                eprintln!("{} {}", "Speech failed:".red().bold(), e);
                return;
            }
        };

        if self.play {
            if let Err(e) = self.player.play(&artifact).await {
                warn!("Playback failed: {}", e);
                eprintln!("{} {}", "Playback failed:".red().bold(), e);
            }
        }
        self.synthesizer.release(&artifact).await;
    }
}

/// Let the user start the rebuttal now or after a delay in seconds.
async fn wait_for_confirmation(
    lines: &mut Lines<BufReader<Stdin>>,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let answer = prompt(
            lines,
            "Press Enter to hear the rebuttal, or enter a number of seconds to wait: ",
        )
        .await?;
        match parse_pause(&answer) {
            Some(Ok(delay)) => {
                println!("Waiting for {} seconds...", delay.as_secs_f64());
                tokio::time::sleep(delay).await;
                return Ok(());
            }
            None => return Ok(()),
            Some(Err(())) => eprintln!(
                "{}",
                "Please enter a valid number or press Enter to continue immediately.".yellow()
            ),
        }
    }
}

/// `None` for an empty answer, otherwise the delay it asks for.
fn parse_pause(answer: &str) -> Option<Result<Duration, ()>> {
    let answer = answer.trim();
    if answer.is_empty() {
        return None;
    }
    Some(
        answer
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .ok_or(()),
    )
}

/// Print `label` and read one trimmed line. End of input is an error.
async fn prompt(
    lines: &mut Lines<BufReader<Stdin>>,
    label: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.bold().to_string().as_bytes()).await?;
    stdout.flush().await?;

    match lines.next_line().await? {
        Some(line) => Ok(line.trim().to_string()),
        None => Err("input closed".into()),
    }
}

/// Create a callback that prints synthesis progress to the console.
fn create_console_callback() -> Box<dyn Fn(SynthesisEvent) + Send + Sync> {
    Box::new(move |event| match event {
        SynthesisEvent::ProviderSkipped { provider } => {
            eprintln!("{}", format!("  · {} unavailable, skipping", provider).dimmed());
        }
        SynthesisEvent::ProviderStarted { provider, chunks } => {
            eprintln!(
                "{}",
                format!("  ▶ synthesizing with {} ({} chunk(s))", provider, chunks).dimmed()
            );
        }
        SynthesisEvent::ChunkRetry {
            provider,
            chunk,
            attempt,
            error,
        } => {
            eprintln!(
                "{}",
                format!(
                    "  [Retry {}] {} chunk {}: {}",
                    attempt,
                    provider,
                    chunk + 1,
                    error
                )
                .yellow()
            );
        }
        SynthesisEvent::ProviderFailed { provider, error } => {
            eprintln!("{}", format!("  ✗ {} failed: {}", provider, error).yellow());
        }
        SynthesisEvent::Completed { .. } => {}
    })
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}
