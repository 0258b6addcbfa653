mod device;

use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    thread,
};

use audio_editor_core::{
    Command, Editor, EditorConfig, Outcome, PlaybackState, WavCodec, WaveformEnvelope,
};
use clap::{Args, Parser, Subcommand};
use device::CpalDevice;
use tracing_subscriber::EnvFilter;

type AppEditor = Editor<WavCodec, CpalDevice>;

/// Glyphs from quiet to loud for the text waveform.
const LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

fn main() -> audio_editor_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => EditorConfig::from_json_file(path)?,
        None => EditorConfig::default(),
    };

    match cli.command {
        Commands::Render { input, width, filters } => {
            override_width(&mut config, width);
            run_render(&input, &filters, &config)
        }
        Commands::Export {
            input,
            output,
            filters,
        } => run_export(&input, &output, &filters, &config),
        Commands::Play {
            input,
            width,
            filters,
        } => {
            override_width(&mut config, width);
            run_play(&input, &filters, &config)
        }
        Commands::Session => run_session(&config),
    }
}

fn run_render(input: &Path, filters: &FilterArgs, config: &EditorConfig) -> audio_editor_core::Result<()> {
    let editor = open_editor(input, filters, config)?;
    println!("{}", strip(&editor.waveform()?, None));
    Ok(())
}

fn run_export(
    input: &Path,
    output: &Path,
    filters: &FilterArgs,
    config: &EditorConfig,
) -> audio_editor_core::Result<()> {
    let mut editor = open_editor(input, filters, config)?;
    editor.dispatch(Command::Export(output.to_path_buf()))?;
    tracing::info!(?output, "export finished");
    Ok(())
}

fn run_play(input: &Path, filters: &FilterArgs, config: &EditorConfig) -> audio_editor_core::Result<()> {
    let mut editor = open_editor(input, filters, config)?;
    let envelope = editor.waveform()?;
    let duration = editor.audio().current_buffer()?.duration();
    tracing::info!(?input, ?duration, "starting playback");
    editor.dispatch(Command::Start)?;

    let mut stdout = io::stdout();
    while editor.playback().state()? == PlaybackState::Playing {
        write!(stdout, "\r{}", strip(&envelope, Some(editor.cursor_column()?)))?;
        stdout.flush()?;
        thread::sleep(config.playback.tick());
    }
    writeln!(stdout, "\r{}", strip(&envelope, None))?;
    Ok(())
}

/// Reads one command per line from stdin until EOF or `quit`.
fn run_session(config: &EditorConfig) -> audio_editor_core::Result<()> {
    let mut editor: AppEditor = Editor::new(WavCodec, CpalDevice, config)?;
    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "quit" | "exit") {
            break;
        }

        match line.parse::<Command>().and_then(|command| editor.dispatch(command)) {
            Ok(Outcome::Waveform(envelope)) => println!("{}", strip(&envelope, None)),
            Ok(Outcome::Unchanged) => {}
            Err(err) => {
                tracing::debug!(%err, line, "command failed");
                eprintln!("warning: {err}");
            }
        }
    }

    editor.dispatch(Command::Stop)?;
    Ok(())
}

fn open_editor(input: &Path, filters: &FilterArgs, config: &EditorConfig) -> audio_editor_core::Result<AppEditor> {
    let mut editor = Editor::new(WavCodec, CpalDevice, config)?;
    editor.dispatch(Command::Load(input.to_path_buf()))?;
    for command in filters.commands() {
        editor.dispatch(command)?;
    }
    Ok(editor)
}

fn override_width(config: &mut EditorConfig, width: Option<usize>) {
    if let Some(width) = width {
        config.waveform.width = width;
    }
}

/// Draws an envelope as one line of block glyphs, with an optional cursor.
fn strip(envelope: &WaveformEnvelope, cursor: Option<usize>) -> String {
    envelope
        .values()
        .iter()
        .enumerate()
        .map(|(column, value)| {
            if Some(column) == cursor {
                return '|';
            }
            let loudness = (1.0 - value).clamp(0.0, 1.0);
            LEVELS[(loudness * (LEVELS.len() - 1) as f32).round() as usize]
        })
        .collect()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Filter, preview and export audio files", long_about = None)]
struct Cli {
    /// Optional JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the waveform of an audio file.
    Render {
        input: PathBuf,
        /// Number of columns to draw.
        #[arg(short, long)]
        width: Option<usize>,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Apply filters and gain, then write the result.
    Export {
        input: PathBuf,
        /// Destination; the format follows the file extension.
        output: PathBuf,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Play a file through the default output device with a moving cursor.
    Play {
        input: PathBuf,
        #[arg(short, long)]
        width: Option<usize>,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Read editor commands (`open`, `lowpass`, `highpass`, `gain`, `play`,
    /// `stop`, `save`) from stdin, one per line.
    Session,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Low-pass cutoff in Hz (1-20000).
    #[arg(long)]
    lowpass: Option<u32>,
    /// High-pass cutoff in Hz (1-20000).
    #[arg(long)]
    highpass: Option<u32>,
    /// Gain in dB (-20 to 20).
    #[arg(long, allow_hyphen_values = true)]
    gain: Option<f32>,
}

impl FilterArgs {
    fn commands(&self) -> Vec<Command> {
        let mut commands = Vec::new();
        if let Some(hz) = self.lowpass {
            commands.push(Command::SetLowpass(hz));
        }
        if let Some(hz) = self.highpass {
            commands.push(Command::SetHighpass(hz));
        }
        if let Some(db) = self.gain {
            commands.push(Command::SetGain(db));
        }
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_export_with_negative_gain() {
        let cli = Cli::parse_from([
            "audio-editor",
            "export",
            "in.wav",
            "out.wav",
            "--lowpass",
            "800",
            "--gain",
            "-6",
        ]);
        let Commands::Export { filters, .. } = cli.command else {
            panic!("expected export");
        };
        assert_eq!(
            filters.commands(),
            vec![Command::SetLowpass(800), Command::SetGain(-6.0)]
        );
    }

    #[test]
    fn global_config_flag_is_accepted_after_subcommand() {
        let cli = Cli::parse_from(["audio-editor", "session", "--config", "editor.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("editor.json")));
    }

    #[test]
    fn zero_width_override_is_rejected() {
        let mut config = EditorConfig::default();
        override_width(&mut config, Some(0));
        assert!(Editor::new(WavCodec, CpalDevice, &config).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
