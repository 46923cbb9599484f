//! sfplayer - play and render SoundFonts from the command line.
//!
//! # Usage
//!
//! ```bash
//! sfplayer presets piano.sf2
//! sfplayer render --soundfont piano.sf2 --note C4:0:1 --note E4:0.5:1 --out chord.wav
//! sfplayer play --note A4:0:0.5
//! sfplayer serve              # JSON-lines requests on stdin, responses on stdout
//! ```
//!
//! Set `RUST_LOG=sfplayer=debug` for engine logs on stderr.

use anyhow::{bail, Context, Result};
use sfplayer::audio::{render_to_wav, AudioOutput, NoteEvent};
use sfplayer::bridge::{ControlBridge, RenderPort, Request, Response};
use sfplayer::engine::DEFAULT_BANK_ID;
use sfplayer::midi::{key_to_frequency, note_to_name};
use sfplayer::{BankStore, EngineConfig, SynthesisCore};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// Release time rendered after the last note-off, in seconds.
const DEFAULT_TAIL_SECS: f64 = 1.0;

/// What to do.
enum Mode {
    /// List the presets of a SoundFont file.
    Presets(PathBuf),
    /// Render notes to a WAV file.
    Render(PathBuf),
    /// Play notes on the default output device.
    Play,
    /// Serve bridge requests over stdin/stdout.
    Serve { audio: bool },
}

/// Command-line options for the application.
struct CliOptions {
    mode: Mode,
    /// Engine configuration file (JSON).
    config: Option<PathBuf>,
    /// SoundFont loaded as the default bank.
    soundfont: Option<PathBuf>,
    sample_rate: Option<u32>,
    gain: Option<f32>,
    /// (bank, program) to select in the default bank.
    preset: Option<(u16, u8)>,
    notes: Vec<NoteEvent>,
    tail: f64,
}

impl CliOptions {
    /// Parses command-line arguments.
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let program = args.first().map(String::as_str).unwrap_or("sfplayer");

        let Some(command) = args.get(1) else {
            print_help(program);
            std::process::exit(1);
        };

        let mut config = None;
        let mut soundfont = None;
        let mut sample_rate = None;
        let mut gain = None;
        let mut preset = None;
        let mut notes = Vec::new();
        let mut tail = DEFAULT_TAIL_SECS;
        let mut out = None;
        let mut positional = None;
        let mut audio = true;

        let mut i = 2;
        while i < args.len() {
            let arg = args[i].as_str();
            let mut value = || take_value(&args, &mut i, arg);
            match arg {
                "--config" | "-c" => config = Some(PathBuf::from(value()?)),
                "--soundfont" | "-sf" => soundfont = Some(PathBuf::from(value()?)),
                "--out" | "-o" => out = Some(PathBuf::from(value()?)),
                "--sample-rate" => {
                    sample_rate = Some(value()?.parse::<u32>().context("invalid --sample-rate")?)
                }
                "--gain" => gain = Some(value()?.parse::<f32>().context("invalid --gain")?),
                "--preset" => preset = Some(parse_preset(value()?)?),
                "--note" | "-n" => notes.push(value()?.parse::<NoteEvent>()?),
                "--tail" => tail = value()?.parse::<f64>().context("invalid --tail")?,
                "--no-audio" => audio = false,
                "--help" | "-h" => {
                    print_help(program);
                    std::process::exit(0);
                }
                other if !other.starts_with('-') && positional.is_none() => {
                    positional = Some(PathBuf::from(other))
                }
                other => bail!("Unknown option: {} (use --help for usage)", other),
            }
            i += 1;
        }

        let mode = match command.as_str() {
            "presets" => Mode::Presets(
                positional
                    .or_else(|| soundfont.clone())
                    .context("presets requires a SoundFont path")?,
            ),
            "render" => Mode::Render(out.context("render requires --out PATH")?),
            "play" => Mode::Play,
            "serve" => Mode::Serve { audio },
            "--help" | "-h" | "help" => {
                print_help(program);
                std::process::exit(0);
            }
            other => bail!("Unknown command: {} (use --help for usage)", other),
        };

        Ok(Self {
            mode,
            config,
            soundfont,
            sample_rate,
            gain,
            preset,
            notes,
            tail,
        })
    }

    /// Builds the engine configuration: file first, then flag overrides.
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        if let Some(rate) = self.sample_rate {
            config.sample_rate = rate;
        }
        if let Some(gain) = self.gain {
            config.default_gain = gain;
        }
        if let Some(path) = &self.soundfont {
            config.default_soundfont = Some(path.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

fn print_help(program: &str) {
    eprintln!("sfplayer - SoundFont synthesizer");
    eprintln!();
    eprintln!("Usage: {} <COMMAND> [OPTIONS]", program);
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  presets FILE           List the presets of a SoundFont");
    eprintln!("  render --out FILE      Render notes to a WAV file");
    eprintln!("  play                   Play notes on the default output device");
    eprintln!("  serve                  Serve JSON requests on stdin/stdout");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config PATH      Engine configuration (JSON)");
    eprintln!("  -sf, --soundfont PATH  SoundFont to use as the default bank");
    eprintln!("  --sample-rate HZ       Output sample rate");
    eprintln!("  --gain G               Initial output gain");
    eprintln!("  --preset BANK:PROGRAM  Preset to select (default: first)");
    eprintln!("  -n, --note K:S:D[:V]   Note as key, start secs, duration secs, velocity");
    eprintln!("  --tail SECS            Time rendered after the last note (default 1)");
    eprintln!("  --no-audio             serve: do not open an output device");
    eprintln!("  -h, --help             Print this help message");
}

/// Advances past a flag and returns its value.
fn take_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .with_context(|| format!("{} requires a value", flag))
}

fn parse_preset(text: &str) -> Result<(u16, u8)> {
    let (bank, program) = text
        .split_once(':')
        .with_context(|| format!("expected BANK:PROGRAM, got '{}'", text))?;
    Ok((
        bank.trim().parse::<u16>().context("invalid preset bank")?,
        program.trim().parse::<u8>().context("invalid preset program")?,
    ))
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match &cli.mode {
        Mode::Presets(path) => list_presets(path),
        Mode::Render(out) => render(&cli, out),
        Mode::Play => play(&cli),
        Mode::Serve { audio } => serve(&cli, *audio),
    }
}

fn list_presets(path: &Path) -> Result<()> {
    let data =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut store = BankStore::new();
    let bank = store
        .add_bank(&name, &data)
        .with_context(|| format!("Failed to load SoundFont: {}", path.display()))?;

    println!("{}", bank.id);
    for preset in &bank.presets {
        println!("{:>5}:{:<3}  {}", preset.bank, preset.program, preset.name);
    }
    Ok(())
}

fn render(cli: &CliOptions, out: &Path) -> Result<()> {
    let config = cli.engine_config()?;
    let (mut core, mut renderer) = SynthesisCore::new(&config)?;
    if let Some((bank, program)) = cli.preset {
        core.select_preset_by_numbers(DEFAULT_BANK_ID, bank, program)?;
    }

    let frames = render_to_wav(
        &mut core,
        &mut renderer,
        &cli.notes,
        cli.tail,
        out,
        None::<fn(f32)>,
    )?;
    eprintln!(
        "Wrote {} ({:.2} s)",
        out.display(),
        frames as f64 / config.sample_rate as f64
    );
    Ok(())
}

fn play(cli: &CliOptions) -> Result<()> {
    let config = cli.engine_config()?;
    let (mut bridge, port) = ControlBridge::new();
    expect_ok(bridge.handle(Request::Initialize {
        config: config.clone(),
    }))?;
    if let Some((bank, program)) = cli.preset {
        expect_ok(bridge.handle(Request::SetPresetByNumbers {
            bank_id: DEFAULT_BANK_ID.to_string(),
            bank,
            program,
        }))?;
    }
    let _output = AudioOutput::start(port, config.sample_rate)?;

    // (time, is_note_on, key, velocity); note-off first on ties
    let mut events: Vec<(f64, bool, u8, u8)> = Vec::new();
    for note in &cli.notes {
        events.push((note.start, true, note.key, note.velocity));
        events.push((note.start + note.duration, false, note.key, 0));
    }
    events.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let started = Instant::now();
    for (at, is_on, key, velocity) in events {
        let due = started + Duration::from_secs_f64(at);
        if let Some(wait) = due.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
        let request = if is_on {
            info!(
                note = %note_to_name(key),
                hz = key_to_frequency(key),
                velocity,
                "Note on"
            );
            Request::NoteOn { key, velocity }
        } else {
            Request::NoteOff { key }
        };
        expect_ok(bridge.handle(request))?;
    }

    thread::sleep(Duration::from_secs_f64(cli.tail.max(0.0)));
    Ok(())
}

fn serve(cli: &CliOptions, audio: bool) -> Result<()> {
    let (mut bridge, port) = ControlBridge::new();
    let mut port = Some(port);
    let mut output = None;

    // A configured engine starts immediately; otherwise wait for `initialize`.
    if cli.config.is_some() || cli.soundfont.is_some() || cli.sample_rate.is_some() {
        expect_ok(bridge.handle(Request::Initialize {
            config: cli.engine_config()?,
        }))?;
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let mut lines = stdin.lock().lines();
    loop {
        if audio && output.is_none() {
            output = start_output(&bridge, &mut port)?;
        }

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("Failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }
        writeln!(stdout, "{}", bridge.handle_json(&line))?;
        stdout.flush()?;
    }
    Ok(())
}

/// Opens the output device once the bridge has an engine to play.
fn start_output(
    bridge: &ControlBridge,
    port: &mut Option<RenderPort>,
) -> Result<Option<AudioOutput>> {
    let Some(core) = bridge.core() else {
        return Ok(None);
    };
    match port.take() {
        Some(port) => Ok(Some(AudioOutput::start(port, core.sample_rate())?)),
        None => Ok(None),
    }
}

fn expect_ok(response: Response) -> Result<()> {
    match response {
        Response::Error { error } => bail!("{}", error.message),
        _ => Ok(()),
    }
}
