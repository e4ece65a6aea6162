//! Lullwave CLI: realtime player for the generative ambient engine.
//!
//! The audio callback owns the `Engine<Composer>`; the main thread steers it
//! through a command channel and logs the musical events it emits.

use std::f32::consts::TAU;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use lullwave_engine::graph::MAX_BLOCK;
use lullwave_engine::{Composer, ComposerConfig, CpalHost, Engine, EventKind, MusicalEvent};
use tracing::Level;

const CONTROL_PERIOD: Duration = Duration::from_millis(50);
const ORBIT_RADIUS: f32 = 0.4;

#[derive(Parser, Debug)]
#[command(name = "lullwave", about = "Realtime generative ambient player", long_about = None)]
struct Args {
    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Output device name (default device when absent)
    #[arg(long)]
    device: Option<String>,

    #[arg(long)]
    sample_rate: Option<u32>,

    #[arg(long)]
    channels: Option<u16>,

    /// Stop (with a fade) after this many seconds
    #[arg(short, long)]
    duration: Option<f32>,

    /// Output gain after the engine's limiter
    #[arg(short, long, default_value_t = 0.8)]
    gain: f32,

    /// Starting X (0 = warm, 1 = cold)
    #[arg(short, long, default_value_t = 0.3)]
    x: f32,

    /// Starting Y (0 = sparse, 1 = dense)
    #[arg(short, long, default_value_t = 0.35)]
    y: f32,

    /// Circle the XY point around the centre with this period in seconds
    #[arg(long)]
    orbit: Option<f32>,

    /// Jump to a random point every N seconds
    #[arg(long)]
    wander: Option<f32>,

    /// RNG seed for a reproducible session
    #[arg(long)]
    seed: Option<u64>,

    /// TOML file with composer settings
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: Level,
}

/// Messages from the control thread to the audio callback.
#[derive(Copy, Clone, Debug)]
enum Command {
    SetXy(f32, f32),
    Randomize,
    Stop,
}

fn apply(composer: &mut Composer, cmd: Command) {
    match cmd {
        Command::SetXy(x, y) => composer.set_xy(x, y),
        Command::Randomize => {
            composer.randomize_point();
        }
        Command::Stop => composer.stop(),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    cfg: &cpal::StreamConfig,
    mut engine: Engine<Composer>,
    commands: Receiver<Command>,
    meter: Sender<f32>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::FromSample<f32> + cpal::SizedSample + Send + 'static,
{
    let sr = cfg.sample_rate.0 as f32;
    let channels = usize::from(cfg.channels).max(1);
    let mut scratch = vec![0.0f32; MAX_BLOCK * channels];

    // ~1 second peak meter
    let meter_interval = cfg.sample_rate.0.max(1) as usize;
    let mut meter_count = 0usize;
    let mut meter_peak = 0.0f32;

    let err_fn = |e: cpal::StreamError| tracing::error!(%e, "stream error");
    let stream = device.build_output_stream(
        cfg,
        move |output: &mut [T], _| {
            for cmd in commands.try_iter() {
                apply(engine.generator_mut(), cmd);
            }
            for chunk in output.chunks_mut(scratch.len()) {
                let buf = &mut scratch[..chunk.len()];
                engine.render_interleaved(buf, channels, sr);
                for (o, s) in chunk.iter_mut().zip(buf.iter()) {
                    *o = T::from_sample(*s);
                    meter_peak = meter_peak.max(s.abs());
                }
                meter_count += chunk.len() / channels;
                if meter_count >= meter_interval {
                    let _ = meter.try_send(meter_peak);
                    meter_peak = 0.0;
                    meter_count = 0;
                }
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

fn log_event(e: &MusicalEvent) {
    match e.kind {
        EventKind::NoteOn { freq, degree } => tracing::debug!(t = e.time, freq, degree, "note"),
        EventKind::ChordChange { name, index, world } => {
            tracing::info!(t = e.time, chord = name, index, world = world.label(), "chord")
        }
        EventKind::Strike { freq, style } => tracing::debug!(t = e.time, freq, ?style, "strike"),
        EventKind::WorldChange { world } => tracing::info!(t = e.time, world = world.label(), "world"),
    }
}

fn orbit_point(elapsed: f32, period: f32) -> (f32, f32) {
    let a = TAU * elapsed / period.max(1.0);
    (0.5 + ORBIT_RADIUS * a.cos(), 0.5 + ORBIT_RADIUS * a.sin())
}

fn load_config(args: &Args) -> ComposerConfig {
    let mut config = match &args.config {
        Some(path) => ComposerConfig::load_or_default(path),
        None => ComposerConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.initial_point = [args.x, args.y];
    config
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt().with_max_level(args.log_level).with_target(false).init();

    if args.list_devices {
        println!("Available output devices:");
        for name in CpalHost::list_devices()? {
            println!("- {name}");
        }
        return Ok(());
    }

    let config = load_config(&args);
    let fade_out = config.fade_out_tau_s;
    let mut composer = Composer::new(config);
    let mut host = CpalHost::new(args.device.clone(), args.sample_rate, args.channels);
    composer.init(&mut host).context("audio initialization failed")?;

    let device = host.device().ok_or_else(|| anyhow!("host opened without a device"))?;
    let supported = host.stream_config().ok_or_else(|| anyhow!("host opened without a stream config"))?;
    let sample_format = supported.sample_format();
    let cfg = supported.config();
    let sr = cfg.sample_rate.0 as f32;

    let events = composer.subscribe();
    composer.start();
    let mut engine = Engine::new(composer, sr);
    engine.set_gain(args.gain);

    let (cmd_tx, cmd_rx) = crossbeam_channel::bounded::<Command>(64);
    let (meter_tx, meter_rx) = crossbeam_channel::bounded::<f32>(8);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, &cfg, engine, cmd_rx, meter_tx)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(device, &cfg, engine, cmd_rx, meter_tx)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(device, &cfg, engine, cmd_rx, meter_tx)?,
        other => bail!("unsupported device sample format: {other:?}"),
    };
    stream.play()?;

    tracing::info!(
        device = device.name().unwrap_or_default(),
        sample_rate = cfg.sample_rate.0,
        channels = cfg.channels,
        gain = args.gain,
        "playing, press Ctrl+C to stop"
    );

    let started = Instant::now();
    let mut last_wander = started;
    loop {
        std::thread::sleep(CONTROL_PERIOD);
        let elapsed = started.elapsed().as_secs_f32();

        if let Some(period) = args.orbit {
            let (x, y) = orbit_point(elapsed, period);
            let _ = cmd_tx.try_send(Command::SetXy(x, y));
        }
        if let Some(every) = args.wander {
            if last_wander.elapsed().as_secs_f32() >= every {
                last_wander = Instant::now();
                let _ = cmd_tx.try_send(Command::Randomize);
            }
        }
        for e in events.try_iter() {
            log_event(&e);
        }
        for peak in meter_rx.try_iter() {
            tracing::debug!(peak, "meter");
        }

        if args.duration.map_or(false, |d| elapsed >= d) {
            cmd_tx.send(Command::Stop).context("audio callback is gone")?;
            tracing::info!("fading out");
            std::thread::sleep(Duration::from_secs_f32(fade_out * 8.0));
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orbit_stays_in_the_square() {
        for i in 0..100 {
            let (x, y) = orbit_point(i as f32 * 0.37, 20.0);
            assert!((0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y));
        }
    }

    #[test]
    fn flags_parse() {
        let args = Args::try_parse_from(["lullwave", "-x", "0.9", "--orbit", "60", "--log-level", "debug"]).unwrap();
        assert_eq!(args.x, 0.9);
        assert_eq!(args.orbit, Some(60.0));
        assert_eq!(args.log_level, Level::DEBUG);
        let config = load_config(&args);
        assert_eq!(config.initial_point, [0.9, 0.35]);
    }
}
