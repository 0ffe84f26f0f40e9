use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use tello_link::doctor as link_doctor;
use tello_link::{CommandChannel, Controller, ControllerConfig, LinkConfig, LinkStatus, RcConfig, TelemetryChannel, VideoConfig};
use tello_proto::{Command as TelloCommand, Query, Snapshot};
use tello_vision::doctor as vision_doctor;
use tello_vision::CameraCalibration;

#[derive(Debug, Parser)]
#[command(name = "tello", version, about = "Tello SDK link: commands, telemetry, video, stick control")]
struct Cli {
    #[arg(long, default_value = "config/tello.toml")]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the config and local prerequisites (ffmpeg, log dir).
    Doctor,
    /// Handshake, then read battery, SDK version and serial number.
    Probe,
    /// Handshake and run a single command, e.g. `tello send rotate cw 90`.
    Send {
        #[arg(required = true, trailing_var_arg = true)]
        words: Vec<String>,
    },
    /// Handshake and print the state broadcast for a while.
    Telemetry {
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
    /// Start every channel, fly `[mission].commands` and print status until Ctrl-C.
    Run,
}

#[derive(Debug, Default, serde::Deserialize)]
struct Config {
    #[serde(default)]
    link: LinkConfig,
    #[serde(default)]
    rc: RcConfig,
    #[serde(default)]
    video: VideoConfig,

    camera: Option<CameraCalibration>,
    mission: Option<MissionCfg>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct MissionCfg {
    /// Operator commands, e.g. "takeoff", "up 50", "rotate cw 90".
    commands: Vec<String>,
    /// Stop once the queue drains instead of waiting for Ctrl-C.
    #[serde(default)]
    exit_when_done: bool,
}

impl Config {
    fn controller(&self) -> ControllerConfig {
        ControllerConfig { link: self.link.clone(), rc: self.rc.clone(), video: self.video.clone() }
    }
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Probe => probe(cfg.link.clone()).await?,
        Command::Send { words } => send(cfg.link.clone(), words.join(" ")).await?,
        Command::Telemetry { seconds } => telemetry(&cfg, seconds).await?,
        Command::Run => run(cfg).await?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    link_doctor::check_config(&cfg.controller())?;

    if cfg.video.enable {
        vision_doctor::check_decoder(&cfg.video.decoder)?;
        vision_doctor::check_ffmpeg(&cfg.video.decoder).or_else(|e| {
            warn!("ffmpeg unavailable, video will not decode: {:#}", e);
            Ok::<(), anyhow::Error>(())
        })?;
        if let Some(cal) = &cfg.camera {
            vision_doctor::check_calibration(cal, &cfg.video.decoder)?;
        }
    }

    if let Some(m) = &cfg.mission {
        for c in &m.commands {
            c.parse::<TelloCommand>().with_context(|| format!("mission command `{}`", c))?;
        }
        info!("doctor: mission of {} command(s) parses", m.commands.len());
    }

    info!("doctor: OK");
    Ok(())
}

async fn probe(link: LinkConfig) -> Result<()> {
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut ch = CommandChannel::open(&link)?;
        let out = (|| -> Result<()> {
            ch.connect(link.handshake_attempts)?;
            for q in [Query::Battery, Query::Sdk, Query::Serial, Query::Wifi] {
                match ch.execute(&TelloCommand::Query(q)) {
                    Ok(v) => println!("{:<10} {}", q.verb(), v),
                    Err(e) => warn!("probe: {} failed: {}", q.verb(), e),
                }
            }
            Ok(())
        })();
        ch.close(&link.log_dir)?;
        out
    })
    .await
    .context("join probe task")?
}

async fn send(link: LinkConfig, line: String) -> Result<()> {
    let cmd: TelloCommand = line.parse().with_context(|| format!("parse `{}`", line))?;
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut ch = CommandChannel::open(&link)?;
        let out = ch
            .connect(link.handshake_attempts)
            .and_then(|()| ch.execute(&cmd))
            .map(|reply| println!("{} -> {}", cmd, reply));
        ch.close(&link.log_dir)?;
        out.with_context(|| format!("`{}`", cmd))
    })
    .await
    .context("join send task")?
}

fn render(s: &Snapshot) -> String {
    s.fields().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(" ")
}

async fn telemetry(cfg: &Config, seconds: u64) -> Result<()> {
    // The state broadcast only starts once the device is in SDK mode.
    let link = cfg.link.clone();
    let mut ch = tokio::task::spawn_blocking(move || -> Result<CommandChannel> {
        let ch = CommandChannel::open(&link)?;
        ch.connect(link.handshake_attempts)?;
        Ok(ch)
    })
    .await
    .context("join handshake task")??;

    let mut tel = TelemetryChannel::new(cfg.link.telemetry_bind);
    tel.start()?;
    info!("telemetry: printing for {}s", seconds);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
    let mut tick = tokio::time::interval(Duration::from_millis(200));
    while tokio::time::Instant::now() < deadline {
        tokio::select! {
            _ = tick.tick() => {
                if let Some(s) = tel.has_unconsumed().then(|| tel.latest()).flatten() {
                    println!("{}", render(&s));
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tel.close(&cfg.link.log_dir)?;
    ch.close(&cfg.link.log_dir)?;
    Ok(())
}

fn status_line(st: &LinkStatus) -> String {
    let age = st.reply_age().map_or_else(|| "-".to_string(), |d| format!("{:.1}s", d.as_secs_f32()));
    let bat = st.battery_pct.map_or_else(|| "-".to_string(), |b| format!("{}%", b));
    format!(
        "connected={} bat={} queue={} failed={} sent={} last_reply={} telemetry={} frames={} rc_hb={}",
        st.connected, bat, st.queue_pending, st.queue_failed, st.commands_sent, age,
        st.telemetry_received, st.frames_decoded, st.rc_heartbeats
    )
}

async fn run(cfg: Config) -> Result<()> {
    info!("run: starting");

    let mission = cfg.mission.clone();
    let commands = mission
        .as_ref()
        .map(|m| {
            m.commands
                .iter()
                .map(|c| c.parse::<TelloCommand>().with_context(|| format!("mission command `{}`", c)))
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();

    let ctl_cfg = cfg.controller();
    let ctl = tokio::task::spawn_blocking(move || -> Result<Controller> {
        let mut ctl = Controller::new(ctl_cfg)?;
        ctl.start()?;
        Ok(ctl)
    })
    .await
    .context("join start task")??;

    for cmd in commands {
        ctl.enqueue(cmd).context("queue mission command")?;
    }
    let exit_when_done = mission.is_some_and(|m| m.exit_when_done);

    let mut interrupted = false;
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let st = ctl.status();
                info!("run: {}", status_line(&st));
                if exit_when_done && st.queue_pending == 0 {
                    info!("run: mission complete");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("run: interrupted, landing");
                interrupted = true;
                break;
            }
        }
    }

    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut ctl = ctl;
        if interrupted {
            ctl.cancel_pending();
            if let Err(e) = ctl.rc().hover().map(drop).and_then(|()| ctl.execute(&TelloCommand::Land)) {
                warn!("run: land failed: {}", e);
            }
        }
        ctl.close()
    })
    .await
    .context("join close task")??;

    info!("run: done");
    Ok(())
}
