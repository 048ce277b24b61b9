mod cli;
mod signals;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use app_supervisor::{LifecycleEvent, RunStatus, Supervisor, SupervisorConfig, ipc};
use clap::Parser;
use crossbeam_channel::{select, tick};
use log::{error, info, warn};

const SIGNAL_POLL: Duration = Duration::from_millis(200);

fn main() {
    // Logs go to stderr; stdout carries the JSON protocol
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();

    match real_main() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

fn real_main() -> Result<i32> {
    let args = cli::Args::parse();

    match args.sub.unwrap_or(cli::Cmd::Serve {
        config: None,
        interval_ms: None,
    }) {
        cli::Cmd::Serve { config, interval_ms } => {
            run_serve(load_config(config.as_deref(), interval_ms)?)?;
            Ok(0)
        }
        cli::Cmd::Watch {
            config,
            interval_ms,
            app_id,
            command,
        } => run_watch(load_config(config.as_deref(), interval_ms)?, &app_id, &command.join(" ")),
    }
}

fn load_config(path: Option<&str>, interval_ms: Option<u64>) -> Result<SupervisorConfig> {
    let mut cfg = SupervisorConfig::load(path.map(Path::new))?;
    if let Some(ms) = interval_ms {
        cfg = cfg.with_monitor_interval(Duration::from_millis(ms));
    }
    Ok(cfg)
}

fn run_serve(cfg: SupervisorConfig) -> Result<()> {
    let sup = Supervisor::new(cfg).context("Failed to start supervisor")?;
    info!(
        "app-supervisor serving on stdio (sweep every {:?})",
        sup.config().monitor_interval()
    );

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let result = ipc::serve(&sup, stdin.lock(), stdout.lock());

    sup.shutdown();
    info!("app-supervisor stopped");
    result
}

/// Launch one app and block until it is no longer running. Returns the
/// process exit code for the CLI: 0 when the app completed, 1 otherwise.
fn run_watch(cfg: SupervisorConfig, app_id: &str, command: &str) -> Result<i32> {
    signals::install_signal_handlers()?;

    let sup = Supervisor::new(cfg).context("Failed to start supervisor")?;
    let events = sup.subscribe();
    let launched = sup.launch(app_id, command)?;
    info!("Watching '{app_id}' (pid {})", launched.process_id);

    let sig_tick = tick(SIGNAL_POLL);
    loop {
        select! {
            recv(events) -> evt => match evt {
                Ok(LifecycleEvent::Launched { .. }) => {}
                Ok(evt) if evt.app_id() == app_id => break,
                Ok(_) => {}
                Err(_) => break,
            },
            recv(sig_tick) -> _ => {
                if let Some(sig) = signals::take_signal() {
                    warn!("Received {sig}, terminating '{app_id}'");
                    if let Err(e) = sup.terminate(app_id) {
                        warn!("Terminate '{app_id}': {e}");
                    }
                    break;
                }
                if !sup.status(app_id).is_running() {
                    break;
                }
            }
        }
    }

    let record = sup.status(app_id);
    println!("{}", serde_json::to_string_pretty(&record)?);
    sup.shutdown();

    Ok(if record.status == RunStatus::Completed { 0 } else { 1 })
}
