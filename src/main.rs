use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tfe_switch::capture::AfPacketPort;
use tfe_switch::config;
use tfe_switch::dataplane::{PortId, Switch, TimerQueue, TimerService};
use tfe_switch::protocol::ethernet::MAX_FRAME_SIZE;
use tfe_switch::telemetry::{init_logging, MetricsRegistry};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Interval between metric dumps at debug level
const METRICS_INTERVAL: Duration = Duration::from_secs(30);

/// Frames buffered between the port readers and the switch
const RX_QUEUE_DEPTH: usize = 1024;

#[derive(Parser)]
#[command(name = "tfe-switch")]
#[command(about = "A path-discovery L2 switch (ARP-Path / TCP-Path)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run the switch daemon
    Run {
        /// Path to switch.lock (switch.toml is accepted as well)
        #[arg(short, long, default_value = "switch.lock")]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate switch.lock from switch.toml
    Generate {
        /// Path to switch.toml
        #[arg(short, long, default_value = "switch.toml")]
        config: PathBuf,

        /// Output path for switch.lock
        #[arg(short, long, default_value = "switch.lock")]
        output: PathBuf,
    },
    /// Validate switch.toml without generating lock file
    Validate {
        /// Path to switch.toml
        #[arg(short, long, default_value = "switch.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Config { action }) => match action {
            ConfigAction::Generate { config, output } => cmd_config_generate(&config, &output),
            ConfigAction::Validate { config } => cmd_config_validate(&config),
        },
        Some(Commands::Run { config }) => cmd_run(&config),
        None => cmd_run(Path::new("switch.lock")),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(config_path: &Path) -> Result<(), String> {
    let cfg = config::load(config_path)
        .map_err(|e| format!("Failed to load {}: {}", config_path.display(), e))?;

    init_logging(Some(&cfg.log));
    info!("Loaded {}", config_path.display());

    let validation = config::validate(&cfg);
    for warning in &validation.warnings {
        warn!("{}", warning);
    }
    if validation.has_errors() {
        for e in &validation.errors {
            error!("{}", e);
        }
        return Err("Configuration has errors".to_string());
    }

    let settings = cfg.settings().map_err(|e| e.to_string())?;
    let metrics = Arc::new(MetricsRegistry::new());
    let mut switch = Switch::new(settings, metrics.clone());

    let mut sockets = Vec::new();
    for (name, port_cfg) in &cfg.ports {
        let direction = port_cfg.port_direction().map_err(|e| e.to_string())?;
        let mac = port_cfg.mac_addr().map_err(|e| e.to_string())?;

        info!("Binding to interface {}...", name);
        let port = AfPacketPort::open(name, mac).map_err(|e| {
            format!(
                "Failed to bind to {}: {}. Run with root privileges.",
                name, e
            )
        })?;
        let socket = port.socket();
        let id = switch
            .attach_port(Arc::new(port), direction)
            .map_err(|e| e.to_string())?;
        info!(port = id, name = %name, direction = ?direction, "Port attached");
        sockets.push((id, name.clone(), socket));
    }

    if let Some(mac) = cfg.switch.mac_addr().map_err(|e| e.to_string())? {
        switch.set_mac_addr(mac);
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        let (tx, mut rx) = mpsc::channel::<(PortId, Vec<u8>)>(RX_QUEUE_DEPTH);

        for (id, name, socket) in sockets {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; MAX_FRAME_SIZE];
                loop {
                    match socket.recv(&mut buf).await {
                        Ok(rx_info) => {
                            if tx.send((id, buf[..rx_info.len].to_vec())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => error!(port = %name, "Receive error: {}", e),
                    }
                }
            });
        }
        drop(tx);

        let epoch = Instant::now();
        let mut timers = TimerQueue::new();
        switch.start(&mut timers);

        let mut metrics_timer = tokio::time::interval(METRICS_INTERVAL);

        loop {
            let deadline = timers
                .next_deadline()
                .map(|d| epoch + d)
                .unwrap_or_else(|| Instant::now() + METRICS_INTERVAL);

            tokio::select! {
                received = rx.recv() => {
                    let Some((ingress, frame)) = received else {
                        return Err("All port readers stopped".to_string());
                    };
                    let now = epoch.elapsed();
                    timers.advance_to(now);
                    if let Err(e) = switch.receive_frame(now, ingress, &frame) {
                        debug!(port = ingress, "Dropped frame: {}", e);
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    switch.run_until(&mut timers, epoch.elapsed());
                }
                _ = metrics_timer.tick() => {
                    let summary: Vec<String> = metrics
                        .export()
                        .into_iter()
                        .map(|(name, value)| format!("{}={}", name, value))
                        .collect();
                    debug!(now_ms = timers.now().as_millis() as u64, "{}", summary.join(" "));
                }
            }
        }
    })
}

fn cmd_config_generate(config_path: &Path, output_path: &Path) -> Result<(), String> {
    println!("[INFO] Loading {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        return Err("Validation failed with errors".to_string());
    }

    let lock = config::generate_lock(&cfg);
    let output = config::render_lock(&lock, config_path)
        .map_err(|e| format!("Failed to serialize lock: {}", e))?;

    std::fs::write(output_path, output).map_err(|e| format!("Failed to write lock file: {}", e))?;

    println!("[INFO] Generated {}", output_path.display());
    Ok(())
}

fn cmd_config_validate(config_path: &Path) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}
