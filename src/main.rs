use bobert::core::monitor::ReinforcementMonitor;
use bobert::core::r#loop::{cancel_on_signal, control_loop, Senses};
use bobert::core::state::{BobertConfig, GlobalState, CONFIG_FILE};
use bobert::io::audio::{AlsaAudio, AudioDevice};
use bobert::io::gpio::{DigitalLines, SysfsLines};
use bobert::io::vision::CameraCapture;

use anyhow::{Context, Result};
use colored::*;
use std::env;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let command = env::args().nth(1).unwrap_or_else(|| "run".to_string());
    match command.as_str() {
        "init" => init_workspace(),
        "check" => check_config(),
        "run" => run().await,
        other => {
            eprintln!("Unknown command '{}'. Usage: bobert [run|init|check]", other);
            std::process::exit(2);
        }
    }
}

fn init_workspace() -> Result<()> {
    let config = BobertConfig::load();
    let config_path = config.data_dir.join(CONFIG_FILE);
    if config_path.exists() {
        println!("{} Bobert is already set up in {:?}.", "✅".green(), config.data_dir);
        return Ok(());
    }
    let path = BobertConfig::write_default(&config.data_dir)?;
    println!("{} Wrote default config to {:?}", "🧬".green(), path);
    Ok(())
}

fn check_config() -> Result<()> {
    let config = BobertConfig::load();
    println!("{}", "⚙️  Effective configuration".bold());
    println!("{}", toml::to_string_pretty(&config)?);

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("{}", "✅ Configuration looks good.".green());
    } else {
        println!("{}", "Configuration Warnings:".yellow());
        for warning in warnings {
            println!("  ⚠️  {}", warning);
        }
    }
    Ok(())
}

async fn run() -> Result<()> {
    println!("{}", "🤖 Bobert Starting Up...".green().bold());
    let config = BobertConfig::load();
    for warning in config.validate() {
        println!("{} {}", "⚠️".yellow(), warning);
    }

    let state = GlobalState::bootstrap(config).context("Failed to initialise state")?;
    let config = state.config.clone();

    let lines: Option<Box<dyn DigitalLines>> =
        match SysfsLines::open(&[config.reward_pin, config.punish_pin], config.gpio_base).await {
            Ok(lines) => Some(Box::new(lines)),
            Err(e) => {
                eprintln!("{} Failed to setup GPIO: {:#}", "⚠️".yellow(), e);
                None
            }
        };

    let audio: Option<Arc<dyn AudioDevice>> = match AlsaAudio::probe(config.sample_rate).await {
        Ok(a) => Some(Arc::new(a)),
        Err(e) => {
            eprintln!("{} Audio unavailable: {:#}", "⚠️".yellow(), e);
            None
        }
    };
    let senses = Senses {
        vision: Arc::new(CameraCapture::from_config(&config)),
        audio,
    };

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), cancel.clone()));

    let monitor = ReinforcementMonitor::spawn(state.clone(), lines, cancel.clone());
    let control = tokio::spawn(control_loop(state.clone(), senses, cancel.clone()));

    if let Err(e) = control.await {
        eprintln!("{} Control loop aborted: {}", "❌".red(), e);
        cancel.cancel();
    }
    if let Some(monitor) = monitor {
        let _ = monitor.await;
    }

    // Both activities have stopped: write the final snapshot once.
    {
        let mut brain = state.brain.lock().await;
        if let Err(e) = brain.flush(&state.store) {
            eprintln!("{} Failed to flush state: {:#}", "❌".red(), e);
        }
    }
    state.store.log("status=offline");
    println!("{}", "👋 Graceful shutdown complete.".green());
    Ok(())
}
