use bobert::core::state::BobertConfig;
use bobert::io::dispatch::Dispatcher;
use bobert::io::events::Impulse;
use bobert::io::serial::SerialLine;
use bobert::io::watcher::setup_watcher;
use bobert::memory::PersistentStore;

use colored::*;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BobertConfig::load();
    let store = PersistentStore::from_config(&config);
    store.ensure_root()?;

    let serial = match SerialLine::open_first(&config.serial_ports, config.baud_rate) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{} Drive cannot run without serial connection: {:#}", "❌".red(), e);
            return Ok(());
        }
    };
    println!("{} Serial connection established on {}", "🔌".green(), serial.port());

    let (tx, mut rx) = mpsc::channel(16);
    let _watcher = match setup_watcher(store.root(), tx.clone()) {
        Ok(w) => Some(w),
        Err(e) => {
            eprintln!("{} Log watcher unavailable, polling only: {:#}", "⚠️".yellow(), e);
            None
        }
    };

    let interrupt = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = interrupt.send(Impulse::SystemInterrupt).await;
        }
    });

    let poll_tx = tx;
    let poll_every = Duration::from_millis(config.dispatch_poll_ms.max(1));
    tokio::spawn(async move {
        let mut ticker = interval(poll_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if poll_tx.send(Impulse::PollTick).await.is_err() {
                break;
            }
        }
    });

    println!("{}", "🛞 Drive online: following move commands".green().bold());
    let mut dispatcher = Dispatcher::new(serial);
    while let Some(impulse) = rx.recv().await {
        match impulse {
            Impulse::LogChanged | Impulse::PollTick => {
                if let Err(e) = dispatcher.scan(store.log_path()) {
                    eprintln!("{} Error in drive loop: {:#}", "❌".red(), e);
                }
            }
            Impulse::Error(e) => eprintln!("{} {}", "⚠️".yellow(), e),
            Impulse::SystemInterrupt => break,
        }
    }

    let serial = dispatcher.into_sink();
    println!("{} Shutting down drive, closing {}", "👋".green(), serial.port());
    drop(serial);
    Ok(())
}
