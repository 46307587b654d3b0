use clap::Parser;
use log::info;
use ruuvi_relay::app::{self, Options};
use ruuvi_relay::shutdown;
use std::panic::{self, PanicHookInfo};
use tokio::signal::ctrl_c;

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    env_logger::init();

    let options = Options::parse();

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    tokio::spawn(async move {
        wait_for_termination().await;
        info!("termination requested; stopping");
        let _ = shutdown_tx.send(true);
    });

    match app::run(options, shutdown_rx).await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}

async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                let _ = ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c().await;
    }
}
