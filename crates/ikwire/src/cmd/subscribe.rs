use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use ikwire_peer::Client;

use crate::cmd::SubscribeArgs;
use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_frame, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: SubscribeArgs, format: OutputFormat) -> CliResult<i32> {
    let client = Client::with_config(&args.addr, args.connect.client_config()?);
    let payload = args.data.as_deref().unwrap_or_default().as_bytes();

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;

    let (tx, rx) = mpsc::channel();
    client
        .subscribe(&args.event, payload, move |frame| {
            let _ = tx.send(frame);
        })
        .map_err(|err| peer_error("subscribe failed", err))?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let frame = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            // The reader exited; `close` reports why.
            Err(RecvTimeoutError::Disconnected) => break,
        };

        print_frame(&frame, client.addr(), format);
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    client
        .close()
        .map_err(|err| peer_error("subscription failed", err))?;
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
