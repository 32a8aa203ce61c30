use std::io::Write;
use std::sync::mpsc;
use std::thread;

use bytes::Bytes;
use ikwire_frame::FrameConfig;
use ikwire_peer::{Server, ServerClient, ServerConfig};
use ikwire_transport::TcpTransport;

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{peer_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::OutputFormat;

pub const TICK_EVENT: &str = "tick";
const DEFAULT_TICKS: usize = 10;

enum Stop {
    Interrupted,
    Failed(ikwire_peer::PeerError),
}

pub fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    let mut frame = FrameConfig::default();
    if let Some(max) = args.max_payload {
        frame.max_payload_size = max;
    }
    if let Some(idle) = &args.idle_timeout {
        frame.read_timeout = Some(parse_duration(idle)?);
    }
    let server = Server::with_config(ServerConfig {
        frame,
        ..ServerConfig::default()
    });
    register_builtin_events(&server).map_err(|err| peer_error("register failed", err))?;

    let listener = TcpTransport::bind(&args.addr).map_err(|err| transport_error("bind failed", err))?;
    tracing::info!(addr = %listener.local_addr(), "listening");

    let (tx, rx) = mpsc::channel();
    let interrupt = tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt.send(Stop::Interrupted);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;

    thread::Builder::new()
        .name("ikwire-accept".to_string())
        .spawn(move || {
            if let Err(err) = server.serve(listener) {
                let _ = tx.send(Stop::Failed(err));
            }
        })
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start server: {err}")))?;

    match rx.recv() {
        Ok(Stop::Failed(err)) => Err(peer_error("server stopped", err)),
        Ok(Stop::Interrupted) | Err(_) => {
            tracing::info!("shutting down");
            Ok(SUCCESS)
        }
    }
}

pub fn register_builtin_events(server: &Server) -> ikwire_peer::Result<()> {
    server.register("echo", |_, data| Some(data))?;
    server.register("stdout-stream", stdout_stream)?;
    server.register("ticker", ticker)?;
    Ok(())
}

fn stdout_stream(_: &mut ServerClient, data: Bytes) -> Option<Bytes> {
    let mut out = std::io::stdout().lock();
    let reply = match out.write_all(&data).and_then(|()| out.flush()) {
        Ok(()) => format!("WROTE {} BYTES", data.len()),
        Err(err) => format!("failed to write to stdout: {err}"),
    };
    Some(Bytes::from(reply))
}

fn ticker(client: &mut ServerClient, data: Bytes) -> Option<Bytes> {
    let count = tick_count(&data);
    for i in 0..count {
        if let Err(err) = client.send(TICK_EVENT, i.to_string().as_bytes()) {
            tracing::warn!(client = client.id(), error = %err, "ticker stopped");
            break;
        }
    }
    None
}

fn tick_count(data: &[u8]) -> usize {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.trim().parse().ok())
        .unwrap_or(DEFAULT_TICKS)
}
