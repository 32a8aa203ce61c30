use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use ikwire_peer::{ClientConfig, DEFAULT_ADDR, DEFAULT_CHUNK_SIZE};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod stream;
pub mod subscribe;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a server with the built-in echo, stdout-stream and ticker events.
    Serve(ServeArgs),
    /// Send one event and print the reply.
    Send(SendArgs),
    /// Subscribe to an event and print pushed frames.
    Subscribe(SubscribeArgs),
    /// Upload a file or stdin as a stream of chunks.
    Stream(StreamArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Subscribe(args) => subscribe::run(args, format),
        Command::Stream(args) => stream::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(env = "IKWIRE_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,
    /// Largest accepted payload in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
    /// Idle timeout per connection (e.g. 30s, 500ms). Default: none.
    #[arg(long)]
    pub idle_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Read/write timeout for replies (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub read_timeout: String,
    /// Dial timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
    /// Largest payload sent or accepted, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
}

impl ConnectArgs {
    pub fn client_config(&self) -> CliResult<ClientConfig> {
        let timeout = parse_duration(&self.read_timeout)?;
        let mut config = ClientConfig::default()
            .with_read_timeout(Some(timeout))
            .with_write_timeout(Some(timeout))
            .with_connect_timeout(Some(parse_duration(&self.connect_timeout)?));
        if let Some(max) = self.max_payload {
            config = config.with_max_payload_size(max);
        }
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Server address.
    #[arg(env = "IKWIRE_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,
    /// Event name.
    #[arg(long, short = 'e')]
    pub event: String,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Args, Debug)]
pub struct SubscribeArgs {
    /// Server address.
    #[arg(env = "IKWIRE_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,
    /// Event name.
    #[arg(long, short = 'e')]
    pub event: String,
    /// Payload of the subscribing request.
    #[arg(long)]
    pub data: Option<String>,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Server address.
    #[arg(env = "IKWIRE_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,
    /// Event name.
    #[arg(long, short = 'e')]
    pub event: String,
    /// File to upload. Default: stdin.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Bytes per chunk.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn connect_args_build_client_config() {
        let args = ConnectArgs {
            read_timeout: "250ms".to_string(),
            connect_timeout: "1s".to_string(),
            max_payload: Some(64),
        };
        let config = args.client_config().unwrap();
        assert_eq!(config.frame.read_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.frame.write_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(1)));
        assert_eq!(config.frame.max_payload_size, 64);
    }
}
