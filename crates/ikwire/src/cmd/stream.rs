use std::fs::File;
use std::io::{self, Read};

use ikwire_peer::{Client, StreamOptions};

use crate::cmd::StreamArgs;
use crate::exit::{io_error, peer_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_raw, print_stream_summary, OutputFormat};

pub fn run(args: StreamArgs, format: OutputFormat) -> CliResult<i32> {
    if args.chunk_size == 0 {
        return Err(CliError::new(USAGE, "--chunk-size must be greater than zero"));
    }

    let source: Box<dyn Read> = match &args.file {
        Some(path) => Box::new(File::open(path).map_err(|err| {
            io_error(&format!("failed opening {}", path.display()), err)
        })?),
        None => Box::new(io::stdin().lock()),
    };

    let client = Client::with_config(&args.addr, args.connect.client_config()?);
    let options = StreamOptions {
        chunk_size: args.chunk_size,
    };
    let summary = client
        .stream_with(&args.event, source, options, |reply| {
            if matches!(format, OutputFormat::Raw) {
                print_raw(&reply);
            } else {
                tracing::debug!(reply = %String::from_utf8_lossy(&reply), "chunk acknowledged");
            }
        })
        .map_err(|err| peer_error("stream failed", err))?;

    print_stream_summary(&args.event, &summary, client.addr(), format);
    client
        .close()
        .map_err(|err| peer_error("close failed", err))?;
    Ok(SUCCESS)
}
