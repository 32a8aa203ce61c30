use std::fs;

use ikwire_frame::Frame;
use ikwire_peer::Client;

use crate::cmd::SendArgs;
use crate::exit::{io_error, peer_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let client = Client::with_config(&args.addr, args.connect.client_config()?);

    let reply = client
        .send(&args.event, &payload)
        .map_err(|err| peer_error("send failed", err))?;
    print_frame(&Frame::new(args.event.as_str(), reply), client.addr(), format);

    client
        .close()
        .map_err(|err| peer_error("close failed", err))?;
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
