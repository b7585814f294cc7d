use std::fs;
use std::time::Duration;

use tracing::{debug, info};
use xpipes_frame::DatagramCodec;
use xpipes_transport::PipeEnd;

use crate::cmd::SendArgs;
use crate::exit::{frame_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_action, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let policy = args.retry.policy()?;
    let payload = resolve_payload(&args)?;

    let end = PipeEnd::writer(&args.name);
    let name = end.name().to_string();
    let mut codec = DatagramCodec::new(end);
    codec
        .open_with(&policy)
        .map_err(|err| frame_error("open failed", err))?;
    debug!(pipe = %name, "write end open");

    for _ in 0..args.repeat {
        codec
            .write(&payload)
            .map_err(|err| frame_error("send failed", err))?;
    }

    codec
        .close()
        .map_err(|err| frame_error("close failed", err))?;
    info!(pipe = %name, count = args.repeat, size = payload.len(), "sent");

    print_action(&name, "sent", Some(args.repeat as usize), format);
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
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::cmd::RetryArgs;

    fn args() -> SendArgs {
        SendArgs {
            name: PathBuf::from("/tmp/unused.fifo"),
            json: None,
            data: None,
            file: None,
            repeat: 1,
            retry: RetryArgs {
                retries: 1,
                retry_delay: "0ms".to_string(),
            },
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("0ms").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("5m").is_err());
    }

    #[test]
    fn payload_from_json_is_validated() {
        let mut send = args();
        send.json = Some("{\"x\":1}".to_string());
        assert_eq!(resolve_payload(&send).unwrap(), b"{\"x\":1}");

        send.json = Some("{nope".to_string());
        assert_eq!(resolve_payload(&send).unwrap_err().code, USAGE);
    }

    #[test]
    fn missing_payload_is_empty_message() {
        assert!(resolve_payload(&args()).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let mut send = args();
        send.file = Some(PathBuf::from("/nonexistent/xpipes/payload.bin"));
        assert!(resolve_payload(&send).is_err());
    }
}
