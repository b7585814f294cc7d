use tracing::warn;
use xpipes_transport::{NamedPipe, PipeOptions};

use crate::cmd::CreateArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_action, OutputFormat};

pub fn run(args: CreateArgs, format: OutputFormat) -> CliResult<i32> {
    let options = PipeOptions {
        mode: args.mode,
        ..PipeOptions::default()
    };
    let pipe = NamedPipe::create_with_options(&args.name, options)
        .map_err(|err| transport_error("create failed", err))?;

    if cfg!(windows) {
        warn!("windows named pipes do not outlive the creating process");
    }

    let name = pipe.persist();
    print_action(&name.to_string(), "created", None, format);
    Ok(SUCCESS)
}

/// Parse octal permission bits such as `600` or `0o640`.
pub fn parse_mode(input: &str) -> Result<u32, String> {
    let digits = input.trim();
    let digits = digits.strip_prefix("0o").unwrap_or(digits);
    let mode =
        u32::from_str_radix(digits, 8).map_err(|_| format!("invalid octal mode: {input}"))?;
    if mode > 0o777 {
        return Err(format!("mode out of range: {input}"));
    }
    Ok(mode)
}
