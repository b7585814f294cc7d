use xpipes_transport::NamedPipe;

use crate::cmd::RemoveArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_action, OutputFormat};

pub fn run(args: RemoveArgs, format: OutputFormat) -> CliResult<i32> {
    let mut pipe = NamedPipe::new(&args.name);
    pipe.remove()
        .map_err(|err| transport_error("remove failed", err))?;
    print_action(&pipe.name().to_string(), "removed", None, format);
    Ok(SUCCESS)
}
