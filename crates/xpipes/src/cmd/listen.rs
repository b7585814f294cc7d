use std::sync::{Arc, Mutex};

use tracing::{debug, info};
use xpipes_frame::{DatagramCodec, FrameError};
use xpipes_transport::{Direction, NamedPipe, PipeEnd, PipeOptions, RetryPolicy};

use crate::cmd::ListenArgs;
use crate::exit::{frame_error, transport_error, CliError, CliResult, INTERRUPTED, SUCCESS};
use crate::output::{print_datagram, OutputFormat};

type SharedPipe = Arc<Mutex<Option<NamedPipe>>>;

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let policy = args.retry.policy()?;

    let pipe = if args.create {
        let options = PipeOptions {
            mode: args.mode,
            ..PipeOptions::default()
        };
        NamedPipe::create_with_options(&args.name, options)
            .map_err(|err| transport_error("create failed", err))?
    } else {
        NamedPipe::new(&args.name)
    };
    let name = pipe.name().to_string();
    let end = PipeEnd::new(&pipe, Direction::Read)
        .map_err(|err| transport_error("open failed", err))?;

    // The read end blocks in open/read, so Ctrl-C cleans up and exits from
    // the handler itself.
    let shared: SharedPipe = Arc::new(Mutex::new(Some(pipe)));
    install_ctrlc_handler(shared.clone())?;

    let result = receive(DatagramCodec::new(end), &name, &policy, args.count, format);

    if let Ok(mut guard) = shared.lock() {
        guard.take();
    }
    result
}

fn receive(
    mut codec: DatagramCodec<PipeEnd>,
    name: &str,
    policy: &RetryPolicy,
    count: Option<usize>,
    format: OutputFormat,
) -> CliResult<i32> {
    let mut printed = 0usize;

    loop {
        codec
            .open_with(policy)
            .map_err(|err| frame_error("open failed", err))?;
        debug!(pipe = %name, "read end open");

        loop {
            let datagram = match codec.read() {
                Ok(datagram) => datagram,
                Err(FrameError::ConnectionClosed) => break,
                Err(err) => return Err(frame_error("receive failed", err)),
            };

            printed = printed.saturating_add(1);
            print_datagram(&datagram, name, printed, format);

            if let Some(count) = count {
                if printed >= count {
                    info!(pipe = %name, received = printed, "done");
                    return Ok(SUCCESS);
                }
            }
        }

        // All writers are gone; wait for the next one.
        debug!(pipe = %name, received = printed, "writer closed");
        codec
            .close()
            .map_err(|err| frame_error("close failed", err))?;
    }
}

fn install_ctrlc_handler(pipe: SharedPipe) -> CliResult<()> {
    ctrlc::set_handler(move || {
        if let Ok(mut guard) = pipe.lock() {
            guard.take();
        }
        std::process::exit(INTERRUPTED);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
