//! Two threads exchanging datagrams over one named pipe.
//!
//! Run with:
//!   cargo run --example fifo-datagrams
//!
//! Or talk to the CLI from another terminal:
//!   cargo run --features cli -- listen /tmp/xpipes-demo --create
//!   cargo run --features cli -- send /tmp/xpipes-demo --data hello --repeat 3

use std::thread;
use std::time::Duration;

use xpipes::frame::{DatagramCodec, FrameError};
use xpipes::transport::{Direction, NamedPipe, PipeEnd, RetryPolicy};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let name = if cfg!(windows) {
        format!("xpipes-demo-{}", std::process::id())
    } else {
        std::env::temp_dir()
            .join(format!("xpipes-demo-{}", std::process::id()))
            .to_string_lossy()
            .into_owned()
    };

    // Removed again when `pipe` goes out of scope.
    let pipe = NamedPipe::create(name.as_str())?;
    eprintln!("Created {}", pipe.name());

    let writer_name = pipe.name().clone();
    let writer = thread::spawn(move || -> Result<(), FrameError> {
        let end = PipeEnd::writer(writer_name)
            .with_retry_policy(RetryPolicy::fixed(50, Duration::from_millis(20)));
        let mut codec = DatagramCodec::new(end);
        codec.open()?;
        for message in ["Hello", "", "World", "and the rest of the universe."] {
            codec.write(message.as_bytes())?;
        }
        codec.close()
    });

    let mut reader = DatagramCodec::new(PipeEnd::new(&pipe, Direction::Read)?);
    reader.open()?;
    loop {
        match reader.read() {
            Ok(datagram) => eprintln!(
                "Received {} bytes: {:?}",
                datagram.len(),
                String::from_utf8_lossy(&datagram)
            ),
            Err(FrameError::ConnectionClosed) => break,
            Err(e) => return Err(e.into()),
        }
    }
    reader.close()?;

    writer.join().map_err(|_| "writer thread panicked")??;
    Ok(())
}
