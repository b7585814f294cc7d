//! Datagrams over a FIFO with tokio.
//!
//! Run with:
//!   cargo run --example async-fifo --features async

#[cfg(unix)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};
    use xpipes::frame::AsyncDatagramCodec;
    use xpipes::transport::tokio_pipe::{open_receiver, open_sender};
    use xpipes::transport::{NamedPipe, RetryPolicy};

    let path = std::env::temp_dir().join(format!("xpipes-async-{}", std::process::id()));
    let pipe = NamedPipe::create(&path)?;
    let policy = RetryPolicy::fixed(50, Duration::from_millis(20));

    let rx = open_receiver(pipe.name(), &policy).await?;
    let tx = open_sender(pipe.name(), &policy).await?;

    let mut sink = FramedWrite::new(tx, AsyncDatagramCodec::new());
    let mut stream = FramedRead::new(rx, AsyncDatagramCodec::new());

    tokio::spawn(async move {
        for i in 0..3 {
            if let Err(e) = sink.send(format!("tick {i}")).await {
                eprintln!("send failed: {e}");
                return;
            }
        }
    });

    while let Some(datagram) = stream.next().await {
        let datagram = datagram?;
        eprintln!("Received {:?}", String::from_utf8_lossy(&datagram));
    }

    drop(pipe);
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("async pipes are only available on Unix");
}
