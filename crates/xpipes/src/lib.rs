//! Cross-platform named pipes with reliable datagram framing.
//!
//! xpipes unifies POSIX FIFOs and Windows named pipes behind one lifecycle
//! (create, open with rendezvous retry, close, remove) and layers a
//! base64 + NUL framing codec on top, so readers always see whole messages
//! in the order they were written.
//!
//! # Crate Structure
//!
//! - [`transport`]: Named pipe identities and directional endpoints
//! - [`frame`]: Base64 + NUL datagram framing over any byte stream
//!
//! # Example
//!
//! ```no_run
//! use xpipes::frame::DatagramCodec;
//! use xpipes::transport::{Direction, NamedPipe, PipeEnd};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pipe = NamedPipe::create("/tmp/xpipes-demo")?;
//! let mut reader = DatagramCodec::new(PipeEnd::new(&pipe, Direction::Read)?);
//! reader.open()?;
//! let message = reader.read()?;
//! println!("{} bytes", message.len());
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use xpipes_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use xpipes_frame::*;
}
