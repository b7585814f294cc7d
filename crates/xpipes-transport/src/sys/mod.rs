//! Platform primitives behind [`NamedPipe`](crate::NamedPipe) and
//! [`PipeEnd`](crate::PipeEnd): create, remove, connect, disconnect, flush.

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(windows)]
pub(crate) mod windows;
