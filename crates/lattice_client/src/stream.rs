//! The transport seam. Connections are plain TCP by default; a TLS (or any
//! other) transport is plugged in by the integrator as a [`Connector`]
//! callback that wraps the freshly connected socket. No cryptographic
//! dependency ships with this crate.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::rc::Rc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Object-safe read+write stream.
pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Unpin {}

impl<T: AsyncRead + AsyncWrite + Unpin> AsyncReadWrite for T {}

pub type BoxStream = Box<dyn AsyncReadWrite>;

/// Wraps a connected TCP socket (e.g. with a TLS handshake against the
/// given host name). Runs on the local task set, so no `Send` bound.
pub type Connector =
    Rc<dyn Fn(TcpStream, String) -> Pin<Box<dyn Future<Output = io::Result<BoxStream>>>>>;

/// Finish the transport for a freshly connected socket.
pub async fn finish(
    sock: TcpStream,
    tls: bool,
    host: &str,
    connector: Option<&Connector>,
) -> io::Result<BoxStream> {
    if !tls {
        return Ok(Box::new(sock));
    }
    match connector {
        Some(connector) => connector(sock, host.to_owned()).await,
        None => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "tls requested but no tls transport is configured",
        )),
    }
}
