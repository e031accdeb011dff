//! Finding the [`NetworkStream`] underneath TLS and compression layers.
//!
//! A mail connection stacks at most two layers on the socket stream:
//!
//! ```text
//! compression ─→ TLS ─→ NetworkStream
//! ```
//!
//! Either layer may be missing. Anything else is opaque.

use tokio_rustls::client::TlsStream;

use crate::socket::Socket;
use crate::stream::NetworkStream;

/// What kind of stream a [`StreamLayer`] is.
pub enum Layer<'a, S: Socket> {
    /// The socket stream itself.
    Network(&'a NetworkStream<S>),
    /// A TLS session over the given stream.
    Tls(&'a dyn StreamLayer<S>),
    /// A compression codec over the given stream.
    Compression(&'a dyn StreamLayer<S>),
    /// A stream that does not expose what it wraps.
    Opaque,
}

/// A stream that can say what it is layered on.
pub trait StreamLayer<S: Socket> {
    /// Returns this stream's kind and, for wrappers, the wrapped stream.
    fn layer(&self) -> Layer<'_, S>;
}

impl<S: Socket> StreamLayer<S> for NetworkStream<S> {
    fn layer(&self) -> Layer<'_, S> {
        Layer::Network(self)
    }
}

impl<S: Socket, IO: StreamLayer<S>> StreamLayer<S> for TlsStream<IO> {
    fn layer(&self) -> Layer<'_, S> {
        Layer::Tls(self.get_ref().0)
    }
}

/// Returns the socket stream at the bottom of `stream`.
///
/// Looks through one compression layer and then one TLS layer, in that
/// order. Returns `None` if the chain does not end in a [`NetworkStream`].
#[must_use]
pub fn network_stream<S: Socket>(stream: &dyn StreamLayer<S>) -> Option<&NetworkStream<S>> {
    let mut layer = stream.layer();
    if let Layer::Compression(inner) = layer {
        layer = inner.layer();
    }
    if let Layer::Tls(inner) = layer {
        layer = inner.layer();
    }
    match layer {
        Layer::Network(network) => Some(network),
        _ => None,
    }
}
