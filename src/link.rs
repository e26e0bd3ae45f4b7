//! Transport seam between the protocol engine and the network stack.

use crate::net::Eui48Addr;

/// Metadata for a datagram delivered by [`UdpLink::recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datagram {
    /// UDP destination port.
    pub dst_port: u16,
    /// UDP source port.
    pub src_port: u16,
    /// Ethernet source address of the frame carrying the datagram.
    pub src_mac: Eui48Addr,
    /// Payload length in bytes, which may exceed what was copied into
    /// the caller's buffer.
    pub len: usize,
}

/// A broadcast-capable UDP endpoint.
///
/// The engine has no opinion on how frames move: implement this on top
/// of a hardware driver, an OS socket, or an in-memory queue for tests.
pub trait UdpLink {
    /// Transport error type.
    type Error;

    /// Transmit `payload` from `src_port` to `dst_port`.
    ///
    /// The implementation addresses the frame to the Ethernet broadcast
    /// address `FF:FF:FF:FF:FF:FF` and IP destination `255.255.255.255`,
    /// and fills in the L2/IP/UDP headers.
    fn send(&mut self, src_port: u16, dst_port: u16, payload: &[u8]) -> Result<(), Self::Error>;

    /// Retrieve the next pending datagram, if any.
    ///
    /// Copies up to `buf.len()` payload bytes into `buf` and reports the
    /// true payload length in [`Datagram::len`]; the engine drops frames
    /// that did not fit. Returns `Ok(None)` when no datagram is pending.
    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<Datagram>, Self::Error>;
}
