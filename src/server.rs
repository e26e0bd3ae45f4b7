//! One-shot DHCP server for a directly attached peer.
//!
//! Typically used to hand an address to the far end of a USB-Ethernet
//! link while firmware is being loaded: one `OFFER`, one `ACK`, done.

use crate::link::UdpLink;
use crate::net::Ipv4Addr;
use crate::pkt::{check_pkt, MsgType, PktDe, PktSer, Role, REPLY_FRAME_LEN};
use crate::{deadline_due, DST_PORT, MAX_FRAME_LEN, SRC_PORT};

/// Address pool of the one-shot server: exactly one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Our own address, sent as `siaddr` and the server identifier.
    pub dev_ip: Ipv4Addr,
    /// The single address handed out, sent as `yiaddr`.
    pub peer_ip: Ipv4Addr,
    /// Subnet mask for the link, sent as option 1.
    pub netmask: Ipv4Addr,
    /// Give up when no `DISCOVER` arrives within this window.
    pub timeout_ms: u32,
}

impl ServerConfig {
    /// Create a configuration with the default 10 second timeout.
    pub const fn new(dev_ip: Ipv4Addr, peer_ip: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        Self {
            dev_ip,
            peer_ip,
            netmask,
            timeout_ms: 10_000,
        }
    }
}

/// How a server session ended.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// The session is still running.
    Idle,
    /// An `ACK` was transmitted; the peer holds the address.
    Served,
    /// No `DISCOVER` arrived within the timeout window.
    TimedOut,
}

/// Result of one [`Server::process`] call.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServerEvent {
    /// Call `process` again after this many milliseconds, or sooner on
    /// packet arrival.
    CallAfter(u32),
    /// An `ACK` was transmitted; the session is over.
    Served,
    /// The session timed out without a `DISCOVER`; no address was
    /// handed out.
    TimedOut,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum State {
    WaitForDiscover,
    WaitForRequest,
    Done,
}

/// One-shot DHCP server.
///
/// Answers a single peer's `DISCOVER`/`REQUEST` with a fixed
/// `OFFER`/`ACK` pair built from [`ServerConfig`], then reports
/// [`ServerEvent::Served`]. A `REQUEST` arriving first (a reattaching
/// peer) is acknowledged immediately.
#[derive(Debug)]
pub struct Server {
    cfg: ServerConfig,
    state: State,
    outcome: Outcome,
    deadline_ms: Option<u32>,
}

impl Server {
    /// Create a new server session.
    ///
    /// The session can be reset by re-creating this structure.
    pub const fn new(cfg: ServerConfig) -> Self {
        Self {
            cfg,
            state: State::WaitForDiscover,
            outcome: Outcome::Idle,
            deadline_ms: None,
        }
    }

    /// How the session ended, [`Outcome::Idle`] while it is running.
    #[inline]
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Process server events.
    ///
    /// Call after construction to arm the session timeout, on packet
    /// arrival, and after the returned delay. `monotonic_ms` is a
    /// monotonic millisecond count; it may wrap.
    pub fn process<L: UdpLink>(
        &mut self,
        link: &mut L,
        monotonic_ms: u32,
    ) -> Result<ServerEvent, L::Error> {
        if self.state == State::Done {
            return Ok(self.terminal_event());
        }
        let deadline: u32 = *self
            .deadline_ms
            .get_or_insert(monotonic_ms.wrapping_add(self.cfg.timeout_ms));

        let mut buf = [0u8; MAX_FRAME_LEN];
        while let Some(dg) = link.recv(&mut buf)? {
            if dg.len > buf.len() {
                warn!("frame truncated ({} > {})", dg.len, buf.len());
                continue;
            }
            let frame: &[u8] = &buf[..dg.len];
            if let Err(reject) = check_pkt(frame, &dg, Role::Server, &[]) {
                debug!("filtered pkt: {:?}", reject);
                continue;
            }
            let de: PktDe = PktDe::new(frame);
            match (self.state, de.msg_type()) {
                // a reattaching peer may request without discovery
                (State::WaitForDiscover | State::WaitForRequest, Some(MsgType::Request)) => {
                    debug!("REQUEST packet received");
                    self.reply(link, &de, MsgType::Ack)?;
                    self.state = State::Done;
                    self.outcome = Outcome::Served;
                    return Ok(ServerEvent::Served);
                }
                (State::WaitForDiscover, Some(MsgType::Discover)) => {
                    debug!("DISCOVER packet received");
                    self.reply(link, &de, MsgType::Offer)?;
                    self.state = State::WaitForRequest;
                }
                (_, mt) => debug!("ignoring message type {:?}", mt),
            }
        }

        if deadline_due(monotonic_ms, deadline) {
            debug!("DHCP server timed out");
            self.state = State::Done;
            self.outcome = Outcome::TimedOut;
            return Ok(ServerEvent::TimedOut);
        }
        Ok(ServerEvent::CallAfter(deadline.wrapping_sub(monotonic_ms)))
    }

    fn reply<L: UdpLink>(&mut self, link: &mut L, req: &PktDe, kind: MsgType) -> Result<(), L::Error> {
        let mut buf = [0u8; REPLY_FRAME_LEN];
        let mut ser: PktSer = PktSer::new(&mut buf);
        match ser.bootreply(req, kind, &self.cfg.dev_ip, &self.cfg.peer_ip, &self.cfg.netmask) {
            // the server transmits from port 67 to port 68
            Some(frame) => link.send(DST_PORT, SRC_PORT, frame),
            None => {
                error!("failed to build {:?} reply", kind);
                Ok(())
            }
        }
    }

    fn terminal_event(&self) -> ServerEvent {
        match self.outcome {
            Outcome::Served => ServerEvent::Served,
            _ => ServerEvent::TimedOut,
        }
    }
}
