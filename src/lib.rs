//! Minimal BOOTP/DHCP engine for bootstrapping an embedded host over
//! Ethernet.
//!
//! Two roles share one packet codec:
//!
//! * [`Client`]: discover a server, obtain an IPv4 lease, a boot
//!   filename, and auxiliary parameters, collected into [`NetParams`]
//!   for an external loader.
//! * [`Server`]: answer a single directly attached peer's
//!   `DHCPDISCOVER`/`DHCPREQUEST` with a fixed `OFFER`/`ACK` pair.
//!
//! The engine is transport-agnostic; the UDP/IP/Ethernet stack is
//! supplied through the [`UdpLink`] trait, and time through a
//! monotonic millisecond count passed to `process`.
//!
//! # Example
//!
//! ```no_run
//! use netboot_dhcp::{Client, ClientConfig, Event, NetParams, net::Eui48Addr};
//! # struct Stack;
//! # impl netboot_dhcp::UdpLink for Stack {
//! #     type Error = core::convert::Infallible;
//! #     fn send(&mut self, _: u16, _: u16, _: &[u8]) -> Result<(), Self::Error> { Ok(()) }
//! #     fn recv(&mut self, _: &mut [u8]) -> Result<Option<netboot_dhcp::Datagram>, Self::Error> { Ok(None) }
//! # }
//! # fn monotonic_ms() -> u32 { 0 }
//! # let mut stack = Stack;
//!
//! // locally administered MAC address
//! const MAC: Eui48Addr = Eui48Addr::new(0x02, 0x00, 0x11, 0x22, 0x33, 0x44);
//!
//! let mut params: NetParams = NetParams::new();
//! let mut dhcp: Client = Client::new(MAC, ClientConfig::new());
//!
//! loop {
//!     match dhcp.process(&mut stack, &mut params, monotonic_ms())? {
//!         Event::Bound => break, // hand params.boot_file to the loader
//!         Event::Failed => panic!("retry count exceeded"),
//!         _ => { /* sleep until the next call or packet interrupt */ }
//!     }
//! }
//! # Ok::<(), core::convert::Infallible>(())
//! ```
//!
//! # Feature Flags
//!
//! All features are disabled by default.
//!
//! * `defmt`: Enable logging with `defmt`.
//! * `log`: Enable logging with `log`.
#![cfg_attr(docsrs, feature(doc_cfg), feature(doc_auto_cfg))]
#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod hostname;
mod link;
pub mod net;
mod params;
mod pkt;
mod rand;
mod server;

pub use hostname::Hostname;
pub use link::{Datagram, UdpLink};
pub use params::NetParams;
pub use pkt::OptionWriter;
pub use server::{Outcome, Server, ServerConfig, ServerEvent};

use net::{Eui48Addr, Ipv4Addr};
use pkt::{check_pkt, MsgType, PktDe, PktSer, Role, FIXED_HDR_LEN, OPT_FIELD_SIZE};

/// BOOTP/DHCP server UDP port.
pub const DST_PORT: u16 = 67;

/// BOOTP/DHCP client UDP port.
pub const SRC_PORT: u16 = 68;

/// Largest payload accepted on receive: an Ethernet MTU minus the
/// IP and UDP headers.
pub(crate) const MAX_FRAME_LEN: usize = 1472;

/// Outgoing requests are a fixed header plus the options field.
const TX_BUF_LEN: usize = FIXED_HDR_LEN + OPT_FIELD_SIZE;

/// Outstanding transaction id capacity; bounds the retry count.
const XID_LIST_CAP: usize = 16;

/// DHCP client states.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// A request is due, either at session start or on retry.
    Init,
    /// Client waits for a DHCPOFFER (or, in BOOTP mode, the reply).
    Selecting,
    /// Client sent a DHCPREQUEST and waits for the DHCPACK.
    Requesting,
    /// Client holds a lease; the session is over.
    Bound,
}

/// Result of one [`Client::process`] call.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Nothing pending; the session already ended.
    None,
    /// Call `process` again after this many milliseconds, or sooner on
    /// packet arrival.
    CallAfter(u32),
    /// A lease was acknowledged and [`NetParams`] is populated; hand
    /// off to the loader.
    Bound,
    /// The retry budget is exhausted.
    Failed,
}

/// Protocol spoken by the client.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// DHCP: DISCOVER, OFFER, REQUEST, ACK.
    Dhcp,
    /// Plain RFC 951 BOOTP: a single request and reply.
    Bootp,
}

/// What to do when the retry budget runs out.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExhaustPolicy {
    /// Report [`Event::Failed`] and stop.
    Fail,
    /// Reset the session in place and keep trying.
    Restart,
}

/// PXE identification transmitted in options 93, 94, and 97.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct PxeConfig {
    /// Client system architecture, option 93.
    pub client_arch: u16,
    /// Client machine identifier, option 97; see [`parse_pxe_uuid`].
    pub uuid: Option<[u8; 16]>,
}

/// Hooks for vendor-specific request options.
///
/// Both methods have no-op defaults; implement the ones you need and
/// pass the extension to [`Client::process_with_vendor`].
pub trait VendorExtension {
    /// Take over the remainder of the options region of an outgoing
    /// request.
    ///
    /// Called after the engine has emitted its own options. Return
    /// `Some` with the number of bytes written through `writer` to
    /// finalize the region; the engine then skips its parameter request
    /// list and padding, so the extension must write the terminating
    /// `END` itself. Return `None` to let the engine finish the region.
    fn prepare_request(&mut self, writer: &mut OptionWriter) -> Option<usize> {
        let _ = writer;
        None
    }

    /// Claim an option the engine does not recognize.
    ///
    /// Return `true` when the option was handled; unclaimed options are
    /// logged.
    fn parse_option(&mut self, tag: u8, value: &[u8]) -> bool {
        let _ = (tag, value);
        false
    }
}

/// A [`VendorExtension`] that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVendorExtension;

impl VendorExtension for NoVendorExtension {}

/// Parse a `pxeuuid` environment string into the binary form for
/// option 97.
///
/// Accepts the canonical `8-4-4-4-12` hexadecimal format.
///
/// # Example
///
/// ```
/// use netboot_dhcp::parse_pxe_uuid;
///
/// assert!(parse_pxe_uuid("550e8400-e29b-41d4-a716-446655440000").is_some());
/// assert!(parse_pxe_uuid("not-a-uuid").is_none());
/// ```
pub fn parse_pxe_uuid(s: &str) -> Option<[u8; 16]> {
    fn hex(byte: u8) -> Option<u8> {
        match byte {
            b'0'..=b'9' => Some(byte - b'0'),
            b'a'..=b'f' => Some(byte - b'a' + 10),
            b'A'..=b'F' => Some(byte - b'A' + 10),
            _ => None,
        }
    }

    let bytes: &[u8] = s.as_bytes();
    if bytes.len() != 36 {
        return None;
    }
    let mut uuid: [u8; 16] = [0; 16];
    let mut out_idx: usize = 0;
    let mut idx: usize = 0;
    while idx < bytes.len() {
        if matches!(idx, 8 | 13 | 18 | 23) {
            if bytes[idx] != b'-' {
                return None;
            }
            idx += 1;
            continue;
        }
        uuid[out_idx] = (hex(bytes[idx])? << 4) | hex(bytes[idx + 1])?;
        out_idx += 1;
        idx += 2;
    }
    Some(uuid)
}

/// DHCP client configuration.
///
/// [`ClientConfig::new`] matches the common netboot setup; fields are
/// public so a build can pin down exactly which options are transmitted
/// and requested.
///
/// # Example
///
/// ```
/// use netboot_dhcp::{ClientConfig, Hostname};
///
/// const CFG: ClientConfig = ClientConfig {
///     hostname: Some(Hostname::new_unwrapped("canyonlands")),
///     bootfile_prefix: Some("vmlinuz"),
///     ..ClientConfig::new()
/// };
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig<'a> {
    /// Protocol to speak, [`Mode::Dhcp`] unless configured otherwise.
    pub mode: Mode,
    /// Host name transmitted in option 12.
    pub hostname: Option<Hostname<'a>>,
    /// Boot file name carried in the `file` field of requests.
    pub bootfile: Option<&'a str>,
    /// Accept only OFFERs whose boot file name starts with this prefix.
    pub bootfile_prefix: Option<&'a str>,
    /// Vendor class identifier transmitted in option 60.
    pub vendor_class: Option<&'a str>,
    /// PXE identification, options 93/94/97.
    pub pxe: Option<PxeConfig>,
    /// The boot server address is configured out-of-band; do not take
    /// `siaddr` or the server MAC from replies.
    pub pinned_server_ip: bool,
    /// Broadcasts per session before the retry budget is exhausted.
    pub retries: u8,
    /// Reply timeout after a REQUEST, in milliseconds.
    pub timeout_ms: u32,
    /// OFFER timeout after a DISCOVER, in milliseconds.
    pub select_timeout_ms: u32,
    /// Minimum length of the emitted options region, padded with `PAD`.
    pub min_ext_len: u16,
    /// Apply a bounded random delay before each broadcast.
    pub random_delay: bool,
    /// Fixed delay between an accepted OFFER and the REQUEST, in
    /// milliseconds.
    pub request_delay_ms: u32,
    /// Retry exhaustion policy.
    pub exhaust: ExhaustPolicy,
    /// Request the subnet mask (option 1).
    pub request_subnet_mask: bool,
    /// Request the time offset (option 2).
    pub request_time_offset: bool,
    /// Request the default gateway (option 3).
    pub request_gateway: bool,
    /// Request DNS servers (option 6).
    pub request_dns: bool,
    /// Request a host name (option 12).
    pub request_hostname: bool,
    /// Request the boot file size (option 13).
    pub request_bootfile_size: bool,
    /// Request the root path (option 17).
    pub request_root_path: bool,
    /// Request the NIS domain (option 40).
    pub request_nis_domain: bool,
    /// Request NTP servers (option 42).
    pub request_ntp: bool,
}

impl ClientConfig<'_> {
    /// The default configuration.
    pub const fn new() -> Self {
        Self {
            mode: Mode::Dhcp,
            hostname: None,
            bootfile: None,
            bootfile_prefix: None,
            vendor_class: None,
            pxe: None,
            pinned_server_ip: false,
            retries: 5,
            timeout_ms: 10_000,
            select_timeout_ms: 3_000,
            min_ext_len: 64,
            random_delay: false,
            request_delay_ms: 0,
            exhaust: ExhaustPolicy::Fail,
            request_subnet_mask: true,
            request_time_offset: false,
            request_gateway: true,
            request_dns: true,
            request_hostname: true,
            request_bootfile_size: true,
            request_root_path: true,
            request_nis_domain: false,
            request_ntp: false,
        }
    }
}

impl Default for ClientConfig<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// BOOTP/DHCP client.
///
/// Obtains a lease by polling [`process`](Self::process); see the crate
/// example. The session can be reset by re-creating this structure.
#[derive(Debug)]
pub struct Client<'a> {
    cfg: ClientConfig<'a>,
    /// Hardware (EUI-48 MAC) address
    mac: Eui48Addr,
    /// DHCP client state
    state: State,
    /// Outstanding transaction ids, one per broadcast
    xids: [u32; XID_LIST_CAP],
    /// Broadcasts transmitted this session
    tries: u8,
    /// Instant the session started, for the `secs` field
    session_start_ms: Option<u32>,
    /// Reply deadline of the current state
    deadline_ms: Option<u32>,
    /// Scheduled transmission instant when `random_delay` is active
    jitter_deadline_ms: Option<u32>,
    /// Scheduled REQUEST instant when `request_delay_ms` is set
    pending_request_ms: Option<u32>,
    /// Transaction id echoed in the REQUEST, from the accepted OFFER
    request_xid: u32,
    /// Address offered in `yiaddr`
    offered_ip: Option<Ipv4Addr>,
    /// Server identifier from option 54 of the accepted OFFER
    server_id: Option<Ipv4Addr>,
    exhausted: bool,
    /// Jitter generator
    rand: rand::Rand,
}

impl<'a> Client<'a> {
    /// Create a new client session.
    pub const fn new(mac: Eui48Addr, cfg: ClientConfig<'a>) -> Self {
        Self {
            cfg,
            rand: rand::Rand::new(mac.seed()),
            mac,
            state: State::Init,
            xids: [0; XID_LIST_CAP],
            tries: 0,
            session_start_ms: None,
            deadline_ms: None,
            jitter_deadline_ms: None,
            pending_request_ms: None,
            request_xid: 0,
            offered_ip: None,
            server_id: None,
            exhausted: false,
        }
    }

    /// DHCP client state.
    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns `true` once a lease has been acknowledged.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.state == State::Bound
    }

    /// Process client events.
    ///
    /// This should be called in these conditions:
    ///
    /// 1. Once to start the session.
    /// 2. When a frame arrives on the client port.
    /// 3. After the duration indicated by [`Event::CallAfter`].
    ///
    /// `monotonic_ms` is a monotonic millisecond count; it may wrap.
    /// Only transport errors propagate; protocol-level failures reduce
    /// to state transitions and log lines.
    pub fn process<L: UdpLink>(
        &mut self,
        link: &mut L,
        params: &mut NetParams,
        monotonic_ms: u32,
    ) -> Result<Event, L::Error> {
        self.process_with_vendor(link, params, &mut NoVendorExtension, monotonic_ms)
    }

    /// [`process`](Self::process) with a vendor extension hook.
    pub fn process_with_vendor<L: UdpLink, V: VendorExtension>(
        &mut self,
        link: &mut L,
        params: &mut NetParams,
        vendor: &mut V,
        monotonic_ms: u32,
    ) -> Result<Event, L::Error> {
        if self.exhausted {
            return Ok(Event::Failed);
        }
        if self.session_start_ms.is_none() {
            self.session_start_ms = Some(monotonic_ms);
        }

        let mut buf = [0u8; MAX_FRAME_LEN];
        while let Some(dg) = link.recv(&mut buf)? {
            if dg.len > buf.len() {
                warn!("frame truncated ({} > {})", dg.len, buf.len());
                continue;
            }
            let frame: &[u8] = &buf[..dg.len];
            if let Err(reject) =
                check_pkt(frame, &dg, Role::Client, &self.xids[..usize::from(self.tries)])
            {
                debug!("filtered pkt: {:?}", reject);
                continue;
            }
            let de: PktDe = PktDe::new(frame);

            if self.cfg.mode == Mode::Bootp {
                if self.state == State::Bound {
                    continue;
                }
                debug!("got good BOOTP reply");
                self.bind(params, &de, dg.src_mac, vendor);
                return Ok(Event::Bound);
            }

            match self.state {
                State::Selecting => {
                    if self.pending_request_ms.is_some() {
                        // a REQUEST is already scheduled
                        continue;
                    }
                    if let Some(prefix) = self.cfg.bootfile_prefix {
                        if !de.file().starts_with(prefix.as_bytes()) {
                            debug!("OFFER boot file does not match the configured prefix");
                            continue;
                        }
                    }
                    let xid: u32 = match de.xid() {
                        Some(xid) => xid,
                        None => continue,
                    };
                    debug!("OFFER accepted, xid={:08X}", xid);
                    self.request_xid = xid;
                    self.offered_ip = de.yiaddr().filter(|ip| !ip.is_unspecified());
                    self.server_id = de.server_id();
                    if let Some(opts) = de.options() {
                        params.apply_options(opts, de.file().is_empty(), vendor);
                    }
                    self.deadline_ms = Some(monotonic_ms.wrapping_add(self.cfg.timeout_ms));
                    if self.cfg.request_delay_ms > 0 {
                        self.pending_request_ms =
                            Some(monotonic_ms.wrapping_add(self.cfg.request_delay_ms));
                    } else {
                        self.send_request(link, vendor, monotonic_ms)?;
                    }
                }
                State::Requesting => match de.msg_type() {
                    Some(MsgType::Ack) => {
                        self.bind(params, &de, dg.src_mac, vendor);
                        return Ok(Event::Bound);
                    }
                    Some(MsgType::Nak) => {
                        // re-discover on the next timeout tick
                        info!("request was NAK'd");
                    }
                    Some(mt) => debug!("ignoring message type {:?}", mt),
                    None => error!("message type option missing"),
                },
                State::Init | State::Bound => {
                    debug!("ignoring frame in state {:?}", self.state)
                }
            }
        }

        if self.state == State::Bound {
            return Ok(Event::None);
        }

        // a scheduled REQUEST falling due
        if let Some(due_at) = self.pending_request_ms {
            if self.state == State::Selecting && deadline_due(monotonic_ms, due_at) {
                self.pending_request_ms = None;
                self.send_request(link, vendor, monotonic_ms)?;
            }
        }

        // reply timeout: retry or give up
        if let Some(deadline) = self.deadline_ms {
            if deadline_due(monotonic_ms, deadline) {
                if self.tries >= self.retry_budget() {
                    match self.cfg.exhaust {
                        ExhaustPolicy::Fail => {
                            info!("retry count exceeded");
                            self.exhausted = true;
                            return Ok(Event::Failed);
                        }
                        ExhaustPolicy::Restart => {
                            info!("retry count exceeded; starting again");
                            self.restart(monotonic_ms);
                        }
                    }
                } else {
                    self.deadline_ms = None;
                    self.pending_request_ms = None;
                    self.set_state(State::Init);
                }
            }
        }

        if self.state == State::Init {
            self.send_discover(link, vendor, monotonic_ms)?;
        }

        Ok(Event::CallAfter(self.next_call_ms(monotonic_ms)))
    }

    fn retry_budget(&self) -> u8 {
        self.cfg.retries.clamp(1, XID_LIST_CAP as u8)
    }

    fn elapsed_secs(&self, monotonic_ms: u32) -> u16 {
        let start: u32 = self.session_start_ms.unwrap_or(monotonic_ms);
        (monotonic_ms.wrapping_sub(start) / 1000)
            .try_into()
            .unwrap_or(u16::MAX)
    }

    fn next_call_ms(&self, monotonic_ms: u32) -> u32 {
        let next: Option<u32> = [
            self.deadline_ms,
            self.jitter_deadline_ms,
            self.pending_request_ms,
        ]
        .iter()
        .flatten()
        .map(|deadline| deadline.wrapping_sub(monotonic_ms))
        .min();
        next.unwrap_or(self.cfg.timeout_ms).max(1)
    }

    fn set_state(&mut self, state: State) {
        debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn restart(&mut self, monotonic_ms: u32) {
        self.tries = 0;
        self.xids = [0; XID_LIST_CAP];
        self.session_start_ms = Some(monotonic_ms);
        self.deadline_ms = None;
        self.jitter_deadline_ms = None;
        self.pending_request_ms = None;
        self.request_xid = 0;
        self.offered_ip = None;
        self.server_id = None;
        self.set_state(State::Init);
    }

    /// Broadcast a DISCOVER (or BOOTP request), honouring the optional
    /// pre-transmit jitter.
    fn send_discover<L: UdpLink, V: VendorExtension>(
        &mut self,
        link: &mut L,
        vendor: &mut V,
        monotonic_ms: u32,
    ) -> Result<(), L::Error> {
        if self.cfg.random_delay {
            match self.jitter_deadline_ms {
                None => {
                    let delay: u32 = self.rand.jitter_ms(self.tries);
                    info!("random delay: {} ms", delay);
                    self.jitter_deadline_ms = Some(monotonic_ms.wrapping_add(delay));
                    return Ok(());
                }
                Some(deadline) if !deadline_due(monotonic_ms, deadline) => return Ok(()),
                Some(_) => self.jitter_deadline_ms = None,
            }
        }

        self.tries += 1;
        info!("BOOTP broadcast {}", self.tries);

        // transaction id: lower four octets of the MAC plus the clock
        let xid: u32 = self.mac.lower_u32().wrapping_add(monotonic_ms);
        self.xids[usize::from(self.tries - 1)] = xid;

        let secs: u16 = self.elapsed_secs(monotonic_ms);
        let mut buf = [0u8; TX_BUF_LEN];
        let mut ser: PktSer = PktSer::new(&mut buf);
        let frame: Option<&[u8]> = match self.cfg.mode {
            Mode::Dhcp => {
                debug!("sending DHCPDISCOVER xid={:08X}", xid);
                ser.dhcp_client(
                    MsgType::Discover,
                    xid,
                    secs,
                    &self.mac,
                    None,
                    None,
                    &self.cfg,
                    vendor,
                )
            }
            Mode::Bootp => {
                debug!("sending BOOTREQUEST xid={:08X}", xid);
                ser.bootp_request(xid, secs, &self.mac, &self.cfg)
            }
        };
        match frame {
            Some(frame) => link.send(SRC_PORT, DST_PORT, frame)?,
            None => error!("discover frame build failed"),
        }
        self.deadline_ms = Some(monotonic_ms.wrapping_add(self.cfg.select_timeout_ms));
        self.set_state(State::Selecting);
        Ok(())
    }

    fn send_request<L: UdpLink, V: VendorExtension>(
        &mut self,
        link: &mut L,
        vendor: &mut V,
        monotonic_ms: u32,
    ) -> Result<(), L::Error> {
        let secs: u16 = self.elapsed_secs(monotonic_ms);
        let mut buf = [0u8; TX_BUF_LEN];
        let mut ser: PktSer = PktSer::new(&mut buf);
        debug!("sending DHCPREQUEST xid={:08X}", self.request_xid);
        match ser.dhcp_client(
            MsgType::Request,
            self.request_xid,
            secs,
            &self.mac,
            self.server_id,
            self.offered_ip,
            &self.cfg,
            vendor,
        ) {
            Some(frame) => link.send(SRC_PORT, DST_PORT, frame)?,
            None => error!("request frame build failed"),
        }
        self.deadline_ms = Some(monotonic_ms.wrapping_add(self.cfg.timeout_ms));
        self.set_state(State::Requesting);
        Ok(())
    }

    /// Store the reply's parameters and finish the session.
    fn bind<V: VendorExtension>(
        &mut self,
        params: &mut NetParams,
        de: &PktDe,
        src_mac: Eui48Addr,
        vendor: &mut V,
    ) {
        if let Some(opts) = de.options() {
            params.apply_options(opts, de.file().is_empty(), vendor);
        }
        params.copy_net_params(de, src_mac, self.cfg.pinned_server_ip);
        self.deadline_ms = None;
        self.jitter_deadline_ms = None;
        self.pending_request_ms = None;
        self.set_state(State::Bound);
        if let Some(ip) = params.ip {
            let o: [u8; 4] = ip.octets();
            info!("DHCP client bound to address {}.{}.{}.{}", o[0], o[1], o[2], o[3]);
        }
    }
}

/// `true` when `now` has reached `deadline`, modulo clock wrap.
pub(crate) const fn deadline_due(now: u32, deadline: u32) -> bool {
    now.wrapping_sub(deadline) < u32::MAX / 2
}
