//! BOOTP/DHCP wire format.
//!
//! From [RFC 951], [RFC 1533], and [RFC 2131].
//!
//! [RFC 951]: https://tools.ietf.org/html/rfc951
//! [RFC 1533]: https://tools.ietf.org/html/rfc1533
//! [RFC 2131]: https://tools.ietf.org/html/rfc2131

use crate::link::Datagram;
use crate::net::{Eui48Addr, Ipv4Addr};
use crate::{ClientConfig, PxeConfig, VendorExtension, DST_PORT, SRC_PORT};

/// Length of the fixed BOOTP header, `op` through `file`.
pub(crate) const FIXED_HDR_LEN: usize = 236;

/// Capacity of the options field in outgoing requests.
pub(crate) const OPT_FIELD_SIZE: usize = 312;

/// Byte offset of the options field (and its magic cookie).
const OPT_OFFSET: usize = FIXED_HDR_LEN;

/// Shortest frame accepted on receive: a fixed header with no options.
pub(crate) const MIN_PKT_LEN: usize = FIXED_HDR_LEN;

/// Value of option 57 in outgoing requests.
const MAX_DHCP_MSG_SIZE: u16 = (576 - 312 + OPT_FIELD_SIZE) as u16;

/// RFC 1048 magic cookie prefixing the options region.
const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];

/// Lease handed out by the one-shot server: one day plus nine seconds.
const SERVER_LEASE_SECS: u32 = 86_409;

/// Options region length of a server reply:
/// cookie, message type, server id, lease time, subnet mask, END.
pub(crate) const SERVER_OPTS_LEN: usize = 26;

/// Total payload length of a server reply.
pub(crate) const REPLY_FRAME_LEN: usize = FIXED_HDR_LEN + SERVER_OPTS_LEN;

const HW_ADDR_LEN: u8 = 6;

/// DHCP options.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[allow(dead_code)]
pub(crate) enum Options {
    Pad = 0,
    SubnetMask = 1,
    TimeOffset = 2,
    Router = 3,
    Dns = 6,
    Hostname = 12,
    BootFileSize = 13,
    DomainName = 15,
    RootPath = 17,
    BroadcastAddr = 28,
    NisDomain = 40,
    NtpServers = 42,
    /// Requested IP Address
    ///
    /// From [RFC 2132 Section 9.1](https://tools.ietf.org/html/rfc2132#section-9.1)
    RequestedIp = 50,
    LeaseTime = 51,
    MessageType = 53,
    ServerId = 54,
    ParameterRequest = 55,
    MaxMsgSize = 57,
    RenewalTime = 58,
    RebindingTime = 59,
    VendorClass = 60,
    TftpServerName = 66,
    /// Bootfile name, used by some servers instead of the `file` field.
    ///
    /// From [RFC 2132 Section 9.5](https://tools.ietf.org/html/rfc2132#section-9.5)
    BootfileName = 67,
    PxeClientArch = 93,
    PxeNetIfId = 94,
    PxeUuid = 97,
    End = 255,
}

impl From<Options> for u8 {
    fn from(val: Options) -> u8 {
        val as u8
    }
}

/// DHCP message types.
///
/// From [RFC 2132 Section 9.6](https://tools.ietf.org/html/rfc2132#section-9.6)
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum MsgType {
    /// DHCPDISCOVER
    Discover = 1,
    /// DHCPOFFER
    Offer = 2,
    /// DHCPREQUEST
    Request = 3,
    /// DHCPDECLINE
    Decline = 4,
    /// DHCPACK
    Ack = 5,
    /// DHCPNAK
    Nak = 6,
    /// DHCPRELEASE
    Release = 7,
    /// DHCPINFORM
    Inform = 8,
}

impl From<MsgType> for u8 {
    fn from(val: MsgType) -> u8 {
        val as u8
    }
}

impl TryFrom<u8> for MsgType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MsgType::Discover),
            2 => Ok(MsgType::Offer),
            3 => Ok(MsgType::Request),
            4 => Ok(MsgType::Decline),
            5 => Ok(MsgType::Ack),
            6 => Ok(MsgType::Nak),
            7 => Ok(MsgType::Release),
            8 => Ok(MsgType::Inform),
            x => Err(x),
        }
    }
}

/// BOOTP op code.
///
/// From [RFC 2131 Section 2](https://tools.ietf.org/html/rfc2131#section-2)
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum Op {
    BootRequest = 1,
    BootReply = 2,
}

impl From<Op> for u8 {
    fn from(val: Op) -> u8 {
        val as u8
    }
}

/// DHCP hardware type.
///
/// See [RFC 1700](https://tools.ietf.org/html/rfc1700)
#[repr(u8)]
#[non_exhaustive]
pub(crate) enum HardwareType {
    Ethernet = 1,
    // lots of others that we do not need to care about
}

impl From<HardwareType> for u8 {
    fn from(val: HardwareType) -> u8 {
        val as u8
    }
}

/// Which end of the exchange the filter is protecting.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum Role {
    Client,
    Server,
}

/// Reasons for dropping an incoming frame, for trace output.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum Reject {
    PortPair = 1,
    Runt = 2,
    Opcode = 3,
    HardwareType = 4,
    HardwareAddrLen = 5,
    Xid = 6,
}

/// Validate an incoming frame before it reaches either state machine.
///
/// `xids` is the outstanding transaction id set; it is only consulted
/// for the client role.
pub(crate) fn check_pkt(
    buf: &[u8],
    dg: &Datagram,
    role: Role,
    xids: &[u32],
) -> Result<(), Reject> {
    let ports_ok: bool = match role {
        Role::Client => dg.dst_port == SRC_PORT && dg.src_port == DST_PORT,
        Role::Server => dg.dst_port == DST_PORT && dg.src_port == SRC_PORT,
    };
    if !ports_ok {
        return Err(Reject::PortPair);
    }
    if dg.len < MIN_PKT_LEN {
        return Err(Reject::Runt);
    }

    let de: PktDe = PktDe::new(buf);
    let want_op: Op = match role {
        Role::Client => Op::BootReply,
        Role::Server => Op::BootRequest,
    };
    if de.op() != Some(want_op.into()) {
        return Err(Reject::Opcode);
    }
    if de.htype() != Some(HardwareType::Ethernet.into()) {
        return Err(Reject::HardwareType);
    }
    if de.hlen() != Some(HW_ADDR_LEN) {
        return Err(Reject::HardwareAddrLen);
    }
    if role == Role::Client {
        match de.xid() {
            Some(xid) if xids.contains(&xid) => (),
            _ => return Err(Reject::Xid),
        }
    }
    Ok(())
}

/// Lazy walk over the TLV records of an options region.
///
/// Skips `PAD`, stops at `END`, the end of the buffer, or the first
/// record whose declared length would overrun the buffer.
#[derive(Debug, Clone)]
pub(crate) struct OptionIter<'a> {
    opts: &'a [u8],
    idx: usize,
}

impl<'a> Iterator for OptionIter<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<(u8, &'a [u8])> {
        loop {
            let tag: u8 = *self.opts.get(self.idx)?;
            match tag {
                0 => self.idx += 1,
                255 => return None,
                tag => {
                    let len: usize = usize::from(*self.opts.get(self.idx + 1)?);
                    let value: &[u8] = self.opts.get(self.idx + 2..self.idx + 2 + len)?;
                    self.idx += 2 + len;
                    return Some((tag, value));
                }
            }
        }
    }
}

/// Incoming packet deserializer.
#[derive(Debug)]
pub(crate) struct PktDe<'a> {
    buf: &'a [u8],
}

impl<'a> PktDe<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn op(&self) -> Option<u8> {
        self.buf.first().copied()
    }

    pub(crate) fn htype(&self) -> Option<u8> {
        self.buf.get(1).copied()
    }

    pub(crate) fn hlen(&self) -> Option<u8> {
        self.buf.get(2).copied()
    }

    pub(crate) fn xid(&self) -> Option<u32> {
        Some(u32::from_be_bytes(self.buf.get(4..8)?.try_into().unwrap()))
    }

    pub(crate) fn secs(&self) -> Option<u16> {
        Some(u16::from_be_bytes(self.buf.get(8..10)?.try_into().unwrap()))
    }

    /// 'your' (client) IP address; filled by the server if the client
    /// doesn't know its own address (ciaddr was 0).
    pub(crate) fn yiaddr(&self) -> Option<Ipv4Addr> {
        let bytes: [u8; 4] = self.buf.get(16..20)?.try_into().unwrap();
        Some(bytes.into())
    }

    /// IP address of the next server to use in bootstrap.
    pub(crate) fn siaddr(&self) -> Option<Ipv4Addr> {
        let bytes: [u8; 4] = self.buf.get(20..24)?.try_into().unwrap();
        Some(bytes.into())
    }

    pub(crate) fn chaddr(&self) -> Option<Eui48Addr> {
        let bytes: [u8; 6] = self.buf.get(28..34)?.try_into().unwrap();
        Some(bytes.into())
    }

    /// The boot file name from the fixed header, up to its NUL.
    pub(crate) fn file(&self) -> &'a [u8] {
        let field: &[u8] = match self.buf.get(108..236) {
            Some(f) => f,
            None => return &[],
        };
        let len: usize = field.iter().position(|b| *b == 0).unwrap_or(field.len());
        &field[..len]
    }

    fn cookie(&self) -> Option<[u8; 4]> {
        Some(self.buf.get(OPT_OFFSET..OPT_OFFSET + 4)?.try_into().unwrap())
    }

    pub(crate) fn has_magic_cookie(&self) -> bool {
        self.cookie() == Some(MAGIC_COOKIE)
    }

    /// Iterator over the options region, `None` without a magic cookie.
    pub(crate) fn options(&self) -> Option<OptionIter<'a>> {
        if !self.has_magic_cookie() {
            return None;
        }
        Some(OptionIter {
            opts: self.buf.get(OPT_OFFSET + 4..)?,
            idx: 0,
        })
    }

    /// The DHCP message type (option 53) if present and well formed.
    pub(crate) fn msg_type(&self) -> Option<MsgType> {
        let (_, value) = self
            .options()?
            .find(|(tag, _)| *tag == u8::from(Options::MessageType))?;
        MsgType::try_from(*value.first()?).ok()
    }

    /// The DHCP server identifier (option 54) if present.
    pub(crate) fn server_id(&self) -> Option<Ipv4Addr> {
        let (_, value) = self
            .options()?
            .find(|(tag, _)| *tag == u8::from(Options::ServerId))?;
        let bytes: [u8; 4] = value.get(..4)?.try_into().unwrap();
        Some(bytes.into())
    }
}

/// Appends DHCP option records to the options region of an outgoing
/// request.
///
/// This is the writer handed to
/// [`VendorExtension::prepare_request`](crate::VendorExtension::prepare_request);
/// writes land directly after the options the engine has already
/// emitted.
#[derive(Debug)]
pub struct OptionWriter<'a> {
    buf: &'a mut [u8],
    ptr: usize,
}

impl<'a> OptionWriter<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, ptr: 0 }
    }

    /// Append one `tag, length, value` record.
    ///
    /// Returns `None` without writing anything when the value is longer
    /// than 255 bytes or the region is out of space.
    pub fn option(&mut self, tag: u8, value: &[u8]) -> Option<()> {
        let len: u8 = value.len().try_into().ok()?;
        let end: usize = self.ptr.checked_add(2 + value.len())?;
        if end > self.buf.len() {
            return None;
        }
        self.buf[self.ptr] = tag;
        self.buf[self.ptr + 1] = len;
        self.buf[self.ptr + 2..end].copy_from_slice(value);
        self.ptr = end;
        Some(())
    }

    /// Append the terminating `END` tag.
    pub fn end(&mut self) -> Option<()> {
        *self.buf.get_mut(self.ptr)? = Options::End.into();
        self.ptr += 1;
        Some(())
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.ptr
    }

    /// Returns `true` if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.ptr == 0
    }
}

/// Outgoing packet serializer.
#[derive(Debug)]
pub(crate) struct PktSer<'a> {
    buf: &'a mut [u8],
    ptr: usize,
}

impl<'a> PktSer<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, ptr: 0 }
    }

    /// Prepares the buffer for a new client request.
    ///
    /// From [RFC 2131 Section 2](https://tools.ietf.org/html/rfc2131#section-2)
    fn prepare_request(
        &mut self,
        mac: &Eui48Addr,
        xid: u32,
        secs: u16,
        bootfile: Option<&str>,
    ) -> Option<()> {
        self.set_op(Op::BootRequest)?;
        self.set_htype_ethernet()?;
        self.set_hlen(HW_ADDR_LEN)?;
        self.set_hops(0)?;
        self.set_xid(xid)?;
        self.set_secs(secs)?;
        self.set_flags_zero()?;
        self.set_ciaddr(&Ipv4Addr::UNSPECIFIED)?;
        self.set_yiaddr(&Ipv4Addr::UNSPECIFIED)?;
        self.set_siaddr(&Ipv4Addr::UNSPECIFIED)?;
        self.set_giaddr(&Ipv4Addr::UNSPECIFIED)?;
        self.set_chaddr(mac)?;
        self.set_sname_zero()?;
        self.set_file(bootfile)?;
        self.set_magic_cookie()?;
        self.ptr = OPT_OFFSET + 4;
        Some(())
    }

    fn set_op(&mut self, op: Op) -> Option<()> {
        *self.buf.first_mut()? = u8::from(op);
        Some(())
    }

    fn set_htype_ethernet(&mut self) -> Option<()> {
        *self.buf.get_mut(1)? = u8::from(HardwareType::Ethernet);
        Some(())
    }

    fn set_hlen(&mut self, len: u8) -> Option<()> {
        *self.buf.get_mut(2)? = len;
        Some(())
    }

    /// Client sets to zero, optionally used by relay agents.
    fn set_hops(&mut self, hops: u8) -> Option<()> {
        *self.buf.get_mut(3)? = hops;
        Some(())
    }

    fn set_xid(&mut self, xid: u32) -> Option<()> {
        self.buf.get_mut(4..8)?.copy_from_slice(&xid.to_be_bytes());
        Some(())
    }

    /// Seconds elapsed since the client began address acquisition.
    fn set_secs(&mut self, secs: u16) -> Option<()> {
        self.buf.get_mut(8..10)?.copy_from_slice(&secs.to_be_bytes());
        Some(())
    }

    fn set_flags_zero(&mut self) -> Option<()> {
        self.buf.get_mut(10..12)?.fill(0);
        Some(())
    }

    fn set_ciaddr(&mut self, addr: &Ipv4Addr) -> Option<()> {
        self.buf.get_mut(12..16)?.copy_from_slice(&addr.octets());
        Some(())
    }

    fn set_yiaddr(&mut self, addr: &Ipv4Addr) -> Option<()> {
        self.buf.get_mut(16..20)?.copy_from_slice(&addr.octets());
        Some(())
    }

    fn set_siaddr(&mut self, addr: &Ipv4Addr) -> Option<()> {
        self.buf.get_mut(20..24)?.copy_from_slice(&addr.octets());
        Some(())
    }

    fn set_giaddr(&mut self, addr: &Ipv4Addr) -> Option<()> {
        self.buf.get_mut(24..28)?.copy_from_slice(&addr.octets());
        Some(())
    }

    fn set_chaddr(&mut self, mac: &Eui48Addr) -> Option<()> {
        self.buf.get_mut(28..34)?.copy_from_slice(&mac.octets);
        self.buf.get_mut(34..44)?.fill(0);
        Some(())
    }

    fn set_sname_zero(&mut self) -> Option<()> {
        self.buf.get_mut(44..108)?.fill(0);
        Some(())
    }

    /// Set the `file` field, zero padded, silently truncated to fit.
    fn set_file(&mut self, bootfile: Option<&str>) -> Option<()> {
        let field: &mut [u8] = self.buf.get_mut(108..236)?;
        field.fill(0);
        if let Some(name) = bootfile {
            let len: usize = name.len().min(field.len() - 1);
            field[..len].copy_from_slice(&name.as_bytes()[..len]);
        }
        Some(())
    }

    /// Set the first four octets of the options field to 99, 130, 83, 99.
    ///
    /// From [RFC 2131 Section 3](https://tools.ietf.org/html/rfc2131#section-3)
    fn set_magic_cookie(&mut self) -> Option<()> {
        self.buf
            .get_mut(OPT_OFFSET..OPT_OFFSET + MAGIC_COOKIE.len())?
            .copy_from_slice(&MAGIC_COOKIE);
        Some(())
    }

    #[inline]
    fn write_byte(&mut self, data: u8) -> Option<()> {
        *self.buf.get_mut(self.ptr)? = data;
        self.ptr += 1;
        Some(())
    }

    fn set_option(&mut self, tag: u8, value: &[u8]) -> Option<()> {
        let len: u8 = value.len().try_into().ok()?;
        self.write_byte(tag)?;
        self.write_byte(len)?;
        for byte in value {
            self.write_byte(*byte)?;
        }
        Some(())
    }

    fn set_option_ip(&mut self, option: Options, addr: &Ipv4Addr) -> Option<()> {
        self.set_option(option.into(), &addr.octets())
    }

    fn set_option_msg_type(&mut self, msg_type: MsgType) -> Option<()> {
        self.set_option(Options::MessageType.into(), &[msg_type.into()])
    }

    fn set_option_max_msg_size(&mut self) -> Option<()> {
        self.set_option(Options::MaxMsgSize.into(), &MAX_DHCP_MSG_SIZE.to_be_bytes())
    }

    fn set_option_hostname(&mut self, hostname: &crate::Hostname) -> Option<()> {
        self.write_byte(Options::Hostname.into())?;
        self.write_byte(hostname.len())?;
        for byte in hostname.as_bytes() {
            self.write_byte(*byte)?;
        }
        Some(())
    }

    fn set_option_pxe(&mut self, pxe: &PxeConfig) -> Option<()> {
        self.set_option(Options::PxeClientArch.into(), &pxe.client_arch.to_be_bytes())?;
        // UNDI, revision 0.0
        self.set_option(Options::PxeNetIfId.into(), &[1, 0, 0])?;
        if let Some(uuid) = pxe.uuid {
            self.write_byte(Options::PxeUuid.into())?;
            self.write_byte(17)?;
            self.write_byte(0)?; // type 0 - UUID
            for byte in uuid {
                self.write_byte(byte)?;
            }
        }
        Some(())
    }

    /// A fixed-size request record with a zeroed value, for the
    /// BOOTP-only path.
    fn set_option_placeholder(&mut self, option: Options, len: u8) -> Option<()> {
        self.write_byte(option.into())?;
        self.write_byte(len)?;
        for _ in 0..len {
            self.write_byte(0)?;
        }
        Some(())
    }

    fn set_option_parameter_request(&mut self, cfg: &ClientConfig) -> Option<()> {
        self.write_byte(Options::ParameterRequest.into())?;
        let cnt_idx: usize = self.ptr;
        self.write_byte(0)?;
        let requests: [(bool, Options); 9] = [
            (cfg.request_subnet_mask, Options::SubnetMask),
            (cfg.request_time_offset, Options::TimeOffset),
            (cfg.request_gateway, Options::Router),
            (cfg.request_dns, Options::Dns),
            (cfg.request_hostname, Options::Hostname),
            (cfg.request_bootfile_size, Options::BootFileSize),
            (cfg.request_root_path, Options::RootPath),
            (cfg.request_nis_domain, Options::NisDomain),
            (cfg.request_ntp, Options::NtpServers),
        ];
        let mut cnt: u8 = 0;
        for (enabled, option) in requests {
            if enabled {
                self.write_byte(option.into())?;
                cnt += 1;
            }
        }
        if cnt == 0 {
            // no requests, back up to avoid sending an empty list
            self.ptr -= 2;
        } else {
            *self.buf.get_mut(cnt_idx)? = cnt;
        }
        Some(())
    }

    /// Pad the options region (magic cookie included) with `PAD` up to
    /// `min_ext_len`, then terminate it with `END`.
    fn set_option_end(&mut self, min_ext_len: usize) -> Option<()> {
        while self.ptr - OPT_OFFSET + 1 < min_ext_len {
            self.write_byte(Options::Pad.into())?;
        }
        self.write_byte(Options::End.into())
    }

    fn vendor_prepare<V: VendorExtension>(&mut self, vendor: &mut V) -> Option<usize> {
        let end: usize = self.buf.len().min(OPT_OFFSET + OPT_FIELD_SIZE);
        let capacity: usize = end.saturating_sub(self.ptr);
        let mut writer: OptionWriter = OptionWriter::new(self.buf.get_mut(self.ptr..end)?);
        let written: usize = vendor.prepare_request(&mut writer)?;
        Some(written.min(capacity))
    }

    /// Create a DHCP DISCOVER or REQUEST.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn dhcp_client<V: VendorExtension>(
        &mut self,
        msg_type: MsgType,
        xid: u32,
        secs: u16,
        mac: &Eui48Addr,
        server_id: Option<Ipv4Addr>,
        requested_ip: Option<Ipv4Addr>,
        cfg: &ClientConfig,
        vendor: &mut V,
    ) -> Option<&[u8]> {
        self.prepare_request(mac, xid, secs, cfg.bootfile)?;
        self.set_option_msg_type(msg_type)?;
        self.set_option_max_msg_size()?;
        if let Some(ip) = server_id {
            self.set_option_ip(Options::ServerId, &ip)?;
        }
        if let Some(ip) = requested_ip {
            self.set_option_ip(Options::RequestedIp, &ip)?;
        }
        if let Some(hostname) = cfg.hostname {
            self.set_option_hostname(&hostname)?;
        }
        if let Some(pxe) = &cfg.pxe {
            self.set_option_pxe(pxe)?;
        }
        if let Some(vci) = cfg.vendor_class {
            self.set_option(Options::VendorClass.into(), vci.as_bytes())?;
        }
        // a finalizing hook owns the rest of the region
        if let Some(written) = self.vendor_prepare(vendor) {
            self.ptr += written;
            return Some(&self.buf[..self.ptr]);
        }
        self.set_option_parameter_request(cfg)?;
        self.set_option_end(usize::from(cfg.min_ext_len))?;
        Some(&self.buf[..self.ptr])
    }

    /// Create a BOOTP-only request with legacy fixed-size extensions.
    pub(crate) fn bootp_request(
        &mut self,
        xid: u32,
        secs: u16,
        mac: &Eui48Addr,
        cfg: &ClientConfig,
    ) -> Option<&[u8]> {
        self.prepare_request(mac, xid, secs, cfg.bootfile)?;
        if let Some(vci) = cfg.vendor_class {
            self.set_option(Options::VendorClass.into(), vci.as_bytes())?;
        }
        if cfg.request_subnet_mask {
            self.set_option_placeholder(Options::SubnetMask, 4)?;
        }
        if cfg.request_time_offset {
            self.set_option_placeholder(Options::TimeOffset, 4)?;
        }
        if cfg.request_gateway {
            self.set_option_placeholder(Options::Router, 4)?;
        }
        if cfg.request_dns {
            self.set_option_placeholder(Options::Dns, 4)?;
        }
        if cfg.request_hostname {
            self.set_option_placeholder(Options::Hostname, 32)?;
        }
        if cfg.request_bootfile_size {
            self.set_option_placeholder(Options::BootFileSize, 2)?;
        }
        if cfg.request_root_path {
            self.set_option_placeholder(Options::RootPath, 32)?;
        }
        if cfg.request_nis_domain {
            self.set_option_placeholder(Options::NisDomain, 32)?;
        }
        if cfg.request_ntp {
            self.set_option_placeholder(Options::NtpServers, 4)?;
        }
        self.set_option_end(usize::from(cfg.min_ext_len))?;
        Some(&self.buf[..self.ptr])
    }

    /// Create a server OFFER or ACK answering `req`.
    pub(crate) fn bootreply(
        &mut self,
        req: &PktDe,
        kind: MsgType,
        dev_ip: &Ipv4Addr,
        peer_ip: &Ipv4Addr,
        netmask: &Ipv4Addr,
    ) -> Option<&[u8]> {
        self.set_op(Op::BootReply)?;
        self.set_htype_ethernet()?;
        self.set_hlen(HW_ADDR_LEN)?;
        self.set_hops(0)?;
        self.set_xid(req.xid()?)?;
        self.set_secs(req.secs()?)?;
        self.set_flags_zero()?;
        self.set_ciaddr(&Ipv4Addr::UNSPECIFIED)?;
        self.set_yiaddr(peer_ip)?;
        self.set_siaddr(dev_ip)?;
        self.set_giaddr(&Ipv4Addr::UNSPECIFIED)?;
        self.set_chaddr(&req.chaddr()?)?;
        self.set_sname_zero()?;
        self.set_file(None)?;
        // echo the request's cookie bytes
        self.buf
            .get_mut(OPT_OFFSET..OPT_OFFSET + 4)?
            .copy_from_slice(&req.cookie().unwrap_or(MAGIC_COOKIE));
        self.ptr = OPT_OFFSET + 4;
        self.set_option_msg_type(kind)?;
        self.set_option_ip(Options::ServerId, dev_ip)?;
        self.set_option(Options::LeaseTime.into(), &SERVER_LEASE_SECS.to_be_bytes())?;
        self.set_option_ip(Options::SubnetMask, netmask)?;
        self.write_byte(Options::End.into())?;
        Some(&self.buf[..self.ptr])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientConfig, NoVendorExtension};

    const MAC: Eui48Addr = Eui48Addr::new(0x02, 0x00, 0x11, 0x22, 0x33, 0x44);

    fn build_discover(cfg: &ClientConfig) -> Vec<u8> {
        let mut buf = [0u8; FIXED_HDR_LEN + OPT_FIELD_SIZE];
        let mut ser = PktSer::new(&mut buf);
        ser.dhcp_client(
            MsgType::Discover,
            0x1234_5678,
            1,
            &MAC,
            None,
            None,
            cfg,
            &mut NoVendorExtension,
        )
        .unwrap()
        .to_vec()
    }

    #[test]
    fn dhcp_discover_smoke() {
        let frame = build_discover(&ClientConfig::new());
        assert_eq!(frame[0], 1); // BOOTREQUEST
        assert_eq!(frame[1], 1); // Ethernet
        assert_eq!(frame[2], 6);
        assert_eq!(&frame[4..8], &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(&frame[28..34], &MAC.octets);
        assert_eq!(&frame[236..240], &MAGIC_COOKIE);
    }

    #[test]
    fn options_round_trip() {
        let cfg = ClientConfig {
            hostname: Some(crate::Hostname::new_unwrapped("testhost")),
            ..ClientConfig::new()
        };
        let frame = build_discover(&cfg);
        let de = PktDe::new(&frame);
        let opts: Vec<(u8, Vec<u8>)> = de
            .options()
            .unwrap()
            .map(|(tag, value)| (tag, value.to_vec()))
            .collect();

        assert_eq!(opts[0], (53, vec![1]));
        assert_eq!(opts[1], (57, vec![0x02, 0x40])); // 576
        assert_eq!(opts[2], (12, b"testhost".to_vec()));
        // parameter request list with the default request set
        assert_eq!(opts[3], (55, vec![1, 3, 6, 12, 13, 17]));
        assert_eq!(opts.len(), 4);
    }

    #[test]
    fn discover_padded_to_min_ext_len() {
        let frame = build_discover(&ClientConfig::new());
        // options region counts from the magic cookie through END
        assert!(frame.len() - FIXED_HDR_LEN >= 64);
        assert_eq!(*frame.last().unwrap(), 255);
    }

    #[test]
    fn empty_parameter_request_list_rewound() {
        let cfg = ClientConfig {
            request_subnet_mask: false,
            request_gateway: false,
            request_dns: false,
            request_hostname: false,
            request_bootfile_size: false,
            request_root_path: false,
            ..ClientConfig::new()
        };
        let frame = build_discover(&cfg);
        let de = PktDe::new(&frame);
        assert!(!de.options().unwrap().any(|(tag, _)| tag == 55));
    }

    #[test]
    fn request_option_order() {
        let mut buf = [0u8; FIXED_HDR_LEN + OPT_FIELD_SIZE];
        let mut ser = PktSer::new(&mut buf);
        let frame = ser
            .dhcp_client(
                MsgType::Request,
                0xAABB_CCDD,
                2,
                &MAC,
                Some(Ipv4Addr::new(192, 0, 2, 1)),
                Some(Ipv4Addr::new(192, 0, 2, 50)),
                &ClientConfig::new(),
                &mut NoVendorExtension,
            )
            .unwrap();
        let de = PktDe::new(frame);
        let tags: Vec<u8> = de.options().unwrap().map(|(tag, _)| tag).collect();
        assert_eq!(tags, vec![53, 57, 54, 50, 55]);
        assert_eq!(de.server_id(), Some(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(de.msg_type(), Some(MsgType::Request));
    }

    #[test]
    fn pxe_options_present() {
        let cfg = ClientConfig {
            pxe: Some(crate::PxeConfig {
                client_arch: 0x0016,
                uuid: Some([0xAB; 16]),
            }),
            ..ClientConfig::new()
        };
        let frame = build_discover(&cfg);
        let de = PktDe::new(&frame);
        let opts: Vec<(u8, Vec<u8>)> = de
            .options()
            .unwrap()
            .map(|(tag, value)| (tag, value.to_vec()))
            .collect();
        assert!(opts.contains(&(93, vec![0x00, 0x16])));
        assert!(opts.contains(&(94, vec![1, 0, 0])));
        let uuid: &Vec<u8> = &opts.iter().find(|(tag, _)| *tag == 97).unwrap().1;
        assert_eq!(uuid.len(), 17);
        assert_eq!(uuid[0], 0);
        assert_eq!(&uuid[1..], &[0xAB; 16]);
    }

    #[test]
    fn vendor_hook_finalizes_region() {
        struct Hook;
        impl VendorExtension for Hook {
            fn prepare_request(&mut self, w: &mut OptionWriter) -> Option<usize> {
                w.option(128, &[0xEE]).unwrap();
                w.end().unwrap();
                Some(w.len())
            }
        }
        let mut buf = [0u8; FIXED_HDR_LEN + OPT_FIELD_SIZE];
        let mut ser = PktSer::new(&mut buf);
        let frame = ser
            .dhcp_client(
                MsgType::Discover,
                1,
                0,
                &MAC,
                None,
                None,
                &ClientConfig::new(),
                &mut Hook,
            )
            .unwrap();
        // the hook skipped the parameter request list and the padding
        let de = PktDe::new(frame);
        let opts: Vec<(u8, Vec<u8>)> = de
            .options()
            .unwrap()
            .map(|(tag, value)| (tag, value.to_vec()))
            .collect();
        assert_eq!(opts.last().unwrap(), &(128, vec![0xEE]));
        assert!(!opts.iter().any(|(tag, _)| *tag == 55));
        assert!(frame.len() - FIXED_HDR_LEN < 64);
    }

    #[test]
    fn option_iter_stops_at_overrun() {
        let mut frame = build_discover(&ClientConfig::new());
        // a record declaring more bytes than remain in the buffer
        frame.truncate(240);
        frame.extend_from_slice(&[1, 4, 255, 255, 255, 0]);
        frame.extend_from_slice(&[12, 200, b'x', b'y']);
        let de = PktDe::new(&frame);
        let opts: Vec<(u8, Vec<u8>)> = de
            .options()
            .unwrap()
            .map(|(tag, value)| (tag, value.to_vec()))
            .collect();
        assert_eq!(opts, vec![(1, vec![255, 255, 255, 0])]);
    }

    #[test]
    fn decode_never_reads_past_truncated_frames() {
        let frame = build_discover(&ClientConfig::new());
        for len in 0..frame.len() {
            let de = PktDe::new(&frame[..len]);
            let _ = de.op();
            let _ = de.xid();
            let _ = de.yiaddr();
            let _ = de.siaddr();
            let _ = de.chaddr();
            let _ = de.file();
            let _ = de.msg_type();
            let _ = de.server_id();
            if let Some(opts) = de.options() {
                opts.count();
            }
        }
    }

    #[test]
    fn filter_rejects() {
        let mut reply = {
            let mut buf = [0u8; FIXED_HDR_LEN + OPT_FIELD_SIZE];
            let mut ser = PktSer::new(&mut buf);
            ser.dhcp_client(
                MsgType::Offer,
                0xDEAD_BEEF,
                0,
                &MAC,
                None,
                None,
                &ClientConfig::new(),
                &mut NoVendorExtension,
            )
            .unwrap()
            .to_vec()
        };
        // the builder writes BOOTREQUEST; patch to BOOTREPLY for client checks
        reply[0] = 2;

        let dg = |dst, src, len| Datagram {
            dst_port: dst,
            src_port: src,
            src_mac: Eui48Addr::UNSPECIFIED,
            len,
        };
        let xids = [0xDEAD_BEEF];

        assert_eq!(
            check_pkt(&reply, &dg(68, 67, reply.len()), Role::Client, &xids),
            Ok(())
        );
        assert_eq!(
            check_pkt(&reply, &dg(67, 68, reply.len()), Role::Client, &xids),
            Err(Reject::PortPair)
        );
        assert_eq!(
            check_pkt(&reply, &dg(68, 67, 10), Role::Client, &xids),
            Err(Reject::Runt)
        );
        assert_eq!(
            check_pkt(&reply, &dg(68, 67, reply.len()), Role::Client, &[1]),
            Err(Reject::Xid)
        );

        let mut wrong_op = reply.clone();
        wrong_op[0] = 1;
        assert_eq!(
            check_pkt(&wrong_op, &dg(68, 67, wrong_op.len()), Role::Client, &xids),
            Err(Reject::Opcode)
        );
        // a BOOTREQUEST is what the server wants
        assert_eq!(
            check_pkt(&wrong_op, &dg(67, 68, wrong_op.len()), Role::Server, &[]),
            Ok(())
        );

        let mut wrong_htype = reply.clone();
        wrong_htype[1] = 6;
        assert_eq!(
            check_pkt(
                &wrong_htype,
                &dg(68, 67, wrong_htype.len()),
                Role::Client,
                &xids
            ),
            Err(Reject::HardwareType)
        );

        let mut wrong_hlen = reply;
        wrong_hlen[2] = 16;
        assert_eq!(
            check_pkt(
                &wrong_hlen,
                &dg(68, 67, wrong_hlen.len()),
                Role::Client,
                &xids
            ),
            Err(Reject::HardwareAddrLen)
        );
    }

    #[test]
    fn bootp_request_placeholders() {
        let mut buf = [0u8; FIXED_HDR_LEN + OPT_FIELD_SIZE];
        let mut ser = PktSer::new(&mut buf);
        let frame = ser
            .bootp_request(0x0102_0304, 0, &MAC, &ClientConfig::new())
            .unwrap();
        let de = PktDe::new(frame);
        let tags: Vec<u8> = de.options().unwrap().map(|(tag, _)| tag).collect();
        // no DHCP message type, request records only
        assert_eq!(tags, vec![1, 3, 6, 12, 13, 17]);
    }
}
