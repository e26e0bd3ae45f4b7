//! Network parameter sink.

use crate::net::{Eui48Addr, Ipv4Addr};
use crate::pkt::{OptionIter, PktDe};
use crate::VendorExtension;
use heapless::String;

/// Parameters learned from BOOTP/DHCP replies.
///
/// One instance is passed by reference into
/// [`Client::process`](crate::Client::process); it outlives the client
/// so the caller can apply the configuration and hand `boot_file` to
/// the loader after the session ends.
///
/// Every slot follows a first-writer-wins rule: a value learned from an
/// earlier reply in the session is not clobbered by a later one.
#[derive(Debug, Clone)]
pub struct NetParams {
    /// Our IPv4 address, from `yiaddr`.
    pub ip: Option<Ipv4Addr>,
    /// Boot server address, from `siaddr`.
    pub server_ip: Option<Ipv4Addr>,
    /// Boot server Ethernet address, captured from the accepted reply.
    pub server_mac: Option<Eui48Addr>,
    /// Subnet mask, option 1.
    pub subnet_mask: Option<Ipv4Addr>,
    /// Default gateway, first entry of option 3.
    pub gateway: Option<Ipv4Addr>,
    /// Most-preferred DNS server, option 6.
    pub dns: Option<Ipv4Addr>,
    /// Second DNS server when option 6 carries more than one address.
    pub dns2: Option<Ipv4Addr>,
    /// NTP server, option 42.
    pub ntp_server: Option<Ipv4Addr>,
    /// DHCP server identifier, option 54.
    pub dhcp_server_ip: Option<Ipv4Addr>,
    /// Our host name, option 12.
    pub host_name: String<32>,
    /// NFS root path, option 17.
    pub root_path: String<64>,
    /// NIS domain name, option 40.
    pub nis_domain: String<32>,
    /// Boot file name, from the `file` field or option 67.
    pub boot_file: String<128>,
    /// Boot file size in 512-byte blocks, option 13.
    pub boot_file_size: Option<u32>,
    /// Lease duration in seconds, option 51.
    pub lease_time: Option<u32>,
    /// Offset of the local time zone in seconds, option 2.
    pub time_offset: Option<i32>,
}

impl NetParams {
    /// Create an empty parameter sink.
    pub const fn new() -> Self {
        Self {
            ip: None,
            server_ip: None,
            server_mac: None,
            subnet_mask: None,
            gateway: None,
            dns: None,
            dns2: None,
            ntp_server: None,
            dhcp_server_ip: None,
            host_name: String::new(),
            root_path: String::new(),
            nis_domain: String::new(),
            boot_file: String::new(),
            boot_file_size: None,
            lease_time: None,
            time_offset: None,
        }
    }

    /// Apply every recognized option to the sink.
    ///
    /// `file_was_empty` reports whether the reply's fixed-header `file`
    /// field was empty; option 67 is only honoured in that case.
    pub(crate) fn apply_options<V: VendorExtension>(
        &mut self,
        opts: OptionIter<'_>,
        file_was_empty: bool,
        vendor: &mut V,
    ) {
        for (tag, value) in opts {
            self.apply_option(tag, value, file_was_empty, vendor);
        }
    }

    fn apply_option<V: VendorExtension>(
        &mut self,
        tag: u8,
        value: &[u8],
        file_was_empty: bool,
        vendor: &mut V,
    ) {
        match tag {
            1 => set_ip(&mut self.subnet_mask, value),
            2 => {
                if self.time_offset.is_none() {
                    if let Ok(bytes) = <[u8; 4]>::try_from(value) {
                        self.time_offset = Some(i32::from_be_bytes(bytes));
                    }
                }
            }
            3 => set_ip(&mut self.gateway, value),
            6 => {
                set_ip(&mut self.dns, value);
                if value.len() > 4 {
                    set_ip(&mut self.dns2, value.get(4..8).unwrap_or(&[]));
                }
            }
            12 => copy_bounded(&mut self.host_name, "Host Name", value),
            13 => {
                if self.boot_file_size.is_none() {
                    match value {
                        [hi, lo] => {
                            self.boot_file_size = Some(u32::from(u16::from_be_bytes([*hi, *lo])))
                        }
                        [a, b, c, d] => {
                            self.boot_file_size = Some(u32::from_be_bytes([*a, *b, *c, *d]))
                        }
                        _ => debug!("malformed boot file size, len {}", value.len()),
                    }
                }
            }
            17 => copy_bounded(&mut self.root_path, "Root Path", value),
            40 => copy_bounded(&mut self.nis_domain, "NIS Domain Name", value),
            42 => set_ip(&mut self.ntp_server, value),
            51 => {
                if self.lease_time.is_none() {
                    if let Ok(bytes) = <[u8; 4]>::try_from(value) {
                        self.lease_time = Some(u32::from_be_bytes(bytes));
                    }
                }
            }
            54 => set_ip(&mut self.dhcp_server_ip, value),
            // domain name, broadcast address, renewal time, rebinding
            // time, TFTP server name, and the message type read by the
            // state machine
            15 | 28 | 53 | 58 | 59 | 66 => (),
            67 => {
                if file_was_empty && self.boot_file.is_empty() && !value.is_empty() {
                    warn!("using vendor optional boot file");
                    copy_bounded(&mut self.boot_file, "Opt Boot File", value);
                }
            }
            tag => {
                if !vendor.parse_option(tag, value) {
                    warn!("unhandled DHCP option in OFFER/ACK: {}", tag);
                }
            }
        }
    }

    /// Copy parameters of interest from the fixed header of an accepted
    /// reply.
    ///
    /// With `pinned_server_ip` the caller configured the boot server
    /// address out-of-band and `siaddr`/the server MAC are left alone.
    pub(crate) fn copy_net_params(
        &mut self,
        de: &PktDe,
        src_mac: Eui48Addr,
        pinned_server_ip: bool,
    ) {
        if !pinned_server_ip {
            if let Some(siaddr) = de.siaddr() {
                if !siaddr.is_unspecified() {
                    self.server_ip = Some(siaddr);
                }
            }
            self.server_mac = Some(src_mac);
        }
        if let Some(yiaddr) = de.yiaddr() {
            if !yiaddr.is_unspecified() {
                self.ip = Some(yiaddr);
            }
        }
        let file: &[u8] = de.file();
        if !file.is_empty() {
            // a reply naming a boot file overrides whatever we had
            self.boot_file.clear();
            let len: usize = file.len().min(self.boot_file.capacity() - 1);
            let _ = self.boot_file.push_str(str_prefix(&file[..len]));
        }
    }
}

impl Default for NetParams {
    fn default() -> Self {
        Self::new()
    }
}

/// First four bytes of `value` as an address, first writer wins.
fn set_ip(slot: &mut Option<Ipv4Addr>, value: &[u8]) {
    if slot.is_some() {
        return;
    }
    if let Some(bytes) = value.get(..4) {
        let octets: [u8; 4] = bytes.try_into().unwrap();
        *slot = Some(octets.into());
    }
}

/// Longest UTF-8 prefix of `bytes`.
fn str_prefix(bytes: &[u8]) -> &str {
    match core::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
    }
}

/// Copy `value` into an empty `dst`, clipped to the destination
/// capacity minus one with a warning naming the field.
fn copy_bounded<const N: usize>(dst: &mut String<N>, name: &str, value: &[u8]) {
    if !dst.is_empty() {
        return;
    }
    let value: &[u8] = if value.len() >= N {
        warn!("{} is too long ({} - max: {}) - truncated", name, value.len(), N);
        &value[..N - 1]
    } else {
        value
    };
    let _ = dst.push_str(str_prefix(value));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoVendorExtension;

    fn apply(params: &mut NetParams, opts: &[u8], file_was_empty: bool) {
        // frame with a magic cookie followed by the options under test
        let mut frame = vec![0u8; 236];
        frame[0] = 2;
        frame.extend_from_slice(&[99, 130, 83, 99]);
        frame.extend_from_slice(opts);
        let de = PktDe::new(&frame);
        params.apply_options(
            de.options().unwrap(),
            file_was_empty,
            &mut NoVendorExtension,
        );
    }

    #[test]
    fn first_writer_wins() {
        let mut params = NetParams::new();
        apply(
            &mut params,
            &[1, 4, 255, 255, 255, 0, 3, 4, 192, 0, 2, 1, 255],
            true,
        );
        apply(
            &mut params,
            &[1, 4, 255, 0, 0, 0, 3, 4, 10, 0, 0, 1, 255],
            true,
        );
        assert_eq!(params.subnet_mask, Some(Ipv4Addr::new(255, 255, 255, 0)));
        assert_eq!(params.gateway, Some(Ipv4Addr::new(192, 0, 2, 1)));
    }

    #[test]
    fn dns_second_entry() {
        let mut params = NetParams::new();
        apply(&mut params, &[6, 8, 192, 0, 2, 10, 192, 0, 2, 11, 255], true);
        assert_eq!(params.dns, Some(Ipv4Addr::new(192, 0, 2, 10)));
        assert_eq!(params.dns2, Some(Ipv4Addr::new(192, 0, 2, 11)));
    }

    #[test]
    fn boot_file_size_encodings() {
        let mut params = NetParams::new();
        apply(&mut params, &[13, 2, 0x01, 0x02, 255], true);
        assert_eq!(params.boot_file_size, Some(0x0102));

        let mut params = NetParams::new();
        apply(&mut params, &[13, 4, 0x00, 0x01, 0x02, 0x03, 255], true);
        assert_eq!(params.boot_file_size, Some(0x0001_0203));
    }

    #[test]
    fn host_name_truncated() {
        let mut params = NetParams::new();
        let mut opts = vec![12, 40];
        opts.extend_from_slice(&[b'a'; 40]);
        opts.push(255);
        apply(&mut params, &opts, true);
        assert_eq!(params.host_name.len(), 31);
    }

    #[test]
    fn malformed_option_stops_but_earlier_stand() {
        // option 12 declares 200 bytes with far fewer remaining
        let mut params = NetParams::new();
        let mut opts = vec![1, 4, 255, 255, 255, 0, 3, 4, 192, 0, 2, 1];
        opts.extend_from_slice(&[12, 200, b'x', b'y']);
        apply(&mut params, &opts, true);
        assert_eq!(params.subnet_mask, Some(Ipv4Addr::new(255, 255, 255, 0)));
        assert_eq!(params.gateway, Some(Ipv4Addr::new(192, 0, 2, 1)));
        assert!(params.host_name.is_empty());
    }

    #[test]
    fn vendor_boot_file_fallback() {
        let mut params = NetParams::new();
        let mut opts = vec![67, 11];
        opts.extend_from_slice(b"netboot.img");
        opts.push(255);
        apply(&mut params, &opts, true);
        assert_eq!(params.boot_file.as_str(), "netboot.img");
    }

    #[test]
    fn vendor_boot_file_ignored_when_file_present() {
        let mut params = NetParams::new();
        let mut opts = vec![67, 11];
        opts.extend_from_slice(b"netboot.img");
        opts.push(255);
        apply(&mut params, &opts, false);
        assert!(params.boot_file.is_empty());
    }

    #[test]
    fn time_offset_signed() {
        let mut params = NetParams::new();
        apply(&mut params, &[2, 4, 0xFF, 0xFF, 0xF1, 0xF0, 255], true);
        assert_eq!(params.time_offset, Some(-3600));
    }

    #[test]
    fn unknown_option_offered_to_vendor_hook() {
        struct Hook {
            seen: Option<(u8, Vec<u8>)>,
        }
        impl VendorExtension for Hook {
            fn parse_option(&mut self, tag: u8, value: &[u8]) -> bool {
                self.seen = Some((tag, value.to_vec()));
                true
            }
        }
        let mut hook = Hook { seen: None };
        let mut params = NetParams::new();
        let mut frame = vec![0u8; 236];
        frame[0] = 2;
        frame.extend_from_slice(&[99, 130, 83, 99, 128, 2, 0xAA, 0xBB, 255]);
        let de = PktDe::new(&frame);
        params.apply_options(de.options().unwrap(), true, &mut hook);
        assert_eq!(hook.seen, Some((128, vec![0xAA, 0xBB])));
    }
}
