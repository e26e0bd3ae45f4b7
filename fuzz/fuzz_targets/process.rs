#![no_main]
use libfuzzer_sys::fuzz_target;
use netboot_dhcp::net::Eui48Addr;
use netboot_dhcp::{Client, ClientConfig, Datagram, Event, NetParams, UdpLink};
use std::convert::Infallible;

const MAC: Eui48Addr = Eui48Addr::new(0x02, 0x00, 0x11, 0x22, 0x33, 0x44);

/// Delivers the fuzz input as one inbound datagram per poll.
struct FuzzLink<'a> {
    data: &'a [u8],
    delivered: bool,
}

impl UdpLink for FuzzLink<'_> {
    type Error = Infallible;

    fn send(&mut self, _: u16, _: u16, _: &[u8]) -> Result<(), Infallible> {
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<Datagram>, Infallible> {
        if self.delivered {
            return Ok(None);
        }
        self.delivered = true;
        let n: usize = self.data.len().min(buf.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        Ok(Some(Datagram {
            dst_port: 68,
            src_port: 67,
            src_mac: Eui48Addr::UNSPECIFIED,
            len: self.data.len(),
        }))
    }
}

fuzz_target!(|fuzz: &[u8]| {
    let mut client: Client = Client::new(MAC, ClientConfig::new());
    let mut params: NetParams = NetParams::new();
    let mut link = FuzzLink {
        data: fuzz,
        delivered: false,
    };

    let mut mono: u32 = 0;
    for _ in 0..8 {
        match client.process(&mut link, &mut params, mono) {
            Ok(Event::CallAfter(ms)) => mono = mono.wrapping_add(ms),
            _ => break,
        }
        link.delivered = false;
    }
});
