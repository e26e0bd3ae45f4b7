#![no_main]
use libfuzzer_sys::fuzz_target;
use netboot_dhcp::net::{Eui48Addr, Ipv4Addr};
use netboot_dhcp::{Datagram, Server, ServerConfig, ServerEvent, UdpLink};
use std::convert::Infallible;

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
            dst_port: 67,
            src_port: 68,
            src_mac: Eui48Addr::UNSPECIFIED,
            len: self.data.len(),
        }))
    }
}

fuzz_target!(|fuzz: &[u8]| {
    let cfg = ServerConfig::new(
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 2),
        Ipv4Addr::new(255, 255, 255, 0),
    );
    let mut server: Server = Server::new(cfg);
    let mut link = FuzzLink {
        data: fuzz,
        delivered: false,
    };

    let mut mono: u32 = 0;
    for _ in 0..4 {
        match server.process(&mut link, mono) {
            Ok(ServerEvent::CallAfter(ms)) => mono = mono.wrapping_add(ms),
            _ => break,
        }
        link.delivered = false;
    }
});
