//! Network fingerprint of a worker host.
//!
//! A worker is recognised across registration and heartbeats by the pair of
//! its first usable IPv4 address and the hardware address of the interface
//! carrying it. Interface enumeration sits behind [`InterfaceSource`] so the
//! selection rule can be exercised without touching the host.

use core::{fmt, str::FromStr};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

use crate::{Error, Result};

/// A 48-bit hardware (MAC) address.
///
/// Rendered as upper-case hex octets separated by `-`, e.g.
/// `00-1A-2B-3C-4D-5E`, which is also the wire format. Parsing accepts `-` or
/// `:` separators in either case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HardwareAddr(pub [u8; 6]);

impl HardwareAddr {
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Display for HardwareAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}-{b:02X}-{c:02X}-{d:02X}-{e:02X}-{g:02X}")
    }
}

impl FromStr for HardwareAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(['-', ':']);
        for octet in &mut octets {
            let part = parts
                .next()
                .ok_or_else(|| format!("hardware address `{s}` has fewer than 6 octets"))?;
            if part.len() != 2 {
                return Err(format!("malformed octet `{part}` in hardware address `{s}`"));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| format!("malformed octet `{part}` in hardware address `{s}`"))?;
        }
        if parts.next().is_some() {
            return Err(format!("hardware address `{s}` has more than 6 octets"));
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for HardwareAddr {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HardwareAddr> for String {
    fn from(value: HardwareAddr) -> Self {
        value.to_string()
    }
}

/// The `(address, hardware address)` pair identifying a worker host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub ip: Ipv4Addr,
    pub mac: HardwareAddr,
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.mac)
    }
}

/// What a worker knows about itself once the coordinator accepted it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationIdentity {
    pub fingerprint: Fingerprint,
    pub exposed_address: String,
    pub identity: u16,
}

/// A snapshot of one network interface.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub up: bool,
    pub loopback: bool,
    /// Alias sub-interfaces such as `eth0:1`.
    pub is_virtual: bool,
    pub mac: Option<HardwareAddr>,
    pub ips: Vec<IpAddr>,
}

/// Enumerates network interfaces in system order.
pub trait InterfaceSource {
    fn interfaces(&self) -> Vec<InterfaceInfo>;
}

impl<F> InterfaceSource for F
where
    F: Fn() -> Vec<InterfaceInfo>,
{
    fn interfaces(&self) -> Vec<InterfaceInfo> {
        self()
    }
}

/// Interfaces as reported by the operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> Vec<InterfaceInfo> {
        pnet_datalink::interfaces()
            .into_iter()
            .map(|iface| InterfaceInfo {
                up: iface.is_up(),
                loopback: iface.is_loopback(),
                is_virtual: iface.name.contains(':'),
                mac: iface.mac.map(|mac| HardwareAddr(mac.octets())),
                ips: iface.ips.iter().map(|net| net.ip()).collect(),
                name: iface.name,
            })
            .collect()
    }
}

/// Picks this host's fingerprint.
///
/// The first interface that is up, neither loopback nor virtual, and has a
/// non-zero hardware address contributes its first IPv4 address that is
/// neither loopback nor multicast. Link-local addresses are accepted.
///
/// # Errors
///
/// Returns [`Error::NoUsableInterface`] when no interface qualifies.
pub fn resolve_fingerprint(source: &impl InterfaceSource) -> Result<Fingerprint> {
    source
        .interfaces()
        .into_iter()
        .filter(|iface| iface.up && !iface.loopback && !iface.is_virtual)
        .find_map(|iface| {
            let mac = iface.mac.filter(|mac| !mac.is_zero())?;
            let ip = iface.ips.iter().find_map(|ip| match ip {
                IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_multicast() => Some(*v4),
                _ => None,
            })?;
            Some(Fingerprint { ip, mac })
        })
        .ok_or(Error::NoUsableInterface)
}
