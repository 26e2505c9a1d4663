//! Stable device identity for advertisement.
//!
//! Senders key their pairing state on the receiver's 6-octet hardware
//! address, so the identity must be stable across sessions where possible:
//! the first "up", non-loopback network interface that exposes a hardware
//! address wins. When none is available (or randomization is requested) a
//! synthetic address is generated with the locally-administered bit set and
//! the multicast bit clear, so it can never collide with a real burned-in
//! address.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid hardware address '{0}'")]
    Invalid(String),
}

/// A 6-octet device identifier in the hardware-address format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId([u8; 6]);

impl DeviceId {
    pub fn from_octets(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Resolve the device identity: a real interface address when one
    /// exists, otherwise a random locally-administered one.
    pub fn detect() -> Self {
        match Self::from_interfaces() {
            Some(id) => {
                tracing::info!(identity = %id, "using system hardware address");
                id
            }
            None => {
                let id = Self::random();
                tracing::info!(identity = %id, "using randomly generated hardware address");
                id
            }
        }
    }

    /// Hardware address of the first up, non-loopback interface.
    #[cfg(unix)]
    pub fn from_interfaces() -> Option<Self> {
        use nix::net::if_::InterfaceFlags;

        let addrs = nix::ifaddrs::getifaddrs().ok()?;
        for ifaddr in addrs {
            if !ifaddr.flags.contains(InterfaceFlags::IFF_UP)
                || ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK)
            {
                continue;
            }
            let Some(storage) = ifaddr.address else {
                continue;
            };
            let Some(link) = storage.as_link_addr() else {
                continue;
            };
            if let Some(octets) = link.addr() {
                if octets.iter().any(|o| *o != 0) {
                    return Some(Self(octets));
                }
            }
        }
        None
    }

    #[cfg(not(unix))]
    pub fn from_interfaces() -> Option<Self> {
        None
    }

    /// Synthesize a locally-administered unicast address.
    ///
    /// Bit 1 of the first octet (locally administered) is forced set and
    /// bit 0 (multicast) forced clear.
    pub fn random() -> Self {
        let mut octets: [u8; 6] = rand::random();
        octets[0] = (octets[0] & 0xfc) | 0x02;
        Self(octets)
    }

    pub fn as_octets(&self) -> &[u8; 6] {
        &self.0
    }

    /// True when the address carries the locally-administered bit.
    pub fn is_locally_administered(&self) -> bool {
        self.0[0] & 0x02 != 0
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Hex form without separators, as used in service names.
    pub fn as_plain_hex(&self) -> String {
        self.0.iter().map(|o| format!("{o:02X}")).collect()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for DeviceId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(IdentityError::Invalid(s.to_string()));
        }
        let mut octets = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            octets[i] =
                u8::from_str_radix(part, 16).map_err(|_| IdentityError::Invalid(s.to_string()))?;
        }
        Ok(Self(octets))
    }
}
