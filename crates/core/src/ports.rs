//! Network port-set parsing and validation.
//!
//! Port triples are configured as comma-separated text. Each entry is either
//! `0` (auto-assign at bind time) or an explicit port in `[1024, 65535]`.
//! Supplying fewer values than positions assigns the remaining positions
//! consecutively after the last given value; client devices expect the
//! control and data ports to stay adjacent.
//!
//! The whole set is validated before any port is bound: out-of-range values,
//! duplicate explicit values, and consecutive-fill overflow past 65535 all
//! reject the set.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest port accepted for explicit assignment.
pub const PORT_MIN: u16 = 1024;
/// Highest valid port.
pub const PORT_MAX: u16 = 65535;

/// Number of TCP and of UDP ports the protocol engine binds.
pub const PORTS_PER_PROTOCOL: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("empty port list")]
    Empty,

    #[error("invalid port entry '{0}'")]
    InvalidEntry(String),

    #[error("port {0} outside allowed range [{PORT_MIN},{PORT_MAX}]")]
    OutOfRange(u32),

    #[error("duplicate port {0}")]
    Duplicate(u16),

    #[error("too many values: expected at most {expected}")]
    TooMany { expected: usize },

    #[error("consecutive assignment from {start} overflows past {PORT_MAX}")]
    Overflow { start: u16 },
}

/// Parse a comma-separated port list into exactly `count` entries.
///
/// `"5000,5001,5002"` with `count == 3` yields `[5000, 5001, 5002]`;
/// `"5000"` yields the same by consecutive fill. A trailing `0` leaves the
/// remaining entries auto-assigned rather than filling from `1`.
pub fn parse_port_set(text: &str, count: usize) -> Result<Vec<u16>, PortError> {
    if text.trim().is_empty() {
        return Err(PortError::Empty);
    }

    let mut ports: Vec<u16> = Vec::with_capacity(count);
    for entry in text.split(',') {
        if ports.len() == count {
            return Err(PortError::TooMany { expected: count });
        }
        let entry = entry.trim();
        if entry.is_empty() || entry.len() > 5 || entry.starts_with('-') {
            return Err(PortError::InvalidEntry(entry.to_string()));
        }
        let value: u32 = entry
            .parse()
            .map_err(|_| PortError::InvalidEntry(entry.to_string()))?;
        if value != 0 && (value < PORT_MIN as u32 || value > PORT_MAX as u32) {
            return Err(PortError::OutOfRange(value));
        }
        let port = value as u16;
        if port != 0 && ports.contains(&port) {
            return Err(PortError::Duplicate(port));
        }
        ports.push(port);
    }

    // Fill the unset tail consecutively after the last supplied value.
    let missing = count - ports.len();
    if missing > 0 {
        let last = *ports.last().unwrap_or(&0);
        if last == 0 {
            ports.resize(count, 0);
        } else {
            if (last as u32) + (missing as u32) > PORT_MAX as u32 {
                return Err(PortError::Overflow { start: last });
            }
            for i in 1..=missing {
                ports.push(last + i as u16);
            }
        }
    }

    Ok(ports)
}

/// The TCP and UDP port triples the protocol engine binds.
///
/// A `0` entry is assigned by the engine at bind time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSet {
    pub tcp: [u16; PORTS_PER_PROTOCOL],
    pub udp: [u16; PORTS_PER_PROTOCOL],
}

impl Default for PortSet {
    fn default() -> Self {
        Self::auto()
    }
}

impl PortSet {
    /// All ports auto-assigned.
    pub fn auto() -> Self {
        Self {
            tcp: [0; PORTS_PER_PROTOCOL],
            udp: [0; PORTS_PER_PROTOCOL],
        }
    }

    /// Parse both triples from their text forms. An empty string means
    /// fully auto-assigned.
    pub fn parse(tcp: &str, udp: &str) -> Result<Self, PortError> {
        let parse_triple = |text: &str| -> Result<[u16; PORTS_PER_PROTOCOL], PortError> {
            if text.trim().is_empty() {
                return Ok([0; PORTS_PER_PROTOCOL]);
            }
            let v = parse_port_set(text, PORTS_PER_PROTOCOL)?;
            Ok([v[0], v[1], v[2]])
        };
        Ok(Self {
            tcp: parse_triple(tcp)?,
            udp: parse_triple(udp)?,
        })
    }

    /// True when any entry was configured explicitly.
    pub fn any_explicit(&self) -> bool {
        self.tcp.iter().chain(self.udp.iter()).any(|p| *p != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_triple_passes_through() {
        assert_eq!(
            parse_port_set("5000,5001,5002", 3).unwrap(),
            vec![5000, 5001, 5002]
        );
    }

    #[test]
    fn single_value_fills_consecutively() {
        assert_eq!(parse_port_set("5000", 3).unwrap(), vec![5000, 5001, 5002]);
        assert_eq!(parse_port_set("7010,7011", 3).unwrap(), vec![7010, 7011, 7012]);
    }

    #[test]
    fn duplicates_rejected() {
        assert_eq!(
            parse_port_set("5000,5000", 3).unwrap_err(),
            PortError::Duplicate(5000)
        );
    }

    #[test]
    fn below_range_rejected() {
        assert_eq!(parse_port_set("80", 3).unwrap_err(), PortError::OutOfRange(80));
    }

    #[test]
    fn above_range_rejected() {
        assert_eq!(
            parse_port_set("70000", 3).unwrap_err(),
            PortError::OutOfRange(70000)
        );
    }

    #[test]
    fn consecutive_fill_overflow_rejected() {
        assert_eq!(
            parse_port_set("65535", 2).unwrap_err(),
            PortError::Overflow { start: 65535 }
        );
        // At the top of the range with nothing to fill is fine.
        assert_eq!(parse_port_set("65534,65535", 2).unwrap(), vec![65534, 65535]);
    }

    #[test]
    fn zero_entries_stay_auto() {
        assert_eq!(parse_port_set("0", 3).unwrap(), vec![0, 0, 0]);
        assert_eq!(parse_port_set("5000,0", 3).unwrap(), vec![5000, 0, 0]);
    }

    #[test]
    fn garbage_rejected() {
        assert!(parse_port_set("", 3).is_err());
        assert!(parse_port_set("50a0", 3).is_err());
        assert!(parse_port_set("-5000", 3).is_err());
        assert!(parse_port_set("123456", 3).is_err());
    }

    #[test]
    fn too_many_values_rejected() {
        assert_eq!(
            parse_port_set("5000,5001,5002,5003", 3).unwrap_err(),
            PortError::TooMany { expected: 3 }
        );
    }

    #[test]
    fn port_set_parses_both_triples() {
        let set = PortSet::parse("5000", "6000,6001,6002").unwrap();
        assert_eq!(set.tcp, [5000, 5001, 5002]);
        assert_eq!(set.udp, [6000, 6001, 6002]);
        assert!(set.any_explicit());

        let auto = PortSet::parse("", "").unwrap();
        assert_eq!(auto, PortSet::auto());
        assert!(!auto.any_explicit());
    }
}
