// Port negotiation for the embedded backend

use std::io::ErrorKind;
use std::net::{Ipv4Addr, TcpListener};
use tracing::debug;

use crate::errors::{Result, SupervisorError};

/// Find the first free loopback port at or above `preferred`.
///
/// Each candidate is bound and released immediately; a port in use moves on
/// to the next one, any other bind error is returned. The caller is expected
/// to hand the port to the backend right away.
pub fn find_available_port(preferred: u16) -> Result<u16> {
    let mut candidate = preferred;
    loop {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, candidate)) {
            Ok(listener) => {
                drop(listener);
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                debug!("Port {} in use, trying {}", candidate, candidate.wrapping_add(1));
                candidate = candidate.checked_add(1).ok_or_else(|| {
                    SupervisorError::PortNegotiation {
                        preferred,
                        source: std::io::Error::new(ErrorKind::AddrInUse, "port range exhausted"),
                    }
                })?;
            }
            Err(source) => return Err(SupervisorError::PortNegotiation { preferred, source }),
        }
    }
}
