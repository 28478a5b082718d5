//! Port discovery and claiming
//!
//! The DIO card is found by USB identity and then probed; the automotive
//! MCU's UART must be named by the caller and is only probed. Both roles
//! share one probe: write the probe byte and wait for an ACK inside the
//! time window, tolerating up to `nacks_needed - 1` NACKs (busy MCU).
//!
//! A claimed port is leased: no second session in this process can claim
//! the same port name until the lease is dropped.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::serial::describe_ports;
use super::{DiscoveryConfig, PortInfo, ProtocolError, Role, SerialLink, SessionConfig, ACK, NACK};

/// Result of probing one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The MCU acknowledged the probe
    Acknowledged { nacks: u32 },
    /// Too many NACKs inside the window
    Rejected { nacks: u32 },
    /// Window elapsed without an ACK
    Silent { nacks: u32 },
}

/// Probe a freshly opened link
pub fn probe<L: SerialLink + ?Sized>(
    link: &mut L,
    cfg: &DiscoveryConfig,
) -> Result<ProbeOutcome, ProtocolError> {
    let start = Instant::now();
    let window = cfg.time_threshold();
    let mut nacks = 0;

    link.write_byte(cfg.probe_byte)?;
    loop {
        let remaining = window.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return Ok(ProbeOutcome::Silent { nacks });
        }
        match link.read_byte(remaining)? {
            Some(ACK) => return Ok(ProbeOutcome::Acknowledged { nacks }),
            Some(NACK) => {
                nacks += 1;
                debug!("probe: NACK {} of {}", nacks, cfg.nacks_needed);
                if nacks >= cfg.nacks_needed {
                    return Ok(ProbeOutcome::Rejected { nacks });
                }
                std::thread::sleep(cfg.retry_delay());
                link.write_byte(cfg.probe_byte)?;
            }
            Some(other) => debug!("probe: ignoring {:#04x}", other),
            None => return Ok(ProbeOutcome::Silent { nacks }),
        }
    }
}

fn claimed_ports() -> &'static Mutex<HashSet<String>> {
    static CLAIMED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    CLAIMED.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Exclusive claim on a port name, released on drop
#[derive(Debug)]
pub struct PortLease {
    name: String,
}

impl PortLease {
    /// Take the lease, failing if another session holds it
    pub fn acquire(name: &str) -> Result<Self, ProtocolError> {
        let mut claimed = claimed_ports()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !claimed.insert(name.to_string()) {
            return Err(ProtocolError::PortInUse(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
        })
    }

    /// Leased port name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if some live session holds `name`
    pub fn is_held(name: &str) -> bool {
        claimed_ports()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(name)
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        let mut claimed = claimed_ports()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        claimed.remove(&self.name);
    }
}

/// A port that passed the probe and is leased to the caller
#[derive(Debug)]
pub struct Claimed<L> {
    /// Name the port was opened under
    pub port_name: String,
    /// Open link, probed and resynchronized
    pub link: L,
    /// Lease held for as long as the port is in use
    pub lease: PortLease,
}

/// Open `port_name`, probe it, and lease it
pub fn claim_explicit<L, F>(
    port_name: &str,
    cfg: &DiscoveryConfig,
    mut open: F,
) -> Result<Claimed<L>, ProtocolError>
where
    L: SerialLink,
    F: FnMut(&str) -> Result<L, ProtocolError>,
{
    let lease = PortLease::acquire(port_name)?;
    let mut link = open(port_name)?;
    match probe(&mut link, cfg)? {
        ProbeOutcome::Acknowledged { nacks } => {
            info!("Interface found on {} after {} NACKs", port_name, nacks);
            Ok(Claimed {
                port_name: port_name.to_string(),
                link,
                lease,
            })
        }
        outcome => {
            error!("{} failed the probe: {:?}", port_name, outcome);
            Err(ProtocolError::ProbeFailed {
                port: port_name.to_string(),
                reason: format!("{:?}", outcome),
            })
        }
    }
}

/// Find the DIO card among `candidates` by USB identity and probe.
///
/// Candidates that fail to open, are already leased or fail the probe are
/// skipped; the first one that acknowledges is claimed.
pub fn find_dio_port<L, F>(
    candidates: &[PortInfo],
    cfg: &DiscoveryConfig,
    mut open: F,
) -> Result<Claimed<L>, ProtocolError>
where
    L: SerialLink,
    F: FnMut(&str) -> Result<L, ProtocolError>,
{
    for candidate in candidates.iter().filter(|p| p.matches_usb(cfg.vid, cfg.pid)) {
        match claim_explicit(&candidate.name, cfg, &mut open) {
            Ok(claimed) => return Ok(claimed),
            Err(e) => warn!("Skipping {}: {}", candidate.name, e),
        }
    }

    let listing = describe_ports(candidates).join(", ");
    error!(
        "No DIO card ({:04X}:{:04X}) answered; available ports: {}",
        cfg.vid, cfg.pid, listing
    );
    Err(ProtocolError::PortNotFound(format!(
        "no {:04X}:{:04X} device acknowledged the probe (available: {})",
        cfg.vid, cfg.pid, listing
    )))
}

/// Claim the port `config` describes, using `candidates` for autodetection
/// and to guard the automotive role against the DIO card's port.
pub fn claim<L, F>(
    config: &SessionConfig,
    candidates: &[PortInfo],
    open: F,
) -> Result<Claimed<L>, ProtocolError>
where
    L: SerialLink,
    F: FnMut(&str) -> Result<L, ProtocolError>,
{
    let cfg = &config.discovery;
    match (config.role, config.port_name.as_deref()) {
        (Role::DioCard, Some(name)) => claim_explicit(name, cfg, open),
        (Role::DioCard, None) => find_dio_port(candidates, cfg, open),
        (Role::Automotive, None) => {
            error!(
                "A port must be provided for the automotive role; available ports: {}",
                describe_ports(candidates).join(", ")
            );
            Err(ProtocolError::PortNotFound(
                "the automotive role requires an explicit port".into(),
            ))
        }
        (Role::Automotive, Some(name)) => {
            let is_dio = candidates
                .iter()
                .any(|p| p.name == name && p.matches_usb(cfg.vid, cfg.pid));
            if is_dio {
                error!("{} is the DIO card's port, not the sequence MCU's", name);
                return Err(ProtocolError::DioPortForAutomotive(name.to_string()));
            }
            claim_explicit(name, cfg, open)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::link::testing::ScriptedLink;
    use std::time::Duration;

    /// Answers every probe with `reply`, but only after `delay`
    struct DelayedLink {
        reply: u8,
        delay: Duration,
        written: Vec<u8>,
    }

    impl DelayedLink {
        fn new(reply: u8, delay_ms: u64) -> Self {
            Self {
                reply,
                delay: Duration::from_millis(delay_ms),
                written: Vec::new(),
            }
        }
    }

    impl SerialLink for DelayedLink {
        fn write_byte(&mut self, byte: u8) -> Result<(), ProtocolError> {
            self.written.push(byte);
            Ok(())
        }

        fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, ProtocolError> {
            if self.delay > timeout {
                std::thread::sleep(timeout);
                return Ok(None);
            }
            std::thread::sleep(self.delay);
            Ok(Some(self.reply))
        }

        fn clear_buffers(&mut self) -> Result<(), ProtocolError> {
            Ok(())
        }
    }

    fn fast() -> DiscoveryConfig {
        DiscoveryConfig {
            retry_delay_ms: 0,
            time_threshold_ms: 200,
            ..DiscoveryConfig::default()
        }
    }

    #[test]
    fn test_probe_ack() {
        let mut link = ScriptedLink::new(vec![Some(NACK), Some(NACK), Some(ACK)]);
        let outcome = probe(&mut link, &fast()).unwrap();
        assert_eq!(outcome, ProbeOutcome::Acknowledged { nacks: 2 });
        // Probe re-sent after each NACK
        assert_eq!(link.written, vec![0x01, 0x01, 0x01]);
    }

    #[test]
    fn test_probe_rejects_after_nacks_needed() {
        let mut link = ScriptedLink::new(vec![Some(NACK); 10]);
        let outcome = probe(&mut link, &fast()).unwrap();
        assert_eq!(outcome, ProbeOutcome::Rejected { nacks: 5 });
        assert_eq!(link.written.len(), 5);
    }

    #[test]
    fn test_probe_silent() {
        let mut link = ScriptedLink::new(vec![Some(0x33)]);
        let outcome = probe(&mut link, &fast()).unwrap();
        assert_eq!(outcome, ProbeOutcome::Silent { nacks: 0 });
    }

    #[test]
    fn test_probe_ack_after_window_is_silent() {
        let cfg = DiscoveryConfig {
            time_threshold_ms: 50,
            ..fast()
        };
        let mut link = DelayedLink::new(ACK, 200);
        let start = Instant::now();
        let outcome = probe(&mut link, &cfg).unwrap();
        assert_eq!(outcome, ProbeOutcome::Silent { nacks: 0 });
        assert_eq!(link.written, vec![cfg.probe_byte]);
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[test]
    fn test_slow_nacks_never_reach_rejection() {
        // At most two NACKs fit in the window, short of nacks_needed
        let cfg = DiscoveryConfig {
            time_threshold_ms: 100,
            ..fast()
        };
        let mut link = DelayedLink::new(NACK, 40);
        match probe(&mut link, &cfg).unwrap() {
            ProbeOutcome::Silent { nacks } => assert!(nacks < cfg.nacks_needed),
            other => panic!("expected silent probe, got {other:?}"),
        }
    }

    #[test]
    fn test_late_candidate_is_skipped() {
        let mut slow = PortInfo::bare("/dev/test-window-slow");
        slow.vid = Some(0x353F);
        slow.pid = Some(0xA105);
        let mut fast_port = slow.clone();
        fast_port.name = "/dev/test-window-fast".into();
        let cfg = DiscoveryConfig {
            time_threshold_ms: 50,
            ..fast()
        };

        let claimed = find_dio_port(&[slow, fast_port], &cfg, |name| {
            let delay = if name.ends_with("slow") { 200 } else { 0 };
            Ok(DelayedLink::new(ACK, delay))
        })
        .unwrap();
        assert_eq!(claimed.port_name, "/dev/test-window-fast");
        assert!(!PortLease::is_held("/dev/test-window-slow"));
    }

    #[test]
    fn test_lease_is_exclusive() {
        let first = PortLease::acquire("/dev/test-lease-exclusive").unwrap();
        assert!(matches!(
            PortLease::acquire("/dev/test-lease-exclusive"),
            Err(ProtocolError::PortInUse(_))
        ));
        assert!(PortLease::is_held(first.name()));
        drop(first);
        assert!(!PortLease::is_held("/dev/test-lease-exclusive"));
        assert!(PortLease::acquire("/dev/test-lease-exclusive").is_ok());
    }

    #[test]
    fn test_automotive_requires_port() {
        let config = SessionConfig {
            port_name: None,
            ..SessionConfig::automotive("unused")
        };
        let result = claim(&config, &[], |_| Ok(ScriptedLink::new(vec![])));
        assert!(matches!(result, Err(ProtocolError::PortNotFound(_))));
    }

    #[test]
    fn test_automotive_refuses_dio_port() {
        let mut dio = PortInfo::bare("/dev/test-auto-dio");
        dio.vid = Some(0x353F);
        dio.pid = Some(0xA105);
        let config = SessionConfig::automotive("/dev/test-auto-dio");
        let mut opened = false;
        let result = claim(&config, &[dio], |_| {
            opened = true;
            Ok(ScriptedLink::new(vec![Some(ACK)]))
        });
        assert!(matches!(result, Err(ProtocolError::DioPortForAutomotive(_))));
        assert!(!opened);
    }
}
