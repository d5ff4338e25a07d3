//! Free port suggestion
//!
//! Asks the OS for an ephemeral port by binding port 0, reads the assigned
//! port and releases the socket straight away so the managed binary can bind
//! it. Ports handed out recently are remembered for a while so two fixtures
//! in the same test binary never get the same suggestion.

use std::collections::HashMap;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Host every suggested address binds to
pub const LOCAL_HOST: &str = "127.0.0.1";

const RESERVATION_TTL: Duration = Duration::from_secs(60);
const MAX_ATTEMPTS: usize = 10;

static RESERVED: OnceLock<Mutex<HashMap<u16, Instant>>> = OnceLock::new();

fn reserve(port: u16) -> bool {
    let mut reserved = RESERVED
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let now = Instant::now();
    reserved.retain(|_, at| now.duration_since(*at) < RESERVATION_TTL);

    if reserved.contains_key(&port) {
        return false;
    }
    reserved.insert(port, now);
    true
}

/// Suggest a free local port and the host it was probed on
pub fn suggest() -> std::io::Result<(u16, &'static str)> {
    for _ in 0..MAX_ATTEMPTS {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        let port = listener.local_addr()?.port();
        drop(listener);

        if reserve(port) {
            return Ok((port, LOCAL_HOST));
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrInUse,
        format!("no unreserved port found after {MAX_ATTEMPTS} attempts"),
    ))
}
