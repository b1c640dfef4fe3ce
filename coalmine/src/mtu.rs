//! Datagram payload size discovery.
//!
//! The largest safe UDP payload is the MTU of the interface owning the
//! socket's local address, minus the IP header (20 bytes for IPv4, 40 for
//! IPv6) and the 8-byte UDP header. It is computed on first use and cached
//! for the life of the process.
//!
//! Interface lookup uses `getifaddrs(3)` and `/sys/class/net/<iface>/mtu`,
//! so it is only available on Linux; elsewhere the lookup reports
//! [`io::ErrorKind::Unsupported`].

use std::io;
use std::net::IpAddr;
use std::sync::OnceLock;

const IPV4_HEADER: usize = 20;
const IPV6_HEADER: usize = 40;
const UDP_HEADER: usize = 8;

static PAYLOAD_SIZE: OnceLock<usize> = OnceLock::new();

/// Returns the cached datagram payload size, computing it from the
/// interface that owns `local` on first call.
///
/// Concurrent first calls may each compute the value; only one is stored
/// and all callers observe the same result afterwards.
///
/// # Errors
///
/// Returns an error if the interface or its MTU cannot be determined, or the
/// MTU is too small to carry any payload.
pub fn udp_payload_size(local: IpAddr) -> io::Result<usize> {
    if let Some(size) = PAYLOAD_SIZE.get() {
        return Ok(*size);
    }
    let mtu = interface_mtu(local)?;
    let size = payload_for_mtu(mtu, local)?;
    Ok(*PAYLOAD_SIZE.get_or_init(|| size))
}

/// Payload left for UDP data in a packet of `mtu` bytes sent from `local`.
///
/// IPv4-mapped IPv6 addresses are treated as IPv4.
///
/// # Errors
///
/// Returns [`io::ErrorKind::InvalidData`] if the headers do not fit in `mtu`.
pub fn payload_for_mtu(mtu: usize, local: IpAddr) -> io::Result<usize> {
    let ip_header = match local.to_canonical() {
        IpAddr::V4(_) => IPV4_HEADER,
        IpAddr::V6(_) => IPV6_HEADER,
    };
    mtu.checked_sub(ip_header + UDP_HEADER)
        .filter(|payload| *payload > 0)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("mtu {mtu} leaves no room for a datagram payload"),
            )
        })
}

#[cfg(target_os = "linux")]
fn interface_mtu(local: IpAddr) -> io::Result<usize> {
    let name = interface_name(local.to_canonical())?;
    let path = format!("/sys/class/net/{name}/mtu");
    let raw = std::fs::read_to_string(&path)?;
    raw.trim().parse().map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{path} does not hold an mtu: {e}"),
        )
    })
}

#[cfg(not(target_os = "linux"))]
fn interface_mtu(_local: IpAddr) -> io::Result<usize> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "interface mtu lookup is only implemented for linux",
    ))
}

/// Name of the interface carrying `ip`.
#[cfg(target_os = "linux")]
fn interface_name(ip: IpAddr) -> io::Result<String> {
    use std::ffi::CStr;

    let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
    // SAFETY: `head` is a valid out-pointer; the list is released below.
    if unsafe { libc::getifaddrs(&mut head) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut found = None;
    let mut cursor = head;
    while !cursor.is_null() {
        // SAFETY: `cursor` is a non-null node of the list returned by
        // getifaddrs, which stays alive until freeifaddrs.
        let entry = unsafe { &*cursor };
        cursor = entry.ifa_next;
        if entry.ifa_addr.is_null() || entry.ifa_name.is_null() {
            continue;
        }
        // SAFETY: `ifa_addr` is non-null and owned by the live list.
        if unsafe { sockaddr_ip(entry.ifa_addr) } == Some(ip) {
            // SAFETY: `ifa_name` is a non-null NUL-terminated string owned by the list.
            let name = unsafe { CStr::from_ptr(entry.ifa_name) };
            found = Some(name.to_string_lossy().into_owned());
            break;
        }
    }

    // SAFETY: `head` came from a successful getifaddrs call and is freed once.
    unsafe { libc::freeifaddrs(head) };

    found.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no interface carries address {ip}"),
        )
    })
}

/// Extracts the IP address of an `AF_INET`/`AF_INET6` socket address.
///
/// # Safety
///
/// `addr` must point to a valid `sockaddr` whose storage matches its family.
#[cfg(target_os = "linux")]
unsafe fn sockaddr_ip(addr: *const libc::sockaddr) -> Option<IpAddr> {
    // SAFETY: the caller guarantees `addr` points to a valid sockaddr.
    let family = i32::from(unsafe { (*addr).sa_family });
    match family {
        libc::AF_INET => {
            // SAFETY: AF_INET addresses are stored as sockaddr_in.
            let sin = unsafe { &*addr.cast::<libc::sockaddr_in>() };
            Some(IpAddr::from(sin.sin_addr.s_addr.to_ne_bytes()))
        }
        libc::AF_INET6 => {
            // SAFETY: AF_INET6 addresses are stored as sockaddr_in6.
            let sin6 = unsafe { &*addr.cast::<libc::sockaddr_in6>() };
            Some(IpAddr::from(sin6.sin6_addr.s6_addr))
        }
        _ => None,
    }
}
