//! Netlink socket operations for network configuration.
//!
//! A low-level interface to the Linux rtnetlink subsystem for creating
//! and configuring links, addresses, and routes. Requests are assembled
//! by hand into the kernel's wire format and acknowledged synchronously.

use std::ffi::CString;
use std::io;
use std::mem;
use std::net::Ipv4Addr;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use ipnetwork::Ipv4Network;
use tinybox_common::error::{Result, TinyboxError};

const NETLINK_ROUTE: i32 = 0;

// Message types
const NLMSG_ERROR: u16 = 2;
const RTM_NEWLINK: u16 = 16;
const RTM_DELLINK: u16 = 17;
const RTM_NEWADDR: u16 = 20;
const RTM_NEWROUTE: u16 = 24;

// Message flags
const NLM_F_REQUEST: u16 = 0x0001;
const NLM_F_ACK: u16 = 0x0004;
const NLM_F_EXCL: u16 = 0x0200;
const NLM_F_CREATE: u16 = 0x0400;

// Interface flags
const IFF_UP: u32 = 0x1;

// RTM_NEWLINK attributes
const IFLA_IFNAME: u16 = 3;
const IFLA_MASTER: u16 = 10;
const IFLA_LINKINFO: u16 = 18;
const IFLA_NET_NS_FD: u16 = 28;
const IFLA_INFO_KIND: u16 = 1;
const IFLA_INFO_DATA: u16 = 2;
const VETH_INFO_PEER: u16 = 1;

// RTM_NEWADDR attributes
const IFA_ADDRESS: u16 = 1;
const IFA_LOCAL: u16 = 2;

// RTM_NEWROUTE attributes and constants
const RTA_OIF: u16 = 4;
const RTA_GATEWAY: u16 = 5;
const RT_TABLE_MAIN: u8 = 254;
const RTPROT_BOOT: u8 = 3;
const RT_SCOPE_UNIVERSE: u8 = 0;
const RTN_UNICAST: u8 = 1;

const NLA_F_NESTED: u16 = 1 << 15;
const NLMSG_HDRLEN: usize = 16;
const NLATTR_HDRLEN: usize = 4;

/// How often and how long to re-resolve a freshly created link before
/// giving up; a new link may not be addressable immediately.
const LINK_LOOKUP_RETRIES: u32 = 2;
const LINK_LOOKUP_DELAY: Duration = Duration::from_secs(2);

/// An rtnetlink request under assembly.
///
/// The 16-byte netlink header is reserved up front and the total length
/// patched in by [`Request::finish`]. Attributes are 4-byte aligned;
/// nested attributes patch their own length on close.
struct Request {
    buf: Vec<u8>,
}

impl Request {
    fn new(msg_type: u16, flags: u16, seq: u32) -> Self {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&0u32.to_ne_bytes()); // nlmsg_len, patched in finish
        buf.extend_from_slice(&msg_type.to_ne_bytes());
        buf.extend_from_slice(&flags.to_ne_bytes());
        buf.extend_from_slice(&seq.to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes()); // nlmsg_pid
        Self { buf }
    }

    /// Appends a `struct ifinfomsg`.
    fn ifinfomsg(&mut self, index: i32, flags: u32, change: u32) {
        self.buf.push(libc::AF_UNSPEC as u8);
        self.buf.push(0);
        self.buf.extend_from_slice(&0u16.to_ne_bytes()); // ifi_type
        self.buf.extend_from_slice(&index.to_ne_bytes());
        self.buf.extend_from_slice(&flags.to_ne_bytes());
        self.buf.extend_from_slice(&change.to_ne_bytes());
    }

    /// Appends a `struct ifaddrmsg` for an IPv4 address.
    fn ifaddrmsg(&mut self, prefix_len: u8, index: u32) {
        self.buf.push(libc::AF_INET as u8);
        self.buf.push(prefix_len);
        self.buf.push(0); // ifa_flags
        self.buf.push(0); // ifa_scope
        self.buf.extend_from_slice(&index.to_ne_bytes());
    }

    /// Appends a `struct rtmsg` for a main-table IPv4 unicast route.
    fn rtmsg(&mut self, dst_len: u8) {
        self.buf.push(libc::AF_INET as u8);
        self.buf.push(dst_len);
        self.buf.push(0); // rtm_src_len
        self.buf.push(0); // rtm_tos
        self.buf.push(RT_TABLE_MAIN);
        self.buf.push(RTPROT_BOOT);
        self.buf.push(RT_SCOPE_UNIVERSE);
        self.buf.push(RTN_UNICAST);
        self.buf.extend_from_slice(&0u32.to_ne_bytes()); // rtm_flags
    }

    fn attr_bytes(&mut self, attr_type: u16, value: &[u8]) {
        let attr_len = (NLATTR_HDRLEN + value.len()) as u16;
        self.buf.extend_from_slice(&attr_len.to_ne_bytes());
        self.buf.extend_from_slice(&attr_type.to_ne_bytes());
        self.buf.extend_from_slice(value);
        self.pad();
    }

    fn attr_str(&mut self, attr_type: u16, value: &str) {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        self.attr_bytes(attr_type, &bytes);
    }

    fn attr_u32(&mut self, attr_type: u16, value: u32) {
        self.attr_bytes(attr_type, &value.to_ne_bytes());
    }

    /// Opens a nested attribute; the cookie must be handed back to
    /// [`Request::nest_end`].
    fn nest_begin(&mut self, attr_type: u16) -> usize {
        let start = self.buf.len();
        self.buf.extend_from_slice(&0u16.to_ne_bytes()); // patched in nest_end
        self.buf
            .extend_from_slice(&(attr_type | NLA_F_NESTED).to_ne_bytes());
        start
    }

    fn nest_end(&mut self, start: usize) {
        let len = (self.buf.len() - start) as u16;
        self.buf[start..start + 2].copy_from_slice(&len.to_ne_bytes());
    }

    fn pad(&mut self) {
        while self.buf.len() % 4 != 0 {
            self.buf.push(0);
        }
    }

    fn finish(mut self) -> Vec<u8> {
        let len = self.buf.len() as u32;
        self.buf[..4].copy_from_slice(&len.to_ne_bytes());
        self.buf
    }
}

/// Synchronous rtnetlink socket.
///
/// Each operation sends one request and waits for the kernel's
/// acknowledgement. The socket is bound to the network namespace it was
/// created in, so in-container configuration needs a socket created
/// after entering that namespace.
pub struct RouteSocket {
    fd: OwnedFd,
    seq: u32,
}

impl RouteSocket {
    /// Opens and binds a `NETLINK_ROUTE` socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be created or bound.
    pub fn new() -> Result<Self> {
        let fd = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                NETLINK_ROUTE,
            )
        };
        if fd < 0 {
            return Err(last_os_error("netlink socket creation"));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                std::ptr::addr_of!(addr).cast(),
                mem::size_of::<libc::sockaddr_nl>() as u32,
            )
        };
        if ret < 0 {
            return Err(last_os_error("netlink socket bind"));
        }

        Ok(Self { fd, seq: 0 })
    }

    fn next_seq(&mut self) -> u32 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    /// Sends a request and decodes the kernel's acknowledgement.
    fn execute(&mut self, req: Request) -> Result<()> {
        match self.execute_raw(req)? {
            0 => Ok(()),
            errno => Err(TinyboxError::Syscall {
                message: format!(
                    "netlink request failed: {}",
                    io::Error::from_raw_os_error(errno)
                ),
            }),
        }
    }

    /// Like [`RouteSocket::execute`] but treats `EEXIST` as success, for
    /// idempotent create operations.
    fn execute_allow_exists(&mut self, req: Request) -> Result<()> {
        match self.execute_raw(req)? {
            0 => Ok(()),
            errno if errno == libc::EEXIST => Ok(()),
            errno => Err(TinyboxError::Syscall {
                message: format!(
                    "netlink request failed: {}",
                    io::Error::from_raw_os_error(errno)
                ),
            }),
        }
    }

    /// Returns the positive errno carried by the acknowledgement, or 0.
    fn execute_raw(&mut self, req: Request) -> Result<i32> {
        let msg = req.finish();
        let sent = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                msg.as_ptr().cast::<libc::c_void>(),
                msg.len(),
                0,
            )
        };
        if sent < 0 {
            return Err(last_os_error("netlink send"));
        }

        let mut buf = [0u8; 4096];
        let len = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
                0,
            )
        };
        if len < 0 {
            return Err(last_os_error("netlink recv"));
        }
        let len = len as usize;

        if len >= NLMSG_HDRLEN + 4 {
            let msg_type = u16::from_ne_bytes([buf[4], buf[5]]);
            if msg_type == NLMSG_ERROR {
                // nlmsgerr starts with the (negative) error code.
                let code = i32::from_ne_bytes([buf[16], buf[17], buf[18], buf[19]]);
                return Ok(-code);
            }
        }
        Ok(0)
    }

    /// Creates a bridge link; an existing bridge of the same name is
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the netlink request fails.
    pub fn create_bridge(&mut self, name: &str) -> Result<()> {
        let mut req = Request::new(
            RTM_NEWLINK,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
            self.next_seq(),
        );
        req.ifinfomsg(0, 0, 0);
        req.attr_str(IFLA_IFNAME, name);
        let linkinfo = req.nest_begin(IFLA_LINKINFO);
        req.attr_str(IFLA_INFO_KIND, "bridge");
        req.nest_end(linkinfo);
        self.execute_allow_exists(req)?;
        tracing::info!(bridge = %name, "bridge link created");
        Ok(())
    }

    /// Creates a veth pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the netlink request fails (e.g. a link with
    /// either name already exists).
    pub fn create_veth(&mut self, name: &str, peer_name: &str) -> Result<()> {
        let mut req = Request::new(
            RTM_NEWLINK,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
            self.next_seq(),
        );
        req.ifinfomsg(0, 0, 0);
        req.attr_str(IFLA_IFNAME, name);
        let linkinfo = req.nest_begin(IFLA_LINKINFO);
        req.attr_str(IFLA_INFO_KIND, "veth");
        let data = req.nest_begin(IFLA_INFO_DATA);
        let peer = req.nest_begin(VETH_INFO_PEER);
        req.ifinfomsg(0, 0, 0);
        req.attr_str(IFLA_IFNAME, peer_name);
        req.nest_end(peer);
        req.nest_end(data);
        req.nest_end(linkinfo);
        self.execute(req)?;
        tracing::info!(veth = %name, peer = %peer_name, "veth pair created");
        Ok(())
    }

    /// Deletes a link by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the link does not exist or deletion fails.
    pub fn delete_link(&mut self, name: &str) -> Result<()> {
        let index = ifindex(name)?;
        let mut req = Request::new(RTM_DELLINK, NLM_F_REQUEST | NLM_F_ACK, self.next_seq());
        req.ifinfomsg(index as i32, 0, 0);
        self.execute(req)?;
        tracing::info!(link = %name, "link deleted");
        Ok(())
    }

    /// Brings a link up.
    ///
    /// # Errors
    ///
    /// Returns an error if the link does not exist or the request fails.
    pub fn set_link_up(&mut self, name: &str) -> Result<()> {
        let index = ifindex(name)?;
        let mut req = Request::new(RTM_NEWLINK, NLM_F_REQUEST | NLM_F_ACK, self.next_seq());
        req.ifinfomsg(index as i32, IFF_UP, IFF_UP);
        self.execute(req)
    }

    /// Attaches a link to a bridge (`ip link set <name> master <master>`).
    ///
    /// # Errors
    ///
    /// Returns an error if either link is missing or the request fails.
    pub fn set_link_master(&mut self, name: &str, master: &str) -> Result<()> {
        let index = ifindex(name)?;
        let master_index = ifindex(master)?;
        let mut req = Request::new(RTM_NEWLINK, NLM_F_REQUEST | NLM_F_ACK, self.next_seq());
        req.ifinfomsg(index as i32, 0, 0);
        req.attr_u32(IFLA_MASTER, master_index);
        self.execute(req)
    }

    /// Moves a link into the network namespace identified by `ns_fd`
    /// (`ip link set <name> netns <fd>`).
    ///
    /// # Errors
    ///
    /// Returns an error if the link is missing or the request fails.
    pub fn set_link_netns(&mut self, name: &str, ns_fd: RawFd) -> Result<()> {
        let index = ifindex(name)?;
        let mut req = Request::new(RTM_NEWLINK, NLM_F_REQUEST | NLM_F_ACK, self.next_seq());
        req.ifinfomsg(index as i32, 0, 0);
        req.attr_u32(IFLA_NET_NS_FD, ns_fd as u32);
        self.execute(req)?;
        tracing::info!(link = %name, "link moved into netns");
        Ok(())
    }

    /// Assigns an IPv4 address to a link, retrying the link lookup; a
    /// freshly created link may not be visible immediately. An address
    /// that is already present is accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the link never appears or the request fails.
    pub fn set_interface_ip(&mut self, name: &str, addr: Ipv4Network) -> Result<()> {
        let mut index = ifindex(name);
        for _ in 0..LINK_LOOKUP_RETRIES {
            if index.is_ok() {
                break;
            }
            tracing::warn!(link = %name, "link not found yet, retrying");
            std::thread::sleep(LINK_LOOKUP_DELAY);
            index = ifindex(name);
        }
        let index = index?;

        let mut req = Request::new(
            RTM_NEWADDR,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
            self.next_seq(),
        );
        req.ifaddrmsg(addr.prefix(), index);
        let octets = addr.ip().octets();
        req.attr_bytes(IFA_LOCAL, &octets);
        req.attr_bytes(IFA_ADDRESS, &octets);
        self.execute_allow_exists(req)?;
        tracing::info!(link = %name, addr = %addr, "address assigned");
        Ok(())
    }

    /// Installs the default route via `gateway` out of `ifname`.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface is missing or the request fails.
    pub fn add_default_route(&mut self, gateway: Ipv4Addr, ifname: &str) -> Result<()> {
        let index = ifindex(ifname)?;
        let mut req = Request::new(
            RTM_NEWROUTE,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
            self.next_seq(),
        );
        req.rtmsg(0);
        req.attr_bytes(RTA_GATEWAY, &gateway.octets());
        req.attr_u32(RTA_OIF, index);
        self.execute(req)?;
        tracing::info!(gateway = %gateway, dev = %ifname, "default route added");
        Ok(())
    }
}

/// Resolves an interface name to its index in the current netns.
///
/// # Errors
///
/// Returns `NotFound` for an unknown interface name.
pub fn ifindex(name: &str) -> Result<u32> {
    let c_name = CString::new(name).map_err(|_| TinyboxError::InvalidArgument {
        message: format!("interface name {name:?} contains NUL"),
    })?;
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if index == 0 {
        return Err(TinyboxError::NotFound {
            kind: "interface",
            id: name.to_string(),
        });
    }
    Ok(index)
}

/// Whether an interface with the given name exists in the current netns.
#[must_use]
pub fn link_exists(name: &str) -> bool {
    ifindex(name).is_ok()
}

/// Reads a link's MAC address via the `SIOCGIFHWADDR` ioctl.
///
/// # Errors
///
/// Returns an error if the interface is missing or the ioctl fails.
pub fn hardware_addr(name: &str) -> Result<String> {
    let c_name = CString::new(name).map_err(|_| TinyboxError::InvalidArgument {
        message: format!("interface name {name:?} contains NUL"),
    })?;
    let name_bytes = c_name.as_bytes_with_nul();

    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(last_os_error("ioctl socket creation"));
    }
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };

    let mut ifr: libc::ifreq = unsafe { mem::zeroed() };
    if name_bytes.len() > ifr.ifr_name.len() {
        return Err(TinyboxError::InvalidArgument {
            message: format!("interface name {name:?} is too long"),
        });
    }
    for (dst, src) in ifr.ifr_name.iter_mut().zip(name_bytes) {
        *dst = *src as libc::c_char;
    }

    let ret = unsafe { libc::ioctl(fd.as_raw_fd(), libc::SIOCGIFHWADDR, &mut ifr) };
    if ret < 0 {
        return Err(last_os_error("SIOCGIFHWADDR ioctl"));
    }

    let data = unsafe { ifr.ifr_ifru.ifru_hwaddr.sa_data };
    Ok(format_mac(&data[..6]))
}

fn format_mac(bytes: &[libc::c_char]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", *b as u8))
        .collect::<Vec<_>>()
        .join(":")
}

fn last_os_error(op: &str) -> TinyboxError {
    TinyboxError::Syscall {
        message: format!("{op} failed: {}", io::Error::last_os_error()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ifindex_resolves_loopback() {
        let index = ifindex("lo").expect("lo exists");
        assert!(index > 0);
        assert!(link_exists("lo"));
    }

    #[test]
    fn ifindex_unknown_interface_is_not_found() {
        let err = ifindex("tinybox-does-not-exist-0").unwrap_err();
        assert!(matches!(err, TinyboxError::NotFound { .. }));
        assert!(!link_exists("tinybox-does-not-exist-0"));
    }

    #[test]
    fn request_header_carries_total_length() {
        let mut req = Request::new(RTM_NEWLINK, NLM_F_REQUEST | NLM_F_ACK, 7);
        req.ifinfomsg(0, 0, 0);
        req.attr_str(IFLA_IFNAME, "br0");
        let msg = req.finish();
        let len = u32::from_ne_bytes([msg[0], msg[1], msg[2], msg[3]]);
        assert_eq!(len as usize, msg.len());
        assert_eq!(msg.len() % 4, 0);
    }

    #[test]
    fn attrs_are_four_byte_aligned() {
        let mut req = Request::new(RTM_NEWLINK, NLM_F_REQUEST, 1);
        req.ifinfomsg(0, 0, 0);
        // 5-byte payload ("ab" + NUL would be 3; use a name needing padding)
        req.attr_str(IFLA_IFNAME, "ab");
        assert_eq!(req.buf.len() % 4, 0);
        req.attr_u32(IFLA_MASTER, 9);
        assert_eq!(req.buf.len() % 4, 0);
    }

    #[test]
    fn nested_attr_length_is_patched() {
        let mut req = Request::new(RTM_NEWLINK, NLM_F_REQUEST, 1);
        req.ifinfomsg(0, 0, 0);
        let start = req.nest_begin(IFLA_LINKINFO);
        req.attr_str(IFLA_INFO_KIND, "veth");
        req.nest_end(start);

        let nla_len = u16::from_ne_bytes([req.buf[start], req.buf[start + 1]]);
        let nla_type = u16::from_ne_bytes([req.buf[start + 2], req.buf[start + 3]]);
        // Nest header (4) + inner attr "veth\0" (4 + 5, padded to 12).
        assert_eq!(nla_len, 16);
        assert_eq!(nla_type, IFLA_LINKINFO | NLA_F_NESTED);
    }

    #[test]
    fn mac_formatting() {
        let bytes: [libc::c_char; 6] = [
            0x02,
            0x42,
            0xac_u8 as libc::c_char,
            0x11,
            0x00,
            0x02,
        ];
        assert_eq!(format_mac(&bytes), "02:42:ac:11:00:02");
    }
}
