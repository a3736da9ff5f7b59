//! Minimal rtnetlink client: just enough to move a link to another namespace

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};

use netlink_packet_core::{
    NetlinkBuffer, NetlinkHeader, NetlinkMessage, NetlinkPayload, NLM_F_ACK, NLM_F_REQUEST,
};
use netlink_packet_route::{
    link::{LinkAttribute, LinkMessage},
    RouteNetlinkMessage,
};
use nix::errno::Errno;
use nix::sys::socket::{self, AddressFamily, MsgFlags, SockFlag, SockProtocol, SockType};

const RECV_BUFFER_LEN: usize = 8192;

/// `NETLINK_ROUTE` socket bound to the namespace that was current when it was opened
#[derive(Debug)]
pub struct RouteSocket {
    fd: OwnedFd,
}

impl RouteSocket {
    /// Open a route socket in the calling thread's current namespace
    ///
    /// # Errors
    /// Returns the OS error if the socket cannot be created
    pub fn open() -> io::Result<Self> {
        let fd = socket::socket(
            AddressFamily::Netlink,
            SockType::Raw,
            SockFlag::SOCK_CLOEXEC,
            SockProtocol::NetlinkRoute,
        )?;
        Ok(Self { fd })
    }

    /// Reassign link `index` to the namespace behind `netns`
    ///
    /// # Errors
    /// Returns the errno carried by the kernel's acknowledgement, or an I/O error
    pub fn set_link_netns(&self, seq: u32, index: u32, netns: BorrowedFd<'_>) -> io::Result<()> {
        let request = link_netns_request(seq, index, netns.as_raw_fd());

        let sent = socket::send(self.fd.as_raw_fd(), &request, MsgFlags::empty())?;
        if sent != request.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "short write on netlink socket",
            ));
        }

        let mut buf = vec![0u8; RECV_BUFFER_LEN];
        loop {
            let len = match socket::recv(self.fd.as_raw_fd(), &mut buf, MsgFlags::empty()) {
                Ok(len) => len,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            };
            if len == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "netlink socket closed before acknowledgement",
                ));
            }
            if let Some(ack) = parse_ack(&buf[..len], seq)? {
                return ack;
            }
        }
    }
}

/// Build an `RTM_SETLINK` request carrying `IFLA_NET_NS_FD`, asking for an ACK
#[must_use]
pub fn link_netns_request(seq: u32, index: u32, netns_fd: RawFd) -> Vec<u8> {
    let mut link = LinkMessage::default();
    link.header.index = index;
    link.attributes.push(LinkAttribute::NetNsFd(netns_fd));

    let mut header = NetlinkHeader::default();
    header.flags = NLM_F_REQUEST | NLM_F_ACK;
    header.sequence_number = seq;

    let mut message = NetlinkMessage::new(
        header,
        NetlinkPayload::InnerMessage(RouteNetlinkMessage::SetLink(link)),
    );
    message.finalize();

    let mut buf = vec![0u8; message.buffer_len()];
    message.serialize(&mut buf);
    buf
}

/// Look for the acknowledgement of request `seq` in a netlink datagram
///
/// Returns `Ok(None)` if the datagram holds no acknowledgement for `seq`.
///
/// # Errors
/// Returns `InvalidData` for truncated or malformed messages
pub fn parse_ack(data: &[u8], seq: u32) -> io::Result<Option<io::Result<()>>> {
    let mut offset = 0;
    while offset < data.len() {
        let bytes = &data[offset..];
        let length = NetlinkBuffer::new_checked(bytes).map_err(invalid)?.length() as usize;
        let message = NetlinkMessage::<RouteNetlinkMessage>::deserialize(bytes).map_err(invalid)?;

        if message.header.sequence_number == seq {
            if let NetlinkPayload::Error(err) = message.payload {
                return Ok(Some(match err.code {
                    None => Ok(()),
                    Some(code) => Err(io::Error::from_raw_os_error(-code.get())),
                }));
            }
        }

        // NLMSG_ALIGN
        offset = offset.saturating_add((length + 3) & !3);
    }

    Ok(None)
}

fn invalid(e: impl std::fmt::Display) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("malformed netlink message: {e}"),
    )
}
