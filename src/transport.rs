use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use crate::config::SERIAL_TIMEOUT_MS;

const TCP_CONNECT_TIMEOUT_MS: u64 = 2_000;

/// A byte-stream session to the vehicle. Dropping it closes the link.
pub trait Transport: Send {
    /// Copy whatever bytes are pending into `buf` without waiting.
    /// `Ok(0)` means nothing is pending right now.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Whether the link must send first before the vehicle will answer,
    /// as with a UDP peer that learns its reply address from the first
    /// datagram it receives.
    fn speaks_first(&self) -> bool {
        false
    }
}

/// Opens transports. The controller goes through this so that tests can
/// hand it scripted links.
pub trait Connector: Send {
    fn open(&self, address: &str, baud: u32) -> io::Result<Box<dyn Transport>>;
}

/// Parsed form of a connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAddress {
    /// `COM4`, `/dev/ttyACM0` or `serial:<path>`
    Serial(String),
    /// `tcp:<host>:<port>`
    Tcp(String),
    /// `udpin:<bind addr>:<port>`, replies go to the first peer heard from
    UdpIn(String),
    /// `udpout:<host>:<port>`
    UdpOut(String),
}

impl LinkAddress {
    pub fn parse(address: &str) -> io::Result<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(invalid_address("address is empty"));
        }

        let Some((scheme, rest)) = address.split_once(':') else {
            return Ok(LinkAddress::Serial(address.to_string()));
        };

        let parsed = match scheme.to_ascii_lowercase().as_str() {
            "serial" => LinkAddress::Serial(rest.to_string()),
            "tcp" => LinkAddress::Tcp(rest.to_string()),
            "udpin" => LinkAddress::UdpIn(rest.to_string()),
            "udpout" | "udp" => LinkAddress::UdpOut(rest.to_string()),
            other => {
                return Err(invalid_address(&format!(
                    "unknown scheme '{other}' in '{address}'"
                )));
            }
        };

        match &parsed {
            LinkAddress::Serial(path) if path.is_empty() => {
                Err(invalid_address("serial path is empty"))
            }
            LinkAddress::Tcp(endpoint) | LinkAddress::UdpIn(endpoint) | LinkAddress::UdpOut(endpoint)
                if !endpoint.contains(':') =>
            {
                Err(invalid_address(&format!("'{endpoint}' is missing a port")))
            }
            _ => Ok(parsed),
        }
    }
}

fn invalid_address(reason: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, reason.to_string())
}

fn resolve(endpoint: &str) -> io::Result<SocketAddr> {
    endpoint.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("'{endpoint}' did not resolve to any address"),
        )
    })
}

/// Opens real serial ports and sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConnector;

impl Connector for SystemConnector {
    fn open(&self, address: &str, baud: u32) -> io::Result<Box<dyn Transport>> {
        match LinkAddress::parse(address)? {
            LinkAddress::Serial(path) => Ok(Box::new(SerialTransport::open(&path, baud)?)),
            LinkAddress::Tcp(endpoint) => Ok(Box::new(TcpTransport::connect(&endpoint)?)),
            LinkAddress::UdpIn(endpoint) => Ok(Box::new(UdpTransport::listen(&endpoint)?)),
            LinkAddress::UdpOut(endpoint) => Ok(Box::new(UdpTransport::send_to(&endpoint)?)),
        }
    }
}

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(path: &str, baud: u32) -> io::Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(Duration::from_millis(SERIAL_TIMEOUT_MS))
            .open()?;
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pending = self.port.bytes_to_read()? as usize;
        if pending == 0 {
            return Ok(0);
        }

        let len = pending.min(buf.len());
        match self.port.read(&mut buf[..len]) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }
}

pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(endpoint: &str) -> io::Result<Self> {
        let addr = resolve(endpoint)?;
        let stream =
            TcpStream::connect_timeout(&addr, Duration::from_millis(TCP_CONNECT_TIMEOUT_MS))?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

impl Transport for TcpTransport {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.read(buf) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            )),
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)
    }
}

pub struct UdpTransport {
    socket: UdpSocket,
    /// Fixed for `udpout`. `udpin` keeps the first sender it hears from.
    peer: Option<SocketAddr>,
    outbound: bool,
}

impl UdpTransport {
    pub fn listen(endpoint: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind(resolve(endpoint)?)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            peer: None,
            outbound: false,
        })
    }

    pub fn send_to(endpoint: &str) -> io::Result<Self> {
        let peer = resolve(endpoint)?;
        let bind_addr: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            peer: Some(peer),
            outbound: true,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.socket.recv_from(buf) {
            Ok((n, from)) => {
                if self.peer.is_none() {
                    self.peer = Some(from);
                }
                Ok(n)
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        // Nothing to reply to until a peer has been heard from.
        let Some(peer) = self.peer else {
            return Ok(());
        };
        self.socket.send_to(bytes, peer)?;
        Ok(())
    }

    fn speaks_first(&self) -> bool {
        self.outbound
    }
}
