// src/query.rs
use async_trait::async_trait;
use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, warn};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;

use crate::models::server::QueryResponse;

const MAGIC: &[u8; 4] = b"SAMP";
const HEADER_LEN: usize = 11;
const OPCODE_INFO: u8 = b'i';
const OPCODE_RULES: u8 = b'r';

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Could not resolve {0} to an IPv4 address")]
    Unresolved(String),
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Response came from unexpected peer {0}")]
    UnexpectedPeer(SocketAddr),
    #[error("Response header does not match request")]
    BadHeader,
    #[error("Response truncated")]
    Truncated,
}

/// Source of game-server snapshots.
#[async_trait]
pub trait ServerQuery: Send + Sync {
    async fn query(&self) -> Result<QueryResponse, QueryError>;
}

/// UDP query client for SA-MP compatible servers.
pub struct SampQuery {
    host: String,
    port: u16,
    timeout: Duration,
}

impl SampQuery {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    async fn resolve(&self) -> Result<SocketAddrV4, QueryError> {
        let target = format!("{}:{}", self.host, self.port);
        let addrs = tokio::net::lookup_host(target.as_str()).await?;
        for addr in addrs {
            if let SocketAddr::V4(v4) = addr {
                return Ok(v4);
            }
        }
        Err(QueryError::Unresolved(target))
    }

    async fn exchange(
        &self,
        socket: &UdpSocket,
        addr: SocketAddrV4,
        opcode: u8,
    ) -> Result<Vec<u8>, QueryError> {
        let packet = build_packet(&addr, opcode);
        socket.send_to(&packet, SocketAddr::V4(addr)).await?;
        debug!("Sent '{}' query to {}", opcode as char, addr);

        let mut buffer = [0u8; 2048];
        let (len, peer) = match tokio::time::timeout(self.timeout, socket.recv_from(&mut buffer)).await {
            Ok(Ok(received)) => received,
            Ok(Err(e)) => return Err(QueryError::Io(e)),
            Err(_) => return Err(QueryError::Timeout(self.timeout)),
        };

        if peer != SocketAddr::V4(addr) {
            return Err(QueryError::UnexpectedPeer(peer));
        }
        if len < HEADER_LEN || buffer[..HEADER_LEN] != packet[..] {
            return Err(QueryError::BadHeader);
        }
        Ok(buffer[HEADER_LEN..len].to_vec())
    }
}

#[async_trait]
impl ServerQuery for SampQuery {
    async fn query(&self) -> Result<QueryResponse, QueryError> {
        let addr = self.resolve().await?;
        let socket = UdpSocket::bind("0.0.0.0:0").await?;

        let body = self.exchange(&socket, addr, OPCODE_INFO).await?;
        let mut response = parse_info(&body)?;

        // Rules only add map and clock; a server that ignores them is still online.
        match self.exchange(&socket, addr, OPCODE_RULES).await.and_then(|b| parse_rules(&b)) {
            Ok(rules) => {
                response.mapname = rules.get("mapname").cloned();
                response.worldtime = rules.get("worldtime").cloned();
            }
            Err(e) => warn!("Rules query to {} failed: {}", addr, e),
        }

        Ok(response)
    }
}

pub fn build_packet(addr: &SocketAddrV4, opcode: u8) -> Vec<u8> {
    let mut packet = Vec::with_capacity(HEADER_LEN);
    packet.extend_from_slice(MAGIC);
    packet.extend_from_slice(&addr.ip().octets());
    packet.extend_from_slice(&addr.port().to_le_bytes());
    packet.push(opcode);
    packet
}

pub fn parse_info(body: &[u8]) -> Result<QueryResponse, QueryError> {
    let mut cursor = Cursor::new(body);
    let passworded = cursor.read_u8().map_err(|_| QueryError::Truncated)? != 0;
    let players = cursor.read_u16::<LittleEndian>().map_err(|_| QueryError::Truncated)?;
    let maxplayers = cursor.read_u16::<LittleEndian>().map_err(|_| QueryError::Truncated)?;
    let hostname = read_string(&mut cursor, LenPrefix::U32)?;
    let gamemode = read_string(&mut cursor, LenPrefix::U32)?;
    let language = read_string(&mut cursor, LenPrefix::U32)?;

    Ok(QueryResponse {
        hostname,
        players,
        maxplayers,
        gamemode,
        language,
        mapname: None,
        worldtime: None,
        passworded,
    })
}

pub fn parse_rules(body: &[u8]) -> Result<HashMap<String, String>, QueryError> {
    let mut cursor = Cursor::new(body);
    let count = cursor.read_u16::<LittleEndian>().map_err(|_| QueryError::Truncated)?;
    let mut rules = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let name = read_string(&mut cursor, LenPrefix::U8)?;
        let value = read_string(&mut cursor, LenPrefix::U8)?;
        rules.insert(name, value);
    }
    Ok(rules)
}

enum LenPrefix {
    U8,
    U32,
}

fn read_string(cursor: &mut Cursor<&[u8]>, prefix: LenPrefix) -> Result<String, QueryError> {
    let len = match prefix {
        LenPrefix::U8 => cursor.read_u8().map(|v| v as usize),
        LenPrefix::U32 => cursor.read_u32::<LittleEndian>().map(|v| v as usize),
    }
    .map_err(|_| QueryError::Truncated)?;

    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if len > remaining {
        return Err(QueryError::Truncated);
    }
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes).map_err(|_| QueryError::Truncated)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
