//! Framed transport.
//!
//! The request/response plane runs over one TCP connection per peer pair,
//! which gives send-order delivery between any client and server. Frames
//! are `length:u32 | channel:u32 | payload`. The fault plane uses UDP
//! datagrams carrying `channel:u32 | payload` directly.

use std::net::SocketAddr;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;

use super::protocol::{MAX_FRAME_BYTES, Message};

/// Writes one frame to a TCP stream.
pub async fn send_frame(stream: &mut TcpStream, channel: u32, message: &Message) -> Result<()> {
    let payload = message.encode();
    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.extend_from_slice(&((payload.len() as u32 + 4).to_le_bytes()));
    frame.extend_from_slice(&channel.to_le_bytes());
    frame.extend_from_slice(&payload);

    stream.write_all(&frame).await.context("writing frame")?;
    Ok(())
}

/// Reads one frame from a TCP stream. Returns the channel it arrived on
/// plus the decoded message.
pub async fn recv_frame(stream: &mut TcpStream) -> Result<(u32, Message)> {
    let mut len_bytes = [0u8; 4];
    stream
        .read_exact(&mut len_bytes)
        .await
        .context("reading frame length")?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len < 4 || len > MAX_FRAME_BYTES {
        bail!("invalid frame length {}", len);
    }

    let mut body = vec![0u8; len];
    stream
        .read_exact(&mut body)
        .await
        .context("reading frame body")?;

    let channel = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
    let message = Message::decode(&body[4..])?;
    Ok((channel, message))
}

/// Sends one datagram on the fault plane.
pub async fn send_datagram(
    socket: &UdpSocket,
    addr: SocketAddr,
    channel: u32,
    message: &Message,
) -> Result<()> {
    let payload = message.encode();
    let mut datagram = Vec::with_capacity(4 + payload.len());
    datagram.extend_from_slice(&channel.to_le_bytes());
    datagram.extend_from_slice(&payload);

    socket
        .send_to(&datagram, addr)
        .await
        .with_context(|| format!("sending datagram to {}", addr))?;
    Ok(())
}

/// Decodes a received datagram into its channel and message.
pub fn parse_datagram(datagram: &[u8]) -> Result<(u32, Message)> {
    if datagram.len() < 4 {
        bail!("datagram too short for a channel header");
    }
    let channel = u32::from_le_bytes([datagram[0], datagram[1], datagram[2], datagram[3]]);
    let message = Message::decode(&datagram[4..])?;
    Ok((channel, message))
}

/// One request/response connection to a peer. The stream is serialized
/// behind a mutex so concurrent callers cannot interleave frames.
pub struct Connection {
    addr: SocketAddr,
    stream: Mutex<TcpStream>,
}

impl Connection {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connecting to {}", addr))?;

        Ok(Self {
            addr,
            stream: Mutex::new(stream),
        })
    }

    /// Sends a request and waits for the peer's reply frame. A received
    /// `ErrorResponse` is raised as an error at the call site.
    pub async fn request(&self, channel: u32, message: &Message) -> Result<Message> {
        let mut stream = self.stream.lock().await;
        send_frame(&mut stream, channel, message).await?;
        let (_, reply) = recv_frame(&mut stream).await?;

        if let Message::ErrorResponse { message } = &reply {
            bail!("peer {} reported an error: {}", self.addr, message);
        }
        Ok(reply)
    }
}
