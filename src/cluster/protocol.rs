//! Wire Protocol
//!
//! Length-framed binary records exchanged between cluster processes.
//! Every payload starts with a `u32` type tag followed by type-specific
//! fields. Strings travel as a `u64` byte length plus UTF-8 bytes;
//! object-id vectors as a `u64` count plus `i32`s; booleans as one byte.
//! All integers are little-endian. The frame header on the TCP plane is
//! `length:u32 | channel:u32`; datagrams on the UDP fault plane carry
//! `channel:u32 | payload` without the length prefix.
//!
//! Semantic channels partition the transport so receivers can select by
//! concern: admin=1, index=2, query=3, result=4, fault=5.

use anyhow::{Result, bail};
use bytes::{Buf, BufMut, BytesMut};

use crate::index::ObjectId;

pub const ADMIN_CHANNEL: u32 = 1;
pub const INDEX_CHANNEL: u32 = 2;
pub const QUERY_CHANNEL: u32 = 3;
pub const RESULT_CHANNEL: u32 = 4;
pub const FAULT_CHANNEL: u32 = 5;

/// Hard cap on a single frame; anything larger is a corrupt stream.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// The cluster message taxonomy. Tags 1-12 are the core set; 13-15 extend
/// it with the bully-election messages carried on the fault plane.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    CreateIndex {
        key: String,
        value: String,
        object_id: ObjectId,
    },
    DeleteIndex {
        key: String,
        value: String,
        object_id: ObjectId,
    },
    Query {
        query: String,
    },
    Checkpoint,
    Recover,
    Shutdown,
    Response {
        success: bool,
        results: Vec<ObjectId>,
    },
    ErrorResponse {
        message: String,
    },
    Heartbeat {
        sender_id: i32,
        timestamp_ms: i64,
    },
    ServerFailure {
        failed_server_id: i32,
    },
    RecoveryRequest {
        failed_server_id: i32,
        coordinator_id: i32,
    },
    RecoveryComplete {
        failed_server_id: i32,
        success: bool,
    },
    Election {
        sender_id: i32,
    },
    ElectionAlive {
        sender_id: i32,
    },
    Victory {
        sender_id: i32,
    },
}

impl Message {
    pub fn type_tag(&self) -> u32 {
        match self {
            Message::CreateIndex { .. } => 1,
            Message::DeleteIndex { .. } => 2,
            Message::Query { .. } => 3,
            Message::Checkpoint => 4,
            Message::Recover => 5,
            Message::Shutdown => 6,
            Message::Response { .. } => 7,
            Message::ErrorResponse { .. } => 8,
            Message::Heartbeat { .. } => 9,
            Message::ServerFailure { .. } => 10,
            Message::RecoveryRequest { .. } => 11,
            Message::RecoveryComplete { .. } => 12,
            Message::Election { .. } => 13,
            Message::ElectionAlive { .. } => 14,
            Message::Victory { .. } => 15,
        }
    }

    /// The semantic channel a message naturally travels on.
    pub fn channel(&self) -> u32 {
        match self {
            Message::CreateIndex { .. } | Message::DeleteIndex { .. } => INDEX_CHANNEL,
            Message::Query { .. } => QUERY_CHANNEL,
            Message::Checkpoint
            | Message::Recover
            | Message::Shutdown
            | Message::RecoveryRequest { .. } => ADMIN_CHANNEL,
            Message::Response { .. } | Message::ErrorResponse { .. } => RESULT_CHANNEL,
            Message::Heartbeat { .. }
            | Message::ServerFailure { .. }
            | Message::RecoveryComplete { .. }
            | Message::Election { .. }
            | Message::ElectionAlive { .. }
            | Message::Victory { .. } => FAULT_CHANNEL,
        }
    }

    /// Serializes the tagged payload (without any frame header).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u32_le(self.type_tag());

        match self {
            Message::CreateIndex {
                key,
                value,
                object_id,
            }
            | Message::DeleteIndex {
                key,
                value,
                object_id,
            } => {
                put_string(&mut buf, key);
                put_string(&mut buf, value);
                buf.put_i32_le(*object_id);
            }
            Message::Query { query } => put_string(&mut buf, query),
            Message::Checkpoint | Message::Recover | Message::Shutdown => {}
            Message::Response { success, results } => {
                buf.put_u8(*success as u8);
                buf.put_u64_le(results.len() as u64);
                for id in results {
                    buf.put_i32_le(*id);
                }
            }
            Message::ErrorResponse { message } => put_string(&mut buf, message),
            Message::Heartbeat {
                sender_id,
                timestamp_ms,
            } => {
                buf.put_i32_le(*sender_id);
                buf.put_i64_le(*timestamp_ms);
            }
            Message::ServerFailure { failed_server_id } => {
                buf.put_i32_le(*failed_server_id);
            }
            Message::RecoveryRequest {
                failed_server_id,
                coordinator_id,
            } => {
                buf.put_i32_le(*failed_server_id);
                buf.put_i32_le(*coordinator_id);
            }
            Message::RecoveryComplete {
                failed_server_id,
                success,
            } => {
                buf.put_i32_le(*failed_server_id);
                buf.put_u8(*success as u8);
            }
            Message::Election { sender_id }
            | Message::ElectionAlive { sender_id }
            | Message::Victory { sender_id } => {
                buf.put_i32_le(*sender_id);
            }
        }

        buf.to_vec()
    }

    /// Deserializes a tagged payload.
    pub fn decode(mut buf: &[u8]) -> Result<Message> {
        let tag = get_u32(&mut buf)?;

        let message = match tag {
            1 | 2 => {
                let key = get_string(&mut buf)?;
                let value = get_string(&mut buf)?;
                let object_id = get_i32(&mut buf)?;
                if tag == 1 {
                    Message::CreateIndex {
                        key,
                        value,
                        object_id,
                    }
                } else {
                    Message::DeleteIndex {
                        key,
                        value,
                        object_id,
                    }
                }
            }
            3 => Message::Query {
                query: get_string(&mut buf)?,
            },
            4 => Message::Checkpoint,
            5 => Message::Recover,
            6 => Message::Shutdown,
            7 => {
                let success = get_bool(&mut buf)?;
                let count = get_u64(&mut buf)? as usize;
                if count > MAX_FRAME_BYTES / 4 {
                    bail!("result vector length {} exceeds frame limit", count);
                }
                let mut results = Vec::with_capacity(count);
                for _ in 0..count {
                    results.push(get_i32(&mut buf)?);
                }
                Message::Response { success, results }
            }
            8 => Message::ErrorResponse {
                message: get_string(&mut buf)?,
            },
            9 => Message::Heartbeat {
                sender_id: get_i32(&mut buf)?,
                timestamp_ms: get_i64(&mut buf)?,
            },
            10 => Message::ServerFailure {
                failed_server_id: get_i32(&mut buf)?,
            },
            11 => Message::RecoveryRequest {
                failed_server_id: get_i32(&mut buf)?,
                coordinator_id: get_i32(&mut buf)?,
            },
            12 => Message::RecoveryComplete {
                failed_server_id: get_i32(&mut buf)?,
                success: get_bool(&mut buf)?,
            },
            13 => Message::Election {
                sender_id: get_i32(&mut buf)?,
            },
            14 => Message::ElectionAlive {
                sender_id: get_i32(&mut buf)?,
            },
            15 => Message::Victory {
                sender_id: get_i32(&mut buf)?,
            },
            other => bail!("unexpected message type tag {}", other),
        };

        Ok(message)
    }
}

fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_u64_le(s.len() as u64);
    buf.put_slice(s.as_bytes());
}

fn get_u32(buf: &mut &[u8]) -> Result<u32> {
    if buf.remaining() < 4 {
        bail!("truncated message: expected u32");
    }
    Ok(buf.get_u32_le())
}

fn get_u64(buf: &mut &[u8]) -> Result<u64> {
    if buf.remaining() < 8 {
        bail!("truncated message: expected u64");
    }
    Ok(buf.get_u64_le())
}

fn get_i32(buf: &mut &[u8]) -> Result<i32> {
    if buf.remaining() < 4 {
        bail!("truncated message: expected i32");
    }
    Ok(buf.get_i32_le())
}

fn get_i64(buf: &mut &[u8]) -> Result<i64> {
    if buf.remaining() < 8 {
        bail!("truncated message: expected i64");
    }
    Ok(buf.get_i64_le())
}

fn get_bool(buf: &mut &[u8]) -> Result<bool> {
    if buf.remaining() < 1 {
        bail!("truncated message: expected bool");
    }
    Ok(buf.get_u8() != 0)
}

fn get_string(buf: &mut &[u8]) -> Result<String> {
    let len = get_u64(buf)? as usize;
    if len > MAX_FRAME_BYTES {
        bail!("string length {} exceeds frame limit", len);
    }
    if buf.remaining() < len {
        bail!("truncated message: expected {} string bytes", len);
    }
    let bytes = buf.copy_to_bytes(len);
    Ok(String::from_utf8(bytes.to_vec())?)
}
