//! Packet catalogue and binary codec.
//!
//! A frame body is `packet id:u16` followed by the packet payload, all
//! big-endian. Decoding an unknown id is fatal for the connection; a corrupt
//! or truncated packet only costs that packet.

use glam::{Vec2, Vec3};
use strata_voxel::{BlockId, ByteReader, ChunkCodecError, Face, Vec3i};
use strata_world::{PlayerState, RaycastHit};

use crate::chunk_packet::ChunkDataPacket;
use crate::compression::CompressionError;
use crate::framing::MAX_FRAME_LEN;

/// Wire ids of every packet kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PacketId {
    EstablishConnection = 0,
    PosRotUpdate = 1,
    SpawnPlayer = 2,
    KillPlayer = 3,
    ChunkData = 4,
    PlaceBlock = 5,
    BreakBlock = 6,
    LoadColumnRequest = 7,
}

impl PacketId {
    /// Maps a wire id to its packet kind.
    pub fn from_u16(id: u16) -> Option<Self> {
        Some(match id {
            0 => Self::EstablishConnection,
            1 => Self::PosRotUpdate,
            2 => Self::SpawnPlayer,
            3 => Self::KillPlayer,
            4 => Self::ChunkData,
            5 => Self::PlaceBlock,
            6 => Self::BreakBlock,
            7 => Self::LoadColumnRequest,
            _ => return None,
        })
    }
}

/// Errors that can occur while encoding or decoding a packet.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// The packet id is not in the catalogue. The stream can no longer be
    /// trusted.
    #[error("unknown packet id {0}")]
    UnknownPacketId(u16),
    /// The body ended before the packet did.
    #[error("packet truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes the next field needed.
        expected: usize,
        /// Bytes that were left.
        actual: usize,
    },
    /// Chunk or column data failed to decompress or validate.
    #[error("corrupt chunk payload: {0}")]
    CorruptChunkPayload(String),
    /// The encoded packet does not fit in one frame.
    #[error("packet of {0} does not fit in one frame")]
    FrameTooLarge(usize),
    /// A raycast hit named a face outside `0..6`.
    #[error("invalid face {0}")]
    InvalidFace(u8),
}

impl PacketError {
    /// Returns `true` if the connection that produced this error must be
    /// dropped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnknownPacketId(_))
    }
}

impl From<ChunkCodecError> for PacketError {
    fn from(e: ChunkCodecError) -> Self {
        match e {
            ChunkCodecError::Truncated { expected, actual } => Self::Truncated { expected, actual },
            other => Self::CorruptChunkPayload(other.to_string()),
        }
    }
}

impl From<CompressionError> for PacketError {
    fn from(e: CompressionError) -> Self {
        Self::CorruptChunkPayload(e.to_string())
    }
}

/// Every message exchanged between client and server.
#[derive(Debug)]
pub enum Packet {
    /// Server to client: the connection is accepted and has this id.
    EstablishConnection { client_id: u32 },
    /// Kinematic state of one player.
    PosRotUpdate(PlayerState),
    /// A player joined.
    SpawnPlayer { client_id: u32 },
    /// A player left.
    KillPlayer { client_id: u32 },
    /// Column contents.
    ChunkData(ChunkDataPacket),
    /// A block was placed against `hit`.
    PlaceBlock {
        client_id: u32,
        hit: RaycastHit,
        block: BlockId,
    },
    /// The block at `hit` was broken.
    BreakBlock { client_id: u32, hit: RaycastHit },
    /// Client to server: send column `(x, z)`.
    LoadColumnRequest { x: i32, z: i32 },
}

impl Packet {
    /// Wire id of this packet.
    pub fn id(&self) -> PacketId {
        match self {
            Self::EstablishConnection { .. } => PacketId::EstablishConnection,
            Self::PosRotUpdate(_) => PacketId::PosRotUpdate,
            Self::SpawnPlayer { .. } => PacketId::SpawnPlayer,
            Self::KillPlayer { .. } => PacketId::KillPlayer,
            Self::ChunkData(_) => PacketId::ChunkData,
            Self::PlaceBlock { .. } => PacketId::PlaceBlock,
            Self::BreakBlock { .. } => PacketId::BreakBlock,
            Self::LoadColumnRequest { .. } => PacketId::LoadColumnRequest,
        }
    }

    /// Encodes the frame body: packet id followed by the payload.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::FrameTooLarge`] if the result would not fit in
    /// one frame. Use [`encode_column_packets`](crate::encode_column_packets)
    /// to split large columns.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let mut out = Vec::with_capacity(64);
        out.extend_from_slice(&(self.id() as u16).to_be_bytes());
        match self {
            Self::EstablishConnection { client_id }
            | Self::SpawnPlayer { client_id }
            | Self::KillPlayer { client_id } => {
                out.extend_from_slice(&client_id.to_be_bytes());
            }
            Self::PosRotUpdate(state) => write_player_state(&mut out, state),
            Self::ChunkData(data) => data.write_body(&mut out)?,
            Self::PlaceBlock {
                client_id,
                hit,
                block,
            } => {
                out.extend_from_slice(&client_id.to_be_bytes());
                write_hit(&mut out, hit);
                out.push(block.0 as u8);
            }
            Self::BreakBlock { client_id, hit } => {
                out.extend_from_slice(&client_id.to_be_bytes());
                write_hit(&mut out, hit);
            }
            Self::LoadColumnRequest { x, z } => {
                out.extend_from_slice(&x.to_be_bytes());
                out.extend_from_slice(&z.to_be_bytes());
            }
        }
        if out.len() > MAX_FRAME_LEN {
            return Err(PacketError::FrameTooLarge(out.len()));
        }
        Ok(out)
    }

    /// Decodes a frame body.
    pub fn decode(body: &[u8]) -> Result<Packet, PacketError> {
        let mut reader = ByteReader::new(body);
        let raw_id = reader.read_u16()?;
        let id = PacketId::from_u16(raw_id).ok_or(PacketError::UnknownPacketId(raw_id))?;
        let packet = match id {
            PacketId::EstablishConnection => Self::EstablishConnection {
                client_id: reader.read_u32()?,
            },
            PacketId::PosRotUpdate => Self::PosRotUpdate(read_player_state(&mut reader)?),
            PacketId::SpawnPlayer => Self::SpawnPlayer {
                client_id: reader.read_u32()?,
            },
            PacketId::KillPlayer => Self::KillPlayer {
                client_id: reader.read_u32()?,
            },
            PacketId::ChunkData => Self::ChunkData(ChunkDataPacket::read_body(&mut reader)?),
            PacketId::PlaceBlock => Self::PlaceBlock {
                client_id: reader.read_u32()?,
                hit: read_hit(&mut reader)?,
                block: BlockId(reader.read_i8()?),
            },
            PacketId::BreakBlock => Self::BreakBlock {
                client_id: reader.read_u32()?,
                hit: read_hit(&mut reader)?,
            },
            PacketId::LoadColumnRequest => Self::LoadColumnRequest {
                x: reader.read_i32()?,
                z: reader.read_i32()?,
            },
        };
        if reader.remaining() > 0 {
            tracing::trace!(
                "Ignoring {} trailing bytes after {:?}",
                reader.remaining(),
                id
            );
        }
        Ok(packet)
    }
}

fn write_vec3(out: &mut Vec<u8>, v: Vec3) {
    for c in v.to_array() {
        out.extend_from_slice(&c.to_be_bytes());
    }
}

fn read_vec3(reader: &mut ByteReader<'_>) -> Result<Vec3, PacketError> {
    Ok(Vec3::new(reader.read_f32()?, reader.read_f32()?, reader.read_f32()?))
}

fn write_player_state(out: &mut Vec<u8>, state: &PlayerState) {
    out.extend_from_slice(&state.client_id.to_be_bytes());
    write_vec3(out, state.position);
    write_vec3(out, state.velocity);
    write_vec3(out, state.acceleration);
    out.extend_from_slice(&state.rotation.x.to_be_bytes());
    out.extend_from_slice(&state.rotation.y.to_be_bytes());
    out.push(state.flags);
}

fn read_player_state(reader: &mut ByteReader<'_>) -> Result<PlayerState, PacketError> {
    Ok(PlayerState {
        client_id: reader.read_u32()?,
        position: read_vec3(reader)?,
        velocity: read_vec3(reader)?,
        acceleration: read_vec3(reader)?,
        rotation: Vec2::new(reader.read_f32()?, reader.read_f32()?),
        flags: reader.read_u8()?,
    })
}

fn write_hit(out: &mut Vec<u8>, hit: &RaycastHit) {
    out.extend_from_slice(&hit.block.x.to_be_bytes());
    out.extend_from_slice(&hit.block.y.to_be_bytes());
    out.extend_from_slice(&hit.block.z.to_be_bytes());
    out.push(hit.face as u8);
}

fn read_hit(reader: &mut ByteReader<'_>) -> Result<RaycastHit, PacketError> {
    let block = Vec3i::new(reader.read_i32()?, reader.read_i32()?, reader.read_i32()?);
    let raw_face = reader.read_u8()?;
    let face = Face::from_u8(raw_face).ok_or(PacketError::InvalidFace(raw_face))?;
    Ok(RaycastHit { block, face })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
