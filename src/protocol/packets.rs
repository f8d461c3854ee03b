//! Packet definitions module
//!
//! Defines the outbound packets that matter for item visibility and their wire
//! format. Every frame is `[opcode: u8][length: u16][payload]`.

use bytes::Bytes;

use crate::host::entity::{EntityId, EntityUuid, ItemStack, Location};
use crate::net::buffer::{PacketBuffer, MAX_PACKET_SIZE};

/// Size of the frame header (opcode + length)
pub const FRAME_HEADER_SIZE: usize = 3;

/// Packet size type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketSize {
    /// Fixed size packet
    Fixed(usize),
    /// Variable size (2 byte length prefix)
    VariableShort,
}

impl PacketSize {
    /// Get the fixed size value, if applicable
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            PacketSize::Fixed(size) => Some(*size),
            PacketSize::VariableShort => None,
        }
    }
}

/// Outgoing packet trait
pub trait OutgoingPacket: Sized {
    /// The packet opcode
    const OPCODE: u8;

    /// The packet size type
    const SIZE: PacketSize;

    /// Encode the packet payload to a buffer
    fn encode(&self, buffer: &mut PacketBuffer);

    /// Decode the packet payload from a buffer
    fn decode(buffer: &mut PacketBuffer) -> Result<Self, PacketDecodeError>;

    /// Encode to a new buffer
    fn to_buffer(&self) -> PacketBuffer {
        let mut buffer = PacketBuffer::with_capacity(64);
        self.encode(&mut buffer);
        buffer
    }
}

/// Packet decode error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketDecodeError {
    /// Not enough data in buffer
    InsufficientData { expected: usize, actual: usize },
    /// Invalid field value
    InvalidValue { field: String, value: String },
    /// Opcode does not match any known packet
    UnknownOpcode(u8),
    /// Malformed packet structure
    Malformed(String),
}

impl std::fmt::Display for PacketDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketDecodeError::InsufficientData { expected, actual } => {
                write!(
                    f,
                    "Insufficient data: expected {} bytes, got {}",
                    expected, actual
                )
            }
            PacketDecodeError::InvalidValue { field, value } => {
                write!(f, "Invalid value for field '{}': {}", field, value)
            }
            PacketDecodeError::UnknownOpcode(opcode) => {
                write!(f, "Unknown opcode: {}", opcode)
            }
            PacketDecodeError::Malformed(msg) => {
                write!(f, "Malformed packet: {}", msg)
            }
        }
    }
}

impl std::error::Error for PacketDecodeError {}

/// Kind of entity announced by a spawn packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Item,
    Player,
    Mob,
    Other(u8),
}

impl EntityKind {
    pub fn as_u8(self) -> u8 {
        match self {
            EntityKind::Item => 1,
            EntityKind::Player => 2,
            EntityKind::Mob => 3,
            EntityKind::Other(raw) => raw,
        }
    }

    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => EntityKind::Item,
            2 => EntityKind::Player,
            3 => EntityKind::Mob,
            other => EntityKind::Other(other),
        }
    }
}

// ============ Entity Packets ============

/// Announces an entity to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnEntityPacket {
    pub entity_id: EntityId,
    pub uuid: EntityUuid,
    pub kind: EntityKind,
    pub location: Location,
}

impl OutgoingPacket for SpawnEntityPacket {
    const OPCODE: u8 = 1;
    const SIZE: PacketSize = PacketSize::Fixed(4 + 16 + 1 + 12);

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_int(self.entity_id.0);
        buffer.write_uuid(&self.uuid.0);
        buffer.write_ubyte(self.kind.as_u8());
        buffer.write_int(self.location.x);
        buffer.write_int(self.location.y);
        buffer.write_int(self.location.z);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, PacketDecodeError> {
        let entity_id = EntityId(buffer.read_int()?);
        let uuid = EntityUuid(buffer.read_uuid()?);
        let kind = EntityKind::from_u8(buffer.read_ubyte()?);
        let location = Location::new(buffer.read_int()?, buffer.read_int()?, buffer.read_int()?);
        Ok(Self {
            entity_id,
            uuid,
            kind,
            location,
        })
    }
}

/// A single entity metadata value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Byte(u8),
    Bool(bool),
    Item(ItemStack),
    Text(String),
}

impl MetadataValue {
    fn type_id(&self) -> u8 {
        match self {
            MetadataValue::Byte(_) => 0,
            MetadataValue::Bool(_) => 1,
            MetadataValue::Item(_) => 2,
            MetadataValue::Text(_) => 3,
        }
    }
}

/// Indexed metadata entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub index: u8,
    pub value: MetadataValue,
}

/// Index terminating a metadata list
const METADATA_END: u8 = 0xff;

/// Metadata flag byte index and its glowing bit
pub const METADATA_FLAGS_INDEX: u8 = 0;
pub const METADATA_FLAG_GLOWING: u8 = 0x40;

/// Updates entity metadata (item stack, flags, custom name)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadataPacket {
    pub entity_id: EntityId,
    pub entries: Vec<MetadataEntry>,
}

impl EntityMetadataPacket {
    /// Metadata describing a dropped item stack
    pub fn for_item(entity_id: EntityId, stack: ItemStack) -> Self {
        Self {
            entity_id,
            entries: vec![MetadataEntry {
                index: 8,
                value: MetadataValue::Item(stack),
            }],
        }
    }
}

impl OutgoingPacket for EntityMetadataPacket {
    const OPCODE: u8 = 2;
    const SIZE: PacketSize = PacketSize::VariableShort;

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_int(self.entity_id.0);
        for entry in &self.entries {
            buffer.write_ubyte(entry.index);
            buffer.write_ubyte(entry.value.type_id());
            match &entry.value {
                MetadataValue::Byte(value) => buffer.write_ubyte(*value),
                MetadataValue::Bool(value) => buffer.write_ubyte(u8::from(*value)),
                MetadataValue::Item(stack) => {
                    buffer.write_ushort(stack.item_id);
                    buffer.write_uint(stack.amount);
                }
                MetadataValue::Text(text) => buffer.write_string(text),
            }
        }
        buffer.write_ubyte(METADATA_END);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, PacketDecodeError> {
        let entity_id = EntityId(buffer.read_int()?);
        let mut entries = Vec::new();
        loop {
            let index = buffer.read_ubyte()?;
            if index == METADATA_END {
                break;
            }
            let value = match buffer.read_ubyte()? {
                0 => MetadataValue::Byte(buffer.read_ubyte()?),
                1 => MetadataValue::Bool(buffer.read_ubyte()? != 0),
                2 => MetadataValue::Item(ItemStack::new(buffer.read_ushort()?, buffer.read_uint()?)),
                3 => MetadataValue::Text(buffer.read_string()?),
                other => {
                    return Err(PacketDecodeError::InvalidValue {
                        field: "metadata type".to_string(),
                        value: other.to_string(),
                    })
                }
            };
            entries.push(MetadataEntry { index, value });
        }
        Ok(Self { entity_id, entries })
    }
}

/// Removes entities from a client's view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyEntitiesPacket {
    pub entity_ids: Vec<EntityId>,
}

impl DestroyEntitiesPacket {
    pub fn single(entity_id: EntityId) -> Self {
        Self {
            entity_ids: vec![entity_id],
        }
    }
}

impl OutgoingPacket for DestroyEntitiesPacket {
    const OPCODE: u8 = 3;
    const SIZE: PacketSize = PacketSize::VariableShort;

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_ushort(self.entity_ids.len() as u16);
        for id in &self.entity_ids {
            buffer.write_int(id.0);
        }
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, PacketDecodeError> {
        let count = buffer.read_ushort()? as usize;
        let mut entity_ids = Vec::with_capacity(count.min(256));
        for _ in 0..count {
            entity_ids.push(EntityId(buffer.read_int()?));
        }
        Ok(Self { entity_ids })
    }
}

// ============ Chat Packets ============

/// Send a system message to the player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemMessagePacket {
    pub message: String,
}

/// Longest message that still fits in one frame (payload minus the length prefix)
pub const MAX_MESSAGE_BYTES: usize = MAX_PACKET_SIZE - 2;

impl SystemMessagePacket {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl OutgoingPacket for SystemMessagePacket {
    const OPCODE: u8 = 4;
    const SIZE: PacketSize = PacketSize::VariableShort;

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_string_limited(&self.message, MAX_MESSAGE_BYTES);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, PacketDecodeError> {
        Ok(Self {
            message: buffer.read_string()?,
        })
    }
}

// ============ Outbound Envelope ============

/// Kind of an outbound packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    SpawnEntity,
    EntityMetadata,
    DestroyEntities,
    SystemMessage,
}

impl PacketKind {
    pub fn opcode(self) -> u8 {
        match self {
            PacketKind::SpawnEntity => SpawnEntityPacket::OPCODE,
            PacketKind::EntityMetadata => EntityMetadataPacket::OPCODE,
            PacketKind::DestroyEntities => DestroyEntitiesPacket::OPCODE,
            PacketKind::SystemMessage => SystemMessagePacket::OPCODE,
        }
    }

    pub fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            SpawnEntityPacket::OPCODE => Some(PacketKind::SpawnEntity),
            EntityMetadataPacket::OPCODE => Some(PacketKind::EntityMetadata),
            DestroyEntitiesPacket::OPCODE => Some(PacketKind::DestroyEntities),
            SystemMessagePacket::OPCODE => Some(PacketKind::SystemMessage),
            _ => None,
        }
    }
}

/// Any packet the server sends to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPacket {
    SpawnEntity(SpawnEntityPacket),
    EntityMetadata(EntityMetadataPacket),
    DestroyEntities(DestroyEntitiesPacket),
    SystemMessage(SystemMessagePacket),
}

impl OutboundPacket {
    pub fn kind(&self) -> PacketKind {
        match self {
            OutboundPacket::SpawnEntity(_) => PacketKind::SpawnEntity,
            OutboundPacket::EntityMetadata(_) => PacketKind::EntityMetadata,
            OutboundPacket::DestroyEntities(_) => PacketKind::DestroyEntities,
            OutboundPacket::SystemMessage(_) => PacketKind::SystemMessage,
        }
    }

    /// Entity the packet describes, for single-entity packets
    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            OutboundPacket::SpawnEntity(p) => Some(p.entity_id),
            OutboundPacket::EntityMetadata(p) => Some(p.entity_id),
            OutboundPacket::DestroyEntities(_) | OutboundPacket::SystemMessage(_) => None,
        }
    }

    /// Encode the payload without the frame header
    pub fn encode_payload(&self) -> PacketBuffer {
        match self {
            OutboundPacket::SpawnEntity(p) => p.to_buffer(),
            OutboundPacket::EntityMetadata(p) => p.to_buffer(),
            OutboundPacket::DestroyEntities(p) => p.to_buffer(),
            OutboundPacket::SystemMessage(p) => p.to_buffer(),
        }
    }

    /// Encode a full frame ready for the socket
    pub fn encode_frame(&self) -> Bytes {
        let payload = self.encode_payload();
        // Every payload is bounded by its encoder
        debug_assert!(payload.len() <= MAX_PACKET_SIZE);
        let mut frame = PacketBuffer::with_capacity(FRAME_HEADER_SIZE + payload.len());
        frame.write_ubyte(self.kind().opcode());
        frame.write_ushort(payload.len() as u16);
        frame.write_bytes(payload.as_bytes());
        frame.freeze()
    }

    /// Decode a payload for a known opcode
    pub fn decode_payload(opcode: u8, payload: &[u8]) -> Result<Self, PacketDecodeError> {
        let mut buffer = PacketBuffer::from_bytes(payload);
        let packet = match PacketKind::from_opcode(opcode) {
            Some(PacketKind::SpawnEntity) => {
                OutboundPacket::SpawnEntity(SpawnEntityPacket::decode(&mut buffer)?)
            }
            Some(PacketKind::EntityMetadata) => {
                OutboundPacket::EntityMetadata(EntityMetadataPacket::decode(&mut buffer)?)
            }
            Some(PacketKind::DestroyEntities) => {
                OutboundPacket::DestroyEntities(DestroyEntitiesPacket::decode(&mut buffer)?)
            }
            Some(PacketKind::SystemMessage) => {
                OutboundPacket::SystemMessage(SystemMessagePacket::decode(&mut buffer)?)
            }
            None => return Err(PacketDecodeError::UnknownOpcode(opcode)),
        };
        Ok(packet)
    }

    /// Decode a full frame
    pub fn decode_frame(frame: &[u8]) -> Result<Self, PacketDecodeError> {
        let mut buffer = PacketBuffer::from_bytes(frame);
        let opcode = buffer.read_ubyte()?;
        let length = buffer.read_ushort()? as usize;
        let payload = buffer.read_bytes(length)?;
        Self::decode_payload(opcode, &payload)
    }
}

impl From<SpawnEntityPacket> for OutboundPacket {
    fn from(packet: SpawnEntityPacket) -> Self {
        OutboundPacket::SpawnEntity(packet)
    }
}

impl From<EntityMetadataPacket> for OutboundPacket {
    fn from(packet: EntityMetadataPacket) -> Self {
        OutboundPacket::EntityMetadata(packet)
    }
}

impl From<DestroyEntitiesPacket> for OutboundPacket {
    fn from(packet: DestroyEntitiesPacket) -> Self {
        OutboundPacket::DestroyEntities(packet)
    }
}

impl From<SystemMessagePacket> for OutboundPacket {
    fn from(packet: SystemMessagePacket) -> Self {
        OutboundPacket::SystemMessage(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_packet() -> SpawnEntityPacket {
        SpawnEntityPacket {
            entity_id: EntityId(17),
            uuid: EntityUuid::new_v4(),
            kind: EntityKind::Item,
            location: Location::new(10, 64, -3),
        }
    }

    #[test]
    fn test_spawn_frame_layout() {
        let packet = OutboundPacket::from(spawn_packet());
        let frame = packet.encode_frame();

        assert_eq!(frame[0], SpawnEntityPacket::OPCODE);
        let length = u16::from_be_bytes([frame[1], frame[2]]) as usize;
        assert_eq!(Some(length), SpawnEntityPacket::SIZE.fixed_size());
        assert_eq!(frame.len(), FRAME_HEADER_SIZE + length);
        // Entity id leads the payload
        assert_eq!(&frame[3..7], &17i32.to_be_bytes());

        assert_eq!(OutboundPacket::decode_frame(&frame).unwrap(), packet);
    }

    #[test]
    fn test_metadata_decode() {
        let packet = EntityMetadataPacket {
            entity_id: EntityId(5),
            entries: vec![
                MetadataEntry {
                    index: METADATA_FLAGS_INDEX,
                    value: MetadataValue::Byte(METADATA_FLAG_GLOWING),
                },
                MetadataEntry {
                    index: 2,
                    value: MetadataValue::Text("Sword".to_string()),
                },
            ],
        };
        let mut buffer = packet.to_buffer();
        let decoded = EntityMetadataPacket::decode(&mut buffer).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        let frame = OutboundPacket::from(spawn_packet()).encode_frame();
        let truncated = &frame[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + 2];

        let err = OutboundPacket::decode_payload(SpawnEntityPacket::OPCODE, truncated).unwrap_err();
        assert!(matches!(err, PacketDecodeError::InsufficientData { .. }));
    }

    #[test]
    fn test_oversized_message_still_decodes() {
        let message = "é".repeat(40_000);
        let frame = OutboundPacket::from(SystemMessagePacket::new(message.clone())).encode_frame();
        assert!(frame.len() <= FRAME_HEADER_SIZE + MAX_PACKET_SIZE);

        match OutboundPacket::decode_frame(&frame).unwrap() {
            OutboundPacket::SystemMessage(decoded) => {
                assert!(decoded.message.len() <= MAX_MESSAGE_BYTES);
                assert_eq!(decoded.message.len(), 65532);
                assert!(message.starts_with(&decoded.message));
            }
            other => panic!("unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_opcode() {
        assert_eq!(
            OutboundPacket::decode_payload(200, &[]).unwrap_err(),
            PacketDecodeError::UnknownOpcode(200)
        );
    }

    #[test]
    fn test_packet_kind_and_entity() {
        let destroy = OutboundPacket::from(DestroyEntitiesPacket::single(EntityId(3)));
        assert_eq!(destroy.kind(), PacketKind::DestroyEntities);
        assert_eq!(destroy.entity_id(), None);

        let meta = OutboundPacket::from(EntityMetadataPacket::for_item(
            EntityId(9),
            ItemStack::new(1, 1),
        ));
        assert_eq!(meta.entity_id(), Some(EntityId(9)));
        assert_eq!(
            PacketKind::from_opcode(meta.kind().opcode()),
            Some(PacketKind::EntityMetadata)
        );
    }

    #[test]
    fn test_entity_kind_raw_values() {
        assert_eq!(EntityKind::from_u8(EntityKind::Item.as_u8()), EntityKind::Item);
        assert_eq!(EntityKind::from_u8(99), EntityKind::Other(99));
    }
}
