//! Control commands sent from the server to a single device.
//!
//! Fixed binary layout, one tag byte followed by type-specific fields:
//!
//! ```text
//! SetRootKey:  [0x02][key: 32]
//! SetTopicKey: [0x03][topic_hash: 16][key: 32]
//! RemoveTopic: [0x00][topic_hash: 16]
//! ResetTopics: [0x01]
//! ```
//!
//! There are no length prefixes; the tag fully determines the total length and
//! any other length is rejected on decode.

use tessera_crypto::{KEY_SIZE, Key, TOPIC_HASH_SIZE, TopicHash};

use crate::ProtocolError;

/// Command discriminator, carried as the first byte of every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandType {
    /// Discard the key for one topic
    RemoveTopic = 0x00,
    /// Discard every topic key
    ResetTopics = 0x01,
    /// Replace the device root key
    SetRootKey = 0x02,
    /// Install or replace the key for one topic
    SetTopicKey = 0x03,
}

impl CommandType {
    /// Wire tag byte.
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Total encoded length, tag included.
    pub const fn encoded_len(self) -> usize {
        1 + match self {
            Self::RemoveTopic => TOPIC_HASH_SIZE,
            Self::ResetTopics => 0,
            Self::SetRootKey => KEY_SIZE,
            Self::SetTopicKey => TOPIC_HASH_SIZE + KEY_SIZE,
        }
    }
}

impl TryFrom<u8> for CommandType {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0x00 => Ok(Self::RemoveTopic),
            0x01 => Ok(Self::ResetTopics),
            0x02 => Ok(Self::SetRootKey),
            0x03 => Ok(Self::SetTopicKey),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

/// A typed control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Replace the device root key
    SetRootKey {
        /// New root key
        key: Key,
    },
    /// Install or replace a topic key
    SetTopicKey {
        /// Hash of the topic name
        topic_hash: TopicHash,
        /// Topic key
        key: Key,
    },
    /// Discard one topic key
    RemoveTopic {
        /// Hash of the topic name
        topic_hash: TopicHash,
    },
    /// Discard all topic keys
    ResetTopics,
}

impl Command {
    /// Build a command from a type and optional fields.
    ///
    /// Fields the type does not use are ignored.
    ///
    /// # Errors
    ///
    /// - `MissingField`: a field the type requires was `None`
    pub fn build(
        command: CommandType,
        topic_hash: Option<TopicHash>,
        key: Option<&Key>,
    ) -> Result<Self, ProtocolError> {
        let require_hash = || topic_hash.ok_or(ProtocolError::MissingField { command, field: "topic hash" });
        let require_key =
            || key.cloned().ok_or(ProtocolError::MissingField { command, field: "key" });

        Ok(match command {
            CommandType::SetRootKey => Self::SetRootKey { key: require_key()? },
            CommandType::SetTopicKey => {
                Self::SetTopicKey { topic_hash: require_hash()?, key: require_key()? }
            },
            CommandType::RemoveTopic => Self::RemoveTopic { topic_hash: require_hash()? },
            CommandType::ResetTopics => Self::ResetTopics,
        })
    }

    /// Discriminator for this command.
    pub fn command_type(&self) -> CommandType {
        match self {
            Self::SetRootKey { .. } => CommandType::SetRootKey,
            Self::SetTopicKey { .. } => CommandType::SetTopicKey,
            Self::RemoveTopic { .. } => CommandType::RemoveTopic,
            Self::ResetTopics => CommandType::ResetTopics,
        }
    }

    /// Encode into the fixed binary layout.
    ///
    /// The output may contain key material; callers wipe it once sealed.
    pub fn encode(&self) -> Vec<u8> {
        let command = self.command_type();
        let mut out = Vec::with_capacity(command.encoded_len());
        out.push(command.tag());

        match self {
            Self::SetRootKey { key } => out.extend_from_slice(key.as_bytes()),
            Self::SetTopicKey { topic_hash, key } => {
                out.extend_from_slice(topic_hash.as_bytes());
                out.extend_from_slice(key.as_bytes());
            },
            Self::RemoveTopic { topic_hash } => out.extend_from_slice(topic_hash.as_bytes()),
            Self::ResetTopics => {},
        }

        debug_assert_eq!(out.len(), command.encoded_len());
        out
    }

    /// Decode a command, as a device does after opening the envelope.
    ///
    /// # Errors
    ///
    /// - `EmptyCommand`: no tag byte
    /// - `UnknownCommand`: unrecognised tag
    /// - `InvalidCommandLength`: length does not match the tag's layout
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (&tag, fields) = bytes.split_first().ok_or(ProtocolError::EmptyCommand)?;
        let command = CommandType::try_from(tag)?;

        if bytes.len() != command.encoded_len() {
            return Err(ProtocolError::InvalidCommandLength {
                command,
                expected: command.encoded_len(),
                actual: bytes.len(),
            });
        }

        Ok(match command {
            CommandType::SetRootKey => Self::SetRootKey { key: Key::try_from(fields)? },
            CommandType::SetTopicKey => {
                let (hash, key) = fields.split_at(TOPIC_HASH_SIZE);
                Self::SetTopicKey { topic_hash: topic_hash(hash)?, key: Key::try_from(key)? }
            },
            CommandType::RemoveTopic => Self::RemoveTopic { topic_hash: topic_hash(fields)? },
            CommandType::ResetTopics => Self::ResetTopics,
        })
    }
}

fn topic_hash(bytes: &[u8]) -> Result<TopicHash, ProtocolError> {
    let array: [u8; TOPIC_HASH_SIZE] = bytes.try_into().map_err(|_| {
        ProtocolError::Crypto(tessera_crypto::CryptoError::InvalidLength {
            expected: TOPIC_HASH_SIZE,
            actual: bytes.len(),
        })
    })?;
    Ok(TopicHash::from_bytes(array))
}
