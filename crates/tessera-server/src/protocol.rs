//! Server side of the command protocol.

use tessera_crypto::{Key, TopicHash};
use tessera_proto::{Command, CommandType, DeviceId, seal_command};

use crate::{C2Error, keystore::KeyStore, storage::Storage};

/// Build a command and seal it under the device's current root key.
///
/// The envelope is `[nonce: 24][ciphertext][tag: 16]` with a fresh random
/// nonce, so sealing the same command twice yields different bytes.
///
/// # Errors
///
/// - `Validation` if `command` requires a field that is `None`
/// - `NotFound` if the device is not enrolled
/// - `CorruptedData` if its stored root key fails authentication
pub fn create_and_protect_for_id<S: Storage>(
    store: &KeyStore<S>,
    command: CommandType,
    topic_hash: Option<TopicHash>,
    key: Option<&Key>,
    id: &DeviceId,
) -> Result<Vec<u8>, C2Error> {
    let command = Command::build(command, topic_hash, key)?;
    let root_key = store.get_id_key(id)?;
    Ok(seal_command(&command, &root_key)?)
}

#[cfg(test)]
mod tests {
    use tessera_crypto::hash_topic;
    use tessera_proto::open_command;

    use super::*;
    use crate::{Entity, storage::MemoryStorage};

    fn store_with_device(id: &DeviceId, root: &Key) -> KeyStore<MemoryStorage> {
        let store = KeyStore::new(MemoryStorage::new(), Key::from_bytes([0xee; 32]));
        store.insert_id_key(id, root).unwrap();
        store
    }

    #[test]
    fn device_opens_set_topic_key() {
        let id = DeviceId::from_bytes([1; 16]);
        let root = Key::from_bytes([2; 32]);
        let topic_key = Key::from_bytes([3; 32]);
        let store = store_with_device(&id, &root);

        let envelope = create_and_protect_for_id(
            &store,
            CommandType::SetTopicKey,
            Some(hash_topic("sensors/t1")),
            Some(&topic_key),
            &id,
        )
        .unwrap();

        assert_eq!(
            open_command(&envelope, &root).unwrap(),
            Command::SetTopicKey { topic_hash: hash_topic("sensors/t1"), key: topic_key }
        );
    }

    #[test]
    fn unknown_device_is_not_found() {
        let store = KeyStore::new(MemoryStorage::new(), Key::from_bytes([0xee; 32]));
        let id = DeviceId::from_bytes([9; 16]);

        let err = create_and_protect_for_id(&store, CommandType::ResetTopics, None, None, &id)
            .unwrap_err();
        assert_eq!(err, C2Error::NotFound(Entity::Device(id)));
    }

    #[test]
    fn missing_field_is_validation_error() {
        let id = DeviceId::from_bytes([1; 16]);
        let store = store_with_device(&id, &Key::from_bytes([2; 32]));

        let err = create_and_protect_for_id(&store, CommandType::RemoveTopic, None, None, &id)
            .unwrap_err();
        assert!(matches!(err, C2Error::Validation(_)));
    }

    #[test]
    fn envelopes_differ_for_identical_commands() {
        let id = DeviceId::from_bytes([1; 16]);
        let store = store_with_device(&id, &Key::from_bytes([2; 32]));

        let a = create_and_protect_for_id(&store, CommandType::ResetTopics, None, None, &id).unwrap();
        let b = create_and_protect_for_id(&store, CommandType::ResetTopics, None, None, &id).unwrap();
        assert_ne!(a, b);
    }
}
