//! Property-based tests for command decoding and envelopes
//!
//! The device-side decoder faces untrusted bytes once an envelope opens, so it
//! must reject malformed input with an error rather than panic.

use proptest::prelude::*;
use tessera_crypto::{KEY_SIZE, Key, TopicHash};
use tessera_proto::{Command, CommandType, ProtocolError, open_command, seal_command};

fn arb_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        any::<[u8; KEY_SIZE]>().prop_map(|k| Command::SetRootKey { key: Key::from_bytes(k) }),
        (any::<[u8; 16]>(), any::<[u8; KEY_SIZE]>()).prop_map(|(h, k)| Command::SetTopicKey {
            topic_hash: TopicHash::from_bytes(h),
            key: Key::from_bytes(k),
        }),
        any::<[u8; 16]>().prop_map(|h| Command::RemoveTopic { topic_hash: TopicHash::from_bytes(h) }),
        Just(Command::ResetTopics),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: Decoding arbitrary bytes never panics, and anything accepted
    /// has exactly the length its tag dictates.
    #[test]
    fn prop_decode_arbitrary_bytes(bytes in prop::collection::vec(any::<u8>(), 0..80)) {
        match Command::decode(&bytes) {
            Ok(command) => prop_assert_eq!(bytes.len(), command.command_type().encoded_len()),
            Err(
                ProtocolError::EmptyCommand
                | ProtocolError::UnknownCommand(_)
                | ProtocolError::InvalidCommandLength { .. },
            ) => {},
            Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
        }
    }

    /// Property: Tags above the known range are always rejected.
    #[test]
    fn prop_unknown_tags_rejected(tag in 4u8.., rest in prop::collection::vec(any::<u8>(), 0..64)) {
        let mut bytes = vec![tag];
        bytes.extend(rest);
        prop_assert_eq!(Command::decode(&bytes), Err(ProtocolError::UnknownCommand(tag)));
    }

    /// Property: A sealed command opens only under the root key it was sealed
    /// with, and yields the original command.
    #[test]
    fn prop_sealed_command_bound_to_root_key(
        command in arb_command(),
        root in any::<[u8; KEY_SIZE]>(),
        other in any::<[u8; KEY_SIZE]>(),
    ) {
        prop_assume!(root != other);
        let root = Key::from_bytes(root);
        let envelope = seal_command(&command, &root).unwrap();

        prop_assert_eq!(open_command(&envelope, &root).unwrap(), command.clone());
        prop_assert!(open_command(&envelope, &Key::from_bytes(other)).is_err());
    }

    /// Property: Every command type has a fixed encoded length.
    #[test]
    fn prop_encoded_length_fixed(command in arb_command()) {
        let expected = match command.command_type() {
            CommandType::SetRootKey => 33,
            CommandType::SetTopicKey => 49,
            CommandType::RemoveTopic => 17,
            CommandType::ResetTopics => 1,
        };
        prop_assert_eq!(command.encode().len(), expected);
    }
}
