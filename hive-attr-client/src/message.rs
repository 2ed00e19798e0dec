//! Hand-rolled wire structs for the node attribute-update call.
//!
//! The hive node speaks the Thrift binary protocol; the message is
//! signed by storing the MD5 digest of its unsigned serialization in
//! the checksum field before sending.

use std::collections::BTreeMap;

use md5::{Digest, Md5};
use thrift::protocol::{
    TBinaryOutputProtocol, TFieldIdentifier, TMapIdentifier, TOutputProtocol, TStructIdentifier,
    TType,
};
use thrift::transport::TBufferChannel;

#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub host: String,
    pub port: i32,
}

impl Peer {
    fn write_to(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("Peer"))?;
        o_prot.write_field_begin(&TFieldIdentifier::new("host", TType::String, 1))?;
        o_prot.write_string(&self.host)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("port", TType::I32, 2))?;
        o_prot.write_i32(self.port)?;
        o_prot.write_field_end()?;
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageBase {
    pub originator: Peer,
    /// MD5 digest of the unsigned message serialization.
    /// Unset until the message is signed.
    pub checksum: Option<Vec<u8>>,
}

impl MessageBase {
    fn write_to(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("MessageBase"))?;
        o_prot.write_field_begin(&TFieldIdentifier::new("originator", TType::Struct, 1))?;
        self.originator.write_to(o_prot)?;
        o_prot.write_field_end()?;
        if let Some(checksum) = &self.checksum {
            o_prot.write_field_begin(&TFieldIdentifier::new("checksum", TType::String, 2))?;
            o_prot.write_bytes(checksum)?;
            o_prot.write_field_end()?;
        }
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateAttributesMessage {
    pub message_base: MessageBase,
    pub attributes: BTreeMap<String, String>,
    pub message_id: i64,
}

impl UpdateAttributesMessage {
    /// Builds an unsigned single-attribute update originating from
    /// this client.
    pub fn new(key: &str, value: &str, message_id: i64) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(key.to_string(), value.to_string());
        Self {
            message_base: MessageBase {
                originator: Peer {
                    host: String::from("client.com"),
                    port: 9797,
                },
                checksum: None,
            },
            attributes,
            message_id,
        }
    }

    pub fn write_to(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("UpdateAttributesMessage"))?;

        o_prot.write_field_begin(&TFieldIdentifier::new("messageBase", TType::Struct, 1))?;
        self.message_base.write_to(o_prot)?;
        o_prot.write_field_end()?;

        o_prot.write_field_begin(&TFieldIdentifier::new("attributes", TType::Map, 2))?;
        o_prot.write_map_begin(&TMapIdentifier::new(
            TType::String,
            TType::String,
            self.attributes.len() as i32,
        ))?;
        for (key, value) in self.attributes.iter() {
            o_prot.write_string(key)?;
            o_prot.write_string(value)?;
        }
        o_prot.write_map_end()?;
        o_prot.write_field_end()?;

        o_prot.write_field_begin(&TFieldIdentifier::new("messageId", TType::I64, 3))?;
        o_prot.write_i64(self.message_id)?;
        o_prot.write_field_end()?;

        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }

    /// Upper bound on the serialized size. Field headers, the map
    /// header and the fixed-width fields fit well inside the flat
    /// overhead; string payloads are counted exactly.
    fn wire_capacity(&self) -> usize {
        let mut capacity = 256 + self.message_base.originator.host.len();
        for (key, value) in self.attributes.iter() {
            capacity += key.len() + value.len() + 16;
        }
        capacity
    }

    /// Serializes the message with the binary protocol.
    pub fn to_bytes(&self) -> thrift::Result<Vec<u8>> {
        let mut channel = TBufferChannel::with_capacity(0, self.wire_capacity());
        {
            let mut o_prot = TBinaryOutputProtocol::new(&mut channel, true);
            self.write_to(&mut o_prot)?;
            o_prot.flush()?;
        }
        Ok(channel.write_bytes())
    }

    /// Stores the MD5 digest of the unsigned serialization as the
    /// message checksum.
    pub fn sign(&mut self) -> thrift::Result<()> {
        self.message_base.checksum = None;
        let unsigned = self.to_bytes()?;
        let digest = Md5::digest(&unsigned);
        self.message_base.checksum = Some(digest.to_vec());
        Ok(())
    }
}

/// RUST_LOG=debug cargo test --package hive-attr-client -- message::test_sign_sets_md5_of_unsigned_bytes --exact --show-output
#[test]
fn test_sign_sets_md5_of_unsigned_bytes() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let mut message = UpdateAttributesMessage::new("test.prop.1", "green", 1234567890);
    let unsigned = message.to_bytes().unwrap();

    message.sign().unwrap();
    let checksum = message.message_base.checksum.clone().unwrap();
    assert_eq!(checksum.len(), 16);
    assert_eq!(checksum, Md5::digest(&unsigned).to_vec());

    // the signed serialization embeds the digest
    let signed = message.to_bytes().unwrap();
    assert!(signed.len() > unsigned.len());
    let embedded = signed
        .windows(checksum.len())
        .any(|window| window == checksum.as_slice());
    assert!(embedded);
}

/// RUST_LOG=debug cargo test --package hive-attr-client -- message::test_encoding_is_deterministic --exact --show-output
#[test]
fn test_encoding_is_deterministic() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let message = UpdateAttributesMessage::new("test.prop.1", "blue", 42);
    let first = message.to_bytes().unwrap();
    let second = message.to_bytes().unwrap();
    assert_eq!(first, second);

    // the attribute key and value travel on the wire
    let key = b"test.prop.1";
    assert!(first.windows(key.len()).any(|w| w == key));
    let value = b"blue";
    assert!(first.windows(value.len()).any(|w| w == value));
}

/// RUST_LOG=debug cargo test --package hive-attr-client -- message::test_resigning_is_stable --exact --show-output
#[test]
fn test_resigning_is_stable() {
    let mut message = UpdateAttributesMessage::new("test.prop.1", "red", 7);
    message.sign().unwrap();
    let first = message.message_base.checksum.clone().unwrap();

    // signing again clears the old checksum before digesting
    message.sign().unwrap();
    let second = message.message_base.checksum.clone().unwrap();
    assert_eq!(first, second);
}

/// RUST_LOG=debug cargo test --package hive-attr-client -- message::test_large_attribute_value --exact --show-output
#[test]
fn test_large_attribute_value() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    // values larger than any fixed buffer guess still serialize
    let value = "x".repeat(64 * 1024);
    let mut message = UpdateAttributesMessage::new("test.prop.1", &value, 1);
    let bytes = message.to_bytes().unwrap();
    assert!(bytes.len() > value.len());
    assert!(bytes
        .windows(value.len())
        .any(|w| w == value.as_bytes()));

    message.sign().unwrap();
    assert_eq!(message.message_base.checksum.clone().unwrap().len(), 16);
}
