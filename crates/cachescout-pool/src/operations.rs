use std::sync::Arc;

use cachescout_common::settings::Protocol;

/// Builds request frames in the protocol selected at pool construction.
///
/// Only the operations the pool itself issues are modeled here; the full
/// command surface belongs to the underlying cache client library.
pub trait OperationFactory: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Frame fetching `key`.
    fn get(&self, key: &str) -> Vec<u8>;

    /// Frame refreshing the expiry of `key`.
    fn touch(&self, key: &str, expiry_secs: u32) -> Vec<u8>;

    /// Liveness probe frame.
    fn version(&self) -> Vec<u8>;
}

/// Selects the factory matching the configured protocol.
pub fn factory_for(protocol: Protocol) -> Arc<dyn OperationFactory> {
    match protocol {
        Protocol::Text => Arc::new(TextOperationFactory),
        Protocol::Binary => Arc::new(BinaryOperationFactory),
    }
}

/// Text-protocol frames: CRLF-terminated command lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextOperationFactory;

impl OperationFactory for TextOperationFactory {
    fn protocol(&self) -> Protocol {
        Protocol::Text
    }

    fn get(&self, key: &str) -> Vec<u8> {
        format!("get {}\r\n", key).into_bytes()
    }

    fn touch(&self, key: &str, expiry_secs: u32) -> Vec<u8> {
        format!("touch {} {}\r\n", key, expiry_secs).into_bytes()
    }

    fn version(&self) -> Vec<u8> {
        b"version\r\n".to_vec()
    }
}

/// Binary-protocol frames: 24-byte request header plus extras and key.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryOperationFactory;

const MAGIC_REQUEST: u8 = 0x80;
const OP_GET: u8 = 0x00;
const OP_VERSION: u8 = 0x0b;
const OP_TOUCH: u8 = 0x1c;

impl BinaryOperationFactory {
    fn header(opcode: u8, key_len: u16, extras_len: u8, body_len: u32) -> [u8; 24] {
        let mut header = [0u8; 24];
        header[0] = MAGIC_REQUEST;
        header[1] = opcode;
        header[2..4].copy_from_slice(&key_len.to_be_bytes());
        header[4] = extras_len;
        // data type, vbucket, opaque, and cas stay zero
        header[8..12].copy_from_slice(&body_len.to_be_bytes());
        header
    }
}

impl OperationFactory for BinaryOperationFactory {
    fn protocol(&self) -> Protocol {
        Protocol::Binary
    }

    fn get(&self, key: &str) -> Vec<u8> {
        let key = key.as_bytes();
        let mut frame =
            Self::header(OP_GET, key.len() as u16, 0, key.len() as u32).to_vec();
        frame.extend_from_slice(key);
        frame
    }

    fn touch(&self, key: &str, expiry_secs: u32) -> Vec<u8> {
        let key = key.as_bytes();
        let body_len = 4 + key.len() as u32;
        let mut frame = Self::header(OP_TOUCH, key.len() as u16, 4, body_len).to_vec();
        frame.extend_from_slice(&expiry_secs.to_be_bytes());
        frame.extend_from_slice(key);
        frame
    }

    fn version(&self) -> Vec<u8> {
        Self::header(OP_VERSION, 0, 0, 0).to_vec()
    }
}
