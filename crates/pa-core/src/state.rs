//! Persistent session state and its versioned binary serialization.
//!
//! The state exists only after a committed activation. The session mutates it
//! in memory and hands a serialized blob back to the host on demand; the core
//! itself never performs I/O.
//!
//! ## Wire format
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ magic: "PAST"                            [4 bytes]   │
//! │ version: u8 (currently 2)                [1 byte]    │
//! │ payload_len: u32 LE                      [4 bytes]   │
//! ├──────────────────────────────────────────────────────┤
//! │ payload: length-prefixed fields (u16 LE + bytes)     │
//! │   activation_id                                      │
//! │   server_public_key (SEC1 compressed)                │
//! │   device_private_key_wrapped                         │
//! │   possession_key_wrapped                             │
//! │   knowledge_salt (16 bytes)                          │
//! │   knowledge_key_wrapped                              │
//! │   biometry_key_wrapped (length 0 = absent)           │
//! │   transport_key_wrapped                              │
//! │   counter_data (16 bytes, length 0 = absent)         │
//! │   counter_long (8 bytes LE)                          │
//! │ trailer (raw bytes):                                 │
//! │   protocol_version: u8                               │
//! │   upgrade_version: u8          (version >= 2 only)   │
//! │   flags: u8 (EEK | BIOMETRY | PENDING_UPGRADE)       │
//! ├──────────────────────────────────────────────────────┤
//! │ crc32: u32 LE over everything above      [4 bytes]   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Version 1 blobs (no `upgrade_version`, no pending-upgrade flag) are still
//! read and upgraded in place; unknown future versions are rejected. Any
//! structural or checksum mismatch is reported as an `Encryption` error since
//! a damaged blob is indistinguishable from a tampered one.

use crate::types::ProtocolVersion;
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// State blob magic: "PAST".
pub const STATE_MAGIC: [u8; 4] = *b"PAST";

/// Current serialization version.
pub const STATE_VERSION: u8 = 2;

/// Oldest serialization version still readable.
pub const STATE_VERSION_MIN: u8 = 1;

/// How many counter iterations ahead of the local value the status
/// synchronization is willing to look. The server can be at most this many
/// signatures ahead before the client must re-activate.
pub const COUNTER_LOOKAHEAD_WINDOW: usize = 10;

const FLAG_EEK_USED: u8 = 0x01;
const FLAG_HAS_BIOMETRY: u8 = 0x02;
const FLAG_PENDING_UPGRADE: u8 = 0x04;

/// Key material and counters materialized by a committed activation.
///
/// All key fields hold wrapped (encrypted) forms; raw keys exist only inside
/// a single operation. Buffers are zeroed on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PersistentState {
    /// Activation identifier assigned by the server.
    pub activation_id: String,
    /// Personalized server public key, SEC 1 compressed.
    pub server_public_key: Vec<u8>,
    /// Device private scalar, wrapped with the possession key (and the EEK
    /// when one is bound).
    pub device_private_key_wrapped: Vec<u8>,
    /// Possession signature key, wrapped.
    pub possession_key_wrapped: Vec<u8>,
    /// Salt for the PBKDF2 derivation of the knowledge key-encryption key.
    pub knowledge_salt: [u8; 16],
    /// Knowledge signature key, wrapped.
    pub knowledge_key_wrapped: Vec<u8>,
    /// Biometry signature key, wrapped; absent when the activation was
    /// committed without a biometry key.
    pub biometry_key_wrapped: Option<Vec<u8>>,
    /// Transport key for ECIES activation scope and status decryption,
    /// wrapped with the possession key.
    pub transport_key_wrapped: Vec<u8>,
    /// Hash-based counter (V3).
    pub counter_data: Option<[u8; 16]>,
    /// Linear counter (V2 only).
    pub counter_long: u64,
    /// Protocol version this activation currently runs.
    #[zeroize(skip)]
    pub protocol_version: ProtocolVersion,
    /// Target version of a pending or last finished upgrade.
    #[zeroize(skip)]
    pub upgrade_version: ProtocolVersion,
    /// Whether a protocol upgrade was started but not committed.
    pub pending_upgrade: bool,
    /// Whether signature keys carry an external encryption key layer.
    pub eek_used: bool,
}

impl PersistentState {
    /// Whether a biometry factor key is stored.
    pub fn has_biometry(&self) -> bool {
        self.biometry_key_wrapped.is_some()
    }

    /// Serialize into the versioned binary frame.
    pub fn serialize(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(256);
        put_field(&mut payload, self.activation_id.as_bytes());
        put_field(&mut payload, &self.server_public_key);
        put_field(&mut payload, &self.device_private_key_wrapped);
        put_field(&mut payload, &self.possession_key_wrapped);
        put_field(&mut payload, &self.knowledge_salt);
        put_field(&mut payload, &self.knowledge_key_wrapped);
        put_field(&mut payload, self.biometry_key_wrapped.as_deref().unwrap_or(&[]));
        put_field(&mut payload, &self.transport_key_wrapped);
        put_field(
            &mut payload,
            self.counter_data.as_ref().map(|c| &c[..]).unwrap_or(&[]),
        );
        put_field(&mut payload, &self.counter_long.to_le_bytes());

        payload.push(self.protocol_version as u8);
        payload.push(self.upgrade_version as u8);
        let mut flags = 0u8;
        if self.eek_used {
            flags |= FLAG_EEK_USED;
        }
        if self.has_biometry() {
            flags |= FLAG_HAS_BIOMETRY;
        }
        if self.pending_upgrade {
            flags |= FLAG_PENDING_UPGRADE;
        }
        payload.push(flags);

        let mut out = Vec::with_capacity(payload.len() + 13);
        out.extend_from_slice(&STATE_MAGIC);
        out.push(STATE_VERSION);
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&payload);
        let crc = crc32fast::hash(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    /// Parse a state blob, accepting current and legacy versions.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 13 {
            return Err(Error::Encryption("State blob is truncated".into()));
        }
        if data[0..4] != STATE_MAGIC {
            return Err(Error::Encryption("Bad state blob magic".into()));
        }
        let version = data[4];
        if !(STATE_VERSION_MIN..=STATE_VERSION).contains(&version) {
            return Err(Error::Encryption(format!(
                "Unsupported state blob version {version}"
            )));
        }
        let payload_len =
            u32::from_le_bytes([data[5], data[6], data[7], data[8]]) as usize;
        if data.len() != 9 + payload_len + 4 {
            return Err(Error::Encryption("State blob length mismatch".into()));
        }
        let crc_offset = data.len() - 4;
        let expected_crc = u32::from_le_bytes([
            data[crc_offset],
            data[crc_offset + 1],
            data[crc_offset + 2],
            data[crc_offset + 3],
        ]);
        if crc32fast::hash(&data[..crc_offset]) != expected_crc {
            return Err(Error::Encryption("State blob checksum mismatch".into()));
        }

        let mut reader = FieldReader::new(&data[9..crc_offset]);
        let activation_id = String::from_utf8(reader.field()?.to_vec())
            .map_err(|_| Error::Encryption("Activation identifier is not UTF-8".into()))?;
        let server_public_key = reader.field()?.to_vec();
        let device_private_key_wrapped = reader.field()?.to_vec();
        let possession_key_wrapped = reader.field()?.to_vec();
        let knowledge_salt: [u8; 16] = reader
            .field()?
            .try_into()
            .map_err(|_| Error::Encryption("Knowledge salt must be 16 bytes".into()))?;
        let knowledge_key_wrapped = reader.field()?.to_vec();
        let biometry_field = reader.field()?;
        let biometry_key_wrapped = if biometry_field.is_empty() {
            None
        } else {
            Some(biometry_field.to_vec())
        };
        let transport_key_wrapped = reader.field()?.to_vec();
        let counter_field = reader.field()?;
        let counter_data = if counter_field.is_empty() {
            None
        } else {
            Some(
                counter_field
                    .try_into()
                    .map_err(|_| Error::Encryption("Counter data must be 16 bytes".into()))?,
            )
        };
        let counter_long = u64::from_le_bytes(
            reader
                .field()?
                .try_into()
                .map_err(|_| Error::Encryption("Linear counter must be 8 bytes".into()))?,
        );

        let protocol_version = ProtocolVersion::from_u8(reader.byte()?)
            .ok_or_else(|| Error::Encryption("Unknown protocol version".into()))?;
        let upgrade_version = if version >= 2 {
            ProtocolVersion::from_u8(reader.byte()?)
                .ok_or_else(|| Error::Encryption("Unknown upgrade version".into()))?
        } else {
            protocol_version
        };
        let flags = reader.byte()?;
        reader.finish()?;

        let pending_upgrade = version >= 2 && flags & FLAG_PENDING_UPGRADE != 0;
        let state = Self {
            activation_id,
            server_public_key,
            device_private_key_wrapped,
            possession_key_wrapped,
            knowledge_salt,
            knowledge_key_wrapped,
            biometry_key_wrapped,
            transport_key_wrapped,
            counter_data,
            counter_long,
            protocol_version,
            upgrade_version,
            pending_upgrade,
            eek_used: flags & FLAG_EEK_USED != 0,
        };
        if state.has_biometry() != (flags & FLAG_HAS_BIOMETRY != 0) {
            return Err(Error::Encryption(
                "Biometry flag contradicts stored keys".into(),
            ));
        }
        Ok(state)
    }
}

fn put_field(buf: &mut Vec<u8>, bytes: &[u8]) {
    debug_assert!(bytes.len() <= u16::MAX as usize);
    buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(bytes);
}

struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn field(&mut self) -> Result<&'a [u8]> {
        if self.pos + 2 > self.data.len() {
            return Err(Error::Encryption("State payload is truncated".into()));
        }
        let len = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]) as usize;
        self.pos += 2;
        if self.pos + len > self.data.len() {
            return Err(Error::Encryption("State payload is truncated".into()));
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn byte(&mut self) -> Result<u8> {
        if self.pos >= self.data.len() {
            return Err(Error::Encryption("State payload is truncated".into()));
        }
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.data.len() {
            return Err(Error::Encryption("Unexpected trailing state bytes".into()));
        }
        Ok(())
    }
}

/// Advance a hash-based counter by one step: `SHA-256(ctr)[..16]`.
pub fn counter_next(ctr: &[u8; 16]) -> [u8; 16] {
    let digest = Sha256::digest(ctr);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

/// Find the counter value matching a server-reported counter hash.
///
/// The server sends `SHA-256(server_ctr)[..16]`. Starting at the local value,
/// up to [`COUNTER_LOOKAHEAD_WINDOW`] iterations ahead are probed; the
/// matching value is returned so the caller can adopt it.
pub fn synchronize_counter(local: &[u8; 16], received_hash: &[u8; 16]) -> Option<[u8; 16]> {
    let mut candidate = *local;
    for _ in 0..=COUNTER_LOOKAHEAD_WINDOW {
        let candidate_hash = counter_next(&candidate);
        if bool::from(candidate_hash.ct_eq(received_hash)) {
            return Some(candidate);
        }
        candidate = candidate_hash;
    }
    None
}
