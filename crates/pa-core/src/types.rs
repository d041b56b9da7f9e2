//! Public types shared across the session, signature and ECIES engines.

use crate::{Error, Result};

/// Minimum accepted password length for the knowledge factor.
pub const MINIMAL_PASSWORD_LENGTH: usize = 4;

/// PowerAuth protocol version.
///
/// The main difference between V2 and V3 is that V3 uses a hash-based
/// counter instead of a linear one and runs all end-to-end encryption over
/// ECIES. V2 is supported only for signature computation, to keep already
/// activated installations working until they upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ProtocolVersion {
    /// Version is not specified or cannot be determined.
    NA = 0,
    /// Protocol version 2 (linear counter).
    V2 = 2,
    /// Protocol version 3 (hash-based counter, ECIES).
    V3 = 3,
}

impl ProtocolVersion {
    /// Highest protocol version this client supports.
    pub const MAX_SUPPORTED: ProtocolVersion = ProtocolVersion::V3;

    /// Convert from the serialized byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::NA),
            2 => Some(Self::V2),
            3 => Some(Self::V3),
            _ => None,
        }
    }

    /// The `pa_version` string sent in signature headers.
    pub fn version_string(self) -> &'static str {
        match self {
            ProtocolVersion::V2 => "2.1",
            _ => "3.1",
        }
    }
}

/// Immutable constants required during the lifetime of a [`crate::Session`].
#[derive(Clone)]
pub struct SessionSetup {
    /// APPLICATION_KEY constant for the session.
    pub application_key: String,
    /// APPLICATION_SECRET constant for the session.
    pub application_secret: String,
    /// Master server public key, Base64 encoded SEC 1 point. Testing and
    /// production servers should use different keys.
    pub master_server_public_key: String,
    /// Optional host-assigned tag for identifying sessions in multi-session
    /// environments. The session itself never interprets this value.
    pub session_identifier: u32,
    /// Optional external encryption key (EEK), exactly 16 bytes.
    ///
    /// When set, signature keys get an additional wrapping layer under this
    /// key. Once a session is activated with an EEK, every later operation
    /// must supply the same key. The EEK is never serialized with the
    /// session state; managing it across sessions is the host's job.
    pub external_encryption_key: Option<[u8; 16]>,
}

impl SessionSetup {
    /// Whether the setup carries the minimum required constants.
    pub fn has_valid_setup(&self) -> bool {
        !self.application_key.is_empty()
            && !self.application_secret.is_empty()
            && !self.master_server_public_key.is_empty()
    }
}

/// Unlock keys for signature computation.
///
/// The session keeps factor keys encrypted at rest and re-derives working
/// keys per call from the keys supplied here. Provide exactly the keys the
/// selected factor combination needs; keys are never stored.
#[derive(Clone, Default)]
pub struct SignatureUnlockKeys {
    /// Key for the possession factor, derived from stable device properties.
    /// Must not be all zeros.
    pub possession_unlock_key: Option<[u8; 16]>,
    /// Key for the biometry factor, typically guarded by the platform's
    /// biometric storage. Must not be all zeros.
    pub biometry_unlock_key: Option<[u8; 16]>,
    /// Password for the knowledge factor, at least
    /// [`MINIMAL_PASSWORD_LENGTH`] bytes.
    pub user_password: Option<String>,
}

impl SignatureUnlockKeys {
    /// Unlock keys carrying only the possession key.
    pub fn possession(key: [u8; 16]) -> Self {
        Self {
            possession_unlock_key: Some(key),
            ..Self::default()
        }
    }
}

pub(crate) fn is_zero_key(key: &[u8; 16]) -> bool {
    key.iter().all(|&b| b == 0)
}

/// Validated combination of signature factors.
///
/// Every combination includes the possession factor; requests without it are
/// rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFactor {
    /// 1FA: possession only.
    Possession,
    /// 2FA: possession and knowledge (password).
    PossessionKnowledge,
    /// 2FA: possession and biometry.
    PossessionBiometry,
    /// 3FA: all supported factors.
    PossessionKnowledgeBiometry,
}

impl SignatureFactor {
    /// Bit flag for the possession factor.
    pub const POSSESSION: u8 = 0x01;
    /// Bit flag for the knowledge factor.
    pub const KNOWLEDGE: u8 = 0x02;
    /// Bit flag for the biometry factor.
    pub const BIOMETRY: u8 = 0x04;

    /// Build a factor combination from bit flags.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongParam`] for unknown bits or any combination
    /// missing the possession factor.
    pub fn from_bits(bits: u8) -> Result<Self> {
        if bits & !(Self::POSSESSION | Self::KNOWLEDGE | Self::BIOMETRY) != 0 {
            return Err(Error::WrongParam("Unknown signature factor bits".into()));
        }
        if bits & Self::POSSESSION == 0 {
            return Err(Error::WrongParam(
                "Signature factor combination must include possession".into(),
            ));
        }
        Ok(match (bits & Self::KNOWLEDGE != 0, bits & Self::BIOMETRY != 0) {
            (false, false) => Self::Possession,
            (true, false) => Self::PossessionKnowledge,
            (false, true) => Self::PossessionBiometry,
            (true, true) => Self::PossessionKnowledgeBiometry,
        })
    }

    /// Bit flags for this combination.
    pub fn bits(self) -> u8 {
        match self {
            Self::Possession => Self::POSSESSION,
            Self::PossessionKnowledge => Self::POSSESSION | Self::KNOWLEDGE,
            Self::PossessionBiometry => Self::POSSESSION | Self::BIOMETRY,
            Self::PossessionKnowledgeBiometry => {
                Self::POSSESSION | Self::KNOWLEDGE | Self::BIOMETRY
            }
        }
    }

    /// Whether the knowledge factor participates.
    pub fn includes_knowledge(self) -> bool {
        self.bits() & Self::KNOWLEDGE != 0
    }

    /// Whether the biometry factor participates.
    pub fn includes_biometry(self) -> bool {
        self.bits() & Self::BIOMETRY != 0
    }

    /// The `pa_signature_type` label for this combination.
    pub fn label(self) -> &'static str {
        match self {
            Self::Possession => "possession",
            Self::PossessionKnowledge => "possession_knowledge",
            Self::PossessionBiometry => "possession_biometry",
            Self::PossessionKnowledgeBiometry => "possession_knowledge_biometry",
        }
    }
}

/// Data required for computing an HTTP request signature.
#[derive(Clone, Default)]
pub struct HTTPRequestData {
    /// Whole POST body, or the normalized key-value blob for GET requests.
    /// May be empty.
    pub body: Vec<u8>,
    /// HTTP method; one of GET, POST, HEAD, PUT, DELETE.
    pub method: String,
    /// Relative URI of the request.
    pub uri: String,
    /// Optional externally generated nonce, Base64 encoded. Used for offline
    /// data signing only.
    pub offline_nonce: String,
}

impl HTTPRequestData {
    /// Request data for an online signature.
    pub fn new(body: Vec<u8>, method: &str, uri: &str) -> Self {
        Self {
            body,
            method: method.to_owned(),
            uri: uri.to_owned(),
            offline_nonce: String::new(),
        }
    }

    /// Request data for an offline signature with an external nonce.
    pub fn new_offline(body: Vec<u8>, method: &str, uri: &str, nonce: &str) -> Self {
        Self {
            body,
            method: method.to_owned(),
            uri: uri.to_owned(),
            offline_nonce: nonce.to_owned(),
        }
    }

    /// Whether method, uri and the optional offline nonce pass local
    /// validation.
    pub fn has_valid_data(&self) -> bool {
        if self.method.is_empty() || self.uri.is_empty() {
            return false;
        }
        if !matches!(self.method.as_str(), "GET" | "POST" | "HEAD" | "PUT" | "DELETE") {
            return false;
        }
        // 24 is 16 bytes in Base64.
        if !self.offline_nonce.is_empty() && self.offline_nonce.len() != 24 {
            return false;
        }
        true
    }

    /// Whether this request carries an external nonce.
    pub fn is_offline_request(&self) -> bool {
        !self.offline_nonce.is_empty()
    }
}

/// Result of an HTTP request signing operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HTTPRequestDataSignature {
    /// Protocol version string ("3.1" or "2.1").
    pub version: String,
    /// Activation identifier received during activation.
    pub activation_id: String,
    /// Application key copied from the session setup.
    pub application_key: String,
    /// Nonce used for the computation, Base64 encoded.
    pub nonce: String,
    /// Signature factor label.
    pub factor: String,
    /// Computed signature value.
    pub signature: String,
}

impl HTTPRequestDataSignature {
    /// Complete value for the `X-PowerAuth-Authorization` HTTP header.
    ///
    /// Fragment order is fixed; legacy V2 signatures omit `pa_version`.
    pub fn auth_header_value(&self) -> String {
        let mut out = String::with_capacity(
            self.version.len()
                + self.activation_id.len()
                + self.application_key.len()
                + self.nonce.len()
                + self.factor.len()
                + self.signature.len()
                + 128,
        );
        out.push_str("PowerAuth ");
        if !self.version.starts_with('2') {
            out.push_str("pa_version=\"");
            out.push_str(&self.version);
            out.push_str("\", ");
        }
        out.push_str("pa_activation_id=\"");
        out.push_str(&self.activation_id);
        out.push_str("\", pa_application_key=\"");
        out.push_str(&self.application_key);
        out.push_str("\", pa_nonce=\"");
        out.push_str(&self.nonce);
        out.push_str("\", pa_signature_type=\"");
        out.push_str(&self.factor);
        out.push_str("\", pa_signature=\"");
        out.push_str(&self.signature);
        out.push('"');
        out
    }
}

/// Key used for verifying server-signed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningDataKey {
    /// Signature was computed with the master server private key.
    EcdsaMasterServerKey,
    /// Signature was computed with the personalized server private key.
    EcdsaPersonalizedKey,
}

/// Data with a detached server signature.
#[derive(Clone)]
pub struct SignedData {
    /// Which server key produced the signature.
    pub signing_key: SigningDataKey,
    /// The signed payload.
    pub data: Vec<u8>,
    /// DER-encoded ECDSA signature.
    pub signature: Vec<u8>,
}

/// Recovery code and PUK created during activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryData {
    /// Recovery code, in the activation code format.
    pub recovery_code: String,
    /// PUK valid with the recovery code, 10 decimal digits.
    pub puk: String,
}

impl RecoveryData {
    /// Whether both members are empty.
    pub fn is_empty(&self) -> bool {
        self.recovery_code.is_empty() && self.puk.is_empty()
    }
}

/// State of the activation as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActivationState {
    /// The activation record exists but the handshake is incomplete.
    Created = 1,
    /// The one-time activation code was already used.
    OtpUsed = 2,
    /// The shared secure context is valid and active.
    Active = 3,
    /// The activation is blocked.
    Blocked = 4,
    /// The activation no longer exists on the server.
    Removed = 5,
}

impl ActivationState {
    /// Convert from the status blob byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Created),
            2 => Some(Self::OtpUsed),
            3 => Some(Self::Active),
            4 => Some(Self::Blocked),
            5 => Some(Self::Removed),
            _ => None,
        }
    }
}

/// Complete activation status decoded from the encrypted status blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationStatus {
    /// State of the activation.
    pub state: ActivationState,
    /// Protocol version the server currently runs for this activation.
    pub current_version: u8,
    /// Protocol version the server offers to upgrade to.
    pub upgrade_version: u8,
    /// Failed authentication attempts in a row.
    pub fail_count: u32,
    /// Maximum allowed failed attempts in a row.
    pub max_fail_count: u32,
}

impl ActivationStatus {
    /// `max_fail_count - fail_count` when the activation is active,
    /// otherwise 0.
    pub fn remaining_attempts(&self) -> u32 {
        if self.state == ActivationState::Active {
            self.max_fail_count.saturating_sub(self.fail_count)
        } else {
            0
        }
    }

    /// Whether a protocol upgrade to a version this client supports is
    /// available.
    pub fn is_protocol_upgrade_available(&self) -> bool {
        self.state == ActivationState::Active
            && self.current_version < self.upgrade_version
            && self.upgrade_version <= ProtocolVersion::MAX_SUPPORTED as u8
    }
}

/// Scope of an ECIES encryptor constructed by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EciesEncryptorScope {
    /// The encryptor can be constructed even without a valid activation; it
    /// targets the master server public key.
    Application,
    /// The encryptor requires a valid activation; it targets the
    /// personalized server public key and mixes in the transport key.
    Activation,
}

/// Parameters for the first activation step.
#[derive(Clone, Default)]
pub struct ActivationStep1Param {
    /// Parsed activation code, absent for custom activations.
    pub activation_code: Option<crate::code::ActivationCode>,
}

/// Result of the first activation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationStep1Result {
    /// Device public key, Base64 encoded.
    pub device_public_key: String,
}

/// Parameters for the second activation step.
#[derive(Clone, Default)]
pub struct ActivationStep2Param {
    /// Activation identifier assigned by the server.
    pub activation_id: String,
    /// Personalized server public key, Base64 encoded.
    pub server_public_key: String,
    /// Initial value for the hash-based counter, Base64 encoded 16 bytes.
    pub ctr_data: String,
    /// Recovery data, when configured on the server.
    pub activation_recovery: Option<RecoveryData>,
}

/// Result of the second activation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationStep2Result {
    /// Short decimal code for out-of-band comparison with the server,
    /// formatted as two four-digit groups.
    pub activation_fingerprint: String,
}

/// Data required to finish a pending protocol upgrade.
#[derive(Clone, Default)]
pub struct ProtocolUpgradeData {
    /// Initial hash-based counter value for V3, Base64 encoded 16 bytes.
    pub ctr_data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_from_bits() {
        assert_eq!(
            SignatureFactor::from_bits(0x01).unwrap(),
            SignatureFactor::Possession
        );
        assert_eq!(
            SignatureFactor::from_bits(0x03).unwrap(),
            SignatureFactor::PossessionKnowledge
        );
        assert_eq!(
            SignatureFactor::from_bits(0x05).unwrap(),
            SignatureFactor::PossessionBiometry
        );
        assert_eq!(
            SignatureFactor::from_bits(0x07).unwrap(),
            SignatureFactor::PossessionKnowledgeBiometry
        );
    }

    #[test]
    fn test_factor_rejects_missing_possession() {
        for bits in [0x00, 0x02, 0x04, 0x06] {
            assert!(SignatureFactor::from_bits(bits).is_err(), "bits {bits:#x}");
        }
    }

    #[test]
    fn test_factor_rejects_unknown_bits() {
        assert!(SignatureFactor::from_bits(0x09).is_err());
        assert!(SignatureFactor::from_bits(0xff).is_err());
    }

    #[test]
    fn test_factor_labels() {
        assert_eq!(SignatureFactor::Possession.label(), "possession");
        assert_eq!(
            SignatureFactor::PossessionKnowledgeBiometry.label(),
            "possession_knowledge_biometry"
        );
    }

    #[test]
    fn test_request_data_validation() {
        let valid = HTTPRequestData::new(Vec::new(), "GET", "/pa/activation/status");
        assert!(valid.has_valid_data());

        let bad_method = HTTPRequestData::new(Vec::new(), "PATCH", "/x");
        assert!(!bad_method.has_valid_data());

        let empty_uri = HTTPRequestData::new(Vec::new(), "POST", "");
        assert!(!empty_uri.has_valid_data());

        let empty_method = HTTPRequestData::new(Vec::new(), "", "/x");
        assert!(!empty_method.has_valid_data());

        let bad_nonce = HTTPRequestData::new_offline(Vec::new(), "GET", "/x", &"A".repeat(23));
        assert!(!bad_nonce.has_valid_data());

        let good_nonce = HTTPRequestData::new_offline(Vec::new(), "GET", "/x", &"A".repeat(24));
        assert!(good_nonce.has_valid_data());
        assert!(good_nonce.is_offline_request());
    }

    #[test]
    fn test_auth_header_value_v3() {
        let signature = HTTPRequestDataSignature {
            version: "3.1".into(),
            activation_id: "ID".into(),
            application_key: "APPKEY".into(),
            nonce: "NONCE".into(),
            factor: "possession".into(),
            signature: "12345678".into(),
        };
        assert_eq!(
            signature.auth_header_value(),
            "PowerAuth pa_version=\"3.1\", pa_activation_id=\"ID\", \
             pa_application_key=\"APPKEY\", pa_nonce=\"NONCE\", \
             pa_signature_type=\"possession\", pa_signature=\"12345678\""
        );
    }

    #[test]
    fn test_auth_header_value_v2_omits_version() {
        let signature = HTTPRequestDataSignature {
            version: "2.1".into(),
            activation_id: "ID".into(),
            application_key: "APPKEY".into(),
            nonce: "NONCE".into(),
            factor: "possession".into(),
            signature: "12345678".into(),
        };
        let header = signature.auth_header_value();
        assert!(!header.contains("pa_version"));
        assert!(header.starts_with("PowerAuth pa_activation_id=\"ID\""));
    }

    #[test]
    fn test_activation_status_remaining_attempts() {
        let mut status = ActivationStatus {
            state: ActivationState::Active,
            current_version: 3,
            upgrade_version: 3,
            fail_count: 2,
            max_fail_count: 5,
        };
        assert_eq!(status.remaining_attempts(), 3);

        status.state = ActivationState::Blocked;
        assert_eq!(status.remaining_attempts(), 0);
    }

    #[test]
    fn test_protocol_upgrade_available() {
        let status = ActivationStatus {
            state: ActivationState::Active,
            current_version: 2,
            upgrade_version: 3,
            fail_count: 0,
            max_fail_count: 5,
        };
        assert!(status.is_protocol_upgrade_available());

        let too_new = ActivationStatus {
            upgrade_version: 4,
            ..status.clone()
        };
        assert!(!too_new.is_protocol_upgrade_available());

        let current = ActivationStatus {
            current_version: 3,
            upgrade_version: 3,
            ..status.clone()
        };
        assert!(!current.is_protocol_upgrade_available());

        let blocked = ActivationStatus {
            state: ActivationState::Blocked,
            ..status
        };
        assert!(!blocked.is_protocol_upgrade_available());
    }

    #[test]
    fn test_recovery_data_is_empty() {
        let empty = RecoveryData {
            recovery_code: String::new(),
            puk: String::new(),
        };
        assert!(empty.is_empty());

        let full = RecoveryData {
            recovery_code: "BBBBB-BBBBB-BBBBB-BTA6Q".into(),
            puk: "0123456789".into(),
        };
        assert!(!full.is_empty());
    }
}
