//! Session state machine: activation lifecycle, signing entry points, ECIES
//! construction and state persistence.
//!
//! A session walks `Empty → Step1Done → Step2Done → Active`. Errors while
//! processing a transient step abandon the attempt and fall back to `Empty`;
//! calling a method in the wrong state fails with `WrongState` and leaves the
//! session untouched. Once active, the only mutations are counter advances,
//! protocol upgrades and external-encryption-key binding; `reset` destroys
//! everything.
//!
//! The session is intentionally single-threaded: counter advancement and
//! state serialization are sequential by nature, and callers serialize access
//! externally.

use crate::code::{validate_activation_code, validate_recovery_code, validate_recovery_puk};
use crate::ecies::EciesEncryptor;
use crate::signature;
use crate::state::{synchronize_counter, PersistentState};
use crate::status::decode_status_blob;
use crate::types::{
    is_zero_key, ActivationStatus, ActivationStep1Param, ActivationStep1Result,
    ActivationStep2Param, ActivationStep2Result, EciesEncryptorScope, HTTPRequestData,
    HTTPRequestDataSignature, ProtocolUpgradeData, ProtocolVersion, SessionSetup, SignedData,
    SigningDataKey, SignatureFactor, SignatureUnlockKeys, MINIMAL_PASSWORD_LENGTH,
};
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pa_crypto::aes::{unwrap_key, wrap_key};
use pa_crypto::ecc::normalize_public_key;
use pa_crypto::kdf::{kdf_x963_sha256, pbkdf2_derive_key};
use pa_crypto::sign::{ecdsa_sign_data, ecdsa_verify_data};
use pa_crypto::EcKeyPair;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

// Info strings for the KDF_X9.63 expansion of the activation ECDH secret.
const KDF_INFO_SIGNATURE_POSSESSION: &[u8] = b"signature-possession";
const KDF_INFO_SIGNATURE_KNOWLEDGE: &[u8] = b"signature-knowledge";
const KDF_INFO_SIGNATURE_BIOMETRY: &[u8] = b"signature-biometry";
const KDF_INFO_TRANSPORT: &[u8] = b"transport";
const KDF_INFO_VAULT: &[u8] = b"vault";

/// Client-side protocol session.
pub struct Session {
    setup: SessionSetup,
    state: State,
}

enum State {
    Empty,
    Step1(Step1State),
    Step2(Box<Step2State>),
    Active(PersistentState),
}

struct Step1State {
    device_key: EcKeyPair,
}

struct Step2State {
    device_key: EcKeyPair,
    activation_id: String,
    server_public_key: Vec<u8>,
    ctr_data: [u8; 16],
    possession_key: Zeroizing<[u8; 16]>,
    knowledge_key: Zeroizing<[u8; 16]>,
    biometry_key: Zeroizing<[u8; 16]>,
    transport_key: Zeroizing<[u8; 16]>,
    // Derived alongside the signature keys; vault operations live outside
    // this core, so the key does not survive the commit.
    #[allow(dead_code)]
    vault_key: Zeroizing<[u8; 16]>,
    recovery: Option<crate::types::RecoveryData>,
}

impl Session {
    /// Create a session over immutable setup constants.
    pub fn new(setup: SessionSetup) -> Self {
        Self {
            setup,
            state: State::Empty,
        }
    }

    /// Whether the setup carries all required constants.
    pub fn has_valid_setup(&self) -> bool {
        self.setup.has_valid_setup()
    }

    /// The setup this session was created with.
    pub fn setup(&self) -> &SessionSetup {
        &self.setup
    }

    /// Host-assigned session tag from the setup.
    pub fn session_identifier(&self) -> u32 {
        self.setup.session_identifier
    }

    /// Whether a committed activation is present.
    pub fn has_valid_activation(&self) -> bool {
        matches!(self.state, State::Active(_))
    }

    /// Whether an activation is in progress (between step 1 and commit).
    pub fn has_pending_activation(&self) -> bool {
        matches!(self.state, State::Step1(_) | State::Step2(_))
    }

    /// Activation identifier of the committed activation.
    pub fn activation_identifier(&self) -> Option<&str> {
        match &self.state {
            State::Active(state) => Some(&state.activation_id),
            _ => None,
        }
    }

    /// Protocol version of the committed activation, `NA` otherwise.
    pub fn protocol_version(&self) -> ProtocolVersion {
        match &self.state {
            State::Active(state) => state.protocol_version,
            _ => ProtocolVersion::NA,
        }
    }

    /// Drop every activation artifact and return to the empty state.
    pub fn reset(&mut self) {
        self.state = State::Empty;
    }

    // === Activation ===

    /// First activation step: verify the activation code signature (when
    /// present) and generate the device key pair.
    pub fn start_activation(
        &mut self,
        param: &ActivationStep1Param,
    ) -> Result<ActivationStep1Result> {
        if !matches!(self.state, State::Empty) {
            return Err(Error::WrongState(
                "Activation was already started or completed".into(),
            ));
        }
        if let Some(code) = &param.activation_code {
            if !validate_activation_code(&code.activation_code) {
                return Err(Error::WrongParam("Invalid activation code".into()));
            }
            if let Some(signature_b64) = &code.activation_signature {
                let signature = BASE64.decode(signature_b64).map_err(|_| {
                    Error::Encryption("Activation code signature is not valid Base64".into())
                })?;
                let master_key = self.master_server_public_key_bytes()?;
                ecdsa_verify_data(&master_key, code.activation_code.as_bytes(), &signature)?;
            }
        }

        let device_key = EcKeyPair::generate()?;
        let result = ActivationStep1Result {
            device_public_key: BASE64.encode(device_key.public_key()),
        };
        self.state = State::Step1(Step1State { device_key });
        Ok(result)
    }

    /// Second activation step: run ECDH against the personalized server key
    /// and derive the working keys.
    ///
    /// On a cryptographic failure the pending activation is abandoned and
    /// the session returns to the empty state.
    pub fn validate_activation_response(
        &mut self,
        param: &ActivationStep2Param,
    ) -> Result<ActivationStep2Result> {
        if !matches!(self.state, State::Step1(_)) {
            return Err(Error::WrongState(
                "Activation step 1 was not performed".into(),
            ));
        }
        if param.activation_id.is_empty() {
            return Err(Error::WrongParam("Missing activation identifier".into()));
        }
        if let Some(recovery) = &param.activation_recovery {
            if !validate_recovery_code(&recovery.recovery_code)
                || !validate_recovery_puk(&recovery.puk)
            {
                return Err(Error::WrongParam("Invalid recovery data".into()));
            }
        }

        // From here on, failure means the whole attempt is abandoned.
        let step1 = match std::mem::replace(&mut self.state, State::Empty) {
            State::Step1(step1) => step1,
            other => {
                self.state = other;
                return Err(Error::WrongState(
                    "Activation step 1 was not performed".into(),
                ));
            }
        };

        let server_public_raw = BASE64
            .decode(&param.server_public_key)
            .map_err(|_| Error::Encryption("Server public key is not valid Base64".into()))?;
        let server_public_key = normalize_public_key(&server_public_raw)?;

        let ctr_raw = BASE64
            .decode(&param.ctr_data)
            .map_err(|_| Error::Encryption("Counter data is not valid Base64".into()))?;
        let ctr_data: [u8; 16] = ctr_raw
            .try_into()
            .map_err(|_| Error::Encryption("Counter data must be 16 bytes".into()))?;

        let shared_secret = step1.device_key.ecdh(&server_public_key)?;
        let possession_key =
            derive_working_key(shared_secret.as_slice(), KDF_INFO_SIGNATURE_POSSESSION)?;
        let knowledge_key =
            derive_working_key(shared_secret.as_slice(), KDF_INFO_SIGNATURE_KNOWLEDGE)?;
        let biometry_key =
            derive_working_key(shared_secret.as_slice(), KDF_INFO_SIGNATURE_BIOMETRY)?;
        let transport_key = derive_working_key(shared_secret.as_slice(), KDF_INFO_TRANSPORT)?;
        let vault_key = derive_working_key(shared_secret.as_slice(), KDF_INFO_VAULT)?;

        let fingerprint = activation_fingerprint(
            step1.device_key.public_key(),
            &param.activation_id,
            &server_public_key,
        );

        self.state = State::Step2(Box::new(Step2State {
            device_key: step1.device_key,
            activation_id: param.activation_id.clone(),
            server_public_key,
            ctr_data,
            possession_key,
            knowledge_key,
            biometry_key,
            transport_key,
            vault_key,
            recovery: param.activation_recovery.clone(),
        }));
        Ok(ActivationStep2Result {
            activation_fingerprint: fingerprint,
        })
    }

    /// Commit the activation: wrap the working keys under the unlock keys
    /// and materialize the persistent state.
    ///
    /// The biometry key is stored only when a biometry unlock key is
    /// supplied. The same possession unlock key must be used for every later
    /// signing operation.
    pub fn complete_activation(&mut self, keys: &SignatureUnlockKeys) -> Result<()> {
        if !matches!(self.state, State::Step2(_)) {
            return Err(Error::WrongState(
                "Activation step 2 was not performed".into(),
            ));
        }
        let possession_unlock = match &keys.possession_unlock_key {
            None => return Err(Error::WrongParam("Missing possession unlock key".into())),
            Some(key) if is_zero_key(key) => {
                return Err(Error::WrongParam("Possession unlock key is all zeros".into()))
            }
            Some(key) => *key,
        };
        let password = match &keys.user_password {
            None => return Err(Error::WrongParam("Missing user password".into())),
            Some(p) if p.len() < MINIMAL_PASSWORD_LENGTH => {
                return Err(Error::WrongParam("Password is too short".into()))
            }
            Some(p) => p.clone(),
        };
        if let Some(biometry) = &keys.biometry_unlock_key {
            if is_zero_key(biometry) {
                return Err(Error::WrongParam("Biometry unlock key is all zeros".into()));
            }
        }
        let eek = self.setup.external_encryption_key;

        let pending = match std::mem::replace(&mut self.state, State::Empty) {
            State::Step2(pending) => pending,
            other => {
                self.state = other;
                return Err(Error::WrongState(
                    "Activation step 2 was not performed".into(),
                ));
            }
        };

        let mut knowledge_salt = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut knowledge_salt);
        let knowledge_kek = pbkdf2_derive_key(password.as_bytes(), &knowledge_salt);

        let device_scalar = pending.device_key.private_key_bytes();
        let persistent = PersistentState {
            activation_id: pending.activation_id.clone(),
            server_public_key: pending.server_public_key.clone(),
            device_private_key_wrapped: wrap_layered(&*device_scalar, &possession_unlock, eek)?,
            possession_key_wrapped: wrap_layered(&*pending.possession_key, &possession_unlock, eek)?,
            knowledge_salt,
            knowledge_key_wrapped: wrap_layered(&*pending.knowledge_key, &knowledge_kek, eek)?,
            biometry_key_wrapped: match &keys.biometry_unlock_key {
                Some(biometry_unlock) => {
                    Some(wrap_layered(&*pending.biometry_key, biometry_unlock, eek)?)
                }
                None => None,
            },
            transport_key_wrapped: wrap_key(&possession_unlock, &*pending.transport_key)?,
            counter_data: Some(pending.ctr_data),
            counter_long: 0,
            protocol_version: ProtocolVersion::V3,
            upgrade_version: ProtocolVersion::V3,
            pending_upgrade: false,
            eek_used: eek.is_some(),
        };
        self.state = State::Active(persistent);
        Ok(())
    }

    /// Recovery data captured during the last step 2, if the server sent
    /// any. Consumed by the host before commit.
    pub fn activation_recovery_data(&self) -> Option<&crate::types::RecoveryData> {
        match &self.state {
            State::Step2(pending) => pending.recovery.as_ref(),
            _ => None,
        }
    }

    // === State persistence ===

    /// Serialize the committed activation into a state blob.
    pub fn save_state(&self) -> Result<Vec<u8>> {
        match &self.state {
            State::Active(state) => Ok(state.serialize()),
            _ => Err(Error::WrongState("No activation to serialize".into())),
        }
    }

    /// Restore a previously serialized activation, replacing whatever the
    /// session held. A parse failure leaves the session unchanged.
    pub fn restore_state(&mut self, blob: &[u8]) -> Result<()> {
        let state = PersistentState::parse(blob)?;
        self.state = State::Active(state);
        Ok(())
    }

    // === Signatures ===

    /// Sign an HTTP request and advance the signature counter.
    pub fn sign_http_request(
        &mut self,
        request: &HTTPRequestData,
        factor: SignatureFactor,
        keys: &SignatureUnlockKeys,
    ) -> Result<HTTPRequestDataSignature> {
        let state = match &mut self.state {
            State::Active(state) => state,
            _ => return Err(Error::WrongState("Session has no valid activation".into())),
        };
        signature::sign_http_request(&self.setup, state, request, factor, keys, true)
    }

    /// Compute an offline signature without advancing the counter.
    ///
    /// Only requests with an external nonce can be dry-run; the computation
    /// is otherwise identical to [`Session::sign_http_request`].
    pub fn sign_http_request_dry_run(
        &self,
        request: &HTTPRequestData,
        factor: SignatureFactor,
        keys: &SignatureUnlockKeys,
    ) -> Result<HTTPRequestDataSignature> {
        if !request.is_offline_request() {
            return Err(Error::WrongParam(
                "Dry run is only available for offline requests".into(),
            ));
        }
        let state = self.active_state()?;
        let mut scratch = state.clone();
        signature::sign_http_request(&self.setup, &mut scratch, request, factor, keys, false)
    }

    /// Sign arbitrary data with the device private key (ECDSA, DER output).
    pub fn sign_data_with_device_private_key(
        &self,
        data: &[u8],
        keys: &SignatureUnlockKeys,
    ) -> Result<Vec<u8>> {
        let state = self.active_state()?;
        let possession = require_possession(keys)?;
        let eek = signature::resolve_eek(&self.setup, state)?;
        let scalar =
            signature::unwrap_stored_key(&state.device_private_key_wrapped, &possession, eek, 32)?;
        let device_key = EcKeyPair::from_private(&scalar)?;
        Ok(ecdsa_sign_data(&device_key, data)?)
    }

    /// Verify data signed by the server with the key selected in
    /// `signed.signing_key`.
    pub fn verify_server_signed_data(&self, signed: &SignedData) -> Result<()> {
        if signed.data.is_empty() || signed.signature.is_empty() {
            return Err(Error::WrongParam("Missing data or signature".into()));
        }
        let key = match signed.signing_key {
            SigningDataKey::EcdsaMasterServerKey => self.master_server_public_key_bytes()?,
            SigningDataKey::EcdsaPersonalizedKey => {
                self.active_state()?.server_public_key.clone()
            }
        };
        Ok(ecdsa_verify_data(&key, &signed.data, &signed.signature)?)
    }

    // === Status ===

    /// Decrypt an encrypted status blob and resynchronize the local hash
    /// counter against the server's counter hash.
    pub fn decode_status(
        &mut self,
        blob: &[u8],
        keys: &SignatureUnlockKeys,
    ) -> Result<ActivationStatus> {
        let state = match &mut self.state {
            State::Active(state) => state,
            _ => return Err(Error::WrongState("Session has no valid activation".into())),
        };
        let possession = require_possession(keys)?;
        signature::resolve_eek(&self.setup, state)?;
        let transport =
            signature::unwrap_stored_key(&state.transport_key_wrapped, &possession, None, 16)?;
        let mut transport_key = [0u8; 16];
        transport_key.copy_from_slice(&transport);

        let decoded = decode_status_blob(blob, &transport_key)?;
        if let Some(local) = state.counter_data {
            if let Some(synchronized) = synchronize_counter(&local, &decoded.counter_hash) {
                state.counter_data = Some(synchronized);
            }
        }
        Ok(decoded.status)
    }

    // === Protocol upgrade ===

    /// Whether a protocol upgrade was started but not committed.
    pub fn pending_protocol_upgrade(&self) -> bool {
        matches!(&self.state, State::Active(state) if state.pending_upgrade)
    }

    /// Start a protocol upgrade towards the highest supported version.
    ///
    /// Until committed, signing continues with the pre-upgrade protocol
    /// version.
    pub fn start_protocol_upgrade(&mut self) -> Result<()> {
        let state = self.active_state_mut()?;
        if state.pending_upgrade {
            return Err(Error::WrongState("Upgrade is already pending".into()));
        }
        if state.protocol_version >= ProtocolVersion::MAX_SUPPORTED {
            return Err(Error::WrongState("Nothing to upgrade to".into()));
        }
        state.pending_upgrade = true;
        state.upgrade_version = ProtocolVersion::MAX_SUPPORTED;
        Ok(())
    }

    /// Commit a pending upgrade with the server-provided data, swapping the
    /// linear counter for the hash-based one.
    pub fn commit_protocol_upgrade(&mut self, data: &ProtocolUpgradeData) -> Result<()> {
        let state = self.active_state_mut()?;
        if !state.pending_upgrade {
            return Err(Error::WrongState("No upgrade is pending".into()));
        }
        let ctr_raw = BASE64
            .decode(&data.ctr_data)
            .map_err(|_| Error::Encryption("Counter data is not valid Base64".into()))?;
        let ctr_data: [u8; 16] = ctr_raw
            .try_into()
            .map_err(|_| Error::Encryption("Counter data must be 16 bytes".into()))?;

        state.counter_data = Some(ctr_data);
        state.counter_long = 0;
        state.protocol_version = state.upgrade_version;
        state.pending_upgrade = false;
        Ok(())
    }

    /// Abandon a pending upgrade and keep the current protocol version.
    pub fn cancel_protocol_upgrade(&mut self) -> Result<()> {
        let state = self.active_state_mut()?;
        if !state.pending_upgrade {
            return Err(Error::WrongState("No upgrade is pending".into()));
        }
        state.pending_upgrade = false;
        state.upgrade_version = state.protocol_version;
        Ok(())
    }

    // === ECIES ===

    /// Construct an ECIES encryptor for the requested scope.
    ///
    /// Application scope needs no activation and targets the master server
    /// key. Activation scope requires a committed activation and the
    /// possession unlock key for the transport key; the transport key is
    /// appended to `shared_info1`.
    pub fn ecies_encryptor(
        &self,
        scope: EciesEncryptorScope,
        keys: Option<&SignatureUnlockKeys>,
        shared_info1: &[u8],
        shared_info2: &[u8],
    ) -> Result<EciesEncryptor> {
        match scope {
            EciesEncryptorScope::Application => {
                let master_key = self.master_server_public_key_bytes()?;
                Ok(EciesEncryptor::new(&master_key, shared_info1, shared_info2))
            }
            EciesEncryptorScope::Activation => {
                let state = self.active_state()?;
                let keys = keys.ok_or_else(|| {
                    Error::WrongParam("Unlock keys are required for activation scope".into())
                })?;
                let possession = require_possession(keys)?;
                signature::resolve_eek(&self.setup, state)?;
                let transport = signature::unwrap_stored_key(
                    &state.transport_key_wrapped,
                    &possession,
                    None,
                    16,
                )?;
                let mut info1 = Vec::with_capacity(shared_info1.len() + transport.len());
                info1.extend_from_slice(shared_info1);
                info1.extend_from_slice(&transport);
                Ok(EciesEncryptor::new(
                    &state.server_public_key,
                    &info1,
                    shared_info2,
                ))
            }
        }
    }

    // === External encryption key ===

    /// Whether the setup currently holds an external encryption key.
    pub fn has_external_encryption_key(&self) -> bool {
        self.setup.external_encryption_key.is_some()
    }

    /// Attach the external encryption key to a session restored from an
    /// EEK-bound state blob.
    pub fn set_external_encryption_key(&mut self, eek: &[u8]) -> Result<()> {
        let eek = validate_eek(eek)?;
        if let State::Active(state) = &self.state {
            if !state.eek_used {
                return Err(Error::WrongState(
                    "Activation is not bound to an external encryption key".into(),
                ));
            }
        }
        if let Some(existing) = &self.setup.external_encryption_key {
            if *existing != eek {
                return Err(Error::WrongParam(
                    "A different external encryption key is already set".into(),
                ));
            }
        }
        self.setup.external_encryption_key = Some(eek);
        Ok(())
    }

    /// Bind an existing activation to an external encryption key by adding
    /// an outer wrapping layer to the stored keys.
    pub fn add_external_encryption_key(&mut self, eek: &[u8]) -> Result<()> {
        let eek = validate_eek(eek)?;
        let state = self.active_state_mut()?;
        if state.eek_used {
            return Err(Error::WrongState(
                "Activation is already bound to an external encryption key".into(),
            ));
        }
        state.device_private_key_wrapped = wrap_key(&eek, &state.device_private_key_wrapped)?;
        state.possession_key_wrapped = wrap_key(&eek, &state.possession_key_wrapped)?;
        state.knowledge_key_wrapped = wrap_key(&eek, &state.knowledge_key_wrapped)?;
        if let Some(biometry) = &state.biometry_key_wrapped {
            state.biometry_key_wrapped = Some(wrap_key(&eek, biometry)?);
        }
        state.eek_used = true;
        self.setup.external_encryption_key = Some(eek);
        Ok(())
    }

    /// Remove the external encryption key layer from the stored keys.
    pub fn remove_external_encryption_key(&mut self) -> Result<()> {
        let eek = match (&self.state, &self.setup.external_encryption_key) {
            (State::Active(state), Some(eek)) if state.eek_used => *eek,
            (State::Active(state), None) if state.eek_used => {
                return Err(Error::WrongState(
                    "External encryption key was not provided".into(),
                ))
            }
            (State::Active(_), _) => {
                return Err(Error::WrongState(
                    "Activation is not bound to an external encryption key".into(),
                ))
            }
            _ => return Err(Error::WrongState("Session has no valid activation".into())),
        };
        let state = self.active_state_mut()?;

        // Unwrap every layer first so a wrong key cannot leave the state
        // half-rewrapped.
        let device = unwrap_key(&eek, &state.device_private_key_wrapped, 48)?;
        let possession = unwrap_key(&eek, &state.possession_key_wrapped, 32)?;
        let knowledge = unwrap_key(&eek, &state.knowledge_key_wrapped, 32)?;
        let biometry = match &state.biometry_key_wrapped {
            Some(wrapped) => Some(unwrap_key(&eek, wrapped, 32)?),
            None => None,
        };

        state.device_private_key_wrapped = device.to_vec();
        state.possession_key_wrapped = possession.to_vec();
        state.knowledge_key_wrapped = knowledge.to_vec();
        state.biometry_key_wrapped = biometry.map(|b| b.to_vec());
        state.eek_used = false;
        self.setup.external_encryption_key = None;
        Ok(())
    }

    // === Biometry ===

    /// Whether the committed activation stores a biometry factor key.
    pub fn has_biometry_factor(&self) -> bool {
        matches!(&self.state, State::Active(state) if state.has_biometry())
    }

    /// Drop the biometry factor key from the activation. A no-op when none
    /// is stored.
    pub fn remove_biometry_factor(&mut self) -> Result<()> {
        let state = self.active_state_mut()?;
        state.biometry_key_wrapped = None;
        Ok(())
    }

    // === Unlock key helpers ===

    /// Generate a fresh random 16-byte signature unlock key.
    pub fn generate_signature_unlock_key() -> [u8; 16] {
        let mut key = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut key);
        key
    }

    /// Deterministically reduce arbitrary device data (hardware identifiers
    /// and the like) into a 16-byte signature unlock key.
    pub fn normalize_signature_unlock_key_from_data(data: &[u8]) -> [u8; 16] {
        let digest = Sha256::digest(data);
        let mut key = [0u8; 16];
        key.copy_from_slice(&digest[..16]);
        key
    }

    // === Internal ===

    fn active_state(&self) -> Result<&PersistentState> {
        match &self.state {
            State::Active(state) => Ok(state),
            _ => Err(Error::WrongState("Session has no valid activation".into())),
        }
    }

    fn active_state_mut(&mut self) -> Result<&mut PersistentState> {
        match &mut self.state {
            State::Active(state) => Ok(state),
            _ => Err(Error::WrongState("Session has no valid activation".into())),
        }
    }

    fn master_server_public_key_bytes(&self) -> Result<Vec<u8>> {
        let raw = BASE64
            .decode(&self.setup.master_server_public_key)
            .map_err(|_| Error::Encryption("Master server public key is not valid Base64".into()))?;
        Ok(raw)
    }
}

fn derive_working_key(shared_secret: &[u8], info: &[u8]) -> Result<Zeroizing<[u8; 16]>> {
    let okm = kdf_x963_sha256(shared_secret, info, 16)?;
    let mut key = Zeroizing::new([0u8; 16]);
    key.copy_from_slice(&okm);
    Ok(key)
}

fn wrap_layered(raw: &[u8], kek: &[u8; 16], eek: Option<[u8; 16]>) -> Result<Vec<u8>> {
    let inner = wrap_key(kek, raw)?;
    match eek {
        Some(eek) => Ok(wrap_key(&eek, &inner)?),
        None => Ok(inner),
    }
}

fn require_possession(keys: &SignatureUnlockKeys) -> Result<[u8; 16]> {
    match &keys.possession_unlock_key {
        None => Err(Error::WrongParam("Missing possession unlock key".into())),
        Some(key) if is_zero_key(key) => {
            Err(Error::WrongParam("Possession unlock key is all zeros".into()))
        }
        Some(key) => Ok(*key),
    }
}

fn validate_eek(eek: &[u8]) -> Result<[u8; 16]> {
    let eek: [u8; 16] = eek.try_into().map_err(|_| {
        Error::WrongParam("External encryption key must be 16 bytes".into())
    })?;
    if is_zero_key(&eek) {
        return Err(Error::WrongParam(
            "External encryption key is all zeros".into(),
        ));
    }
    Ok(eek)
}

/// Short decimal fingerprint over the activation's public parameters.
///
/// `SHA-256(device_pub || activation_id || server_pub)`, last four bytes
/// big-endian with the sign bit cleared, reduced mod 10^8 and rendered as two
/// four-digit groups.
fn activation_fingerprint(
    device_public: &[u8],
    activation_id: &str,
    server_public: &[u8],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(device_public);
    hasher.update(activation_id.as_bytes());
    hasher.update(server_public);
    let digest = hasher.finalize();
    let tail = u32::from_be_bytes([digest[28], digest[29], digest[30], digest[31]]) & 0x7fff_ffff;
    let code = tail % 100_000_000;
    format!("{:04}-{:04}", code / 10_000, code % 10_000)
}
