//! Multi-factor HTTP request signature computation.
//!
//! The signed payload is a normalized blob
//! `method & B64(uri) & B64(nonce) & B64(body) & application_secret`. For
//! every enabled factor, the stored signature key is unwrapped with its
//! unlock key (and the external encryption key layer when one is bound), a
//! per-request key is derived by MACing the counter state, and the final
//! 8-digit decimal code comes from RFC 4226 dynamic truncation. Codes join
//! with `-` in possession, knowledge, biometry order.
//!
//! The hash counter advances only after the full result is assembled; a
//! failing computation never moves it.

use crate::state::{counter_next, PersistentState};
use crate::types::{
    is_zero_key, HTTPRequestData, HTTPRequestDataSignature, ProtocolVersion, SessionSetup,
    SignatureFactor, SignatureUnlockKeys, MINIMAL_PASSWORD_LENGTH,
};
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pa_crypto::aes::unwrap_key;
use pa_crypto::kdf::pbkdf2_derive_key;
use pa_crypto::mac::{hmac_sha256, hotp_truncate};
use rand::RngCore;
use zeroize::Zeroizing;

/// Build the normalized data blob covered by the signature.
pub fn normalized_data(
    request: &HTTPRequestData,
    nonce: &[u8],
    application_secret: &str,
) -> Vec<u8> {
    let mut blob = Vec::with_capacity(
        request.method.len() + request.uri.len() * 2 + request.body.len() * 2 + 64,
    );
    blob.extend_from_slice(request.method.as_bytes());
    blob.push(b'&');
    blob.extend_from_slice(BASE64.encode(request.uri.as_bytes()).as_bytes());
    blob.push(b'&');
    blob.extend_from_slice(BASE64.encode(nonce).as_bytes());
    blob.push(b'&');
    blob.extend_from_slice(BASE64.encode(&request.body).as_bytes());
    blob.push(b'&');
    blob.extend_from_slice(application_secret.as_bytes());
    blob
}

/// Reduce a MAC to a zero-padded 8-digit decimal code.
pub fn decimal_code(mac: &[u8; 32]) -> String {
    format!("{:08}", hotp_truncate(mac) % 100_000_000)
}

fn wrapped_len(raw_len: usize) -> usize {
    (raw_len / 16 + 1) * 16
}

/// Unwrap a stored key: external encryption key layer first (when bound),
/// then the factor unlock key.
pub(crate) fn unwrap_stored_key(
    wrapped: &[u8],
    kek: &[u8; 16],
    eek: Option<&[u8; 16]>,
    raw_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    match eek {
        None => Ok(unwrap_key(kek, wrapped, raw_len)?),
        Some(eek) => {
            let inner = unwrap_key(eek, wrapped, wrapped_len(raw_len))?;
            Ok(unwrap_key(kek, &inner, raw_len)?)
        }
    }
}

/// Check that the unlock keys cover `factor` and pass local validation.
pub(crate) fn validate_unlock_keys(
    keys: &SignatureUnlockKeys,
    factor: SignatureFactor,
) -> Result<()> {
    match &keys.possession_unlock_key {
        None => return Err(Error::WrongParam("Missing possession unlock key".into())),
        Some(key) if is_zero_key(key) => {
            return Err(Error::WrongParam("Possession unlock key is all zeros".into()))
        }
        Some(_) => {}
    }
    if factor.includes_knowledge() {
        match &keys.user_password {
            None => return Err(Error::WrongParam("Missing user password".into())),
            Some(password) if password.len() < MINIMAL_PASSWORD_LENGTH => {
                return Err(Error::WrongParam("Password is too short".into()))
            }
            Some(_) => {}
        }
    }
    if factor.includes_biometry() {
        match &keys.biometry_unlock_key {
            None => return Err(Error::WrongParam("Missing biometry unlock key".into())),
            Some(key) if is_zero_key(key) => {
                return Err(Error::WrongParam("Biometry unlock key is all zeros".into()))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Resolve the external encryption key for this operation against the
/// state's binding flag. Both a missing and an unexpected key fail.
pub(crate) fn resolve_eek<'a>(
    setup: &'a SessionSetup,
    state: &PersistentState,
) -> Result<Option<&'a [u8; 16]>> {
    match (state.eek_used, setup.external_encryption_key.as_ref()) {
        (true, Some(eek)) => Ok(Some(eek)),
        (true, None) => Err(Error::WrongParam(
            "Activation is bound to an external encryption key".into(),
        )),
        (false, Some(_)) => Err(Error::WrongParam(
            "Activation is not bound to an external encryption key".into(),
        )),
        (false, None) => Ok(None),
    }
}

/// Counter bytes entering the per-request key derivation.
fn counter_bytes(state: &PersistentState) -> Result<[u8; 16]> {
    match state.protocol_version {
        ProtocolVersion::V3 => state.counter_data.ok_or_else(|| {
            Error::Encryption("Hash counter is missing from the session state".into())
        }),
        ProtocolVersion::V2 => {
            // Linear counter, big-endian, left-padded to one AES block.
            let mut bytes = [0u8; 16];
            bytes[8..].copy_from_slice(&state.counter_long.to_be_bytes());
            Ok(bytes)
        }
        ProtocolVersion::NA => Err(Error::Encryption("Unknown protocol version".into())),
    }
}

/// Compute an HTTP request signature.
///
/// `advance_counter` is false only for offline dry runs; everything else is
/// identical between the two modes.
pub(crate) fn sign_http_request(
    setup: &SessionSetup,
    state: &mut PersistentState,
    request: &HTTPRequestData,
    factor: SignatureFactor,
    keys: &SignatureUnlockKeys,
    advance_counter: bool,
) -> Result<HTTPRequestDataSignature> {
    if !request.has_valid_data() {
        return Err(Error::WrongParam("Invalid HTTP request data".into()));
    }
    validate_unlock_keys(keys, factor)?;
    let eek = resolve_eek(setup, state)?;
    if factor.includes_biometry() && state.biometry_key_wrapped.is_none() {
        return Err(Error::WrongParam(
            "Activation has no biometry factor key".into(),
        ));
    }

    let nonce: Vec<u8> = if request.is_offline_request() {
        let decoded = BASE64
            .decode(&request.offline_nonce)
            .map_err(|_| Error::Encryption("Offline nonce is not valid Base64".into()))?;
        if decoded.len() != 16 {
            return Err(Error::WrongParam("Offline nonce must decode to 16 bytes".into()));
        }
        decoded
    } else {
        let mut fresh = vec![0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut fresh);
        fresh
    };

    let blob = normalized_data(request, &nonce, &setup.application_secret);
    let ctr = counter_bytes(state)?;

    let mut codes: Vec<String> = Vec::with_capacity(3);
    // Canonical factor order: possession, knowledge, biometry.
    let possession_unlock = keys
        .possession_unlock_key
        .as_ref()
        .ok_or_else(|| Error::WrongParam("Missing possession unlock key".into()))?;
    codes.push(factor_code(
        &state.possession_key_wrapped,
        possession_unlock,
        eek,
        &ctr,
        &blob,
    )?);
    if factor.includes_knowledge() {
        let password = keys
            .user_password
            .as_ref()
            .ok_or_else(|| Error::WrongParam("Missing user password".into()))?;
        let kek = pbkdf2_derive_key(password.as_bytes(), &state.knowledge_salt);
        codes.push(factor_code(
            &state.knowledge_key_wrapped,
            &kek,
            eek,
            &ctr,
            &blob,
        )?);
    }
    if factor.includes_biometry() {
        let biometry_unlock = keys
            .biometry_unlock_key
            .as_ref()
            .ok_or_else(|| Error::WrongParam("Missing biometry unlock key".into()))?;
        let wrapped = state
            .biometry_key_wrapped
            .as_ref()
            .ok_or_else(|| Error::WrongParam("Activation has no biometry factor key".into()))?;
        codes.push(factor_code(wrapped, biometry_unlock, eek, &ctr, &blob)?);
    }

    let result = HTTPRequestDataSignature {
        version: state.protocol_version.version_string().to_owned(),
        activation_id: state.activation_id.clone(),
        application_key: setup.application_key.clone(),
        nonce: BASE64.encode(&nonce),
        factor: factor.label().to_owned(),
        signature: codes.join("-"),
    };

    // The output exists; only now may the counter move.
    if advance_counter {
        match state.protocol_version {
            ProtocolVersion::V3 => {
                if let Some(ctr_data) = state.counter_data {
                    state.counter_data = Some(counter_next(&ctr_data));
                }
            }
            _ => state.counter_long += 1,
        }
    }
    Ok(result)
}

fn factor_code(
    wrapped: &[u8],
    unlock: &[u8; 16],
    eek: Option<&[u8; 16]>,
    ctr: &[u8; 16],
    blob: &[u8],
) -> Result<String> {
    let base_key = unwrap_stored_key(wrapped, unlock, eek, 16)?;
    let request_key = hmac_sha256(&base_key, ctr);
    let mac = hmac_sha256(&request_key[..16], blob);
    Ok(decimal_code(&mac))
}
