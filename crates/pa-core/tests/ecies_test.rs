//! ECIES round-trip and tamper-rejection conformance tests.

use pa_core::ecies::{EciesCryptogram, EciesDecryptor, EciesEncryptor};
use pa_core::Error;
use pa_crypto::EcKeyPair;

struct TestData {
    request_data: &'static str,
    response_data: &'static str,
    shared_info1: &'static str,
    shared_info2: &'static str,
}

const TEST_DATA: &[TestData] = &[
    TestData {
        request_data: "hello world!",
        response_data: "hey there!",
        shared_info1: "",
        shared_info2: "",
    },
    TestData {
        request_data: "All your base are belong to us!",
        response_data: "NOPE!",
        shared_info1: "very secret information",
        shared_info2: "not-so-secret",
    },
    TestData {
        request_data: "It's over Johny! It's over.",
        response_data: "Nothing is over! Nothing! You just don't turn it off!",
        shared_info1: "0123456789abcdef",
        shared_info2: "John Tramonta",
    },
    TestData {
        request_data: "",
        response_data: "",
        shared_info1: "12345-56789",
        shared_info2: "ZX128",
    },
    TestData {
        request_data: "{}",
        response_data: "{}",
        shared_info1: "",
        shared_info2: "",
    },
    TestData {
        request_data: "{}",
        response_data: "",
        shared_info1: "",
        shared_info2: "",
    },
];

#[test]
fn test_encryptor_decryptor_roundtrips() {
    let master_keypair = EcKeyPair::generate().unwrap();
    let master_public = master_keypair.public_key().to_vec();
    let master_private = master_keypair.private_key_bytes();

    for data in TEST_DATA {
        let mut client_encryptor = EciesEncryptor::new(
            &master_public,
            data.shared_info1.as_bytes(),
            data.shared_info2.as_bytes(),
        );
        let server_key = EcKeyPair::from_private(&*master_private).unwrap();
        let mut server_decryptor = EciesDecryptor::new(
            server_key,
            data.shared_info1.as_bytes(),
            data.shared_info2.as_bytes(),
        );

        let request = client_encryptor
            .encrypt_request(data.request_data.as_bytes())
            .unwrap();
        assert!(!request.body.is_empty());
        assert!(!request.mac.is_empty());
        assert!(!request.key.is_empty());

        let server_received = server_decryptor.decrypt_request(&request).unwrap();
        assert_eq!(&*server_received, data.request_data.as_bytes());

        let response = server_decryptor
            .encrypt_response(data.response_data.as_bytes())
            .unwrap();
        assert!(!response.body.is_empty());
        assert!(!response.mac.is_empty());
        assert!(response.key.is_empty());

        let client_received = client_encryptor.decrypt_response(&response).unwrap();
        assert_eq!(&*client_received, data.response_data.as_bytes());
    }
}

/// Empty plaintext still produces a full cryptogram: one padding block of
/// body, a 32-byte MAC and a 33-byte compressed ephemeral key.
#[test]
fn test_empty_plaintext_cryptogram_shape() {
    let server = EcKeyPair::generate().unwrap();
    let mut encryptor = EciesEncryptor::new(server.public_key(), b"", b"");

    let request = encryptor.encrypt_request(b"").unwrap();
    assert_eq!(request.body.len(), 16);
    assert_eq!(request.mac.len(), 32);
    assert_eq!(request.key.len(), 33);

    let mut decryptor = EciesDecryptor::new(server, b"", b"");
    let plaintext = decryptor.decrypt_request(&request).unwrap();
    assert!(plaintext.is_empty());
}

#[test]
fn test_invalid_curve_point_rejected() {
    let invalid_public_key =
        hex::decode("02B70BF043C144935756F8F4578C369CF960EE510A5A0F90E93A373A21F0D1397F").unwrap();
    let mut encryptor = EciesEncryptor::new(&invalid_public_key, b"", b"");

    let result = encryptor.encrypt_request(b"should not be encrypted");
    assert!(matches!(result, Err(Error::Encryption(_))));
    // No envelope was established either.
    assert!(!encryptor.can_decrypt_response());
}

/// Flipping any single bit of any cryptogram field must fail the exchange.
#[test]
fn test_request_bit_flips_rejected() {
    let server = EcKeyPair::generate().unwrap();
    let server_private = server.private_key_bytes();
    let mut encryptor = EciesEncryptor::new(server.public_key(), b"si1", b"si2");
    let request = encryptor.encrypt_request(b"tamper with me").unwrap();

    let fields: [fn(&mut EciesCryptogram) -> &mut Vec<u8>; 4] = [
        |c| &mut c.body,
        |c| &mut c.mac,
        |c| &mut c.key,
        |c| &mut c.nonce,
    ];
    for field in fields {
        for byte_index in [0usize, 7] {
            let mut tampered = request.clone();
            let target = field(&mut tampered);
            let index = byte_index.min(target.len() - 1);
            target[index] ^= 0x01;

            let key = EcKeyPair::from_private(&*server_private).unwrap();
            let mut decryptor = EciesDecryptor::new(key, b"si1", b"si2");
            assert!(
                matches!(decryptor.decrypt_request(&tampered), Err(Error::Encryption(_))),
                "tampered field accepted"
            );
        }
    }
}

#[test]
fn test_response_bit_flips_rejected() {
    let server = EcKeyPair::generate().unwrap();
    let server_private = server.private_key_bytes();
    let mut encryptor = EciesEncryptor::new(server.public_key(), b"", b"");
    let request = encryptor.encrypt_request(b"request").unwrap();

    let server_key = EcKeyPair::from_private(&*server_private).unwrap();
    let mut decryptor = EciesDecryptor::new(server_key, b"", b"");
    decryptor.decrypt_request(&request).unwrap();
    let response = decryptor.encrypt_response(b"response").unwrap();

    for flip in ["body", "mac", "nonce"] {
        let mut tampered = response.clone();
        match flip {
            "body" => tampered.body[0] ^= 0x01,
            "mac" => tampered.mac[0] ^= 0x01,
            _ => tampered.nonce[0] ^= 0x01,
        }
        assert!(
            matches!(encryptor.decrypt_response(&tampered), Err(Error::Encryption(_))),
            "tampered {flip} accepted"
        );
    }

    // The untampered response still decrypts.
    assert_eq!(&*encryptor.decrypt_response(&response).unwrap(), b"response");
}

/// Different shared_info1 values derive different envelopes, so an exchange
/// across mismatched infos fails like any other tamper.
#[test]
fn test_shared_info_mismatch_rejected() {
    let server = EcKeyPair::generate().unwrap();
    let server_private = server.private_key_bytes();

    let mut encryptor = EciesEncryptor::new(server.public_key(), b"info-a", b"si2");
    let request = encryptor.encrypt_request(b"data").unwrap();

    let key = EcKeyPair::from_private(&*server_private).unwrap();
    let mut decryptor = EciesDecryptor::new(key, b"info-b", b"si2");
    assert!(decryptor.decrypt_request(&request).is_err());
}
