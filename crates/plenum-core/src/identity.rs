//! Identity and signing.
//!
//! Every principal owns an ed25519 keypair: the public half is published in
//! the principal's public repository at `identity/public.json`, the secret
//! half stays in the private repository at `identity/private.json`. Votes and
//! other mail travel as [`SignedPlaintext`] envelopes that anyone can verify
//! against the sender's published credentials.
//!
//! Secret key bytes ride in [`zeroize::Zeroizing`] containers and are never
//! logged.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::cancel::CancelToken;
use crate::error::{GovError, Result};
use crate::journal::{ClonedOwner, ClonedRepo, Namespace};

/// Location of the published credentials in a public tree.
pub fn public_credentials_ns() -> Namespace {
    Namespace::new(["identity", "public.json"])
}

/// Location of the secret credentials in a private tree.
pub fn private_credentials_ns() -> Namespace {
    Namespace::new(["identity", "private.json"])
}

/// A principal's published verification key, hex-encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicCredentials {
    /// Hex-encoded ed25519 verifying key.
    pub public_key: String,
}

/// A principal's full credentials, stored only in that principal's private
/// repository.
#[derive(Clone, Serialize, Deserialize)]
pub struct PrivateCredentials {
    /// The public half.
    pub public: PublicCredentials,
    secret_key: String,
}

impl PrivateCredentials {
    /// Generates a fresh keypair from the operating system RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let secret_bytes = Zeroizing::new(signing_key.to_bytes());
        Self {
            public: PublicCredentials {
                public_key: hex::encode(signing_key.verifying_key().to_bytes()),
            },
            secret_key: hex::encode(secret_bytes.as_slice()),
        }
    }

    /// Signs `payload`, producing a self-describing envelope.
    pub fn sign(&self, payload: impl Into<String>) -> Result<SignedPlaintext> {
        let payload = payload.into();
        let secret = decode32("secret key", &self.secret_key)?;
        let signing_key = SigningKey::from_bytes(&secret);
        let signature = signing_key.sign(payload.as_bytes());
        Ok(SignedPlaintext {
            payload,
            signature: hex::encode(signature.to_bytes()),
            public_key: self.public.public_key.clone(),
        })
    }
}

/// A payload bundled with its signature and the signer's public key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPlaintext {
    /// The signed payload, verbatim.
    pub payload: String,
    /// Hex-encoded ed25519 signature over the payload bytes.
    pub signature: String,
    /// Hex-encoded verifying key of the signer.
    pub public_key: String,
}

impl SignedPlaintext {
    /// Verifies the signature and that it was produced by `expected`.
    pub fn verify(&self, expected: &PublicCredentials) -> Result<()> {
        if self.public_key != expected.public_key {
            return Err(GovError::signature(
                "envelope key does not match the sender's published credentials",
            ));
        }
        let key_bytes = decode32("public key", &self.public_key)?;
        let verifying_key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|err| GovError::signature(format!("malformed public key: {err}")))?;
        let sig_bytes = decode64("signature", &self.signature)?;
        let signature = Signature::from_bytes(&sig_bytes);
        verifying_key
            .verify(self.payload.as_bytes(), &signature)
            .map_err(|err| GovError::signature(format!("bad signature: {err}")))
    }
}

/// Generates a keypair for `owner`, staging the public half into the public
/// tree and the secret half into the private tree, and commits both.
///
/// Fails with `AlreadyExists` when the owner already has credentials.
pub fn init(cx: &CancelToken, owner: &ClonedOwner) -> Result<PublicCredentials> {
    cx.check()?;
    let creds = init_staged(owner)?;
    let change = crate::journal::Change::new("identity_init", "Initialize identity credentials");
    owner.public.commit_if_changed(cx, &change)?;
    owner.private.commit_if_changed(cx, &change)?;
    Ok(creds)
}

/// Stages fresh credentials into both halves of `owner` without committing.
pub fn init_staged(owner: &ClonedOwner) -> Result<PublicCredentials> {
    if owner.public.exists(&public_credentials_ns())
        || owner.private.exists(&private_credentials_ns())
    {
        return Err(GovError::already_exists("identity credentials"));
    }
    let creds = PrivateCredentials::generate();
    owner
        .public
        .write_json_staged(&public_credentials_ns(), &creds.public)?;
    owner
        .private
        .write_json_staged(&private_credentials_ns(), &creds)?;
    tracing::info!(public_key = %creds.public.public_key, "initialized identity");
    Ok(creds.public)
}

/// Reads a principal's published credentials from its public tree.
pub fn public_credentials(tree: &ClonedRepo) -> Result<PublicCredentials> {
    tree.read_json(&public_credentials_ns())
}

/// Reads a principal's full credentials from its private tree.
pub fn private_credentials(tree: &ClonedRepo) -> Result<PrivateCredentials> {
    tree.read_json(&private_credentials_ns())
}

fn decode32(label: &str, s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s).map_err(|err| GovError::signature(format!("bad {label}: {err}")))?;
    bytes
        .try_into()
        .map_err(|_| GovError::signature(format!("bad {label}: wrong length")))
}

fn decode64(label: &str, s: &str) -> Result<[u8; 64]> {
    let bytes = hex::decode(s).map_err(|err| GovError::signature(format!("bad {label}: {err}")))?;
    bytes
        .try_into()
        .map_err(|_| GovError::signature(format!("bad {label}: wrong length")))
}

#[cfg(test)]
mod tests {
    use super::PrivateCredentials;

    #[test]
    fn sign_verify_round_trip() {
        let creds = PrivateCredentials::generate();
        let signed = creds.sign("hello").unwrap();
        signed.verify(&creds.public).unwrap();
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let creds = PrivateCredentials::generate();
        let mut signed = creds.sign("hello").unwrap();
        signed.payload.push_str(" tampered");
        assert!(signed.verify(&creds.public).is_err());
    }

    #[test]
    fn foreign_key_fails_verification() {
        let alice = PrivateCredentials::generate();
        let mallory = PrivateCredentials::generate();
        let signed = alice.sign("hello").unwrap();
        assert!(signed.verify(&mallory.public).is_err());
    }
}
