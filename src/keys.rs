//! RSA signing keys: loading from PEM files, JWT signing and JWKS publication.
//!
//! The private key never leaves [`SigningKeys`]; callers only get signed tokens and public
//! components.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Key id published in the JWKS and stamped on every issued token.
pub const SIGNING_KEY_ID: &str = "1";

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to read key file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse private key {path}: expected a PKCS#1 or PKCS#8 RSA PEM")]
    PrivateKeyFormat { path: PathBuf },
    #[error("failed to parse public key {path}: {reason}")]
    PublicKeyFormat { path: PathBuf, reason: String },
    #[error("public key {path} does not belong to the configured private key")]
    Mismatch { path: PathBuf },
    #[error("unsupported signing algorithm {0:?}, expected one of RS256, RS384, RS512, PS256, PS384, PS512")]
    UnsupportedAlgorithm(String),
    #[error("failed to prepare encoding key: {0}")]
    Encoding(String),
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Parses an algorithm name and accepts only the RSA family.
pub fn parse_rsa_algorithm(name: &str) -> Result<Algorithm, KeyError> {
    let algorithm =
        Algorithm::from_str(name.trim()).map_err(|_| KeyError::UnsupportedAlgorithm(name.to_string()))?;
    match algorithm {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => Ok(algorithm),
        _ => Err(KeyError::UnsupportedAlgorithm(name.to_string())),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub alg: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

pub struct SigningKeys {
    public_key: RsaPublicKey,
    encoding_key: EncodingKey,
    algorithm: Algorithm,
}

// The encoding key holds private material; only public facts are printed.
impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeys")
            .field("algorithm", &self.algorithm)
            .field("kid", &SIGNING_KEY_ID)
            .field("modulus_bits", &(self.public_key.size() * 8))
            .field("private_key", &"***REDACTED***")
            .finish()
    }
}

impl SigningKeys {
    /// Loads the private key and, when given, a PKIX public key that must match it.
    pub fn load(private_key_path: &Path, public_key_path: Option<&Path>, algorithm: Algorithm) -> Result<Self, KeyError> {
        let private_pem = read_key_file(private_key_path)?;
        let private_key = parse_private_key(&private_pem).ok_or_else(|| KeyError::PrivateKeyFormat {
            path: private_key_path.to_path_buf(),
        })?;

        let keys = Self::from_private_key(private_key, algorithm)?;

        if let Some(path) = public_key_path {
            let public_pem = read_key_file(path)?;
            let public_key = RsaPublicKey::from_public_key_pem(&public_pem).map_err(|e| KeyError::PublicKeyFormat {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            if public_key != keys.public_key {
                return Err(KeyError::Mismatch { path: path.to_path_buf() });
            }
        }

        Ok(keys)
    }

    pub fn from_private_key(private_key: RsaPrivateKey, algorithm: Algorithm) -> Result<Self, KeyError> {
        let pem = private_key
            .to_pkcs8_pem(Default::default())
            .map_err(|e| KeyError::Encoding(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| KeyError::Encoding(e.to_string()))?;
        Ok(Self {
            public_key: private_key.to_public_key(),
            encoding_key,
            algorithm,
        })
    }

    pub fn algorithm_name(&self) -> String {
        format!("{:?}", self.algorithm)
    }

    /// Signs a finished claim set.
    pub fn sign(&self, claims: &Map<String, Value>) -> Result<String, KeyError> {
        let mut header = Header::new(self.algorithm);
        header.kid = Some(SIGNING_KEY_ID.to_string());
        Ok(encode(&header, claims, &self.encoding_key)?)
    }

    /// Base64url (unpadded) modulus and exponent.
    pub fn public_components(&self) -> (String, String) {
        (
            URL_SAFE_NO_PAD.encode(self.public_key.n().to_bytes_be()),
            URL_SAFE_NO_PAD.encode(self.public_key.e().to_bytes_be()),
        )
    }

    pub fn jwks(&self) -> Jwks {
        let (n, e) = self.public_components();
        Jwks {
            keys: vec![Jwk {
                kty: "RSA".to_string(),
                use_: "sig".to_string(),
                alg: self.algorithm_name(),
                kid: SIGNING_KEY_ID.to_string(),
                n,
                e,
            }],
        }
    }
}

fn read_key_file(path: &Path) -> Result<String, KeyError> {
    std::fs::read_to_string(path).map_err(|source| KeyError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_private_key(pem: &str) -> Option<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs1_pem(pem)
        .ok()
        .or_else(|| RsaPrivateKey::from_pkcs8_pem(pem).ok())
}
