//! Password hashing

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

mod catalog_argon2 {
    use anyhow::{anyhow, Result};
    use argon2::{
        password_hash::{
            rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        },
        Argon2,
    };

    pub fn hash(plain: &[u8]) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash_string = Argon2::default()
            .hash_password(plain, &salt)
            .map_err(|err| anyhow!("{}", err))?
            .to_string();
        Ok(hash_string)
    }

    pub fn verify(plain_pw: &[u8], target_hash: &str) -> Result<bool> {
        let password_hash = PasswordHash::new(target_hash).map_err(|err| anyhow!("{}", err))?;
        Ok(Argon2::default()
            .verify_password(plain_pw, &password_hash)
            .is_ok())
    }
}

/// Hash scheme for stored passwords. The PHC string produced by `hash`
/// embeds its own salt and parameters.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub enum PasswordHasher {
    #[default]
    Argon2,
}

impl FromStr for PasswordHasher {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "argon2" => Ok(PasswordHasher::Argon2),
            _ => bail!("Unknown hasher {}", s),
        }
    }
}

impl PasswordHasher {
    pub fn hash(&self, plain: &str) -> Result<String> {
        match self {
            PasswordHasher::Argon2 => catalog_argon2::hash(plain.as_bytes()),
        }
    }

    pub fn verify(&self, plain: &str, target_hash: &str) -> Result<bool> {
        match self {
            PasswordHasher::Argon2 => catalog_argon2::verify(plain.as_bytes(), target_hash),
        }
    }
}
