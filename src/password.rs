use std::sync::OnceLock;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

pub use argon2::password_hash::Error;

/// Salted Argon2id hash, PHC string format.
pub fn hash(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// `Ok(false)` for a wrong password, `Err` if `hash` isn't a PHC string.
pub fn verify(password: &str, hash: &str) -> Result<bool, Error> {
    let parsed = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// `verify`, or the same argon2 work against a throwaway hash when there is
/// no stored one. Never matches in that case.
pub fn verify_or_burn(password: &str, hash: Option<&str>) -> Result<bool, Error> {
    match hash {
        Some(hash) => verify(password, hash),
        None => {
            verify(password, dummy_hash()?)?;
            Ok(false)
        }
    }
}

fn dummy_hash() -> Result<&'static str, Error> {
    static DUMMY: OnceLock<String> = OnceLock::new();

    if let Some(hash) = DUMMY.get() {
        return Ok(hash);
    }
    let hash = hash("no such user")?;
    Ok(DUMMY.get_or_init(|| hash))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hashed = hash("pw1").unwrap();

        assert!(hashed.starts_with("$argon2id$"));
        assert!(verify("pw1", &hashed).unwrap());
        assert!(!verify("pw2", &hashed).unwrap());
    }

    #[test]
    fn salted() {
        assert_ne!(hash("same").unwrap(), hash("same").unwrap());
    }

    #[test]
    fn garbage_hash() {
        assert!(verify("pw1", "not a phc string").is_err());
    }

    #[test]
    fn missing_hash_still_costs_a_verify() {
        let dummy = PasswordHash::new(dummy_hash().unwrap()).unwrap();
        let real = hash("pw1").unwrap();
        let real = PasswordHash::new(&real).unwrap();

        // same algorithm and cost as a stored hash
        assert_eq!(dummy.algorithm, real.algorithm);
        assert_eq!(dummy.version, real.version);
        assert_eq!(dummy.params.to_string(), real.params.to_string());

        assert!(!verify_or_burn("no such user", None).unwrap());
        assert!(!verify_or_burn("", None).unwrap());
        assert!(verify_or_burn("pw1", Some(&real.to_string())).unwrap());
    }
}
