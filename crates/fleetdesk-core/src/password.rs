//! Password hashing with bcrypt.
//!
//! The cost is stored inside each hash, so existing `$2y$` hashes keep
//! verifying when [`COST`] changes.

use crate::error::Result;

pub const COST: u32 = 10;

pub fn hash(password: &str) -> Result<String> {
    Ok(bcrypt::hash(password, COST)?)
}

/// `false` for a wrong password and for any malformed stored hash.
pub fn verify(password: &str, stored: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let h = hash("hunter22").unwrap();
        assert!(h.starts_with("$2b$10$"));
        assert!(verify("hunter22", &h));
        assert!(!verify("hunter23", &h));
    }

    #[test]
    fn salts_differ() {
        assert_ne!(hash("same").unwrap(), hash("same").unwrap());
    }

    #[test]
    fn malformed_hashes_never_verify() {
        assert!(!verify("x", ""));
        assert!(!verify("x", "plain-text"));
        assert!(!verify("x", "$2b$xx$not-a-real-hash"));
    }

    #[test]
    fn accepts_2y_prefix() {
        let h = bcrypt::hash_with_result("pw-from-php", 4)
            .unwrap()
            .format_for_version(bcrypt::Version::TwoY);
        assert!(h.starts_with("$2y$04$"));
        assert!(verify("pw-from-php", &h));
    }
}
