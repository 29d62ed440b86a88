//! UUID utilities

use uuid::Uuid;

use crate::{Error, Result};

const RECID_ALPHABET: &[u8] = b"0123456789abcdefghjkmnpqrstvwxyz";

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse a UUID read back from storage
pub fn parse(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Corrupt(format!("invalid UUID '{}': {}", s, e)))
}

/// Derive a short record identifier of the form `xxxxx-xxxxx` from a UUID
///
/// Uses a lowercase base32 alphabet without `i`, `l`, `o` and `u`.
pub fn recid_from(uuid: &Uuid) -> String {
    let bits = uuid.as_u128();
    let chars: Vec<char> = (0..10)
        .map(|i| {
            let idx = ((bits >> (i * 5)) & 0x1f) as usize;
            RECID_ALPHABET[idx] as char
        })
        .collect();

    let (left, right) = chars.split_at(5);
    format!(
        "{}-{}",
        left.iter().collect::<String>(),
        right.iter().collect::<String>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recid_shape() {
        let recid = recid_from(&generate());
        assert_eq!(recid.len(), 11);
        assert_eq!(recid.chars().nth(5), Some('-'));
        assert!(recid
            .chars()
            .filter(|c| *c != '-')
            .all(|c| RECID_ALPHABET.contains(&(c as u8))));
    }

    #[test]
    fn test_recid_is_stable_for_same_uuid() {
        let uuid = generate();
        assert_eq!(recid_from(&uuid), recid_from(&uuid));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("not-a-uuid").is_err());
    }
}
