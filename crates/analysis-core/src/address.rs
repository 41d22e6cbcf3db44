use sha2::{Digest, Sha256};

/// Decoded classic address: version byte, 20-byte account id, 4-byte checksum.
const DECODED_LEN: usize = 25;
const ACCOUNT_ID_VERSION: u8 = 0x00;

/// Validate a classic account address (`r...`) against the ledger's base58
/// grammar, including the double SHA-256 checksum.
pub fn is_valid_account(address: &str) -> bool {
    if !address.starts_with('r') || !(25..=35).contains(&address.len()) {
        return false;
    }

    let bytes = match bs58::decode(address)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .into_vec()
    {
        Ok(b) => b,
        Err(_) => return false,
    };

    if bytes.len() != DECODED_LEN || bytes[0] != ACCOUNT_ID_VERSION {
        return false;
    }

    let (payload, checksum) = bytes.split_at(DECODED_LEN - 4);
    let digest = Sha256::digest(Sha256::digest(payload));
    digest[..4] == *checksum
}
