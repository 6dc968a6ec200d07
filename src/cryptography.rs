//! Cryptographic Methods
//!
//! The only cryptography needed by GAP is the random address hash function `ah`, used both for
//! creating a resolvable private address and for resolving one. The AES implementation comes from
//! the [Rust Crypto group](https://github.com/RustCrypto).

/// 24-bit hash function
///
/// Used in random address creation and resolution. `r` is the *prand* of the address in little
/// endian order and the returned hash is also little endian.
pub fn ah(k: u128, r: [u8; 3]) -> [u8; 3] {
    let r_padded = <u128>::from(r[0]) | <u128>::from(r[1]) << 8 | <u128>::from(r[2]) << 16;

    let cypher_text = e(k, r_padded);

    [cypher_text as u8, (cypher_text >> 8) as u8, (cypher_text >> 16) as u8]
}

/// Security function *e*
///
/// This generates 128-bit encrypted data from a 128-bit key using the AES-128 bit block cypher
/// (see [FIPS-197](https://en.wikipedia.org/wiki/FIPS_197)). This is the host version of this
/// function, it does not rely on the controller's LE Encrypt command.
///
/// # Note
/// A new cypher is initialized on every call. Resolving an address against a long resolving list
/// calls this once per entry.
pub fn e(key: u128, plain_text: u128) -> u128 {
    use aes::cipher::generic_array::GenericArray;
    use aes::cipher::{BlockEncrypt, KeyInit};

    let key_bytes = key.to_be_bytes();

    let cipher = aes::Aes128::new(GenericArray::from_slice(&key_bytes));

    let mut block = plain_text.to_be_bytes();

    cipher.encrypt_block(GenericArray::from_mut_slice(&mut block));

    <u128>::from_be_bytes(block)
}
