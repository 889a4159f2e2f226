//! Prints a fresh Ed25519 signing key for `JWT_PRIVATE_KEY`.

use taskboard::auth::jwt::JwtConfig;

fn main() {
    let (private_key, public_key) = JwtConfig::generate_key_pair();

    println!("Add to your .env:");
    println!("JWT_PRIVATE_KEY={}", private_key);
    println!();
    println!("Public key (verifies taskboard tokens):");
    println!("{}", public_key);
}
