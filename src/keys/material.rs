use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use sha2::{Digest, Sha256};

/// Reduce an OpenSSH public key line to `<algorithm> <blob>`.
///
/// GitHub and CircleCI render the same key with different trailing comments and
/// whitespace, so matching happens on the reduced form. Lines that do not look like
/// an OpenSSH key are only trimmed.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    match split_openssh(trimmed) {
        Some((algorithm, blob)) => format!("{algorithm} {blob}"),
        None => trimmed.to_string(),
    }
}

/// `SHA256:<unpadded base64>` of the key blob, as printed by `ssh-keygen -l`.
pub fn sha256_fingerprint(material: &str) -> Option<String> {
    let (_, blob) = split_openssh(material.trim())?;
    let decoded = STANDARD.decode(blob).ok()?;
    let digest = Sha256::digest(&decoded);
    Some(format!("SHA256:{}", STANDARD_NO_PAD.encode(digest)))
}

fn split_openssh(line: &str) -> Option<(&str, &str)> {
    let mut parts = line.split_whitespace();
    let algorithm = parts.next()?;
    let blob = parts.next()?;
    let known = algorithm.starts_with("ssh-")
        || algorithm.starts_with("ecdsa-")
        || algorithm.starts_with("sk-");
    if !known || STANDARD.decode(blob).is_err() {
        return None;
    }
    Some((algorithm, blob))
}
