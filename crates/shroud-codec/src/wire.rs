//! Wire bundles: the full encode/decode pipeline

use serde::{Deserialize, Serialize};
use shroud_common::ObfuscationRng;

use crate::alphabet::Alphabet;
use crate::bootstrap::{BootstrapProgram, SecretRole};
use crate::cipher::CipherKey;
use crate::error::{CodecError, CodecResult};
use crate::payload::{ArtifactKind, Payload};
use crate::secret::SecretBundle;
use crate::shard;

/// Everything the output needs to rebuild one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireBundle {
    /// Carried artifact
    pub kind: ArtifactKind,
    /// Encoded text shards in stored order
    pub shards: Vec<String>,
    /// Program that rebuilds the secrets
    pub bootstrap: BootstrapProgram,
}

/// Serialize, encrypt, encode and shard a payload under fresh secrets
pub fn encode(payload: &Payload, rng: &mut ObfuscationRng) -> CodecResult<WireBundle> {
    let mut bytes = payload.to_bytes();
    let key = CipherKey::generate(rng);
    key.apply(&mut bytes);

    let alphabet = Alphabet::generate(rng);
    let text = alphabet.encode(&bytes);
    let sharded = shard::split(&text, rng)?;

    let plain: [(SecretRole, Vec<u8>); 6] = [
        (SecretRole::Key, key.key.to_vec()),
        (SecretRole::NonceLo, key.nonce_lo.to_vec()),
        (SecretRole::NonceHi, key.nonce_hi.to_vec()),
        (SecretRole::Alphabet, alphabet.symbols().to_vec()),
        (SecretRole::Params, alphabet.params(bytes.len())),
        (SecretRole::Order, sharded.order),
    ];
    let secrets: Vec<(SecretRole, SecretBundle)> = plain
        .iter()
        .map(|(role, values)| (*role, SecretBundle::conceal(values, rng)))
        .collect();
    let bootstrap = BootstrapProgram::assemble(&secrets, rng);

    tracing::trace!(
        kind = ?payload.kind(),
        bytes = bytes.len(),
        shards = sharded.shards.len(),
        "encoded artifact"
    );
    Ok(WireBundle {
        kind: payload.kind(),
        shards: sharded.shards,
        bootstrap,
    })
}

/// Undo [`encode`]
pub fn decode(bundle: &WireBundle) -> CodecResult<Payload> {
    let mut secrets = bundle.bootstrap.secrets()?;
    let mut take = |role: SecretRole| secrets.remove(&role).unwrap_or_default();
    let key = take(SecretRole::Key);
    let nonce_lo = take(SecretRole::NonceLo);
    let nonce_hi = take(SecretRole::NonceHi);
    let symbols = take(SecretRole::Alphabet);
    let params = take(SecretRole::Params);
    let order = take(SecretRole::Order);

    let text = shard::join(&bundle.shards, &order)?;
    let (alphabet, byte_len) = Alphabet::from_parts(&symbols, &params)?;
    let mut bytes = alphabet.decode(&text, byte_len)?;
    let key = CipherKey::from_parts(&key, &nonce_lo, &nonce_hi)
        .ok_or_else(|| CodecError::corrupt("cipher key or nonce has the wrong length"))?;
    key.apply(&mut bytes);
    Payload::from_bytes(bundle.kind, &bytes)
}
