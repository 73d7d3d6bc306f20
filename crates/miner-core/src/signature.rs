//! Input signature verification.
//!
//! The validator only depends on [`SignatureVerifier`]. [`EcdsaVerifier`]
//! checks legacy SIGHASH_ALL signatures over secp256k1 for P2PKH and P2PK
//! outputs; [`SkipVerification`] accepts everything and exists for
//! operators whose mempool data carries no real signatures.

use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};

use crate::encode::{push_data, Encodable};
use crate::error::SignatureError;
use crate::hash::{double_sha256, hash160, Hash256};
use crate::transaction::Transaction;

/// Sign all inputs and outputs.
pub const SIGHASH_ALL: u8 = 0x01;

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;

/// Checks that an input is authorised to spend its previous output.
pub trait SignatureVerifier {
    fn verify_input(&self, tx: &Transaction, input_index: usize) -> Result<(), SignatureError>;
}

/// ECDSA over secp256k1 for P2PKH and P2PK outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcdsaVerifier;

/// Accepts every input without looking at it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipVerification;

impl SignatureVerifier for SkipVerification {
    fn verify_input(&self, _tx: &Transaction, _input_index: usize) -> Result<(), SignatureError> {
        Ok(())
    }
}

impl SignatureVerifier for EcdsaVerifier {
    fn verify_input(&self, tx: &Transaction, input_index: usize) -> Result<(), SignatureError> {
        let input = tx
            .inputs
            .get(input_index)
            .ok_or(SignatureError::NoSuchInput)?;
        let pushes = parse_pushes(&input.script_sig).ok_or(SignatureError::MalformedScriptSig)?;

        match classify(&input.prevout.script_pubkey) {
            Some(OutputKind::PubkeyHash(expected)) => {
                let [sig, pubkey] = pushes.as_slice() else {
                    return Err(SignatureError::MalformedScriptSig);
                };
                if hash160(pubkey) != expected {
                    return Err(SignatureError::PubkeyHashMismatch);
                }
                check_signature(tx, input_index, sig, pubkey)
            }
            Some(OutputKind::Pubkey(pubkey)) => {
                let [sig] = pushes.as_slice() else {
                    return Err(SignatureError::MalformedScriptSig);
                };
                check_signature(tx, input_index, sig, pubkey)
            }
            None => Err(SignatureError::UnsupportedScript),
        }
    }
}

/// Legacy signature digest for one input.
///
/// All scriptSigs are cleared, the signed input's scriptSig is replaced by
/// the scriptPubKey it spends, and the sighash type is appended as a u32.
pub fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    sighash_type: u32,
) -> Result<Hash256, SignatureError> {
    let script_code = tx
        .inputs
        .get(input_index)
        .ok_or(SignatureError::NoSuchInput)?
        .prevout
        .script_pubkey
        .clone();

    let mut copy = tx.clone();
    for (index, input) in copy.inputs.iter_mut().enumerate() {
        input.script_sig = if index == input_index {
            script_code.clone()
        } else {
            Vec::new()
        };
    }

    let mut preimage = copy.encoded();
    preimage.extend_from_slice(&sighash_type.to_le_bytes());
    Ok(double_sha256(&preimage))
}

/// Sign `input_index` with `key`, writing the scriptSig that matches the
/// input's previous output (P2PKH or P2PK).
pub fn sign_input(
    tx: &mut Transaction,
    input_index: usize,
    key: &SigningKey,
) -> Result<(), SignatureError> {
    let digest = signature_hash(tx, input_index, SIGHASH_ALL as u32)?;
    let signature: Signature = key
        .sign_prehash(&digest)
        .map_err(|_| SignatureError::SigningFailed)?;

    let mut sig = signature.to_der().as_bytes().to_vec();
    sig.push(SIGHASH_ALL);

    let input = &mut tx.inputs[input_index];
    let mut script_sig = Vec::with_capacity(sig.len() + 35);
    push_data(&sig, &mut script_sig);
    match classify(&input.prevout.script_pubkey) {
        Some(OutputKind::PubkeyHash(_)) => push_data(&compressed_pubkey(key), &mut script_sig),
        Some(OutputKind::Pubkey(_)) => {}
        None => return Err(SignatureError::UnsupportedScript),
    }
    input.script_sig = script_sig;
    Ok(())
}

/// Compressed SEC1 public key of `key`.
pub fn compressed_pubkey(key: &SigningKey) -> Vec<u8> {
    key.verifying_key().to_encoded_point(true).as_bytes().to_vec()
}

/// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, 0x14]);
    script.extend_from_slice(pubkey_hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

/// `<pubkey> OP_CHECKSIG`
pub fn p2pk_script(pubkey: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(pubkey.len() + 2);
    push_data(pubkey, &mut script);
    script.push(OP_CHECKSIG);
    script
}

enum OutputKind<'a> {
    PubkeyHash([u8; 20]),
    Pubkey(&'a [u8]),
}

fn classify(script: &[u8]) -> Option<OutputKind<'_>> {
    match script {
        [OP_DUP, OP_HASH160, 0x14, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
            let mut pubkey_hash = [0u8; 20];
            pubkey_hash.copy_from_slice(hash);
            Some(OutputKind::PubkeyHash(pubkey_hash))
        }
        [len, pubkey @ .., OP_CHECKSIG]
            if (*len == 33 || *len == 65) && pubkey.len() == *len as usize =>
        {
            Some(OutputKind::Pubkey(pubkey))
        }
        _ => None,
    }
}

/// Split a push-only script into its pushed items.
fn parse_pushes(script: &[u8]) -> Option<Vec<&[u8]>> {
    let mut items = Vec::new();
    let mut pos = 0;

    while pos < script.len() {
        let opcode = script[pos];
        pos += 1;
        let len = match opcode {
            0x00..=0x4b => opcode as usize,
            OP_PUSHDATA1 => {
                let len = *script.get(pos)? as usize;
                pos += 1;
                len
            }
            OP_PUSHDATA2 => {
                let bytes = script.get(pos..pos + 2)?;
                pos += 2;
                u16::from_le_bytes([bytes[0], bytes[1]]) as usize
            }
            _ => return None,
        };
        items.push(script.get(pos..pos + len)?);
        pos += len;
    }

    Some(items)
}

fn check_signature(
    tx: &Transaction,
    input_index: usize,
    sig: &[u8],
    pubkey: &[u8],
) -> Result<(), SignatureError> {
    let (&sighash_type, der) = sig.split_last().ok_or(SignatureError::InvalidEncoding)?;
    if sighash_type != SIGHASH_ALL {
        return Err(SignatureError::UnsupportedSighashType(sighash_type));
    }

    let key = VerifyingKey::from_sec1_bytes(pubkey).map_err(|_| SignatureError::InvalidPublicKey)?;
    let signature = Signature::from_der(der).map_err(|_| SignatureError::InvalidEncoding)?;
    // secp256k1 verification rejects high-S; older mempool data still has them.
    let signature = signature.normalize_s().unwrap_or(signature);

    let digest = signature_hash(tx, input_index, sighash_type as u32)?;
    key.verify_prehash(&digest, &signature)
        .map_err(|_| SignatureError::VerificationFailed)
}
