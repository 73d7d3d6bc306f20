//! Transaction model and the mempool record format it is decoded from.

use serde::{Deserialize, Serialize};

use crate::encode::{write_bytes, write_list, write_varint, Encodable};
use crate::error::{MalformedKind, RejectionReason};
use crate::hash::{txid_from_display_hex, txid_to_display_hex, Hash256};

/// Satoshis per coin.
pub const COIN: u64 = 100_000_000;

/// Upper bound for any single value or value sum.
pub const MAX_MONEY: u64 = 21_000_000 * COIN;

/// Sequence number of an input that opts out of relative locktime.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

impl Encodable for TxOutput {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        write_bytes(&self.script_pubkey, out);
    }
}

/// A transaction input together with the output it spends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Txid of the spent transaction (internal byte order).
    pub prev_txid: Hash256,
    pub prev_index: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    /// Value and script of the output being spent. Not serialized.
    pub prevout: TxOutput,
}

impl TxInput {
    /// The outpoint this input spends.
    pub fn outpoint(&self) -> (Hash256, u32) {
        (self.prev_txid, self.prev_index)
    }
}

impl Encodable for TxInput {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.prev_txid);
        out.extend_from_slice(&self.prev_index.to_le_bytes());
        write_bytes(&self.script_sig, out);
        out.extend_from_slice(&self.sequence.to_le_bytes());
    }
}

/// A regular (non-coinbase) transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub locktime: u32,
}

impl Transaction {
    /// Transaction id: double SHA256 of the canonical encoding.
    pub fn txid(&self) -> Hash256 {
        self.encoded_hash()
    }

    /// Sum of spent output values, `None` on overflow.
    pub fn input_value(&self) -> Option<u64> {
        self.inputs
            .iter()
            .try_fold(0u64, |acc, input| acc.checked_add(input.prevout.value))
    }

    /// Sum of output values, `None` on overflow.
    pub fn output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, output| acc.checked_add(output.value))
    }

    /// Inputs minus outputs. `None` when the difference would be negative.
    pub fn fee(&self) -> Option<u64> {
        self.input_value()?.checked_sub(self.output_value()?)
    }
}

impl Encodable for Transaction {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        write_list(&self.inputs, out);
        write_list(&self.outputs, out);
        out.extend_from_slice(&self.locktime.to_le_bytes());
    }
}

/// The reward-paying transaction created by the assembler.
///
/// It has no inputs and exactly one output worth subsidy plus fees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinbaseTransaction {
    pub version: i32,
    pub output: TxOutput,
    pub locktime: u32,
}

impl CoinbaseTransaction {
    pub fn txid(&self) -> Hash256 {
        self.encoded_hash()
    }

    /// Value paid to the miner.
    pub fn value(&self) -> u64 {
        self.output.value
    }

    /// Canonical encoding as lowercase hex.
    pub fn serialize_hex(&self) -> String {
        hex::encode(self.encoded())
    }
}

impl Encodable for CoinbaseTransaction {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        write_varint(0, out);
        write_varint(1, out);
        self.output.encode_to(out);
        out.extend_from_slice(&self.locktime.to_le_bytes());
    }
}

/// A transaction as placed in a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockTransaction {
    Coinbase(CoinbaseTransaction),
    Regular(Transaction),
}

impl BlockTransaction {
    pub fn txid(&self) -> Hash256 {
        match self {
            BlockTransaction::Coinbase(tx) => tx.txid(),
            BlockTransaction::Regular(tx) => tx.txid(),
        }
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self, BlockTransaction::Coinbase(_))
    }
}

impl Encodable for BlockTransaction {
    fn encode_to(&self, out: &mut Vec<u8>) {
        match self {
            BlockTransaction::Coinbase(tx) => tx.encode_to(out),
            BlockTransaction::Regular(tx) => tx.encode_to(out),
        }
    }
}

// ---------------------------------------------------------------------------
// Mempool records
// ---------------------------------------------------------------------------

/// A transaction record as found in a mempool dump.
///
/// Values are signed so that negative amounts reach the validator and are
/// rejected there instead of failing deserialization. Unknown fields are
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    #[serde(default = "default_version")]
    pub version: i32,
    #[serde(default)]
    pub locktime: u32,
    #[serde(default)]
    pub vin: Vec<InputRecord>,
    #[serde(default)]
    pub vout: Vec<OutputRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRecord {
    /// Spent txid in display (reversed) byte order.
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub vout: u32,
    #[serde(default)]
    pub scriptsig: String,
    #[serde(default = "default_sequence")]
    pub sequence: u32,
    #[serde(default)]
    pub prevout: Option<PrevoutRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrevoutRecord {
    #[serde(default)]
    pub value: Option<i64>,
    #[serde(default)]
    pub scriptpubkey: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub value: i64,
    #[serde(default)]
    pub scriptpubkey: String,
}

fn default_version() -> i32 {
    1
}

fn default_sequence() -> u32 {
    SEQUENCE_FINAL
}

impl TxRecord {
    /// Parse a record from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Decode into a [`Transaction`], resolving every input's previous output.
    ///
    /// Empty input or output lists, bad hex and out-of-range values are
    /// malformed; a missing txid or prevout is an unresolved reference.
    pub fn decode(&self) -> Result<Transaction, RejectionReason> {
        if self.vin.is_empty() {
            return Err(MalformedKind::NoInputs.into());
        }
        if self.vout.is_empty() {
            return Err(MalformedKind::NoOutputs.into());
        }

        let inputs = self
            .vin
            .iter()
            .enumerate()
            .map(|(index, input)| input.decode(index))
            .collect::<Result<Vec<_>, _>>()?;

        let outputs = self
            .vout
            .iter()
            .map(|output| -> Result<TxOutput, RejectionReason> {
                Ok(TxOutput {
                    value: checked_value(output.value, "output")?,
                    script_pubkey: decode_hex(&output.scriptpubkey, "scriptpubkey")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Transaction {
            version: self.version,
            inputs,
            outputs,
            locktime: self.locktime,
        })
    }
}

impl InputRecord {
    fn decode(&self, index: usize) -> Result<TxInput, RejectionReason> {
        let unresolved = RejectionReason::UnresolvedReference { input: index };

        let txid = match self.txid.as_deref() {
            Some(txid) if !txid.is_empty() => txid,
            _ => return Err(unresolved),
        };
        let prev_txid = txid_from_display_hex(txid)
            .map_err(|_| MalformedKind::InvalidHex { field: "txid" })?;

        let prevout = self.prevout.as_ref().ok_or_else(|| unresolved.clone())?;
        let value = prevout.value.ok_or(unresolved)?;

        Ok(TxInput {
            prev_txid,
            prev_index: self.vout,
            script_sig: decode_hex(&self.scriptsig, "scriptsig")?,
            sequence: self.sequence,
            prevout: TxOutput {
                value: checked_value(value, "prevout")?,
                script_pubkey: decode_hex(&prevout.scriptpubkey, "prevout scriptpubkey")?,
            },
        })
    }
}

fn checked_value(value: i64, field: &'static str) -> Result<u64, MalformedKind> {
    if value < 0 {
        return Err(MalformedKind::NegativeValue { field });
    }
    let value = value as u64;
    if value > MAX_MONEY {
        return Err(MalformedKind::ValueOutOfRange { field });
    }
    Ok(value)
}

fn decode_hex(s: &str, field: &'static str) -> Result<Vec<u8>, MalformedKind> {
    hex::decode(s).map_err(|_| MalformedKind::InvalidHex { field })
}

impl From<&Transaction> for TxRecord {
    fn from(tx: &Transaction) -> Self {
        TxRecord {
            version: tx.version,
            locktime: tx.locktime,
            vin: tx
                .inputs
                .iter()
                .map(|input| InputRecord {
                    txid: Some(txid_to_display_hex(&input.prev_txid)),
                    vout: input.prev_index,
                    scriptsig: hex::encode(&input.script_sig),
                    sequence: input.sequence,
                    prevout: Some(PrevoutRecord {
                        value: Some(input.prevout.value as i64),
                        scriptpubkey: hex::encode(&input.prevout.script_pubkey),
                    }),
                })
                .collect(),
            vout: tx
                .outputs
                .iter()
                .map(|output| OutputRecord {
                    value: output.value as i64,
                    scriptpubkey: hex::encode(&output.script_pubkey),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction {
            version: 2,
            inputs: vec![TxInput {
                prev_txid: [0x11; 32],
                prev_index: 3,
                script_sig: vec![0x51],
                sequence: SEQUENCE_FINAL,
                prevout: TxOutput { value: 5_000, script_pubkey: vec![0x51] },
            }],
            outputs: vec![TxOutput { value: 4_000, script_pubkey: vec![0x6a] }],
            locktime: 0,
        }
    }

    #[test]
    fn test_transaction_layout() {
        let bytes = sample_tx().encoded();

        // version
        assert_eq!(&bytes[0..4], &2i32.to_le_bytes());
        // one input
        assert_eq!(bytes[4], 0x01);
        assert_eq!(&bytes[5..37], &[0x11; 32]);
        assert_eq!(&bytes[37..41], &3u32.to_le_bytes());
        // scriptSig, sequence, one output (8 value + 2 script), locktime
        assert_eq!(bytes.len(), 4 + 1 + 36 + 2 + 4 + 1 + 10 + 4);
    }

    #[test]
    fn test_txid_ignores_prevout() {
        let tx = sample_tx();
        let mut other = tx.clone();
        other.inputs[0].prevout.value = 9_999;
        assert_eq!(tx.txid(), other.txid());

        other.outputs[0].value = 1;
        assert_ne!(tx.txid(), other.txid());
    }

    #[test]
    fn test_fee() {
        let mut tx = sample_tx();
        assert_eq!(tx.fee(), Some(1_000));

        tx.outputs[0].value = 6_000;
        assert_eq!(tx.fee(), None);
    }

    #[test]
    fn test_coinbase_has_no_inputs() {
        let coinbase = CoinbaseTransaction {
            version: 1,
            output: TxOutput { value: 50, script_pubkey: vec![0x51] },
            locktime: 0,
        };
        let bytes = coinbase.encoded();
        assert_eq!(bytes[4], 0x00);
        assert_eq!(bytes[5], 0x01);
        assert_eq!(BlockTransaction::Coinbase(coinbase.clone()).txid(), coinbase.txid());
    }

    #[test]
    fn test_record_roundtrip_through_json() {
        let tx = sample_tx();
        let record = TxRecord::from(&tx);
        let json = serde_json::to_string(&record).unwrap();
        let parsed = TxRecord::from_json(&json).unwrap();
        assert_eq!(parsed.decode().unwrap(), tx);
    }

    #[test]
    fn test_record_ignores_unknown_fields() {
        let json = r#"{
            "version": 1,
            "locktime": 0,
            "vin": [{
                "txid": "0000000000000000000000000000000000000000000000000000000000000001",
                "vout": 0,
                "scriptsig": "",
                "scriptsig_asm": "",
                "is_coinbase": false,
                "prevout": { "value": 1000, "scriptpubkey": "51", "scriptpubkey_type": "unknown" }
            }],
            "vout": [{ "value": 900, "scriptpubkey": "51", "scriptpubkey_address": null }]
        }"#;

        let tx = TxRecord::from_json(json).unwrap().decode().unwrap();
        assert_eq!(tx.inputs[0].prev_txid[0], 0x01);
        assert_eq!(tx.fee(), Some(100));
    }

    #[test]
    fn test_decode_rejects_structural_defects() {
        let mut record = TxRecord::from(&sample_tx());
        record.vout.clear();
        assert_eq!(record.decode(), Err(MalformedKind::NoOutputs.into()));

        let mut record = TxRecord::from(&sample_tx());
        record.vin.clear();
        assert_eq!(record.decode(), Err(MalformedKind::NoInputs.into()));

        let mut record = TxRecord::from(&sample_tx());
        record.vout[0].scriptpubkey = "zz".into();
        assert_eq!(
            record.decode(),
            Err(MalformedKind::InvalidHex { field: "scriptpubkey" }.into())
        );
    }

    #[test]
    fn test_decode_rejects_bad_values() {
        let mut record = TxRecord::from(&sample_tx());
        record.vout[0].value = -1;
        assert_eq!(
            record.decode(),
            Err(MalformedKind::NegativeValue { field: "output" }.into())
        );

        let mut record = TxRecord::from(&sample_tx());
        record.vout[0].value = (MAX_MONEY + 1) as i64;
        assert_eq!(
            record.decode(),
            Err(MalformedKind::ValueOutOfRange { field: "output" }.into())
        );
    }

    #[test]
    fn test_decode_unresolved_references() {
        let mut record = TxRecord::from(&sample_tx());
        record.vin[0].prevout = None;
        assert_eq!(record.decode(), Err(RejectionReason::UnresolvedReference { input: 0 }));

        let mut record = TxRecord::from(&sample_tx());
        record.vin[0].prevout.as_mut().unwrap().value = None;
        assert_eq!(record.decode(), Err(RejectionReason::UnresolvedReference { input: 0 }));

        let mut record = TxRecord::from(&sample_tx());
        record.vin[0].txid = None;
        assert_eq!(record.decode(), Err(RejectionReason::UnresolvedReference { input: 0 }));
    }
}
