//! Transaction intake and validation.
//!
//! Checks run in order and stop at the first failure:
//!
//! 1. structure: non-empty inputs and outputs, decodable fields
//! 2. references: every input names a txid and carries its previous output,
//!    and no outpoint is spent twice within the transaction
//! 3. values: each value within the money range, inputs cover outputs
//! 4. signatures: every input verifies against the output it spends
//!
//! A rejection only drops that transaction; the batch carries on.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::error::{MalformedKind, RejectionReason};
use crate::hash::{txid_to_display_hex, Hash256};
use crate::signature::{EcdsaVerifier, SignatureVerifier};
use crate::transaction::{Transaction, TxRecord, MAX_MONEY};

/// A transaction that passed validation, with its txid and fee.
///
/// Only [`Validator`] constructs these, so holding one is proof the checks
/// ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidTx {
    tx: Transaction,
    txid: Hash256,
    fee: u64,
}

impl ValidTx {
    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub fn txid(&self) -> Hash256 {
        self.txid
    }

    /// Inputs minus outputs, never negative.
    pub fn fee(&self) -> u64 {
        self.fee
    }
}

/// Validates transactions with a pluggable signature check.
#[derive(Debug, Clone, Default)]
pub struct Validator<V = EcdsaVerifier> {
    verifier: V,
}

impl<V: SignatureVerifier> Validator<V> {
    pub fn new(verifier: V) -> Self {
        Validator { verifier }
    }

    /// Decode and validate one mempool record.
    pub fn validate(&self, record: &TxRecord) -> Result<ValidTx, RejectionReason> {
        let tx = record.decode()?;
        self.validate_transaction(tx)
    }

    /// Validate an already decoded transaction.
    pub fn validate_transaction(&self, tx: Transaction) -> Result<ValidTx, RejectionReason> {
        if tx.inputs.is_empty() {
            return Err(MalformedKind::NoInputs.into());
        }
        if tx.outputs.is_empty() {
            return Err(MalformedKind::NoOutputs.into());
        }
        if tx.outputs.iter().any(|output| output.value > MAX_MONEY) {
            return Err(MalformedKind::ValueOutOfRange { field: "output" }.into());
        }
        if tx.inputs.iter().any(|input| input.prevout.value > MAX_MONEY) {
            return Err(MalformedKind::ValueOutOfRange { field: "prevout" }.into());
        }
        let mut outpoints = HashSet::with_capacity(tx.inputs.len());
        if let Some(input) = tx
            .inputs
            .iter()
            .position(|input| !outpoints.insert(input.outpoint()))
        {
            return Err(RejectionReason::DoubleSpend { input });
        }

        let inputs = tx
            .input_value()
            .filter(|sum| *sum <= MAX_MONEY)
            .ok_or(MalformedKind::ValueOverflow)?;
        let outputs = tx
            .output_value()
            .filter(|sum| *sum <= MAX_MONEY)
            .ok_or(MalformedKind::ValueOverflow)?;
        let fee = inputs
            .checked_sub(outputs)
            .ok_or(RejectionReason::NegativeFee { inputs, outputs })?;

        for input in 0..tx.inputs.len() {
            self.verifier
                .verify_input(&tx, input)
                .map_err(|reason| RejectionReason::InvalidSignature { input, reason })?;
        }

        Ok(ValidTx {
            txid: tx.txid(),
            fee,
            tx,
        })
    }

    /// Validate a batch of records in order.
    pub fn validate_all<'a, I>(&self, records: I) -> ValidationReport
    where
        I: IntoIterator<Item = &'a TxRecord>,
    {
        self.validate_loaded(records.into_iter().map(Ok))
    }

    /// Validate a batch where some entries already failed to load.
    ///
    /// Load failures keep their position and are reported as rejections.
    /// Accepted transactions keep their relative order. A transaction that
    /// repeats an accepted txid, or spends an outpoint an accepted
    /// transaction already spends, is rejected.
    pub fn validate_loaded<I, R>(&self, entries: I) -> ValidationReport
    where
        I: IntoIterator<Item = Result<R, RejectionReason>>,
        R: Borrow<TxRecord>,
    {
        let folded = entries.into_iter().enumerate().fold(
            Batch::default(),
            |mut batch, (index, entry)| {
                let outcome = entry
                    .and_then(|record| self.validate(<R as Borrow<TxRecord>>::borrow(&record)))
                    .and_then(|valid| batch.check_conflicts(valid));

                match outcome {
                    Ok(valid) => batch.accept(valid),
                    Err(reason) => {
                        debug!(index, code = reason.code(), %reason, "transaction rejected");
                        batch.report.rejected.push(Rejection { index, reason });
                    }
                }
                batch
            },
        );
        folded.report
    }
}

#[derive(Default)]
struct Batch {
    report: ValidationReport,
    txids: HashSet<Hash256>,
    spent: HashSet<(Hash256, u32)>,
}

impl Batch {
    fn check_conflicts(&self, valid: ValidTx) -> Result<ValidTx, RejectionReason> {
        if self.txids.contains(&valid.txid) {
            return Err(RejectionReason::Duplicate {
                txid: txid_to_display_hex(&valid.txid),
            });
        }
        if let Some(input) = valid
            .tx
            .inputs
            .iter()
            .position(|input| self.spent.contains(&input.outpoint()))
        {
            return Err(RejectionReason::DoubleSpend { input });
        }
        Ok(valid)
    }

    fn accept(&mut self, valid: ValidTx) {
        self.txids.insert(valid.txid);
        self.spent
            .extend(valid.tx.inputs.iter().map(|input| input.outpoint()));
        self.report.accepted.push(valid);
    }
}

/// A rejected entry and where it was in the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub index: usize,
    pub reason: RejectionReason,
}

/// Outcome of validating a batch.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Accepted transactions in acceptance order.
    pub accepted: Vec<ValidTx>,
    pub rejected: Vec<Rejection>,
}

impl ValidationReport {
    pub fn summary(&self) -> ValidationSummary {
        let mut by_reason = BTreeMap::new();
        for rejection in &self.rejected {
            *by_reason.entry(rejection.reason.code()).or_insert(0) += 1;
        }
        ValidationSummary {
            accepted: self.accepted.len(),
            rejected: self.rejected.len(),
            by_reason,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}

/// Accepted and rejected counts, with rejections broken down by reason code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationSummary {
    pub accepted: usize,
    pub rejected: usize,
    pub by_reason: BTreeMap<&'static str, usize>,
}

impl fmt::Display for ValidationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} accepted, {} rejected", self.accepted, self.rejected)?;
        if !self.by_reason.is_empty() {
            let reasons: Vec<String> = self
                .by_reason
                .iter()
                .map(|(code, count)| format!("{}={}", code, count))
                .collect();
            write!(f, " ({})", reasons.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignatureError;
    use crate::signature::SkipVerification;
    use crate::transaction::{TxInput, TxOutput, SEQUENCE_FINAL};

    fn tx(prev: u8, input_value: u64, output_value: u64) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                prev_txid: [prev; 32],
                prev_index: 0,
                script_sig: Vec::new(),
                sequence: SEQUENCE_FINAL,
                prevout: TxOutput { value: input_value, script_pubkey: vec![0x51] },
            }],
            outputs: vec![TxOutput { value: output_value, script_pubkey: vec![0x51] }],
            locktime: 0,
        }
    }

    fn permissive() -> Validator<SkipVerification> {
        Validator::new(SkipVerification)
    }

    #[test]
    fn test_accepts_and_computes_fee() {
        let valid = permissive().validate(&TxRecord::from(&tx(1, 1_000, 900))).unwrap();
        assert_eq!(valid.fee(), 100);
        assert_eq!(valid.txid(), valid.transaction().txid());
    }

    #[test]
    fn test_zero_fee_is_allowed() {
        let valid = permissive().validate_transaction(tx(1, 500, 500)).unwrap();
        assert_eq!(valid.fee(), 0);
    }

    #[test]
    fn test_negative_fee_rejected() {
        assert_eq!(
            permissive().validate_transaction(tx(1, 500, 600)),
            Err(RejectionReason::NegativeFee { inputs: 500, outputs: 600 })
        );
    }

    #[test]
    fn test_value_overflow_rejected() {
        let mut t = tx(1, MAX_MONEY, 1);
        t.inputs.push(t.inputs[0].clone());
        t.inputs[1].prev_index = 1;
        assert_eq!(
            permissive().validate_transaction(t),
            Err(MalformedKind::ValueOverflow.into())
        );
    }

    #[test]
    fn test_structural_checks_precede_value_checks() {
        let mut t = tx(1, 1, 1_000);
        t.outputs.clear();
        assert_eq!(
            permissive().validate_transaction(t),
            Err(MalformedKind::NoOutputs.into())
        );
    }

    #[test]
    fn test_signature_failure_rejects_whole_transaction() {
        // Default validator uses ECDSA; an OP_TRUE output is not spendable by it.
        let validator = Validator::<EcdsaVerifier>::default();
        assert_eq!(
            validator.validate_transaction(tx(1, 1_000, 900)),
            Err(RejectionReason::InvalidSignature {
                input: 0,
                reason: SignatureError::UnsupportedScript,
            })
        );
    }

    #[test]
    fn test_batch_keeps_order_and_reports_reasons() {
        let records = vec![
            TxRecord::from(&tx(1, 1_000, 900)),
            TxRecord::from(&tx(2, 100, 200)),
            TxRecord::from(&tx(3, 5_000, 4_000)),
        ];

        let report = permissive().validate_all(&records);
        let fees: Vec<u64> = report.accepted.iter().map(|v| v.fee()).collect();
        assert_eq!(fees, vec![100, 1_000]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].index, 1);
        assert_eq!(report.rejected[0].reason.code(), "negative-fee");
    }

    #[test]
    fn test_duplicates_and_double_spends_rejected() {
        let first = tx(1, 1_000, 900);
        let mut conflicting = tx(1, 1_000, 800);
        conflicting.outputs[0].script_pubkey = vec![0x52];

        let records = vec![
            TxRecord::from(&first),
            TxRecord::from(&first),
            TxRecord::from(&conflicting),
        ];
        let report = permissive().validate_all(&records);

        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.rejected[0].reason.code(), "duplicate");
        assert_eq!(report.rejected[1].reason, RejectionReason::DoubleSpend { input: 0 });
    }

    #[test]
    fn test_repeated_outpoint_within_transaction_rejected() {
        let mut t = tx(1, 10_000, 10_000);
        t.inputs.push(t.inputs[0].clone());

        assert_eq!(
            permissive().validate_transaction(t.clone()),
            Err(RejectionReason::DoubleSpend { input: 1 })
        );

        let report = permissive().validate_all(&vec![TxRecord::from(&t)]);
        assert!(report.is_empty());
        assert_eq!(report.rejected[0].reason.code(), "double-spend");
    }

    #[test]
    fn test_load_failures_keep_their_index() {
        let good = TxRecord::from(&tx(1, 1_000, 900));
        let entries: Vec<Result<TxRecord, RejectionReason>> = vec![
            Err(MalformedKind::Unparseable("eof".into()).into()),
            Ok(good),
        ];

        let report = permissive().validate_loaded(entries);
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.rejected[0].index, 0);
    }

    #[test]
    fn test_summary() {
        let records = vec![
            TxRecord::from(&tx(1, 1_000, 900)),
            TxRecord::from(&tx(2, 100, 200)),
            TxRecord::from(&tx(3, 100, 200)),
        ];
        let summary = permissive().validate_all(&records).summary();

        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.by_reason.get("negative-fee"), Some(&2));
        assert_eq!(summary.to_string(), "1 accepted, 2 rejected (negative-fee=2)");
    }
}
