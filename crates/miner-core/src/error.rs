//! Error types.
//!
//! Per-transaction problems are [`RejectionReason`]s: the caller drops the
//! transaction and carries on. Only [`TemplateError`] and [`MineError`] can
//! end a run.

use thiserror::Error;

/// Result alias for fallible operations of the whole pipeline.
pub type Result<T> = std::result::Result<T, MinerError>;

/// Why a transaction record was excluded from the block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    /// Structural check failed.
    #[error("malformed transaction: {0}")]
    Malformed(#[from] MalformedKind),
    /// An input has no resolvable previous output.
    #[error("input {input} references an unresolved previous output")]
    UnresolvedReference { input: usize },
    /// Outputs spend more than the inputs provide.
    #[error("negative fee: inputs {inputs} < outputs {outputs}")]
    NegativeFee { inputs: u64, outputs: u64 },
    /// An input failed signature verification.
    #[error("input {input} has an invalid signature: {reason}")]
    InvalidSignature {
        input: usize,
        #[source]
        reason: SignatureError,
    },
    /// Same txid as a transaction already accepted.
    #[error("duplicate of accepted transaction {txid}")]
    Duplicate { txid: String },
    /// An input spends an outpoint already spent in the block or earlier in the same transaction.
    #[error("input {input} spends an outpoint that is already spent")]
    DoubleSpend { input: usize },
}

impl RejectionReason {
    /// Stable reason code used in summaries.
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::Malformed(_) => "malformed",
            RejectionReason::UnresolvedReference { .. } => "unresolved-reference",
            RejectionReason::NegativeFee { .. } => "negative-fee",
            RejectionReason::InvalidSignature { .. } => "invalid-signature",
            RejectionReason::Duplicate { .. } => "duplicate",
            RejectionReason::DoubleSpend { .. } => "double-spend",
        }
    }
}

/// Structural defects of a transaction record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedKind {
    #[error("no inputs")]
    NoInputs,
    #[error("no outputs")]
    NoOutputs,
    #[error("invalid hex in {field}")]
    InvalidHex { field: &'static str },
    #[error("{field} has a negative value")]
    NegativeValue { field: &'static str },
    #[error("{field} value exceeds the money supply")]
    ValueOutOfRange { field: &'static str },
    #[error("value sum overflows")]
    ValueOverflow,
    #[error("unreadable record: {0}")]
    Unparseable(String),
}

/// Signature verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("input index out of range")]
    NoSuchInput,
    #[error("unsupported scriptPubKey")]
    UnsupportedScript,
    #[error("malformed scriptSig")]
    MalformedScriptSig,
    #[error("unsupported sighash type {0:#04x}")]
    UnsupportedSighashType(u8),
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid signature encoding")]
    InvalidEncoding,
    #[error("public key does not match the key hash")]
    PubkeyHashMismatch,
    #[error("signature does not verify")]
    VerificationFailed,
    #[error("signing failed")]
    SigningFailed,
}

/// Difficulty target parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DifficultyError {
    #[error("target must be 64 hex digits")]
    InvalidHex,
    #[error("compact bits {0:#010x} has the sign bit set")]
    NegativeCompact(u32),
    #[error("compact bits {0:#010x} overflows 256 bits")]
    CompactOverflow(u32),
}

/// Failures while assembling the block template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// Every transaction was rejected and the policy requires at least one.
    #[error("no valid transactions to include")]
    EmptyValidSet,
    /// Subsidy plus fees does not fit in a u64.
    #[error("coinbase reward overflows")]
    RewardOverflow,
}

/// Proof-of-work search failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MineError {
    /// No nonce in range satisfied the target. Roll the timestamp and retry.
    #[error("nonce space exhausted at timestamp {timestamp}")]
    NonceSpaceExhausted { timestamp: u32 },
    /// The search was aborted by its cancel token.
    #[error("search cancelled")]
    Cancelled,
}

/// Umbrella error for a block-building run.
#[derive(Debug, Error)]
pub enum MinerError {
    #[error(transparent)]
    Difficulty(#[from] DifficultyError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Mine(#[from] MineError),
    #[error("invalid {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_codes_are_distinct() {
        let reasons = [
            RejectionReason::Malformed(MalformedKind::NoInputs),
            RejectionReason::UnresolvedReference { input: 0 },
            RejectionReason::NegativeFee { inputs: 1, outputs: 2 },
            RejectionReason::InvalidSignature {
                input: 0,
                reason: SignatureError::VerificationFailed,
            },
            RejectionReason::Duplicate { txid: String::new() },
            RejectionReason::DoubleSpend { input: 0 },
        ];

        let mut codes: Vec<_> = reasons.iter().map(|r| r.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), reasons.len());
    }

    #[test]
    fn test_malformed_converts_into_rejection() {
        let reason: RejectionReason = MalformedKind::NoOutputs.into();
        assert_eq!(reason.code(), "malformed");
        assert_eq!(reason.to_string(), "malformed transaction: no outputs");
    }

    #[test]
    fn test_mine_error_into_umbrella() {
        let err: MinerError = MineError::Cancelled.into();
        assert_eq!(err.to_string(), "search cancelled");
    }
}
