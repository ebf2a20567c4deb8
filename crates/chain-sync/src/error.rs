#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("malformed hex string {0:?}: {1}")]
    Hex(String, hex::FromHexError),
    #[error("hex value {0:?} does not fit in {1} bytes")]
    TooWide(String, usize),
    #[error("unknown transaction type {0:?}")]
    UnknownTransactionType(String),
    #[error("{field} value {value} does not fit in an i64 column")]
    FieldOverflow { field: &'static str, value: u64 },
}
