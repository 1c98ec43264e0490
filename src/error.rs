use thiserror::Error;

/// Errors surfaced by every layer of the library.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt file tail: {0}")]
    CorruptTail(String),

    #[error("corrupt cross-reference table: {0}")]
    CorruptXRef(String),

    #[error("corrupt trailer: {0}")]
    CorruptTrailer(String),

    #[error("corrupt object at offset {offset}: {reason}")]
    CorruptObject { offset: usize, reason: String },

    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },

    #[error("missing required key: /{0}")]
    MissingKey(String),

    #[error("unsupported filter: /{0}")]
    UnsupportedFilter(String),

    #[error("unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    #[error("password required")]
    PasswordRequired,

    #[error("insufficient permissions for the requested operation")]
    InsufficientPermissions,

    #[error("validation failure ({rule}) in object {obj_num}")]
    ValidationFailure { rule: String, obj_num: u32 },

    #[error("stream length mismatch: declared {declared}, available {available}")]
    StreamLengthMismatch { declared: usize, available: usize },

    #[error("corrupt object stream: {0}")]
    ObjectStreamCorrupt(String),

    #[error("stream decode error: {0}")]
    StreamDecodeError(String),

    #[error("invalid page number: {0}")]
    InvalidPageNumber(u32),

    #[error("invalid page selection: {0}")]
    InvalidPageSelection(String),

    #[error("operation cancelled")]
    OperationCancelled,
}

pub type Result<T> = std::result::Result<T, PdfError>;

impl PdfError {
    /// Wrap a parser-level error with the object that was being resolved.
    pub fn while_resolving(self, obj_num: u32, gen: u16) -> Self {
        match self {
            PdfError::CorruptObject { offset, reason } => PdfError::CorruptObject {
                offset,
                reason: format!("{reason} (resolving {obj_num} {gen} R)"),
            },
            other => other,
        }
    }
}
