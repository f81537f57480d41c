use std::{error::Error, fmt::Display};

/// Crate-wide error type. Variants are grouped by the four kinds the
/// protocol distinguishes: invalid query (server-observable), invalid
/// answer (client-observable), configuration errors (detected at
/// construction) and internal failures.
///
/// Display output for answer-verification failures deliberately carries no
/// query material: the queried index must not leak through logs.
#[derive(Debug, PartialEq)]
pub enum VpirError {
    // Matrix
    InvalidMatrixDimension,
    IncompatibleDimensionForMatrixMultiplication,
    IncompatibleDimensionForMatrixAddition,
    InvalidNumberOfElementsInMatrix,
    MatrixBytesTooShort,

    // Query (InvalidQuery kind)
    InvalidQueryLength { expected: usize, got: usize },
    MalformedQueryMatrix,
    IncompatibleQueryDimension,
    MalformedFssKey,
    InvalidBitWidth(usize),

    // Answer (InvalidAnswer kind)
    InvalidAnswerLength { expected: usize, got: usize },
    WrongNumberOfAnswers { expected: usize, got: usize },
    TagVerificationFailed,
    ReconstructionBoundExceeded,
    MajorityVoteFailed,
    NoPendingQuery,
    PendingQueryExists,

    // Config (ConfigError kind)
    InconsistentDatabaseShape,
    UnsupportedScheme(String),
    MismatchedParameters,

    // Internal
    Internal(String),
}

impl Display for VpirError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMatrixDimension => write!(f, "The number of rows and columns in the matrix must be non-zero."),
            Self::IncompatibleDimensionForMatrixMultiplication => write!(f, "The matrix dimensions do not allow multiplication."),
            Self::IncompatibleDimensionForMatrixAddition => write!(f, "The matrix dimensions do not allow addition or subtraction."),
            Self::InvalidNumberOfElementsInMatrix => write!(f, "The matrix must have 'rows * columns' elements."),
            Self::MatrixBytesTooShort => write!(f, "Not enough bytes to decode a matrix."),

            Self::InvalidQueryLength { expected, got } => write!(f, "Query must be '{}' bytes, received '{}'.", expected, got),
            Self::MalformedQueryMatrix => write!(f, "Query bytes do not decode to a matrix of the expected shape."),
            Self::IncompatibleQueryDimension => write!(f, "Query vector dimension does not match the database layout."),
            Self::MalformedFssKey => write!(f, "Query bytes do not decode to a well-formed function secret sharing key."),
            Self::InvalidBitWidth(n) => write!(f, "Function secret sharing bit width '{}' is out of range.", n),

            Self::InvalidAnswerLength { expected, got } => write!(f, "Answer must be '{}' bytes, received '{}'.", expected, got),
            Self::WrongNumberOfAnswers { expected, got } => write!(f, "Expected answers from '{}' servers, received '{}'.", expected, got),
            Self::TagVerificationFailed => write!(f, "Answer authentication tag does not match."),
            Self::ReconstructionBoundExceeded => write!(f, "Reconstructed residue exceeds the decoding bound."),
            Self::MajorityVoteFailed => write!(f, "No majority among the amplified reconstruction instances."),
            Self::NoPendingQuery => write!(f, "No pending query in internal client state."),
            Self::PendingQueryExists => write!(f, "A pending query already exists in internal client state."),

            Self::InconsistentDatabaseShape => write!(f, "Database layout parameters are inconsistent with its storage length."),
            Self::UnsupportedScheme(s) => write!(f, "Scheme '{}' is not supported.", s),
            Self::MismatchedParameters => write!(f, "Client and server parameters do not agree."),

            Self::Internal(e) => write!(f, "Internal failure: {}", e),
        }
    }
}

impl Error for VpirError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}
