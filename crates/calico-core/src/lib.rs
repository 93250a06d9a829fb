pub mod contract;
pub mod error;
pub mod parser;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use contract::{Contract, EffectKind, Parameter, PropertyClause, RecoverySpec, DEFAULT_EQUALITY_OP};
pub use error::{ParseError, ParseErrorKind, ResolveError};
pub use parser::{parse_block, parse_block_with_dialect, Dialect};
pub use source::{extract_blocks, AnnotationBlock};
pub use types::{CType, PrimitiveSizes, ScalarType, SizeResolver};
