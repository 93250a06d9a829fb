//! C scalar types and the type-size resolver.
//!
//! Contracts describe parameters with C type strings (`"int*"`) and recovery
//! regions with size expressions (`"sizeof(int)"`). [`CType`] gives those
//! strings enough structure to decode snapshot bytes, and [`SizeResolver`]
//! turns size expressions into byte counts.
//!
//! Sizes follow an LP64 target: `long` and pointers are 8 bytes.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ResolveError;

/// Size in bytes of any pointer type.
pub const POINTER_SIZE: usize = 8;

/// Numeric C types that snapshot bytes can be decoded into.
///
/// Signedness is part of the type here (unlike a register-level view),
/// because predicates such as `negate` and `preserve_sign` depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ScalarType {
    /// Width of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            ScalarType::I8 | ScalarType::U8 => 1,
            ScalarType::I16 | ScalarType::U16 => 2,
            ScalarType::I32 | ScalarType::U32 | ScalarType::F32 => 4,
            ScalarType::I64 | ScalarType::U64 | ScalarType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::F32 | ScalarType::F64)
    }

    pub fn is_signed(self) -> bool {
        !matches!(
            self,
            ScalarType::U8 | ScalarType::U16 | ScalarType::U32 | ScalarType::U64
        )
    }

    /// Maps a C spelling (after `const`/`volatile` removal) to a scalar type.
    fn from_c_name(name: &str) -> Option<ScalarType> {
        let ty = match name {
            "char" | "signed char" | "int8_t" => ScalarType::I8,
            "unsigned char" | "uint8_t" | "_Bool" | "bool" => ScalarType::U8,
            "short" | "short int" | "signed short" | "signed short int" | "int16_t" => {
                ScalarType::I16
            }
            "unsigned short" | "unsigned short int" | "uint16_t" => ScalarType::U16,
            "int" | "signed" | "signed int" | "int32_t" => ScalarType::I32,
            "unsigned" | "unsigned int" | "uint32_t" => ScalarType::U32,
            "long" | "long int" | "signed long" | "long long" | "long long int"
            | "signed long long" | "int64_t" | "ssize_t" | "ptrdiff_t" | "intptr_t" => {
                ScalarType::I64
            }
            "unsigned long" | "unsigned long int" | "unsigned long long"
            | "unsigned long long int" | "uint64_t" | "size_t" | "uintptr_t" => ScalarType::U64,
            "float" => ScalarType::F32,
            "double" => ScalarType::F64,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::I8 => "char",
            ScalarType::U8 => "unsigned char",
            ScalarType::I16 => "short",
            ScalarType::U16 => "unsigned short",
            ScalarType::I32 => "int",
            ScalarType::U32 => "unsigned int",
            ScalarType::I64 => "long",
            ScalarType::U64 => "unsigned long",
            ScalarType::F32 => "float",
            ScalarType::F64 => "double",
        };
        f.write_str(name)
    }
}

/// A parsed C type string: a scalar, `void`, or a pointer to either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CType {
    Void,
    Scalar(ScalarType),
    Pointer(Box<CType>),
}

impl CType {
    /// Parses a declared type such as `"int*"`, `"const double *"` or
    /// `"unsigned long"`. Returns `None` for anything that is not a known
    /// scalar, `void`, or a pointer to one of those.
    pub fn parse(declared: &str) -> Option<CType> {
        let mut base = declared.trim();
        let mut depth = 0usize;
        while let Some(stripped) = base.strip_suffix('*') {
            depth += 1;
            base = stripped.trim_end();
        }

        let words: Vec<&str> = base
            .split_whitespace()
            .filter(|w| !matches!(*w, "const" | "volatile" | "restrict"))
            .collect();
        if words.is_empty() {
            return None;
        }
        let name = words.join(" ");

        let mut ty = if name == "void" {
            CType::Void
        } else {
            CType::Scalar(ScalarType::from_c_name(&name)?)
        };
        for _ in 0..depth {
            ty = CType::Pointer(Box::new(ty));
        }
        Some(ty)
    }

    /// The numeric type that a region for this parameter holds.
    ///
    /// A pointer to a scalar yields the pointee; a plain scalar yields
    /// itself. `void` and pointers to pointers have no element type.
    pub fn element_type(&self) -> Option<ScalarType> {
        match self {
            CType::Scalar(s) => Some(*s),
            CType::Pointer(inner) => match inner.as_ref() {
                CType::Scalar(s) => Some(*s),
                _ => None,
            },
            CType::Void => None,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::Pointer(_))
    }

    /// Size in bytes, or `None` for `void`.
    pub fn size(&self) -> Option<usize> {
        match self {
            CType::Void => None,
            CType::Scalar(s) => Some(s.size()),
            CType::Pointer(_) => Some(POINTER_SIZE),
        }
    }
}

/// Maps a size expression such as `"sizeof(int)"` to a byte count.
pub trait SizeResolver: Send + Sync {
    fn resolve_size(&self, expr: &str) -> Result<usize, ResolveError>;
}

/// Fixed table resolver for C primitive types.
///
/// Accepts `sizeof(T)`, a bare type name `T`, or a positive integer literal.
/// Additional names (typedefs, structs) can be registered with
/// [`with_type`](Self::with_type); registered names take precedence.
#[derive(Debug, Clone, Default)]
pub struct PrimitiveSizes {
    extra: IndexMap<String, usize>,
}

impl PrimitiveSizes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named type with a fixed size.
    pub fn with_type(mut self, name: &str, size: usize) -> Self {
        self.extra.insert(name.trim().to_string(), size);
        self
    }

    fn size_of_type(&self, name: &str) -> Result<usize, ResolveError> {
        if let Some(size) = self.extra.get(name) {
            return Ok(*size);
        }
        match CType::parse(name) {
            Some(ty) => ty.size().ok_or_else(|| ResolveError::Unsized {
                name: name.to_string(),
            }),
            None => Err(ResolveError::UnknownType {
                name: name.to_string(),
            }),
        }
    }
}

impl SizeResolver for PrimitiveSizes {
    fn resolve_size(&self, expr: &str) -> Result<usize, ResolveError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(ResolveError::Malformed {
                expr: expr.to_string(),
            });
        }

        if expr.bytes().all(|b| b.is_ascii_digit()) {
            return match expr.parse::<usize>() {
                Ok(0) => Err(ResolveError::Unsized {
                    name: expr.to_string(),
                }),
                Ok(n) => Ok(n),
                Err(_) => Err(ResolveError::Malformed {
                    expr: expr.to_string(),
                }),
            };
        }

        match expr.strip_prefix("sizeof") {
            Some(rest) => {
                let inner = rest
                    .trim()
                    .strip_prefix('(')
                    .and_then(|r| r.strip_suffix(')'))
                    .ok_or_else(|| ResolveError::Malformed {
                        expr: expr.to_string(),
                    })?;
                self.size_of_type(inner.trim())
            }
            None => self.size_of_type(expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pointer_types() {
        assert_eq!(
            CType::parse("int*"),
            Some(CType::Pointer(Box::new(CType::Scalar(ScalarType::I32))))
        );
        assert_eq!(
            CType::parse(" const double * "),
            Some(CType::Pointer(Box::new(CType::Scalar(ScalarType::F64))))
        );
        assert_eq!(
            CType::parse("void *"),
            Some(CType::Pointer(Box::new(CType::Void)))
        );
    }

    #[test]
    fn parse_multi_word_scalars() {
        assert_eq!(
            CType::parse("unsigned long long"),
            Some(CType::Scalar(ScalarType::U64))
        );
        assert_eq!(CType::parse("short int"), Some(CType::Scalar(ScalarType::I16)));
        assert_eq!(CType::parse("struct node"), None);
        assert_eq!(CType::parse(""), None);
        assert_eq!(CType::parse("*"), None);
    }

    #[test]
    fn element_type_of_pointer_and_scalar() {
        assert_eq!(
            CType::parse("int*").unwrap().element_type(),
            Some(ScalarType::I32)
        );
        assert_eq!(
            CType::parse("double").unwrap().element_type(),
            Some(ScalarType::F64)
        );
        assert_eq!(CType::parse("void*").unwrap().element_type(), None);
        assert_eq!(CType::parse("int**").unwrap().element_type(), None);
    }

    #[test]
    fn resolve_sizeof_primitives() {
        let sizes = PrimitiveSizes::new();
        assert_eq!(sizes.resolve_size("sizeof(int)"), Ok(4));
        assert_eq!(sizes.resolve_size("sizeof( double )"), Ok(8));
        assert_eq!(sizes.resolve_size("sizeof(char)"), Ok(1));
        assert_eq!(sizes.resolve_size("sizeof(int*)"), Ok(8));
        assert_eq!(sizes.resolve_size("long"), Ok(8));
        assert_eq!(sizes.resolve_size("16"), Ok(16));
    }

    #[test]
    fn resolve_rejects_unknown_and_malformed() {
        let sizes = PrimitiveSizes::new();
        assert_eq!(
            sizes.resolve_size("sizeof(struct point)"),
            Err(ResolveError::UnknownType {
                name: "struct point".into()
            })
        );
        assert_eq!(
            sizes.resolve_size("sizeof(void)"),
            Err(ResolveError::Unsized {
                name: "void".into()
            })
        );
        assert!(matches!(
            sizes.resolve_size("sizeof int"),
            Err(ResolveError::Malformed { .. })
        ));
        assert!(matches!(
            sizes.resolve_size("0"),
            Err(ResolveError::Unsized { .. })
        ));
        assert!(matches!(
            sizes.resolve_size("  "),
            Err(ResolveError::Malformed { .. })
        ));
    }

    #[test]
    fn registered_types_take_precedence() {
        let sizes = PrimitiveSizes::new().with_type("struct point", 12);
        assert_eq!(sizes.resolve_size("sizeof(struct point)"), Ok(12));
    }

    #[test]
    fn scalar_sizes_match_display_names() {
        for ty in [
            ScalarType::I8,
            ScalarType::I16,
            ScalarType::I32,
            ScalarType::I64,
            ScalarType::F32,
            ScalarType::F64,
        ] {
            let sizes = PrimitiveSizes::new();
            assert_eq!(sizes.resolve_size(&format!("sizeof({ty})")), Ok(ty.size()));
        }
    }
}
