//! Signature table for runtime intrinsics.
//!
//! The compiler emits external-call nodes naming a logical `(library,
//! function)` pair; this table is the single place that records each
//! intrinsic's arity, argument types, and result type, which the
//! expression parser enforces when synthesising the call.
//!
//! `Generic` as an argument type accepts any numeric operand; `Generic`
//! as a result means "same type as the argument" (SGN, ABS).

use crate::symbol::BaseType;
use crate::token::Keyword;

pub const LIB_INTRINSICS: &str = "Intrinsics";
pub const LIB_FILE: &str = "FileManager";
pub const LIB_PRINT: &str = "PrintManager";
pub const LIB_RUNTIME: &str = "Runtime";

#[derive(Debug, Clone, Copy)]
pub struct Intrinsic {
    pub library: &'static str,
    pub symbol: &'static str,
    pub args: &'static [BaseType],
    pub result: BaseType,
    /// Candidate for call inlining (disabled by --noinline).
    pub inline: bool,
}

const fn f(
    library: &'static str,
    symbol: &'static str,
    args: &'static [BaseType],
    result: BaseType,
    inline: bool,
) -> Intrinsic {
    Intrinsic {
        library,
        symbol,
        args,
        result,
        inline,
    }
}

use BaseType::{Char, Double, Generic, Integer};

/// Intrinsics reachable as expression operands, keyed by keyword.
pub fn lookup(kw: Keyword) -> Option<Intrinsic> {
    let entry = match kw {
        // Math, computed in double precision.
        Keyword::Log => f(LIB_INTRINSICS, "LOG10", &[Double], Double, true),
        Keyword::Sin => f(LIB_INTRINSICS, "SIN", &[Double], Double, true),
        Keyword::Cos => f(LIB_INTRINSICS, "COS", &[Double], Double, true),
        Keyword::Tan => f(LIB_INTRINSICS, "TAN", &[Double], Double, true),
        Keyword::Atn => f(LIB_INTRINSICS, "ATAN", &[Double], Double, true),
        Keyword::Sqr => f(LIB_INTRINSICS, "SQRT", &[Double], Double, true),
        Keyword::Exp => f(LIB_INTRINSICS, "EXP", &[Double], Double, true),
        Keyword::Int => f(LIB_INTRINSICS, "FLOOR", &[Double], Double, true),
        // Typed: result follows the argument.
        Keyword::Sgn => f(LIB_INTRINSICS, "SGN", &[Generic], Generic, true),
        Keyword::Abs => f(LIB_INTRINSICS, "ABS", &[Generic], Generic, true),
        // Strings.
        Keyword::ChrS => f(LIB_INTRINSICS, "CHAR", &[Integer], Char, false),
        Keyword::Ord => f(LIB_INTRINSICS, "ICHAR", &[Char], Integer, false),
        Keyword::Len => f(LIB_INTRINSICS, "LEN", &[Char], Integer, false),
        Keyword::Val => f(LIB_INTRINSICS, "VAL", &[Char], BaseType::Float, false),
        Keyword::StrS => f(LIB_INTRINSICS, "STR", &[Generic], Char, false),
        Keyword::SpcS => f(LIB_INTRINSICS, "SPC", &[Integer], Char, false),
        Keyword::GetS => f(LIB_FILE, "GET", &[Integer, Integer], Char, false),
        // File state.
        Keyword::Eof => f(LIB_FILE, "EOF", &[Integer], Integer, false),
        // Zero-argument runtime properties.
        Keyword::Rnd => f(LIB_RUNTIME, "RND", &[], BaseType::Float, false),
        Keyword::Time => f(LIB_RUNTIME, "get_TIME", &[], Integer, false),
        Keyword::KeyS => f(LIB_RUNTIME, "get_KEY", &[], Char, false),
        Keyword::Freefile => f(LIB_FILE, "get_FREEFILE", &[], Integer, false),
        Keyword::Curcol => f(LIB_RUNTIME, "get_CURCOL", &[], Integer, false),
        Keyword::Currow => f(LIB_RUNTIME, "get_CURROW", &[], Integer, false),
        Keyword::Esc => f(LIB_RUNTIME, "get_ESC", &[], Integer, false),
        Keyword::Zone => f(LIB_FILE, "get_Zone", &[], Integer, false),
        _ => return None,
    };
    Some(entry)
}

/// Two-argument RND(lo, hi): a random integer in an inclusive range.
pub const RND_RANGE: Intrinsic = f(LIB_RUNTIME, "RND", &[Integer, Integer], Integer, false);

/// `a IN b` lowers to INDEX(haystack, needle).
pub const INDEX: Intrinsic = f(LIB_INTRINSICS, "INDEX", &[Char, Char], Integer, false);

/// Integer division and modulus keep Comal's rounding convention, which
/// differs from the host divide/remainder.
pub const IDIV: Intrinsic = f(LIB_INTRINSICS, "IDIV", &[Integer, Integer], Integer, false);
pub const IMOD: Intrinsic = f(LIB_INTRINSICS, "IMOD", &[Integer, Integer], Integer, false);

/// PRINT USING: formats a vararg payload into one string item.
pub const USING: Intrinsic = f(LIB_INTRINSICS, "USING", &[], Char, false);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_math_intrinsics_are_double() {
        for kw in [Keyword::Sin, Keyword::Cos, Keyword::Sqr, Keyword::Log] {
            let intr = lookup(kw).unwrap();
            assert_eq!(intr.args, &[BaseType::Double]);
            assert_eq!(intr.result, BaseType::Double);
            assert!(intr.inline);
        }
    }

    #[test]
    fn test_typed_intrinsics_follow_argument() {
        assert_eq!(lookup(Keyword::Abs).unwrap().result, BaseType::Generic);
        assert_eq!(lookup(Keyword::Sgn).unwrap().result, BaseType::Generic);
    }

    #[test]
    fn test_properties_have_no_args() {
        for kw in [Keyword::Time, Keyword::KeyS, Keyword::Freefile, Keyword::Esc] {
            assert!(lookup(kw).unwrap().args.is_empty());
        }
    }

    #[test]
    fn test_non_intrinsic_keywords_miss() {
        assert!(lookup(Keyword::Print).is_none());
        assert!(lookup(Keyword::For).is_none());
    }
}
