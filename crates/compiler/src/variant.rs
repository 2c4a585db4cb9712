//! Tagged scalar values used for literals, constant folding, and static
//! data.
//!
//! Arithmetic widens automatically (Integer -> Float -> Double); integer
//! overflow wraps modulo 2^32; division by zero is a recoverable error,
//! never a panic.

use std::cmp::Ordering;
use std::fmt;

use crate::token::format_float;

#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Int(i32),
    Float(f32),
    Double(f64),
    Str(String),
}

impl Variant {
    /// Widening rank: Int < Float < Double. Strings do not widen.
    fn rank(&self) -> u8 {
        match self {
            Variant::Int(_) => 0,
            Variant::Float(_) => 1,
            Variant::Double(_) => 2,
            Variant::Str(_) => 3,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Variant::Str(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Variant::Str(_))
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Variant::Int(v) => *v == 0,
            Variant::Float(v) => *v == 0.0,
            Variant::Double(v) => *v == 0.0,
            Variant::Str(_) => false,
        }
    }

    /// True when the value equals the given integer exactly.
    pub fn equals_int(&self, n: i32) -> bool {
        match self {
            Variant::Int(v) => *v == n,
            Variant::Float(v) => *v == n as f32,
            Variant::Double(v) => *v == n as f64,
            Variant::Str(_) => false,
        }
    }

    /// Truncating integer view. Strings yield 0.
    pub fn as_i32(&self) -> i32 {
        match self {
            Variant::Int(v) => *v,
            Variant::Float(v) => *v as i32,
            Variant::Double(v) => *v as i32,
            Variant::Str(_) => 0,
        }
    }

    fn as_f32(&self) -> f32 {
        match self {
            Variant::Int(v) => *v as f32,
            Variant::Float(v) => *v,
            Variant::Double(v) => *v as f32,
            Variant::Str(_) => 0.0,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Variant::Int(v) => *v as f64,
            Variant::Float(v) => *v as f64,
            Variant::Double(v) => *v,
            Variant::Str(_) => 0.0,
        }
    }

    fn numeric_pair(&self, other: &Variant, op: &str) -> Result<u8, String> {
        if !self.is_numeric() || !other.is_numeric() {
            return Err(format!("'{}' needs numeric operands", op));
        }
        Ok(self.rank().max(other.rank()))
    }

    pub fn add(&self, other: &Variant) -> Result<Variant, String> {
        if let (Variant::Str(a), Variant::Str(b)) = (self, other) {
            return Ok(Variant::Str(format!("{}{}", a, b)));
        }
        match self.numeric_pair(other, "+")? {
            0 => Ok(Variant::Int(self.as_i32().wrapping_add(other.as_i32()))),
            1 => Ok(Variant::Float(self.as_f32() + other.as_f32())),
            _ => Ok(Variant::Double(self.as_f64() + other.as_f64())),
        }
    }

    pub fn sub(&self, other: &Variant) -> Result<Variant, String> {
        match self.numeric_pair(other, "-")? {
            0 => Ok(Variant::Int(self.as_i32().wrapping_sub(other.as_i32()))),
            1 => Ok(Variant::Float(self.as_f32() - other.as_f32())),
            _ => Ok(Variant::Double(self.as_f64() - other.as_f64())),
        }
    }

    pub fn mul(&self, other: &Variant) -> Result<Variant, String> {
        match self.numeric_pair(other, "*")? {
            0 => Ok(Variant::Int(self.as_i32().wrapping_mul(other.as_i32()))),
            1 => Ok(Variant::Float(self.as_f32() * other.as_f32())),
            _ => Ok(Variant::Double(self.as_f64() * other.as_f64())),
        }
    }

    pub fn div(&self, other: &Variant) -> Result<Variant, String> {
        if other.is_zero() {
            return Err("division by zero".to_string());
        }
        match self.numeric_pair(other, "/")? {
            0 => Ok(Variant::Int(self.as_i32().wrapping_div(other.as_i32()))),
            1 => Ok(Variant::Float(self.as_f32() / other.as_f32())),
            _ => Ok(Variant::Double(self.as_f64() / other.as_f64())),
        }
    }

    pub fn pow(&self, other: &Variant) -> Result<Variant, String> {
        match self.numeric_pair(other, "^")? {
            0 => {
                let exp = other.as_i32();
                if exp >= 0 {
                    Ok(Variant::Int(self.as_i32().wrapping_pow(exp as u32)))
                } else {
                    Ok(Variant::Double(self.as_f64().powi(exp)))
                }
            }
            1 => Ok(Variant::Float(self.as_f32().powf(other.as_f32()))),
            _ => Ok(Variant::Double(self.as_f64().powf(other.as_f64()))),
        }
    }

    pub fn neg(&self) -> Result<Variant, String> {
        match self {
            Variant::Int(v) => Ok(Variant::Int(v.wrapping_neg())),
            Variant::Float(v) => Ok(Variant::Float(-v)),
            Variant::Double(v) => Ok(Variant::Double(-v)),
            Variant::Str(_) => Err("'-' needs a numeric operand".to_string()),
        }
    }

    /// Three-way comparison; numerics widen, strings compare byte-wise.
    pub fn compare(&self, other: &Variant) -> Result<Ordering, String> {
        match (self, other) {
            (Variant::Str(a), Variant::Str(b)) => Ok(a.cmp(b)),
            _ => {
                self.numeric_pair(other, "compare")?;
                Ok(self
                    .as_f64()
                    .partial_cmp(&other.as_f64())
                    .unwrap_or(Ordering::Equal))
            }
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Int(v) => write!(f, "{}", v),
            Variant::Float(v) => f.write_str(&format_float(*v)),
            Variant::Double(v) => write!(f, "{}", v),
            Variant::Str(s) => f.write_str(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widening() {
        assert_eq!(
            Variant::Int(2).add(&Variant::Int(3)).unwrap(),
            Variant::Int(5)
        );
        assert_eq!(
            Variant::Int(2).add(&Variant::Float(0.5)).unwrap(),
            Variant::Float(2.5)
        );
        assert_eq!(
            Variant::Float(2.0).mul(&Variant::Double(1.5)).unwrap(),
            Variant::Double(3.0)
        );
    }

    #[test]
    fn test_integer_wraps() {
        assert_eq!(
            Variant::Int(i32::MAX).add(&Variant::Int(1)).unwrap(),
            Variant::Int(i32::MIN)
        );
    }

    #[test]
    fn test_division_by_zero_is_recoverable() {
        assert!(Variant::Int(1).div(&Variant::Int(0)).is_err());
        assert!(Variant::Float(1.0).div(&Variant::Float(0.0)).is_err());
    }

    #[test]
    fn test_string_concat_and_compare() {
        assert_eq!(
            Variant::Str("AB".into()).add(&Variant::Str("CD".into())).unwrap(),
            Variant::Str("ABCD".into())
        );
        assert_eq!(
            Variant::Str("A".into())
                .compare(&Variant::Str("B".into()))
                .unwrap(),
            Ordering::Less
        );
        assert!(Variant::Str("A".into()).add(&Variant::Int(1)).is_err());
    }

    #[test]
    fn test_pow() {
        assert_eq!(
            Variant::Int(2).pow(&Variant::Int(10)).unwrap(),
            Variant::Int(1024)
        );
        assert_eq!(
            Variant::Int(2).pow(&Variant::Int(-1)).unwrap(),
            Variant::Double(0.5)
        );
    }

    #[test]
    fn test_is_zero_and_equals_int() {
        assert!(Variant::Int(0).is_zero());
        assert!(Variant::Double(0.0).is_zero());
        assert!(Variant::Float(1.0).equals_int(1));
        assert!(!Variant::Str("0".into()).is_zero());
    }
}
