use std::fmt;

/// Fixed denominator applied to bare decimal literals (the rate form).
pub const EXP_SCALE: u32 = 18;

const MAX_DIGITS: usize = 38;

/// A DSL number: a raw integer mantissa plus an optional display scale.
///
/// The mantissa is always the exact value handed to the backend. The scale
/// is carried only so human-entered decimals (`0.5` → mantissa `5e17`,
/// scale 18) keep rendering the way they were written; it never participates
/// in comparison, so `Exactly 500000000000000000` and `0.5` are equal.
#[derive(Debug, Clone, Copy, Eq)]
pub struct Number {
    mantissa: i128,
    scale: Option<u32>,
}

impl Number {
    /// An exact integer amount, no display scale.
    pub fn exact(mantissa: i128) -> Self {
        Self {
            mantissa,
            scale: None,
        }
    }

    /// A mantissa entered as a decimal, displayed against the 1e18 scale.
    pub fn scaled(mantissa: i128) -> Self {
        Self {
            mantissa,
            scale: Some(EXP_SCALE),
        }
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn scale(&self) -> Option<u32> {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    /// Parse a numeric literal.
    ///
    /// Three forms are accepted:
    /// - plain integers (`5`, `-3`) — exact;
    /// - exponent forms (`1.5e18`, `2e8`) — must expand to an integer, exact;
    /// - bare decimals (`0.5`) — scaled by the fixed 1e18 denominator and
    ///   tagged with the display scale.
    pub fn from_literal(text: &str) -> Result<Number, String> {
        let text = text.trim();
        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        if body.is_empty() {
            return Err("empty numeric literal".to_owned());
        }

        let (coefficient, exponent) = match body.split_once(['e', 'E']) {
            Some((coefficient, exponent)) => {
                let exponent: i32 = exponent
                    .parse()
                    .map_err(|_| format!("bad exponent in `{}`", text))?;
                (coefficient, Some(exponent))
            }
            None => (body, None),
        };

        let (int_part, frac_part) = match coefficient.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (coefficient, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(format!("missing digits in `{}`", text));
        }
        if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
            return Err(format!("`{}` is not a number", text));
        }

        let digits = format!("{}{}", int_part, frac_part);
        if digits.len() > MAX_DIGITS {
            return Err(format!("`{}` has too many digits", text));
        }
        let mut mantissa: i128 = digits.parse().map_err(|_| format!("`{}` overflows", text))?;
        let frac_len = frac_part.len() as i32;

        let scale = match exponent {
            Some(exponent) => {
                let shift = exponent - frac_len;
                mantissa = apply_shift(mantissa, shift)
                    .ok_or_else(|| format!("`{}` does not expand to an integer", text))?;
                None
            }
            None if frac_len > 0 => {
                if frac_len > EXP_SCALE as i32 {
                    return Err(format!("`{}` has more than {} decimal places", text, EXP_SCALE));
                }
                mantissa = apply_shift(mantissa, EXP_SCALE as i32 - frac_len)
                    .ok_or_else(|| format!("`{}` overflows the 1e18 scale", text))?;
                Some(EXP_SCALE)
            }
            None => None,
        };

        if negative {
            mantissa = -mantissa;
        }
        Ok(Number { mantissa, scale })
    }

    pub fn checked_add(&self, other: &Number) -> Option<Number> {
        Some(Number {
            mantissa: self.mantissa.checked_add(other.mantissa)?,
            scale: self.scale.or(other.scale),
        })
    }

    pub fn checked_sub(&self, other: &Number) -> Option<Number> {
        Some(Number {
            mantissa: self.mantissa.checked_sub(other.mantissa)?,
            scale: self.scale.or(other.scale),
        })
    }

    /// The non-negative raw amount handed to the chain backend.
    pub fn encode(&self) -> Result<u128, String> {
        u128::try_from(self.mantissa).map_err(|_| format!("cannot encode negative amount {}", self))
    }

    pub fn as_u64(&self) -> Option<u64> {
        u64::try_from(self.mantissa).ok()
    }
}

fn apply_shift(mantissa: i128, shift: i32) -> Option<i128> {
    if shift >= 0 {
        mantissa.checked_mul(10i128.checked_pow(u32::try_from(shift).ok()?)?)
    } else {
        let divisor = 10i128.checked_pow(u32::try_from(-shift).ok()?)?;
        if mantissa % divisor == 0 {
            Some(mantissa / divisor)
        } else {
            None
        }
    }
}

/// Display scale never participates in equality.
impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.mantissa == other.mantissa
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.mantissa.cmp(&other.mantissa)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scale {
            None => write!(f, "{}", self.mantissa),
            Some(scale) => {
                let divisor = 10i128.pow(scale);
                let sign = if self.mantissa < 0 { "-" } else { "" };
                let abs = self.mantissa.unsigned_abs();
                let int_part = abs / divisor.unsigned_abs();
                let frac_part = abs % divisor.unsigned_abs();
                if frac_part == 0 {
                    write!(f, "{}{}e{}", sign, int_part, scale)
                } else {
                    let frac = format!("{:0width$}", frac_part, width = scale as usize);
                    write!(f, "{}{}.{}e{}", sign, int_part, frac.trim_end_matches('0'), scale)
                }
            }
        }
    }
}
