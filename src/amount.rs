use crate::error::{AppError, Result};

/// Token amount in the token's smallest unit.
pub type Amount = u128;

/// Parse a base-10 amount string as stored by the ledger client and the
/// migration slot. Signs, whitespace inside the number and fractions are rejected.
pub fn parse_amount(raw: &str) -> Result<Amount> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::InvalidAmount(format!("'{raw}' is not a base-10 integer")));
    }
    trimmed
        .parse::<Amount>()
        .map_err(|e| AppError::InvalidAmount(format!("'{raw}': {e}")))
}

fn pow10(exp: u32) -> Option<Amount> {
    10u128.checked_pow(exp)
}

/// Human-readable amount with full precision and no trailing zeros,
/// e.g. `1200000` with 6 decimals is `1.2`.
pub fn format_amount(amount: Amount, decimals: u8) -> String {
    let digits = amount.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let (int_part, frac_part) = if digits.len() > decimals {
        let split = digits.len() - decimals;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{digits:0>decimals$}"))
    };

    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part
    } else {
        format!("{int_part}.{frac_part}")
    }
}

/// Amount rounded half-up to a fixed number of fractional digits,
/// e.g. `1200000` with 6 decimals and 2 digits is `1.20`.
pub fn format_fixed(amount: Amount, decimals: u8, digits: u8) -> String {
    let scaled = if decimals >= digits {
        match pow10(u32::from(decimals - digits)) {
            Some(divisor) => {
                let quotient = amount / divisor;
                let remainder = amount % divisor;
                // half-up without overflowing on remainder * 2
                if remainder >= divisor - remainder {
                    quotient + 1
                } else {
                    quotient
                }
            }
            None => 0,
        }
    } else {
        pow10(u32::from(digits - decimals))
            .map(|factor| amount.saturating_mul(factor))
            .unwrap_or(Amount::MAX)
    };

    if digits == 0 {
        return scaled.to_string();
    }

    match pow10(u32::from(digits)) {
        Some(unit) => format!(
            "{}.{:0width$}",
            scaled / unit,
            scaled % unit,
            width = digits as usize
        ),
        None => format_amount(scaled, digits),
    }
}
