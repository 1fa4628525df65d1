//! Money Conversion Module
//!
//! Unified conversion between the internal u64 minor-unit representation and
//! the client-facing string/Decimal representation. All conversions MUST go
//! through this module.
//!
//! ## Internal Representation
//! - All amounts are stored as `u64` minor units (cents)
//! - The scale factor is `10^CURRENCY_DECIMALS`
//! - Balances never leave the crate as floats

use rust_decimal::prelude::*;
use thiserror::Error;

/// Decimal places of the ledger currency. Every account and every transaction
/// record uses this scale.
pub const CURRENCY_DECIMALS: u32 = 2;

/// Money conversion errors
#[derive(Debug, Error)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Convert a client string amount to internal minor units.
///
/// Rejects zero, negative, over-precise and malformed input. No silent
/// truncation: `"1.005"` is an error at 2 decimals, not `100`.
pub fn parse_amount(amount_str: &str, decimals: u32) -> Result<u64, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    // Explicit signs are rejected; amounts are positive by contract
    if amount_str.starts_with('-') || amount_str.starts_with('+') {
        return Err(MoneyError::InvalidAmount);
    }

    let parts: Vec<&str> = amount_str.split('.').collect();
    let (whole, frac) = match parts.len() {
        1 => (parts[0], ""),
        2 => {
            // Require both sides of the dot to be non-empty: no ".5" or "5."
            if parts[0].is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing leading zero (e.g., use 0.5 instead of .5)".into(),
                ));
            }
            if parts[1].is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing fractional part (e.g., use 5.0 instead of 5.)".into(),
                ));
            }
            (parts[0], parts[1])
        }
        _ => return Err(MoneyError::InvalidFormat("multiple decimal points".into())),
    };

    if frac.len() > decimals as usize {
        return Err(MoneyError::PrecisionOverflow {
            provided: frac.len() as u32,
            max: decimals,
        });
    }

    let whole_num: u64 = whole.parse::<u64>().map_err(|e| {
        let err_str = e.to_string();
        if err_str.contains("too large") || err_str.contains("overflow") {
            MoneyError::Overflow
        } else {
            MoneyError::InvalidFormat(format!("invalid character in whole part: {}", whole))
        }
    })?;

    let frac_num: u64 = if decimals == 0 || frac.is_empty() {
        0
    } else {
        let frac_padded = format!("{:0<width$}", frac, width = decimals as usize);
        frac_padded[..decimals as usize]
            .parse::<u64>()
            .map_err(|_| MoneyError::InvalidFormat("invalid fractional part".into()))?
    };

    let multiplier = 10u64.pow(decimals);
    let amount = whole_num
        .checked_mul(multiplier)
        .and_then(|v: u64| v.checked_add(frac_num))
        .ok_or(MoneyError::Overflow)?;

    if amount == 0 {
        return Err(MoneyError::InvalidAmount);
    }

    Ok(amount)
}

/// Convert a Decimal to internal minor units.
///
/// Used at the gateway boundary where `rust_decimal::Decimal` handles JSON
/// deserialization (accepting both `"12.50"` and `12.5`).
pub fn parse_decimal(decimal: Decimal, decimals: u32) -> Result<u64, MoneyError> {
    if decimal.is_sign_negative() || decimal.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }

    if decimal.scale() > decimals {
        // normalize() strips trailing zeros so "1.50" at scale 2 still passes
        let normalized = decimal.normalize();
        if normalized.scale() > decimals {
            return Err(MoneyError::PrecisionOverflow {
                provided: decimal.scale(),
                max: decimals,
            });
        }
    }

    let multiplier = Decimal::from(10u64.pow(decimals));
    let result = decimal * multiplier;

    if !result.fract().is_zero() {
        return Err(MoneyError::PrecisionOverflow {
            provided: decimal.scale(),
            max: decimals,
        });
    }

    result.to_u64().ok_or(MoneyError::Overflow)
}

/// Convert internal minor units to a display string with full precision.
pub fn format_amount(value: u64, decimals: u32) -> String {
    let decimal_value = Decimal::from(value) / Decimal::from(10u64.pow(decimals));
    format!("{:.prec$}", decimal_value, prec = decimals as usize)
}
