use crate::error::{
    LotteryError,
    Result,
};
use alloy_primitives::{
    Address,
    U256,
};
use std::{
    fmt,
    str::FromStr,
};

/// Decimals used by the lottery token unless the deployment record says otherwise.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// A token amount in base units, displayed as a human decimal string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TokenAmount {
    base_units: U256,
    decimals: u8,
}

impl TokenAmount {
    pub fn new(base_units: U256, decimals: u8) -> Self {
        Self {
            base_units,
            decimals,
        }
    }

    /// Exactly `whole` tokens.
    pub fn whole(whole: u64, decimals: u8) -> Self {
        Self::new(U256::from(whole) * one_token(decimals), decimals)
    }

    pub fn base_units(&self) -> U256 {
        self.base_units
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_zero(&self) -> bool {
        self.base_units.is_zero()
    }

    /// At least one whole token.
    pub fn at_least_one_token(&self) -> bool {
        self.base_units >= one_token(self.decimals)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_token_amount(self.base_units, self.decimals))
    }
}

pub fn one_token(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

/// `5_000000000000000000` with 18 decimals renders as `5`, half a token as `0.5`.
pub fn format_token_amount(base_units: U256, decimals: u8) -> String {
    let unit = one_token(decimals);
    let whole = base_units / unit;
    let fractional = base_units % unit;
    if fractional.is_zero() {
        return whole.to_string();
    }
    let padded = format!(
        "{:0>width$}",
        fractional.to_string(),
        width = usize::from(decimals)
    );
    format!("{}.{}", whole, padded.trim_end_matches('0'))
}

pub fn parse_token_amount(raw: &str, decimals: u8) -> Result<U256> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(LotteryError::validation("amount is empty"));
    }
    let (whole, fractional) = match trimmed.split_once('.') {
        Some((whole, fractional)) => (whole, fractional),
        None => (trimmed, ""),
    };
    if whole.is_empty() && fractional.is_empty() {
        return Err(LotteryError::validation(format!("'{raw}' is not an amount")));
    }
    let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if !all_digits(whole) || !all_digits(fractional) {
        return Err(LotteryError::validation(format!("'{raw}' is not an amount")));
    }
    if fractional.len() > usize::from(decimals) {
        return Err(LotteryError::validation(format!(
            "'{raw}' has more than {decimals} decimal places"
        )));
    }

    let overflow = || LotteryError::validation(format!("'{raw}' is too large"));
    let whole_units = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10).map_err(|_| overflow())?
    };
    let padded = format!("{:0<width$}", fractional, width = usize::from(decimals));
    let fractional_units = if padded.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(&padded, 10).map_err(|_| overflow())?
    };
    whole_units
        .checked_mul(one_token(decimals))
        .and_then(|units| units.checked_add(fractional_units))
        .ok_or_else(overflow)
}

/// Accepts `0x` followed by 40 hex digits. Mixed-case input must carry a valid EIP-55
/// checksum; all-lowercase or all-uppercase input is taken as is.
pub fn parse_address(raw: &str) -> Result<Address> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(LotteryError::validation(format!(
            "'{trimmed}' is not a ledger address"
        )));
    }
    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    let normalized = format!("0x{digits}");
    if has_lower && has_upper {
        return Address::parse_checksummed(&normalized, None).map_err(|_| {
            LotteryError::validation(format!("'{trimmed}' has an invalid checksum"))
        });
    }
    Address::from_str(&normalized)
        .map_err(|_| LotteryError::validation(format!("'{trimmed}' is not a ledger address")))
}

/// `0x5aAe…eAed`
pub fn short_address(address: &Address) -> String {
    let full = address.to_string();
    if full.len() <= 12 {
        return full;
    }
    format!("{}…{}", &full[..6], &full[full.len() - 4..])
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use proptest::prelude::*;

    const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    #[test]
    fn format_token_amount__trims_trailing_zeros() {
        let five = U256::from(5u64) * one_token(18);
        let one_and_a_half = U256::from(15u64) * one_token(17);

        assert_eq!(format_token_amount(five, 18), "5");
        assert_eq!(format_token_amount(one_and_a_half, 18), "1.5");
        assert_eq!(format_token_amount(U256::from(1u64), 18), "0.000000000000000001");
        assert_eq!(format_token_amount(U256::ZERO, 18), "0");
    }

    #[test]
    fn format_token_amount__zero_decimals_prints_integer() {
        assert_eq!(format_token_amount(U256::from(42u64), 0), "42");
    }

    #[test]
    fn parse_token_amount__accepts_whole_and_fractional_values() {
        assert_eq!(
            parse_token_amount("5", 18).unwrap(),
            U256::from(5u64) * one_token(18)
        );
        assert_eq!(
            parse_token_amount(" 0.25 ", 2).unwrap(),
            U256::from(25u64)
        );
        assert_eq!(parse_token_amount(".5", 1).unwrap(), U256::from(5u64));
    }

    #[test]
    fn parse_token_amount__rejects_garbage() {
        for raw in ["", "abc", "-1", "1.2.3", ".", "1e18", "0x10"] {
            let result = parse_token_amount(raw, 18);
            assert!(
                matches!(result, Err(LotteryError::Validation(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn parse_token_amount__rejects_excess_precision() {
        let result = parse_token_amount("1.001", 2);

        assert!(matches!(result, Err(LotteryError::Validation(_))));
    }

    #[test]
    fn parse_token_amount__rejects_overflow() {
        let huge = "9".repeat(80);

        let result = parse_token_amount(&huge, 18);

        assert!(matches!(result, Err(LotteryError::Validation(_))));
    }

    #[test]
    fn parse_address__accepts_checksummed_and_single_case() {
        let expected = Address::from_str(CHECKSUMMED).unwrap();

        assert_eq!(parse_address(CHECKSUMMED).unwrap(), expected);
        assert_eq!(parse_address(&CHECKSUMMED.to_lowercase()).unwrap(), expected);
        assert_eq!(
            parse_address(&format!("0x{}", CHECKSUMMED[2..].to_uppercase())).unwrap(),
            expected
        );
        assert_eq!(parse_address(&CHECKSUMMED[2..]).unwrap(), expected);
    }

    #[test]
    fn parse_address__rejects_bad_checksum() {
        let broken = CHECKSUMMED.replacen("aAe", "aae", 1);

        let result = parse_address(&broken);

        assert!(matches!(result, Err(LotteryError::Validation(_))));
    }

    #[test]
    fn parse_address__rejects_wrong_length_and_non_hex() {
        let too_long = format!("{CHECKSUMMED}00");
        let candidates = [
            "",
            "0x",
            "0x1234",
            too_long.as_str(),
            "0xZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZ",
        ];
        for raw in candidates {
            assert!(parse_address(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn token_amount__at_least_one_token() {
        assert!(!TokenAmount::new(U256::ZERO, 18).at_least_one_token());
        assert!(!TokenAmount::new(one_token(18) - U256::from(1u64), 18).at_least_one_token());
        assert!(TokenAmount::whole(1, 18).at_least_one_token());
    }

    proptest! {
        #[test]
        fn parse_token_amount__reads_back_what_format_prints(raw in any::<u128>(), decimals in 0u8..=24) {
            let base_units = U256::from(raw);
            let printed = format_token_amount(base_units, decimals);
            prop_assert_eq!(parse_token_amount(&printed, decimals).unwrap(), base_units);
        }
    }
}
