use thiserror::Error;

/// Normalise a currency code: trim, upper-case, and require three ASCII letters (ISO 4217 shape).
pub fn normalize_currency(code: &str) -> Result<String, CurrencyError> {
    let code = code.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(CurrencyError::InvalidCode(code.to_string()));
    }
    Ok(code.to_ascii_uppercase())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurrencyError {
    #[error("invalid currency code '{0}' (expected e.g. USD)")]
    InvalidCode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_currency() {
        assert_eq!(normalize_currency("usd"), Ok("USD".to_string()));
        assert_eq!(normalize_currency(" Eur "), Ok("EUR".to_string()));
    }

    #[test]
    fn test_normalize_currency_rejects_bad_codes() {
        for code in ["", "US", "USDT", "U$D", "12A"] {
            assert!(normalize_currency(code).is_err(), "{code} should be rejected");
        }
    }

    #[test]
    fn test_currency_error_message() {
        let err = normalize_currency("dollars").unwrap_err();
        assert_eq!(err, CurrencyError::InvalidCode("dollars".into()));
        assert_eq!(
            err.to_string(),
            "invalid currency code 'dollars' (expected e.g. USD)"
        );
    }
}
