//! Simulation failure decoding
//!
//! A simulation failure carrying a custom program error code is mapped to a
//! named error so the dashboard and logs show something actionable.

use crate::clients::chain::SimulationOutcome;
use crate::error::Error;

/// Decode a custom program error code into its known name
pub fn decode_custom_error(code: u32) -> String {
    match code {
        6000 => "EmptyRoute".to_string(),
        6001 => "SlippageToleranceExceeded".to_string(),
        6002 => "ZeroInAmount".to_string(),
        6003 => "ZeroOutAmount".to_string(),
        6024 => "InsufficientFunds".to_string(),
        other => format!("UnknownError_{other}"),
    }
}

/// Turn a failed simulation into the typed error. Returns None when the
/// simulation succeeded.
pub fn classify(outcome: &SimulationOutcome) -> Option<Error> {
    if outcome.success() {
        return None;
    }
    match outcome.custom_error_code {
        Some(code) => Some(Error::SimulationFailed {
            code,
            name: decode_custom_error(code),
        }),
        None => Some(Error::SimulationFailed {
            code: 0,
            name: outcome
                .err
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_error_codes() {
        assert_eq!(decode_custom_error(6000), "EmptyRoute");
        assert_eq!(decode_custom_error(6001), "SlippageToleranceExceeded");
        assert_eq!(decode_custom_error(6002), "ZeroInAmount");
        assert_eq!(decode_custom_error(6003), "ZeroOutAmount");
        assert_eq!(decode_custom_error(6024), "InsufficientFunds");
    }

    #[test]
    fn test_unknown_code_surface() {
        assert_eq!(decode_custom_error(6999), "UnknownError_6999");
    }

    #[test]
    fn test_classify_success_is_none() {
        let outcome = SimulationOutcome {
            err: None,
            custom_error_code: None,
            logs: vec![],
            units_consumed: Some(100),
        };
        assert!(classify(&outcome).is_none());
    }

    #[test]
    fn test_classify_custom_code() {
        let outcome = SimulationOutcome {
            err: Some("custom program error: 0x1771".into()),
            custom_error_code: Some(6001),
            logs: vec![],
            units_consumed: None,
        };
        match classify(&outcome).unwrap() {
            Error::SimulationFailed { code, name } => {
                assert_eq!(code, 6001);
                assert_eq!(name, "SlippageToleranceExceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
