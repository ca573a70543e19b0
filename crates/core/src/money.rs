//! Integer-cent money arithmetic.
//!
//! Amounts are stored and computed as integer cents alongside an ISO 4217
//! currency code; conversion to a display string happens only at the edges
//! (notifications, invoice line items). Never floats.

use crate::error::CoreError;
use crate::time::{validate_duration, SLOT_MINUTES};

/// Lesson price for a duration, tiered by 30-minute blocks.
pub fn lesson_price_cents(
    price_per_slot_cents: i64,
    duration_minutes: i32,
) -> Result<i64, CoreError> {
    validate_duration(duration_minutes)?;
    if price_per_slot_cents < 0 {
        return Err(CoreError::Validation(format!(
            "negative slot price: {price_per_slot_cents}"
        )));
    }
    let blocks = i64::from(duration_minutes / SLOT_MINUTES);
    Ok(price_per_slot_cents * blocks)
}

/// Penalty owed after the cutoff, as a percentage of the full price.
///
/// Rounds half-up to the cent so a 50% penalty on an odd amount never loses
/// a cent to truncation.
pub fn penalty_cents(price_cents: i64, penalty_percent: i32) -> i64 {
    (price_cents * i64::from(penalty_percent) + 50) / 100
}

/// Human-readable amount, e.g. `EUR 12.50`.
pub fn format_amount(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{currency} {sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_is_tiered_by_half_hour_blocks() {
        assert_eq!(lesson_price_cents(2500, 30).unwrap(), 2500);
        assert_eq!(lesson_price_cents(2500, 60).unwrap(), 5000);
        assert_eq!(lesson_price_cents(2500, 90).unwrap(), 7500);
    }

    #[test]
    fn price_rejects_off_grid_durations() {
        assert!(lesson_price_cents(2500, 45).is_err());
        assert!(lesson_price_cents(2500, 0).is_err());
        assert!(lesson_price_cents(-1, 30).is_err());
    }

    #[test]
    fn penalty_is_percentage_with_half_up_rounding() {
        // EUR 25.00 at 50% -> EUR 12.50.
        assert_eq!(penalty_cents(2500, 50), 1250);
        // EUR 25.05 at 50% -> 12.525 -> 12.53.
        assert_eq!(penalty_cents(2505, 50), 1253);
        // EUR 25.01 at 50% -> 12.505 -> 12.51.
        assert_eq!(penalty_cents(2501, 50), 1251);
        assert_eq!(penalty_cents(2500, 0), 0);
        assert_eq!(penalty_cents(2500, 100), 2500);
    }

    #[test]
    fn amount_formatting() {
        assert_eq!(format_amount(1250, "EUR"), "EUR 12.50");
        assert_eq!(format_amount(5, "EUR"), "EUR 0.05");
        assert_eq!(format_amount(-730, "EUR"), "EUR -7.30");
    }
}
