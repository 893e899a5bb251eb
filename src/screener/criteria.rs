use crate::error::{AppError, Result};
use crate::types::{CriteriaUpdate, Range, ScreeningCriteria};

/// Merge a partial update over `current`, field by field, and validate the result.
pub fn merge(current: &ScreeningCriteria, update: CriteriaUpdate) -> Result<ScreeningCriteria> {
    let merged = ScreeningCriteria {
        price_range: update.price_range.unwrap_or(current.price_range),
        atr_threshold: update.atr_threshold.unwrap_or(current.atr_threshold),
        iv_range: update.iv_range.unwrap_or(current.iv_range),
        iv_percentile_max: update.iv_percentile_max.unwrap_or(current.iv_percentile_max),
        open_interest_min: update.open_interest_min.unwrap_or(current.open_interest_min),
        price_stability_30d: update.price_stability_30d.unwrap_or(current.price_stability_30d),
        exclude_dividends: update.exclude_dividends.unwrap_or(current.exclude_dividends),
        exclude_earnings: update.exclude_earnings.unwrap_or(current.exclude_earnings),
    };
    validate(&merged)?;
    Ok(merged)
}

pub fn validate(c: &ScreeningCriteria) -> Result<()> {
    check_range("price_range", c.price_range)?;
    check_range("iv_range", c.iv_range)?;
    check_value("atr_threshold", c.atr_threshold)?;
    check_value("iv_percentile_max", c.iv_percentile_max)?;
    check_value("price_stability_30d", c.price_stability_30d)?;
    Ok(())
}

fn check_value(name: &str, v: f64) -> Result<()> {
    if !v.is_finite() || v < 0.0 {
        return Err(AppError::BadRequest(format!(
            "{name} must be a non-negative number, got {v}"
        )));
    }
    Ok(())
}

fn check_range(name: &str, r: Range) -> Result<()> {
    check_value(name, r.low)?;
    check_value(name, r.high)?;
    if r.low > r.high {
        return Err(AppError::BadRequest(format!(
            "{name} lower bound {} exceeds upper bound {}",
            r.low, r.high
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_update_keeps_other_fields() {
        let current = ScreeningCriteria::default();
        let update: CriteriaUpdate =
            serde_json::from_str(r#"{"atr_threshold": 0.08, "exclude_earnings": false}"#).unwrap();
        let merged = merge(&current, update).unwrap();
        assert_eq!(merged.atr_threshold, 0.08);
        assert!(!merged.exclude_earnings);
        assert_eq!(merged.price_range, current.price_range);
        assert_eq!(merged.open_interest_min, current.open_interest_min);
    }

    #[test]
    fn inverted_band_is_rejected() {
        let update: CriteriaUpdate = serde_json::from_str(r#"{"price_range": [150, 50]}"#).unwrap();
        assert!(matches!(
            merge(&ScreeningCriteria::default(), update),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let update = CriteriaUpdate { price_stability_30d: Some(-0.1), ..Default::default() };
        assert!(merge(&ScreeningCriteria::default(), update).is_err());
    }

    #[test]
    fn empty_update_is_identity() {
        let current = ScreeningCriteria::default();
        assert_eq!(merge(&current, CriteriaUpdate::default()).unwrap(), current);
    }
}
