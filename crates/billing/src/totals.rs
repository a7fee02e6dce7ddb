//! Line and document total computation.
//!
//! Pure functions, no side effects. Per-line totals are computed at full
//! `Decimal` precision; only the persisted values are rounded to two decimal
//! places. Document totals sum the *unrounded* per-line values before
//! rounding, so many small lines cannot drift the grand total by accumulated
//! rounding.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use facturier_core::{DomainError, round_money};

/// Raw line as provided by the caller (rates pre-tax, tax rate in percent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub description: String,
    pub quantity: Decimal,
    /// Free-form unit label ("hour", "day", "unit", ...).
    pub unit: Option<String>,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
}

/// A document line enriched with its derived, persisted totals.
///
/// Immutable once the parent document leaves the draft state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub line_no: u32,
    pub description: String,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub line_total_ht: Decimal,
    pub line_total_tax: Decimal,
    pub line_total_ttc: Decimal,
}

impl DocumentLine {
    /// Reconstruct the raw input this line was computed from.
    ///
    /// Used by quote→invoice conversion: recomputing from the same inputs
    /// reproduces identical totals, so lines carry over verbatim.
    pub fn to_input(&self) -> LineInput {
        LineInput {
            description: self.description.clone(),
            quantity: self.quantity,
            unit: self.unit.clone(),
            unit_price: self.unit_price,
            tax_rate: self.tax_rate,
        }
    }
}

/// Document-level totals (rounded, persisted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub total_ht: Decimal,
    pub total_tax: Decimal,
    pub total_ttc: Decimal,
}

impl DocumentTotals {
    pub fn zero() -> Self {
        Self {
            total_ht: Decimal::ZERO,
            total_tax: Decimal::ZERO,
            total_ttc: Decimal::ZERO,
        }
    }
}

/// Compute enriched lines + document totals from raw inputs.
///
/// Zero-quantity or zero-price lines are permitted and contribute zero, but
/// at least one line must carry a positive amount. Negative quantities,
/// prices or tax rates are rejected.
pub fn compute_document(
    lines: &[LineInput],
) -> Result<(Vec<DocumentLine>, DocumentTotals), DomainError> {
    if lines.is_empty() {
        return Err(DomainError::validation(
            "document must have at least one line",
        ));
    }

    let hundred = Decimal::ONE_HUNDRED;
    let mut enriched = Vec::with_capacity(lines.len());
    let mut sum_ht = Decimal::ZERO;
    let mut sum_tax = Decimal::ZERO;
    let mut any_positive = false;

    for (idx, line) in lines.iter().enumerate() {
        if line.quantity.is_sign_negative() {
            return Err(DomainError::validation(format!(
                "line {}: quantity must not be negative",
                idx + 1
            )));
        }
        if line.unit_price.is_sign_negative() {
            return Err(DomainError::validation(format!(
                "line {}: unit_price must not be negative",
                idx + 1
            )));
        }
        if line.tax_rate.is_sign_negative() {
            return Err(DomainError::validation(format!(
                "line {}: tax_rate must not be negative",
                idx + 1
            )));
        }

        // Full-precision intermediates; round only the persisted values.
        let ht = line.quantity * line.unit_price;
        let tax = ht * line.tax_rate / hundred;
        let ttc = ht + tax;

        if ht > Decimal::ZERO {
            any_positive = true;
        }

        sum_ht += ht;
        sum_tax += tax;

        enriched.push(DocumentLine {
            line_no: (idx as u32) + 1,
            description: line.description.clone(),
            quantity: line.quantity,
            unit: line.unit.clone(),
            unit_price: line.unit_price,
            tax_rate: line.tax_rate,
            line_total_ht: round_money(ht),
            line_total_tax: round_money(tax),
            line_total_ttc: round_money(ttc),
        });
    }

    if !any_positive {
        return Err(DomainError::validation(
            "document must have at least one line with a positive amount",
        ));
    }

    let totals = DocumentTotals {
        total_ht: round_money(sum_ht),
        total_tax: round_money(sum_tax),
        total_ttc: round_money(sum_ht + sum_tax),
    };

    Ok((enriched, totals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(quantity: Decimal, unit_price: Decimal, tax_rate: Decimal) -> LineInput {
        LineInput {
            description: "prestation".to_string(),
            quantity,
            unit: None,
            unit_price,
            tax_rate,
        }
    }

    #[test]
    fn reference_scenario_two_times_hundred_at_twenty_percent() {
        let (lines, totals) = compute_document(&[line(dec!(2), dec!(100.00), dec!(20))]).unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].line_total_ht, dec!(200.00));
        assert_eq!(lines[0].line_total_tax, dec!(40.00));
        assert_eq!(lines[0].line_total_ttc, dec!(240.00));
        assert_eq!(totals.total_ht, dec!(200.00));
        assert_eq!(totals.total_tax, dec!(40.00));
        assert_eq!(totals.total_ttc, dec!(240.00));
    }

    #[test]
    fn totals_sum_unrounded_values() {
        // Three lines of 0.333... HT each: rounding per line first would give
        // 0.99, summing raw values gives 1.00.
        let lines: Vec<LineInput> = (0..3)
            .map(|_| line(dec!(0.3333333333), dec!(1), dec!(0)))
            .collect();
        let (enriched, totals) = compute_document(&lines).unwrap();

        assert_eq!(enriched[0].line_total_ht, dec!(0.33));
        assert_eq!(totals.total_ht, dec!(1.00));
    }

    #[test]
    fn zero_lines_are_permitted_but_not_alone() {
        let (_, totals) =
            compute_document(&[line(dec!(0), dec!(50), dec!(20)), line(dec!(1), dec!(10), dec!(0))])
                .unwrap();
        assert_eq!(totals.total_ht, dec!(10));

        let err = compute_document(&[line(dec!(0), dec!(50), dec!(20))]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn empty_document_is_rejected() {
        let err = compute_document(&[]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn negative_values_are_rejected() {
        for bad in [
            line(dec!(-1), dec!(10), dec!(20)),
            line(dec!(1), dec!(-10), dec!(20)),
            line(dec!(1), dec!(10), dec!(-20)),
        ] {
            let err = compute_document(&[bad]).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn line_to_input_round_trips_computation() {
        let (lines, totals) = compute_document(&[line(dec!(3.5), dec!(80), dec!(10))]).unwrap();
        let inputs: Vec<LineInput> = lines.iter().map(|l| l.to_input()).collect();
        let (lines2, totals2) = compute_document(&inputs).unwrap();

        assert_eq!(lines, lines2);
        assert_eq!(totals, totals2);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn money_strategy() -> impl Strategy<Value = Decimal> {
            // Cents in [0, 10_000_00] mapped to Decimal with two places.
            (0i64..1_000_000).prop_map(|cents| Decimal::new(cents, 2))
        }

        fn quantity_strategy() -> impl Strategy<Value = Decimal> {
            (1i64..10_000).prop_map(|hundredths| Decimal::new(hundredths, 2))
        }

        fn tax_strategy() -> impl Strategy<Value = Decimal> {
            prop_oneof![
                Just(Decimal::ZERO),
                Just(Decimal::new(55, 1)),
                Just(Decimal::new(10, 0)),
                Just(Decimal::new(20, 0)),
            ]
        }

        proptest! {
            #[test]
            fn ht_plus_tax_equals_ttc_within_a_cent(
                qp in proptest::collection::vec(
                    (quantity_strategy(), money_strategy(), tax_strategy()),
                    1..12,
                )
            ) {
                let inputs: Vec<LineInput> = qp
                    .into_iter()
                    .map(|(q, p, t)| LineInput {
                        description: "x".to_string(),
                        quantity: q,
                        unit: None,
                        unit_price: p,
                        tax_rate: t,
                    })
                    .collect();

                prop_assume!(inputs.iter().any(|l| l.quantity * l.unit_price > Decimal::ZERO));

                let (lines, totals) = compute_document(&inputs).unwrap();

                // Rounding tolerance: one cent between the two rounded sums.
                let diff = (totals.total_ht + totals.total_tax - totals.total_ttc).abs();
                prop_assert!(diff <= Decimal::new(1, 2));

                // Per-line invariants hold exactly on the rounded values.
                for l in &lines {
                    prop_assert_eq!(
                        l.line_total_ttc,
                        facturier_core::round_money(
                            l.quantity * l.unit_price
                                + l.quantity * l.unit_price * l.tax_rate / Decimal::ONE_HUNDRED
                        )
                    );
                }
            }
        }
    }
}
