use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::config::PricingConfig;
use crate::errors::ServiceError;

/// Money precision used for every amount the calculator returns
const MONEY_SCALE: u32 = 2;

/// The four derived order amounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub items_price: Decimal,
    pub tax_price: Decimal,
    pub shipping_price: Decimal,
    pub total_price: Decimal,
}

/// Rounds half away from zero at two decimal places.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Computes order totals from `(unit price, quantity)` pairs.
///
/// Shipping is free only when the rounded subtotal is strictly above the threshold.
/// Each output is rounded, and the total is the sum of the three rounded parts so the
/// parts always add up. Amounts too large for `Decimal` are reported as a validation
/// error instead of overflowing.
pub fn calculate_totals<I>(lines: I, pricing: &PricingConfig) -> Result<OrderTotals, ServiceError>
where
    I: IntoIterator<Item = (Decimal, i32)>,
{
    let mut subtotal = Decimal::ZERO;
    for (price, quantity) in lines {
        subtotal = price
            .checked_mul(Decimal::from(quantity))
            .and_then(|line_total| subtotal.checked_add(line_total))
            .ok_or_else(out_of_range)?;
    }
    let items_price = round_money(subtotal);

    let tax_price = round_money(
        items_price
            .checked_mul(pricing.tax_rate)
            .ok_or_else(out_of_range)?,
    );

    let shipping_price = if items_price > pricing.free_shipping_threshold {
        Decimal::ZERO
    } else {
        round_money(pricing.flat_shipping_fee)
    };

    let total_price = items_price
        .checked_add(tax_price)
        .and_then(|sum| sum.checked_add(shipping_price))
        .ok_or_else(out_of_range)?;

    Ok(OrderTotals {
        items_price,
        tax_price,
        shipping_price,
        total_price: round_money(total_price),
    })
}

fn out_of_range() -> ServiceError {
    ServiceError::ValidationError("Order total is out of range".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn defaults() -> PricingConfig {
        PricingConfig::default()
    }

    #[test]
    fn single_line_at_threshold() {
        let totals = calculate_totals([(dec!(50.00), 2)], &defaults()).unwrap();

        assert_eq!(totals.items_price, dec!(100.00));
        assert_eq!(totals.tax_price, dec!(10.00));
        assert_eq!(totals.shipping_price, dec!(10.00));
        assert_eq!(totals.total_price, dec!(120.00));
    }

    #[rstest]
    #[case(dec!(100.00), dec!(10.00))]
    #[case(dec!(100.01), dec!(0))]
    #[case(dec!(0.50), dec!(10.00))]
    #[case(dec!(250.00), dec!(0))]
    fn shipping_depends_on_subtotal(#[case] subtotal: Decimal, #[case] expected: Decimal) {
        let totals = calculate_totals([(subtotal, 1)], &defaults()).unwrap();
        assert_eq!(totals.shipping_price, expected);
    }

    #[rstest]
    #[case(dec!(0.005), dec!(0.01))]
    #[case(dec!(0.004), dec!(0.00))]
    #[case(dec!(2.675), dec!(2.68))]
    #[case(dec!(-2.675), dec!(-2.68))]
    fn rounding_is_half_away_from_zero(#[case] input: Decimal, #[case] expected: Decimal) {
        assert_eq!(round_money(input), expected);
    }

    #[test]
    fn tax_is_rounded_half_up() {
        // 10% of 0.05 is 0.005, which rounds up to a cent.
        let totals = calculate_totals([(dec!(0.05), 1)], &defaults()).unwrap();
        assert_eq!(totals.tax_price, dec!(0.01));
        assert_eq!(totals.total_price, dec!(10.06));
    }

    #[test]
    fn empty_lines_only_pay_shipping() {
        let totals = calculate_totals(std::iter::empty(), &defaults()).unwrap();
        assert_eq!(totals.items_price, Decimal::ZERO);
        assert_eq!(totals.total_price, dec!(10.00));
    }

    #[test]
    fn custom_pricing_is_respected() {
        let pricing = PricingConfig {
            tax_rate: dec!(0.20),
            free_shipping_threshold: dec!(50),
            flat_shipping_fee: dec!(4.99),
        };
        let totals = calculate_totals([(dec!(10.00), 3)], &pricing).unwrap();

        assert_eq!(totals.items_price, dec!(30.00));
        assert_eq!(totals.tax_price, dec!(6.00));
        assert_eq!(totals.shipping_price, dec!(4.99));
        assert_eq!(totals.total_price, dec!(40.99));
    }

    #[test]
    fn overflowing_amounts_are_an_error() {
        let result = calculate_totals([(Decimal::MAX / dec!(2), 3)], &defaults());
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));

        let result = calculate_totals(
            [(Decimal::MAX / dec!(2), 1), (Decimal::MAX / dec!(2), 1), (dec!(1), 1)],
            &defaults(),
        );
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));
    }

    fn line_strategy() -> impl Strategy<Value = (Decimal, i32)> {
        (0i64..100_000, 1i32..20).prop_map(|(cents, qty)| (Decimal::new(cents, 2), qty))
    }

    proptest! {
        #[test]
        fn totals_always_add_up(lines in prop::collection::vec(line_strategy(), 1..8)) {
            let totals = calculate_totals(lines.clone(), &defaults()).unwrap();

            let expected_items: Decimal = lines
                .iter()
                .map(|(price, qty)| *price * Decimal::from(*qty))
                .sum();

            prop_assert_eq!(totals.items_price, expected_items);
            prop_assert_eq!(
                totals.total_price,
                totals.items_price + totals.tax_price + totals.shipping_price
            );
            prop_assert!(totals.tax_price >= Decimal::ZERO);
            prop_assert!(totals.shipping_price >= Decimal::ZERO);
            prop_assert!(totals.total_price.scale() <= MONEY_SCALE);
        }
    }
}
