//! Property-based checks for the pure pieces of the sale and stock workflows.

use chrono::NaiveDate;
use proptest::prelude::*;
use toko_pos_api::{entities::MovementType, services::sales::format_invoice_no};

fn day_strategy() -> impl Strategy<Value = NaiveDate> {
    (2000i32..2100, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).expect("valid calendar day"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn invoice_numbers_sort_in_sequence_order(day in day_strategy(), a in 1u32..9999, b in 1u32..9999) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(format_invoice_no(day, lo) <= format_invoice_no(day, hi));
    }

    #[test]
    fn invoice_number_has_fixed_shape(day in day_strategy(), seq in 1u32..=9999) {
        let invoice = format_invoice_no(day, seq);
        prop_assert_eq!(invoice.len(), "INV-YYYYMMDD-NNNN".len());
        prop_assert!(invoice.starts_with("INV-"));
        let parsed: u32 = invoice.rsplit('-').next().unwrap().parse().unwrap();
        prop_assert_eq!(parsed, seq);
    }

    #[test]
    fn stock_never_goes_negative(current in 0i32..100_000, qty in 1i32..100_000) {
        for kind in [MovementType::In, MovementType::Out, MovementType::Adjust] {
            if let Some(next) = kind.apply(current, qty) {
                prop_assert!(next >= 0);
            }
        }
    }

    #[test]
    fn out_is_refused_exactly_when_short(current in 0i32..100_000, qty in 1i32..100_000) {
        let result = MovementType::Out.apply(current, qty);
        prop_assert_eq!(result.is_none(), qty > current);
        if let Some(next) = result {
            prop_assert_eq!(next + qty, current);
        }
    }
}
