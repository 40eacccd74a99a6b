//! Stock ledger tests
//!
//! Covers the stock arithmetic every ledger append goes through:
//! - stock never goes negative
//! - the cached level always equals the ledger projection
//! - an entry can be reversed at most once
//! - a batch of movements is applied all or nothing

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    lock_order, project_stock, NewLedgerEntry, SourceKind, StockBook, StockError,
    StockLedgerEntry, StockMovement,
};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Turn an accepted entry into the row the database would hold
fn persist(new: &NewLedgerEntry) -> StockLedgerEntry {
    StockLedgerEntry {
        id: Uuid::new_v4(),
        product_id: new.product_id,
        delta: new.delta,
        source_kind: new.source_kind,
        source_ref: new.source_ref,
        actor_id: new.actor_id,
        reverses_entry_id: new.reverses_entry_id,
        reversed: false,
        created_at: Utc::now(),
    }
}

fn manual(product_id: Uuid, delta: Decimal) -> NewLedgerEntry {
    NewLedgerEntry::new(
        product_id,
        delta,
        SourceKind::ManualInput,
        Uuid::new_v4(),
        Uuid::new_v4(),
    )
    .unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_zero_delta_rejected() {
        let result = NewLedgerEntry::new(
            Uuid::new_v4(),
            Decimal::ZERO,
            SourceKind::ManualInput,
            Uuid::new_v4(),
            Uuid::new_v4(),
        );
        assert_eq!(result, Err(StockError::ZeroDelta));
    }

    #[test]
    fn test_debit_beyond_stock_rejected() {
        let product = Uuid::new_v4();
        let mut book = StockBook::new();
        book.insert(product, dec("3"));

        let err = book
            .apply(StockMovement {
                product_id: product,
                delta: dec("-5"),
            })
            .unwrap_err();

        assert_eq!(
            err,
            StockError::Insufficient {
                product_id: product,
                available: dec("3"),
                delta: dec("-5"),
            }
        );
        assert_eq!(book.level(product), Some(dec("3")));
    }

    #[test]
    fn test_debit_to_exactly_zero_allowed() {
        let product = Uuid::new_v4();
        let mut book = StockBook::new();
        book.insert(product, dec("2.5"));

        let level = book
            .apply(StockMovement {
                product_id: product,
                delta: dec("-2.5"),
            })
            .unwrap();

        assert_eq!(level, Decimal::ZERO);
    }

    #[test]
    fn test_unlocked_product_rejected() {
        let mut book = StockBook::new();
        let stranger = Uuid::new_v4();
        let err = book
            .apply(StockMovement {
                product_id: stranger,
                delta: dec("1"),
            })
            .unwrap_err();
        assert_eq!(err, StockError::UnknownProduct(stranger));
    }

    #[test]
    fn test_batch_rejected_as_a_whole() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut book = StockBook::new();
        book.insert(a, dec("10"));
        book.insert(b, dec("1"));
        let before = book.clone();

        let result = book.apply_all(&[
            StockMovement {
                product_id: a,
                delta: dec("-4"),
            },
            StockMovement {
                product_id: b,
                delta: dec("-2"),
            },
        ]);

        assert!(result.is_err());
        assert_eq!(book, before);
    }

    #[test]
    fn test_reversal_negates_and_keeps_source() {
        let product = Uuid::new_v4();
        let original = persist(&manual(product, dec("7")));
        let actor = Uuid::new_v4();

        let reversal = original.reversal(actor).unwrap();

        assert_eq!(reversal.delta, dec("-7"));
        assert_eq!(reversal.product_id, product);
        assert_eq!(reversal.source_ref, original.source_ref);
        assert_eq!(reversal.source_kind, SourceKind::ManualInput);
        assert_eq!(reversal.reverses_entry_id, Some(original.id));
        assert_eq!(reversal.actor_id, actor);
    }

    #[test]
    fn test_reservation_reversed_as_release() {
        let reservation = persist(
            &NewLedgerEntry::new(
                Uuid::new_v4(),
                dec("-2"),
                SourceKind::OrderReservation,
                Uuid::new_v4(),
                Uuid::new_v4(),
            )
            .unwrap(),
        );

        let release = reservation.reversal(Uuid::new_v4()).unwrap();

        assert_eq!(release.source_kind, SourceKind::OrderRelease);
        assert_eq!(release.delta, dec("2"));
    }

    #[test]
    fn test_reversal_of_reversal_rejected() {
        let original = persist(&manual(Uuid::new_v4(), dec("4")));
        let reversal = persist(&original.reversal(Uuid::new_v4()).unwrap());

        assert_eq!(
            reversal.reversal(Uuid::new_v4()),
            Err(StockError::ReversalOfReversal(reversal.id))
        );
    }

    #[test]
    fn test_lock_order_sorted_and_distinct() {
        let mut ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        ids.push(ids[2]);
        ids.push(ids[0]);

        let ordered = lock_order(ids.clone());

        assert_eq!(ordered.len(), 5);
        assert!(ordered.windows(2).all(|w| w[0] < w[1]));
        for id in &ids {
            assert!(ordered.contains(id));
        }
    }

    #[test]
    fn test_projection_ignores_reversal_pairs() {
        let product = Uuid::new_v4();
        let mut first = persist(&manual(product, dec("10")));
        let second = persist(&manual(product, dec("-3")));
        let reversal = persist(&first.reversal(Uuid::new_v4()).unwrap());
        first.reversed = true;

        assert_eq!(project_stock(&[first, second, reversal]), dec("-3"));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Signed whole-number deltas, never zero
    fn delta_strategy() -> impl Strategy<Value = Decimal> {
        prop_oneof![(1i64..50), (-50i64..=-1)].prop_map(Decimal::from)
    }

    /// Fractional quantities with three decimal places
    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..100_000).prop_map(|milli| Decimal::new(milli, 3))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Stock never drops below zero, whatever is attempted
        #[test]
        fn prop_stock_never_negative(
            deltas in prop::collection::vec(delta_strategy(), 1..40)
        ) {
            let product = Uuid::new_v4();
            let mut book = StockBook::new();
            book.insert(product, Decimal::ZERO);

            for delta in deltas {
                let before = book.level(product).unwrap();
                match book.apply(StockMovement { product_id: product, delta }) {
                    Ok(after) => prop_assert_eq!(after, before + delta),
                    Err(_) => {
                        prop_assert!(before + delta < Decimal::ZERO);
                        prop_assert_eq!(book.level(product), Some(before));
                    }
                }
                prop_assert!(book.level(product).unwrap() >= Decimal::ZERO);
            }
        }

        /// The cached level equals the sum of the accepted ledger entries
        #[test]
        fn prop_cache_matches_projection(
            deltas in prop::collection::vec(delta_strategy(), 1..40),
            reverse_picks in prop::collection::vec(any::<prop::sample::Index>(), 0..10)
        ) {
            let product = Uuid::new_v4();
            let mut book = StockBook::new();
            book.insert(product, Decimal::ZERO);
            let mut ledger: Vec<StockLedgerEntry> = Vec::new();

            for delta in deltas {
                let entry = manual(product, delta);
                if book.apply(entry.movement()).is_ok() {
                    ledger.push(persist(&entry));
                }
            }

            for pick in reverse_picks {
                if ledger.is_empty() {
                    break;
                }
                let idx = pick.index(ledger.len());
                let reversal = match ledger[idx].reversal(Uuid::new_v4()) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                if book.apply(reversal.movement()).is_ok() {
                    ledger[idx].reversed = true;
                    ledger.push(persist(&reversal));
                }
            }

            let plain_sum: Decimal = ledger.iter().map(|e| e.delta).sum();
            prop_assert_eq!(book.level(product), Some(project_stock(&ledger)));
            prop_assert_eq!(project_stock(&ledger), plain_sum);
        }

        /// A reversed entry can never be reversed again
        #[test]
        fn prop_reversal_not_repeatable(amount in quantity_strategy()) {
            let product = Uuid::new_v4();
            let mut book = StockBook::new();
            book.insert(product, Decimal::ZERO);

            let entry = manual(product, amount);
            book.apply(entry.movement()).unwrap();
            let mut stored = persist(&entry);

            let reversal = stored.reversal(Uuid::new_v4()).unwrap();
            book.apply(reversal.movement()).unwrap();
            stored.reversed = true;

            prop_assert_eq!(book.level(product), Some(Decimal::ZERO));
            prop_assert_eq!(
                stored.reversal(Uuid::new_v4()),
                Err(StockError::AlreadyReversed(stored.id))
            );
        }

        /// A batch either lands completely or leaves the book untouched
        #[test]
        fn prop_apply_all_atomic(
            starting in prop::collection::vec(0i64..30, 1..5),
            moves in prop::collection::vec((any::<prop::sample::Index>(), delta_strategy()), 1..12)
        ) {
            let products: Vec<Uuid> = starting.iter().map(|_| Uuid::new_v4()).collect();
            let mut book = StockBook::new();
            for (id, level) in products.iter().zip(&starting) {
                book.insert(*id, Decimal::from(*level));
            }
            let before = book.clone();

            let movements: Vec<StockMovement> = moves
                .iter()
                .map(|(pick, delta)| StockMovement {
                    product_id: products[pick.index(products.len())],
                    delta: *delta,
                })
                .collect();

            match book.apply_all(&movements) {
                Ok(after) => {
                    prop_assert_eq!(after.len(), movements.len());
                    for id in &products {
                        let net: Decimal = movements
                            .iter()
                            .filter(|m| m.product_id == *id)
                            .map(|m| m.delta)
                            .sum();
                        prop_assert_eq!(
                            book.level(*id),
                            Some(before.level(*id).unwrap() + net)
                        );
                    }
                }
                Err(_) => prop_assert_eq!(&book, &before),
            }
        }

        /// Lock order is independent of the order products are named in
        #[test]
        fn prop_lock_order_canonical(count in 1usize..8) {
            let ids: Vec<Uuid> = (0..count).map(|_| Uuid::new_v4()).collect();
            let mut reversed = ids.clone();
            reversed.reverse();
            prop_assert_eq!(lock_order(ids), lock_order(reversed));
        }
    }
}
