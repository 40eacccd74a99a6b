//! Order lifecycle tests
//!
//! Tests for:
//! - the status machine over every state and action
//! - stored status agreeing with audit timestamps
//! - reserving stock at order time and releasing it on cancel
//! - line totals

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    validate_order_quantity, verify_status, IntegrityError, NewLedgerEntry, OrderAction,
    OrderStatus, OrderTimestamps, SourceKind, StockBook, StockError, StockLedgerEntry,
    StockMovement, Totals, TransitionError, Unit,
};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

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

/// Reserve every line against the book the way order creation does
fn reserve(
    book: &mut StockBook,
    lines: &[(Uuid, Decimal)],
    actor: Uuid,
) -> Result<Vec<StockLedgerEntry>, StockError> {
    let entries: Vec<NewLedgerEntry> = lines
        .iter()
        .map(|(product_id, quantity)| {
            NewLedgerEntry::new(
                *product_id,
                -*quantity,
                SourceKind::OrderReservation,
                Uuid::new_v4(),
                actor,
            )
        })
        .collect::<Result<_, _>>()?;
    let movements: Vec<StockMovement> = entries.iter().map(|e| e.movement()).collect();
    book.apply_all(&movements)?;
    Ok(entries.iter().map(persist).collect())
}

/// Release every reservation the way cancellation does
fn release(
    book: &mut StockBook,
    reservations: &mut [StockLedgerEntry],
    actor: Uuid,
) -> Result<Vec<StockLedgerEntry>, StockError> {
    let releases: Vec<NewLedgerEntry> = reservations
        .iter()
        .map(|r| r.reversal(actor))
        .collect::<Result<_, _>>()?;
    let movements: Vec<StockMovement> = releases.iter().map(|e| e.movement()).collect();
    book.apply_all(&movements)?;
    for r in reservations.iter_mut() {
        r.reversed = true;
    }
    Ok(releases.iter().map(persist).collect())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_full_transition_table() {
        use OrderAction::*;
        use OrderStatus::*;

        let table = [
            (Upcoming, Start, Some(InProgress)),
            (Upcoming, Finish, None),
            (Upcoming, Cancel, Some(Cancelled)),
            (InProgress, Start, None),
            (InProgress, Finish, Some(Completed)),
            (InProgress, Cancel, Some(Cancelled)),
            (Completed, Start, None),
            (Completed, Finish, None),
            (Completed, Cancel, None),
            (Cancelled, Start, None),
            (Cancelled, Finish, None),
            (Cancelled, Cancel, None),
        ];

        for (from, action, expected) in table {
            match expected {
                Some(to) => assert_eq!(from.apply(action), Ok(to), "{} {}", from, action),
                None => assert_eq!(
                    from.apply(action),
                    Err(TransitionError { from, action }),
                    "{} {}",
                    from,
                    action
                ),
            }
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Upcoming.is_terminal());
        assert!(!OrderStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_status_strings_round_trip() {
        for status in OrderStatus::ALL {
            assert_eq!(OrderStatus::from_str(status.as_str()), Ok(status));
        }
        assert!(OrderStatus::from_str("shipped").is_err());
    }

    #[test]
    fn test_timestamps_follow_actions() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 2, 0, 0).unwrap();
        let mut stamps = OrderTimestamps::default();
        assert_eq!(verify_status(OrderStatus::Upcoming, &stamps), Ok(OrderStatus::Upcoming));

        stamps.record(OrderAction::Start, at);
        assert_eq!(
            verify_status(OrderStatus::InProgress, &stamps),
            Ok(OrderStatus::InProgress)
        );

        stamps.record(OrderAction::Finish, at);
        assert_eq!(
            verify_status(OrderStatus::Completed, &stamps),
            Ok(OrderStatus::Completed)
        );
    }

    #[test]
    fn test_stored_status_disagreeing_with_timestamps() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 2, 0, 0).unwrap();
        let stamps = OrderTimestamps {
            started_at: Some(at),
            finished_at: None,
            cancelled_at: None,
        };

        assert_eq!(
            verify_status(OrderStatus::Upcoming, &stamps),
            Err(IntegrityError::StatusMismatch {
                stored: OrderStatus::Upcoming,
                derived: OrderStatus::InProgress,
            })
        );
    }

    #[test]
    fn test_conflicting_terminal_timestamps() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 2, 0, 0).unwrap();
        let stamps = OrderTimestamps {
            started_at: Some(at),
            finished_at: Some(at),
            cancelled_at: Some(at),
        };
        assert_eq!(
            stamps.derive_status(),
            Err(IntegrityError::ConflictingTerminalTimestamps)
        );

        let unstarted = OrderTimestamps {
            started_at: None,
            finished_at: Some(at),
            cancelled_at: None,
        };
        assert_eq!(
            unstarted.derive_status(),
            Err(IntegrityError::FinishedWithoutStart)
        );
    }

    /// Stock 10, order 4, cancel: stock returns to 10 with a balanced ledger
    #[test]
    fn test_reserve_then_cancel_restores_stock() {
        let product = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let mut book = StockBook::new();
        book.insert(product, dec("10"));

        let mut reservations = reserve(&mut book, &[(product, dec("4"))], actor).unwrap();
        assert_eq!(book.level(product), Some(dec("6")));

        let status = OrderStatus::Upcoming.apply(OrderAction::Cancel).unwrap();
        assert_eq!(status, OrderStatus::Cancelled);
        let releases = release(&mut book, &mut reservations, actor).unwrap();

        assert_eq!(book.level(product), Some(dec("10")));
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].source_kind, SourceKind::OrderRelease);
        assert_eq!(releases[0].reverses_entry_id, Some(reservations[0].id));
        assert!(reservations[0].reversed);
    }

    /// Count down 3, order 5, cancel, then try to start the cancelled order
    #[test]
    fn test_manual_correction_then_order_and_cancel() {
        let product = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let mut book = StockBook::new();
        book.insert(product, dec("10"));

        let correction = NewLedgerEntry::new(
            product,
            dec("-3"),
            SourceKind::ManualInput,
            Uuid::new_v4(),
            actor,
        )
        .unwrap();
        book.apply(correction.movement()).unwrap();
        assert_eq!(book.level(product), Some(dec("7")));

        let mut reservations = reserve(&mut book, &[(product, dec("5"))], actor).unwrap();
        let status = OrderStatus::Upcoming;
        assert_eq!(book.level(product), Some(dec("2")));

        let status = status.apply(OrderAction::Cancel).unwrap();
        release(&mut book, &mut reservations, actor).unwrap();
        assert_eq!(status, OrderStatus::Cancelled);
        assert_eq!(book.level(product), Some(dec("7")));

        assert_eq!(
            status.apply(OrderAction::Start),
            Err(TransitionError {
                from: OrderStatus::Cancelled,
                action: OrderAction::Start,
            })
        );
    }

    #[test]
    fn test_second_cancel_cannot_release_twice() {
        let product = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let mut book = StockBook::new();
        book.insert(product, dec("5"));

        let mut reservations = reserve(&mut book, &[(product, dec("2"))], actor).unwrap();
        release(&mut book, &mut reservations, actor).unwrap();

        assert!(OrderStatus::Cancelled.apply(OrderAction::Cancel).is_err());
        assert_eq!(
            release(&mut book, &mut reservations, actor),
            Err(StockError::AlreadyReversed(reservations[0].id))
        );
        assert_eq!(book.level(product), Some(dec("5")));
    }

    #[test]
    fn test_short_line_rejects_whole_order() {
        let flour = Uuid::new_v4();
        let sugar = Uuid::new_v4();
        let mut book = StockBook::new();
        book.insert(flour, dec("20"));
        book.insert(sugar, dec("1.5"));

        let err = reserve(
            &mut book,
            &[(flour, dec("5")), (sugar, dec("2"))],
            Uuid::new_v4(),
        )
        .unwrap_err();

        assert!(matches!(err, StockError::Insufficient { product_id, .. } if product_id == sugar));
        assert_eq!(book.level(flour), Some(dec("20")));
        assert_eq!(book.level(sugar), Some(dec("1.5")));
    }

    #[test]
    fn test_finishing_keeps_reservation() {
        let product = Uuid::new_v4();
        let mut book = StockBook::new();
        book.insert(product, dec("8"));

        let reservations = reserve(&mut book, &[(product, dec("3"))], Uuid::new_v4()).unwrap();
        let status = OrderStatus::Upcoming
            .apply(OrderAction::Start)
            .and_then(|s| s.apply(OrderAction::Finish))
            .unwrap();

        assert_eq!(status, OrderStatus::Completed);
        assert_eq!(book.level(product), Some(dec("5")));
        assert!(!reservations[0].reversed);
    }

    #[test]
    fn test_line_totals() {
        let line = Totals::for_line(dec("12000"), dec("15000"), dec("3"));
        assert_eq!(line.buy, dec("36000"));
        assert_eq!(line.sell, dec("45000"));
        assert_eq!(line.margin(), dec("9000"));

        let weighed = Totals::for_line(dec("10000"), dec("12500"), dec("0.125"));
        assert_eq!(weighed.buy, dec("1250"));
        assert_eq!(weighed.sell, dec("1562.50"));

        let order = Totals::sum(&[line, weighed]);
        assert_eq!(order.buy, dec("37250"));
        assert_eq!(order.sell, dec("46562.50"));
    }

    #[test]
    fn test_order_quantity_respects_unit() {
        assert!(validate_order_quantity(dec("2"), Unit::Piece).is_ok());
        assert!(validate_order_quantity(dec("2.5"), Unit::Piece).is_err());
        assert!(validate_order_quantity(dec("2.5"), Unit::Weight).is_ok());
        assert!(validate_order_quantity(dec("0"), Unit::Box).is_err());
        assert!(validate_order_quantity(dec("-1"), Unit::Volume).is_err());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn action_strategy() -> impl Strategy<Value = OrderAction> {
        prop_oneof![
            Just(OrderAction::Start),
            Just(OrderAction::Finish),
            Just(OrderAction::Cancel),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any sequence of actions keeps the stored status consistent with
        /// the timestamps, and nothing leaves a terminal state
        #[test]
        fn prop_lifecycle_consistent(
            actions in prop::collection::vec(action_strategy(), 0..12)
        ) {
            let at = Utc.with_ymd_and_hms(2024, 3, 5, 2, 0, 0).unwrap();
            let mut status = OrderStatus::Upcoming;
            let mut stamps = OrderTimestamps::default();

            for action in actions {
                match status.apply(action) {
                    Ok(next) => {
                        prop_assert!(!status.is_terminal());
                        stamps.record(action, at);
                        status = next;
                    }
                    Err(err) => {
                        prop_assert_eq!(err.from, status);
                        prop_assert_eq!(err.action, action);
                    }
                }
                prop_assert_eq!(verify_status(status, &stamps), Ok(status));
            }
        }

        /// Reserving then cancelling any accepted order restores every level
        #[test]
        fn prop_cancel_round_trip(
            stock in prop::collection::vec(0i64..50, 1..5),
            lines in prop::collection::vec((any::<prop::sample::Index>(), 1i64..20), 1..6)
        ) {
            let products: Vec<Uuid> = stock.iter().map(|_| Uuid::new_v4()).collect();
            let mut book = StockBook::new();
            for (id, level) in products.iter().zip(&stock) {
                book.insert(*id, Decimal::from(*level));
            }
            let before = book.clone();
            let actor = Uuid::new_v4();

            let order_lines: Vec<(Uuid, Decimal)> = lines
                .iter()
                .map(|(pick, qty)| (products[pick.index(products.len())], Decimal::from(*qty)))
                .collect();

            match reserve(&mut book, &order_lines, actor) {
                Ok(mut reservations) => {
                    for (id, level) in book.levels() {
                        prop_assert!(level >= Decimal::ZERO, "product {} went negative", id);
                    }
                    release(&mut book, &mut reservations, actor).unwrap();
                    prop_assert_eq!(&book, &before);
                }
                Err(_) => prop_assert_eq!(&book, &before),
            }
        }
    }
}
