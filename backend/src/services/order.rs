//! Order lifecycle service
//!
//! Orders reserve stock when they are created and give it back when they are
//! cancelled. The stored status is written together with the audit timestamp
//! of the move that produced it; on every load the two are checked against
//! each other and disagreement is reported, never repaired.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    lock_order, validate_order_quantity, verify_status, NewLedgerEntry, Order,
    OrderAction, OrderItem, OrderStatus, OrderTimestamps, Product, SourceKind, StockError,
    Totals, Unit,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::catalog::{ProductRow, PRODUCT_COLUMNS};
use super::ledger::{
    append_entries, fetch_entry_for_update, lock_products, set_lock_timeout, LockMode,
};
use crate::error::{AppError, AppResult};

/// Order service for creating orders and moving them through their lifecycle
#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
    lock_timeout: Duration,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    partner_id: Uuid,
    date: NaiveDate,
    note: Option<String>,
    status: String,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    total_buy_price: Decimal,
    total_sell_price: Decimal,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const ORDER_COLUMNS: &str = "id, partner_id, date, note, status, started_at, finished_at, \
     cancelled_at, total_buy_price, total_sell_price, is_deleted, created_at, updated_at";

#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    unique_code: String,
    name: String,
    image: Option<String>,
    unit: String,
    quantity: Decimal,
    total_buy_price: Decimal,
    total_sell_price: Decimal,
    is_deleted: bool,
    created_at: DateTime<Utc>,
}

const ITEM_COLUMNS: &str = "id, order_id, product_id, unique_code, name, image, unit, quantity, \
     total_buy_price, total_sell_price, is_deleted, created_at";

impl TryFrom<ItemRow> for OrderItem {
    type Error = AppError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let unit = row
            .unit
            .parse::<Unit>()
            .map_err(AppError::InvariantViolation)?;
        Ok(OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            unique_code: row.unique_code,
            name: row.name,
            image: row.image,
            unit,
            quantity: row.quantity,
            total_buy_price: row.total_buy_price,
            total_sell_price: row.total_sell_price,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
        })
    }
}

/// One requested order line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItem {
    pub product_id: Uuid,
    pub quantity: Decimal,
}

/// Input for placing an order
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderInput {
    pub partner_id: Uuid,
    #[validate(length(min = 1))]
    pub items: Vec<CreateOrderItem>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
    pub date: NaiveDate,
}

/// Filters for listing orders
#[derive(Debug, Default, Clone)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// A line ready to be written, with its snapshot and reservation
struct PreparedLine {
    item_id: Uuid,
    product: Product,
    quantity: Decimal,
    totals: Totals,
}

impl OrderService {
    /// Create a new OrderService instance
    pub fn new(db: PgPool, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }

    /// Place an order and reserve stock for every line.
    ///
    /// Either every line is reserved and the order exists, or nothing is
    /// written at all.
    #[tracing::instrument(skip(self, input), fields(partner_id = %input.partner_id, lines = input.items.len()))]
    pub async fn create(&self, actor_id: Uuid, input: CreateOrderInput) -> AppResult<Order> {
        if input.items.is_empty() {
            return Err(AppError::validation(
                "items",
                "An order needs at least one item",
                "Pesanan harus memiliki minimal satu barang",
            ));
        }
        input.validate()?;
        for (idx, item) in input.items.iter().enumerate() {
            if item.quantity <= Decimal::ZERO {
                return Err(AppError::Validation {
                    field: format!("items[{}].quantity", idx),
                    message: "Quantity must be greater than zero".to_string(),
                    message_id: "Jumlah harus lebih dari nol".to_string(),
                });
            }
        }

        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout).await?;

        let partner_active = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM partners WHERE id = $1 AND NOT is_deleted)",
        )
        .bind(input.partner_id)
        .fetch_one(&mut *tx)
        .await?;
        if !partner_active {
            return Err(AppError::NotFound("Partner".to_string()));
        }

        let product_ids: Vec<Uuid> = input.items.iter().map(|i| i.product_id).collect();
        let mut book = lock_products(&mut tx, &product_ids, LockMode::ActiveOnly).await?;
        let products = load_products(&mut tx, &product_ids).await?;

        let mut lines = Vec::with_capacity(input.items.len());
        for (idx, item) in input.items.iter().enumerate() {
            let product = products
                .get(&item.product_id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("Product {}", item.product_id)))?;
            validate_order_quantity(item.quantity, product.unit).map_err(|msg| {
                AppError::Validation {
                    field: format!("items[{}].quantity", idx),
                    message: msg.to_string(),
                    message_id: "Jumlah tidak sesuai satuan produk".to_string(),
                }
            })?;
            let totals = Totals::for_line(product.buy_price, product.sell_price, item.quantity);
            lines.push(PreparedLine {
                item_id: Uuid::new_v4(),
                product,
                quantity: item.quantity,
                totals,
            });
        }

        let order_id = Uuid::new_v4();
        let reservations = lines
            .iter()
            .map(|line| {
                NewLedgerEntry::new(
                    line.product.id,
                    -line.quantity,
                    SourceKind::OrderReservation,
                    line.item_id,
                    actor_id,
                )
            })
            .collect::<Result<Vec<_>, StockError>>()?;
        let entries = append_entries(&mut tx, &mut book, &reservations).await?;

        let order_totals = Totals::sum(lines.iter().map(|l| &l.totals));
        sqlx::query(
            r#"
            INSERT INTO orders (id, partner_id, date, note, status, total_buy_price, total_sell_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order_id)
        .bind(input.partner_id)
        .bind(input.date)
        .bind(&input.note)
        .bind(OrderStatus::Upcoming.as_str())
        .bind(order_totals.buy)
        .bind(order_totals.sell)
        .execute(&mut *tx)
        .await?;

        for (line, entry) in lines.iter().zip(entries.iter()) {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, product_id, unique_code, name, image, unit, quantity,
                    total_buy_price, total_sell_price, reservation_entry_id
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(line.item_id)
            .bind(order_id)
            .bind(line.product.id)
            .bind(&line.product.unique_code)
            .bind(&line.product.name)
            .bind(&line.product.image)
            .bind(line.product.unit.as_str())
            .bind(line.quantity)
            .bind(line.totals.buy)
            .bind(line.totals.sell)
            .bind(entry.id)
            .execute(&mut *tx)
            .await?;
        }

        let order = load_order(&mut tx, order_id, false).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            total_sell_price = %order.total_sell_price,
            "Order created"
        );
        Ok(order)
    }

    /// Apply a lifecycle action to an order
    #[tracing::instrument(skip(self), fields(order_id = %order_id, action = %action))]
    pub async fn transition(
        &self,
        actor_id: Uuid,
        order_id: Uuid,
        action: OrderAction,
    ) -> AppResult<Order> {
        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout).await?;

        let order = load_order(&mut tx, order_id, true).await?;
        apply_action(&mut tx, &order, action, actor_id).await?;

        let updated = load_order(&mut tx, order_id, false).await?;
        tx.commit().await?;

        tracing::info!(status = %updated.status, "Order transitioned");
        Ok(updated)
    }

    /// Move an upcoming order into progress
    pub async fn start(&self, actor_id: Uuid, order_id: Uuid) -> AppResult<Order> {
        self.transition(actor_id, order_id, OrderAction::Start).await
    }

    /// Complete an order in progress; reserved stock stays consumed
    pub async fn finish(&self, actor_id: Uuid, order_id: Uuid) -> AppResult<Order> {
        self.transition(actor_id, order_id, OrderAction::Finish).await
    }

    /// Cancel an active order and return its reserved stock
    pub async fn cancel(&self, actor_id: Uuid, order_id: Uuid) -> AppResult<Order> {
        self.transition(actor_id, order_id, OrderAction::Cancel).await
    }

    /// Get an order with its items
    pub async fn get(&self, order_id: Uuid) -> AppResult<Order> {
        let mut conn = self.db.acquire().await?;
        load_order(&mut conn, order_id, false).await
    }

    /// List orders, newest date first
    pub async fn list(&self, filter: OrderFilter) -> AppResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE NOT is_deleted
              AND ($1::text IS NULL OR status = $1)
              AND ($2::date IS NULL OR date >= $2)
              AND ($3::date IS NULL OR date <= $3)
            ORDER BY date DESC, created_at DESC
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&self.db)
        .await?;

        let order_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let item_rows = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM order_items
            WHERE order_id = ANY($1) AND NOT is_deleted
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(&order_ids)
        .fetch_all(&self.db)
        .await?;

        let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            let item = OrderItem::try_from(row)?;
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        rows.into_iter()
            .map(|row| {
                let items = items_by_order.remove(&row.id).unwrap_or_default();
                build_order(row, items)
            })
            .collect()
    }

    /// Soft-delete an order. Active orders are cancelled first so their
    /// reservations go back to stock.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn delete(&self, actor_id: Uuid, order_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout).await?;

        let order = load_order(&mut tx, order_id, true).await?;
        if !order.status.is_terminal() {
            apply_action(&mut tx, &order, OrderAction::Cancel, actor_id).await?;
        }

        sqlx::query("UPDATE order_items SET is_deleted = TRUE WHERE order_id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE orders SET is_deleted = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("Order deleted");
        Ok(())
    }
}

/// Check the move, stamp its timestamp, release stock on cancel and persist.
async fn apply_action(
    conn: &mut PgConnection,
    order: &Order,
    action: OrderAction,
    actor_id: Uuid,
) -> AppResult<()> {
    let next = order.status.apply(action).map_err(|err| {
        tracing::warn!(from = %err.from, action = %err.action, "Order transition rejected");
        AppError::from(err)
    })?;

    let mut timestamps = order.timestamps;
    timestamps.record(action, Utc::now());

    if action == OrderAction::Cancel {
        release_reservations(conn, order.id, actor_id).await?;
    }

    sqlx::query(
        r#"
        UPDATE orders
        SET status = $1, started_at = $2, finished_at = $3, cancelled_at = $4, updated_at = NOW()
        WHERE id = $5
        "#,
    )
    .bind(next.as_str())
    .bind(timestamps.started_at)
    .bind(timestamps.finished_at)
    .bind(timestamps.cancelled_at)
    .bind(order.id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Reverse every reservation of an order, all or nothing.
async fn release_reservations(
    conn: &mut PgConnection,
    order_id: Uuid,
    actor_id: Uuid,
) -> AppResult<()> {
    let items = sqlx::query_as::<_, (Uuid, Uuid, Uuid)>(
        r#"
        SELECT id, product_id, reservation_entry_id
        FROM order_items
        WHERE order_id = $1 AND NOT is_deleted
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    if items.is_empty() {
        return Err(AppError::NotFound(format!("Items of order {}", order_id)));
    }

    let product_ids: Vec<Uuid> = items.iter().map(|(_, product_id, _)| *product_id).collect();
    let mut book = lock_products(conn, &product_ids, LockMode::IncludeDeleted).await?;

    let mut reversals = Vec::with_capacity(items.len());
    for (item_id, _, entry_id) in &items {
        let entry = match fetch_entry_for_update(conn, *entry_id).await {
            Ok(entry) => entry,
            Err(AppError::NotFound(_)) => {
                return Err(reservation_violation(order_id, *item_id, "is missing"));
            }
            Err(err) => return Err(err),
        };
        if entry.source_kind != SourceKind::OrderReservation || entry.source_ref != *item_id {
            return Err(reservation_violation(
                order_id,
                *item_id,
                "points at an unrelated ledger entry",
            ));
        }
        match entry.reversal(actor_id) {
            Ok(reversal) => reversals.push(reversal),
            Err(_) => {
                return Err(reservation_violation(order_id, *item_id, "was already reversed"));
            }
        }
    }

    append_entries(conn, &mut book, &reversals).await?;
    tracing::info!(
        order_id = %order_id,
        products = lock_order(product_ids).len(),
        "Order reservations released"
    );
    Ok(())
}

fn reservation_violation(order_id: Uuid, item_id: Uuid, problem: &str) -> AppError {
    tracing::error!(
        order_id = %order_id,
        item_id = %item_id,
        problem,
        "Order reservation cannot be released"
    );
    AppError::InvariantViolation(format!(
        "reservation of item {} in order {} {}",
        item_id, order_id, problem
    ))
}

async fn load_products(
    conn: &mut PgConnection,
    product_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, Product>> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
    ))
    .bind(product_ids)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|row| Product::try_from(row).map(|p| (p.id, p)))
        .collect()
}

/// Load a live order with its items, optionally locking the order row.
async fn load_order(conn: &mut PgConnection, order_id: Uuid, for_update: bool) -> AppResult<Order> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND NOT is_deleted{lock}"
    ))
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

    let items = sqlx::query_as::<_, ItemRow>(&format!(
        r#"
        SELECT {ITEM_COLUMNS}
        FROM order_items
        WHERE order_id = $1 AND NOT is_deleted
        ORDER BY created_at ASC, id ASC
        "#
    ))
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(OrderItem::try_from)
    .collect::<AppResult<Vec<_>>>()?;

    build_order(row, items)
}

/// Assemble an order, checking its stored status against its timestamps.
fn build_order(row: OrderRow, items: Vec<OrderItem>) -> AppResult<Order> {
    let status = row
        .status
        .parse::<OrderStatus>()
        .map_err(AppError::InvariantViolation)?;
    let timestamps = OrderTimestamps {
        started_at: row.started_at,
        finished_at: row.finished_at,
        cancelled_at: row.cancelled_at,
    };

    if let Err(err) = verify_status(status, &timestamps) {
        tracing::error!(order_id = %row.id, error = %err, "Order integrity violation");
        return Err(AppError::InvariantViolation(format!("order {}: {}", row.id, err)));
    }

    Ok(Order {
        id: row.id,
        partner_id: row.partner_id,
        date: row.date,
        note: row.note,
        status,
        timestamps,
        total_buy_price: row.total_buy_price,
        total_sell_price: row.total_sell_price,
        items,
        is_deleted: row.is_deleted,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
