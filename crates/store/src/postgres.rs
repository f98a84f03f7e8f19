use async_trait::async_trait;
use common::{
    BackorderId, MovementId, OrderId, ProductId, ReservationId, StockKey, WarehouseId,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::model::{
    Backorder, BackorderStatus, MovementStatus, Order, OrderStatus, Reservation,
    ReservationStatus, StockEntry, StockMovement, Version,
};
use crate::store::{
    BackorderFilter, BackorderPatch, InventoryStore, MovementFilter, OrderPatch,
    ReservationFilter, ReservationPatch,
};
use crate::{Result, StoreError};

const STOCK_COLUMNS: &str =
    "product_id, warehouse_id, quantity, version, created_at, updated_at";
const RESERVATION_COLUMNS: &str = "id, order_id, product_id, warehouse_id, quantity, status, \
     reservation_date, expiry_date, ship_date";
const BACKORDER_COLUMNS: &str = "id, order_id, product_id, warehouse_id, quantity_needed, \
     quantity_available, status, created_at, fulfilled_date";
const MOVEMENT_COLUMNS: &str = "id, product_id, quantity, source_warehouse_id, \
     destination_warehouse_id, status, transfer_date, order_id";

/// PostgreSQL-backed inventory store.
///
/// Each trait call runs as one statement or one short transaction; no
/// transaction is ever held across calls.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL inventory store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn quantity(row: &PgRow, column: &'static str) -> Result<u32> {
        let value: i64 = row.try_get(column)?;
        u32::try_from(value).map_err(|_| StoreError::OutOfRange { column, value })
    }

    fn row_to_stock(row: PgRow) -> Result<StockEntry> {
        Ok(StockEntry {
            product_id: ProductId::from_uuid(row.try_get("product_id")?),
            warehouse_id: WarehouseId::from_uuid(row.try_get("warehouse_id")?),
            quantity: Self::quantity(&row, "quantity")?,
            version: Version::new(row.try_get("version")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        Ok(Order {
            id: OrderId::from_uuid(row.try_get("id")?),
            status: row.try_get::<String, _>("status")?.parse::<OrderStatus>()?,
            order_date: row.try_get("order_date")?,
            fulfillment_date: row.try_get("fulfillment_date")?,
        })
    }

    fn row_to_reservation(row: PgRow) -> Result<Reservation> {
        Ok(Reservation {
            id: ReservationId::from_uuid(row.try_get("id")?),
            order_id: OrderId::from_uuid(row.try_get("order_id")?),
            product_id: ProductId::from_uuid(row.try_get("product_id")?),
            warehouse_id: WarehouseId::from_uuid(row.try_get("warehouse_id")?),
            quantity: Self::quantity(&row, "quantity")?,
            status: row
                .try_get::<String, _>("status")?
                .parse::<ReservationStatus>()?,
            reservation_date: row.try_get("reservation_date")?,
            expiry_date: row.try_get("expiry_date")?,
            ship_date: row.try_get("ship_date")?,
        })
    }

    fn row_to_backorder(row: PgRow) -> Result<Backorder> {
        Ok(Backorder {
            id: BackorderId::from_uuid(row.try_get("id")?),
            order_id: OrderId::from_uuid(row.try_get("order_id")?),
            product_id: ProductId::from_uuid(row.try_get("product_id")?),
            warehouse_id: WarehouseId::from_uuid(row.try_get("warehouse_id")?),
            quantity_needed: Self::quantity(&row, "quantity_needed")?,
            quantity_available_at_creation: Self::quantity(&row, "quantity_available")?,
            status: row
                .try_get::<String, _>("status")?
                .parse::<BackorderStatus>()?,
            created_at: row.try_get("created_at")?,
            fulfilled_date: row.try_get("fulfilled_date")?,
        })
    }

    fn row_to_movement(row: PgRow) -> Result<StockMovement> {
        Ok(StockMovement {
            id: MovementId::from_uuid(row.try_get("id")?),
            product_id: ProductId::from_uuid(row.try_get("product_id")?),
            quantity: Self::quantity(&row, "quantity")?,
            source_warehouse_id: row
                .try_get::<Option<Uuid>, _>("source_warehouse_id")?
                .map(WarehouseId::from_uuid),
            destination_warehouse_id: row
                .try_get::<Option<Uuid>, _>("destination_warehouse_id")?
                .map(WarehouseId::from_uuid),
            status: row
                .try_get::<String, _>("status")?
                .parse::<MovementStatus>()?,
            transfer_date: row.try_get("transfer_date")?,
            order_id: row
                .try_get::<Option<Uuid>, _>("order_id")?
                .map(OrderId::from_uuid),
        })
    }

    fn uuids<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
        ids.iter().map(|id| (*id).into()).collect()
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    async fn get_stock(&self, key: StockKey) -> Result<Option<StockEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock WHERE product_id = $1 AND warehouse_id = $2"
        ))
        .bind(key.product_id.as_uuid())
        .bind(key.warehouse_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_stock).transpose()
    }

    async fn list_stock(&self) -> Result<Vec<StockEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock ORDER BY product_id, warehouse_id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_stock).collect()
    }

    async fn insert_stock(&self, entry: StockEntry) -> Result<StockEntry> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO stock ({STOCK_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (product_id, warehouse_id) DO NOTHING
            RETURNING {STOCK_COLUMNS}
            "#
        ))
        .bind(entry.product_id.as_uuid())
        .bind(entry.warehouse_id.as_uuid())
        .bind(i64::from(entry.quantity))
        .bind(entry.version.as_i64())
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_stock(row),
            None => Err(StoreError::AlreadyExists {
                table: "stock",
                id: entry.key().to_string(),
            }),
        }
    }

    async fn update_stock(
        &self,
        key: StockKey,
        quantity: u32,
        expected: Version,
    ) -> Result<StockEntry> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE stock
            SET quantity = $3, version = version + 1, updated_at = NOW()
            WHERE product_id = $1 AND warehouse_id = $2 AND version = $4
            RETURNING {STOCK_COLUMNS}
            "#
        ))
        .bind(key.product_id.as_uuid())
        .bind(key.warehouse_id.as_uuid())
        .bind(i64::from(quantity))
        .bind(expected.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Self::row_to_stock(row);
        }

        // Nothing matched: tell a missing row apart from a stale version.
        let actual: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM stock WHERE product_id = $1 AND warehouse_id = $2",
        )
        .bind(key.product_id.as_uuid())
        .bind(key.warehouse_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match actual {
            Some(actual) => Err(StoreError::ConcurrencyConflict {
                key,
                expected,
                actual: Version::new(actual),
            }),
            None => Err(StoreError::RowNotFound {
                table: "stock",
                id: key.to_string(),
            }),
        }
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT id, status, order_date, fulfillment_date FROM orders WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (id, status, order_date, fulfillment_date)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.order_date)
        .bind(order.fulfillment_date)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists {
                table: "orders",
                id: order.id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_orders(&self, ids: &[OrderId], patch: OrderPatch) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, fulfillment_date = COALESCE($3, fulfillment_date)
            WHERE id = ANY($1)
            "#,
        )
        .bind(Self::uuids(ids))
        .bind(patch.status.as_str())
        .bind(patch.fulfillment_date)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_order(&self, id: OrderId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_reservations(&self, rows: Vec<Reservation>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for row in &rows {
            sqlx::query(&format!(
                r#"
                INSERT INTO stock_reservations ({RESERVATION_COLUMNS})
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#
            ))
            .bind(row.id.as_uuid())
            .bind(row.order_id.as_uuid())
            .bind(row.product_id.as_uuid())
            .bind(row.warehouse_id.as_uuid())
            .bind(i64::from(row.quantity))
            .bind(row.status.as_str())
            .bind(row.reservation_date)
            .bind(row.expiry_date)
            .bind(row.ship_date)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_reservations(&self, filter: ReservationFilter) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM stock_reservations
            WHERE ($1::uuid IS NULL OR order_id = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::uuid[] IS NULL OR id = ANY($3))
            ORDER BY reservation_date ASC, id ASC
            "#
        ))
        .bind(filter.order_id.map(|id| id.as_uuid()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.ids.as_deref().map(Self::uuids))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn update_reservation(&self, id: ReservationId, patch: ReservationPatch) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE stock_reservations
            SET status = $2, ship_date = $3
            WHERE id = $1 AND ($4::text IS NULL OR status = $4)
            "#,
        )
        .bind(id.as_uuid())
        .bind(patch.status.as_str())
        .bind(patch.ship_date)
        .bind(patch.expected_status.map(|s| s.as_str()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_reservations(&self, ids: &[ReservationId]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM stock_reservations WHERE id = ANY($1)")
            .bind(Self::uuids(ids))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_backorder(&self, row: Backorder) -> Result<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO backorders ({BACKORDER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#
        ))
        .bind(row.id.as_uuid())
        .bind(row.order_id.as_uuid())
        .bind(row.product_id.as_uuid())
        .bind(row.warehouse_id.as_uuid())
        .bind(i64::from(row.quantity_needed))
        .bind(i64::from(row.quantity_available_at_creation))
        .bind(row.status.as_str())
        .bind(row.created_at)
        .bind(row.fulfilled_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_backorders(&self, filter: BackorderFilter) -> Result<Vec<Backorder>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {BACKORDER_COLUMNS}
            FROM backorders
            WHERE ($1::uuid IS NULL OR order_id = $1)
              AND ($2::uuid IS NULL OR product_id = $2)
              AND ($3::uuid IS NULL OR warehouse_id = $3)
              AND ($4::text IS NULL OR status = $4)
            ORDER BY created_at ASC, seq ASC
            "#
        ))
        .bind(filter.order_id.map(|id| id.as_uuid()))
        .bind(filter.key.map(|k| k.product_id.as_uuid()))
        .bind(filter.key.map(|k| k.warehouse_id.as_uuid()))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_backorder).collect()
    }

    async fn update_backorders(&self, ids: &[BackorderId], patch: BackorderPatch) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE backorders
            SET status = $2, fulfilled_date = $3
            WHERE id = ANY($1) AND ($4::text IS NULL OR status = $4)
            "#,
        )
        .bind(Self::uuids(ids))
        .bind(patch.status.as_str())
        .bind(patch.fulfilled_date)
        .bind(patch.expected_status.map(|s| s.as_str()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn insert_movement(&self, row: StockMovement) -> Result<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO stock_movements ({MOVEMENT_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#
        ))
        .bind(row.id.as_uuid())
        .bind(row.product_id.as_uuid())
        .bind(i64::from(row.quantity))
        .bind(row.source_warehouse_id.map(|id| id.as_uuid()))
        .bind(row.destination_warehouse_id.map(|id| id.as_uuid()))
        .bind(row.status.as_str())
        .bind(row.transfer_date)
        .bind(row.order_id.map(|id| id.as_uuid()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_movements(&self, filter: MovementFilter) -> Result<Vec<StockMovement>> {
        let limit = filter.limit.map(|l| l as i64);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM stock_movements
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::uuid IS NULL OR source_warehouse_id = $2 OR destination_warehouse_id = $2)
              AND ($3::uuid IS NULL OR order_id = $3)
            ORDER BY transfer_date DESC, seq DESC
            LIMIT $4
            "#
        ))
        .bind(filter.product_id.map(|id| id.as_uuid()))
        .bind(filter.warehouse_id.map(|id| id.as_uuid()))
        .bind(filter.order_id.map(|id| id.as_uuid()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_movement).collect()
    }
}
