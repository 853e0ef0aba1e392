//! PostgreSQL inventory and order store.

use crate::db::{corrupt_row, pool_error, query_error};
use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::Pool;
use std::collections::HashMap;
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use upkeep_core::{
    price_order, Category, CreateServiceOrderItem, NewCategory, NewSparePart, PageRequest,
    RequestId, ServiceOrder, ServiceOrderItem, ServiceOrderStatus, Sku, SparePart,
    SparePartUpdate, StorageError, UpkeepResult,
};
use upkeep_storage::OrderStore;

const CATEGORY_COLUMNS: &str = "id, name, description, created_at, updated_at";
const SPARE_PART_COLUMNS: &str =
    "id, name, sku, price_cents, stock, category_id, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, request_id, status, total_cents, created_at, updated_at";
const ITEM_COLUMNS: &str = "id, order_id, spare_part_id, quantity, unit_price_cents, created_at";

/// Order store backed by `spare_parts`, `service_orders` and `service_order_items`.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: Pool,
}

impl PgOrderStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn column<'a, T>(row: &'a Row, table: &'static str, name: &str) -> UpkeepResult<T>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(name).map_err(|e| corrupt_row(table, e))
}

fn row_to_category(row: &Row) -> UpkeepResult<Category> {
    const TABLE: &str = "categories";
    Ok(Category {
        id: column(row, TABLE, "id")?,
        name: column(row, TABLE, "name")?,
        description: column(row, TABLE, "description")?,
        created_at: column(row, TABLE, "created_at")?,
        updated_at: column(row, TABLE, "updated_at")?,
    })
}

fn row_to_spare_part(row: &Row) -> UpkeepResult<SparePart> {
    const TABLE: &str = "spare_parts";
    let sku: String = column(row, TABLE, "sku")?;
    Ok(SparePart {
        id: column(row, TABLE, "id")?,
        name: column(row, TABLE, "name")?,
        sku: Sku::parse(&sku).map_err(|e| corrupt_row(TABLE, e))?,
        price_cents: column(row, TABLE, "price_cents")?,
        stock: column(row, TABLE, "stock")?,
        category_id: column(row, TABLE, "category_id")?,
        created_at: column(row, TABLE, "created_at")?,
        updated_at: column(row, TABLE, "updated_at")?,
    })
}

fn row_to_item(row: &Row) -> UpkeepResult<ServiceOrderItem> {
    const TABLE: &str = "service_order_items";
    Ok(ServiceOrderItem {
        id: column(row, TABLE, "id")?,
        order_id: column(row, TABLE, "order_id")?,
        spare_part_id: column(row, TABLE, "spare_part_id")?,
        quantity: column(row, TABLE, "quantity")?,
        unit_price_cents: column(row, TABLE, "unit_price_cents")?,
        created_at: column(row, TABLE, "created_at")?,
    })
}

fn row_to_order(row: &Row, items: Vec<ServiceOrderItem>) -> UpkeepResult<ServiceOrder> {
    const TABLE: &str = "service_orders";
    let request_id: String = column(row, TABLE, "request_id")?;
    let status: String = column(row, TABLE, "status")?;
    Ok(ServiceOrder {
        id: column(row, TABLE, "id")?,
        request_id: RequestId::parse(request_id).map_err(|e| corrupt_row(TABLE, e))?,
        status: status.parse::<ServiceOrderStatus>().map_err(|e| corrupt_row(TABLE, e))?,
        total_cents: column(row, TABLE, "total_cents")?,
        items,
        created_at: column(row, TABLE, "created_at")?,
        updated_at: column(row, TABLE, "updated_at")?,
    })
}

/// Load the items of `order_ids`, grouped by order id.
async fn load_items(
    conn: &tokio_postgres::Client,
    order_ids: &[i64],
) -> UpkeepResult<HashMap<i64, Vec<ServiceOrderItem>>> {
    let sql = format!(
        "SELECT {} FROM service_order_items WHERE order_id = ANY($1) ORDER BY id",
        ITEM_COLUMNS
    );
    let rows = conn
        .query(&sql, &[&order_ids])
        .await
        .map_err(|e| query_error("service_order_items", e))?;

    let mut grouped: HashMap<i64, Vec<ServiceOrderItem>> = HashMap::new();
    for row in &rows {
        let item = row_to_item(row)?;
        grouped.entry(item.order_id).or_default().push(item);
    }
    Ok(grouped)
}

// ============================================================================
// STORE
// ============================================================================

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn category_insert(&self, category: &NewCategory) -> UpkeepResult<Category> {
        category.validate()?;
        let conn = self.pool.get().await.map_err(pool_error)?;
        let sql = format!(
            "INSERT INTO categories (name, description, created_at) \
             VALUES ($1, $2, $3) RETURNING {}",
            CATEGORY_COLUMNS
        );
        let row = conn
            .query_one(&sql, &[&category.name, &category.description, &Utc::now()])
            .await
            .map_err(|e| query_error("categories", e))?;
        row_to_category(&row)
    }

    async fn category_get(&self, id: i64) -> UpkeepResult<Option<Category>> {
        let conn = self.pool.get().await.map_err(pool_error)?;
        let sql = format!("SELECT {} FROM categories WHERE id = $1", CATEGORY_COLUMNS);
        let row = conn
            .query_opt(&sql, &[&id])
            .await
            .map_err(|e| query_error("categories", e))?;
        row.as_ref().map(row_to_category).transpose()
    }

    async fn spare_part_insert(&self, part: &NewSparePart) -> UpkeepResult<SparePart> {
        let sku = part.validate()?;
        let conn = self.pool.get().await.map_err(pool_error)?;
        let sql = format!(
            "INSERT INTO spare_parts (name, sku, price_cents, stock, category_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            SPARE_PART_COLUMNS
        );
        let row = conn
            .query_one(
                &sql,
                &[
                    &part.name,
                    &sku.as_str(),
                    &part.price_cents,
                    &part.stock,
                    &part.category_id,
                    &Utc::now(),
                ],
            )
            .await
            .map_err(|e| match part.category_id {
                Some(id) if e.code() == Some(&SqlState::FOREIGN_KEY_VIOLATION) => {
                    StorageError::NotFound {
                        entity: "Category",
                        id,
                    }
                    .into()
                }
                _ => query_error("spare_parts", e),
            })?;
        row_to_spare_part(&row)
    }

    async fn spare_part_get(&self, id: i64) -> UpkeepResult<Option<SparePart>> {
        let conn = self.pool.get().await.map_err(pool_error)?;
        let sql = format!("SELECT {} FROM spare_parts WHERE id = $1", SPARE_PART_COLUMNS);
        let row = conn
            .query_opt(&sql, &[&id])
            .await
            .map_err(|e| query_error("spare_parts", e))?;
        row.as_ref().map(row_to_spare_part).transpose()
    }

    async fn spare_part_update(
        &self,
        sku: &str,
        update: &SparePartUpdate,
    ) -> UpkeepResult<Option<SparePart>> {
        update.validate()?;
        let conn = self.pool.get().await.map_err(pool_error)?;
        let sql = format!(
            "UPDATE spare_parts \
             SET price_cents = COALESCE($2, price_cents), \
                 stock = COALESCE($3, stock), \
                 updated_at = $4 \
             WHERE sku = $1 RETURNING {}",
            SPARE_PART_COLUMNS
        );
        let row = conn
            .query_opt(
                &sql,
                &[&sku, &update.price_cents, &update.stock, &Utc::now()],
            )
            .await
            .map_err(|e| query_error("spare_parts", e))?;
        row.as_ref().map(row_to_spare_part).transpose()
    }

    async fn spare_part_list(&self, page: PageRequest) -> UpkeepResult<Vec<SparePart>> {
        let conn = self.pool.get().await.map_err(pool_error)?;
        let sql = format!(
            "SELECT {} FROM spare_parts ORDER BY id OFFSET $1 LIMIT $2",
            SPARE_PART_COLUMNS
        );
        let rows = conn
            .query(&sql, &[&i64::from(page.skip), &i64::from(page.limit)])
            .await
            .map_err(|e| query_error("spare_parts", e))?;
        rows.iter().map(row_to_spare_part).collect()
    }

    async fn order_create(
        &self,
        request_id: &RequestId,
        items: &[CreateServiceOrderItem],
    ) -> UpkeepResult<ServiceOrder> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        // Rolled back on drop unless committed below.
        let tx = conn
            .transaction()
            .await
            .map_err(|e| query_error("service_orders", e))?;

        let mut ids: Vec<i64> = items.iter().map(|item| item.spare_part_id).collect();
        ids.sort_unstable();
        ids.dedup();

        // Row locks serialize concurrent orders drawing on the same parts.
        let sql = format!(
            "SELECT {} FROM spare_parts WHERE id = ANY($1) ORDER BY id FOR UPDATE",
            SPARE_PART_COLUMNS
        );
        let rows = tx
            .query(&sql, &[&ids])
            .await
            .map_err(|e| query_error("spare_parts", e))?;
        let parts = rows
            .iter()
            .map(|row| row_to_spare_part(row).map(|part| (part.id, part)))
            .collect::<UpkeepResult<HashMap<_, _>>>()?;

        let priced = price_order(items, &parts)?;
        let now = Utc::now();
        let status = ServiceOrderStatus::Pending;

        let sql = format!(
            "INSERT INTO service_orders (request_id, status, total_cents, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            ORDER_COLUMNS
        );
        let order_row = tx
            .query_one(
                &sql,
                &[&request_id.as_str(), &status.as_str(), &priced.total_cents, &now],
            )
            .await
            .map_err(|e| query_error("service_orders", e))?;
        let order_id: i64 = column(&order_row, "service_orders", "id")?;

        let item_sql = format!(
            "INSERT INTO service_order_items \
             (order_id, spare_part_id, quantity, unit_price_cents, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            ITEM_COLUMNS
        );
        let mut order_items = Vec::with_capacity(priced.lines.len());
        for line in &priced.lines {
            let row = tx
                .query_one(
                    &item_sql,
                    &[
                        &order_id,
                        &line.spare_part_id,
                        &line.quantity,
                        &line.unit_price_cents,
                        &now,
                    ],
                )
                .await
                .map_err(|e| query_error("service_order_items", e))?;
            order_items.push(row_to_item(&row)?);
        }

        for (spare_part_id, quantity) in &priced.stock_deductions {
            tx.execute(
                "UPDATE spare_parts SET stock = stock - $2, updated_at = $3 WHERE id = $1",
                &[spare_part_id, quantity, &now],
            )
            .await
            .map_err(|e| query_error("spare_parts", e))?;
        }

        let order = row_to_order(&order_row, order_items)?;
        tx.commit()
            .await
            .map_err(|e| query_error("service_orders", e))?;

        tracing::debug!(
            order_id = order.id,
            request_id = %request_id,
            total_cents = order.total_cents,
            "Service order created"
        );
        Ok(order)
    }

    async fn order_get(&self, id: i64) -> UpkeepResult<Option<ServiceOrder>> {
        let conn = self.pool.get().await.map_err(pool_error)?;
        let sql = format!("SELECT {} FROM service_orders WHERE id = $1", ORDER_COLUMNS);
        let Some(row) = conn
            .query_opt(&sql, &[&id])
            .await
            .map_err(|e| query_error("service_orders", e))?
        else {
            return Ok(None);
        };

        let mut items = load_items(&conn, &[id]).await?;
        row_to_order(&row, items.remove(&id).unwrap_or_default()).map(Some)
    }

    async fn order_list_by_request(&self, request_id: &RequestId) -> UpkeepResult<Vec<ServiceOrder>> {
        let conn = self.pool.get().await.map_err(pool_error)?;
        let sql = format!(
            "SELECT {} FROM service_orders WHERE request_id = $1 ORDER BY id",
            ORDER_COLUMNS
        );
        let rows = conn
            .query(&sql, &[&request_id.as_str()])
            .await
            .map_err(|e| query_error("service_orders", e))?;

        let ids = rows
            .iter()
            .map(|row| column::<i64>(row, "service_orders", "id"))
            .collect::<UpkeepResult<Vec<_>>>()?;
        let mut items = load_items(&conn, &ids).await?;

        rows.iter()
            .zip(&ids)
            .map(|(row, id)| row_to_order(row, items.remove(id).unwrap_or_default()))
            .collect()
    }
}
