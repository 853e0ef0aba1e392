//! Service-order operations.
//!
//! Order creation runs under the idempotency guard: a repeated submission of
//! the same request id inside the configured window returns the order created
//! by the first submission instead of creating a second one.

use crate::db::DbClient;
use crate::error::{ErrorCode, ServiceError, ServiceResult};
use crate::pg_idempotency::PgIdempotencyStore;
use crate::pg_orders::PgOrderStore;
use std::time::Instant;
use upkeep_core::{
    Category, Clock, CreateServiceOrder, NewCategory, NewSparePart, PageRequest, ServiceOrder,
    SparePart, SparePartUpdate, SystemClock,
};
use upkeep_guard::{GuardConfig, Guarded, IdempotencyGuard};
use upkeep_storage::{IdempotencyStore, OrderStore};

/// Order and inventory operations over an order store and an idempotency store.
pub struct OrderService<O, S, C = SystemClock> {
    orders: O,
    guard: IdempotencyGuard<S, C>,
    config: GuardConfig,
}

impl OrderService<PgOrderStore, PgIdempotencyStore> {
    /// Service backed by the Postgres stores of `db`.
    pub fn postgres(db: &DbClient, config: GuardConfig) -> Self {
        Self::new(
            db.order_store(),
            IdempotencyGuard::new(db.idempotency_store()),
            config,
        )
    }
}

impl<O, S, C> OrderService<O, S, C>
where
    O: OrderStore,
    S: IdempotencyStore,
    C: Clock,
{
    pub fn new(orders: O, guard: IdempotencyGuard<S, C>, config: GuardConfig) -> Self {
        Self {
            orders,
            guard,
            config,
        }
    }

    pub fn orders(&self) -> &O {
        &self.orders
    }

    pub fn guard(&self) -> &IdempotencyGuard<S, C> {
        &self.guard
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Create a service order at most once per request id.
    ///
    /// Input is validated before any store is touched. The returned
    /// [`Guarded`] tells whether this call created the order or replayed an
    /// earlier response.
    pub async fn create_service_order(
        &self,
        request: &CreateServiceOrder,
    ) -> ServiceResult<Guarded<ServiceOrder>> {
        let started = Instant::now();
        let request_id = request.validate()?;

        let orders = &self.orders;
        let request_id_ref = &request_id;
        let items = request.items.as_slice();
        let result = self
            .guard
            .execute(&request_id, self.config.order_window, move || async move {
                orders
                    .order_create(request_id_ref, items)
                    .await
                    .map_err(ServiceError::from)
            })
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let metrics = self.guard.metrics().snapshot();
        match &result {
            Ok(guarded) => tracing::info!(
                operation = "create_service_order",
                request_id = %request_id,
                order_id = guarded.value().id,
                replayed = guarded.is_replay(),
                elapsed_ms,
                guard_hits = metrics.hits,
                guard_conflicts = metrics.conflicts,
                "Service order request handled"
            ),
            Err(e) => tracing::warn!(
                operation = "create_service_order",
                request_id = %request_id,
                error_code = %e.code,
                error = %e.message,
                elapsed_ms,
                "Service order request failed"
            ),
        }
        result
    }

    /// Get a service order with its items.
    pub async fn get_service_order(&self, id: i64) -> ServiceResult<ServiceOrder> {
        let started = Instant::now();
        let order = self.orders.order_get(id).await?;
        tracing::debug!(
            operation = "get_service_order",
            order_id = id,
            found = order.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Service order lookup"
        );
        order.ok_or_else(|| ServiceError::not_found("ServiceOrder", id))
    }

    /// Register a spare part. The SKU must follow `CLASS-MATERIAL-SIZE-LENGTH`.
    pub async fn register_spare_part(&self, part: &NewSparePart) -> ServiceResult<SparePart> {
        let started = Instant::now();
        part.validate()?;
        let stored = self.orders.spare_part_insert(part).await?;
        tracing::info!(
            operation = "register_spare_part",
            spare_part_id = stored.id,
            sku = %stored.sku,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Spare part registered"
        );
        Ok(stored)
    }

    pub async fn get_spare_part(&self, id: i64) -> ServiceResult<SparePart> {
        let started = Instant::now();
        let part = self.orders.spare_part_get(id).await?;
        tracing::debug!(
            operation = "get_spare_part",
            spare_part_id = id,
            found = part.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Spare part lookup"
        );
        part.ok_or_else(|| ServiceError::not_found("SparePart", id))
    }

    /// Change the price and/or stock of the part with `sku`.
    ///
    /// Fields left `None` keep their value; an update with no fields is
    /// rejected before any store is touched.
    pub async fn update_spare_part(
        &self,
        sku: &str,
        update: &SparePartUpdate,
    ) -> ServiceResult<SparePart> {
        let started = Instant::now();
        update.validate()?;
        let updated = self.orders.spare_part_update(sku, update).await?;
        tracing::info!(
            operation = "update_spare_part",
            sku,
            price_cents = ?update.price_cents,
            stock = ?update.stock,
            found = updated.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Spare part update"
        );
        updated.ok_or_else(|| {
            ServiceError::new(
                ErrorCode::EntityNotFound,
                format!("Spare part with SKU '{}' not found", sku),
            )
        })
    }

    /// One page of spare parts, ordered by id.
    pub async fn list_spare_parts(&self, page: PageRequest) -> ServiceResult<Vec<SparePart>> {
        let started = Instant::now();
        let parts = self.orders.spare_part_list(page).await?;
        tracing::debug!(
            operation = "list_spare_parts",
            skip = page.skip,
            limit = page.limit,
            returned = parts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Spare parts listed"
        );
        Ok(parts)
    }

    /// Create a category. Names are unique.
    pub async fn create_category(&self, category: &NewCategory) -> ServiceResult<Category> {
        let started = Instant::now();
        category.validate()?;
        let stored = self.orders.category_insert(category).await?;
        tracing::info!(
            operation = "create_category",
            category_id = stored.id,
            name = %stored.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Category created"
        );
        Ok(stored)
    }

    pub async fn get_category(&self, id: i64) -> ServiceResult<Category> {
        let started = Instant::now();
        let category = self.orders.category_get(id).await?;
        tracing::debug!(
            operation = "get_category",
            category_id = id,
            found = category.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Category lookup"
        );
        category.ok_or_else(|| ServiceError::not_found("Category", id))
    }
}
