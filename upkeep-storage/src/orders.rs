//! Spare-part inventory and service order storage.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use upkeep_core::{
    price_order, Category, CreateServiceOrderItem, NewCategory, NewSparePart, PageRequest,
    RequestId, ServiceOrder, ServiceOrderItem, ServiceOrderStatus, SparePart, SparePartUpdate,
    StorageError, UpkeepResult,
};

/// Storage for the inventory and the orders drawn from it.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Create a category. Names are unique.
    async fn category_insert(&self, category: &NewCategory) -> UpkeepResult<Category>;

    async fn category_get(&self, id: i64) -> UpkeepResult<Option<Category>>;

    /// Register a spare part. SKUs are unique and `category_id`, when set,
    /// must name an existing category.
    async fn spare_part_insert(&self, part: &NewSparePart) -> UpkeepResult<SparePart>;

    /// Get a spare part by ID.
    async fn spare_part_get(&self, id: i64) -> UpkeepResult<Option<SparePart>>;

    /// Apply a partial update to the part with `sku`. `None` if no part has it.
    async fn spare_part_update(
        &self,
        sku: &str,
        update: &SparePartUpdate,
    ) -> UpkeepResult<Option<SparePart>>;

    /// One page of spare parts ordered by id.
    async fn spare_part_list(&self, page: PageRequest) -> UpkeepResult<Vec<SparePart>>;

    /// Price and create an order, decrementing stock.
    ///
    /// Pricing, the stock check, the order and item inserts and the stock
    /// decrements happen atomically: on error nothing is written.
    async fn order_create(
        &self,
        request_id: &RequestId,
        items: &[CreateServiceOrderItem],
    ) -> UpkeepResult<ServiceOrder>;

    /// Get an order with its items by ID.
    async fn order_get(&self, id: i64) -> UpkeepResult<Option<ServiceOrder>>;

    /// All orders created under a request id, oldest first.
    async fn order_list_by_request(&self, request_id: &RequestId) -> UpkeepResult<Vec<ServiceOrder>>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn category_insert(&self, category: &NewCategory) -> UpkeepResult<Category> {
        (**self).category_insert(category).await
    }

    async fn category_get(&self, id: i64) -> UpkeepResult<Option<Category>> {
        (**self).category_get(id).await
    }

    async fn spare_part_insert(&self, part: &NewSparePart) -> UpkeepResult<SparePart> {
        (**self).spare_part_insert(part).await
    }

    async fn spare_part_get(&self, id: i64) -> UpkeepResult<Option<SparePart>> {
        (**self).spare_part_get(id).await
    }

    async fn spare_part_update(
        &self,
        sku: &str,
        update: &SparePartUpdate,
    ) -> UpkeepResult<Option<SparePart>> {
        (**self).spare_part_update(sku, update).await
    }

    async fn spare_part_list(&self, page: PageRequest) -> UpkeepResult<Vec<SparePart>> {
        (**self).spare_part_list(page).await
    }

    async fn order_create(
        &self,
        request_id: &RequestId,
        items: &[CreateServiceOrderItem],
    ) -> UpkeepResult<ServiceOrder> {
        (**self).order_create(request_id, items).await
    }

    async fn order_get(&self, id: i64) -> UpkeepResult<Option<ServiceOrder>> {
        (**self).order_get(id).await
    }

    async fn order_list_by_request(&self, request_id: &RequestId) -> UpkeepResult<Vec<ServiceOrder>> {
        (**self).order_list_by_request(request_id).await
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Default)]
struct Inventory {
    next_category_id: i64,
    next_part_id: i64,
    next_order_id: i64,
    next_item_id: i64,
    categories: HashMap<i64, Category>,
    parts: HashMap<i64, SparePart>,
    orders: BTreeMap<i64, ServiceOrder>,
}

/// In-memory order store for testing.
#[derive(Debug, Default, Clone)]
pub struct InMemoryOrderStore {
    inventory: Arc<Mutex<Inventory>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get count of stored orders.
    pub async fn order_count(&self) -> usize {
        self.inventory.lock().await.orders.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn category_insert(&self, category: &NewCategory) -> UpkeepResult<Category> {
        category.validate()?;
        let mut inventory = self.inventory.lock().await;
        if inventory
            .categories
            .values()
            .any(|existing| existing.name == category.name)
        {
            return Err(StorageError::UniqueViolation {
                table: "categories",
                key: category.name.clone(),
            }
            .into());
        }

        inventory.next_category_id += 1;
        let stored = Category {
            id: inventory.next_category_id,
            name: category.name.clone(),
            description: category.description.clone(),
            created_at: Utc::now(),
            updated_at: None,
        };
        inventory.categories.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn category_get(&self, id: i64) -> UpkeepResult<Option<Category>> {
        Ok(self.inventory.lock().await.categories.get(&id).cloned())
    }

    async fn spare_part_insert(&self, part: &NewSparePart) -> UpkeepResult<SparePart> {
        let sku = part.validate()?;
        let mut inventory = self.inventory.lock().await;
        if inventory.parts.values().any(|existing| existing.sku == sku) {
            return Err(StorageError::UniqueViolation {
                table: "spare_parts",
                key: sku.to_string(),
            }
            .into());
        }
        if let Some(category_id) = part.category_id {
            if !inventory.categories.contains_key(&category_id) {
                return Err(StorageError::NotFound {
                    entity: "Category",
                    id: category_id,
                }
                .into());
            }
        }

        inventory.next_part_id += 1;
        let stored = SparePart {
            id: inventory.next_part_id,
            name: part.name.clone(),
            sku,
            price_cents: part.price_cents,
            stock: part.stock,
            category_id: part.category_id,
            created_at: Utc::now(),
            updated_at: None,
        };
        inventory.parts.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn spare_part_get(&self, id: i64) -> UpkeepResult<Option<SparePart>> {
        Ok(self.inventory.lock().await.parts.get(&id).cloned())
    }

    async fn spare_part_update(
        &self,
        sku: &str,
        update: &SparePartUpdate,
    ) -> UpkeepResult<Option<SparePart>> {
        update.validate()?;
        let mut inventory = self.inventory.lock().await;
        let Some(part) = inventory
            .parts
            .values_mut()
            .find(|part| part.sku.as_str() == sku)
        else {
            return Ok(None);
        };

        if let Some(price_cents) = update.price_cents {
            part.price_cents = price_cents;
        }
        if let Some(stock) = update.stock {
            part.stock = stock;
        }
        part.updated_at = Some(Utc::now());
        Ok(Some(part.clone()))
    }

    async fn spare_part_list(&self, page: PageRequest) -> UpkeepResult<Vec<SparePart>> {
        let inventory = self.inventory.lock().await;
        let mut parts: Vec<&SparePart> = inventory.parts.values().collect();
        parts.sort_by_key(|part| part.id);
        Ok(parts
            .into_iter()
            .skip(page.skip as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn order_create(
        &self,
        request_id: &RequestId,
        items: &[CreateServiceOrderItem],
    ) -> UpkeepResult<ServiceOrder> {
        let mut inventory = self.inventory.lock().await;
        let priced = price_order(items, &inventory.parts)?;
        let now = Utc::now();

        inventory.next_order_id += 1;
        let order_id = inventory.next_order_id;

        let mut order_items = Vec::with_capacity(priced.lines.len());
        for line in &priced.lines {
            inventory.next_item_id += 1;
            order_items.push(ServiceOrderItem {
                id: inventory.next_item_id,
                order_id,
                spare_part_id: line.spare_part_id,
                quantity: line.quantity,
                unit_price_cents: line.unit_price_cents,
                created_at: now,
            });
        }

        for (spare_part_id, quantity) in &priced.stock_deductions {
            if let Some(part) = inventory.parts.get_mut(spare_part_id) {
                part.stock -= quantity;
                part.updated_at = Some(now);
            }
        }

        let order = ServiceOrder {
            id: order_id,
            request_id: request_id.clone(),
            status: ServiceOrderStatus::Pending,
            total_cents: priced.total_cents,
            items: order_items,
            created_at: now,
            updated_at: None,
        };
        inventory.orders.insert(order_id, order.clone());
        Ok(order)
    }

    async fn order_get(&self, id: i64) -> UpkeepResult<Option<ServiceOrder>> {
        Ok(self.inventory.lock().await.orders.get(&id).cloned())
    }

    async fn order_list_by_request(&self, request_id: &RequestId) -> UpkeepResult<Vec<ServiceOrder>> {
        Ok(self
            .inventory
            .lock()
            .await
            .orders
            .values()
            .filter(|order| &order.request_id == request_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upkeep_core::{OrderError, UpkeepError};

    fn new_part(name: &str, sku: &str, price_cents: i64, stock: i32) -> NewSparePart {
        NewSparePart {
            name: name.to_string(),
            sku: sku.to_string(),
            price_cents,
            stock,
            category_id: None,
        }
    }

    fn item(spare_part_id: i64, quantity: i32) -> CreateServiceOrderItem {
        CreateServiceOrderItem {
            spare_part_id,
            quantity,
        }
    }

    #[tokio::test]
    async fn test_spare_part_insert_get() {
        let store = InMemoryOrderStore::new();
        let part = store
            .spare_part_insert(&new_part("Tornillo", "A-STL-M10-50", 100, 100))
            .await
            .unwrap();

        let fetched = store.spare_part_get(part.id).await.unwrap().unwrap();
        assert_eq!(fetched, part);
        assert!(store.spare_part_get(part.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_spare_part_duplicate_sku() {
        let store = InMemoryOrderStore::new();
        store
            .spare_part_insert(&new_part("Tornillo", "A-STL-M10-50", 100, 100))
            .await
            .unwrap();
        let err = store
            .spare_part_insert(&new_part("Otro", "A-STL-M10-50", 10, 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UpkeepError::Storage(StorageError::UniqueViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_spare_part_invalid_sku_rejected() {
        let store = InMemoryOrderStore::new();
        let err = store
            .spare_part_insert(&new_part("Tornillo", "INVALID", 100, 100))
            .await
            .unwrap_err();
        assert!(matches!(err, UpkeepError::Validation(_)));
    }

    #[tokio::test]
    async fn test_category_insert_unique_name() {
        let store = InMemoryOrderStore::new();
        let category = store
            .category_insert(&NewCategory::new("Fasteners").with_description("Screws and nuts"))
            .await
            .unwrap();
        assert_eq!(store.category_get(category.id).await.unwrap(), Some(category));

        let err = store
            .category_insert(&NewCategory::new("Fasteners"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UpkeepError::Storage(StorageError::UniqueViolation {
                table: "categories",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_spare_part_requires_existing_category() {
        let store = InMemoryOrderStore::new();
        let dangling = NewSparePart {
            category_id: Some(999),
            ..new_part("Tornillo", "A-STL-M10-50", 100, 100)
        };
        let err = store.spare_part_insert(&dangling).await.unwrap_err();
        assert!(matches!(
            err,
            UpkeepError::Storage(StorageError::NotFound {
                entity: "Category",
                id: 999
            })
        ));
        assert!(store.spare_part_list(PageRequest::default()).await.unwrap().is_empty());

        let category = store
            .category_insert(&NewCategory::new("Fasteners"))
            .await
            .unwrap();
        let part = store
            .spare_part_insert(&NewSparePart {
                category_id: Some(category.id),
                ..dangling
            })
            .await
            .unwrap();
        assert_eq!(part.category_id, Some(category.id));
    }

    #[tokio::test]
    async fn test_spare_part_update_by_sku() {
        let store = InMemoryOrderStore::new();
        let part = store
            .spare_part_insert(&new_part("Tornillo", "A-STL-M10-50", 100, 0))
            .await
            .unwrap();

        let restocked = store
            .spare_part_update("A-STL-M10-50", &SparePartUpdate::restock(40))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(restocked.stock, 40);
        assert_eq!(restocked.price_cents, 100);
        assert!(restocked.updated_at.is_some());

        let repriced = store
            .spare_part_update(
                "A-STL-M10-50",
                &SparePartUpdate {
                    price_cents: Some(150),
                    stock: None,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!((repriced.price_cents, repriced.stock), (150, 40));
        assert_eq!(repriced.id, part.id);

        assert!(store
            .spare_part_update("Z-ZZZ-Z-0", &SparePartUpdate::restock(1))
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            store
                .spare_part_update("A-STL-M10-50", &SparePartUpdate::default())
                .await,
            Err(UpkeepError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_spare_part_list_pages_by_id() {
        let store = InMemoryOrderStore::new();
        for n in 0..5 {
            store
                .spare_part_insert(&new_part("Arandela", &format!("D-STL-M{}-1", n), 5, 10))
                .await
                .unwrap();
        }

        let first = store.spare_part_list(PageRequest::new(0, 2)).await.unwrap();
        let ids: Vec<i64> = first.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2]);

        let rest = store.spare_part_list(PageRequest::new(2, 10)).await.unwrap();
        assert_eq!(rest.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3, 4, 5]);

        assert!(store.spare_part_list(PageRequest::new(5, 10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_create_prices_and_decrements_stock() {
        let store = InMemoryOrderStore::new();
        let screw = store
            .spare_part_insert(&new_part("Tornillo", "A-STL-M10-50", 100, 100))
            .await
            .unwrap();
        let nut = store
            .spare_part_insert(&new_part("Tuerca", "B-STL-M10-20", 50, 200))
            .await
            .unwrap();

        let request_id = RequestId::parse("12345").unwrap();
        let order = store
            .order_create(&request_id, &[item(screw.id, 10), item(nut.id, 20)])
            .await
            .unwrap();

        assert_eq!(order.total_cents, 2000);
        assert_eq!(order.status, ServiceOrderStatus::Pending);
        assert_eq!(order.items.len(), 2);
        assert!(order.items.iter().all(|i| i.order_id == order.id));

        assert_eq!(store.spare_part_get(screw.id).await.unwrap().unwrap().stock, 90);
        assert_eq!(store.spare_part_get(nut.id).await.unwrap().unwrap().stock, 180);
        assert_eq!(store.order_get(order.id).await.unwrap(), Some(order.clone()));
        assert_eq!(
            store.order_list_by_request(&request_id).await.unwrap(),
            vec![order]
        );
    }

    #[tokio::test]
    async fn test_order_create_insufficient_stock_writes_nothing() {
        let store = InMemoryOrderStore::new();
        let part = store
            .spare_part_insert(&new_part("Resistencia", "C-ELC-100R-1W", 25, 5))
            .await
            .unwrap();

        let err = store
            .order_create(&RequestId::parse("r-1").unwrap(), &[item(part.id, 6)])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UpkeepError::Order(OrderError::InsufficientStock { .. })
        ));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.spare_part_get(part.id).await.unwrap().unwrap().stock, 5);
    }

    #[tokio::test]
    async fn test_order_create_missing_part() {
        let store = InMemoryOrderStore::new();
        let err = store
            .order_create(&RequestId::parse("r-2").unwrap(), &[item(999, 1)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UpkeepError::Order(OrderError::SparePartsNotFound { .. })
        ));
    }
}
