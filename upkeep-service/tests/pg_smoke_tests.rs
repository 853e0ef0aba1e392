//! End-to-end tests against a live PostgreSQL (`--features db-tests`).
#![cfg(feature = "db-tests")]

#[path = "support/db.rs"]
mod test_db;

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use test_db::{test_db_client, unique_request_id, unique_sku};
use upkeep_service::{GuardConfig, OrderService, ServiceResult};
use upkeep_test_utils::{
    fixtures, IdempotencyRecord, IdempotencyStore, InsertOutcome, NewSparePart, OrderStore,
    RequestId, ResponseSnapshot,
};

fn part(name: &str, class: &str, price_cents: i64, stock: i32) -> NewSparePart {
    NewSparePart {
        name: name.to_string(),
        sku: unique_sku(class),
        price_cents,
        stock,
        category_id: None,
    }
}

#[tokio::test]
async fn pg_insert_is_idempotent_until_expiry() -> ServiceResult<()> {
    let db = test_db_client().await;
    let store = db.idempotency_store();
    let request_id = RequestId::parse(unique_request_id("pg-idem"))?;
    let t0 = Utc::now();

    let first = IdempotencyRecord::new(request_id.clone(), fixtures::order_42_snapshot(), t0);
    assert_eq!(
        store.insert(&first, t0 - ChronoDuration::seconds(60)).await?,
        InsertOutcome::Inserted
    );

    let t5 = t0 + ChronoDuration::seconds(5);
    let retry = IdempotencyRecord::new(
        request_id.clone(),
        ResponseSnapshot::from_raw(r#"{"order_id":43}"#),
        t5,
    );
    assert_eq!(
        store.insert(&retry, t5 - ChronoDuration::seconds(60)).await?,
        InsertOutcome::Duplicate
    );
    let stored = store.find(&request_id).await?.expect("record stored");
    assert_eq!(stored.response_snapshot, fixtures::order_42_snapshot());

    let t70 = t0 + ChronoDuration::seconds(70);
    let later = IdempotencyRecord::new(
        request_id.clone(),
        ResponseSnapshot::from_raw(r#"{"order_id":44}"#),
        t70,
    );
    assert_eq!(
        store.insert(&later, t70 - ChronoDuration::seconds(60)).await?,
        InsertOutcome::Inserted
    );
    Ok(())
}

#[tokio::test]
async fn pg_concurrent_inserts_single_winner() -> ServiceResult<()> {
    let db = test_db_client().await;
    let request_id = RequestId::parse(unique_request_id("pg-race"))?;
    let now = Utc::now();

    let mut handles = Vec::new();
    for n in 0..8 {
        let store = db.idempotency_store();
        let record = IdempotencyRecord::new(
            request_id.clone(),
            ResponseSnapshot::from_raw(format!(r#"{{"order_id":{}}}"#, n)),
            now,
        );
        handles.push(tokio::spawn(async move {
            store.insert(&record, now - ChronoDuration::seconds(60)).await
        }));
    }

    let mut inserted = 0;
    for handle in handles {
        if handle.await.expect("task panicked")? == InsertOutcome::Inserted {
            inserted += 1;
        }
    }
    assert_eq!(inserted, 1);
    Ok(())
}

#[tokio::test]
async fn pg_order_service_replays_duplicate_request() -> ServiceResult<()> {
    let db = test_db_client().await;
    let service = OrderService::postgres(
        &db,
        GuardConfig::default().with_order_window(Duration::from_secs(60)),
    );

    let screw = service.register_spare_part(&part("Tornillo", "A", 100, 100)).await?;
    let nut = service.register_spare_part(&part("Tuerca", "B", 50, 200)).await?;
    let request_id = unique_request_id("pg-order");
    let request = fixtures::screws_and_nuts_order(&request_id, screw.id, nut.id);

    let first = service.create_service_order(&request).await?;
    let second = service.create_service_order(&request).await?;

    assert!(!first.is_replay());
    assert!(second.is_replay());
    assert_eq!(first.snapshot().as_bytes(), second.snapshot().as_bytes());
    assert_eq!(first.value().total_cents, 2000);

    let orders = service
        .orders()
        .order_list_by_request(&RequestId::parse(request_id)?)
        .await?;
    assert_eq!(orders.len(), 1);
    assert_eq!(service.get_spare_part(screw.id).await?.stock, 90);
    assert_eq!(service.get_spare_part(nut.id).await?.stock, 180);

    let fetched = service.get_service_order(first.value().id).await?;
    assert_eq!(fetched.items.len(), 2);
    Ok(())
}

#[tokio::test]
async fn pg_insufficient_stock_rolls_back() -> ServiceResult<()> {
    let db = test_db_client().await;
    let service = OrderService::postgres(&db, GuardConfig::default());
    let resistor = service
        .register_spare_part(&part("Resistencia", "C", 25, 5))
        .await?;

    let request = upkeep_test_utils::CreateServiceOrder {
        request_id: unique_request_id("pg-stock"),
        items: vec![upkeep_test_utils::CreateServiceOrderItem {
            spare_part_id: resistor.id,
            quantity: 6,
        }],
    };
    let err = service.create_service_order(&request).await.unwrap_err();
    assert_eq!(err.code, upkeep_service::ErrorCode::InsufficientStock);
    assert_eq!(service.get_spare_part(resistor.id).await?.stock, 5);
    Ok(())
}

#[tokio::test]
async fn pg_spare_part_with_unknown_category_is_not_found() -> ServiceResult<()> {
    let db = test_db_client().await;
    let service = OrderService::postgres(&db, GuardConfig::default());

    let dangling = NewSparePart {
        category_id: Some(i64::MAX),
        ..part("Tornillo", "A", 100, 10)
    };
    let err = service.register_spare_part(&dangling).await.unwrap_err();
    assert_eq!(err.code, upkeep_service::ErrorCode::EntityNotFound);
    assert_eq!(err.status_code(), 404);

    let category = service
        .create_category(&upkeep_test_utils::NewCategory::new(unique_request_id("cat")))
        .await?;
    let stored = service
        .register_spare_part(&NewSparePart {
            category_id: Some(category.id),
            ..dangling
        })
        .await?;
    assert_eq!(stored.category_id, Some(category.id));

    let duplicate = service
        .create_category(&upkeep_test_utils::NewCategory::new(category.name.clone()))
        .await
        .unwrap_err();
    assert_eq!(duplicate.code, upkeep_service::ErrorCode::EntityAlreadyExists);
    Ok(())
}

#[tokio::test]
async fn pg_update_and_list_spare_parts() -> ServiceResult<()> {
    let db = test_db_client().await;
    let service = OrderService::postgres(&db, GuardConfig::default());
    let washer = service.register_spare_part(&part("Arandela", "D", 5, 0)).await?;

    let restocked = service
        .update_spare_part(
            washer.sku.as_str(),
            &upkeep_test_utils::SparePartUpdate::restock(30),
        )
        .await?;
    assert_eq!((restocked.price_cents, restocked.stock), (5, 30));
    assert!(restocked.updated_at.is_some());

    let missing = service
        .update_spare_part("Z-NOP-M1-1", &upkeep_test_utils::SparePartUpdate::restock(1))
        .await
        .unwrap_err();
    assert_eq!(missing.code, upkeep_service::ErrorCode::EntityNotFound);

    let page = service
        .list_spare_parts(upkeep_test_utils::PageRequest::new(0, 1000))
        .await?;
    assert!(page.iter().any(|p| p.id == washer.id));
    assert!(page.windows(2).all(|pair| pair[0].id < pair[1].id));
    assert_eq!(
        service
            .list_spare_parts(upkeep_test_utils::PageRequest::new(0, 1))
            .await?
            .len(),
        1
    );
    Ok(())
}
