//! Property tests for paging, filter composition and set blanks.

mod common;

use common::{Customer, config, registry, store};
use entitylayer::{compile::FilterRequest, filter::FilterDescription};
use proptest::prelude::*;
use serde_json::json;

const CITIES: [&str; 3] = ["Oslo", "Bergen", "Tromsø"];

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn customers(rows: &[(u8, Option<usize>)]) -> Vec<Customer> {
    rows.iter()
        .enumerate()
        .map(|(index, (balance, city))| {
            Customer::new(
                &format!("customer-{index:03}"),
                None,
                city.map(|c| CITIES[c]),
                f64::from(*balance),
            )
            .with_id()
        })
        .collect()
}

fn balance_above(threshold: u8) -> FilterDescription {
    serde_json::from_value(json!({ "filterType": "number", "type": "greaterThan", "filter": threshold })).unwrap()
}

fn city_in(city: usize) -> FilterDescription {
    serde_json::from_value(json!({ "filterType": "set", "values": [CITIES[city], "(Blanks)"] })).unwrap()
}

fn rows() -> impl Strategy<Value = Vec<(u8, Option<usize>)>> {
    prop::collection::vec((any::<u8>(), prop::option::of(0..CITIES.len())), 0..40)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn first_page_holds_min_of_size_and_total(rows in rows(), size in 1i64..50) {
        runtime().block_on(async {
            let store = store();
            let repository = store.repository::<Customer>(config(), registry());
            let total = rows.len();
            if total > 0 {
                repository.collection().insert(customers(&rows)).await.unwrap();
            }

            let page = repository.find_page(&FilterRequest::new(0, size)).await.unwrap();

            prop_assert_eq!(page.page_size, (size as usize).min(total));
            prop_assert_eq!(page.total_elements, total as u64);
            Ok(())
        })?;
    }

    #[test]
    fn removing_a_filter_never_shrinks_the_match_set(
        rows in rows(),
        threshold in any::<u8>(),
        city in 0..CITIES.len(),
    ) {
        runtime().block_on(async {
            let store = store();
            let repository = store.repository::<Customer>(config(), registry());
            if !rows.is_empty() {
                repository.collection().insert(customers(&rows)).await.unwrap();
            }

            let both = FilterRequest::new(0, 100)
                .with_filter("balance", balance_above(threshold))
                .with_filter("city", city_in(city));
            let only_balance = FilterRequest::new(0, 100).with_filter("balance", balance_above(threshold));
            let only_city = FilterRequest::new(0, 100).with_filter("city", city_in(city));

            let both = repository.find_page(&both).await.unwrap();
            let only_balance = repository.find_page(&only_balance).await.unwrap();
            let only_city = repository.find_page(&only_city).await.unwrap();

            prop_assert!(both.total_elements <= only_balance.total_elements);
            prop_assert!(both.total_elements <= only_city.total_elements);
            for customer in &both.items {
                prop_assert!(only_balance.items.contains(customer));
                prop_assert!(only_city.items.contains(customer));
            }
            Ok(())
        })?;
    }

    #[test]
    fn blank_sentinel_matches_every_entity_without_a_city(rows in rows(), city in 0..CITIES.len()) {
        runtime().block_on(async {
            let store = store();
            let repository = store.repository::<Customer>(config(), registry());
            if !rows.is_empty() {
                repository.collection().insert(customers(&rows)).await.unwrap();
            }

            let request = FilterRequest::new(0, 100).with_filter("city", city_in(city));
            let page = repository.find_page(&request).await.unwrap();

            let expected = rows
                .iter()
                .filter(|(_, c)| c.is_none() || *c == Some(city))
                .count();
            prop_assert_eq!(page.total_elements, expected as u64);
            Ok(())
        })?;
    }
}
