//! Shared fixtures: a journal client over the in-memory backend and a small
//! seeded data set.

#![allow(dead_code)]

use neuronek_db::prelude::*;
use serde_json::{Value as Json, json};

pub type TestClient = Client<MemoryBackend>;

pub fn client() -> TestClient {
    Client::new(MemoryBackend::new(), journal::registry().unwrap())
}

pub fn client_with(config: ClientConfig) -> TestClient {
    client().with_config(config)
}

/// Runs a JSON descriptor and unwraps the result
pub async fn run(client: &TestClient, model: &str, action: &str, args: Json) -> Json {
    client
        .execute_json(model, action, &args)
        .await
        .unwrap_or_else(|e| panic!("{model}.{action} failed: {e}"))
        .into_json()
}

/// Runs a JSON descriptor that is expected to fail
pub async fn fail(client: &TestClient, model: &str, action: &str, args: Json) -> QueryError {
    match client.execute_json(model, action, &args).await {
        Ok(payload) => panic!("{model}.{action} unexpectedly returned {payload}"),
        Err(e) => e,
    }
}

pub fn ids(records: &Json) -> Vec<&str> {
    records
        .as_array()
        .expect("a list payload")
        .iter()
        .map(|r| r["id"].as_str().expect("a string id"))
        .collect()
}

/// Caffeine and Ethanol, each with an oral route and two dosages
pub async fn seed_substances(client: &TestClient) {
    for (id, name, class) in [
        ("sub-caffeine", "Caffeine", Json::from("stimulant")),
        ("sub-ethanol", "Ethanol", Json::from("depressant")),
        ("sub-melatonin", "Melatonin", Json::Null),
    ] {
        run(
            client,
            "Substance",
            "create",
            json!({ "data": { "id": id, "name": name, "psychoactive_class": class } }),
        )
        .await;
    }

    for (id, substance) in [("roa-caffeine-oral", "Caffeine"), ("roa-ethanol-oral", "Ethanol")] {
        run(
            client,
            "RouteOfAdministration",
            "create",
            json!({
                "data": {
                    "id": id,
                    "name": "oral",
                    "bioavailability": 99.0,
                    "substance": { "connect": { "name": substance } }
                }
            }),
        )
        .await;
    }

    for (id, route, intensivity, min, max) in [
        ("dose-caffeine-light", "roa-caffeine-oral", "light", 20.0, 50.0),
        ("dose-caffeine-common", "roa-caffeine-oral", "common", 50.0, 150.0),
        ("dose-ethanol-light", "roa-ethanol-oral", "light", 10.0, 20.0),
        ("dose-ethanol-strong", "roa-ethanol-oral", "strong", 40.0, 70.0),
    ] {
        run(
            client,
            "Dosage",
            "create",
            json!({
                "data": {
                    "id": id,
                    "intensivity": intensivity,
                    "amount_min": min,
                    "amount_max": max,
                    "unit": "mg",
                    "route_of_administration": { "connect": { "id": route } }
                }
            }),
        )
        .await;
    }
}

/// An account with one subject
pub async fn seed_subject(client: &TestClient) {
    run(
        client,
        "Account",
        "create",
        json!({ "data": { "id": "acc-1", "username": "neo", "password": "hunter2" } }),
    )
    .await;
    run(
        client,
        "Subject",
        "create",
        json!({
            "data": {
                "id": "subj-1",
                "firstName": "Thomas",
                "weight": 70.0,
                "account": { "connect": { "id": "acc-1" } }
            }
        }),
    )
    .await;
}

/// Ingestions of the seeded subject: three caffeine, one ethanol
pub async fn seed_ingestions(client: &TestClient) {
    for (id, substance, amount) in [
        ("ing-1", "Caffeine", Json::from(100.0)),
        ("ing-2", "Caffeine", Json::from(50.0)),
        ("ing-3", "Ethanol", Json::from(20.0)),
        ("ing-4", "Caffeine", Json::Null),
    ] {
        run(
            client,
            "Ingestion",
            "create",
            json!({
                "data": {
                    "id": id,
                    "routeOfAdministration": "oral",
                    "dosage_unit": "mg",
                    "dosage_amount": amount,
                    "substance": { "connect": { "name": substance } },
                    "subject": { "connect": { "id": "subj-1" } }
                }
            }),
        )
        .await;
    }
}
