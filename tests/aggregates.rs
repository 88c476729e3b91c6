use common::*;
use neuronek_db::prelude::*;
use serde_json::json;

mod common;

async fn journal() -> TestClient {
    let client = client();
    seed_substances(&client).await;
    seed_subject(&client).await;
    seed_ingestions(&client).await;
    client
}

#[tokio::test]
async fn count_rows_and_non_null_fields() {
    let client = journal().await;

    assert_eq!(run(&client, "Ingestion", "count", json!({})).await, 4);
    assert_eq!(
        run(
            &client,
            "Ingestion",
            "count",
            json!({ "where": { "substanceName": "Caffeine" } })
        )
        .await,
        3
    );
    assert_eq!(
        run(
            &client,
            "Ingestion",
            "count",
            json!({ "select": { "_all": true, "dosage_amount": true } })
        )
        .await,
        json!({ "_all": 4, "dosage_amount": 3 })
    );

    let typed = client.model("Ingestion").count(CountArgs::default()).await.unwrap();
    assert_eq!(typed.as_u64(), Some(4));
}

#[tokio::test]
async fn aggregates_ignore_nulls() {
    let client = journal().await;

    let stats = run(
        &client,
        "Ingestion",
        "aggregate",
        json!({
            "_count": true,
            "_min": { "dosage_amount": true },
            "_max": { "dosage_amount": true },
            "_avg": { "dosage_amount": true },
            "_sum": { "dosage_amount": true }
        }),
    )
    .await;
    assert_eq!(stats["_count"], json!({ "_all": 4 }));
    assert_eq!(stats["_min"]["dosage_amount"], 20.0);
    assert_eq!(stats["_max"]["dosage_amount"], 100.0);
    assert_eq!(stats["_sum"]["dosage_amount"], 170.0);
    let avg = stats["_avg"]["dosage_amount"].as_f64().unwrap();
    assert!((avg - 170.0 / 3.0).abs() < 1e-9);

    let empty = run(
        &client,
        "Ingestion",
        "aggregate",
        json!({
            "where": { "substanceName": "Nicotine" },
            "_count": { "dosage_amount": true },
            "_avg": { "dosage_amount": true },
            "_sum": { "dosage_amount": true }
        }),
    )
    .await;
    assert_eq!(
        empty,
        json!({
            "_count": { "dosage_amount": 0 },
            "_avg": { "dosage_amount": null },
            "_sum": { "dosage_amount": null }
        })
    );
}

#[tokio::test]
async fn aggregate_over_a_window() {
    let client = journal().await;

    let top_two = run(
        &client,
        "Ingestion",
        "aggregate",
        json!({
            "orderBy": { "dosage_amount": "desc" },
            "take": 2,
            "_sum": { "dosage_amount": true }
        }),
    )
    .await;
    assert_eq!(top_two["_sum"]["dosage_amount"], 150.0);
}

#[tokio::test]
async fn aggregate_rejects_unsupported_fields() {
    let client = journal().await;

    let err = fail(
        &client,
        "Ingestion",
        "aggregate",
        json!({ "_avg": { "dosage_unit": true } }),
    )
    .await;
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = fail(
        &client,
        "Ingestion",
        "aggregate",
        json!({ "_sum": { "_all": true } }),
    )
    .await;
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn group_by_partitions_rows() {
    let client = journal().await;

    let groups = run(
        &client,
        "Ingestion",
        "groupBy",
        json!({
            "by": ["substanceName"],
            "_count": { "_all": true },
            "_sum": { "dosage_amount": true },
            "orderBy": { "substanceName": "asc" }
        }),
    )
    .await;
    assert_eq!(
        groups,
        json!([
            { "substanceName": "Caffeine", "_count": { "_all": 3 }, "_sum": { "dosage_amount": 150.0 } },
            { "substanceName": "Ethanol", "_count": { "_all": 1 }, "_sum": { "dosage_amount": 20.0 } }
        ])
    );
}

#[tokio::test]
async fn group_by_having_and_aggregate_ordering() {
    let client = journal().await;

    let heavy = run(
        &client,
        "Ingestion",
        "groupBy",
        json!({
            "by": ["substanceName"],
            "having": { "dosage_amount": { "_sum": { "gt": 100 } } }
        }),
    )
    .await;
    assert_eq!(heavy, json!([{ "substanceName": "Caffeine" }]));

    let busiest = run(
        &client,
        "Ingestion",
        "groupBy",
        json!({
            "by": ["substanceName", "dosage_unit"],
            "orderBy": { "_count": { "_all": "desc" } },
            "take": 1
        }),
    )
    .await;
    assert_eq!(busiest, json!([{ "substanceName": "Caffeine", "dosage_unit": "mg" }]));

    let typed = client
        .model("Ingestion")
        .group_by(GroupByArgs::new(["substanceName"]))
        .await
        .unwrap();
    assert_eq!(typed.len(), 2);
}

#[tokio::test]
async fn negated_having_skips_null_aggregates() {
    let client = journal().await;
    run(
        &client,
        "Ingestion",
        "create",
        json!({
            "data": {
                "id": "ing-5",
                "routeOfAdministration": "oral",
                "dosage_unit": "mg",
                "substance": { "connect": { "name": "Melatonin" } }
            }
        }),
    )
    .await;

    let light = run(
        &client,
        "Ingestion",
        "groupBy",
        json!({
            "by": ["substanceName"],
            "having": { "NOT": { "dosage_amount": { "_sum": { "gt": 100 } } } }
        }),
    )
    .await;
    assert_eq!(light, json!([{ "substanceName": "Ethanol" }]));

    let not_operator = run(
        &client,
        "Ingestion",
        "groupBy",
        json!({
            "by": ["substanceName"],
            "having": { "dosage_amount": { "_sum": { "not": { "gt": 100 } } } }
        }),
    )
    .await;
    assert_eq!(not_operator, light);
}

#[tokio::test]
async fn group_by_validation() {
    let client = journal().await;

    for args in [
        json!({ "by": [] }),
        json!({ "by": ["substanceName"], "having": { "dosage_unit": "mg" } }),
        json!({ "by": ["substanceName"], "orderBy": { "dosage_amount": "asc" } }),
        json!({ "by": ["substanceName"], "take": 1 }),
        json!({ "by": ["unknown"] }),
    ] {
        let err = fail(&client, "Ingestion", "groupBy", args).await;
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    let err = fail(&client, "Ingestion", "groupBy", json!({ "_sum": { "dosage_amount": true } })).await;
    assert_eq!(err.kind(), ErrorKind::Validation);
}
