use std::time::Duration;

use common::*;
use neuronek_db::prelude::*;
use serde_json::json;

mod common;

fn account(username: &str) -> Operation {
    Operation::Create(CreateArgs::new(
        WriteData::new().set("username", username).set("password", "x"),
    ))
}

#[tokio::test]
async fn batch_returns_one_result_per_operation() {
    let client = client();
    seed_subject(&client).await;

    let results = client
        .batch(vec![
            BatchOperation::new("Account", account("trinity")),
            BatchOperation::new(
                "Subject",
                Operation::Create(CreateArgs::new(
                    WriteData::new()
                        .set("firstName", "Morpheus")
                        .set("weight", 95.0),
                )),
            ),
            BatchOperation::new(
                "Subject",
                Operation::Update(UpdateArgs::new(
                    Filter::equals("id", "subj-1"),
                    WriteData::new().increment("weight", 1.5),
                )),
            ),
        ])
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].get("username").unwrap(), "trinity");
    assert_eq!(results[1].get("firstName").unwrap(), "Morpheus");
    assert_eq!(results[2].get("weight").unwrap(), 71.5);
    assert_eq!(client.backend().len("Account").await, 2);
    assert_eq!(client.backend().len("Subject").await, 2);
}

#[tokio::test]
async fn batch_operations_read_the_state_before_the_batch() {
    let client = client();
    seed_subject(&client).await;

    let results = client
        .batch(vec![
            BatchOperation::new("Account", account("trinity")),
            BatchOperation::new("Account", Operation::Count(CountArgs::default())),
            BatchOperation::new(
                "Account",
                Operation::FindMany(FindManyArgs::new().order_by(OrderBy::asc("username"))),
            ),
        ])
        .await
        .unwrap();

    assert_eq!(results[1].as_u64(), Some(1));
    let usernames: Vec<_> = results[2]
        .as_json()
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["username"].clone())
        .collect();
    assert_eq!(usernames, [json!("neo")]);

    // committed together once the batch is done
    assert_eq!(run(&client, "Account", "count", json!({})).await, 2);
}

#[tokio::test]
async fn batch_operations_cannot_connect_to_each_others_rows() {
    let client = client();

    let err = client
        .batch(vec![
            BatchOperation::new("Account", account("neo")),
            BatchOperation::new(
                "Subject",
                Operation::Create(CreateArgs::new(
                    WriteData::new()
                        .set("firstName", "Thomas")
                        .connect("account", Filter::equals("username", "neo")),
                )),
            ),
        ])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(client.backend().len("Account").await, 0);
    assert_eq!(client.backend().len("Subject").await, 0);
}

#[tokio::test]
async fn batch_is_all_or_nothing() {
    let client = client();

    let err = client
        .batch(vec![
            BatchOperation::new("Account", account("neo")),
            BatchOperation::new("Account", account("trinity")),
            BatchOperation::new("Account", account("neo")),
        ])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert_eq!(client.backend().len("Account").await, 0);
}

#[tokio::test]
async fn batch_failure_in_the_middle_discards_earlier_and_later_writes() {
    let client = client();
    seed_substances(&client).await;

    let err = client
        .batch(vec![
            BatchOperation::new("Account", account("neo")),
            BatchOperation::new("Account", account("neo")),
            BatchOperation::new("Account", account("trinity")),
            BatchOperation::new(
                "Substance",
                Operation::DeleteMany(DeleteManyArgs::default()),
            ),
        ])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert_eq!(client.backend().len("Account").await, 0);
    assert_eq!(client.backend().len("Substance").await, 3);
}

#[tokio::test]
async fn interactive_transaction_commits_on_ok() {
    let client = client();

    let seen = client
        .transaction(TransactionOptions::default(), async |tx| {
            tx.model("Account").create(CreateArgs::new(
                WriteData::new().set("username", "neo").set("password", "x"),
            ))
            .await?;
            tx.model("Account").count(CountArgs::default()).await
        })
        .await
        .unwrap();

    assert_eq!(seen.as_u64(), Some(1));
    assert_eq!(client.backend().len("Account").await, 1);
}

#[tokio::test]
async fn interactive_transaction_rolls_back_on_err() {
    let client = client();

    let err = client
        .transaction(TransactionOptions::default(), async |tx| {
            tx.execute("Account", &account("neo")).await?;
            Err::<(), _>(QueryError::validation("changed my mind"))
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(client.backend().len("Account").await, 0);
}

#[tokio::test]
async fn timeout_rolls_back() {
    let client = client();
    let options = TransactionOptions::default().timeout(Duration::from_millis(50));

    let err = client
        .transaction(options, async |tx| {
            tx.execute("Account", &account("neo")).await?;
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransactionAborted);
    assert!(!err.is_retryable());
    assert_eq!(client.backend().len("Account").await, 0);
}

#[tokio::test]
async fn max_wait_bounds_the_start_of_a_transaction() {
    let client = client();
    let patient = TransactionOptions::default().timeout(Duration::from_secs(2));
    let impatient = TransactionOptions::default().max_wait(Duration::from_millis(20));

    let (first, second) = tokio::join!(
        client.transaction(patient, async |tx| {
            tx.execute("Account", &account("neo")).await?;
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        }),
        client.transaction(impatient, async |tx| {
            tx.execute("Account", &account("trinity")).await?;
            Ok(())
        }),
    );

    first.unwrap();
    assert_eq!(second.unwrap_err().kind(), ErrorKind::TransactionAborted);
    assert_eq!(client.backend().len("Account").await, 1);
}

#[tokio::test]
async fn transactions_accept_any_isolation_level() {
    let client = client();
    let options = TransactionOptions::default().isolation_level(IsolationLevel::ReadCommitted);

    let username = client
        .transaction(options, async |tx| {
            let created = tx
                .model("Account")
                .json("create", &json!({ "data": { "username": "neo", "password": "x" } }))
                .await?;
            Ok(created.get("username").cloned())
        })
        .await
        .unwrap();
    assert_eq!(username, Some(json!("neo")));
}

#[tokio::test]
async fn writes_outside_transactions_are_atomic() {
    let client = client();
    seed_substances(&client).await;

    // The route moves to Ethanol, which already has an oral route; the
    // compound unique check fails after the substance lookup succeeded.
    let err = fail(
        &client,
        "RouteOfAdministration",
        "update",
        json!({
            "where": { "id": "roa-caffeine-oral" },
            "data": { "bioavailability": 50.0, "substance": { "connect": { "name": "Ethanol" } } }
        }),
    )
    .await;
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);

    let route = run(
        &client,
        "RouteOfAdministration",
        "findUnique",
        json!({ "where": { "id": "roa-caffeine-oral" } }),
    )
    .await;
    assert_eq!(route["bioavailability"], 99.0);
    assert_eq!(route["substanceName"], "Caffeine");
}
