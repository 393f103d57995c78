use std::sync::Arc;
use std::time::Duration;

use changestreams::replay::QueryEvent;
use changestreams::{
    ChangeStreamError, Config, Consumer, ConsumerFn, ReadResult, ReplayQuery, Row, Subscriber,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn child_row(start: &str, children: &[(&str, &[&str])]) -> Row {
    let children: Vec<_> = children
        .iter()
        .map(|(token, parents)| json!({"token": token, "parent_partition_tokens": parents}))
        .collect();
    Row::with_column(
        "ChangeRecord",
        json!([{"child_partitions_record": [{
            "start_timestamp": start,
            "record_sequence": "00000001",
            "child_partitions": children,
        }]}]),
    )
}

fn data_row(commit: &str, table: &str, seq: &str) -> Row {
    Row::with_column(
        "ChangeRecord",
        json!([{"data_change_record": [{
            "commit_timestamp": commit,
            "record_sequence": seq,
            "server_transaction_id": "tx",
            "is_last_record_in_transaction_in_partition": true,
            "table_name": table,
            "column_types": [],
            "mods": [{"keys": {"id": "1"}, "new_values": {"active": true}, "old_values": null}],
            "mod_type": "UPDATE",
            "value_capture_type": "OLD_AND_NEW_VALUES",
            "number_of_records_in_transaction": 1,
            "number_of_partitions_in_transaction": 1,
            "transaction_tag": "",
            "is_system_transaction": false,
        }]}]),
    )
}

/// Collects every result it receives.
#[derive(Default)]
struct Collector {
    results: Mutex<Vec<ReadResult>>,
}

#[async_trait::async_trait]
impl Consumer for Collector {
    async fn consume(&self, result: &ReadResult) -> changestreams::Result<()> {
        self.results.lock().push(result.clone());
        Ok(())
    }
}

impl Collector {
    fn sequences(&self, token: &str) -> Vec<String> {
        self.results
            .lock()
            .iter()
            .filter(|r| r.partition_token == token)
            .flat_map(|r| r.data_change_records().map(|d| d.record_sequence.clone()))
            .collect()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reads_whole_tree() {
    logutil::init_test();

    let query = Arc::new(
        ReplayQuery::new()
            .with_rows(
                "",
                [child_row("2022-12-04T18:00:00Z", &[("a", &[]), ("b", &[])])],
            )
            .with_rows(
                "a",
                [
                    data_row("2022-12-04T18:00:01Z", "Singers", "1"),
                    data_row("2022-12-04T18:00:02Z", "Singers", "2"),
                    data_row("2022-12-04T18:00:03Z", "Singers", "3"),
                    child_row("2022-12-04T18:30:00Z", &[("c", &["a", "b"])]),
                ],
            )
            .with_rows(
                "b",
                [
                    data_row("2022-12-04T18:00:01Z", "Albums", "1"),
                    child_row("2022-12-04T18:30:00Z", &[("c", &["a", "b"])]),
                ],
            )
            .with_rows("c", [data_row("2022-12-04T18:31:00Z", "Albums", "1")]),
    );

    let subscriber = Subscriber::with_config(
        query.clone(),
        "SingersStream",
        Config {
            start_timestamp: Some(ts("2022-12-04T18:00:00Z")),
            end_timestamp: Some(ts("2022-12-04T19:00:00Z")),
            heartbeat_interval: Duration::from_secs(5),
            database_role: Some("analyst".to_string()),
        },
    )
    .unwrap();

    let collector = Arc::new(Collector::default());
    subscriber
        .subscribe(collector.clone(), CancellationToken::new())
        .await
        .unwrap();

    // Rows within a partition arrive in order.
    assert_eq!(vec!["1", "2", "3"], collector.sequences("a"));
    assert_eq!(vec!["1"], collector.sequences("b"));
    assert_eq!(vec!["1"], collector.sequences("c"));
    assert_eq!(1 + 4 + 2 + 1, collector.results.lock().len());

    let statements = query.statements();
    let mut tokens: Vec<_> = statements
        .iter()
        .map(|s| s.partition_token().to_string())
        .collect();
    tokens.sort();
    assert_eq!(vec!["", "a", "b", "c"], tokens);

    for statement in &statements {
        assert_eq!(Some(ts("2022-12-04T19:00:00Z")), statement.params.end_timestamp);
        assert_eq!(5000, statement.params.heartbeat_millis_second);
        assert_eq!(Some("analyst".to_string()), statement.database_role);
        assert!(statement.sql.contains("READ_SingersStream("));
    }

    let root = statements.iter().find(|s| s.partition_token().is_empty()).unwrap();
    assert_eq!(None, root.params.partition_token);
    assert_eq!(ts("2022-12-04T18:00:00Z"), root.params.start_timestamp);

    let c = statements.iter().find(|s| s.partition_token() == "c").unwrap();
    assert_eq!(ts("2022-12-04T18:30:00Z"), c.params.start_timestamp);

    let events = query.events();
    let c_start = events
        .iter()
        .position(|e| *e == QueryEvent::Started("c".to_string()))
        .unwrap();
    for parent in ["a", "b"] {
        let drained = events
            .iter()
            .position(|e| *e == QueryEvent::Drained(parent.to_string()))
            .unwrap();
        assert!(drained < c_start, "{events:?}");
    }
}

#[tokio::test]
async fn root_defaults() {
    let query = Arc::new(ReplayQuery::new());
    let subscriber = Subscriber::new(query.clone(), "s").unwrap();

    let before = Utc::now();
    subscriber
        .subscribe(Arc::new(Collector::default()), CancellationToken::new())
        .await
        .unwrap();
    let after = Utc::now();

    let statements = query.statements();
    assert_eq!(1, statements.len());
    let root = &statements[0];
    assert!(root.params.start_timestamp >= before);
    assert!(root.params.start_timestamp <= after);
    assert_eq!(None, root.params.end_timestamp);
    assert_eq!(None, root.params.partition_token);
    assert_eq!(None, root.database_role);
    assert_eq!(10_000, root.params.heartbeat_millis_second);
}

#[tokio::test]
async fn subscribe_twice() {
    let query = Arc::new(ReplayQuery::new());
    let subscriber = Subscriber::new(query.clone(), "s").unwrap();

    subscriber
        .subscribe(Arc::new(Collector::default()), CancellationToken::new())
        .await
        .unwrap();
    let err = subscriber
        .subscribe(Arc::new(Collector::default()), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ChangeStreamError::AlreadySubscribed));
    // Nothing was queried by the second call.
    assert_eq!(1, query.statements().len());
}

#[tokio::test]
async fn subscribe_concurrently() {
    let query = Arc::new(ReplayQuery::new().with_delay("", Duration::from_millis(50)));
    let subscriber = Subscriber::new(query.clone(), "s").unwrap();

    let (first, second) = tokio::join!(
        subscriber.subscribe(Arc::new(Collector::default()), CancellationToken::new()),
        subscriber.subscribe(Arc::new(Collector::default()), CancellationToken::new()),
    );

    first.unwrap();
    assert!(matches!(second, Err(ChangeStreamError::AlreadySubscribed)));
    assert_eq!(1, query.statements().len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn consumer_error_returned() {
    let query = Arc::new(
        ReplayQuery::new()
            .with_rows("", [child_row("2022-12-04T18:00:00Z", &[("a", &[])])])
            .with_rows(
                "a",
                [
                    data_row("2022-12-04T18:00:01Z", "Singers", "1"),
                    data_row("2022-12-04T18:00:02Z", "Singers", "2"),
                    data_row("2022-12-04T18:00:03Z", "Singers", "3"),
                ],
            ),
    );
    let subscriber = Subscriber::new(query.clone(), "s").unwrap();

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let delivered_clone = delivered.clone();
    let consumer = ConsumerFn(move |result: &ReadResult| {
        for record in result.data_change_records() {
            delivered_clone.lock().push(record.record_sequence.clone());
            if record.record_sequence == "2" {
                return Err(ChangeStreamError::consumer("disk full"));
            }
        }
        Ok(())
    });

    let err = subscriber
        .subscribe(Arc::new(consumer), CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ChangeStreamError::Consumer(inner) => assert_eq!("disk full", inner.to_string()),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(vec!["1", "2"], *delivered.lock());
    assert!(!query.events().contains(&QueryEvent::Drained("a".to_string())));
}

#[tokio::test]
async fn source_error_returned() {
    let query = Arc::new(
        ReplayQuery::new()
            .with_rows("", [child_row("2022-12-04T18:00:00Z", &[("a", &[])])])
            .with_failure("a", "Change stream not found"),
    );
    let subscriber = Subscriber::new(query, "s").unwrap();

    let err = subscriber
        .subscribe(Arc::new(Collector::default()), CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        "failed to query partition 'a': Change stream not found",
        err.to_string()
    );
}

#[tokio::test]
async fn external_cancellation() {
    // Without an end timestamp the source keeps the partition open.
    let query = Arc::new(ReplayQuery::new().with_delay("", Duration::from_secs(3600)));
    let subscriber = Subscriber::new(query, "s").unwrap();

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_clone.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        subscriber.subscribe(Arc::new(Collector::default()), cancel),
    )
    .await
    .expect("subscribe to observe cancellation")
    .unwrap_err();

    assert!(matches!(err, ChangeStreamError::Cancelled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wide_fan_out() {
    let tokens: Vec<String> = (0..64).map(|i| format!("p{i:02}")).collect();
    let root_children: Vec<(&str, &[&str])> =
        tokens.iter().map(|t| (t.as_str(), &[][..])).collect();

    let mut query =
        ReplayQuery::new().with_rows("", [child_row("2022-12-04T18:00:00Z", &root_children)]);
    for token in &tokens {
        query = query.with_rows(
            token.clone(),
            [
                data_row("2022-12-04T18:00:01Z", "Singers", "1"),
                // Every partition merges into "merged".
                child_row("2022-12-04T18:10:00Z", &[("merged", &[])]),
            ],
        );
    }
    let query = Arc::new(query);

    let subscriber = Subscriber::new(query.clone(), "s").unwrap();
    let collector = Arc::new(Collector::default());
    subscriber
        .subscribe(collector.clone(), CancellationToken::new())
        .await
        .unwrap();

    let merged_reads = query
        .statements()
        .iter()
        .filter(|s| s.partition_token() == "merged")
        .count();
    assert_eq!(1, merged_reads);
    assert_eq!(1 + 64 + 1, query.statements().len());
}
