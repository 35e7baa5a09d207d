use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::{Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use mrdc_core::{BatchRx, CanonicalTable, Message, Sink, Source, SourceError};
use mrdc_io::{MemorySink, MemorySource, ObjectStoreSource, ParquetDirSink};
use object_store::ObjectStore;
use object_store::memory::InMemory;
use object_store::path::Path;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn collect(mut rx: BatchRx) -> (Vec<RecordBatch>, bool) {
    let mut batches = Vec::new();
    while let Some(msg) = rx.recv().await {
        match msg {
            Message::Batch(b) => batches.push(b),
            Message::Eos => return (batches, true),
        }
    }
    (batches, false)
}

fn canonical() -> CanonicalTable {
    let schema = Arc::new(Schema::new(vec![
        Field::new("order_index", DataType::Int64, false),
        Field::new("store_code", DataType::Utf8, true),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(vec![0, 1, 2])),
            Arc::new(StringArray::from(vec![Some("WEB-1388012W"), None, Some("BL-8387506C")])),
        ],
    )
    .unwrap();
    CanonicalTable::new("orders_table", batch)
}

#[tokio::test]
async fn object_store_csv_is_read_as_text() {
    let store = Arc::new(InMemory::new());
    let body = ",product_name,product_price,weight\n0,Lamp,£85.00,1.2kg\n1,Hat,£9.99,590g\n";
    store
        .put(&Path::from("products.csv"), body.as_bytes().to_vec().into())
        .await
        .unwrap();

    let mut source = ObjectStoreSource::with_store("dim_products", store, "products.csv", 1);
    let (tx, rx) = mpsc::channel(8);
    let (res, (batches, eos)) = tokio::join!(source.run(tx, CancellationToken::new()), collect(rx));
    res.unwrap();
    assert!(eos);
    assert_eq!(batches.len(), 2);
    let weight = batches[0].column_by_name("weight").unwrap().as_string::<i32>();
    assert_eq!(weight.value(0), "1.2kg");
}

#[tokio::test]
async fn object_store_json_frame_is_transposed() {
    let store = Arc::new(InMemory::new());
    let body = r#"{"timestamp": {"0": "22:00:06", "1": "17:29:45"}, "date_uuid": {"0": "a", "1": "b"}}"#;
    store
        .put(&Path::from("date_details.json"), body.as_bytes().to_vec().into())
        .await
        .unwrap();

    let mut source = ObjectStoreSource::with_store("dim_date_times", store, "date_details.json", 1024);
    let (tx, rx) = mpsc::channel(8);
    let (res, (batches, _)) = tokio::join!(source.run(tx, CancellationToken::new()), collect(rx));
    res.unwrap();
    assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 2);
}

#[tokio::test]
async fn missing_object_is_unavailable() {
    let store = Arc::new(InMemory::new());
    let mut source = ObjectStoreSource::with_store("dim_products", store, "nope.csv", 1024);
    let (tx, _rx) = mpsc::channel(8);
    let err = source.run(tx, CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, SourceError::Unavailable(_)));
}

#[tokio::test]
async fn parquet_sink_writes_one_file_per_table() {
    let dir = tempfile::tempdir().unwrap();
    let sink = ParquetDirSink::new(dir.path().to_path_buf());
    let loaded = sink.load(canonical()).await.unwrap();
    assert_eq!(loaded, 3);

    let file = std::fs::File::open(dir.path().join("orders_table.parquet")).unwrap();
    let reader = ParquetRecordBatchReaderBuilder::try_new(file).unwrap().build().unwrap();
    let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
    assert_eq!(rows, 3);
}

#[tokio::test]
async fn memory_sink_stores_and_rejects() {
    let sink = MemorySink::new();
    sink.reject("dim_users");
    assert_eq!(sink.load(canonical()).await.unwrap(), 3);
    assert_eq!(sink.table("orders_table").unwrap().num_rows(), 3);

    let users = CanonicalTable::new("dim_users", canonical().batch);
    assert!(sink.load(users).await.is_err());
    assert_eq!(sink.names(), vec!["orders_table".to_string()]);
}

#[tokio::test]
async fn memory_source_fails_once_then_succeeds() {
    let batch = canonical().batch;
    let mut source = MemorySource::new("orders_table", vec![batch.clone(), batch])
        .fail_after(1, SourceError::Unavailable("connection reset".into()));
    let runs = source.runs();

    let (tx, rx) = mpsc::channel(8);
    let (first, (partial, eos)) = tokio::join!(source.run(tx, CancellationToken::new()), collect(rx));
    assert!(first.unwrap_err().is_transient());
    assert_eq!(partial.len(), 1);
    assert!(!eos);

    let (tx, rx) = mpsc::channel(8);
    let (second, (full, eos)) = tokio::join!(source.run(tx, CancellationToken::new()), collect(rx));
    second.unwrap();
    assert_eq!(full.len(), 2);
    assert!(eos);
    assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 2);
}
