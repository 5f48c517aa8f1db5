//! Tests for the JSON-lines source.

use super::*;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use tempfile::TempDir;

const LINES: &str = concat!(
    r#"{"_index":"products","_type":"item","_id":"1","_source":{"name":"lamp"}}"#,
    "\n",
    "\n",
    r#"{"_index":"products","_source":{"name":"desk"}}"#,
    "\n",
);

async fn collect(source: &mut JsonlFileSource) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    while let Some(doc) = source.next_document().await? {
        docs.push(doc);
    }
    Ok(docs)
}

#[tokio::test]
async fn test_reads_plain_file_and_skips_blank_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("export.jsonl");
    std::fs::write(&path, LINES).unwrap();

    let mut source = JsonlFileSource::open(&path, false).unwrap();
    let docs = collect(&mut source).await.unwrap();

    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].id.as_deref(), Some("1"));
    assert_eq!(docs[0].doc_type.as_deref(), Some("item"));
    assert!(docs[1].id.is_none());
    assert_eq!(docs[1].source["name"], "desk");
    assert_eq!(source.source_type(), "jsonl_file");
    assert!(source.total_hint().is_none());
}

#[tokio::test]
async fn test_reads_gzip_by_extension() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("export.jsonl.gz");
    let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    encoder.write_all(LINES.as_bytes()).unwrap();
    encoder.finish().unwrap();

    let mut source = JsonlFileSource::open(&path, false).unwrap();
    assert_eq!(collect(&mut source).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_malformed_line_reports_line_number() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.jsonl");
    let content = format!("{LINES}{{\"_index\": \n");
    std::fs::write(&path, content).unwrap();

    let mut source = JsonlFileSource::open(&path, false).unwrap();
    let err = collect(&mut source).await.unwrap_err();

    assert!(matches!(&err, Error::Protocol(msg) if msg.contains("line 4")));
}

#[tokio::test]
async fn test_missing_file() {
    let result = JsonlFileSource::open("/nonexistent/export.jsonl", false);
    assert!(matches!(result, Err(Error::Io(_))));
}

#[tokio::test]
async fn test_close_stops_reading() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("export.jsonl");
    std::fs::write(&path, LINES).unwrap();

    let mut source = JsonlFileSource::open(&path, false).unwrap();
    source.close().await.unwrap();
    assert!(source.next_document().await.unwrap().is_none());
}
