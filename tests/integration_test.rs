use recfile::codec::{compress, decompress};
use recfile::recovery::{self, RecoveryQuality};
use recfile::{
    decode, encode, read_file, write_file, CodecId, ContainerReader, ContainerWriter, CreateMode,
    DataFileReader, DataFileWriter, Error, Record, Result, Schema, SpecificRecord, Value, WriteOptions,
};
use proptest::prelude::*;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Cursor, Seek, SeekFrom, Write};
use tempfile::{tempdir, NamedTempFile};

const USER_SCHEMA: &str = r#"{
    "type": "record",
    "name": "User",
    "namespace": "com.example.models",
    "fields": [
        {"name": "id", "type": "int"},
        {"name": "username", "type": "string"},
        {"name": "sex", "type": ["null", "string"], "default": null}
    ]
}"#;

fn user_schema() -> Schema {
    Schema::parse_str(USER_SCHEMA).unwrap()
}

fn user(id: i32, name: &str, sex: Option<&str>) -> Value {
    let mut r = Record::new();
    r.put("id", id).put("username", name).put("sex", sex);
    r.into()
}

fn users(range: std::ops::Range<i32>) -> Vec<Value> {
    range.map(|i| user(i, &format!("user{i}"), (i % 2 == 0).then_some("F"))).collect()
}

#[test]
fn test_concrete_user_scenario() {
    let schema = user_schema();
    let v = user(1, "abc", None);
    let bytes = encode(&schema, &v).unwrap();
    assert_eq!(bytes, vec![0x02, 0x06, b'a', b'b', b'c', 0x00]);
    assert_eq!(decode(&schema, &schema, &bytes).unwrap(), v);
}

#[test]
fn test_added_field_with_default() {
    let v2 = Schema::parse_str(r#"{"type":"record","name":"User","namespace":"com.example.models","fields":[
        {"name":"id","type":"int"},
        {"name":"username","type":"string"},
        {"name":"sex","type":["null","string"],"default":null},
        {"name":"email","type":["null","string"],"default":null},
        {"name":"score","type":"double","default":1.5}]}"#).unwrap();
    let bytes = encode(&user_schema(), &user(7, "x", Some("M"))).unwrap();
    let out = decode(&user_schema(), &v2, &bytes).unwrap().into_record().unwrap();
    assert_eq!(out.get("email"), Some(&Value::Null));
    assert_eq!(out.get("score"), Some(&Value::Double(1.5)));
    assert_eq!(out.get("sex"), Some(&Value::String("M".into())));
}

#[test]
fn test_removed_field_is_dropped() {
    let v0 = Schema::parse_str(r#"{"type":"record","name":"User","namespace":"com.example.models",
        "fields":[{"name":"username","type":"string"}]}"#).unwrap();
    let bytes = encode(&user_schema(), &user(7, "x", Some("M"))).unwrap();
    let out = decode(&user_schema(), &v0, &bytes).unwrap().into_record().unwrap();
    assert_eq!(out.field_names().collect::<Vec<_>>(), vec!["username"]);
}

#[test]
fn test_numeric_promotion_in_record() {
    let wide = Schema::parse_str(r#"{"type":"record","name":"User","namespace":"com.example.models","fields":[
        {"name":"id","type":"double"},{"name":"username","type":"string"}]}"#).unwrap();
    let bytes = encode(&user_schema(), &user(-42, "x", None)).unwrap();
    let out = decode(&user_schema(), &wide, &bytes).unwrap().into_record().unwrap();
    assert_eq!(out.get("id"), Some(&Value::Double(-42.0)));

    let long = encode(&Schema::Int, &Value::Int(i32::MAX)).unwrap();
    assert_eq!(decode(&Schema::Int, &Schema::Long, &long).unwrap(), Value::Long(i32::MAX as i64));
}

#[test]
fn test_schema_text_roundtrip() {
    let schema = Schema::parse_str(r#"{"type":"record","name":"Order","namespace":"shop","fields":[
        {"name":"id","type":"long"},
        {"name":"status","type":{"type":"enum","name":"Status","symbols":["NEW","PAID"],"default":"NEW"}},
        {"name":"digest","type":{"type":"fixed","name":"Md5","size":16}},
        {"name":"lines","type":{"type":"array","items":{"type":"record","name":"Line","fields":[
            {"name":"sku","type":"string"},{"name":"qty","type":"int","default":1}]}}},
        {"name":"tags","type":{"type":"map","values":"string"}},
        {"name":"prev","type":["null","Md5"],"default":null}]}"#).unwrap();
    let text = schema.to_string();
    assert_eq!(Schema::parse_str(&text).unwrap(), schema);
}

#[test]
fn test_container_append_n_plus_m() {
    let tmp = NamedTempFile::new().unwrap();
    let opts = WriteOptions::default().with_codec("deflate").with_block_max_records(16);

    {
        let file = OpenOptions::new().read(true).write(true).open(tmp.path()).unwrap();
        let mut w = ContainerWriter::new(user_schema(), file, &opts).unwrap();
        w.extend(&users(0..50)).unwrap();
        w.close().unwrap();
    }
    {
        let file = OpenOptions::new().read(true).write(true).open(tmp.path()).unwrap();
        let mut w = ContainerWriter::append_to(file, &opts).unwrap();
        w.extend(&users(50..75)).unwrap();
        w.close().unwrap();
    }

    let values: Vec<Value> = ContainerReader::new(File::open(tmp.path()).unwrap())
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(values, users(0..75));
}

#[test]
fn test_datafile_append_keeps_sync_marker() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("users.rec");
    write_file(&path, user_schema(), &users(0..3), &WriteOptions::default()).unwrap();
    let sync = DataFileReader::open(&path).unwrap().header().sync;

    let mut w = DataFileWriter::open_append(&path, &WriteOptions::default()).unwrap();
    assert_eq!(w.header().sync, sync);
    w.append(&user(3, "late", None)).unwrap();
    w.close().unwrap();

    let all = read_file(&path, None).unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[3], user(3, "late", None));
}

#[test]
fn test_corrupted_sync_marker_is_detected() {
    let opts = WriteOptions::default().with_block_max_records(10);
    let mut w = ContainerWriter::new(user_schema(), Vec::new(), &opts).unwrap();
    w.extend(&users(0..30)).unwrap();
    let mut bytes = w.close().unwrap();

    // The sync marker of the first block ends 16 bytes before the second
    // block; the file's last 16 bytes are the last block's sync.
    let sync = ContainerReader::new(Cursor::new(bytes.clone())).unwrap().header().sync;
    let header_len = bytes.windows(16).position(|w| w == sync).unwrap() + 16;
    let first_block_sync = header_len
        + bytes[header_len..].windows(16).position(|w| w == sync).unwrap();
    bytes[first_block_sync + 5] ^= 0x01;

    let mut r = ContainerReader::new(Cursor::new(bytes)).unwrap();
    let mut ok = 0;
    let err = loop {
        match r.next_record() {
            Ok(Some(_)) => ok += 1,
            Ok(None) => panic!("corruption went unnoticed"),
            Err(e) => break e,
        }
    };
    assert!(matches!(err, Error::CorruptContainer { .. }), "{err:?}");
    // Records are decoded lazily only after the block's sync checks out.
    assert_eq!(ok, 0);
}

#[test]
fn test_compression_invertibility_edge_buffers() {
    let large: Vec<u8> = (0..1_000_000u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8).collect();
    for id in CodecId::ALL {
        for input in [&[][..], &[0x7f][..], &large[..]] {
            let packed = compress(id.name(), input).unwrap();
            assert_eq!(decompress(id.name(), &packed).unwrap(), input, "codec {id}");
        }
    }
}

#[test]
fn test_recursive_schema_through_container() {
    let schema = Schema::parse_str(r#"{"type":"record","name":"Tree","fields":[
        {"name":"label","type":"string"},
        {"name":"children","type":{"type":"array","items":"Tree"}}]}"#).unwrap();
    let leaf = |l: &str| -> Value {
        let mut r = Record::new();
        r.put("label", l).put("children", Value::Array(vec![]));
        r.into()
    };
    let mut root = Record::new();
    root.put("label", "root").put("children", Value::Array(vec![leaf("a"), leaf("b")]));
    let root = Value::Record(root);

    let mut w = ContainerWriter::new(schema, Vec::new(), &WriteOptions::default().with_codec("zstd")).unwrap();
    w.append(&root).unwrap();
    let bytes = w.close().unwrap();
    let mut r = ContainerReader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(r.next_record().unwrap(), Some(root));
}

#[test]
fn test_writer_lock_exclusive_and_released_on_drop() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("locked.rec");
    {
        let _w = DataFileWriter::create(&path, user_schema(), &WriteOptions::default()).unwrap();
        let err = DataFileWriter::create(&path, user_schema(), &WriteOptions::default()).err().unwrap();
        assert!(matches!(err, Error::WriterBusy { .. }));
    }
    // Dropped without close: lock released, header flushed.
    let w = DataFileWriter::open_append(&path, &WriteOptions::default()).unwrap();
    drop(w);
    assert!(read_file(&path, None).unwrap().is_empty());
}

#[test]
fn test_create_new_refuses_existing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("once.rec");
    let opts = WriteOptions::default().with_create_mode(CreateMode::CreateNew);
    write_file(&path, user_schema(), &users(0..2), &opts).unwrap();
    assert!(DataFileWriter::create(&path, user_schema(), &opts).is_err());
    assert_eq!(read_file(&path, None).unwrap(), users(0..2));

    // The default mode replaces the file.
    write_file(&path, user_schema(), &users(5..6), &WriteOptions::default()).unwrap();
    assert_eq!(read_file(&path, None).unwrap(), users(5..6));
}

#[test]
fn test_recovery_after_corrupted_block() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("damaged.rec");
    let opts = WriteOptions::default().with_block_max_records(5);
    write_file(&path, user_schema(), &users(0..20), &opts).unwrap();

    let clean = recovery::scan_file(&path).unwrap();
    assert_eq!(clean.quality, RecoveryQuality::Full);
    assert_eq!(clean.recoverable_records, 20);

    // Replace the second block's size varint with a bogus, far too large one.
    let second = clean.block_log[1].offset;
    let mut f = OpenOptions::new().write(true).open(&path).unwrap();
    f.seek(SeekFrom::Start(second + 1)).unwrap();
    f.write_all(&[0xfe, 0xff, 0xff, 0x7f]).unwrap();
    drop(f);

    assert!(read_file(&path, None).is_err());
    let report = recovery::scan_file(&path).unwrap();
    assert_eq!(report.healthy_blocks, 3);
    assert_eq!(report.recoverable_records, 15);
    assert_eq!(report.quality, RecoveryQuality::Partial);

    let salvaged = dir.path().join("salvaged.rec");
    let out = File::create(&salvaged).unwrap();
    let mut src = File::open(&path).unwrap();
    recovery::extract_recoverable(&mut src, out, &WriteOptions::default()).unwrap();
    let values = read_file(&salvaged, None).unwrap();
    let expected: Vec<Value> = users(0..5).into_iter().chain(users(10..20)).collect();
    assert_eq!(values, expected);
}

#[test]
fn test_reader_schema_from_file_with_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("users.rec");
    write_file(&path, user_schema(), &users(0..4), &WriteOptions::default().with_codec("snappy")).unwrap();

    let v2 = Schema::parse_str(r#"{"type":"record","name":"User","namespace":"com.example.models","fields":[
        {"name":"id","type":"long"},
        {"name":"username","type":"string"},
        {"name":"country","type":"string","default":"IN"}]}"#).unwrap();
    let values = read_file(&path, Some(&v2)).unwrap();
    assert_eq!(values.len(), 4);
    let first = values[0].as_record().unwrap();
    assert_eq!(first.get("id"), Some(&Value::Long(0)));
    assert_eq!(first.get("country"), Some(&Value::String("IN".into())));
    assert!(first.get("sex").is_none());
}

#[derive(Debug, Clone, PartialEq)]
struct Reading {
    sensor: String,
    value:  f64,
    tags:   HashMap<String, String>,
}

impl SpecificRecord for Reading {
    fn schema() -> Schema {
        Schema::parse_str(r#"{"type":"record","name":"Reading","fields":[
            {"name":"sensor","type":"string"},
            {"name":"value","type":"double"},
            {"name":"tags","type":{"type":"map","values":"string"},"default":{}}]}"#).unwrap()
    }

    fn to_record(&self) -> Record {
        let tags = self.tags.iter().map(|(k, v)| (k.clone(), Value::from(v.as_str()))).collect();
        let mut r = Record::new();
        r.put("sensor", self.sensor.as_str()).put("value", self.value).put("tags", Value::Map(tags));
        r
    }

    fn from_record(r: Record) -> Result<Self> {
        let tags = match r.get("tags") {
            Some(Value::Map(m)) => m
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => Ok((k.clone(), s.clone())),
                    other => Err(Error::IncompatibleSchema(format!("tag {k} is {}", other.kind()))),
                })
                .collect::<Result<_>>()?,
            _ => HashMap::new(),
        };
        Ok(Reading { sensor: r.get_as("sensor")?, value: r.get_as("value")?, tags })
    }
}

#[test]
fn test_specific_records_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("readings.rec");
    let readings: Vec<Reading> = (0..5)
        .map(|i| Reading {
            sensor: format!("s{i}"),
            value:  i as f64 * 0.5,
            tags:   [("unit".to_owned(), "C".to_owned())].into_iter().collect(),
        })
        .collect();

    let mut w = DataFileWriter::create(&path, Reading::schema(), &WriteOptions::default()).unwrap();
    for r in &readings {
        w.append_specific(r).unwrap();
    }
    w.close().unwrap();

    let mut r = DataFileReader::open(&path).unwrap();
    let mut back = Vec::new();
    while let Some(reading) = r.next_specific::<Reading>().unwrap() {
        back.push(reading);
    }
    assert_eq!(back, readings);
}

#[test]
fn test_not_a_container() {
    let tmp = NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"PK\x03\x04 definitely not ours").unwrap();
    assert!(matches!(DataFileReader::open(tmp.path()), Err(Error::InvalidMagic)));
}

// ── Properties ───────────────────────────────────────────────────────────────

fn arb_user() -> impl Strategy<Value = Value> {
    (any::<i32>(), ".{0,24}", proptest::option::of("[a-zA-Z]{1,3}"))
        .prop_map(|(id, name, sex)| user(id, &name, sex.as_deref()))
}

fn arb_measurement() -> impl Strategy<Value = Value> {
    (
        any::<i64>(),
        any::<f64>().prop_filter("NaN never compares equal", |f| !f.is_nan()),
        any::<bool>(),
        proptest::collection::vec(any::<u8>(), 0..32),
        proptest::collection::hash_map("[a-z]{1,6}", any::<i32>(), 0..5),
        0..3usize,
    )
        .prop_map(|(ts, reading, ok, blob, counters, level)| {
            let mut r = Record::new();
            r.put("ts", ts)
                .put("reading", reading)
                .put("ok", ok)
                .put("blob", blob)
                .put("counters", Value::Map(counters.into_iter().map(|(k, v)| (k, Value::Int(v))).collect()))
                .put("level", Value::Enum(["LOW", "MID", "HIGH"][level].to_owned()));
            r.into()
        })
}

fn measurement_schema() -> Schema {
    Schema::parse_str(r#"{"type":"record","name":"Measurement","fields":[
        {"name":"ts","type":"long"},
        {"name":"reading","type":"double"},
        {"name":"ok","type":"boolean"},
        {"name":"blob","type":"bytes"},
        {"name":"counters","type":{"type":"map","values":"int"}},
        {"name":"level","type":{"type":"enum","name":"Level","symbols":["LOW","MID","HIGH"]}}]}"#).unwrap()
}

proptest! {
    #[test]
    fn prop_user_roundtrip(v in arb_user()) {
        let s = user_schema();
        let bytes = encode(&s, &v).unwrap();
        prop_assert_eq!(decode(&s, &s, &bytes).unwrap(), v);
    }

    #[test]
    fn prop_measurement_roundtrip(v in arb_measurement()) {
        let s = measurement_schema();
        let bytes = encode(&s, &v).unwrap();
        prop_assert_eq!(decode(&s, &s, &bytes).unwrap(), v);
    }

    #[test]
    fn prop_container_roundtrip(vs in proptest::collection::vec(arb_user(), 0..40), block in 1usize..8) {
        let opts = WriteOptions::default().with_codec("lz4").with_block_max_records(block);
        let mut w = ContainerWriter::new(user_schema(), Vec::new(), &opts).unwrap();
        w.extend(&vs).unwrap();
        let bytes = w.close().unwrap();
        let back: Vec<Value> = ContainerReader::new(Cursor::new(bytes)).unwrap().collect::<Result<_>>().unwrap();
        prop_assert_eq!(back, vs);
    }
}
