use geomap::{CellEntry, CoveringOptions, GeoMapReader, GeoMapWriter, Point, Rect};
use s2::cellid::CellID;
use s2::latlng::LatLng;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn cell_at(lat: f64, lng: f64, level: u8) -> CellEntry {
    let leaf = CellID::from(&LatLng::from_degrees(lat, lng));
    CellEntry::from_cell_id(leaf.parent(u64::from(level)))
}

fn nyc(level: u8) -> CellEntry {
    cell_at(40.7128, -74.0060, level)
}

fn keys(result: &[bytes::Bytes]) -> Vec<String> {
    result
        .iter()
        .map(|k| String::from_utf8_lossy(k).into_owned())
        .collect()
}

/// A handful of cities, each stored at a few levels.
fn city_records() -> Vec<(String, Vec<CellEntry>)> {
    let cities = [
        ("new-york", 40.7128, -74.0060),
        ("london", 51.5074, -0.1278),
        ("tokyo", 35.6762, 139.6503),
        ("sydney", -33.8688, 151.2093),
        ("sao-paulo", -23.5505, -46.6333),
    ];
    let mut records = Vec::new();
    for (name, lat, lng) in cities {
        for level in [6u8, 11, 17] {
            records.push((format!("{}-{}", name, level), vec![cell_at(lat, lng, level)]));
        }
    }
    records
}

fn build(dir: &TempDir, range: u8, records: &[(String, Vec<CellEntry>)]) -> PathBuf {
    let path = dir.path().join(format!("index-{}.geomap", range));
    let mut writer = GeoMapWriter::new(range).expect("Failed to create writer");
    for (key, covering) in records {
        writer.write(covering, key).expect("Failed to write record");
    }
    writer.build(&path).expect("Failed to build index");
    path
}

#[test]
fn test_nested_cells_scenario() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scenario.geomap");

    let a = nyc(10);
    let b = nyc(12);
    let mut writer = GeoMapWriter::new(3).unwrap();
    writer.write(&[a], "k1").unwrap();
    writer.write(&[b], "k2").unwrap();
    writer.build(&path).unwrap();

    let reader = GeoMapReader::open(&path).unwrap();
    assert_eq!(reader.contains(&[b]).unwrap(), vec!["k1", "k2"]);
    assert_eq!(reader.contains(&[a]).unwrap(), vec!["k1"]);
    assert_eq!(reader.intersects(&[a]).unwrap(), vec!["k1", "k2"]);
    assert_eq!(reader.intersects(&[b]).unwrap(), vec!["k1", "k2"]);
}

#[test]
fn test_every_record_contains_its_own_covering() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let records = city_records();

    for range in [1u8, 2, 3, 5, 8, 31] {
        let reader = GeoMapReader::open(build(&dir, range, &records)).unwrap();
        for (id, (key, covering)) in records.iter().enumerate() {
            let ids = reader.contains_ids(covering).unwrap();
            assert!(ids.contains(id as u64), "range {}: {} missing", range, key);
            assert!(keys(&reader.contains(covering).unwrap()).contains(key));
            assert!(keys(&reader.intersects(covering).unwrap()).contains(key));
        }
    }
}

#[test]
fn test_results_independent_of_bucket_range() {
    let dir = TempDir::new().unwrap();
    let records = city_records();
    let queries = [
        vec![nyc(20)],
        vec![nyc(11)],
        vec![nyc(3)],
        vec![nyc(14), cell_at(35.6762, 139.6503, 14)],
        vec![cell_at(-33.8688, 151.2093, 9)],
    ];

    let baseline = GeoMapReader::open(build(&dir, 1, &records)).unwrap();
    for range in 2..=31u8 {
        let reader = GeoMapReader::open(build(&dir, range, &records)).unwrap();
        for query in &queries {
            assert_eq!(
                reader.contains(query).unwrap(),
                baseline.contains(query).unwrap(),
                "range {}",
                range
            );
            assert_eq!(
                reader.intersects(query).unwrap(),
                baseline.intersects(query).unwrap(),
                "range {}",
                range
            );
        }
    }
}

#[test]
fn test_adding_query_cells_is_monotonic() {
    let dir = TempDir::new().unwrap();
    let reader = GeoMapReader::open(build(&dir, 3, &city_records())).unwrap();

    let small = vec![nyc(18)];
    let large = vec![nyc(18), cell_at(51.5074, -0.1278, 18)];

    let contains_small = reader.contains_ids(&small).unwrap();
    let contains_large = reader.contains_ids(&large).unwrap();
    assert!(contains_large.is_subset(&contains_small));

    let intersects_small = reader.intersects_ids(&small).unwrap();
    let intersects_large = reader.intersects_ids(&large).unwrap();
    assert!(intersects_small.is_subset(&intersects_large));
    assert!(intersects_large.len() > intersects_small.len());
}

#[test]
fn test_adding_ancestor_query_cell_is_monotonic() {
    let dir = TempDir::new().unwrap();
    let reader = GeoMapReader::open(build(&dir, 3, &city_records())).unwrap();

    let small = vec![nyc(18)];
    let widened = vec![nyc(18), nyc(12)];

    let contains_small = reader.contains_ids(&small).unwrap();
    let contains_widened = reader.contains_ids(&widened).unwrap();
    assert!(contains_widened.is_subset(&contains_small));
    // new-york-17 lies under nyc(12) but does not contain it
    assert!(contains_widened.len() < contains_small.len());

    let intersects_small = reader.intersects_ids(&small).unwrap();
    let intersects_widened = reader.intersects_ids(&widened).unwrap();
    assert!(intersects_small.is_subset(&intersects_widened));
    assert_eq!(
        keys(&reader.intersects(&widened).unwrap()),
        vec!["new-york-6", "new-york-11", "new-york-17"]
    );
}

#[test]
fn test_identical_inputs_give_identical_files_and_answers() {
    let dir = TempDir::new().unwrap();
    let records = city_records();

    let first = build(&dir, 4, &records);
    let second = dir.path().join("copy.geomap");
    std::fs::rename(&first, &second).unwrap();
    let first = build(&dir, 4, &records);
    assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());

    let a = GeoMapReader::open(&first).unwrap();
    let b = GeoMapReader::open(&second).unwrap();
    let query = [nyc(4)];
    assert_eq!(a.intersects(&query).unwrap(), b.intersects(&query).unwrap());
    assert_eq!(a.intersects(&query).unwrap(), a.intersects(&query).unwrap());
}

#[test]
fn test_concurrent_readers_share_one_index() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let records = city_records();
    let reader = Arc::new(GeoMapReader::open(build(&dir, 3, &records)).unwrap());
    let expected = reader.contains(&[nyc(20)]).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let reader = Arc::clone(&reader);
            let records = records.clone();
            thread::spawn(move || {
                for (key, covering) in &records {
                    let found = reader.intersects(covering).unwrap();
                    assert!(found.iter().any(|k| k.as_ref() == key.as_bytes()));
                }
                reader.contains(&[nyc(20)]).unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
    let stats = reader.stats();
    assert!(stats.key_table_loaded);
    assert!(stats.cached_buckets as u64 <= stats.bucket_count);
}

#[test]
fn test_region_queries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("regions.geomap");

    let mut writer = GeoMapWriter::new(3).unwrap();
    let manhattan = Rect::new(
        geo::coord! { x: -74.03, y: 40.70 },
        geo::coord! { x: -73.93, y: 40.80 },
    );
    writer.write_rect(&manhattan, "manhattan").unwrap();
    writer
        .write_point(&Point::new(-0.1278, 51.5074), "london")
        .unwrap();
    writer.build(&path).unwrap();

    let reader = GeoMapReader::open(&path).unwrap();
    let inside = Point::new(-73.9855, 40.7580);
    assert_eq!(reader.contains_point(&inside, 20).unwrap(), vec!["manhattan"]);

    let options = CoveringOptions::new(4, 12, 8);
    let around_london = Rect::new(
        geo::coord! { x: -0.5, y: 51.3 },
        geo::coord! { x: 0.3, y: 51.7 },
    );
    assert_eq!(
        reader.intersects_rect(&around_london, &options).unwrap(),
        vec!["london"]
    );
    assert!(
        reader
            .contains_rect(&around_london, &options)
            .unwrap()
            .is_empty()
    );
}
