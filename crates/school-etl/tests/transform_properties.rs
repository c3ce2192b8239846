//! Property tests for the transformer's result guarantees

use proptest::prelude::*;
use school_etl::models::{Cell, RawPage};
use school_etl::transform::Transformer;
use serde_json::{json, Value};

fn coordinate() -> impl Strategy<Value = Value> {
    prop_oneof![
        (-90.0f64..90.0).prop_map(|f| json!(f.to_string())),
        (-90.0f64..90.0).prop_map(|f| json!(f)),
        Just(json!("")),
        Just(json!("abc")),
        Just(json!("NaN")),
        Just(json!("inf")),
        Just(Value::Null),
    ]
}

fn record() -> impl Strategy<Value = Value> {
    (
        "[0-9]{8}",
        prop_oneof![Just("SMA"), Just("SMP"), Just("SMK"), Just("sma")],
        prop_oneof![Just("N"), Just("S"), Just("N-ACTIVE"), Just("")],
        coordinate(),
        coordinate(),
    )
        .prop_map(|(npsn, bentuk, status, lintang, bujur)| {
            json!({
                "npsn": npsn,
                "sekolah": format!("Sekolah {}", npsn),
                "bentuk": bentuk,
                "status": status,
                "alamat_jalan": "Jl. Merdeka",
                "lintang": lintang,
                "bujur": bujur,
            })
        })
}

/// Pages of records with unique, increasing identifiers
fn school_records(max: usize) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(record(), 0..max).prop_map(|mut records| {
        for (index, record) in records.iter_mut().enumerate() {
            record["npsn"] = json!(format!("{:08}", index));
        }
        records
    })
}

fn page(records: Vec<Value>) -> RawPage {
    RawPage::new(json!({ "dataSekolah": records }))
}

proptest! {
    #[test]
    fn kept_rows_satisfy_filter_and_coordinates(records in school_records(40)) {
        let dataset = Transformer::default().transform(&page(records)).unwrap();

        for row in 0..dataset.len() {
            let bentuk = dataset.value(row, "bentuk").and_then(Cell::as_str);
            let status = dataset.value(row, "status").and_then(Cell::as_str);
            prop_assert_eq!(bentuk, Some("SMA"));
            prop_assert!(status.is_some_and(|s| s.contains('N')));

            let lintang = dataset.value(row, "lintang").and_then(Cell::as_f64);
            let bujur = dataset.value(row, "bujur").and_then(Cell::as_f64);
            prop_assert!(lintang.is_some_and(f64::is_finite));
            prop_assert!(bujur.is_some_and(f64::is_finite));
        }
    }

    #[test]
    fn surviving_rows_keep_source_order(records in school_records(40)) {
        let dataset = Transformer::default().transform(&page(records.clone())).unwrap();

        let kept: Vec<String> = (0..dataset.len())
            .filter_map(|row| dataset.value(row, "npsn").and_then(Cell::as_str).map(String::from))
            .collect();
        let source_order: Vec<String> = records
            .iter()
            .filter_map(|r| r["npsn"].as_str().map(String::from))
            .filter(|npsn| kept.contains(npsn))
            .collect();

        prop_assert_eq!(kept, source_order);
    }

    #[test]
    fn transform_is_deterministic(records in school_records(20)) {
        let transformer = Transformer::default();
        let input = page(records);

        let first = transformer.transform(&input).unwrap();
        let second = transformer.transform(&input).unwrap();

        prop_assert_eq!(first, second);
    }

    #[test]
    fn row_counts_add_up(records in school_records(40)) {
        let (dataset, summary) = Transformer::default()
            .transform_with_summary(&page(records.clone()))
            .unwrap();

        prop_assert_eq!(summary.records_fetched, records.len());
        prop_assert_eq!(summary.rows_kept, dataset.len());
        prop_assert_eq!(
            summary.filtered_out + summary.invalid_coordinates + summary.rows_kept,
            records.len()
        );
    }

    #[test]
    fn derived_address_joins_name_and_street(records in school_records(20)) {
        let dataset = Transformer::default().transform(&page(records)).unwrap();

        for row in 0..dataset.len() {
            let name = dataset.value(row, "sekolah").and_then(Cell::as_str).unwrap_or_default();
            let address = dataset.value(row, "school_address").and_then(Cell::as_str);
            let expected = format!("{} - Jl. Merdeka", name);
            prop_assert_eq!(address, Some(expected.as_str()));
        }
    }
}
