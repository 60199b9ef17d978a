use chrono::NaiveDate;
use rust_decimal::Decimal;

use askdb::connection::{QueryResult, SqlValue};
use askdb::query::{classify, format_number, NumberLocale, ViewingType};

fn result(columns: &[&str], rows: Vec<Vec<SqlValue>>) -> QueryResult {
    QueryResult::new(columns.iter().map(|c| c.to_string()).collect(), rows)
}

#[test]
fn test_empty_result_is_a_table() {
    let empty = result(&["total"], vec![]);

    let c = classify(&empty, "SELECT SUM(total) FROM orders WHERE 1 = 0", NumberLocale::EnUs);
    assert_eq!(c.viewing_type, ViewingType::Table);
    assert_eq!(c.formatted_value, None);
}

#[test]
fn test_aggregate_with_many_rows_is_a_number() {
    let rows = result(
        &["n", "region"],
        vec![
            vec![SqlValue::Int(12000), SqlValue::Text("north".into())],
            vec![SqlValue::Int(7), SqlValue::Text("south".into())],
        ],
    );

    for sql in [
        "SELECT COUNT(*) AS n, region FROM orders GROUP BY region",
        "select count(id) as n, region from orders group by region",
        "SELECT Count(*) n, region FROM orders GROUP BY region",
    ] {
        let c = classify(&rows, sql, NumberLocale::EnUs);
        assert_eq!(c.viewing_type, ViewingType::Number, "{}", sql);
        assert_eq!(c.formatted_value.as_deref(), Some("12,000.00"));
    }
}

#[test]
fn test_aggregate_marker_needs_numeric_first_value() {
    let rows = result(
        &["region", "n"],
        vec![
            vec![SqlValue::Text("north".into()), SqlValue::Int(3)],
            vec![SqlValue::Text("south".into()), SqlValue::Int(4)],
        ],
    );

    let c = classify(&rows, "SELECT region, COUNT(*) FROM orders GROUP BY region", NumberLocale::EnUs);
    assert_eq!(c.viewing_type, ViewingType::Table);
}

#[test]
fn test_plain_multi_row_result_is_a_table() {
    let rows = result(
        &["id", "total"],
        vec![
            vec![SqlValue::Int(1), SqlValue::Float(19.5)],
            vec![SqlValue::Int(2), SqlValue::Float(5.0)],
        ],
    );

    // "amount(" is not an aggregate marker.
    let c = classify(&rows, "SELECT id, total FROM orders WHERE discount_amount(id) > 0", NumberLocale::EnUs);
    assert_eq!(c.viewing_type, ViewingType::Table);
}

#[test]
fn test_single_numeric_value_without_aggregate() {
    let one = result(&["total"], vec![vec![SqlValue::Decimal(Decimal::new(-9876543, 2))]]);

    let c = classify(&one, "SELECT total FROM orders WHERE id = 9", NumberLocale::DeDe);
    assert_eq!(c.viewing_type, ViewingType::Number);
    assert_eq!(c.formatted_value.as_deref(), Some("-98.765,43"));
}

#[test]
fn test_single_non_numeric_values_are_labels() {
    let when = NaiveDate::from_ymd_opt(2024, 5, 31)
        .unwrap()
        .and_hms_opt(23, 59, 0)
        .unwrap();
    let c = classify(
        &result(&["placed_at"], vec![vec![SqlValue::DateTime(when)]]),
        "SELECT MAX(placed_at) FROM orders",
        NumberLocale::EnUs,
    );
    assert_eq!(c.viewing_type, ViewingType::Label);
    assert!(c.formatted_value.unwrap().starts_with("2024-05-31"));

    let c = classify(
        &result(&["active"], vec![vec![SqlValue::Bool(true)]]),
        "SELECT active FROM customers WHERE id = 1",
        NumberLocale::EnUs,
    );
    assert_eq!(c.viewing_type, ViewingType::Label);
    assert_eq!(c.formatted_value.as_deref(), Some("true"));
}

#[test]
fn test_rounding_is_half_away_from_zero() {
    assert_eq!(format_number(&SqlValue::Decimal(Decimal::new(1005, 3)), NumberLocale::EnUs), "1.01");
    assert_eq!(format_number(&SqlValue::Decimal(Decimal::new(-1005, 3)), NumberLocale::EnUs), "-1.01");
    assert_eq!(format_number(&SqlValue::Int(1_000_000), NumberLocale::FrFr), "1\u{202f}000\u{202f}000,00");
    assert_eq!(format_number(&SqlValue::Text("n/a".into()), NumberLocale::EnUs), "n/a");
}

#[test]
fn test_locale_names() {
    assert_eq!("en-US".parse::<NumberLocale>().unwrap(), NumberLocale::EnUs);
    assert_eq!("de_DE".parse::<NumberLocale>().unwrap(), NumberLocale::DeDe);
    assert_eq!("FR".parse::<NumberLocale>().unwrap(), NumberLocale::FrFr);
    assert_eq!("".parse::<NumberLocale>().unwrap(), NumberLocale::Invariant);
    assert!("xx-YY".parse::<NumberLocale>().is_err());
}
