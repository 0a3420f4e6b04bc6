// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use std::{io, time::Duration};

use csv_import::{
    read_csv, Charset, ColumnData, CsvError, CsvSpecs, CustomParser, CustomParserFactory,
    DataType, DefaultSinkFactory, DoubleParser, Parser, Table, NULL_BOOLEAN_AS_BYTE, NULL_DOUBLE,
    NULL_INT, NULL_LONG,
};

fn read(specs: &CsvSpecs, input: &'static str) -> Table {
    let _ = env_logger::builder().is_test(true).try_init();
    read_csv(specs, input.as_bytes(), Box::new(DefaultSinkFactory::new()))
        .expect("read should succeed")
}

fn read_err(specs: &CsvSpecs, input: &'static str) -> CsvError {
    read_csv(specs, input.as_bytes(), Box::new(DefaultSinkFactory::new()))
        .expect_err("read should fail")
}

fn defaults() -> CsvSpecs {
    CsvSpecs::builder().build().unwrap()
}

#[test]
fn mixed_numeric_inference_elects_double() {
    let specs = CsvSpecs::builder()
        .parsers(Parser::complete_set())
        .build()
        .unwrap();
    let table = read(&specs, "V\n\n0\n1\n300\n100000\n3000000000\n1234.5678\n");
    assert_eq!(table.num_rows, 7);
    let col = table.column("V").unwrap();
    assert_eq!(col.data_type, DataType::Double);
    match &col.data {
        ColumnData::Double(v) => assert_eq!(
            v,
            &[
                NULL_DOUBLE,
                0.0,
                1.0,
                300.0,
                100000.0,
                3000000000.0,
                1234.5678,
            ],
        ),
        other => panic!("unexpected column: {other:?}"),
    }
}

#[test]
fn quoted_newline_stays_in_cell() {
    let table = read(&defaults(), "A,B\n\"hello\nworld\",2\n");
    assert_eq!(table.num_rows, 1);
    match &table.column("A").unwrap().data {
        ColumnData::String(v) => assert_eq!(v, &[Some("hello\nworld".to_string())]),
        other => panic!("unexpected column: {other:?}"),
    }
    match &table.column("B").unwrap().data {
        ColumnData::Int(v) => assert_eq!(v, &[2]),
        other => panic!("unexpected column: {other:?}"),
    }
}

#[test]
fn missing_closing_quote_is_a_tokenization_error() {
    let err = read_err(&defaults(), "Col\n\"unterminated\n");
    assert!(err
        .to_string()
        .contains("Cell did not have closing quote character"));
}

fn string_column(table: &Table, name: &str) -> Vec<String> {
    match &table.column(name).unwrap().data {
        ColumnData::String(v) => v
            .iter()
            .map(|s| s.clone().expect("unexpected null"))
            .collect(),
        other => panic!("unexpected column: {other:?}"),
    }
}

#[test]
fn fixed_width_utf32_vs_utf16() {
    let input = "Sym   Type\n🥰😻🧡💓💕💖Dividend\nZ     Dividend\n";

    let specs = CsvSpecs::builder()
        .has_fixed_width_columns(true)
        .use_utf32_counting_convention(true)
        .build()
        .unwrap();
    let table = read(&specs, input);
    assert_eq!(string_column(&table, "Sym"), ["🥰😻🧡💓💕💖", "Z"]);
    assert_eq!(string_column(&table, "Type"), ["Dividend", "Dividend"]);

    let specs = CsvSpecs::builder()
        .has_fixed_width_columns(true)
        .use_utf32_counting_convention(false)
        .build()
        .unwrap();
    let table = read(&specs, input);
    assert_eq!(string_column(&table, "Sym"), ["🥰😻🧡", "Z"]);
    assert_eq!(string_column(&table, "Type"), ["💓💕💖Dividend", "Dividend"]);
}

#[test]
fn short_rows_pad_with_nulls() {
    let specs = CsvSpecs::builder()
        .allow_missing_columns(true)
        .build()
        .unwrap();
    let table = read(
        &specs,
        "A,B,C,D\n-3,foo,1.2,false\n4,bar,3.4,true\n-5\n",
    );
    assert_eq!(table.num_rows, 3);

    let a = table.column("A").unwrap();
    assert_eq!(a.data_type, DataType::Int);
    match &a.data {
        ColumnData::Int(v) => assert_eq!(v, &[-3, 4, -5]),
        other => panic!("unexpected column: {other:?}"),
    }

    let b = table.column("B").unwrap();
    assert_eq!(b.data_type, DataType::String);
    match &b.data {
        ColumnData::String(v) => assert_eq!(
            v,
            &[Some("foo".to_string()), Some("bar".to_string()), None],
        ),
        other => panic!("unexpected column: {other:?}"),
    }

    let c = table.column("C").unwrap();
    assert_eq!(c.data_type, DataType::Double);
    match &c.data {
        ColumnData::Double(v) => assert_eq!(v, &[1.2, 3.4, NULL_DOUBLE]),
        other => panic!("unexpected column: {other:?}"),
    }

    let d = table.column("D").unwrap();
    assert_eq!(d.data_type, DataType::BooleanAsByte);
    match &d.data {
        ColumnData::BooleanAsByte(v) => assert_eq!(v, &[0, 1, NULL_BOOLEAN_AS_BYTE]),
        other => panic!("unexpected column: {other:?}"),
    }
}

#[test]
fn reserved_sentinel_promotes_to_long() {
    let table = read(&defaults(), "V\n-2147483648\n");
    let col = table.column("V").unwrap();
    assert_eq!(col.data_type, DataType::Long);
    match &col.data {
        ColumnData::Long(v) => assert_eq!(v, &[NULL_INT as i64]),
        other => panic!("unexpected column: {other:?}"),
    }
}

#[test]
fn concurrent_and_single_threaded_agree() {
    let input = "N,S,D,T,B\n\
        1,alpha,1.5,1970-01-01T00:00:01Z,true\n\
        ,beta,2.25,1970-01-01T00:00:02Z,false\n\
        3000000000,\"quoted,comma\",-0.5,1970-01-01T00:00:03Z,TRUE\n";
    let concurrent = read(&defaults(), input);
    let specs = CsvSpecs::builder().concurrent(false).build().unwrap();
    let single = read(&specs, input);
    assert_eq!(format!("{concurrent:?}"), format!("{single:?}"));
}

#[test]
fn datetime_column_is_nanos_since_epoch() {
    let table = read(&defaults(), "When\n1970-01-01T00:00:01Z\n1970-01-01 00:00:02\n\n");
    let col = table.column("When").unwrap();
    assert_eq!(col.data_type, DataType::DateTimeAsLong);
    match &col.data {
        ColumnData::DateTimeAsLong(v) => {
            assert_eq!(v, &[1_000_000_000, 2_000_000_000, NULL_LONG])
        }
        other => panic!("unexpected column: {other:?}"),
    }
}

#[test]
fn timestamp_parser_assigned_per_column() {
    let specs = CsvSpecs::builder()
        .parsers_for_name("Ts", vec![Parser::TimestampMillis])
        .build()
        .unwrap();
    let table = read(&specs, "Ts,V\n1500,7\n2500,8\n");
    let ts = table.column("Ts").unwrap();
    assert_eq!(ts.data_type, DataType::TimestampAsLong);
    match &ts.data {
        ColumnData::TimestampAsLong(v) => assert_eq!(v, &[1_500_000_000, 2_500_000_000]),
        other => panic!("unexpected column: {other:?}"),
    }
    assert_eq!(table.column("V").unwrap().data_type, DataType::Int);
}

#[test]
fn null_literals_can_be_customized_per_column() {
    let specs = CsvSpecs::builder()
        .null_literals(vec!["".to_string(), "NULL".to_string()])
        .null_literals_for_name("B", vec!["minus".to_string()])
        .build()
        .unwrap();
    let table = read(&specs, "A,B\nNULL,minus\n4,5\n");
    match &table.column("A").unwrap().data {
        ColumnData::Int(v) => assert_eq!(v, &[NULL_INT, 4]),
        other => panic!("unexpected column: {other:?}"),
    }
    match &table.column("B").unwrap().data {
        ColumnData::Int(v) => assert_eq!(v, &[NULL_INT, 5]),
        other => panic!("unexpected column: {other:?}"),
    }
}

#[test]
fn headers_can_be_overridden_and_legalized() {
    let specs = CsvSpecs::builder()
        .headers(Some(vec!["Px Close".to_string(), "Qty!".to_string()]))
        .header_legalizer(|name: &str| {
            name.chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect()
        })
        // The original name stays the override key.
        .parsers_for_name("Qty!", vec![Parser::String])
        .build()
        .unwrap();
    let table = read(&specs, "ignored,also\n1.5,2\n");
    assert_eq!(table.columns()[0].name, "Px_Close");
    assert_eq!(table.columns()[1].name, "Qty_");
    assert_eq!(table.columns()[1].data_type, DataType::String);
}

#[test]
fn skip_and_limit_rows() {
    let specs = CsvSpecs::builder()
        .skip_rows(2)
        .num_rows(Some(2))
        .build()
        .unwrap();
    let table = read(&specs, "V\n1\n2\n3\n4\n5\n");
    assert_eq!(table.num_rows, 2);
    match &table.column("V").unwrap().data {
        ColumnData::Int(v) => assert_eq!(v, &[3, 4]),
        other => panic!("unexpected column: {other:?}"),
    }
}

#[test]
fn skip_header_rows_before_the_header() {
    let specs = CsvSpecs::builder().skip_header_rows(2).build().unwrap();
    let table = read(&specs, "garbage line\nanother\nV\n9\n");
    assert_eq!(table.num_rows, 1);
    assert_eq!(table.columns()[0].name, "V");
}

#[test]
fn trailing_empty_surplus_cell_is_elided() {
    let table = read(&defaults(), "A,B\n1,2,\n3,4,\n");
    assert_eq!(table.columns().len(), 2);
    match &table.column("B").unwrap().data {
        ColumnData::Int(v) => assert_eq!(v, &[2, 4]),
        other => panic!("unexpected column: {other:?}"),
    }

    let err = read_err(&defaults(), "A,B\n1,2,\n3,4,5\n");
    assert!(err
        .to_string()
        .contains("Column assumed empty but contains data"));
}

#[test]
fn row_shape_errors_carry_physical_line_numbers() {
    let err = read_err(&defaults(), "A,B\n1,2\n3\n");
    assert_eq!(
        err.to_string(),
        "Row 3 has too few columns (expected 2)",
    );

    let err = read_err(&defaults(), "A,B\n\"x\ny\",2\n1,2,3\n");
    // The quoted newline makes the bad row physical line 4.
    assert_eq!(
        err.to_string(),
        "Row 4 has too many columns (expected 2)",
    );
}

#[test]
fn excess_columns_can_be_ignored() {
    let specs = CsvSpecs::builder()
        .ignore_excess_columns(true)
        .build()
        .unwrap();
    let table = read(&specs, "A,B\n1,2,3,4\n");
    assert_eq!(table.columns().len(), 2);
    match &table.column("B").unwrap().data {
        ColumnData::Int(v) => assert_eq!(v, &[2]),
        other => panic!("unexpected column: {other:?}"),
    }
}

#[test]
fn empty_lines_skipped_or_nulled() {
    let specs = CsvSpecs::builder().ignore_empty_lines(true).build().unwrap();
    let table = read(&specs, "V\n1\n\n2\n");
    match &table.column("V").unwrap().data {
        ColumnData::Int(v) => assert_eq!(v, &[1, 2]),
        other => panic!("unexpected column: {other:?}"),
    }

    let table = read(&defaults(), "V\n1\n\n2\n");
    match &table.column("V").unwrap().data {
        ColumnData::Int(v) => assert_eq!(v, &[1, NULL_INT, 2]),
        other => panic!("unexpected column: {other:?}"),
    }
}

#[test]
fn all_null_column_needs_a_null_parser() {
    let err = read_err(&defaults(), "A,B\n,1\n,2\n");
    let msg = err.to_string();
    assert!(msg.contains("Column contains all null cells"));
    assert!(msg.contains("nullParser is not specified"));
    assert!(msg.contains("\"A\""), "names the column: {msg}");

    let specs = CsvSpecs::builder()
        .null_parser(Some(Parser::Long))
        .build()
        .unwrap();
    let table = read(&specs, "A,B\n,1\n,2\n");
    let a = table.column("A").unwrap();
    assert_eq!(a.data_type, DataType::Long);
    match &a.data {
        ColumnData::Long(v) => assert_eq!(v, &[NULL_LONG, NULL_LONG]),
        other => panic!("unexpected column: {other:?}"),
    }
}

#[test]
fn empty_parser_list_reports_no_available_parsers() {
    let specs = CsvSpecs::builder().parsers(Vec::new()).build().unwrap();
    let err = read_err(&specs, "A\n1\n");
    assert!(err.to_string().contains("No available parsers."));
}

#[test]
fn non_numeric_parser_exhaustion_names_the_row() {
    let specs = CsvSpecs::builder()
        .parsers_for_name("C", vec![Parser::Char])
        .build()
        .unwrap();
    let err = read_err(&specs, "C\na\nxy\n");
    let msg = err.to_string();
    assert!(msg.contains("column \"C\""), "{msg}");
    assert!(
        msg.contains("all configured parsers failed to parse the cell at data row 2"),
        "{msg}",
    );
}

/// Serves its buffer, then blocks for longer than any test deadline. The
/// tokenizer has no cancellation check inside a pending read, which is
/// exactly the worker-ignores-cancellation case the shutdown deadline
/// exists for.
struct StallingReader {
    data: Vec<u8>,
    pos: usize,
}

impl io::Read for StallingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.data.len() {
            std::thread::sleep(Duration::from_secs(60));
            return Ok(0);
        }
        let n = (self.data.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[test]
fn shutdown_timeout_wraps_the_root_cause() {
    // Column V is restricted to int and faults on "x" as soon as the first
    // dense-storage block seals; the input source then blocks, so the
    // tokenizer never reports back and the coordinator gives up at the
    // deadline with the column error as the root cause.
    let mut data = b"V\nx\n".to_vec();
    let filler = vec![b'y'; 1000];
    for _ in 0..1150 {
        data.extend_from_slice(&filler);
        data.push(b'\n');
    }

    let specs = CsvSpecs::builder()
        .parsers_for_name("V", vec![Parser::Int])
        .thread_shutdown_timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let err = read_csv(
        &specs,
        StallingReader { data, pos: 0 },
        Box::new(DefaultSinkFactory::new()),
    )
    .expect_err("read should fail");

    assert!(
        err.to_string().contains("Failed to shutdown all threads"),
        "{err}",
    );
    match err {
        CsvError::Shutdown(shutdown) => {
            assert_eq!(shutdown.timeout, Duration::from_millis(100));
            assert!(
                shutdown
                    .root
                    .to_string()
                    .contains("no char/string parsers available"),
                "{}",
                shutdown.root,
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn numeric_without_fallback_reports_exhaustion() {
    let specs = CsvSpecs::builder()
        .parsers(vec![Parser::Int, Parser::Long])
        .build()
        .unwrap();
    let err = read_err(&specs, "A\n1\n2\nx\n");
    let msg = err.to_string();
    assert!(
        msg.contains(
            "Consumed 2 numeric items, then encountered a non-numeric item but there are no char/string parsers available."
        ),
        "{msg}",
    );
}

#[test]
fn char_column_accepts_only_bmp_scalars() {
    let table = read(&defaults(), "C\na\nb\né\n");
    assert_eq!(table.column("C").unwrap().data_type, DataType::Char);

    // Outside the BMP disqualifies the cell from the char parser.
    let table = read(&defaults(), "C\na\n🥰\n");
    assert_eq!(table.column("C").unwrap().data_type, DataType::String);
}

#[test]
fn inference_is_stable_under_concatenation() {
    let half = "V\n1\n2\n";
    let whole = "V\n1\n2\n1\n2\n";
    let first = read(&defaults(), half);
    let both = read(&defaults(), whole);
    assert_eq!(
        first.column("V").unwrap().data_type,
        both.column("V").unwrap().data_type,
    );
}

struct SemverParser;

impl CustomParserFactory for SemverParser {
    fn name(&self) -> &str {
        "semver"
    }

    fn make(&self) -> Box<dyn CustomParser> {
        Box::new(SemverColumn(Vec::new()))
    }
}

struct SemverColumn(Vec<Option<(u32, u32, u32)>>);

impl CustomParser for SemverColumn {
    fn try_cell(&mut self, cell: &str) -> bool {
        let mut parts = cell.splitn(3, '.').map(|p| p.parse::<u32>().ok());
        match (parts.next(), parts.next(), parts.next()) {
            (Some(Some(a)), Some(Some(b)), Some(Some(c))) => {
                self.0.push(Some((a, b, c)));
                true
            }
            _ => false,
        }
    }

    fn append_null(&mut self) {
        self.0.push(None);
    }

    fn finish(&mut self) -> Box<dyn std::any::Any + Send> {
        Box::new(std::mem::take(&mut self.0))
    }
}

#[test]
fn user_parsers_win_at_their_list_position() {
    let specs = CsvSpecs::builder()
        .parsers(vec![
            Parser::Int,
            Parser::Custom(std::sync::Arc::new(SemverParser)),
            Parser::String,
        ])
        .build()
        .unwrap();
    let table = read(&specs, "Ver\n1.2.3\n\n4.5.6\n");
    let col = table.column("Ver").unwrap();
    assert_eq!(col.data_type, DataType::Custom);
    match &col.data {
        ColumnData::Custom(data) => {
            let versions = data
                .downcast_ref::<Vec<Option<(u32, u32, u32)>>>()
                .expect("semver payload");
            assert_eq!(versions, &[Some((1, 2, 3)), None, Some((4, 5, 6))]);
        }
        other => panic!("unexpected column: {other:?}"),
    }
}

struct CommaDecimal;

impl DoubleParser for CommaDecimal {
    fn parse_ascii(&self, cell: &[u8]) -> Option<f64> {
        let text = std::str::from_utf8(cell).ok()?;
        self.parse_str(text)
    }

    fn parse_str(&self, cell: &str) -> Option<f64> {
        cell.replace(',', ".").parse().ok()
    }
}

#[test]
fn custom_double_parser_replaces_the_builtin() {
    let specs = CsvSpecs::builder()
        .delimiter(b';')
        .custom_double_parser(CommaDecimal)
        .build()
        .unwrap();
    let table = read(&specs, "V\n1,5\n2,25\n");
    let col = table.column("V").unwrap();
    assert_eq!(col.data_type, DataType::Double);
    match &col.data {
        ColumnData::Double(v) => assert_eq!(v, &[1.5, 2.25]),
        other => panic!("unexpected column: {other:?}"),
    }
}

#[test]
fn utf16_input_is_transcoded() {
    let mut bytes = vec![0xFE, 0xFF];
    for unit in "V\n1\n2\n".encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    let specs = CsvSpecs::builder().charset(Charset::Utf16).build().unwrap();
    let table = read_csv(&specs, std::io::Cursor::new(bytes), Box::new(DefaultSinkFactory::new()))
        .unwrap();
    match &table.column("V").unwrap().data {
        ColumnData::Int(v) => assert_eq!(v, &[1, 2]),
        other => panic!("unexpected column: {other:?}"),
    }
}

#[test]
fn tab_separated_values() {
    let specs = CsvSpecs::builder().delimiter(b'\t').build().unwrap();
    let table = read(&specs, "A\tB\n1\tx\n2\ty\n");
    match &table.column("A").unwrap().data {
        ColumnData::Int(v) => assert_eq!(v, &[1, 2]),
        other => panic!("unexpected column: {other:?}"),
    }
    assert_eq!(string_column(&table, "B"), ["x", "y"]);
}

#[test]
fn lossless_string_round_trip() {
    // Every cell quoted; the string column reproduces the cell bodies
    // after quote stripping.
    let table = read(&defaults(), "S\n\"a\"\n\"b,c\"\n\"d\"\"e\"\n\"\nf\"\n");
    assert_eq!(
        string_column(&table, "S"),
        ["a", "b,c", "d\"e", "\nf"],
    );
}

#[test]
fn no_header_names_are_generated() {
    let specs = CsvSpecs::builder().has_header_row(false).build().unwrap();
    let table = read(&specs, "1,x\n2,y\n");
    assert_eq!(table.columns()[0].name, "Column1");
    assert_eq!(table.columns()[1].name, "Column2");
    assert_eq!(table.num_rows, 2);
}

#[test]
fn surrounding_spaces_and_trim() {
    let specs = CsvSpecs::builder()
        .ignore_surrounding_spaces(true)
        .trim(true)
        .build()
        .unwrap();
    let table = read(&specs, "A,B\n  7  , \" padded \" \n");
    match &table.column("A").unwrap().data {
        ColumnData::Int(v) => assert_eq!(v, &[7]),
        other => panic!("unexpected column: {other:?}"),
    }
    assert_eq!(string_column(&table, "B"), ["padded"]);
}
