// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use paste::paste;

use crate::{
    errors::SpecError,
    parse::Parser,
    value::{DoubleParser, TimeZoneParser},
};

/// The character set the input bytes are encoded in. The pipeline operates
/// on bytes; inputs in a 16-bit encoding are transcoded to UTF-8 before the
/// tokenizer runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Charset {
    UsAscii,
    Iso8859_1,
    #[default]
    Utf8,
    /// UTF-16 with a byte-order mark; big-endian when the mark is absent.
    Utf16,
    Utf16Be,
    Utf16Le,
}

/// An immutable, validated configuration for [`read_csv`](crate::read_csv).
///
/// Build one with [`CsvSpecs::builder`]. Validation happens once, in
/// [`CsvSpecsBuilder::build`]; a constructed `CsvSpecs` is always internally
/// consistent.
#[derive(Clone)]
pub struct CsvSpecs {
    pub(crate) delimiter: u8,
    pub(crate) quote: u8,
    pub(crate) has_header_row: bool,
    pub(crate) skip_header_rows: u64,
    pub(crate) skip_rows: u64,
    pub(crate) num_rows: Option<u64>,
    pub(crate) headers: Option<Vec<String>>,
    pub(crate) header_legalizer: Option<Arc<dyn Fn(&str) -> String + Send + Sync>>,
    pub(crate) ignore_surrounding_spaces: bool,
    pub(crate) trim: bool,
    pub(crate) ignore_empty_lines: bool,
    pub(crate) allow_missing_columns: bool,
    pub(crate) ignore_excess_columns: bool,
    pub(crate) null_literals: Vec<String>,
    pub(crate) null_literals_for_name: HashMap<String, Vec<String>>,
    pub(crate) null_literals_for_index: HashMap<usize, Vec<String>>,
    pub(crate) parsers: Vec<Parser>,
    pub(crate) parsers_for_name: HashMap<String, Vec<Parser>>,
    pub(crate) parsers_for_index: HashMap<usize, Vec<Parser>>,
    pub(crate) null_parser: Option<Parser>,
    pub(crate) custom_double_parser: Option<Arc<dyn DoubleParser>>,
    pub(crate) custom_time_zone_parser: Option<Arc<dyn TimeZoneParser>>,
    pub(crate) has_fixed_width_columns: bool,
    pub(crate) fixed_column_widths: Vec<usize>,
    pub(crate) use_utf32_counting_convention: bool,
    pub(crate) concurrent: bool,
    pub(crate) thread_shutdown_timeout: Duration,
    pub(crate) charset: Charset,
}

impl CsvSpecs {
    pub fn builder() -> CsvSpecsBuilder {
        CsvSpecsBuilder::default()
    }
}

impl fmt::Debug for CsvSpecs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsvSpecs")
            .field("delimiter", &(self.delimiter as char))
            .field("quote", &(self.quote as char))
            .field("has_header_row", &self.has_header_row)
            .field("skip_header_rows", &self.skip_header_rows)
            .field("skip_rows", &self.skip_rows)
            .field("num_rows", &self.num_rows)
            .field("headers", &self.headers)
            .field("ignore_surrounding_spaces", &self.ignore_surrounding_spaces)
            .field("trim", &self.trim)
            .field("ignore_empty_lines", &self.ignore_empty_lines)
            .field("allow_missing_columns", &self.allow_missing_columns)
            .field("ignore_excess_columns", &self.ignore_excess_columns)
            .field("null_literals", &self.null_literals)
            .field("parsers", &self.parsers)
            .field("null_parser", &self.null_parser)
            .field("has_fixed_width_columns", &self.has_fixed_width_columns)
            .field("fixed_column_widths", &self.fixed_column_widths)
            .field(
                "use_utf32_counting_convention",
                &self.use_utf32_counting_convention,
            )
            .field("concurrent", &self.concurrent)
            .field("thread_shutdown_timeout", &self.thread_shutdown_timeout)
            .field("charset", &self.charset)
            .finish_non_exhaustive()
    }
}

/// A builder for [`CsvSpecs`]. All cross-field validation is deferred to
/// [`build`](CsvSpecsBuilder::build), which reports every failed check at
/// once.
pub struct CsvSpecsBuilder {
    // `None` means not explicitly set; mode cross-checks depend on the
    // distinction, and defaults are applied after validation.
    delimiter: Option<u8>,
    quote: Option<u8>,
    fixed_column_widths: Option<Vec<usize>>,
    use_utf32_counting_convention: Option<bool>,
    specs: CsvSpecs,
}

impl Default for CsvSpecsBuilder {
    fn default() -> Self {
        CsvSpecsBuilder {
            delimiter: None,
            quote: None,
            fixed_column_widths: None,
            use_utf32_counting_convention: None,
            specs: CsvSpecs {
                delimiter: b',',
                quote: b'"',
                has_header_row: true,
                skip_header_rows: 0,
                skip_rows: 0,
                num_rows: None,
                headers: None,
                header_legalizer: None,
                ignore_surrounding_spaces: false,
                trim: false,
                ignore_empty_lines: false,
                allow_missing_columns: false,
                ignore_excess_columns: false,
                null_literals: vec![String::new()],
                null_literals_for_name: HashMap::new(),
                null_literals_for_index: HashMap::new(),
                parsers: Parser::default_set(),
                parsers_for_name: HashMap::new(),
                parsers_for_index: HashMap::new(),
                null_parser: None,
                custom_double_parser: None,
                custom_time_zone_parser: None,
                has_fixed_width_columns: false,
                fixed_column_widths: Vec::new(),
                use_utf32_counting_convention: false,
                concurrent: true,
                thread_shutdown_timeout: Duration::from_secs(60),
                charset: Charset::Utf8,
            },
        }
    }
}

macro_rules! setters(($($field:ident: $ty:ty),* $(,)?) => {
    $(
        #[doc = concat!("Sets `", stringify!($field), "`.")]
        pub fn $field(mut self, value: $ty) -> Self {
            self.specs.$field = value;
            self
        }
    )*
});

macro_rules! per_column(($($base:ident: $value:ty),* $(,)?) => {
    paste! { $(
        #[doc = concat!("Overrides `", stringify!($base), "` for the column with the given")]
        /// original (pre-legalizer) name. A name override takes precedence
        /// over an index override for the same column.
        pub fn [<$base _for_name>](mut self, name: impl Into<String>, value: $value) -> Self {
            self.specs.[<$base _for_name>].insert(name.into(), value);
            self
        }

        #[doc = concat!("Overrides `", stringify!($base), "` for the column at the given")]
        /// zero-based index.
        pub fn [<$base _for_index>](mut self, index: usize, value: $value) -> Self {
            self.specs.[<$base _for_index>].insert(index, value);
            self
        }
    )* }
});

impl CsvSpecsBuilder {
    setters! {
        has_header_row: bool,
        skip_header_rows: u64,
        skip_rows: u64,
        num_rows: Option<u64>,
        headers: Option<Vec<String>>,
        ignore_surrounding_spaces: bool,
        trim: bool,
        ignore_empty_lines: bool,
        allow_missing_columns: bool,
        ignore_excess_columns: bool,
        null_literals: Vec<String>,
        parsers: Vec<Parser>,
        null_parser: Option<Parser>,
        has_fixed_width_columns: bool,
        concurrent: bool,
        thread_shutdown_timeout: Duration,
        charset: Charset,
    }

    per_column! {
        null_literals: Vec<String>,
        parsers: Vec<Parser>,
    }

    /// Sets the field delimiter. Must be an ASCII byte; only meaningful in
    /// delimited mode.
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Sets the quote character. Must be an ASCII byte; only meaningful in
    /// delimited mode.
    pub fn quote(mut self, quote: u8) -> Self {
        self.quote = Some(quote);
        self
    }

    /// Sets a function that rewrites header names into legal column names.
    /// Per-column overrides keep using the original names as keys.
    pub fn header_legalizer(
        mut self,
        legalizer: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.specs.header_legalizer = Some(Arc::new(legalizer));
        self
    }

    /// Sets a custom decimal parser, replacing the built-in
    /// decimal-to-binary conversion for float and double cells.
    pub fn custom_double_parser(mut self, parser: impl DoubleParser + 'static) -> Self {
        self.specs.custom_double_parser = Some(Arc::new(parser));
        self
    }

    /// Sets a custom recognizer for time-zone suffixes beyond `Z` and
    /// `±HHMM`.
    pub fn custom_time_zone_parser(mut self, parser: impl TimeZoneParser + 'static) -> Self {
        self.specs.custom_time_zone_parser = Some(Arc::new(parser));
        self
    }

    /// Sets the column widths for fixed-width mode. The final width is a
    /// sentinel: the last cell extends to the end of the line regardless of
    /// its declared width.
    pub fn fixed_column_widths(mut self, widths: Vec<usize>) -> Self {
        self.fixed_column_widths = Some(widths);
        self
    }

    /// Chooses the unit fixed-column widths are measured in: UTF-32 code
    /// points when `true`, UTF-16 code units when `false`.
    pub fn use_utf32_counting_convention(mut self, use_utf32: bool) -> Self {
        self.use_utf32_counting_convention = Some(use_utf32);
        self
    }

    /// Validates the configuration and produces an immutable [`CsvSpecs`].
    ///
    /// Every failed check is reported, semicolon-separated, in one
    /// [`SpecError`].
    pub fn build(self) -> Result<CsvSpecs, SpecError> {
        let mut specs = self.specs;
        let mut reasons = Vec::new();

        if let Some(delimiter) = self.delimiter {
            if !delimiter.is_ascii() {
                reasons.push("delimiter is not an ASCII character".to_string());
            }
            specs.delimiter = delimiter;
        }
        if let Some(quote) = self.quote {
            if !quote.is_ascii() {
                reasons.push("quote is not an ASCII character".to_string());
            }
            specs.quote = quote;
        }
        if specs.delimiter == specs.quote {
            reasons.push("delimiter and quote are the same character".to_string());
        }
        if specs.skip_header_rows != 0 && !specs.has_header_row {
            reasons.push("skip_header_rows is set but has_header_row is false".to_string());
        }
        if specs.has_fixed_width_columns {
            if self.delimiter.is_some() || self.quote.is_some() {
                reasons.push(
                    "delimiter and quote may not be set when has_fixed_width_columns is true"
                        .to_string(),
                );
            }
            if let Some(widths) = &self.fixed_column_widths {
                if widths.iter().any(|&w| w == 0) {
                    reasons.push("fixed column widths must be positive".to_string());
                }
            } else if !specs.has_header_row {
                reasons.push(
                    "fixed_column_widths must be provided when there is no header row to infer them from"
                        .to_string(),
                );
            }
        } else if self.fixed_column_widths.is_some()
            || self.use_utf32_counting_convention.is_some()
        {
            reasons.push(
                "fixed-width options are set but has_fixed_width_columns is false".to_string(),
            );
        }

        if !reasons.is_empty() {
            return Err(SpecError { reasons });
        }
        specs.fixed_column_widths = self.fixed_column_widths.unwrap_or_default();
        specs.use_utf32_counting_convention = self.use_utf32_counting_convention.unwrap_or(false);
        Ok(specs)
    }
}
