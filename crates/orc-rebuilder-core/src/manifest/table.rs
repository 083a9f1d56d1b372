//! Minimal RFC 4180 table reader used for the DFIR-ORC CSV sidecar files
//!
//! DFIR-ORC writes its tables as UTF-8 (usually with a byte-order mark),
//! comma separated, with a header row. Fields may be quoted; a doubled quote
//! inside a quoted field stands for a literal quote.

use encoding_rs::UTF_8;
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while},
    character::complete::char,
    combinator::{eof, map, value},
    multi::{fold_many0, separated_list1},
    sequence::delimited,
    IResult,
};

use super::ManifestError;

fn quoted_field(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        fold_many0(
            alt((value("\"", tag("\"\"")), is_not("\""))),
            String::new,
            |mut acc, chunk: &str| {
                acc.push_str(chunk);
                acc
            },
        ),
        char('"'),
    )(input)
}

fn bare_field(input: &str) -> IResult<&str, String> {
    map(
        take_while(|c: char| c != ',' && c != '\r' && c != '\n'),
        String::from,
    )(input)
}

fn record(input: &str) -> IResult<&str, Vec<String>> {
    separated_list1(char(','), alt((quoted_field, bare_field)))(input)
}

fn record_end(input: &str) -> IResult<&str, &str> {
    alt((tag("\r\n"), tag("\n"), eof))(input)
}

/// A parsed table: header plus rows, each row tagged with its starting line
#[derive(Debug, Clone)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<(usize, Vec<String>)>,
}

impl Table {
    /// Decode `bytes` as UTF-8 (BOM tolerated) and parse every record.
    ///
    /// Every row must have exactly as many fields as the header. Blank lines
    /// are skipped.
    pub fn parse(file: &'static str, bytes: &[u8]) -> Result<Self, ManifestError> {
        let (text, had_errors) = UTF_8.decode_with_bom_removal(bytes);
        if had_errors {
            return Err(ManifestError::Encoding { file });
        }

        let mut records = Vec::new();
        let mut rest: &str = &text;
        let mut line = 1usize;
        while !rest.is_empty() {
            let (after_record, fields) =
                record(rest).map_err(|_| ManifestError::Syntax { file, line })?;
            let (after_end, _) =
                record_end(after_record).map_err(|_| ManifestError::Syntax { file, line })?;

            let consumed = &rest[..rest.len() - after_end.len()];
            let is_blank = fields.len() == 1 && fields[0].is_empty();
            if !is_blank {
                records.push((line, fields));
            }
            line += consumed.matches('\n').count();
            rest = after_end;
        }

        let mut records = records.into_iter();
        let headers = match records.next() {
            Some((_, headers)) => headers
                .into_iter()
                .map(|h| h.trim().to_string())
                .collect::<Vec<_>>(),
            None => Vec::new(),
        };

        let rows = records.collect::<Vec<_>>();
        for (line, fields) in &rows {
            if fields.len() != headers.len() {
                return Err(ManifestError::FieldCount {
                    file,
                    line: *line,
                    expected: headers.len(),
                    found: fields.len(),
                });
            }
        }

        Ok(Self { headers, rows })
    }

    /// Position of a header, if present
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Position of a header that the file format requires
    pub fn require(&self, file: &'static str, name: &'static str) -> Result<usize, ManifestError> {
        self.column(name)
            .ok_or(ManifestError::MissingColumn { file, column: name })
    }

    /// Rows as `(line, fields)` pairs
    pub fn rows(&self) -> impl Iterator<Item = (usize, &[String])> {
        self.rows.iter().map(|(line, fields)| (*line, fields.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
