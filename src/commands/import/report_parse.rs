use std::collections::HashSet;

use chrono::NaiveDate;
use regex::{Captures, Regex};

use crate::error::{Result, TrackerError};
use crate::model::{EntityType, LiabilityComponents, LiabilityRecord, ParsedReport};
use crate::util::first_of_month;

/// Grouped currency amount with exactly two decimal digits, e.g. `12,345.67`.
const AMOUNT_PATTERN: &str =
    r"(?:[1-9][0-9]{0,2}(?:,[0-9]{3})*|(?:[1-9][0-9]*)?[0-9])\.[0-9]{2}";

const REPORT_MONTH_PATTERN: &str =
    r"(?s)Rating Data.*?(?P<date>[0-9]{2} [A-Za-z]{3} [0-9]{4}); [0-9]";

const WELL_START_PATTERN: &str = r"(?m)^[ \t]*W [0-9]* ;";
const WELL_RECORD_PATTERN: &str = r"(?m)^[ \t]*W (?P<licence>[0-9]*) ; (?P<status>[^;]*); (?P<location>[^;]*); \$(?P<asset>AMOUNT); \$(?P<liability>AMOUNT); (?P<psv>[^;]*); (?P<activity>[a-zA-Z])";

const FACILITY_START_PATTERN: &str = r"(?m)^[ \t]*F[0-9]* *;";
const FACILITY_RECORD_PATTERN: &str = r"(?m)^[ \t]*F(?P<licence>[0-9]*) *; (?P<status>[^;]*); (?P<location>[^;]*); (?P<program>[^;]*); (?P<calctype>[^;]*); \$(?P<asset>AMOUNT); \$(?P<liability>AMOUNT); (?P<psv>[^;]*); (?P<activity>[a-zA-Z])";

const DETAIL_AMOUNT_PATTERN: &str = r"^\$?(?P<amount>AMOUNT)$";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum RecordKind {
    Well,
    Facility,
}

impl RecordKind {
    fn entity_type(self) -> EntityType {
        match self {
            Self::Well => EntityType::Well,
            Self::Facility => EntityType::Facility,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RecordStart {
    offset: usize,
    kind: RecordKind,
}

/// Parser for the monthly licensee liability rating export.
pub struct ReportParser {
    report_month_regex: Regex,
    well_start_regex: Regex,
    well_record_regex: Regex,
    facility_start_regex: Regex,
    facility_record_regex: Regex,
    detail_amount_regex: Regex,
}

impl ReportParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            report_month_regex: Regex::new(REPORT_MONTH_PATTERN)?,
            well_start_regex: Regex::new(WELL_START_PATTERN)?,
            well_record_regex: Regex::new(&WELL_RECORD_PATTERN.replace("AMOUNT", AMOUNT_PATTERN))?,
            facility_start_regex: Regex::new(FACILITY_START_PATTERN)?,
            facility_record_regex: Regex::new(
                &FACILITY_RECORD_PATTERN.replace("AMOUNT", AMOUNT_PATTERN),
            )?,
            detail_amount_regex: Regex::new(
                &DETAIL_AMOUNT_PATTERN.replace("AMOUNT", AMOUNT_PATTERN),
            )?,
        })
    }

    /// Parses one report. Any grammar or numeric failure rejects the whole text.
    pub fn parse(&self, text: &str) -> Result<ParsedReport> {
        let report_month = self.parse_report_month(text)?;

        let mut starts = self
            .well_start_regex
            .find_iter(text)
            .map(|found| RecordStart {
                offset: found.start(),
                kind: RecordKind::Well,
            })
            .chain(
                self.facility_start_regex
                    .find_iter(text)
                    .map(|found| RecordStart {
                        offset: found.start(),
                        kind: RecordKind::Facility,
                    }),
            )
            .collect::<Vec<_>>();
        starts.sort_by_key(|start| start.offset);

        let mut wells = Vec::<LiabilityRecord>::new();
        let mut facilities = Vec::<LiabilityRecord>::new();
        let mut seen = HashSet::new();

        for (index, start) in starts.iter().enumerate() {
            let next_start = starts
                .get(index + 1)
                .map(|next| next.offset)
                .unwrap_or(text.len());
            let record = self.parse_record(text, *start, next_start, report_month)?;

            if !seen.insert(record.natural_key()) {
                return Err(TrackerError::MalformedReport(format!(
                    "{} licence {} appears more than once (line {})",
                    record.entity_type,
                    record.licence,
                    line_number(text, start.offset)
                )));
            }

            match start.kind {
                RecordKind::Well => wells.push(record),
                RecordKind::Facility => facilities.push(record),
            }
        }

        let mut records = wells;
        records.extend(facilities);

        Ok(ParsedReport {
            report_month,
            records,
        })
    }

    fn parse_report_month(&self, text: &str) -> Result<NaiveDate> {
        let captures = self.report_month_regex.captures(text).ok_or_else(|| {
            TrackerError::MalformedReport("report date header not found".to_string())
        })?;
        let raw = &captures["date"];
        let date = NaiveDate::parse_from_str(raw, "%d %b %Y").map_err(|err| {
            TrackerError::MalformedReport(format!("invalid report date '{raw}': {err}"))
        })?;
        Ok(first_of_month(date))
    }

    fn parse_record(
        &self,
        text: &str,
        start: RecordStart,
        next_start: usize,
        report_month: NaiveDate,
    ) -> Result<LiabilityRecord> {
        let record_regex = match start.kind {
            RecordKind::Well => &self.well_record_regex,
            RecordKind::Facility => &self.facility_record_regex,
        };

        let captures = record_regex
            .captures_at(text, start.offset)
            .filter(|captures| {
                captures
                    .get(0)
                    .is_some_and(|found| found.start() == start.offset)
            })
            .ok_or_else(|| {
                TrackerError::MalformedReport(format!(
                    "{} record at line {} does not match the report grammar",
                    start.kind.entity_type(),
                    line_number(text, start.offset)
                ))
            })?;

        let header_end = captures.get(0).map(|found| found.end()).unwrap_or(start.offset);
        let block_end = blank_line_after(text, header_end).min(next_start.max(header_end));

        let licence = captures["licence"].trim();
        if licence.is_empty() {
            return Err(TrackerError::MalformedReport(format!(
                "record at line {} has no licence number",
                line_number(text, start.offset)
            )));
        }

        let calculation_type = match start.kind {
            RecordKind::Well => None,
            RecordKind::Facility => Some(clean_field(&captures, "calctype")),
        };

        let mut record = LiabilityRecord {
            report_month,
            entity_type: start.kind.entity_type(),
            licence: crate::model::normalize_licence(licence),
            location: clean_field(&captures, "location"),
            status: clean_field(&captures, "status"),
            calculation_type,
            present_value_scheme: clean_field(&captures, "psv"),
            asset_value: parse_grouped_amount(&captures["asset"])?,
            liability_value: parse_grouped_amount(&captures["liability"])?,
            components: LiabilityComponents::default(),
        };

        self.apply_details(&text[header_end..block_end], start.kind, &mut record)?;

        Ok(record)
    }

    fn apply_details(
        &self,
        block: &str,
        kind: RecordKind,
        record: &mut LiabilityRecord,
    ) -> Result<()> {
        for line in block.lines() {
            let Some(position) = line.find(";;") else {
                continue;
            };
            let detail = line[position + 2..].trim_end_matches('\r');
            let tokens = detail.split(';').collect::<Vec<_>>();
            if tokens.len() != 4 || tokens[2].trim() != "Y" {
                continue;
            }

            let Some(slot) = component_slot(
                kind,
                tokens[0].trim(),
                tokens[1].trim(),
                &mut record.components,
            ) else {
                continue;
            };

            *slot = self.parse_detail_amount(tokens[3]).ok_or_else(|| {
                TrackerError::MalformedReport(format!(
                    "invalid detail amount '{}' for {} licence {}",
                    tokens[3].trim(),
                    record.entity_type,
                    record.licence
                ))
            })?;
        }

        Ok(())
    }

    fn parse_detail_amount(&self, raw: &str) -> Option<f64> {
        let captures = self.detail_amount_regex.captures(raw.trim())?;
        captures["amount"].replace(',', "").parse::<f64>().ok()
    }
}

/// Routes an applicable detail row to its sub-component. Well and facility tables differ.
fn component_slot<'a>(
    kind: RecordKind,
    category: &str,
    subcategory: &str,
    components: &'a mut LiabilityComponents,
) -> Option<&'a mut f64> {
    match (kind, category, subcategory) {
        (RecordKind::Well, "Abandonment", "WB Abandonment") => Some(&mut components.abandonment_basic),
        (RecordKind::Well, "Abandonment", "Additional Event") => {
            Some(&mut components.abandonment_additional_event)
        }
        (RecordKind::Well, "Abandonment", "GWP") => Some(&mut components.abandonment_gwp),
        (RecordKind::Well, "Abandonment", "Gas Migration") => {
            Some(&mut components.abandonment_gas_migration)
        }
        (RecordKind::Well, "Abandonment", "Vent Flow") => Some(&mut components.abandonment_vent_flow),
        (RecordKind::Facility, "Abandonment", "Fac Abandonment") => {
            Some(&mut components.abandonment_basic)
        }
        (_, "Abandonment", "Site Specific") => Some(&mut components.abandonment_site_specific),
        (_, "Reclamation", "Site Reclamation") => Some(&mut components.reclamation_basic),
        (_, "Reclamation", "Site Specific") => Some(&mut components.reclamation_site_specific),
        _ => None,
    }
}

fn parse_grouped_amount(raw: &str) -> Result<f64> {
    raw.replace(',', "")
        .parse::<f64>()
        .map_err(|err| TrackerError::MalformedReport(format!("invalid amount '{raw}': {err}")))
}

fn clean_field(captures: &Captures<'_>, name: &str) -> String {
    captures
        .name(name)
        .map(|value| value.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Offset of the first empty line at or after `from`, or the end of the text.
fn blank_line_after(text: &str, from: usize) -> usize {
    let bytes = text.as_bytes();
    let mut index = from;

    while let Some(offset) = text[index..].find('\n') {
        let line_start = index + offset + 1;
        if line_start >= bytes.len() || bytes[line_start] == b'\n' || bytes[line_start] == b'\r' {
            return line_start.min(bytes.len());
        }
        index = line_start;
    }

    bytes.len()
}

fn line_number(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count() + 1
}
