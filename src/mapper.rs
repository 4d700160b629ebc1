//! Record Mapper: one labelled report row to one typed [`Opportunity`].

use crate::error::{Result, SnapshotError};
use crate::ingestion::{RawRow, ReportData, AMOUNT_COLUMN};
use crate::schema::{AmountPolicy, ReportKind};
use crate::utils::{cell_text, classify_amount, parse_close_date, parse_probability, split_fiscal_period, AmountCell};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};

pub const OPPORTUNITY_ID_COLUMN: &str = "Opportunity ID";
pub const OPPORTUNITY_NAME_COLUMN: &str = "Opportunity Name";
pub const STAGE_COLUMN: &str = "Stage";
pub const EXPECTED_VALUE_COLUMN: &str = "Expected Value";
pub const EXPECTED_INCOME_COLUMN: &str = "Expected Income";
pub const CLOSE_DATE_COLUMN: &str = "Close Date";
pub const FISCAL_PERIOD_COLUMN: &str = "Fiscal Period";
pub const ACCOUNT_ID_COLUMN: &str = "Account ID";
pub const OWNER_ID_COLUMN: &str = "Owner ID";
pub const OWNER_NAME_COLUMN: &str = "Owner Name";
pub const TYPE_COLUMN: &str = "Type";
pub const PRODUCT_LINE_COLUMN: &str = "Product Line";
pub const REGION_COLUMN: &str = "Region";
pub const PROBABILITY_COLUMN: &str = "Probability";
pub const FORECAST_CATEGORY_COLUMN: &str = "Forecast Category";

pub const CLOSED_WON_STAGE: &str = "Closed Won";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: Option<String>,
    pub name: Option<String>,
    pub stage_name: Option<String>,
    #[serde(rename = "type")]
    pub opportunity_type: Option<String>,
    pub product_line: Option<String>,
    pub region: Option<String>,
    pub account_id: Option<String>,
    pub owner_id: Option<String>,
    pub owner_name: Option<String>,

    pub amount: f64,
    /// Pipeline only.
    pub expected_value: Option<f64>,
    /// Pipeline only.
    pub expected_income: Option<f64>,
    /// `expected_value - expected_income`, present iff both inputs are.
    pub expected_value_gap: Option<f64>,

    pub close_date: Option<NaiveDate>,
    pub fiscal_quarter: Option<String>,
    pub fiscal_year: Option<String>,

    /// Pipeline only, integer percent.
    pub probability: Option<u32>,
    /// Pipeline only.
    pub forecast_category: Option<String>,

    pub is_closed: bool,
    pub is_won: bool,
}

/// Maps rows of one report kind. Holds no state between rows.
#[derive(Debug, Clone, Copy)]
pub struct RecordMapper {
    kind: ReportKind,
    amount_policy: AmountPolicy,
}

impl RecordMapper {
    pub fn new(kind: ReportKind, amount_policy: AmountPolicy) -> Self {
        Self { kind, amount_policy }
    }

    pub fn kind(&self) -> ReportKind {
        self.kind
    }

    /// Map every row of a report, stopping at the first failure.
    pub fn map_report(&self, report: &ReportData) -> Result<Vec<Opportunity>> {
        report
            .raw_rows
            .iter()
            .enumerate()
            .map(|(idx, row)| self.map_row(idx, row))
            .collect()
    }

    /// `row_index` is only used to locate failures.
    pub fn map_row(&self, row_index: usize, row: &RawRow) -> Result<Opportunity> {
        let text = |column: &str| cell_text(row.get(column));

        let id = text(OPPORTUNITY_ID_COLUMN);
        let amount = self.required_amount(row, AMOUNT_COLUMN, row_index)?;
        let close_date = read_close_date(row, row_index, id.as_deref())?;
        let (fiscal_quarter, fiscal_year) = split_fiscal_period(text(FISCAL_PERIOD_COLUMN).as_deref());

        let mut opportunity = Opportunity {
            id,
            name: text(OPPORTUNITY_NAME_COLUMN),
            stage_name: text(STAGE_COLUMN),
            opportunity_type: text(TYPE_COLUMN),
            product_line: text(PRODUCT_LINE_COLUMN),
            region: text(REGION_COLUMN),
            account_id: text(ACCOUNT_ID_COLUMN),
            owner_id: text(OWNER_ID_COLUMN),
            owner_name: text(OWNER_NAME_COLUMN),
            amount,
            expected_value: None,
            expected_income: None,
            expected_value_gap: None,
            close_date,
            fiscal_quarter,
            fiscal_year,
            probability: None,
            forecast_category: None,
            is_closed: false,
            is_won: false,
        };

        match self.kind {
            ReportKind::Pipeline => {
                let expected_value = self.optional_amount(row, EXPECTED_VALUE_COLUMN, row_index)?;
                let expected_income = self.optional_amount(row, EXPECTED_INCOME_COLUMN, row_index)?;

                // Any upstream gap column is ignored; the gap is always derived here.
                opportunity.expected_value_gap = match (expected_value, expected_income) {
                    (Some(value), Some(income)) => Some(value - income),
                    _ => None,
                };
                opportunity.expected_value = expected_value;
                opportunity.expected_income = expected_income;
                opportunity.probability = parse_probability(row.get(PROBABILITY_COLUMN));
                opportunity.forecast_category = text(FORECAST_CATEGORY_COLUMN);
            }
            ReportKind::ClosedWon => {
                opportunity.stage_name = Some(CLOSED_WON_STAGE.to_string());
                opportunity.is_closed = true;
                opportunity.is_won = true;
            }
        }

        Ok(opportunity)
    }

    fn required_amount(&self, row: &RawRow, column: &str, row_index: usize) -> Result<f64> {
        Ok(self.optional_amount(row, column, row_index)?.unwrap_or(0.0))
    }

    fn optional_amount(&self, row: &RawRow, column: &str, row_index: usize) -> Result<Option<f64>> {
        match classify_amount(row.get(column)) {
            AmountCell::Value(v) => Ok(Some(v)),
            AmountCell::Absent => Ok(None),
            AmountCell::Unparseable(raw) => match self.amount_policy {
                AmountPolicy::Strict => Err(SnapshotError::NumericCoercion {
                    column: column.to_string(),
                    raw,
                    row: row_index,
                }),
                AmountPolicy::Coerce => {
                    debug!(
                        "Row {}: coercing unparseable {} '{}' to empty",
                        row_index, column, raw
                    );
                    Ok(None)
                }
            },
        }
    }
}

fn read_close_date(row: &RawRow, row_index: usize, opportunity_id: Option<&str>) -> Result<Option<NaiveDate>> {
    let Some(raw) = cell_text(row.get(CLOSE_DATE_COLUMN)) else {
        return Ok(None);
    };

    parse_close_date(&raw)
        .map(Some)
        .ok_or_else(|| SnapshotError::DateParse {
            raw,
            row: row_index,
            opportunity_id: opportunity_id.map(str::to_string),
        })
}

/// Map one row with the lenient amount policy.
pub fn map_row(row: &RawRow, kind: ReportKind) -> Result<Opportunity> {
    RecordMapper::new(kind, AmountPolicy::Coerce).map_row(0, row)
}
