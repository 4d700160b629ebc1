//! Aggregator: single-pass running totals per stage, region, owner and
//! (closed-won only) fiscal period.

use crate::mapper::Opportunity;
use crate::schema::ReportKind;
use std::collections::HashMap;
use std::hash::Hash;

/// Grouping key used when the record's field is absent.
///
/// A record whose field literally reads "Unknown" lands in the same bucket.
pub const UNKNOWN_KEY: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateBucket {
    pub count: usize,
    pub amount: f64,
    /// Pipeline aggregates only; `None` for closed-won tables.
    pub expected_value: Option<f64>,
    pub expected_income: Option<f64>,
    pub expected_value_gap: Option<f64>,
}

impl AggregateBucket {
    fn add(&mut self, opportunity: &Opportunity, kind: ReportKind) {
        self.count += 1;
        self.amount += opportunity.amount;

        if kind.is_pipeline() {
            accumulate(&mut self.expected_value, opportunity.expected_value);
            accumulate(&mut self.expected_income, opportunity.expected_income);
            accumulate(&mut self.expected_value_gap, opportunity.expected_value_gap);
        }
    }
}

fn accumulate(total: &mut Option<f64>, value: Option<f64>) {
    *total = Some(total.unwrap_or(0.0) + value.unwrap_or(0.0));
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemporalKey {
    pub fiscal_year: String,
    pub fiscal_quarter: String,
}

impl TemporalKey {
    pub fn of(opportunity: &Opportunity) -> Self {
        Self {
            fiscal_year: opportunity.fiscal_year.clone().unwrap_or_else(|| UNKNOWN_KEY.to_string()),
            fiscal_quarter: opportunity
                .fiscal_quarter
                .clone()
                .unwrap_or_else(|| UNKNOWN_KEY.to_string()),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.fiscal_year == UNKNOWN_KEY || self.fiscal_quarter == UNKNOWN_KEY
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemporalBucket {
    pub total_amount: f64,
    pub deal_count: usize,
    /// Deals that carry an opportunity id.
    pub opportunity_count: usize,
}

/// Key -> bucket table that remembers first-encounter order.
#[derive(Debug, Clone)]
pub struct GroupTable<K, V> {
    entries: Vec<(K, V)>,
    index: HashMap<K, usize>,
}

impl<K, V> Default for GroupTable<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Default> GroupTable<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket_mut(&mut self, key: K) -> &mut V {
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.entries.push((key.clone(), V::default()));
                self.index.insert(key, self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&idx| &self.entries[idx].1)
    }
}

impl<K, V> GroupTable<K, V> {
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K> GroupTable<K, AggregateBucket> {
    pub fn total_count(&self) -> usize {
        self.entries.iter().map(|(_, b)| b.count).sum()
    }

    pub fn total_amount(&self) -> f64 {
        self.entries.iter().map(|(_, b)| b.amount).sum()
    }
}

impl GroupTable<String, AggregateBucket> {
    /// Look up a bucket by string key without allocating.
    pub fn bucket(&self, key: &str) -> Option<&AggregateBucket> {
        self.index.get(key).map(|&idx| &self.entries[idx].1)
    }
}

pub type SummaryTable = GroupTable<String, AggregateBucket>;
pub type TemporalTable = GroupTable<TemporalKey, TemporalBucket>;

#[derive(Debug, Clone)]
pub struct Aggregates {
    pub kind: ReportKind,
    pub stage: SummaryTable,
    pub region: SummaryTable,
    pub owner: SummaryTable,
    /// Present for closed-won input only.
    pub temporal: Option<TemporalTable>,
}

impl Aggregates {
    pub fn new(kind: ReportKind) -> Self {
        Self {
            kind,
            stage: GroupTable::new(),
            region: GroupTable::new(),
            owner: GroupTable::new(),
            temporal: match kind {
                ReportKind::ClosedWon => Some(GroupTable::new()),
                ReportKind::Pipeline => None,
            },
        }
    }

    pub fn add(&mut self, opportunity: &Opportunity) {
        let kind = self.kind;

        self.stage
            .bucket_mut(group_key(opportunity.stage_name.as_deref()))
            .add(opportunity, kind);
        self.region
            .bucket_mut(group_key(opportunity.region.as_deref()))
            .add(opportunity, kind);
        self.owner
            .bucket_mut(group_key(opportunity.owner_name.as_deref()))
            .add(opportunity, kind);

        if let Some(temporal) = self.temporal.as_mut() {
            add_temporal(temporal, opportunity);
        }
    }
}

fn add_temporal(table: &mut TemporalTable, opportunity: &Opportunity) {
    let bucket = table.bucket_mut(TemporalKey::of(opportunity));
    bucket.total_amount += opportunity.amount;
    bucket.deal_count += 1;
    if opportunity.id.is_some() {
        bucket.opportunity_count += 1;
    }
}

/// Fiscal-period table alone, regardless of report kind.
pub fn temporal_table(opportunities: &[Opportunity]) -> TemporalTable {
    let mut table = TemporalTable::new();
    for opportunity in opportunities {
        add_temporal(&mut table, opportunity);
    }
    table
}

fn group_key(value: Option<&str>) -> String {
    value.unwrap_or(UNKNOWN_KEY).to_string()
}

/// Fold a record sequence into its grouping tables.
pub fn aggregate(opportunities: &[Opportunity], kind: ReportKind) -> Aggregates {
    let mut aggregates = Aggregates::new(kind);
    for opportunity in opportunities {
        aggregates.add(opportunity);
    }
    aggregates
}
