//! Financial aggregation engine.
//!
//! Summary and breakdown rollups are computed in Rust over the user's fetched
//! transaction rows. Bucket keys are zero-padded strings so that descending
//! lexicographic order is descending chronological order.

use chrono::{Datelike, Duration, Months, NaiveDate};
use model::entities::user_transaction::{self, TransactionType};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Relative reporting window for the summary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
    All,
}

impl Period {
    /// Parse a `period` query value. `None` defaults to `All`; an unknown
    /// value is a client error.
    pub fn parse(value: Option<&str>) -> Option<Period> {
        match value {
            None => Some(Period::All),
            Some("day") => Some(Period::Day),
            Some("week") => Some(Period::Week),
            Some("month") => Some(Period::Month),
            Some("year") => Some(Period::Year),
            Some("all") => Some(Period::All),
            Some(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
            Period::All => "all",
        }
    }

    /// Earliest `transaction_date` included in the window, or `None` for an
    /// unbounded window.
    fn cutoff(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Period::Day => Some(today - Duration::days(1)),
            Period::Week => Some(today - Duration::days(7)),
            Period::Month => Some(today - Months::new(1)),
            Period::Year => Some(today - Months::new(12)),
            Period::All => None,
        }
    }
}

/// Calendar grain for the breakdown operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grain {
    Day,
    Week,
    Month,
    Year,
}

impl Grain {
    /// Parse a `groupBy` query value. `None` defaults to `Month`; an unknown
    /// value is a client error.
    pub fn parse(value: Option<&str>) -> Option<Grain> {
        match value {
            None => Some(Grain::Month),
            Some("day") => Some(Grain::Day),
            Some("week") => Some(Grain::Week),
            Some("month") => Some(Grain::Month),
            Some("year") => Some(Grain::Year),
            Some(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Grain::Day => "day",
            Grain::Week => "week",
            Grain::Month => "month",
            Grain::Year => "year",
        }
    }
}

/// Bucket key for a transaction date at the given grain.
///
/// Weeks use ISO-8601 week numbering (Monday start); the year component is
/// the ISO week-year, so dates near January 1st land in the week-year they
/// belong to.
pub fn bucket_key(date: NaiveDate, grain: Grain) -> String {
    match grain {
        Grain::Day => date.format("%Y-%m-%d").to_string(),
        Grain::Week => {
            let week = date.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        Grain::Month => date.format("%Y-%m").to_string(),
        Grain::Year => date.format("%Y").to_string(),
    }
}

/// Income/expense row counts inside a summary window.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SummaryCounts {
    pub income: u64,
    pub expenses: u64,
}

/// Rolled-up income/expense/balance over one period window.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FinancialSummary {
    pub period: String,
    #[schema(value_type = String)]
    pub income: Decimal,
    #[schema(value_type = String)]
    pub expenses: Decimal,
    #[schema(value_type = String)]
    pub balance: Decimal,
    pub transaction_count: SummaryCounts,
}

/// Row counts inside one breakdown bucket.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BucketCounts {
    pub income: u64,
    pub expenses: u64,
    pub total: u64,
}

/// One time bucket of the breakdown, with both sides zero-defaulted.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BreakdownBucket {
    pub period: String,
    #[schema(value_type = String)]
    pub income: Decimal,
    #[schema(value_type = String)]
    pub expenses: Decimal,
    #[schema(value_type = String)]
    pub balance: Decimal,
    pub transaction_count: BucketCounts,
}

/// Totals across all buckets of a breakdown.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BreakdownSummary {
    #[schema(value_type = String)]
    pub total_income: Decimal,
    #[schema(value_type = String)]
    pub total_expenses: Decimal,
    #[schema(value_type = String)]
    pub total_balance: Decimal,
    pub total_transactions: u64,
}

/// Grouped rollup of a user's whole history at one calendar grain.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FinancialBreakdown {
    pub group_by: String,
    pub summary: BreakdownSummary,
    pub breakdown: Vec<BreakdownBucket>,
}

/// Compute the summary for one user's rows over a relative period.
pub fn summarize(
    rows: &[user_transaction::Model],
    period: Period,
    today: NaiveDate,
) -> FinancialSummary {
    let cutoff = period.cutoff(today);
    let mut income = Decimal::ZERO;
    let mut expenses = Decimal::ZERO;
    let mut income_count = 0u64;
    let mut expense_count = 0u64;

    for row in rows {
        if let Some(cutoff) = cutoff {
            if row.transaction_date < cutoff {
                continue;
            }
        }
        match row.transaction_type {
            TransactionType::Credit => {
                income += row.amount;
                income_count += 1;
            }
            TransactionType::Debit => {
                expenses += row.amount;
                expense_count += 1;
            }
        }
    }

    FinancialSummary {
        period: period.label().to_string(),
        income,
        expenses,
        balance: income - expenses,
        transaction_count: SummaryCounts {
            income: income_count,
            expenses: expense_count,
        },
    }
}

/// Compute the bucketed breakdown for one user's rows at the given grain.
///
/// The income and expense rollups are built independently and merged on the
/// union of their bucket keys; a bucket with activity on only one side keeps
/// a zero on the other.
pub fn breakdown(rows: &[user_transaction::Model], grain: Grain) -> FinancialBreakdown {
    let mut income: BTreeMap<String, (Decimal, u64)> = BTreeMap::new();
    let mut expenses: BTreeMap<String, (Decimal, u64)> = BTreeMap::new();

    for row in rows {
        let key = bucket_key(row.transaction_date, grain);
        let side = match row.transaction_type {
            TransactionType::Credit => &mut income,
            TransactionType::Debit => &mut expenses,
        };
        let entry = side.entry(key).or_insert((Decimal::ZERO, 0));
        entry.0 += row.amount;
        entry.1 += 1;
    }

    let mut keys: Vec<String> = income.keys().chain(expenses.keys()).cloned().collect();
    keys.sort();
    keys.dedup();
    // Zero-padded keys make lexicographic descent chronological descent.
    keys.reverse();

    let mut buckets = Vec::with_capacity(keys.len());
    let mut summary = BreakdownSummary {
        total_income: Decimal::ZERO,
        total_expenses: Decimal::ZERO,
        total_balance: Decimal::ZERO,
        total_transactions: 0,
    };

    for key in keys {
        let (bucket_income, income_count) = income.get(&key).copied().unwrap_or((Decimal::ZERO, 0));
        let (bucket_expenses, expense_count) =
            expenses.get(&key).copied().unwrap_or((Decimal::ZERO, 0));
        let balance = bucket_income - bucket_expenses;

        summary.total_income += bucket_income;
        summary.total_expenses += bucket_expenses;
        summary.total_balance += balance;
        summary.total_transactions += income_count + expense_count;

        buckets.push(BreakdownBucket {
            period: key,
            income: bucket_income,
            expenses: bucket_expenses,
            balance,
            transaction_count: BucketCounts {
                income: income_count,
                expenses: expense_count,
                total: income_count + expense_count,
            },
        });
    }

    FinancialBreakdown {
        group_by: grain.label().to_string(),
        summary,
        breakdown: buckets,
    }
}

/// Per-type rollup of the current day's rows.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TypeBucket {
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub count: u64,
    #[schema(value_type = String)]
    pub total: Decimal,
}

/// Per-category rollup of the current day's rows.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CategoryBucket {
    pub category: String,
    pub count: u64,
    #[schema(value_type = String)]
    pub total: Decimal,
}

/// All-time totals plus the current day's activity, for the transaction
/// summary endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionOverview {
    pub total_transactions: u64,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    #[schema(value_type = String)]
    pub balance: Decimal,
    #[schema(value_type = String)]
    pub income: Decimal,
    #[schema(value_type = String)]
    pub expenses: Decimal,
    #[schema(value_type = String)]
    pub total_income: Decimal,
    #[schema(value_type = String)]
    pub total_expenses: Decimal,
    pub by_type: Vec<TypeBucket>,
    pub by_category: Vec<CategoryBucket>,
}

/// Compute the transaction-summary payload: all-time totals, today's income
/// and expenses, and today's by-type / by-category rollups.
pub fn overview(rows: &[user_transaction::Model], today: NaiveDate) -> TransactionOverview {
    let mut total_amount = Decimal::ZERO;
    let mut total_income = Decimal::ZERO;
    let mut total_expenses = Decimal::ZERO;
    let mut today_income = Decimal::ZERO;
    let mut today_expenses = Decimal::ZERO;
    let mut by_type: BTreeMap<&'static str, (u64, Decimal)> = BTreeMap::new();
    let mut by_category: BTreeMap<String, (u64, Decimal)> = BTreeMap::new();

    for row in rows {
        total_amount += row.amount;
        match row.transaction_type {
            TransactionType::Credit => total_income += row.amount,
            TransactionType::Debit => total_expenses += row.amount,
        }

        if row.transaction_date != today {
            continue;
        }
        let type_label = match row.transaction_type {
            TransactionType::Credit => {
                today_income += row.amount;
                "credit"
            }
            TransactionType::Debit => {
                today_expenses += row.amount;
                "debit"
            }
        };
        let entry = by_type.entry(type_label).or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 += row.amount;

        if let Some(category) = &row.category {
            let entry = by_category
                .entry(category.clone())
                .or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += row.amount;
        }
    }

    TransactionOverview {
        total_transactions: rows.len() as u64,
        total_amount,
        balance: total_income - total_expenses,
        income: today_income,
        expenses: today_expenses,
        total_income,
        total_expenses,
        by_type: by_type
            .into_iter()
            .map(|(transaction_type, (count, total))| TypeBucket {
                transaction_type: transaction_type.to_string(),
                count,
                total,
            })
            .collect(),
        by_category: by_category
            .into_iter()
            .map(|(category, (count, total))| CategoryBucket {
                category,
                count,
                total,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use model::entities::user_transaction::TransactionStatus;

    fn txn(amount: i64, kind: TransactionType, date: NaiveDate) -> user_transaction::Model {
        user_transaction::Model {
            id: 0,
            user_id: "u1".to_string(),
            amount: Decimal::from(amount),
            currency: "INR".to_string(),
            transaction_type: kind,
            status: TransactionStatus::Completed,
            category: Some("Other".to_string()),
            tags: serde_json::json!([]),
            merchant: None,
            reference: None,
            description: None,
            transaction_date: date,
            receipt_url: None,
            receipt_filename: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn day_summary_scenario() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let rows = vec![
            txn(1000, TransactionType::Credit, today),
            txn(300, TransactionType::Debit, today),
            txn(200, TransactionType::Debit, today),
        ];

        let summary = summarize(&rows, Period::Day, today);
        assert_eq!(summary.income, Decimal::from(1000));
        assert_eq!(summary.expenses, Decimal::from(500));
        assert_eq!(summary.balance, Decimal::from(500));
        assert_eq!(summary.transaction_count.income, 1);
        assert_eq!(summary.transaction_count.expenses, 2);
    }

    #[test]
    fn balance_identity_holds_for_every_period() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let rows = vec![
            txn(1200, TransactionType::Credit, today),
            txn(150, TransactionType::Debit, today - Duration::days(3)),
            txn(900, TransactionType::Credit, today - Duration::days(45)),
            txn(75, TransactionType::Debit, today - Duration::days(400)),
        ];

        for period in [
            Period::Day,
            Period::Week,
            Period::Month,
            Period::Year,
            Period::All,
        ] {
            let summary = summarize(&rows, period, today);
            assert_eq!(summary.balance, summary.income - summary.expenses);
        }
    }

    #[test]
    fn summary_windows_filter_by_transaction_date() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let rows = vec![
            txn(10, TransactionType::Debit, today),
            txn(20, TransactionType::Debit, today - Duration::days(5)),
            txn(40, TransactionType::Debit, today - Duration::days(20)),
            txn(80, TransactionType::Debit, today - Duration::days(200)),
        ];

        assert_eq!(
            summarize(&rows, Period::Day, today).expenses,
            Decimal::from(10)
        );
        assert_eq!(
            summarize(&rows, Period::Week, today).expenses,
            Decimal::from(30)
        );
        assert_eq!(
            summarize(&rows, Period::Month, today).expenses,
            Decimal::from(70)
        );
        assert_eq!(
            summarize(&rows, Period::Year, today).expenses,
            Decimal::from(150)
        );
        assert_eq!(
            summarize(&rows, Period::All, today).expenses,
            Decimal::from(150)
        );
    }

    #[test]
    fn empty_rows_summarize_to_zero() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let summary = summarize(&[], Period::All, today);
        assert_eq!(summary.income, Decimal::ZERO);
        assert_eq!(summary.expenses, Decimal::ZERO);
        assert_eq!(summary.balance, Decimal::ZERO);
        assert_eq!(summary.transaction_count.income, 0);
        assert_eq!(summary.transaction_count.expenses, 0);
    }

    #[test]
    fn bucket_keys_per_grain() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(bucket_key(date, Grain::Day), "2024-03-05");
        assert_eq!(bucket_key(date, Grain::Week), "2024-W10");
        assert_eq!(bucket_key(date, Grain::Month), "2024-03");
        assert_eq!(bucket_key(date, Grain::Year), "2024");
    }

    #[test]
    fn iso_week_key_uses_week_year_at_boundaries() {
        // 2021-01-01 is a Friday and belongs to ISO week 53 of 2020.
        let date = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        assert_eq!(bucket_key(date, Grain::Week), "2020-W53");

        // 2023-12-31 is a Sunday in ISO week 52 of 2023.
        let date = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        assert_eq!(bucket_key(date, Grain::Week), "2023-W52");
    }

    #[test]
    fn breakdown_merges_one_sided_buckets_with_zero_default() {
        let jan = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let feb = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        let mar = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let rows = vec![
            txn(500, TransactionType::Credit, jan),
            txn(200, TransactionType::Debit, feb),
            txn(100, TransactionType::Credit, mar),
            txn(40, TransactionType::Debit, mar),
        ];

        let result = breakdown(&rows, Grain::Month);
        assert_eq!(result.breakdown.len(), 3);

        // Sorted descending by key.
        let keys: Vec<&str> = result
            .breakdown
            .iter()
            .map(|b| b.period.as_str())
            .collect();
        assert_eq!(keys, vec!["2024-03", "2024-02", "2024-01"]);

        let january = &result.breakdown[2];
        assert_eq!(january.income, Decimal::from(500));
        assert_eq!(january.expenses, Decimal::ZERO);
        assert_eq!(january.transaction_count.expenses, 0);

        let february = &result.breakdown[1];
        assert_eq!(february.income, Decimal::ZERO);
        assert_eq!(february.expenses, Decimal::from(200));

        let march = &result.breakdown[0];
        assert_eq!(march.balance, Decimal::from(60));
        assert_eq!(march.transaction_count.total, 2);
    }

    #[test]
    fn breakdown_summary_equals_bucket_sums() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let rows = vec![
            txn(500, TransactionType::Credit, today),
            txn(120, TransactionType::Debit, today - Duration::days(40)),
            txn(60, TransactionType::Debit, today - Duration::days(400)),
            txn(900, TransactionType::Credit, today - Duration::days(400)),
        ];

        for grain in [Grain::Day, Grain::Week, Grain::Month, Grain::Year] {
            let result = breakdown(&rows, grain);
            let income: Decimal = result.breakdown.iter().map(|b| b.income).sum();
            let expenses: Decimal = result.breakdown.iter().map(|b| b.expenses).sum();
            let balance: Decimal = result.breakdown.iter().map(|b| b.balance).sum();
            let count: u64 = result
                .breakdown
                .iter()
                .map(|b| b.transaction_count.total)
                .sum();

            assert_eq!(result.summary.total_income, income);
            assert_eq!(result.summary.total_expenses, expenses);
            assert_eq!(result.summary.total_balance, balance);
            assert_eq!(result.summary.total_transactions, count);
        }
    }

    #[test]
    fn overview_splits_today_from_all_time() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let rows = vec![
            txn(1000, TransactionType::Credit, today),
            txn(250, TransactionType::Debit, today),
            txn(600, TransactionType::Credit, today - Duration::days(10)),
        ];

        let overview = overview(&rows, today);
        assert_eq!(overview.total_transactions, 3);
        assert_eq!(overview.total_amount, Decimal::from(1850));
        assert_eq!(overview.income, Decimal::from(1000));
        assert_eq!(overview.expenses, Decimal::from(250));
        assert_eq!(overview.total_income, Decimal::from(1600));
        assert_eq!(overview.total_expenses, Decimal::from(250));
        assert_eq!(overview.balance, Decimal::from(1350));
        assert_eq!(overview.by_type.len(), 2);
        assert_eq!(overview.by_type[0].transaction_type, "credit");
        assert_eq!(overview.by_category.len(), 1);
        assert_eq!(overview.by_category[0].count, 2);
    }
}
