//! Daily budgets, expenses and the read-side budget summary.
//!
//! Planned spend comes from itinerary item costs, actual spend from the
//! expense log. The two are reported side by side and never added together.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::db::{now_timestamp, DbPool};
use crate::error::{AppError, AppResult, OptionalRow};
use crate::models::{
    row_to_budget, row_to_expense, row_to_rate, CallerIdentity, CurrencyRate, DailyBudget,
    Expense, ItineraryItem, BUDGET_COLS, EXPENSE_COLS, RATE_COLS,
};
use crate::services::access;
use crate::services::activity::{self, Entity};
use crate::services::notify::{self, Notifier};
use crate::services::trips;
use crate::services::validate;

#[derive(Debug, Deserialize)]
pub struct BudgetInput {
    pub date: String,
    pub amount_cents: f64,
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExpenseInput {
    pub itinerary_item_id: Option<String>,
    pub date: String,
    pub amount_cents: f64,
    pub currency: String,
    pub category: String,
    pub note: Option<String>,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RateInput {
    pub currency: String,
    pub rate_to_base: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub date: String,
    pub budget_cents: i64,
    pub planned_cents: i64,
    pub actual_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetSummary {
    pub base_currency: String,
    pub days: Vec<DaySummary>,
    pub total_budget_cents: i64,
    pub total_planned_cents: i64,
    pub remaining_cents: i64,
    pub total_actual_cents: i64,
    pub remaining_actual_cents: i64,
    /// Currencies with amounts on file but no rate to the base currency.
    pub missing_rates: Vec<String>,
}

/// Converts amounts into the trip's base currency using its stored rates.
pub struct RateTable {
    base: String,
    rates: HashMap<String, f64>,
}

impl RateTable {
    pub fn new(base: &str, rates: &[CurrencyRate]) -> Self {
        Self {
            base: base.to_ascii_uppercase(),
            rates: rates
                .iter()
                .map(|r| (r.currency.to_ascii_uppercase(), r.rate_to_base))
                .collect(),
        }
    }

    /// `None` when the currency has no rate; never falls back to 1:1.
    pub fn convert(&self, amount_cents: i64, currency: &str) -> Option<i64> {
        let currency = currency.to_ascii_uppercase();
        if currency == self.base {
            return Some(amount_cents);
        }
        self.rates
            .get(&currency)
            .map(|rate| (amount_cents as f64 * rate).round() as i64)
    }
}

fn cents_from(amount: f64, what: &str) -> AppResult<i64> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(AppError::Validation(format!("Invalid {what} amount")));
    }
    if amount > validate::MAX_AMOUNT_CENTS as f64 {
        return Err(AppError::Validation(format!("The {what} amount is too large")));
    }
    Ok(amount.round() as i64)
}

fn total(days: &[DaySummary], cents: impl Fn(&DaySummary) -> i64) -> i64 {
    days.iter().map(cents).fold(0, i64::saturating_add)
}

/// Builds the per-day and total figures for a trip.
///
/// Days are the trip's date range plus any day that carries items, budgets
/// or expenses.
pub fn summarize(
    base_currency: &str,
    trip_days: &[String],
    items: &[ItineraryItem],
    budgets: &[DailyBudget],
    expenses: &[Expense],
    rates: &[CurrencyRate],
) -> BudgetSummary {
    let table = RateTable::new(base_currency, rates);
    let mut missing = BTreeSet::new();
    let mut days: BTreeMap<&str, DaySummary> = BTreeMap::new();

    fn day<'a, 'm>(
        days: &'m mut BTreeMap<&'a str, DaySummary>,
        date: &'a str,
    ) -> &'m mut DaySummary {
        days.entry(date).or_insert_with(|| DaySummary {
            date: date.to_string(),
            budget_cents: 0,
            planned_cents: 0,
            actual_cents: 0,
        })
    }

    for date in trip_days {
        day(&mut days, date);
    }

    for item in items {
        let entry = day(&mut days, &item.date);
        let Some(cost) = item.cost_cents else { continue };
        let currency = item.cost_currency.as_deref().unwrap_or(base_currency);
        match table.convert(cost, currency) {
            Some(converted) => entry.planned_cents = entry.planned_cents.saturating_add(converted),
            None => {
                missing.insert(currency.to_ascii_uppercase());
            }
        }
    }

    for budget in budgets {
        let entry = day(&mut days, &budget.date);
        match table.convert(budget.amount_cents, &budget.currency) {
            Some(converted) => entry.budget_cents = entry.budget_cents.saturating_add(converted),
            None => {
                missing.insert(budget.currency.to_ascii_uppercase());
            }
        }
    }

    for expense in expenses {
        let entry = day(&mut days, &expense.date);
        match table.convert(expense.amount_cents, &expense.currency) {
            Some(converted) => entry.actual_cents = entry.actual_cents.saturating_add(converted),
            None => {
                missing.insert(expense.currency.to_ascii_uppercase());
            }
        }
    }

    let days: Vec<DaySummary> = days.into_values().collect();
    let total_budget_cents = total(&days, |d| d.budget_cents);
    let total_planned_cents = total(&days, |d| d.planned_cents);
    let total_actual_cents = total(&days, |d| d.actual_cents);

    BudgetSummary {
        base_currency: table.base.clone(),
        days,
        total_budget_cents,
        total_planned_cents,
        remaining_cents: total_budget_cents.saturating_sub(total_planned_cents),
        total_actual_cents,
        remaining_actual_cents: total_budget_cents.saturating_sub(total_actual_cents),
        missing_rates: missing.into_iter().collect(),
    }
}

fn load_budgets(conn: &Connection, trip_id: &str) -> AppResult<Vec<DailyBudget>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BUDGET_COLS} FROM daily_budgets WHERE trip_id = ?1 ORDER BY date"
    ))?;
    let rows = stmt.query_map(rusqlite::params![trip_id], row_to_budget)?;
    let budgets: Result<Vec<_>, _> = rows.collect();
    Ok(budgets?)
}

fn load_expenses(conn: &Connection, trip_id: &str) -> AppResult<Vec<Expense>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EXPENSE_COLS} FROM expenses WHERE trip_id = ?1 ORDER BY date, created_at"
    ))?;
    let rows = stmt.query_map(rusqlite::params![trip_id], row_to_expense)?;
    let expenses: Result<Vec<_>, _> = rows.collect();
    Ok(expenses?)
}

fn load_rates(conn: &Connection, trip_id: &str) -> AppResult<Vec<CurrencyRate>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RATE_COLS} FROM currency_rates WHERE trip_id = ?1 ORDER BY currency"
    ))?;
    let rows = stmt.query_map(rusqlite::params![trip_id], row_to_rate)?;
    let rates: Result<Vec<_>, _> = rows.collect();
    Ok(rates?)
}

pub fn budget_summary(
    pool: &DbPool,
    caller: &CallerIdentity,
    trip_id: &str,
) -> AppResult<BudgetSummary> {
    let conn = pool.get()?;
    let access = access::resolve_access(&conn, caller, trip_id)?.require_view()?;

    let days = trips::trip_days(&access.trip)?;
    let items = trips::list_items(&conn, trip_id)?;
    let budgets = load_budgets(&conn, trip_id)?;
    let expenses = load_expenses(&conn, trip_id)?;
    let rates = load_rates(&conn, trip_id)?;

    Ok(summarize(
        &access.trip.base_currency,
        &days,
        &items,
        &budgets,
        &expenses,
        &rates,
    ))
}

/// Inserts or replaces the budget for one day.
pub async fn set_daily_budget(
    pool: &DbPool,
    notifier: &dyn Notifier,
    caller: &CallerIdentity,
    trip_id: &str,
    input: BudgetInput,
) -> AppResult<DailyBudget> {
    let amount_cents = cents_from(input.amount_cents, "budget")?;
    let date = validate::format_day(validate::parse_day(&input.date)?);

    let budget = {
        let conn = pool.get()?;
        let access = access::resolve_access(&conn, caller, trip_id)?.require_edit()?;
        let currency = match input.currency.as_deref() {
            Some(code) => validate::normalize_currency(code)?,
            None => access.trip.base_currency.clone(),
        };
        let now = now_timestamp();

        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM daily_budgets WHERE trip_id = ?1 AND date = ?2",
                rusqlite::params![trip_id, date],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE daily_budgets SET amount_cents = ?1, currency = ?2, updated_at = ?3 WHERE id = ?4",
                    rusqlite::params![amount_cents, currency, now, id],
                )?;
                id
            }
            None => {
                let id = Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO daily_budgets (id, trip_id, date, amount_cents, currency, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                    rusqlite::params![id, trip_id, date, amount_cents, currency, now],
                )
                .map_err(|e| AppError::conflict_on_constraint(e, "Budget for this day was set concurrently"))?;
                id
            }
        };

        activity::record(
            &conn,
            trip_id,
            &access.user.id,
            "set_budget",
            Entity::Budget,
            Some(json!({ "date": date, "amount_cents": amount_cents, "currency": currency })),
        )?;

        conn.query_row(
            &format!("SELECT {BUDGET_COLS} FROM daily_budgets WHERE id = ?1"),
            rusqlite::params![id],
            row_to_budget,
        )
        .or_not_found("Budget")?
    };

    notify::notify_trip(
        notifier,
        trip_id,
        notify::TRIP_UPDATE,
        json!({ "type": "budget-updated", "budget": budget }),
    )
    .await;

    Ok(budget)
}

pub fn list_expenses(
    pool: &DbPool,
    caller: &CallerIdentity,
    trip_id: &str,
) -> AppResult<Vec<Expense>> {
    let conn = pool.get()?;
    access::resolve_access(&conn, caller, trip_id)?.require_view()?;
    load_expenses(&conn, trip_id)
}

pub async fn add_expense(
    pool: &DbPool,
    notifier: &dyn Notifier,
    caller: &CallerIdentity,
    trip_id: &str,
    input: ExpenseInput,
) -> AppResult<Expense> {
    let amount_cents = cents_from(input.amount_cents, "expense")?;
    let currency = validate::normalize_currency(&input.currency)?;
    let category = input.category.trim().to_string();
    if category.is_empty() {
        return Err(AppError::Validation("Category is required".into()));
    }
    let date = validate::format_day(validate::parse_day(&input.date)?);
    let item_id = validate::clean_text(input.itinerary_item_id);

    let expense = {
        let conn = pool.get()?;
        let access = access::resolve_access(&conn, caller, trip_id)?.require_edit()?;

        if let Some(item_id) = &item_id {
            let linked: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM itinerary_items WHERE id = ?1 AND trip_id = ?2)",
                rusqlite::params![item_id, trip_id],
                |row| row.get(0),
            )?;
            if !linked {
                return Err(AppError::NotFound("Itinerary item not found".into()));
            }
        }

        let expense = Expense {
            id: Uuid::new_v4().to_string(),
            trip_id: trip_id.to_string(),
            itinerary_item_id: item_id,
            date,
            amount_cents,
            currency,
            category,
            note: validate::clean_text(input.note),
            receipt_url: validate::clean_text(input.receipt_url),
            created_at: now_timestamp(),
        };

        conn.execute(
            &format!("INSERT INTO expenses ({EXPENSE_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
            rusqlite::params![
                expense.id,
                expense.trip_id,
                expense.itinerary_item_id,
                expense.date,
                expense.amount_cents,
                expense.currency,
                expense.category,
                expense.note,
                expense.receipt_url,
                expense.created_at
            ],
        )?;

        activity::record(
            &conn,
            trip_id,
            &access.user.id,
            "added_expense",
            Entity::Expense(&expense.id),
            Some(json!({
                "category": expense.category,
                "amount_cents": expense.amount_cents,
                "currency": expense.currency,
            })),
        )?;
        expense
    };

    notify::notify_trip(
        notifier,
        trip_id,
        notify::TRIP_UPDATE,
        json!({ "type": "expense-added", "expense": expense }),
    )
    .await;

    Ok(expense)
}

pub async fn delete_expense(
    pool: &DbPool,
    notifier: &dyn Notifier,
    caller: &CallerIdentity,
    trip_id: &str,
    expense_id: &str,
) -> AppResult<()> {
    {
        let conn = pool.get()?;
        let access = access::resolve_access(&conn, caller, trip_id)?.require_edit()?;

        let deleted = conn.execute(
            "DELETE FROM expenses WHERE id = ?1 AND trip_id = ?2",
            rusqlite::params![expense_id, trip_id],
        )?;
        if deleted == 0 {
            return Err(AppError::NotFound("Expense not found".into()));
        }

        activity::record(
            &conn,
            trip_id,
            &access.user.id,
            "deleted_expense",
            Entity::Expense(expense_id),
            None,
        )?;
    }

    notify::notify_trip(
        notifier,
        trip_id,
        notify::TRIP_UPDATE,
        json!({ "type": "expense-removed", "expense_id": expense_id }),
    )
    .await;

    Ok(())
}

pub fn list_rates(
    pool: &DbPool,
    caller: &CallerIdentity,
    trip_id: &str,
) -> AppResult<Vec<CurrencyRate>> {
    let conn = pool.get()?;
    access::resolve_access(&conn, caller, trip_id)?.require_view()?;
    load_rates(&conn, trip_id)
}

pub async fn set_currency_rate(
    pool: &DbPool,
    notifier: &dyn Notifier,
    caller: &CallerIdentity,
    trip_id: &str,
    input: RateInput,
) -> AppResult<CurrencyRate> {
    if !input.rate_to_base.is_finite() || input.rate_to_base <= 0.0 {
        return Err(AppError::Validation("Rate must be a positive number".into()));
    }
    let currency = validate::normalize_currency(&input.currency)?;

    let rate = {
        let conn = pool.get()?;
        let access = access::resolve_access(&conn, caller, trip_id)?.require_owner("set currency rates")?;
        let now = now_timestamp();

        conn.execute(
            "INSERT INTO currency_rates (id, trip_id, currency, rate_to_base, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(trip_id, currency) DO UPDATE SET rate_to_base = excluded.rate_to_base, updated_at = excluded.updated_at",
            rusqlite::params![Uuid::new_v4().to_string(), trip_id, currency, input.rate_to_base, now],
        )?;

        activity::record(
            &conn,
            trip_id,
            &access.user.id,
            "set_currency_rate",
            Entity::Budget,
            Some(json!({ "currency": currency, "rate_to_base": input.rate_to_base })),
        )?;

        conn.query_row(
            &format!("SELECT {RATE_COLS} FROM currency_rates WHERE trip_id = ?1 AND currency = ?2"),
            rusqlite::params![trip_id, currency],
            row_to_rate,
        )
        .or_not_found("Currency rate")?
    };

    notify::notify_trip(
        notifier,
        trip_id,
        notify::TRIP_UPDATE,
        json!({ "type": "currency-rate-updated", "rate": rate }),
    )
    .await;

    Ok(rate)
}

fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Expense log as CSV. Amounts without a rate leave the converted column blank.
pub fn export_expenses_csv(
    pool: &DbPool,
    caller: &CallerIdentity,
    trip_id: &str,
) -> AppResult<String> {
    let (base_currency, expenses, rates) = {
        let conn = pool.get()?;
        let access = access::resolve_access(&conn, caller, trip_id)?.require_view()?;
        (
            access.trip.base_currency,
            load_expenses(&conn, trip_id)?,
            load_rates(&conn, trip_id)?,
        )
    };
    let table = RateTable::new(&base_currency, &rates);

    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record([
        "Date",
        "Category",
        "Amount",
        "Currency",
        format!("Amount ({base_currency})").as_str(),
        "Note",
    ])
    .map_err(|e| AppError::Internal(format!("CSV write error: {e}")))?;

    for expense in &expenses {
        let converted = table
            .convert(expense.amount_cents, &expense.currency)
            .map(format_cents)
            .unwrap_or_default();
        wtr.write_record([
            expense.date.as_str(),
            expense.category.as_str(),
            format_cents(expense.amount_cents).as_str(),
            expense.currency.as_str(),
            converted.as_str(),
            expense.note.as_deref().unwrap_or(""),
        ])
        .map_err(|e| AppError::Internal(format!("CSV write error: {e}")))?;
    }

    let data = wtr
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV flush error: {e}")))?;

    String::from_utf8(data).map_err(|e| AppError::Internal(format!("CSV encoding error: {e}")))
}
