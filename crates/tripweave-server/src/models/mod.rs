use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Identity asserted by the identity provider for the current request.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub subject: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(skip_serializing)]
    pub external_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub const USER_COLS: &str = "id, external_id, email, first_name, last_name, created_at, updated_at";

pub fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        external_id: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub user_id: String,
    pub destination: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub is_public: bool,
    pub share_id: Option<String>,
    pub base_currency: String,
    pub created_at: String,
    pub updated_at: String,
}

pub const TRIP_COLS: &str = "id, user_id, destination, start_date, end_date, is_public, share_id, base_currency, created_at, updated_at";

pub fn row_to_trip(row: &rusqlite::Row) -> rusqlite::Result<Trip> {
    Ok(Trip {
        id: row.get(0)?,
        user_id: row.get(1)?,
        destination: row.get(2)?,
        start_date: row.get(3)?,
        end_date: row.get(4)?,
        is_public: row.get(5)?,
        share_id: row.get(6)?,
        base_currency: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItineraryItem {
    pub id: String,
    pub trip_id: String,
    pub name: String,
    pub description: Option<String>,
    pub date: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub order: i64,
    pub cost_cents: Option<i64>,
    pub cost_currency: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub const ITEM_COLS: &str = "id, trip_id, name, description, date, latitude, longitude, address, sort_order, cost_cents, cost_currency, created_at, updated_at";

pub fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<ItineraryItem> {
    Ok(ItineraryItem {
        id: row.get(0)?,
        trip_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        date: row.get(4)?,
        latitude: row.get(5)?,
        longitude: row.get(6)?,
        address: row.get(7)?,
        order: row.get(8)?,
        cost_cents: row.get(9)?,
        cost_currency: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyBudget {
    pub id: String,
    pub trip_id: String,
    pub date: String,
    pub amount_cents: i64,
    pub currency: String,
    pub created_at: String,
    pub updated_at: String,
}

pub const BUDGET_COLS: &str = "id, trip_id, date, amount_cents, currency, created_at, updated_at";

pub fn row_to_budget(row: &rusqlite::Row) -> rusqlite::Result<DailyBudget> {
    Ok(DailyBudget {
        id: row.get(0)?,
        trip_id: row.get(1)?,
        date: row.get(2)?,
        amount_cents: row.get(3)?,
        currency: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub trip_id: String,
    pub itinerary_item_id: Option<String>,
    pub date: String,
    pub amount_cents: i64,
    pub currency: String,
    pub category: String,
    pub note: Option<String>,
    pub receipt_url: Option<String>,
    pub created_at: String,
}

pub const EXPENSE_COLS: &str = "id, trip_id, itinerary_item_id, date, amount_cents, currency, category, note, receipt_url, created_at";

pub fn row_to_expense(row: &rusqlite::Row) -> rusqlite::Result<Expense> {
    Ok(Expense {
        id: row.get(0)?,
        trip_id: row.get(1)?,
        itinerary_item_id: row.get(2)?,
        date: row.get(3)?,
        amount_cents: row.get(4)?,
        currency: row.get(5)?,
        category: row.get(6)?,
        note: row.get(7)?,
        receipt_url: row.get(8)?,
        created_at: row.get(9)?,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyRate {
    pub id: String,
    pub trip_id: String,
    pub currency: String,
    pub rate_to_base: f64,
    pub updated_at: String,
}

pub const RATE_COLS: &str = "id, trip_id, currency, rate_to_base, updated_at";

pub fn row_to_rate(row: &rusqlite::Row) -> rusqlite::Result<CurrencyRate> {
    Ok(CurrencyRate {
        id: row.get(0)?,
        trip_id: row.get(1)?,
        currency: row.get(2)?,
        rate_to_base: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

/// Role stored on a collaborator row or a pending invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorRole {
    Owner,
    Editor,
    Viewer,
}

impl CollaboratorRole {
    pub fn as_str(self) -> &'static str {
        match self {
            CollaboratorRole::Owner => "owner",
            CollaboratorRole::Editor => "editor",
            CollaboratorRole::Viewer => "viewer",
        }
    }
}

impl std::str::FromStr for CollaboratorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(CollaboratorRole::Owner),
            "editor" => Ok(CollaboratorRole::Editor),
            "viewer" => Ok(CollaboratorRole::Viewer),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl ToSql for CollaboratorRole {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CollaboratorRole {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: String,
    pub trip_id: String,
    pub user_id: String,
    pub role: CollaboratorRole,
    pub invited_by: Option<String>,
    pub invited_at: String,
    pub accepted_at: Option<String>,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

pub const COLLABORATOR_COLS: &str = "c.id, c.trip_id, c.user_id, c.role, c.invited_by, c.invited_at, c.accepted_at, u.email, u.first_name, u.last_name";

pub fn row_to_collaborator(row: &rusqlite::Row) -> rusqlite::Result<Collaborator> {
    Ok(Collaborator {
        id: row.get(0)?,
        trip_id: row.get(1)?,
        user_id: row.get(2)?,
        role: row.get(3)?,
        invited_by: row.get(4)?,
        invited_at: row.get(5)?,
        accepted_at: row.get(6)?,
        email: row.get(7)?,
        first_name: row.get(8)?,
        last_name: row.get(9)?,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingInvitation {
    pub id: String,
    pub trip_id: String,
    pub email: String,
    pub role: CollaboratorRole,
    pub invited_by: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub expires_at: String,
    pub created_at: String,
}

pub const INVITATION_COLS: &str = "id, trip_id, email, role, invited_by, token, expires_at, created_at";

pub fn row_to_invitation(row: &rusqlite::Row) -> rusqlite::Result<PendingInvitation> {
    Ok(PendingInvitation {
        id: row.get(0)?,
        trip_id: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        invited_by: row.get(4)?,
        token: row.get(5)?,
        expires_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub id: String,
    pub trip_id: String,
    pub user_id: String,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
    pub actor_email: String,
    pub actor_first_name: Option<String>,
    pub actor_last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Presence {
    pub user_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub last_seen_at: String,
    pub is_active: bool,
}
