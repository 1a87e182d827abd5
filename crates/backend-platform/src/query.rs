use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use backend_core::types::{
    Category, ChatMessage, Notification, Offer, Profile, Review, ServiceRequest,
};

/// Named collection in the platform store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Profiles,
    Requests,
    Offers,
    Messages,
    Reviews,
    Categories,
    Notifications,
}

impl Table {
    /// Every collection, in declaration order.
    pub const ALL: [Table; 7] = [
        Table::Profiles,
        Table::Requests,
        Table::Offers,
        Table::Messages,
        Table::Reviews,
        Table::Categories,
        Table::Notifications,
    ];

    /// Stored collection name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Profiles => "profiles",
            Table::Requests => "requests",
            Table::Offers => "offers",
            Table::Messages => "messages",
            Table::Reviews => "reviews",
            Table::Categories => "categories",
            Table::Notifications => "notifications",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed row crossing the store boundary.
///
/// The wrapper keeps the store surface generic while every payload stays a
/// plain domain record, so consumers match on the variant instead of
/// poking at raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "table", content = "data", rename_all = "snake_case")]
pub enum Row {
    Profile(Profile),
    Request(ServiceRequest),
    Offer(Offer),
    Message(ChatMessage),
    Review(Review),
    Category(Category),
    Notification(Notification),
}

impl Row {
    /// Collection this row belongs to.
    pub fn table(&self) -> Table {
        match self {
            Row::Profile(_) => Table::Profiles,
            Row::Request(_) => Table::Requests,
            Row::Offer(_) => Table::Offers,
            Row::Message(_) => Table::Messages,
            Row::Review(_) => Table::Reviews,
            Row::Category(_) => Table::Categories,
            Row::Notification(_) => Table::Notifications,
        }
    }

    /// Row ID.
    pub fn id(&self) -> &str {
        match self {
            Row::Profile(p) => &p.id,
            Row::Request(r) => &r.id,
            Row::Offer(o) => &o.id,
            Row::Message(m) => &m.id,
            Row::Review(r) => &r.id,
            Row::Category(c) => &c.id,
            Row::Notification(n) => &n.id,
        }
    }

    /// JSON representation of the payload record, used for generic
    /// filtering and patching.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        match self {
            Row::Profile(p) => serde_json::to_value(p),
            Row::Request(r) => serde_json::to_value(r),
            Row::Offer(o) => serde_json::to_value(o),
            Row::Message(m) => serde_json::to_value(m),
            Row::Review(r) => serde_json::to_value(r),
            Row::Category(c) => serde_json::to_value(c),
            Row::Notification(n) => serde_json::to_value(n),
        }
    }

    /// Rebuild a typed row for `table` from its JSON representation.
    pub fn from_value(table: Table, value: Value) -> serde_json::Result<Row> {
        Ok(match table {
            Table::Profiles => Row::Profile(serde_json::from_value(value)?),
            Table::Requests => Row::Request(serde_json::from_value(value)?),
            Table::Offers => Row::Offer(serde_json::from_value(value)?),
            Table::Messages => Row::Message(serde_json::from_value(value)?),
            Table::Reviews => Row::Review(serde_json::from_value(value)?),
            Table::Categories => Row::Category(serde_json::from_value(value)?),
            Table::Notifications => Row::Notification(serde_json::from_value(value)?),
        })
    }
}

/// Row predicate evaluated against the JSON representation.
///
/// Column names are the serde field names of the payload record. A missing
/// column reads as JSON `null`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Filter {
    /// Column equals value.
    Eq { column: String, value: Value },
    /// Column differs from value.
    Neq { column: String, value: Value },
    /// Column equals one of the values.
    In { column: String, values: Vec<Value> },
    /// Every inner filter holds.
    And(Vec<Filter>),
    /// At least one inner filter holds.
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn neq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Neq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::In {
            column: column.into(),
            values,
        }
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    /// Whether `row` (a JSON object) satisfies this filter.
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Filter::Eq { column, value } => row.get(column).unwrap_or(&Value::Null) == value,
            Filter::Neq { column, value } => row.get(column).unwrap_or(&Value::Null) != value,
            Filter::In { column, values } => {
                let field = row.get(column).unwrap_or(&Value::Null);
                values.iter().any(|v| v == field)
            }
            Filter::And(filters) => filters.iter().all(|f| f.matches(row)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(row)),
        }
    }
}

/// Sort key applied after filtering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// Filtered, ordered, limited read over one collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectQuery {
    pub table: Table,
    /// Top-level filters combine as a conjunction.
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(OrderBy {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Column assignments applied by an update.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Patch {
    assignments: Vec<(String, Value)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    pub fn assignments(&self) -> &[(String, Value)] {
        &self.assignments
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Write the assignments into a row's JSON object representation.
    pub fn apply_to(&self, row: &mut Value) {
        if let Value::Object(fields) = row {
            for (column, value) in &self.assignments {
                fields.insert(column.clone(), value.clone());
            }
        }
    }
}

/// Change notification delivered to table subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreEvent {
    pub table: Table,
    pub change: StoreChange,
}

/// The mutation a `StoreEvent` describes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StoreChange {
    /// A row was created; carries the stored row.
    Inserted(Row),
    /// A row changed; carries the row after the change.
    Updated(Row),
    /// A row was removed; only the ID survives.
    Deleted { id: String },
}

impl StoreEvent {
    pub fn inserted(row: Row) -> Self {
        Self {
            table: row.table(),
            change: StoreChange::Inserted(row),
        }
    }

    pub fn updated(row: Row) -> Self {
        Self {
            table: row.table(),
            change: StoreChange::Updated(row),
        }
    }

    pub fn deleted(table: Table, id: impl Into<String>) -> Self {
        Self {
            table,
            change: StoreChange::Deleted { id: id.into() },
        }
    }
}

/// Total order over the JSON values our columns hold.
///
/// Numbers, strings and bools compare within their own kind; mixed kinds
/// compare equal so an odd row never panics a sort.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use backend_core::types::RequestStatus;

    fn request_value() -> Value {
        json!({
            "id": "r-1",
            "customer_id": "u-1",
            "category_id": "c-1",
            "title": "Oprava kohoutku",
            "description": "Kape voda",
            "status": "open",
            "created_at_ms": 1000,
        })
    }

    #[test]
    fn eq_and_neq_filters_match_columns() {
        let row = request_value();
        assert!(Filter::eq("status", RequestStatus::Open.as_str()).matches(&row));
        assert!(!Filter::eq("status", "completed").matches(&row));
        assert!(Filter::neq("customer_id", "u-2").matches(&row));
        assert!(!Filter::neq("customer_id", "u-1").matches(&row));
    }

    #[test]
    fn missing_columns_read_as_null() {
        let row = request_value();
        assert!(!Filter::eq("no_such_column", "x").matches(&row));
        assert!(Filter::eq("no_such_column", Value::Null).matches(&row));
    }

    #[test]
    fn in_filter_matches_any_listed_value() {
        let row = request_value();
        assert!(Filter::is_in("id", vec![json!("r-9"), json!("r-1")]).matches(&row));
        assert!(!Filter::is_in("id", vec![json!("r-9")]).matches(&row));
        assert!(!Filter::is_in("id", Vec::new()).matches(&row));
    }

    #[test]
    fn boolean_combinators_nest() {
        let row = request_value();
        // (customer u-1 AND status open) OR id r-9
        let filter = Filter::or(vec![
            Filter::and(vec![
                Filter::eq("customer_id", "u-1"),
                Filter::eq("status", "open"),
            ]),
            Filter::eq("id", "r-9"),
        ]);
        assert!(filter.matches(&row));

        let filter = Filter::or(vec![
            Filter::and(vec![
                Filter::eq("customer_id", "u-1"),
                Filter::eq("status", "completed"),
            ]),
            Filter::eq("id", "r-9"),
        ]);
        assert!(!filter.matches(&row));
    }

    #[test]
    fn patch_overwrites_listed_columns_only() {
        let mut row = request_value();
        Patch::new()
            .set("status", "in_progress")
            .set("title", "Oprava baterie")
            .apply_to(&mut row);
        assert_eq!(row.get("status"), Some(&json!("in_progress")));
        assert_eq!(row.get("title"), Some(&json!("Oprava baterie")));
        assert_eq!(row.get("customer_id"), Some(&json!("u-1")));
    }

    #[test]
    fn row_roundtrips_through_json_representation() {
        let row = Row::Request(ServiceRequest {
            id: "r-1".into(),
            customer_id: "u-1".into(),
            category_id: "c-1".into(),
            title: "Oprava kohoutku".into(),
            description: "Kape voda".into(),
            status: RequestStatus::Open,
            created_at_ms: 1000,
        });

        let value = row.to_value().expect("row should serialize");
        let back = Row::from_value(Table::Requests, value).expect("row should deserialize");
        assert_eq!(back, row);
        assert_eq!(back.table(), Table::Requests);
        assert_eq!(back.id(), "r-1");
    }

    #[test]
    fn store_events_derive_table_from_row() {
        let event = StoreEvent::inserted(Row::Category(Category {
            id: "c-1".into(),
            name: "Instalatérství".into(),
        }));
        assert_eq!(event.table, Table::Categories);

        let event = StoreEvent::deleted(Table::Messages, "m-1");
        assert_eq!(event.table, Table::Messages);
        assert_eq!(
            event.change,
            StoreChange::Deleted { id: "m-1".into() }
        );
    }

    #[test]
    fn compares_number_and_string_columns() {
        assert_eq!(compare_values(&json!(1), &json!(2)), Ordering::Less);
        assert_eq!(compare_values(&json!("a"), &json!("b")), Ordering::Less);
        assert_eq!(compare_values(&json!(true), &json!(false)), Ordering::Greater);
        assert_eq!(compare_values(&json!(1), &json!("a")), Ordering::Equal);
    }
}
