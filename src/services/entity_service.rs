use chrono::Utc;
use serde_json::{json, Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, QueryBuilder, Row, SqlitePool, TypeInfo};

use crate::error::{Error, Result};

/// Registry of the plain record tables. Every entry is served by the same
/// list/insert/update/delete handlers; only the column allow-list, the list
/// ordering, and an optional natural key differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityTable {
    Assignments,
    ClinicalShifts,
    Requirements,
    Goals,
    Grades,
    Flashcards,
    StressLogs,
    WeeklyActivities,
}

pub const ENTITY_TABLES: [EntityTable; 8] = [
    EntityTable::Assignments,
    EntityTable::ClinicalShifts,
    EntityTable::Requirements,
    EntityTable::Goals,
    EntityTable::Grades,
    EntityTable::Flashcards,
    EntityTable::StressLogs,
    EntityTable::WeeklyActivities,
];

impl EntityTable {
    pub fn from_path(segment: &str) -> Option<Self> {
        match segment {
            "assignments" => Some(Self::Assignments),
            "clinical-shifts" => Some(Self::ClinicalShifts),
            "requirements" => Some(Self::Requirements),
            "goals" => Some(Self::Goals),
            "grades" => Some(Self::Grades),
            "flashcards" => Some(Self::Flashcards),
            "stress-logs" => Some(Self::StressLogs),
            "weekly-activities" => Some(Self::WeeklyActivities),
            _ => None,
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Assignments => "assignments",
            Self::ClinicalShifts => "clinical_shifts",
            Self::Requirements => "requirements",
            Self::Goals => "goals",
            Self::Grades => "grades",
            Self::Flashcards => "flashcards",
            Self::StressLogs => "stress_logs",
            Self::WeeklyActivities => "weekly_activities",
        }
    }

    fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Assignments => &["title", "course", "due_date", "weight", "status", "completed"],
            Self::ClinicalShifts => &["date", "start_time", "end_time", "location", "unit", "hours"],
            Self::Requirements => &["name", "deadline", "status", "renewal_months"],
            Self::Goals => &[
                "title",
                "description",
                "target_date",
                "category",
                "completed",
                "created_date",
            ],
            Self::Grades => &[
                "course",
                "assessment",
                "type",
                "grade",
                "max_points",
                "weight",
                "date",
                "percentage",
            ],
            Self::Flashcards => &["question", "answer"],
            Self::StressLogs => &[
                "date",
                "stress_level",
                "mood",
                "notes",
                "study_hours",
                "sleep_hours",
            ],
            Self::WeeklyActivities => &["day", "start_time", "end_time", "title", "category"],
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            Self::Assignments => "due_date ASC",
            Self::ClinicalShifts => "date ASC",
            Self::Requirements => "deadline ASC",
            Self::Goals => "target_date ASC",
            Self::Grades => "date DESC",
            Self::Flashcards => "created_at DESC",
            Self::StressLogs => "date DESC",
            Self::WeeklyActivities => "day ASC, start_time ASC",
        }
    }

    // Stress logs keep one row per day; a re-submission overwrites it.
    fn conflict_column(&self) -> Option<&'static str> {
        match self {
            Self::StressLogs => Some("date"),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct EntityService {
    pool: SqlitePool,
}

impl EntityService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, table: EntityTable) -> Result<Vec<Value>> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY {}",
            table.table_name(),
            table.order_by()
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    pub async fn insert(&self, table: EntityTable, fields: &Map<String, Value>) -> Result<i64> {
        let mut entries = normalize_fields(table, fields);
        if table == EntityTable::Grades {
            apply_grade_percentage(&mut entries);
        }
        if entries.is_empty() {
            return Err(Error::BadRequest(
                "No recognized fields in request body".to_string(),
            ));
        }

        let mut builder = QueryBuilder::new(format!("INSERT INTO {} (", table.table_name()));
        let mut separated = builder.separated(", ");
        for (column, _) in &entries {
            separated.push(column.as_str());
        }
        builder.push(") VALUES (");
        let mut separated = builder.separated(", ");
        for (_, value) in &entries {
            match value {
                Value::Null => {
                    separated.push_bind(None::<String>);
                }
                Value::Bool(b) => {
                    separated.push_bind(*b);
                }
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        separated.push_bind(i);
                    } else {
                        separated.push_bind(n.as_f64().unwrap_or(0.0));
                    }
                }
                Value::String(s) => {
                    separated.push_bind(s.clone());
                }
                other => {
                    separated.push_bind(other.to_string());
                }
            }
        }
        builder.push(")");

        if let Some(conflict) = table.conflict_column() {
            builder.push(format!(" ON CONFLICT({}) DO UPDATE SET ", conflict));
            let mut separated = builder.separated(", ");
            for (column, _) in entries.iter().filter(|(column, _)| column.as_str() != conflict) {
                separated.push(format!("{col} = excluded.{col}", col = column));
            }
        }

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update(
        &self,
        table: EntityTable,
        id: i64,
        fields: &Map<String, Value>,
    ) -> Result<()> {
        let entries = normalize_fields(table, fields);
        if entries.is_empty() {
            return Err(Error::BadRequest(
                "No recognized fields in request body".to_string(),
            ));
        }

        let mut builder = QueryBuilder::new(format!("UPDATE {} SET ", table.table_name()));
        let mut separated = builder.separated(", ");
        for (column, value) in &entries {
            separated.push(format!("{} = ", column));
            match value {
                Value::Null => {
                    separated.push_bind_unseparated(None::<String>);
                }
                Value::Bool(b) => {
                    separated.push_bind_unseparated(*b);
                }
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        separated.push_bind_unseparated(i);
                    } else {
                        separated.push_bind_unseparated(n.as_f64().unwrap_or(0.0));
                    }
                }
                Value::String(s) => {
                    separated.push_bind_unseparated(s.clone());
                }
                other => {
                    separated.push_bind_unseparated(other.to_string());
                }
            }
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "No {} row with id {}",
                table.table_name(),
                id
            )));
        }
        Ok(())
    }

    pub async fn delete(&self, table: EntityTable, id: i64) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", table.table_name());
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_settings(&self) -> Result<Map<String, Value>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect())
    }

    pub async fn save_settings(&self, values: &Map<String, Value>) -> Result<()> {
        for (key, value) in values {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            sqlx::query(
                r#"
                INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(rendered)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Seed the certification checklist a nursing student starts with. A
    /// no-op when requirements already exist.
    pub async fn initialize_defaults(&self) -> Result<bool> {
        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM requirements")
            .fetch_one(&self.pool)
            .await?;
        if existing > 0 {
            return Ok(false);
        }

        const DEFAULT_REQUIREMENTS: [(&str, &str, i64); 7] = [
            ("ERV Letter (Year 1)", "2025-08-01", 12),
            ("ERV Letter (Year 2)", "2026-08-01", 12),
            ("Health Assessment Record", "2025-08-01", 12),
            ("CPR-BLS", "2025-08-01", 12),
            ("Standard First Aid", "2025-08-01", 36),
            ("Mask Fit", "2025-08-01", 24),
            ("Police Vulnerable Sector Check", "2025-08-01", 12),
        ];
        for (name, deadline, renewal_months) in DEFAULT_REQUIREMENTS {
            sqlx::query(
                "INSERT INTO requirements (name, deadline, status, renewal_months) VALUES (?, ?, 'pending', ?)",
            )
            .bind(name)
            .bind(deadline)
            .bind(renewal_months)
            .execute(&self.pool)
            .await?;
        }

        let mut defaults = Map::new();
        defaults.insert("currentSemester".to_string(), Value::String("1".to_string()));
        self.save_settings(&defaults).await?;
        Ok(true)
    }

    pub async fn backup(&self) -> Result<Value> {
        let mut backup = Map::new();
        for table in ENTITY_TABLES {
            backup.insert(
                table.table_name().to_string(),
                Value::Array(self.list(table).await?),
            );
        }
        backup.insert("settings".to_string(), Value::Object(self.get_settings().await?));
        backup.insert(
            "backup_date".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        Ok(Value::Object(backup))
    }
}

/// Map incoming JSON keys (camelCase or snake_case) onto the table's column
/// allow-list; anything unrecognized is dropped.
fn normalize_fields(table: EntityTable, fields: &Map<String, Value>) -> Vec<(String, Value)> {
    let allowed = table.columns();
    let mut entries: Vec<(String, Value)> = Vec::new();
    for (key, value) in fields {
        let column = camel_to_snake(key);
        if allowed.contains(&column.as_str()) && !entries.iter().any(|(c, _)| *c == column) {
            entries.push((column, value.clone()));
        }
    }
    entries
}

fn camel_to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

// Grade entries store a precomputed percentage, like the rest of the app
// expects to read back.
fn apply_grade_percentage(entries: &mut Vec<(String, Value)>) {
    let number = |entries: &[(String, Value)], name: &str| {
        entries
            .iter()
            .find(|(column, _)| column == name)
            .and_then(|(_, value)| value.as_f64())
    };

    if let (Some(grade), Some(max_points)) = (number(entries, "grade"), number(entries, "max_points"))
    {
        if max_points > 0.0 {
            let percentage = (grade / max_points * 100.0).round();
            entries.retain(|(column, _)| column != "percentage");
            entries.push(("percentage".to_string(), json!(percentage)));
        }
    }
}

fn row_to_json(row: &SqliteRow) -> Value {
    let mut object = Map::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let value = match column.type_info().name() {
            "INTEGER" => row
                .try_get::<Option<i64>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from),
            "BOOLEAN" => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from),
            "REAL" => row
                .try_get::<Option<f64>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from),
            _ => row
                .try_get::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from),
        };
        object.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    Value::Object(object)
}
