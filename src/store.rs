//! SQLite storage for imported reports and the active template.

use rusqlite::{Connection, OptionalExtension as _, Row, params};
use schemars::JsonSchema;

use crate::{prelude::*, template::Template};

/// Format of `imported_at`. Sorts chronologically as text.
const IMPORTED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Columns selected for a [`Report`], in [`Report::from_row`] order.
const REPORT_COLUMNS: &str = "id, order_number, operator_number, report_date, \
     segment1, segment2, segment3, segment4, pdf_path, imported_at";

/// Number of `-`-separated order segments we index.
pub const SEGMENT_COUNT: usize = 4;

/// An imported report.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct Report {
    pub id: i64,
    /// Normalized order number, usually `DDD-DDDD-DDDD-DDD`.
    pub order_number: String,
    pub operator_number: String,
    /// Report date, usually `dd.mm.yyyy`.
    pub report_date: String,
    /// The first four `-`-separated parts of `order_number`, empty if missing.
    pub segments: [String; SEGMENT_COUNT],
    /// Path of the source PDF.
    pub pdf_path: String,
    /// Local time of import, `YYYY-MM-DD HH:MM:SS`.
    pub imported_at: String,
}

impl Report {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            order_number: row.get(1)?,
            operator_number: row.get(2)?,
            report_date: row.get(3)?,
            segments: [
                row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            ],
            pdf_path: row.get(8)?,
            imported_at: row.get(9)?,
        })
    }
}

/// Split an order number into its indexed segments.
pub fn order_segments(order_number: &str) -> [String; SEGMENT_COUNT] {
    let mut parts = order_number.split('-');
    std::array::from_fn(|_| parts.next().unwrap_or_default().to_owned())
}

/// Escape `LIKE` wildcards so `text` only matches itself.
fn like_substring(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Report and template storage.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `path`.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {:?}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database {:?}", path.display()))?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_number TEXT NOT NULL,
                operator_number TEXT NOT NULL,
                report_date TEXT NOT NULL,
                segment1 TEXT,
                segment2 TEXT,
                segment3 TEXT,
                segment4 TEXT,
                pdf_path TEXT NOT NULL,
                imported_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                roi_order TEXT,
                roi_operator TEXT,
                roi_date TEXT
            );
            ",
        )
        .context("failed to create database tables")?;
        Ok(Self { conn })
    }

    /// Replace the active template. Returns the new template's ID.
    pub fn save_template(&mut self, template: &Template) -> Result<i64> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM templates", [])?;
        tx.execute(
            "INSERT INTO templates (name, roi_order, roi_operator, roi_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                template.name,
                template.roi_order,
                template.roi_operator,
                template.roi_date
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit().context("failed to save template")?;
        debug!(id, name = %template.name, "Saved template");
        Ok(id)
    }

    /// The active template, if one has been saved.
    pub fn active_template(&self) -> Result<Option<Template>> {
        self.conn
            .query_row(
                "SELECT id, name, roi_order, roi_operator, roi_date
                 FROM templates ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(Template {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        roi_order: row.get(2)?,
                        roi_operator: row.get(3)?,
                        roi_date: row.get(4)?,
                    })
                },
            )
            .optional()
            .context("failed to load template")
    }

    /// Store a new report. Returns its ID.
    pub fn insert_report(
        &self,
        order_number: &str,
        operator_number: &str,
        report_date: &str,
        pdf_path: &str,
    ) -> Result<i64> {
        let [s1, s2, s3, s4] = order_segments(order_number);
        let imported_at = chrono::Local::now().format(IMPORTED_AT_FORMAT).to_string();
        self.conn
            .execute(
                "INSERT INTO reports (order_number, operator_number, report_date,
                                      segment1, segment2, segment3, segment4,
                                      pdf_path, imported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    order_number,
                    operator_number,
                    report_date,
                    s1,
                    s2,
                    s3,
                    s4,
                    pdf_path,
                    imported_at
                ],
            )
            .context("failed to insert report")?;
        let id = self.conn.last_insert_rowid();
        info!(id, order_number, operator_number, report_date, "Stored report");
        Ok(id)
    }

    /// Change a report's values. `pdf_path` is only replaced when given.
    pub fn update_report(
        &self,
        id: i64,
        order_number: &str,
        operator_number: &str,
        report_date: &str,
        pdf_path: Option<&str>,
    ) -> Result<()> {
        let [s1, s2, s3, s4] = order_segments(order_number);
        let changed = self
            .conn
            .execute(
                "UPDATE reports
                 SET order_number = ?1, operator_number = ?2, report_date = ?3,
                     segment1 = ?4, segment2 = ?5, segment3 = ?6, segment4 = ?7,
                     pdf_path = COALESCE(?8, pdf_path)
                 WHERE id = ?9",
                params![
                    order_number,
                    operator_number,
                    report_date,
                    s1,
                    s2,
                    s3,
                    s4,
                    pdf_path,
                    id
                ],
            )
            .context("failed to update report")?;
        if changed == 0 {
            return Err(anyhow!("no report with ID {}", id));
        }
        Ok(())
    }

    /// Delete a report. Returns `false` if there was no such report.
    pub fn delete_report(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM reports WHERE id = ?1", params![id])
            .context("failed to delete report")?;
        Ok(deleted > 0)
    }

    /// Look up a single report.
    pub fn report(&self, id: i64) -> Result<Option<Report>> {
        self.conn
            .query_row(
                &format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"),
                params![id],
                Report::from_row,
            )
            .optional()
            .context("failed to load report")
    }

    /// All reports, most recently imported first.
    pub fn all_reports(&self) -> Result<Vec<Report>> {
        self.query_reports("", params![])
    }

    /// Reports whose order number, operator number or date contains `text`.
    pub fn search_reports(&self, text: &str) -> Result<Vec<Report>> {
        let pattern = like_substring(text);
        self.query_reports(
            "WHERE order_number LIKE ?1 ESCAPE '\\'
                OR operator_number LIKE ?1 ESCAPE '\\'
                OR report_date LIKE ?1 ESCAPE '\\'",
            params![pattern],
        )
    }

    /// Reports whose order segment `index` (1-based) contains `value`.
    pub fn filter_by_segment(&self, index: usize, value: &str) -> Result<Vec<Report>> {
        if !(1..=SEGMENT_COUNT).contains(&index) {
            return Err(anyhow!(
                "segment must be between 1 and {}, not {}",
                SEGMENT_COUNT,
                index
            ));
        }
        let pattern = like_substring(value);
        self.query_reports(
            &format!("WHERE segment{index} LIKE ?1 ESCAPE '\\'"),
            params![pattern],
        )
    }

    fn query_reports(
        &self,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Report>> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM reports {where_clause}
             ORDER BY imported_at DESC, id DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let reports = stmt
            .query_map(params, Report::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to load reports")?;
        Ok(reports)
    }
}
