use rusqlite::Connection;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS departments (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    total_beds  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS bed_status (
    id             TEXT PRIMARY KEY,
    department_id  TEXT NOT NULL,
    occupied_beds  INTEGER NOT NULL,
    total_beds     INTEGER NOT NULL,
    recorded_at    INTEGER NOT NULL,
    admissions     INTEGER,
    discharges     INTEGER
);
CREATE INDEX IF NOT EXISTS idx_bed_status_dept_time ON bed_status (department_id, recorded_at);

CREATE TABLE IF NOT EXISTS forecasts (
    id                    TEXT PRIMARY KEY,
    department_id         TEXT NOT NULL,
    forecasted_occupancy  INTEGER NOT NULL,
    total_beds            INTEGER NOT NULL,
    confidence            REAL NOT NULL,
    icu_beds              INTEGER NOT NULL,
    model_version         TEXT NOT NULL,
    generated_at          INTEGER NOT NULL,
    target_for            INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_forecasts_target ON forecasts (target_for);

CREATE TABLE IF NOT EXISTS alerts (
    id             TEXT PRIMARY KEY,
    department_id  TEXT NOT NULL,
    forecast_id    TEXT NOT NULL,
    severity       TEXT NOT NULL,
    message        TEXT NOT NULL,
    acknowledged   INTEGER NOT NULL DEFAULT 0,
    created_at     INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS accuracy_records (
    forecast_id       TEXT PRIMARY KEY,
    department_id     TEXT NOT NULL,
    actual_occupancy  INTEGER NOT NULL,
    absolute_error    INTEGER NOT NULL,
    running_accuracy  REAL NOT NULL,
    evaluated_at      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS agent_logs (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    agent      TEXT NOT NULL,
    action     TEXT NOT NULL,
    metadata   TEXT NOT NULL,
    timestamp  INTEGER NOT NULL
);
"#;

pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}
