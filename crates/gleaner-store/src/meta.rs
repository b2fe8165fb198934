//! SQLite metadata store
//!
//! Projects, sources, extractions, entities, and jobs live in one SQLite
//! database. The schema is created at open; UUIDs and timestamps are stored
//! as text (RFC 3339), JSON columns as serialized text.
//!
//! Writes normally autocommit. During schema extraction the pipeline opens a
//! chunk transaction with [`MetaStore::begin_chunk`] so a chunk's extraction
//! rows, entity rows, and the job checkpoint commit as one unit.

use crate::StoreError;
use chrono::{DateTime, Utc};
use gleaner_domain::{
    Entity, Extraction, Job, JobStatus, Project, Source, SourceStatus,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL UNIQUE,
    description   TEXT NOT NULL DEFAULT '',
    extraction_schema TEXT,
    entity_types  TEXT NOT NULL DEFAULT '[]',
    classification TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sources (
    id            TEXT PRIMARY KEY,
    project_id    TEXT NOT NULL REFERENCES projects(id),
    uri           TEXT NOT NULL,
    source_group  TEXT NOT NULL,
    kind          TEXT NOT NULL,
    status        TEXT NOT NULL,
    content       TEXT,
    raw_content   TEXT,
    title         TEXT,
    links         TEXT,
    metadata      TEXT,
    page_type     TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE(project_id, uri)
);

CREATE TABLE IF NOT EXISTS extractions (
    id               TEXT PRIMARY KEY,
    project_id       TEXT NOT NULL REFERENCES projects(id),
    source_id        TEXT NOT NULL REFERENCES sources(id),
    extraction_type  TEXT NOT NULL,
    source_group     TEXT NOT NULL,
    data             TEXT NOT NULL,
    confidence       REAL,
    profile_used     TEXT,
    chunk_index      INTEGER,
    embedding_id     TEXT,
    entities_extracted INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_extractions_source ON extractions(source_id);
CREATE INDEX IF NOT EXISTS idx_extractions_project ON extractions(project_id);

CREATE TABLE IF NOT EXISTS entities (
    id               TEXT PRIMARY KEY,
    project_id       TEXT NOT NULL REFERENCES projects(id),
    source_group     TEXT NOT NULL,
    entity_type      TEXT NOT NULL,
    value            TEXT NOT NULL,
    normalized_value TEXT NOT NULL,
    attributes       TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    UNIQUE(project_id, source_group, entity_type, normalized_value)
);

CREATE TABLE IF NOT EXISTS extraction_entities (
    entity_id     TEXT NOT NULL REFERENCES entities(id),
    extraction_id TEXT NOT NULL REFERENCES extractions(id),
    PRIMARY KEY (entity_id, extraction_id)
);

CREATE TABLE IF NOT EXISTS jobs (
    id            TEXT PRIMARY KEY,
    project_id    TEXT,
    kind          TEXT NOT NULL,
    status        TEXT NOT NULL,
    priority      INTEGER NOT NULL DEFAULT 0,
    payload       TEXT NOT NULL DEFAULT '{}',
    result        TEXT,
    error         TEXT,
    created_at    TEXT NOT NULL,
    started_at    TEXT,
    completed_at  TEXT
);
"#;

fn conversion_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_uuid(raw: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&raw).map_err(conversion_error)
}

fn parse_datetime(raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(conversion_error)
}

fn parse_json(raw: Option<String>) -> rusqlite::Result<serde_json::Value> {
    match raw {
        Some(text) => serde_json::from_str(&text).map_err(conversion_error),
        None => Ok(serde_json::Value::Null),
    }
}

/// The SQLite metadata store
///
/// The connection sits behind a mutex; statements are short, so contention
/// stays negligible next to the LLM and network round trips around them.
pub struct MetaStore {
    conn: Mutex<Connection>,
}

impl MetaStore {
    /// Open (creating if needed) a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (tests)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("meta store lock")
    }

    // ---- chunk transactions -------------------------------------------------

    /// Open the chunk transaction
    ///
    /// Everything written until [`commit_chunk`](Self::commit_chunk) lands
    /// atomically; a crash in between loses the whole chunk.
    pub fn begin_chunk(&self) -> Result<(), StoreError> {
        self.lock().execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    /// Commit the chunk transaction
    pub fn commit_chunk(&self) -> Result<(), StoreError> {
        self.lock().execute_batch("COMMIT")?;
        Ok(())
    }

    /// Roll back the chunk transaction
    pub fn rollback_chunk(&self) -> Result<(), StoreError> {
        self.lock().execute_batch("ROLLBACK")?;
        Ok(())
    }

    // ---- projects -----------------------------------------------------------

    /// Insert a project
    pub fn insert_project(&self, project: &Project) -> Result<(), StoreError> {
        let schema = project
            .extraction_schema
            .as_ref()
            .map(|s| serde_json::to_string(s).expect("schema serialises"));
        let classification = project
            .classification
            .as_ref()
            .map(|c| serde_json::to_string(c).expect("classification serialises"));
        self.lock().execute(
            "INSERT INTO projects (id, name, description, extraction_schema, entity_types, classification, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                project.id.to_string(),
                project.name,
                project.description,
                schema,
                serde_json::to_string(&project.entity_types).expect("entity types serialise"),
                classification,
                project.created_at.to_rfc3339(),
                project.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn row_to_project(row: &Row<'_>) -> rusqlite::Result<Project> {
        let schema: Option<String> = row.get("extraction_schema")?;
        let classification: Option<String> = row.get("classification")?;
        let entity_types: String = row.get("entity_types")?;
        Ok(Project {
            id: parse_uuid(row.get("id")?)?,
            name: row.get("name")?,
            description: row.get("description")?,
            extraction_schema: schema
                .map(|s| serde_json::from_str(&s).map_err(conversion_error))
                .transpose()?,
            entity_types: serde_json::from_str(&entity_types).map_err(conversion_error)?,
            classification: classification
                .map(|s| serde_json::from_str(&s).map_err(conversion_error))
                .transpose()?,
            created_at: parse_datetime(row.get("created_at")?)?,
            updated_at: parse_datetime(row.get("updated_at")?)?,
        })
    }

    /// Fetch a project by id
    pub fn get_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        let conn = self.lock();
        let project = conn
            .query_row(
                "SELECT * FROM projects WHERE id = ?1",
                params![id.to_string()],
                Self::row_to_project,
            )
            .optional()?;
        Ok(project)
    }

    /// Fetch a project by its unique name
    pub fn get_project_by_name(&self, name: &str) -> Result<Option<Project>, StoreError> {
        let conn = self.lock();
        let project = conn
            .query_row(
                "SELECT * FROM projects WHERE name = ?1",
                params![name],
                Self::row_to_project,
            )
            .optional()?;
        Ok(project)
    }

    // ---- sources ------------------------------------------------------------

    /// Insert a source
    pub fn insert_source(&self, source: &Source) -> Result<(), StoreError> {
        let links = source
            .links
            .as_ref()
            .map(|l| serde_json::to_string(l).expect("links serialise"));
        let metadata = match &source.metadata {
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        };
        self.lock().execute(
            "INSERT INTO sources (id, project_id, uri, source_group, kind, status, content, raw_content, title, links, metadata, page_type, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                source.id.to_string(),
                source.project_id.to_string(),
                source.uri,
                source.source_group,
                serde_json::to_string(&source.kind).expect("kind serialises").trim_matches('"'),
                source.status.as_str(),
                source.content,
                source.raw_content,
                source.title,
                links,
                metadata,
                source.page_type,
                source.created_at.to_rfc3339(),
                source.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn row_to_source(row: &Row<'_>) -> rusqlite::Result<Source> {
        let kind: String = row.get("kind")?;
        let status: String = row.get("status")?;
        let links: Option<String> = row.get("links")?;
        Ok(Source {
            id: parse_uuid(row.get("id")?)?,
            project_id: parse_uuid(row.get("project_id")?)?,
            uri: row.get("uri")?,
            source_group: row.get("source_group")?,
            kind: serde_json::from_str(&format!("\"{kind}\"")).map_err(conversion_error)?,
            status: SourceStatus::from_str(&status).map_err(conversion_error)?,
            content: row.get("content")?,
            raw_content: row.get("raw_content")?,
            title: row.get("title")?,
            links: links
                .map(|l| serde_json::from_str(&l).map_err(conversion_error))
                .transpose()?,
            metadata: parse_json(row.get("metadata")?)?,
            page_type: row.get("page_type")?,
            created_at: parse_datetime(row.get("created_at")?)?,
            updated_at: parse_datetime(row.get("updated_at")?)?,
        })
    }

    /// Fetch a source by id
    pub fn get_source(&self, id: Uuid) -> Result<Option<Source>, StoreError> {
        let conn = self.lock();
        let source = conn
            .query_row(
                "SELECT * FROM sources WHERE id = ?1",
                params![id.to_string()],
                Self::row_to_source,
            )
            .optional()?;
        Ok(source)
    }

    /// Update a source's lifecycle status
    pub fn update_source_status(&self, id: Uuid, status: SourceStatus) -> Result<(), StoreError> {
        let changed = self.lock().execute(
            "UPDATE sources SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { what: "source", id: id.to_string() });
        }
        Ok(())
    }

    /// Sources of a project in a given status
    pub fn sources_by_status(
        &self,
        project_id: Uuid,
        status: SourceStatus,
    ) -> Result<Vec<Source>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM sources WHERE project_id = ?1 AND status = ?2 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(
            params![project_id.to_string(), status.as_str()],
            Self::row_to_source,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Sources eligible for schema extraction: pending, ready, or already
    /// extracted, with non-null content, optionally filtered by source group
    pub fn extractable_sources(
        &self,
        project_id: Uuid,
        source_groups: Option<&[String]>,
    ) -> Result<Vec<Source>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM sources
             WHERE project_id = ?1
               AND status IN ('pending', 'ready', 'extracted')
               AND content IS NOT NULL
             ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![project_id.to_string()], Self::row_to_source)?;
        let mut sources = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        if let Some(groups) = source_groups {
            sources.retain(|s| groups.iter().any(|g| g == &s.source_group));
        }
        Ok(sources)
    }

    // ---- extractions --------------------------------------------------------

    /// Insert an extraction
    pub fn insert_extraction(&self, extraction: &Extraction) -> Result<(), StoreError> {
        self.lock().execute(
            "INSERT INTO extractions (id, project_id, source_id, extraction_type, source_group, data, confidence, profile_used, chunk_index, embedding_id, entities_extracted, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                extraction.id.to_string(),
                extraction.project_id.to_string(),
                extraction.source_id.to_string(),
                extraction.extraction_type,
                extraction.source_group,
                extraction.data.to_string(),
                extraction.confidence,
                extraction.profile_used,
                extraction.chunk_index.map(|i| i as i64),
                extraction.embedding_id,
                extraction.entities_extracted as i64,
                extraction.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn row_to_extraction(row: &Row<'_>) -> rusqlite::Result<Extraction> {
        let data: String = row.get("data")?;
        let chunk_index: Option<i64> = row.get("chunk_index")?;
        let entities_extracted: i64 = row.get("entities_extracted")?;
        Ok(Extraction {
            id: parse_uuid(row.get("id")?)?,
            project_id: parse_uuid(row.get("project_id")?)?,
            source_id: parse_uuid(row.get("source_id")?)?,
            extraction_type: row.get("extraction_type")?,
            source_group: row.get("source_group")?,
            data: serde_json::from_str(&data).map_err(conversion_error)?,
            confidence: row.get("confidence")?,
            profile_used: row.get("profile_used")?,
            chunk_index: chunk_index.map(|i| i as usize),
            embedding_id: row.get("embedding_id")?,
            entities_extracted: entities_extracted != 0,
            created_at: parse_datetime(row.get("created_at")?)?,
        })
    }

    /// Extractions belonging to a source
    pub fn extractions_for_source(&self, source_id: Uuid) -> Result<Vec<Extraction>, StoreError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT * FROM extractions WHERE source_id = ?1 ORDER BY created_at")?;
        let rows = stmt.query_map(params![source_id.to_string()], Self::row_to_extraction)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Count a project's extractions
    pub fn count_extractions(&self, project_id: Uuid) -> Result<u64, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM extractions WHERE project_id = ?1",
            params![project_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Flip `entities_extracted` once all entity calls for a payload succeeded
    pub fn set_entities_extracted(&self, extraction_id: Uuid) -> Result<(), StoreError> {
        let changed = self.lock().execute(
            "UPDATE extractions SET entities_extracted = 1 WHERE id = ?1",
            params![extraction_id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { what: "extraction", id: extraction_id.to_string() });
        }
        Ok(())
    }

    // ---- entities -----------------------------------------------------------

    fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<Entity> {
        Ok(Entity {
            id: parse_uuid(row.get("id")?)?,
            project_id: parse_uuid(row.get("project_id")?)?,
            source_group: row.get("source_group")?,
            entity_type: row.get("entity_type")?,
            value: row.get("value")?,
            normalized_value: row.get("normalized_value")?,
            attributes: parse_json(row.get("attributes")?)?,
            created_at: parse_datetime(row.get("created_at")?)?,
            updated_at: parse_datetime(row.get("updated_at")?)?,
        })
    }

    /// Fetch-or-insert on the entity uniqueness key; the bool is true when a
    /// new row was created
    pub fn get_or_create_entity(
        &self,
        project_id: Uuid,
        source_group: &str,
        entity_type: &str,
        value: &str,
        normalized_value: &str,
        attributes: &serde_json::Value,
    ) -> Result<(Entity, bool), StoreError> {
        let conn = self.lock();
        let existing = conn
            .query_row(
                "SELECT * FROM entities
                 WHERE project_id = ?1 AND source_group = ?2 AND entity_type = ?3 AND normalized_value = ?4",
                params![project_id.to_string(), source_group, entity_type, normalized_value],
                Self::row_to_entity,
            )
            .optional()?;
        if let Some(entity) = existing {
            return Ok((entity, false));
        }

        let entity = {
            let mut fresh = Entity::new(project_id, source_group, entity_type, value, normalized_value);
            fresh.attributes = attributes.clone();
            fresh
        };
        let attributes_text = match &entity.attributes {
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        };
        conn.execute(
            "INSERT INTO entities (id, project_id, source_group, entity_type, value, normalized_value, attributes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entity.id.to_string(),
                entity.project_id.to_string(),
                entity.source_group,
                entity.entity_type,
                entity.value,
                entity.normalized_value,
                attributes_text,
                entity.created_at.to_rfc3339(),
                entity.updated_at.to_rfc3339(),
            ],
        )?;
        Ok((entity, true))
    }

    /// Link an entity to an extraction; the bool is true when the link was new
    pub fn link_entity(&self, entity_id: Uuid, extraction_id: Uuid) -> Result<bool, StoreError> {
        let changed = self.lock().execute(
            "INSERT OR IGNORE INTO extraction_entities (entity_id, extraction_id) VALUES (?1, ?2)",
            params![entity_id.to_string(), extraction_id.to_string()],
        )?;
        Ok(changed > 0)
    }

    /// Count a project's entities
    pub fn count_entities(&self, project_id: Uuid) -> Result<u64, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE project_id = ?1",
            params![project_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ---- jobs ---------------------------------------------------------------

    /// Insert a job
    pub fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        self.lock().execute(
            "INSERT INTO jobs (id, project_id, kind, status, priority, payload, result, error, created_at, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                job.id.to_string(),
                job.project_id.map(|p| p.to_string()),
                serde_json::to_string(&job.kind).expect("kind serialises").trim_matches('"'),
                job.status.as_str(),
                job.priority,
                job.payload.to_string(),
                job.result.as_ref().map(|r| r.to_string()),
                job.error,
                job.created_at.to_rfc3339(),
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
        let project_id: Option<String> = row.get("project_id")?;
        let kind: String = row.get("kind")?;
        let status: String = row.get("status")?;
        let payload: String = row.get("payload")?;
        let result: Option<String> = row.get("result")?;
        let started_at: Option<String> = row.get("started_at")?;
        let completed_at: Option<String> = row.get("completed_at")?;
        Ok(Job {
            id: parse_uuid(row.get("id")?)?,
            project_id: project_id.map(parse_uuid).transpose()?,
            kind: serde_json::from_str(&format!("\"{kind}\"")).map_err(conversion_error)?,
            status: JobStatus::from_str(&status).map_err(conversion_error)?,
            priority: row.get("priority")?,
            payload: serde_json::from_str(&payload).map_err(conversion_error)?,
            result: result
                .map(|r| serde_json::from_str(&r).map_err(conversion_error))
                .transpose()?,
            error: row.get("error")?,
            created_at: parse_datetime(row.get("created_at")?)?,
            started_at: started_at.map(parse_datetime).transpose()?,
            completed_at: completed_at.map(parse_datetime).transpose()?,
        })
    }

    /// Fetch a job by id
    pub fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let conn = self.lock();
        let job = conn
            .query_row(
                "SELECT * FROM jobs WHERE id = ?1",
                params![id.to_string()],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    /// Persist a job's mutable fields (status, payload, result, error, times)
    pub fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let changed = self.lock().execute(
            "UPDATE jobs SET status = ?1, payload = ?2, result = ?3, error = ?4, started_at = ?5, completed_at = ?6
             WHERE id = ?7",
            params![
                job.status.as_str(),
                job.payload.to_string(),
                job.result.as_ref().map(|r| r.to_string()),
                job.error,
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
                job.id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { what: "job", id: job.id.to_string() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_domain::{JobKind, SourceKind};
    use serde_json::json;

    fn store_with_project() -> (MetaStore, Project) {
        let store = MetaStore::open_in_memory().unwrap();
        let project = Project::new("acme-catalog", "Drivetrain supplier catalog");
        store.insert_project(&project).unwrap();
        (store, project)
    }

    #[test]
    fn test_open_creates_schema_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gleaner.db");
        let store = MetaStore::open(&path).unwrap();
        let project = Project::new("p", "");
        store.insert_project(&project).unwrap();
        drop(store);

        // Reopen and read back
        let store = MetaStore::open(&path).unwrap();
        let loaded = store.get_project(project.id).unwrap().unwrap();
        assert_eq!(loaded.name, "p");
    }

    #[test]
    fn test_project_name_unique() {
        let (store, _) = store_with_project();
        let duplicate = Project::new("acme-catalog", "same name");
        assert!(store.insert_project(&duplicate).is_err());
    }

    #[test]
    fn test_source_uri_unique_per_project() {
        let (store, project) = store_with_project();
        let a = Source::new(project.id, "https://acme.test/about", "Acme");
        store.insert_source(&a).unwrap();
        let b = Source::new(project.id, "https://acme.test/about", "Acme");
        assert!(store.insert_source(&b).is_err());

        // Same URI under another project is fine
        let other = Project::new("other", "");
        store.insert_project(&other).unwrap();
        let c = Source::new(other.id, "https://acme.test/about", "Acme");
        store.insert_source(&c).unwrap();
    }

    #[test]
    fn test_source_status_round_trip() {
        let (store, project) = store_with_project();
        let mut source = Source::new(project.id, "https://acme.test/", "Acme");
        source.kind = SourceKind::Web;
        source.content = Some("# Acme".to_string());
        store.insert_source(&source).unwrap();

        store.update_source_status(source.id, SourceStatus::Extracted).unwrap();
        let loaded = store.get_source(source.id).unwrap().unwrap();
        assert_eq!(loaded.status, SourceStatus::Extracted);
        assert_eq!(loaded.content.as_deref(), Some("# Acme"));

        let pending = store.sources_by_status(project.id, SourceStatus::Pending).unwrap();
        assert!(pending.is_empty());
    }

    #[test]
    fn test_extraction_round_trip() {
        let (store, project) = store_with_project();
        let source = Source::new(project.id, "https://acme.test/", "Acme");
        store.insert_source(&source).unwrap();

        let extraction = Extraction::new(
            project.id,
            source.id,
            "company_info",
            "Acme",
            json!({"company_name": "Acme Corp"}),
        )
        .with_confidence(0.85);
        store.insert_extraction(&extraction).unwrap();

        let loaded = store.extractions_for_source(source.id).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].data["company_name"], "Acme Corp");
        assert_eq!(loaded[0].confidence, Some(0.85));
        assert!(!loaded[0].entities_extracted);

        store.set_entities_extracted(extraction.id).unwrap();
        let loaded = store.extractions_for_source(source.id).unwrap();
        assert!(loaded[0].entities_extracted);
    }

    #[test]
    fn test_entity_get_or_create_dedupes_on_key() {
        let (store, project) = store_with_project();
        let (first, created) = store
            .get_or_create_entity(project.id, "Acme", "pricing", "$19.99/month", "19990000_microcents_per_month", &json!(null))
            .unwrap();
        assert!(created);

        // Different raw value, same normalised key
        let (second, created) = store
            .get_or_create_entity(project.id, "Acme", "pricing", "19.99 per month", "19990000_microcents_per_month", &json!(null))
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.count_entities(project.id).unwrap(), 1);
    }

    #[test]
    fn test_entity_link_unique_on_pair() {
        let (store, project) = store_with_project();
        let source = Source::new(project.id, "https://acme.test/", "Acme");
        store.insert_source(&source).unwrap();
        let extraction =
            Extraction::new(project.id, source.id, "pricing", "Acme", json!({}));
        store.insert_extraction(&extraction).unwrap();
        let (entity, _) = store
            .get_or_create_entity(project.id, "Acme", "plan", "Pro", "pro", &json!(null))
            .unwrap();

        assert!(store.link_entity(entity.id, extraction.id).unwrap());
        assert!(!store.link_entity(entity.id, extraction.id).unwrap());
    }

    #[test]
    fn test_job_checkpoint_persists_through_update() {
        let (store, project) = store_with_project();
        let mut job = Job::new(JobKind::Extract, Some(project.id), json!({"force": false}));
        store.insert_job(&job).unwrap();

        job.status = JobStatus::Running;
        job.set_checkpoint(&gleaner_domain::Checkpoint {
            processed_source_ids: vec![Uuid::new_v4()],
            total_extractions: 7,
            total_entities: 2,
            last_checkpoint_at: Utc::now(),
        });
        store.update_job(&job).unwrap();

        let loaded = store.get_job(job.id).unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Running);
        let checkpoint = loaded.checkpoint().unwrap();
        assert_eq!(checkpoint.total_extractions, 7);
        assert_eq!(loaded.payload["force"], json!(false));
    }

    #[test]
    fn test_chunk_transaction_commits_as_unit() {
        let (store, project) = store_with_project();
        let source = Source::new(project.id, "https://acme.test/", "Acme");
        store.insert_source(&source).unwrap();

        store.begin_chunk().unwrap();
        let extraction = Extraction::new(project.id, source.id, "company_info", "Acme", json!({}));
        store.insert_extraction(&extraction).unwrap();
        store.rollback_chunk().unwrap();
        assert_eq!(store.count_extractions(project.id).unwrap(), 0);

        store.begin_chunk().unwrap();
        store.insert_extraction(&extraction).unwrap();
        store.commit_chunk().unwrap();
        assert_eq!(store.count_extractions(project.id).unwrap(), 1);
    }

    #[test]
    fn test_extractable_sources_filters_groups_and_content() {
        let (store, project) = store_with_project();
        let mut with_content = Source::new(project.id, "https://acme.test/a", "Acme");
        with_content.content = Some("text".to_string());
        store.insert_source(&with_content).unwrap();

        let no_content = Source::new(project.id, "https://acme.test/b", "Acme");
        store.insert_source(&no_content).unwrap();

        let mut other_group = Source::new(project.id, "https://globex.test/", "Globex");
        other_group.content = Some("text".to_string());
        store.insert_source(&other_group).unwrap();

        let all = store.extractable_sources(project.id, None).unwrap();
        assert_eq!(all.len(), 2);

        let acme_only = store
            .extractable_sources(project.id, Some(&["Acme".to_string()]))
            .unwrap();
        assert_eq!(acme_only.len(), 1);
        assert_eq!(acme_only[0].id, with_content.id);
    }
}
