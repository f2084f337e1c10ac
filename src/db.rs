use crate::entities::{Cat, CatRepository, Opinion};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One row of a catalog CSV (`name,image`)
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CatalogRow {
    pub name: String,
    pub image: String,
}

/// What happened to a cat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    CatCreated,
    OpinionAdded,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::CatCreated => "cat_created",
            ActivityKind::OpinionAdded => "opinion_added",
        }
    }
}

/// One line of a cat's history, as stored in `cat_activity`
#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub activity_id: String,
    pub cat_id: u64,
    pub kind: String,
    pub recorded_at: DateTime<Utc>,
    pub actor: String,
    pub detail: serde_json::Value,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Catalog
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cats (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            image TEXT NOT NULL,
            average_rate REAL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Opinions (append-only, position = rating order)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS opinions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cat_id INTEGER NOT NULL REFERENCES cats(id),
            position INTEGER NOT NULL,
            stars REAL NOT NULL,
            comment TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(cat_id, position)
        )",
        [],
    )?;

    // ==========================================================================
    // Activity (who created or rated which cat, and when)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cat_activity (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            activity_id TEXT UNIQUE NOT NULL,
            cat_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            actor TEXT NOT NULL,
            detail TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_opinions_cat ON opinions(cat_id, position)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activity_cat ON cat_activity(cat_id, seq)",
        [],
    )?;

    Ok(())
}

pub fn load_catalog_csv(csv_path: &Path) -> Result<Vec<CatalogRow>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open catalog CSV")?;

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: CatalogRow = result.context("Failed to deserialize catalog row")?;
        rows.push(row);
    }

    Ok(rows)
}

/// Create every row whose name isn't in the catalog yet. Returns how many were created.
pub fn import_catalog<R: CatRepository + ?Sized>(repository: &mut R, rows: &[CatalogRow]) -> Result<usize> {
    let mut known: HashSet<String> = repository
        .find_all()?
        .into_iter()
        .map(|cat| cat.name.to_lowercase())
        .collect();

    let mut inserted = 0;
    for row in rows {
        if known.insert(row.name.to_lowercase()) {
            repository.create(&row.name, &row.image)?;
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// Append a line to a cat's history
pub fn log_activity(
    conn: &Connection,
    kind: ActivityKind,
    cat_id: u64,
    actor: &str,
    detail: serde_json::Value,
) -> Result<()> {
    conn.execute(
        "INSERT INTO cat_activity (activity_id, cat_id, kind, recorded_at, actor, detail)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            uuid::Uuid::new_v4().to_string(),
            cat_id as i64,
            kind.as_str(),
            Utc::now().to_rfc3339(),
            actor,
            detail.to_string(),
        ],
    )?;

    Ok(())
}

/// A cat's history, oldest first
pub fn cat_activity(conn: &Connection, cat_id: u64) -> Result<Vec<Activity>> {
    let mut stmt = conn.prepare(
        "SELECT activity_id, kind, recorded_at, actor, detail
         FROM cat_activity WHERE cat_id = ?1 ORDER BY seq ASC",
    )?;

    let rows = stmt
        .query_map([cat_id as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(activity_id, kind, recorded_at, actor, detail)| {
            Ok(Activity {
                activity_id,
                cat_id,
                kind,
                recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
                    .with_context(|| format!("Bad activity timestamp {}", recorded_at))?
                    .with_timezone(&Utc),
                actor,
                detail: serde_json::from_str(&detail).context("Bad activity detail")?,
            })
        })
        .collect()
}

pub fn count_cats(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM cats", [], |row| row.get(0))?;

    Ok(count)
}

fn load_opinions(conn: &Connection, cat_id: i64) -> Result<Vec<Opinion>> {
    let mut stmt = conn.prepare(
        "SELECT stars, comment FROM opinions WHERE cat_id = ?1 ORDER BY position ASC",
    )?;

    let opinions = stmt
        .query_map([cat_id], |row| {
            let stars: f64 = row.get(0)?;
            let comment: String = row.get(1)?;
            Ok(Opinion::new(stars, comment))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(opinions)
}

// ============================================================================
// SQLITE REPOSITORY
// ============================================================================

/// `CatRepository` over one SQLite connection.
///
/// Ids come from `MAX(id) + 1`, so the first cat gets 0.
pub struct SqliteCatRepository {
    conn: Connection,
    actor: String,
}

impl SqliteCatRepository {
    /// Wrap a connection, creating the schema if needed
    pub fn new(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteCatRepository {
            conn,
            actor: "cat_service".to_string(),
        })
    }

    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Name recorded as the actor in `cat_activity`
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl CatRepository for SqliteCatRepository {
    fn find_by_id(&self, id: u64) -> Result<Option<Cat>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, image FROM cats WHERE id = ?1",
                [id as i64],
                |row| {
                    let id: i64 = row.get(0)?;
                    let name: String = row.get(1)?;
                    let image: String = row.get(2)?;
                    Ok((id, name, image))
                },
            )
            .optional()?;

        match row {
            Some((id, name, image)) => {
                let opinions = load_opinions(&self.conn, id)?;
                Ok(Some(Cat::restore(id as u64, name, image, opinions)))
            }
            None => Ok(None),
        }
    }

    fn find_all(&self) -> Result<Vec<Cat>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, image FROM cats ORDER BY id ASC")?;

        let rows = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let name: String = row.get(1)?;
                let image: String = row.get(2)?;
                Ok((id, name, image))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, name, image)| {
                let opinions = load_opinions(&self.conn, id)?;
                Ok(Cat::restore(id as u64, name, image, opinions))
            })
            .collect()
    }

    fn create(&mut self, name: &str, image: &str) -> Result<Cat> {
        let tx = self.conn.transaction()?;

        let next_id: i64 = tx.query_row(
            "SELECT COALESCE(MAX(id) + 1, 0) FROM cats",
            [],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO cats (id, name, image) VALUES (?1, ?2, ?3)",
            params![next_id, name, image],
        )?;

        log_activity(
            &tx,
            ActivityKind::CatCreated,
            next_id as u64,
            &self.actor,
            serde_json::json!({ "name": name, "image": image }),
        )?;

        tx.commit()?;

        Ok(Cat::with_id(next_id as u64, name, image))
    }

    fn save(&mut self, cat: &Cat) -> Result<()> {
        let tx = self.conn.transaction()?;
        let cat_id = cat.id as i64;

        let updated = tx.execute(
            "UPDATE cats SET name = ?1, image = ?2, average_rate = ?3 WHERE id = ?4",
            params![cat.name, cat.image, cat.average_rate(), cat_id],
        )?;
        if updated == 0 {
            return Err(anyhow!("Cat not found: {}", cat.id));
        }

        let stored: i64 = tx.query_row(
            "SELECT COUNT(*) FROM opinions WHERE cat_id = ?1",
            [cat_id],
            |row| row.get(0),
        )?;

        // Opinions are append-only: only the tail is new
        for (position, opinion) in cat.opinions().iter().enumerate().skip(stored as usize) {
            tx.execute(
                "INSERT INTO opinions (cat_id, position, stars, comment) VALUES (?1, ?2, ?3, ?4)",
                params![cat_id, position as i64, opinion.stars(), opinion.comment()],
            )?;

            log_activity(
                &tx,
                ActivityKind::OpinionAdded,
                cat.id,
                &self.actor,
                serde_json::json!({ "position": position, "stars": opinion.stars() }),
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::seed_default_cats;
    use std::io::Write;

    #[test]
    fn test_create_assigns_sequential_ids() {
        let mut repository = SqliteCatRepository::open_in_memory().unwrap();

        let first = repository.create("Bella", "bella.png").unwrap();
        let second = repository.create("Milo", "milo.png").unwrap();

        assert_eq!(first.id, 0);
        assert_eq!(second.id, 1);
        assert_eq!(count_cats(repository.connection()).unwrap(), 2);
    }

    #[test]
    fn test_save_and_reload_opinions_in_order() {
        let mut repository = SqliteCatRepository::open_in_memory().unwrap();
        let mut cat = repository.create("Bella", "bella.png").unwrap();

        cat.rate(2.3, "esto es una prueba");
        repository.save(&cat).unwrap();
        cat.rate(4.5, "ya me aburrí");
        repository.save(&cat).unwrap();

        let reloaded = repository.find_by_id(cat.id).unwrap().unwrap();
        assert_eq!(reloaded.opinions().len(), 2);
        assert_eq!(reloaded.opinions()[0], Opinion::new(2.3, "esto es una prueba"));
        assert_eq!(reloaded.opinions()[1], Opinion::new(4.5, "ya me aburrí"));
        assert_eq!(reloaded.average_rate(), cat.average_rate());
    }

    #[test]
    fn test_save_twice_does_not_duplicate_opinions() {
        let mut repository = SqliteCatRepository::open_in_memory().unwrap();
        let mut cat = repository.create("Duke", "duke.png").unwrap();

        cat.rate(5.0, "");
        repository.save(&cat).unwrap();
        repository.save(&cat).unwrap();

        let reloaded = repository.find_by_id(cat.id).unwrap().unwrap();
        assert_eq!(reloaded.opinions().len(), 1);
    }

    #[test]
    fn test_save_unknown_cat_fails() {
        let mut repository = SqliteCatRepository::open_in_memory().unwrap();

        let result = repository.save(&Cat::with_id(9, "Ghost", "ghost.png"));

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Cat not found"));
    }

    #[test]
    fn test_find_missing_cat() {
        let repository = SqliteCatRepository::open_in_memory().unwrap();
        assert!(repository.find_by_id(0).unwrap().is_none());
    }

    #[test]
    fn test_rating_history_is_kept_per_cat() {
        let mut repository = SqliteCatRepository::open_in_memory()
            .unwrap()
            .with_actor("web");
        let mut laika = repository.create("Laika", "laika.png").unwrap();
        let duke = repository.create("Duke", "duke.png").unwrap();

        laika.rate(4.0, "space cat");
        repository.save(&laika).unwrap();

        let history = cat_activity(repository.connection(), laika.id).unwrap();
        let kinds: Vec<&str> = history.iter().map(|a| a.kind.as_str()).collect();
        assert_eq!(kinds, vec!["cat_created", "opinion_added"]);
        assert_eq!(history[1].actor, "web");
        assert_eq!(history[1].detail["stars"], 4.0);
        assert_eq!(history[1].detail["position"], 0);

        let other = cat_activity(repository.connection(), duke.id).unwrap();
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn test_unknown_cat_has_no_history() {
        let repository = SqliteCatRepository::open_in_memory().unwrap();
        assert!(cat_activity(repository.connection(), 42).unwrap().is_empty());
    }

    #[test]
    fn test_import_catalog_is_idempotent() {
        let mut repository = SqliteCatRepository::open_in_memory().unwrap();
        let rows = vec![
            CatalogRow { name: "Bella".to_string(), image: "bella.png".to_string() },
            CatalogRow { name: "Milo".to_string(), image: "milo.png".to_string() },
        ];

        let first = import_catalog(&mut repository, &rows).unwrap();
        let second = import_catalog(&mut repository, &rows).unwrap();

        assert_eq!(first, 2);
        assert_eq!(second, 0);
        assert_eq!(repository.find_all().unwrap().len(), 2);
    }

    #[test]
    fn test_load_catalog_csv() {
        let path = std::env::temp_dir().join(format!("catalog-{}.csv", uuid::Uuid::new_v4()));
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "name,image").unwrap();
            writeln!(file, "Bella,bella.png").unwrap();
            writeln!(file, "Simba,simba.png").unwrap();
        }

        let rows = load_catalog_csv(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], CatalogRow { name: "Simba".to_string(), image: "simba.png".to_string() });
    }

    #[test]
    fn test_seed_default_cats() {
        let mut repository = SqliteCatRepository::open_in_memory().unwrap();

        let seeded = seed_default_cats(&mut repository).unwrap();

        assert_eq!(count_cats(repository.connection()).unwrap(), seeded as i64);
    }
}
