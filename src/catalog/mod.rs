//! Catalog data model and store queries.
//!
//! The catalog is the authoritative picture of the master repository
//! (directories, expected file sizes, index-file hashes) plus the mirror
//! hosts and their per-directory verdicts. The crawler only ever reads the
//! master side and writes `host` / `host_category_dir` rows.
//!
//! # Overview
//!
//! - [`Host`] - a mirror host with activation and privacy flags
//! - [`Category`] - a named corpus rooted at a topdir [`Directory`]
//! - [`HostCategory`] - binding of one host to one category, with URLs
//! - [`Directory`] - master directory with expected `files` contents
//! - [`HostCategoryDir`] - the per-(host category, path) verdict record
//! - [`Catalog`] - query interface over the shared [`Database`] pool

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::Row;
use thiserror::Error;
use tracing::instrument;

use crate::db::Database;

/// Catalog store errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Underlying database failure.
    #[error("catalog query failed: {0}")]
    Database(#[from] sqlx::Error),

    /// The `files` column of a directory held invalid JSON.
    #[error("invalid files column for directory {directory}: {source}")]
    BadFilesColumn {
        /// Directory whose `files` column failed to decode.
        directory: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Expected attributes of one file in a master directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FileSpec {
    /// Expected size in bytes.
    pub size: u64,
}

/// A stored hash for one file, used only for the repository index file.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileDetail {
    /// Row id.
    pub id: i64,
    /// Owning directory.
    pub directory_id: i64,
    /// File name within the directory.
    pub filename: String,
    /// Hex SHA-256 of the file contents, when known.
    pub sha256: Option<String>,
}

/// A master directory with its expected contents.
#[derive(Debug, Clone)]
pub struct Directory {
    /// Row id.
    pub id: i64,
    /// Full path name under the catalog root.
    pub name: String,
    /// Whether the directory is world-readable on the master.
    pub readable: bool,
    /// Expected contents; `None` means unknown.
    pub files: Option<BTreeMap<String, FileSpec>>,
    /// Stored per-file hashes (repository index file only).
    pub file_details: Vec<FileDetail>,
}

impl Directory {
    /// Path of this directory relative to `topdir`, or `""` for the topdir
    /// itself.
    #[must_use]
    pub fn relative_name(&self, topdir_name: &str) -> &str {
        self.name
            .strip_prefix(topdir_name)
            .map_or(self.name.as_str(), |rest| {
                rest.strip_prefix('/').unwrap_or(rest)
            })
    }
}

/// A named corpus rooted at a topdir.
#[derive(Debug, Clone)]
pub struct Category {
    /// Row id.
    pub id: i64,
    /// Category name, e.g. a distribution release.
    pub name: String,
    /// The directory the category is rooted at.
    pub topdir: Directory,
}

/// Binding of one host to one category.
#[derive(Debug, Clone)]
pub struct HostCategory {
    /// Row id.
    pub id: i64,
    /// Owning host.
    pub host_id: i64,
    /// The category this binding covers.
    pub category: Category,
    /// When true the crawler skips this binding entirely.
    pub always_up2date: bool,
    /// Candidate URLs in catalog order.
    pub urls: Vec<String>,
}

/// A mirror host.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Host {
    /// Row id.
    pub id: i64,
    /// Owning site.
    pub site_id: i64,
    /// Host name as advertised.
    pub name: String,
    /// Activation flag controlled by the mirror operator.
    pub user_active: bool,
    /// Activation flag controlled by the catalog administrators.
    pub admin_active: bool,
    /// Private hosts are skipped unless explicitly included.
    pub private: bool,
    /// Stamped by the crawler at the end of each run.
    pub last_crawled: Option<DateTime<Utc>>,
}

/// The verdict record for one (host category, path).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HostCategoryDir {
    /// Row id.
    pub id: i64,
    /// Owning host/category binding.
    pub host_category_id: i64,
    /// Path relative to the category topdir.
    pub path: String,
    /// Bound master directory; `None` once the master deleted it.
    pub directory_id: Option<i64>,
    /// Verdict: up-to-date / stale / never concluded.
    pub up2date: Option<bool>,
}

/// A host's verdict record joined with its directory's `readable` flag,
/// used by the deleted-on-master pass.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HostCategoryDirView {
    /// Row id.
    pub id: i64,
    /// Owning host/category binding.
    pub host_category_id: i64,
    /// Path relative to the category topdir.
    pub path: String,
    /// Bound master directory, when still present.
    pub directory_id: Option<i64>,
    /// Current verdict.
    pub up2date: Option<bool>,
    /// `readable` of the bound directory; `None` when unbound.
    pub dir_readable: Option<bool>,
}

/// Query interface over the catalog database.
#[derive(Debug, Clone)]
pub struct Catalog {
    db: Database,
}

impl Catalog {
    /// Creates a catalog store over the given database handle.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the underlying pool, for transactional writers.
    #[must_use]
    pub fn pool(&self) -> &sqlx::SqlitePool {
        self.db.pool()
    }

    /// Returns the crawlable mirror hosts in id order.
    ///
    /// A host qualifies when it is active on both the operator and
    /// administrator side, its site likewise, and - unless
    /// `include_private` - neither the host nor its site is private.
    #[instrument(skip(self))]
    pub async fn get_mirrors(&self, include_private: bool) -> Result<Vec<Host>> {
        let hosts = sqlx::query_as::<_, Host>(
            r"SELECT h.id, h.site_id, h.name, h.user_active, h.admin_active,
                     h.private, h.last_crawled
              FROM host h
              JOIN site s ON s.id = h.site_id
              WHERE h.user_active = 1 AND h.admin_active = 1
                AND s.user_active = 1 AND s.admin_active = 1
                AND (? OR (h.private = 0 AND s.private = 0))
              ORDER BY h.id",
        )
        .bind(include_private)
        .fetch_all(self.db.pool())
        .await?;
        Ok(hosts)
    }

    /// Looks up one host by id.
    #[instrument(skip(self))]
    pub async fn get_host(&self, host_id: i64) -> Result<Option<Host>> {
        let host = sqlx::query_as::<_, Host>(
            r"SELECT id, site_id, name, user_active, admin_active, private, last_crawled
              FROM host WHERE id = ?",
        )
        .bind(host_id)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(host)
    }

    /// Returns all host/category bindings of a host, in catalog order.
    #[instrument(skip(self))]
    pub async fn get_host_categories(&self, host_id: i64) -> Result<Vec<HostCategory>> {
        self.load_host_categories(host_id, None).await
    }

    /// Returns the host/category bindings of a host matching a category
    /// name. Unknown names yield an empty list.
    #[instrument(skip(self))]
    pub async fn get_host_category_by_hostid_category(
        &self,
        host_id: i64,
        category: &str,
    ) -> Result<Vec<HostCategory>> {
        self.load_host_categories(host_id, Some(category)).await
    }

    async fn load_host_categories(
        &self,
        host_id: i64,
        category: Option<&str>,
    ) -> Result<Vec<HostCategory>> {
        let mut query = String::from(
            r"SELECT hc.id, hc.host_id, hc.always_up2date,
                     c.id AS category_id, c.name AS category_name, c.topdir_id
              FROM host_category hc
              JOIN category c ON c.id = hc.category_id
              WHERE hc.host_id = ?",
        );
        if category.is_some() {
            query.push_str(" AND c.name = ?");
        }
        query.push_str(" ORDER BY hc.id");

        let mut q = sqlx::query(&query).bind(host_id);
        if let Some(name) = category {
            q = q.bind(name);
        }
        let rows = q.fetch_all(self.db.pool()).await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let hc_id: i64 = row.get("id");
            let topdir_id: i64 = row.get("topdir_id");
            let topdir = self
                .get_directory_by_id(topdir_id)
                .await?
                .ok_or(sqlx::Error::RowNotFound)?;
            let urls = sqlx::query_scalar::<_, String>(
                "SELECT url FROM host_category_url WHERE host_category_id = ? ORDER BY id",
            )
            .bind(hc_id)
            .fetch_all(self.db.pool())
            .await?;
            result.push(HostCategory {
                id: hc_id,
                host_id: row.get("host_id"),
                category: Category {
                    id: row.get("category_id"),
                    name: row.get("category_name"),
                    topdir,
                },
                always_up2date: row.get("always_up2date"),
                urls,
            });
        }
        Ok(result)
    }

    /// Returns the directories of a category in catalog order (by name),
    /// topdir included, with expected contents and index hashes attached.
    #[instrument(skip(self))]
    pub async fn get_directories_for_category(&self, category_id: i64) -> Result<Vec<Directory>> {
        let rows = sqlx::query(
            r"SELECT d.id, d.name, d.readable, d.files
              FROM directory d
              JOIN category_directory cd ON cd.directory_id = d.id
              WHERE cd.category_id = ?
              ORDER BY d.name",
        )
        .bind(category_id)
        .fetch_all(self.db.pool())
        .await?;

        let details = sqlx::query_as::<_, FileDetail>(
            r"SELECT fd.id, fd.directory_id, fd.filename, fd.sha256
              FROM file_detail fd
              JOIN category_directory cd ON cd.directory_id = fd.directory_id
              WHERE cd.category_id = ?
              ORDER BY fd.id",
        )
        .bind(category_id)
        .fetch_all(self.db.pool())
        .await?;

        let mut details_by_dir: HashMap<i64, Vec<FileDetail>> = HashMap::new();
        for detail in details {
            details_by_dir
                .entry(detail.directory_id)
                .or_default()
                .push(detail);
        }

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let file_details = details_by_dir.remove(&id).unwrap_or_default();
            result.push(directory_from_row(&row, file_details)?);
        }
        Ok(result)
    }

    /// Looks up one directory by its full name.
    #[instrument(skip(self))]
    pub async fn get_directory_by_name(&self, name: &str) -> Result<Option<Directory>> {
        let row = sqlx::query("SELECT id, name, readable, files FROM directory WHERE name = ?")
            .bind(name)
            .fetch_optional(self.db.pool())
            .await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let id: i64 = row.get("id");
                let file_details = self.get_file_details(id).await?;
                Ok(Some(directory_from_row(&row, file_details)?))
            }
        }
    }

    async fn get_directory_by_id(&self, directory_id: i64) -> Result<Option<Directory>> {
        let row = sqlx::query("SELECT id, name, readable, files FROM directory WHERE id = ?")
            .bind(directory_id)
            .fetch_optional(self.db.pool())
            .await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let file_details = self.get_file_details(directory_id).await?;
                Ok(Some(directory_from_row(&row, file_details)?))
            }
        }
    }

    async fn get_file_details(&self, directory_id: i64) -> Result<Vec<FileDetail>> {
        let details = sqlx::query_as::<_, FileDetail>(
            "SELECT id, directory_id, filename, sha256 FROM file_detail
             WHERE directory_id = ? ORDER BY id",
        )
        .bind(directory_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(details)
    }

    /// Looks up the verdict record for one (host category, path).
    #[instrument(skip(self))]
    pub async fn get_hostcategorydir(
        &self,
        host_category_id: i64,
        path: &str,
    ) -> Result<Option<HostCategoryDir>> {
        let hcd = sqlx::query_as::<_, HostCategoryDir>(
            r"SELECT id, host_category_id, path, directory_id, up2date
              FROM host_category_dir
              WHERE host_category_id = ? AND path = ?",
        )
        .bind(host_category_id)
        .bind(path)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(hcd)
    }

    /// Returns every verdict record of a host joined with the bound
    /// directory's `readable` flag.
    #[instrument(skip(self))]
    pub async fn get_host_category_dirs(&self, host_id: i64) -> Result<Vec<HostCategoryDirView>> {
        let rows = sqlx::query_as::<_, HostCategoryDirView>(
            r"SELECT hcd.id, hcd.host_category_id, hcd.path, hcd.directory_id,
                     hcd.up2date, d.readable AS dir_readable
              FROM host_category_dir hcd
              JOIN host_category hc ON hc.id = hcd.host_category_id
              LEFT JOIN directory d ON d.id = hcd.directory_id
              WHERE hc.host_id = ?
              ORDER BY hcd.id",
        )
        .bind(host_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }

    /// Marks every verdict record of a host stale and stamps
    /// `last_crawled`. Used when the host fails at the category level.
    #[instrument(skip(self))]
    pub async fn set_host_not_up2date(&self, host_id: i64) -> Result<()> {
        sqlx::query(
            r"UPDATE host_category_dir SET up2date = 0
              WHERE host_category_id IN
                  (SELECT id FROM host_category WHERE host_id = ?)",
        )
        .bind(host_id)
        .execute(self.db.pool())
        .await?;
        self.update_last_crawled(host_id, Utc::now()).await
    }

    /// Stamps a host's `last_crawled` timestamp.
    #[instrument(skip(self))]
    pub async fn update_last_crawled(&self, host_id: i64, when: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE host SET last_crawled = ? WHERE id = ?")
            .bind(when)
            .bind(host_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }
}

fn directory_from_row(
    row: &sqlx::sqlite::SqliteRow,
    file_details: Vec<FileDetail>,
) -> Result<Directory> {
    let name: String = row.get("name");
    let files_json: Option<String> = row.get("files");
    let files = match files_json {
        None => None,
        Some(json) => Some(serde_json::from_str(&json).map_err(|source| {
            CatalogError::BadFilesColumn {
                directory: name.clone(),
                source,
            }
        })?),
    };
    Ok(Directory {
        id: row.get("id"),
        name,
        readable: row.get("readable"),
        files,
        file_details,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn seed_basic(db: &Database) {
        sqlx::query("INSERT INTO site (name) VALUES ('site1')")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO host (site_id, name, user_active, admin_active, private)
             VALUES (1, 'mirror1.example.com', 1, 1, 0)",
        )
        .execute(db.pool())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_get_mirrors_excludes_private_by_default() {
        let db = Database::new_in_memory().await.unwrap();
        seed_basic(&db).await;
        sqlx::query(
            "INSERT INTO host (site_id, name, user_active, admin_active, private)
             VALUES (1, 'private.example.com', 1, 1, 1)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let catalog = Catalog::new(db);
        let hosts = catalog.get_mirrors(false).await.unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].name, "mirror1.example.com");

        let all = catalog.get_mirrors(true).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_get_mirrors_excludes_inactive_hosts() {
        let db = Database::new_in_memory().await.unwrap();
        seed_basic(&db).await;
        sqlx::query(
            "INSERT INTO host (site_id, name, user_active, admin_active, private)
             VALUES (1, 'disabled.example.com', 1, 0, 0)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let catalog = Catalog::new(db);
        let hosts = catalog.get_mirrors(false).await.unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].name, "mirror1.example.com");
    }

    #[tokio::test]
    async fn test_directory_files_column_decodes() {
        let db = Database::new_in_memory().await.unwrap();
        sqlx::query(
            r#"INSERT INTO directory (name, readable, files)
               VALUES ('pub/fedora/linux/releases', 1,
                       '{"repomd.xml": {"size": 3091}, "vmlinuz": {"size": 8388608}}')"#,
        )
        .execute(db.pool())
        .await
        .unwrap();

        let catalog = Catalog::new(db);
        let dir = catalog
            .get_directory_by_name("pub/fedora/linux/releases")
            .await
            .unwrap()
            .unwrap();
        let files = dir.files.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files["repomd.xml"].size, 3091);
    }

    #[tokio::test]
    async fn test_directory_files_column_rejects_bad_json() {
        let db = Database::new_in_memory().await.unwrap();
        sqlx::query("INSERT INTO directory (name, readable, files) VALUES ('d', 1, 'not-json')")
            .execute(db.pool())
            .await
            .unwrap();

        let catalog = Catalog::new(db);
        let err = catalog.get_directory_by_name("d").await.unwrap_err();
        assert!(matches!(err, CatalogError::BadFilesColumn { .. }));
    }

    #[tokio::test]
    async fn test_relative_name_strips_topdir_prefix() {
        let dir = Directory {
            id: 1,
            name: "pub/fedora/linux/releases/39".to_string(),
            readable: true,
            files: None,
            file_details: Vec::new(),
        };
        assert_eq!(dir.relative_name("pub/fedora"), "linux/releases/39");
        assert_eq!(dir.relative_name("pub/fedora/linux/releases/39"), "");
    }

    #[tokio::test]
    async fn test_set_host_not_up2date_marks_all_hcds() {
        let db = Database::new_in_memory().await.unwrap();
        seed_basic(&db).await;
        sqlx::query("INSERT INTO directory (name) VALUES ('pub/fedora')")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO category (name, topdir_id) VALUES ('Fedora', 1)")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO host_category (host_id, category_id) VALUES (1, 1)")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO host_category_dir (host_category_id, path, up2date) VALUES (1, 'a', 1)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let catalog = Catalog::new(db);
        catalog.set_host_not_up2date(1).await.unwrap();

        let hcds = catalog.get_host_category_dirs(1).await.unwrap();
        assert_eq!(hcds.len(), 1);
        assert_eq!(hcds[0].up2date, Some(false));

        let host = catalog.get_host(1).await.unwrap().unwrap();
        assert!(host.last_crawled.is_some(), "last_crawled must be stamped");
    }

    #[tokio::test]
    async fn test_get_host_categories_loads_urls_in_order() {
        let db = Database::new_in_memory().await.unwrap();
        seed_basic(&db).await;
        sqlx::query("INSERT INTO directory (name) VALUES ('pub/fedora')")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO category (name, topdir_id) VALUES ('Fedora', 1)")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO host_category (host_id, category_id) VALUES (1, 1)")
            .execute(db.pool())
            .await
            .unwrap();
        for url in [
            "rsync://mirror1.example.com/fedora/",
            "http://mirror1.example.com/fedora",
        ] {
            sqlx::query("INSERT INTO host_category_url (host_category_id, url) VALUES (1, ?)")
                .bind(url)
                .execute(db.pool())
                .await
                .unwrap();
        }

        let catalog = Catalog::new(db);
        let hcs = catalog.get_host_categories(1).await.unwrap();
        assert_eq!(hcs.len(), 1);
        assert_eq!(hcs[0].category.name, "Fedora");
        assert_eq!(hcs[0].category.topdir.name, "pub/fedora");
        assert_eq!(
            hcs[0].urls,
            vec![
                "rsync://mirror1.example.com/fedora/",
                "http://mirror1.example.com/fedora"
            ]
        );

        let filtered = catalog
            .get_host_category_by_hostid_category(1, "Fedora")
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        let missing = catalog
            .get_host_category_by_hostid_category(1, "EPEL")
            .await
            .unwrap();
        assert!(missing.is_empty());
    }
}
