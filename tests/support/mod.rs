//! Shared fixtures for catalog-backed integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use mirrorcheck_core::{Catalog, Database};

/// An in-memory catalog with its database handle.
pub struct CatalogFixture {
    pub db: Database,
    pub catalog: Catalog,
}

/// Creates an empty in-memory catalog.
pub async fn empty_catalog() -> CatalogFixture {
    let db = Database::new_in_memory().await.unwrap();
    let catalog = Catalog::new(db.clone());
    CatalogFixture { db, catalog }
}

pub async fn insert_site(db: &Database, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO site (name) VALUES (?) RETURNING id")
        .bind(name)
        .fetch_one(db.pool())
        .await
        .unwrap()
}

pub async fn insert_host(db: &Database, site_id: i64, name: &str, private: bool) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO host (site_id, name, private) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(site_id)
    .bind(name)
    .bind(private)
    .fetch_one(db.pool())
    .await
    .unwrap()
}

/// Inserts a directory; `files` is the JSON contents column.
pub async fn insert_directory(
    db: &Database,
    name: &str,
    readable: bool,
    files: Option<&str>,
) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO directory (name, readable, files) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(readable)
    .bind(files)
    .fetch_one(db.pool())
    .await
    .unwrap()
}

pub async fn insert_category(db: &Database, name: &str, topdir_id: i64) -> i64 {
    let id = sqlx::query_scalar("INSERT INTO category (name, topdir_id) VALUES (?, ?) RETURNING id")
        .bind(name)
        .bind(topdir_id)
        .fetch_one(db.pool())
        .await
        .unwrap();
    link_category_directory(db, id, topdir_id).await;
    id
}

pub async fn link_category_directory(db: &Database, category_id: i64, directory_id: i64) {
    sqlx::query("INSERT INTO category_directory (category_id, directory_id) VALUES (?, ?)")
        .bind(category_id)
        .bind(directory_id)
        .execute(db.pool())
        .await
        .unwrap();
}

pub async fn insert_host_category(db: &Database, host_id: i64, category_id: i64) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO host_category (host_id, category_id) VALUES (?, ?) RETURNING id",
    )
    .bind(host_id)
    .bind(category_id)
    .fetch_one(db.pool())
    .await
    .unwrap()
}

pub async fn insert_host_category_url(db: &Database, host_category_id: i64, url: &str) {
    sqlx::query("INSERT INTO host_category_url (host_category_id, url) VALUES (?, ?)")
        .bind(host_category_id)
        .bind(url)
        .execute(db.pool())
        .await
        .unwrap();
}

pub async fn insert_file_detail(db: &Database, directory_id: i64, filename: &str, sha256: &str) {
    sqlx::query("INSERT INTO file_detail (directory_id, filename, sha256) VALUES (?, ?, ?)")
        .bind(directory_id)
        .bind(filename)
        .bind(sha256)
        .execute(db.pool())
        .await
        .unwrap();
}

/// Reads one verdict row as `(directory_id, up2date)`.
pub async fn hcd_row(
    db: &Database,
    host_category_id: i64,
    path: &str,
) -> Option<(Option<i64>, Option<bool>)> {
    sqlx::query_as::<_, (Option<i64>, Option<bool>)>(
        "SELECT directory_id, up2date FROM host_category_dir
         WHERE host_category_id = ? AND path = ?",
    )
    .bind(host_category_id)
    .bind(path)
    .fetch_optional(db.pool())
    .await
    .unwrap()
}

/// Number of verdict rows stored for one host category.
pub async fn hcd_count(db: &Database, host_category_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM host_category_dir WHERE host_category_id = ?")
        .bind(host_category_id)
        .fetch_one(db.pool())
        .await
        .unwrap()
}
