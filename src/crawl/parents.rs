//! Parent propagation for positive verdicts.
//!
//! A directory concluded up-to-date implies its ancestors under the same
//! category carry it too; they inherit a `true` verdict unless a probe
//! already decided otherwise. Propagation stops below the category topdir
//! and is local to the current host crawl.

use crate::catalog::{Catalog, CatalogError, Directory, HostCategory};

use super::VerdictMap;

/// Parent path of a directory name, `None` at the root.
#[must_use]
pub fn parent_path(name: &str) -> Option<&str> {
    name.rsplit_once('/')
        .map(|(parent, _)| parent)
        .filter(|parent| !parent.is_empty())
}

/// Marks every ancestor of `dir` up to but excluding the category topdir
/// as up-to-date-by-inheritance.
///
/// Ancestors missing from the catalog end the walk; already-recorded
/// verdicts are left alone.
///
/// # Errors
///
/// Returns the catalog error when an ancestor lookup fails.
pub async fn add_parents(
    catalog: &Catalog,
    verdicts: &mut VerdictMap,
    hc: &HostCategory,
    dir: &Directory,
) -> Result<(), CatalogError> {
    let topdir = hc.category.topdir.name.as_str();
    let mut current = dir.name.clone();
    while let Some(parent) = parent_path(&current) {
        // Stop at the top of the category.
        if parent == topdir {
            break;
        }
        let Some(parent_dir) = catalog.get_directory_by_name(parent).await? else {
            break;
        };
        verdicts.set_if_absent(hc.id, &parent_dir, Some(true));
        current = parent_dir.name;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::db::Database;

    #[test]
    fn test_parent_path_walks_upward() {
        assert_eq!(parent_path("pub/fedora/linux/releases"), Some("pub/fedora/linux"));
        assert_eq!(parent_path("pub/fedora"), Some("pub"));
        assert_eq!(parent_path("pub"), None);
    }

    #[test]
    fn test_parent_path_empty_component() {
        assert_eq!(parent_path("/odd"), None);
    }

    async fn seed_chain(db: &Database, names: &[&str]) {
        for name in names {
            sqlx::query("INSERT INTO directory (name, readable) VALUES (?, 1)")
                .bind(name)
                .execute(db.pool())
                .await
                .unwrap();
        }
    }

    fn host_category(topdir: Directory) -> HostCategory {
        HostCategory {
            id: 7,
            host_id: 1,
            category: crate::catalog::Category {
                id: 1,
                name: "Fedora".to_string(),
                topdir,
            },
            always_up2date: false,
            urls: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_add_parents_inherits_up_to_but_excluding_topdir() {
        let db = Database::new_in_memory().await.unwrap();
        seed_chain(
            &db,
            &[
                "pub/fedora",
                "pub/fedora/linux",
                "pub/fedora/linux/releases",
                "pub/fedora/linux/releases/39",
            ],
        )
        .await;
        let catalog = Catalog::new(db);

        let topdir = catalog
            .get_directory_by_name("pub/fedora")
            .await
            .unwrap()
            .unwrap();
        let leaf = catalog
            .get_directory_by_name("pub/fedora/linux/releases/39")
            .await
            .unwrap()
            .unwrap();
        let hc = host_category(topdir.clone());

        let mut verdicts = VerdictMap::new();
        verdicts.set(hc.id, &leaf, Some(true));
        add_parents(&catalog, &mut verdicts, &hc, &leaf)
            .await
            .unwrap();

        let releases = catalog
            .get_directory_by_name("pub/fedora/linux/releases")
            .await
            .unwrap()
            .unwrap();
        let linux = catalog
            .get_directory_by_name("pub/fedora/linux")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(verdicts.get(hc.id, releases.id), Some(Some(true)));
        assert_eq!(verdicts.get(hc.id, linux.id), Some(Some(true)));
        // The topdir itself is excluded.
        assert_eq!(verdicts.get(hc.id, topdir.id), None);
    }

    #[tokio::test]
    async fn test_add_parents_does_not_overwrite_probed_verdicts() {
        let db = Database::new_in_memory().await.unwrap();
        seed_chain(&db, &["pub/fedora", "pub/fedora/linux", "pub/fedora/linux/39"]).await;
        let catalog = Catalog::new(db);

        let topdir = catalog
            .get_directory_by_name("pub/fedora")
            .await
            .unwrap()
            .unwrap();
        let linux = catalog
            .get_directory_by_name("pub/fedora/linux")
            .await
            .unwrap()
            .unwrap();
        let leaf = catalog
            .get_directory_by_name("pub/fedora/linux/39")
            .await
            .unwrap()
            .unwrap();
        let hc = host_category(topdir);

        let mut verdicts = VerdictMap::new();
        verdicts.set(hc.id, &linux, Some(false));
        add_parents(&catalog, &mut verdicts, &hc, &leaf)
            .await
            .unwrap();

        assert_eq!(
            verdicts.get(hc.id, linux.id),
            Some(Some(false)),
            "probed verdict must win over inheritance"
        );
    }

    #[tokio::test]
    async fn test_add_parents_stops_at_unknown_ancestor() {
        let db = Database::new_in_memory().await.unwrap();
        // The intermediate "pub/fedora/linux" is missing from the catalog.
        seed_chain(&db, &["pub/fedora", "pub/fedora/linux/39"]).await;
        let catalog = Catalog::new(db);

        let topdir = catalog
            .get_directory_by_name("pub/fedora")
            .await
            .unwrap()
            .unwrap();
        let leaf = catalog
            .get_directory_by_name("pub/fedora/linux/39")
            .await
            .unwrap()
            .unwrap();
        let hc = host_category(topdir);

        let mut verdicts = VerdictMap::new();
        add_parents(&catalog, &mut verdicts, &hc, &leaf)
            .await
            .unwrap();
        assert!(verdicts.is_empty());
    }
}
