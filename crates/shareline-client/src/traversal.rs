//! Directory listing and search
//!
//! 1. Enumerate the raw entries of a directory
//! 2. Skip `.`, `..`, bare separators and any other unusable name
//! 3. Stat every entry to learn its kind
//! 4. Keep the entries the predicate accepts
//! 5. When recursive, descend into every subdirectory (pre-order)
//! 6. Sort the collected items by path, segment by segment
//!
//! Any remote failure aborts the whole listing.

use tracing::debug;

use shareline_core::path::is_listable_name;
use shareline_core::{Operation, Result, ShareError, SharePath};

use crate::item::{Location, ShareItem};

/// List the entries below `dir` that `predicate` accepts
pub(crate) fn list<P>(dir: &Location, predicate: &P, recursive: bool) -> Result<Vec<ShareItem>>
where
    P: Fn(&ShareItem) -> bool + ?Sized,
{
    let mut found = Vec::new();
    collect(dir, predicate, recursive, &mut found)?;
    found.sort_by(|a, b| a.0.cmp(&b.0));

    debug!("Listed {} item(s) under '{}'", found.len(), dir.path());
    Ok(found.into_iter().map(|(_, item)| item).collect())
}

fn collect<P>(
    dir: &Location,
    predicate: &P,
    recursive: bool,
    found: &mut Vec<(SharePath, ShareItem)>,
) -> Result<()>
where
    P: Fn(&ShareItem) -> bool + ?Sized,
{
    let share = dir.share()?;
    let path = dir.path();
    let entries = share
        .list(path)
        .map_err(|e| ShareError::remote(Operation::List, path.as_string(), e))?;

    for entry in entries {
        if !is_listable_name(&entry.name) {
            debug!("Skipping entry {:?} in '{}'", entry.name, path);
            continue;
        }

        let child = path.child(&entry.name)?;
        let info = share
            .stat(&child)
            .map_err(|e| ShareError::remote(Operation::Stat, child.as_string(), e))?;

        let item = ShareItem::build(dir.with_path(child.clone()), info.kind);
        let descend = recursive && info.is_directory();

        if predicate(&item) {
            found.push((child.clone(), item));
        }
        if descend {
            collect(&dir.with_path(child), predicate, recursive, found)?;
        }
    }

    Ok(())
}
