use std::io::Write;
use std::path::Path;

use serde::Serialize;

/// Write `value` as pretty JSON to `path` via a temp file in the same
/// directory and an atomic rename. A crash mid-write leaves the previous
/// file intact.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut body = serde_json::to_vec_pretty(value)?;
    body.push(b'\n');

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&body)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn writes_and_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");

        let mut map = BTreeMap::new();
        map.insert("b", 2);
        map.insert("a", 1);
        write_json_atomic(&path, &map).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        assert!(first.find("\"a\"").unwrap() < first.find("\"b\"").unwrap());

        map.insert("c", 3);
        write_json_atomic(&path, &map).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();
        assert!(second.contains("\"c\": 3"));

        let leftovers = std::fs::read_dir(dir.path().join("nested")).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
