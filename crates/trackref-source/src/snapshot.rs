//! File-backed and offline sources.
//!
//! A snapshot is JSONL: one wire record per line, tagged with `kind`.
//! Composite rows name their owner in `parent`.

use crate::convert::{category_for_kind, convert, version_parent};
use crate::transport::{BulkSource, TransportError};
use crate::wire::{WireError, WireRecord};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, trace};
use trackref_registry::{Category, RefKey};

/// Read wire records from a JSONL reader, skipping blank and `#` lines.
pub fn read_records(reader: impl BufRead) -> Result<Vec<(usize, WireRecord)>, SnapshotError> {
    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| SnapshotError::Io(line_no + 1, e.to_string()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record = WireRecord::parse(trimmed)
            .map_err(|e| SnapshotError::Parse(line_no + 1, e.to_string()))?;
        records.push((line_no + 1, record));
    }
    Ok(records)
}

/// Serves bulk lookups from an in-memory snapshot of a tracker.
#[derive(Debug, Default)]
pub struct SnapshotSource {
    label: String,
    by_id: BTreeMap<(Category, String), WireRecord>,
    by_name: BTreeMap<(Category, String), WireRecord>,
    children: BTreeMap<(Category, RefKey), Vec<WireRecord>>,
    fetches: AtomicUsize,
}

impl SnapshotSource {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| SnapshotError::Io(0, format!("{}: {e}", path.display())))?;
        validate_bytes(path, &bytes)?;
        let mut source = Self::read(BufReader::new(bytes.as_slice()))?;
        source.label = path.display().to_string();
        Ok(source)
    }

    pub fn read(reader: impl BufRead) -> Result<Self, SnapshotError> {
        let records = read_records(reader)?;
        let mut snapshot = Self {
            label: "snapshot".to_string(),
            ..Self::default()
        };
        let mut versions = Vec::new();
        for (line, record) in records {
            let kind = record.kind().ok_or(SnapshotError::MissingKind(line))?;
            let category = category_for_kind(kind).ok_or_else(|| SnapshotError::UnknownKind {
                line,
                kind: kind.to_string(),
            })?;
            convert(category, &record).map_err(|source| SnapshotError::Record { line, source })?;
            match category {
                Category::Version => versions.push(record),
                Category::Comment | Category::Attachment => {
                    let parent = record
                        .required_key("parent")
                        .map_err(|source| SnapshotError::Record { line, source })?;
                    snapshot
                        .children
                        .entry((category, RefKey::Id(parent)))
                        .or_default()
                        .push(record);
                }
                _ => snapshot.index(category, record)?,
            }
        }
        for record in versions {
            snapshot.index_version(record)?;
        }
        debug!(
            ids = snapshot.by_id.len(),
            names = snapshot.by_name.len(),
            parents = snapshot.children.len(),
            "snapshot indexed"
        );
        Ok(snapshot)
    }

    fn index(&mut self, category: Category, record: WireRecord) -> Result<(), SnapshotError> {
        if let Some(id) = record.key_field("id").map_err(SnapshotError::from_wire)? {
            self.by_id.insert((category, id), record.clone());
        }
        if let Some(name) = record.key_field("name").map_err(SnapshotError::from_wire)? {
            self.by_name.insert((category, name), record);
        }
        Ok(())
    }

    /// Versions are listed under the project key written on the row and,
    /// when the project is in the snapshot, under its other key as well.
    fn index_version(&mut self, record: WireRecord) -> Result<(), SnapshotError> {
        let Some(parent) = version_parent(&record).map_err(SnapshotError::from_wire)? else {
            return Ok(());
        };
        let mut keys = BTreeSet::from([parent.clone()]);
        if let Some(project) = self.lookup(Category::Project, &parent) {
            if let Ok(Some(id)) = project.key_field("id") {
                keys.insert(RefKey::Id(id));
            }
            if let Ok(Some(name)) = project.key_field("name") {
                keys.insert(RefKey::Name(name));
            }
        }
        for key in keys {
            trace!(parent = %key, "indexed version");
            self.children
                .entry((Category::Version, key))
                .or_default()
                .push(record.clone());
        }
        Ok(())
    }

    fn lookup(&self, category: Category, key: &RefKey) -> Option<&WireRecord> {
        match key {
            RefKey::Id(id) => self.by_id.get(&(category, id.clone())),
            RefKey::Name(name) => self.by_name.get(&(category, name.clone())),
        }
    }

    /// Number of fetch calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn note_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::SeqCst);
    }
}

impl BulkSource for SnapshotSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn fetch_by_ids(
        &self,
        category: Category,
        ids: &[String],
    ) -> Result<Vec<WireRecord>, TransportError> {
        self.note_fetch();
        Ok(ids
            .iter()
            .filter_map(|id| self.by_id.get(&(category, id.clone())).cloned())
            .collect())
    }

    fn fetch_by_names(
        &self,
        category: Category,
        names: &[String],
    ) -> Result<Vec<WireRecord>, TransportError> {
        self.note_fetch();
        Ok(names
            .iter()
            .filter_map(|name| self.by_name.get(&(category, name.clone())).cloned())
            .collect())
    }

    fn fetch_children(
        &self,
        category: Category,
        parents: &[RefKey],
    ) -> Result<BTreeMap<RefKey, Vec<WireRecord>>, TransportError> {
        self.note_fetch();
        Ok(parents
            .iter()
            .filter_map(|parent| {
                self.children
                    .get(&(category, parent.clone()))
                    .map(|rows| (parent.clone(), rows.clone()))
            })
            .collect())
    }
}

/// A source with no backend: every fetch fails as unreachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineSource;

impl BulkSource for OfflineSource {
    fn name(&self) -> &str {
        "offline"
    }

    fn fetch_by_ids(
        &self,
        category: Category,
        _ids: &[String],
    ) -> Result<Vec<WireRecord>, TransportError> {
        Err(offline(category))
    }

    fn fetch_by_names(
        &self,
        category: Category,
        _names: &[String],
    ) -> Result<Vec<WireRecord>, TransportError> {
        Err(offline(category))
    }

    fn fetch_children(
        &self,
        category: Category,
        _parents: &[RefKey],
    ) -> Result<BTreeMap<RefKey, Vec<WireRecord>>, TransportError> {
        Err(offline(category))
    }
}

fn offline(category: Category) -> TransportError {
    TransportError::Unreachable(format!("offline mode; cannot fetch {category} records"))
}

fn validate_bytes(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    if bytes.contains(&0) {
        return Err(SnapshotError::Corrupt(format!(
            "{}: contains NUL byte(s)",
            path.display()
        )));
    }
    if std::str::from_utf8(bytes).is_err() {
        return Err(SnapshotError::Corrupt(format!(
            "{}: contains non-UTF-8 byte sequence(s)",
            path.display()
        )));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("I/O error at line {0}: {1}")]
    Io(usize, String),

    #[error("parse error at line {0}: {1}")]
    Parse(usize, String),

    #[error("corrupt snapshot: {0}")]
    Corrupt(String),

    #[error("line {0}: record has no `kind`")]
    MissingKind(usize),

    #[error("line {line}: unknown record kind `{kind}`")]
    UnknownKind { line: usize, kind: String },

    #[error("line {line}: {source}")]
    Record {
        line: usize,
        #[source]
        source: WireError,
    },
}

impl SnapshotError {
    // Rows are converted before indexing, so field errors here carry no line.
    fn from_wire(source: WireError) -> Self {
        SnapshotError::Record { line: 0, source }
    }
}
