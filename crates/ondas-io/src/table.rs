//! Host-owned float arrays and their lookup set.

use ondas_core::{Error, Result};

/// A named float array serving as a transfer source or destination.
///
/// Stands in for an array owned by the host environment. The `keep`
/// attribute marks an array whose contents the host persists; it is
/// cleared whenever a read resizes the array. The `dirty` flag is the
/// redraw notification: transfers set it and the host collects it.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    data: Vec<f32>,
    keep: bool,
    dirty: bool,
}

impl Table {
    /// Create a zero-filled table.
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Table {
            name: name.into(),
            data: vec![0.0; len],
            keep: false,
            dirty: false,
        }
    }

    /// Create a table from existing samples.
    pub fn from_samples(name: impl Into<String>, data: Vec<f32>) -> Self {
        Table {
            name: name.into(),
            data,
            keep: false,
            dirty: false,
        }
    }

    /// The table's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the table holds no samples.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The samples.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// The samples, mutably.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Grow or shrink to `len` samples, zero-filling new space. Clears
    /// the `keep` attribute: a resized array is no longer saved by the
    /// host.
    pub fn resize(&mut self, len: usize) -> Result<()> {
        if len > self.data.len() {
            let grow = len - self.data.len();
            self.data
                .try_reserve_exact(grow)
                .map_err(|_| Error::ResizeFailed(self.name.clone()))?;
        }
        self.data.resize(len, 0.0);
        self.keep = false;
        Ok(())
    }

    /// Mark the array as persisted by the host.
    pub fn set_keep(&mut self, keep: bool) {
        self.keep = keep;
    }

    /// True when the host persists this array's contents.
    pub fn keep(&self) -> bool {
        self.keep
    }

    /// Flag the array for redraw.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Collect and clear the redraw flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

/// An ordered collection of tables with lookup by name.
#[derive(Debug, Default)]
pub struct TableSet {
    tables: Vec<Table>,
}

impl TableSet {
    /// An empty set.
    pub fn new() -> Self {
        TableSet::default()
    }

    /// Add a table; a later table shadows an earlier one of the same
    /// name.
    pub fn insert(&mut self, table: Table) {
        self.tables.push(table);
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// True when the set holds no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Borrow a table by name (the most recently inserted wins).
    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.iter().rev().find(|t| t.name() == name)
    }

    /// Borrow a table mutably by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().rev().find(|t| t.name() == name)
    }

    /// Borrow a table by position.
    pub fn at(&self, index: usize) -> &Table {
        &self.tables[index]
    }

    /// Borrow a table mutably by position.
    pub fn at_mut(&mut self, index: usize) -> &mut Table {
        &mut self.tables[index]
    }

    /// Iterate over the tables in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    /// Map array names to positions, failing on the first missing one.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                self.tables
                    .iter()
                    .rposition(|t| t.name() == name)
                    .ok_or_else(|| Error::ArrayNotFound(name.clone()))
            })
            .collect()
    }
}
