use crate::error::StoreError;
use crate::filter::Filter;
use crate::store::{AgentRow, Column, Projection, ResultRow, Store};
use std::collections::{BTreeMap, BTreeSet};

/// An in-memory `agent_status` relation, used by tests and demos.
///
/// Rows are keyed by `(tick, aid)` like the reference table; inserting a
/// duplicate key is a constraint violation. Commits are immediate, so
/// `commit` is a no-op.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: BTreeMap<(i64, i64), AgentRow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &AgentRow> {
        self.rows.values()
    }

    fn matching_keys(&self, filter: Option<&Filter>) -> Vec<(i64, i64)> {
        self.rows
            .iter()
            .filter(|(_, row)| filter.map_or(true, |f| f.matches(row)))
            .map(|(key, _)| *key)
            .collect()
    }
}

impl Store for MemoryStore {
    fn execute_read(
        &mut self,
        filter: Option<&Filter>,
        projection: &Projection,
    ) -> Result<Vec<ResultRow>, StoreError> {
        let columns = projection.columns();
        Ok(self
            .rows
            .values()
            .filter(|row| filter.map_or(true, |f| f.matches(row)))
            .map(|row| ResultRow {
                aid: row.aid,
                columns: columns.clone(),
                values: columns.iter().map(|c| row.text(*c)).collect(),
            })
            .collect())
    }

    fn execute_write(
        &mut self,
        filter: Option<&Filter>,
        assignments: &[(Column, String)],
    ) -> Result<usize, StoreError> {
        let matched = self.matching_keys(filter);

        // Stage all updated rows first so a bad value or key collision
        // leaves the relation untouched, like a failed SQL statement.
        let mut updated = Vec::with_capacity(matched.len());
        for key in &matched {
            let mut row = self.rows[key].clone();
            for (column, value) in assignments {
                row.set(*column, value)?;
            }
            updated.push(row);
        }

        let matched_set: BTreeSet<_> = matched.iter().copied().collect();
        let mut new_keys = BTreeSet::new();
        for row in &updated {
            let key = (row.tick, row.aid);
            if !new_keys.insert(key)
                || (self.rows.contains_key(&key) && !matched_set.contains(&key))
            {
                return Err(StoreError::DuplicateKey {
                    tick: row.tick,
                    aid: row.aid,
                });
            }
        }

        for key in &matched {
            self.rows.remove(key);
        }
        let count = updated.len();
        for row in updated {
            self.rows.insert((row.tick, row.aid), row);
        }
        Ok(count)
    }

    fn execute_insert(
        &mut self,
        columns: &[Column],
        values: &[String],
    ) -> Result<(), StoreError> {
        let row = AgentRow::from_assignments(columns, values)?;
        let key = (row.tick, row.aid);
        if self.rows.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                tick: row.tick,
                aid: row.aid,
            });
        }
        self.rows.insert(key, row);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}
