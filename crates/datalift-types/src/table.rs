//! Ordered, name-unique column collection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::column::{Column, DeltaType};
use crate::error::EtlError;
use crate::value::Row;

/// A table schema. Ordinal = position, stable for the life of an open
/// transform. Every row produced against this schema has exactly
/// `columns().len()` values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    #[serde(skip)]
    ordinals: HashMap<String, usize>,
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.columns == other.columns
    }
}

impl Table {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            ordinals: HashMap::new(),
        }
    }

    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self, EtlError> {
        let mut table = Self::empty(name);
        for column in columns {
            table.add_column(column)?;
        }
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, ordinal: usize) -> &Column {
        &self.columns[ordinal]
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn add_column(&mut self, column: Column) -> Result<(), EtlError> {
        if self.ordinals.contains_key(&column.name) {
            return Err(EtlError::contract(format!(
                "table {} already has a column named {}",
                self.name, column.name
            )));
        }
        self.ordinals.insert(column.name.clone(), self.columns.len());
        self.columns.push(column);
        Ok(())
    }

    /// Add a generated column for `delta_type` unless one already exists.
    /// Returns the ordinal of the existing or new column.
    pub fn ensure_delta_column(
        &mut self,
        name: &str,
        delta_type: DeltaType,
    ) -> Result<usize, EtlError> {
        if let Some(ordinal) = self.ordinal_of_delta(delta_type) {
            return Ok(ordinal);
        }
        self.add_column(Column::for_delta(name, delta_type))?;
        Ok(self.columns.len() - 1)
    }

    pub fn ordinal_of(&self, name: &str) -> Option<usize> {
        self.ordinals.get(name).copied()
    }

    /// Ordinal of the first column carrying the given role tag.
    pub fn ordinal_of_delta(&self, delta_type: DeltaType) -> Option<usize> {
        self.columns.iter().position(|c| c.delta_type == delta_type)
    }

    /// Resolve a list of column names to ordinals, failing on the first
    /// name the schema does not contain.
    pub fn ordinals_of(&self, names: &[String]) -> Result<Vec<usize>, EtlError> {
        names
            .iter()
            .map(|name| {
                self.ordinal_of(name).ok_or_else(|| {
                    EtlError::contract(format!(
                        "table {} has no column named {name}",
                        self.name
                    ))
                })
            })
            .collect()
    }

    /// Check the row-shape invariant for a row produced against this schema.
    pub fn check_row(&self, row: &Row) -> Result<(), EtlError> {
        if row.len() != self.columns.len() {
            return Err(EtlError::contract(format!(
                "row has {} values but table {} has {} columns",
                row.len(),
                self.name,
                self.columns.len()
            )));
        }
        Ok(())
    }

    /// Rebuild the name index after deserialization.
    pub fn reindex(&mut self) {
        self.ordinals = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
    }
}
