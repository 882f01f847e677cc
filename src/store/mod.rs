//! Store boundary: the `agent_status` schema and the abstract connection
//! the executor drives.
//!
//! The broker never builds query strings. The translator emits a
//! structured [`StoreOp`] and the store owns parameterized execution, so a
//! hostile condition or value can at worst fail to parse.

mod memory;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::filter::Filter;
use std::fmt;

/// Columns of the `agent_status` relation, keyed by `(tick, aid)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Tick,
    Aid,
    Role,
    State,
    Energy,
    XPos,
    YPos,
}

pub const COLUMN_COUNT: usize = Column::ALL.len();

impl Column {
    pub const ALL: [Column; 7] = [
        Column::Tick,
        Column::Aid,
        Column::Role,
        Column::State,
        Column::Energy,
        Column::XPos,
        Column::YPos,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Column::Tick => "tick",
            Column::Aid => "aid",
            Column::Role => "role",
            Column::State => "state",
            Column::Energy => "energy",
            Column::XPos => "x_pos",
            Column::YPos => "y_pos",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Column::ALL.iter().copied().find(|c| c.name() == name)
    }

    /// Parse a wire value into this column's type.
    pub fn parse(&self, value: &str) -> Result<FieldValue, StoreError> {
        let invalid = || StoreError::InvalidValue {
            column: self.name(),
            value: value.to_string(),
        };
        match self {
            Column::Tick | Column::Aid | Column::Role | Column::State | Column::Energy => {
                value.trim().parse::<i64>().map(FieldValue::Int).map_err(|_| invalid())
            }
            Column::XPos | Column::YPos => {
                value.trim().parse::<f32>().map(FieldValue::Float).map_err(|_| invalid())
            }
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single typed field, used for filter evaluation and assignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f32),
}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => a.partial_cmp(b),
            (FieldValue::Float(a), FieldValue::Float(b)) => a.partial_cmp(b),
            (FieldValue::Int(a), FieldValue::Float(b)) => (*a as f32).partial_cmp(b),
            (FieldValue::Float(a), FieldValue::Int(b)) => a.partial_cmp(&(*b as f32)),
        }
    }
}

/// One row of `agent_status`. Field types follow the reference DDL.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRow {
    pub tick: i64,
    pub aid: i64,
    pub role: i32,
    pub state: i16,
    pub energy: i32,
    pub x_pos: f32,
    pub y_pos: f32,
}

impl AgentRow {
    /// Build a row from an insert's column/value pairs. All seven columns
    /// must be assigned exactly once.
    pub fn from_assignments(columns: &[Column], values: &[String]) -> Result<Self, StoreError> {
        let mut row = AgentRow {
            tick: 0,
            aid: 0,
            role: 0,
            state: 0,
            energy: 0,
            x_pos: 0.0,
            y_pos: 0.0,
        };
        let mut seen = [false; COLUMN_COUNT];
        for (column, value) in columns.iter().zip(values) {
            let idx = Column::ALL.iter().position(|c| c == column).unwrap();
            if seen[idx] {
                return Err(StoreError::DuplicateColumn(column.name()));
            }
            seen[idx] = true;
            row.set(*column, value)?;
        }
        if let Some(idx) = seen.iter().position(|s| !s) {
            return Err(StoreError::MissingColumn(Column::ALL[idx].name()));
        }
        Ok(row)
    }

    /// Typed value of one column, for filter evaluation.
    pub fn value(&self, column: Column) -> FieldValue {
        match column {
            Column::Tick => FieldValue::Int(self.tick),
            Column::Aid => FieldValue::Int(self.aid),
            Column::Role => FieldValue::Int(self.role as i64),
            Column::State => FieldValue::Int(self.state as i64),
            Column::Energy => FieldValue::Int(self.energy as i64),
            Column::XPos => FieldValue::Float(self.x_pos),
            Column::YPos => FieldValue::Float(self.y_pos),
        }
    }

    /// Wire text of one column.
    pub fn text(&self, column: Column) -> String {
        match column {
            Column::Tick => self.tick.to_string(),
            Column::Aid => self.aid.to_string(),
            Column::Role => self.role.to_string(),
            Column::State => self.state.to_string(),
            Column::Energy => self.energy.to_string(),
            Column::XPos => self.x_pos.to_string(),
            Column::YPos => self.y_pos.to_string(),
        }
    }

    /// Assign one column from its wire text.
    pub fn set(&mut self, column: Column, value: &str) -> Result<(), StoreError> {
        let invalid = || StoreError::InvalidValue {
            column: column.name(),
            value: value.to_string(),
        };
        match column.parse(value)? {
            FieldValue::Int(n) => match column {
                Column::Tick => self.tick = n,
                Column::Aid => self.aid = n,
                Column::Role => self.role = n.try_into().map_err(|_| invalid())?,
                Column::State => self.state = n.try_into().map_err(|_| invalid())?,
                Column::Energy => self.energy = n.try_into().map_err(|_| invalid())?,
                _ => unreachable!(),
            },
            FieldValue::Float(x) => match column {
                Column::XPos => self.x_pos = x,
                Column::YPos => self.y_pos = x,
                _ => unreachable!(),
            },
        }
        Ok(())
    }
}

/// Column set a read reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// `*` on the wire.
    All,
    Columns(Vec<Column>),
}

impl Projection {
    pub fn columns(&self) -> Vec<Column> {
        match self {
            Projection::All => Column::ALL.to_vec(),
            Projection::Columns(columns) => columns.clone(),
        }
    }
}

/// A parameterized store operation produced by the translator.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    Read {
        filter: Option<Filter>,
        projection: Projection,
    },
    Write {
        filter: Option<Filter>,
        assignments: Vec<(Column, String)>,
    },
    Insert {
        columns: Vec<Column>,
        values: Vec<String>,
    },
}

/// One projected row returned by a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub aid: i64,
    pub columns: Vec<Column>,
    pub values: Vec<String>,
}

/// Abstract store connection, owned exclusively by the executor.
pub trait Store: Send {
    fn execute_read(
        &mut self,
        filter: Option<&Filter>,
        projection: &Projection,
    ) -> Result<Vec<ResultRow>, StoreError>;

    /// Apply assignments to every matching row. Returns the number of rows
    /// written.
    fn execute_write(
        &mut self,
        filter: Option<&Filter>,
        assignments: &[(Column, String)],
    ) -> Result<usize, StoreError>;

    fn execute_insert(&mut self, columns: &[Column], values: &[String])
        -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    /// Dispatch one translated operation. Reads return their rows; writes
    /// and inserts return an empty vec.
    fn apply(&mut self, op: &StoreOp) -> Result<Vec<ResultRow>, StoreError> {
        match op {
            StoreOp::Read { filter, projection } => {
                self.execute_read(filter.as_ref(), projection)
            }
            StoreOp::Write {
                filter,
                assignments,
            } => {
                self.execute_write(filter.as_ref(), assignments)?;
                Ok(Vec::new())
            }
            StoreOp::Insert { columns, values } => {
                self.execute_insert(columns, values)?;
                Ok(Vec::new())
            }
        }
    }
}
