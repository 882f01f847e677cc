//! Translation of decoded requests into store operations.
//!
//! Pure and side-effect free: no socket, no store, no queue. The receiver
//! owns what happens with the result.

use crate::error::TranslationError;
use crate::filter::Filter;
use crate::protocol::{Command, Request};
use crate::store::{Column, Projection, StoreOp};

/// Map a request onto a store operation plus a flag for whether the sender
/// expects reply rows.
///
/// `Terminate` and `RegisterListener` are intercepted by the receiver and
/// are rejected here.
pub fn translate(request: Request) -> Result<(StoreOp, bool), TranslationError> {
    let filter = request
        .condition
        .as_deref()
        .map(Filter::parse)
        .transpose()?;

    match request.command {
        Command::Terminate | Command::RegisterListener => {
            Err(TranslationError::NotTranslatable(request.command))
        }
        Command::Select => {
            let projection = if request.attributes == ["*"] {
                Projection::All
            } else {
                Projection::Columns(parse_columns(&request.attributes)?)
            };
            Ok((StoreOp::Read { filter, projection }, true))
        }
        Command::Update => {
            let values = request
                .values
                .ok_or(TranslationError::MissingValues(Command::Update))?;
            let columns = parse_columns(&request.attributes)?;
            let assignments = columns.into_iter().zip(values).collect();
            Ok((
                StoreOp::Write {
                    filter,
                    assignments,
                },
                false,
            ))
        }
        Command::Insert => {
            let values = request
                .values
                .ok_or(TranslationError::MissingValues(Command::Insert))?;
            let columns = parse_columns(&request.attributes)?;
            Ok((StoreOp::Insert { columns, values }, false))
        }
    }
}

fn parse_columns(attributes: &[String]) -> Result<Vec<Column>, TranslationError> {
    attributes
        .iter()
        .map(|name| {
            Column::from_name(name).ok_or_else(|| TranslationError::UnknownColumn(name.clone()))
        })
        .collect()
}
