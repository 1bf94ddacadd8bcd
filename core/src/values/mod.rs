//! Runtime values, rows and buffered result sets.

mod row;
mod value;

pub use row::{Column, ResultSet, Row, UPDATE_COUNT_COLUMN, find_column};
pub use value::{DataType, Value};
