//! Entity-to-table mapping.
//!
//! The [`entity!`] macro turns a struct definition into an [`Entity`]
//! implementation: the table name defaults to the lowercased type name,
//! the primary key defaults to the first field, `Option<T>` fields map
//! to nullable columns.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use feed_common::error::{ErrorCategory, ErrorClassification};

use super::value::SqlValue;

/// Storage errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StorageError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// Column value did not convert to the field type
    #[error("Column '{column}' decode failed: {reason}")]
    Decode { column: String, reason: String },

    /// Deleting with an empty condition would clear the table
    #[error("Refusing to delete without a condition")]
    EmptyCondition,
}

impl ErrorClassification for StorageError {
    fn category(&self) -> ErrorCategory {
        match self {
            StorageError::Database(sqlx::Error::PoolTimedOut) => {
                ErrorCategory::ResourceExhausted
            }
            StorageError::Database(sqlx::Error::Io(_)) => ErrorCategory::Transient,
            StorageError::Database(_) => ErrorCategory::Internal,
            _ => ErrorCategory::Permanent,
        }
    }
}

/// A column of an entity table.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub nullable: bool,
}

/// A struct persisted as one table row.
pub trait Entity: Sized + Send + Sync + Unpin {
    /// Table name.
    fn table() -> &'static str;

    /// All columns in declaration order.
    fn columns() -> &'static [Column];

    /// Primary key column names, a subset of [`Self::columns`].
    fn primary_key() -> &'static [&'static str];

    /// Field values in column order.
    fn values(&self) -> Vec<SqlValue>;

    /// Rebuild from a result row.
    fn from_row(row: &SqliteRow) -> Result<Self, StorageError>;
}

/// A Rust type usable as an entity field.
pub trait SqlField: Sized {
    const SQL_TYPE: &'static str;
    const NULLABLE: bool = false;

    fn to_value(&self) -> SqlValue;
    fn from_row(row: &SqliteRow, column: &'static str) -> Result<Self, StorageError>;
}

fn decode_err(column: &'static str, e: sqlx::Error) -> StorageError {
    StorageError::Decode {
        column: column.to_string(),
        reason: e.to_string(),
    }
}

impl SqlField for String {
    const SQL_TYPE: &'static str = "TEXT";

    fn to_value(&self) -> SqlValue {
        SqlValue::Text(self.clone())
    }

    fn from_row(row: &SqliteRow, column: &'static str) -> Result<Self, StorageError> {
        row.try_get(column).map_err(|e| decode_err(column, e))
    }
}

impl SqlField for i64 {
    const SQL_TYPE: &'static str = "INTEGER";

    fn to_value(&self) -> SqlValue {
        SqlValue::Integer(*self)
    }

    fn from_row(row: &SqliteRow, column: &'static str) -> Result<Self, StorageError> {
        row.try_get(column).map_err(|e| decode_err(column, e))
    }
}

impl SqlField for u64 {
    const SQL_TYPE: &'static str = "INTEGER";

    fn to_value(&self) -> SqlValue {
        SqlValue::Integer(*self as i64)
    }

    fn from_row(row: &SqliteRow, column: &'static str) -> Result<Self, StorageError> {
        let raw: i64 = row.try_get(column).map_err(|e| decode_err(column, e))?;
        Ok(raw as u64)
    }
}

impl SqlField for f64 {
    const SQL_TYPE: &'static str = "REAL";

    fn to_value(&self) -> SqlValue {
        SqlValue::Real(*self)
    }

    fn from_row(row: &SqliteRow, column: &'static str) -> Result<Self, StorageError> {
        row.try_get(column).map_err(|e| decode_err(column, e))
    }
}

impl SqlField for bool {
    const SQL_TYPE: &'static str = "INTEGER";

    fn to_value(&self) -> SqlValue {
        SqlValue::Bool(*self)
    }

    fn from_row(row: &SqliteRow, column: &'static str) -> Result<Self, StorageError> {
        row.try_get(column).map_err(|e| decode_err(column, e))
    }
}

impl<T: SqlField> SqlField for Option<T> {
    const SQL_TYPE: &'static str = T::SQL_TYPE;
    const NULLABLE: bool = true;

    fn to_value(&self) -> SqlValue {
        match self {
            Some(v) => v.to_value(),
            None => SqlValue::Null,
        }
    }

    fn from_row(row: &SqliteRow, column: &'static str) -> Result<Self, StorageError> {
        match row.try_get_raw(column) {
            Ok(raw) => {
                use sqlx::ValueRef;
                if raw.is_null() {
                    Ok(None)
                } else {
                    T::from_row(row, column).map(Some)
                }
            }
            Err(e) => Err(decode_err(column, e)),
        }
    }
}

/// Define an entity struct and derive its [`Entity`] implementation.
///
/// ```ignore
/// entity! {
///     /// A watched instrument.
///     pub struct Instruments {
///         pk = [provider, symbol];
///         provider: String,
///         symbol: String,
///         metadata: String,
///     }
/// }
/// ```
///
/// Omitting `pk = [...]` keys the table on the first field. The table
/// name is the lowercased struct name unless overridden with
/// `table = "..."` before the `pk` line.
#[macro_export]
macro_rules! entity {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $first:ident : $first_ty:ty
            $(, $field:ident : $ty:ty)* $(,)?
        }
    ) => {
        $crate::entity! {
            $(#[$meta])*
            pub struct $name {
                pk = [$first];
                $first : $first_ty
                $(, $field : $ty)*
            }
        }
    };

    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            pk = [$($pk:ident),+ $(,)?];
            $($field:ident : $ty:ty),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            $(pub $field: $ty),+
        }

        impl $crate::storage::entity::Entity for $name {
            fn table() -> &'static str {
                static TABLE: ::std::sync::OnceLock<String> = ::std::sync::OnceLock::new();
                TABLE.get_or_init(|| stringify!($name).to_lowercase())
            }

            $crate::entity!(@impl $name { $($pk),+ ; $($field : $ty),+ });
        }
    };

    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            table = $table:literal;
            pk = [$($pk:ident),+ $(,)?];
            $($field:ident : $ty:ty),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            $(pub $field: $ty),+
        }

        impl $crate::storage::entity::Entity for $name {
            fn table() -> &'static str {
                $table
            }

            $crate::entity!(@impl $name { $($pk),+ ; $($field : $ty),+ });
        }
    };

    (@impl $name:ident { $($pk:ident),+ ; $($field:ident : $ty:ty),+ }) => {

            fn columns() -> &'static [$crate::storage::entity::Column] {
                static COLUMNS: ::std::sync::OnceLock<
                    Vec<$crate::storage::entity::Column>,
                > = ::std::sync::OnceLock::new();
                COLUMNS.get_or_init(|| vec![
                    $($crate::storage::entity::Column {
                        name: stringify!($field),
                        sql_type: <$ty as $crate::storage::entity::SqlField>::SQL_TYPE,
                        nullable: <$ty as $crate::storage::entity::SqlField>::NULLABLE,
                    }),+
                ])
            }

            fn primary_key() -> &'static [&'static str] {
                &[$(stringify!($pk)),+]
            }

            fn values(&self) -> Vec<$crate::storage::value::SqlValue> {
                vec![
                    $(<$ty as $crate::storage::entity::SqlField>::to_value(&self.$field)),+
                ]
            }

            fn from_row(
                row: &::sqlx::sqlite::SqliteRow,
            ) -> Result<Self, $crate::storage::entity::StorageError> {
                Ok(Self {
                    $($field: <$ty as $crate::storage::entity::SqlField>::from_row(
                        row,
                        stringify!($field),
                    )?),+
                })
            }
    };
}
