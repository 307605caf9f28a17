//! SQL construction and parameter binding.

pub mod builder;
pub mod params;

pub use builder::{
    delete_by_pk, delete_where_in, exists_where, insert, quoted, select_by_pk, select_list,
    update_by_pk, QueryBuf,
};
pub use params::PgBindValue;
