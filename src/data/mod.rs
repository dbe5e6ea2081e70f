//! Storage and persisted artifacts.

pub mod store {
    pub use crate::store::*;
}

pub mod db_storage {
    pub use crate::db_storage::*;
}

pub mod artifacts {
    pub use crate::artifacts::*;
}
