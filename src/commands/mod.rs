pub mod checkpoint;
pub mod drift;
pub mod import;
pub mod rollback;
pub mod validate;
