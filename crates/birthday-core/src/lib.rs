pub mod dates;
pub mod db;
pub mod error;
pub mod model;

pub use dates::days_until_birthday;
pub use db::{DEFAULT_TABLE_NAME, RecordStore};
pub use error::CoreError;
pub use model::{BirthdayRecord, RecordError, Username, UsernameError};
