pub mod history;

pub use history::{EditHistory, EditSnapshot, DEFAULT_CAPACITY};
