//! Utility functions for string formatting and manipulation.

pub mod format;

// Re-export commonly used functions at module level
pub use format::{
    blank_to_none, format_currency, format_date, format_optional, format_phone, truncate_string,
};
