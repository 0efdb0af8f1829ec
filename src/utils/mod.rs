pub mod cancel;
pub mod formatting;
