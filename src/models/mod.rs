pub mod finding;
pub mod metric;
pub mod report;
pub mod resource;
pub mod rule;
pub mod scan_result;
pub mod target;

pub use finding::*;
pub use metric::*;
pub use report::*;
pub use resource::*;
pub use rule::*;
pub use scan_result::*;
pub use target::*;
