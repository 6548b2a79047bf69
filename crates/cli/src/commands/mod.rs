pub mod backends;
pub mod listing;
pub mod load;
pub mod program;
pub mod prompt;
pub mod util;

pub use backends::*;
pub use listing::*;
pub use load::*;
pub use program::*;
pub use prompt::*;
pub use util::*;
