mod policy;
mod snowflake;

pub use policy::*;
pub use snowflake::*;
