pub(crate) mod errors;
pub(crate) mod filters;
pub(crate) mod meta;
pub(crate) mod migrate;
pub(crate) mod run;
pub(crate) mod schedule;
pub(crate) mod shared;
