//! Pipeline orchestration
//!
//! [`config`] turns raw options into validated [`PipelineOptions`];
//! [`dispatcher`] runs the stages for one data source and collects the
//! rendered blocks into a [`RunOutcome`].

pub mod config;
pub mod dispatcher;

pub use config::{
    parse_arguments, GroupBy, LabelFilter, LabelPattern, PipelineConfig, PipelineOptions, DEFAULT_IGNORE,
};
pub use dispatcher::{Dispatcher, RunOutcome, RunStatus, MAX_PATH_NESTING, WRAPPER_LABEL};
