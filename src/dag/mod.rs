// src/dag/mod.rs

//! DAG representation.
//!
//! - [`plan`] holds job-execution plans and the identifiers derived from
//!   them ([`DagId`], [`JobKey`]).
//! - [`graph`] builds the immutable-shape [`Dag`] of [`DagNode`]s and answers
//!   dependency queries.

pub mod graph;
pub mod plan;

pub use graph::{Dag, DagError, DagNode};
pub use plan::{DagId, FLOW_LEVEL_JOB, JobExecutionPlan, JobKey};
