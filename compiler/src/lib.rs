// syncflow — Synchronous dataflow middle-end
//
// Library root. Loads process networks from their JSON description,
// flattens and rewrites them (redundant zip/unzip removal, data-parallel
// fusion) and finds a sequential schedule.

pub mod description;
pub mod diag;
pub mod dot;
pub mod error;
pub mod flatten;
pub mod function;
pub mod id;
pub mod network;
pub mod parallel;
pub mod pass;
pub mod pipeline;
pub mod process;
pub mod rewrite;
pub mod schedule;
pub mod section;
