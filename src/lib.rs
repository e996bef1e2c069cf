//! Region-parallel CpG-count annotation of alignment files.
//!
//! The engine lives in [`libs`]:
//!
//! * [`libs::region`] resolves the processing units of an input
//! * [`libs::job`] builds and runs one region's external pipeline
//! * [`libs::coordinator`] runs all jobs on a bounded pool and gates the merge
//! * [`libs::merge`] concatenates per-region outputs and indexes the result

pub mod libs;
