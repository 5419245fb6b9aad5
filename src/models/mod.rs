//! Runtime data model shared by the pipeline, review engine, and API.

mod cluster_id;
mod run;

pub use cluster_id::ClusterId;
pub use run::{
    BucketSummary, ClusterSummary, FaceRecord, Phase, PhotoRecord, RunContext, RunParameters,
    RunStats, SkippedPhoto, StatusSnapshot,
};
