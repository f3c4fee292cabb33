//! Video processing pipeline: capability seams, frame decoding, the
//! persistence seam and the orchestrator that ties them together.

pub mod capability;
pub mod decoder;
pub mod memory;
pub mod orchestrator;
pub mod store;
