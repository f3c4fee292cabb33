//! Video-to-text worker: configuration, the job dispatcher, export
//! retention and the user-facing video service.

pub mod config;
pub mod dispatcher;
pub mod retention;
pub mod service;

use std::sync::Arc;

use v2t_pipeline::capability::{CommandDetector, TesseractRecognizer};
use v2t_pipeline::decoder::FfmpegDecoder;
use v2t_pipeline::orchestrator::PipelineOrchestrator;
use v2t_pipeline::store::VideoStore;

use crate::config::{ConfigError, WorkerConfig};
use crate::dispatcher::JobSettings;

/// Wire the production decoder and capabilities into an orchestrator.
pub fn build_orchestrator(
    config: &WorkerConfig,
    store: Arc<dyn VideoStore>,
) -> Result<PipelineOrchestrator, ConfigError> {
    let detector = CommandDetector::from_command_line(&config.detector_command)
        .ok_or_else(|| ConfigError::Invalid {
            var: "DETECTOR_COMMAND",
            value: config.detector_command.clone(),
            reason: "no program given".into(),
        })?
        .with_timeout(config.capability_timeout);
    let recognizer = TesseractRecognizer::new(config.tesseract_bin.clone(), config.ocr_language.clone())
        .with_timeout(config.capability_timeout);

    Ok(PipelineOrchestrator::new(
        store,
        Arc::new(FfmpegDecoder),
        Arc::new(detector),
        Arc::new(recognizer),
        config.layout.clone(),
    )
    .with_worker_name(config.worker_name.clone())
    .with_capability_timeout(config.capability_timeout)
    .with_lease_ttl(config.lease_ttl))
}

pub fn job_settings(config: &WorkerConfig) -> JobSettings {
    JobSettings {
        interval_secs: config.frame_interval_secs,
        confidence_threshold: config.confidence_threshold,
    }
}
