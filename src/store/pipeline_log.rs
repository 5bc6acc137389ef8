use super::LogError;
use super::lock::{RecordLock, write_record};
use super::webhook_log::scan_record_files;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Pipeline job stages. Top-level job status always equals the name of the
/// last appended stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    Queued,
    Enriching,
    Enriched,
    Mapping,
    Mapped,
    Pushing,
    Pushed,
    Error,
    Skipped,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Queued => "queued",
            JobStage::Enriching => "enriching",
            JobStage::Enriched => "enriched",
            JobStage::Mapping => "mapping",
            JobStage::Mapped => "mapped",
            JobStage::Pushing => "pushing",
            JobStage::Pushed => "pushed",
            JobStage::Error => "error",
            JobStage::Skipped => "skipped",
        }
    }

}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEntry {
    pub stage: JobStage,
    pub timestamp: DateTime<Utc>,
    pub data: Option<Value>,
    pub error: Option<String>,
}

/// One product-sync attempt, tracked from `queued` to a terminal stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineJob {
    pub job_id: String,
    /// Back-reference to the webhook record that triggered this job. Not
    /// ownership — the event log alone mutates that file.
    pub source_webhook_file: String,
    pub topic: String,
    pub product_id: u64,
    pub event_id: String,
    pub created_at: DateTime<Utc>,
    pub status: JobStage,
    /// Last failure reason. Sticky: survives later successful stages.
    pub error: Option<String>,
    pub stages: Vec<StageEntry>,
}

#[derive(Debug, Clone)]
pub struct LoggedJob {
    pub path: PathBuf,
    pub record: PipelineJob,
}

/// Internal pipeline transaction log, separate from the webhook event log:
/// this tracks processing state, not raw events.
///
/// Layout: `<dir>/<YYYY-MM-DD>/<YYYYMMDDTHHMMSSZ>_product_<id>.json`.
pub struct PipelineLog {
    dir: PathBuf,
}

impl PipelineLog {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, LogError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Create a new job record with an initial `queued` stage. Returns the
    /// job path, the handle for subsequent stage appends.
    pub fn create_job(
        &self,
        source_file: &str,
        topic: &str,
        product_id: u64,
        event_id: &str,
    ) -> Result<PathBuf, LogError> {
        let now = Utc::now();
        let job_id = format!("{}_product_{}", now.format("%Y%m%dT%H%M%SZ"), product_id);

        let record = PipelineJob {
            job_id: job_id.clone(),
            source_webhook_file: source_file.to_string(),
            topic: topic.to_string(),
            product_id,
            event_id: event_id.to_string(),
            created_at: now,
            status: JobStage::Queued,
            error: None,
            stages: vec![StageEntry {
                stage: JobStage::Queued,
                timestamp: now,
                data: None,
                error: None,
            }],
        };

        let day_dir = self.dir.join(now.format("%Y-%m-%d").to_string());
        fs::create_dir_all(&day_dir)?;
        let path = day_dir.join(format!("{job_id}.json"));

        let _lock = RecordLock::acquire(&path)?;
        write_record(&path, &record)?;
        Ok(path)
    }

    /// Append a stage entry and set the job's top-level status to it. A
    /// supplied error string also lands in the job's top-level `error`
    /// field, where it persists across later non-error stages: the last
    /// failure reason stays visible even after a retry succeeds.
    pub fn append_stage(
        path: &Path,
        stage: JobStage,
        data: Option<Value>,
        error: Option<String>,
    ) -> Result<PipelineJob, LogError> {
        let _lock = RecordLock::acquire(path)?;
        let raw = fs::read_to_string(path)?;
        let mut record: PipelineJob = serde_json::from_str(&raw)?;

        record.status = stage;
        record.stages.push(StageEntry {
            stage,
            timestamp: Utc::now(),
            data,
            error: error.clone(),
        });
        if let Some(err) = error {
            record.error = Some(err);
        }

        write_record(path, &record)?;
        tracing::debug!(
            target = "vendize.log",
            stage = stage.as_str(),
            job = %record.job_id,
            "job stage appended"
        );
        Ok(record)
    }

    /// All jobs with the given status, oldest first, skipping corrupt files.
    pub fn jobs_by_status(
        &self,
        status: JobStage,
        date: Option<&str>,
    ) -> Result<Vec<LoggedJob>, LogError> {
        let mut results = Vec::new();
        for path in scan_record_files(&self.dir, date)? {
            let Ok(raw) = fs::read_to_string(&path) else {
                continue;
            };
            let Ok(record) = serde_json::from_str::<PipelineJob>(&raw) else {
                continue;
            };
            if record.status == status {
                results.push(LoggedJob { path, record });
            }
        }
        Ok(results)
    }
}
