//! File-backed stand-in for the attendance backend.
//!
//! `backend.json` holds the last record per worker as the server would
//! return it (zone-less times in the deployment offset). `directory.json` is
//! a list of identity records. Both are plain JSON so operators can seed or
//! inspect them by hand.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::FixedOffset;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shift_core::{
    IdentityLookup, IdentityRecord, RecordLookup, ServiceError, Submission, SubmissionService,
};
use shift_protocol::{parse_server_record, RawTime, ServerRecordDto, SubmissionKind};

const REGULAR_RECORD: i32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    #[serde(default)]
    next_id: u64,
    /// Raw record JSON, validated on read.
    #[serde(default)]
    records: BTreeMap<u64, Value>,
}

pub struct FileBackend {
    path: PathBuf,
    offset: FixedOffset,
    snapshot: Mutex<Snapshot>,
}

impl FileBackend {
    pub fn load(path: &Path, offset: FixedOffset) -> Result<Self, String> {
        let snapshot = if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read backend snapshot: {}", e))?;
            if content.trim().is_empty() {
                Snapshot::default()
            } else {
                serde_json::from_str(&content)
                    .map_err(|e| format!("Failed to parse backend snapshot: {}", e))?
            }
        } else {
            Snapshot::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            offset,
            snapshot: Mutex::new(snapshot),
        })
    }

    pub fn worker_ids(&self) -> Vec<u64> {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .records
            .keys()
            .copied()
            .collect()
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), ServiceError> {
        let content = serde_json::to_string_pretty(snapshot)
            .map_err(|e| ServiceError::Storage(format!("serializing backend snapshot: {}", e)))?;
        fs::write(&self.path, content)
            .map_err(|e| ServiceError::Storage(format!("writing backend snapshot: {}", e)))
    }
}

fn parse_stored(value: &Value) -> Result<ServerRecordDto, ServiceError> {
    parse_server_record(value.clone()).map_err(|e| ServiceError::Rejected {
        code: 500,
        message: e.to_string(),
    })
}

fn to_value(record: &ServerRecordDto) -> Result<Value, ServiceError> {
    serde_json::to_value(record)
        .map_err(|e| ServiceError::Storage(format!("serializing record: {}", e)))
}

impl RecordLookup for FileBackend {
    async fn last_attendance_record(
        &self,
        worker_id: u64,
    ) -> Result<Option<ServerRecordDto>, ServiceError> {
        let snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        snapshot.records.get(&worker_id).map(parse_stored).transpose()
    }
}

impl SubmissionService for FileBackend {
    async fn submit(&self, submission: &Submission) -> Result<(), ServiceError> {
        let dto = submission.to_dto(self.offset);
        let mut snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        let current = snapshot
            .records
            .get(&submission.worker_id)
            .map(parse_stored)
            .transpose()?;

        let next = match (dto.kind, current) {
            (SubmissionKind::CheckIn, Some(open)) if open.is_open() => {
                return Err(ServiceError::Rejected {
                    code: 400,
                    message: "worker already has an open record".to_string(),
                });
            }
            (SubmissionKind::CheckIn, _) => {
                snapshot.next_id += 1;
                ServerRecordDto {
                    id: Some(snapshot.next_id),
                    user_id: dto.user_id,
                    start_time: Some(RawTime::Text(dto.time)),
                    end_time: None,
                    record_type: Some(REGULAR_RECORD),
                    operate_user_id: Some(dto.operate_user_id),
                    operate_legal_name: None,
                    legal_name: None,
                    remark: dto.remark,
                }
            }
            (SubmissionKind::CheckOut, Some(mut open)) if open.is_open() => {
                open.end_time = Some(RawTime::Text(dto.time));
                open
            }
            (SubmissionKind::CheckOut, _) => {
                return Err(ServiceError::Rejected {
                    code: 400,
                    message: "worker has no open record".to_string(),
                });
            }
        };

        snapshot.records.insert(submission.worker_id, to_value(&next)?);
        self.save(&snapshot)?;
        tracing::info!(
            worker_id = submission.worker_id,
            kind = ?dto.kind,
            "Recorded submission in backend snapshot"
        );
        Ok(())
    }
}

/// Identity records loaded from `directory.json`.
pub struct Directory {
    records: BTreeMap<u64, IdentityRecord>,
}

impl Directory {
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "No identity directory, every lookup will miss");
            return Ok(Self {
                records: BTreeMap::new(),
            });
        }
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read identity directory: {}", e))?;
        let list: Vec<IdentityRecord> = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse identity directory: {}", e))?;
        Ok(Self {
            records: list.into_iter().map(|r| (r.user_id, r)).collect(),
        })
    }

    pub fn get(&self, worker_id: u64) -> Option<&IdentityRecord> {
        self.records.get(&worker_id)
    }
}

impl IdentityLookup for Directory {
    async fn identity(&self, worker_id: u64) -> Result<Option<IdentityRecord>, ServiceError> {
        Ok(self.records.get(&worker_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn beijing() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn submission(kind: SubmissionKind, hour: u32) -> Submission {
        Submission {
            kind,
            worker_id: 42,
            operator_id: 9,
            at: Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_submissions_persist_zoneless_times() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backend.json");
        let backend = FileBackend::load(&path, beijing()).unwrap();

        backend
            .submit(&submission(SubmissionKind::CheckIn, 1))
            .await
            .unwrap();
        backend
            .submit(&submission(SubmissionKind::CheckOut, 3))
            .await
            .unwrap();

        let reloaded = FileBackend::load(&path, beijing()).unwrap();
        let record = reloaded.last_attendance_record(42).await.unwrap().unwrap();
        assert_eq!(record.id, Some(1));
        assert_eq!(
            record.start_time,
            Some(RawTime::Text("2025-03-10 09:00:00".to_string()))
        );
        assert_eq!(
            record.end_time,
            Some(RawTime::Text("2025-03-10 11:00:00".to_string()))
        );
        assert_eq!(reloaded.worker_ids(), vec![42]);
    }

    #[tokio::test]
    async fn test_rejects_double_check_in_and_stray_check_out() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::load(&dir.path().join("backend.json"), beijing()).unwrap();

        let err = backend
            .submit(&submission(SubmissionKind::CheckOut, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Rejected { code: 400, .. }));

        backend
            .submit(&submission(SubmissionKind::CheckIn, 1))
            .await
            .unwrap();
        let err = backend
            .submit(&submission(SubmissionKind::CheckIn, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Rejected { code: 400, .. }));
    }

    #[tokio::test]
    async fn test_invalid_stored_record_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backend.json");
        fs::write(&path, r#"{"nextId":1,"records":{"42":{"userId":0}}}"#).unwrap();

        let backend = FileBackend::load(&path, beijing()).unwrap();
        assert!(backend.last_attendance_record(42).await.is_err());
        assert_eq!(backend.last_attendance_record(7).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_directory_lookup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("directory.json");
        fs::write(
            &path,
            r#"[{"userId":12345,"userName":"zhangsan","legalName":"张三","organizationId":"1"}]"#,
        )
        .unwrap();

        let directory = Directory::load(&path).unwrap();
        let record = directory.identity(12345).await.unwrap().unwrap();
        assert_eq!(record.legal_name, "张三");
        assert_eq!(record.school_id, None);
        assert!(directory.identity(1).await.unwrap().is_none());
    }

    #[test]
    fn test_missing_files_load_empty() {
        let dir = tempdir().unwrap();
        assert!(FileBackend::load(&dir.path().join("backend.json"), beijing())
            .unwrap()
            .worker_ids()
            .is_empty());
        assert!(Directory::load(&dir.path().join("directory.json"))
            .unwrap()
            .get(1)
            .is_none());
    }
}
