//! Scan a code, check in, restart from disk, and run diagnostics over the
//! persisted store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use shift_core::{
    issue_hash_code, AttendanceMachine, AttendanceStatus, Conflict, ConflictDiagnostics,
    DigestScheme, FileStore, FixedClock, IdentityError, IdentityHashVerifier, IdentityLookup,
    IdentityRecord, InterpretationLog, KeyValueStore, RecordLookup, ServiceError, Submission,
    SubmissionService, TimerRegistry, TimestampResolver, CHECKIN_CACHE_KEY,
};
use shift_protocol::{RawTime, ServerRecordDto, SubmissionKind};
use tempfile::TempDir;

const OPERATOR: u64 = 9;

fn beijing() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap()
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
}

fn zhang() -> IdentityRecord {
    IdentityRecord {
        user_id: 12345,
        user_name: "zhangsan".to_string(),
        legal_name: "张三".to_string(),
        organization_id: Some("1".to_string()),
        school_id: None,
    }
}

#[derive(Default)]
struct Backend {
    people: HashMap<u64, IdentityRecord>,
    records: Mutex<HashMap<u64, ServerRecordDto>>,
}

impl Backend {
    fn with_people(people: &[IdentityRecord]) -> Self {
        Self {
            people: people.iter().map(|p| (p.user_id, p.clone())).collect(),
            records: Mutex::default(),
        }
    }

    fn put_record(&self, record: ServerRecordDto) {
        self.records.lock().unwrap().insert(record.user_id, record);
    }
}

impl IdentityLookup for Backend {
    async fn identity(&self, worker_id: u64) -> Result<Option<IdentityRecord>, ServiceError> {
        Ok(self.people.get(&worker_id).cloned())
    }
}

impl RecordLookup for Backend {
    async fn last_attendance_record(
        &self,
        worker_id: u64,
    ) -> Result<Option<ServerRecordDto>, ServiceError> {
        Ok(self.records.lock().unwrap().get(&worker_id).cloned())
    }
}

impl SubmissionService for Backend {
    async fn submit(&self, submission: &Submission) -> Result<(), ServiceError> {
        let dto = submission.to_dto(beijing());
        let mut records = self.records.lock().unwrap();
        match submission.kind {
            SubmissionKind::CheckIn => {
                records.insert(
                    submission.worker_id,
                    ServerRecordDto {
                        id: Some(77),
                        user_id: submission.worker_id,
                        start_time: Some(RawTime::Text(dto.time)),
                        end_time: None,
                        record_type: Some(1),
                        operate_user_id: Some(submission.operator_id),
                        operate_legal_name: None,
                        legal_name: None,
                        remark: None,
                    },
                );
            }
            SubmissionKind::CheckOut => {
                if let Some(record) = records.get_mut(&submission.worker_id) {
                    record.end_time = Some(RawTime::Text(dto.time));
                }
            }
        }
        Ok(())
    }
}

type Machine = AttendanceMachine<Arc<Backend>, Arc<Backend>, Arc<FileStore>>;

fn machine(
    backend: &Arc<Backend>,
    store: &Arc<FileStore>,
    clock: &Arc<FixedClock>,
    log: &Arc<InterpretationLog>,
) -> Machine {
    AttendanceMachine::new(
        Arc::clone(backend),
        Arc::clone(backend),
        Arc::clone(store),
        TimestampResolver::new(beijing()).with_log(Arc::clone(log)),
        clock.clone(),
    )
}

#[tokio::test]
async fn test_scanned_worker_survives_restart() {
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("store.json");
    let backend = Arc::new(Backend::with_people(&[zhang()]));
    let clock = Arc::new(FixedClock::new(at(1, 0)));
    let log = Arc::new(InterpretationLog::default());

    let code = issue_hash_code(&zhang(), at(0, 30).timestamp(), DigestScheme::StringHash32);
    let payload = IdentityHashVerifier::default()
        .verify(&code, backend.as_ref())
        .await
        .unwrap();
    assert_eq!(payload.display_name, "张三");

    {
        let store = Arc::new(FileStore::load(&store_path).unwrap());
        let first = machine(&backend, &store, &clock, &log);
        let state = first
            .check_in(payload.worker_id, OPERATOR, at(1, 0))
            .await
            .unwrap();
        assert_eq!(state.status, AttendanceStatus::CheckedIn);
    }

    let store = Arc::new(FileStore::load(&store_path).unwrap());
    assert!(store.get(CHECKIN_CACHE_KEY).await.unwrap().is_some());

    let second = machine(&backend, &store, &clock, &log);
    assert_eq!(second.restore().await.unwrap(), 1);
    let restored = second.state(12345);
    assert_eq!(restored.status, AttendanceStatus::CheckedIn);
    assert_eq!(restored.current_open_record.unwrap().start, at(1, 0));

    clock.set(at(2, 0));
    let refreshed = second.refresh(12345).await.unwrap();
    assert_eq!(
        refreshed.current_open_record.and_then(|r| r.record_id),
        Some(77)
    );

    let state = second.check_out(12345, OPERATOR, at(2, 0)).await.unwrap();
    assert_eq!(
        state.last_closed_record.and_then(|r| r.duration_minutes),
        Some(60)
    );
    let reloaded = FileStore::load(&store_path).unwrap();
    assert_eq!(reloaded.get(CHECKIN_CACHE_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn test_forged_code_never_reaches_attendance() {
    let backend = Backend::with_people(&[zhang()]);
    let mut forged = zhang();
    forged.legal_name = "李四".to_string();
    let code = issue_hash_code(&forged, at(0, 30).timestamp(), DigestScheme::StringHash32);

    let err = IdentityHashVerifier::default()
        .verify(&code, &backend)
        .await
        .unwrap_err();
    assert_eq!(err, IdentityError::Tampered { worker_id: 12345 });
}

#[tokio::test]
async fn test_diagnostics_over_persisted_session() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileStore::load(&dir.path().join("store.json")).unwrap());
    let backend = Arc::new(Backend::with_people(&[zhang()]));
    let clock = Arc::new(FixedClock::new(at(1, 0)));
    let log = Arc::new(InterpretationLog::default());
    let timers = TimerRegistry::new();
    let _poll = timers.register("status-poll");

    let attendance = machine(&backend, &store, &clock, &log);
    attendance.check_in(12345, OPERATOR, at(1, 0)).await.unwrap();

    let diagnostics =
        ConflictDiagnostics::new(Arc::clone(&timers), Arc::clone(&log), clock.clone(), clock.clone());
    assert!(diagnostics.scan(store.as_ref()).await.unwrap().is_empty());

    // A second worker whose server record reads as UTC near midnight.
    backend.put_record(ServerRecordDto {
        id: Some(5),
        user_id: 500,
        start_time: Some(RawTime::Text("2025-03-10 23:50:00".to_string())),
        end_time: None,
        record_type: Some(1),
        operate_user_id: None,
        operate_legal_name: None,
        legal_name: None,
        remark: None,
    });
    clock.set(at(23, 55));
    attendance.refresh(500).await.unwrap();

    store
        .set("legacy_checkin_backup", "{}".to_string())
        .await
        .unwrap();
    let _duplicate = timers.register("status-poll");

    let conflicts = diagnostics.scan(store.as_ref()).await.unwrap();
    assert!(conflicts
        .iter()
        .any(|c| matches!(c, Conflict::DuplicateTimers { count: 2, .. })));
    assert!(conflicts
        .iter()
        .any(|c| matches!(c, Conflict::DuplicateCacheKeys { keys } if keys.len() == 2)));
    assert!(conflicts
        .iter()
        .any(|c| matches!(c, Conflict::MixedInterpretations { .. })));
    assert!(!conflicts
        .iter()
        .any(|c| matches!(c, Conflict::ClockDisagreement { .. })));
}
