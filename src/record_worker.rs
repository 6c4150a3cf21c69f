use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;

use anyhow::Result;

use crate::backend::{BackendClient, RestEventSink};
use crate::catalog;
use crate::event_log::SqliteEventLog;
use crate::record::{MirroredSink, RecordEventRequest, RecordSink};
use crate::session::Delta;

type BoxedSink = Box<dyn RecordSink + Send>;

/// Persists every request it receives: local SQLite first, then the backend
/// when one is configured. Only a request no store accepted goes back to the
/// session as `Delta::RecordFailed`.
pub fn spawn_record_writer(
    rx: Receiver<RecordEventRequest>,
    tx: Sender<Delta>,
    db_path: Option<PathBuf>,
    remote: Option<BackendClient>,
) {
    thread::spawn(move || {
        let local = match db_path.as_deref().map(SqliteEventLog::open) {
            Some(Ok(log)) => Some(log),
            Some(Err(err)) => {
                let _ = tx.send(Delta::Log(format!("[WARN] Event log unavailable: {err:#}")));
                None
            }
            None => None,
        };
        let remote = remote.map(|client| Box::new(RestEventSink::new(client)) as BoxedSink);

        let mut sink = match (local, remote) {
            (Some(local), remote) => MirroredSink::new(Box::new(local) as BoxedSink, remote),
            (None, Some(remote)) => MirroredSink::new(remote, None),
            (None, None) => {
                let _ = tx.send(Delta::Log(
                    "[WARN] No event log configured; records are not stored".to_string(),
                ));
                MirroredSink::new(Box::new(Unstored) as BoxedSink, None)
            }
        };

        write_requests(&rx, &tx, &mut sink);
    });
}

/// Drains `rx` until every sender is gone. Requests the primary rejects come
/// back as `Delta::RecordFailed`; secondary failures are only logged since
/// the event is already stored.
pub fn write_requests<A: RecordSink, B: RecordSink>(
    rx: &Receiver<RecordEventRequest>,
    tx: &Sender<Delta>,
    sink: &mut MirroredSink<A, B>,
) {
    while let Ok(request) = rx.recv() {
        match sink.submit(&request) {
            Ok(()) => {
                for err in sink.take_mirror_errors() {
                    let _ = tx.send(Delta::Log(format!(
                        "[WARN] Backend copy of {} by {} failed, kept locally: {err}",
                        catalog::label_for(&request.event_type),
                        request.player_id
                    )));
                }
            }
            Err(err) => {
                let _ = tx.send(Delta::RecordFailed {
                    request,
                    error: format!("{err:#}"),
                });
            }
        }
    }
}

struct Unstored;

impl RecordSink for Unstored {
    fn submit(&mut self, _request: &RecordEventRequest) -> Result<()> {
        Ok(())
    }
}
