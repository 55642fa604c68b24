//! Background work: the flush-then-compact job and the CURRENT swap.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use log::{error, info};
use memtable::MemTable;

use crate::filename;
use crate::version::Version;
use crate::{DbInner, DbState};

/// Schedules a background job unless one is already running. Called with
/// the engine lock held.
pub(crate) fn maybe_schedule_compaction(inner: &Arc<DbInner>, state: &mut DbState) {
    if state.bg_compaction_scheduled {
        return;
    }
    state.bg_compaction_scheduled = true;
    let inner = Arc::clone(inner);
    thread::spawn(move || background_work(&inner));
}

/// The background job.
///
/// Snapshots `imm` and the current version under the lock, then runs the
/// heavy work — level-0 flush, compactions until every level is within
/// budget, MANIFEST save, CURRENT swap — with the lock released. Re-acquires
/// it only to install the new version (or latch the error), clear `imm`,
/// and wake whoever is waiting.
fn background_work(inner: &DbInner) {
    let (imm, base) = {
        let state = inner.state.lock();
        (state.imm.clone(), Arc::clone(&state.current))
    };
    let mut version = base.copy();
    let result = run_job(inner, imm.as_deref(), &mut version);

    let mut state = inner.state.lock();
    match result {
        Ok(()) => {
            // Writers kept issuing sequence numbers against the old version
            // while the job ran; the new one must not rewind them.
            version.set_last_seq(state.current.last_seq());
            state.current = Arc::new(version);
            state.imm = None;
        }
        Err(e) => {
            error!("background job failed: {:#}", e);
            if state.bg_error.is_none() {
                state.bg_error = Some(Arc::new(e));
            }
        }
    }
    state.bg_compaction_scheduled = false;
    inner.background_work_finished.notify_all();
}

fn run_job(inner: &DbInner, imm: Option<&MemTable>, version: &mut Version) -> Result<()> {
    if let Some(imm) = imm {
        version.write_level0_table(imm, &inner.options)?;
    }
    while version.do_compaction_work(&inner.options)? {
        version.log_levels();
    }
    let manifest_number = version.save()?;
    set_current_file(&inner.name, manifest_number)?;
    info!("installed manifest {:06}", manifest_number);
    Ok(())
}

/// Points CURRENT at `manifest_number` via write-to-temp-then-rename, so a
/// crash leaves either the old pointer or the new one, never a torn file.
pub(crate) fn set_current_file(name: &Path, manifest_number: u64) -> Result<()> {
    let tmp = filename::temp_file_name(name, manifest_number);
    fs::write(&tmp, format!("{manifest_number}"))
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, filename::current_file_name(name))?;
    Ok(())
}

/// Reads the active MANIFEST number from CURRENT; `None` means a fresh
/// database (missing or unparsable file).
pub(crate) fn read_current_file(name: &Path) -> Option<u64> {
    let contents = fs::read_to_string(filename::current_file_name(name)).ok()?;
    contents.trim().parse().ok()
}
