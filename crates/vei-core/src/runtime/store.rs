// crates/vei-core/src/runtime/store.rs
// ============================================================================
// Module: VEI Receipt Sinks and Clocks
// Description: In-memory and JSON-lines receipt sinks plus receipt clocks.
// Purpose: Provide default persistence and time sources for sessions.
// Dependencies: serde_json, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`InMemoryReceiptSink`] keeps receipts behind a mutex for tests and
//! embedding hosts. [`JsonlReceiptSink`] appends one canonical JSON object
//! per line, tagged with its session id. [`LogicalClock`] stamps receipts
//! with a counter so whole logs stay byte-identical across runs;
//! [`SystemClock`] stamps unix milliseconds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::core::hashing::canonical_json_bytes;
use crate::core::identifiers::SessionId;
use crate::core::receipt::Receipt;
use crate::core::time::Timestamp;
use crate::interfaces::Clock;
use crate::interfaces::ReceiptSink;
use crate::interfaces::ReceiptSinkError;

// ============================================================================
// SECTION: In-Memory Sink
// ============================================================================

/// In-memory receipt sink.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReceiptSink {
    /// Receipts with their session ids, in append order.
    receipts: Arc<Mutex<Vec<(SessionId, Receipt)>>>,
}

impl InMemoryReceiptSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the receipts appended for a session.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptSinkError::Sink`] when the mutex is poisoned.
    pub fn receipts_for(&self, session: &SessionId) -> Result<Vec<Receipt>, ReceiptSinkError> {
        let guard = self
            .receipts
            .lock()
            .map_err(|_| ReceiptSinkError::Sink("receipt sink mutex poisoned".to_string()))?;
        Ok(guard.iter().filter(|(id, _)| id == session).map(|(_, receipt)| receipt.clone()).collect())
    }

    /// Returns the total number of receipts.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptSinkError::Sink`] when the mutex is poisoned.
    pub fn receipt_count(&self) -> Result<usize, ReceiptSinkError> {
        let guard = self
            .receipts
            .lock()
            .map_err(|_| ReceiptSinkError::Sink("receipt sink mutex poisoned".to_string()))?;
        Ok(guard.len())
    }
}

impl ReceiptSink for InMemoryReceiptSink {
    fn append(&self, session: &SessionId, receipt: &Receipt) -> Result<(), ReceiptSinkError> {
        let mut guard = self
            .receipts
            .lock()
            .map_err(|_| ReceiptSinkError::Sink("receipt sink mutex poisoned".to_string()))?;
        guard.push((session.clone(), receipt.clone()));
        Ok(())
    }

    fn flush(&self) -> Result<(), ReceiptSinkError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: JSON Lines Sink
// ============================================================================

/// Line record written by [`JsonlReceiptSink`].
#[derive(Serialize)]
struct JsonlRecord<'a> {
    /// Session identifier.
    session_id: &'a SessionId,
    /// Receipt.
    receipt: &'a Receipt,
}

/// Receipt sink appending canonical JSON lines to a file.
pub struct JsonlReceiptSink {
    /// Buffered file writer.
    writer: Mutex<BufWriter<File>>,
}

impl JsonlReceiptSink {
    /// Opens the receipt file in append mode.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptSinkError::Io`] when the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, ReceiptSinkError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|err| ReceiptSinkError::Io(err.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| ReceiptSinkError::Io(err.to_string()))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl ReceiptSink for JsonlReceiptSink {
    fn append(&self, session: &SessionId, receipt: &Receipt) -> Result<(), ReceiptSinkError> {
        let record = JsonlRecord {
            session_id: session,
            receipt,
        };
        let mut line =
            canonical_json_bytes(&record).map_err(|err| ReceiptSinkError::Serialization(err.to_string()))?;
        line.push(b'\n');
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| ReceiptSinkError::Sink("receipt sink mutex poisoned".to_string()))?;
        writer.write_all(&line).map_err(|err| ReceiptSinkError::Io(err.to_string()))
    }

    fn flush(&self) -> Result<(), ReceiptSinkError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| ReceiptSinkError::Sink("receipt sink mutex poisoned".to_string()))?;
        writer.flush().map_err(|err| ReceiptSinkError::Io(err.to_string()))
    }
}

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Counter clock yielding `Logical(1)`, `Logical(2)`, ...
#[derive(Debug, Default)]
pub struct LogicalClock {
    /// Last issued tick.
    tick: AtomicU64,
}

impl LogicalClock {
    /// Creates a clock starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tick: AtomicU64::new(0),
        }
    }
}

impl Clock for LogicalClock {
    fn now(&self) -> Timestamp {
        Timestamp::Logical(self.tick.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Wall clock yielding unix milliseconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or_default();
        Timestamp::UnixMillis(millis)
    }
}
