//! Adapter around an external `exiftool` process.
//!
//! # Overview
//!
//! Starting the extractor costs hundreds of milliseconds, which dominates
//! per-file extraction. The adapter therefore keeps one process alive in
//! `-stay_open` batch mode and feeds it argfile commands over stdin,
//! reading JSON responses from stdout; batch exchanges amortize the startup
//! cost across many files. Extended extraction needs flags the stay-open
//! channel does not support, so it always runs as a one-shot invocation.
//!
//! # Process lifecycle
//!
//! The subprocess handle lives in a small state machine
//! (`Stopped` / `Ready` / `Failed`). Before every exchange the adapter
//! health-checks the child and transparently respawns a dead one, up to a
//! bounded number of consecutive failures. All exchanges are serialized
//! behind one mutex: there is a single request/response stream, so one
//! caller at a time.
//!
//! Every spawned child is also registered in a process-wide registry;
//! [`force_cleanup_all`] kills anything still alive and is wired into both
//! normal exit and the Ctrl+C path as a safety net against leaked
//! `exiftool` processes.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use super::{ExtractError, ExtractionMode, MetadataRecord, MetadataSource};

/// Default per-exchange timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on consecutive restart attempts.
pub const DEFAULT_MAX_RESTARTS: u32 = 2;

type ChildSlot = Arc<Mutex<Option<Child>>>;

/// Registry of all children this process has spawned and not yet reaped.
static PROCESS_REGISTRY: OnceLock<Mutex<Vec<ChildSlot>>> = OnceLock::new();

fn registry() -> &'static Mutex<Vec<ChildSlot>> {
    PROCESS_REGISTRY.get_or_init(|| Mutex::new(Vec::new()))
}

fn register_child(slot: ChildSlot) {
    let mut reg = registry().lock().unwrap();
    // Drop slots whose children were already reaped
    reg.retain(|s| s.lock().map(|g| g.is_some()).unwrap_or(false));
    reg.push(slot);
}

/// Kill every extractor process still registered.
///
/// Idempotent; intended as an application-exit safety net, invoked
/// regardless of adapter state (including from the Ctrl+C handler).
pub fn force_cleanup_all() {
    let mut reg = registry().lock().unwrap();
    for slot in reg.drain(..) {
        if let Ok(mut guard) = slot.lock() {
            if let Some(mut child) = guard.take() {
                log::debug!("force-killing extractor process {}", child.id());
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

/// Configuration for the extractor adapter.
#[derive(Debug, Clone)]
pub struct ExifToolConfig {
    /// Extractor binary to invoke.
    pub binary: PathBuf,
    /// Timeout for one request/response exchange.
    pub timeout: Duration,
    /// Consecutive failures tolerated before the adapter stops respawning.
    pub max_restarts: u32,
}

impl Default for ExifToolConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("exiftool"),
            timeout: DEFAULT_TIMEOUT,
            max_restarts: DEFAULT_MAX_RESTARTS,
        }
    }
}

impl ExifToolConfig {
    /// Set the binary path.
    #[must_use]
    pub fn with_binary(mut self, binary: PathBuf) -> Self {
        self.binary = binary;
        self
    }

    /// Set the exchange timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A live stay-open child: its stdin plus a channel of stdout lines fed by
/// a reader thread. The reader thread exits when the child's stdout closes.
struct StayOpenProcess {
    slot: ChildSlot,
    stdin: ChildStdin,
    lines: Receiver<String>,
    sequence: u64,
}

impl StayOpenProcess {
    fn is_alive(&self) -> bool {
        let mut guard = self.slot.lock().unwrap();
        match guard.as_mut() {
            // try_wait returns Some(status) once the child has exited
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn kill(&self) {
        if let Some(mut child) = self.slot.lock().unwrap().take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

enum ProcessState {
    Stopped,
    Ready(StayOpenProcess),
    /// `close()` was called; no further spawns.
    Closed,
}

struct Inner {
    state: ProcessState,
    consecutive_failures: u32,
}

/// Metadata extractor backed by a persistent `exiftool` process.
///
/// Cheap to share behind an `Arc`; all process access is serialized
/// internally.
pub struct ExifTool {
    config: ExifToolConfig,
    inner: Mutex<Inner>,
}

impl ExifTool {
    /// Create an adapter. The subprocess is spawned lazily on first use.
    #[must_use]
    pub fn new(config: ExifToolConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: ProcessState::Stopped,
                consecutive_failures: 0,
            }),
        }
    }

    /// Probe whether the configured binary can run at all.
    #[must_use]
    pub fn is_available(&self) -> bool {
        Command::new(&self.config.binary)
            .arg("-ver")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Shut down the stay-open process.
    ///
    /// Idempotent: safe to call repeatedly and after failures. Once closed
    /// the adapter will not respawn; create a new adapter to resume.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let ProcessState::Ready(proc) = &mut inner.state {
            // Polite shutdown request first; exiftool exits on this command
            let _ = proc.stdin.write_all(b"-stay_open\nFalse\n");
            let _ = proc.stdin.flush();
            let deadline = Instant::now() + Duration::from_millis(500);
            while proc.is_alive() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(20));
            }
            proc.kill();
        }
        inner.state = ProcessState::Closed;
    }

    fn spawn_stay_open(&self) -> Result<StayOpenProcess, ExtractError> {
        let mut child = Command::new(&self.config.binary)
            .args(["-stay_open", "True", "-@", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ExtractError::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExtractError::Spawn("no stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractError::Spawn("no stdout pipe".to_string()))?;

        log::debug!(
            "spawned {} -stay_open (pid {})",
            self.config.binary.display(),
            child.id()
        );

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("exiftool-reader".to_string())
            .spawn(move || {
                let reader = BufReader::new(stdout);
                for line in reader.lines() {
                    match line {
                        Ok(line) => {
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            })
            .map_err(|e| ExtractError::Spawn(e.to_string()))?;

        let slot: ChildSlot = Arc::new(Mutex::new(Some(child)));
        register_child(slot.clone());

        Ok(StayOpenProcess {
            slot,
            stdin,
            lines: rx,
            sequence: 0,
        })
    }

    /// One stay-open exchange: send `-json` extraction for `paths`, read
    /// until the `{ready}` marker, parse the JSON array.
    fn exchange(
        &self,
        inner: &mut Inner,
        paths: &[PathBuf],
    ) -> Result<Vec<serde_json::Value>, ExtractError> {
        // Health check + lazy (re)spawn
        let needs_spawn = match &inner.state {
            ProcessState::Ready(proc) => !proc.is_alive(),
            ProcessState::Stopped => true,
            ProcessState::Closed => {
                return Err(ExtractError::ProcessFailed("adapter closed".to_string()))
            }
        };
        if needs_spawn {
            if inner.consecutive_failures > self.config.max_restarts {
                return Err(ExtractError::ProcessFailed(format!(
                    "restart budget exhausted after {} failures",
                    inner.consecutive_failures
                )));
            }
            if let ProcessState::Ready(old) = &inner.state {
                old.kill();
            }
            match self.spawn_stay_open() {
                Ok(spawned) => inner.state = ProcessState::Ready(spawned),
                Err(e) => {
                    inner.state = ProcessState::Stopped;
                    inner.consecutive_failures += 1;
                    return Err(e);
                }
            }
        }
        let ProcessState::Ready(proc) = &mut inner.state else {
            unreachable!("state set to Ready above");
        };

        proc.sequence += 1;
        let seq = proc.sequence;
        let ready_marker = format!("{{ready{seq}}}");

        let mut request = String::from("-json\n-charset\nfilename=utf8\n");
        for path in paths {
            request.push_str(&path.to_string_lossy());
            request.push('\n');
        }
        request.push_str(&format!("-execute{seq}\n"));

        let mut send = proc.stdin.write_all(request.as_bytes());
        if send.is_ok() {
            send = proc.stdin.flush();
        }
        if let Err(e) = send {
            proc.kill();
            inner.state = ProcessState::Stopped;
            inner.consecutive_failures += 1;
            return Err(ExtractError::ProcessFailed(format!("write failed: {e}")));
        }

        let deadline = Instant::now() + self.config.timeout;
        let mut body = String::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                proc.kill();
                inner.state = ProcessState::Stopped;
                inner.consecutive_failures += 1;
                return Err(ExtractError::Timeout {
                    path: paths.first().cloned().unwrap_or_default(),
                    seconds: self.config.timeout.as_secs(),
                });
            }
            match proc.lines.recv_timeout(remaining) {
                Ok(line) if line.trim() == ready_marker => break,
                Ok(line) => {
                    body.push_str(&line);
                    body.push('\n');
                }
                Err(RecvTimeoutError::Timeout) => {
                    proc.kill();
                    inner.state = ProcessState::Stopped;
                    inner.consecutive_failures += 1;
                    return Err(ExtractError::Timeout {
                        path: paths.first().cloned().unwrap_or_default(),
                        seconds: self.config.timeout.as_secs(),
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    proc.kill();
                    inner.state = ProcessState::Stopped;
                    inner.consecutive_failures += 1;
                    return Err(ExtractError::ProcessFailed(
                        "process closed its output stream".to_string(),
                    ));
                }
            }
        }

        inner.consecutive_failures = 0;
        parse_json_array(&body, paths)
    }

    /// One-shot invocation used for extended extraction.
    fn run_one_shot(&self, path: &Path) -> Result<MetadataRecord, ExtractError> {
        let mut child = Command::new(&self.config.binary)
            .args(["-json", "-ee", "-api", "RequestAll=3", "-charset", "filename=utf8"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ExtractError::Spawn(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractError::Spawn("no stdout pipe".to_string()))?;

        let slot: ChildSlot = Arc::new(Mutex::new(Some(child)));
        register_child(slot.clone());

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("exiftool-oneshot".to_string())
            .spawn(move || {
                let mut reader = BufReader::new(stdout);
                let mut output = String::new();
                let result = reader.read_to_string(&mut output).map(|_| output);
                let _ = tx.send(result);
            })
            .map_err(|e| ExtractError::Spawn(e.to_string()))?;

        let output = match rx.recv_timeout(self.config.timeout) {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                kill_slot(&slot);
                return Err(ExtractError::ProcessFailed(e.to_string()));
            }
            Err(_) => {
                kill_slot(&slot);
                return Err(ExtractError::Timeout {
                    path: path.to_path_buf(),
                    seconds: self.config.timeout.as_secs(),
                });
            }
        };

        // Reap the child now that output is complete
        kill_slot(&slot);

        let paths = [path.to_path_buf()];
        let objects = parse_json_array(&output, &paths)?;
        objects
            .into_iter()
            .next()
            .map(|obj| object_to_record(&obj, ExtractionMode::Extended))
            .ok_or_else(|| ExtractError::Missing(path.to_path_buf()))
    }
}

fn kill_slot(slot: &ChildSlot) {
    if let Some(mut child) = slot.lock().unwrap().take() {
        let _ = child.kill();
        let _ = child.wait();
    }
}

impl MetadataSource for ExifTool {
    fn extract_one(
        &self,
        path: &Path,
        mode: ExtractionMode,
    ) -> Result<MetadataRecord, ExtractError> {
        match mode {
            ExtractionMode::Extended => self.run_one_shot(path),
            ExtractionMode::Fast => {
                let paths = [path.to_path_buf()];
                let mut inner = self.inner.lock().unwrap();
                let objects = self.exchange(&mut inner, &paths)?;
                objects
                    .first()
                    .map(|obj| object_to_record(obj, ExtractionMode::Fast))
                    .ok_or_else(|| ExtractError::Missing(path.to_path_buf()))
            }
        }
    }

    fn extract_batch(
        &self,
        paths: &[PathBuf],
        mode: ExtractionMode,
    ) -> Vec<(PathBuf, Result<MetadataRecord, ExtractError>)> {
        if paths.is_empty() {
            return Vec::new();
        }
        match mode {
            // Extended mode always runs one-shot per file
            ExtractionMode::Extended => paths
                .iter()
                .map(|p| (p.clone(), self.run_one_shot(p)))
                .collect(),
            ExtractionMode::Fast => {
                let mut inner = self.inner.lock().unwrap();
                match self.exchange(&mut inner, paths) {
                    Ok(objects) => associate_results(paths, objects),
                    // A failed exchange fails every file in it; the caller
                    // treats each as an individual extraction failure
                    Err(e) => paths.iter().map(|p| (p.clone(), Err(e.clone()))).collect(),
                }
            }
        }
    }
}

impl Drop for ExifTool {
    fn drop(&mut self) {
        self.close();
    }
}

/// Parse the accumulated stdout of one exchange as a JSON array of
/// per-file objects.
fn parse_json_array(
    body: &str,
    paths: &[PathBuf],
) -> Result<Vec<serde_json::Value>, ExtractError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        // exiftool prints nothing (plus an error on stderr) when every
        // input failed; report as missing rather than malformed
        return Ok(Vec::new());
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Array(objects)) => Ok(objects),
        Ok(_) => Err(ExtractError::Malformed {
            path: paths.first().cloned().unwrap_or_default(),
            message: "expected a JSON array".to_string(),
        }),
        Err(e) => Err(ExtractError::Malformed {
            path: paths.first().cloned().unwrap_or_default(),
            message: e.to_string(),
        }),
    }
}

/// Re-associate response objects with their request paths by the
/// `SourceFile` field. Files the tool skipped get a `Missing` error.
fn associate_results(
    paths: &[PathBuf],
    objects: Vec<serde_json::Value>,
) -> Vec<(PathBuf, Result<MetadataRecord, ExtractError>)> {
    let mut by_source: std::collections::HashMap<String, serde_json::Value> = objects
        .into_iter()
        .filter_map(|obj| {
            let source = obj.get("SourceFile")?.as_str()?.to_string();
            Some((source, obj))
        })
        .collect();

    paths
        .iter()
        .map(|path| {
            let key = path.to_string_lossy();
            match by_source.remove(key.as_ref()) {
                Some(obj) => (
                    path.clone(),
                    Ok(object_to_record(&obj, ExtractionMode::Fast)),
                ),
                None => (path.clone(), Err(ExtractError::Missing(path.clone()))),
            }
        })
        .collect()
}

/// Flatten one response object into a field/value record.
fn object_to_record(obj: &serde_json::Value, mode: ExtractionMode) -> MetadataRecord {
    let mut fields = BTreeMap::new();
    if let Some(map) = obj.as_object() {
        for (key, value) in map {
            if key == "SourceFile" {
                continue;
            }
            fields.insert(key.clone(), value_to_string(value));
        }
    }
    MetadataRecord::new(fields, mode)
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
