//! Frame source that plays back a `candump -l` capture.
//!
//! Lines look like `(1436509052.249713) can0 211#0A000B00E001DC05`. Extended
//! identifiers are written with eight hex digits, error frames carry the
//! error flag in the identifier, `##` introduces a CAN FD payload and a
//! trailing `R` marks a remote request.

use fuelcell_core::decoder::{CAN_EFF_FLAG, CAN_EFF_MASK, CAN_ERR_FLAG, CAN_RTR_FLAG};
use fuelcell_core::source::MAX_PAYLOAD_LEN;
use fuelcell_core::{FrameSource, RawFrame, SourceError};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Longest single wait inside `recv` while pacing, so shutdown stays responsive.
const PACING_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("missing '#' between identifier and payload")]
    MissingSeparator,
    #[error("invalid identifier '{0}'")]
    BadIdentifier(String),
    #[error("invalid payload '{0}'")]
    BadPayload(String),
    #[error("payload longer than {} bytes", MAX_PAYLOAD_LEN)]
    PayloadTooLong,
    #[error("invalid timestamp '{0}'")]
    BadTimestamp(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandumpRecord {
    /// Capture time in seconds, when the line carried one.
    pub timestamp: Option<f64>,
    pub frame: RawFrame,
}

/// Parse one capture line. Blank lines and `;`/`//` comments give `Ok(None)`.
pub fn parse_candump_line(line: &str) -> Result<Option<CandumpRecord>, ReplayError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(';') || line.starts_with("//") {
        return Ok(None);
    }

    let mut timestamp = None;
    let mut frame_text = None;
    for token in line.split_whitespace() {
        if let Some(inner) = token.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
            let seconds = inner
                .parse::<f64>()
                .map_err(|_| ReplayError::BadTimestamp(inner.to_string()))?;
            timestamp = Some(seconds);
        } else if token.contains('#') {
            frame_text = Some(token);
            break;
        }
    }

    let frame = parse_frame(frame_text.ok_or(ReplayError::MissingSeparator)?)?;
    Ok(Some(CandumpRecord { timestamp, frame }))
}

fn parse_frame(text: &str) -> Result<RawFrame, ReplayError> {
    let (id_text, rest) = text.split_once('#').ok_or(ReplayError::MissingSeparator)?;
    let raw_id = u32::from_str_radix(id_text, 16)
        .map_err(|_| ReplayError::BadIdentifier(id_text.to_string()))?;

    let can_id = match id_text.len() {
        3 if raw_id <= 0x7FF => raw_id,
        8 if raw_id & CAN_ERR_FLAG != 0 => raw_id,
        8 => (raw_id & CAN_EFF_MASK) | CAN_EFF_FLAG,
        _ => return Err(ReplayError::BadIdentifier(id_text.to_string())),
    };

    // `##<flags><data>` for CAN FD; the flags nibble is not needed here.
    let data_text = match rest.strip_prefix('#') {
        Some(fd) => fd.get(1..).unwrap_or(""),
        None => rest,
    };
    if data_text.starts_with('R') || data_text.starts_with('r') {
        return Ok(RawFrame::new(can_id | CAN_RTR_FLAG, &[]));
    }

    let payload = decode_hex(data_text)?;
    Ok(RawFrame::new(can_id, &payload))
}

fn decode_hex(text: &str) -> Result<Vec<u8>, ReplayError> {
    let digits: String = text.chars().filter(|c| *c != '.').collect();
    if digits.len() % 2 != 0 || !digits.is_ascii() {
        return Err(ReplayError::BadPayload(text.to_string()));
    }
    if digits.len() / 2 > MAX_PAYLOAD_LEN {
        return Err(ReplayError::PayloadTooLong);
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| ReplayError::BadPayload(text.to_string()))
        })
        .collect()
}

/// Plays a capture file front to back, then reports `Exhausted`.
///
/// Reopening after a read error resumes at the byte where reading stopped.
pub struct ReplaySource {
    path: PathBuf,
    realtime: bool,
    reader: Option<BufReader<File>>,
    /// Bytes consumed so far, including skipped lines.
    position: u64,
    line_no: usize,
    malformed: u64,
    /// Capture time of the first frame and the instant it was replayed.
    anchor: Option<(f64, Instant)>,
    pending: Option<(Instant, RawFrame)>,
}

impl ReplaySource {
    pub fn new(path: impl AsRef<Path>, realtime: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            realtime,
            reader: None,
            position: 0,
            line_no: 0,
            malformed: 0,
            anchor: None,
            pending: None,
        }
    }

    fn skip_line(&mut self, reason: &dyn std::fmt::Display) {
        self.malformed += 1;
        warn!(
            path = %self.path.display(),
            line = self.line_no,
            error = %reason,
            "Skipping malformed capture line"
        );
    }

    fn next_record(&mut self) -> Result<Option<CandumpRecord>, SourceError> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let reader = self.reader.as_mut().ok_or(SourceError::NotOpen)?;
            let read = reader.read_until(b'\n', &mut buf)?;
            if read == 0 {
                return Err(SourceError::Exhausted);
            }
            self.position += read as u64;
            self.line_no += 1;

            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line,
                Err(err) => {
                    self.skip_line(&err);
                    continue;
                }
            };
            match parse_candump_line(line) {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => continue,
                Err(err) => self.skip_line(&err),
            }
        }
    }

    fn due_at(&mut self, timestamp: Option<f64>) -> Instant {
        let now = Instant::now();
        let Some(ts) = timestamp else {
            return now;
        };
        let (first_ts, first_at) = *self.anchor.get_or_insert((ts, now));
        let offset = ts - first_ts;
        if offset <= 0.0 || !offset.is_finite() {
            return now;
        }
        first_at + Duration::from_secs_f64(offset)
    }
}

impl FrameSource for ReplaySource {
    fn describe(&self) -> String {
        format!("candump replay {}", self.path.display())
    }

    fn open(&mut self) -> Result<(), SourceError> {
        let mut file = File::open(&self.path)
            .map_err(|e| SourceError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        if self.position > 0 {
            file.seek(SeekFrom::Start(self.position))?;
        }
        self.reader = Some(BufReader::new(file));
        debug!(
            path = %self.path.display(),
            realtime = self.realtime,
            offset = self.position,
            "Replay opened"
        );
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    fn recv(&mut self) -> Result<Option<RawFrame>, SourceError> {
        if !self.realtime {
            return Ok(self.next_record()?.map(|r| r.frame));
        }

        let (due, frame) = match self.pending.take() {
            Some(pending) => pending,
            None => match self.next_record()? {
                Some(record) => (self.due_at(record.timestamp), record.frame),
                None => return Ok(None),
            },
        };

        let now = Instant::now();
        if due > now {
            let wait = due - now;
            if wait > PACING_SLICE {
                std::thread::sleep(PACING_SLICE);
                self.pending = Some((due, frame));
                return Ok(None);
            }
            std::thread::sleep(wait);
        }
        Ok(Some(frame))
    }

    fn malformed_records(&self) -> u64 {
        self.malformed
    }

    fn close(&mut self) {
        self.reader = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_standard_frame() {
        let record = parse_candump_line("(1436509052.249713) can0 211#0A000B00E001DC05\n")
            .unwrap()
            .unwrap();
        assert_eq!(record.timestamp, Some(1436509052.249713));
        assert_eq!(record.frame.can_id, 0x211);
        assert_eq!(
            record.frame.payload(),
            &[0x0A, 0x00, 0x0B, 0x00, 0xE0, 0x01, 0xDC, 0x05]
        );
    }

    #[test]
    fn parses_extended_error_and_remote_frames() {
        let ext = parse_candump_line("can0 00000210#0000000000000000").unwrap().unwrap();
        assert_eq!(ext.frame.can_id, 0x210 | CAN_EFF_FLAG);
        assert_eq!(ext.timestamp, None);

        let err = parse_candump_line("(1.0) can0 20000080#0000000000000000")
            .unwrap()
            .unwrap();
        assert_ne!(err.frame.can_id & CAN_ERR_FLAG, 0);

        let rtr = parse_candump_line("(1.0) can0 210#R").unwrap().unwrap();
        assert_ne!(rtr.frame.can_id & CAN_RTR_FLAG, 0);
        assert!(rtr.frame.payload().is_empty());
    }

    #[test]
    fn parses_fd_payload() {
        let odd = parse_candump_line("(2.0) can0 210##13412000");
        assert_eq!(odd, Err(ReplayError::BadPayload("3412000".into())));

        let fd = parse_candump_line("(2.0) can0 210##1341200000000000032")
            .unwrap()
            .unwrap();
        assert_eq!(fd.frame.payload().len(), 9);
        assert_eq!(fd.frame.payload()[8], 0x32);
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        assert_eq!(parse_candump_line("   "), Ok(None));
        assert_eq!(parse_candump_line("; recorded on bench"), Ok(None));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(
            parse_candump_line("(1.0) can0 nonsense"),
            Err(ReplayError::MissingSeparator)
        );
        assert!(matches!(
            parse_candump_line("(1.0) can0 21#00"),
            Err(ReplayError::BadIdentifier(_))
        ));
        assert!(matches!(
            parse_candump_line("(x) can0 210#00"),
            Err(ReplayError::BadTimestamp(_))
        ));
        assert!(matches!(
            parse_candump_line("(1.0) can0 210#0"),
            Err(ReplayError::BadPayload(_))
        ));
    }

    #[test]
    fn replays_file_then_exhausts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "(0.000) can0 210#3412E8030A000005").unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file, "(0.010) can0 212#E0010F0078563412").unwrap();

        let mut source = ReplaySource::new(file.path(), false);
        assert!(matches!(source.recv(), Err(SourceError::NotOpen)));
        source.open().unwrap();
        assert_eq!(source.recv().unwrap().unwrap().can_id, 0x210);
        assert_eq!(source.recv().unwrap().unwrap().can_id, 0x212);
        assert!(matches!(source.recv(), Err(SourceError::Exhausted)));
        assert_eq!(source.malformed_records(), 1);
    }

    fn capture(lines: &[&[u8]]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            file.write_all(line).unwrap();
            file.write_all(b"\n").unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn non_utf8_line_is_skipped() {
        let file = capture(&[
            b"(0.000) can0 210#3412E8030A000005",
            b"(0.005) can0 \xff\xfe#0000",
            b"(0.010) can0 212#E0010F0078563412",
        ]);
        let mut source = ReplaySource::new(file.path(), false);
        source.open().unwrap();
        assert_eq!(source.recv().unwrap().unwrap().can_id, 0x210);
        assert_eq!(source.recv().unwrap().unwrap().can_id, 0x212);
        assert!(matches!(source.recv(), Err(SourceError::Exhausted)));
        assert_eq!(source.malformed_records(), 1);
    }

    #[test]
    fn reopen_resumes_where_reading_stopped() {
        let file = capture(&[
            b"(0.000) can0 210#3412E8030A000005",
            b"(0.010) can0 211#0A000B00E001DC05",
            b"(0.020) can0 212#E0010F0078563412",
        ]);
        let mut source = ReplaySource::new(file.path(), false);
        source.open().unwrap();
        assert_eq!(source.recv().unwrap().unwrap().can_id, 0x210);
        source.close();
        assert!(!source.is_open());

        source.open().unwrap();
        assert_eq!(source.recv().unwrap().unwrap().can_id, 0x211);
        assert_eq!(source.recv().unwrap().unwrap().can_id, 0x212);
        assert!(matches!(source.recv(), Err(SourceError::Exhausted)));
    }

    #[test]
    fn ingestion_of_damaged_capture_runs_to_the_end() {
        use fuelcell_core::{IngestConfig, IngestCounters, IngestThread, SharedStore, TimeBase};
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;

        let file = capture(&[
            b"(0.000) can0 210#3412E8030A000005",
            b"\xff\xfe",
            b"(0.010) can0 212#E0010F0078563412",
        ]);
        let store = Arc::new(SharedStore::new());
        let mut ingest = IngestThread::new(
            ReplaySource::new(file.path(), false),
            IngestConfig::default(),
            Arc::clone(&store),
            Arc::new(IngestCounters::default()),
            TimeBase::new(),
        );
        // Returns only once the capture is exhausted.
        ingest.run(&AtomicBool::new(false));

        let stats = ingest.stats();
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.frames_applied, 2);
        assert_eq!(stats.source_failures, 0);
        assert_eq!(stats.malformed_records, 1);
        assert_eq!(store.harvest().len(), 7);
    }

    #[test]
    fn realtime_replay_keeps_capture_spacing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "(100.000) can0 210#3412E8030A000005").unwrap();
        writeln!(file, "(100.120) can0 210#3412E8030A000005").unwrap();

        let mut source = ReplaySource::new(file.path(), true);
        source.open().unwrap();
        let start = Instant::now();
        let mut frames = 0;
        while frames < 2 {
            if source.recv().unwrap().is_some() {
                frames += 1;
            }
        }
        assert!(start.elapsed() >= Duration::from_millis(110));
    }

    #[test]
    fn missing_file_is_unavailable() {
        let mut source = ReplaySource::new("/nonexistent/capture.log", false);
        assert!(matches!(source.open(), Err(SourceError::Unavailable(_))));
        assert!(!source.is_open());
    }
}
