// src/exec/output.rs

//! Consumers for a running module's stdout and stderr.

use std::io;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::progress::{ProgressNormalizer, XmlProgressParser};
use crate::task::{TaskId, TaskReporter};

use super::backend::OutputStream;

/// Cap on captured stderr kept for diagnostics.
pub const MAX_DIAGNOSTIC_BYTES: usize = 64 * 1024;

/// Longest line handed out in one piece; longer lines arrive split.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Consecutive read errors after which a pipe is given up on.
const MAX_READ_ERRORS: usize = 8;

/// One line of process output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// Decoded text without the line terminator. Invalid UTF-8 is replaced.
    pub text: String,
    /// `false` when the line was cut at [`MAX_LINE_BYTES`] or by end of output.
    pub complete: bool,
}

/// Reads a pipe as lines of bytes.
///
/// Bytes are decoded lossily, so arbitrary output never stops the reader and
/// the pipe keeps being drained while the process writes. `next` is cancel
/// safe: a partial line stays buffered until the next call.
pub struct LineReader {
    inner: BufReader<OutputStream>,
    line: Vec<u8>,
    max_line: usize,
    errors: usize,
}

impl LineReader {
    pub fn new(stream: OutputStream) -> Self {
        Self::with_max_line(stream, MAX_LINE_BYTES)
    }

    pub fn with_max_line(stream: OutputStream, max_line: usize) -> Self {
        Self {
            inner: BufReader::new(stream),
            line: Vec::new(),
            max_line: max_line.max(1),
            errors: 0,
        }
    }

    /// Next line, or `None` at end of output.
    ///
    /// Read errors are logged and retried; only a run of
    /// `MAX_READ_ERRORS` failures in a row ends the stream.
    pub async fn next(&mut self) -> Option<OutputLine> {
        loop {
            match self.read_line().await {
                Ok(line) => {
                    self.errors = 0;
                    return line;
                }
                Err(e) => {
                    self.errors += 1;
                    warn!(error = %e, failures = self.errors, "error reading process output");
                    if self.errors >= MAX_READ_ERRORS {
                        return None;
                    }
                }
            }
        }
    }

    async fn read_line(&mut self) -> io::Result<Option<OutputLine>> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                if self.line.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_line(false)));
            }

            let room = self.max_line - self.line.len();
            let scan = &available[..available.len().min(room)];
            match scan.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    self.line.extend_from_slice(&scan[..end]);
                    self.inner.consume(end + 1);
                    return Ok(Some(self.take_line(true)));
                }
                None => {
                    let taken = scan.len();
                    self.line.extend_from_slice(scan);
                    self.inner.consume(taken);
                    if self.line.len() >= self.max_line {
                        return Ok(Some(self.take_line(false)));
                    }
                }
            }
        }
    }

    fn take_line(&mut self, complete: bool) -> OutputLine {
        let mut bytes = std::mem::take(&mut self.line);
        if complete && bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        OutputLine {
            text: String::from_utf8_lossy(&bytes).into_owned(),
            complete,
        }
    }
}

/// Turns stdout lines into progress updates on the task.
#[derive(Debug)]
pub(crate) struct OutputMonitor {
    parser: XmlProgressParser,
    normalizer: ProgressNormalizer,
}

impl OutputMonitor {
    pub fn new(program: &str) -> Self {
        Self {
            parser: XmlProgressParser::new(),
            normalizer: ProgressNormalizer::new(program),
        }
    }

    pub fn feed_line(&mut self, task: &TaskReporter, line: &OutputLine) {
        debug!(task_id = task.id(), complete = line.complete, "stdout: {}", line.text);
        let mut chunk = String::with_capacity(line.text.len() + 1);
        chunk.push_str(&line.text);
        if line.complete {
            chunk.push('\n');
        }

        for event in self.parser.feed(&chunk) {
            if let Some(progress) = self.normalizer.apply(event) {
                task.publish_progress(progress);
            }
        }
    }

    /// Flush the parser at end of output.
    pub fn finish(&mut self, task: &TaskReporter) {
        if let Some(event) = self.parser.finish() {
            if let Some(progress) = self.normalizer.apply(event) {
                task.publish_progress(progress);
            }
        }
    }

    /// Status text reported so far.
    pub fn text(&self) -> &str {
        self.normalizer.text()
    }
}

/// Read stderr to the end, logging each line and keeping the first
/// [`MAX_DIAGNOSTIC_BYTES`] for the task's diagnostic.
///
/// Lines past the cap are still read so the process never blocks or gets
/// SIGPIPE on a full stderr pipe.
pub(crate) async fn collect_stderr(
    stream: OutputStream,
    task_id: TaskId,
    program: String,
) -> String {
    let mut lines = LineReader::new(stream);
    let mut captured = String::new();
    let mut truncated = false;

    while let Some(line) = lines.next().await {
        debug!(task_id, program = %program, "stderr: {}", line.text);
        if truncated || captured.len() + line.text.len() + 1 > MAX_DIAGNOSTIC_BYTES {
            truncated = true;
            continue;
        }
        captured.push_str(&line.text);
        if line.complete {
            captured.push('\n');
        }
    }

    if truncated {
        debug!(task_id, program = %program, "stderr exceeded capture limit; truncated");
    }
    captured
}
