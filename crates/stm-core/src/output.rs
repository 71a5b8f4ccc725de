//! The sample sink and the background writer.
//!
//! The engine is the single producer; one worker thread is the single
//! consumer. The queue is a mutex-guarded FIFO and the lock is held only for
//! the push/pop itself. Write failures are logged and never propagate back
//! into the sampler.

use crate::input::SerializationData;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stm_common::{Error, ParMap, ParName, Result};
use tracing::error;

/// What a record holds and where it lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKey {
    Posterior,
    ResumeData,
    Dic,
}

/// One unit of work for the writer: a posterior batch or a raw text blob.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    key: OutputKey,
    samples: Vec<ParMap>,
    key_order: Vec<ParName>,
    raw: String,
}

impl OutputRecord {
    pub fn posterior(samples: Vec<ParMap>, key_order: Vec<ParName>) -> Self {
        Self { key: OutputKey::Posterior, samples, key_order, raw: String::new() }
    }

    pub fn resume_data(raw: String) -> Self {
        Self { key: OutputKey::ResumeData, samples: Vec::new(), key_order: Vec::new(), raw }
    }

    pub fn dic(raw: String) -> Self {
        Self { key: OutputKey::Dic, samples: Vec::new(), key_order: Vec::new(), raw }
    }

    pub fn key(&self) -> OutputKey {
        self.key
    }

    pub fn samples(&self) -> &[ParMap] {
        &self.samples
    }

    pub fn key_order(&self) -> &[ParName] {
        &self.key_order
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Where the writer puts its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMethod {
    Csv,
    Stdout,
}

impl OutputMethod {
    /// Tag 1 is retired (a binary container that never shipped); the
    /// remaining tags stay stable for old resume files.
    pub fn from_int(v: i64) -> Option<Self> {
        match v {
            0 => Some(Self::Csv),
            2 => Some(Self::Stdout),
            _ => None,
        }
    }

    pub fn as_int(self) -> i64 {
        match self {
            Self::Csv => 0,
            Self::Stdout => 2,
        }
    }
}

/// Output destination settings, carried through resume files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    dirname: PathBuf,
    filename: String,
    method: OutputMethod,
}

impl OutputOptions {
    pub fn new(dirname: impl Into<PathBuf>, method: OutputMethod) -> Self {
        Self { dirname: dirname.into(), filename: "STMOutput".into(), method }
    }

    pub fn from_resume(sd: &SerializationData) -> Result<Self> {
        let method_tag: i64 = sd.scalar("outputMethod")?;
        Ok(Self {
            dirname: PathBuf::from(sd.scalar::<String>("dirname")?),
            filename: sd.scalar("filename")?,
            method: OutputMethod::from_int(method_tag)
                .ok_or_else(|| Error::ResumeCorrupt(format!("unknown output method {method_tag}")))?,
        })
    }

    pub fn method(&self) -> OutputMethod {
        self.method
    }

    pub fn dirname(&self) -> &Path {
        &self.dirname
    }

    /// The `OutputOptions` block of the resume format.
    pub fn serialize(&self, sep: char) -> String {
        format!(
            "filename{sep}{}\ndirname{sep}{}\noutputMethod{sep}{}\n",
            self.filename,
            self.dirname.display(),
            self.method.as_int()
        )
    }

    fn path_for(&self, key: OutputKey) -> PathBuf {
        let name = match key {
            OutputKey::Posterior => "posterior.csv",
            OutputKey::ResumeData => "resumeData.txt",
            OutputKey::Dic => "dic.txt",
        };
        self.dirname.join(name)
    }
}

/// Thread-safe FIFO between the engine and the writer.
#[derive(Debug, Default)]
pub struct OutputQueue {
    inner: Mutex<VecDeque<OutputRecord>>,
}

impl OutputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: OutputRecord) {
        match self.inner.lock() {
            Ok(mut q) => q.push_back(record),
            Err(poisoned) => poisoned.into_inner().push_back(record),
        }
    }

    pub fn pop(&self) -> Option<OutputRecord> {
        match self.inner.lock() {
            Ok(mut q) => q.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        }
    }

    pub fn empty(&self) -> bool {
        match self.inner.lock() {
            Ok(q) => q.is_empty(),
            Err(poisoned) => poisoned.into_inner().is_empty(),
        }
    }
}

/// Polling consumer meant to run on its own thread.
///
/// Keeps draining until the stop flag is set *and* the queue is empty, so
/// everything pushed before shutdown reaches disk.
pub struct OutputWorker {
    queue: Arc<OutputQueue>,
    stop: Arc<AtomicBool>,
    options: OutputOptions,
    poll: Duration,
    posterior_started: bool,
}

impl OutputWorker {
    pub fn new(queue: Arc<OutputQueue>, stop: Arc<AtomicBool>, options: OutputOptions) -> Self {
        Self { queue, stop, options, poll: Duration::from_millis(1000), posterior_started: false }
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    pub fn run(mut self) {
        loop {
            while let Some(record) = self.queue.pop() {
                if let Err(e) = self.write_record(&record) {
                    error!("failed to write {:?} record: {e}", record.key());
                }
            }
            if self.stop.load(Ordering::Acquire) && self.queue.empty() {
                break;
            }
            std::thread::sleep(self.poll);
        }
    }

    fn write_record(&mut self, record: &OutputRecord) -> Result<()> {
        let text = match record.key() {
            OutputKey::Posterior => self.render_posterior(record),
            OutputKey::ResumeData | OutputKey::Dic => record.raw.clone(),
        };
        match self.options.method() {
            OutputMethod::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(text.as_bytes())?;
                Ok(())
            }
            OutputMethod::Csv => {
                fs::create_dir_all(self.options.dirname())?;
                let path = self.options.path_for(record.key());
                let append =
                    record.key() == OutputKey::Posterior && self.posterior_started;
                let mut file = OpenOptions::new()
                    .write(true)
                    .append(append)
                    .create(true)
                    .truncate(!append)
                    .open(path)?;
                file.write_all(text.as_bytes())?;
                Ok(())
            }
        }
    }

    fn render_posterior(&mut self, record: &OutputRecord) -> String {
        let mut out = String::new();
        if !self.posterior_started {
            out.push_str(&record.key_order.join(","));
            out.push('\n');
            self.posterior_started = true;
        }
        for sample in &record.samples {
            let mut first = true;
            for name in &record.key_order {
                if !first {
                    out.push(',');
                }
                first = false;
                let value = sample.get(name).copied().unwrap_or(f64::NAN);
                let _ = write!(out, "{value}");
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn sample(pairs: &[(&str, f64)]) -> ParMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn queue_is_fifo() {
        let q = OutputQueue::new();
        assert!(q.empty());
        q.push(OutputRecord::dic("first".into()));
        q.push(OutputRecord::dic("second".into()));
        assert!(!q.empty());
        assert_eq!(q.pop().unwrap().raw, "first");
        assert_eq!(q.pop().unwrap().raw, "second");
        assert!(q.pop().is_none());
    }

    #[test]
    fn output_options_serialize_round_trip() {
        let options = OutputOptions::new("out/run3", OutputMethod::Stdout);
        let sd = SerializationData::parse_block(&options.serialize(' '));
        let restored = OutputOptions::from_resume(&sd).unwrap();
        assert_eq!(restored, options);
    }

    #[test]
    fn unknown_output_method_tag_is_rejected() {
        let sd = SerializationData::parse_block("filename x\ndirname y\noutputMethod 7\n");
        assert!(matches!(
            OutputOptions::from_resume(&sd),
            Err(Error::ResumeCorrupt(_))
        ));
    }

    #[test]
    fn worker_writes_header_once_and_appends_batches() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(OutputQueue::new());
        let stop = Arc::new(AtomicBool::new(false));
        let options = OutputOptions::new(dir.path(), OutputMethod::Csv);
        let order: Vec<ParName> = vec!["a".into(), "b".into()];

        queue.push(OutputRecord::posterior(
            vec![sample(&[("a", 1.0), ("b", 2.0)])],
            order.clone(),
        ));
        queue.push(OutputRecord::posterior(
            vec![sample(&[("a", 3.0), ("b", 4.0)])],
            order.clone(),
        ));
        queue.push(OutputRecord::resume_data("Metropolis\n{\n}\n".into()));

        let worker = OutputWorker::new(Arc::clone(&queue), Arc::clone(&stop), options)
            .with_poll_interval(Duration::from_millis(5));
        let handle = thread::spawn(move || worker.run());
        stop.store(true, Ordering::Release);
        handle.join().unwrap();

        let posterior = fs::read_to_string(dir.path().join("posterior.csv")).unwrap();
        assert_eq!(posterior, "a,b\n1,2\n3,4\n");
        let resume = fs::read_to_string(dir.path().join("resumeData.txt")).unwrap();
        assert!(resume.starts_with("Metropolis"));
    }

    #[test]
    fn worker_drains_queue_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(OutputQueue::new());
        let stop = Arc::new(AtomicBool::new(true));
        for i in 0..20 {
            queue.push(OutputRecord::posterior(
                vec![sample(&[("x", f64::from(i))])],
                vec!["x".into()],
            ));
        }
        let worker = OutputWorker::new(
            Arc::clone(&queue),
            stop,
            OutputOptions::new(dir.path(), OutputMethod::Csv),
        )
        .with_poll_interval(Duration::from_millis(1));
        worker.run();
        assert!(queue.empty());
        let lines = fs::read_to_string(dir.path().join("posterior.csv")).unwrap();
        assert_eq!(lines.lines().count(), 21); // header + 20 rows
    }
}
