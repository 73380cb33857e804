use anyhow::{Context, Result};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

use crate::nmea::decode_ascii;

/// NMEA caps sentences at 82 characters; anything far beyond that is line noise.
pub const MAX_LINE_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// A line that was not ASCII or ran past `MAX_LINE_LEN`; treat as no line.
    Undecodable,
    Timeout,
    Eof,
}

type ByteStream = Box<dyn AsyncRead + Unpin + Send>;

enum Reader {
    Stream(BufReader<ByteStream>),
    File {
        reader: BufReader<File>,
        follow: bool,
        pace: Option<Duration>,
    },
}

/// Line-oriented NMEA source. Dropping it closes the underlying device or file.
pub struct GnssSource {
    name: String,
    reader: Reader,
    buf: Vec<u8>,
}

impl GnssSource {
    pub fn serial(dev: &str, baud: u32) -> Result<Self> {
        let port = tokio_serial::new(dev, baud).open_native_async()
            .with_context(|| format!("open serial {}", dev))?;
        info!("serial port {} opened @ {} bps", dev, baud);
        Ok(Self::stream(dev, port))
    }

    /// Any byte stream that behaves like a serial line (no EOF while healthy).
    pub fn stream<R>(name: &str, stream: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let stream: ByteStream = Box::new(stream);
        Self { name: name.to_string(), reader: Reader::Stream(BufReader::new(stream)), buf: Vec::new() }
    }

    /// Replay a captured NMEA log. With `follow`, EOF is treated like a quiet
    /// line and the file keeps being polled for appended data.
    pub fn file(path: &str, follow: bool, pace: Option<Duration>) -> Result<Self> {
        let f = std::fs::File::open(path).with_context(|| format!("open nmea file {}", path))?;
        let f = File::from_std(f);
        info!("replaying nmea file {} (follow={})", path, follow);
        Ok(Self {
            name: path.to_string(),
            reader: Reader::File { reader: BufReader::new(f), follow, pace },
            buf: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read one line, waiting at most `timeout`. A partial line read before the
    /// timeout is kept and completed by the next call.
    pub async fn read_line(&mut self, timeout: Duration) -> Result<ReadOutcome> {
        match &mut self.reader {
            Reader::Stream(r) => {
                let read = tokio::time::timeout(timeout, r.read_until(b'\n', &mut self.buf)).await;
                let Ok(res) = read else { return Ok(self.pending()) };
                let n = res.with_context(|| format!("read serial {}", self.name))?;
                if n == 0 {
                    anyhow::bail!("serial {} closed", self.name);
                }
            }
            Reader::File { reader, follow, pace } => {
                if let Some(p) = pace {
                    tokio::time::sleep(*p).await;
                }
                reader.read_until(b'\n', &mut self.buf).await
                    .with_context(|| format!("read nmea file {}", self.name))?;
                if !self.buf.ends_with(b"\n") {
                    if *follow {
                        // writer may still be mid-line
                        tokio::time::sleep(timeout.min(Duration::from_millis(500))).await;
                        return Ok(self.pending());
                    }
                    if self.buf.is_empty() {
                        return Ok(ReadOutcome::Eof);
                    }
                    // a final line without '\n' still counts as a line
                }
            }
        }
        Ok(self.take_line())
    }

    /// No complete line yet: keep the partial one unless it has grown past the cap.
    fn pending(&mut self) -> ReadOutcome {
        if self.buf.len() > MAX_LINE_LEN {
            debug!("{}: dropping {} bytes without line end", self.name, self.buf.len());
            self.buf.clear();
            return ReadOutcome::Undecodable;
        }
        ReadOutcome::Timeout
    }

    fn take_line(&mut self) -> ReadOutcome {
        let outcome = match decode_ascii(&self.buf) {
            Some(s) if self.buf.len() <= MAX_LINE_LEN => ReadOutcome::Line(s.trim().to_string()),
            _ => ReadOutcome::Undecodable,
        };
        self.buf.clear();
        outcome
    }
}

impl Drop for GnssSource {
    fn drop(&mut self) {
        match self.reader {
            Reader::Stream(_) => info!("serial port {} closed", self.name),
            Reader::File { .. } => debug!("nmea file {} closed", self.name),
        }
    }
}
