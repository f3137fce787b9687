//! Line-oriented sensor link
//!
//! The monitor needs exactly two things from the link: read one line, and
//! write a command. [`LineChannel`] provides both over any reader/writer
//! pair, which covers a serial port (with a read timeout) as well as a
//! recorded frame file replayed to stdout.

use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Default serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Errors from the link itself, as opposed to bad frame content
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,

    #[error("channel I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Duplex line channel consumed by the inference loop
pub trait SerialChannel {
    /// Read the next line without its terminator.
    ///
    /// `Ok(None)` means the read timed out with no complete line; a partial
    /// line is kept and completed by a later call.
    fn read_line(&mut self) -> Result<Option<String>, ChannelError>;

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ChannelError>;
}

/// [`SerialChannel`] over a buffered reader and a writer
pub struct LineChannel<R, W> {
    reader: BufReader<R>,
    writer: W,
    pending: Vec<u8>,
}

impl<R: Read, W: Write> LineChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            pending: Vec::new(),
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    fn take_line(&mut self) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        if bytes.last() == Some(&b'\n') {
            bytes.pop();
        }
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl<R: Read, W: Write> SerialChannel for LineChannel<R, W> {
    fn read_line(&mut self) -> Result<Option<String>, ChannelError> {
        loop {
            match self.reader.read_until(b'\n', &mut self.pending) {
                Ok(0) => {
                    // A final line without a terminator still counts
                    if self.pending.is_empty() {
                        return Err(ChannelError::Closed);
                    }
                    return Ok(Some(self.take_line()));
                }
                Ok(_) => {
                    if self.pending.last() == Some(&b'\n') {
                        return Ok(Some(self.take_line()));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                    ) =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(ChannelError::Io(e)),
            }
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Reader for sources with no read timeout of their own, such as stdin.
///
/// A helper thread does the blocking reads and hands chunks over a channel;
/// [`Read::read`] waits at most `timeout` and then fails with
/// [`io::ErrorKind::TimedOut`], which [`LineChannel`] reports as an idle
/// read. The helper thread stays blocked in the source until it yields data
/// or the process exits.
pub struct TimeoutReader {
    chunks: Receiver<io::Result<Vec<u8>>>,
    timeout: Duration,
    buffered: Vec<u8>,
    offset: usize,
    finished: bool,
}

impl TimeoutReader {
    pub fn spawn<R>(source: R, timeout: Duration) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(16);
        thread::Builder::new()
            .name("line-reader".to_string())
            .spawn(move || {
                let mut source = source;
                let mut buf = vec![0u8; 4096];
                loop {
                    let chunk = match source.read(&mut buf) {
                        Ok(n) => Ok(buf[..n].to_vec()),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => Err(e),
                    };
                    // An empty chunk marks end of input
                    let last = !matches!(&chunk, Ok(bytes) if !bytes.is_empty());
                    if tx.send(chunk).is_err() || last {
                        break;
                    }
                }
            })?;

        Ok(Self {
            chunks: rx,
            timeout,
            buffered: Vec::new(),
            offset: 0,
            finished: false,
        })
    }

    fn copy_buffered(&mut self, buf: &mut [u8]) -> usize {
        let available = &self.buffered[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        n
    }
}

impl Read for TimeoutReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset < self.buffered.len() {
            return Ok(self.copy_buffered(buf));
        }
        if self.finished {
            return Ok(0);
        }
        match self.chunks.recv_timeout(self.timeout) {
            Ok(Ok(chunk)) if chunk.is_empty() => {
                self.finished = true;
                Ok(0)
            }
            Ok(Ok(chunk)) => {
                self.buffered = chunk;
                self.offset = 0;
                Ok(self.copy_buffered(buf))
            }
            Ok(Err(e)) => {
                self.finished = true;
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "no input before read timeout",
            )),
            Err(RecvTimeoutError::Disconnected) => {
                self.finished = true;
                Ok(0)
            }
        }
    }
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Device path or name, e.g. `/dev/ttyUSB0` or `COM5`
    pub port: String,
    pub baud_rate: u32,
    /// Per-read timeout in milliseconds
    pub timeout_ms: u64,
}

impl SerialSettings {
    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: 1_000,
        }
    }
}

#[cfg(feature = "serial")]
pub use self::serial::{available_ports, open_serial, SerialLink};

#[cfg(feature = "serial")]
mod serial {
    use super::{LineChannel, SerialSettings};
    use crate::error::MonitorError;
    use serialport::SerialPort;
    use std::time::Duration;

    /// Line channel over an open serial port
    pub type SerialLink = LineChannel<Box<dyn SerialPort>, Box<dyn SerialPort>>;

    /// Open the serial port and split it into read and write handles
    pub fn open_serial(settings: &SerialSettings) -> Result<SerialLink, MonitorError> {
        let open_err = |e: serialport::Error| MonitorError::SerialOpen {
            port: settings.port.clone(),
            reason: e.to_string(),
        };

        let port = serialport::new(&settings.port, settings.baud_rate)
            .timeout(Duration::from_millis(settings.timeout_ms))
            .open()
            .map_err(open_err)?;
        let writer = port.try_clone().map_err(open_err)?;

        tracing::info!(
            "Serial link open on {} at {} baud",
            settings.port,
            settings.baud_rate
        );

        Ok(LineChannel::new(port, writer))
    }

    /// Names of the serial ports visible to this machine
    pub fn available_ports() -> Result<Vec<String>, MonitorError> {
        let ports = serialport::available_ports().map_err(|e| MonitorError::SerialOpen {
            port: "*".to_string(),
            reason: e.to_string(),
        })?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::io::Cursor;

    /// Reader that hands out scripted chunks, with `None` standing for a timeout
    struct ScriptedReader {
        chunks: VecDeque<Option<Vec<u8>>>,
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Some(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                Some(None) => Err(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn test_reads_lines_and_strips_terminators() {
        let input = Cursor::new(b"1,2,3\r\n\nlast".to_vec());
        let mut channel = LineChannel::new(input, Vec::new());

        assert_eq!(channel.read_line().unwrap(), Some("1,2,3".to_string()));
        assert_eq!(channel.read_line().unwrap(), Some(String::new()));
        assert_eq!(channel.read_line().unwrap(), Some("last".to_string()));
        assert!(matches!(channel.read_line(), Err(ChannelError::Closed)));
    }

    #[test]
    fn test_timeout_keeps_partial_line() {
        let reader = ScriptedReader {
            chunks: VecDeque::from(vec![
                Some(b"1,2,".to_vec()),
                None,
                Some(b"3\n".to_vec()),
            ]),
        };
        let mut channel = LineChannel::new(reader, Vec::new());

        assert_eq!(channel.read_line().unwrap(), None);
        assert_eq!(channel.read_line().unwrap(), Some("1,2,3".to_string()));
    }

    #[test]
    fn test_invalid_utf8_decoded_lossily() {
        let input = Cursor::new(vec![b'1', 0xff, b'\n']);
        let mut channel = LineChannel::new(input, Vec::new());

        let line = channel.read_line().unwrap().unwrap();
        assert!(line.starts_with('1'));
        assert!(line.contains('\u{fffd}'));
    }

    #[test]
    fn test_write_bytes() {
        let mut channel = LineChannel::new(Cursor::new(Vec::new()), Vec::new());
        channel.write_bytes(b"STOP\n").unwrap();
        channel.write_bytes(b"VIBRATE\n").unwrap();
        assert_eq!(channel.writer().as_slice(), b"STOP\nVIBRATE\n");
    }

    /// Source that blocks until its sender is dropped
    struct StalledSource(mpsc::Receiver<()>);

    impl Read for StalledSource {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[test]
    fn test_timeout_reader_passes_lines_through() {
        let source = Cursor::new(b"1,2,3\nlast\n".to_vec());
        let reader = TimeoutReader::spawn(source, Duration::from_secs(5)).unwrap();
        let mut channel = LineChannel::new(reader, Vec::new());

        assert_eq!(channel.read_line().unwrap(), Some("1,2,3".to_string()));
        assert_eq!(channel.read_line().unwrap(), Some("last".to_string()));
        assert!(matches!(channel.read_line(), Err(ChannelError::Closed)));
    }

    #[test]
    fn test_timeout_reader_idles_on_blocked_source() {
        let (hold, blocked) = mpsc::channel();
        let reader =
            TimeoutReader::spawn(StalledSource(blocked), Duration::from_millis(20)).unwrap();
        let mut channel = LineChannel::new(reader, Vec::new());

        assert_eq!(channel.read_line().unwrap(), None);
        assert_eq!(channel.read_line().unwrap(), None);

        drop(hold);
        // Source reports end of input once released
        let mut result = channel.read_line();
        while matches!(result, Ok(None)) {
            result = channel.read_line();
        }
        assert!(matches!(result, Err(ChannelError::Closed)));
    }

    #[test]
    fn test_serial_settings_defaults() {
        let settings = SerialSettings::new("COM5");
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.timeout_ms, 1_000);
    }
}
