//! Line-oriented serial input

use std::io::{self, BufRead, ErrorKind};

/// Source of text lines from a device
pub trait LineSource: Send {
    /// Next complete line without its terminator. `None` when nothing
    /// arrived within the read timeout.
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Splits any buffered reader into lines, keeping partial lines across
/// read timeouts
pub struct LineReader<R> {
    reader: R,
    pending: Vec<u8>,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(reader: R) -> Self {
        LineReader {
            reader,
            pending: Vec::with_capacity(128),
        }
    }

    fn take_line(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending)
            .trim_end_matches(['\r', '\n'])
            .chars()
            .filter(|c| *c != char::REPLACEMENT_CHARACTER)
            .collect();
        self.pending.clear();
        text
    }
}

impl<R: BufRead + Send> LineSource for LineReader<R> {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        match self.reader.read_until(b'\n', &mut self.pending) {
            // End of input with nothing buffered; a partial last line is still returned below
            Ok(0) if self.pending.is_empty() => Ok(None),
            Ok(_) => Ok(Some(self.take_line())),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Open a serial port as a line source
#[cfg(feature = "hardware")]
pub fn open_serial(
    config: &crate::config::SerialSensorConfig,
) -> crate::error::SensorResult<LineReader<io::BufReader<Box<dyn serialport::SerialPort>>>> {
    use crate::error::SensorError;

    let port = serialport::new(&config.port, config.baud)
        .timeout(config.read_timeout())
        .open()
        .map_err(|e| SensorError::Unavailable(format!("{}: {}", config.port, e)))?;
    log::info!(target: "system", "Opened serial port: {} at {} baud", config.port, config.baud);
    Ok(LineReader::new(io::BufReader::new(port)))
}
