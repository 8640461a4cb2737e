use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use common::wire::{encode_command, RECORD_SEPARATOR};
use common::MotorCommand;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("send failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("channel is closed")]
    Closed,
}

/// Anything the control loop can push motor commands into.
pub trait CommandSink {
    fn send(&mut self, command: &MotorCommand) -> Result<(), ChannelError>;

    /// Sends a final stop best-effort and tears the connection down. Only the
    /// first call does anything; returns whether this call closed the sink.
    fn close(&mut self) -> bool;
}

/// Persistent connection to the actuator controller.
pub struct CommandChannel<W: Write = TcpStream> {
    writer: Option<W>,
    peer: String,
    sent: u64,
    // A failed write may have left part of a record on the wire.
    torn: bool,
}

impl CommandChannel<TcpStream> {
    /// Connects once. There is no reconnect; a failure here is fatal.
    pub fn connect(
        addr: &str,
        connect_timeout: Duration,
        send_timeout: Option<Duration>,
    ) -> Result<Self, ChannelError> {
        let connect_err = |source| ChannelError::Connect {
            addr: addr.to_string(),
            source,
        };

        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing");
        let mut stream = None;
        for sock in addr.to_socket_addrs().map_err(connect_err)? {
            match TcpStream::connect_timeout(&sock, connect_timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = e,
            }
        }
        let stream = stream.ok_or_else(|| connect_err(last_err))?;

        stream.set_nodelay(true).map_err(connect_err)?;
        stream
            .set_write_timeout(send_timeout.filter(|t| !t.is_zero()))
            .map_err(connect_err)?;

        info!("connected to actuator controller at {}", addr);
        Ok(Self::from_writer(stream, addr))
    }
}

impl<W: Write> CommandChannel<W> {
    pub fn from_writer(writer: W, peer: impl Into<String>) -> Self {
        Self {
            writer: Some(writer),
            peer: peer.into(),
            sent: 0,
            torn: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    fn write_record(writer: &mut W, command: &MotorCommand) -> Result<(), ChannelError> {
        // Encode fully before touching the connection.
        let record = encode_command(command)?;
        writer.write_all(&record)?;
        writer.flush()?;
        debug!("sent {}", String::from_utf8_lossy(&record).trim_end());
        Ok(())
    }
}

impl<W: Write> CommandSink for CommandChannel<W> {
    fn send(&mut self, command: &MotorCommand) -> Result<(), ChannelError> {
        let writer = self.writer.as_mut().ok_or(ChannelError::Closed)?;
        if let Err(e) = Self::write_record(writer, command) {
            self.torn = true;
            return Err(e);
        }
        self.sent += 1;
        Ok(())
    }

    fn close(&mut self) -> bool {
        let Some(mut writer) = self.writer.take() else {
            return false;
        };
        // Terminate any fragment so the stop lands on a line of its own.
        let stop = if self.torn {
            writer
                .write_all(&[RECORD_SEPARATOR])
                .map_err(ChannelError::from)
                .and_then(|()| Self::write_record(&mut writer, &MotorCommand::STOP))
        } else {
            Self::write_record(&mut writer, &MotorCommand::STOP)
        };
        match stop {
            Ok(()) => self.sent += 1,
            Err(e) => warn!("final stop to {} failed: {}", self.peer, e),
        }
        drop(writer);
        info!("command channel to {} closed after {} commands", self.peer, self.sent);
        true
    }
}

impl<W: Write> Drop for CommandChannel<W> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::wire::decode_command;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn send_writes_one_line_per_command() {
        let buf = SharedBuf::default();
        let mut channel = CommandChannel::from_writer(buf.clone(), "test");
        channel.send(&MotorCommand::new(255, 255)).unwrap();
        channel.send(&MotorCommand::new(190, -190)).unwrap();
        assert_eq!(
            buf.text(),
            "{\"pwmR\": 255, \"pwmL\": 255}\n{\"pwmR\": -190, \"pwmL\": 190}\n"
        );
        assert_eq!(channel.sent(), 2);
    }

    #[test]
    fn close_sends_stop_exactly_once() {
        let buf = SharedBuf::default();
        let mut channel = CommandChannel::from_writer(buf.clone(), "test");
        assert!(channel.close());
        assert!(!channel.close());
        drop(channel);
        assert_eq!(buf.text(), "{\"pwmR\": 0, \"pwmL\": 0}\n");
    }

    #[test]
    fn drop_runs_close() {
        let buf = SharedBuf::default();
        {
            let mut channel = CommandChannel::from_writer(buf.clone(), "test");
            channel.send(&MotorCommand::new(-150, 150)).unwrap();
        }
        assert!(buf.text().ends_with("{\"pwmR\": 0, \"pwmL\": 0}\n"));
    }

    #[test]
    fn send_after_close_is_rejected() {
        let mut channel = CommandChannel::from_writer(SharedBuf::default(), "test");
        channel.close();
        assert!(matches!(channel.send(&MotorCommand::STOP), Err(ChannelError::Closed)));
    }

    #[test]
    fn write_failure_surfaces_and_close_swallows_it() {
        let mut channel = CommandChannel::from_writer(BrokenPipe, "test");
        assert!(matches!(channel.send(&MotorCommand::STOP), Err(ChannelError::Io(_))));
        assert!(channel.close());
        assert!(!channel.is_open());
    }

    /// Accepts `budget` bytes, then times out once.
    struct Stalls {
        out: SharedBuf,
        budget: usize,
        stalled: bool,
    }

    impl Write for Stalls {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 && !self.stalled {
                self.stalled = true;
                return Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out"));
            }
            let n = if self.stalled { buf.len() } else { buf.len().min(self.budget) };
            self.budget -= n.min(self.budget);
            self.out.write(&buf[..n])
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn stop_after_timed_out_send_starts_a_fresh_line() {
        let out = SharedBuf::default();
        let writer = Stalls {
            out: out.clone(),
            budget: 10,
            stalled: false,
        };
        let mut channel = CommandChannel::from_writer(writer, "test");
        assert!(matches!(channel.send(&MotorCommand::new(190, -190)), Err(ChannelError::Io(_))));
        assert!(channel.close());

        let text = out.text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2, "{text:?}");
        assert!(decode_command(lines[0]).is_err());
        assert_eq!(decode_command(lines[1]).unwrap(), MotorCommand::STOP);
    }

    #[test]
    fn connects_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let reader = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            BufReader::new(stream).lines().map(|l| l.unwrap()).collect::<Vec<_>>()
        });

        let mut channel =
            CommandChannel::connect(&addr, Duration::from_secs(1), Some(Duration::from_millis(500))).unwrap();
        channel.send(&MotorCommand::new(255, 255)).unwrap();
        drop(channel);

        let lines = reader.join().unwrap();
        assert_eq!(lines, vec!["{\"pwmR\": 255, \"pwmL\": 255}", "{\"pwmR\": 0, \"pwmL\": 0}"]);
    }

    #[test]
    fn connect_failure_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let err = CommandChannel::connect(&addr, Duration::from_millis(200), None).err().unwrap();
        assert!(matches!(err, ChannelError::Connect { .. }));
    }
}
