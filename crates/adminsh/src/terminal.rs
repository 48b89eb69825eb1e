//! Line discipline for console sessions.
//!
//! Clients without a PTY send plain `\n` or `\r\n` terminated lines. Clients
//! with a PTY send raw keystrokes and expect the server to echo them, so the
//! editor also handles echo, backspace, Ctrl-C and Ctrl-D, and swallows
//! terminal escape sequences such as arrow keys.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Longest line accepted before the session is dropped.
pub const MAX_LINE_LENGTH: usize = 4096;

const READ_BUFFER_SIZE: usize = 1024;

const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const BACKSPACE: u8 = 0x08;
const ESC: u8 = 0x1b;
const DEL: u8 = 0x7f;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    None,
    Esc,
    Csi,
}

/// What a single input byte did to the editor.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Continue,
    Line,
    Eof,
}

/// Incremental line reader with optional echo.
#[derive(Debug)]
pub struct LineEditor {
    echo: bool,
    line: Vec<u8>,
    pending: Vec<u8>,
    pending_pos: usize,
    echo_buf: Vec<u8>,
    after_cr: bool,
    escape: Escape,
    eof: bool,
}

impl LineEditor {
    /// Creates an editor. With `echo` set, accepted input is written back.
    pub fn new(echo: bool) -> Self {
        Self {
            echo,
            line: Vec::new(),
            pending: Vec::new(),
            pending_pos: 0,
            echo_buf: Vec::new(),
            after_cr: false,
            escape: Escape::None,
            eof: false,
        }
    }

    /// Returns true if input is echoed.
    pub fn echoes(&self) -> bool {
        self.echo
    }

    /// Reads the next line from `stream`.
    ///
    /// Returns `Ok(None)` at end of input. A partial line cut off by end of
    /// input is returned as a final line.
    ///
    /// # Errors
    ///
    /// Read or echo write failures, and [`io::ErrorKind::InvalidData`] when a
    /// line exceeds [`MAX_LINE_LENGTH`].
    pub async fn read_line<S>(&mut self, stream: &mut S) -> io::Result<Option<String>>
    where
        S: AsyncRead + AsyncWrite + Unpin + ?Sized,
    {
        loop {
            while self.pending_pos < self.pending.len() {
                let byte = self.pending[self.pending_pos];
                self.pending_pos += 1;
                let step = self.feed(byte);
                self.flush_echo(stream).await?;
                match step {
                    Step::Continue => {}
                    Step::Line => return Ok(Some(self.take_line())),
                    Step::Eof => {
                        self.eof = true;
                        return Ok(None);
                    }
                }
                if self.line.len() > MAX_LINE_LENGTH {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "line too long"));
                }
            }

            if self.eof {
                return Ok(None);
            }

            let mut buf = [0u8; READ_BUFFER_SIZE];
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                self.eof = true;
                if self.line.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }
            self.pending.clear();
            self.pending.extend_from_slice(&buf[..n]);
            self.pending_pos = 0;
        }
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();
        line
    }

    async fn flush_echo<S>(&mut self, stream: &mut S) -> io::Result<()>
    where
        S: AsyncWrite + Unpin + ?Sized,
    {
        if self.echo_buf.is_empty() {
            return Ok(());
        }
        stream.write_all(&self.echo_buf).await?;
        stream.flush().await?;
        self.echo_buf.clear();
        Ok(())
    }

    fn echo(&mut self, bytes: &[u8]) {
        if self.echo {
            self.echo_buf.extend_from_slice(bytes);
        }
    }

    fn feed(&mut self, byte: u8) -> Step {
        let after_cr = std::mem::replace(&mut self.after_cr, false);

        match self.escape {
            Escape::Esc => {
                self.escape = if byte == b'[' { Escape::Csi } else { Escape::None };
                return Step::Continue;
            }
            Escape::Csi => {
                if (0x40..=0x7e).contains(&byte) {
                    self.escape = Escape::None;
                }
                return Step::Continue;
            }
            Escape::None => {}
        }

        match byte {
            b'\r' => {
                self.after_cr = true;
                self.echo(b"\r\n");
                Step::Line
            }
            b'\n' if after_cr => Step::Continue,
            b'\n' => {
                self.echo(b"\r\n");
                Step::Line
            }
            BACKSPACE | DEL => {
                if self.pop_char() {
                    self.echo(b"\x08 \x08");
                }
                Step::Continue
            }
            CTRL_C => {
                self.line.clear();
                self.echo(b"^C\r\n");
                Step::Line
            }
            CTRL_D if self.line.is_empty() => Step::Eof,
            ESC => {
                self.escape = Escape::Esc;
                Step::Continue
            }
            b'\t' => {
                self.line.push(byte);
                self.echo(&[byte]);
                Step::Continue
            }
            b if b < 0x20 => Step::Continue,
            b => {
                self.line.push(b);
                self.echo(&[b]);
                Step::Continue
            }
        }
    }

    /// Removes the last UTF-8 character. Returns false if the line was empty.
    fn pop_char(&mut self) -> bool {
        let Some(mut byte) = self.line.pop() else {
            return false;
        };
        // Continuation bytes: keep going until the lead byte is gone.
        while byte & 0xc0 == 0x80 {
            match self.line.pop() {
                Some(b) => byte = b,
                None => break,
            }
        }
        true
    }
}
